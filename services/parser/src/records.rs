//! Typed records produced from workbook rows, in their persisted shape.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::raw::{Cell, RowView};

// =============================================================================
// FILE TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Flight log: one row per aircraft movement.
    Departure,
    /// Customer billing ledger.
    Base,
}

impl FileType {
    /// Absolute row index holding the headers. Departure logs carry two
    /// title rows above the table.
    pub fn header_row(self) -> usize {
        match self {
            FileType::Departure => 2,
            FileType::Base => 0,
        }
    }

    pub fn required_column(self) -> &'static str {
        match self {
            FileType::Departure => "Operator_Name",
            FileType::Base => "Customer_Name",
        }
    }

    /// Multipart field carrying this kind of workbook.
    pub fn upload_field(self) -> &'static str {
        match self {
            FileType::Departure => "departure_file",
            FileType::Base => "base_file",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Departure => "departure",
            FileType::Base => "base",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "departure" => Ok(FileType::Departure),
            "base" => Ok(FileType::Base),
            other => Err(format!("unknown file type '{}'", other)),
        }
    }
}

// =============================================================================
// DERIVED TAGS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AirtimeColor {
    Green,
    Yellow,
    Red,
}

impl AirtimeColor {
    pub fn from_hours(hours: f64) -> Self {
        if hours >= 14.0 {
            AirtimeColor::Green
        } else if hours >= 10.0 {
            AirtimeColor::Yellow
        } else {
            AirtimeColor::Red
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkageStatus {
    Same,
    Different,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Billed,
    #[default]
    Unbilled,
}

impl BillStatus {
    /// A positive charge means billed regardless of what the sheet says.
    /// Otherwise the sheet's own status wins, read case-insensitively.
    pub fn determine(charge: f64, source: &Cell) -> Self {
        if charge > 0.0 || source.text().trim().eq_ignore_ascii_case("billed") {
            BillStatus::Billed
        } else {
            BillStatus::Unbilled
        }
    }

    pub fn is_billed(self) -> bool {
        self == BillStatus::Billed
    }
}

// =============================================================================
// FLIGHT RECORDS
// =============================================================================

/// Charge, passenger and rate columns of a departure row. Missing -> 0.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Charges {
    #[serde(rename = "Landing", default)]
    pub landing: f64,
    #[serde(rename = "Parking", default)]
    pub parking: f64,
    #[serde(rename = "Open_Parking", default)]
    pub open_parking: f64,
    #[serde(rename = "Housing", default)]
    pub housing: f64,
    #[serde(rename = "RNFC", default)]
    pub rnfc: f64,
    #[serde(rename = "TNLC", default)]
    pub tnlc: f64,
    #[serde(rename = "Arr_Watch", default)]
    pub arr_watch: f64,
    #[serde(rename = "Dep_Watch", default)]
    pub dep_watch: f64,
    #[serde(rename = "Counter", default)]
    pub counter: f64,
    #[serde(rename = "XRay", default)]
    pub xray: f64,
    #[serde(rename = "UDF_Charge", default)]
    pub udf_charge: f64,
    #[serde(rename = "OLD_IN_PAX", default)]
    pub old_in_pax: f64,
    #[serde(rename = "OLD_US_PAX", default)]
    pub old_us_pax: f64,
    #[serde(rename = "NEW_IN_PAX", default)]
    pub new_in_pax: f64,
    #[serde(rename = "NEW_US_PAX", default)]
    pub new_us_pax: f64,
    #[serde(rename = "OLD_IN_RATE", default)]
    pub old_in_rate: f64,
    #[serde(rename = "OLD_US_RATE", default)]
    pub old_us_rate: f64,
    #[serde(rename = "NEW_IN_RATE", default)]
    pub new_in_rate: f64,
    #[serde(rename = "NEW_US_RATE", default)]
    pub new_us_rate: f64,
}

impl Charges {
    pub fn from_row(row: &RowView<'_>) -> Self {
        Self {
            landing: row.number("Landing"),
            parking: row.number("Parking"),
            open_parking: row.number("Open_Parking"),
            housing: row.number("Housing"),
            rnfc: row.number("RNFC"),
            tnlc: row.number("TNLC"),
            arr_watch: row.number("Arr_Watch"),
            dep_watch: row.number("Dep_Watch"),
            counter: row.number("Counter"),
            xray: row.number("XRay"),
            udf_charge: row.number("UDF_Charge"),
            old_in_pax: row.number("OLD_IN_PAX"),
            old_us_pax: row.number("OLD_US_PAX"),
            new_in_pax: row.number("NEW_IN_PAX"),
            new_us_pax: row.number("NEW_US_PAX"),
            old_in_rate: row.number("OLD_IN_RATE"),
            old_us_rate: row.number("OLD_US_RATE"),
            new_in_rate: row.number("NEW_IN_RATE"),
            new_us_rate: row.number("NEW_US_RATE"),
        }
    }

    /// (column, value) pairs in persisted order.
    pub fn entries(&self) -> [(&'static str, f64); 19] {
        [
            ("Landing", self.landing),
            ("Parking", self.parking),
            ("Open_Parking", self.open_parking),
            ("Housing", self.housing),
            ("RNFC", self.rnfc),
            ("TNLC", self.tnlc),
            ("Arr_Watch", self.arr_watch),
            ("Dep_Watch", self.dep_watch),
            ("Counter", self.counter),
            ("XRay", self.xray),
            ("UDF_Charge", self.udf_charge),
            ("OLD_IN_PAX", self.old_in_pax),
            ("OLD_US_PAX", self.old_us_pax),
            ("NEW_IN_PAX", self.new_in_pax),
            ("NEW_US_PAX", self.new_us_pax),
            ("OLD_IN_RATE", self.old_in_rate),
            ("OLD_US_RATE", self.old_us_rate),
            ("NEW_IN_RATE", self.new_in_rate),
            ("NEW_US_RATE", self.new_us_rate),
        ]
    }
}

/// One enriched departure row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    #[serde(rename = "Unique_Id")]
    pub unique_id: String,
    #[serde(rename = "Arrival_GMT")]
    pub arrival_gmt: Option<DateTime<Utc>>,
    #[serde(rename = "Departure_GMT")]
    pub departure_gmt: Option<DateTime<Utc>>,
    #[serde(rename = "Dep_Location")]
    pub dep_location: String,
    #[serde(rename = "Dest_Location")]
    pub dest_location: String,
    #[serde(rename = "Airport_Name")]
    pub airport_name: String,
    #[serde(rename = "Operator_Name")]
    pub operator_name: String,
    #[serde(rename = "Aircraft_Type")]
    pub aircraft_type: String,
    #[serde(rename = "Reg_No")]
    pub reg_no: String,
    #[serde(rename = "Airtime_Hours", with = "hours_text")]
    pub airtime_hours: f64,
    #[serde(rename = "Airtime_Color")]
    pub airtime_color: AirtimeColor,
    #[serde(rename = "Dep_Local")]
    pub dep_local: Option<DateTime<FixedOffset>>,
    #[serde(rename = "Arr_Local")]
    pub arr_local: Option<DateTime<FixedOffset>>,
    #[serde(rename = "Linkage_Status")]
    pub linkage_status: LinkageStatus,
    #[serde(flatten)]
    pub charges: Charges,
    #[serde(rename = "Arr_Bill_Status", default)]
    pub arr_bill_status: BillStatus,
    #[serde(rename = "Dep_Bill_Status", default)]
    pub dep_bill_status: BillStatus,
    #[serde(rename = "UDF_Bill_Status", default)]
    pub udf_bill_status: BillStatus,
}

impl FlightRecord {
    /// Persisted keys in output order.
    pub const COLUMNS: &'static [&'static str] = &[
        "Unique_Id",
        "Arrival_GMT",
        "Departure_GMT",
        "Dep_Location",
        "Dest_Location",
        "Airport_Name",
        "Operator_Name",
        "Aircraft_Type",
        "Reg_No",
        "Airtime_Hours",
        "Airtime_Color",
        "Dep_Local",
        "Arr_Local",
        "Linkage_Status",
        "Landing",
        "Parking",
        "Open_Parking",
        "Housing",
        "RNFC",
        "TNLC",
        "Arr_Watch",
        "Dep_Watch",
        "Counter",
        "XRay",
        "UDF_Charge",
        "OLD_IN_PAX",
        "OLD_US_PAX",
        "NEW_IN_PAX",
        "NEW_US_PAX",
        "OLD_IN_RATE",
        "OLD_US_RATE",
        "NEW_IN_RATE",
        "NEW_US_RATE",
        "Arr_Bill_Status",
        "Dep_Bill_Status",
        "UDF_Bill_Status",
        "file_type",
    ];

    /// Arrival local date as `YYYY-MM-DD`, or "Unknown".
    pub fn arrival_date(&self) -> String {
        self.arr_local
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Airtime is stored as text with two decimals ("11.50").
mod hours_text {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(hours: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:.2}", hours))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        struct HoursVisitor;

        impl<'de> Visitor<'de> for HoursVisitor {
            type Value = f64;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("hours as a number or numeric string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
                v.trim().parse().map_err(E::custom)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
                Ok(v)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
                Ok(v as f64)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
                Ok(v as f64)
            }
        }

        deserializer.deserialize_any(HoursVisitor)
    }
}

// =============================================================================
// BASE RECORDS
// =============================================================================

/// One customer billing row. Columns outside the known set ride along in
/// `extra` under their normalized names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseRecord {
    #[serde(rename = "Customer_Name", default)]
    pub customer_name: String,
    #[serde(rename = "Payer_ID", default)]
    pub payer_id: String,
    #[serde(rename = "VAN_SPOC", default)]
    pub van_spoc: String,
    #[serde(rename = "CF_Validity", default)]
    pub cf_validity: String,
    #[serde(rename = "Fleet_Count", default)]
    pub fleet_count: f64,
    #[serde(rename = "Opening_Balance", default)]
    pub opening_balance: f64,
    #[serde(rename = "Assessment", default)]
    pub assessment: f64,
    #[serde(rename = "Realisation", default)]
    pub realisation: f64,
    #[serde(rename = "Closing_Balance", default)]
    pub closing_balance: f64,
    #[serde(rename = "SD_BG", default)]
    pub sd_bg: f64,
    #[serde(rename = "Avg_Monthly_Assessment", default)]
    pub avg_monthly_assessment: f64,
    #[serde(rename = "Reg_No", default, skip_serializing_if = "Option::is_none")]
    pub reg_no: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BaseRecord {
    /// Columns with a dedicated field, in output order.
    pub const KNOWN_COLUMNS: &'static [&'static str] = &[
        "Customer_Name",
        "Payer_ID",
        "VAN_SPOC",
        "CF_Validity",
        "Fleet_Count",
        "Opening_Balance",
        "Assessment",
        "Realisation",
        "Closing_Balance",
        "SD_BG",
        "Avg_Monthly_Assessment",
        "Reg_No",
    ];

    pub fn is_known_column(name: &str) -> bool {
        Self::KNOWN_COLUMNS.contains(&name) || name == "file_type"
    }

    /// Value of a numeric known column, `None` for text or unknown columns.
    pub fn numeric(&self, column: &str) -> Option<f64> {
        match column {
            "Fleet_Count" => Some(self.fleet_count),
            "Opening_Balance" => Some(self.opening_balance),
            "Assessment" => Some(self.assessment),
            "Realisation" => Some(self.realisation),
            "Closing_Balance" => Some(self.closing_balance),
            "SD_BG" => Some(self.sd_bg),
            "Avg_Monthly_Assessment" => Some(self.avg_monthly_assessment),
            _ => None,
        }
    }
}

/// JSON form of a cell carried through untouched.
pub fn cell_value(cell: &Cell) -> Value {
    match cell {
        Cell::Empty => Value::Null,
        Cell::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Cell::Text(s) => Value::String(s.clone()),
        Cell::Bool(b) => Value::Bool(*b),
    }
}

// =============================================================================
// RECORD SET
// =============================================================================

/// A persisted record. The `file_type` key tells the two shapes apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "file_type")]
pub enum Record {
    #[serde(rename = "departure")]
    Flight(FlightRecord),
    #[serde(rename = "base")]
    Base(BaseRecord),
}

impl Record {
    pub fn file_type(&self) -> FileType {
        match self {
            Record::Flight(_) => FileType::Departure,
            Record::Base(_) => FileType::Base,
        }
    }

    pub fn as_flight(&self) -> Option<&FlightRecord> {
        match self {
            Record::Flight(flight) => Some(flight),
            Record::Base(_) => None,
        }
    }

    pub fn as_base(&self) -> Option<&BaseRecord> {
        match self {
            Record::Base(base) => Some(base),
            Record::Flight(_) => None,
        }
    }
}
