//! Row enrichment: one normalized row in, one typed record out.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::warn;

use crate::clock::ProcessingRun;
use crate::excel_time::{decode_excel_datetime, format_hhmm, to_local};
use crate::raw::{Cell, RowView};
use crate::records::{
    cell_value, AirtimeColor, BaseRecord, BillStatus, Charges, FlightRecord, LinkageStatus,
};

const UNKNOWN: &str = "Unknown";

/// Absolute flight time in hours with its color tag. Zero and red unless
/// both timestamps are known.
pub fn airtime(arrival: Option<DateTime<Utc>>, departure: Option<DateTime<Utc>>) -> (f64, AirtimeColor) {
    match (arrival, departure) {
        (Some(arr), Some(dep)) => {
            let hours = (dep - arr).num_seconds().abs() as f64 / 3600.0;
            (hours, AirtimeColor::from_hours(hours))
        }
        _ => (0.0, AirtimeColor::Red),
    }
}

/// Same when origin equals destination (exact, case-sensitive). Unknown when
/// either timestamp is missing.
pub fn linkage(
    arrival: Option<DateTime<Utc>>,
    departure: Option<DateTime<Utc>>,
    dep_location: &str,
    dest_location: &str,
) -> LinkageStatus {
    if arrival.is_none() || departure.is_none() {
        LinkageStatus::Unknown
    } else if dep_location == dest_location {
        LinkageStatus::Same
    } else {
        LinkageStatus::Different
    }
}

/// Trimmed registration, "Unknown" when blank.
pub fn registration(cell: &Cell) -> String {
    let text = cell.text();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        UNKNOWN.to_string()
    } else {
        trimmed.to_string()
    }
}

fn or_unknown(value: Option<String>) -> String {
    value.unwrap_or_else(|| UNKNOWN.to_string())
}

// Only real numeric cells are date serials; text dates are ignored.
fn serial(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) => Some(*n),
        _ => None,
    }
}

fn decode_pair(row: &RowView<'_>, date_column: &str, time_column: &str) -> Option<DateTime<Utc>> {
    let time = format_hhmm(row.get(time_column));
    decode_excel_datetime(serial(row.get(date_column)), time.as_deref())
}

/// `seq` is the run-wide record sequence behind `Unique_Id`.
pub fn enrich_flight(row: &RowView<'_>, seq: usize, run: &ProcessingRun) -> FlightRecord {
    let arrival = decode_pair(row, "Arr_Date", "Arr_GMT");
    let departure = decode_pair(row, "Dep_Date", "Dep_GMT");

    if arrival.is_none() || departure.is_none() {
        warn!(
            seq,
            arr_date = %row.text("Arr_Date"),
            arr_gmt = %row.text("Arr_GMT"),
            dep_date = %row.text("Dep_Date"),
            dep_gmt = %row.text("Dep_GMT"),
            "row timestamps incomplete"
        );
    }

    let dep_location = row.text("Dep_Location");
    let dest_location = row.text("Dest_Location");
    let (airtime_hours, airtime_color) = airtime(arrival, departure);
    let linkage_status = linkage(arrival, departure, &dep_location, &dest_location);
    let charges = Charges::from_row(row);

    FlightRecord {
        unique_id: run.flight_id(seq),
        arrival_gmt: arrival,
        departure_gmt: departure,
        airport_name: row.text("Airport_Name"),
        operator_name: or_unknown(row.non_blank("Operator_Name")),
        aircraft_type: or_unknown(row.non_blank("Aircraft_Type")),
        reg_no: registration(row.get("Reg_No")),
        airtime_hours,
        airtime_color,
        dep_local: departure.map(to_local),
        arr_local: arrival.map(to_local),
        linkage_status,
        arr_bill_status: BillStatus::determine(charges.landing, row.get("Arr_Bill_Status")),
        dep_bill_status: BillStatus::determine(charges.parking, row.get("Dep_Bill_Status")),
        udf_bill_status: BillStatus::determine(charges.udf_charge, row.get("UDF_Bill_Status")),
        charges,
        dep_location,
        dest_location,
    }
}

/// CF validity is often a date serial; show it as a calendar date.
fn validity(cell: &Cell) -> String {
    match cell {
        Cell::Number(n) => decode_excel_datetime(Some(*n), None)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| cell.text()),
        other => other.text(),
    }
}

pub fn enrich_base(row: &RowView<'_>, has_registration: bool) -> BaseRecord {
    let extra: BTreeMap<String, serde_json::Value> = row
        .entries()
        .filter(|(name, _)| !BaseRecord::is_known_column(name))
        .map(|(name, cell)| (name.to_string(), cell_value(cell)))
        .collect();

    BaseRecord {
        customer_name: row.text("Customer_Name"),
        payer_id: row.text("Payer_ID"),
        van_spoc: row.text("VAN_SPOC"),
        cf_validity: validity(row.get("CF_Validity")),
        fleet_count: row.number("Fleet_Count"),
        opening_balance: row.number("Opening_Balance"),
        assessment: row.number("Assessment"),
        realisation: row.number("Realisation"),
        closing_balance: row.number("Closing_Balance"),
        sd_bg: row.number("SD_BG"),
        avg_monthly_assessment: row.number("Avg_Monthly_Assessment"),
        reg_no: has_registration.then(|| registration(row.get("Reg_No"))),
        extra,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::ColumnIndex;
    use chrono::TimeZone;

    fn run() -> ProcessingRun {
        ProcessingRun::with_nonce(Utc.with_ymd_and_hms(2026, 10, 19, 10, 30, 0).unwrap(), "n0nce000")
    }

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn flight_index() -> ColumnIndex {
        ColumnIndex::new(
            [
                "Operator_Name",
                "Reg_No",
                "Arr_Date",
                "Arr_GMT",
                "Dep_Date",
                "Dep_GMT",
                "Dep_Location",
                "Dest_Location",
                "Landing",
                "Parking",
                "Arr_Bill_Status",
                "Dep_Bill_Status",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        )
    }

    // -------------------------------------------------------------------------
    // AIRTIME / LINKAGE
    // -------------------------------------------------------------------------

    #[test]
    fn test_airtime_is_absolute() {
        let a = Utc.with_ymd_and_hms(2023, 3, 15, 9, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2023, 3, 15, 21, 30, 0).unwrap();
        assert_eq!(airtime(Some(a), Some(b)), (12.5, AirtimeColor::Yellow));
        assert_eq!(airtime(Some(b), Some(a)), (12.5, AirtimeColor::Yellow));
        assert_eq!(airtime(Some(a), None), (0.0, AirtimeColor::Red));
    }

    #[test]
    fn test_linkage() {
        let t = Some(Utc.with_ymd_and_hms(2023, 3, 15, 9, 0, 0).unwrap());
        assert_eq!(linkage(t, t, "DEL", "DEL"), LinkageStatus::Same);
        assert_eq!(linkage(t, t, "DEL", "del"), LinkageStatus::Different);
        assert_eq!(linkage(t, t, "", ""), LinkageStatus::Same);
        assert_eq!(linkage(None, t, "DEL", "DEL"), LinkageStatus::Unknown);
    }

    #[test]
    fn test_registration() {
        assert_eq!(registration(&text("  VT-ABC ")), "VT-ABC");
        assert_eq!(registration(&text("   ")), "Unknown");
        assert_eq!(registration(&Cell::Empty), "Unknown");
    }

    // -------------------------------------------------------------------------
    // FLIGHT ROWS
    // -------------------------------------------------------------------------

    #[test]
    fn test_enrich_full_flight_row() {
        let index = flight_index();
        let cells = vec![
            text("Air A"),
            text(" VT-ABC "),
            Cell::Number(45000.0),
            Cell::Number(930.0),
            Cell::Number(45001.0),
            text("0030"),
            text("DEL"),
            text("DEL"),
            Cell::Number(1500.0),
            Cell::Number(0.0),
            text("unbilled"),
            text("Billed"),
        ];
        let record = enrich_flight(&index.row(&cells), 4, &run());

        assert_eq!(record.unique_id, "FLIGHT_4_20261019103000");
        assert_eq!(record.reg_no, "VT-ABC");
        assert_eq!(record.airtime_hours, 15.0);
        assert_eq!(record.airtime_color, AirtimeColor::Green);
        assert_eq!(record.linkage_status, LinkageStatus::Same);
        assert_eq!(record.arr_bill_status, BillStatus::Billed);
        assert_eq!(record.dep_bill_status, BillStatus::Billed);
        assert_eq!(record.udf_bill_status, BillStatus::Unbilled);
        assert_eq!(record.aircraft_type, "Unknown");
        assert_eq!(
            record.arr_local.unwrap().to_rfc3339(),
            "2023-03-15T15:00:00+05:30"
        );
    }

    #[test]
    fn test_missing_departure_time_degrades() {
        let index = flight_index();
        let cells = vec![
            Cell::Empty,
            Cell::Empty,
            Cell::Number(45000.0),
            Cell::Number(930.0),
            text("15/03/2023"),
            Cell::Empty,
            text("DEL"),
            text("DEL"),
            text("abc"),
            Cell::Empty,
            Cell::Empty,
            Cell::Empty,
        ];
        let record = enrich_flight(&index.row(&cells), 0, &run());

        assert!(record.arrival_gmt.is_some());
        assert!(record.departure_gmt.is_none());
        assert_eq!(record.airtime_hours, 0.0);
        assert_eq!(record.airtime_color, AirtimeColor::Red);
        assert_eq!(record.linkage_status, LinkageStatus::Unknown);
        assert_eq!(record.operator_name, "Unknown");
        assert_eq!(record.reg_no, "Unknown");
        assert_eq!(record.charges.landing, 0.0);
        assert_eq!(record.arr_bill_status, BillStatus::Unbilled);
    }

    // -------------------------------------------------------------------------
    // BASE ROWS
    // -------------------------------------------------------------------------

    #[test]
    fn test_enrich_base_row() {
        let index = ColumnIndex::new(
            ["Customer_Name", "Assessment", "CF_Validity", "Remarks", "Fleet_Count"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        let cells = vec![
            text("Acme Air"),
            text("not a number"),
            Cell::Number(45000.0),
            text("priority"),
            Cell::Number(4.0),
        ];
        let record = enrich_base(&index.row(&cells), false);

        assert_eq!(record.customer_name, "Acme Air");
        assert_eq!(record.assessment, 0.0);
        assert_eq!(record.cf_validity, "2023-03-15");
        assert_eq!(record.fleet_count, 4.0);
        assert_eq!(record.payer_id, "");
        assert_eq!(record.reg_no, None);
        assert_eq!(record.extra.get("Remarks"), Some(&serde_json::json!("priority")));
        assert!(!record.extra.contains_key("Assessment"));
    }

    #[test]
    fn test_base_registration_only_when_present() {
        let index = ColumnIndex::new(vec!["Customer_Name".into(), "Reg_No".into()]);
        let cells = vec![text("Acme"), Cell::Empty];
        let record = enrich_base(&index.row(&cells), true);
        assert_eq!(record.reg_no.as_deref(), Some("Unknown"));
    }
}
