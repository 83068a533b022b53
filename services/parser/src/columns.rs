//! Header normalization.
//!
//! Raw workbook headers are mapped to canonical field names through two fixed
//! tables (departure and base layouts); anything else goes through a generic
//! slug transform. Same input, same output.

use regex::Regex;
use std::sync::OnceLock;

use crate::raw::{format_number, Cell};

/// Known departure-log headers (exact, trimmed).
pub const DEPARTURE_HEADERS: &[(&str, &str)] = &[
    ("SL No.", "SL_No"),
    ("Airport Code", "Airport_Code"),
    ("Airport Name", "Airport_Name"),
    ("Region", "Region"),
    ("ProfitCenter", "Profit_Center"),
    ("Operator Name", "Operator_Name"),
    ("CA12 No.", "CA12_No"),
    ("Reg No.", "Reg_No"),
    ("Max Allup Wt", "Max_Allup_Wt"),
    ("Seating Capacity", "Seating_Capacity"),
    ("Helicopter", "Helicopter"),
    ("Aircraft Type", "Aircraft_Type"),
    ("Arr Date", "Arr_Date"),
    ("Arr GMT", "Arr_GMT"),
    ("Arr Flight No.", "Arr_Flight_No"),
    ("Dep Location", "Dep_Location"),
    ("Arr Nature", "Arr_Nature"),
    ("Arr GCD", "Arr_GCD"),
    ("Arr Sch", "Arr_Sch"),
    ("Arr RCS Status", "Arr_RCS_Status"),
    ("Arr RCS Category", "Arr_RCS_Category"),
    ("Dep Date", "Dep_Date"),
    ("Dep GMT", "Dep_GMT"),
    ("Dep Flight No.", "Dep_Flight_No"),
    ("Dest Location", "Dest_Location"),
    ("Dep Nature", "Dep_Nature"),
    ("Dep GCD", "Dep_GCD"),
    ("Dep Sch", "Dep_Sch"),
    ("Dep RCS Status", "Dep_RCS_Status"),
    ("Dep RCS Category", "Dep_RCS_Category"),
    ("Credit Facility", "Credit_Facility"),
    ("Operator Type", "Operator_Type"),
    ("Landing", "Landing"),
    ("Parking", "Parking"),
    ("Open Parking", "Open_Parking"),
    ("Housing", "Housing"),
    ("RNFC", "RNFC"),
    ("TNLC", "TNLC"),
    ("Arr Watch", "Arr_Watch"),
    ("Dep Watch", "Dep_Watch"),
    ("Counter", "Counter"),
    ("XRay", "XRay"),
    ("UDF Charge", "UDF_Charge"),
    ("OLD IN PAX", "OLD_IN_PAX"),
    ("OLD US PAX", "OLD_US_PAX"),
    ("NEW IN PAX", "NEW_IN_PAX"),
    ("NEW US PAX", "NEW_US_PAX"),
    ("OLD IN RATE", "OLD_IN_RATE"),
    ("OLD US RATE", "OLD_US_RATE"),
    ("NEW IN RATE", "NEW_IN_RATE"),
    ("NEW US RATE", "NEW_US_RATE"),
    ("Unique Id", "Unique_Id"),
    ("Arr Bill Status", "Arr_Bill_Status"),
    ("Dep Bill Status", "Dep_Bill_Status"),
    ("UDF Bill Status", "UDF_Bill_Status"),
];

/// Known base (customer billing) headers.
pub const BASE_HEADERS: &[(&str, &str)] = &[
    ("Payer ID", "Payer_ID"),
    ("Customer Name", "Customer_Name"),
    ("VAN SPOC", "VAN_SPOC"),
    ("CF Validity", "CF_Validity"),
    ("Fleet Count", "Fleet_Count"),
    ("Opening Balance", "Opening_Balance"),
    ("Assessment", "Assessment"),
    ("Realisation", "Realisation"),
    ("Closing Balance", "Closing_Balance"),
    ("SD/BG", "SD_BG"),
    ("Avg Monthly Assessment", "Avg_Monthly_Assessment"),
];

fn separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s./&]+").expect("valid separator pattern"))
}

fn repeated_underscores() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_+").expect("valid underscore pattern"))
}

fn lookup(header: &str) -> Option<&'static str> {
    DEPARTURE_HEADERS
        .iter()
        .chain(BASE_HEADERS.iter())
        .find(|(raw, _)| *raw == header)
        .map(|(_, canonical)| *canonical)
}

/// Map a raw header to its canonical field name.
///
/// Never fails: unknown headers come back slugified, e.g.
/// `"Foo Bar/Baz"` -> `"Foo_Bar_Baz"`.
pub fn normalize_column_name(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(canonical) = lookup(trimmed) {
        return canonical.to_string();
    }

    let slug = separators().replace_all(trimmed, "_");
    let slug = repeated_underscores().replace_all(&slug, "_");
    slug.trim_end_matches('_').to_string()
}

/// Normalize a header cell of any type. Numeric headers print like the
/// spreadsheet shows them (`2024`, not `2024.0`).
pub fn normalize_cell_header(cell: &Cell) -> String {
    match cell {
        Cell::Number(n) => normalize_column_name(&format_number(*n)),
        other => normalize_column_name(&other.text()),
    }
}

/// Normalize a whole header row. Blank headers become `Unnamed_<index>` and
/// repeated names get `_1`, `_2`, ... suffixes so every column stays addressable.
pub fn normalize_header_row(headers: &[Cell]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(headers.len());

    for (idx, cell) in headers.iter().enumerate() {
        let mut name = normalize_cell_header(cell);
        if name.is_empty() {
            name = format!("Unnamed_{}", idx);
        }

        if seen.contains(&name) {
            let base = name.clone();
            let mut n = 1;
            while seen.contains(&name) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
        }

        tracing::debug!(raw = %cell.text(), normalized = %name, "normalized header");
        seen.push(name);
    }

    seen
}
