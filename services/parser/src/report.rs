//! Downloadable dashboard report for one stored analysis.

use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};
use tracing::info;

use crate::clock::Clock;
use crate::error::ReportError;
use crate::excel_time::to_local;
use crate::records::FileType;
use crate::stats::stringify;
use crate::store::{AnalysisDocument, DocumentStore};

const DEPARTURE_STATS: &[&str] = &[
    "total_flights",
    "unique_operators",
    "top_operator",
    "avg_airtime",
    "arr_billed_count",
    "dep_billed_count",
    "udf_billed_count",
    "arr_unbilled_count",
    "dep_unbilled_count",
    "udf_unbilled_count",
    "total_landing_charges",
    "total_parking_charges",
    "total_open_parking_charges",
    "total_housing_charges",
    "total_rnfc_charges",
    "total_tnlc_charges",
    "total_arr_watch_charges",
    "total_dep_watch_charges",
    "total_counter_charges",
    "total_xray_charges",
    "total_udf_charges",
];

const BASE_STATS: &[&str] = &[
    "total_operators",
    "total_assessment",
    "total_realisation",
    "total_closing_balance",
];

pub const CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone)]
pub struct ReportFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// "total_udf_charges" -> "Total Udf Charges"
fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Statistic rows that apply to the document's file type, in display order.
fn stat_rows(doc: &AnalysisDocument) -> Vec<(String, String)> {
    let flat = stringify(&doc.stats);
    let keys = match doc.file_type {
        FileType::Departure => DEPARTURE_STATS,
        FileType::Base => BASE_STATS,
    };
    keys.iter()
        .map(|key| (title_case(key), flat.get(*key).cloned().unwrap_or_default()))
        .collect()
}

/// Render the dashboard workbook: title, generation time, narrative,
/// statistics table and chart sections.
pub fn build_report(doc: &AnalysisDocument, generated_at: DateTime<Utc>) -> Result<Vec<u8>, ReportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Dashboard")?;
    sheet.set_column_width(0, 32)?;
    sheet.set_column_width(1, 24)?;

    let title_format = Format::new().set_bold().set_font_size(16);
    let heading_format = Format::new().set_bold().set_font_size(13);
    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x808080))
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin);
    let cell_format = Format::new()
        .set_background_color(Color::RGB(0xF5F5DC))
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin);

    sheet.write_string_with_format(0, 0, format!("{} Dashboard Report", doc.sheet_name), &title_format)?;
    sheet.write_string(
        1,
        0,
        format!("Generated on: {}", to_local(generated_at).format("%Y-%m-%d %H:%M:%S IST")),
    )?;

    sheet.write_string_with_format(3, 0, "Summary", &heading_format)?;
    let narrative = if doc.formal_summary.is_empty() {
        "No summary available"
    } else {
        doc.formal_summary.as_str()
    };
    sheet.write_string(4, 0, narrative)?;

    let mut row: u32 = 6;
    sheet.write_string_with_format(row, 0, "Statistic", &header_format)?;
    sheet.write_string_with_format(row, 1, "Value", &header_format)?;
    for (label, value) in stat_rows(doc) {
        row += 1;
        sheet.write_string_with_format(row, 0, label, &cell_format)?;
        sheet.write_string_with_format(row, 1, value, &cell_format)?;
    }

    for (title, chart) in [("Bar Chart", &doc.chart_bar), ("Pie Chart", &doc.chart_pie)] {
        if chart.is_empty() {
            continue;
        }
        row += 2;
        sheet.write_string_with_format(row, 0, title, &heading_format)?;
        row += 1;
        sheet.write_string(row, 0, format!("{} Image Placeholder", title))?;
    }

    Ok(workbook.save_to_buffer()?)
}

/// Load the analysis for `doc_id` and render its report.
pub async fn dashboard_report(
    store: &dyn DocumentStore,
    doc_id: &str,
    clock: &dyn Clock,
) -> Result<ReportFile, ReportError> {
    let doc = store
        .get_analysis(doc_id)
        .await?
        .ok_or_else(|| ReportError::NotFound(doc_id.to_string()))?;

    let bytes = build_report(&doc, clock.now())?;
    info!(doc_id, bytes = bytes.len(), "generated dashboard report");

    Ok(ReportFile {
        filename: format!("dashboard_{}.xlsx", doc_id),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::stats::SheetStats;
    use crate::store::MemoryDocumentStore;
    use calamine::{open_workbook_auto_from_rs, Data, Reader};
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use std::io::Cursor;

    fn document(file_type: FileType) -> AnalysisDocument {
        AnalysisDocument {
            sheet_name: "Flights".into(),
            file_type,
            columns: vec![],
            rows: vec![],
            stats: SheetStats {
                total_flights: 3,
                unique_operators: 2,
                top_operator: Some("Air A".into()),
                total_udf_charges: 30.0,
                total_operators: 7,
                ..SheetStats::default()
            },
            summary: BTreeMap::new(),
            chart_bar: "PHN2Zz48L3N2Zz4=".into(),
            chart_pie: String::new(),
            formal_summary: "The analysis of 'Flights' shows 3 records.".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 10, 19, 10, 30, 0).unwrap(),
            total_records: 3,
        }
    }

    fn cells(bytes: Vec<u8>) -> Vec<Vec<String>> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).unwrap();
        let range = workbook.worksheet_range("Dashboard").unwrap();
        range
            .rows()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Data::String(s) => s.clone(),
                        Data::Empty => String::new(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .collect()
    }

    fn column_a(grid: &[Vec<String>]) -> Vec<&str> {
        grid.iter()
            .map(|row| row.first().map(String::as_str).unwrap_or(""))
            .collect()
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("total_udf_charges"), "Total Udf Charges");
        assert_eq!(title_case("avg_airtime"), "Avg Airtime");
    }

    #[test]
    fn test_departure_report_layout() {
        let generated = Utc.with_ymd_and_hms(2026, 10, 19, 10, 30, 0).unwrap();
        let grid = cells(build_report(&document(FileType::Departure), generated).unwrap());
        let a = column_a(&grid);

        assert_eq!(a[0], "Flights Dashboard Report");
        assert_eq!(a[1], "Generated on: 2026-10-19 16:00:00 IST");
        assert_eq!(a[3], "Summary");
        assert_eq!(a[4], "The analysis of 'Flights' shows 3 records.");
        assert_eq!(grid[6][..2], ["Statistic".to_string(), "Value".to_string()]);
        assert_eq!(grid[7][..2], ["Total Flights".to_string(), "3".to_string()]);
        assert!(grid.iter().any(|r| r[0] == "Top Operator" && r[1] == "Air A"));
        assert!(!a.contains(&"Total Operators"));

        assert!(a.contains(&"Bar Chart"));
        assert!(a.contains(&"Bar Chart Image Placeholder"));
        assert!(!a.contains(&"Pie Chart"));
    }

    #[test]
    fn test_base_report_lists_base_stats() {
        let generated = Utc.with_ymd_and_hms(2026, 10, 19, 10, 30, 0).unwrap();
        let grid = cells(build_report(&document(FileType::Base), generated).unwrap());
        let a = column_a(&grid);
        assert!(grid.iter().any(|r| r[0] == "Total Operators" && r[1] == "7"));
        assert!(!a.contains(&"Total Flights"));
    }

    #[tokio::test]
    async fn test_dashboard_report_from_store() {
        let store = MemoryDocumentStore::new();
        store
            .put_analysis("doc-1", &document(FileType::Departure))
            .await
            .unwrap();
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 10, 19, 10, 30, 0).unwrap());

        let report = dashboard_report(&store, "doc-1", &clock).await.unwrap();
        assert_eq!(report.filename, "dashboard_doc-1.xlsx");
        assert_eq!(&report.bytes[..2], b"PK");

        let err = dashboard_report(&store, "missing", &clock).await.unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
    }
}
