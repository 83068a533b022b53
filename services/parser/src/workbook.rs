//! Sheet processing: workbook bytes in, persisted analyses and a per-sheet
//! report out.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::charts;
use crate::clock::ProcessingRun;
use crate::columns::normalize_header_row;
use crate::enrich::{enrich_base, enrich_flight};
use crate::error::{SheetError, WorkbookError};
use crate::persist::Persister;
use crate::raw::{read_workbook, Cell, ColumnIndex, RawSheet};
use crate::records::{BaseRecord, FileType, FlightRecord, Record};
use crate::stats::{self, SheetStats};
use crate::store::AnalysisDocument;

/// Records kept inline in the analysis document and the API report.
pub const SAMPLE_ROWS: usize = 100;

// =============================================================================
// REPORT TYPES
// =============================================================================

/// Trimmed, stringified view of one processed sheet.
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct SheetReport {
    pub sheet_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<BTreeMap<String, String>>,
    pub stats: BTreeMap<String, String>,
    pub summary: BTreeMap<String, String>,
    pub chart_bar: String,
    pub chart_pie: String,
    pub formal_summary: String,
    pub doc_id: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetOutcome {
    Processed(Box<SheetReport>),
    Failed { error: String },
}

impl SheetOutcome {
    pub fn doc_id(&self) -> Option<&str> {
        match self {
            SheetOutcome::Processed(report) => Some(&report.doc_id),
            SheetOutcome::Failed { .. } => None,
        }
    }
}

/// Outcome of every sheet, in workbook order. Serializes as an object keyed
/// by sheet name.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookReport {
    pub file_type: FileType,
    pub sheets: Vec<(String, SheetOutcome)>,
}

impl WorkbookReport {
    pub fn has_errors(&self) -> bool {
        self.sheets
            .iter()
            .any(|(_, outcome)| matches!(outcome, SheetOutcome::Failed { .. }))
    }

    /// Document id of the first processed sheet.
    pub fn first_doc_id(&self) -> Option<&str> {
        self.sheets.iter().find_map(|(_, outcome)| outcome.doc_id())
    }

    pub fn sheet(&self, name: &str) -> Option<&SheetOutcome> {
        self.sheets
            .iter()
            .find(|(sheet, _)| sheet == name)
            .map(|(_, outcome)| outcome)
    }
}

impl Serialize for WorkbookReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sheets.len()))?;
        for (name, outcome) in &self.sheets {
            map.serialize_entry(name, outcome)?;
        }
        map.end()
    }
}

// =============================================================================
// SHEET PREPARATION
// =============================================================================

/// Everything needed to persist one sheet.
#[derive(Debug, Clone)]
pub struct PreparedSheet {
    pub doc_id: String,
    pub document: AnalysisDocument,
    pub records: Vec<Record>,
}

impl PreparedSheet {
    fn report(&self) -> SheetReport {
        SheetReport {
            sheet_name: self.document.sheet_name.clone(),
            columns: self.document.columns.clone(),
            rows: self.document.rows.iter().map(stats::stringify).collect(),
            stats: stats::stringify(&self.document.stats),
            summary: stats::stringify(&self.document.summary),
            chart_bar: self.document.chart_bar.clone(),
            chart_pie: self.document.chart_pie.clone(),
            formal_summary: self.document.formal_summary.clone(),
            doc_id: self.doc_id.clone(),
        }
    }
}

struct Analysis {
    columns: Vec<String>,
    records: Vec<Record>,
    stats: SheetStats,
    summary: BTreeMap<String, stats::ColumnSummary>,
    bar: Option<charts::ChartData>,
    pie: Option<charts::ChartData>,
}

fn analyze_flights(
    sheet: &str,
    index: &ColumnIndex,
    rows: &[Vec<Cell>],
    run: &ProcessingRun,
) -> Analysis {
    let flights: Vec<FlightRecord> = rows
        .iter()
        .map(|cells| enrich_flight(&index.row(cells), run.next_seq(), run))
        .collect();

    Analysis {
        columns: FlightRecord::COLUMNS.iter().map(|c| c.to_string()).collect(),
        stats: stats::flight_stats(&flights),
        summary: stats::flight_summary(&flights),
        bar: charts::departure_bar(sheet, &flights),
        pie: charts::departure_pie(sheet, &flights),
        records: flights.into_iter().map(Record::Flight).collect(),
    }
}

fn analyze_customers(sheet: &str, index: &ColumnIndex, rows: &[Vec<Cell>]) -> Analysis {
    let has_registration = index.contains("Reg_No");
    let customers: Vec<BaseRecord> = rows
        .iter()
        .map(|cells| enrich_base(&index.row(cells), has_registration))
        .collect();

    let mut columns: Vec<String> = BaseRecord::KNOWN_COLUMNS
        .iter()
        .filter(|c| **c != "Reg_No" || has_registration)
        .map(|c| c.to_string())
        .collect();
    columns.extend(
        index
            .names()
            .iter()
            .filter(|name| !BaseRecord::is_known_column(name))
            .cloned(),
    );
    columns.push("file_type".to_string());

    // Charts only when the sheet really has the grouped column.
    let bar = if index.contains("Assessment") {
        charts::base_bar(sheet, &customers)
    } else {
        None
    };
    let pie = if index.contains("Fleet_Count") {
        charts::base_pie(sheet, &customers)
    } else {
        None
    };

    Analysis {
        stats: stats::base_stats(&customers),
        summary: stats::base_summary(&customers, &columns),
        columns,
        bar,
        pie,
        records: customers.into_iter().map(Record::Base).collect(),
    }
}

fn formal_summary(sheet: &str, file_type: FileType, total: usize, distinct: usize) -> String {
    let label = file_type.required_column().replace('_', " ").to_lowercase();
    format!(
        "The analysis of '{}' shows {} records for {} data, with {} {}s.",
        sheet, total, file_type, distinct, label
    )
}

/// Normalize, enrich and aggregate one sheet. Pure: nothing is written.
pub fn prepare_sheet(
    sheet: &RawSheet,
    file_type: FileType,
    run: &ProcessingRun,
) -> Result<PreparedSheet, SheetError> {
    let (header, rows) = sheet.table(file_type.header_row()).ok_or(SheetError::Empty)?;
    if header.is_empty() || rows.is_empty() {
        return Err(SheetError::Empty);
    }

    let index = ColumnIndex::new(normalize_header_row(&header));
    let required = file_type.required_column();
    if !index.contains(required) {
        return Err(SheetError::MissingColumn {
            column: required.to_string(),
            found: index.names().to_vec(),
        });
    }

    let analysis = match file_type {
        FileType::Departure => analyze_flights(&sheet.name, &index, &rows, run),
        FileType::Base => analyze_customers(&sheet.name, &index, &rows),
    };

    let rows: Vec<serde_json::Value> = analysis
        .records
        .iter()
        .take(SAMPLE_ROWS)
        .filter_map(|r| serde_json::to_value(r).ok())
        .collect();

    let document = AnalysisDocument {
        sheet_name: sheet.name.clone(),
        file_type,
        columns: analysis.columns,
        rows,
        formal_summary: formal_summary(
            &sheet.name,
            file_type,
            analysis.records.len(),
            analysis.stats.unique_operators,
        ),
        stats: analysis.stats,
        summary: analysis.summary,
        chart_bar: analysis
            .bar
            .map(|c| charts::encode(&charts::render_bar_svg(&c)))
            .unwrap_or_default(),
        chart_pie: analysis
            .pie
            .map(|c| charts::encode(&charts::render_pie_svg(&c)))
            .unwrap_or_default(),
        timestamp: run.started_at(),
        total_records: analysis.records.len(),
    };

    Ok(PreparedSheet {
        doc_id: run.doc_id(file_type, &sheet.name),
        document,
        records: analysis.records,
    })
}

// =============================================================================
// WORKBOOK
// =============================================================================

/// Process every sheet of a workbook and persist the ones that parse.
///
/// Bad sheets are reported and skipped. A storage failure (after retries)
/// aborts the remaining sheets. Sheets run one at a time on the blocking
/// pool, so record ids follow workbook order.
pub async fn process_workbook(
    bytes: &[u8],
    file_type: FileType,
    filename: &str,
    run: &ProcessingRun,
    persister: &Persister,
) -> Result<WorkbookReport, WorkbookError> {
    info!(filename, %file_type, bytes = bytes.len(), "processing workbook");
    let owned = bytes.to_vec();
    let sheets = tokio::task::spawn_blocking(move || read_workbook(&owned)).await??;

    let mut report = WorkbookReport {
        file_type,
        sheets: Vec::with_capacity(sheets.len()),
    };

    for (name, sheet) in sheets {
        // Decoding, enrichment and chart rendering stay off the async workers.
        let prepared = match sheet {
            Ok(raw) => {
                let run = run.clone();
                tokio::task::spawn_blocking(move || prepare_sheet(&raw, file_type, &run)).await?
            }
            Err(err) => Err(err),
        };
        let outcome = match prepared {
            Ok(prepared) => {
                let sheet_report = prepared.report();
                let PreparedSheet {
                    doc_id,
                    document,
                    records,
                } = prepared;
                persister.persist(&doc_id, &document, records).await?;
                info!(
                    sheet = %name,
                    doc_id = %doc_id,
                    records = document.total_records,
                    "sheet processed"
                );
                SheetOutcome::Processed(Box::new(sheet_report))
            }
            Err(err) => {
                warn!(sheet = %name, filename, error = %err, "sheet skipped");
                SheetOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        report.sheets.push((name, outcome));
    }

    Ok(report)
}
