//! Per-sheet aggregate statistics and descriptive summaries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::records::{BaseRecord, BillStatus, FlightRecord};

/// Headline numbers stored with every analysis. Fields that do not apply to
/// a file type stay at zero (or null for `top_operator`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetStats {
    pub total_flights: usize,
    pub unique_operators: usize,
    pub top_operator: Option<String>,
    pub avg_airtime: f64,
    pub arr_billed_count: usize,
    pub dep_billed_count: usize,
    pub udf_billed_count: usize,
    pub arr_unbilled_count: usize,
    pub dep_unbilled_count: usize,
    pub udf_unbilled_count: usize,
    pub total_landing_charges: f64,
    pub total_parking_charges: f64,
    pub total_open_parking_charges: f64,
    pub total_housing_charges: f64,
    pub total_rnfc_charges: f64,
    pub total_tnlc_charges: f64,
    pub total_arr_watch_charges: f64,
    pub total_dep_watch_charges: f64,
    pub total_counter_charges: f64,
    pub total_xray_charges: f64,
    pub total_udf_charges: f64,
    pub total_operators: usize,
    pub total_assessment: f64,
    pub total_realisation: f64,
    pub total_closing_balance: f64,
}

/// Distinct values and the most frequent one. Ties go to the value seen first.
fn distinct_and_top<'a>(values: impl Iterator<Item = &'a str>) -> (usize, Option<String>) {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, value) in values.enumerate() {
        counts.entry(value).or_insert((0, position)).0 += 1;
    }
    let top = counts
        .iter()
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
        .map(|(value, _)| value.to_string());
    (counts.len(), top)
}

fn split_status(statuses: impl Iterator<Item = BillStatus>) -> (usize, usize) {
    statuses.fold((0, 0), |(billed, unbilled), s| {
        if s.is_billed() {
            (billed + 1, unbilled)
        } else {
            (billed, unbilled + 1)
        }
    })
}

pub fn flight_stats(records: &[FlightRecord]) -> SheetStats {
    let (unique_operators, top_operator) =
        distinct_and_top(records.iter().map(|r| r.operator_name.as_str()));
    let (arr_billed_count, arr_unbilled_count) = split_status(records.iter().map(|r| r.arr_bill_status));
    let (dep_billed_count, dep_unbilled_count) = split_status(records.iter().map(|r| r.dep_bill_status));
    let (udf_billed_count, udf_unbilled_count) = split_status(records.iter().map(|r| r.udf_bill_status));

    let sum = |f: fn(&FlightRecord) -> f64| records.iter().map(f).sum::<f64>();
    let avg_airtime = if records.is_empty() {
        0.0
    } else {
        sum(|r| r.airtime_hours) / records.len() as f64
    };

    SheetStats {
        total_flights: records.len(),
        unique_operators,
        top_operator,
        avg_airtime,
        arr_billed_count,
        dep_billed_count,
        udf_billed_count,
        arr_unbilled_count,
        dep_unbilled_count,
        udf_unbilled_count,
        total_landing_charges: sum(|r| r.charges.landing),
        total_parking_charges: sum(|r| r.charges.parking),
        total_open_parking_charges: sum(|r| r.charges.open_parking),
        total_housing_charges: sum(|r| r.charges.housing),
        total_rnfc_charges: sum(|r| r.charges.rnfc),
        total_tnlc_charges: sum(|r| r.charges.tnlc),
        total_arr_watch_charges: sum(|r| r.charges.arr_watch),
        total_dep_watch_charges: sum(|r| r.charges.dep_watch),
        total_counter_charges: sum(|r| r.charges.counter),
        total_xray_charges: sum(|r| r.charges.xray),
        total_udf_charges: sum(|r| r.charges.udf_charge),
        ..SheetStats::default()
    }
}

pub fn base_stats(records: &[BaseRecord]) -> SheetStats {
    let (unique_operators, top_operator) =
        distinct_and_top(records.iter().map(|r| r.customer_name.as_str()));
    let sum = |f: fn(&BaseRecord) -> f64| records.iter().map(f).sum::<f64>();

    SheetStats {
        unique_operators,
        top_operator,
        total_operators: unique_operators,
        total_assessment: sum(|r| r.assessment),
        total_realisation: sum(|r| r.realisation),
        total_closing_balance: sum(|r| r.closing_balance),
        ..SheetStats::default()
    }
}

// =============================================================================
// DESCRIPTIVE SUMMARY
// =============================================================================

/// count / mean / std / min / quartiles / max of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; undefined for a single value.
    pub std: Option<f64>,
    pub min: f64,
    #[serde(rename = "25%")]
    pub p25: f64,
    #[serde(rename = "50%")]
    pub p50: f64,
    #[serde(rename = "75%")]
    pub p75: f64,
    pub max: f64,
}

// Linear interpolation between closest ranks.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

pub fn summarize(values: &[f64]) -> Option<ColumnSummary> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let std = (count > 1).then(|| {
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    });

    Some(ColumnSummary {
        count,
        mean,
        std,
        min: sorted[0],
        p25: quantile(&sorted, 0.25),
        p50: quantile(&sorted, 0.5),
        p75: quantile(&sorted, 0.75),
        max: sorted[count - 1],
    })
}

/// Summaries for the charge, passenger and rate columns.
pub fn flight_summary(records: &[FlightRecord]) -> BTreeMap<String, ColumnSummary> {
    let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for record in records {
        for (name, value) in record.charges.entries() {
            columns.entry(name.to_string()).or_default().push(value);
        }
    }
    columns
        .into_iter()
        .filter_map(|(name, values)| summarize(&values).map(|s| (name, s)))
        .collect()
}

/// Summaries for every numeric base column present in the sheet. Carried
/// columns count as numeric when all their non-null values are numbers.
pub fn base_summary(records: &[BaseRecord], columns: &[String]) -> BTreeMap<String, ColumnSummary> {
    let mut summary = BTreeMap::new();
    for column in columns {
        let values: Option<Vec<f64>> = records
            .iter()
            .filter_map(|r| match r.numeric(column) {
                Some(v) => Some(Some(v)),
                None => match r.extra.get(column) {
                    None | Some(Value::Null) => None,
                    Some(Value::Number(n)) => Some(n.as_f64()),
                    Some(_) => Some(None),
                },
            })
            .collect();
        if let Some(s) = values.as_deref().and_then(summarize) {
            summary.insert(column.clone(), s);
        }
    }
    summary
}

/// Flatten any serializable map-like value into string values for the
/// trimmed API report. Null becomes the empty string.
pub fn stringify<T: Serialize>(value: &T) -> BTreeMap<String, String> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .map(|(k, v)| {
                let text = match v {
                    Value::Null => String::new(),
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, text)
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}
