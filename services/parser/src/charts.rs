//! Chart payloads for an analysis: grouped data plus a small SVG rendering,
//! stored base64-encoded so clients can inline it as an image.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;
use std::fmt::Write as _;

use crate::raw::format_number;
use crate::records::{BaseRecord, FlightRecord};

const TOP_N: usize = 5;
const PALETTE: &[&str] = &["#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub points: Vec<(String, f64)>,
}

impl ChartData {
    fn new(title: String, x_label: &str, y_label: &str, points: Vec<(String, f64)>) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(Self {
            title,
            x_label: x_label.to_string(),
            y_label: y_label.to_string(),
            points,
        })
    }
}

// =============================================================================
// GROUPING
// =============================================================================

/// Count occurrences, most frequent first; ties keep first-seen order.
fn value_counts(values: impl Iterator<Item = String>) -> Vec<(String, f64)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in values {
        let count = counts.entry(value.clone()).or_insert(0);
        if *count == 0 {
            order.push(value);
        }
        *count += 1;
    }
    let mut ranked: Vec<(String, f64)> = order
        .into_iter()
        .map(|v| {
            let n = counts.get(&v).copied().unwrap_or(0) as f64;
            (v, n)
        })
        .collect();
    // stable sort keeps first-seen order among equal counts
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(TOP_N);
    ranked
}

/// Landing charges summed per operator, operators in sorted order.
pub fn departure_bar(sheet: &str, records: &[FlightRecord]) -> Option<ChartData> {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for record in records {
        *totals.entry(record.operator_name.as_str()).or_insert(0.0) += record.charges.landing;
    }
    let points = totals.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    ChartData::new(
        format!("Total Landings by Operator - {}", sheet),
        "Operator Name",
        "Total Landings",
        points,
    )
}

/// The five customers with the largest total assessment.
pub fn base_bar(sheet: &str, records: &[BaseRecord]) -> Option<ChartData> {
    let mut order: Vec<&str> = Vec::new();
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for record in records {
        let name = record.customer_name.as_str();
        if !totals.contains_key(name) {
            order.push(name);
        }
        *totals.entry(name).or_insert(0.0) += record.assessment;
    }
    let mut points: Vec<(String, f64)> = order
        .into_iter()
        .map(|name| (name.to_string(), totals.get(name).copied().unwrap_or(0.0)))
        .collect();
    points.sort_by(|a, b| b.1.total_cmp(&a.1));
    points.truncate(TOP_N);
    ChartData::new(
        format!("Top 5 Customers by Assessment - {}", sheet),
        "Customer Name",
        "Total Assessment",
        points,
    )
}

pub fn departure_pie(sheet: &str, records: &[FlightRecord]) -> Option<ChartData> {
    let points = value_counts(records.iter().map(|r| r.aircraft_type.clone()));
    ChartData::new(
        format!("Aircraft Type Distribution - {}", sheet),
        "Aircraft Type",
        "Flights",
        points,
    )
}

pub fn base_pie(sheet: &str, records: &[BaseRecord]) -> Option<ChartData> {
    let points = value_counts(records.iter().map(|r| format_number(r.fleet_count)));
    ChartData::new(
        format!("Fleet Count Distribution - {}", sheet),
        "Fleet Count",
        "Customers",
        points,
    )
}

// =============================================================================
// RENDERING
// =============================================================================

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn render_bar_svg(chart: &ChartData) -> String {
    const WIDTH: f64 = 800.0;
    const HEIGHT: f64 = 480.0;
    const LEFT: f64 = 80.0;
    const BOTTOM: f64 = 130.0;
    const TOP: f64 = 50.0;

    let plot_w = WIDTH - LEFT - 20.0;
    let plot_h = HEIGHT - TOP - BOTTOM;
    let max = chart.points.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let scale = if max > 0.0 { plot_h / max } else { 0.0 };
    let slot = plot_w / chart.points.len() as f64;
    let baseline = TOP + plot_h;

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif">"#,
        w = WIDTH,
        h = HEIGHT
    );
    let _ = write!(
        svg,
        r#"<text x="{}" y="30" text-anchor="middle" font-size="18">{}</text>"#,
        WIDTH / 2.0,
        escape(&chart.title)
    );
    let _ = write!(
        svg,
        r#"<line x1="{left}" y1="{baseline}" x2="{}" y2="{baseline}" stroke="black"/>"#,
        LEFT + plot_w,
        left = LEFT
    );

    for (i, (label, value)) in chart.points.iter().enumerate() {
        let bar_h = value.max(0.0) * scale;
        let x = LEFT + slot * i as f64 + slot * 0.15;
        let label_x = LEFT + slot * (i as f64 + 0.5);
        let _ = write!(
            svg,
            r#"<rect x="{x:.1}" y="{:.1}" width="{:.1}" height="{bar_h:.1}" fill="skyblue"/>"#,
            baseline - bar_h,
            slot * 0.7
        );
        let _ = write!(
            svg,
            r#"<text x="{label_x:.1}" y="{:.1}" font-size="11" text-anchor="end" transform="rotate(-45 {label_x:.1} {:.1})">{}</text>"#,
            baseline + 14.0,
            baseline + 14.0,
            escape(label)
        );
    }

    let _ = write!(
        svg,
        r#"<text x="{}" y="{}" text-anchor="middle" font-size="13">{}</text>"#,
        LEFT + plot_w / 2.0,
        HEIGHT - 10.0,
        escape(&chart.x_label)
    );
    let _ = write!(
        svg,
        r#"<text x="20" y="{y}" text-anchor="middle" font-size="13" transform="rotate(-90 20 {y})">{}</text>"#,
        escape(&chart.y_label),
        y = TOP + plot_h / 2.0
    );
    svg.push_str("</svg>");
    svg
}

pub fn render_pie_svg(chart: &ChartData) -> String {
    const SIZE: f64 = 480.0;
    let (cx, cy, r) = (SIZE / 2.0, SIZE / 2.0 + 15.0, 170.0);
    let total: f64 = chart.points.iter().map(|(_, v)| *v).sum();

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}" font-family="sans-serif">"#,
        size = SIZE
    );
    let _ = write!(
        svg,
        r#"<text x="{cx}" y="30" text-anchor="middle" font-size="18">{}</text>"#,
        escape(&chart.title)
    );

    // Start at twelve o'clock.
    let mut angle = -PI / 2.0;
    for (i, (label, value)) in chart.points.iter().enumerate() {
        let share = if total > 0.0 { value / total } else { 0.0 };
        let color = PALETTE[i % PALETTE.len()];
        if share >= 1.0 {
            let _ = write!(svg, r#"<circle cx="{cx}" cy="{cy}" r="{r}" fill="{color}"/>"#);
        } else if share > 0.0 {
            let end = angle + share * 2.0 * PI;
            let large = if share > 0.5 { 1 } else { 0 };
            let _ = write!(
                svg,
                r#"<path d="M {cx} {cy} L {:.2} {:.2} A {r} {r} 0 {large} 1 {:.2} {:.2} Z" fill="{color}"/>"#,
                cx + r * angle.cos(),
                cy + r * angle.sin(),
                cx + r * end.cos(),
                cy + r * end.sin()
            );
            let mid = angle + share * PI;
            angle = end;
            let _ = write!(
                svg,
                r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" font-size="12">{:.1}%</text>"#,
                cx + r * 0.6 * mid.cos(),
                cy + r * 0.6 * mid.sin(),
                share * 100.0
            );
        }
        let _ = write!(
            svg,
            r#"<text x="10" y="{}" font-size="12" fill="{color}">{}</text>"#,
            60.0 + 16.0 * i as f64,
            escape(label)
        );
    }
    svg.push_str("</svg>");
    svg
}

/// Base64 payload as stored in `chart_bar` / `chart_pie`.
pub fn encode(svg: &str) -> String {
    STANDARD.encode(svg.as_bytes())
}
