//! Untyped sheet grids read from workbook bytes.

use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use std::collections::HashMap;
use std::io::Cursor;

use crate::error::{SheetError, WorkbookError};

/// Numeric cells beyond this magnitude are treated as missing.
pub const MAX_CELL_MAGNITUDE: f64 = 1e10;

/// One untyped cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Int(i) => Cell::number(*i as f64),
            Data::Float(f) => Cell::number(*f),
            // Excel dates are serial day counts underneath.
            Data::DateTime(dt) => Cell::number(dt.as_f64()),
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Bool(b) => Cell::Bool(*b),
            Data::Error(_) | Data::Empty => Cell::Empty,
        }
    }
}

impl Cell {
    fn number(value: f64) -> Self {
        if value.is_finite() && value.abs() <= MAX_CELL_MAGNITUDE {
            Cell::Number(value)
        } else {
            Cell::Empty
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view of the cell; text is parsed after trimming.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite() && n.abs() <= MAX_CELL_MAGNITUDE),
            Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Cell::Empty => None,
        }
    }

    /// Parse as number, unparseable -> 0.0.
    pub fn to_number(&self) -> f64 {
        self.as_number().unwrap_or(0.0)
    }

    /// Display text of the cell.
    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(n) => format_number(*n),
            Cell::Text(s) => s.clone(),
            Cell::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        }
    }
}

/// Integral values print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// A sheet as an absolute grid: row 0 is the first sheet row even when it is
/// blank, so header offsets stay meaningful.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    pub name: String,
    rows: Vec<Vec<Cell>>,
}

impl RawSheet {
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn from_range(name: impl Into<String>, range: &Range<Data>) -> Self {
        let rows = match range.end() {
            Some((end_row, end_col)) => (0..=end_row)
                .map(|r| {
                    (0..=end_col)
                        .map(|c| range.get_value((r, c)).map(Cell::from).unwrap_or(Cell::Empty))
                        .collect()
                })
                .collect(),
            None => Vec::new(),
        };
        Self::from_rows(name, rows)
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Header cells at `header_row` and the non-blank rows beneath it.
    /// Columns that have neither a header nor any data are dropped.
    pub fn table(&self, header_row: usize) -> Option<(Vec<Cell>, Vec<Vec<Cell>>)> {
        let header = self.rows.get(header_row)?;
        let body: Vec<&Vec<Cell>> = self
            .rows
            .iter()
            .skip(header_row + 1)
            .filter(|row| !row.iter().all(Cell::is_blank))
            .collect();

        let keep: Vec<usize> = (0..header.len())
            .filter(|&c| {
                !header[c].is_blank()
                    || body
                        .iter()
                        .any(|row| row.get(c).is_some_and(|cell| !cell.is_blank()))
            })
            .collect();

        let header_cells = keep.iter().map(|&c| header[c].clone()).collect();
        let rows = body
            .into_iter()
            .map(|row| {
                keep.iter()
                    .map(|&c| row.get(c).cloned().unwrap_or(Cell::Empty))
                    .collect()
            })
            .collect();

        Some((header_cells, rows))
    }
}

/// Decode workbook bytes (xlsx, xls, xlsb or ods) into one grid per sheet.
/// A sheet that cannot be read is reported in place, not dropped.
pub fn read_workbook(
    bytes: &[u8],
) -> Result<Vec<(String, Result<RawSheet, SheetError>)>, WorkbookError> {
    if bytes.is_empty() {
        return Err(WorkbookError::EmptyStream);
    }

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| WorkbookError::Unreadable(e.to_string()))?;

    let sheet_names = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(WorkbookError::NoSheets);
    }

    Ok(sheet_names
        .into_iter()
        .map(|name| {
            let sheet = workbook
                .worksheet_range(&name)
                .map(|range| RawSheet::from_range(name.clone(), &range))
                .map_err(|e| SheetError::Unreadable(e.to_string()));
            (name, sheet)
        })
        .collect())
}

/// Canonical column names of one sheet and where to find them.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn new(names: Vec<String>) -> Self {
        let positions = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self { names, positions }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn row<'a>(&'a self, cells: &'a [Cell]) -> RowView<'a> {
        RowView {
            index: self,
            cells,
        }
    }
}

/// Named access into one data row. Missing columns read as empty cells.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    index: &'a ColumnIndex,
    cells: &'a [Cell],
}

static EMPTY: Cell = Cell::Empty;

impl<'a> RowView<'a> {
    pub fn get(&self, column: &str) -> &'a Cell {
        self.index
            .positions
            .get(column)
            .and_then(|&i| self.cells.get(i))
            .unwrap_or(&EMPTY)
    }

    pub fn number(&self, column: &str) -> f64 {
        self.get(column).to_number()
    }

    pub fn text(&self, column: &str) -> String {
        self.get(column).text()
    }

    /// Text of a non-blank cell, `None` otherwise.
    pub fn non_blank(&self, column: &str) -> Option<String> {
        let cell = self.get(column);
        (!cell.is_blank()).then(|| cell.text())
    }

    /// Pairs of (column name, cell) in sheet order.
    pub fn entries(&self) -> impl Iterator<Item = (&'a str, &'a Cell)> + 'a {
        let cells = self.cells;
        self.index
            .names
            .iter()
            .enumerate()
            .map(move |(i, name)| (name.as_str(), cells.get(i).unwrap_or(&EMPTY)))
    }
}
