//! In-memory spreadsheet model
//!
//! Workbooks are read with calamine (xlsx, xls, ods) and written back as
//! `.xlsx` with rust_xlsxwriter. Writing always goes through a temporary
//! sibling file that is renamed over the target, so an interrupted run never
//! leaves a half-written workbook behind.

use calamine::{Data, Range, Reader};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_xlsxwriter::{ExcelDateTime, Format, Formula, XlsxError};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub mod table;
pub use table::{merge_metric_rows, LabeledTable, RecordTable};

#[derive(Debug, thiserror::Error)]
pub enum WorkbookError {
    #[error("failed to read workbook: {0}")]
    Read(#[from] calamine::Error),

    #[error("failed to write workbook: {0}")]
    Write(#[from] XlsxError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sheet '{sheet}' exceeds spreadsheet limits")]
    TooLarge { sheet: String },
}

/// Single spreadsheet cell value
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// Formula text without the leading `=`; recalculated by the spreadsheet application
    Formula(String),
}

static EMPTY: Cell = Cell::Empty;

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn formula(text: &str) -> Self {
        Cell::Formula(text.trim().trim_start_matches('=').to_string())
    }

    pub fn number(value: Option<f64>) -> Self {
        value.map_or(Cell::Empty, Cell::Number)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Canonical form used to compare column names and row labels.
    ///
    /// A date and a datetime at midnight share the same key, so a period
    /// header survives a round trip through any spreadsheet editor.
    pub fn key(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Bool(b) => b.to_string(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::DateTime(dt) if dt.time() == NaiveTime::MIN => dt.date().format("%Y-%m-%d").to_string(),
            Cell::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Cell::Formula(f) => format!("={}", f),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::String(s) if s.is_empty() => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(dt) if dt.time() == NaiveTime::MIN => Cell::Date(dt.date()),
                Some(dt) => Cell::DateTime(dt),
                None => Cell::Number(dt.as_f64()),
            },
            Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .map(Cell::DateTime)
                .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Cell::Date))
                .unwrap_or_else(|_| Cell::Text(s.clone())),
            _ => Cell::Empty,
        }
    }
}

/// Named grid of cells, row-major, starting at A1
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn with_rows(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn header(&self) -> &[Cell] {
        self.rows.first().map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// Same cell contents, ignoring trailing blanks and how values are stored
    pub fn same_content(&self, other: &Sheet) -> bool {
        fn trimmed(sheet: &Sheet) -> Vec<Vec<String>> {
            let mut rows: Vec<Vec<String>> = sheet
                .rows
                .iter()
                .map(|row| {
                    let mut keys: Vec<String> = row.iter().map(|c| c.key()).collect();
                    while keys.last().map_or(false, |k| k.is_empty()) {
                        keys.pop();
                    }
                    keys
                })
                .collect();
            while rows.last().map_or(false, |r| r.is_empty()) {
                rows.pop();
            }
            rows
        }

        self.name == other.name && trimmed(self) == trimmed(other)
    }

    /// (rows, columns) actually used
    pub fn dimensions(&self) -> (usize, usize) {
        let cols = self.rows.iter().map(|r| r.len()).max().unwrap_or(0);
        (self.rows.len(), cols)
    }

    fn from_range(name: String, range: &Range<Data>) -> Self {
        let Some((start_row, start_col)) = range.start() else {
            return Sheet::new(name);
        };

        let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row as usize];
        for row in range.rows() {
            let mut cells = vec![Cell::Empty; start_col as usize];
            cells.extend(row.iter().map(Cell::from));
            while cells.last().map_or(false, |c| c.is_empty()) {
                cells.pop();
            }
            rows.push(cells);
        }
        while rows.last().map_or(false, |r| r.is_empty()) {
            rows.pop();
        }

        Sheet { name, rows }
    }

    /// Put formulas back over their cached values
    fn overlay_formulas(&mut self, formulas: &Range<String>) {
        let Some((start_row, start_col)) = formulas.start() else {
            return;
        };

        for (r, c, formula) in formulas.used_cells() {
            if formula.trim().is_empty() {
                continue;
            }
            let (r, c) = (start_row as usize + r, start_col as usize + c);
            if self.rows.len() <= r {
                self.rows.resize(r + 1, Vec::new());
            }
            let row = &mut self.rows[r];
            if row.len() <= c {
                row.resize(c + 1, Cell::Empty);
            }
            row[c] = Cell::formula(formula);
        }
    }
}

/// How `Workbook::open_or_recreate` obtained its workbook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// No file existed yet
    Created,
    /// Existing file read successfully
    Loaded,
    /// Existing file was unreadable and is replaced by an empty workbook
    Recreated,
}

/// Ordered collection of sheets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every sheet of an existing spreadsheet file
    pub fn open(path: &Path) -> Result<Self, WorkbookError> {
        let mut source = calamine::open_workbook_auto(path)?;
        let mut sheets = Vec::new();

        for name in source.sheet_names() {
            let range = source.worksheet_range(&name)?;
            let mut sheet = Sheet::from_range(name, &range);
            match source.worksheet_formula(&sheet.name) {
                Ok(formulas) => sheet.overlay_formulas(&formulas),
                Err(e) => debug!("No formulas read from '{}': {}", sheet.name, e),
            }
            sheets.push(sheet);
        }

        debug!("Loaded {} sheets from {}", sheets.len(), path.display());
        Ok(Self { sheets })
    }

    /// Open `path`, starting from an empty workbook when it is missing or corrupted
    pub fn open_or_recreate(path: &Path) -> (Self, OpenOutcome) {
        if !path.exists() {
            return (Self::new(), OpenOutcome::Created);
        }

        match Self::open(path) {
            Ok(book) => (book, OpenOutcome::Loaded),
            Err(e) => {
                warn!("⚠️ {} is missing or corrupted ({}). Re-creating it.", path.display(), e);
                (Self::new(), OpenOutcome::Recreated)
            }
        }
    }

    /// Whether `path` holds a readable spreadsheet
    pub fn is_valid_file(path: &Path) -> bool {
        path.exists() && Self::open(path).is_ok()
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Replace the sheet with the same name in place, or append it
    pub fn put_sheet(&mut self, sheet: Sheet) {
        match self.sheets.iter_mut().find(|s| s.name == sheet.name) {
            Some(existing) => *existing = sheet,
            None => self.sheets.push(sheet),
        }
    }

    /// Write the workbook as `.xlsx`, replacing `path` atomically
    pub fn save(&self, path: &Path) -> Result<(), WorkbookError> {
        let mut book = rust_xlsxwriter::Workbook::new();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let datetime_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");

        for sheet in &self.sheets {
            let worksheet = book.add_worksheet();
            worksheet.set_name(&sheet.name)?;

            for (r, row) in sheet.rows.iter().enumerate() {
                let too_large = || WorkbookError::TooLarge { sheet: sheet.name.clone() };
                let r = u32::try_from(r).map_err(|_| too_large())?;

                for (c, cell) in row.iter().enumerate() {
                    let c = u16::try_from(c).map_err(|_| too_large())?;
                    match cell {
                        Cell::Empty => {}
                        Cell::Text(s) => {
                            worksheet.write_string(r, c, s)?;
                        }
                        Cell::Number(n) if n.is_finite() => {
                            worksheet.write_number(r, c, *n)?;
                        }
                        Cell::Number(_) => {}
                        Cell::Bool(b) => {
                            worksheet.write_boolean(r, c, *b)?;
                        }
                        Cell::Date(d) => {
                            worksheet.write_datetime_with_format(r, c, &excel_date(d)?, &date_format)?;
                        }
                        Cell::DateTime(dt) => {
                            let value = excel_date(&dt.date())?.and_hms(
                                dt.hour() as u16,
                                dt.minute() as u8,
                                dt.second() as f64,
                            )?;
                            worksheet.write_datetime_with_format(r, c, &value, &datetime_format)?;
                        }
                        Cell::Formula(f) => {
                            worksheet.write_formula(r, c, Formula::new(format!("={}", f)))?;
                        }
                    }
                }
            }
        }

        // an xlsx file needs at least one worksheet
        if self.sheets.is_empty() {
            book.add_worksheet();
        }

        let buffer = book.save_to_buffer()?;
        let tmp = temp_path(path);
        std::fs::write(&tmp, buffer)?;
        std::fs::rename(&tmp, path)?;
        debug!("Saved {} sheets to {}", self.sheets.len(), path.display());
        Ok(())
    }
}

fn excel_date(date: &NaiveDate) -> Result<ExcelDateTime, XlsxError> {
    ExcelDateTime::from_ymd(date.year() as u16, date.month() as u8, date.day() as u8)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
