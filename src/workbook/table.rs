//! Sheet layouts and the merge rules applied when a sheet already exists

use std::collections::{HashMap, HashSet};

use super::{Cell, Sheet};
use crate::models::{FinancialStatement, ValuationMeasures};

pub const METRIC_COLUMN: &str = "Metric";

/// Table with row labels in column A and column headers in row 1.
///
/// This is how statements are laid out: line items down the side, period
/// end dates across the top, and an unused corner cell at A1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledTable {
    pub corner: Cell,
    pub columns: Vec<Cell>,
    pub rows: Vec<(Cell, Vec<Cell>)>,
}

impl LabeledTable {
    pub fn from_statement(statement: &FinancialStatement) -> Self {
        Self {
            corner: Cell::Empty,
            columns: statement.periods.iter().copied().map(Cell::Date).collect(),
            rows: statement
                .line_items
                .iter()
                .map(|item| {
                    let values = item.values.iter().copied().map(Cell::number).collect();
                    (Cell::text(&item.name), values)
                })
                .collect(),
        }
    }

    pub fn from_sheet(sheet: &Sheet) -> Self {
        let header = sheet.header();
        let columns: Vec<Cell> = header.iter().skip(1).cloned().collect();
        let width = columns.len();

        let rows = sheet
            .rows
            .iter()
            .skip(1)
            .filter(|row| row.iter().any(|c| !c.is_empty()))
            .map(|row| {
                let label = row.first().cloned().unwrap_or(Cell::Empty);
                let mut values: Vec<Cell> = row.iter().skip(1).cloned().collect();
                values.resize(width.max(values.len()), Cell::Empty);
                (label, values)
            })
            .collect();

        Self {
            corner: header.first().cloned().unwrap_or(Cell::Empty),
            columns,
            rows,
        }
    }

    pub fn to_sheet(&self, name: &str) -> Sheet {
        let mut rows = Vec::with_capacity(self.rows.len() + 1);

        let mut header = vec![self.corner.clone()];
        header.extend(self.columns.iter().cloned());
        rows.push(header);

        for (label, values) in &self.rows {
            let mut row = vec![label.clone()];
            row.extend(values.iter().cloned());
            rows.push(row);
        }

        Sheet::with_rows(name, rows)
    }

    pub fn column_keys(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.key()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.rows.is_empty()
    }

    /// Append the columns of `incoming` whose names are not present yet.
    ///
    /// Existing cells are never modified. Row labels are matched by key;
    /// labels only known to `incoming` are appended below the existing rows.
    /// Returns the names of the columns that were added.
    pub fn merge_new_columns(&mut self, incoming: &LabeledTable) -> Vec<String> {
        let mut seen: HashSet<String> = self.column_keys().into_iter().collect();
        let added: Vec<usize> = incoming
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| seen.insert(column.key()))
            .map(|(i, _)| i)
            .collect();

        if added.is_empty() {
            return Vec::new();
        }

        let width_before = self.columns.len();
        self.columns
            .extend(added.iter().map(|&i| incoming.columns[i].clone()));
        let width = self.columns.len();

        // cells right of the header (notes typed next to the table) move past the new block
        for (_, values) in self.rows.iter_mut() {
            let trailing = if values.len() > width_before {
                values.split_off(width_before)
            } else {
                values.resize(width_before, Cell::Empty);
                Vec::new()
            };
            values.resize(width, Cell::Empty);
            values.extend(trailing);
        }

        let mut positions: HashMap<String, usize> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, (label, _))| (label.key(), i))
            .collect();

        for (label, values) in &incoming.rows {
            let row = *positions.entry(label.key()).or_insert_with(|| {
                self.rows.push((label.clone(), vec![Cell::Empty; width]));
                self.rows.len() - 1
            });

            let target = &mut self.rows[row].1;
            for (k, &i) in added.iter().enumerate() {
                target[width_before + k] = values.get(i).cloned().unwrap_or(Cell::Empty);
            }
        }

        added.iter().map(|&i| incoming.columns[i].key()).collect()
    }
}

/// Header row followed by records, the layout of price and snapshot sheets
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTable {
    pub headers: Vec<String>,
    pub records: Vec<Vec<Cell>>,
}

impl RecordTable {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: Vec<Cell>) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_sheet(&self, name: &str) -> Sheet {
        let mut rows = Vec::with_capacity(self.records.len() + 1);
        rows.push(self.headers.iter().map(Cell::text).collect());
        rows.extend(self.records.iter().cloned());
        Sheet::with_rows(name, rows)
    }
}

/// Merge valuation measures into an existing metric-keyed sheet.
///
/// "Metric" is always the first column and existing columns keep their
/// order. Incoming columns that are new are appended, and the incoming
/// values overwrite whatever the incoming columns held before. Metrics that
/// are not part of `incoming` are kept. Rows are sorted by metric name.
pub fn merge_metric_rows(existing: Option<&Sheet>, incoming: &ValuationMeasures, name: &str) -> Sheet {
    let mut columns: Vec<String> = vec![METRIC_COLUMN.to_string()];
    let mut rows: HashMap<String, HashMap<String, Cell>> = HashMap::new();

    if let Some(sheet) = existing {
        let header: Vec<String> = sheet.header().iter().map(|c| c.key()).collect();
        let metric_idx = header.iter().position(|h| h == METRIC_COLUMN).unwrap_or(0);

        for column in header.iter().filter(|h| !h.is_empty()) {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }

        for row in sheet.rows.iter().skip(1) {
            let metric = row.get(metric_idx).map(|c| c.key()).unwrap_or_default();
            if metric.is_empty() {
                continue;
            }
            let entry = rows.entry(metric).or_default();
            for (i, column) in header.iter().enumerate() {
                if i == metric_idx || column.is_empty() {
                    continue;
                }
                if let Some(cell) = row.get(i).filter(|c| !c.is_empty()) {
                    entry.insert(column.clone(), cell.clone());
                }
            }
        }
    }

    for column in &incoming.columns {
        if !columns.contains(column) {
            columns.push(column.clone());
        }
    }

    for (metric, values) in &incoming.metrics {
        let entry = rows.entry(metric.clone()).or_default();
        for (i, column) in incoming.columns.iter().enumerate() {
            let value = values.get(i).copied().flatten();
            entry.insert(column.clone(), Cell::number(value));
        }
    }

    let mut metrics: Vec<&String> = rows.keys().collect();
    metrics.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));

    let mut sheet_rows = Vec::with_capacity(metrics.len() + 1);
    sheet_rows.push(columns.iter().map(Cell::text).collect());
    for metric in metrics {
        let values = &rows[metric];
        let mut row = vec![Cell::text(metric.as_str())];
        row.extend(
            columns
                .iter()
                .skip(1)
                .map(|c| values.get(c).cloned().unwrap_or(Cell::Empty)),
        );
        sheet_rows.push(row);
    }

    Sheet::with_rows(name, sheet_rows)
}
