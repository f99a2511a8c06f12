//! Pluggable per-row actions and the analyzer that drives them

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt::Display;
use std::io::Write;

use crate::domain::entities::CsvRow;
use crate::domain::repositories::{CsvError, CsvReader};
use crate::domain::utils::slice;

/// Outcome of an action once every row has been seen
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Integer(i128),
    Float(f64),
    Values(Vec<String>),
    Flag(bool),
    Rows(Vec<CsvRow>),
    Missing,
}

impl std::fmt::Display for ActionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionResult::Integer(v) => write!(f, "{}", v),
            ActionResult::Float(v) => write!(f, "{}", v),
            ActionResult::Values(values) => write!(f, "{}", values.join(", ")),
            ActionResult::Flag(v) => write!(f, "{}", v),
            ActionResult::Rows(rows) => write!(f, "{} rows", rows.len()),
            ActionResult::Missing => f.write_str("-"),
        }
    }
}

/// Work done on every row of a file during one pass
pub trait Action {
    fn accept_row(&mut self, row: &CsvRow) -> Result<(), CsvError>;

    /// Called once after the last row
    fn finish(&mut self) -> Result<(), CsvError> {
        Ok(())
    }

    fn result(&self) -> ActionResult;
}

fn parse_integer(row: &CsvRow, column: usize) -> Result<i128, CsvError> {
    let value = row.get(column)?;
    value.parse().map_err(|_| {
        CsvError::broken(format!(
            "'{}' in row {} column {} is not an integer",
            value, row.index, column
        ))
    })
}

/// Sum of an integer column
pub struct SumAction {
    column: usize,
    sum: i128,
}

impl SumAction {
    pub fn new(column: usize) -> Self {
        Self { column, sum: 0 }
    }
}

impl Action for SumAction {
    fn accept_row(&mut self, row: &CsvRow) -> Result<(), CsvError> {
        let value = parse_integer(row, self.column)?;
        self.sum = self
            .sum
            .checked_add(value)
            .ok_or_else(|| CsvError::broken(format!("sum overflow at row {}", row.index)))?;
        Ok(())
    }

    fn result(&self) -> ActionResult {
        ActionResult::Integer(self.sum)
    }
}

/// Arithmetic mean of an integer column
pub struct AverageAction {
    sum: SumAction,
    count: u64,
}

impl AverageAction {
    pub fn new(column: usize) -> Self {
        Self {
            sum: SumAction::new(column),
            count: 0,
        }
    }
}

impl Action for AverageAction {
    fn accept_row(&mut self, row: &CsvRow) -> Result<(), CsvError> {
        self.sum.accept_row(row)?;
        self.count += 1;
        Ok(())
    }

    fn result(&self) -> ActionResult {
        if self.count == 0 {
            return ActionResult::Float(0.0);
        }
        // Split so huge sums keep their precision before the cast
        let count = self.count as i128;
        let quotient = self.sum.sum / count;
        let remainder = self.sum.sum % count;
        ActionResult::Float(quotient as f64 + remainder as f64 / count as f64)
    }
}

/// The `n` greatest values of a column, greatest first
pub struct MaxValuesAction<T: Ord> {
    column: usize,
    limit: usize,
    parse: fn(&CsvRow, usize) -> Result<T, CsvError>,
    heap: BinaryHeap<Reverse<T>>,
}

impl<T: Ord + Display + Clone> MaxValuesAction<T> {
    pub fn new(column: usize, limit: usize, parse: fn(&CsvRow, usize) -> Result<T, CsvError>) -> Self {
        Self {
            column,
            limit,
            parse,
            heap: BinaryHeap::new(),
        }
    }
}

pub fn max_values_string(column: usize, limit: usize) -> MaxValuesAction<String> {
    MaxValuesAction::new(column, limit, |row, column| row.get(column).map(str::to_string))
}

pub fn max_values_int(column: usize, limit: usize) -> MaxValuesAction<i128> {
    MaxValuesAction::new(column, limit, parse_integer)
}

impl<T: Ord + Display + Clone> Action for MaxValuesAction<T> {
    fn accept_row(&mut self, row: &CsvRow) -> Result<(), CsvError> {
        if self.limit == 0 {
            return Ok(());
        }
        let value = (self.parse)(row, self.column)?;
        self.heap.push(Reverse(value));
        if self.heap.len() > self.limit {
            self.heap.pop();
        }
        Ok(())
    }

    fn result(&self) -> ActionResult {
        let mut values: Vec<T> = self.heap.iter().map(|Reverse(v)| v.clone()).collect();
        values.sort_by(|a, b| b.cmp(a));
        ActionResult::Values(values.iter().map(ToString::to_string).collect())
    }
}

/// Greatest value of an integer column
pub struct MaxIntAction {
    column: usize,
    max: Option<i128>,
}

impl MaxIntAction {
    pub fn new(column: usize) -> Self {
        Self { column, max: None }
    }
}

impl Action for MaxIntAction {
    fn accept_row(&mut self, row: &CsvRow) -> Result<(), CsvError> {
        let value = parse_integer(row, self.column)?;
        self.max = Some(self.max.map_or(value, |max| max.max(value)));
        Ok(())
    }

    fn result(&self) -> ActionResult {
        self.max.map_or(ActionResult::Missing, ActionResult::Integer)
    }
}

/// Writes `row_index,value` for one column. The result reports whether
/// every write succeeded.
pub struct ColumnWithLineNumWriteAction<W: Write> {
    column: usize,
    out: W,
    ok: bool,
}

impl<W: Write> ColumnWithLineNumWriteAction<W> {
    pub fn new(column: usize, out: W) -> Self {
        Self { column, out, ok: true }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Action for ColumnWithLineNumWriteAction<W> {
    fn accept_row(&mut self, row: &CsvRow) -> Result<(), CsvError> {
        let value = row.get(self.column)?;
        if self.ok {
            if let Err(e) = writeln!(self.out, "{},{}", row.index, value) {
                tracing::warn!("Failed to write row {}: {}", row.index, e);
                self.ok = false;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CsvError> {
        if let Err(e) = self.out.flush() {
            tracing::warn!("Failed to flush column output: {}", e);
            self.ok = false;
        }
        Ok(())
    }

    fn result(&self) -> ActionResult {
        ActionResult::Flag(self.ok)
    }
}

/// Collects the listed columns of every row
pub struct SubRowAction {
    columns: Vec<usize>,
    rows: Vec<CsvRow>,
}

impl SubRowAction {
    pub fn new(columns: Vec<usize>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }
}

impl Action for SubRowAction {
    fn accept_row(&mut self, row: &CsvRow) -> Result<(), CsvError> {
        let values = slice(&row.values, &self.columns)?;
        self.rows.push(CsvRow::new(values, row.index));
        Ok(())
    }

    fn result(&self) -> ActionResult {
        ActionResult::Rows(self.rows.clone())
    }
}

/// Feeds each row of a reader to a list of actions in a single pass
pub struct CustomizableAnalyzer<'a, R> {
    reader: R,
    actions: Vec<Box<dyn Action + 'a>>,
}

pub struct CustomizableAnalyzerBuilder<'a, R> {
    reader: R,
    actions: Vec<Box<dyn Action + 'a>>,
}

impl<'a, R: CsvReader> CustomizableAnalyzer<'a, R> {
    pub fn builder(reader: R) -> CustomizableAnalyzerBuilder<'a, R> {
        CustomizableAnalyzerBuilder {
            reader,
            actions: Vec::new(),
        }
    }

    pub fn run(mut self) -> Result<Vec<ActionResult>, CsvError> {
        let width = self.reader.meta().len();
        let mut index = 0u64;

        while let Some(values) = self.reader.next_row()? {
            if values.len() != width {
                return Err(CsvError::broken(format!(
                    "illegal number of fields: {} instead of {} in row {}",
                    values.len(),
                    width,
                    index
                )));
            }
            let row = CsvRow::new(values, index);
            for action in self.actions.iter_mut() {
                action.accept_row(&row)?;
            }
            index += 1;
        }

        tracing::debug!("Ran {} actions over {} rows", self.actions.len(), index);
        self.actions
            .iter_mut()
            .map(|action| {
                action.finish()?;
                Ok(action.result())
            })
            .collect()
    }
}

impl<'a, R: CsvReader> CustomizableAnalyzerBuilder<'a, R> {
    pub fn add_action(mut self, action: Box<dyn Action + 'a>) -> Self {
        self.actions.push(action);
        self
    }

    pub fn build(self) -> CustomizableAnalyzer<'a, R> {
        CustomizableAnalyzer {
            reader: self.reader,
            actions: self.actions,
        }
    }
}
