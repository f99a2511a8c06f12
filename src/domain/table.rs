//! A CSV file fully loaded into memory

use crate::domain::entities::CsvMeta;
use crate::domain::repositories::{CsvError, CsvReader, CsvWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    meta: CsvMeta,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn new(meta: CsvMeta, rows: Vec<Vec<String>>) -> Self {
        Self { meta, rows }
    }

    /// Read every row of `reader`
    pub fn load<R: CsvReader>(mut reader: R) -> Result<Self, CsvError> {
        let rows = reader.all_rows()?;
        tracing::debug!("Loaded table with {} rows", rows.len());
        Ok(Self {
            meta: reader.meta().clone(),
            rows,
        })
    }

    /// A new table whose row `i` is this table's row `indices[i]`
    pub fn reorder(&self, indices: &[usize]) -> Result<Self, CsvError> {
        let rows = indices
            .iter()
            .map(|&i| {
                self.rows
                    .get(i)
                    .cloned()
                    .ok_or_else(|| CsvError::invalid(format!("row {} is out of range", i)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            meta: self.meta.clone(),
            rows,
        })
    }

    pub fn meta(&self) -> &CsvMeta {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[String]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn cell(&self, row: usize, column: usize) -> Result<&str, CsvError> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .ok_or_else(|| CsvError::invalid(format!("no cell at row {}, column {}", row, column)))
    }

    pub fn cell_as_long(&self, row: usize, column: usize) -> Result<i64, CsvError> {
        let value = self.cell(row, column)?;
        value
            .parse()
            .map_err(|_| CsvError::broken(format!("'{}' at row {}, column {} is not a LONG", value, row, column)))
    }

    pub fn cell_as_big(&self, row: usize, column: usize) -> Result<i128, CsvError> {
        let value = self.cell(row, column)?;
        value
            .parse()
            .map_err(|_| CsvError::broken(format!("'{}' at row {}, column {} is not a BIGINT", value, row, column)))
    }

    /// Write the header (when named) and every row
    pub fn write_to<W: CsvWriter + ?Sized>(&self, writer: &mut W) -> Result<(), CsvError> {
        if let Some(header) = self.meta.header_row() {
            writer.write_row(header)?;
        }
        for row in &self.rows {
            writer.write_row(row)?;
        }
        writer.flush()
    }
}
