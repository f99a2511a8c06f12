//! Single-pass column summary of a CSV source

use crate::domain::entities::{ColumnSummary, CsvSummary};
use crate::domain::repositories::{CsvError, CsvReader};

/// Counts rows and deduces, per column, the narrowest type, the longest value
/// and whether any value is empty
pub struct BasicAnalyzer<R> {
    reader: R,
}

impl<R: CsvReader> BasicAnalyzer<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn run(mut self) -> Result<CsvSummary, CsvError> {
        let width = self.reader.meta().len();
        let mut columns = vec![ColumnSummary::default(); width];
        let mut rows = 0u64;

        while let Some(row) = self.reader.next_row()? {
            if row.len() != width {
                return Err(CsvError::broken(format!(
                    "illegal number of fields: {} instead of {} in row {}",
                    row.len(),
                    width,
                    rows
                )));
            }
            for (summary, value) in columns.iter_mut().zip(&row) {
                summary.accept(value);
            }
            rows += 1;
        }

        tracing::debug!("Analyzed {} rows, {} columns", rows, width);
        Ok(CsvSummary {
            meta: self.reader.meta().clone(),
            rows,
            columns,
        })
    }
}
