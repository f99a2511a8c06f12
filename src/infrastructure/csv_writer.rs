//! Streaming CSV writer

use crate::domain::repositories::{CsvError, CsvWriter};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes rows separated by LF, quoting fields only when needed.
/// All rows must have the same number of columns.
pub struct StreamCsvWriter<W: Write> {
    out: W,
    separator: u8,
    columns: Option<usize>,
}

impl<W: Write> StreamCsvWriter<W> {
    pub fn new(out: W) -> Self {
        Self::with_separator(out, b',')
    }

    pub fn with_separator(out: W, separator: u8) -> Self {
        Self {
            out,
            separator,
            columns: None,
        }
    }

    /// Fix the column count up front instead of taking it from the first row
    pub fn expect_columns(mut self, columns: usize) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn needs_quoting(&self, field: &str) -> bool {
        field
            .bytes()
            .any(|b| b == self.separator || b == b'"' || b == b'\n' || b == b'\r')
    }

    fn write_field(&mut self, field: &str) -> Result<(), CsvError> {
        if self.needs_quoting(field) {
            self.out.write_all(b"\"")?;
            self.out.write_all(field.replace('"', "\"\"").as_bytes())?;
            self.out.write_all(b"\"")?;
        } else {
            self.out.write_all(field.as_bytes())?;
        }
        Ok(())
    }
}

impl StreamCsvWriter<BufWriter<File>> {
    pub fn create(path: &Path, separator: u8, buffer_size: usize) -> Result<Self, CsvError> {
        let file = File::create(path)?;
        Ok(Self::with_separator(BufWriter::with_capacity(buffer_size, file), separator))
    }
}

impl<W: Write> CsvWriter for StreamCsvWriter<W> {
    fn write_row(&mut self, row: &[String]) -> Result<(), CsvError> {
        match self.columns {
            Some(columns) if columns != row.len() => {
                return Err(CsvError::invalid(format!(
                    "row length differs from previous ({} != {})",
                    row.len(),
                    columns
                )));
            }
            Some(_) => {}
            None => self.columns = Some(row.len()),
        }
        for (i, field) in row.iter().enumerate() {
            if i > 0 {
                self.out.write_all(&[self.separator])?;
            }
            self.write_field(field)?;
        }
        self.out.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CsvError> {
        self.out.flush()?;
        Ok(())
    }
}
