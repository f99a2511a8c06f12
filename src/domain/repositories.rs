/// Repository interfaces (Ports) - row sources and sinks the rest of the crate is written against
/// Concrete readers and writers live in the infrastructure layer, decorators in `domain::readers`

use crate::domain::entities::CsvMeta;
use thiserror::Error;

/// A forward-only source of CSV rows
pub trait CsvReader {
    /// Column description of the rows this reader yields
    fn meta(&self) -> &CsvMeta;

    /// Next data row, or `None` once the source is exhausted
    fn next_row(&mut self) -> Result<Option<Vec<String>>, CsvError>;

    /// Drain the reader into memory
    fn all_rows(&mut self) -> Result<Vec<Vec<String>>, CsvError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }
}

impl<R: CsvReader + ?Sized> CsvReader for &mut R {
    fn meta(&self) -> &CsvMeta {
        (**self).meta()
    }

    fn next_row(&mut self) -> Result<Option<Vec<String>>, CsvError> {
        (**self).next_row()
    }
}

impl<R: CsvReader + ?Sized> CsvReader for Box<R> {
    fn meta(&self) -> &CsvMeta {
        (**self).meta()
    }

    fn next_row(&mut self) -> Result<Option<Vec<String>>, CsvError> {
        (**self).next_row()
    }
}

/// A sink of CSV rows
pub trait CsvWriter {
    fn write_row(&mut self, row: &[String]) -> Result<(), CsvError>;

    fn flush(&mut self) -> Result<(), CsvError>;
}

impl<W: CsvWriter + ?Sized> CsvWriter for &mut W {
    fn write_row(&mut self, row: &[String]) -> Result<(), CsvError> {
        (**self).write_row(row)
    }

    fn flush(&mut self) -> Result<(), CsvError> {
        (**self).flush()
    }
}

/// Errors raised while reading, transforming or writing CSV data
#[derive(Debug, Error)]
pub enum CsvError {
    /// The data itself is malformed
    #[error("Broken file contents: {0}")]
    BrokenContents(String),

    /// The caller asked for something that cannot be done with this data
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CsvError {
    pub fn broken(msg: impl Into<String>) -> Self {
        CsvError::BrokenContents(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        CsvError::InvalidArgument(msg.into())
    }
}
