//! Streaming CSV reader
//!
//! Understands RFC 4180 quoting: `""` inside a quoted field is a quote, and separators
//! and line breaks inside quotes belong to the field. Lines end with LF or CRLF.

use crate::domain::entities::{CsvFormat, CsvMeta};
use crate::domain::repositories::{CsvError, CsvReader};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Configures and creates a [`StreamCsvReader`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReaderBuilder {
    format: CsvFormat,
}

impl CsvReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// First line holds column names
    pub fn with_header(mut self) -> Self {
        self.format.with_header = true;
        self
    }

    pub fn without_header(mut self) -> Self {
        self.format.with_header = false;
        self
    }

    pub fn separator(mut self, separator: u8) -> Self {
        self.format.separator = separator;
        self
    }

    pub fn format(mut self, format: CsvFormat) -> Self {
        self.format = format;
        self
    }

    /// Start reading; consumes the header (or peeks the first row) to learn the meta
    pub fn build<R: BufRead>(self, input: R) -> Result<StreamCsvReader<R>, CsvError> {
        let separator = self.format.separator;
        if matches!(separator, b'"' | b'\r' | b'\n') {
            return Err(CsvError::invalid(format!(
                "{:?} cannot be used as a separator",
                separator as char
            )));
        }
        let mut reader = StreamCsvReader {
            input,
            separator,
            meta: CsvMeta::Unnamed(0),
            pending: None,
            eof: false,
            records: 0,
        };
        if self.format.with_header {
            let names = reader.parse_record()?.unwrap_or_default();
            reader.meta = CsvMeta::Named(names);
        } else if let Some(first) = reader.parse_record()? {
            reader.meta = CsvMeta::Unnamed(first.len());
            reader.pending = Some(first);
        }
        Ok(reader)
    }

    pub fn open(self, path: &Path, buffer_size: usize) -> Result<StreamCsvReader<BufReader<File>>, CsvError> {
        let file = File::open(path)?;
        self.build(BufReader::with_capacity(buffer_size, file))
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

pub struct StreamCsvReader<R> {
    input: R,
    separator: u8,
    meta: CsvMeta,
    /// First row, read ahead to size the meta of header-less input
    pending: Option<Vec<String>>,
    eof: bool,
    records: u64,
}

impl<R: BufRead> StreamCsvReader<R> {
    fn next_byte(&mut self) -> Result<Option<u8>, CsvError> {
        let byte = self.input.fill_buf()?.first().copied();
        if byte.is_some() {
            self.input.consume(1);
        }
        Ok(byte)
    }

    fn decode_field(&self, bytes: Vec<u8>) -> Result<String, CsvError> {
        String::from_utf8(bytes)
            .map_err(|_| CsvError::broken(format!("record {} is not valid UTF-8", self.records + 1)))
    }

    fn parse_record(&mut self) -> Result<Option<Vec<String>>, CsvError> {
        if self.eof {
            return Ok(None);
        }
        let mut row = Vec::new();
        let mut field = Vec::new();
        let mut state = State::FieldStart;
        let mut consumed_any = false;

        loop {
            let byte = match self.next_byte()? {
                Some(byte) => byte,
                None => {
                    self.eof = true;
                    if matches!(state, State::Quoted) {
                        return Err(CsvError::broken(format!(
                            "end of file inside a quoted field in record {}",
                            self.records + 1
                        )));
                    }
                    if !consumed_any {
                        return Ok(None);
                    }
                    row.push(self.decode_field(field)?);
                    break;
                }
            };
            consumed_any = true;

            match state {
                State::Quoted => {
                    if byte == b'"' {
                        state = State::QuoteInQuoted;
                    } else {
                        field.push(byte);
                    }
                    continue;
                }
                State::QuoteInQuoted if byte == b'"' => {
                    field.push(b'"');
                    state = State::Quoted;
                    continue;
                }
                _ => {}
            }

            if byte == b'\n' || byte == b'\r' {
                if byte == b'\r' && self.next_byte()? != Some(b'\n') {
                    return Err(CsvError::broken(format!(
                        "CR line break is not supported (record {})",
                        self.records + 1
                    )));
                }
                row.push(self.decode_field(field)?);
                break;
            }

            if byte == self.separator {
                row.push(self.decode_field(std::mem::take(&mut field))?);
                state = State::FieldStart;
                continue;
            }

            match state {
                State::FieldStart if byte == b'"' => state = State::Quoted,
                _ => {
                    field.push(byte);
                    state = State::Unquoted;
                }
            }
        }

        self.records += 1;
        Ok(Some(row))
    }
}

impl<R: BufRead> CsvReader for StreamCsvReader<R> {
    fn meta(&self) -> &CsvMeta {
        &self.meta
    }

    fn next_row(&mut self) -> Result<Option<Vec<String>>, CsvError> {
        if let Some(row) = self.pending.take() {
            return Ok(Some(row));
        }
        match self.parse_record()? {
            Some(row) if row.len() != self.meta.len() => Err(CsvError::broken(format!(
                "expected {} columns but got {} (record {})",
                self.meta.len(),
                row.len(),
                self.records
            ))),
            row => Ok(row),
        }
    }
}
