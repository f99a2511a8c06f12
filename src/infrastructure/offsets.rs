//! Byte offsets of CSV rows
//!
//! The offsets file holds one big-endian `u64` per data row: the position of the
//! line feed ending that row. A last row without a line feed ends at file length.

use crate::domain::repositories::CsvError;
use std::io::{self, BufWriter, Read, Write};

pub const OFFSET_BYTES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetSummary {
    /// Position of the line feed ending the header, when there is a header
    pub header_end: Option<u64>,
    /// Number of offsets written
    pub rows: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Scan `input` for row ends and write them to `output`.
/// Quotes follow the reader's rules: a quote opens a quoted field only at the
/// start of a field, and `""` inside quotes is an escaped quote. Line feeds
/// inside quoted fields do not end a row.
pub fn extract_offsets<R: Read, W: Write>(
    mut input: R,
    output: W,
    read_buffer: usize,
    write_buffer: usize,
    has_header: bool,
    separator: u8,
) -> Result<OffsetSummary, CsvError> {
    let mut output = BufWriter::with_capacity(write_buffer.max(OFFSET_BYTES), output);
    let mut buf = vec![0u8; read_buffer.max(1)];
    let mut position = 0u64;
    let mut state = Scan::FieldStart;
    let mut line_open = false;
    let mut header_end = None;
    let mut header_pending = has_header;
    let mut rows = 0u64;

    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        for &byte in &buf[..n] {
            position += 1;
            state = match (state, byte) {
                (Scan::Quoted, b'"') => Scan::QuoteInQuoted,
                (Scan::Quoted, _) => Scan::Quoted,
                (Scan::QuoteInQuoted, b'"') => Scan::Quoted,
                (_, b'\n') => {
                    let end = position - 1;
                    if header_pending {
                        header_end = Some(end);
                        header_pending = false;
                    } else {
                        output.write_all(&end.to_be_bytes())?;
                        rows += 1;
                    }
                    line_open = false;
                    continue;
                }
                (_, b) if b == separator => Scan::FieldStart,
                (Scan::FieldStart, b'"') => Scan::Quoted,
                _ => Scan::Unquoted,
            };
            line_open = true;
        }
    }

    if state == Scan::Quoted {
        return Err(CsvError::broken("end of file inside a quoted field"));
    }
    if line_open {
        if header_pending {
            header_end = Some(position);
        } else {
            output.write_all(&position.to_be_bytes())?;
            rows += 1;
        }
    }
    output.flush()?;
    tracing::debug!("Extracted {} row offsets from {} bytes", rows, position);
    Ok(OffsetSummary { header_end, rows })
}

/// Byte range of a data row, excluding its line feed.
/// `previous_end` is the offset of the preceding row, `None` for the first one.
pub fn row_span(end: u64, previous_end: Option<u64>, header_end: Option<u64>) -> (u64, u64) {
    let start = match (previous_end, header_end) {
        (Some(previous), _) => previous + 1,
        (None, Some(header)) => header + 1,
        (None, None) => 0,
    };
    (start, end)
}
