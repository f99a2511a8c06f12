//! Fixed-width binary encoding of CSV rows
//!
//! Every column gets a codec with a fixed byte width, so a row becomes an entry of
//! `RowLayout::row_size` bytes and a file of entries can be addressed by index.
//! Integers are big-endian two's complement. Strings are truncated to their
//! character budget and left-padded with NUL bytes.

use crate::domain::entities::{ColumnSummary, ColumnType, KeyType, KeyValue};
use crate::domain::repositories::{CsvError, CsvReader, CsvWriter};
use encoding_rs::Encoding;
use std::cmp::Ordering;
use std::fmt;
use std::io::{self, Read, Write};

/// Character encoding used for string columns
#[derive(Clone, Copy)]
pub enum TextEncoding {
    /// 7-bit ASCII; other characters become `?`
    Ascii,
    /// UTF-8 with four bytes reserved per character
    Utf8,
    /// Any single-byte WHATWG encoding, e.g. `ibm866` or `windows-1251`
    SingleByte(&'static Encoding),
}

impl TextEncoding {
    pub fn for_label(label: &str) -> Result<Self, CsvError> {
        let label = label.trim().to_ascii_lowercase();
        match label.as_str() {
            "ascii" | "us-ascii" => return Ok(TextEncoding::Ascii),
            "utf-8" | "utf8" => return Ok(TextEncoding::Utf8),
            _ => {}
        }
        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) if encoding.is_single_byte() => Ok(TextEncoding::SingleByte(encoding)),
            Some(encoding) if encoding.name() == "UTF-8" => Ok(TextEncoding::Utf8),
            Some(encoding) => Err(CsvError::invalid(format!(
                "encoding {} is not supported, only UTF-8 and single-byte encodings are",
                encoding.name()
            ))),
            None => Err(CsvError::invalid(format!("unknown encoding '{}'", label))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Ascii => "US-ASCII",
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::SingleByte(encoding) => encoding.name(),
        }
    }

    pub fn bytes_per_char(&self) -> usize {
        match self {
            TextEncoding::Utf8 => 4,
            _ => 1,
        }
    }

    /// Encode at most `chars` characters of `value`
    pub fn encode(&self, value: &str, chars: usize) -> Vec<u8> {
        let truncated = value.chars().take(chars);
        match self {
            TextEncoding::Ascii => truncated.map(|c| if c.is_ascii() { c as u8 } else { b'?' }).collect(),
            TextEncoding::Utf8 => truncated.collect::<String>().into_bytes(),
            TextEncoding::SingleByte(encoding) => {
                let mut out = Vec::with_capacity(chars);
                let mut buf = [0u8; 4];
                for c in truncated {
                    let (bytes, _, had_errors) = encoding.encode(c.encode_utf8(&mut buf));
                    if had_errors || bytes.len() != 1 {
                        out.push(b'?');
                    } else {
                        out.extend_from_slice(&bytes);
                    }
                }
                out
            }
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
                .collect(),
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::SingleByte(encoding) => encoding.decode_without_bom_handling(bytes).0.into_owned(),
        }
    }

    /// Whether byte order of encoded strings matches character order
    fn orders_bytewise(&self) -> bool {
        !matches!(self, TextEncoding::SingleByte(_))
    }
}

impl fmt::Debug for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextEncoding({})", self.name())
    }
}

impl PartialEq for TextEncoding {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

/// Binary representation of one column
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnCodec {
    Int,
    Long,
    BigInt { byte_length: usize },
    Str { chars_length: usize, encoding: TextEncoding },
}

pub const MAX_BIG_INT_BYTES: usize = 16;

impl ColumnCodec {
    pub fn big_int(byte_length: usize) -> Result<Self, CsvError> {
        if byte_length == 0 || byte_length > MAX_BIG_INT_BYTES {
            return Err(CsvError::invalid(format!(
                "BIGINT width must be within 1..={} bytes, got {}",
                MAX_BIG_INT_BYTES, byte_length
            )));
        }
        Ok(ColumnCodec::BigInt { byte_length })
    }

    pub fn string(chars_length: usize, encoding: TextEncoding) -> Result<Self, CsvError> {
        if chars_length == 0 {
            return Err(CsvError::invalid("string column width must be positive"));
        }
        Ok(ColumnCodec::Str { chars_length, encoding })
    }

    /// Codec able to hold every value a column summary has seen
    /// Numbers whose text would not survive a round trip keep a string codec.
    pub fn for_column(summary: &ColumnSummary, encoding: TextEncoding) -> Self {
        if !summary.canonical_numbers {
            return ColumnCodec::Str {
                chars_length: summary.max_string_size.max(1),
                encoding,
            };
        }
        match summary.column_type {
            ColumnType::Integer => ColumnCodec::Int,
            ColumnType::Long => ColumnCodec::Long,
            ColumnType::BigInt => ColumnCodec::BigInt { byte_length: MAX_BIG_INT_BYTES },
            ColumnType::String => ColumnCodec::Str {
                chars_length: summary.max_string_size.max(1),
                encoding,
            },
        }
    }

    /// Codec for a sort key column; the key type wins over the deduced column type
    pub fn for_key(key_type: KeyType, summary: &ColumnSummary, encoding: TextEncoding) -> Self {
        match key_type {
            KeyType::Long => ColumnCodec::Long,
            KeyType::BigInt => ColumnCodec::BigInt { byte_length: MAX_BIG_INT_BYTES },
            KeyType::String => ColumnCodec::Str {
                chars_length: summary.max_string_size.max(1),
                encoding,
            },
        }
    }

    pub fn byte_length(&self) -> usize {
        match self {
            ColumnCodec::Int => 4,
            ColumnCodec::Long => 8,
            ColumnCodec::BigInt { byte_length } => *byte_length,
            ColumnCodec::Str { chars_length, encoding } => chars_length * encoding.bytes_per_char(),
        }
    }

    pub fn encode(&self, value: &str, out: &mut Vec<u8>) -> Result<(), CsvError> {
        match self {
            ColumnCodec::Int => {
                let v: i32 = value
                    .parse()
                    .map_err(|_| CsvError::broken(format!("'{}' is not an INTEGER value", value)))?;
                out.extend_from_slice(&v.to_be_bytes());
            }
            ColumnCodec::Long => {
                let v: i64 = value
                    .parse()
                    .map_err(|_| CsvError::broken(format!("'{}' is not a LONG value", value)))?;
                out.extend_from_slice(&v.to_be_bytes());
            }
            ColumnCodec::BigInt { byte_length } => {
                let v: i128 = value
                    .parse()
                    .map_err(|_| CsvError::broken(format!("'{}' is not a BIGINT value", value)))?;
                let bytes = v.to_be_bytes();
                let (head, tail) = bytes.split_at(MAX_BIG_INT_BYTES - byte_length);
                let sign = if v < 0 { 0xFF } else { 0x00 };
                if head.iter().any(|&b| b != sign) || ((tail[0] & 0x80) != 0) != (v < 0) {
                    return Err(CsvError::broken(format!(
                        "'{}' does not fit into {} bytes",
                        value, byte_length
                    )));
                }
                out.extend_from_slice(tail);
            }
            ColumnCodec::Str { chars_length, encoding } => {
                let encoded = encoding.encode(value, *chars_length);
                out.extend_from_slice(&pad_big_endian(&encoded, self.byte_length()));
            }
        }
        Ok(())
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        match self.decode_key(bytes) {
            KeyValue::Str(s) => s,
            KeyValue::Long(v) => v.to_string(),
            KeyValue::BigInt(v) => v.to_string(),
        }
    }

    /// Decode into a comparable value; INTEGER columns come back as `Long`
    pub fn decode_key(&self, bytes: &[u8]) -> KeyValue {
        match self {
            ColumnCodec::Int => KeyValue::Long(i32::from_be_bytes(be_array(bytes)) as i64),
            ColumnCodec::Long => KeyValue::Long(i64::from_be_bytes(be_array(bytes))),
            ColumnCodec::BigInt { byte_length } => {
                let bytes = &bytes[..*byte_length];
                let fill = if bytes[0] & 0x80 != 0 { 0xFF } else { 0x00 };
                let mut full = [fill; MAX_BIG_INT_BYTES];
                full[MAX_BIG_INT_BYTES - byte_length..].copy_from_slice(bytes);
                KeyValue::BigInt(i128::from_be_bytes(full))
            }
            ColumnCodec::Str { encoding, .. } => {
                let bytes = &bytes[..self.byte_length()];
                KeyValue::Str(encoding.decode(strip_big_endian_padding(bytes)))
            }
        }
    }
}

fn be_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut array = [0u8; N];
    array.copy_from_slice(&bytes[..N]);
    array
}

/// Left-pad `bytes` with zeros up to `len`
pub fn pad_big_endian(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut padded = vec![0u8; len.saturating_sub(bytes.len())];
    padded.extend_from_slice(bytes);
    padded
}

/// Drop leading zero bytes
pub fn strip_big_endian_padding(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Codecs of a whole row with precomputed column offsets
#[derive(Debug, Clone, PartialEq)]
pub struct RowLayout {
    codecs: Vec<ColumnCodec>,
    offsets: Vec<usize>,
    row_size: usize,
}

impl RowLayout {
    pub fn new(codecs: Vec<ColumnCodec>) -> Result<Self, CsvError> {
        if codecs.is_empty() {
            return Err(CsvError::invalid("row layout needs at least one column"));
        }
        let mut offsets = Vec::with_capacity(codecs.len());
        let mut row_size = 0;
        for codec in &codecs {
            offsets.push(row_size);
            row_size += codec.byte_length();
        }
        Ok(Self { codecs, offsets, row_size })
    }

    pub fn codecs(&self) -> &[ColumnCodec] {
        &self.codecs
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    pub fn offset(&self, column: usize) -> usize {
        self.offsets[column]
    }

    /// Bytes of one column inside an encoded entry
    pub fn field<'a>(&self, entry: &'a [u8], column: usize) -> &'a [u8] {
        let start = self.offsets[column];
        &entry[start..start + self.codecs[column].byte_length()]
    }

    pub fn encode_row(&self, row: &[String], out: &mut Vec<u8>) -> Result<(), CsvError> {
        if row.len() != self.codecs.len() {
            return Err(CsvError::broken(format!(
                "wrong number of columns: {} != {}",
                row.len(),
                self.codecs.len()
            )));
        }
        for (codec, value) in self.codecs.iter().zip(row) {
            codec.encode(value, out)?;
        }
        Ok(())
    }

    pub fn decode_row(&self, entry: &[u8]) -> Vec<String> {
        self.codecs
            .iter()
            .enumerate()
            .map(|(i, codec)| codec.decode(self.field(entry, i)))
            .collect()
    }

    pub fn decode_key(&self, entry: &[u8], column: usize) -> KeyValue {
        self.codecs[column].decode_key(self.field(entry, column))
    }
}

/// Orders encoded column values
pub trait ByteComparator {
    fn compare(&self, codec: &ColumnCodec, a: &[u8], b: &[u8]) -> Ordering;
}

/// Compares numbers by value and strings by character order
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleByteComparator;

impl ByteComparator for SimpleByteComparator {
    fn compare(&self, codec: &ColumnCodec, a: &[u8], b: &[u8]) -> Ordering {
        match codec {
            ColumnCodec::Str { encoding, .. } if encoding.orders_bytewise() => {
                let len = codec.byte_length();
                strip_big_endian_padding(&a[..len]).cmp(strip_big_endian_padding(&b[..len]))
            }
            _ => codec.decode_key(a).cmp(&codec.decode_key(b)),
        }
    }
}

/// Fill `entry` completely from `input`. `Ok(false)` on a clean end of input,
/// an error if the input ends in the middle of an entry.
pub fn read_entry<R: Read + ?Sized>(input: &mut R, entry: &mut [u8]) -> Result<bool, CsvError> {
    let mut filled = 0;
    while filled < entry.len() {
        match input.read(&mut entry[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if filled == 0 {
        Ok(false)
    } else if filled == entry.len() {
        Ok(true)
    } else {
        Err(CsvError::broken(format!(
            "truncated binary row: got {} of {} bytes",
            filled,
            entry.len()
        )))
    }
}

/// Encode every row of `reader`; returns the number of rows written
pub fn binarize<R, W>(reader: &mut R, layout: &RowLayout, out: &mut W) -> Result<u64, CsvError>
where
    R: CsvReader + ?Sized,
    W: Write + ?Sized,
{
    let mut entry = Vec::with_capacity(layout.row_size());
    let mut rows = 0;
    while let Some(row) = reader.next_row()? {
        entry.clear();
        layout.encode_row(&row, &mut entry)?;
        out.write_all(&entry)?;
        rows += 1;
    }
    out.flush()?;
    tracing::debug!("Binarized {} rows of {} bytes", rows, layout.row_size());
    Ok(rows)
}

/// Decode every entry of `input` into `writer`; returns the number of rows written
pub fn debinarize<R, W>(input: &mut R, layout: &RowLayout, writer: &mut W) -> Result<u64, CsvError>
where
    R: Read + ?Sized,
    W: CsvWriter + ?Sized,
{
    let mut entry = vec![0u8; layout.row_size()];
    let mut rows = 0;
    while read_entry(input, &mut entry)? {
        writer.write_row(&layout.decode_row(&entry))?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::readers::MemoryReader;

    #[derive(Default)]
    struct CollectingWriter {
        rows: Vec<Vec<String>>,
    }

    impl CsvWriter for CollectingWriter {
        fn write_row(&mut self, row: &[String]) -> Result<(), CsvError> {
            self.rows.push(row.to_vec());
            Ok(())
        }

        fn flush(&mut self) -> Result<(), CsvError> {
            Ok(())
        }
    }

    fn round_trip(rows: &[&[&str]], codecs: Vec<ColumnCodec>) -> Vec<Vec<String>> {
        let layout = RowLayout::new(codecs).unwrap();
        let mut bytes = Vec::new();
        let written = binarize(&mut MemoryReader::new(rows), &layout, &mut bytes).unwrap();
        assert_eq!(written as usize, rows.len());
        assert_eq!(bytes.len(), rows.len() * layout.row_size());

        let mut writer = CollectingWriter::default();
        debinarize(&mut bytes.as_slice(), &layout, &mut writer).unwrap();
        writer.rows
    }

    fn strings(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter().map(|r| r.iter().map(|v| v.to_string()).collect()).collect()
    }

    #[test]
    fn test_padding() {
        assert_eq!(pad_big_endian(&[1, 2, 3], 4), vec![0, 1, 2, 3]);
        assert_eq!(pad_big_endian(&[1, 2], 2), vec![1, 2]);
        assert_eq!(strip_big_endian_padding(&[0, 0, 0]), &[] as &[u8]);
        assert_eq!(strip_big_endian_padding(&[0, 0, 0, 0, 1]), &[1]);
        assert_eq!(strip_big_endian_padding(&[1, 0]), &[1, 0]);
    }

    #[test]
    fn test_mixed_columns_round_trip() {
        let rows: &[&[&str]] = &[
            &["11", "1000000000000", "-10633823966279326983230456482242756608", "aa"],
            &["-21", "-2", "0", "b"],
            &["2147483647", "9223372036854775807", "5", ""],
        ];
        let codecs = vec![
            ColumnCodec::Int,
            ColumnCodec::Long,
            ColumnCodec::big_int(16).unwrap(),
            ColumnCodec::string(2, TextEncoding::Ascii).unwrap(),
        ];
        assert_eq!(round_trip(rows, codecs), strings(rows));
    }

    #[test]
    fn test_layout_offsets() {
        let layout = RowLayout::new(vec![
            ColumnCodec::Int,
            ColumnCodec::string(3, TextEncoding::Utf8).unwrap(),
            ColumnCodec::Long,
        ])
        .unwrap();
        assert_eq!(layout.offset(0), 0);
        assert_eq!(layout.offset(1), 4);
        assert_eq!(layout.offset(2), 16);
        assert_eq!(layout.row_size(), 24);
    }

    #[test]
    fn test_string_truncated_and_left_padded() {
        let codec = ColumnCodec::string(3, TextEncoding::Ascii).unwrap();
        let mut out = Vec::new();
        codec.encode("a", &mut out).unwrap();
        codec.encode("abcdef", &mut out).unwrap();
        assert_eq!(out, b"\0\0aabc".to_vec());
        assert_eq!(codec.decode(&out[..3]), "a");
        assert_eq!(codec.decode(&out[3..]), "abc");
    }

    #[test]
    fn test_single_byte_encoding() {
        let encoding = TextEncoding::for_label("ibm866").unwrap();
        let codec = ColumnCodec::string(6, encoding).unwrap();
        let mut out = Vec::new();
        codec.encode("привет", &mut out).unwrap();
        assert_eq!(out.len(), 6);
        assert_eq!(codec.decode(&out), "привет");

        assert!(TextEncoding::for_label("shift_jis").is_err());
        assert!(TextEncoding::for_label("no-such-charset").is_err());
        assert_eq!(TextEncoding::for_label("UTF8").unwrap(), TextEncoding::Utf8);
    }

    #[test]
    fn test_narrow_big_int() {
        let codec = ColumnCodec::big_int(2).unwrap();
        let mut out = Vec::new();
        codec.encode("-32768", &mut out).unwrap();
        assert_eq!(out, vec![0x80, 0x00]);
        assert_eq!(codec.decode(&out), "-32768");

        assert!(codec.encode("32768", &mut Vec::new()).is_err());
        assert!(codec.encode("-32769", &mut Vec::new()).is_err());
        assert!(ColumnCodec::big_int(17).is_err());
    }

    #[test]
    fn test_wrong_number_of_columns() {
        let layout = RowLayout::new(vec![ColumnCodec::Int, ColumnCodec::Int]).unwrap();
        let mut reader = MemoryReader::new(&[&["1", "2"], &["3"]]);
        let err = binarize(&mut reader, &layout, &mut Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "Broken file contents: wrong number of columns: 1 != 2");
    }

    #[test]
    fn test_unparsable_value() {
        let layout = RowLayout::new(vec![ColumnCodec::Int]).unwrap();
        let mut reader = MemoryReader::new(&[&["3000000000"]]);
        assert!(matches!(
            binarize(&mut reader, &layout, &mut Vec::new()),
            Err(CsvError::BrokenContents(_))
        ));
    }

    #[test]
    fn test_truncated_input() {
        let layout = RowLayout::new(vec![ColumnCodec::Long]).unwrap();
        let bytes = vec![0u8; 12];
        let mut writer = CollectingWriter::default();
        assert!(debinarize(&mut bytes.as_slice(), &layout, &mut writer).is_err());
        assert_eq!(writer.rows.len(), 1);
    }

    #[test]
    fn test_byte_comparator() {
        let cmp = SimpleByteComparator;

        let int = ColumnCodec::Int;
        let (mut a, mut b) = (Vec::new(), Vec::new());
        int.encode("-5", &mut a).unwrap();
        int.encode("3", &mut b).unwrap();
        assert_eq!(cmp.compare(&int, &a, &b), Ordering::Less);

        let big = ColumnCodec::big_int(16).unwrap();
        let (mut a, mut b) = (Vec::new(), Vec::new());
        big.encode("10633823966279326983230456482242756608", &mut a).unwrap();
        big.encode("-1", &mut b).unwrap();
        assert_eq!(cmp.compare(&big, &a, &b), Ordering::Greater);

        let text = ColumnCodec::string(3, TextEncoding::Utf8).unwrap();
        let (mut a, mut b) = (Vec::new(), Vec::new());
        text.encode("b", &mut a).unwrap();
        text.encode("ab", &mut b).unwrap();
        assert_eq!(cmp.compare(&text, &a, &b), Ordering::Greater);
        assert_eq!(cmp.compare(&text, &a, &a), Ordering::Equal);
    }
}
