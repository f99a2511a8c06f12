//! Domain entities - CSV structure, sort keys and column summaries

use crate::domain::repositories::CsvError;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Column description of a CSV source: either just a width or the header names
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CsvMeta {
    Unnamed(usize),
    Named(Vec<String>),
}

impl CsvMeta {
    pub fn len(&self) -> usize {
        match self {
            CsvMeta::Unnamed(size) => *size,
            CsvMeta::Named(names) => names.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_names(&self) -> bool {
        matches!(self, CsvMeta::Named(_))
    }

    /// Name of column `index`; unnamed columns are called by their index
    pub fn column_name(&self, index: usize) -> Result<String, CsvError> {
        if index >= self.len() {
            return Err(CsvError::invalid(format!(
                "column {} is out of range, there are {} columns",
                index,
                self.len()
            )));
        }
        Ok(match self {
            CsvMeta::Unnamed(_) => index.to_string(),
            CsvMeta::Named(names) => names[index].clone(),
        })
    }

    pub fn column_names(&self) -> Vec<String> {
        match self {
            CsvMeta::Unnamed(size) => (0..*size).map(|i| i.to_string()).collect(),
            CsvMeta::Named(names) => names.clone(),
        }
    }

    /// The header as a row, if there is one
    pub fn header_row(&self) -> Option<&[String]> {
        match self {
            CsvMeta::Unnamed(_) => None,
            CsvMeta::Named(names) => Some(names),
        }
    }
}

/// How a CSV file is laid out on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvFormat {
    pub with_header: bool,
    pub separator: u8,
}

impl CsvFormat {
    pub fn new(with_header: bool, separator: u8) -> Self {
        Self { with_header, separator }
    }
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self { with_header: false, separator: b',' }
    }
}

/// A data row together with its zero-based position among the data rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsvRow {
    pub values: Vec<String>,
    pub index: u64,
}

impl CsvRow {
    pub fn new(values: Vec<String>, index: u64) -> Self {
        Self { values, index }
    }

    pub fn get(&self, column: usize) -> Result<&str, CsvError> {
        self.values
            .get(column)
            .map(String::as_str)
            .ok_or_else(|| CsvError::invalid(format!("row {} has no column {}", self.index, column)))
    }
}

/// Narrowest type every value of a column parses as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Integer,
    Long,
    #[serde(rename = "BIGINT")]
    BigInt,
    String,
}

impl ColumnType {
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            ColumnType::Integer => value.parse::<i32>().is_ok(),
            ColumnType::Long => value.parse::<i64>().is_ok(),
            ColumnType::BigInt => value.parse::<i128>().is_ok(),
            ColumnType::String => true,
        }
    }

    fn wider(&self) -> Option<ColumnType> {
        match self {
            ColumnType::Integer => Some(ColumnType::Long),
            ColumnType::Long => Some(ColumnType::BigInt),
            ColumnType::BigInt => Some(ColumnType::String),
            ColumnType::String => None,
        }
    }

    /// Widen `current` until it accepts `value`
    pub fn probe(value: &str, current: ColumnType) -> ColumnType {
        let mut column_type = current;
        while !column_type.accepts(value) {
            match column_type.wider() {
                Some(wider) => column_type = wider,
                None => break,
            }
        }
        column_type
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Long => "LONG",
            ColumnType::BigInt => "BIGINT",
            ColumnType::String => "STRING",
        };
        f.write_str(name)
    }
}

/// How a key column is interpreted when rows are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    String,
    Long,
    BigInt,
}

impl KeyType {
    pub fn parse(&self, value: &str) -> Result<KeyValue, CsvError> {
        match self {
            KeyType::String => Ok(KeyValue::Str(value.to_string())),
            KeyType::Long => value
                .parse()
                .map(KeyValue::Long)
                .map_err(|_| CsvError::broken(format!("'{}' is not a LONG value", value))),
            KeyType::BigInt => value
                .parse()
                .map(KeyValue::BigInt)
                .map_err(|_| CsvError::broken(format!("'{}' is not a BIGINT value", value))),
        }
    }
}

impl FromStr for KeyType {
    type Err = CsvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(KeyType::String),
            "long" => Ok(KeyType::Long),
            "bigint" | "big" => Ok(KeyType::BigInt),
            other => Err(CsvError::invalid(format!("unknown key type '{}'", other))),
        }
    }
}

/// A parsed key value; only values of the same key type are ever compared
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    Str(String),
    Long(i64),
    BigInt(i128),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// One component of a sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyElement {
    pub field: usize,
    pub key_type: KeyType,
    pub order: SortOrder,
}

impl KeyElement {
    pub fn new(field: usize, key_type: KeyType, order: SortOrder) -> Self {
        Self { field, key_type, order }
    }

    pub fn as_string(field: usize) -> Self {
        Self::new(field, KeyType::String, SortOrder::Ascending)
    }

    pub fn as_long(field: usize) -> Self {
        Self::new(field, KeyType::Long, SortOrder::Ascending)
    }

    pub fn descending(mut self) -> Self {
        self.order = SortOrder::Descending;
        self
    }
}

/// Parses `FIELD[:TYPE[:ORDER]]`, e.g. `2`, `0:long`, `1:string:desc`
impl FromStr for KeyElement {
    type Err = CsvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let field = parts
            .next()
            .unwrap_or_default()
            .trim()
            .parse::<usize>()
            .map_err(|_| CsvError::invalid(format!("bad key '{}': field must be a column index", s)))?;
        let key_type = match parts.next() {
            Some(t) => t.trim().parse()?,
            None => KeyType::String,
        };
        let order = match parts.next().map(|o| o.trim().to_ascii_lowercase()) {
            None => SortOrder::Ascending,
            Some(o) if o == "asc" => SortOrder::Ascending,
            Some(o) if o == "desc" => SortOrder::Descending,
            Some(o) => return Err(CsvError::invalid(format!("bad key '{}': unknown order '{}'", s, o))),
        };
        if parts.next().is_some() {
            return Err(CsvError::invalid(format!("bad key '{}': too many parts", s)));
        }
        Ok(KeyElement::new(field, key_type, order))
    }
}

/// Ordered list of key elements; earlier keys take precedence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescription {
    keys: Vec<KeyElement>,
}

impl SortDescription {
    pub fn new(keys: Vec<KeyElement>) -> Result<Self, CsvError> {
        if keys.is_empty() {
            return Err(CsvError::invalid("sort description needs at least one key"));
        }
        Ok(Self { keys })
    }

    pub fn single(key: KeyElement) -> Self {
        Self { keys: vec![key] }
    }

    pub fn keys(&self) -> &[KeyElement] {
        &self.keys
    }

    pub fn fields(&self) -> Vec<usize> {
        self.keys.iter().map(|k| k.field).collect()
    }

    /// Parse the key columns of `row` in key order
    pub fn extract(&self, row: &[String]) -> Result<Vec<KeyValue>, CsvError> {
        self.keys
            .iter()
            .map(|key| {
                let value = row.get(key.field).ok_or_else(|| {
                    CsvError::broken(format!("row has {} columns, key needs column {}", row.len(), key.field))
                })?;
                key.key_type.parse(value)
            })
            .collect()
    }

    /// Compare two key vectors produced by [`SortDescription::extract`]
    pub fn compare(&self, a: &[KeyValue], b: &[KeyValue]) -> Ordering {
        self.keys
            .iter()
            .zip(a.iter().zip(b.iter()))
            .map(|(key, (x, y))| key.order.apply(x.cmp(y)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// Per-column findings of a full scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSummary {
    pub has_empty: bool,
    pub column_type: ColumnType,
    pub max_string_size: usize,
    /// Every numeric value is written the way it prints back (no `+`, leading zeros or `-0`)
    pub canonical_numbers: bool,
}

impl Default for ColumnSummary {
    fn default() -> Self {
        Self {
            has_empty: false,
            column_type: ColumnType::Integer,
            max_string_size: 0,
            canonical_numbers: true,
        }
    }
}

impl ColumnSummary {
    /// Fold one more value of the column into the summary
    pub fn accept(&mut self, value: &str) {
        if value.is_empty() {
            self.has_empty = true;
        }
        self.column_type = ColumnType::probe(value, self.column_type);
        self.max_string_size = self.max_string_size.max(value.chars().count());
        if self.canonical_numbers && self.column_type != ColumnType::String {
            self.canonical_numbers = value.parse::<i128>().map_or(false, |n| n.to_string() == value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsvSummary {
    pub meta: CsvMeta,
    pub rows: u64,
    pub columns: Vec<ColumnSummary>,
}
