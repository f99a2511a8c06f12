//! Reader decorators: each wraps another `CsvReader` and changes the rows it yields

use crate::domain::entities::{CsvMeta, SortDescription};
use crate::domain::repositories::{CsvError, CsvReader};
use crate::domain::utils::slice;

/// Keeps only the given columns, in the given order
pub struct CuttingReader<R> {
    inner: R,
    indices: Vec<usize>,
    meta: CsvMeta,
}

impl<R: CsvReader> CuttingReader<R> {
    pub fn new(inner: R, indices: Vec<usize>) -> Result<Self, CsvError> {
        let width = inner.meta().len();
        if let Some(bad) = indices.iter().find(|&&i| i >= width) {
            return Err(CsvError::invalid(format!(
                "cannot cut column {}, there are {} columns",
                bad, width
            )));
        }
        let meta = match inner.meta() {
            CsvMeta::Named(names) => CsvMeta::Named(slice(names, &indices)?),
            CsvMeta::Unnamed(_) => CsvMeta::Unnamed(indices.len()),
        };
        Ok(Self { inner, indices, meta })
    }
}

impl<R: CsvReader> CsvReader for CuttingReader<R> {
    fn meta(&self) -> &CsvMeta {
        &self.meta
    }

    fn next_row(&mut self) -> Result<Option<Vec<String>>, CsvError> {
        match self.inner.next_row()? {
            Some(row) => Ok(Some(slice(&row, &self.indices)?)),
            None => Ok(None),
        }
    }
}

/// Appends the zero-based row number as the last column
pub struct EnumeratingReader<R> {
    inner: R,
    counter: u64,
    meta: CsvMeta,
}

impl<R: CsvReader> EnumeratingReader<R> {
    pub fn new(inner: R) -> Self {
        let meta = match inner.meta() {
            CsvMeta::Named(names) => {
                let mut names = names.clone();
                names.push(String::new());
                CsvMeta::Named(names)
            }
            CsvMeta::Unnamed(size) => CsvMeta::Unnamed(size + 1),
        };
        Self { inner, counter: 0, meta }
    }
}

impl<R: CsvReader> CsvReader for EnumeratingReader<R> {
    fn meta(&self) -> &CsvMeta {
        &self.meta
    }

    fn next_row(&mut self) -> Result<Option<Vec<String>>, CsvError> {
        match self.inner.next_row()? {
            Some(mut row) => {
                row.push(self.counter.to_string());
                self.counter += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }
}

/// Yields the input as consecutive runs of `batch_size` rows, each run sorted.
/// Rows comparing equal keep their input order.
pub struct BatchSortingReader<R> {
    inner: R,
    batch_size: usize,
    sort: SortDescription,
    batch: std::vec::IntoIter<Vec<String>>,
    batches: u64,
}

impl<R: CsvReader> BatchSortingReader<R> {
    pub fn new(inner: R, batch_size: usize, sort: SortDescription) -> Result<Self, CsvError> {
        if batch_size == 0 {
            return Err(CsvError::invalid("batch size must be positive"));
        }
        Ok(Self {
            inner,
            batch_size,
            sort,
            batch: Vec::new().into_iter(),
            batches: 0,
        })
    }

    /// Number of runs produced so far
    pub fn batches(&self) -> u64 {
        self.batches
    }

    fn fill_batch(&mut self) -> Result<(), CsvError> {
        let mut keyed = Vec::with_capacity(self.batch_size);
        while keyed.len() < self.batch_size {
            match self.inner.next_row()? {
                Some(row) => {
                    let key = self.sort.extract(&row)?;
                    keyed.push((key, row));
                }
                None => break,
            }
        }
        if !keyed.is_empty() {
            self.batches += 1;
        }
        keyed.sort_by(|(a, _), (b, _)| self.sort.compare(a, b));
        self.batch = keyed
            .into_iter()
            .map(|(_, row)| row)
            .collect::<Vec<_>>()
            .into_iter();
        Ok(())
    }
}

impl<R: CsvReader> CsvReader for BatchSortingReader<R> {
    fn meta(&self) -> &CsvMeta {
        self.inner.meta()
    }

    fn next_row(&mut self) -> Result<Option<Vec<String>>, CsvError> {
        if let Some(row) = self.batch.next() {
            return Ok(Some(row));
        }
        self.fill_batch()?;
        Ok(self.batch.next())
    }
}

/// Rows held in memory, for tests
#[cfg(test)]
pub(crate) struct MemoryReader {
    meta: CsvMeta,
    rows: std::collections::VecDeque<Vec<String>>,
}

#[cfg(test)]
impl MemoryReader {
    pub(crate) fn new(rows: &[&[&str]]) -> Self {
        let width = rows.first().map_or(0, |r| r.len());
        Self::with_meta(CsvMeta::Unnamed(width), rows)
    }

    pub(crate) fn with_meta(meta: CsvMeta, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|v| v.to_string()).collect())
            .collect();
        Self { meta, rows }
    }
}

#[cfg(test)]
impl CsvReader for MemoryReader {
    fn meta(&self) -> &CsvMeta {
        &self.meta
    }

    fn next_row(&mut self) -> Result<Option<Vec<String>>, CsvError> {
        Ok(self.rows.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::KeyElement;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_cutting_empty_input_checks_indices() {
        let unnamed = CuttingReader::new(MemoryReader::new(&[]), vec![5]);
        assert!(matches!(unnamed, Err(CsvError::InvalidArgument(_))));

        let named = CuttingReader::new(MemoryReader::with_meta(CsvMeta::Named(vec![]), &[]), vec![5]);
        assert!(matches!(named, Err(CsvError::InvalidArgument(_))));
    }

    #[test]
    fn test_cutting_reader_reorders() {
        let inner = MemoryReader::with_meta(
            CsvMeta::Named(strings(&["a", "b", "c"])),
            &[&["1", "2", "3"], &["4", "5", "6"]],
        );
        let mut reader = CuttingReader::new(inner, vec![2, 0]).unwrap();

        assert_eq!(reader.meta(), &CsvMeta::Named(strings(&["c", "a"])));
        assert_eq!(reader.next_row().unwrap(), Some(strings(&["3", "1"])));
        assert_eq!(reader.next_row().unwrap(), Some(strings(&["6", "4"])));
        assert_eq!(reader.next_row().unwrap(), None);
    }

    #[test]
    fn test_cutting_reader_rejects_bad_index() {
        let inner = MemoryReader::new(&[&["1", "2"]]);
        assert!(matches!(
            CuttingReader::new(inner, vec![0, 2]),
            Err(CsvError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_enumerating_reader() {
        let inner = MemoryReader::new(&[&["a"], &["b"]]);
        let mut reader = EnumeratingReader::new(inner);

        assert_eq!(reader.meta(), &CsvMeta::Unnamed(2));
        assert_eq!(reader.next_row().unwrap(), Some(strings(&["a", "0"])));
        assert_eq!(reader.next_row().unwrap(), Some(strings(&["b", "1"])));
        assert_eq!(reader.next_row().unwrap(), None);
    }

    #[test]
    fn test_enumerating_reader_extends_header() {
        let inner = MemoryReader::with_meta(CsvMeta::Named(strings(&["x"])), &[]);
        let reader = EnumeratingReader::new(inner);
        assert_eq!(reader.meta(), &CsvMeta::Named(strings(&["x", ""])));
    }

    #[test]
    fn test_batch_sorting_reader_sorts_each_batch() {
        let inner = MemoryReader::new(&[&["3"], &["1"], &["2"], &["9"], &["0"]]);
        let sort = SortDescription::single(KeyElement::as_long(0));
        let mut reader = BatchSortingReader::new(inner, 3, sort).unwrap();

        let rows: Vec<String> = reader.all_rows().unwrap().into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(rows, strings(&["1", "2", "3", "0", "9"]));
        assert_eq!(reader.batches(), 2);
    }

    #[test]
    fn test_batch_sorting_reader_is_stable() {
        let inner = MemoryReader::new(&[&["b", "1"], &["a", "2"], &["b", "3"], &["a", "4"]]);
        let sort = SortDescription::single(KeyElement::as_string(0));
        let mut reader = BatchSortingReader::new(inner, 10, sort).unwrap();

        let order: Vec<String> = reader.all_rows().unwrap().into_iter().map(|r| r[1].clone()).collect();
        assert_eq!(order, strings(&["2", "4", "1", "3"]));
    }

    #[test]
    fn test_batch_sorting_reader_propagates_parse_error() {
        let inner = MemoryReader::new(&[&["1"], &["x"]]);
        let sort = SortDescription::single(KeyElement::as_long(0));
        let mut reader = BatchSortingReader::new(inner, 10, sort).unwrap();
        assert!(reader.next_row().is_err());
    }
}
