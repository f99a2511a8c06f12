//! Sorting a table that fits in memory

use crate::domain::entities::SortDescription;
use crate::domain::repositories::CsvError;
use crate::domain::table::CsvTable;

pub struct InMemorySorter {
    sort: SortDescription,
}

impl InMemorySorter {
    pub fn new(sort: SortDescription) -> Self {
        Self { sort }
    }

    /// Row indices of `table` in sorted order; equal rows keep their order
    pub fn sorted_indices(&self, table: &CsvTable) -> Result<Vec<usize>, CsvError> {
        let keys = table
            .rows()
            .iter()
            .map(|row| self.sort.extract(row))
            .collect::<Result<Vec<_>, _>>()?;
        let mut indices: Vec<usize> = (0..table.len()).collect();
        indices.sort_by(|&a, &b| self.sort.compare(&keys[a], &keys[b]));
        Ok(indices)
    }

    pub fn sorted(&self, table: &CsvTable) -> Result<CsvTable, CsvError> {
        let indices = self.sorted_indices(table)?;
        table.reorder(&indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::KeyElement;
    use crate::domain::readers::MemoryReader;

    fn column(table: &CsvTable, column: usize) -> Vec<&str> {
        (0..table.len()).map(|row| table.cell(row, column).unwrap()).collect()
    }

    #[test]
    fn test_sort_strings() {
        let table = CsvTable::load(MemoryReader::new(&[
            &["name"],
            &["value1"],
            &["value2"],
            &["other"],
            &["another"],
            &["yet another"],
        ]))
        .unwrap();
        let sorted = InMemorySorter::new(SortDescription::single(KeyElement::as_string(0)))
            .sorted(&table)
            .unwrap();
        assert_eq!(
            column(&sorted, 0),
            vec!["another", "name", "other", "value1", "value2", "yet another"]
        );
    }

    #[test]
    fn test_sort_longs() {
        let table = CsvTable::load(MemoryReader::new(&[&["43"], &["0"], &["1"], &["-2"], &["567"], &["-40"]])).unwrap();
        let sorted = InMemorySorter::new(SortDescription::single(KeyElement::as_long(0)))
            .sorted(&table)
            .unwrap();
        assert_eq!(column(&sorted, 0), vec!["-40", "-2", "0", "1", "43", "567"]);
    }

    #[test]
    fn test_sort_by_two_keys() {
        let table = CsvTable::load(MemoryReader::new(&[&["b", "2"], &["a", "2"], &["c", "1"], &["d", "1"]])).unwrap();
        let sort = SortDescription::new(vec![
            KeyElement::as_long(1).descending(),
            KeyElement::as_string(0),
        ])
        .unwrap();
        let sorted = InMemorySorter::new(sort).sorted(&table).unwrap();
        assert_eq!(column(&sorted, 0), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_unparsable_key() {
        let table = CsvTable::load(MemoryReader::new(&[&["1"], &["one"]])).unwrap();
        let sorter = InMemorySorter::new(SortDescription::single(KeyElement::as_long(0)));
        assert!(matches!(sorter.sorted(&table), Err(CsvError::BrokenContents(_))));
    }
}
