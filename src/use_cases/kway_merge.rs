//! K-way merging of sorted runs of fixed-width binary rows
//!
//! A run is `run_entries` consecutive entries that are already sorted; the last run
//! may be shorter. The single-pass merge reads every run at once. The double-pass
//! merge first merges groups of about sqrt(runs) runs into a temporary file, then
//! merges the groups, so each pass keeps only about sqrt(runs) region caches alive.

use crate::domain::codec::{ByteComparator, ColumnCodec, RowLayout, SimpleByteComparator};
use crate::domain::entities::{KeyType, SortDescription};
use crate::domain::repositories::CsvError;
use crate::domain::utils::ceil_sqrt;
use crate::infrastructure::binary_io::{MultiRegionReader, Region};
use crate::infrastructure::temp_files::FileManager;
use crate::use_cases::pairing_heap::PairingHeap;
use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

/// Memory available to one merge pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeBudget {
    /// Total bytes shared by all region caches of a pass
    pub memory_limit: u64,
    /// Upper bound for a single region cache and for the output buffer
    pub cache_size: usize,
}

impl MergeBudget {
    /// Cache bytes for each of `regions` regions, a whole number of rows
    pub fn region_cache(&self, regions: usize, row_size: usize) -> usize {
        let share = (self.memory_limit / regions.max(1) as u64).min(self.cache_size as u64) as usize;
        (share / row_size).max(1) * row_size
    }
}

pub struct KwayMerger<B = SimpleByteComparator> {
    layout: RowLayout,
    sort: SortDescription,
    comparator: B,
}

impl KwayMerger<SimpleByteComparator> {
    pub fn new(layout: RowLayout, sort: SortDescription) -> Result<Self, CsvError> {
        Self::with_comparator(layout, sort, SimpleByteComparator)
    }
}

impl<B: ByteComparator> KwayMerger<B> {
    pub fn with_comparator(layout: RowLayout, sort: SortDescription, comparator: B) -> Result<Self, CsvError> {
        if let Some(key) = sort.keys().iter().find(|k| k.field >= layout.len()) {
            return Err(CsvError::invalid(format!(
                "sort key column {} is outside the {} binarized columns",
                key.field,
                layout.len()
            )));
        }
        Ok(Self { layout, sort, comparator })
    }

    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }

    pub fn compare_entries(&self, a: &[u8], b: &[u8]) -> Ordering {
        for key in self.sort.keys() {
            let codec = &self.layout.codecs()[key.field];
            let (left, right) = (self.layout.field(a, key.field), self.layout.field(b, key.field));
            let ordering = match codec {
                // numeric keys stored as text still compare by value
                ColumnCodec::Str { .. } if key.key_type != KeyType::String => key
                    .key_type
                    .parse(&codec.decode(left))
                    .ok()
                    .cmp(&key.key_type.parse(&codec.decode(right)).ok()),
                _ => self.comparator.compare(codec, left, right),
            };
            let ordering = key.order.apply(ordering);
            if ordering.is_ne() {
                return ordering;
            }
        }
        Ordering::Equal
    }

    /// Merge every region of `reader` into `out`. Equal entries keep region order.
    pub fn merge_regions<R, W>(&self, reader: &mut MultiRegionReader<R>, out: &mut W) -> Result<u64, CsvError>
    where
        R: Read + Seek,
        W: Write + ?Sized,
    {
        let row_size = self.layout.row_size();
        let mut heap = PairingHeap::new(|a: &(Vec<u8>, usize), b: &(Vec<u8>, usize)| {
            self.compare_entries(&a.0, &b.0).then(a.1.cmp(&b.1))
        });
        for region in 0..reader.region_count() {
            if let Some(entry) = next_entry(reader, region, vec![0; row_size])? {
                heap.push((entry, region));
            }
        }

        let mut rows = 0;
        while let Some((entry, region)) = heap.pop_min() {
            out.write_all(&entry)?;
            rows += 1;
            if let Some(entry) = next_entry(reader, region, entry)? {
                heap.push((entry, region));
            }
        }
        Ok(rows)
    }

    fn plan_runs(&self, input: &Path, run_entries: u64) -> Result<Vec<Region>, CsvError> {
        if run_entries == 0 {
            return Err(CsvError::invalid("run length must be positive"));
        }
        let total = fs::metadata(input)?.len();
        let row_size = self.layout.row_size() as u64;
        if total % row_size != 0 {
            return Err(CsvError::broken(format!(
                "binary file of {} bytes is not a whole number of {}-byte rows",
                total, row_size
            )));
        }
        Ok(Region::split(total, run_entries * row_size))
    }

    /// Merge `runs` of `input` in groups of `fan_in`; returns the merged groups as regions of `output`
    fn merge_pass(
        &self,
        input: &Path,
        output: &Path,
        runs: &[Region],
        fan_in: usize,
        budget: &MergeBudget,
    ) -> Result<Vec<Region>, CsvError> {
        let row_size = self.layout.row_size();
        let mut source = File::open(input)?;
        let mut out = BufWriter::with_capacity(budget.cache_size.max(row_size), File::create(output)?);
        let mut merged = Vec::new();
        let mut written = 0u64;

        for group in runs.chunks(fan_in.max(1)) {
            let cache = budget.region_cache(group.len(), row_size);
            let mut reader = MultiRegionReader::new(&mut source, group.to_vec(), cache)?;
            let rows = self.merge_regions(&mut reader, &mut out)?;
            let len = rows * row_size as u64;
            merged.push(Region::new(written, len));
            written += len;
        }
        out.flush()?;
        Ok(merged)
    }

    /// Merge all runs of `input` at once; returns the number of rows
    pub fn single_pass_merge(
        &self,
        input: &Path,
        output: &Path,
        run_entries: u64,
        budget: &MergeBudget,
    ) -> Result<u64, CsvError> {
        let runs = self.plan_runs(input, run_entries)?;
        tracing::debug!("Single pass merge of {} runs", runs.len());
        let merged = self.merge_pass(input, output, &runs, runs.len(), budget)?;
        Ok(self.rows_in(&merged))
    }

    /// Merge groups of about sqrt(runs) runs into a temporary file, then merge the groups
    pub fn double_pass_merge(
        &self,
        input: &Path,
        output: &Path,
        run_entries: u64,
        budget: &MergeBudget,
        temp: &mut FileManager,
    ) -> Result<u64, CsvError> {
        let runs = self.plan_runs(input, run_entries)?;
        let fan_in = ceil_sqrt(runs.len()).max(2);
        if fan_in >= runs.len() {
            let merged = self.merge_pass(input, output, &runs, runs.len(), budget)?;
            return Ok(self.rows_in(&merged));
        }

        tracing::info!("Merging {} runs in groups of {}", runs.len(), fan_in);
        let intermediate = temp.create_temp_file("merge-pass-")?;
        let groups = self.merge_pass(input, &intermediate, &runs, fan_in, budget)?;
        let merged = self.merge_pass(&intermediate, output, &groups, groups.len(), budget)?;
        fs::remove_file(&intermediate)?;
        Ok(self.rows_in(&merged))
    }

    fn rows_in(&self, regions: &[Region]) -> u64 {
        regions.iter().map(|r| r.len).sum::<u64>() / self.layout.row_size() as u64
    }
}

fn next_entry<R: Read + Seek>(
    reader: &mut MultiRegionReader<R>,
    region: usize,
    mut entry: Vec<u8>,
) -> Result<Option<Vec<u8>>, CsvError> {
    match reader.read(region, &mut entry)? {
        0 => Ok(None),
        n if n == entry.len() => Ok(Some(entry)),
        n => Err(CsvError::broken(format!(
            "region {} ends in the middle of an entry ({} of {} bytes)",
            region,
            n,
            entry.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::codec::{binarize, ColumnCodec, TextEncoding};
    use crate::domain::entities::KeyElement;
    use crate::domain::readers::MemoryReader;

    const PRESORTED: &[&[&str]] = &[
        &["4", "aa"],
        &["5", "bb"],
        &["7", "aa"],
        &["2", "cc"],
        &["3", "bb"],
        &["5", "aa"],
        &["8", "bb"],
        &["8", "cc"],
    ];

    fn layout() -> RowLayout {
        RowLayout::new(vec![
            ColumnCodec::Int,
            ColumnCodec::string(2, TextEncoding::Ascii).unwrap(),
        ])
        .unwrap()
    }

    fn budget() -> MergeBudget {
        MergeBudget { memory_limit: 64, cache_size: 12 }
    }

    fn write_input(manager: &mut FileManager, rows: &[&[&str]]) -> std::path::PathBuf {
        let path = manager.create_temp_file("in").unwrap();
        let mut file = File::create(&path).unwrap();
        binarize(&mut MemoryReader::new(rows), &layout(), &mut file).unwrap();
        path
    }

    fn decode(path: &Path) -> Vec<String> {
        let layout = layout();
        fs::read(path)
            .unwrap()
            .chunks(layout.row_size())
            .map(|entry| layout.decode_row(entry).join(","))
            .collect()
    }

    #[test]
    fn test_single_pass_merge() {
        let mut manager = FileManager::create_temp_directory("test-merge").unwrap();
        let input = write_input(&mut manager, PRESORTED);
        let output = manager.create_temp_file("out").unwrap();
        let sort = SortDescription::new(vec![KeyElement::as_long(0), KeyElement::as_string(1)]).unwrap();
        let merger = KwayMerger::new(layout(), sort).unwrap();

        let rows = merger.single_pass_merge(&input, &output, 3, &budget()).unwrap();
        assert_eq!(rows, 8);
        assert_eq!(
            decode(&output),
            vec!["2,cc", "3,bb", "4,aa", "5,aa", "5,bb", "7,aa", "8,bb", "8,cc"]
        );
    }

    #[test]
    fn test_double_pass_merge_descending_is_stable() {
        let rows: Vec<&[&str]> = vec![
            &["1", "aa"],
            &["2", "ab"],
            &["2", "ba"],
            &["3", "bb"],
            &["1", "ca"],
            &["0", "cb"],
            &["2", "da"],
            &["9", "db"],
            &["5", "ea"],
        ];
        let mut manager = FileManager::create_temp_directory("test-merge").unwrap();
        let input = write_input(&mut manager, &rows);
        let output = manager.create_temp_file("out").unwrap();
        let sort = SortDescription::single(KeyElement::as_long(0).descending());
        let merger = KwayMerger::new(layout(), sort).unwrap();

        // nine runs of one row: three groups of three in the first pass
        let merged = merger.double_pass_merge(&input, &output, 1, &budget(), &mut manager).unwrap();
        assert_eq!(merged, 9);
        assert_eq!(
            decode(&output),
            vec!["9,db", "5,ea", "3,bb", "2,ab", "2,ba", "2,da", "1,aa", "1,ca", "0,cb"]
        );
    }

    #[test]
    fn test_empty_input() {
        let mut manager = FileManager::create_temp_directory("test-merge").unwrap();
        let input = write_input(&mut manager, &[]);
        let output = manager.create_temp_file("out").unwrap();
        let merger = KwayMerger::new(layout(), SortDescription::single(KeyElement::as_long(0))).unwrap();

        assert_eq!(merger.double_pass_merge(&input, &output, 4, &budget(), &mut manager).unwrap(), 0);
        assert_eq!(fs::metadata(&output).unwrap().len(), 0);
    }

    #[test]
    fn test_rejects_partial_rows() {
        let mut manager = FileManager::create_temp_directory("test-merge").unwrap();
        let input = manager.create_temp_file("in").unwrap();
        fs::write(&input, [0u8; 7]).unwrap();
        let output = manager.create_temp_file("out").unwrap();
        let merger = KwayMerger::new(layout(), SortDescription::single(KeyElement::as_long(0))).unwrap();

        assert!(matches!(
            merger.single_pass_merge(&input, &output, 2, &budget()),
            Err(CsvError::BrokenContents(_))
        ));
    }

    #[test]
    fn test_rejects_key_outside_layout() {
        let sort = SortDescription::single(KeyElement::as_long(2));
        assert!(KwayMerger::new(layout(), sort).is_err());
    }

    #[test]
    fn test_region_cache_is_whole_rows() {
        let budget = MergeBudget { memory_limit: 100, cache_size: 1000 };
        assert_eq!(budget.region_cache(3, 6), 30);
        assert_eq!(budget.region_cache(1000, 6), 6);
    }

    #[test]
    fn test_numeric_key_in_text_column_compares_by_value() {
        let layout = RowLayout::new(vec![ColumnCodec::string(3, TextEncoding::Utf8).unwrap()]).unwrap();
        let merger = KwayMerger::new(layout.clone(), SortDescription::single(KeyElement::as_long(0))).unwrap();
        let entry = |value: &str| {
            let mut out = Vec::new();
            layout.encode_row(&[value.to_string()], &mut out).unwrap();
            out
        };

        assert_eq!(merger.compare_entries(&entry("+5"), &entry("10")), Ordering::Less);
        assert_eq!(merger.compare_entries(&entry("007"), &entry("7")), Ordering::Equal);
        assert_eq!(merger.compare_entries(&entry("-0"), &entry("-1")), Ordering::Greater);
    }
}
