//! Sorting CSV files larger than memory
//!
//! Both strategies pre-sort batches of rows in memory, write them as fixed-width
//! binary entries and merge the sorted runs with a double-pass k-way merge.
//! `sort_by_binarizing` round-trips every column through the binary form.
//! `sort_by_index` binarizes only the key columns plus the row number, then
//! copies the original row bytes into sorted order.

use crate::config::Settings;
use crate::domain::codec::{binarize, debinarize, read_entry, ColumnCodec, RowLayout};
use crate::domain::entities::{KeyElement, KeyValue, SortDescription};
use crate::domain::readers::{BatchSortingReader, CuttingReader, EnumeratingReader};
use crate::domain::repositories::{CsvError, CsvReader, CsvWriter};
use crate::infrastructure::offsets::{extract_offsets, row_span, OffsetSummary, OFFSET_BYTES};
use crate::infrastructure::random_access::RandomAccessCachedReader;
use crate::infrastructure::temp_files::FileManager;
use crate::use_cases::kway_merge::{KwayMerger, MergeBudget};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOptions {
    pub memory_limit: u64,
    pub io_buffer_size: usize,
    pub batch_size: usize,
    pub block_size: usize,
}

impl Default for SortOptions {
    fn default() -> Self {
        SortOptions::from(&Settings::default())
    }
}

impl From<&Settings> for SortOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            memory_limit: settings.memory_limit,
            io_buffer_size: settings.io_buffer_size,
            batch_size: settings.batch_size,
            block_size: settings.block_size,
        }
    }
}

pub struct ExternalSorter {
    options: SortOptions,
    temp_root: Option<PathBuf>,
    separator: u8,
}

impl ExternalSorter {
    pub fn new(options: SortOptions) -> Self {
        Self {
            options,
            temp_root: None,
            separator: b',',
        }
    }

    /// Field separator of the files given to `sort_by_index`
    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    /// Create temporary files under `dir` instead of the system temp directory
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(dir.into());
        self
    }

    fn file_manager(&self) -> io::Result<FileManager> {
        match &self.temp_root {
            Some(root) => FileManager::create_temp_directory_in(root, "csv-sort-"),
            None => FileManager::create_temp_directory("csv-sort-"),
        }
    }

    fn budget(&self) -> MergeBudget {
        MergeBudget {
            memory_limit: self.options.memory_limit,
            cache_size: self.options.io_buffer_size,
        }
    }

    fn validate(&self) -> Result<(), CsvError> {
        if self.options.batch_size == 0 || self.options.io_buffer_size == 0 || self.options.block_size == 0 {
            return Err(CsvError::invalid("batch, buffer and block sizes must be positive"));
        }
        Ok(())
    }

    /// Sort with every column binarized by `codecs`; the header, if any, is written first
    pub fn sort_by_binarizing<R, W>(
        &self,
        reader: R,
        sort: &SortDescription,
        codecs: Vec<ColumnCodec>,
        writer: &mut W,
    ) -> Result<u64, CsvError>
    where
        R: CsvReader,
        W: CsvWriter + ?Sized,
    {
        self.validate()?;
        let layout = RowLayout::new(codecs)?;
        let merger = KwayMerger::new(layout, sort.clone())?;
        let header = reader.meta().header_row().map(<[String]>::to_vec);
        let mut temp = self.file_manager()?;
        let binary = temp.create_temp_file("rows-")?;
        let sorted = temp.create_temp_file("rows-sorted-")?;

        let mut batches = BatchSortingReader::new(reader, self.options.batch_size, sort.clone())?;
        let rows = {
            let mut out = BufWriter::with_capacity(self.options.io_buffer_size, File::create(&binary)?);
            binarize(&mut batches, merger.layout(), &mut out)?
        };
        tracing::info!("Binarized {} rows in {} sorted batches", rows, batches.batches());

        merger.double_pass_merge(
            &binary,
            &sorted,
            self.options.batch_size as u64,
            &self.budget(),
            &mut temp,
        )?;

        if let Some(header) = header {
            writer.write_row(&header)?;
        }
        let mut input = BufReader::with_capacity(self.options.io_buffer_size, File::open(&sorted)?);
        debinarize(&mut input, merger.layout(), writer)?;
        temp.delete()?;
        Ok(rows)
    }

    /// Sort the file at `source` into `output` by building a sorted index of
    /// `(keys, row number)` and copying the source rows in index order.
    /// `reader` must read `source`; `key_codecs` holds one codec per sort key.
    pub fn sort_by_index<R: CsvReader>(
        &self,
        source: &Path,
        reader: R,
        sort: &SortDescription,
        key_codecs: Vec<ColumnCodec>,
        output: &Path,
    ) -> Result<u64, CsvError> {
        self.validate()?;
        if key_codecs.len() != sort.keys().len() {
            return Err(CsvError::invalid(format!(
                "{} key codecs given for {} sort keys",
                key_codecs.len(),
                sort.keys().len()
            )));
        }
        let has_header = reader.meta().has_names();

        // index rows are the key columns followed by the row number
        let row_number = sort.keys().len();
        let mut index_keys: Vec<KeyElement> = sort
            .keys()
            .iter()
            .enumerate()
            .map(|(i, key)| KeyElement::new(i, key.key_type, key.order))
            .collect();
        index_keys.push(KeyElement::as_long(row_number));
        let index_sort = SortDescription::new(index_keys)?;
        let mut codecs = key_codecs;
        codecs.push(ColumnCodec::Long);
        let merger = KwayMerger::new(RowLayout::new(codecs)?, index_sort.clone())?;

        let mut temp = self.file_manager()?;
        let index = temp.create_temp_file("index-")?;
        let sorted_index = temp.create_temp_file("index-sorted-")?;
        let offsets = temp.create_temp_file("offsets-")?;

        let keys_only = CuttingReader::new(reader, sort.fields())?;
        let mut batches = BatchSortingReader::new(
            EnumeratingReader::new(keys_only),
            self.options.batch_size,
            index_sort,
        )?;
        let rows = {
            let mut out = BufWriter::with_capacity(self.options.io_buffer_size, File::create(&index)?);
            binarize(&mut batches, merger.layout(), &mut out)?
        };
        tracing::info!("Indexed {} rows in {} sorted batches", rows, batches.batches());

        merger.double_pass_merge(
            &index,
            &sorted_index,
            self.options.batch_size as u64,
            &self.budget(),
            &mut temp,
        )?;

        let summary = extract_offsets(
            File::open(source)?,
            File::create(&offsets)?,
            self.options.io_buffer_size,
            self.options.io_buffer_size,
            has_header,
            self.separator,
        )?;
        if summary.rows != rows {
            return Err(CsvError::broken(format!(
                "{} rows were indexed but {} row ends were found",
                rows, summary.rows
            )));
        }

        self.permute(source, &sorted_index, &offsets, summary, merger.layout(), output)?;
        temp.delete()?;
        Ok(rows)
    }

    fn permute(
        &self,
        source: &Path,
        sorted_index: &Path,
        offsets: &Path,
        summary: OffsetSummary,
        layout: &RowLayout,
        output: &Path,
    ) -> Result<(), CsvError> {
        let offset_memory = (self.options.memory_limit / 4).max(OFFSET_BYTES as u64);
        let row_memory = self.options.memory_limit.saturating_sub(offset_memory);
        let offset_block = (self.options.block_size / OFFSET_BYTES).max(1) * OFFSET_BYTES;

        let mut rows = RandomAccessCachedReader::new(File::open(source)?, row_memory, self.options.block_size)?;
        let mut ends = RandomAccessCachedReader::new(File::open(offsets)?, offset_memory, offset_block)?;
        let mut index = BufReader::with_capacity(self.options.io_buffer_size, File::open(sorted_index)?);
        let mut out = BufWriter::with_capacity(self.options.io_buffer_size, File::create(output)?);

        let mut line = Vec::new();
        if let Some(header_end) = summary.header_end {
            line.resize(header_end as usize, 0);
            rows.read(0, &mut line)?;
            out.write_all(&line)?;
            out.write_all(b"\n")?;
        }

        let row_number_column = layout.len() - 1;
        let mut entry = vec![0u8; layout.row_size()];
        while read_entry(&mut index, &mut entry)? {
            let row = match layout.decode_key(&entry, row_number_column) {
                KeyValue::Long(n) if n >= 0 => n as u64,
                other => return Err(CsvError::broken(format!("bad row number {:?} in sort index", other))),
            };
            let end = read_offset(&mut ends, row)?;
            let previous = match row {
                0 => None,
                _ => Some(read_offset(&mut ends, row - 1)?),
            };
            let (start, end) = row_span(end, previous, summary.header_end);
            line.resize((end - start) as usize, 0);
            rows.read(start, &mut line)?;
            out.write_all(&line)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;

        tracing::debug!(
            "Permutation cache miss rates: rows {:.3}, offsets {:.3}",
            rows.miss_rate(),
            ends.miss_rate()
        );
        Ok(())
    }
}

fn read_offset<R: Read + Seek>(ends: &mut RandomAccessCachedReader<R>, row: u64) -> Result<u64, CsvError> {
    let mut buf = [0u8; OFFSET_BYTES];
    ends.read(row * OFFSET_BYTES as u64, &mut buf)?;
    Ok(u64::from_be_bytes(buf))
}
