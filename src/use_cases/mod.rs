/// Use Cases - Application-specific business rules
/// Each `*UseCase` works on whole files and is what the command line adapter drives

pub mod actions;
pub mod analyzer;
pub mod external_sort;
pub mod in_memory_sort;
pub mod kway_merge;
pub mod myers_diff;
pub mod pairing_heap;

pub use actions::{Action, ActionResult, CustomizableAnalyzer};
pub use analyzer::BasicAnalyzer;
pub use external_sort::{ExternalSorter, SortOptions};
pub use in_memory_sort::InMemorySorter;
pub use kway_merge::{KwayMerger, MergeBudget};
pub use myers_diff::{DiffKey, DiffOperation, MyersDiff};
pub use pairing_heap::PairingHeap;

use crate::config::Settings;
use crate::domain::codec::ColumnCodec;
use crate::domain::entities::{CsvFormat, CsvSummary, KeyType, SortDescription};
use crate::domain::readers::CuttingReader;
use crate::domain::repositories::{CsvError, CsvReader, CsvWriter};
use crate::domain::table::CsvTable;
use crate::infrastructure::csv_reader::{CsvReaderBuilder, StreamCsvReader};
use crate::infrastructure::csv_writer::StreamCsvWriter;
use crate::infrastructure::temp_files::FileManager;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;

fn open_reader(path: &Path, format: CsvFormat, settings: &Settings) -> Result<StreamCsvReader<BufReader<File>>, CsvError> {
    CsvReaderBuilder::new().format(format).open(path, settings.io_buffer_size)
}

/// Use case for summarizing a file: row count and per-column types
pub struct SummarizeFileUseCase<'a> {
    settings: &'a Settings,
    format: CsvFormat,
}

impl<'a> SummarizeFileUseCase<'a> {
    pub fn new(settings: &'a Settings, format: CsvFormat) -> Self {
        Self { settings, format }
    }

    pub fn execute(&self, path: &Path) -> Result<CsvSummary, CsvError> {
        tracing::info!("Analyzing {}", path.display());
        BasicAnalyzer::new(open_reader(path, self.format, self.settings)?).run()
    }
}

/// Use case for running a list of actions over one file
pub struct AnalyzeFileUseCase<'a> {
    settings: &'a Settings,
    format: CsvFormat,
}

impl<'a> AnalyzeFileUseCase<'a> {
    pub fn new(settings: &'a Settings, format: CsvFormat) -> Self {
        Self { settings, format }
    }

    pub fn execute(&self, path: &Path, actions: Vec<Box<dyn Action + '_>>) -> Result<Vec<ActionResult>, CsvError> {
        let reader = open_reader(path, self.format, self.settings)?;
        actions
            .into_iter()
            .fold(CustomizableAnalyzer::builder(reader), |builder, action| builder.add_action(action))
            .build()
            .run()
    }
}

/// Use case for copying selected columns of a file, in the given order
pub struct CutColumnsUseCase<'a> {
    settings: &'a Settings,
    format: CsvFormat,
}

impl<'a> CutColumnsUseCase<'a> {
    pub fn new(settings: &'a Settings, format: CsvFormat) -> Self {
        Self { settings, format }
    }

    pub fn execute<W: CsvWriter + ?Sized>(&self, input: &Path, columns: Vec<usize>, writer: &mut W) -> Result<u64, CsvError> {
        let mut reader = CuttingReader::new(open_reader(input, self.format, self.settings)?, columns)?;
        if let Some(header) = reader.meta().header_row() {
            writer.write_row(header)?;
        }
        let mut rows = 0;
        while let Some(row) = reader.next_row()? {
            writer.write_row(&row)?;
            rows += 1;
        }
        writer.flush()?;
        Ok(rows)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortStrategy {
    /// In memory up to the configured threshold, by index above it
    Auto,
    Memory,
    Index,
    Binarize,
}

/// Use case for sorting a file by one or more key columns
pub struct SortFileUseCase<'a> {
    settings: &'a Settings,
    format: CsvFormat,
}

impl<'a> SortFileUseCase<'a> {
    pub fn new(settings: &'a Settings, format: CsvFormat) -> Self {
        Self { settings, format }
    }

    fn sorter(&self) -> ExternalSorter {
        let sorter = ExternalSorter::new(SortOptions::from(self.settings)).with_separator(self.format.separator);
        match &self.settings.temp_dir {
            Some(dir) => sorter.with_temp_dir(dir),
            None => sorter,
        }
    }

    fn resolve(&self, input: &Path, strategy: SortStrategy) -> Result<SortStrategy, CsvError> {
        if strategy != SortStrategy::Auto {
            return Ok(strategy);
        }
        let size = std::fs::metadata(input)?.len();
        Ok(if size <= self.settings.in_memory_threshold {
            SortStrategy::Memory
        } else {
            SortStrategy::Index
        })
    }

    fn analyze(&self, input: &Path, sort: &SortDescription) -> Result<CsvSummary, CsvError> {
        let summary = SummarizeFileUseCase::new(self.settings, self.format).execute(input)?;
        if let Some(key) = sort.keys().iter().find(|key| key.field >= summary.columns.len()) {
            return Err(CsvError::invalid(format!(
                "sort key column {} is out of range for {} columns",
                key.field,
                summary.columns.len()
            )));
        }
        Ok(summary)
    }

    /// Sort `input` into `out`, returning the number of data rows
    pub fn execute<W: Write + ?Sized>(
        &self,
        input: &Path,
        sort: &SortDescription,
        strategy: SortStrategy,
        out: &mut W,
    ) -> Result<u64, CsvError> {
        let strategy = self.resolve(input, strategy)?;
        tracing::info!("Sorting {} with {:?} strategy", input.display(), strategy);
        let encoding = self.settings.text_encoding()?;

        match strategy {
            SortStrategy::Memory | SortStrategy::Auto => {
                let table = CsvTable::load(open_reader(input, self.format, self.settings)?)?;
                let sorted = InMemorySorter::new(sort.clone()).sorted(&table)?;
                let mut writer = StreamCsvWriter::with_separator(&mut *out, self.format.separator);
                sorted.write_to(&mut writer)?;
                Ok(sorted.len() as u64)
            }
            SortStrategy::Binarize => {
                let summary = self.analyze(input, sort)?;
                let codecs = summary
                    .columns
                    .iter()
                    .map(|column| ColumnCodec::for_column(column, encoding))
                    .collect();
                let reader = open_reader(input, self.format, self.settings)?;
                let mut writer = StreamCsvWriter::with_separator(&mut *out, self.format.separator);
                let rows = self.sorter().sort_by_binarizing(reader, sort, codecs, &mut writer)?;
                writer.flush()?;
                Ok(rows)
            }
            SortStrategy::Index => {
                let summary = self.analyze(input, sort)?;
                let key_codecs = sort
                    .keys()
                    .iter()
                    .map(|key| ColumnCodec::for_key(key.key_type, &summary.columns[key.field], encoding))
                    .collect();
                let reader = open_reader(input, self.format, self.settings)?;

                let mut temp = match &self.settings.temp_dir {
                    Some(dir) => FileManager::create_temp_directory_in(Path::new(dir), "csv-sorted-")?,
                    None => FileManager::create_temp_directory("csv-sorted-")?,
                };
                let sorted = temp.create_temp_file_with_suffix("sorted-", ".csv")?;
                let rows = self.sorter().sort_by_index(input, reader, sort, key_codecs, &sorted)?;
                io::copy(&mut File::open(&sorted)?, out)?;
                out.flush()?;
                temp.delete()?;
                Ok(rows)
            }
        }
    }
}

/// Use case for comparing two files row by row on key columns
pub struct DiffFilesUseCase<'a> {
    settings: &'a Settings,
    format: CsvFormat,
}

impl<'a> DiffFilesUseCase<'a> {
    pub fn new(settings: &'a Settings, format: CsvFormat) -> Self {
        Self { settings, format }
    }

    /// Write the differences of `first` and `second` to `out`. With no keys,
    /// whole rows are compared as strings.
    pub fn execute<W: Write + ?Sized>(
        &self,
        first: &Path,
        second: &Path,
        keys: Vec<DiffKey>,
        edit_script: bool,
        out: &mut W,
    ) -> Result<(), CsvError> {
        let first = CsvTable::load(open_reader(first, self.format, self.settings)?)?;
        let second = CsvTable::load(open_reader(second, self.format, self.settings)?)?;
        let keys = if keys.is_empty() {
            let width = first.meta().len().max(second.meta().len());
            (0..width).map(|field| DiffKey::new(field, KeyType::String)).collect()
        } else {
            keys
        };
        tracing::debug!("Comparing {} and {} rows on {} keys", first.len(), second.len(), keys.len());

        let diff = MyersDiff::new(keys)?;
        if edit_script {
            diff.edit_script(&first, &second, out)?;
        } else {
            diff.diff(&first, &second, out)?;
        }
        out.flush()?;
        Ok(())
    }
}
