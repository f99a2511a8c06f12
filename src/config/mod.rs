use crate::domain::codec::TextEncoding;
use crate::domain::repositories::CsvError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Tuning knobs read from a `settings.xml` file
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename = "settings", default)]
pub struct Settings {
    /// Approximate memory budget of the merge and permutation caches, in bytes
    pub memory_limit: u64,

    /// Capacity of buffered readers and writers
    pub io_buffer_size: usize,

    /// Rows sorted in memory per run
    pub batch_size: usize,

    /// Block size of the random access cache
    pub block_size: usize,

    /// Files up to this size are sorted in memory by `--strategy auto`
    pub in_memory_threshold: u64,

    /// Encoding of binarized string columns (e.g. "utf-8", "ascii", "windows-1251")
    pub string_encoding: String,

    /// Directory for temporary sort files; system default when absent
    pub temp_dir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            memory_limit: 256 * 1024 * 1024,
            io_buffer_size: 64 * 1024,
            batch_size: 100_000,
            block_size: 64 * 1024,
            in_memory_threshold: 64 * 1024 * 1024,
            string_encoding: "utf-8".to_string(),
            temp_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from XML file
    pub fn from_file(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path)?;
        let settings: Settings = serde_xml_rs::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Settings from `path` when given, defaults otherwise
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                tracing::debug!("Loading settings from {}", path.display());
                Self::from_file(path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), CsvError> {
        if self.memory_limit == 0 || self.io_buffer_size == 0 || self.batch_size == 0 || self.block_size == 0 {
            return Err(CsvError::invalid(
                "memory_limit, io_buffer_size, batch_size and block_size must be positive",
            ));
        }
        self.text_encoding()?;
        Ok(())
    }

    pub fn text_encoding(&self) -> Result<TextEncoding, CsvError> {
        TextEncoding::for_label(&self.string_encoding)
    }
}
