//! # CLI Argument Definitions
//!
//! Global flags describe the input format and where settings come from; each
//! subcommand maps onto one use case.

use crate::domain::entities::{CsvFormat, KeyElement, KeyType};
use crate::use_cases::{DiffKey, SortStrategy};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// The main CLI structure parsing command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "csv_xxl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(arg_required_else_help = true)]
#[command(about = "Summaries, sorting, cutting and diffs for CSV files larger than memory")]
pub struct Cli {
    /// Treat the first line of every input as a header
    #[arg(short = 'H', long, global = true)]
    pub header: bool,

    /// Single-byte field separator
    #[arg(short, long, global = true, default_value = ",", value_parser = parse_separator)]
    pub separator: u8,

    /// Settings XML file
    #[arg(long, global = true, env = "CSV_XXL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn format(&self) -> CsvFormat {
        CsvFormat::new(self.header, self.separator)
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Count rows and deduce column types
    Summary {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print a JSON array instead of tables
        #[arg(long)]
        json: bool,
    },
    /// Aggregate integer columns in one pass
    Stats {
        file: PathBuf,

        /// Sum of a column
        #[arg(long = "sum", value_name = "COL")]
        sums: Vec<usize>,

        /// Mean of a column
        #[arg(long = "average", value_name = "COL")]
        averages: Vec<usize>,

        /// Greatest value of a column
        #[arg(long = "max", value_name = "COL")]
        maxima: Vec<usize>,

        /// N greatest values of a column, compared as text
        #[arg(long = "top", value_name = "COL:N", value_parser = parse_top)]
        tops: Vec<(usize, usize)>,
    },
    /// Copy selected columns in the given order
    Cut {
        #[arg(short, long)]
        input: PathBuf,

        /// Column index; repeat to keep several columns
        #[arg(short = 'l', long = "column", required = true)]
        columns: Vec<usize>,

        /// Output file; standard output when absent
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sort rows by key columns
    Sort {
        file: PathBuf,

        /// Sort key as FIELD[:TYPE[:ORDER]], e.g. 2:long:desc
        #[arg(short, long = "key", value_name = "KEY")]
        keys: Vec<KeyElement>,

        /// Output file; standard output when absent
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = StrategyArg::Auto)]
        strategy: StrategyArg,
    },
    /// Compare two files row by row
    Diff {
        first: PathBuf,
        second: PathBuf,

        /// Print an ed style edit script
        #[arg(short, long)]
        edit_script: bool,

        /// Key column as FIELD[:TYPE]; every column as text when absent
        #[arg(short = 'c', long = "column", value_name = "KEY", value_parser = parse_diff_key)]
        keys: Vec<DiffKey>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    Auto,
    Memory,
    Index,
    Binarize,
}

impl From<StrategyArg> for SortStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Auto => SortStrategy::Auto,
            StrategyArg::Memory => SortStrategy::Memory,
            StrategyArg::Index => SortStrategy::Index,
            StrategyArg::Binarize => SortStrategy::Binarize,
        }
    }
}

fn parse_separator(value: &str) -> Result<u8, String> {
    let value = if value == "\\t" { "\t" } else { value };
    match value.as_bytes() {
        [byte] if byte.is_ascii() && !matches!(*byte, b'"' | b'\r' | b'\n') => Ok(*byte),
        _ => Err(format!("separator must be one ASCII character other than a quote or line break, got '{}'", value)),
    }
}

fn parse_top(value: &str) -> Result<(usize, usize), String> {
    let (column, count) = value
        .split_once(':')
        .ok_or_else(|| format!("expected COL:N, got '{}'", value))?;
    let column = column.parse().map_err(|_| format!("bad column '{}'", column))?;
    let count = count.parse().map_err(|_| format!("bad count '{}'", count))?;
    Ok((column, count))
}

fn parse_diff_key(value: &str) -> Result<DiffKey, String> {
    let (field, key_type) = match value.split_once(':') {
        Some((field, key_type)) => (field, key_type.parse::<KeyType>().map_err(|e| e.to_string())?),
        None => (value, KeyType::String),
    };
    let field = field.parse().map_err(|_| format!("bad column '{}'", field))?;
    Ok(DiffKey::new(field, key_type))
}
