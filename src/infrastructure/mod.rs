/// Infrastructure layer - file formats and buffered file access
pub mod binary_io;
pub mod csv_reader;
pub mod csv_writer;
pub mod offsets;
pub mod random_access;
pub mod temp_files;

pub use binary_io::{MultiRegionReader, Region};
pub use csv_reader::{CsvReaderBuilder, StreamCsvReader};
pub use csv_writer::StreamCsvWriter;
pub use offsets::{extract_offsets, row_span, OffsetSummary, OFFSET_BYTES};
pub use random_access::RandomAccessCachedReader;
pub use temp_files::FileManager;
