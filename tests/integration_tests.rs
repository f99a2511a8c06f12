/// Integration tests for csv_xxl
/// These tests run whole sort pipelines from reader to writer

use csv_xxl::config::Settings;
use csv_xxl::domain::codec::{ColumnCodec, TextEncoding};
use csv_xxl::domain::entities::{CsvFormat, KeyElement, SortDescription};
use csv_xxl::domain::repositories::{CsvReader, CsvWriter};
use csv_xxl::infrastructure::csv_reader::CsvReaderBuilder;
use csv_xxl::infrastructure::csv_writer::StreamCsvWriter;
use csv_xxl::use_cases::{ExternalSorter, SortFileUseCase, SortOptions, SortStrategy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Reverse;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const ALPHABET: &[char] = &['a', 'b', 'c', 'x', 'y', 'z', ',', '"', '\n', ' ', 'é'];

fn random_text(rng: &mut StdRng) -> String {
    let len = rng.gen_range(0..6);
    (0..len).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())]).collect()
}

fn random_rows(seed: u64, count: usize) -> Vec<Vec<String>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            vec![
                rng.gen_range(-50i64..50).to_string(),
                random_text(&mut rng),
                rng.gen_range(i64::MIN..i64::MAX).to_string(),
            ]
        })
        .collect()
}

fn to_csv(header: Option<&[&str]>, rows: &[Vec<String>]) -> String {
    let mut writer = StreamCsvWriter::new(Vec::new());
    if let Some(header) = header {
        let header: Vec<String> = header.iter().map(|h| h.to_string()).collect();
        writer.write_row(&header).unwrap();
    }
    for row in rows {
        writer.write_row(row).unwrap();
    }
    writer.flush().unwrap();
    String::from_utf8(writer.into_inner()).unwrap()
}

fn small_settings(dir: &TempDir) -> Settings {
    Settings {
        memory_limit: 64 * 1024,
        io_buffer_size: 1024,
        batch_size: 50,
        block_size: 256,
        in_memory_threshold: 0,
        temp_dir: Some(dir.path().to_string_lossy().into_owned()),
        ..Settings::default()
    }
}

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_binarizing_sort_matches_stable_sort() {
    let dir = TempDir::new().unwrap();
    let rows = random_rows(7, 1000);
    let input = to_csv(None, &rows);

    let sorter = ExternalSorter::new(SortOptions {
        memory_limit: 32 * 1024,
        io_buffer_size: 512,
        batch_size: 13,
        block_size: 128,
    })
    .with_temp_dir(dir.path());
    let sort = SortDescription::new(vec![KeyElement::as_long(0).descending()]).unwrap();
    let codecs = vec![
        ColumnCodec::Int,
        ColumnCodec::string(5, TextEncoding::Utf8).unwrap(),
        ColumnCodec::big_int(8).unwrap(),
    ];
    let reader = CsvReaderBuilder::new().build(input.as_bytes()).unwrap();
    let mut writer = StreamCsvWriter::new(Vec::new());
    let sorted_rows = sorter.sort_by_binarizing(reader, &sort, codecs, &mut writer).unwrap();

    let mut expected = rows.clone();
    expected.sort_by_key(|row| Reverse(row[0].parse::<i64>().unwrap()));
    assert_eq!(sorted_rows, 1000);
    assert_eq!(String::from_utf8(writer.into_inner()).unwrap(), to_csv(None, &expected));

    // every temporary file is gone once the sort returns
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_all_strategies_agree_on_random_file() {
    let dir = TempDir::new().unwrap();
    let rows = random_rows(42, 1000);
    let path = write_file(&dir, "random.csv", &to_csv(Some(&["n", "text", "big"]), &rows));
    let settings = small_settings(&dir);
    let use_case = SortFileUseCase::new(&settings, CsvFormat::new(true, b','));

    let sort = SortDescription::new(vec!["1".parse().unwrap(), "2:bigint:desc".parse().unwrap()]).unwrap();
    let mut expected = rows.clone();
    expected.sort_by(|a, b| {
        a[1].cmp(&b[1])
            .then_with(|| b[2].parse::<i128>().unwrap().cmp(&a[2].parse::<i128>().unwrap()))
    });
    let expected = to_csv(Some(&["n", "text", "big"]), &expected);

    for strategy in [SortStrategy::Memory, SortStrategy::Index, SortStrategy::Binarize] {
        let mut out = Vec::new();
        let sorted = use_case.execute(&path, &sort, strategy, &mut out).unwrap();
        assert_eq!(sorted, 1000, "{:?}", strategy);
        assert_eq!(String::from_utf8(out).unwrap(), expected, "{:?}", strategy);
    }
}

#[test]
fn test_index_sort_keeps_source_bytes() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "quoted.csv", "id,note\n3,\"x\"\n1,\"multi\nline\"\n2,plain");
    let settings = small_settings(&dir);
    let sort = SortDescription::single(KeyElement::as_long(0));

    let mut out = Vec::new();
    SortFileUseCase::new(&settings, CsvFormat::new(true, b','))
        .execute(&path, &sort, SortStrategy::Auto, &mut out)
        .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), "id,note\n1,\"multi\nline\"\n2,plain\n3,\"x\"\n");
}

#[test]
fn test_sorted_output_reads_back() {
    let dir = TempDir::new().unwrap();
    let rows = random_rows(3, 300);
    let path = write_file(&dir, "rows.csv", &to_csv(None, &rows));
    let settings = small_settings(&dir);
    let sort = SortDescription::single(KeyElement::as_long(2));

    let mut out = Vec::new();
    SortFileUseCase::new(&settings, CsvFormat::default())
        .execute(&path, &sort, SortStrategy::Index, &mut out)
        .unwrap();

    let mut reader = CsvReaderBuilder::new().build(out.as_slice()).unwrap();
    let sorted = reader.all_rows().unwrap();
    assert_eq!(sorted.len(), 300);
    let keys: Vec<i64> = sorted.iter().map(|row| row[2].parse().unwrap()).collect();
    assert!(keys.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn test_strategies_agree_on_quotes_inside_unquoted_fields() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "quotes.csv", "5,a\"b\n3,c\"d\n1,e\n");
    let settings = small_settings(&dir);
    let sort = SortDescription::single(KeyElement::as_long(0));
    let use_case = SortFileUseCase::new(&settings, CsvFormat::default());

    let expected = vec![
        vec!["1".to_string(), "e".to_string()],
        vec!["3".to_string(), "c\"d".to_string()],
        vec!["5".to_string(), "a\"b".to_string()],
    ];
    for strategy in [SortStrategy::Memory, SortStrategy::Index, SortStrategy::Binarize] {
        let mut out = Vec::new();
        let sorted = use_case.execute(&path, &sort, strategy, &mut out).unwrap();
        assert_eq!(sorted, 3, "{:?}", strategy);
        let rows = CsvReaderBuilder::new().build(out.as_slice()).unwrap().all_rows().unwrap();
        assert_eq!(rows, expected, "{:?}", strategy);
    }
}
