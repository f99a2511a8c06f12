//! Command handlers: translate parsed arguments into use case calls and
//! render their results

use super::args::{Cli, Commands};
use crate::config::Settings;
use crate::domain::entities::{CsvFormat, CsvSummary, KeyElement, SortDescription};
use crate::domain::repositories::CsvError;
use crate::infrastructure::csv_writer::StreamCsvWriter;
use crate::use_cases::actions::{max_values_string, AverageAction, MaxIntAction, SumAction};
use crate::use_cases::{
    Action, AnalyzeFileUseCase, CutColumnsUseCase, DiffFilesUseCase, SortFileUseCase, SortStrategy,
    SummarizeFileUseCase,
};
use anyhow::Context;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Run the parsed command, writing results to `out`
pub fn run(cli: Cli, out: &mut dyn Write) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    let format = cli.format();

    match cli.command {
        Commands::Summary { files, json } => summary(&settings, format, &files, json, out),
        Commands::Stats {
            file,
            sums,
            averages,
            maxima,
            tops,
        } => stats(&settings, format, &file, StatsRequest { sums, averages, maxima, tops }, out),
        Commands::Cut { input, columns, output } => cut(&settings, format, &input, columns, output, out),
        Commands::Sort {
            file,
            keys,
            output,
            strategy,
        } => sort(&settings, format, &file, keys, output, strategy.into(), out),
        Commands::Diff {
            first,
            second,
            edit_script,
            keys,
        } => {
            DiffFilesUseCase::new(&settings, format).execute(&first, &second, keys, edit_script, out)?;
            Ok(())
        }
    }
}

/// Process exit code for an error: 2 for I/O failures, 1 for everything else
pub fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<CsvError>() {
        Some(CsvError::Io(_)) => 2,
        Some(_) => 1,
        None if error.downcast_ref::<std::io::Error>().is_some() => 2,
        None => 1,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Serialize)]
struct FileSummary<'a> {
    file: String,
    #[serde(flatten)]
    summary: &'a CsvSummary,
}

fn summary(settings: &Settings, format: CsvFormat, files: &[PathBuf], json: bool, out: &mut dyn Write) -> anyhow::Result<()> {
    let use_case = SummarizeFileUseCase::new(settings, format);

    if json {
        let summaries = files
            .iter()
            .map(|file| use_case.execute(file).with_context(|| format!("analyzing {}", file.display())))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let report: Vec<FileSummary<'_>> = files
            .iter()
            .zip(&summaries)
            .map(|(file, summary)| FileSummary {
                file: file_name(file),
                summary,
            })
            .collect();
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
        return Ok(());
    }

    for file in files {
        writeln!(out, "--- Analyzing file {} ---", file_name(file))?;
        let summary = use_case.execute(file)?;
        print_summary(&summary, out)?;
        writeln!(out)?;
    }
    Ok(())
}

fn print_summary(summary: &CsvSummary, out: &mut dyn Write) -> anyhow::Result<()> {
    writeln!(out, "File summary:")?;
    writeln!(out, "\tRows total:\t{}", summary.rows)?;
    writeln!(out, "Columns summary:")?;

    let names = summary.meta.column_names();
    let types: Vec<String> = summary.columns.iter().map(|c| c.column_type.to_string()).collect();
    for (label, values) in [("Name", &names), ("Deduced type", &types)] {
        write!(out, "\t{:<15}| ", label)?;
        for value in values {
            write!(out, "{:<15} | ", value)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

struct StatsRequest {
    sums: Vec<usize>,
    averages: Vec<usize>,
    maxima: Vec<usize>,
    tops: Vec<(usize, usize)>,
}

fn stats(settings: &Settings, format: CsvFormat, file: &Path, request: StatsRequest, out: &mut dyn Write) -> anyhow::Result<()> {
    let mut labels = Vec::new();
    let mut actions: Vec<Box<dyn Action>> = Vec::new();
    for column in request.sums {
        labels.push(format!("sum({})", column));
        actions.push(Box::new(SumAction::new(column)));
    }
    for column in request.averages {
        labels.push(format!("average({})", column));
        actions.push(Box::new(AverageAction::new(column)));
    }
    for column in request.maxima {
        labels.push(format!("max({})", column));
        actions.push(Box::new(MaxIntAction::new(column)));
    }
    for (column, count) in request.tops {
        labels.push(format!("top({}, {})", column, count));
        actions.push(Box::new(max_values_string(column, count)));
    }
    if actions.is_empty() {
        return Err(CsvError::invalid("stats needs at least one of --sum, --average, --max or --top").into());
    }

    let results = AnalyzeFileUseCase::new(settings, format).execute(file, actions)?;
    for (label, result) in labels.iter().zip(&results) {
        writeln!(out, "{}: {}", label, result)?;
    }
    Ok(())
}

fn cut(
    settings: &Settings,
    format: CsvFormat,
    input: &Path,
    columns: Vec<usize>,
    output: Option<PathBuf>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let use_case = CutColumnsUseCase::new(settings, format);
    let rows = match output {
        Some(path) => {
            let mut writer = StreamCsvWriter::create(&path, format.separator, settings.io_buffer_size)?;
            use_case.execute(input, columns, &mut writer)?
        }
        None => {
            let mut writer = StreamCsvWriter::with_separator(&mut *out, format.separator);
            use_case.execute(input, columns, &mut writer)?
        }
    };
    tracing::info!("Cut {} rows from {}", rows, input.display());
    Ok(())
}

fn sort(
    settings: &Settings,
    format: CsvFormat,
    file: &Path,
    keys: Vec<KeyElement>,
    output: Option<PathBuf>,
    strategy: SortStrategy,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let keys = if keys.is_empty() {
        vec![KeyElement::as_string(0)]
    } else {
        keys
    };
    let sort = SortDescription::new(keys)?;
    let use_case = SortFileUseCase::new(settings, format);

    let rows = match output {
        Some(path) => {
            let file_out = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            let mut writer = BufWriter::with_capacity(settings.io_buffer_size, file_out);
            use_case.execute(file, &sort, strategy, &mut writer)?
        }
        None => use_case.execute(file, &sort, strategy, out)?,
    };
    tracing::info!("Sorted {} rows of {}", rows, file.display());
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    fn run_args(args: &[&str]) -> anyhow::Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("csv_xxl").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        run(cli, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    fn sample(dir: &TempDir) -> String {
        let path = dir.path().join("sample_lf.csv");
        fs::write(&path, "name1,name2\n1,2").unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_summary_table() {
        let dir = TempDir::new().unwrap();
        let output = run_args(&["-H", "summary", &sample(&dir)]).unwrap();
        assert_eq!(
            output,
            "--- Analyzing file sample_lf.csv ---\n\
             File summary:\n\
             \tRows total:\t1\n\
             Columns summary:\n\
             \tName           | name1           | name2           | \n\
             \tDeduced type   | INTEGER         | INTEGER         | \n\
             \n"
        );
    }

    #[test]
    fn test_summary_json() {
        let dir = TempDir::new().unwrap();
        let output = run_args(&["-H", "summary", "--json", &sample(&dir)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value[0]["file"], "sample_lf.csv");
        assert_eq!(value[0]["rows"], 1);
        assert_eq!(value[0]["columns"][1]["column_type"], "INTEGER");
    }

    #[test]
    fn test_stats_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("numbers.csv");
        fs::write(&path, "number,text\n1,d\n2,c\n3,b\n4,a\n").unwrap();
        let path = path.to_string_lossy().into_owned();

        let output = run_args(&["-H", "stats", &path, "--sum", "0", "--average", "0", "--max", "0", "--top", "1:2"]).unwrap();
        assert_eq!(output, "sum(0): 10\naverage(0): 2.5\nmax(0): 4\ntop(1, 2): d, c\n");
    }

    #[test]
    fn test_stats_without_actions() {
        let dir = TempDir::new().unwrap();
        let err = run_args(&["stats", &sample(&dir)]).unwrap_err();
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn test_exit_codes() {
        let missing = run_args(&["summary", "/nonexistent/file.csv"]).unwrap_err();
        assert_eq!(exit_code(&missing), 2);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.csv");
        fs::write(&path, "a,b\n1\n").unwrap();
        let broken = run_args(&["summary", path.to_str().unwrap()]).unwrap_err();
        assert_eq!(exit_code(&broken), 1);
    }

    #[test]
    fn test_sort_to_file() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.csv");
        fs::write(&input, "b,2\na,10\nc,1\n").unwrap();

        let printed = run_args(&[
            "sort",
            input.to_str().unwrap(),
            "-k",
            "1:long",
            "-o",
            output.to_str().unwrap(),
        ])
        .unwrap();
        assert!(printed.is_empty());
        assert_eq!(fs::read_to_string(&output).unwrap(), "c,1\nb,2\na,10\n");
    }
}
