//! Merge several delimited files into one sparse table.
//!
//! Every input is read twice. The first pass collects each file's column
//! names and line count; the second re-parses each file in turn and writes
//! its rows under the union of all columns, prefixed with a running `pkid`
//! and the file's path relative to the inputs' common prefix.
//!
//! Line counts are physical line breaks, so a file with quoted multi-line
//! cells reports more lines than rows.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use foldhash::{HashSet, HashSetExt};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Result, SvError};
use crate::inference::{common_prefix, count_line_breaks};
use crate::parser::{Parser, READ_CHUNK_SIZE};
use crate::row::Row;
use crate::stringifier::{RowSink, Stringifier};

/// Name of the synthetic primary key column.
pub const PKID_COLUMN: &str = "pkid";
/// Name of the column holding each row's source file.
pub const ORIGINAL_FILE_COLUMN: &str = "original_file";

/// Counts from one [`merge`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Number of input files.
    pub files: usize,
    /// The merged column set, starting with `pkid` and `original_file`.
    pub columns: Vec<String>,
    /// Line breaks counted across all inputs.
    pub lines: usize,
    /// Data rows written.
    pub rows_written: usize,
    /// True if the output was closed before all rows were written.
    pub truncated: bool,
}

/// What the first pass learns about one input.
#[derive(Debug)]
struct Survey {
    path: PathBuf,
    columns: Vec<String>,
    lines: usize,
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| SvError::File {
        path: path.to_path_buf(),
        source,
    })
}

fn read_chunk(file: &mut File, buffer: &mut [u8], path: &Path) -> Result<usize> {
    loop {
        match file.read(buffer) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(SvError::File {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }
}

/// Read just far enough into `path` to learn its columns, then count its lines.
fn survey(path: &Path, config: &Config) -> Result<Survey> {
    let mut file = open(path)?;
    let mut parser = Parser::new(config.clone())?;
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];
    while parser.columns().is_none() {
        let n = read_chunk(&mut file, &mut buffer, path)?;
        if n == 0 {
            parser.finish()?;
            break;
        }
        parser.feed(&buffer[..n])?;
    }
    let columns = parser.columns().map(<[String]>::to_vec).unwrap_or_default();
    let encoding = parser.encoding().map_or("unknown", |e| e.name());

    let lines = count_line_breaks(open(path)?).map_err(|source| SvError::File {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        path = %path.display(),
        encoding,
        columns = columns.len(),
        lines,
        "surveyed"
    );

    Ok(Survey {
        path: path.to_path_buf(),
        columns,
        lines,
    })
}

/// Union of all columns, after `pkid` and `original_file`, in first-seen order.
fn merged_columns(surveys: &[Survey]) -> Vec<String> {
    let mut columns = vec![PKID_COLUMN.to_string(), ORIGINAL_FILE_COLUMN.to_string()];
    let mut seen: HashSet<String> = HashSet::new();
    seen.extend(columns.iter().cloned());
    for survey in surveys {
        for column in &survey.columns {
            if seen.insert(column.clone()) {
                columns.push(column.clone());
            }
        }
    }
    columns
}

/// Merge `paths` into one table written to `writer`.
///
/// Files are parsed with `parser_config` and written with `output_config`,
/// whose column setting is replaced by the merged column set. The first file
/// that cannot be read aborts the merge. A closed output ends it early but
/// successfully, with [`MergeSummary::truncated`] set.
pub fn merge<P, W>(
    paths: &[P],
    parser_config: &Config,
    output_config: &Config,
    writer: W,
) -> Result<MergeSummary>
where
    P: AsRef<Path>,
    W: Write,
{
    let surveys = paths
        .iter()
        .map(|path| survey(path.as_ref(), parser_config))
        .collect::<Result<Vec<_>>>()?;

    let columns = merged_columns(&surveys);
    let lines = surveys.iter().map(|s| s.lines).sum();
    info!(
        "found {lines} lines covering {} columns in {} files",
        columns.len(),
        surveys.len()
    );
    for column in &columns {
        debug!("  {column} ({})", column.len());
    }

    let mut output_config = output_config.clone();
    output_config.columns(columns.iter().cloned());
    let mut stringifier = Stringifier::new(&output_config, writer)?;

    let mut summary = MergeSummary {
        files: surveys.len(),
        columns,
        lines,
        ..MergeSummary::default()
    };

    match write_all(&surveys, parser_config, &mut stringifier, &mut summary) {
        Ok(()) => {}
        Err(e) if e.is_broken_pipe() => {
            debug!(rows = summary.rows_written, "output closed, stopping");
            summary.truncated = true;
        }
        Err(e) => return Err(e),
    }
    info!("done, wrote a total of {} rows", summary.rows_written);
    Ok(summary)
}

fn write_all<W: Write>(
    surveys: &[Survey],
    config: &Config,
    stringifier: &mut Stringifier<W>,
    summary: &mut MergeSummary,
) -> Result<()> {
    let names: Vec<String> = surveys
        .iter()
        .map(|s| s.path.to_string_lossy().into_owned())
        .collect();
    let prefix = common_prefix(&names);
    info!("removing common prefix from file names: {prefix}");

    let mut buffer = vec![0u8; READ_CHUNK_SIZE];
    for (survey, name) in surveys.iter().zip(&names) {
        let original_file = &name[prefix.len()..];
        let mut file = open(&survey.path)?;
        let mut parser = Parser::new(config.clone())?;
        let mut file_rows = 0;
        loop {
            let n = read_chunk(&mut file, &mut buffer, &survey.path)?;
            let records = if n == 0 {
                parser.finish()?.into_iter().collect()
            } else {
                parser.feed(&buffer[..n])?
            };
            for mut record in records {
                let pkid = summary.rows_written + 1;
                record.insert(PKID_COLUMN, pkid.to_string());
                record.insert(ORIGINAL_FILE_COLUMN, original_file);
                stringifier.write(Row::Record(record))?;
                summary.rows_written = pkid;
                file_rows += 1;
            }
            if n == 0 {
                break;
            }
        }
        info!(
            "{original_file} (wrote {file_rows} rows, out of {} lines)",
            survey.lines
        );
    }
    stringifier.end()
}
