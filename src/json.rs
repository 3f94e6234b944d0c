//! JSON-lines row source and sink.

use std::io::{self, Write};

use serde_json::{Map, Value};

use crate::config::Config;
use crate::error::{Result, SvError};
use crate::parser::RowSource;
use crate::row::{Record, Row};
use crate::stringifier::RowSink;

/// Reads one JSON value per line.
///
/// Objects become records (cell values coerced to text), arrays become
/// positional rows and any other value becomes a raw line. Blank lines are
/// skipped.
#[derive(Debug, Default)]
pub struct JsonLinesParser {
    /// Bytes of the line in progress.
    pending: Vec<u8>,
    /// 1-based number of the next line to complete.
    line: usize,
    columns: Option<Vec<String>>,
}

impl JsonLinesParser {
    /// Create a parser.
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            line: 1,
            columns: None,
        }
    }

    fn parse_line(&mut self, bytes: &[u8], rows: &mut Vec<Row>) -> Result<()> {
        let line = self.line;
        self.line += 1;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        let value: Value =
            serde_json::from_slice(bytes).map_err(|source| SvError::Json { line, source })?;
        let row = match value {
            Value::Object(object) => {
                let record: Record = object
                    .into_iter()
                    .map(|(key, value)| (key, cell_text(value)))
                    .collect();
                if self.columns.is_none() {
                    self.columns = Some(record.keys().map(str::to_string).collect());
                }
                Row::Record(record)
            }
            Value::Array(values) => Row::Values(values.into_iter().map(cell_text).collect()),
            other => Row::Raw(cell_text(other)),
        };
        rows.push(row);
        Ok(())
    }
}

/// Text form of a JSON value held in a single cell.
fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl RowSource for JsonLinesParser {
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let mut rest = chunk;
        while let Some(end) = rest.iter().position(|&b| b == b'\n') {
            if self.pending.is_empty() {
                self.parse_line(&rest[..end], &mut rows)?;
            } else {
                let mut line = std::mem::take(&mut self.pending);
                line.extend_from_slice(&rest[..end]);
                self.parse_line(&line, &mut rows)?;
            }
            rest = &rest[end + 1..];
        }
        self.pending.extend_from_slice(rest);
        Ok(rows)
    }

    fn finish(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let line = std::mem::take(&mut self.pending);
        self.parse_line(&line, &mut rows)?;
        Ok(rows)
    }

    /// Keys of the first object read.
    fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }
}

/// Writes each row as one line of JSON.
///
/// Records become objects with keys in column order, positional rows become
/// arrays and raw lines are written verbatim.
#[derive(Debug)]
pub struct JsonLinesStringifier<W: Write> {
    writer: W,
    newline: String,
}

impl<W: Write> JsonLinesStringifier<W> {
    /// Create a sink writing to `writer`, ending lines with the configured newline.
    pub fn new(config: &Config, writer: W) -> Self {
        Self {
            writer,
            newline: config.newline.clone(),
        }
    }

    /// Unwrap the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RowSink for JsonLinesStringifier<W> {
    fn write(&mut self, row: Row) -> Result<()> {
        let value = match row {
            Row::Record(record) => Value::Object(
                record
                    .into_iter()
                    .map(|(key, value)| (key, Value::String(value)))
                    .collect::<Map<String, Value>>(),
            ),
            Row::Values(values) => Value::Array(values.into_iter().map(Value::String).collect()),
            Row::Raw(line) => {
                self.writer.write_all(line.as_bytes())?;
                self.writer.write_all(self.newline.as_bytes())?;
                return Ok(());
            }
        };
        serde_json::to_writer(&mut self.writer, &value).map_err(io::Error::from)?;
        self.writer.write_all(self.newline.as_bytes())?;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
