//! Streaming writer from row records to delimited text.

use std::io::Write;

use encoding_rs::Encoding;
use tracing::debug;

use crate::config::{Config, TextEncoding};
use crate::encoding::encode;
use crate::error::Result;
use crate::inference::infer_columns;
use crate::row::Row;

/// Anything that consumes rows and writes them out.
///
/// Implemented by the delimited [`Stringifier`] and by
/// [`JsonLinesStringifier`](crate::JsonLinesStringifier).
pub trait RowSink {
    /// Write one row (possibly holding it back until the header is known).
    fn write(&mut self, row: Row) -> Result<()>;

    /// Flush everything held back and the underlying writer.
    fn end(&mut self) -> Result<()>;
}

/// Streaming delimited-text writer.
///
/// Rows are held back until the column set is known: immediately when it was
/// configured, otherwise after `peek` rows, when it is inferred from the
/// records seen so far. The header and the held rows are then written in
/// order, and every later row is written straight through.
///
/// Cells are quoted only when they contain the delimiter, the quote or a line
/// break; quotes inside a quoted cell are doubled. Lines are built as text and
/// encoded as a whole, so quoting never looks at bytes of a multi-byte
/// sequence.
///
/// # Example
///
/// ```
/// use sv::{Config, Record, Row, RowSink, Stringifier};
///
/// let mut config = Config::new();
/// config.newline("\n");
/// let mut stringifier = Stringifier::new(&config, Vec::new()).unwrap();
/// let row: Record = [("name", "Lunch"), ("note", "tip, incl.")].into_iter().collect();
/// stringifier.write(Row::Record(row)).unwrap();
/// stringifier.end().unwrap();
///
/// let text = String::from_utf8(stringifier.into_inner()).unwrap();
/// assert_eq!(text, "name,note\nLunch,\"tip, incl.\"\n");
/// ```
#[derive(Debug)]
pub struct Stringifier<W: Write> {
    writer: W,
    delimiter: u8,
    quote: u8,
    missing: String,
    newline: String,
    encoding: &'static Encoding,
    peek: usize,
    columns: Option<Vec<String>>,
    /// Rows held back until the header is written; `None` afterwards.
    buffer: Option<Vec<Row>>,
    /// Scratch space for the line being built.
    line: String,
}

impl<W: Write> Stringifier<W> {
    /// Create a stringifier writing to `writer`.
    ///
    /// Without a configured delimiter, a comma is used. Fails if the
    /// delimiter and quote clash or are not ASCII.
    pub fn new(config: &Config, writer: W) -> Result<Self> {
        config.validate_output()?;
        let encoding = match config.encoding {
            TextEncoding::Fixed(encoding) => encoding,
            TextEncoding::Detect => encoding_rs::UTF_8,
        };
        Ok(Self {
            writer,
            delimiter: config.delimiter.unwrap_or(b','),
            quote: config.quote,
            missing: config.missing.clone(),
            newline: config.newline.clone(),
            encoding,
            peek: config.peek.max(1),
            columns: config.columns.clone(),
            buffer: Some(Vec::new()),
            line: String::new(),
        })
    }

    /// The column set, once configured or inferred.
    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Unwrap the underlying writer. Rows still held back are discarded;
    /// call [`RowSink::end`] first.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Write the header and every held-back row, inferring the column set
    /// from them if none was configured.
    fn flush_buffer(&mut self) -> Result<()> {
        let Some(rows) = self.buffer.take() else {
            return Ok(());
        };
        let columns = match self.columns.take() {
            Some(columns) => columns,
            None => {
                let columns = infer_columns(&rows);
                debug!(?columns, peeked = rows.len(), "inferred columns");
                columns
            }
        };
        self.write_cells(columns.iter().map(String::as_str))?;
        self.columns = Some(columns);
        for row in &rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    fn write_row(&mut self, row: &Row) -> Result<()> {
        match row {
            Row::Raw(line) => {
                self.line.clear();
                self.line.push_str(line);
                self.line.push_str(&self.newline);
                self.writer.write_all(&encode(&self.line, self.encoding))?;
                Ok(())
            }
            Row::Values(values) => self.write_cells(values.iter().map(String::as_str)),
            Row::Record(record) => {
                let columns = self.columns.take().unwrap_or_default();
                let missing = std::mem::take(&mut self.missing);
                let result = self.write_cells(
                    columns
                        .iter()
                        .map(|column| record.get(column).unwrap_or(missing.as_str())),
                );
                self.columns = Some(columns);
                self.missing = missing;
                result
            }
        }
    }

    fn write_cells<'a>(&mut self, cells: impl Iterator<Item = &'a str>) -> Result<()> {
        // delimiter and quote are ASCII, checked in `new`
        let delimiter = char::from(self.delimiter);
        let quote = char::from(self.quote);
        self.line.clear();
        for (i, cell) in cells.enumerate() {
            if i > 0 {
                self.line.push(delimiter);
            }
            let needs_quotes = cell
                .bytes()
                .any(|b| b == self.delimiter || b == self.quote || b == b'\n' || b == b'\r');
            if needs_quotes {
                self.line.push(quote);
                for c in cell.chars() {
                    if c == quote {
                        self.line.push(quote);
                    }
                    self.line.push(c);
                }
                self.line.push(quote);
            } else {
                self.line.push_str(cell);
            }
        }
        self.line.push_str(&self.newline);
        self.writer.write_all(&encode(&self.line, self.encoding))?;
        Ok(())
    }
}

impl<W: Write> RowSink for Stringifier<W> {
    fn write(&mut self, row: Row) -> Result<()> {
        let Some(buffer) = self.buffer.as_mut() else {
            return self.write_row(&row);
        };
        buffer.push(row);
        if self.columns.is_some() || buffer.len() >= self.peek {
            self.flush_buffer()?;
        }
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.flush_buffer()?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Record;

    fn record(pairs: &[(&str, &str)]) -> Row {
        Row::Record(pairs.iter().copied().collect())
    }

    fn stringify(config: &Config, rows: Vec<Row>) -> String {
        let mut stringifier = Stringifier::new(config, Vec::new()).unwrap();
        for row in rows {
            stringifier.write(row).unwrap();
        }
        stringifier.end().unwrap();
        String::from_utf8(stringifier.into_inner()).unwrap()
    }

    fn unix() -> Config {
        let mut config = Config::new();
        config.newline("\n");
        config
    }

    #[test]
    fn test_peek_two_with_missing() {
        let mut config = unix();
        config.peek(2).missing("NA");
        let output = stringify(
            &config,
            vec![
                record(&[("index", "1"), ("name", "chris")]),
                record(&[("index", "2"), ("name", "daniel"), ("time", "1:17")]),
                record(&[("index", "3"), ("name", "lewis"), ("time", "1:30")]),
                record(&[("index", "4"), ("name", "stephen"), ("time", "1:16")]),
                record(&[("index", "5"), ("name", "larry"), ("time", "1:31")]),
            ],
        );
        let expected = [
            "index,name,time",
            "1,chris,NA",
            "2,daniel,1:17",
            "3,lewis,1:30",
            "4,stephen,1:16",
            "5,larry,1:31",
            "",
        ]
        .join("\n");
        assert_eq!(output, expected);
    }

    #[test]
    fn test_default_peek_fixes_columns_on_first_row() {
        let output = stringify(
            &unix(),
            vec![
                record(&[("index", "1"), ("name", "chris")]),
                record(&[("index", "2"), ("name", "daniel"), ("time", "1:17")]),
            ],
        );
        assert_eq!(output, "index,name\n1,chris\n2,daniel\n");
    }

    #[test]
    fn test_end_flushes_short_buffer() {
        let mut config = unix();
        config.peek(10);
        let mut stringifier = Stringifier::new(&config, Vec::new()).unwrap();
        stringifier.write(record(&[("a", "1")])).unwrap();
        assert!(stringifier.get_ref().is_empty());
        stringifier.end().unwrap();
        assert_eq!(stringifier.into_inner(), b"a\n1\n");
    }

    #[test]
    fn test_configured_columns_write_immediately() {
        let mut config = unix();
        config.columns(["b", "a"]).peek(100);
        let mut stringifier = Stringifier::new(&config, Vec::new()).unwrap();
        stringifier.write(record(&[("a", "1"), ("c", "dropped")])).unwrap();
        assert_eq!(stringifier.get_ref().as_slice(), b"b,a\n,1\n");
    }

    #[test]
    fn test_header_without_rows() {
        let mut config = unix();
        config.columns(["x", "y"]);
        assert_eq!(stringify(&config, vec![]), "x,y\n");
    }

    #[test]
    fn test_missing_differs_from_empty() {
        let mut config = unix();
        config.columns(["a", "b"]).missing("NA");
        let output = stringify(&config, vec![record(&[("a", "")])]);
        assert_eq!(output, "a,b\n,NA\n");
    }

    #[test]
    fn test_minimal_quoting() {
        let mut config = unix();
        config.columns(["v"]);
        let output = stringify(
            &config,
            vec![
                Row::Values(vec!["plain".into()]),
                Row::Values(vec!["a,b".into()]),
                Row::Values(vec!["say \"hi\"".into()]),
                Row::Values(vec!["two\nlines".into()]),
                Row::Values(vec!["cr\ronly".into()]),
            ],
        );
        assert_eq!(
            output,
            "v\nplain\n\"a,b\"\n\"say \"\"hi\"\"\"\n\"two\nlines\"\n\"cr\ronly\"\n"
        );
    }

    #[test]
    fn test_arrays_ignore_columns_and_raw_is_verbatim() {
        let mut config = unix();
        config.columns(["a"]);
        let output = stringify(
            &config,
            vec![
                Row::Values(vec!["1".into(), "2".into(), "3".into()]),
                Row::Raw("already,\"formatted\"".into()),
            ],
        );
        assert_eq!(output, "a\n1,2,3\nalready,\"formatted\"\n");
    }

    #[test]
    fn test_peek_skips_non_records() {
        let mut config = unix();
        config.peek(3);
        let output = stringify(
            &config,
            vec![
                Row::Raw("# comment".into()),
                record(&[("k", "v")]),
                Row::Values(vec!["x".into()]),
            ],
        );
        assert_eq!(output, "k\n# comment\nv\nx\n");
    }

    #[test]
    fn test_tab_delimiter_and_crlf() {
        let mut config = Config::new();
        config.delimiter(b'\t').newline("\r\n");
        let output = stringify(&config, vec![record(&[("a", "x,y"), ("b", "t\tab")])]);
        assert_eq!(output, "a\tb\r\nx,y\t\"t\tab\"\r\n");
    }

    #[test]
    fn test_legacy_encoding_output() {
        let mut config = unix();
        config.encoding(TextEncoding::from_label("latin1").unwrap());
        let mut stringifier = Stringifier::new(&config, Vec::new()).unwrap();
        let row: Record = [("city", "Zürich")].into_iter().collect();
        stringifier.write(Row::Record(row)).unwrap();
        stringifier.end().unwrap();
        assert_eq!(stringifier.into_inner(), b"city\nZ\xfcrich\n");
    }

    #[test]
    fn test_quoting_sees_text_not_encoded_bytes() {
        // "ソ" encodes to 0x83 0x5C in Shift_JIS; the trail byte equals the delimiter
        let mut config = unix();
        config
            .encoding(TextEncoding::from_label("shift_jis").unwrap())
            .delimiter(b'\\')
            .columns(["a", "b"]);
        let mut stringifier = Stringifier::new(&config, Vec::new()).unwrap();
        stringifier
            .write(Row::Values(vec!["\u{30bd}".into(), "x".into()]))
            .unwrap();
        stringifier.end().unwrap();
        assert_eq!(stringifier.into_inner(), b"a\\b\n\x83\x5c\\x\n");
    }

    #[test]
    fn test_clashing_output_dialect_is_rejected() {
        let mut config = unix();
        config.delimiter(b';').quote(b';');
        assert!(Stringifier::new(&config, Vec::new()).is_err());

        let mut config = unix();
        config.quote(b',');
        assert!(Stringifier::new(&config, Vec::new()).is_err());

        let mut config = unix();
        config.delimiter(b'\n');
        assert!(Stringifier::new(&config, Vec::new()).is_err());
    }
}
