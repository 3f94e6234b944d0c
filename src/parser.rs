//! Streaming parser from delimited bytes to row records.
//!
//! The parser is a byte-level state machine that keeps its position across
//! calls to [`Parser::feed`], so a chunk boundary may fall anywhere: inside a
//! quoted cell, between a doubled quote, after an escape byte, or between the
//! CR and LF of a line break.
//!
//! Input is transcoded to UTF-8 before it is scanned, so a multi-byte
//! sequence in a legacy encoding (a Shift_JIS trail byte of 0x5C, say) is
//! never mistaken for a delimiter, quote or escape byte.
//!
//! # Example
//!
//! ```
//! use sv::{Config, Parser};
//!
//! let mut parser = Parser::new(Config::new()).unwrap();
//! let mut rows = parser.feed(b"name,amount\nLunch,5.90\nLat").unwrap();
//! rows.extend(parser.feed(b"te,3.15\n").unwrap());
//! rows.extend(parser.finish().unwrap());
//!
//! assert_eq!(rows.len(), 2);
//! assert_eq!(rows[1].get("name"), Some("Latte"));
//! ```

use std::io::{self, Read};

use encoding_rs::Encoding;
use tracing::debug;

use crate::config::{Config, Escape, TextEncoding, check_delimiter, check_escape};
use crate::encoding::{Transcoder, detect_encoding, has_utf8_bom, may_become_bom};
use crate::error::{Result, SvError};
use crate::inference::{infer_delimiter, sample_complete};
use crate::row::{Record, Row};

/// Size of the chunks read from an input stream.
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Anything that turns a byte stream into rows.
///
/// Implemented by the delimited [`Parser`] and by
/// [`JsonLinesParser`](crate::JsonLinesParser).
pub trait RowSource {
    /// Consume the next chunk of input, returning the rows it completes.
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Row>>;

    /// Signal end of input, returning any rows still held back.
    fn finish(&mut self) -> Result<Vec<Row>>;

    /// The column set, once known.
    fn columns(&self) -> Option<&[String]>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing of the current cell consumed yet; only here can a quote open.
    CellStart,
    Unquoted,
    Quoted,
    /// A quote byte inside a quoted cell: either half of a doubled quote or
    /// the closing quote, decided by the next byte.
    QuoteInQuoted,
    /// The quoted section is closed; bytes up to the next delimiter or line
    /// break are kept literally.
    AfterQuote,
    /// An escape byte was consumed and the next byte is literal.
    Escape { quoted: bool },
}

/// A read position over the pending bytes of one scan.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    #[inline]
    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    /// Advance past `n` bytes and return them.
    #[inline]
    fn consume(&mut self, n: usize) -> &'a [u8] {
        let consumed = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        consumed
    }
}

/// Streaming delimited-text parser.
///
/// The first completed row becomes the column set unless one was configured;
/// every later row is returned as a [`Record`] keyed by that column set, with
/// absent or empty cells set to the missing placeholder and surplus cells
/// dropped.
///
/// Malformed quoting is tolerated: input that ends inside a quoted cell
/// yields whatever the cell holds.
#[derive(Debug)]
pub struct Parser {
    quote: u8,
    escape: Escape,
    missing: String,
    /// Resolved on the first sample when detection is configured.
    encoding: Option<&'static Encoding>,
    /// Configured, or inferred from the first sample; fixed afterwards.
    delimiter: Option<u8>,
    columns: Option<Vec<String>>,
    /// Bytes received but not yet transcoded.
    raw: Vec<u8>,
    /// Created once the encoding is known.
    transcoder: Option<Transcoder>,
    /// UTF-8 text not yet scanned.
    pending: Vec<u8>,
    bom_checked: bool,
    state: State,
    /// UTF-8 bytes of the cell being built.
    cell: Vec<u8>,
    /// Cells of the row being built.
    cells: Vec<String>,
    /// Skip an LF that directly follows a CR row terminator.
    skip_lf: bool,
}

impl Parser {
    /// Create a parser for the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let encoding = match config.encoding {
            TextEncoding::Fixed(encoding) => Some(encoding),
            TextEncoding::Detect => None,
        };
        Ok(Self {
            quote: config.quote,
            escape: config.escape,
            missing: config.missing,
            encoding,
            delimiter: config.delimiter,
            columns: config.columns,
            raw: Vec::new(),
            transcoder: None,
            pending: Vec::new(),
            bom_checked: false,
            state: State::CellStart,
            cell: Vec::new(),
            cells: Vec::new(),
            skip_lf: false,
        })
    }

    /// The delimiter in effect, once configured or inferred.
    pub fn delimiter(&self) -> Option<u8> {
        self.delimiter
    }

    /// The encoding in effect, once configured or detected.
    pub fn encoding(&self) -> Option<&'static Encoding> {
        self.encoding
    }

    /// The column set, once configured or read from the first row.
    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// Consume the next chunk of input and return the rows it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Record>> {
        self.raw.extend_from_slice(chunk);
        let mut rows = Vec::new();
        if self.prepare(false)? {
            self.scan(&mut rows);
        }
        Ok(rows)
    }

    /// Signal end of input and return the final row, if one is unterminated.
    ///
    /// Content still open at this point (a trailing cell without a line
    /// break, an unterminated quote, a dangling escape byte) is flushed as is.
    pub fn finish(&mut self) -> Result<Option<Record>> {
        let mut rows = Vec::with_capacity(1);
        if self.prepare(true)? {
            // A line break in `pending` would already have triggered encoding
            // and delimiter inference and been scanned, so at most one row
            // completes here.
            self.scan(&mut rows);
        }

        match self.state {
            State::CellStart if self.cells.is_empty() => {}
            State::Escape { .. } => {
                if let Some(escape) = self.escape.byte() {
                    self.cell.push(escape);
                }
                self.end_cell();
                self.end_row(&mut rows);
            }
            _ => {
                self.end_cell();
                self.end_row(&mut rows);
            }
        }
        Ok(rows.pop())
    }

    /// Parse a complete input held in memory.
    pub fn parse_bytes(mut self, data: &[u8]) -> Result<Vec<Record>> {
        let mut rows = self.feed(data)?;
        rows.extend(self.finish()?);
        Ok(rows)
    }

    /// Parse everything a reader yields.
    pub fn parse_reader<R: Read>(mut self, mut reader: R) -> Result<Vec<Record>> {
        let mut rows = Vec::new();
        let mut buffer = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            rows.extend(self.feed(&buffer[..n])?);
        }
        rows.extend(self.finish()?);
        Ok(rows)
    }

    /// Strip a leading BOM, resolve the encoding, transcode what has
    /// arrived and resolve the delimiter.
    ///
    /// Returns false while more input is needed before scanning can start.
    fn prepare(&mut self, last: bool) -> Result<bool> {
        if !self.bom_checked {
            if !last && may_become_bom(&self.raw) {
                return Ok(false);
            }
            if has_utf8_bom(&self.raw) {
                self.raw.drain(..3);
            }
            self.bom_checked = true;
        }

        if self.transcoder.is_none() {
            let encoding = match self.encoding {
                Some(encoding) => encoding,
                None => {
                    if !last && !sample_complete(&self.raw) {
                        return Ok(false);
                    }
                    let encoding = detect_encoding(&self.raw, last);
                    debug!(encoding = encoding.name(), "detected encoding");
                    self.encoding = Some(encoding);
                    encoding
                }
            };
            self.transcoder = Some(Transcoder::new(encoding));
        }
        if let Some(transcoder) = self.transcoder.as_mut() {
            transcoder.feed(&self.raw, last, &mut self.pending)?;
            self.raw.clear();
        }

        if self.pending.is_empty() {
            return Ok(false);
        }
        if self.delimiter.is_none() {
            if !last && !sample_complete(&self.pending) {
                return Ok(false);
            }
            let delimiter = infer_delimiter(&self.pending).ok_or(SvError::NoDelimiter)?;
            check_delimiter(delimiter, self.quote)?;
            check_escape(self.escape.byte(), self.quote, Some(delimiter))?;
            debug!(delimiter = ?(delimiter as char), "inferred delimiter");
            self.delimiter = Some(delimiter);
        }
        Ok(true)
    }

    /// Run the state machine over all pending bytes.
    fn scan(&mut self, rows: &mut Vec<Record>) {
        let Some(delimiter) = self.delimiter else {
            return;
        };
        let quote = self.quote;
        let escape = self.escape.byte();
        let escape_in_quotes = match self.escape {
            Escape::FieldEnd(b) | Escape::Always(b) => Some(b),
            Escape::None => None,
        };

        let pending = std::mem::take(&mut self.pending);
        let mut cursor = Cursor::new(&pending);

        while let Some(b) = cursor.peek() {
            if self.skip_lf {
                self.skip_lf = false;
                if b == b'\n' {
                    cursor.consume(1);
                    continue;
                }
            }

            match self.state {
                State::CellStart => {
                    if b == quote {
                        cursor.consume(1);
                        self.state = State::Quoted;
                    } else {
                        self.state = State::Unquoted;
                    }
                }
                State::Unquoted | State::AfterQuote => {
                    let run = cursor
                        .rest()
                        .iter()
                        .position(|&c| {
                            c == delimiter || c == b'\n' || c == b'\r' || Some(c) == escape
                        })
                        .unwrap_or(cursor.rest().len());
                    if run > 0 {
                        self.cell.extend_from_slice(cursor.consume(run));
                        continue;
                    }
                    cursor.consume(1);
                    if Some(b) == escape {
                        self.state = State::Escape { quoted: false };
                    } else if b == delimiter {
                        self.end_cell();
                    } else {
                        self.end_cell();
                        self.end_row(rows);
                        self.skip_lf = b == b'\r';
                    }
                }
                State::Quoted => {
                    let run = cursor
                        .rest()
                        .iter()
                        .position(|&c| c == quote || Some(c) == escape_in_quotes)
                        .unwrap_or(cursor.rest().len());
                    if run > 0 {
                        self.cell.extend_from_slice(cursor.consume(run));
                        continue;
                    }
                    cursor.consume(1);
                    self.state = if b == quote {
                        State::QuoteInQuoted
                    } else {
                        State::Escape { quoted: true }
                    };
                }
                State::QuoteInQuoted => {
                    if b == quote {
                        cursor.consume(1);
                        self.cell.push(quote);
                        self.state = State::Quoted;
                    } else {
                        // closing quote; `b` is handled in the new state
                        self.state = State::AfterQuote;
                    }
                }
                State::Escape { quoted } => {
                    let escape = escape.unwrap_or_default();
                    let resume = if quoted {
                        State::Quoted
                    } else {
                        State::Unquoted
                    };
                    if b == quote && quoted && matches!(self.escape, Escape::FieldEnd(_)) {
                        // not an escape after all; the quote is handled in the quoted state
                        self.cell.push(escape);
                    } else if b == quote {
                        cursor.consume(1);
                        self.cell.push(quote);
                    } else {
                        cursor.consume(1);
                        self.cell.push(escape);
                        self.cell.push(b);
                    }
                    self.state = resume;
                }
            }
        }

        self.pending = pending;
        self.pending.clear();
    }

    fn end_cell(&mut self) {
        // Cells are cut from validated UTF-8 at ASCII bytes only, so the
        // lossy conversion never replaces anything.
        self.cells
            .push(String::from_utf8_lossy(&self.cell).into_owned());
        self.cell.clear();
        self.state = State::CellStart;
    }

    fn end_row(&mut self, rows: &mut Vec<Record>) {
        let cells = std::mem::take(&mut self.cells);
        if let Some(columns) = &self.columns {
            rows.push(Record::zip(columns, cells, &self.missing));
            return;
        }
        debug!(columns = ?cells, "read column names from first row");
        self.columns = Some(cells);
    }
}

impl RowSource for Parser {
    fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Row>> {
        Ok(Parser::feed(self, chunk)?
            .into_iter()
            .map(Row::Record)
            .collect())
    }

    fn finish(&mut self) -> Result<Vec<Row>> {
        Ok(Parser::finish(self)?.into_iter().map(Row::Record).collect())
    }

    fn columns(&self) -> Option<&[String]> {
        Parser::columns(self)
    }
}
