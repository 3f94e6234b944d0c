//! sv: streaming conversion between delimited text and row records
//!
//! Reads CSV, TSV and similar single-byte-delimited text in arbitrary chunks
//! and turns it into row records, and writes row records back out as
//! well-formed delimited text (or JSON lines). Delimiter and column set are
//! inferred when not configured.
//!
//! # Quick Start
//!
//! ```
//! use sv::{Config, Parser, Row, RowSink, Stringifier};
//!
//! // Parse: the delimiter is inferred from the first line, the column set
//! // from the first row.
//! let parser = Parser::new(Config::new()).unwrap();
//! let rows = parser
//!     .parse_bytes(b"name\tamount\nLunch\t5.90\nLatte\t3.15\n")
//!     .unwrap();
//! assert_eq!(rows[1].get("amount"), Some("3.15"));
//!
//! // Stringify: the column set is inferred from the first `peek` rows.
//! let mut config = Config::new();
//! config.newline("\n").delimiter(b';');
//! let mut stringifier = Stringifier::new(&config, Vec::new()).unwrap();
//! for row in rows {
//!     stringifier.write(Row::Record(row)).unwrap();
//! }
//! stringifier.end().unwrap();
//! assert_eq!(
//!     stringifier.into_inner(),
//!     b"name;amount\nLunch;5.90\nLatte;3.15\n"
//! );
//! ```
//!
//! # Dialect
//!
//! Cells may be quoted with a configurable quote byte; inside a quoted cell a
//! doubled quote is one literal quote (the Excel dialect). An escape byte
//! (backslash by default, see [`Escape`]) protects the byte after it. Input
//! that ends inside a quote, and rows with too many or too few cells, are
//! accepted rather than rejected.
//!
//! # Streaming
//!
//! [`Parser::feed`] takes chunks of any size and returns the rows they
//! complete; [`Parser::finish`] flushes the last row. [`Stringifier`] holds
//! rows back only until its column set is known. [`transform`] wires a
//! [`RowSource`], [`RowAdapter`]s and a [`RowSink`] together over a reader and
//! treats a closed output as a normal end of the run.

mod adapter;
mod config;
mod encoding;
mod error;
mod inference;
mod json;
pub mod merge;
mod parser;
mod pipeline;
mod row;
mod stringifier;

pub use adapter::{Omitter, Picker, RowAdapter, parse_field_list};
pub use config::{Config, DEFAULT_NEWLINE, Escape, TextEncoding};
pub use error::{Result, SvError};
pub use json::{JsonLinesParser, JsonLinesStringifier};
pub use merge::{MergeSummary, merge};
pub use parser::{Parser, READ_CHUNK_SIZE, RowSource};
pub use pipeline::{Summary, shape_adapters, transform};
pub use row::{Record, Row};
pub use stringifier::{RowSink, Stringifier};

// Re-export for advanced usage
pub use encoding::{detect_encoding, is_utf8};
pub use inference::{
    DELIMITERS, LineCounter, SAMPLE_LIMIT, common_prefix, count_line_breaks, infer_columns,
    infer_delimiter,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api() {
        // Verify all public types are accessible
        let _config = Config::new();
        let _escape = Escape::Always(b'\\');
        let _encoding = TextEncoding::Detect;
        let _row = Row::Raw(String::new());
        let _picker = Picker::new(["a"]);
        let _source = JsonLinesParser::new();
    }

    #[test]
    fn test_parse_simple_csv() {
        let rows = Parser::new(Config::new())
            .unwrap()
            .parse_bytes(b"a,b,c\n1,2,3\n4,5,6\n")
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("c"), Some("6"));
    }

    #[test]
    fn test_sources_and_sinks_are_object_safe() {
        let sources: Vec<Box<dyn RowSource>> = vec![
            Box::new(Parser::new(Config::new()).unwrap()),
            Box::new(JsonLinesParser::new()),
        ];
        assert_eq!(sources.len(), 2);

        let config = Config::new();
        let sinks: Vec<Box<dyn RowSink>> = vec![
            Box::new(Stringifier::new(&config, Vec::new()).unwrap()),
            Box::new(JsonLinesStringifier::new(&config, Vec::new())),
        ];
        assert_eq!(sinks.len(), 2);
    }
}
