//! One-shot conversion: read bytes, parse rows, reshape them, write them out.

use std::io::{self, Read};

use tracing::debug;

use crate::adapter::{Omitter, Picker, RowAdapter, parse_field_list};
use crate::error::Result;
use crate::parser::{READ_CHUNK_SIZE, RowSource};
use crate::row::Row;
use crate::stringifier::RowSink;

/// Counts from one [`transform`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Rows produced by the source.
    pub rows_read: usize,
    /// Rows accepted by the sink.
    pub rows_written: usize,
    /// True if the output was closed before all input was processed.
    pub truncated: bool,
}

/// Build the reshaping stage from comma-separated field lists.
///
/// The omitter always runs before the picker when both are given.
pub fn shape_adapters(omit: Option<&str>, filter: Option<&str>) -> Vec<Box<dyn RowAdapter>> {
    let mut adapters: Vec<Box<dyn RowAdapter>> = Vec::new();
    if let Some(omit) = omit {
        adapters.push(Box::new(Omitter::new(parse_field_list(omit))));
    }
    if let Some(filter) = filter {
        adapters.push(Box::new(Picker::new(parse_field_list(filter))));
    }
    adapters
}

/// Stream `input` through `source`, `adapters` and `sink`.
///
/// A closed output (broken pipe) stops reading and counts as success, with
/// [`Summary::truncated`] set. Any other error aborts the run; output already
/// written stays written.
pub fn transform<R: Read>(
    mut input: R,
    source: &mut dyn RowSource,
    adapters: &[Box<dyn RowAdapter>],
    sink: &mut dyn RowSink,
) -> Result<Summary> {
    let mut summary = Summary::default();
    match pump(&mut input, source, adapters, sink, &mut summary) {
        Ok(()) => Ok(summary),
        Err(e) if e.is_broken_pipe() => {
            debug!(rows = summary.rows_written, "output closed, stopping");
            summary.truncated = true;
            Ok(summary)
        }
        Err(e) => Err(e),
    }
}

fn pump<R: Read>(
    input: &mut R,
    source: &mut dyn RowSource,
    adapters: &[Box<dyn RowAdapter>],
    sink: &mut dyn RowSink,
    summary: &mut Summary,
) -> Result<()> {
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        let rows = source.feed(&buffer[..n])?;
        forward(rows, adapters, sink, summary)?;
    }
    let rows = source.finish()?;
    forward(rows, adapters, sink, summary)?;
    sink.end()
}

fn forward(
    rows: Vec<Row>,
    adapters: &[Box<dyn RowAdapter>],
    sink: &mut dyn RowSink,
    summary: &mut Summary,
) -> Result<()> {
    for row in rows {
        summary.rows_read += 1;
        let row = adapters.iter().fold(row, |row, adapter| adapter.apply(row));
        sink.write(row)?;
        summary.rows_written += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::json::{JsonLinesParser, JsonLinesStringifier};
    use crate::parser::Parser;
    use crate::stringifier::Stringifier;
    use std::io::Write;

    fn unix() -> Config {
        let mut config = Config::new();
        config.newline("\n");
        config
    }

    #[test]
    fn test_tsv_to_csv_with_reshaping() {
        let input = b"index\tname\ttime\tnotes\n1\tchris\t1:18\tfast, clean\n2\tdaniel\t1:17\t\n";
        let mut parser = Parser::new(Config::new()).unwrap();
        let mut stringifier = Stringifier::new(&unix(), Vec::new()).unwrap();
        let adapters = shape_adapters(Some("index"), Some("notes,name"));

        let summary = transform(&input[..], &mut parser, &adapters, &mut stringifier).unwrap();

        assert_eq!(summary.rows_read, 2);
        assert_eq!(summary.rows_written, 2);
        assert!(!summary.truncated);
        assert_eq!(
            String::from_utf8(stringifier.into_inner()).unwrap(),
            "notes,name\n\"fast, clean\",chris\n,daniel\n"
        );
    }

    #[test]
    fn test_json_lines_to_csv() {
        let input = b"{\"name\":\"Tip\"}\n{\"name\":\"Lunch\",\"amount\":5.9}\n";
        let mut source = JsonLinesParser::new();
        let mut config = unix();
        config.peek(2).missing("n/a");
        let mut sink = Stringifier::new(&config, Vec::new()).unwrap();

        transform(&input[..], &mut source, &[], &mut sink).unwrap();

        assert_eq!(
            String::from_utf8(sink.into_inner()).unwrap(),
            "name,amount\nTip,n/a\nLunch,5.9\n"
        );
    }

    #[test]
    fn test_csv_to_json_lines() {
        let input = b"a;b\n1;2\n";
        let mut parser = Parser::new(Config::new()).unwrap();
        let mut sink = JsonLinesStringifier::new(&unix(), Vec::new());

        transform(&input[..], &mut parser, &[], &mut sink).unwrap();

        assert_eq!(sink.into_inner(), b"{\"a\":\"1\",\"b\":\"2\"}\n");
    }

    /// Accepts `limit` bytes, then fails like a closed pipe.
    struct ClosingWriter {
        written: Vec<u8>,
        limit: usize,
    }

    impl Write for ClosingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written.len() + buf.len() > self.limit {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader gone"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_broken_pipe_is_clean_stop() {
        let mut input = b"n\n".to_vec();
        for i in 0..1000 {
            input.extend_from_slice(format!("{i},x\n").as_bytes());
        }
        let mut config = Config::new();
        config.delimiter(b',');
        let mut parser = Parser::new(config).unwrap();
        let mut sink = Stringifier::new(
            &unix(),
            ClosingWriter {
                written: Vec::new(),
                limit: 20,
            },
        )
        .unwrap();

        let summary = transform(&input[..], &mut parser, &[], &mut sink).unwrap();

        assert!(summary.truncated);
        assert!(summary.rows_written < 1000);
        assert!(sink.into_inner().written.starts_with(b"n\n0\n1\n"));
    }

    #[test]
    fn test_other_errors_propagate() {
        let mut parser = Parser::new(Config::new()).unwrap();
        let mut sink = Stringifier::new(&unix(), Vec::new()).unwrap();
        let result = transform(&b"single_column\nvalue\n"[..], &mut parser, &[], &mut sink);
        assert!(matches!(result, Err(crate::SvError::NoDelimiter)));
    }
}
