//! Delimiter and column inference, plus the line-counting and path helpers
//! used when merging files.

use std::io::{self, Read};

use foldhash::{HashSet, HashSetExt};

use crate::row::Row;

/// Maximum number of bytes examined when inferring a delimiter.
pub const SAMPLE_LIMIT: usize = 256;

/// Candidate delimiters in priority order.
///
/// Tab and semicolon rarely show up in free text, so they outrank comma and
/// space, which are common in prose.
pub const DELIMITERS: &[u8] = b"\t;, ";

/// Returns the part of `sample` that delimiter inference looks at: the first
/// line, capped at [`SAMPLE_LIMIT`] bytes.
fn first_line(sample: &[u8]) -> &[u8] {
    let upto = sample.len().min(SAMPLE_LIMIT);
    let end = sample[..upto]
        .iter()
        .position(|&b| b == b'\n' || b == b'\r')
        .unwrap_or(upto);
    &sample[..end]
}

/// Returns true once `sample` holds enough bytes for [`infer_delimiter`] to
/// see its whole window: a line break, or [`SAMPLE_LIMIT`] bytes.
pub fn sample_complete(sample: &[u8]) -> bool {
    sample.len() >= SAMPLE_LIMIT || sample.iter().any(|&b| b == b'\n' || b == b'\r')
}

/// Guess a single-byte delimiter from the start of the input.
///
/// Returns the first of tab, semicolon, comma and space that occurs in the
/// first line (or first 256 bytes), or `None` if none of them does.
pub fn infer_delimiter(sample: &[u8]) -> Option<u8> {
    let line = first_line(sample);
    DELIMITERS
        .iter()
        .copied()
        .find(|&candidate| bytecount::count(line, candidate) > 0)
}

/// Collect the column names of all records in `rows`, in first-seen order.
///
/// Positional and raw rows carry no names and are skipped.
pub fn infer_columns<'a, I>(rows: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Row>,
{
    let mut columns = Vec::new();
    let mut seen = HashSet::new();
    for row in rows {
        if let Row::Record(record) = row {
            for key in record.keys() {
                if seen.insert(key) {
                    columns.push(key.to_string());
                }
            }
        }
    }
    columns
}

/// Longest common prefix of `paths`, never splitting a character.
pub fn common_prefix<S: AsRef<str>>(paths: &[S]) -> &str {
    let Some((first, rest)) = paths.split_first() else {
        return "";
    };
    let first = first.as_ref();
    let mut len = first.len();
    for path in rest {
        let path = path.as_ref();
        len = first[..len]
            .char_indices()
            .zip(path.chars())
            .find(|((_, a), b)| a != b)
            .map_or(len.min(path.len()), |((i, _), _)| i);
        if len == 0 {
            break;
        }
    }
    &first[..len]
}

/// Counts line breaks in a byte stream fed in arbitrary chunks.
///
/// CR, LF and CRLF each count as one break, including a CRLF split across
/// two chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineCounter {
    count: usize,
    after_cr: bool,
}

impl LineCounter {
    /// Create a counter at zero.
    pub const fn new() -> Self {
        Self {
            count: 0,
            after_cr: false,
        }
    }

    /// Count the breaks in the next chunk.
    pub fn feed(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        let mut bytes = chunk;
        if self.after_cr && bytes[0] == b'\n' {
            bytes = &bytes[1..];
        }
        if !bytes.contains(&b'\r') {
            self.count += bytecount::count(bytes, b'\n');
        } else {
            let mut i = 0;
            while i < bytes.len() {
                match bytes[i] {
                    b'\r' => {
                        self.count += 1;
                        if bytes.get(i + 1) == Some(&b'\n') {
                            i += 1;
                        }
                    }
                    b'\n' => self.count += 1,
                    _ => {}
                }
                i += 1;
            }
        }
        self.after_cr = chunk[chunk.len() - 1] == b'\r';
    }

    /// Returns the number of breaks seen so far.
    pub fn count(&self) -> usize {
        self.count
    }
}

/// Count the line breaks in everything `reader` yields.
pub fn count_line_breaks<R: Read>(mut reader: R) -> io::Result<usize> {
    let mut counter = LineCounter::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        counter.feed(&buffer[..n]);
    }
    Ok(counter.count())
}
