use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for parse, stringify and merge operations.
#[derive(Error, Debug)]
pub enum SvError {
    /// IO error on the input or output side.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// IO error tied to a specific input file.
    #[error("{}: {source}", path.display())]
    File {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A JSON-lines input line could not be parsed.
    #[error("Invalid JSON on line {line}: {source}")]
    Json {
        /// 1-based line number within the input.
        line: usize,
        /// The underlying serde_json error.
        #[source]
        source: serde_json::Error,
    },

    /// Input was not valid in the configured text encoding.
    #[error("Line {line} is not valid {encoding}")]
    Decode {
        /// 1-based physical line of the first malformed byte. CR, LF and
        /// CRLF each end a line, including inside quoted cells.
        line: usize,
        /// Name of the encoding in effect.
        encoding: &'static str,
    },

    /// No candidate delimiter appeared in the input sample.
    #[error("Could not infer a delimiter; none of tab, semicolon, comma or space appear in the first line")]
    NoDelimiter,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SvError {
    /// Returns true if this error means the consumer went away.
    ///
    /// A closed downstream pipe is a normal way for a streaming run to end
    /// (`sv data.csv | head`), so callers treat it as success.
    pub fn is_broken_pipe(&self) -> bool {
        match self {
            SvError::Io(e) => e.kind() == io::ErrorKind::BrokenPipe,
            _ => false,
        }
    }
}

/// Result type alias for sv operations.
pub type Result<T> = std::result::Result<T, SvError>;
