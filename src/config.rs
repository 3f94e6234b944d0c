//! Shared configuration for parsers and stringifiers.

use encoding_rs::Encoding;

use crate::error::{Result, SvError};

/// Newline written by the stringifier unless configured otherwise.
#[cfg(windows)]
pub const DEFAULT_NEWLINE: &str = "\r\n";
/// Newline written by the stringifier unless configured otherwise.
#[cfg(not(windows))]
pub const DEFAULT_NEWLINE: &str = "\n";

/// Escape convention used by the parser.
///
/// The escape byte always protects the byte after it from being read as a
/// delimiter, line break or opening quote. The dialects differ in how they
/// treat an escape inside a quoted cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Escape {
    /// Escape is active outside quotes, and inside quotes except directly
    /// before a quote byte (so `\""` inside quotes is a backslash followed by
    /// a doubled quote).
    FieldEnd(u8),
    /// Backslash dialect: escape is active everywhere, and escape + quote
    /// collapses to a literal quote inside quoted cells too.
    Always(u8),
    /// No escape byte.
    None,
}

impl Default for Escape {
    fn default() -> Self {
        Escape::FieldEnd(b'\\')
    }
}

impl Escape {
    /// Returns the escape byte if set.
    pub fn byte(&self) -> Option<u8> {
        match self {
            Escape::FieldEnd(b) | Escape::Always(b) => Some(*b),
            Escape::None => None,
        }
    }
}

/// Text encoding of the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// A fixed, ASCII-compatible encoding.
    Fixed(&'static Encoding),
    /// Guess the encoding from the first sample of input with chardetng.
    Detect,
}

impl Default for TextEncoding {
    fn default() -> Self {
        TextEncoding::Fixed(encoding_rs::UTF_8)
    }
}

impl TextEncoding {
    /// Look up an encoding by WHATWG label (`utf8`, `latin1`, `windows-1251`, ...).
    ///
    /// `auto` selects [`TextEncoding::Detect`].
    pub fn from_label(label: &str) -> Result<Self> {
        if label.eq_ignore_ascii_case("auto") {
            return Ok(TextEncoding::Detect);
        }
        let encoding = Encoding::for_label(label.as_bytes())
            .ok_or_else(|| SvError::InvalidConfig(format!("unknown encoding {label:?}")))?;
        let encoding = TextEncoding::Fixed(encoding);
        encoding.validate()?;
        Ok(encoding)
    }

    fn validate(&self) -> Result<()> {
        match self {
            TextEncoding::Fixed(encoding) if !encoding.is_ascii_compatible() => {
                Err(SvError::InvalidConfig(format!(
                    "encoding {} is not ASCII-compatible",
                    encoding.name()
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Configuration shared by [`Parser`](crate::Parser) and
/// [`Stringifier`](crate::Stringifier).
///
/// Unset delimiter and columns are inferred by the component that uses them.
/// Inferred values live in that component; the configuration itself never
/// changes once handed over.
///
/// # Example
///
/// ```
/// use sv::{Config, Escape};
///
/// let mut config = Config::new();
/// config
///     .delimiter(b'\t')
///     .missing("NA")
///     .escape(Escape::None)
///     .peek(10);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) encoding: TextEncoding,
    pub(crate) missing: String,
    pub(crate) newline: String,
    pub(crate) delimiter: Option<u8>,
    pub(crate) quote: u8,
    pub(crate) escape: Escape,
    pub(crate) columns: Option<Vec<String>>,
    pub(crate) peek: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            encoding: TextEncoding::default(),
            missing: String::new(),
            newline: DEFAULT_NEWLINE.to_string(),
            delimiter: None,
            quote: b'"',
            escape: Escape::default(),
            columns: None,
            peek: 1,
        }
    }

    /// Set the text encoding.
    pub fn encoding(&mut self, encoding: TextEncoding) -> &mut Self {
        self.encoding = encoding;
        self
    }

    /// Set the placeholder used for absent cells.
    pub fn missing(&mut self, missing: impl Into<String>) -> &mut Self {
        self.missing = missing.into();
        self
    }

    /// Set the newline written after each row.
    pub fn newline(&mut self, newline: impl Into<String>) -> &mut Self {
        self.newline = newline.into();
        self
    }

    /// Force a delimiter (skips delimiter inference).
    pub fn delimiter(&mut self, delimiter: u8) -> &mut Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Set the quote byte.
    pub fn quote(&mut self, quote: u8) -> &mut Self {
        self.quote = quote;
        self
    }

    /// Set the escape dialect.
    pub fn escape(&mut self, escape: Escape) -> &mut Self {
        self.escape = escape;
        self
    }

    /// Force the column set (skips column inference).
    pub fn columns<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Set how many rows the stringifier buffers before inferring columns.
    pub fn peek(&mut self, peek: usize) -> &mut Self {
        self.peek = peek;
        self
    }

    /// Check the parser side: encoding, and the configured bytes against
    /// each other.
    pub(crate) fn validate(&self) -> Result<()> {
        self.encoding.validate()?;
        check_quote(self.quote)?;
        if let Some(delimiter) = self.delimiter {
            check_delimiter(delimiter, self.quote)?;
        }
        check_escape(self.escape.byte(), self.quote, self.delimiter)
    }

    /// Check the stringifier side, where an unset delimiter means comma and
    /// no escape byte is written.
    pub(crate) fn validate_output(&self) -> Result<()> {
        self.encoding.validate()?;
        check_quote(self.quote)?;
        check_delimiter(self.delimiter.unwrap_or(b','), self.quote)
    }
}

fn is_line_break(b: u8) -> bool {
    b == b'\r' || b == b'\n'
}

pub(crate) fn check_quote(quote: u8) -> Result<()> {
    if !quote.is_ascii() || is_line_break(quote) {
        return Err(SvError::InvalidConfig(format!(
            "quote must be an ASCII character other than a line break, got {quote:#04x}"
        )));
    }
    Ok(())
}

/// A delimiter must be ASCII, and distinct from line breaks and the quote.
pub(crate) fn check_delimiter(delimiter: u8, quote: u8) -> Result<()> {
    if !delimiter.is_ascii() || is_line_break(delimiter) {
        return Err(SvError::InvalidConfig(format!(
            "delimiter must be an ASCII character other than a line break, got {delimiter:#04x}"
        )));
    }
    if delimiter == quote {
        return Err(SvError::InvalidConfig(format!(
            "delimiter and quote are both {:?}",
            delimiter as char
        )));
    }
    Ok(())
}

pub(crate) fn check_escape(escape: Option<u8>, quote: u8, delimiter: Option<u8>) -> Result<()> {
    match escape {
        Some(escape)
            if !escape.is_ascii()
                || escape == quote
                || Some(escape) == delimiter
                || is_line_break(escape) =>
        {
            Err(SvError::InvalidConfig(format!(
                "escape {:?} clashes with the quote, delimiter or line break",
                escape as char
            )))
        }
        _ => Ok(()),
    }
}
