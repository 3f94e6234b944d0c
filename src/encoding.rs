//! Encoding detection, streaming transcoding to UTF-8 and encoding of output
//! text using chardetng and `encoding_rs`.

use std::borrow::Cow;

use chardetng::EncodingDetector;
use encoding_rs::{Decoder, DecoderResult, Encoding};
use simdutf8::basic::from_utf8;

use crate::error::{Result, SvError};
use crate::inference::LineCounter;

/// Check if the given bytes are valid UTF-8.
///
/// Uses SIMD-accelerated validation for performance.
pub fn is_utf8(data: &[u8]) -> bool {
    from_utf8(data).is_ok()
}

/// Check if the data starts with a UTF-8 BOM (Byte Order Mark).
///
/// The UTF-8 BOM is the byte sequence: EF BB BF
pub fn has_utf8_bom(data: &[u8]) -> bool {
    data.starts_with(&[0xEF, 0xBB, 0xBF])
}

/// Skip the UTF-8 BOM if present and return the remaining data.
pub fn skip_bom(data: &[u8]) -> &[u8] {
    if has_utf8_bom(data) { &data[3..] } else { data }
}

/// Returns true if `data` could still turn out to start with a UTF-8 BOM
/// once more bytes arrive.
pub(crate) fn may_become_bom(data: &[u8]) -> bool {
    data.len() < 3 && [0xEF, 0xBB, 0xBF].starts_with(data)
}

/// Guess the encoding of a sample.
///
/// Valid UTF-8 (with or without BOM) is reported as UTF-8; anything else is
/// handed to chardetng. Guesses that are not ASCII-compatible fall back to
/// windows-1252.
pub fn detect_encoding(sample: &[u8], last: bool) -> &'static Encoding {
    let data = skip_bom(sample);
    if is_utf8(data) {
        return encoding_rs::UTF_8;
    }

    let mut detector = EncodingDetector::new();
    detector.feed(data, last);
    let encoding = detector.guess(None, true);

    if encoding.is_ascii_compatible() {
        encoding
    } else {
        encoding_rs::WINDOWS_1252
    }
}

/// Streaming conversion of input bytes to UTF-8.
///
/// Multi-byte sequences may be split across calls. Malformed input is an
/// error carrying the 1-based line it was found on.
pub(crate) struct Transcoder {
    decoder: Decoder,
    scratch: String,
    lines: LineCounter,
}

impl Transcoder {
    pub(crate) fn new(encoding: &'static Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder_without_bom_handling(),
            scratch: String::new(),
            lines: LineCounter::new(),
        }
    }

    /// Decode `input`, appending the UTF-8 text to `out`.
    pub(crate) fn feed(&mut self, mut input: &[u8], last: bool, out: &mut Vec<u8>) -> Result<()> {
        loop {
            self.scratch.clear();
            let needed = self
                .decoder
                .max_utf8_buffer_length_without_replacement(input.len())
                .unwrap_or(input.len());
            self.scratch.reserve(needed.max(16));

            let (result, read) =
                self.decoder
                    .decode_to_string_without_replacement(input, &mut self.scratch, last);
            input = &input[read..];
            self.lines.feed(self.scratch.as_bytes());
            out.extend_from_slice(self.scratch.as_bytes());

            match result {
                DecoderResult::InputEmpty => return Ok(()),
                DecoderResult::OutputFull => continue,
                DecoderResult::Malformed(_, _) => {
                    return Err(SvError::Decode {
                        line: self.lines.count() + 1,
                        encoding: self.decoder.encoding().name(),
                    });
                }
            }
        }
    }
}

impl std::fmt::Debug for Transcoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcoder")
            .field("encoding", &self.decoder.encoding().name())
            .field("lines", &self.lines.count())
            .finish()
    }
}

/// Encode output text.
///
/// Characters the encoding cannot represent are written as HTML numeric
/// character references, which is `encoding_rs`'s behaviour.
pub fn encode<'a>(text: &'a str, encoding: &'static Encoding) -> Cow<'a, [u8]> {
    if encoding == encoding_rs::UTF_8 {
        return Cow::Borrowed(text.as_bytes());
    }
    let (bytes, _, _) = encoding.encode(text);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_utf8() {
        assert!(is_utf8(b"Hello, World!"));
        assert!(is_utf8("こんにちは".as_bytes()));
        assert!(is_utf8(b""));
        assert!(!is_utf8(&[0xFF, 0xFE]));
    }

    #[test]
    fn test_utf8_bom() {
        let with_bom = [0xEF, 0xBB, 0xBF, b'a', b'b', b'c'];
        let without_bom = b"abc";

        assert!(has_utf8_bom(&with_bom));
        assert!(!has_utf8_bom(without_bom));

        assert_eq!(skip_bom(&with_bom), b"abc");
        assert_eq!(skip_bom(without_bom), b"abc");
    }

    #[test]
    fn test_may_become_bom() {
        assert!(may_become_bom(&[]));
        assert!(may_become_bom(&[0xEF]));
        assert!(may_become_bom(&[0xEF, 0xBB]));
        assert!(!may_become_bom(&[0xEF, 0xBB, 0xBF]));
        assert!(!may_become_bom(b"a"));
    }

    #[test]
    fn test_detect_utf8() {
        assert_eq!(detect_encoding(b"name,city\nZoe,Z\xc3\xbcrich\n", true), encoding_rs::UTF_8);
    }

    #[test]
    fn test_detect_windows1251() {
        // "Привет,мир" in windows-1251
        let data: &[u8] = &[0xCF, 0xF0, 0xE8, 0xE2, 0xE5, 0xF2, b',', 0xEC, 0xE8, 0xF0, b'\n'];
        let encoding = detect_encoding(data, true);
        assert_ne!(encoding, encoding_rs::UTF_8);
        assert!(encoding.is_ascii_compatible());
    }

    fn transcode_chunks(encoding: &'static Encoding, chunks: &[&[u8]]) -> Result<String> {
        let mut transcoder = Transcoder::new(encoding);
        let mut out = Vec::new();
        for chunk in chunks {
            transcoder.feed(chunk, false, &mut out)?;
        }
        transcoder.feed(&[], true, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_transcode_shift_jis_split_sequence() {
        // "ソ" is 0x83 0x5C; the trail byte is a backslash in ASCII
        let text = transcode_chunks(encoding_rs::SHIFT_JIS, &[b"a,\x83", b"\x5c,b\n"]).unwrap();
        assert_eq!(text, "a,\u{30bd},b\n");
    }

    #[test]
    fn test_transcode_utf8_split_sequence() {
        let text = transcode_chunks(encoding_rs::UTF_8, &[b"Z\xc3", b"\xbcrich"]).unwrap();
        assert_eq!(text, "Z\u{fc}rich");
    }

    #[test]
    fn test_transcode_reports_line() {
        let err = transcode_chunks(encoding_rs::UTF_8, &[b"a\r\nb\n", b"c\xff\n"]).unwrap_err();
        assert!(matches!(err, SvError::Decode { line: 3, encoding: "UTF-8" }));

        let err = transcode_chunks(encoding_rs::UTF_8, &[b"a\n\xe2\x82"]).unwrap_err();
        assert!(matches!(err, SvError::Decode { line: 2, .. }));
    }

    #[test]
    fn test_encode() {
        assert_eq!(&encode("abc", encoding_rs::UTF_8)[..], b"abc");
        assert_eq!(&encode("Zür", encoding_rs::WINDOWS_1252)[..], &[b'Z', 0xFC, b'r']);
    }
}
