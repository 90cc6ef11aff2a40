//! Client charsets and the "does this decode to text" probe

use std::borrow::Cow;
use std::fmt;

use encoding_rs::{DecoderResult, Encoding, UTF_16BE, UTF_16LE, UTF_8};

use crate::error::{Error, Result};

/// A one-in-forty whitespace density is the threshold for text
const CHARS_PER_SPACE: usize = 40;

/// A charset a client may declare for its files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    /// UTF-16 with byte-order detection from a BOM, big-endian otherwise
    Utf16,
    Utf16Le,
    Utf16Be,
    /// UTF-32 with byte-order detection from a BOM, big-endian otherwise
    Utf32,
    Utf32Le,
    Utf32Be,
    /// Any other encoding, single- or multi-byte
    Legacy(&'static Encoding),
}

/// Charset families, as far as content inference cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetFamily {
    Utf8,
    Utf16,
    Utf32,
    Legacy,
}

impl Charset {
    /// Look a charset up by name.
    ///
    /// Accepts the server-style names (`utf8`, `utf16le`, `shiftjis`,
    /// `winansi`, ...) as well as any WHATWG encoding label. Returns
    /// `Ok(None)` for `none`, which declares no charset at all.
    pub fn for_label(label: &str) -> Result<Option<Charset>> {
        let normalized = label.trim().to_ascii_lowercase();

        let charset = match normalized.as_str() {
            "none" | "" => return Ok(None),
            "utf8" | "utf-8" | "utf8-bom" => Charset::Utf8,
            "utf16" | "utf-16" | "utf16-nobom" => Charset::Utf16,
            "utf16le" | "utf-16le" | "utf16le-bom" => Charset::Utf16Le,
            "utf16be" | "utf-16be" | "utf16be-bom" => Charset::Utf16Be,
            "utf32" | "utf-32" | "utf32-nobom" => Charset::Utf32,
            "utf32le" | "utf-32le" | "utf32le-bom" => Charset::Utf32Le,
            "utf32be" | "utf-32be" | "utf32be-bom" => Charset::Utf32Be,
            other => {
                let whatwg = server_label_alias(other).unwrap_or(other);
                let encoding = Encoding::for_label(whatwg.as_bytes())
                    .ok_or_else(|| Error::UnknownCharset(label.to_string()))?;
                Self::from_encoding(encoding)
                    .ok_or_else(|| Error::UnknownCharset(label.to_string()))?
            }
        };

        Ok(Some(charset))
    }

    fn from_encoding(encoding: &'static Encoding) -> Option<Charset> {
        if encoding == UTF_8 {
            Some(Charset::Utf8)
        } else if encoding == UTF_16LE {
            Some(Charset::Utf16Le)
        } else if encoding == UTF_16BE {
            Some(Charset::Utf16Be)
        } else if encoding == encoding_rs::REPLACEMENT {
            // Labels that exist only to be refused (ISO-2022-KR and friends)
            None
        } else {
            Some(Charset::Legacy(encoding))
        }
    }

    pub fn family(&self) -> CharsetFamily {
        match self {
            Charset::Utf8 => CharsetFamily::Utf8,
            Charset::Utf16 | Charset::Utf16Le | Charset::Utf16Be => CharsetFamily::Utf16,
            Charset::Utf32 | Charset::Utf32Le | Charset::Utf32Be => CharsetFamily::Utf32,
            Charset::Legacy(_) => CharsetFamily::Legacy,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Utf16 => "UTF-16",
            Charset::Utf16Le => "UTF-16LE",
            Charset::Utf16Be => "UTF-16BE",
            Charset::Utf32 => "UTF-32",
            Charset::Utf32Le => "UTF-32LE",
            Charset::Utf32Be => "UTF-32BE",
            Charset::Legacy(encoding) => encoding.name(),
        }
    }

    /// Decode `bytes` to a string, or `None` if they are malformed in this
    /// charset. An incomplete sequence at the very end is dropped rather
    /// than treated as malformed, since scanned buffers are often cut short.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            Charset::Utf8 => decode_streaming(UTF_8, bytes),
            Charset::Utf16Le => decode_streaming(UTF_16LE, bytes),
            Charset::Utf16Be => decode_streaming(UTF_16BE, bytes),
            Charset::Utf16 => match bytes {
                [0xFF, 0xFE, rest @ ..] => decode_streaming(UTF_16LE, rest),
                [0xFE, 0xFF, rest @ ..] => decode_streaming(UTF_16BE, rest),
                _ => decode_streaming(UTF_16BE, bytes),
            },
            Charset::Utf32Le => decode_utf32(bytes, false),
            Charset::Utf32Be => decode_utf32(bytes, true),
            Charset::Utf32 => match bytes {
                [0xFF, 0xFE, 0x00, 0x00, rest @ ..] => decode_utf32(rest, false),
                [0x00, 0x00, 0xFE, 0xFF, rest @ ..] => decode_utf32(rest, true),
                _ => decode_utf32(bytes, true),
            },
            Charset::Legacy(encoding) => decode_streaming(*encoding, bytes),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Server charset names that are not WHATWG labels
fn server_label_alias(name: &str) -> Option<&'static str> {
    let alias = match name {
        "iso8859-1" => "iso-8859-1",
        "iso8859-5" => "iso-8859-5",
        "iso8859-7" => "iso-8859-7",
        "iso8859-15" => "iso-8859-15",
        "winansi" => "windows-1252",
        "shiftjis" => "shift_jis",
        "eucjp" => "euc-jp",
        "cp949" => "euc-kr",
        "cp936" => "gbk",
        "cp950" => "big5",
        "cp1250" => "windows-1250",
        "cp1251" => "windows-1251",
        "cp1253" => "windows-1253",
        "macosroman" => "macintosh",
        _ => return None,
    };
    Some(alias)
}

/// Decode without replacement and without treating the end of input as the
/// end of the stream
fn decode_streaming<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let capacity = decoder.max_utf8_buffer_length_without_replacement(bytes.len())?;
    let mut out = String::with_capacity(capacity);

    let (result, _) = decoder.decode_to_string_without_replacement(bytes, &mut out, false);
    match result {
        DecoderResult::InputEmpty => Some(Cow::Owned(out)),
        DecoderResult::Malformed(_, _) | DecoderResult::OutputFull => None,
    }
}

fn decode_utf32(bytes: &[u8], big_endian: bool) -> Option<Cow<'_, str>> {
    // A trailing partial code unit is tolerated like any other cut sequence
    let chunks = bytes.chunks_exact(4);
    let mut out = String::with_capacity(bytes.len() / 4);

    for chunk in chunks {
        let unit = [chunk[0], chunk[1], chunk[2], chunk[3]];
        let value = if big_endian {
            u32::from_be_bytes(unit)
        } else {
            u32::from_le_bytes(unit)
        };
        out.push(char::from_u32(value)?);
    }

    Some(Cow::Owned(out))
}

/// Whitespace as counted by the text probe: Unicode white space except the
/// non-breaking spaces and NEL, plus the ASCII information separators
pub(crate) fn is_text_whitespace(c: char) -> bool {
    match c {
        '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{0085}' => false,
        '\u{1C}'..='\u{1F}' => true,
        _ => c.is_whitespace(),
    }
}

/// Decide whether `bytes` decode cleanly in `charset` and, when
/// `check_spaces` is set, whether the result has at least one whitespace
/// character per forty characters.
///
/// Random binary that happens to decode in a permissive charset almost never
/// contains that much whitespace, while prose and source code always do.
pub fn looks_like_text(bytes: &[u8], charset: &Charset, check_spaces: bool) -> bool {
    let decoded = match charset.decode(bytes) {
        Some(decoded) => decoded,
        None => {
            log::trace!("{} bytes do not decode as {}", bytes.len(), charset);
            return false;
        }
    };

    if !check_spaces {
        return true;
    }

    let mut total = 0usize;
    let mut spaces = 0usize;
    for c in decoded.chars() {
        total += 1;
        if is_text_whitespace(c) {
            spaces += 1;
        }
    }

    CHARS_PER_SPACE * spaces >= total
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn utf16le(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    fn utf16be(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect()
    }

    #[rstest]
    #[case("utf8", Charset::Utf8)]
    #[case("UTF-8", Charset::Utf8)]
    #[case("utf16", Charset::Utf16)]
    #[case("utf16le", Charset::Utf16Le)]
    #[case("UTF-16BE", Charset::Utf16Be)]
    #[case("utf32", Charset::Utf32)]
    #[case("utf-32le", Charset::Utf32Le)]
    #[case("shiftjis", Charset::Legacy(encoding_rs::SHIFT_JIS))]
    #[case("winansi", Charset::Legacy(encoding_rs::WINDOWS_1252))]
    #[case("iso8859-1", Charset::Legacy(encoding_rs::WINDOWS_1252))]
    #[case("koi8-r", Charset::Legacy(encoding_rs::KOI8_R))]
    #[case("cp1251", Charset::Legacy(encoding_rs::WINDOWS_1251))]
    fn test_for_label(#[case] label: &str, #[case] expected: Charset) {
        assert_eq!(Charset::for_label(label).unwrap(), Some(expected));
    }

    #[test]
    fn test_for_label_none_and_unknown() {
        assert_eq!(Charset::for_label("none").unwrap(), None);
        assert!(matches!(
            Charset::for_label("klingon"),
            Err(Error::UnknownCharset(_))
        ));
        assert!(Charset::for_label("iso-2022-kr").is_err());
    }

    #[test]
    fn test_families() {
        assert_eq!(Charset::Utf8.family(), CharsetFamily::Utf8);
        assert_eq!(Charset::Utf16Be.family(), CharsetFamily::Utf16);
        assert_eq!(Charset::Utf32.family(), CharsetFamily::Utf32);
        assert_eq!(
            Charset::Legacy(encoding_rs::EUC_JP).family(),
            CharsetFamily::Legacy
        );
    }

    #[test]
    fn test_decode_utf16_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend(utf16le("hello world"));
        assert_eq!(Charset::Utf16.decode(&bytes).unwrap(), "hello world");

        let mut bytes = vec![0xFE, 0xFF];
        bytes.extend(utf16be("hello world"));
        assert_eq!(Charset::Utf16.decode(&bytes).unwrap(), "hello world");

        // No BOM: big-endian
        assert_eq!(Charset::Utf16.decode(&utf16be("abc")).unwrap(), "abc");
    }

    #[test]
    fn test_decode_utf16_unpaired_surrogate_fails() {
        // High surrogate followed by a plain character
        let bytes = [0x00, 0xD8, 0x41, 0x00];
        assert!(Charset::Utf16Le.decode(&bytes).is_none());
    }

    #[test]
    fn test_decode_tolerates_truncated_tail() {
        let mut bytes = utf16le("text");
        bytes.push(0x41);
        assert_eq!(Charset::Utf16Le.decode(&bytes).unwrap(), "text");

        let bytes = [b'o', b'k', 0xE2, 0x82];
        assert_eq!(Charset::Utf8.decode(&bytes).unwrap(), "ok");
    }

    #[test]
    fn test_decode_utf32() {
        let bytes = [0xFF, 0xFE, 0x00, 0x00, b'h', 0, 0, 0, b'i', 0, 0, 0];
        assert_eq!(Charset::Utf32.decode(&bytes).unwrap(), "hi");

        let bytes = [0x00, 0x00, 0x00, b'h', 0x00, 0x11, 0x00, 0x00];
        assert!(Charset::Utf32Be.decode(&bytes).is_none());
    }

    #[test]
    fn test_looks_like_text_accepts_prose() {
        let text = "The quick brown fox jumps over the lazy dog.\n".repeat(4);
        assert!(looks_like_text(&utf16le(&text), &Charset::Utf16Le, true));
        assert!(looks_like_text(text.as_bytes(), &Charset::Utf8, true));
    }

    #[test]
    fn test_looks_like_text_rejects_sparse_whitespace() {
        // High-bit bytes all decode in windows-1252, but there is no whitespace
        let bytes: Vec<u8> = (0..400u32).map(|i| 0xC0 + (i % 0x3F) as u8).collect();
        let charset = Charset::Legacy(encoding_rs::WINDOWS_1252);
        assert!(looks_like_text(&bytes, &charset, false));
        assert!(!looks_like_text(&bytes, &charset, true));
    }

    #[test]
    fn test_looks_like_text_density_threshold() {
        // 39 letters + 1 space: exactly one in forty
        let mut line = "x".repeat(39);
        line.push(' ');
        assert!(looks_like_text(line.as_bytes(), &Charset::Utf8, true));

        let dense = "x".repeat(41) + " ";
        assert!(!looks_like_text(dense.as_bytes(), &Charset::Utf8, true));
    }

    #[test]
    fn test_looks_like_text_decode_failure() {
        assert!(!looks_like_text(&[0xC3, 0x28, b' '], &Charset::Utf8, false));
    }

    #[test]
    fn test_text_whitespace() {
        assert!(is_text_whitespace(' '));
        assert!(is_text_whitespace('\u{1F}'));
        assert!(is_text_whitespace('\u{3000}'));
        assert!(!is_text_whitespace('\u{00A0}'));
        assert!(!is_text_whitespace('\u{0085}'));
        assert!(!is_text_whitespace('x'));
    }

    #[test]
    fn test_next_line_control_is_not_spacing() {
        // 0x85 decodes to U+0085 in ISO-8859-2
        let bytes: Vec<u8> = (0..400)
            .map(|i| if i % 10 == 9 { 0x85 } else { 0xE1 })
            .collect();
        let latin2 = Charset::for_label("iso-8859-2").unwrap().unwrap();
        assert!(latin2.decode(&bytes).is_some());
        assert!(!looks_like_text(&bytes, &latin2, true));
    }
}
