//! Table-driven UTF-8 validity scanner
//!
//! Unlike [`std::str::from_utf8`], a scan that runs out of input in the
//! middle of a multi-byte sequence is not an error: the missing bytes may
//! simply lie beyond the end of a partial read.

/// Outcome of a validity scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utf8Validity {
    Invalid,
    Valid,
    /// Every byte seen is consistent with UTF-8, but the last sequence is
    /// incomplete
    ValidSoFar,
}

impl Utf8Validity {
    /// Valid, or valid up to a truncated final sequence
    pub fn is_valid_prefix(self) -> bool {
        !matches!(self, Utf8Validity::Invalid)
    }
}

/*
 * Per-byte flags:
 *
 * 0x40  may start a sequence (ASCII or lead byte)
 * 0x80  continuation byte
 * 0x07  number of continuation bytes a lead expects
 * 0x38  second-byte constraint of a lead ("magic"):
 *       0x30 after E0, 0x08 after ED, 0x20 after F0, 0x10 after F4
 *
 * Continuation bytes carry 0x20 for 80..8F and 0x10 for 80..9F so the
 * magic checks can test a range with a single mask.
 */

const FLAG_START: u8 = 0x40;
const FLAG_CONTINUATION: u8 = 0x80;
const FOLLOW_MASK: u8 = 0x07;
const MAGIC_MASK: u8 = 0x38;

const MAGIC_F4: u8 = 0x10;
const MAGIC_F0: u8 = 0x20;
const MAGIC_E0: u8 = 0x30;
const MAGIC_ED: u8 = 0x08;

const LOW_80_8F: u8 = 0x20;
const LOW_80_9F: u8 = 0x10;

const AS: u8 = FLAG_START; // ASCII
const C8: u8 = FLAG_CONTINUATION | LOW_80_8F | LOW_80_9F; // 80..8F
const C9: u8 = FLAG_CONTINUATION | LOW_80_9F; // 90..9F
const CA: u8 = FLAG_CONTINUATION; // A0..BF
const L2: u8 = FLAG_START | 1;
const L3: u8 = FLAG_START | 2;
const E0: u8 = FLAG_START | MAGIC_E0 | 2;
const ED: u8 = FLAG_START | MAGIC_ED | 2;
const L4: u8 = FLAG_START | 3;
const F0: u8 = FLAG_START | MAGIC_F0 | 3;
const F4: u8 = FLAG_START | MAGIC_F4 | 3;
const XX: u8 = 0; // never valid

static UTF8_MAP: [u8; 256] = [
    //   1   2   3   4   5   6   7   8   9   A   B   C   D   E   F
    AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, // 0x00-0x0F
    AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, // 0x10-0x1F
    AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, // 0x20-0x2F
    AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, // 0x30-0x3F
    AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, // 0x40-0x4F
    AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, // 0x50-0x5F
    AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, // 0x60-0x6F
    AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, AS, // 0x70-0x7F
    C8, C8, C8, C8, C8, C8, C8, C8, C8, C8, C8, C8, C8, C8, C8, C8, // 0x80-0x8F
    C9, C9, C9, C9, C9, C9, C9, C9, C9, C9, C9, C9, C9, C9, C9, C9, // 0x90-0x9F
    CA, CA, CA, CA, CA, CA, CA, CA, CA, CA, CA, CA, CA, CA, CA, CA, // 0xA0-0xAF
    CA, CA, CA, CA, CA, CA, CA, CA, CA, CA, CA, CA, CA, CA, CA, CA, // 0xB0-0xBF
    XX, XX, L2, L2, L2, L2, L2, L2, L2, L2, L2, L2, L2, L2, L2, L2, // 0xC0-0xCF
    L2, L2, L2, L2, L2, L2, L2, L2, L2, L2, L2, L2, L2, L2, L2, L2, // 0xD0-0xDF
    E0, L3, L3, L3, L3, L3, L3, L3, L3, L3, L3, L3, L3, ED, L3, L3, // 0xE0-0xEF
    F0, L4, L4, L4, F4, XX, XX, XX, XX, XX, XX, XX, XX, XX, XX, XX, // 0xF0-0xFF
];

/// Scan `buf` and report whether it is well-formed UTF-8.
///
/// Rejects overlong forms, UTF-16 surrogate code points and anything above
/// U+10FFFF. A buffer ending inside a sequence reports
/// [`Utf8Validity::ValidSoFar`].
pub fn check_validity(buf: &[u8]) -> Utf8Validity {
    let mut follow = 0u8;
    let mut magic = 0u8;

    for &byte in buf {
        let flags = UTF8_MAP[byte as usize];

        if follow != 0 {
            if flags & FLAG_CONTINUATION == 0 {
                return Utf8Validity::Invalid;
            }
            follow -= 1;

            if magic != 0 {
                let allowed = match magic {
                    // F4 90.. would exceed U+10FFFF
                    MAGIC_F4 => flags & LOW_80_8F != 0,
                    // F0 80..8F is overlong
                    MAGIC_F0 => flags & LOW_80_8F == 0,
                    // E0 80..9F is overlong
                    MAGIC_E0 => flags & LOW_80_9F == 0,
                    // ED A0..BF encodes a surrogate
                    MAGIC_ED => flags & (LOW_80_8F | LOW_80_9F) != 0,
                    _ => true,
                };
                if !allowed {
                    return Utf8Validity::Invalid;
                }
                magic = 0;
            }
        } else {
            if flags & FLAG_START == 0 {
                return Utf8Validity::Invalid;
            }
            follow = flags & FOLLOW_MASK;
            magic = flags & MAGIC_MASK;
        }
    }

    if follow != 0 {
        Utf8Validity::ValidSoFar
    } else {
        Utf8Validity::Valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_ascii_is_valid() {
        assert_eq!(check_validity(b"plain ascii\r\n\t"), Utf8Validity::Valid);
        assert_eq!(check_validity(b""), Utf8Validity::Valid);
    }

    #[test]
    fn test_multibyte_is_valid() {
        assert_eq!(check_validity("café ünïcødé €".as_bytes()), Utf8Validity::Valid);
        assert_eq!(check_validity("日本語テキスト".as_bytes()), Utf8Validity::Valid);
        assert_eq!(check_validity("emoji 🦀".as_bytes()), Utf8Validity::Valid);
    }

    #[rstest]
    #[case(&[0xE2])]
    #[case(&[b'a', 0xE2, 0x82])]
    #[case(&[0xF0, 0x9F, 0xA6])]
    #[case(&[0xC3])]
    fn test_truncated_tail_is_valid_so_far(#[case] input: &[u8]) {
        assert_eq!(check_validity(input), Utf8Validity::ValidSoFar);
        assert!(check_validity(input).is_valid_prefix());
    }

    #[rstest]
    #[case(&[0x80])] // lone continuation
    #[case(&[0xC0, 0xAF])] // overlong slash
    #[case(&[0xC1, 0xBF])]
    #[case(&[0xE0, 0x80, 0xAF])] // overlong 3-byte
    #[case(&[0xED, 0xA0, 0x80])] // high surrogate
    #[case(&[0xED, 0xBF, 0xBF])] // low surrogate
    #[case(&[0xF0, 0x80, 0x80, 0xAF])] // overlong 4-byte
    #[case(&[0xF4, 0x90, 0x80, 0x80])] // above U+10FFFF
    #[case(&[0xF5, 0x80, 0x80, 0x80])]
    #[case(&[0xFF])]
    #[case(&[0xC3, b'a'])] // ASCII where a continuation is expected
    fn test_rejects_malformed(#[case] input: &[u8]) {
        assert_eq!(check_validity(input), Utf8Validity::Invalid);
    }

    #[test]
    fn test_magic_boundaries_accepted() {
        // U+0800, U+D7FF, U+10000, U+10FFFF
        assert_eq!(check_validity(&[0xE0, 0xA0, 0x80]), Utf8Validity::Valid);
        assert_eq!(check_validity(&[0xED, 0x9F, 0xBF]), Utf8Validity::Valid);
        assert_eq!(check_validity(&[0xF0, 0x90, 0x80, 0x80]), Utf8Validity::Valid);
        assert_eq!(check_validity(&[0xF4, 0x8F, 0xBF, 0xBF]), Utf8Validity::Valid);
    }

    #[test]
    fn test_agrees_with_std_on_complete_input() {
        let samples: [&[u8]; 5] = [
            b"hello",
            "ÀÉÎÕÜ".as_bytes(),
            &[0xE0, 0x9F, 0x80],
            &[0xF4, 0x8F, 0x80, 0x80],
            &[0xED, 0x80, 0x80],
        ];
        for sample in samples {
            let ours = check_validity(sample) == Utf8Validity::Valid;
            assert_eq!(ours, std::str::from_utf8(sample).is_ok(), "{:02x?}", sample);
        }
    }
}
