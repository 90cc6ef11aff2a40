//! Line ending translation for text content
//!
//! Content sent to the server always uses `\n`. [`LineEndingReader`] filters
//! a local byte stream into that form, and [`LineEndingWriter`] does the
//! reverse for content arriving from the server.
//!
//! Translation is byte oriented, so the UTF-16 modes are rejected.

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use crate::error::{Error, Result};

const BUFFER_SIZE: usize = 8 * 1024;

#[cfg(windows)]
const NATIVE_LINE_END: &[u8] = b"\r\n";
#[cfg(not(windows))]
const NATIVE_LINE_END: &[u8] = b"\n";

/// A client's line ending convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEndingMode {
    #[default]
    Lf,
    Cr,
    CrLf,
    /// Accept both `\r\n` and lone `\r` on input, write `\n`
    LfCrLf,
    /// Whatever the platform uses
    Local,
    LfUtf16,
    CrLfUtf16,
}

impl LineEndingMode {
    /// Resolve [`LineEndingMode::Local`] to the platform's convention.
    pub fn resolve(self) -> LineEndingMode {
        match self {
            LineEndingMode::Local => match NATIVE_LINE_END {
                b"\n" => LineEndingMode::Lf,
                b"\r" => LineEndingMode::Cr,
                b"\r\n" => LineEndingMode::CrLf,
                _ => LineEndingMode::Lf,
            },
            other => other,
        }
    }

    /// Bytes written for each `\n` coming from the server
    pub fn line_end_bytes(self) -> &'static [u8] {
        match self.resolve() {
            LineEndingMode::Cr => b"\r",
            LineEndingMode::CrLf | LineEndingMode::CrLfUtf16 => b"\r\n",
            _ => b"\n",
        }
    }

    /// Whether content differs from the server form and must be filtered
    pub fn needs_filtering(self) -> bool {
        matches!(
            self.resolve(),
            LineEndingMode::Cr | LineEndingMode::CrLf | LineEndingMode::LfCrLf
        )
    }

    pub fn is_utf16(self) -> bool {
        matches!(self, LineEndingMode::LfUtf16 | LineEndingMode::CrLfUtf16)
    }

    fn byte_mode(self) -> Result<LineEndingMode> {
        if self.is_utf16() {
            return Err(Error::UnsupportedLineEnding(self));
        }
        Ok(self.resolve())
    }
}

impl FromStr for LineEndingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lf" | "unix" => Ok(LineEndingMode::Lf),
            "cr" | "mac" => Ok(LineEndingMode::Cr),
            "crlf" | "win" => Ok(LineEndingMode::CrLf),
            "lfcrlf" | "share" => Ok(LineEndingMode::LfCrLf),
            "local" => Ok(LineEndingMode::Local),
            "lf-utf16" => Ok(LineEndingMode::LfUtf16),
            "crlf-utf16" => Ok(LineEndingMode::CrLfUtf16),
            _ => Err(Error::UnknownLineEnding(s.to_string())),
        }
    }
}

impl fmt::Display for LineEndingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LineEndingMode::Lf => "lf",
            LineEndingMode::Cr => "cr",
            LineEndingMode::CrLf => "crlf",
            LineEndingMode::LfCrLf => "lfcrlf",
            LineEndingMode::Local => "local",
            LineEndingMode::LfUtf16 => "lf-utf16",
            LineEndingMode::CrLfUtf16 => "crlf-utf16",
        };
        f.write_str(name)
    }
}

/// Streaming filter that turns local line endings into `\n`.
///
/// A `\r` that may begin a `\r\n` pair ends the read call that emits it.
/// If the next call finds a `\n` waiting, that `\n` is consumed and the
/// byte just before `offset` in the caller's buffer is rewritten to `\n`.
/// Callers must therefore pass the same buffer with `offset` right after the
/// previously returned bytes; [`LineEndingReader::copy_to`] does this. In
/// [`LineEndingMode::CrLf`] mode a read at offset 0 with such a `\n` waiting
/// fails with [`io::ErrorKind::InvalidInput`] and consumes nothing.
///
/// In [`LineEndingMode::Cr`] mode every read call stops after one line.
pub struct LineEndingReader<R> {
    source: R,
    mode: LineEndingMode,
    buffer: Box<[u8]>,
    cursor: usize,
    count: usize,
    pending_lf_soak: bool,
    exhausted: bool,
}

impl<R: Read> LineEndingReader<R> {
    pub fn new(source: R, mode: LineEndingMode) -> Result<Self> {
        let mode = mode.byte_mode()?;
        log::trace!("line ending reader in {} mode", mode);
        Ok(Self {
            source,
            mode,
            buffer: vec![0; BUFFER_SIZE].into_boxed_slice(),
            cursor: 0,
            count: 0,
            pending_lf_soak: false,
            exhausted: false,
        })
    }

    /// The resolved mode
    pub fn mode(&self) -> LineEndingMode {
        self.mode
    }

    /// Fill `target[offset..offset + len]` with translated bytes.
    ///
    /// Returns `Ok(None)` at end of stream.
    pub fn read(&mut self, target: &mut [u8], offset: usize, len: usize) -> io::Result<Option<usize>> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= target.len())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "range {}+{} outside buffer of {} bytes",
                        offset,
                        len,
                        target.len()
                    ),
                )
            })?;
        if len == 0 {
            return Ok(Some(0));
        }

        if self.pending_lf_soak {
            if self.fill()? && self.buffer[self.cursor] == b'\n' {
                if offset == 0 && self.mode == LineEndingMode::CrLf {
                    // The \r to rewrite is not in this buffer
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "pending \\r\\n needs the previous \\r at target[offset - 1]; \
                         read into one contiguous buffer",
                    ));
                }
                self.cursor += 1;
                if offset > 0 {
                    target[offset - 1] = b'\n';
                }
            }
            self.pending_lf_soak = false;
        }

        let mut pos = offset;
        while pos < end {
            if !self.fill()? {
                break;
            }

            if self.mode == LineEndingMode::Lf {
                let n = (end - pos).min(self.count - self.cursor);
                target[pos..pos + n].copy_from_slice(&self.buffer[self.cursor..self.cursor + n]);
                self.cursor += n;
                pos += n;
                continue;
            }

            let byte = self.buffer[self.cursor];
            self.cursor += 1;
            if byte != b'\r' {
                target[pos] = byte;
                pos += 1;
                continue;
            }

            match self.mode {
                LineEndingMode::Cr => {
                    target[pos] = b'\n';
                }
                LineEndingMode::CrLf => {
                    target[pos] = b'\r';
                    self.pending_lf_soak = true;
                }
                _ => {
                    target[pos] = b'\n';
                    self.pending_lf_soak = true;
                }
            }
            pos += 1;
            break;
        }

        let written = pos - offset;
        if written == 0 && self.exhausted {
            Ok(None)
        } else {
            Ok(Some(written))
        }
    }

    /// Pipe the whole stream into `writer`, returning the bytes written.
    pub fn copy_to<W: Write>(&mut self, writer: &mut W) -> io::Result<u64> {
        let mut chunk = vec![0u8; BUFFER_SIZE];
        let mut filled = 0;
        let mut total = 0u64;

        loop {
            if filled == chunk.len() {
                // Keep the last byte; a following read may rewrite it
                writer.write_all(&chunk[..filled - 1])?;
                total += (filled - 1) as u64;
                chunk[0] = chunk[filled - 1];
                filled = 1;
            }
            match self.read(&mut chunk, filled, BUFFER_SIZE - filled)? {
                Some(n) => filled += n,
                None => break,
            }
        }

        writer.write_all(&chunk[..filled])?;
        total += filled as u64;
        Ok(total)
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Make sure buffered input is available; false at end of stream.
    fn fill(&mut self) -> io::Result<bool> {
        if self.cursor < self.count {
            return Ok(true);
        }
        if self.exhausted {
            return Ok(false);
        }
        loop {
            match self.source.read(&mut self.buffer) {
                Ok(0) => {
                    self.exhausted = true;
                    self.cursor = 0;
                    self.count = 0;
                    return Ok(false);
                }
                Ok(n) => {
                    self.cursor = 0;
                    self.count = n;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R> fmt::Debug for LineEndingReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineEndingReader")
            .field("mode", &self.mode)
            .field("buffered", &(self.count - self.cursor))
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

/// Writes server content (`\n` endings) in a local line ending convention.
#[derive(Debug)]
pub struct LineEndingWriter<W> {
    inner: W,
    line_end: &'static [u8],
}

impl<W: Write> LineEndingWriter<W> {
    pub fn new(inner: W, mode: LineEndingMode) -> Result<Self> {
        let mode = mode.byte_mode()?;
        Ok(Self {
            inner,
            line_end: mode.line_end_bytes(),
        })
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for LineEndingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.line_end == b"\n" {
            return self.inner.write(buf);
        }

        let mut lines = buf.split(|&b| b == b'\n').peekable();
        while let Some(line) = lines.next() {
            self.inner.write_all(line)?;
            if lines.peek().is_some() {
                self.inner.write_all(self.line_end)?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::VecDeque;

    /// Hands out one pre-split chunk per read call
    struct Chunked {
        chunks: VecDeque<io::Result<Vec<u8>>>,
    }

    impl Chunked {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| Ok(c.to_vec())).collect(),
            }
        }
    }

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
            }
        }
    }

    fn normalize(input: &[u8], mode: LineEndingMode) -> Vec<u8> {
        let mut reader = LineEndingReader::new(input, mode).unwrap();
        let mut out = Vec::new();
        let n = reader.copy_to(&mut out).unwrap();
        assert_eq!(n, out.len() as u64);
        out
    }

    #[rstest]
    #[case(LineEndingMode::Lf, b"a\r\nb\rc\n", b"a\r\nb\rc\n")]
    #[case(LineEndingMode::Cr, b"a\rb\rc", b"a\nb\nc")]
    #[case(LineEndingMode::Cr, b"a\r\nb", b"a\n\nb")]
    #[case(LineEndingMode::CrLf, b"one\r\ntwo\r\n", b"one\ntwo\n")]
    #[case(LineEndingMode::CrLf, b"lone\rcr\n", b"lone\rcr\n")]
    #[case(LineEndingMode::CrLf, b"trailing\r", b"trailing\r")]
    #[case(LineEndingMode::LfCrLf, b"a\r\nb\rc\n", b"a\nb\nc\n")]
    #[case(LineEndingMode::LfCrLf, b"\r\r\n\n", b"\n\n\n")]
    fn test_normalize(#[case] mode: LineEndingMode, #[case] input: &[u8], #[case] expected: &[u8]) {
        assert_eq!(normalize(input, mode), expected);
    }

    #[test]
    fn test_crlf_split_across_reads() {
        let source = Chunked::new(&[b"a\r", b"\nb"]);
        let mut reader = LineEndingReader::new(source, LineEndingMode::CrLf).unwrap();
        let mut target = [0u8; 16];

        assert_eq!(reader.read(&mut target, 0, 16).unwrap(), Some(2));
        assert_eq!(&target[..2], b"a\r");
        assert_eq!(reader.read(&mut target, 2, 14).unwrap(), Some(1));
        assert_eq!(&target[..3], b"a\nb");
        assert_eq!(reader.read(&mut target, 3, 13).unwrap(), None);
    }

    #[test]
    fn test_crlf_fresh_buffer_fails_fast() {
        let mut reader = LineEndingReader::new(&b"a\r\nb"[..], LineEndingMode::CrLf).unwrap();
        let mut first = [0u8; 16];
        assert_eq!(reader.read(&mut first, 0, 16).unwrap(), Some(2));
        assert_eq!(&first[..2], b"a\r");

        let mut fresh = [0u8; 16];
        let err = reader.read(&mut fresh, 0, 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        // Nothing was consumed; the contiguous read still completes the pair
        assert_eq!(reader.read(&mut first, 2, 14).unwrap(), Some(1));
        assert_eq!(&first[..3], b"a\nb");
        assert_eq!(reader.read(&mut first, 3, 13).unwrap(), None);
    }

    #[test]
    fn test_lfcrlf_fresh_buffer_drops_lf() {
        let mut reader = LineEndingReader::new(&b"a\r\nb"[..], LineEndingMode::LfCrLf).unwrap();
        let mut first = [0u8; 16];
        assert_eq!(reader.read(&mut first, 0, 16).unwrap(), Some(2));
        assert_eq!(&first[..2], b"a\n");

        let mut fresh = [0u8; 16];
        assert_eq!(reader.read(&mut fresh, 0, 16).unwrap(), Some(1));
        assert_eq!(&fresh[..1], b"b");
    }

    #[test]
    fn test_cr_mode_stops_after_each_line() {
        let mut reader = LineEndingReader::new(&b"ab\rcd\r"[..], LineEndingMode::Cr).unwrap();
        let mut target = [0u8; 16];

        assert_eq!(reader.read(&mut target, 0, 16).unwrap(), Some(3));
        assert_eq!(reader.read(&mut target, 3, 13).unwrap(), Some(3));
        assert_eq!(&target[..6], b"ab\ncd\n");
        assert_eq!(reader.read(&mut target, 6, 10).unwrap(), None);
    }

    #[test]
    fn test_respects_len() {
        let mut reader = LineEndingReader::new(&b"abcdef"[..], LineEndingMode::Lf).unwrap();
        let mut target = [0u8; 8];
        assert_eq!(reader.read(&mut target, 1, 4).unwrap(), Some(4));
        assert_eq!(&target[..6], b"\0abcd\0");
        assert_eq!(reader.read(&mut target, 0, 0).unwrap(), Some(0));
        assert_eq!(reader.read(&mut target, 0, 8).unwrap(), Some(2));
        assert_eq!(reader.read(&mut target, 0, 8).unwrap(), None);
    }

    #[test]
    fn test_range_outside_buffer() {
        let mut reader = LineEndingReader::new(&b"abc"[..], LineEndingMode::Lf).unwrap();
        let mut target = [0u8; 4];
        let err = reader.read(&mut target, 2, 3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_empty_source() {
        let mut reader = LineEndingReader::new(io::empty(), LineEndingMode::CrLf).unwrap();
        let mut target = [0u8; 4];
        assert_eq!(reader.read(&mut target, 0, 4).unwrap(), None);
    }

    #[test]
    fn test_retries_interrupted_reads() {
        let mut source = Chunked::new(&[b"x\r\n"]);
        source
            .chunks
            .push_front(Err(io::Error::new(io::ErrorKind::Interrupted, "signal")));
        let mut reader = LineEndingReader::new(source, LineEndingMode::CrLf).unwrap();
        let mut out = Vec::new();
        reader.copy_to(&mut out).unwrap();
        assert_eq!(out, b"x\n");
    }

    #[test]
    fn test_propagates_read_errors() {
        let mut source = Chunked::new(&[]);
        source
            .chunks
            .push_back(Err(io::Error::new(io::ErrorKind::PermissionDenied, "nope")));
        let mut reader = LineEndingReader::new(source, LineEndingMode::Lf).unwrap();
        let mut target = [0u8; 4];
        let err = reader.read(&mut target, 0, 4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_soak_at_buffer_boundary() {
        // \r\n pairs straddling the copy_to chunk boundary
        let mut input = Vec::new();
        while input.len() < BUFFER_SIZE * 3 {
            input.extend_from_slice(b"0123456\r\n");
        }
        let expected: Vec<u8> = input.iter().copied().filter(|&b| b != b'\r').collect();
        assert_eq!(normalize(&input, LineEndingMode::CrLf), expected);
    }

    #[test]
    fn test_utf16_modes_rejected() {
        for mode in [LineEndingMode::LfUtf16, LineEndingMode::CrLfUtf16] {
            let err = LineEndingReader::new(&b""[..], mode).unwrap_err();
            assert!(matches!(err, Error::UnsupportedLineEnding(m) if m == mode));
            assert!(LineEndingWriter::new(Vec::new(), mode).is_err());
        }
    }

    #[rstest]
    #[case("unix", LineEndingMode::Lf)]
    #[case("mac", LineEndingMode::Cr)]
    #[case("win", LineEndingMode::CrLf)]
    #[case("share", LineEndingMode::LfCrLf)]
    #[case("LOCAL", LineEndingMode::Local)]
    #[case("crlf", LineEndingMode::CrLf)]
    #[case("lf-utf16", LineEndingMode::LfUtf16)]
    fn test_parse_mode(#[case] name: &str, #[case] expected: LineEndingMode) {
        assert_eq!(name.parse::<LineEndingMode>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown_mode() {
        let err = "dos".parse::<LineEndingMode>().unwrap_err();
        assert!(matches!(err, Error::UnknownLineEnding(ref name) if name == "dos"));
        assert_eq!(LineEndingMode::LfCrLf.to_string(), "lfcrlf");
    }

    #[test]
    fn test_local_resolves_to_native() {
        let resolved = LineEndingMode::Local.resolve();
        if cfg!(windows) {
            assert_eq!(resolved, LineEndingMode::CrLf);
        } else {
            assert_eq!(resolved, LineEndingMode::Lf);
        }
        assert_eq!(LineEndingMode::Local.line_end_bytes(), NATIVE_LINE_END);
    }

    #[test]
    fn test_needs_filtering() {
        assert!(!LineEndingMode::Lf.needs_filtering());
        assert!(LineEndingMode::Cr.needs_filtering());
        assert!(LineEndingMode::CrLf.needs_filtering());
        assert!(LineEndingMode::LfCrLf.needs_filtering());
        assert!(!LineEndingMode::LfUtf16.needs_filtering());
    }

    #[rstest]
    #[case(LineEndingMode::Lf, b"a\nb\n")]
    #[case(LineEndingMode::LfCrLf, b"a\nb\n")]
    #[case(LineEndingMode::Cr, b"a\rb\r")]
    #[case(LineEndingMode::CrLf, b"a\r\nb\r\n")]
    fn test_writer(#[case] mode: LineEndingMode, #[case] expected: &[u8]) {
        let mut writer = LineEndingWriter::new(Vec::new(), mode).unwrap();
        writer.write_all(b"a\nb").unwrap();
        writer.write_all(b"\n").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.into_inner(), expected);
    }

    #[test]
    fn test_localize_then_normalize() {
        let text = b"first\nsecond\n\nlast";
        let mut writer = LineEndingWriter::new(Vec::new(), LineEndingMode::CrLf).unwrap();
        writer.write_all(text).unwrap();
        let local = writer.into_inner();
        assert_eq!(normalize(&local, LineEndingMode::CrLf), text);
    }
}
