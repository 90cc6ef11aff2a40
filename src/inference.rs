//! File type inference by content sniffing
//!
//! A file is classified once, before it is handed to the server. The
//! classification looks at filesystem metadata first (symlink, missing,
//! directory, empty) and then at a bounded prefix of the contents:
//!
//! 1. A PDF signature always means binary
//! 2. A byte-order mark selects a Unicode flavour, provided the content
//!    behind it actually decodes
//! 3. Otherwise the client's declared charset decides how high-bit bytes
//!    and control characters are read
//! 4. Unicode content that is also valid UTF-8 is narrowed to UTF-8
//!
//! Inference never fails: I/O problems downgrade the result to
//! [`ContentType::Unreadable`].

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use crate::charset::{looks_like_text, Charset, CharsetFamily};
use crate::filetype::ContentType;
use crate::utf8::check_validity;

/// Bytes scanned when no explicit budget is configured
pub const DEFAULT_PEEK_SIZE: usize = 64 * 1024;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Leading bytes of formats that are already compressed, and so gain
/// nothing from server-side compression
pub static COMPRESSED_BINARY_MAGIC: &[&[u8]] = &[
    b"GIF",                       // GIF
    &[0xFF, 0xD8, 0xFF, 0xE0],    // JPEG
    &[0xFF, 0xD8, 0xFF, 0xE1],    // EXIF
    &[0x1F, 0x8B],                // gzip
    &[0xFF, 0x1F],                // compact
    &[0x1F, 0x9D],                // compress
    &[b'P', b'K', 0x03, 0x04],    // PKZIP (jar, war, ...)
    &[b'P', b'K', 0x05, 0x06],    // empty PKZIP
    &[0x89, b'P', b'N', b'G'],    // PNG
    &[0xCA, 0xFE, 0xBA, 0xBE],    // Java class
];

/// Platform questions the classifier needs answered about a path
pub trait FileSystemProbe {
    fn is_symlink(&self, path: &Path) -> bool;
    fn can_execute(&self, path: &Path) -> bool;
}

/// [`FileSystemProbe`] backed by the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystemProbe for LocalFileSystem {
    fn is_symlink(&self, path: &Path) -> bool {
        match fs::symlink_metadata(path) {
            Ok(metadata) => metadata.file_type().is_symlink(),
            Err(_) => resolves_elsewhere(path),
        }
    }

    #[cfg(unix)]
    fn can_execute(&self, path: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;

        fs::metadata(path)
            .map(|metadata| metadata.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn can_execute(&self, _path: &Path) -> bool {
        false
    }
}

/// Fallback symlink heuristic: a path whose canonical form differs from
/// its absolute form goes through a link somewhere
fn resolves_elsewhere(path: &Path) -> bool {
    let absolute = match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => return false,
    };
    let canonical = match fs::canonicalize(path) {
        Ok(canonical) => canonical,
        Err(_) => return false,
    };

    let absolute = absolute.to_string_lossy();
    let canonical = canonical.to_string_lossy();

    // HFS+ and APFS are case-insensitive by default
    if cfg!(target_os = "macos") {
        !absolute.eq_ignore_ascii_case(&canonical)
    } else {
        absolute != canonical
    }
}

/// Inputs to classification beyond the path itself
#[derive(Debug, Clone, Default)]
pub struct InferenceConfig {
    /// How many leading bytes to inspect; `None` means [`DEFAULT_PEEK_SIZE`]
    pub scan_size: Option<usize>,
    /// Whether the server runs in Unicode mode. Without it the declared
    /// charset is ignored.
    pub unicode_server: bool,
    /// The client's declared charset
    pub charset: Option<Charset>,
}

impl InferenceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan_size(mut self, scan_size: Option<usize>) -> Self {
        self.scan_size = scan_size;
        self
    }

    /// Declare a Unicode-mode server and the client's charset
    pub fn with_unicode_server(mut self, charset: Option<Charset>) -> Self {
        self.unicode_server = true;
        self.charset = charset;
        self
    }

    fn effective_scan_size(&self) -> usize {
        self.scan_size.unwrap_or(DEFAULT_PEEK_SIZE)
    }
}

/// Classifies local files into [`ContentType`]s
#[derive(Debug, Clone)]
pub struct FileTypeInference<P = LocalFileSystem> {
    probe: P,
    config: InferenceConfig,
}

impl FileTypeInference<LocalFileSystem> {
    pub fn new(config: InferenceConfig) -> Self {
        Self::with_probe(LocalFileSystem, config)
    }
}

impl Default for FileTypeInference<LocalFileSystem> {
    fn default() -> Self {
        Self::new(InferenceConfig::default())
    }
}

impl<P: FileSystemProbe> FileTypeInference<P> {
    pub fn with_probe(probe: P, config: InferenceConfig) -> Self {
        Self { probe, config }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Classify the file at `path`. Never fails; anything that cannot be
    /// inspected is [`ContentType::Unreadable`].
    pub fn classify(&self, path: &Path) -> ContentType {
        match self.classify_path(path) {
            Ok(content_type) => {
                log::debug!("{}: inferred {}", path.display(), content_type);
                content_type
            }
            Err(err) => {
                log::warn!("{}: cannot inspect contents: {}", path.display(), err);
                ContentType::Unreadable
            }
        }
    }

    fn classify_path(&self, path: &Path) -> io::Result<ContentType> {
        // Checked before anything that follows links
        if self.probe.is_symlink(path) {
            return Ok(ContentType::Symlink);
        }

        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(ContentType::Missing)
            }
            Err(err) => return Err(err),
        };

        if metadata.is_dir() {
            return Ok(ContentType::Directory);
        }
        if !metadata.is_file() {
            return Ok(ContentType::Unreadable);
        }
        if metadata.len() == 0 {
            return Ok(ContentType::Empty);
        }

        let executable = self.probe.can_execute(path);
        let budget = self.config.effective_scan_size();
        let prefix = read_prefix(path, budget, metadata.len())?;

        Ok(classify_contents(
            &prefix,
            executable,
            self.config.unicode_server,
            self.config.charset.as_ref(),
        ))
    }
}

/// Classify `path` with the local filesystem probe
pub fn classify(
    path: &Path,
    scan_size: Option<usize>,
    unicode_server: bool,
    charset: Option<&Charset>,
) -> ContentType {
    let config = InferenceConfig {
        scan_size,
        unicode_server,
        charset: charset.copied(),
    };
    FileTypeInference::new(config).classify(path)
}

/// One bounded read from the start of the file
fn read_prefix(path: &Path, budget: usize, file_len: u64) -> io::Result<Vec<u8>> {
    let file = fs::File::open(path)?;
    let capacity = usize::try_from(file_len).map_or(budget, |len| len.min(budget));
    let mut buf = Vec::with_capacity(capacity);
    file.take(budget as u64).read_to_end(&mut buf)?;
    log::trace!("{}: scanned {} bytes", path.display(), buf.len());
    Ok(buf)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bom {
    Utf8,
    Utf16,
    Utf32,
}

impl Bom {
    fn detect(buf: &[u8]) -> Option<Bom> {
        // UTF-32 first: FF FE is a prefix of the little-endian UTF-32 mark
        match buf {
            [0xFF, 0xFE, 0x00, 0x00, ..] | [0x00, 0x00, 0xFE, 0xFF, ..] => Some(Bom::Utf32),
            [0xEF, 0xBB, 0xBF, ..] => Some(Bom::Utf8),
            [0xFF, 0xFE, ..] | [0xFE, 0xFF, ..] => Some(Bom::Utf16),
            _ => None,
        }
    }
}

/// Whole-buffer byte statistics
#[derive(Debug, Clone, Copy, Default)]
struct ByteStats {
    high_bit: bool,
    has_zero: bool,
    control_char: bool,
}

impl ByteStats {
    fn scan(buf: &[u8]) -> Self {
        let mut stats = ByteStats::default();
        for &byte in buf {
            stats.high_bit |= byte & 0x80 != 0;
            stats.has_zero |= byte == 0;
            stats.control_char |= is_binary_control(byte);
        }
        stats
    }

    fn is_plain_ascii(&self) -> bool {
        !self.has_zero && !self.high_bit && !self.control_char
    }
}

/// ASCII control characters that never appear in text
fn is_binary_control(byte: u8) -> bool {
    let control = byte < 0x20 || byte == 0x7F;
    // TAB, LF, VT, FF, CR and the information separators count as spacing
    let spacing = matches!(byte, 0x09..=0x0D | 0x1C..=0x1F);
    control && !spacing
}

fn is_pdf(buf: &[u8]) -> bool {
    buf.len() > PDF_MAGIC.len() && buf.starts_with(PDF_MAGIC)
}

/// Whether `buf` starts with the signature of an already-compressed format
pub fn is_known_compressed_binary(buf: &[u8]) -> bool {
    COMPRESSED_BINARY_MAGIC
        .iter()
        .any(|magic| buf.len() > magic.len() && buf.starts_with(magic))
}

fn binary_type(buf: &[u8], executable: bool) -> ContentType {
    if is_known_compressed_binary(buf) {
        ContentType::PrecompressedBinary
    } else {
        ContentType::binary(executable)
    }
}

fn is_valid_utf8(buf: &[u8]) -> bool {
    check_validity(buf).is_valid_prefix()
}

/// Classify an in-memory prefix of a file's contents.
///
/// `executable` selects the executable variants. When `unicode_server` is
/// false the declared `charset` is ignored and high-bit content stays text.
pub fn classify_contents(
    buf: &[u8],
    executable: bool,
    unicode_server: bool,
    charset: Option<&Charset>,
) -> ContentType {
    if buf.is_empty() {
        return ContentType::Empty;
    }

    let charset = if unicode_server { charset } else { None };
    let stats = ByteStats::scan(buf);

    if is_pdf(buf) {
        return ContentType::binary(executable);
    }

    let mut result = ContentType::text(executable);
    let bom = Bom::detect(buf);

    if bom == Some(Bom::Utf8) {
        if stats.control_char {
            return binary_type(buf, executable);
        }
        if is_valid_utf8(buf) {
            result = ContentType::utf8(executable);
        }
    }

    if bom == Some(Bom::Utf16) {
        if !looks_like_text(buf, &Charset::Utf16, true) {
            return binary_type(buf, executable);
        }
        return ContentType::unicode(executable);
    }

    match charset {
        Some(charset) => match charset.family() {
            CharsetFamily::Utf8 => {
                if stats.control_char {
                    return binary_type(buf, executable);
                }
                if stats.high_bit && result.is_plain_text() && is_valid_utf8(buf) {
                    result = ContentType::unicode(executable);
                }
            }
            CharsetFamily::Utf32 => {
                if !stats.is_plain_ascii() && bom != Some(Bom::Utf8) {
                    result = ContentType::unicode(executable);
                    match bom {
                        Some(Bom::Utf32) => {}
                        Some(Bom::Utf16) => return binary_type(buf, executable),
                        _ => {
                            if !looks_like_text(buf, charset, true) {
                                return binary_type(buf, executable);
                            }
                        }
                    }
                }
            }
            CharsetFamily::Utf16 => {
                if !stats.is_plain_ascii() && bom != Some(Bom::Utf8) {
                    result = ContentType::unicode(executable);
                    match bom {
                        Some(Bom::Utf16) => {}
                        Some(Bom::Utf32) => return binary_type(buf, executable),
                        _ => {
                            if !looks_like_text(buf, charset, true) {
                                return binary_type(buf, executable);
                            }
                        }
                    }
                }
            }
            CharsetFamily::Legacy => {
                if stats.control_char {
                    return binary_type(buf, executable);
                }
                if bom != Some(Bom::Utf8)
                    && stats.high_bit
                    && looks_like_text(buf, charset, true)
                {
                    result = ContentType::unicode(executable);
                }
            }
        },
        // No Unicode awareness on the server
        None => {
            if stats.control_char {
                return binary_type(buf, executable);
            }
        }
    }

    // Plain UTF-8 is preferred over the generic Unicode type
    if result.is_unicode() && stats.high_bit && is_valid_utf8(buf) {
        result = ContentType::utf8(executable);
    }

    result
}
