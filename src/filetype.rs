//! Client file type vocabulary

use std::fmt;

/// The content kinds a client can discover for a local file.
///
/// Basic kinds describe what a file is; derived kinds add a modifier
/// (executable, raw, append-only, pre-compressed) to a basic kind. Only a
/// subset is ever produced by content inference; the rest exist so that
/// server-assigned types can be named in the same vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    // Basic kinds
    Text,
    Binary,
    Gzip,
    Directory,
    Symlink,
    /// Macintosh resource fork
    Resource,
    /// Exists but is not a regular file (device, socket, fifo)
    Special,
    Missing,
    /// Exists, but its contents could not be inspected
    Unreadable,
    Empty,
    /// Text in the client's declared (non-ASCII) charset
    Unicode,
    Utf8,
    Utf16,

    // Derived kinds
    AppendOnlyText,
    ExecutableText,
    RawText,
    ExecutableRawText,
    /// Binary whose contents are already compressed (images, archives)
    PrecompressedBinary,
    ExecutableBinary,
    AppleText,
    AppleBinary,
    ExecutableAppleBinary,
    ExecutableUnicode,
    ExecutableUtf8,
    ExecutableUtf16,
    ExecutableGzip,
    /// RCS temporary file: raw text, synced on close
    RcsTemp,
}

impl ContentType {
    /// Pick the executable or plain variant of a kind
    pub(crate) fn choose(executable: bool, plain: ContentType, exec: ContentType) -> ContentType {
        if executable {
            exec
        } else {
            plain
        }
    }

    pub fn text(executable: bool) -> Self {
        Self::choose(executable, ContentType::Text, ContentType::ExecutableText)
    }

    pub fn binary(executable: bool) -> Self {
        Self::choose(executable, ContentType::Binary, ContentType::ExecutableBinary)
    }

    pub fn unicode(executable: bool) -> Self {
        Self::choose(executable, ContentType::Unicode, ContentType::ExecutableUnicode)
    }

    pub fn utf8(executable: bool) -> Self {
        Self::choose(executable, ContentType::Utf8, ContentType::ExecutableUtf8)
    }

    /// Whether this is an executable variant
    pub fn is_executable(self) -> bool {
        matches!(
            self,
            ContentType::ExecutableText
                | ContentType::ExecutableRawText
                | ContentType::ExecutableAppleBinary
                | ContentType::ExecutableBinary
                | ContentType::ExecutableUnicode
                | ContentType::ExecutableUtf8
                | ContentType::ExecutableUtf16
                | ContentType::ExecutableGzip
        )
    }

    /// Whether content of this kind is transferred line by line, and so
    /// needs its line endings normalized on the way to the server
    pub fn converts_line_endings(self) -> bool {
        matches!(
            self,
            ContentType::Text
                | ContentType::ExecutableText
                | ContentType::Unicode
                | ContentType::ExecutableUnicode
                | ContentType::Utf8
                | ContentType::ExecutableUtf8
                | ContentType::Utf16
                | ContentType::ExecutableUtf16
        )
    }

    /// Plain text, executable or not
    pub fn is_plain_text(self) -> bool {
        matches!(self, ContentType::Text | ContentType::ExecutableText)
    }

    pub fn is_unicode(self) -> bool {
        matches!(self, ContentType::Unicode | ContentType::ExecutableUnicode)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentType::Text => "text",
            ContentType::Binary => "binary",
            ContentType::Gzip => "gzip",
            ContentType::Directory => "directory",
            ContentType::Symlink => "symlink",
            ContentType::Resource => "resource",
            ContentType::Special => "special",
            ContentType::Missing => "missing",
            ContentType::Unreadable => "unreadable",
            ContentType::Empty => "empty",
            ContentType::Unicode => "unicode",
            ContentType::Utf8 => "utf8",
            ContentType::Utf16 => "utf16",
            ContentType::AppendOnlyText => "append-only text",
            ContentType::ExecutableText => "executable text",
            ContentType::RawText => "raw text",
            ContentType::ExecutableRawText => "executable raw text",
            ContentType::PrecompressedBinary => "pre-compressed binary",
            ContentType::ExecutableBinary => "executable binary",
            ContentType::AppleText => "apple text",
            ContentType::AppleBinary => "apple binary",
            ContentType::ExecutableAppleBinary => "executable apple binary",
            ContentType::ExecutableUnicode => "executable unicode",
            ContentType::ExecutableUtf8 => "executable utf8",
            ContentType::ExecutableUtf16 => "executable utf16",
            ContentType::ExecutableGzip => "executable gzip",
            ContentType::RcsTemp => "rcs temporary",
        };
        f.write_str(name)
    }
}
