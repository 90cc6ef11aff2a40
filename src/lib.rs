//! # emx-filetype
//!
//! Client-side file type detection for a versioned file server.
//!
//! Before a file is added, the client works out what kind of content it
//! holds, picks the type string the server will accept, and filters text
//! content into the server's `\n` line ending form.
//!
//! ## Pipeline
//!
//! ```text
//! path -> FileTypeInference::classify -> ContentType
//!      -> negotiate::resolve(level, force type, oversized) -> wire type + diagnostic
//!      -> LineEndingReader (text types only) -> server
//! ```
//!
//! ## Detection Rules
//!
//! In order:
//! 1. Symlinks, missing paths, directories, special files and empty files are
//!    recognised from metadata alone
//! 2. A `%PDF-` signature is always binary
//! 3. A UTF-16 byte order mark is unicode when it decodes as UTF-16
//! 4. Control bytes make the file binary (or pre-compressed binary when a
//!    known archive or image signature matches), unless the client charset
//!    is UTF-16 or UTF-32
//! 5. High-bit bytes are checked against the client charset
//! 6. Otherwise the file is text
//!
//! Every rule has an executable counterpart, chosen when the file has an
//! execute permission bit set.
//!
//! ## Example
//!
//! ```no_run
//! use emx_filetype::{negotiate, FileTypeInference, InferenceConfig};
//! use std::path::Path;
//!
//! let engine = FileTypeInference::new(InferenceConfig::default());
//! let inferred = engine.classify(Path::new("README.md"));
//! let outcome = negotiate::resolve("README.md", inferred, None, false, 7)?;
//! println!("{:?}", outcome.wire_type);
//! # Ok::<(), emx_filetype::Error>(())
//! ```

pub mod charset;
pub mod error;
pub mod filetype;
pub mod inference;
pub mod line_ending;
pub mod negotiate;
pub mod utf8;

pub use charset::{looks_like_text, Charset, CharsetFamily};
pub use error::{Error, Result};
pub use filetype::ContentType;
pub use inference::{
    classify, classify_contents, is_known_compressed_binary, FileSystemProbe, FileTypeInference,
    InferenceConfig, LocalFileSystem, DEFAULT_PEEK_SIZE,
};
pub use line_ending::{LineEndingMode, LineEndingReader, LineEndingWriter};
pub use negotiate::{
    parse_server_level, Action, ActionTableEntry, Diagnostic, DiagnosticCode, NegotiationOutcome,
    Severity,
};
pub use utf8::{check_validity, Utf8Validity};
