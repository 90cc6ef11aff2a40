//! Server file type negotiation
//!
//! The server advertises how many file type features it understands as an
//! integer protocol level (`xfiles`):
//!
//! ```text
//! level 0: text, binary, xtext, xbinary
//! level 1: also symlink
//! level 2: also resource
//! level 3: also ubinary
//! level 4: also apple
//! level 5: also unicode
//! level 6: also utf16
//! level 7: also utf8
//! ```
//!
//! Each inferred [`ContentType`] has one [`ActionTableEntry`] saying what to
//! do on servers below and at or above the level that introduced it.

use std::fmt;

use crate::error::{Error, Result};
use crate::filetype::ContentType;

use self::Action::{
    AssumeFallback as Assume, CheckSizeThenChoose as CheckSize, Reject, SubstituteAlternate as Subst,
    UseAsIs,
};

/// What to do with an inferred type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Use the forced type, or the entry's own type
    UseAsIs,
    /// Missing, unreadable or empty: assume the forced type, or text
    AssumeFallback,
    /// Use the compressed variant when the file is too big for the default
    CheckSizeThenChoose,
    /// The server can't handle it: use the alternate type
    SubstituteAlternate,
    /// Can't be added at all
    Reject,
}

/// How one content type is negotiated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionTableEntry {
    pub check_type: ContentType,
    /// Protocol level that introduced this type
    pub min_level: i32,
    /// Action for servers below `min_level`
    pub below: Action,
    /// Action for servers at or above `min_level`
    pub at_or_above: Action,
    pub primary: &'static str,
    pub alternate: Option<&'static str>,
    pub compressed: Option<&'static str>,
}

impl ActionTableEntry {
    const fn new(
        check_type: ContentType,
        min_level: i32,
        below: Action,
        at_or_above: Action,
        primary: &'static str,
        alternate: Option<&'static str>,
        compressed: Option<&'static str>,
    ) -> Self {
        Self {
            check_type,
            min_level,
            below,
            at_or_above,
            primary,
            alternate,
            compressed,
        }
    }

    pub fn action_for(&self, server_level: i32) -> Action {
        if server_level >= self.min_level {
            self.at_or_above
        } else {
            self.below
        }
    }

    fn alternate_or_primary(&self) -> &'static str {
        self.alternate.unwrap_or(self.primary)
    }
}

macro_rules! entry {
    ($ty:ident, $level:expr, $below:expr, $above:expr, $primary:expr) => {
        ActionTableEntry::new(ContentType::$ty, $level, $below, $above, $primary, None, None)
    };
    ($ty:ident, $level:expr, $below:expr, $above:expr, $primary:expr, $alt:expr) => {
        ActionTableEntry::new(ContentType::$ty, $level, $below, $above, $primary, Some($alt), None)
    };
    ($ty:ident, $level:expr, $below:expr, $above:expr, $primary:expr, $alt:expr, $cmp:expr) => {
        ActionTableEntry::new(
            ContentType::$ty,
            $level,
            $below,
            $above,
            $primary,
            Some($alt),
            Some($cmp),
        )
    };
}

static TEXT: ActionTableEntry = entry!(Text, 0, UseAsIs, CheckSize, "text", "text", "text+C");
static XTEXT: ActionTableEntry = entry!(ExecutableText, 0, Subst, CheckSize, "xtext", "text", "xtext+C");
static BINARY: ActionTableEntry = entry!(Binary, 0, UseAsIs, UseAsIs, "binary", "binary");
static XBINARY: ActionTableEntry = entry!(ExecutableBinary, 0, Subst, UseAsIs, "xbinary", "binary");
static APPLE: ActionTableEntry = entry!(AppleBinary, 4, Subst, UseAsIs, "apple", "binary");
static XAPPLE: ActionTableEntry = entry!(ExecutableAppleBinary, 4, Subst, UseAsIs, "apple+x", "binary");
static UBINARY: ActionTableEntry = entry!(PrecompressedBinary, 3, Subst, UseAsIs, "ubinary", "binary");
static SYMLINK: ActionTableEntry = entry!(Symlink, 1, Reject, UseAsIs, "symlink");
static RESOURCE: ActionTableEntry = entry!(Resource, 2, Reject, UseAsIs, "resource");
static SPECIAL: ActionTableEntry = entry!(Special, -1, Reject, Reject, "special");
static DIRECTORY: ActionTableEntry = entry!(Directory, -1, Reject, Reject, "directory");
static MISSING: ActionTableEntry = entry!(Missing, -1, Assume, Assume, "missing", "text");
static UNREADABLE: ActionTableEntry = entry!(Unreadable, -1, Assume, Assume, "unreadable", "text");
static EMPTY: ActionTableEntry = entry!(Empty, -1, Assume, Assume, "empty", "text");
static UNICODE: ActionTableEntry = entry!(Unicode, 5, Subst, CheckSize, "unicode", "text", "unicode+C");
static XUNICODE: ActionTableEntry =
    entry!(ExecutableUnicode, 5, Subst, CheckSize, "xunicode", "text", "xunicode+C");
static UTF16: ActionTableEntry = entry!(Utf16, 6, Subst, CheckSize, "utf16", "binary", "utf16+C");
static XUTF16: ActionTableEntry =
    entry!(ExecutableUtf16, 6, Subst, CheckSize, "xutf16", "binary", "xutf16+C");
static UTF8: ActionTableEntry = entry!(Utf8, 7, Subst, CheckSize, "utf8", "text", "utf8+C");
static XUTF8: ActionTableEntry = entry!(ExecutableUtf8, 7, Subst, CheckSize, "xutf8", "text", "xutf8+C");

/// Look up the action table entry for a content type.
///
/// Types that inference never produces have no entry.
pub fn action_entry(content_type: ContentType) -> Option<&'static ActionTableEntry> {
    let entry = match content_type {
        ContentType::Text => &TEXT,
        ContentType::ExecutableText => &XTEXT,
        ContentType::Binary => &BINARY,
        ContentType::ExecutableBinary => &XBINARY,
        ContentType::AppleBinary => &APPLE,
        ContentType::ExecutableAppleBinary => &XAPPLE,
        ContentType::PrecompressedBinary => &UBINARY,
        ContentType::Symlink => &SYMLINK,
        ContentType::Resource => &RESOURCE,
        ContentType::Special => &SPECIAL,
        ContentType::Directory => &DIRECTORY,
        ContentType::Missing => &MISSING,
        ContentType::Unreadable => &UNREADABLE,
        ContentType::Empty => &EMPTY,
        ContentType::Unicode => &UNICODE,
        ContentType::ExecutableUnicode => &XUNICODE,
        ContentType::Utf16 => &UTF16,
        ContentType::ExecutableUtf16 => &XUTF16,
        ContentType::Utf8 => &UTF8,
        ContentType::ExecutableUtf8 => &XUTF8,
        ContentType::Gzip
        | ContentType::ExecutableGzip
        | ContentType::AppendOnlyText
        | ContentType::RawText
        | ContentType::ExecutableRawText
        | ContentType::AppleText
        | ContentType::RcsTemp => return None,
    };
    Some(entry)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    /// The file cannot be added
    Blocking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticCode {
    AssumingType,
    SubstitutingType,
    CannotAddType,
}

/// A message for the user about how a file's type was negotiated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub path: String,
    pub original_type: String,
    pub chosen_type: Option<String>,
}

impl Diagnostic {
    fn info(code: DiagnosticCode, path: &str, original: &str, chosen: &str) -> Self {
        Self {
            code,
            severity: Severity::Info,
            path: path.to_string(),
            original_type: original.to_string(),
            chosen_type: Some(chosen.to_string()),
        }
    }

    fn cannot_add(path: &str, original: &str) -> Self {
        Self {
            code: DiagnosticCode::CannotAddType,
            severity: Severity::Blocking,
            path: path.to_string(),
            original_type: original.to_string(),
            chosen_type: None,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chosen = self.chosen_type.as_deref().unwrap_or("");
        match self.code {
            DiagnosticCode::AssumingType => {
                write!(f, "{} - {}, assuming {}.", self.path, self.original_type, chosen)
            }
            DiagnosticCode::SubstitutingType => {
                write!(f, "{} - using {} instead of {}.", self.path, chosen, self.original_type)
            }
            DiagnosticCode::CannotAddType => {
                write!(f, "{} - can't add {} file.", self.path, self.original_type)
            }
        }
    }
}

/// Result of negotiating one file's type
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NegotiationOutcome {
    /// Type string to send to the server; `None` when the file can't be added
    pub wire_type: Option<String>,
    pub diagnostic: Option<Diagnostic>,
}

impl NegotiationOutcome {
    fn accept(wire_type: &str) -> Self {
        Self {
            wire_type: Some(wire_type.to_string()),
            diagnostic: None,
        }
    }

    fn with_diagnostic(wire_type: Option<&str>, diagnostic: Diagnostic) -> Self {
        Self {
            wire_type: wire_type.map(str::to_string),
            diagnostic: Some(diagnostic),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.wire_type.is_none()
    }
}

/// Decide the wire type for a file of `inferred` type.
///
/// `force_type` is the user's explicit type, `oversized` says the file is
/// over the server's limit for its default representation, and
/// `server_level` is the server's advertised protocol level.
pub fn resolve(
    path: &str,
    inferred: ContentType,
    force_type: Option<&str>,
    oversized: bool,
    server_level: i32,
) -> Result<NegotiationOutcome> {
    let entry = action_entry(inferred).ok_or_else(|| {
        log::error!("{}: no server type action for {:?}", path, inferred);
        Error::UnnegotiableType(inferred)
    })?;

    let action = entry.action_for(server_level);
    log::debug!(
        "{}: {} at server level {} -> {:?}",
        path,
        inferred,
        server_level,
        action
    );

    let outcome = match action {
        Action::UseAsIs => NegotiationOutcome::accept(force_type.unwrap_or(entry.primary)),
        Action::CheckSizeThenChoose => match force_type {
            Some(forced) => NegotiationOutcome::accept(forced),
            None if oversized => NegotiationOutcome::accept(entry.compressed.unwrap_or(entry.primary)),
            None => NegotiationOutcome::accept(entry.primary),
        },
        Action::AssumeFallback => {
            let chosen = force_type.unwrap_or_else(|| entry.alternate_or_primary());
            NegotiationOutcome::with_diagnostic(
                Some(chosen),
                Diagnostic::info(DiagnosticCode::AssumingType, path, entry.primary, chosen),
            )
        }
        Action::SubstituteAlternate => {
            let chosen = entry.alternate_or_primary();
            NegotiationOutcome::with_diagnostic(
                Some(chosen),
                Diagnostic::info(DiagnosticCode::SubstitutingType, path, entry.primary, chosen),
            )
        }
        Action::Reject => {
            NegotiationOutcome::with_diagnostic(None, Diagnostic::cannot_add(path, entry.primary))
        }
    };

    Ok(outcome)
}

/// Parse the server's advertised `xfiles` protocol value; absent means 0
pub fn parse_server_level(value: Option<&str>) -> Result<i32> {
    match value {
        None => Ok(0),
        Some(raw) => raw
            .trim()
            .parse::<i32>()
            .map_err(|_| Error::InvalidServerLevel(raw.to_string())),
    }
}
