//! Error types

use thiserror::Error;

use crate::filetype::ContentType;
use crate::line_ending::LineEndingMode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Byte-oriented line-ending translation is undefined on double-byte text
    #[error("line ending mode {0} cannot be used to filter a byte stream")]
    UnsupportedLineEnding(LineEndingMode),
    #[error("unknown line ending: '{0}'")]
    UnknownLineEnding(String),
    #[error("unknown charset: '{0}'")]
    UnknownCharset(String),
    /// Classification produced a type the action table has no entry for
    #[error("no server type action for file type {0:?}")]
    UnnegotiableType(ContentType),
    #[error("invalid server protocol level: '{0}'")]
    InvalidServerLevel(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
