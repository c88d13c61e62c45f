use std::io;

use thiserror::Error;

/// Errors reported by the container parsers and codecs.
#[derive(Debug, Error)]
pub enum Error {
    /// The header does not belong to the format that was asked to read it.
    /// The registry treats this as "try the next format".
    #[error("not a {format} file: {reason}")]
    FormatMismatch {
        /// Short name of the format that rejected the file.
        format: &'static str,
        /// What did not match.
        reason: String,
    },

    /// The file could not be opened or was shorter than expected.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An offset, length or count taken from the file points outside the
    /// buffer, or a record is shorter than its type requires.
    #[error("corrupt container: {0}")]
    Corrupt(String),

    /// A compressed stream or embedded image could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The progress callback asked for the decode to stop.
    #[error("decoding cancelled")]
    Cancelled,

    /// A sub-image was requested before any file was loaded.
    #[error("no image loaded")]
    NotLoaded,

    /// No registered format recognized the file.
    #[error("unrecognized image format")]
    Unrecognized,
}

impl Error {
    pub(crate) fn mismatch<S: Into<String>>(format: &'static str, reason: S) -> Error {
        Error::FormatMismatch { format, reason: reason.into() }
    }

    /// Returns true if this error only means the file belongs to some other
    /// format.
    pub fn is_format_mismatch(&self) -> bool {
        matches!(self, Error::FormatMismatch { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
