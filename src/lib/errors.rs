//! Error types for xxlsort operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for xxlsort operations.
pub type Result<T> = std::result::Result<T, XxlsortError>;

/// Error type for xxlsort operations.
///
/// Every variant renders with enough context to act on: the offending
/// parameter value, the file path plus OS error, or the byte offset at which
/// malformed data was detected. `Internal` marks broken preconditions rather
/// than user-facing failures and is reported separately by the CLI.
#[derive(Error, Debug)]
pub enum XxlsortError {
    /// Invalid parameter value provided (CLI argument or environment).
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// An OS-level I/O operation failed.
    #[error("{op} {}: {source}", path.display())]
    Io {
        /// What was being attempted, e.g. "Reading from"
        op: &'static str,
        /// Path of the file involved
        path: PathBuf,
        /// Underlying OS error
        source: io::Error,
    },

    /// A record header declared an out-of-bounds body size.
    #[error("Malformed data in {} at offset {offset}", path.display())]
    MalformedData {
        /// Path of the file being parsed
        path: PathBuf,
        /// Byte offset of the offending header
        offset: u64,
    },

    /// The stream ended in the middle of a record.
    #[error("Data corrupt in {} at offset {offset}", path.display())]
    DataCorrupt {
        /// Path of the file being parsed
        path: PathBuf,
        /// Byte offset at which the short read was detected
        offset: u64,
    },

    /// The memory arena could not be allocated.
    #[error("Allocating {size} bytes of memory: {source}")]
    OutOfMemory {
        /// Requested arena size in bytes
        size: usize,
        /// Underlying OS error
        source: io::Error,
    },

    /// An internal precondition was violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl XxlsortError {
    /// Shorthand for an I/O error with path context.
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        XxlsortError::Io { op, path: path.into(), source }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        XxlsortError::Internal(message.into())
    }
}
