//! Error types for archive operations.
//!
//! Every variant carries the path it concerns so the message printed by the
//! command line tool always names the offending file.

use std::io;
use std::path::PathBuf;

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, TarError>;

/// Errors raised while building, scanning or extracting an archive.
#[derive(Debug, thiserror::Error)]
pub enum TarError {
    /// The path does not fit in the 100-byte name field.
    #[error("{}: Filename too long ({len} bytes, limit is 100)", path.display())]
    NameTooLong { path: PathBuf, len: usize },

    /// A numeric value does not fit in its octal header field.
    #[error("{}: {field} value {value} does not fit in the header", path.display())]
    FieldOverflow {
        path: PathBuf,
        field: &'static str,
        value: u64,
    },

    /// A file could not be opened or created.
    #[error("{}: Cannot open: {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File metadata could not be queried.
    #[error("{}: Cannot stat: {source}", path.display())]
    StatFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A write did not move the expected number of bytes.
    #[error("{}: Write failed: {source}", path.display())]
    ShortWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A read or seek failed.
    #[error("{}: Read failed: {source}", path.display())]
    ShortRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A header record was cut short by the end of the archive.
    #[error("{}: Corrupted archive header ({read} of 512 bytes)", path.display())]
    CorruptHeader { path: PathBuf, read: usize },

    /// The archive ended in the middle of an entry's content.
    #[error("{}: Unexpected EOF in archive ({remaining} bytes missing)", path.display())]
    UnexpectedEof { path: PathBuf, remaining: u64 },

    /// The rebuilt archive could not replace the original.
    #[error("{}: Failed to rename temp archive: {source}", path.display())]
    RenameFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Access and modification times could not be restored.
    #[error("{}: Cannot restore modification time: {source}", path.display())]
    TimesFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The requested mode is declared but not implemented.
    #[error("{0}: mode is not supported")]
    Unsupported(&'static str),
}
