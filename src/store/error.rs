//! Error types for [`crate::store::Store`] operations.

use std::io;

use thiserror::Error;

/// Errors surfaced by the storage engine.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No segment's index contains the requested key.
    #[error("key not found")]
    NotFound,

    /// A record's trailing checksum did not match its recomputed digest.
    /// The store does not attempt self-repair: this is fatal to the read.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// A record's declared length didn't match its actual on-disk width, or
    /// a segment file ended in the middle of a record.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Background compaction failed; the pre-compaction segment list is kept.
    #[error("compaction failed: {0}")]
    CompactionFailed(String),

    /// The writer task that owns the segment list has gone away.
    #[error("store is closed")]
    Closed,

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
