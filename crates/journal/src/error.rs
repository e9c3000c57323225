//! Error and Result types for journal operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for journal operations.
pub type Result<T> = std::result::Result<T, JournalError>;

/// The error type for journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Journal directory is missing and could not be created.
    #[error("Journal dir {path:?} does not exist and cannot be created: {source}")]
    DirUnavailable {
        /// The directory that could not be created.
        path: PathBuf,
        /// Underlying filesystem error.
        source: io::Error,
    },

    /// The journal context could not be brought to a consistent state.
    #[error("Journal cannot be brought to a consistent state")]
    InconsistentContext,

    /// Invariant violation detected in the in-memory journal context.
    #[error("Journal context corrupted: target file {target} precedes newest file {newest}")]
    CorruptContext {
        /// Start timestamp chosen for the append target.
        target: i64,
        /// Start timestamp of the newest known file.
        newest: i64,
    },

    /// A new journal file was started while no snapshot producer is configured.
    #[error("Snapshot producer not defined")]
    MissingSnapshotProducer,

    /// A journal file name does not encode a valid start timestamp.
    #[error("Malformed journal file name: {0}")]
    MalformedFileName(String),

    /// A query pattern failed to compile.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// A serialized value could not be parsed.
    #[error("Value parse error: {0}")]
    ValueParse(String),

    /// A size-limit string could not be parsed.
    #[error("Invalid size limit: {0:?}")]
    InvalidSizeLimit(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
