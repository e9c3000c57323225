//! shv-journal - file-backed event journal for SHV devices.
//!
//! This crate records per-property events into a directory of
//! chronologically named log files and serves range queries that can
//! reconstruct a snapshot of all continuous signals as of a requested start
//! instant.
//!
//! # Components
//!
//! - [`FileJournal`]: the append engine with file rotation, size limits and
//!   consistency recovery
//! - [`JournalEntry`] / [`Value`]: the recorded events and their payloads
//! - [`GetLogParams`] / [`LogHeader`]: the `get_log` query surface and its
//!   result metadata
//! - [`codec`]: the record format within one log file
//!
//! # Example
//!
//! ```rust,ignore
//! use shv_journal::{FileJournal, GetLogParams, JournalConfig, JournalEntry, Value};
//!
//! let mut journal = FileJournal::new(
//!     JournalConfig::new("my-device").with_journal_dir("/var/log/my-device"),
//! );
//! journal.set_snapshot_producer(Box::new(|| vec![
//!     JournalEntry::new("status/door", Value::Bool(false)),
//! ]));
//!
//! // record events; failures are logged, never raised
//! journal.append(&JournalEntry::new("status/door", Value::Bool(true)));
//!
//! // serve a range query with a leading snapshot
//! let params = GetLogParams::default().with_since(since_msec).with_snapshot(true);
//! let (header, records) = journal.get_log(&params)?;
//! ```

#![deny(missing_docs)]

pub mod acl;
pub mod codec;
pub mod entry;
pub mod error;
pub mod journal;
pub mod query;
pub mod value;

pub use entry::{JournalEntry, SampleType};
pub use error::{JournalError, Result};
pub use journal::{
    file_msec_to_name, file_name_to_msec, ClockFn, FileJournal, JournalConfig, JournalContext,
    SnapshotFn,
};
pub use query::{get_log, GetLogParams, LogHeader, PatternMatcher};
pub use value::{DateTime, MsecPolicy, Value};
