//! In-memory index of a journal directory.

use crate::value::{DateTime, MsecPolicy, Value};
use std::path::PathBuf;

/// Journal file extension.
pub const FILE_EXT: &str = ".log2";

// Separator positions inside `YYYY-MM-DDThh:mm:ss.sss` that get substituted
// to keep file names filesystem-safe.
const MIN_SEP_POS: usize = 13;
const SEC_SEP_POS: usize = 16;
const MSEC_SEP_POS: usize = 19;

/// Encodes a file start timestamp as an on-disk file name.
///
/// The name is the ISO-8601 UTC timestamp with millisecond precision, with
/// `:` replaced by `-` at the minute and second separators and `.` replaced
/// by `-` before the milliseconds, suffixed by `.log2`:
/// `2020-01-15T13-07-42-123.log2`.
pub fn file_msec_to_name(msec: i64) -> String {
    let iso = DateTime::from_msec(msec).to_iso_string(MsecPolicy::Always, false);
    let mut name: String = iso
        .char_indices()
        .map(|(i, c)| match i {
            MIN_SEP_POS | SEC_SEP_POS | MSEC_SEP_POS => '-',
            _ => c,
        })
        .collect();
    name.push_str(FILE_EXT);
    name
}

/// Decodes a file name back to its start timestamp.
///
/// Exact inverse of [`file_msec_to_name`]; returns `None` for anything that
/// does not parse back to a date-time.
pub fn file_name_to_msec(name: &str) -> Option<i64> {
    let stem = name.strip_suffix(FILE_EXT)?;
    if stem.len() <= MSEC_SEP_POS {
        return None;
    }
    let utc_str: String = stem
        .char_indices()
        .map(|(i, c)| match i {
            MIN_SEP_POS | SEC_SEP_POS => ':',
            MSEC_SEP_POS => '.',
            _ => c,
        })
        .collect();
    DateTime::parse(&utc_str).map(|dt| dt.epoch_msec())
}

/// In-memory index of the journal directory, authoritative after a scan.
///
/// The append engine owns one context and mutates it; queries run on a clone
/// so they never observe a torn update mid-append.
#[derive(Debug, Clone)]
pub struct JournalContext {
    /// Journal directory.
    pub journal_dir: PathBuf,
    /// Device identifier, part of serialized results only.
    pub device_id: String,
    /// Device type, part of serialized results only.
    pub device_type: String,
    /// Start timestamps of all journal files, ascending.
    pub files: Vec<i64>,
    /// Byte size of the newest file.
    pub last_file_size: u64,
    /// Sum of byte sizes of all files.
    pub journal_size: u64,
    /// Timestamp of the last decoded entry in the newest file, or wall-clock
    /// now when the journal is empty or corrupt.
    pub recent_time_stamp: i64,
    /// Per-path type descriptors, attached to query results.
    pub type_info: Value,
    /// Whether the journal directory exists.
    pub dir_exists: bool,
    consistent: bool,
}

impl JournalContext {
    /// Creates an unscanned context for `journal_dir`.
    pub fn new(journal_dir: PathBuf) -> Self {
        Self {
            journal_dir,
            device_id: String::new(),
            device_type: String::new(),
            files: Vec::new(),
            last_file_size: 0,
            journal_size: 0,
            recent_time_stamp: 0,
            type_info: Value::Null,
            dir_exists: false,
            consistent: false,
        }
    }

    /// True when the directory exists and the last scan completed.
    pub fn is_consistent(&self) -> bool {
        self.dir_exists && self.consistent
    }

    pub(crate) fn set_consistent(&mut self, consistent: bool) {
        self.consistent = consistent;
    }

    /// Start timestamp of the newest file, if any.
    pub fn last_file_msec(&self) -> Option<i64> {
        self.files.last().copied()
    }

    /// Full path of the journal file starting at `msec`.
    pub fn file_path(&self, msec: i64) -> PathBuf {
        self.journal_dir.join(file_msec_to_name(msec))
    }
}
