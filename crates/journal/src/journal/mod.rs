//! File-backed journal engine.
//!
//! # Architecture
//!
//! The journal is a directory of chronologically named `.log2` files, each a
//! sequence of separator-delimited records (see [`crate::codec`]). The name
//! of a file is the timestamp of its first entry (see
//! [`context::file_msec_to_name`]), so the directory itself is the index:
//!
//! ```text
//! append → pick-or-create newest file → snapshot on new file → write record
//!        → update sizes → rotate when over the journal size limit
//! ```
//!
//! Every new file starts with a snapshot of all continuous signals, obtained
//! from the owner through a [`SnapshotFn`] callback, so any file can seed a
//! range query on its own.
//!
//! The engine is single-writer and not internally thread-safe; callers
//! serialize access. Queries run on a clone of the in-memory
//! [`JournalContext`], taken under the caller's lock.

pub mod config;
pub mod context;

use crate::codec::{find_last_entry_msec, JournalFileWriter};
use crate::entry::JournalEntry;
use crate::error::{JournalError, Result};
use crate::query::{self, GetLogParams, LogHeader};
use crate::value::{DateTime, Value};
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{debug, error, info, warn};

pub use config::{
    parse_size_limit, JournalConfig, DEFAULT_FILE_SIZE_LIMIT, DEFAULT_JOURNAL_SIZE_LIMIT,
    MIN_SIZE_LIMIT,
};
pub use context::{file_msec_to_name, file_name_to_msec, JournalContext, FILE_EXT};

/// Extension of legacy journal files awaiting conversion.
const LEGACY_FILE_EXT: &str = ".log";

/// Callback producing the current snapshot: the last-known values of all
/// continuous signals, written at the head of every new journal file.
pub type SnapshotFn = Box<dyn Fn() -> Vec<JournalEntry> + Send>;

/// Wall-clock source in epoch milliseconds.
pub type ClockFn = Box<dyn Fn() -> i64 + Send>;

/// Append-only journal over one directory of `.log2` files.
pub struct FileJournal {
    context: JournalContext,
    file_size_limit: u64,
    journal_size_limit: u64,
    snapshot_fn: Option<SnapshotFn>,
    clock: ClockFn,
    log1_converted: bool,
}

impl FileJournal {
    /// Creates a journal from its configuration.
    ///
    /// The directory is not touched until the first append or query; the
    /// context is scanned lazily.
    pub fn new(config: JournalConfig) -> Self {
        let mut context = JournalContext::new(config.resolved_journal_dir());
        context.device_id = config.device_id;
        context.device_type = config.device_type;
        context.type_info = config.type_info;
        Self {
            context,
            file_size_limit: config.file_size_limit,
            journal_size_limit: config.journal_size_limit,
            snapshot_fn: None,
            clock: Box::new(|| DateTime::now().epoch_msec()),
            log1_converted: false,
        }
    }

    /// Sets the snapshot producer written at the head of every new file.
    ///
    /// A journal without a producer fails any append that would start a new
    /// file.
    pub fn set_snapshot_producer(&mut self, snapshot_fn: SnapshotFn) {
        self.snapshot_fn = Some(snapshot_fn);
    }

    /// Overrides the wall-clock used for zero-timestamp substitution and for
    /// seeding `recent_time_stamp` on an empty or corrupt journal. Intended
    /// for tests.
    pub fn set_clock(&mut self, clock: ClockFn) {
        self.clock = clock;
    }

    fn now_msec(&self) -> i64 {
        (self.clock)()
    }

    /// The in-memory context (may be stale until the next append or query).
    pub fn context(&self) -> &JournalContext {
        &self.context
    }

    /// Appends one entry.
    ///
    /// Never fails from the caller's perspective: the first error forces a
    /// directory rescan and a single retry, a second error is logged only.
    pub fn append(&mut self, entry: &JournalEntry) {
        match self.try_append(entry) {
            Ok(()) => {}
            Err(err) => {
                info!(
                    error = %err,
                    "append to log failed, journal dir will be read again"
                );
                let retried = self
                    .check_context(true)
                    .and_then(|()| self.try_append(entry));
                if let Err(err) = retried {
                    warn!(error = %err, "append to log failed after journal dir check");
                }
            }
        }
    }

    fn try_append(&mut self, entry: &JournalEntry) -> Result<()> {
        self.ensure_journal_dir()?;
        self.check_context(false)?;

        let mut msec = entry.epoch_msec;
        if msec == 0 {
            msec = self.now_msec();
        }
        if msec < self.context.recent_time_stamp {
            msec = self.context.recent_time_stamp;
        }

        let file_msec = if self.context.files.is_empty() {
            msec
        } else if self.context.last_file_size > self.file_size_limit {
            // rotate by size
            msec
        } else {
            self.context.last_file_msec().unwrap_or(msec)
        };
        if let Some(newest) = self.context.last_file_msec() {
            if file_msec < newest {
                return Err(JournalError::CorruptContext {
                    target: file_msec,
                    newest,
                });
            }
        }

        let path = self.context.file_path(file_msec);
        let mut writer = JournalFileWriter::open(&path, file_msec)?;
        let orig_size = writer.file_size();
        if orig_size == 0 {
            // new file starts with a snapshot
            debug!(file = %path.display(), "new file, snapshot will be written");
            let snapshot_fn = self
                .snapshot_fn
                .as_ref()
                .ok_or(JournalError::MissingSnapshotProducer)?;
            let snapshot = snapshot_fn();
            if snapshot.is_empty() {
                warn!("empty snapshot created");
            }
            for snapshot_entry in &snapshot {
                writer.append_monotonic(snapshot_entry)?;
            }
            self.context.files.push(file_msec);
        }

        let stamped = entry.clone().with_epoch_msec(msec);
        writer.append_monotonic(&stamped)?;

        let new_size = writer.file_size();
        self.context.last_file_size = new_size;
        self.context.journal_size += new_size - orig_size;
        self.context.recent_time_stamp = msec;
        if self.context.journal_size > self.journal_size_limit {
            self.rotate_journal()?;
        }
        Ok(())
    }

    fn rotate_journal(&mut self) -> Result<()> {
        info!(journal_size = self.context.journal_size, "rotating journal");
        self.update_journal_files()?;
        let files = self.context.files.clone();
        let mut file_cnt = files.len();
        for file_msec in files {
            if file_cnt == 1 {
                // keep at least one file in case of bad limits configuration
                break;
            }
            if self.context.journal_size <= self.journal_size_limit {
                break;
            }
            let path = self.context.file_path(file_msec);
            info!(file = %path.display(), "deleting file");
            let freed = remove_file_logged(&path);
            self.context.journal_size = self.context.journal_size.saturating_sub(freed);
            file_cnt -= 1;
        }
        self.update_journal_status()?;
        info!(journal_size = self.context.journal_size, "journal rotated");
        Ok(())
    }

    fn ensure_journal_dir(&mut self) -> Result<()> {
        if let Err(source) = fs::create_dir_all(&self.context.journal_dir) {
            self.context.dir_exists = false;
            return Err(JournalError::DirUnavailable {
                path: self.context.journal_dir.clone(),
                source,
            });
        }
        self.context.dir_exists = true;
        Ok(())
    }

    /// Brings the context to a consistent state, rescanning the directory
    /// when it is not (or when `force` is set).
    pub fn check_context(&mut self, force: bool) -> Result<()> {
        if !self.context.is_consistent() || force {
            debug!("journal context not consistent or check forced");
            self.context.dir_exists = self.context.journal_dir.is_dir();
            if self.context.dir_exists {
                self.update_journal_status()?;
            } else {
                warn!(
                    dir = %self.context.journal_dir.display(),
                    "journal dir does not exist"
                );
            }
        }
        if !self.context.is_consistent() {
            return Err(JournalError::InconsistentContext);
        }
        Ok(())
    }

    fn update_journal_status(&mut self) -> Result<()> {
        self.update_journal_files()?;
        self.update_recent_time_stamp()?;
        self.context.set_consistent(true);
        Ok(())
    }

    fn update_journal_files(&mut self) -> Result<()> {
        debug!(dir = %self.context.journal_dir.display(), "scanning journal dir");
        self.context.set_consistent(false);
        self.context.journal_size = 0;
        self.context.last_file_size = 0;
        self.context.files.clear();
        let mut max_file_msec: Option<i64> = None;
        for dir_entry in fs::read_dir(&self.context.journal_dir)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.ends_with(FILE_EXT) {
                continue;
            }
            match file_name_to_msec(name) {
                Some(msec) => {
                    let size = dir_entry.metadata()?.len();
                    self.context.files.push(msec);
                    if max_file_msec.map_or(true, |max| msec > max) {
                        max_file_msec = Some(msec);
                        self.context.last_file_size = size;
                    }
                    self.context.journal_size += size;
                }
                None => {
                    warn!(file = name, "malformed journal file name");
                }
            }
        }
        self.context.files.sort_unstable();
        debug!(files = self.context.files.len(), "journal dir scanned");
        Ok(())
    }

    fn update_recent_time_stamp(&mut self) -> Result<()> {
        match self.context.last_file_msec() {
            None => {
                self.context.recent_time_stamp = self.now_msec();
            }
            Some(newest) => {
                let path = self.context.file_path(newest);
                match find_last_entry_msec(&path)? {
                    Some(msec) => self.context.recent_time_stamp = msec,
                    None => {
                        // corrupted file, a new one will be started
                        self.context.recent_time_stamp = self.now_msec();
                    }
                }
            }
        }
        debug!(
            recent_time_stamp = self.context.recent_time_stamp,
            "recent time stamp updated"
        );
        Ok(())
    }

    /// Converts legacy `.log` files to the current format by renaming them
    /// after the date-time found in their first bytes.
    ///
    /// Runs at most once per journal instance and is idempotent: converted
    /// files no longer match the legacy extension. Per-file errors are
    /// logged and never abort the scan.
    pub fn convert_log1_journal_dir(&mut self) {
        if self.log1_converted {
            return;
        }
        self.log1_converted = true;

        let dir = self.context.journal_dir.clone();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                error!(dir = %dir.display(), error = %err, "cannot read content of dir");
                return;
            }
        };
        let mut n_files = 0;
        for dir_entry in entries.flatten() {
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.ends_with(LEGACY_FILE_EXT) {
                continue;
            }
            if n_files == 0 {
                info!("legacy journal file(s) found, converting to current format");
            }
            n_files += 1;
            let path = dir_entry.path();
            match legacy_file_msec(&path) {
                Some(msec) => {
                    let new_path = self.context.file_path(msec);
                    info!(from = %path.display(), to = %new_path.display(), "renaming");
                    if let Err(err) = fs::rename(&path, &new_path) {
                        error!(
                            from = %path.display(),
                            to = %new_path.display(),
                            error = %err,
                            "cannot rename file"
                        );
                    }
                }
                None => {
                    warn!(
                        file = %path.display(),
                        "cannot read date-time from first line of file"
                    );
                }
            }
        }
    }

    /// Executes a range query over a consistent snapshot of the journal.
    ///
    /// The context is rescanned first when needed; an unrecoverable context
    /// is the only error a cleanly empty journal cannot produce.
    pub fn get_log(&mut self, params: &GetLogParams) -> Result<(LogHeader, Vec<Value>)> {
        if let Err(err) = self.check_context(false) {
            info!(error = %err, "journal consistency check failed, rescanning");
            self.check_context(true)?;
        }
        query::get_log(&self.context.clone(), params)
    }
}

/// Reads the date-time from the first bytes of a legacy journal file.
fn legacy_file_msec(path: &Path) -> Option<i64> {
    let mut head = [0u8; 30];
    let mut file = fs::File::open(path).ok()?;
    let mut read = 0;
    while read < head.len() {
        match file.read(&mut head[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(_) => return None,
        }
    }
    let head = String::from_utf8_lossy(&head[..read]);
    DateTime::parse_prefix(&head).map(|(dt, _)| dt.epoch_msec())
}

/// Removes a file and returns the number of bytes freed; failures are
/// logged and count as zero.
fn remove_file_logged(path: &Path) -> u64 {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) => {
            warn!(file = %path.display(), error = %err, "cannot stat file");
            0
        }
    };
    match fs::remove_file(path) {
        Ok(()) => size,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "cannot delete file");
            0
        }
    }
}
