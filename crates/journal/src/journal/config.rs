//! Journal configuration.

use crate::error::{JournalError, Result};
use crate::value::Value;
use std::path::PathBuf;
use tracing::warn;

/// Default maximum size of a single journal file before rotating (1 MiB).
pub const DEFAULT_FILE_SIZE_LIMIT: u64 = 1024 * 1024;

/// Default maximum total size of the journal directory (100 MiB).
pub const DEFAULT_JOURNAL_SIZE_LIMIT: u64 = 100 * 1024 * 1024;

/// Smallest accepted size limit.
pub const MIN_SIZE_LIMIT: u64 = 1024;

/// Configuration for a [`FileJournal`](crate::journal::FileJournal).
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Device identifier; also seeds the fallback journal directory.
    pub device_id: String,
    /// Device type, echoed in query results.
    pub device_type: String,
    /// Journal directory; when unset a `/tmp/shvjournal` fallback derived
    /// from the device id is used.
    pub journal_dir: Option<PathBuf>,
    /// Maximum single-file size in bytes before rotating to a new file.
    pub file_size_limit: u64,
    /// Maximum total directory size in bytes before old files are deleted.
    pub journal_size_limit: u64,
    /// Per-path type descriptors attached to query results.
    pub type_info: Value,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            device_type: String::new(),
            journal_dir: None,
            file_size_limit: DEFAULT_FILE_SIZE_LIMIT,
            journal_size_limit: DEFAULT_JOURNAL_SIZE_LIMIT,
            type_info: Value::Null,
        }
    }
}

impl JournalConfig {
    /// Creates a configuration for the given device id.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ..Self::default()
        }
    }

    /// Sets the journal directory.
    pub fn with_journal_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.journal_dir = Some(dir.into());
        self
    }

    /// Sets the device type.
    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    /// Sets the single-file size limit in bytes.
    pub fn with_file_size_limit(mut self, limit: u64) -> Self {
        self.file_size_limit = limit.max(MIN_SIZE_LIMIT);
        self
    }

    /// Sets the single-file size limit from a size string (`N`, `Nk`, `Nm`,
    /// `Ng`).
    pub fn with_file_size_limit_str(self, limit: &str) -> Result<Self> {
        Ok(self.with_file_size_limit(parse_size_limit(limit)?))
    }

    /// Sets the total journal size limit in bytes.
    pub fn with_journal_size_limit(mut self, limit: u64) -> Self {
        self.journal_size_limit = limit.max(MIN_SIZE_LIMIT);
        self
    }

    /// Sets the total journal size limit from a size string (`N`, `Nk`,
    /// `Nm`, `Ng`).
    pub fn with_journal_size_limit_str(self, limit: &str) -> Result<Self> {
        Ok(self.with_journal_size_limit(parse_size_limit(limit)?))
    }

    /// Sets the type-info map attached to query results.
    pub fn with_type_info(mut self, type_info: Value) -> Self {
        self.type_info = type_info;
        self
    }

    /// Resolves the journal directory, falling back to
    /// `/tmp/shvjournal/<sanitized device id>` when unset.
    pub(crate) fn resolved_journal_dir(&self) -> PathBuf {
        if let Some(dir) = &self.journal_dir {
            return dir.clone();
        }
        let dir = default_journal_dir(&self.device_id);
        warn!(dir = %dir.display(), "journal dir not set, falling back to default");
        dir
    }
}

fn default_journal_dir(device_id: &str) -> PathBuf {
    let leaf = if device_id.is_empty() {
        "default".to_string()
    } else {
        device_id
            .chars()
            .map(|c| match c {
                '/' | ':' | '.' => '-',
                c => c,
            })
            .collect()
    };
    PathBuf::from("/tmp/shvjournal").join(leaf)
}

/// Parses a size-limit string: a decimal number with an optional `k`, `m` or
/// `g` suffix (case-insensitive). The result is floored at
/// [`MIN_SIZE_LIMIT`].
pub fn parse_size_limit(s: &str) -> Result<u64> {
    let s = s.trim();
    let digits_end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let n: u64 = s[..digits_end]
        .parse()
        .map_err(|_| JournalError::InvalidSizeLimit(s.to_string()))?;
    let n = match s[digits_end..].trim() {
        "" => n,
        unit if unit.eq_ignore_ascii_case("k") => n * 1024,
        unit if unit.eq_ignore_ascii_case("m") => n * 1024 * 1024,
        unit if unit.eq_ignore_ascii_case("g") => n * 1024 * 1024 * 1024,
        _ => return Err(JournalError::InvalidSizeLimit(s.to_string())),
    };
    Ok(n.max(MIN_SIZE_LIMIT))
}
