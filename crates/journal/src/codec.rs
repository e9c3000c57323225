//! Record codec: reading and writing journal entries within one log file.
//!
//! # On-Disk Record Format
//!
//! ```text
//! timestamp FS path FS value FS short_time FS domain FS sample_type RS
//! ```
//!
//! - `RS` is [`RECORD_SEPARATOR`] (`0x0A`), `FS` is [`FIELD_SEPARATOR`]
//!   (`0x09`).
//! - `timestamp` — ISO-8601 UTC date-time with milliseconds always.
//! - `value` — compact text form (see [`Value::to_cpon`]); strings escape
//!   control characters, so neither separator occurs inside a value.
//! - `short_time` — decimal, empty when absent.
//! - `domain` — empty when absent.
//! - `sample_type` — empty for continuous, `D` for discrete.
//!
//! The format is self-synchronizing on separators: a partially written
//! trailing record is simply a line without its terminator and is discarded
//! by [`JournalFileReader`] and by the reverse scanner
//! [`find_last_entry_msec`].

use crate::entry::{JournalEntry, SampleType};
use crate::error::Result;
use crate::value::{DateTime, MsecPolicy, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Byte terminating each record.
pub const RECORD_SEPARATOR: u8 = b'\n';

/// Byte separating fields within a record.
pub const FIELD_SEPARATOR: u8 = b'\t';

/// Step of the backward scan used to locate the last valid timestamp.
const REVERSE_SCAN_STEP: i64 = 128;

/// Extra bytes read past each backward chunk so a date-time split across the
/// chunk boundary is still seen whole. A serialized date-time never exceeds
/// 28 bytes (`2018-01-10T12:03:56.123+0130`).
const REVERSE_SCAN_OVERLAP: i64 = 30;

/// Appends entries to a single journal file.
///
/// The writer tracks the file size and the timestamp of the last record it
/// wrote, so [`append_monotonic`](Self::append_monotonic) can raise each
/// record's timestamp to keep the file non-decreasing.
pub struct JournalFileWriter {
    file: File,
    path: PathBuf,
    size: u64,
    last_entry_msec: i64,
}

impl JournalFileWriter {
    /// Opens `path` for appending, creating it when missing.
    ///
    /// `baseline_msec` seeds the monotonic clamp; records are never written
    /// with a timestamp below it. For a journal file this is the file's
    /// start timestamp.
    pub fn open(path: impl AsRef<Path>, baseline_msec: i64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            path,
            size,
            last_entry_msec: baseline_msec,
        })
    }

    /// Current byte size of the file.
    pub fn file_size(&self) -> u64 {
        self.size
    }

    /// Path of the file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry with its own timestamp.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        self.write_record(entry, entry.epoch_msec)
    }

    /// Appends one entry, raising its timestamp to the previous record's
    /// when lower.
    pub fn append_monotonic(&mut self, entry: &JournalEntry) -> Result<()> {
        let msec = entry.epoch_msec.max(self.last_entry_msec);
        self.write_record(entry, msec)
    }

    fn write_record(&mut self, entry: &JournalEntry, msec: i64) -> Result<()> {
        let mut rec = String::new();
        rec.push_str(&DateTime::from_msec(msec).to_iso_string(MsecPolicy::Always, false));
        rec.push(FIELD_SEPARATOR as char);
        rec.push_str(&entry.path);
        rec.push(FIELD_SEPARATOR as char);
        rec.push_str(&entry.value.to_cpon());
        rec.push(FIELD_SEPARATOR as char);
        if let Some(st) = entry.short_time {
            rec.push_str(&st.to_string());
        }
        rec.push(FIELD_SEPARATOR as char);
        rec.push_str(&entry.domain);
        rec.push(FIELD_SEPARATOR as char);
        if entry.sample_type == SampleType::Discrete {
            rec.push('D');
        }
        rec.push(RECORD_SEPARATOR as char);
        self.file.write_all(rec.as_bytes())?;
        self.size += rec.len() as u64;
        self.last_entry_msec = msec;
        Ok(())
    }
}

/// Reads entries sequentially from a single journal file.
pub struct JournalFileReader {
    reader: BufReader<File>,
    path: PathBuf,
}

impl JournalFileReader {
    /// Opens `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            reader: BufReader::new(file),
            path,
        })
    }

    /// Reads the next entry.
    ///
    /// Returns `Ok(None)` at end of file and when only a truncated trailing
    /// record remains. Records whose first field is not a valid date-time
    /// are skipped with a warning.
    pub fn read_entry(&mut self) -> Result<Option<JournalEntry>> {
        loop {
            let mut line = Vec::new();
            let n = self.reader.read_until(RECORD_SEPARATOR, &mut line)?;
            if n == 0 {
                return Ok(None);
            }
            if line.last() != Some(&RECORD_SEPARATOR) {
                debug!(file = %self.path.display(), "discarding incomplete trailing record");
                return Ok(None);
            }
            line.pop();
            if line.is_empty() {
                continue;
            }
            match parse_record(&line) {
                Some(entry) => return Ok(Some(entry)),
                None => {
                    warn!(
                        file = %self.path.display(),
                        "malformed journal record will be ignored"
                    );
                }
            }
        }
    }
}

fn parse_record(line: &[u8]) -> Option<JournalEntry> {
    let line = std::str::from_utf8(line).ok()?;
    let mut fields = line.split(FIELD_SEPARATOR as char);
    let ts = fields.next()?;
    let (dt, _) = DateTime::parse_prefix(ts)?;
    let path = fields.next()?.to_string();
    if path.is_empty() {
        return None;
    }
    let value = match fields.next() {
        None | Some("") => Value::Null,
        Some(s) => Value::from_cpon(s).ok()?,
    };
    let short_time = match fields.next() {
        None | Some("") => None,
        Some(s) => Some(s.parse::<u16>().ok()?),
    };
    let domain = fields.next().unwrap_or("").to_string();
    let sample_type = match fields.next() {
        Some("D") => SampleType::Discrete,
        _ => SampleType::Continuous,
    };
    Some(JournalEntry {
        epoch_msec: dt.epoch_msec(),
        path,
        value,
        short_time,
        domain,
        sample_type,
    })
}

/// Finds the timestamp of the last decodable record in a journal file.
///
/// Scans backward in [`REVERSE_SCAN_STEP`]-byte chunks, each extended by
/// [`REVERSE_SCAN_OVERLAP`] bytes, looking for record-separator-prefixed
/// date-time fields; the start of the file also counts as a record boundary.
/// Returns `Ok(None)` when the file holds no valid date-time at all.
pub fn find_last_entry_msec(path: impl AsRef<Path>) -> Result<Option<i64>> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let len = file.metadata()?.len() as i64;
    let mut fpos = len;
    while fpos > 0 {
        fpos -= REVERSE_SCAN_STEP;
        let mut chunk_len = REVERSE_SCAN_STEP;
        if fpos < 0 {
            chunk_len += fpos;
            fpos = 0;
        }
        chunk_len += REVERSE_SCAN_OVERLAP;
        file.seek(SeekFrom::Start(fpos as u64))?;
        let mut chunk = Vec::with_capacity(chunk_len as usize);
        std::io::Read::by_ref(&mut file)
            .take(chunk_len as u64)
            .read_to_end(&mut chunk)?;

        let mut best: Option<i64> = None;
        let mut starts: Vec<usize> = Vec::new();
        if fpos == 0 {
            starts.push(0);
        }
        for (i, &b) in chunk.iter().enumerate() {
            if b == RECORD_SEPARATOR && i + 1 < chunk.len() {
                starts.push(i + 1);
            }
        }
        for start in starts {
            let Some(end) = chunk[start..]
                .iter()
                .position(|&b| b == FIELD_SEPARATOR)
                .map(|o| start + o)
            else {
                continue;
            };
            let Ok(field) = std::str::from_utf8(&chunk[start..end]) else {
                continue;
            };
            match DateTime::parse_prefix(field) {
                Some((dt, _)) => best = Some(dt.epoch_msec()),
                None => {
                    warn!(
                        file = %path.display(),
                        field,
                        "malformed journal date-time will be ignored"
                    );
                }
            }
        }
        if best.is_some() {
            return Ok(best);
        }
    }
    warn!(file = %path.display(), "file does not contain a record with a valid date-time");
    Ok(None)
}
