//! Range queries over a journal directory.
//!
//! [`get_log`] walks the directory from the file selected by a lower-bound
//! search on `since`, filters entries through the [`PatternMatcher`],
//! synthesizes a leading snapshot of continuous signals when asked to, and
//! assembles positional record tuples together with a [`LogHeader`]
//! describing the effective window.

pub mod header;
pub mod pattern;

use crate::codec::JournalFileReader;
use crate::entry::{JournalEntry, SampleType};
use crate::error::Result;
use crate::journal::JournalContext;
use crate::value::{DateTime, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub use header::{LogHeader, LOG_VERSION, RECORD_FIELD_NAMES};
pub use pattern::PatternMatcher;

/// Hard upper bound on the number of records a single query may return.
pub const DEFAULT_GET_LOG_RECORD_COUNT_LIMIT: usize = 100_000;

/// Default `max_record_count` when the caller does not set one.
pub const DEFAULT_MAX_RECORD_COUNT: usize = 1_000;

/// Parameters of a `get_log` query.
#[derive(Debug, Clone, PartialEq)]
pub struct GetLogParams {
    /// Start instant in epoch milliseconds, inclusive. Entries before it
    /// feed the snapshot when `with_snapshot` is set.
    pub since: Option<i64>,
    /// End instant in epoch milliseconds, exclusive.
    pub until: Option<i64>,
    /// Path filter; empty matches all.
    pub path_pattern: String,
    /// Domain filter; empty matches all.
    pub domain_pattern: String,
    /// Interpret the patterns as regular expressions instead of globs.
    pub is_regex: bool,
    /// Upper bound on emitted records, further capped by
    /// [`DEFAULT_GET_LOG_RECORD_COUNT_LIMIT`].
    pub max_record_count: usize,
    /// Synthesize a leading snapshot of continuous signals at `since`.
    pub with_snapshot: bool,
    /// Replace path strings with small integer ids plus a dictionary.
    pub with_paths_dict: bool,
}

impl Default for GetLogParams {
    fn default() -> Self {
        Self {
            since: None,
            until: None,
            path_pattern: String::new(),
            domain_pattern: String::new(),
            is_regex: false,
            max_record_count: DEFAULT_MAX_RECORD_COUNT,
            with_snapshot: false,
            with_paths_dict: true,
        }
    }
}

impl GetLogParams {
    /// Sets the window start.
    pub fn with_since(mut self, since_msec: i64) -> Self {
        self.since = Some(since_msec);
        self
    }

    /// Sets the window end.
    pub fn with_until(mut self, until_msec: i64) -> Self {
        self.until = Some(until_msec);
        self
    }

    /// Sets the path pattern.
    pub fn with_path_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.path_pattern = pattern.into();
        self
    }

    /// Sets the snapshot flag.
    pub fn with_snapshot(mut self, with_snapshot: bool) -> Self {
        self.with_snapshot = with_snapshot;
        self
    }

    /// Serializes the parameters for the result header.
    pub fn to_value(&self) -> Value {
        let mut m = BTreeMap::new();
        m.insert(
            "since".to_string(),
            self.since
                .map_or(Value::Null, |ms| Value::DateTime(DateTime::from_msec(ms))),
        );
        m.insert(
            "until".to_string(),
            self.until
                .map_or(Value::Null, |ms| Value::DateTime(DateTime::from_msec(ms))),
        );
        m.insert(
            "pathPattern".to_string(),
            Value::from(self.path_pattern.clone()),
        );
        m.insert(
            "domainPattern".to_string(),
            Value::from(self.domain_pattern.clone()),
        );
        m.insert("isRegex".to_string(), Value::Bool(self.is_regex));
        m.insert(
            "maxRecordCount".to_string(),
            Value::Int(self.max_record_count as i64),
        );
        m.insert("withSnapshot".to_string(), Value::Bool(self.with_snapshot));
        m.insert(
            "withPathsDict".to_string(),
            Value::Bool(self.with_paths_dict),
        );
        Value::Map(m)
    }

    /// Deserializes parameters; missing keys become defaults.
    pub fn from_value(v: &Value) -> Self {
        let defaults = Self::default();
        Self {
            since: v.get("since").as_datetime().map(|dt| dt.epoch_msec()),
            until: v.get("until").as_datetime().map(|dt| dt.epoch_msec()),
            path_pattern: v.get("pathPattern").as_str().to_string(),
            domain_pattern: v.get("domainPattern").as_str().to_string(),
            is_regex: v.get("isRegex").as_bool(),
            max_record_count: match v.get("maxRecordCount") {
                Value::Int(n) if *n > 0 => *n as usize,
                _ => defaults.max_record_count,
            },
            with_snapshot: v.get("withSnapshot").as_bool(),
            with_paths_dict: match v.get("withPathsDict") {
                Value::Bool(b) => *b,
                _ => defaults.with_paths_dict,
            },
        }
    }
}

/// Executes a range query over a cloned, consistent [`JournalContext`].
///
/// Returns the result header and the list of positional record tuples
/// `[date_time, path_token, value, short_time | null, domain | null]`.
pub fn get_log(
    context: &JournalContext,
    params: &GetLogParams,
) -> Result<(LogHeader, Vec<Value>)> {
    debug!(dir = %context.journal_dir.display(), ?params, "get_log");
    let matcher = PatternMatcher::new(&params.path_pattern, &params.domain_pattern, params.is_regex)?;

    let mut log: Vec<Value> = Vec::new();
    let mut snapshot: BTreeMap<String, JournalEntry> = BTreeMap::new();
    let mut path_cache: BTreeMap<String, Value> = BTreeMap::new();
    let mut max_path_id: i64 = 0;
    let mut rec_cnt: usize = 0;
    let mut first_record_msec: i64 = 0;
    let mut last_record_msec: i64 = 0;
    let since_msec = params.since.unwrap_or(0);
    let until_msec = params.until.unwrap_or(0);
    let max_rec_cnt = params
        .max_record_count
        .min(DEFAULT_GET_LOG_RECORD_COUNT_LIMIT);

    let mut emit = |entry: &JournalEntry,
                    log: &mut Vec<Value>,
                    path_cache: &mut BTreeMap<String, Value>| {
        let token = match path_cache.get(&entry.path) {
            Some(token) => token.clone(),
            None => {
                let token = if params.with_paths_dict {
                    max_path_id += 1;
                    Value::Int(max_path_id)
                } else {
                    Value::from(entry.path.clone())
                };
                debug!(path = %entry.path, token = %token.to_cpon(), "adding record to path cache");
                path_cache.insert(entry.path.clone(), token.clone());
                token
            }
        };
        log.push(Value::List(vec![
            Value::DateTime(entry.date_time()),
            token,
            entry.value.clone(),
            entry.short_time.map_or(Value::Null, |st| Value::Int(i64::from(st))),
            if entry.domain.is_empty() {
                Value::Null
            } else {
                Value::from(entry.domain.clone())
            },
        ]));
        rec_cnt += 1;
        if first_record_msec == 0 {
            first_record_msec = entry.epoch_msec;
        }
        last_record_msec = entry.epoch_msec;
        rec_cnt >= max_rec_cnt
    };

    if !context.files.is_empty() {
        let start_idx = starting_file_index(&context.files, since_msec);
        'files: for &file_msec in &context.files[start_idx..] {
            let path = context.file_path(file_msec);
            debug!(file = %path.display(), "opening file");
            // a rotation may have deleted the file since the context was
            // cloned; treat that as an empty file
            let mut reader = match JournalFileReader::open(&path) {
                Ok(reader) => reader,
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "cannot open journal file");
                    continue;
                }
            };
            loop {
                let entry = match reader.read_entry() {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(
                            file = %path.display(),
                            error = %err,
                            "read error, treating as end of file"
                        );
                        break;
                    }
                };
                if !matcher.matches(&entry.path, &entry.domain) {
                    continue;
                }
                if since_msec > 0 && entry.epoch_msec < since_msec {
                    if params.with_snapshot && entry.sample_type == SampleType::Continuous {
                        let mut stamped = entry;
                        stamped.epoch_msec = since_msec;
                        snapshot.insert(stamped.path.clone(), stamped);
                    }
                } else {
                    if params.with_snapshot && !snapshot.is_empty() {
                        debug!(entries = snapshot.len(), "emitting snapshot");
                        for (_, snapshot_entry) in std::mem::take(&mut snapshot) {
                            if emit(&snapshot_entry, &mut log, &mut path_cache) {
                                break 'files;
                            }
                        }
                    }
                    if until_msec == 0 || entry.epoch_msec < until_msec {
                        // keep the interval open to make log merges simpler
                        if emit(&entry, &mut log, &mut path_cache) {
                            break 'files;
                        }
                    } else {
                        break 'files;
                    }
                }
            }
        }
    }

    let since_msec = if since_msec == 0 {
        first_record_msec
    } else {
        since_msec
    };
    let until_msec = if rec_cnt < max_rec_cnt {
        if until_msec == 0 {
            last_record_msec
        } else {
            until_msec
        }
    } else {
        last_record_msec
    };

    let mut log_header = LogHeader {
        device_id: context.device_id.clone(),
        device_type: context.device_type.clone(),
        log_version: LOG_VERSION,
        log_params: params.clone(),
        record_count: rec_cnt as i64,
        record_count_limit: max_rec_cnt as i64,
        with_uptime: false,
        with_snapshot: params.with_snapshot,
        date_time: Value::DateTime(DateTime::now()),
        since: if since_msec > 0 {
            Value::DateTime(DateTime::from_msec(since_msec))
        } else {
            Value::Null
        },
        until: if until_msec > 0 {
            Value::DateTime(DateTime::from_msec(until_msec))
        } else {
            Value::Null
        },
        ..Default::default()
    };
    if !context.type_info.is_null() {
        log_header.set_type_info("", context.type_info.clone());
    }
    log_header.fields = RECORD_FIELD_NAMES
        .iter()
        .map(|name| Value::Map([("name".to_string(), Value::from(*name))].into()))
        .collect();
    if params.with_paths_dict {
        debug!("generating paths dict");
        log_header.path_dict = path_cache
            .into_iter()
            .map(|(path, token)| (token.as_int(), Value::from(path)))
            .collect();
    }

    Ok((log_header, log))
}

/// Picks the file a query starts reading at.
///
/// Lower-bound semantics: an exact hit starts there; past the end starts at
/// the last file; at the beginning starts at the first file; an interior
/// position starts one file earlier so pre-window entries can feed the
/// snapshot.
fn starting_file_index(files: &[i64], since_msec: i64) -> usize {
    if since_msec == 0 {
        return 0;
    }
    let lb = files.partition_point(|&f| f < since_msec);
    if lb == files.len() {
        files.len() - 1
    } else if files[lb] == since_msec || lb == 0 {
        lb
    } else {
        lb - 1
    }
}
