//! Journal entry: one recorded event.

use crate::value::{DateTime, Value};

/// Sample type of a recorded signal.
///
/// Continuous signals keep their last value between entries and are eligible
/// for snapshot synthesis; discrete signals are event-like and are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleType {
    /// Absence of new entries implies the previous value still holds.
    #[default]
    Continuous,
    /// Event-like signal, excluded from snapshots.
    Discrete,
}

/// A single journal entry.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Milliseconds since the Unix epoch; `0` means "stamp at append time".
    pub epoch_msec: i64,
    /// Non-empty property path with `/` as hierarchical separator.
    pub path: String,
    /// Recorded value.
    pub value: Value,
    /// Optional 16-bit device-local counter; `None` is distinct from `Some(0)`.
    pub short_time: Option<u16>,
    /// Optional domain; empty means none.
    pub domain: String,
    /// Sample type, drives snapshot inclusion.
    pub sample_type: SampleType,
}

impl JournalEntry {
    /// Creates an entry with defaults: no timestamp, no short-time, no
    /// domain, continuous sample type.
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            epoch_msec: 0,
            path: path.into(),
            value,
            short_time: None,
            domain: String::new(),
            sample_type: SampleType::default(),
        }
    }

    /// Sets the timestamp.
    pub fn with_epoch_msec(mut self, epoch_msec: i64) -> Self {
        self.epoch_msec = epoch_msec;
        self
    }

    /// Sets the short-time counter.
    pub fn with_short_time(mut self, short_time: u16) -> Self {
        self.short_time = Some(short_time);
        self
    }

    /// Sets the domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Sets the sample type.
    pub fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    /// The entry's timestamp as a [`DateTime`].
    pub fn date_time(&self) -> DateTime {
        DateTime::from_msec(self.epoch_msec)
    }
}
