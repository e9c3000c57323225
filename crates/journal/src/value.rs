//! Dynamic value model used by journal entries and log metadata.
//!
//! [`Value`] is a small self-describing value type covering the variants a
//! journal ever records or serves: null, bool, signed integer, string,
//! date-time, list, string-keyed map and int-keyed map. Log files store
//! values in a compact text form (see [`Value::to_cpon`]) in which strings
//! escape all control characters, so the record and field separators of the
//! journal file format never occur inside an encoded value.
//!
//! [`DateTime`] carries a millisecond Unix epoch plus an optional UTC offset
//! and knows the ISO-8601 textual form used by both log records and journal
//! file names.

use crate::error::{JournalError, Result};
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Millisecond rendering policy for ISO-8601 output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MsecPolicy {
    /// Emit milliseconds only when non-zero.
    #[default]
    Auto,
    /// Always emit three millisecond digits.
    Always,
    /// Never emit milliseconds.
    Never,
}

/// A point in time with millisecond resolution and an optional UTC offset.
///
/// The epoch value is always UTC; the offset only affects textual rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    epoch_msec: i64,
    utc_offset_min: i32,
}

impl DateTime {
    /// Creates a UTC date-time from milliseconds since the Unix epoch.
    pub fn from_msec(epoch_msec: i64) -> Self {
        Self {
            epoch_msec,
            utc_offset_min: 0,
        }
    }

    /// Creates a date-time with an explicit UTC offset in minutes.
    pub fn with_offset(epoch_msec: i64, utc_offset_min: i32) -> Self {
        Self {
            epoch_msec,
            utc_offset_min,
        }
    }

    /// Returns the current wall-clock time.
    pub fn now() -> Self {
        Self::from_msec(Utc::now().timestamp_millis())
    }

    /// Milliseconds since the Unix epoch (UTC).
    pub fn epoch_msec(&self) -> i64 {
        self.epoch_msec
    }

    /// UTC offset in minutes used for textual rendering.
    pub fn utc_offset_min(&self) -> i32 {
        self.utc_offset_min
    }

    /// Formats the date-time as ISO-8601.
    ///
    /// With `with_offset` the string is suffixed by `Z` (zero offset) or
    /// `±hhmm`; without it the bare UTC wall time is emitted, which is the
    /// form journal file names are derived from.
    pub fn to_iso_string(&self, policy: MsecPolicy, with_offset: bool) -> String {
        let offset_msec = i64::from(self.utc_offset_min) * 60_000;
        let local_msec = self.epoch_msec.saturating_add(offset_msec);
        let dt = chrono::DateTime::<Utc>::from_timestamp_millis(local_msec)
            .unwrap_or_default()
            .naive_utc();
        let mut s = dt.format("%Y-%m-%dT%H:%M:%S").to_string();
        let msec = local_msec.rem_euclid(1000);
        match policy {
            MsecPolicy::Always => s.push_str(&format!(".{:03}", msec)),
            MsecPolicy::Auto if msec != 0 => s.push_str(&format!(".{:03}", msec)),
            _ => {}
        }
        if with_offset {
            if self.utc_offset_min == 0 {
                s.push('Z');
            } else {
                let abs = self.utc_offset_min.unsigned_abs();
                let sign = if self.utc_offset_min < 0 { '-' } else { '+' };
                s.push_str(&format!("{}{:02}{:02}", sign, abs / 60, abs % 60));
            }
        }
        s
    }

    /// Parses an ISO-8601 date-time at the start of `s`.
    ///
    /// Accepts `YYYY-MM-DDThh:mm:ss` with optional `.sss` milliseconds and an
    /// optional `Z` / `±hhmm` / `±hh:mm` offset suffix. Returns the parsed
    /// value together with the number of bytes consumed, or `None` when `s`
    /// does not start with a valid date-time.
    pub fn parse_prefix(s: &str) -> Option<(Self, usize)> {
        let b = s.as_bytes();
        if b.len() < 19 || b[4] != b'-' || b[7] != b'-' || (b[10] != b'T' && b[10] != b' ') {
            return None;
        }
        if b[13] != b':' || b[16] != b':' {
            return None;
        }
        let year: i32 = parse_digits(&b[0..4])?;
        let month: u32 = parse_digits(&b[5..7])? as u32;
        let day: u32 = parse_digits(&b[8..10])? as u32;
        let hour: u32 = parse_digits(&b[11..13])? as u32;
        let min: u32 = parse_digits(&b[14..16])? as u32;
        let sec: u32 = parse_digits(&b[17..19])? as u32;
        let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, min, sec)?;
        let mut msec: i64 = 0;
        let mut pos = 19;
        if b.len() >= pos + 4 && b[pos] == b'.' {
            msec = i64::from(parse_digits(&b[pos + 1..pos + 4])?);
            pos += 4;
        }
        let mut offset_min: i32 = 0;
        if b.len() > pos {
            match b[pos] {
                b'Z' => {
                    pos += 1;
                }
                sign @ (b'+' | b'-') => {
                    let rest = &b[pos + 1..];
                    let (hh, mm, used) = if rest.len() >= 5 && rest[2] == b':' {
                        (
                            parse_digits(&rest[0..2])?,
                            parse_digits(&rest[3..5])?,
                            6usize,
                        )
                    } else if rest.len() >= 4 {
                        (
                            parse_digits(&rest[0..2])?,
                            parse_digits(&rest[2..4])?,
                            5usize,
                        )
                    } else {
                        return None;
                    };
                    offset_min = hh * 60 + mm;
                    if sign == b'-' {
                        offset_min = -offset_min;
                    }
                    pos += used;
                }
                _ => {}
            }
        }
        let epoch_msec =
            naive.and_utc().timestamp_millis() + msec - i64::from(offset_min) * 60_000;
        Some((Self::with_offset(epoch_msec, offset_min), pos))
    }

    /// Parses a complete ISO-8601 string, rejecting trailing garbage.
    pub fn parse(s: &str) -> Option<Self> {
        match Self::parse_prefix(s) {
            Some((dt, n)) if n == s.len() => Some(dt),
            _ => None,
        }
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso_string(MsecPolicy::Auto, true))
    }
}

fn parse_digits(b: &[u8]) -> Option<i32> {
    let mut n: i32 = 0;
    for &c in b {
        if !c.is_ascii_digit() {
            return None;
        }
        n = n.checked_mul(10)?.checked_add(i32::from(c - b'0'))?;
    }
    Some(n)
}

/// A dynamic value: the payload of a journal entry and the building block of
/// log metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// UTF-8 string.
    String(String),
    /// Date-time with millisecond resolution.
    DateTime(DateTime),
    /// Ordered list of values.
    List(Vec<Value>),
    /// String-keyed map.
    Map(BTreeMap<String, Value>),
    /// Int-keyed map.
    IMap(BTreeMap<i64, Value>),
}

static NULL_VALUE: Value = Value::Null;

impl Value {
    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Boolean content, `false` for any other variant.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            _ => false,
        }
    }

    /// Integer content, `0` for any other variant.
    pub fn as_int(&self) -> i64 {
        match self {
            Value::Int(n) => *n,
            _ => 0,
        }
    }

    /// String content, `""` for any other variant.
    pub fn as_str(&self) -> &str {
        match self {
            Value::String(s) => s,
            _ => "",
        }
    }

    /// Date-time content, if any.
    pub fn as_datetime(&self) -> Option<DateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// List content, empty for any other variant.
    pub fn as_list(&self) -> &[Value] {
        match self {
            Value::List(l) => l,
            _ => &[],
        }
    }

    /// Map content, if the value is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Int-keyed map content, if the value is one.
    pub fn as_imap(&self) -> Option<&BTreeMap<i64, Value>> {
        match self {
            Value::IMap(m) => Some(m),
            _ => None,
        }
    }

    /// Map lookup; `Null` when the value is not a map or the key is absent.
    pub fn get(&self, key: &str) -> &Value {
        match self {
            Value::Map(m) => m.get(key).unwrap_or(&NULL_VALUE),
            _ => &NULL_VALUE,
        }
    }

    /// Serializes the value to its compact text form.
    pub fn to_cpon(&self) -> String {
        let mut out = String::new();
        self.write_cpon(&mut out);
        out
    }

    fn write_cpon(&self, out: &mut String) {
        match self {
            Value::Null => out.push_str("null"),
            Value::Bool(true) => out.push_str("true"),
            Value::Bool(false) => out.push_str("false"),
            Value::Int(n) => out.push_str(&n.to_string()),
            Value::String(s) => write_quoted(s, out),
            Value::DateTime(dt) => {
                out.push_str("d\"");
                out.push_str(&dt.to_iso_string(MsecPolicy::Auto, true));
                out.push('"');
            }
            Value::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_cpon(out);
                }
                out.push(']');
            }
            Value::Map(m) => {
                out.push('{');
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_quoted(k, out);
                    out.push(':');
                    v.write_cpon(out);
                }
                out.push('}');
            }
            Value::IMap(m) => {
                out.push_str("i{");
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&k.to_string());
                    out.push(':');
                    v.write_cpon(out);
                }
                out.push('}');
            }
        }
    }

    /// Parses a value from its compact text form.
    pub fn from_cpon(s: &str) -> Result<Value> {
        let mut reader = CponReader::new(s);
        let v = reader.read_value()?;
        reader.skip_ws();
        if !reader.at_end() {
            return Err(reader.error("trailing characters after value"));
        }
        Ok(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime> for Value {
    fn from(v: DateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<BTreeMap<i64, Value>> for Value {
    fn from(v: BTreeMap<i64, Value>) -> Self {
        Value::IMap(v)
    }
}

fn write_quoted(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('"');
}

struct CponReader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> CponReader<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, msg: &str) -> JournalError {
        JournalError::ValueParse(format!("{} at offset {}", msg, self.pos))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.src[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: u8) -> Result<()> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected {:?}", c as char)))
        }
    }

    fn read_value(&mut self) -> Result<Value> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some(b'n') if self.eat("null") => Ok(Value::Null),
            Some(b't') if self.eat("true") => Ok(Value::Bool(true)),
            Some(b'f') if self.eat("false") => Ok(Value::Bool(false)),
            Some(b'"') => Ok(Value::String(self.read_string()?)),
            Some(b'd') if self.src[self.pos..].starts_with("d\"") => {
                self.pos += 1;
                let s = self.read_string()?;
                let dt = DateTime::parse(&s)
                    .ok_or_else(|| self.error(&format!("invalid date-time {:?}", s)))?;
                Ok(Value::DateTime(dt))
            }
            Some(b'[') => self.read_list(),
            Some(b'i') if self.src[self.pos..].starts_with("i{") => {
                self.pos += 1;
                self.read_imap()
            }
            Some(b'{') => self.read_map(),
            Some(c) if c == b'-' || c.is_ascii_digit() => Ok(Value::Int(self.read_int()?)),
            Some(c) => Err(self.error(&format!("unexpected character {:?}", c as char))),
        }
    }

    fn read_int(&mut self) -> Result<i64> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.src[start..self.pos]
            .parse::<i64>()
            .map_err(|_| self.error("invalid integer"))
    }

    fn read_string(&mut self) -> Result<String> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            let start = self.pos;
            loop {
                match self.peek() {
                    None => return Err(self.error("unterminated string")),
                    Some(b'"') | Some(b'\\') => break,
                    Some(_) => {
                        // advance by whole UTF-8 characters
                        let ch = self.src[self.pos..]
                            .chars()
                            .next()
                            .ok_or_else(|| self.error("invalid UTF-8"))?;
                        self.pos += ch.len_utf8();
                    }
                }
            }
            out.push_str(&self.src[start..self.pos]);
            match self.bump() {
                Some(b'"') => return Ok(out),
                Some(b'\\') => match self.bump() {
                    Some(b'\\') => out.push('\\'),
                    Some(b'"') => out.push('"'),
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(b'r') => out.push('\r'),
                    Some(b'0') => out.push('\0'),
                    _ => return Err(self.error("invalid escape sequence")),
                },
                _ => return Err(self.error("unterminated string")),
            }
        }
    }

    fn read_list(&mut self) -> Result<Value> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b']') {
                self.pos += 1;
                return Ok(Value::List(items));
            }
            if !items.is_empty() {
                self.expect(b',')?;
                self.skip_ws();
            }
            items.push(self.read_value()?);
        }
    }

    fn read_map(&mut self) -> Result<Value> {
        self.expect(b'{')?;
        let mut map = BTreeMap::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(Value::Map(map));
            }
            if !map.is_empty() {
                self.expect(b',')?;
                self.skip_ws();
            }
            let key = self.read_string()?;
            self.skip_ws();
            self.expect(b':')?;
            map.insert(key, self.read_value()?);
        }
    }

    fn read_imap(&mut self) -> Result<Value> {
        self.expect(b'{')?;
        let mut map = BTreeMap::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(b'}') {
                self.pos += 1;
                return Ok(Value::IMap(map));
            }
            if !map.is_empty() {
                self.expect(b',')?;
                self.skip_ws();
            }
            let key = self.read_int()?;
            self.skip_ws();
            self.expect(b':')?;
            map.insert(key, self.read_value()?);
        }
    }
}
