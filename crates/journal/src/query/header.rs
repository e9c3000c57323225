//! Log header: the metadata map attached to every query result.

use crate::query::GetLogParams;
use crate::value::Value;
use std::collections::BTreeMap;

/// Log format version reported in result headers.
pub const LOG_VERSION: i64 = 2;

/// Positional field names of a result record.
pub const RECORD_FIELD_NAMES: [&str; 5] = ["timestamp", "path", "value", "shortTime", "domain"];

/// Metadata describing one `get_log` result: the device, the echoed query
/// parameters, the effective time window and the optional path dictionary.
///
/// Round-trips through a [`Value::Map`]; missing keys decode to defaults and
/// empty device / fields / path-dict / type-info entries are omitted on
/// encode.
#[derive(Debug, Clone, Default)]
pub struct LogHeader {
    /// Device identifier.
    pub device_id: String,
    /// Device type.
    pub device_type: String,
    /// Log format version.
    pub log_version: i64,
    /// Query parameters this result answers.
    pub log_params: GetLogParams,
    /// Number of records in the result.
    pub record_count: i64,
    /// Effective record-count cap the query ran with.
    pub record_count_limit: i64,
    /// Whether records carry an uptime column (legacy, always false here).
    pub with_uptime: bool,
    /// Whether the result starts with a synthesized snapshot.
    pub with_snapshot: bool,
    /// Positional field descriptors.
    pub fields: Vec<Value>,
    /// Path dictionary: record path id to path string.
    pub path_dict: BTreeMap<i64, Value>,
    /// Per-prefix type descriptors.
    pub type_infos: BTreeMap<String, Value>,
    /// Time the result was produced.
    pub date_time: Value,
    /// Effective window start.
    pub since: Value,
    /// Effective window end.
    pub until: Value,
}

impl LogHeader {
    /// Sets type info for a path prefix; the empty prefix means the whole
    /// device tree and is stored under `"."`.
    pub fn set_type_info(&mut self, path_prefix: &str, type_info: Value) {
        let prefix = if path_prefix.is_empty() {
            "."
        } else {
            path_prefix
        };
        self.type_infos.insert(prefix.to_string(), type_info);
    }

    /// Serializes the header to its metadata map.
    pub fn to_meta(&self) -> Value {
        let mut md = BTreeMap::new();
        let mut device = BTreeMap::new();
        if !self.device_id.is_empty() {
            device.insert("id".to_string(), Value::from(self.device_id.clone()));
        }
        if !self.device_type.is_empty() {
            device.insert("type".to_string(), Value::from(self.device_type.clone()));
        }
        if !device.is_empty() {
            md.insert("device".to_string(), Value::Map(device));
        }
        md.insert("logVersion".to_string(), Value::Int(self.log_version));
        md.insert("logParams".to_string(), self.log_params.to_value());
        md.insert("recordCount".to_string(), Value::Int(self.record_count));
        md.insert(
            "recordCountLimit".to_string(),
            Value::Int(self.record_count_limit),
        );
        md.insert("withUptime".to_string(), Value::Bool(self.with_uptime));
        md.insert("withSnapShot".to_string(), Value::Bool(self.with_snapshot));
        if !self.fields.is_empty() {
            md.insert("fields".to_string(), Value::List(self.fields.clone()));
        }
        if !self.path_dict.is_empty() {
            md.insert("pathDict".to_string(), Value::IMap(self.path_dict.clone()));
        }
        if !self.type_infos.is_empty() {
            if self.type_infos.len() == 1 && self.type_infos.contains_key(".") {
                if let Some(ti) = self.type_infos.get(".") {
                    md.insert("typeInfo".to_string(), ti.clone());
                }
            } else {
                md.insert(
                    "typeInfos".to_string(),
                    Value::Map(
                        self.type_infos
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect(),
                    ),
                );
            }
        }
        md.insert("dateTime".to_string(), self.date_time.clone());
        md.insert("since".to_string(), self.since.clone());
        md.insert("until".to_string(), self.until.clone());
        Value::Map(md)
    }

    /// Deserializes a header from its metadata map; missing keys become
    /// defaults.
    pub fn from_meta(md: &Value) -> Self {
        let mut ret = Self::default();
        let device = md.get("device");
        ret.device_id = device.get("id").as_str().to_string();
        ret.device_type = device.get("type").as_str().to_string();
        ret.log_version = md.get("logVersion").as_int();
        ret.log_params = GetLogParams::from_value(md.get("logParams"));
        ret.record_count = md.get("recordCount").as_int();
        ret.record_count_limit = md.get("recordCountLimit").as_int();
        ret.with_uptime = md.get("withUptime").as_bool();
        ret.with_snapshot = md.get("withSnapShot").as_bool();
        ret.fields = md.get("fields").as_list().to_vec();
        if let Some(dict) = md.get("pathDict").as_imap() {
            ret.path_dict = dict.clone();
        }
        if let Some(infos) = md.get("typeInfos").as_map() {
            ret.type_infos = infos.clone();
        }
        let ti = md.get("typeInfo");
        if ti.as_map().is_some() {
            ret.type_infos.insert(".".to_string(), ti.clone());
        }
        ret.date_time = md.get("dateTime").clone();
        ret.since = md.get("since").clone();
        ret.until = md.get("until").clone();
        ret
    }
}
