//! Integration tests for the query path: snapshot synthesis, record caps,
//! pattern filtering, path dictionaries and window metadata.

use shv_journal::codec::JournalFileWriter;
use shv_journal::query::DEFAULT_GET_LOG_RECORD_COUNT_LIMIT;
use shv_journal::{
    file_msec_to_name, FileJournal, GetLogParams, JournalConfig, JournalEntry, SampleType, Value,
};
use std::path::Path;
use tempfile::TempDir;

fn entry(path: &str, value: i64, msec: i64) -> JournalEntry {
    JournalEntry::new(path, Value::Int(value)).with_epoch_msec(msec)
}

/// Writes one journal file the way the append engine lays it out.
fn write_journal_file(dir: &Path, file_msec: i64, entries: &[JournalEntry]) {
    let path = dir.join(file_msec_to_name(file_msec));
    let mut writer = JournalFileWriter::open(&path, file_msec).unwrap();
    for e in entries {
        writer.append(e).unwrap();
    }
}

fn journal_over(dir: &Path) -> FileJournal {
    let mut journal = FileJournal::new(JournalConfig::new("test-device").with_journal_dir(dir));
    journal.set_snapshot_producer(Box::new(Vec::new));
    journal
}

fn record_msec(record: &Value) -> i64 {
    record.as_list()[0]
        .as_datetime()
        .expect("record timestamp")
        .epoch_msec()
}

fn record_parts(record: &Value) -> (i64, Value, i64) {
    let fields = record.as_list();
    (
        record_msec(record),
        fields[1].clone(),
        fields[2].as_int(),
    )
}

/// An empty journal answers with an empty list and a valid header.
#[test]
fn test_empty_journal() {
    let temp_dir = TempDir::new().unwrap();
    let mut journal = journal_over(temp_dir.path());

    let (header, records) = journal.get_log(&GetLogParams::default()).unwrap();
    assert!(records.is_empty());
    assert_eq!(header.record_count, 0);
    assert!(header.since.is_null());
    assert!(header.until.is_null());
}

/// Snapshot synthesis from pre-window continuous samples: the previous file
/// feeds last-known values, each restamped to `since`.
#[test]
fn test_snapshot_from_previous_file() {
    let temp_dir = TempDir::new().unwrap();
    write_journal_file(
        temp_dir.path(),
        100,
        &[entry("x", 1, 110), entry("y", 2, 120)],
    );
    write_journal_file(temp_dir.path(), 200, &[entry("x", 3, 210)]);

    let mut journal = journal_over(temp_dir.path());
    let params = GetLogParams {
        with_paths_dict: false,
        ..GetLogParams::default()
    }
    .with_since(150)
    .with_snapshot(true);
    let (header, records) = journal.get_log(&params).unwrap();

    assert_eq!(header.record_count, 3);
    let parts: Vec<(i64, Value, i64)> = records.iter().map(record_parts).collect();
    assert_eq!(
        parts,
        vec![
            (150, Value::from("x"), 1),
            (150, Value::from("y"), 2),
            (210, Value::from("x"), 3),
        ]
    );
}

/// A `since` hitting a file's start timestamp reads exactly that file; its
/// head snapshot records carry the pre-window state.
#[test]
fn test_since_at_file_start() {
    let temp_dir = TempDir::new().unwrap();
    write_journal_file(
        temp_dir.path(),
        100,
        &[entry("x", 1, 110), entry("y", 2, 120)],
    );
    // the file the engine would have started at 200: snapshot head, then the
    // in-window entry
    write_journal_file(
        temp_dir.path(),
        200,
        &[entry("x", 1, 200), entry("y", 2, 200), entry("x", 3, 210)],
    );

    let mut journal = journal_over(temp_dir.path());
    let params = GetLogParams {
        with_paths_dict: false,
        ..GetLogParams::default()
    }
    .with_since(200)
    .with_snapshot(true);
    let (header, records) = journal.get_log(&params).unwrap();

    assert_eq!(header.record_count, 3);
    let parts: Vec<(i64, Value, i64)> = records.iter().map(record_parts).collect();
    assert_eq!(
        parts,
        vec![
            (200, Value::from("x"), 1),
            (200, Value::from("y"), 2),
            (210, Value::from("x"), 3),
        ]
    );
}

/// Reaching the record cap truncates the window: `until` becomes the last
/// emitted record's timestamp.
#[test]
fn test_record_cap_truncates_window() {
    let temp_dir = TempDir::new().unwrap();
    let entries: Vec<JournalEntry> = (0..10).map(|i| entry("p", i, 1000 + i)).collect();
    write_journal_file(temp_dir.path(), 1000, &entries);

    let mut journal = journal_over(temp_dir.path());
    let params = GetLogParams {
        max_record_count: 1,
        ..GetLogParams::default()
    };
    let (header, records) = journal.get_log(&params).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(header.record_count, 1);
    assert_eq!(header.record_count_limit, 1);
    assert_eq!(
        header.until.as_datetime().map(|dt| dt.epoch_msec()),
        Some(1000)
    );
}

/// `max_record_count` is further capped by the hard query limit.
#[test]
fn test_record_cap_hard_limit() {
    let temp_dir = TempDir::new().unwrap();
    write_journal_file(temp_dir.path(), 1000, &[entry("p", 1, 1000)]);

    let mut journal = journal_over(temp_dir.path());
    let params = GetLogParams {
        max_record_count: usize::MAX,
        ..GetLogParams::default()
    };
    let (header, _) = journal.get_log(&params).unwrap();
    assert_eq!(
        header.record_count_limit as usize,
        DEFAULT_GET_LOG_RECORD_COUNT_LIMIT
    );
}

/// `until` is exclusive; an unset window is closed from the data.
#[test]
fn test_window_bounds() {
    let temp_dir = TempDir::new().unwrap();
    let entries: Vec<JournalEntry> = (0..5).map(|i| entry("p", i, 1000 + i * 10)).collect();
    write_journal_file(temp_dir.path(), 1000, &entries);

    let mut journal = journal_over(temp_dir.path());

    // explicit until: entries at the bound are excluded
    let (_, records) = journal
        .get_log(&GetLogParams::default().with_since(1010).with_until(1030))
        .unwrap();
    let times: Vec<i64> = records.iter().map(record_msec).collect();
    assert_eq!(times, vec![1010, 1020]);

    // open window: since/until close over the emitted records
    let (header, records) = journal.get_log(&GetLogParams::default()).unwrap();
    assert_eq!(records.len(), 5);
    assert_eq!(
        header.since.as_datetime().map(|dt| dt.epoch_msec()),
        Some(1000)
    );
    assert_eq!(
        header.until.as_datetime().map(|dt| dt.epoch_msec()),
        Some(1040)
    );
}

/// Results stay non-decreasing in time after the snapshot prefix.
#[test]
fn test_query_result_is_monotonic() {
    let temp_dir = TempDir::new().unwrap();
    write_journal_file(
        temp_dir.path(),
        100,
        &[entry("a", 1, 100), entry("b", 2, 150), entry("a", 3, 190)],
    );
    write_journal_file(
        temp_dir.path(),
        200,
        &[entry("a", 3, 200), entry("b", 4, 250), entry("a", 5, 300)],
    );

    let mut journal = journal_over(temp_dir.path());
    let (header, records) = journal
        .get_log(&GetLogParams::default().with_since(180).with_snapshot(true))
        .unwrap();

    let snapshot_len = 2; // a and b had pre-window continuous samples
    let times: Vec<i64> = records.iter().map(record_msec).collect();
    assert!(times[..snapshot_len].iter().all(|&t| t == 180));
    for pair in times[snapshot_len..].windows(2) {
        assert!(pair[0] <= pair[1]);
    }
    assert_eq!(header.record_count as usize, records.len());
}

/// Snapshot inclusion: exactly one restamped entry per continuous path with
/// pre-window history, none for discrete or filtered-out paths.
#[test]
fn test_snapshot_inclusion_rules() {
    let temp_dir = TempDir::new().unwrap();
    write_journal_file(
        temp_dir.path(),
        100,
        &[
            entry("keep/cont", 1, 110),
            entry("keep/cont", 2, 120),
            JournalEntry::new("keep/event", Value::Int(9))
                .with_epoch_msec(130)
                .with_sample_type(SampleType::Discrete),
            entry("drop/cont", 7, 140),
        ],
    );
    write_journal_file(temp_dir.path(), 500, &[entry("keep/cont", 3, 500)]);

    let mut journal = journal_over(temp_dir.path());
    let params = GetLogParams {
        path_pattern: "keep/**".to_string(),
        with_paths_dict: false,
        ..GetLogParams::default()
    }
    .with_since(300)
    .with_snapshot(true);
    let (_, records) = journal.get_log(&params).unwrap();

    let parts: Vec<(i64, Value, i64)> = records.iter().map(record_parts).collect();
    // one snapshot record for keep/cont with its latest pre-window value,
    // nothing for the discrete path or the filtered-out one
    assert_eq!(
        parts,
        vec![
            (300, Value::from("keep/cont"), 2),
            (500, Value::from("keep/cont"), 3),
        ]
    );
}

/// Path dictionary: 1-based contiguous ids, one per distinct path, inverted
/// into the header.
#[test]
fn test_paths_dict_bijection() {
    let temp_dir = TempDir::new().unwrap();
    write_journal_file(
        temp_dir.path(),
        100,
        &[
            entry("a", 1, 100),
            entry("b", 2, 110),
            entry("a", 3, 120),
            entry("c", 4, 130),
            entry("b", 5, 140),
        ],
    );

    let mut journal = journal_over(temp_dir.path());
    let (header, records) = journal.get_log(&GetLogParams::default()).unwrap();

    let ids: Vec<i64> = header.path_dict.keys().copied().collect();
    assert_eq!(ids, vec![1, 2, 3]);
    let dict_paths: Vec<&str> = header.path_dict.values().map(|v| v.as_str()).collect();
    assert_eq!(dict_paths.len(), 3);

    // every record's token resolves through the dictionary
    for record in &records {
        let token = record.as_list()[1].as_int();
        assert!(header.path_dict.contains_key(&token));
    }
    // and the first occurrence order assigns ids
    assert_eq!(header.path_dict.get(&1).map(|v| v.as_str()), Some("a"));
    assert_eq!(header.path_dict.get(&2).map(|v| v.as_str()), Some("b"));
    assert_eq!(header.path_dict.get(&3).map(|v| v.as_str()), Some("c"));
}

/// Without the dictionary, records carry the path strings themselves.
#[test]
fn test_paths_without_dict() {
    let temp_dir = TempDir::new().unwrap();
    write_journal_file(temp_dir.path(), 100, &[entry("a/b", 1, 100)]);

    let mut journal = journal_over(temp_dir.path());
    let params = GetLogParams {
        with_paths_dict: false,
        ..GetLogParams::default()
    };
    let (header, records) = journal.get_log(&params).unwrap();
    assert!(header.path_dict.is_empty());
    assert_eq!(records[0].as_list()[1].as_str(), "a/b");
}

/// Domain filtering applies independently of the path pattern.
#[test]
fn test_domain_filter() {
    let temp_dir = TempDir::new().unwrap();
    write_journal_file(
        temp_dir.path(),
        100,
        &[
            entry("p", 1, 100).with_domain("chng"),
            entry("p", 2, 110).with_domain("cmd"),
            entry("q", 3, 120).with_domain("chng"),
        ],
    );

    let mut journal = journal_over(temp_dir.path());
    let params = GetLogParams {
        domain_pattern: "chng".to_string(),
        with_paths_dict: false,
        ..GetLogParams::default()
    };
    let (_, records) = journal.get_log(&params).unwrap();
    let values: Vec<i64> = records.iter().map(|r| r.as_list()[2].as_int()).collect();
    assert_eq!(values, vec![1, 3]);
}

/// Regex patterns are selected by the flag.
#[test]
fn test_regex_path_pattern() {
    let temp_dir = TempDir::new().unwrap();
    write_journal_file(
        temp_dir.path(),
        100,
        &[
            entry("zone/1/temp", 1, 100),
            entry("zone/2/temp", 2, 110),
            entry("zone/1/humidity", 3, 120),
        ],
    );

    let mut journal = journal_over(temp_dir.path());
    let params = GetLogParams {
        path_pattern: r"^zone/\d+/temp$".to_string(),
        is_regex: true,
        with_paths_dict: false,
        ..GetLogParams::default()
    };
    let (_, records) = journal.get_log(&params).unwrap();
    let values: Vec<i64> = records.iter().map(|r| r.as_list()[2].as_int()).collect();
    assert_eq!(values, vec![1, 2]);
}

/// Record tuples carry null for absent short-time and domain, and the
/// header echoes the query parameters.
#[test]
fn test_record_shape_and_header_echo() {
    let temp_dir = TempDir::new().unwrap();
    write_journal_file(
        temp_dir.path(),
        100,
        &[
            entry("p", 1, 100),
            entry("q", 2, 110).with_short_time(42).with_domain("chng"),
        ],
    );

    let mut journal = journal_over(temp_dir.path());
    let params = GetLogParams::default().with_since(100);
    let (header, records) = journal.get_log(&params).unwrap();

    let bare = records[0].as_list();
    assert_eq!(bare.len(), 5);
    assert!(bare[3].is_null());
    assert!(bare[4].is_null());

    let full = records[1].as_list();
    assert_eq!(full[3].as_int(), 42);
    assert_eq!(full[4].as_str(), "chng");

    assert_eq!(header.device_id, "test-device");
    assert_eq!(header.log_params, params);
    let field_names: Vec<&str> = header
        .fields
        .iter()
        .map(|f| f.get("name").as_str())
        .collect();
    assert_eq!(
        field_names,
        vec!["timestamp", "path", "value", "shortTime", "domain"]
    );
}

/// Snapshot records count toward the record cap.
#[test]
fn test_snapshot_counts_toward_cap() {
    let temp_dir = TempDir::new().unwrap();
    write_journal_file(
        temp_dir.path(),
        100,
        &[entry("a", 1, 100), entry("b", 2, 110), entry("c", 3, 120)],
    );
    write_journal_file(temp_dir.path(), 500, &[entry("a", 9, 500)]);

    let mut journal = journal_over(temp_dir.path());
    let params = GetLogParams {
        max_record_count: 2,
        with_paths_dict: false,
        ..GetLogParams::default()
    }
    .with_since(300)
    .with_snapshot(true);
    let (header, records) = journal.get_log(&params).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(header.record_count, 2);
    // both emitted records are snapshot entries stamped at since
    assert!(records.iter().all(|r| record_msec(r) == 300));
}
