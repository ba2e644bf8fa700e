//! On-disk record store and comment-delta detection.
//!
//! The store is one JSON array of records, overwritten per run. Change
//! detection keys both runs by week number and reports comment-count
//! deltas for weeks present in both.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::engine::Record;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store I/O: {0}")]
    Io(#[from] io::Error),
    #[error("record store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load a previously saved record list; a missing file is the empty list.
pub fn load_records(path: &Path) -> Result<Vec<Record>, StoreError> {
    if !path.is_file() {
        debug!(path = %path.display(), "no existing record store");
        return Ok(Vec::new());
    }
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Overwrite the record store with the given list.
pub fn save_records(path: &Path, records: &[Record]) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, json)?;
    Ok(())
}

/// Per-week comment-count deltas against a previous run.
///
/// Weeks absent from the previous record are ignored: only tracks already
/// recorded can have *new* comments. Records without week or comment
/// fields never take part.
pub fn new_comments(current: &[Record], previous: &[Record]) -> BTreeMap<i64, i64> {
    let old = week_index(previous);
    let mut deltas = BTreeMap::new();
    for (week, count) in week_index(current) {
        if let Some(before) = old.get(&week) {
            let delta = count - before;
            if delta != 0 {
                deltas.insert(week, delta);
            }
        }
    }
    deltas
}

fn week_index(records: &[Record]) -> BTreeMap<i64, i64> {
    records
        .iter()
        .filter_map(|r| Some((r.int_field("week")?, r.int_field("comments")?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn track(id: &str, week: i64, comments: i64) -> Record {
        let mut record = Record::new(id);
        record.fields.insert("week".into(), Value::from(week));
        record
            .fields
            .insert("comments".into(), Value::from(comments));
        record
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.json");
        let records = vec![track("p1", 1, 4), track("p2", 2, 0)];
        save_records(&path, &records).unwrap();
        assert_eq!(load_records(&path).unwrap(), records);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_records(&dir.path().join("absent.json"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            load_records(&path).unwrap_err(),
            StoreError::Json(_)
        ));
    }

    #[test]
    fn test_new_comments_reports_deltas() {
        let previous = vec![track("p1", 1, 4), track("p2", 2, 2)];
        let current = vec![
            track("p1", 1, 6),  // +2
            track("p2", 2, 2),  // unchanged
            track("p3", 3, 10), // not previously recorded
        ];
        let deltas = new_comments(&current, &previous);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas.get(&1), Some(&2));
    }

    #[test]
    fn test_records_without_counts_are_skipped() {
        let previous = vec![track("p1", 1, 4)];
        let mut bare = Record::new("p1");
        bare.fields.insert("week".into(), Value::from(1));
        assert!(new_comments(&[bare], &previous).is_empty());
    }
}
