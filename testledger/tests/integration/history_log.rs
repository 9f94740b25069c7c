// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{entry, entry_names};
use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use proptest::prelude::*;
use std::fs;
use test_case::test_case;
use test_strategy::proptest;
use testledger::{errors::HistoryLogError, history::HistoryLog};
use testledger_metadata::HistoryDataPoint;

/// Serializes an entry the way the log stores it.
fn line(entry: &HistoryDataPoint) -> Vec<u8> {
    let mut line = serde_json::to_vec(entry).expect("entry serializes");
    line.push(b'\n');
    line
}

fn read_all(path: &Utf8Path) -> Vec<String> {
    let mut log = HistoryLog::new(path, None).expect("no limit is valid");
    entry_names(log.read_history().expect("history is readable"))
        .into_iter()
        .map(str::to_owned)
        .collect()
}

#[test]
fn round_trip() -> color_eyre::Result<()> {
    let dir = Utf8TempDir::new()?;
    let path = dir.path().join("history.jsonl");

    let mut log = HistoryLog::new(&path, None)?;
    let names: Vec<String> = (1..=6).map(|i| format!("run {i}")).collect();
    for name in &names {
        log.append_history(entry(name))?;
    }

    assert_eq!(read_all(&path), names);
    Ok(())
}

#[test_case(0, &[]; "zero keeps nothing")]
#[test_case(1, &["run 5"]; "one keeps the newest")]
#[test_case(3, &["run 3", "run 4", "run 5"]; "three keeps the newest three")]
#[test_case(10, &["run 1", "run 2", "run 3", "run 4", "run 5"]; "more than written keeps everything")]
fn limit_laws(limit: i64, expected: &[&str]) -> color_eyre::Result<()> {
    let dir = Utf8TempDir::new()?;
    let path = dir.path().join("history.jsonl");

    let mut log = HistoryLog::new(&path, Some(limit))?;
    for i in 1..=5 {
        log.append_history(entry(&format!("run {i}")))?;
    }

    assert_eq!(read_all(&path), expected);
    assert_eq!(entry_names(log.read_history()?), expected);
    if limit == 0 {
        assert_eq!(fs::metadata(&path)?.len(), 0);
    }
    Ok(())
}

#[test]
fn read_then_rotate_scenario() -> color_eyre::Result<()> {
    let dir = Utf8TempDir::new()?;
    let path = dir.path().join("history.jsonl");
    let entries: Vec<_> = (1..=4).map(|i| entry(&format!("Entry {i}"))).collect();
    fs::write(
        &path,
        [line(&entries[0]), line(&entries[1]), line(&entries[2])].concat(),
    )?;

    let mut log = HistoryLog::new(&path, Some(2))?;
    assert_eq!(log.read_history()?, &entries[1..3]);

    log.append_history(entries[3].clone())?;
    assert_eq!(read_all(&path), ["Entry 3", "Entry 4"]);
    assert_eq!(log.read_history()?, &entries[2..4]);
    assert_eq!(
        fs::read(&path)?,
        [line(&entries[2]), line(&entries[3])].concat()
    );
    Ok(())
}

#[test]
fn rotation_preserves_invalid_utf8() -> color_eyre::Result<()> {
    let dir = Utf8TempDir::new()?;
    let path = dir.path().join("history.jsonl");

    let dropped = entry("dropped");
    let kept = entry("kept");
    let new = entry("new");
    let garbage = b"{\"name\": \"\xff\xfe\xc0 not utf-8\"}\n".to_vec();
    let also_garbage = b"\x80\x81\x82\n".to_vec();
    fs::write(
        &path,
        [line(&dropped), garbage.clone(), line(&kept), also_garbage.clone()].concat(),
    )?;

    let mut log = HistoryLog::new(&path, Some(4))?;
    log.append_history(new.clone())?;

    let expected = [garbage, line(&kept), also_garbage, line(&new)].concat();
    assert_eq!(fs::read(&path)?, expected);
    // Undecodable lines are skipped when reading.
    assert_eq!(read_all(&path), ["kept", "new"]);
    Ok(())
}

#[test]
fn cached_reads_survive_file_deletion() -> color_eyre::Result<()> {
    let dir = Utf8TempDir::new()?;
    let path = dir.path().join("history.jsonl");
    fs::write(&path, [line(&entry("a")), line(&entry("b"))].concat())?;

    let mut log = HistoryLog::new(&path, None)?;
    let first = log.read_history()?.to_vec();
    fs::remove_file(&path)?;
    let second = log.read_history()?.to_vec();
    assert_eq!(first, second);
    assert_eq!(entry_names(&second), ["a", "b"]);
    Ok(())
}

#[test]
fn missing_file_and_invalid_limit() -> color_eyre::Result<()> {
    let dir = Utf8TempDir::new()?;
    let path = dir.path().join("does-not-exist.jsonl");

    let mut log = HistoryLog::new(&path, Some(3))?;
    assert!(log.read_history()?.is_empty());
    assert!(!path.exists());

    let error = HistoryLog::new(&path, Some(-1)).unwrap_err();
    assert!(
        matches!(error, HistoryLogError::InvalidLimit { limit: -1 }),
        "unexpected error: {error}"
    );
    Ok(())
}

#[proptest(cases = 64)]
fn appends_keep_the_newest_entries(
    #[strategy(0usize..12)] count: usize,
    #[strategy(proptest::option::of(0i64..6))] limit: Option<i64>,
) {
    let dir = Utf8TempDir::new().unwrap();
    let path = dir.path().join("history.jsonl");

    let mut log = HistoryLog::new(&path, limit).unwrap();
    let names: Vec<String> = (0..count).map(|i| format!("run {i}")).collect();
    for name in &names {
        log.append_history(entry(name)).unwrap();
    }

    let keep = limit.map_or(count, |limit| count.min(limit as usize));
    let expected = &names[count - keep..];
    prop_assert_eq!(read_all(&path), expected);
    prop_assert_eq!(entry_names(log.read_history().unwrap()), expected);
}
