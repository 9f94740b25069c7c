// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{context, raw_result, started_store};
use camino_tempfile::Utf8TempDir;
use proptest::prelude::*;
use std::collections::HashMap;
use test_strategy::proptest;
use testledger::{
    config::StoreConfig,
    dump_archive::{read_dump_archive, write_dump_archive},
    reader::ResultsVisitor,
    result_file::ResultFile,
    store::{TestResultFilter, TestResultStore},
};
use testledger_metadata::{RawAttachmentStep, RawStep, StoreDump, TestResultId};

fn shard(attempts: &[(u8, i64)]) -> TestResultStore {
    let mut store = started_store(StoreConfig::default());
    for (test, start) in attempts {
        store
            .visit_test_result(raw_result(&format!("test-{test}"), Some(*start)), &context())
            .unwrap();
    }
    store
}

fn restored(dumps: impl IntoIterator<Item = StoreDump>) -> TestResultStore {
    let mut store = started_store(StoreConfig::default());
    for dump in dumps {
        store.restore_state(dump, HashMap::new()).unwrap();
    }
    store
}

/// Visible result IDs, sorted.
fn visible_ids(store: &TestResultStore) -> Vec<TestResultId> {
    let mut ids: Vec<_> = store
        .all_test_results(&TestResultFilter::new())
        .unwrap()
        .into_iter()
        .map(|result| result.id)
        .collect();
    ids.sort();
    ids
}

/// Visible (history ID, start) pairs, sorted.
fn visible(store: &TestResultStore) -> Vec<(String, Option<i64>)> {
    let mut visible: Vec<_> = store
        .all_test_results(&TestResultFilter::new())
        .unwrap()
        .into_iter()
        .map(|result| (result.history_id.clone().unwrap(), result.start))
        .collect();
    visible.sort();
    visible
}

#[test]
fn shards_through_archives() -> color_eyre::Result<()> {
    let dir = Utf8TempDir::new()?;

    let mut first = shard(&[(0, 10), (1, 10)]);
    let mut second = shard(&[(0, 20)]);
    let mut with_attachment = raw_result("test-2", Some(5));
    with_attachment.steps = vec![RawStep::Attachment(RawAttachmentStep {
        name: Some("trace".to_owned()),
        original_file_name: "trace.json".to_owned(),
        content_type: None,
    })];
    let attached = second.visit_test_result(with_attachment, &context())?;
    second.visit_attachment_file(ResultFile::from_bytes("trace.json", r#"{"spans": []}"#))?;
    first.done()?;
    second.done()?;

    let mut archives = Vec::new();
    for (index, store) in [&first, &second].into_iter().enumerate() {
        let path = dir.path().join(format!("shard-{index}.zip"));
        write_dump_archive(&path, &store.dump_state()?, store.all_attachment_contents()?)?;
        archives.push(path);
    }

    let mut merged = started_store(StoreConfig::default());
    for path in archives.iter().rev() {
        let (dump, contents) = read_dump_archive(path)?;
        merged.restore_state(dump, contents)?;
    }
    merged.done()?;

    let all = shard(&[(0, 10), (1, 10), (0, 20), (2, 5)]);
    assert_eq!(visible(&merged), visible(&all));
    assert_eq!(
        merged
            .all_test_results(&TestResultFilter::new().with_hidden())?
            .len(),
        4
    );

    let links = merged.attachments_by_test_result(attached)?;
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].content_type.as_deref(), Some("application/json"));
    let content = merged
        .attachment_content(&links[0].id)?
        .expect("attachment content was carried over");
    assert_eq!(content.original_file_name(), "trace.json");
    assert_eq!(&content.read_all()?[..], br#"{"spans": []}"#);
    Ok(())
}

#[test]
fn restoring_into_a_populated_store() -> color_eyre::Result<()> {
    let mut live = shard(&[(0, 50)]);
    let dump = shard(&[(0, 10), (0, 100), (1, 0)]).dump_state()?;
    live.restore_state(dump, HashMap::new())?;

    let starts: Vec<_> = visible(&live).into_iter().map(|(_, start)| start).collect();
    assert_eq!(starts.len(), 2);
    assert!(starts.contains(&Some(100)));
    assert!(starts.contains(&Some(0)));
    assert_eq!(live.statistic(None)?.retries, 1);
    Ok(())
}

#[test]
fn tied_starts_across_shards() -> color_eyre::Result<()> {
    let first = shard(&[(0, 100)]).dump_state()?;
    let second = shard(&[(0, 100)]).dump_state()?;
    let winner = first
        .test_results
        .keys()
        .chain(second.test_results.keys())
        .max()
        .copied();

    let forward = restored([first.clone(), second.clone()]);
    let backward = restored([second, first]);
    assert_eq!(visible_ids(&forward), Vec::from_iter(winner));
    assert_eq!(visible_ids(&backward), visible_ids(&forward));
    Ok(())
}

/// One attempt: (test index, start, lands in shard "a"). Starts repeat often.
type ShardedAttempt = (u8, i64, bool);

#[proptest(cases = 64)]
fn merge_order_does_not_matter(
    #[strategy(proptest::collection::vec((0u8..4, 0i64..6, any::<bool>()), 1..16))]
    attempts: Vec<ShardedAttempt>,
) {
    let mut a = Vec::new();
    let mut b = Vec::new();
    for (test, start, in_a) in &attempts {
        if *in_a {
            a.push((*test, *start));
        } else {
            b.push((*test, *start));
        }
    }
    let all: Vec<_> = a.iter().chain(&b).copied().collect();

    let dump_a = shard(&a).dump_state().unwrap();
    let dump_b = shard(&b).dump_state().unwrap();
    let ab = restored([dump_a.clone(), dump_b.clone()]);
    let ba = restored([dump_b, dump_a]);
    let single = shard(&all);

    prop_assert_eq!(visible_ids(&ab), visible_ids(&ba));
    // Ties may pick different attempts, but always one with the latest start.
    prop_assert_eq!(visible(&ab), visible(&single));
}
