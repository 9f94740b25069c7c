// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{context, raw_result, started_store};
use camino_tempfile::Utf8TempDir;
use indoc::indoc;
use proptest::prelude::*;
use std::{
    collections::BTreeMap,
    fs,
    sync::{Arc, Mutex},
};
use test_strategy::proptest;
use testledger::{
    config::{LabelMatcher, StoreConfig},
    reader::{FileDisposition, RawJsonReader, ResultsReader, ResultsVisitor, read_result_file},
    result_file::ResultFile,
    store::{AttachmentFilter, TestResultFilter},
};
use testledger_metadata::{TestLabel, TestStatus};

#[test]
fn results_directory() -> color_eyre::Result<()> {
    let dir = Utf8TempDir::new()?;
    let files = [
        (
            "1-result.json",
            indoc! {r#"
                {
                    "name": "login works",
                    "full-name": "auth::login",
                    "status": "passed",
                    "start": 100,
                    "stop": 180,
                    "labels": [{"name": "browser", "value": "chrome"}],
                    "steps": [
                        {"type": "step", "name": "open page", "status": "passed"},
                        {"type": "attachment", "name": "page", "original-file-name": "page.html"}
                    ]
                }
            "#},
        ),
        (
            "2-result.json",
            indoc! {r#"
                {
                    "full-name": "auth::logout",
                    "status": "failed",
                    "error": {"message": "button not found"},
                    "labels": [{"name": "browser", "value": "firefox"}]
                }
            "#},
        ),
        (
            "run-globals.json",
            indoc! {r#"
                {
                    "errors": [{"message": "driver crashed once"}],
                    "attachments": [{"original-file-name": "run.log"}]
                }
            "#},
        ),
        ("ci-metadata.json", r#"{"branch": "main", "build": 42}"#),
        ("page.html", "<!doctype html><html></html>"),
        ("orphan.bin", "\u{0}\u{1}\u{2}"),
    ];
    for (name, contents) in files {
        fs::write(dir.path().join(name), contents)?;
    }

    let config = StoreConfig::default()
        .with_environment("chrome", LabelMatcher::exact("browser", "chrome"))
        .with_environment("firefox", LabelMatcher::exact("browser", "firefox"));
    let mut store = started_store(config);
    let readers: [&dyn ResultsReader; 1] = [&RawJsonReader];

    let mut dispositions = BTreeMap::new();
    for (name, _) in files {
        let file = ResultFile::from_path(dir.path().join(name));
        dispositions.insert(name, read_result_file(&readers, &mut store, file)?);
    }
    assert_eq!(dispositions["page.html"], FileDisposition::Attachment);
    assert_eq!(
        dispositions["1-result.json"],
        FileDisposition::Read {
            reader_id: RawJsonReader::ID.to_owned()
        }
    );
    store.done()?;

    let results = store.all_test_results(&TestResultFilter::new())?;
    assert_eq!(results.len(), 2);
    let login = results[0];
    assert_eq!(login.name, "login works");
    assert_eq!(login.environment, "chrome");
    assert_eq!(login.duration, Some(80));
    assert_eq!(login.source_metadata.reader_id, RawJsonReader::ID);
    let logout = results[1];
    assert_eq!(logout.name, "logout");
    assert_eq!(logout.environment, "firefox");

    let login_attachments = store.attachments_by_test_result(login.id)?;
    assert_eq!(login_attachments.len(), 1);
    assert_eq!(login_attachments[0].content_type.as_deref(), Some("text/html"));
    assert!(!login_attachments[0].missed);

    let unused = store.all_attachments(&AttachmentFilter {
        include_missed: false,
        include_unused: true,
    })?;
    assert!(
        unused
            .iter()
            .any(|link| link.original_file_name == "orphan.bin" && !link.used)
    );
    let missed = store.all_attachments(&AttachmentFilter {
        include_missed: true,
        include_unused: false,
    })?;
    assert!(
        missed
            .iter()
            .any(|link| link.original_file_name == "run.log" && link.missed)
    );

    assert_eq!(store.global_errors()?.len(), 1);
    assert_eq!(store.global_attachments()?.len(), 1);
    assert_eq!(
        store.metadata_by_key("build")?,
        Some(&serde_json::json!(42))
    );

    let statistic = store.statistic(None)?;
    assert_eq!(statistic.total, 2);
    assert_eq!(statistic.failed, 1);
    assert_eq!(store.statistic_by_environment("firefox")?.failed, 1);
    Ok(())
}

#[test]
fn fixture_read_before_its_result() -> color_eyre::Result<()> {
    let dir = Utf8TempDir::new()?;
    let files = [
        (
            "a-fixture.json",
            indoc! {r#"
                {
                    "type": "before",
                    "name": "start browser",
                    "status": "passed",
                    "test-result-ids": ["3f2a"]
                }
            "#},
        ),
        (
            "b-result.json",
            r#"{"uuid": "3f2a", "test-id": "t", "status": "passed"}"#,
        ),
    ];

    let mut store = started_store(StoreConfig::default());
    let readers: [&dyn ResultsReader; 1] = [&RawJsonReader];
    for (name, contents) in files {
        fs::write(dir.path().join(name), contents)?;
        let file = ResultFile::from_path(dir.path().join(name));
        let disposition = read_result_file(&readers, &mut store, file)?;
        assert!(
            matches!(disposition, FileDisposition::Read { .. }),
            "{name} was read as {disposition:?}"
        );
    }

    let results = store.all_test_results(&TestResultFilter::new())?;
    assert_eq!(results.len(), 1);
    let fixtures = store.fixtures_by_test_result(results[0].id)?;
    assert_eq!(fixtures.len(), 1);
    assert_eq!(fixtures[0].name, "start browser");
    assert_eq!(fixtures[0].test_result_ids, [results[0].id]);
    Ok(())
}

#[test]
fn retried_test_keeps_latest_attempt() -> color_eyre::Result<()> {
    for order in [[Some(1000), Some(0)], [Some(0), Some(1000)]] {
        let mut store = started_store(StoreConfig::default());
        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        store.bus_mut().test_results.subscribe(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        for start in order {
            store.visit_test_result(raw_result("t", start), &context())?;
        }
        assert_eq!(*seen.lock().unwrap(), 2);

        let visible = store.all_test_results(&TestResultFilter::new())?;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].start, Some(1000));

        let hidden = store.all_test_results(&TestResultFilter::new().with_hidden())?;
        let earlier = hidden
            .iter()
            .find(|result| result.start == Some(0))
            .expect("earlier attempt is kept");
        assert!(earlier.hidden);
        assert_eq!(store.statistic(None)?.retries, 1);
    }
    Ok(())
}

#[test]
fn subscriber_failures_do_not_stop_ingestion() -> color_eyre::Result<()> {
    let mut store = started_store(StoreConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    store
        .bus_mut()
        .test_results
        .subscribe(|_| Err("fast-fail monitor is unavailable".into()));
    let sink = seen.clone();
    store.bus_mut().test_results.subscribe(move |id| {
        sink.lock().unwrap().push(*id);
        Ok(())
    });

    let id = store.visit_test_result(raw_result("t", None), &context())?;
    assert_eq!(*seen.lock().unwrap(), [id]);
    assert_eq!(store.bus_mut().test_results.failure_count(), 1);
    Ok(())
}

/// One attempt: (test index, runs in the "b" environment, start, status).
type Attempt = (u8, bool, Option<i64>, TestStatus);

fn attempt_strategy() -> impl Strategy<Value = Attempt> {
    (
        0u8..3,
        any::<bool>(),
        proptest::option::of(0i64..8),
        any::<TestStatus>(),
    )
}

#[proptest(cases = 64)]
fn exactly_one_visible_attempt_per_environment(
    #[strategy(proptest::collection::vec(attempt_strategy(), 1..24))] attempts: Vec<Attempt>,
) {
    let config = StoreConfig::default().with_environment("b", LabelMatcher::exact("env", "b"));
    let mut store = started_store(config);
    for (test, in_b, start, status) in &attempts {
        let mut raw = raw_result(&format!("test-{test}"), *start);
        raw.status = Some(*status);
        if *in_b {
            raw.labels.push(TestLabel::new("env", "b"));
        }
        store.visit_test_result(raw, &context()).unwrap();
    }

    let all = store
        .all_test_results(&TestResultFilter::new().with_hidden())
        .unwrap();
    let mut groups: BTreeMap<(String, String), Vec<_>> = BTreeMap::new();
    for result in all {
        let key = (
            result.environment.clone(),
            result.history_id.clone().unwrap(),
        );
        groups.entry(key).or_default().push(result);
    }

    let statistic = store.statistic(None).unwrap();
    prop_assert_eq!(statistic.total, groups.len());

    for (key, results) in groups {
        let visible: Vec<_> = results.iter().filter(|result| !result.hidden).collect();
        prop_assert_eq!(visible.len(), 1, "group {:?}", key);
        let latest = results.iter().map(|result| result.start).max().flatten();
        prop_assert_eq!(visible[0].start, latest, "group {:?}", key);
    }
}
