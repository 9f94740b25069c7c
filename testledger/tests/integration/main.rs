// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for testledger.
//!
//! These exercise the public API end to end: history files on disk, result
//! directories fed through the readers, and shard dumps merged through zip
//! archives.

mod history_log;
mod merge;
mod store;

use testledger::{config::StoreConfig, reader::ReaderContext, store::TestResultStore};
use testledger_metadata::{HistoryDataPoint, RawTestResult, TestStatus};
use tracing_subscriber::filter::LevelFilter;

/// Creates a history entry whose name identifies it in assertions.
fn entry(name: &str) -> HistoryDataPoint {
    HistoryDataPoint::new(name, 0)
}

fn entry_names(entries: &[HistoryDataPoint]) -> Vec<&str> {
    entries.iter().map(|entry| entry.name.as_str()).collect()
}

fn raw_result(test_id: &str, start: Option<i64>) -> RawTestResult {
    RawTestResult {
        test_id: Some(test_id.to_owned()),
        full_name: Some(format!("integration::{test_id}")),
        status: Some(TestStatus::Passed),
        start,
        ..Default::default()
    }
}

/// Routes store logs through the test harness. Only the first call installs
/// the subscriber.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

fn started_store(config: StoreConfig) -> TestResultStore {
    init_logging();
    let mut store = TestResultStore::new(config);
    store.start().expect("new store can be started");
    store
}

fn context() -> ReaderContext {
    ReaderContext::new("integration")
}
