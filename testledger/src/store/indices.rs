// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Derived lookups over the store's canonical collections.
//!
//! Every entry refers to an ID present in the corresponding collection.
//! Indices are only ever updated incrementally as entities are inserted.

use indexmap::IndexMap;
use std::{collections::HashMap, hash::Hash};
use testledger_metadata::{TestFixtureResult, TestFixtureResultId, TestResult, TestResultId};
use tracing::debug;

/// Identifies the attempts of one logical test within one environment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(super) struct AttemptKey {
    pub(super) environment: String,
    pub(super) history_id: String,
}

impl AttemptKey {
    pub(super) fn of(result: &TestResult) -> Option<Self> {
        Some(Self {
            environment: result.environment.clone(),
            history_id: result.history_id.clone()?,
        })
    }
}

/// How [`StoreIndices::record_attempt`] settles attempts with equal starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum TieBreak {
    /// The current visible attempt stays visible. Used for live ingestion.
    KeepCurrent,

    /// The attempt with the greater ID wins, so that merging dumps yields the
    /// same visible attempt in any order.
    GreaterId,
}

#[derive(Debug, Default)]
pub(super) struct StoreIndices {
    pub(super) test_results_by_test_case_id: HashMap<String, Vec<TestResultId>>,
    pub(super) test_results_by_history_id: HashMap<String, Vec<TestResultId>>,
    /// The visible attempt for each key.
    pub(super) latest_test_results: HashMap<AttemptKey, TestResultId>,
    pub(super) attachments_by_test_result: HashMap<TestResultId, Vec<String>>,
    pub(super) attachments_by_fixture: HashMap<TestFixtureResultId, Vec<String>>,
    pub(super) fixtures_by_test_result: HashMap<TestResultId, Vec<TestFixtureResultId>>,
    /// Positions in the store's known failure list.
    pub(super) known_failures_by_history_id: HashMap<String, Vec<usize>>,
    /// Results by the reporter-assigned UUID that fixtures refer to.
    pub(super) test_results_by_uuid: HashMap<String, TestResultId>,
    /// Fixtures waiting for a result with the given UUID to arrive.
    pub(super) pending_fixtures_by_uuid: HashMap<String, Vec<TestFixtureResultId>>,
}

impl StoreIndices {
    /// Adds `result` to every index except the latest-attempt one.
    pub(super) fn index_test_result(&mut self, result: &TestResult) {
        if let Some(test_case_id) = &result.test_case_id {
            push_unique(
                &mut self.test_results_by_test_case_id,
                test_case_id.clone(),
                result.id,
            );
        }
        if let Some(history_id) = &result.history_id {
            push_unique(
                &mut self.test_results_by_history_id,
                history_id.clone(),
                result.id,
            );
        }
        for link_id in result.attachment_link_ids() {
            push_unique(
                &mut self.attachments_by_test_result,
                result.id,
                link_id.to_owned(),
            );
        }
    }

    /// Adds `fixture` to the fixture indices.
    ///
    /// The caller guarantees that every ID in `fixture.test_result_ids` refers
    /// to a stored result.
    pub(super) fn index_fixture(&mut self, fixture: &TestFixtureResult) {
        for link_id in fixture.attachment_link_ids() {
            push_unique(
                &mut self.attachments_by_fixture,
                fixture.id,
                link_id.to_owned(),
            );
        }
        for test_result_id in &fixture.test_result_ids {
            push_unique(
                &mut self.fixtures_by_test_result,
                *test_result_id,
                fixture.id,
            );
        }
    }

    /// Records the reporter-assigned UUID of a newly inserted result, and
    /// links any fixtures that referred to it before it arrived.
    ///
    /// The first result with a given UUID keeps it.
    pub(super) fn link_result_uuid(
        &mut self,
        fixtures: &mut IndexMap<TestFixtureResultId, TestFixtureResult>,
        uuid: String,
        id: TestResultId,
    ) {
        if self.test_results_by_uuid.contains_key(&uuid) {
            debug!("result UUID `{uuid}` was already seen, keeping the first result");
            return;
        }
        let pending = self
            .pending_fixtures_by_uuid
            .remove(&uuid)
            .unwrap_or_default();
        self.test_results_by_uuid.insert(uuid, id);

        for fixture_id in pending {
            if let Some(fixture) = fixtures.get_mut(&fixture_id)
                && !fixture.test_result_ids.contains(&id)
            {
                fixture.test_result_ids.push(id);
            }
            push_unique(&mut self.fixtures_by_test_result, id, fixture_id);
        }
    }

    /// Applies the retry rule to a newly inserted result.
    ///
    /// The visible attempt for the result's (environment, history ID) is the
    /// one with the greatest start time, where an unset start sorts earliest.
    /// Ties are settled by `tie_break`. The losing attempt is marked hidden.
    ///
    /// Results without a history ID are never hidden.
    pub(super) fn record_attempt(
        &mut self,
        results: &mut IndexMap<TestResultId, TestResult>,
        id: TestResultId,
        tie_break: TieBreak,
    ) {
        let Some(candidate) = results.get(&id) else {
            return;
        };
        let Some(key) = AttemptKey::of(candidate) else {
            set_hidden(results, id, false);
            return;
        };
        let candidate_start = candidate.start;

        match self.latest_test_results.get(&key).copied() {
            Some(current) if current == id => set_hidden(results, id, false),
            Some(current) => {
                let current_start = results.get(&current).and_then(|result| result.start);
                let replaces = match tie_break {
                    TieBreak::KeepCurrent => candidate_start > current_start,
                    TieBreak::GreaterId => (candidate_start, id) > (current_start, current),
                };
                if replaces {
                    set_hidden(results, current, true);
                    set_hidden(results, id, false);
                    self.latest_test_results.insert(key, id);
                } else {
                    set_hidden(results, id, true);
                }
            }
            None => {
                set_hidden(results, id, false);
                self.latest_test_results.insert(key, id);
            }
        }
    }
}

fn set_hidden(results: &mut IndexMap<TestResultId, TestResult>, id: TestResultId, hidden: bool) {
    if let Some(result) = results.get_mut(&id) {
        result.hidden = hidden;
    }
}

/// Appends `value` to the list at `key` unless it is already present.
pub(super) fn push_unique<K, V>(map: &mut HashMap<K, Vec<V>>, key: K, value: V)
where
    K: Eq + Hash,
    V: PartialEq,
{
    let values = map.entry(key).or_default();
    if !values.contains(&value) {
        values.push(value);
    }
}
