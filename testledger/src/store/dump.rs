// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshotting a store and merging snapshots back in.

use super::{
    TestResultStore,
    indices::{TieBreak, push_unique},
};
use crate::{
    errors::{DumpError, StoreStateError},
    result_file::ResultFile,
};
use std::collections::{BTreeMap, HashMap};
use testledger_metadata::{
    DumpIndices, STORE_DUMP_FORMAT_VERSION, StoreDump, TestFixtureResultId, TestResultId,
};
use tracing::debug;

impl TestResultStore {
    /// Captures the store's full state, including hidden attempts.
    ///
    /// Attachment bytes aren't part of the dump; see
    /// [`Self::all_attachment_contents`].
    pub fn dump_state(&self) -> Result<StoreDump, StoreStateError> {
        self.ensure_started("dump store state")?;

        let mut latest_test_results: BTreeMap<String, BTreeMap<String, TestResultId>> =
            BTreeMap::new();
        for (key, id) in &self.indices.latest_test_results {
            latest_test_results
                .entry(key.environment.clone())
                .or_default()
                .insert(key.history_id.clone(), *id);
        }
        let indices = DumpIndices {
            test_results_by_test_case_id: sorted(&self.indices.test_results_by_test_case_id),
            test_results_by_history_id: sorted(&self.indices.test_results_by_history_id),
            latest_test_results,
            attachments_by_test_result: sorted(&self.indices.attachments_by_test_result),
            attachments_by_fixture: sorted(&self.indices.attachments_by_fixture),
            fixtures_by_test_result: sorted(&self.indices.fixtures_by_test_result),
        };

        Ok(StoreDump {
            format_version: STORE_DUMP_FORMAT_VERSION,
            test_results: self
                .test_results
                .iter()
                .map(|(id, result)| (*id, result.clone()))
                .collect(),
            fixtures: self
                .fixtures
                .iter()
                .map(|(id, fixture)| (*id, fixture.clone()))
                .collect(),
            attachments: self
                .attachments
                .iter()
                .map(|(id, link)| (id.clone(), link.clone()))
                .collect(),
            environments: self.environments.iter().cloned().collect(),
            global_errors: self.global_errors.clone(),
            global_attachment_ids: self.global_attachment_ids.clone(),
            exit_code: self.exit_code,
            quality_gate_results: self.quality_gate_results.clone(),
            metadata: self.metadata.clone(),
            known_failures: self.known_failures.clone(),
            indices,
        })
    }

    /// Merges a dump into this store.
    ///
    /// Entities whose IDs are already present are left alone, and index
    /// entries are only ever added. Once everything is inserted, the retry
    /// rule is re-applied to the newly added results in start order. Attempts
    /// with equal starts are settled by ID, so restoring several dumps
    /// converges on the same visible attempts in any order.
    ///
    /// `contents` maps attachment IDs to their bytes, as produced by
    /// [`read_dump_archive`](crate::dump_archive::read_dump_archive).
    ///
    /// The dump is validated before anything is changed: an unsupported
    /// format version or an index entry referring to an unknown ID fails
    /// without modifying the store.
    pub fn restore_state(
        &mut self,
        dump: StoreDump,
        contents: HashMap<String, ResultFile>,
    ) -> Result<(), DumpError> {
        self.ensure_active("restore store state")?;
        self.validate_dump(&dump, &contents)?;

        let StoreDump {
            format_version: _,
            test_results,
            fixtures,
            attachments,
            environments,
            global_errors,
            global_attachment_ids,
            exit_code,
            quality_gate_results,
            metadata,
            known_failures,
            indices,
        } = dump;

        for (id, link) in attachments {
            match self.attachments.get_mut(&id) {
                Some(existing) => existing.merge(&link),
                None => {
                    self.attachments.insert(id, link);
                }
            }
        }
        for (id, file) in contents {
            self.attachment_contents.entry(id).or_insert(file);
        }

        let mut added = Vec::new();
        for (id, result) in test_results {
            if self.test_results.contains_key(&id) {
                continue;
            }
            self.indices.index_test_result(&result);
            added.push((result.start, id));
            self.test_results.insert(id, result);
        }
        for (id, fixture) in fixtures {
            if self.fixtures.contains_key(&id) {
                continue;
            }
            self.indices.index_fixture(&fixture);
            self.fixtures.insert(id, fixture);
        }
        self.append_indices(indices);

        for environment in environments {
            self.environments.insert(environment);
        }
        for result in self.test_results.values() {
            if !self.environments.contains(&result.environment) {
                self.environments.insert(result.environment.clone());
            }
        }

        self.global_errors.extend(global_errors);
        for id in global_attachment_ids {
            if !self.global_attachment_ids.contains(&id) {
                self.global_attachment_ids.push(id);
            }
        }
        if self.exit_code.is_none() {
            self.exit_code = exit_code;
        }
        self.quality_gate_results.extend(quality_gate_results);
        for (key, value) in metadata {
            self.metadata.entry(key).or_insert(value);
        }
        for failure in known_failures {
            if !self.known_failures.contains(&failure) {
                self.add_known_failure(failure);
            }
        }

        // The visible attempt ends up being the greatest by (start, ID), in
        // whatever order dumps are restored.
        added.sort();
        debug!("restoring {} test results from dump", added.len());
        for (_, id) in added {
            self.indices
                .record_attempt(&mut self.test_results, id, TieBreak::GreaterId);
        }
        Ok(())
    }

    fn validate_dump(
        &self,
        dump: &StoreDump,
        contents: &HashMap<String, ResultFile>,
    ) -> Result<(), DumpError> {
        if dump.format_version != STORE_DUMP_FORMAT_VERSION {
            return Err(DumpError::VersionMismatch {
                expected: STORE_DUMP_FORMAT_VERSION,
                actual: dump.format_version,
            });
        }

        let result_known = |id: &&TestResultId| {
            dump.test_results.contains_key(*id) || self.test_results.contains_key(*id)
        };
        let fixture_known = |id: &&TestFixtureResultId| {
            dump.fixtures.contains_key(*id) || self.fixtures.contains_key(*id)
        };
        let attachment_known = |id: &&String| {
            dump.attachments.contains_key(*id) || self.attachments.contains_key(*id)
        };
        let dangling =
            |index: &'static str, id: String| DumpError::DanglingIndexEntry { index, id };

        let indices = &dump.indices;
        for ids in indices
            .test_results_by_test_case_id
            .values()
            .chain(indices.test_results_by_history_id.values())
        {
            if let Some(id) = ids.iter().find(|id| !result_known(id)) {
                return Err(dangling("test-results", id.to_string()));
            }
        }
        for id in indices.latest_test_results.values().flat_map(BTreeMap::values) {
            if !result_known(&id) {
                return Err(dangling("latest-test-results", id.to_string()));
            }
        }
        for (result_id, link_ids) in &indices.attachments_by_test_result {
            if !result_known(&result_id) {
                return Err(dangling("attachments-by-test-result", result_id.to_string()));
            }
            if let Some(id) = link_ids.iter().find(|id| !attachment_known(id)) {
                return Err(dangling("attachments-by-test-result", id.clone()));
            }
        }
        for (fixture_id, link_ids) in &indices.attachments_by_fixture {
            if !fixture_known(&fixture_id) {
                return Err(dangling("attachments-by-fixture", fixture_id.to_string()));
            }
            if let Some(id) = link_ids.iter().find(|id| !attachment_known(id)) {
                return Err(dangling("attachments-by-fixture", id.clone()));
            }
        }
        for (result_id, fixture_ids) in &indices.fixtures_by_test_result {
            if !result_known(&result_id) {
                return Err(dangling("fixtures-by-test-result", result_id.to_string()));
            }
            if let Some(id) = fixture_ids.iter().find(|id| !fixture_known(id)) {
                return Err(dangling("fixtures-by-test-result", id.to_string()));
            }
        }
        for fixture in dump.fixtures.values() {
            if let Some(id) = fixture.test_result_ids.iter().find(|id| !result_known(id)) {
                return Err(dangling("fixture-test-results", id.to_string()));
            }
        }
        if let Some(id) = dump
            .global_attachment_ids
            .iter()
            .find(|id| !attachment_known(id))
        {
            return Err(dangling("global-attachments", id.clone()));
        }
        if let Some(id) = contents.keys().find(|id| !attachment_known(id)) {
            return Err(dangling("attachment-contents", id.clone()));
        }
        Ok(())
    }

    fn append_indices(&mut self, indices: DumpIndices) {
        let DumpIndices {
            test_results_by_test_case_id,
            test_results_by_history_id,
            // Recomputed from the merged results.
            latest_test_results: _,
            attachments_by_test_result,
            attachments_by_fixture,
            fixtures_by_test_result,
        } = indices;

        for (key, ids) in test_results_by_test_case_id {
            for id in ids {
                push_unique(&mut self.indices.test_results_by_test_case_id, key.clone(), id);
            }
        }
        for (key, ids) in test_results_by_history_id {
            for id in ids {
                push_unique(&mut self.indices.test_results_by_history_id, key.clone(), id);
            }
        }
        for (key, ids) in attachments_by_test_result {
            for id in ids {
                push_unique(&mut self.indices.attachments_by_test_result, key, id);
            }
        }
        for (key, ids) in attachments_by_fixture {
            for id in ids {
                push_unique(&mut self.indices.attachments_by_fixture, key, id);
            }
        }
        for (key, ids) in fixtures_by_test_result {
            for id in ids {
                push_unique(&mut self.indices.fixtures_by_test_result, key, id);
            }
        }
    }
}

fn sorted<K: Ord + Clone, V: Clone>(map: &HashMap<K, Vec<V>>) -> BTreeMap<K, Vec<V>> {
    map.iter()
        .map(|(key, values)| (key.clone(), values.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::StoreConfig,
        reader::{ReaderContext, ResultsVisitor},
        store::{SessionState, TestResultFilter, history_id},
    };
    use pretty_assertions::assert_eq;
    use testledger_metadata::{
        ExitCode, FixtureType, RawAttachmentStep, RawStep, RawTestFixtureResult, RawTestResult,
        TestStatus,
    };

    fn started() -> TestResultStore {
        let mut store = TestResultStore::new(StoreConfig::default());
        store.start().unwrap();
        store
    }

    fn shard(attempts: &[(&str, i64)]) -> TestResultStore {
        let mut store = started();
        let context = ReaderContext::new("test");
        for (test_id, start) in attempts {
            store
                .visit_test_result(
                    RawTestResult {
                        test_id: Some((*test_id).to_owned()),
                        status: Some(TestStatus::Passed),
                        start: Some(*start),
                        ..Default::default()
                    },
                    &context,
                )
                .unwrap();
        }
        store
    }

    fn visible_starts(store: &TestResultStore) -> Vec<(String, Option<i64>)> {
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
    fn dump_requires_started_session() {
        let store = TestResultStore::new(StoreConfig::default());
        let error = store.dump_state().unwrap_err();
        assert_eq!(error.state(), SessionState::NotStarted);

        let mut done = started();
        done.done().unwrap();
        let dump = done.dump_state().unwrap();
        assert!(matches!(
            done.restore_state(dump, HashMap::new()),
            Err(DumpError::State(_))
        ));
    }

    #[test]
    fn restore_into_empty_store() {
        let mut source = started();
        let context = ReaderContext::new("test");
        let result_id = source
            .visit_test_result(
                RawTestResult {
                    uuid: Some("r".to_owned()),
                    test_id: Some("t".to_owned()),
                    steps: vec![RawStep::Attachment(RawAttachmentStep {
                        name: None,
                        original_file_name: "log.txt".to_owned(),
                        content_type: None,
                    })],
                    ..Default::default()
                },
                &context,
            )
            .unwrap();
        let fixture_id = source
            .visit_test_fixture_result(
                RawTestFixtureResult {
                    fixture_type: FixtureType::After,
                    test_result_ids: vec!["r".to_owned()],
                    name: None,
                    status: None,
                    error: None,
                    start: None,
                    stop: None,
                    duration: None,
                    steps: Vec::new(),
                },
                &context,
            )
            .unwrap();
        source
            .visit_attachment_file(ResultFile::from_bytes("log.txt", "hello"))
            .unwrap();
        source
            .visit_exit_code(ExitCode {
                original: 0,
                actual: None,
            })
            .unwrap();

        let dump = source.dump_state().unwrap();
        let contents: HashMap<_, _> = source
            .all_attachment_contents()
            .unwrap()
            .map(|(id, file)| (id.to_owned(), file.clone()))
            .collect();

        let mut target = started();
        target.restore_state(dump.clone(), contents).unwrap();
        assert_eq!(target.dump_state().unwrap(), dump);

        let links = target.attachments_by_test_result(result_id).unwrap();
        assert_eq!(links.len(), 1);
        assert!(!links[0].missed);
        assert!(target.attachment_content(&links[0].id).unwrap().is_some());
        assert_eq!(
            target.fixtures_by_test_result(result_id).unwrap()[0].id,
            fixture_id
        );
        assert_eq!(target.exit_code().unwrap().map(|code| code.original), Some(0));
    }

    #[test]
    fn restore_is_idempotent() {
        let source = shard(&[("a", 1), ("a", 2), ("b", 0)]);
        let dump = source.dump_state().unwrap();

        let mut target = started();
        target.restore_state(dump.clone(), HashMap::new()).unwrap();
        target.restore_state(dump, HashMap::new()).unwrap();
        assert_eq!(
            target
                .all_test_results(&TestResultFilter::new().with_hidden())
                .unwrap()
                .len(),
            3
        );
        assert_eq!(visible_starts(&target), visible_starts(&source));
        let history_id = history_id(Some("a"), None, &[]).unwrap();
        assert_eq!(
            target.test_results_by_history_id(&history_id).unwrap().len(),
            2
        );
    }

    #[test]
    fn merge_order_does_not_matter() {
        let a = shard(&[("x", 10), ("y", 3)]).dump_state().unwrap();
        let b = shard(&[("x", 5), ("y", 7), ("z", 1)]).dump_state().unwrap();

        let mut ab = started();
        ab.restore_state(a.clone(), HashMap::new()).unwrap();
        ab.restore_state(b.clone(), HashMap::new()).unwrap();
        let mut ba = started();
        ba.restore_state(b, HashMap::new()).unwrap();
        ba.restore_state(a, HashMap::new()).unwrap();

        let expected = visible_starts(&ab);
        assert_eq!(expected.len(), 3);
        assert_eq!(visible_starts(&ba), expected);
        let mut starts: Vec<_> = expected.into_iter().map(|(_, start)| start).collect();
        starts.sort();
        assert_eq!(starts, [Some(1), Some(7), Some(10)]);
    }

    #[test]
    fn invalid_dumps_leave_store_untouched() {
        let mut target = shard(&[("kept", 0)]);
        let before = target.dump_state().unwrap();

        let mut wrong_version = shard(&[("a", 0)]).dump_state().unwrap();
        wrong_version.format_version = STORE_DUMP_FORMAT_VERSION + 1;
        assert!(matches!(
            target.restore_state(wrong_version, HashMap::new()),
            Err(DumpError::VersionMismatch { actual, .. }) if actual == STORE_DUMP_FORMAT_VERSION + 1
        ));

        let mut dangling = shard(&[("a", 0)]).dump_state().unwrap();
        dangling
            .indices
            .test_results_by_history_id
            .insert("h".to_owned(), vec![TestResultId::new_v4()]);
        assert!(matches!(
            target.restore_state(dangling, HashMap::new()),
            Err(DumpError::DanglingIndexEntry { index: "test-results", .. })
        ));

        let unknown_content = HashMap::from([(
            "nope".to_owned(),
            ResultFile::from_bytes("nope", "bytes"),
        )]);
        assert!(matches!(
            target.restore_state(StoreDump::empty(), unknown_content),
            Err(DumpError::DanglingIndexEntry { index: "attachment-contents", .. })
        ));

        assert_eq!(target.dump_state().unwrap(), before);
    }
}
