// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    SessionState,
    indices::{StoreIndices, TieBreak, push_unique},
    normalize::{display_name, duration, history_id, test_case_id},
};
use crate::{
    bus::RealtimeBus,
    classify::{DefaultTransitionClassifier, TransitionClassifier},
    config::StoreConfig,
    errors::{StoreError, StoreStateError},
    reader::{ReaderContext, ResultsVisitor},
    result_file::ResultFile,
};
use debug_ignore::DebugIgnore;
use indexmap::{IndexMap, IndexSet};
use std::collections::{BTreeMap, HashMap};
use testledger_metadata::{
    AttachmentLink, ExitCode, HistoryDataPoint, HistoryTestResult, KnownTestFailure,
    QualityGateValidationResult, RawGlobals, RawMetadata, RawTestFixtureResult, RawTestResult,
    TestError, TestFixtureResult, TestFixtureResultId, TestResult, TestResultId,
};
use tracing::debug;

/// The canonical state of one report-generation run.
///
/// See the [module documentation](super) for the retry and session rules.
#[derive(Debug)]
pub struct TestResultStore {
    pub(super) config: StoreConfig,
    pub(super) state: SessionState,
    /// Past runs, oldest first.
    pub(super) history: Vec<HistoryDataPoint>,
    pub(super) classifier: DebugIgnore<Box<dyn TransitionClassifier>>,
    pub(super) bus: RealtimeBus,

    pub(super) test_results: IndexMap<TestResultId, TestResult>,
    pub(super) fixtures: IndexMap<TestFixtureResultId, TestFixtureResult>,
    pub(super) attachments: IndexMap<String, AttachmentLink>,
    pub(super) attachment_contents: HashMap<String, ResultFile>,
    pub(super) environments: IndexSet<String>,
    pub(super) global_errors: Vec<TestError>,
    pub(super) global_attachment_ids: Vec<String>,
    pub(super) exit_code: Option<ExitCode>,
    pub(super) quality_gate_results: Vec<QualityGateValidationResult>,
    pub(super) metadata: BTreeMap<String, serde_json::Value>,
    pub(super) known_failures: Vec<KnownTestFailure>,
    pub(super) indices: StoreIndices,
}

impl TestResultStore {
    /// Creates an empty store that hasn't been started.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            state: SessionState::NotStarted,
            history: Vec::new(),
            classifier: DebugIgnore(Box::new(DefaultTransitionClassifier)),
            bus: RealtimeBus::new(),
            test_results: IndexMap::new(),
            fixtures: IndexMap::new(),
            attachments: IndexMap::new(),
            attachment_contents: HashMap::new(),
            environments: IndexSet::new(),
            global_errors: Vec::new(),
            global_attachment_ids: Vec::new(),
            exit_code: None,
            quality_gate_results: Vec::new(),
            metadata: BTreeMap::new(),
            known_failures: Vec::new(),
            indices: StoreIndices::default(),
        }
    }

    /// Sets the history that results are classified against, oldest first,
    /// as returned by [`HistoryLog::read_history`](crate::history::HistoryLog::read_history).
    pub fn with_history(mut self, history: Vec<HistoryDataPoint>) -> Self {
        self.history = history;
        self
    }

    /// Replaces the [`DefaultTransitionClassifier`].
    pub fn with_classifier(mut self, classifier: Box<dyn TransitionClassifier>) -> Self {
        self.classifier = DebugIgnore(classifier);
        self
    }

    /// Sets the known failures.
    pub fn with_known_issues(mut self, known_failures: Vec<KnownTestFailure>) -> Self {
        for failure in known_failures {
            self.add_known_failure(failure);
        }
        self
    }

    /// The configuration this store was created with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The realtime bus, for subscribing to ingestion events.
    pub fn bus_mut(&mut self) -> &mut RealtimeBus {
        &mut self.bus
    }

    /// Starts the session, enabling ingestion and queries.
    pub fn start(&mut self) -> Result<(), StoreStateError> {
        if self.state != SessionState::NotStarted {
            return Err(StoreStateError::new("start session", self.state));
        }
        debug!("store session started");
        self.state = SessionState::Active;
        Ok(())
    }

    /// Ends the session. Queries keep working; ingestion is rejected.
    pub fn done(&mut self) -> Result<(), StoreStateError> {
        self.ensure_active("finish session")?;
        debug!(
            "store session done with {} results, {} fixtures, {} attachments",
            self.test_results.len(),
            self.fixtures.len(),
            self.attachments.len(),
        );
        let unresolved: usize = self
            .indices
            .pending_fixtures_by_uuid
            .values()
            .map(Vec::len)
            .sum();
        if unresolved > 0 {
            debug!("{unresolved} fixture references never matched a result");
        }
        self.state = SessionState::Done;
        Ok(())
    }

    pub(super) fn ensure_active(&self, operation: &'static str) -> Result<(), StoreStateError> {
        match self.state {
            SessionState::Active => Ok(()),
            state => Err(StoreStateError::new(operation, state)),
        }
    }

    pub(super) fn ensure_started(&self, operation: &'static str) -> Result<(), StoreStateError> {
        match self.state {
            SessionState::Active | SessionState::Done => Ok(()),
            state => Err(StoreStateError::new(operation, state)),
        }
    }

    pub(super) fn add_known_failure(&mut self, failure: KnownTestFailure) {
        let index = self.known_failures.len();
        self.indices
            .known_failures_by_history_id
            .entry(failure.history_id.clone())
            .or_default()
            .push(index);
        self.known_failures.push(failure);
    }

    /// Returns past results sharing `history_id`, newest first.
    pub(super) fn history_for(&self, history_id: &str) -> Vec<HistoryTestResult> {
        self.history
            .iter()
            .rev()
            .filter_map(|point| point.test_results.get(history_id))
            .cloned()
            .collect()
    }

    fn normalize_test_result(&mut self, raw: RawTestResult, context: &ReaderContext) -> TestResult {
        let RawTestResult {
            uuid: _,
            name,
            full_name,
            test_id,
            status,
            error,
            start,
            stop,
            duration: explicit_duration,
            mut labels,
            parameters,
            links,
            steps,
            muted,
        } = raw;

        self.config.apply_default_labels(&mut labels);
        let steps = self.normalize_steps(steps);

        let mut result = TestResult {
            id: TestResultId::new_v4(),
            name: display_name(name, full_name.as_deref()),
            test_case_id: test_case_id(test_id.as_deref(), full_name.as_deref()),
            history_id: history_id(test_id.as_deref(), full_name.as_deref(), &parameters),
            full_name,
            environment: String::new(),
            status: status.unwrap_or_default(),
            error,
            start,
            stop,
            duration: duration(explicit_duration, start, stop),
            labels,
            parameters,
            links,
            steps,
            hidden: false,
            flaky: false,
            muted,
            transition: None,
            source_metadata: context.to_source_metadata(),
        };
        result.environment = self.config.resolve_environment(&result).to_owned();

        if let Some(history_id) = &result.history_id {
            let history = self.history_for(history_id);
            let classification = self.classifier.classify(&result, &history);
            result.transition = classification.transition;
            result.flaky = classification.flaky;
        }
        result
    }
}

impl ResultsVisitor for TestResultStore {
    fn visit_test_result(
        &mut self,
        raw: RawTestResult,
        context: &ReaderContext,
    ) -> Result<TestResultId, StoreError> {
        self.ensure_active("visit test result")?;

        let uuid = raw.uuid.clone();
        let result = self.normalize_test_result(raw, context);
        let id = result.id;
        self.environments.insert(result.environment.clone());
        self.indices.index_test_result(&result);
        self.test_results.insert(id, result);
        self.indices
            .record_attempt(&mut self.test_results, id, TieBreak::KeepCurrent);
        if let Some(uuid) = uuid {
            self.indices.link_result_uuid(&mut self.fixtures, uuid, id);
        }

        self.bus.test_results.publish(&id);
        Ok(id)
    }

    fn visit_test_fixture_result(
        &mut self,
        raw: RawTestFixtureResult,
        context: &ReaderContext,
    ) -> Result<TestFixtureResultId, StoreError> {
        self.ensure_active("visit fixture")?;

        let RawTestFixtureResult {
            fixture_type,
            test_result_ids,
            name,
            status,
            error,
            start,
            stop,
            duration: explicit_duration,
            steps,
        } = raw;

        let mut resolved = Vec::new();
        let mut pending = Vec::new();
        for uuid in test_result_ids {
            match self.indices.test_results_by_uuid.get(&uuid) {
                Some(id) if resolved.contains(id) => {}
                Some(id) => resolved.push(*id),
                None => pending.push(uuid),
            }
        }
        let steps = self.normalize_steps(steps);

        let fixture = TestFixtureResult {
            id: TestFixtureResultId::new_v4(),
            test_result_ids: resolved,
            fixture_type,
            name: name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "Unknown fixture".to_owned()),
            status: status.unwrap_or_default(),
            error,
            start,
            stop,
            duration: duration(explicit_duration, start, stop),
            steps,
            source_metadata: context.to_source_metadata(),
        };
        let id = fixture.id;
        self.indices.index_fixture(&fixture);
        self.fixtures.insert(id, fixture);
        for uuid in pending {
            debug!("fixture {id} refers to result `{uuid}`, which hasn't arrived yet");
            push_unique(&mut self.indices.pending_fixtures_by_uuid, uuid, id);
        }

        self.bus.fixtures.publish(&id);
        Ok(id)
    }

    fn visit_attachment_file(&mut self, file: ResultFile) -> Result<(), StoreError> {
        self.ensure_active("visit attachment file")?;
        let id = self.attach_file(file)?;
        self.bus.attachment_files.publish(&id);
        Ok(())
    }

    fn visit_metadata(&mut self, metadata: RawMetadata) -> Result<(), StoreError> {
        self.ensure_active("visit metadata")?;
        self.metadata.extend(metadata.0);
        Ok(())
    }

    fn visit_globals(&mut self, globals: RawGlobals) -> Result<(), StoreError> {
        self.ensure_active("visit globals")?;

        for error in globals.errors {
            self.bus.global_errors.publish(&error);
            self.global_errors.push(error);
        }
        for attachment in globals.attachments {
            let id = self.link_attachment(attachment);
            if !self.global_attachment_ids.contains(&id) {
                self.global_attachment_ids.push(id.clone());
            }
            self.bus.global_attachments.publish(&id);
        }
        Ok(())
    }

    fn visit_exit_code(&mut self, exit_code: ExitCode) -> Result<(), StoreError> {
        self.ensure_active("visit exit code")?;
        self.exit_code = Some(exit_code);
        self.bus.exit_code.publish(&exit_code);
        Ok(())
    }

    fn visit_quality_gate_results(
        &mut self,
        results: Vec<QualityGateValidationResult>,
    ) -> Result<(), StoreError> {
        self.ensure_active("visit quality gate results")?;
        self.bus.quality_gate_results.publish(&results);
        self.quality_gate_results.extend(results);
        Ok(())
    }
}
