// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{TestResultStore, indices::AttemptKey};
use crate::{errors::StoreStateError, result_file::ResultFile};
use debug_ignore::DebugIgnore;
use indexmap::{IndexMap, IndexSet};
use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashSet},
    sync::Arc,
};
use testledger_metadata::{
    AttachmentLink, ExitCode, HistoryDataPoint, HistoryTestResult, KnownTestFailure,
    QualityGateValidationResult, Statistic, TestError, TestFixtureResult, TestFixtureResultId,
    TestResult, TestResultId, TestTransition,
};

type ResultPredicate = dyn Fn(&TestResult) -> bool + Send + Sync;

/// Selects test results in [`TestResultStore::all_test_results`].
///
/// The default selects every visible result.
#[derive(Clone, Debug, Default)]
pub struct TestResultFilter {
    include_hidden: bool,
    environment: Option<String>,
    predicate: Option<DebugIgnore<Arc<ResultPredicate>>>,
}

impl TestResultFilter {
    /// Creates a filter selecting every visible result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also selects hidden attempts.
    pub fn with_hidden(mut self) -> Self {
        self.include_hidden = true;
        self
    }

    /// Restricts the selection to one environment.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Restricts the selection to results matching `predicate`.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TestResult) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(DebugIgnore(Arc::new(predicate)));
        self
    }

    /// Returns true if `result` is selected.
    pub fn matches(&self, result: &TestResult) -> bool {
        (self.include_hidden || !result.hidden)
            && self
                .environment
                .as_deref()
                .is_none_or(|environment| result.environment == environment)
            && self
                .predicate
                .as_ref()
                .is_none_or(|predicate| predicate(result))
    }
}

/// Selects attachments in [`TestResultStore::all_attachments`].
///
/// The default selects attachments that are referenced and whose file has
/// arrived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttachmentFilter {
    /// Also select attachments whose file hasn't arrived.
    pub include_missed: bool,

    /// Also select attachments nothing refers to.
    pub include_unused: bool,
}

impl AttachmentFilter {
    /// Returns true if `link` is selected.
    pub fn matches(&self, link: &AttachmentLink) -> bool {
        (self.include_missed || !link.missed) && (self.include_unused || link.used)
    }
}

/// Visible test results grouped by the values of one label.
#[derive(Clone, Debug, Default)]
pub struct LabelGrouping<'a> {
    /// Results by label value. A result with several values for the label
    /// appears under each of them.
    pub by_value: BTreeMap<String, Vec<&'a TestResult>>,

    /// Results with no value for the label.
    pub without_label: Vec<&'a TestResult>,
}

impl TestResultStore {
    fn visible_results(&self) -> impl Iterator<Item = &TestResult> {
        self.test_results.values().filter(|result| !result.hidden)
    }

    fn results_for<'a>(&'a self, ids: Option<&'a Vec<TestResultId>>) -> Vec<&'a TestResult> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.test_results.get(id))
            .collect()
    }

    fn links_for<'a>(&'a self, ids: Option<&'a Vec<String>>) -> Vec<&'a AttachmentLink> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.attachments.get(id))
            .collect()
    }

    /// Returns the results selected by `filter`, in ingestion order.
    pub fn all_test_results(
        &self,
        filter: &TestResultFilter,
    ) -> Result<Vec<&TestResult>, StoreStateError> {
        self.ensure_started("query test results")?;
        Ok(self
            .test_results
            .values()
            .filter(|result| filter.matches(result))
            .collect())
    }

    /// Looks up a result by ID.
    pub fn test_result_by_id(
        &self,
        id: TestResultId,
    ) -> Result<Option<&TestResult>, StoreStateError> {
        self.ensure_started("query test result")?;
        Ok(self.test_results.get(&id))
    }

    /// Returns every attempt with the given history ID, across environments.
    pub fn test_results_by_history_id(
        &self,
        history_id: &str,
    ) -> Result<Vec<&TestResult>, StoreStateError> {
        self.ensure_started("query test results by history ID")?;
        Ok(self.results_for(self.indices.test_results_by_history_id.get(history_id)))
    }

    /// Returns every attempt with the given test case ID, across parameters
    /// and environments.
    pub fn test_results_by_test_case_id(
        &self,
        test_case_id: &str,
    ) -> Result<Vec<&TestResult>, StoreStateError> {
        self.ensure_started("query test results by test case ID")?;
        Ok(self.results_for(self.indices.test_results_by_test_case_id.get(test_case_id)))
    }

    /// Returns the hidden attempts sharing the environment and history ID of
    /// `id`, latest start first.
    pub fn retries_by_test_result(
        &self,
        id: TestResultId,
    ) -> Result<Vec<&TestResult>, StoreStateError> {
        self.ensure_started("query retries")?;
        let Some(key) = self.test_results.get(&id).and_then(AttemptKey::of) else {
            return Ok(Vec::new());
        };
        let mut retries: Vec<_> = self
            .results_for(self.indices.test_results_by_history_id.get(&key.history_id))
            .into_iter()
            .filter(|result| {
                result.id != id && result.hidden && result.environment == key.environment
            })
            .collect();
        retries.sort_by_key(|result| Reverse(result.start));
        Ok(retries)
    }

    /// Returns the history entries matching the history ID of `id`, newest
    /// first.
    pub fn history_by_test_result(
        &self,
        id: TestResultId,
    ) -> Result<Vec<HistoryTestResult>, StoreStateError> {
        self.ensure_started("query history")?;
        Ok(self
            .test_results
            .get(&id)
            .and_then(|result| result.history_id.as_deref())
            .map(|history_id| self.history_for(history_id))
            .unwrap_or_default())
    }

    /// Returns the attachments selected by `filter`, in the order they were
    /// first seen.
    pub fn all_attachments(
        &self,
        filter: &AttachmentFilter,
    ) -> Result<Vec<&AttachmentLink>, StoreStateError> {
        self.ensure_started("query attachments")?;
        Ok(self
            .attachments
            .values()
            .filter(|link| filter.matches(link))
            .collect())
    }

    /// Looks up an attachment by ID.
    pub fn attachment_by_id(&self, id: &str) -> Result<Option<&AttachmentLink>, StoreStateError> {
        self.ensure_started("query attachment")?;
        Ok(self.attachments.get(id))
    }

    /// Returns the attachments referenced by a result's steps.
    pub fn attachments_by_test_result(
        &self,
        id: TestResultId,
    ) -> Result<Vec<&AttachmentLink>, StoreStateError> {
        self.ensure_started("query attachments by test result")?;
        Ok(self.links_for(self.indices.attachments_by_test_result.get(&id)))
    }

    /// Returns the attachments referenced by a fixture's steps.
    pub fn attachments_by_fixture(
        &self,
        id: TestFixtureResultId,
    ) -> Result<Vec<&AttachmentLink>, StoreStateError> {
        self.ensure_started("query attachments by fixture")?;
        Ok(self.links_for(self.indices.attachments_by_fixture.get(&id)))
    }

    /// Returns the content of an attachment, if its file has arrived.
    pub fn attachment_content(&self, id: &str) -> Result<Option<&ResultFile>, StoreStateError> {
        self.ensure_started("query attachment content")?;
        Ok(self.attachment_contents.get(id))
    }

    /// Returns the content of every attachment whose file has arrived, keyed
    /// by attachment ID.
    pub fn all_attachment_contents(
        &self,
    ) -> Result<impl Iterator<Item = (&str, &ResultFile)>, StoreStateError> {
        self.ensure_started("query attachment contents")?;
        Ok(self
            .attachments
            .keys()
            .filter_map(|id| Some((id.as_str(), self.attachment_contents.get(id)?))))
    }

    /// Returns the fixtures applying to a result.
    pub fn fixtures_by_test_result(
        &self,
        id: TestResultId,
    ) -> Result<Vec<&TestFixtureResult>, StoreStateError> {
        self.ensure_started("query fixtures by test result")?;
        Ok(self
            .indices
            .fixtures_by_test_result
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.fixtures.get(id))
            .collect())
    }

    /// Returns every fixture, in ingestion order.
    pub fn all_fixtures(&self) -> Result<Vec<&TestFixtureResult>, StoreStateError> {
        self.ensure_started("query fixtures")?;
        Ok(self.fixtures.values().collect())
    }

    /// Computes statistics over the visible results matching `predicate`.
    ///
    /// A result counts as retried if hidden attempts share its environment
    /// and history ID.
    pub fn statistic(
        &self,
        predicate: Option<&dyn Fn(&TestResult) -> bool>,
    ) -> Result<Statistic, StoreStateError> {
        self.ensure_started("compute statistic")?;
        let retried: HashSet<AttemptKey> = self
            .test_results
            .values()
            .filter(|result| result.hidden)
            .filter_map(AttemptKey::of)
            .collect();

        let mut statistic = Statistic::default();
        for result in self.visible_results() {
            if predicate.is_none_or(|predicate| predicate(result)) {
                let has_retries = AttemptKey::of(result).is_some_and(|key| retried.contains(&key));
                statistic.add(result, has_retries);
            }
        }
        Ok(statistic)
    }

    /// Computes statistics over the visible results of one environment.
    pub fn statistic_by_environment(&self, environment: &str) -> Result<Statistic, StoreStateError> {
        self.statistic(Some(&|result: &TestResult| result.environment == environment))
    }

    /// Returns every environment that has results, in the order first seen.
    pub fn all_environments(&self) -> Result<Vec<&str>, StoreStateError> {
        self.ensure_started("query environments")?;
        Ok(self.environments.iter().map(String::as_str).collect())
    }

    /// Returns the visible results of one environment.
    pub fn test_results_by_environment(
        &self,
        environment: &str,
    ) -> Result<Vec<&TestResult>, StoreStateError> {
        self.ensure_started("query test results by environment")?;
        Ok(self
            .visible_results()
            .filter(|result| result.environment == environment)
            .collect())
    }

    /// Returns the visible results grouped by environment, environments in
    /// the order first seen.
    pub fn test_results_grouped_by_environment(
        &self,
    ) -> Result<IndexMap<&str, Vec<&TestResult>>, StoreStateError> {
        self.ensure_started("group test results by environment")?;
        let mut groups: IndexMap<&str, Vec<&TestResult>> = self
            .environments
            .iter()
            .map(|environment| (environment.as_str(), Vec::new()))
            .collect();
        for result in self.visible_results() {
            groups
                .entry(result.environment.as_str())
                .or_default()
                .push(result);
        }
        Ok(groups)
    }

    /// Groups the visible results by the values of the label `name`.
    pub fn test_results_grouped_by_label(
        &self,
        name: &str,
    ) -> Result<LabelGrouping<'_>, StoreStateError> {
        self.ensure_started("group test results by label")?;
        let mut grouping = LabelGrouping::default();
        for result in self.visible_results() {
            let values: IndexSet<&str> = result.label_values(name).collect();
            if values.is_empty() {
                grouping.without_label.push(result);
            }
            for value in values {
                grouping
                    .by_value
                    .entry(value.to_owned())
                    .or_default()
                    .push(result);
            }
        }
        Ok(grouping)
    }

    /// Returns the known failures recorded for a history ID.
    pub fn known_failures_by_history_id(
        &self,
        history_id: &str,
    ) -> Result<Vec<&KnownTestFailure>, StoreStateError> {
        self.ensure_started("query known failures")?;
        Ok(self
            .indices
            .known_failures_by_history_id
            .get(history_id)
            .into_iter()
            .flatten()
            .filter_map(|index| self.known_failures.get(*index))
            .collect())
    }

    /// Returns every known failure.
    pub fn all_known_failures(&self) -> Result<&[KnownTestFailure], StoreStateError> {
        self.ensure_started("query known failures")?;
        Ok(&self.known_failures)
    }

    /// Returns the visible results classified as [`TestTransition::New`].
    pub fn all_new_test_results(&self) -> Result<Vec<&TestResult>, StoreStateError> {
        self.ensure_started("query new test results")?;
        Ok(self
            .visible_results()
            .filter(|result| result.transition == Some(TestTransition::New))
            .collect())
    }

    /// Returns the run-wide errors, in the order reported.
    pub fn global_errors(&self) -> Result<&[TestError], StoreStateError> {
        self.ensure_started("query global errors")?;
        Ok(&self.global_errors)
    }

    /// Returns the run-wide attachments, in the order reported.
    pub fn global_attachments(&self) -> Result<Vec<&AttachmentLink>, StoreStateError> {
        self.ensure_started("query global attachments")?;
        Ok(self
            .global_attachment_ids
            .iter()
            .filter_map(|id| self.attachments.get(id))
            .collect())
    }

    /// Returns the exit code of the test process, if reported.
    pub fn exit_code(&self) -> Result<Option<ExitCode>, StoreStateError> {
        self.ensure_started("query exit code")?;
        Ok(self.exit_code)
    }

    /// Returns the quality gate outcomes, in the order reported.
    pub fn quality_gate_results(&self) -> Result<&[QualityGateValidationResult], StoreStateError> {
        self.ensure_started("query quality gate results")?;
        Ok(&self.quality_gate_results)
    }

    /// Looks up a reported metadata value.
    pub fn metadata_by_key(&self, key: &str) -> Result<Option<&serde_json::Value>, StoreStateError> {
        self.ensure_started("query metadata")?;
        Ok(self.metadata.get(key))
    }

    /// Builds this run's history entry.
    ///
    /// Only visible results with a history ID are recorded. If results in
    /// several environments share a history ID, the first ingested one is
    /// kept.
    pub fn to_history_data_point(
        &self,
        name: impl Into<String>,
        timestamp: i64,
    ) -> Result<HistoryDataPoint, StoreStateError> {
        self.ensure_started("build history data point")?;
        let mut point = HistoryDataPoint::new(name, timestamp);

        let known_test_case_ids: IndexSet<&str> = self
            .test_results
            .values()
            .filter_map(|result| result.test_case_id.as_deref())
            .collect();
        point.known_test_case_ids = known_test_case_ids.into_iter().map(str::to_owned).collect();

        for result in self.visible_results() {
            if let Some(entry) = HistoryTestResult::from_test_result(result) {
                point
                    .test_results
                    .entry(entry.history_id.clone())
                    .or_insert(entry);
            }
        }

        let statistic = self.statistic(None)?;
        point.metrics.extend(
            [
                ("total", statistic.total),
                ("passed", statistic.passed),
                ("failed", statistic.failed),
                ("broken", statistic.broken),
                ("skipped", statistic.skipped),
                ("unknown", statistic.unknown),
                ("retries", statistic.retries),
                ("flaky", statistic.flaky),
            ]
            .map(|(metric, count)| (metric.to_owned(), count as f64)),
        );
        Ok(point)
    }
}
