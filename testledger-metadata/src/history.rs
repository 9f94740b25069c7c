// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{HistoryDataPointId, TestError, TestLabel, TestResult, TestResultId, TestStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A minimal projection of a past [`TestResult`], stored in a
/// [`HistoryDataPoint`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct HistoryTestResult {
    /// The ID the result had in its run.
    pub id: TestResultId,

    /// Display name.
    pub name: String,

    /// Fully qualified name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    /// The history ID this entry is keyed by.
    pub history_id: String,

    /// The environment the result belonged to.
    pub environment: String,

    /// The outcome.
    pub status: TestStatus,

    /// Error details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TestError>,

    /// Start time in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,

    /// Stop time in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<i64>,

    /// Duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,

    /// Labels.
    #[serde(default)]
    pub labels: Vec<TestLabel>,
}

impl HistoryTestResult {
    /// Projects a result into its history form.
    ///
    /// Returns `None` if the result has no history ID, since such results
    /// can't be correlated across runs.
    pub fn from_test_result(result: &TestResult) -> Option<Self> {
        let history_id = result.history_id.clone()?;
        Some(Self {
            id: result.id,
            name: result.name.clone(),
            full_name: result.full_name.clone(),
            history_id,
            environment: result.environment.clone(),
            status: result.status,
            error: result.error.clone(),
            start: result.start,
            stop: result.stop,
            duration: result.duration,
            labels: result.labels.clone(),
        })
    }
}

/// One completed run's snapshot, as stored in one line of a history file.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct HistoryDataPoint {
    /// Unique ID of this data point.
    pub uuid: HistoryDataPointId,

    /// The report name.
    pub name: String,

    /// When the run finished, in milliseconds since the Unix epoch.
    pub timestamp: i64,

    /// Test case IDs that were seen in this run.
    #[serde(default)]
    pub known_test_case_ids: Vec<String>,

    /// Results keyed by history ID.
    #[serde(default)]
    pub test_results: BTreeMap<String, HistoryTestResult>,

    /// Run-level metrics.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,

    /// Where the report for this run was published, if anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl HistoryDataPoint {
    /// Creates an empty data point with a fresh ID.
    pub fn new(name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            uuid: HistoryDataPointId::new_v4(),
            name: name.into(),
            timestamp,
            known_test_case_ids: Vec::new(),
            test_results: BTreeMap::new(),
            metrics: BTreeMap::new(),
            url: None,
        }
    }
}
