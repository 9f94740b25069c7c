// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{TestError, TestLink, TestResult, TestStatus, TestTransition};
use serde::{Deserialize, Serialize};

/// The exit code of the process that produced the results.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ExitCode {
    /// The exit code the test process returned.
    pub original: i32,

    /// The exit code after quality gates were applied, if they changed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<i32>,
}

/// The outcome of a single quality gate rule.
///
/// Rules themselves are evaluated elsewhere. This is the state the store
/// keeps for them.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct QualityGateValidationResult {
    /// The rule identifier.
    pub rule: String,

    /// Whether the rule passed.
    pub success: bool,

    /// A human-readable explanation.
    pub message: String,

    /// The observed value.
    #[serde(default)]
    pub actual: serde_json::Value,

    /// The configured threshold.
    #[serde(default)]
    pub expected: serde_json::Value,

    /// The environment the rule was evaluated for, if scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

/// A failure that is already known and tracked somewhere.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct KnownTestFailure {
    /// The history ID of the failing test.
    pub history_id: String,

    /// Issues tracking the failure.
    #[serde(default)]
    pub issues: Vec<TestLink>,

    /// Free-form comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// The expected error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TestError>,
}

/// Aggregate counts over a set of test results.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Statistic {
    /// Number of results.
    pub total: usize,

    /// Results with status `failed`.
    pub failed: usize,

    /// Results with status `broken`.
    pub broken: usize,

    /// Results with status `passed`.
    pub passed: usize,

    /// Results with status `skipped`.
    pub skipped: usize,

    /// Results with status `unknown`.
    pub unknown: usize,

    /// Results that have at least one hidden earlier attempt.
    pub retries: usize,

    /// Results marked flaky.
    pub flaky: usize,

    /// Results classified as new.
    pub new: usize,
}

impl Statistic {
    /// Adds one result to the counts.
    ///
    /// `has_retries` is computed by the caller, since it depends on other
    /// results.
    pub fn add(&mut self, result: &TestResult, has_retries: bool) {
        self.total += 1;
        *self.status_count_mut(result.status) += 1;
        if has_retries {
            self.retries += 1;
        }
        if result.flaky {
            self.flaky += 1;
        }
        if result.transition == Some(TestTransition::New) {
            self.new += 1;
        }
    }

    /// Returns the count for one status.
    pub fn count(&self, status: TestStatus) -> usize {
        match status {
            TestStatus::Failed => self.failed,
            TestStatus::Broken => self.broken,
            TestStatus::Passed => self.passed,
            TestStatus::Skipped => self.skipped,
            TestStatus::Unknown => self.unknown,
        }
    }

    fn status_count_mut(&mut self, status: TestStatus) -> &mut usize {
        match status {
            TestStatus::Failed => &mut self.failed,
            TestStatus::Broken => &mut self.broken,
            TestStatus::Passed => &mut self.passed,
            TestStatus::Skipped => &mut self.skipped,
            TestStatus::Unknown => &mut self.unknown,
        }
    }
}
