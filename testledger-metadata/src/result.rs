// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{TestFixtureResultId, TestResultId};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// The outcome of a test, fixture or step.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum TestStatus {
    /// An assertion failed.
    Failed,

    /// The test could not run to completion for a reason other than an
    /// assertion, e.g. an unexpected exception.
    Broken,

    /// The test passed.
    Passed,

    /// The test was skipped.
    Skipped,

    /// The status is not known.
    #[default]
    Unknown,
}

impl TestStatus {
    /// All statuses, in display order.
    pub const ALL: [Self; 5] = [
        Self::Failed,
        Self::Broken,
        Self::Passed,
        Self::Skipped,
        Self::Unknown,
    ];

    /// Returns the string form used in serialized output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::Broken => "broken",
            Self::Passed => "passed",
            Self::Skipped => "skipped",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true for `failed` and `broken`.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Broken)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a result compares to the same test's previous runs.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TestTransition {
    /// The test has no history.
    New,

    /// The test failed previously and passes now.
    Fixed,

    /// The test passed previously and fails now.
    Regressed,

    /// The test used to pass or fail and is broken now.
    Malfunctioned,
}

/// A name/value pair attached to a test. Names are not unique.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub struct TestLabel {
    /// The label name.
    pub name: String,

    /// The label value, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl TestLabel {
    /// Creates a new label.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }
}

/// A test parameter.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub struct TestParameter {
    /// The parameter name.
    pub name: String,

    /// The rendered parameter value.
    pub value: String,

    /// Whether the parameter is hidden in reports.
    #[serde(default)]
    pub hidden: bool,

    /// Whether the parameter is excluded from the history ID.
    #[serde(default)]
    pub excluded: bool,

    /// Whether the parameter value is masked in reports.
    #[serde(default)]
    pub masked: bool,
}

impl TestParameter {
    /// Creates a new, visible, non-excluded parameter.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            hidden: false,
            excluded: false,
            masked: false,
        }
    }
}

/// A link from a test to an external resource such as an issue tracker.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub struct TestLink {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Target URL.
    pub url: String,

    /// Link type, e.g. `issue` or `tms`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
}

/// Error details for a failed or broken test.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub struct TestError {
    /// The error message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The stack trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,

    /// The actual value, for assertion failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,

    /// The expected value, for assertion failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

impl TestError {
    /// Creates an error with just a message.
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// A step within a test or fixture.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TestStepResult {
    /// A regular step, possibly with nested steps.
    Step(DefaultTestStepResult),

    /// A reference to an attachment.
    Attachment(AttachmentTestStepResult),
}

/// A regular step.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DefaultTestStepResult {
    /// The step name.
    pub name: String,

    /// The step status.
    #[serde(default)]
    pub status: TestStatus,

    /// Error details, if the step did not pass.
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

    /// Step parameters.
    #[serde(default)]
    pub parameters: Vec<TestParameter>,

    /// Nested steps.
    #[serde(default)]
    pub steps: Vec<TestStepResult>,
}

/// A step that refers to an attachment by its link ID.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct AttachmentTestStepResult {
    /// The ID of the [`AttachmentLink`](crate::AttachmentLink).
    pub link_id: String,

    /// Display name of the attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Where a result came from.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SourceMetadata {
    /// The ID of the reader that produced the result.
    pub reader_id: String,

    /// Reader-specific metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// One test execution attempt.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct TestResult {
    /// Run-local unique ID.
    pub id: TestResultId,

    /// Display name.
    pub name: String,

    /// Fully qualified name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    /// Hash of the test's identity, independent of parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case_id: Option<String>,

    /// Stable hash of identity and parameters, used to correlate runs.
    ///
    /// Results without a history ID are never matched against history and
    /// never hidden as retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_id: Option<String>,

    /// The environment this result belongs to.
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

    /// Labels, in the order they were reported.
    #[serde(default)]
    pub labels: Vec<TestLabel>,

    /// Parameters, in the order they were reported.
    #[serde(default)]
    pub parameters: Vec<TestParameter>,

    /// External links.
    #[serde(default)]
    pub links: Vec<TestLink>,

    /// Top-level steps.
    #[serde(default)]
    pub steps: Vec<TestStepResult>,

    /// True if a later attempt of the same test in the same environment exists.
    #[serde(default)]
    pub hidden: bool,

    /// True if the history classifier considers the test flaky.
    #[serde(default)]
    pub flaky: bool,

    /// True if the test is muted.
    #[serde(default)]
    pub muted: bool,

    /// Classification against history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<TestTransition>,

    /// Where the result came from.
    #[serde(default)]
    pub source_metadata: SourceMetadata,
}

impl TestResult {
    /// Returns the value of the first label with the given name.
    pub fn label_value(&self, name: &str) -> Option<&str> {
        self.label_values(name).next()
    }

    /// Returns the values of all labels with the given name.
    pub fn label_values<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
        self.labels
            .iter()
            .filter(move |label| label.name == name)
            .filter_map(|label| label.value.as_deref())
    }

    /// Returns true if any label has the given name.
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|label| label.name == name)
    }

    /// Returns the attachment link IDs referenced anywhere in this result's steps.
    pub fn attachment_link_ids(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_attachment_link_ids(&self.steps, &mut out);
        out
    }
}

/// Whether a fixture runs before or after its tests.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FixtureType {
    /// A setup fixture.
    Before,

    /// A teardown fixture.
    After,
}

/// A setup or teardown record linked to zero or more test results.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct TestFixtureResult {
    /// Run-local unique ID.
    pub id: TestFixtureResultId,

    /// The results this fixture applies to.
    #[serde(default)]
    pub test_result_ids: Vec<TestResultId>,

    /// Setup or teardown.
    #[serde(rename = "type")]
    pub fixture_type: FixtureType,

    /// Display name.
    pub name: String,

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

    /// Top-level steps.
    #[serde(default)]
    pub steps: Vec<TestStepResult>,

    /// Where the fixture came from.
    #[serde(default)]
    pub source_metadata: SourceMetadata,
}

impl TestFixtureResult {
    /// Returns the attachment link IDs referenced anywhere in this fixture's steps.
    pub fn attachment_link_ids(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_attachment_link_ids(&self.steps, &mut out);
        out
    }
}

fn collect_attachment_link_ids<'a>(steps: &'a [TestStepResult], out: &mut Vec<&'a str>) {
    for step in steps {
        match step {
            TestStepResult::Step(step) => collect_attachment_link_ids(&step.steps, out),
            TestStepResult::Attachment(attachment) => out.push(&attachment.link_id),
        }
    }
}
