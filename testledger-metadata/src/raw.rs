// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Raw ingestion records.
//!
//! Parsers for specific result formats convert what they read into these
//! types and hand them to the store, which normalizes them.

use crate::{FixtureType, TestError, TestLabel, TestLink, TestParameter, TestStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A test result as reported by a parser.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RawTestResult {
    /// An identifier assigned by the reporter, unique within one results
    /// directory. Fixtures refer to results through it.
    #[serde(default)]
    pub uuid: Option<String>,

    /// Display name.
    #[serde(default)]
    pub name: Option<String>,

    /// Fully qualified name.
    #[serde(default)]
    pub full_name: Option<String>,

    /// A stable test identifier. Takes precedence over `full_name` when
    /// computing history IDs.
    #[serde(default)]
    pub test_id: Option<String>,

    /// The outcome. Missing statuses are normalized to `unknown`.
    #[serde(default)]
    pub status: Option<TestStatus>,

    /// Error details.
    #[serde(default)]
    pub error: Option<TestError>,

    /// Start time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub start: Option<i64>,

    /// Stop time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub stop: Option<i64>,

    /// Duration in milliseconds.
    #[serde(default)]
    pub duration: Option<i64>,

    /// Labels.
    #[serde(default)]
    pub labels: Vec<TestLabel>,

    /// Parameters.
    #[serde(default)]
    pub parameters: Vec<TestParameter>,

    /// External links.
    #[serde(default)]
    pub links: Vec<TestLink>,

    /// Steps.
    #[serde(default)]
    pub steps: Vec<RawStep>,

    /// Whether the test is muted.
    #[serde(default)]
    pub muted: bool,
}

/// A step as reported by a parser.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RawStep {
    /// A regular step.
    Step(RawTestStep),

    /// An attachment reference.
    Attachment(RawAttachmentStep),
}

/// A regular step as reported by a parser.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RawTestStep {
    /// Step name.
    #[serde(default)]
    pub name: Option<String>,

    /// The outcome.
    #[serde(default)]
    pub status: Option<TestStatus>,

    /// Error details.
    #[serde(default)]
    pub error: Option<TestError>,

    /// Start time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub start: Option<i64>,

    /// Stop time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub stop: Option<i64>,

    /// Duration in milliseconds.
    #[serde(default)]
    pub duration: Option<i64>,

    /// Step parameters.
    #[serde(default)]
    pub parameters: Vec<TestParameter>,

    /// Nested steps.
    #[serde(default)]
    pub steps: Vec<RawStep>,
}

/// A reference to an attachment file.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RawAttachmentStep {
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,

    /// The file name of the attachment, as it appears in the results.
    pub original_file_name: String,

    /// MIME type declared by the reporter. Takes precedence over any detected
    /// type.
    #[serde(default)]
    pub content_type: Option<String>,
}

/// A setup or teardown record as reported by a parser.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RawTestFixtureResult {
    /// Setup or teardown.
    #[serde(rename = "type")]
    pub fixture_type: FixtureType,

    /// The [`uuid`](RawTestResult::uuid)s of the results the fixture applies
    /// to. A referenced result may be ingested after the fixture.
    #[serde(default)]
    pub test_result_ids: Vec<String>,

    /// Display name.
    #[serde(default)]
    pub name: Option<String>,

    /// The outcome.
    #[serde(default)]
    pub status: Option<TestStatus>,

    /// Error details.
    #[serde(default)]
    pub error: Option<TestError>,

    /// Start time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub start: Option<i64>,

    /// Stop time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub stop: Option<i64>,

    /// Duration in milliseconds.
    #[serde(default)]
    pub duration: Option<i64>,

    /// Steps.
    #[serde(default)]
    pub steps: Vec<RawStep>,
}

/// Key/value metadata reported alongside results.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct RawMetadata(pub BTreeMap<String, serde_json::Value>);

/// Run-wide errors and attachments that don't belong to any single test.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RawGlobals {
    /// Errors.
    #[serde(default)]
    pub errors: Vec<TestError>,

    /// Attachments.
    #[serde(default)]
    pub attachments: Vec<RawAttachmentStep>,
}
