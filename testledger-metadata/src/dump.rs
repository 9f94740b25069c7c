// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    AttachmentLink, ExitCode, KnownTestFailure, QualityGateValidationResult, TestError,
    TestFixtureResult, TestFixtureResultId, TestResult, TestResultId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The current format version of [`StoreDump`].
///
/// Bump this whenever the dump shape changes incompatibly.
pub const STORE_DUMP_FORMAT_VERSION: u32 = 1;

/// A self-contained snapshot of a store's state.
///
/// Every collection is keyed by ID and every index is stored as plain ID
/// lists, so a dump can be produced in one process and merged into a store in
/// another. Attachment bytes are transported separately.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct StoreDump {
    /// The format version this dump was written with.
    pub format_version: u32,

    /// All test results, including hidden attempts.
    #[serde(default)]
    pub test_results: BTreeMap<TestResultId, TestResult>,

    /// All fixtures.
    #[serde(default)]
    pub fixtures: BTreeMap<TestFixtureResultId, TestFixtureResult>,

    /// All attachment descriptors.
    #[serde(default)]
    pub attachments: BTreeMap<String, AttachmentLink>,

    /// Environments in the order they were first seen.
    #[serde(default)]
    pub environments: Vec<String>,

    /// Run-wide errors.
    #[serde(default)]
    pub global_errors: Vec<TestError>,

    /// IDs of run-wide attachments.
    #[serde(default)]
    pub global_attachment_ids: Vec<String>,

    /// Exit code of the test process, if reported.
    #[serde(default)]
    pub exit_code: Option<ExitCode>,

    /// Quality gate outcomes.
    #[serde(default)]
    pub quality_gate_results: Vec<QualityGateValidationResult>,

    /// Reported metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// Known failures.
    #[serde(default)]
    pub known_failures: Vec<KnownTestFailure>,

    /// Indices over the collections above.
    #[serde(default)]
    pub indices: DumpIndices,
}

impl StoreDump {
    /// Creates an empty dump with the current format version.
    pub fn empty() -> Self {
        Self {
            format_version: STORE_DUMP_FORMAT_VERSION,
            test_results: BTreeMap::new(),
            fixtures: BTreeMap::new(),
            attachments: BTreeMap::new(),
            environments: Vec::new(),
            global_errors: Vec::new(),
            global_attachment_ids: Vec::new(),
            exit_code: None,
            quality_gate_results: Vec::new(),
            metadata: BTreeMap::new(),
            known_failures: Vec::new(),
            indices: DumpIndices::default(),
        }
    }
}

/// The indices of a [`StoreDump`], as plain ID lists.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct DumpIndices {
    /// Test case ID to result IDs.
    #[serde(default)]
    pub test_results_by_test_case_id: BTreeMap<String, Vec<TestResultId>>,

    /// History ID to result IDs.
    #[serde(default)]
    pub test_results_by_history_id: BTreeMap<String, Vec<TestResultId>>,

    /// Environment to history ID to the latest visible attempt.
    #[serde(default)]
    pub latest_test_results: BTreeMap<String, BTreeMap<String, TestResultId>>,

    /// Result ID to attachment IDs.
    #[serde(default)]
    pub attachments_by_test_result: BTreeMap<TestResultId, Vec<String>>,

    /// Fixture ID to attachment IDs.
    #[serde(default)]
    pub attachments_by_fixture: BTreeMap<TestFixtureResultId, Vec<String>>,

    /// Result ID to fixture IDs.
    #[serde(default)]
    pub fixtures_by_test_result: BTreeMap<TestResultId, Vec<TestFixtureResultId>>,
}
