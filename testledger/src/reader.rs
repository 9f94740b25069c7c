// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turning result files into store ingestion calls.
//!
//! A [`ResultsReader`] recognizes one file format and feeds what it finds to a
//! [`ResultsVisitor`]. [`read_result_file`] tries a list of readers in order
//! and treats any file nobody recognizes as an attachment, since results
//! directories carry screenshots and logs alongside the results themselves.

use crate::{
    errors::{ReaderError, StoreError},
    result_file::ResultFile,
};
use std::collections::BTreeMap;
use testledger_metadata::{
    ExitCode, QualityGateValidationResult, RawGlobals, RawMetadata, RawTestFixtureResult,
    RawTestResult, SourceMetadata, TestFixtureResultId, TestResultId,
};
use tracing::debug;

/// Where an ingested record came from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReaderContext {
    /// The ID of the reader that produced the record.
    pub reader_id: String,

    /// Reader-specific metadata, stored on the record.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ReaderContext {
    /// Creates a context for `reader_id` with no metadata.
    pub fn new(reader_id: impl Into<String>) -> Self {
        Self {
            reader_id: reader_id.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub(crate) fn to_source_metadata(&self) -> SourceMetadata {
        SourceMetadata {
            reader_id: self.reader_id.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// The ingestion entry points.
///
/// Implemented by [`TestResultStore`](crate::store::TestResultStore). Calls
/// must be serialized: implementations are not expected to handle concurrent
/// visits.
pub trait ResultsVisitor {
    /// Ingests one test result and returns its ID.
    fn visit_test_result(
        &mut self,
        raw: RawTestResult,
        context: &ReaderContext,
    ) -> Result<TestResultId, StoreError>;

    /// Ingests one fixture and returns its ID.
    fn visit_test_fixture_result(
        &mut self,
        raw: RawTestFixtureResult,
        context: &ReaderContext,
    ) -> Result<TestFixtureResultId, StoreError>;

    /// Ingests a physical attachment file.
    fn visit_attachment_file(&mut self, file: ResultFile) -> Result<(), StoreError>;

    /// Ingests run metadata.
    fn visit_metadata(&mut self, metadata: RawMetadata) -> Result<(), StoreError>;

    /// Ingests run-wide errors and attachments.
    fn visit_globals(&mut self, globals: RawGlobals) -> Result<(), StoreError>;

    /// Records the exit code of the test process.
    fn visit_exit_code(&mut self, exit_code: ExitCode) -> Result<(), StoreError>;

    /// Records quality gate outcomes.
    fn visit_quality_gate_results(
        &mut self,
        results: Vec<QualityGateValidationResult>,
    ) -> Result<(), StoreError>;
}

/// Whether a reader handled a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The reader recognized the file and visited its contents.
    Recognized,

    /// The file is not in this reader's format.
    NotRecognized,
}

/// Recognizes and reads one result file format.
pub trait ResultsReader {
    /// A short identifier for this reader, stored as source metadata.
    fn id(&self) -> &str;

    /// Reads `file`, calling `visitor` for each record found.
    ///
    /// Returns [`ReadOutcome::NotRecognized`] without visiting anything if the
    /// file isn't in this reader's format.
    fn read(
        &self,
        visitor: &mut dyn ResultsVisitor,
        file: &ResultFile,
    ) -> Result<ReadOutcome, ReaderError>;
}

/// What [`read_result_file`] did with a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileDisposition {
    /// A reader recognized the file.
    Read {
        /// The ID of that reader.
        reader_id: String,
    },

    /// No reader recognized the file, so it was ingested as an attachment.
    Attachment,
}

/// Hands `file` to the first reader that recognizes it.
///
/// A reader that fails is logged and skipped, and the next one is tried. If
/// no reader recognizes the file, it is passed to
/// [`ResultsVisitor::visit_attachment_file`].
pub fn read_result_file(
    readers: &[&dyn ResultsReader],
    visitor: &mut dyn ResultsVisitor,
    file: ResultFile,
) -> Result<FileDisposition, StoreError> {
    for reader in readers {
        match reader.read(visitor, &file) {
            Ok(ReadOutcome::Recognized) => {
                return Ok(FileDisposition::Read {
                    reader_id: reader.id().to_owned(),
                });
            }
            Ok(ReadOutcome::NotRecognized) => {}
            Err(error) => {
                debug!(
                    "reader `{}` failed on `{}`, trying next reader: {error}",
                    reader.id(),
                    file.original_file_name(),
                );
            }
        }
    }

    debug!(
        "no reader recognized `{}`, treating it as an attachment",
        file.original_file_name(),
    );
    visitor.visit_attachment_file(file)?;
    Ok(FileDisposition::Attachment)
}

/// Reads testledger's own JSON result files.
///
/// * `*-result.json` holds one [`RawTestResult`].
/// * `*-fixture.json` holds one [`RawTestFixtureResult`].
/// * `*-metadata.json` holds one [`RawMetadata`].
/// * `*-globals.json` holds one [`RawGlobals`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RawJsonReader;

impl RawJsonReader {
    /// The reader ID.
    pub const ID: &'static str = "raw-json";
}

impl ResultsReader for RawJsonReader {
    fn id(&self) -> &str {
        Self::ID
    }

    fn read(
        &self,
        visitor: &mut dyn ResultsVisitor,
        file: &ResultFile,
    ) -> Result<ReadOutcome, ReaderError> {
        let name = file.original_file_name();
        let context = ReaderContext::new(Self::ID);

        if name.ends_with("-result.json") {
            let raw: RawTestResult = serde_json::from_slice(&file.read_all()?)?;
            visitor.visit_test_result(raw, &context)?;
        } else if name.ends_with("-fixture.json") {
            let raw: RawTestFixtureResult = serde_json::from_slice(&file.read_all()?)?;
            visitor.visit_test_fixture_result(raw, &context)?;
        } else if name.ends_with("-metadata.json") {
            let raw: RawMetadata = serde_json::from_slice(&file.read_all()?)?;
            visitor.visit_metadata(raw)?;
        } else if name.ends_with("-globals.json") {
            let raw: RawGlobals = serde_json::from_slice(&file.read_all()?)?;
            visitor.visit_globals(raw)?;
        } else {
            return Ok(ReadOutcome::NotRecognized);
        }
        Ok(ReadOutcome::Recognized)
    }
}
