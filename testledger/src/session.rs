// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report session management.
//!
//! [`ReportSession`] wires the pieces of one report-generation run together:
//! it loads history and known issues according to the [`StoreConfig`],
//! starts a [`TestResultStore`], and at the end appends the run to the
//! history log.

use crate::{
    config::StoreConfig,
    errors::{HistoryLogError, ReportSessionError},
    history::HistoryLog,
    known::KnownIssues,
    store::TestResultStore,
};
use chrono::{DateTime, Utc};
use std::fmt;
use testledger_metadata::HistoryDataPoint;
use tracing::{debug, warn};

/// The lifecycle of one report-generation run.
#[derive(Debug)]
pub struct ReportSession {
    store: TestResultStore,
    history_log: Option<HistoryLog>,
}

impl ReportSession {
    /// Sets up a session.
    ///
    /// Reads the history log and known issues, if configured, and returns a
    /// session whose store is ready for ingestion.
    pub fn setup(config: StoreConfig) -> Result<Self, ReportSessionError> {
        let mut history_log = config.history().open_log()?;
        let history = match &mut history_log {
            Some(log) => {
                let history = log.read_history()?.to_vec();
                debug!("loaded {} history entries from `{}`", history.len(), log.path());
                history
            }
            None => Vec::new(),
        };
        let known_issues = match config.known_issues() {
            Some(path) => KnownIssues::load(path)?,
            None => KnownIssues::default(),
        };

        let mut store = TestResultStore::new(config)
            .with_history(history)
            .with_known_issues(known_issues.into_failures());
        store.start()?;

        Ok(Self { store, history_log })
    }

    /// The store being populated.
    pub fn store(&self) -> &TestResultStore {
        &self.store
    }

    /// The store being populated, for ingestion and bus subscriptions.
    pub fn store_mut(&mut self) -> &mut TestResultStore {
        &mut self.store
    }

    /// Finishes the session.
    ///
    /// Marks the store done and, if a history log is configured, appends this
    /// run's entry to it. Returns the finished store along with that entry.
    ///
    /// Failing to append history doesn't lose the report: the failure is
    /// returned as a [`FinalizeWarning`] next to the finished store.
    pub fn finalize(
        mut self,
        finished_at: DateTime<Utc>,
    ) -> Result<FinishedReport, ReportSessionError> {
        self.store.done()?;

        let mut warnings = Vec::new();
        let history_entry = match &mut self.history_log {
            Some(log) => {
                let entry = self.store.to_history_data_point(
                    self.store.config().report_name().to_owned(),
                    finished_at.timestamp_millis(),
                )?;
                match log.append_history(entry.clone()) {
                    Ok(()) => {
                        debug!("appended history entry {} to `{}`", entry.uuid, log.path());
                        Some(entry)
                    }
                    Err(error) => {
                        warnings.push(FinalizeWarning::HistoryAppendFailed(error));
                        None
                    }
                }
            }
            None => None,
        };

        Ok(FinishedReport {
            store: self.store,
            history_entry,
            warnings,
        })
    }
}

/// The outcome of [`ReportSession::finalize`].
#[derive(Debug)]
pub struct FinishedReport {
    /// The finished store. Only queries are accepted.
    pub store: TestResultStore,

    /// The entry appended to the history log, if one is configured and the
    /// append succeeded.
    pub history_entry: Option<HistoryDataPoint>,

    /// Non-fatal problems encountered while finalizing.
    pub warnings: Vec<FinalizeWarning>,
}

impl FinishedReport {
    /// Logs any warnings from finalization.
    pub fn log(&self) {
        for warning in &self.warnings {
            warn!("{warning}");
        }
    }
}

/// A non-fatal problem while finalizing a session.
#[derive(Debug)]
#[non_exhaustive]
pub enum FinalizeWarning {
    /// The report is complete but this run couldn't be added to the history
    /// log.
    HistoryAppendFailed(HistoryLogError),
}

impl fmt::Display for FinalizeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HistoryAppendFailed(error) => {
                write!(f, "report finished but failed to append history: {error}")
            }
        }
    }
}
