// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime announcements of newly ingested entities.
//!
//! The store publishes on a [`RealtimeBus`] as results, fixtures, attachments
//! and run-level records arrive. Publishing is synchronous: every subscriber
//! of a channel has returned before the publishing call does, so a subscriber
//! such as a fast-fail monitor sees each result before the next one is
//! ingested.

use crate::errors::SubscriberError;
use debug_ignore::DebugIgnore;
use testledger_metadata::{
    ExitCode, QualityGateValidationResult, TestError, TestFixtureResultId, TestResultId,
};
use tracing::warn;

type Callback<T> = Box<dyn FnMut(&T) -> Result<(), SubscriberError> + Send>;

/// A single typed channel.
///
/// Callbacks run in registration order. A failing callback is logged and
/// counted, and the remaining callbacks still run.
#[derive(Debug)]
pub struct Channel<T> {
    name: &'static str,
    subscribers: DebugIgnore<Vec<Callback<T>>>,
    failures: usize,
}

impl<T> Channel<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: DebugIgnore(Vec::new()),
            failures: 0,
        }
    }

    /// Returns the name of this channel.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Registers a callback.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&T) -> Result<(), SubscriberError> + Send + 'static,
    {
        self.subscribers.push(Box::new(callback));
    }

    /// Returns the number of registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns the number of callback invocations that have failed.
    pub fn failure_count(&self) -> usize {
        self.failures
    }

    /// Invokes every callback with `event`.
    pub fn publish(&mut self, event: &T) {
        for (index, callback) in self.subscribers.iter_mut().enumerate() {
            if let Err(error) = callback(event) {
                self.failures += 1;
                warn!(
                    "subscriber {index} on channel `{}` failed: {error}",
                    self.name,
                );
            }
        }
    }
}

/// The set of channels a store publishes on.
#[derive(Debug)]
pub struct RealtimeBus {
    /// A test result was ingested.
    pub test_results: Channel<TestResultId>,

    /// A fixture was ingested.
    pub fixtures: Channel<TestFixtureResultId>,

    /// A physical attachment file arrived. The payload is the attachment ID.
    pub attachment_files: Channel<String>,

    /// A run-wide error was reported.
    pub global_errors: Channel<TestError>,

    /// A run-wide attachment was reported. The payload is the attachment ID.
    pub global_attachments: Channel<String>,

    /// The test process exit code was reported.
    pub exit_code: Channel<ExitCode>,

    /// Quality gate outcomes were reported.
    pub quality_gate_results: Channel<Vec<QualityGateValidationResult>>,
}

impl RealtimeBus {
    /// Creates a bus with no subscribers.
    pub fn new() -> Self {
        Self {
            test_results: Channel::new("test-results"),
            fixtures: Channel::new("fixtures"),
            attachment_files: Channel::new("attachment-files"),
            global_errors: Channel::new("global-errors"),
            global_attachments: Channel::new("global-attachments"),
            exit_code: Channel::new("exit-code"),
            quality_gate_results: Channel::new("quality-gate-results"),
        }
    }

    /// Returns the total number of failed callback invocations across all
    /// channels.
    pub fn failure_count(&self) -> usize {
        self.test_results.failure_count()
            + self.fixtures.failure_count()
            + self.attachment_files.failure_count()
            + self.global_errors.failure_count()
            + self.global_attachments.failure_count()
            + self.exit_code.failure_count()
            + self.quality_gate_results.failure_count()
    }
}

impl Default for RealtimeBus {
    fn default() -> Self {
        Self::new()
    }
}
