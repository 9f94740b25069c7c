// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classifying a result against its history.

use testledger_metadata::{HistoryTestResult, TestResult, TestStatus, TestTransition};

/// The outcome of comparing a result to its history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Classification {
    /// How the status changed relative to the previous run, if it did.
    pub transition: Option<TestTransition>,

    /// Whether the test has been alternating between passing and failing.
    pub flaky: bool,
}

/// Decides a result's transition and flakiness.
///
/// The store calls this once per ingested result that has a history ID, with
/// the matching history entries across all environments, newest first.
pub trait TransitionClassifier: Send + Sync {
    /// Classifies `result` given `history`, newest first.
    fn classify(&self, result: &TestResult, history: &[HistoryTestResult]) -> Classification;
}

/// The built-in classifier.
///
/// * No history: [`TestTransition::New`].
/// * Passed, now failed: [`TestTransition::Regressed`].
/// * Failed or broken, now passed: [`TestTransition::Fixed`].
/// * Passed or failed, now broken: [`TestTransition::Malfunctioned`].
///
/// A result is flaky if its pass/fail outcome flipped at least
/// [`FLIP_THRESHOLD`](Self::FLIP_THRESHOLD) times across the last
/// [`FLAKY_WINDOW`](Self::FLAKY_WINDOW) history entries plus the current run.
/// Skipped and unknown runs don't take part.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultTransitionClassifier;

impl DefaultTransitionClassifier {
    /// The number of history entries considered for flakiness.
    pub const FLAKY_WINDOW: usize = 5;

    /// The number of flips that make a test flaky.
    pub const FLIP_THRESHOLD: usize = 2;

    fn transition(current: TestStatus, previous: TestStatus) -> Option<TestTransition> {
        use TestStatus::*;

        match (previous, current) {
            (Passed, Failed) => Some(TestTransition::Regressed),
            (Failed | Broken, Passed) => Some(TestTransition::Fixed),
            (Passed | Failed, Broken) => Some(TestTransition::Malfunctioned),
            _ => None,
        }
    }

    fn is_flaky(current: TestStatus, history: &[HistoryTestResult]) -> bool {
        // Oldest first, so that flips are counted in run order.
        let outcomes: Vec<bool> = history
            .iter()
            .take(Self::FLAKY_WINDOW)
            .rev()
            .map(|entry| entry.status)
            .chain(std::iter::once(current))
            .filter_map(|status| match status {
                TestStatus::Passed => Some(true),
                TestStatus::Failed | TestStatus::Broken => Some(false),
                TestStatus::Skipped | TestStatus::Unknown => None,
            })
            .collect();
        let flips = outcomes.windows(2).filter(|pair| pair[0] != pair[1]).count();
        flips >= Self::FLIP_THRESHOLD
    }
}

impl TransitionClassifier for DefaultTransitionClassifier {
    fn classify(&self, result: &TestResult, history: &[HistoryTestResult]) -> Classification {
        let Some(previous) = history.first() else {
            return Classification {
                transition: Some(TestTransition::New),
                flaky: false,
            };
        };
        Classification {
            transition: Self::transition(result.status, previous.status),
            flaky: Self::is_flaky(result.status, history),
        }
    }
}
