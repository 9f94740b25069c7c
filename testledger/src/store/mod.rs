// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The in-memory test result store.
//!
//! [`TestResultStore`] is the canonical state of one report-generation run. It
//! ingests results through the [`ResultsVisitor`](crate::reader::ResultsVisitor)
//! entry points, hides earlier attempts of retried tests, classifies results
//! against history, and answers queries once the session is under way.
//!
//! ## Retries
//!
//! Results sharing an environment and a history ID are attempts of the same
//! logical test. Exactly one attempt per (environment, history ID) is visible:
//! the one with the latest start time, where a missing start time sorts
//! earliest. Every other attempt is marked hidden. This holds regardless of
//! the order attempts arrive in, and across [`restore_state`] merges.
//!
//! Attempts with equal starts are settled differently on the two paths.
//! Live ingestion keeps the attempt that arrived first, while
//! [`restore_state`] keeps the attempt with the greater ID.
//!
//! ## Session
//!
//! A store starts out [`SessionState::NotStarted`]. Ingestion requires
//! [`SessionState::Active`]; queries additionally work once the session is
//! [`SessionState::Done`].
//!
//! [`restore_state`]: TestResultStore::restore_state

mod attachments;
mod dump;
mod imp;
mod indices;
mod normalize;
mod query;

pub use imp::*;
pub use normalize::{EMPTY_PARAMETERS_HASH, history_id, parameters_hash, test_case_id};
pub use query::{AttachmentFilter, LabelGrouping, TestResultFilter};

use std::fmt;

/// The lifecycle state of a [`TestResultStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// [`TestResultStore::start`] hasn't been called yet.
    NotStarted,

    /// The store accepts ingestion and queries.
    Active,

    /// [`TestResultStore::done`] was called. Only queries are accepted.
    Done,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Active => write!(f, "active"),
            Self::Done => write!(f, "done"),
        }
    }
}
