// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for testledger.
//!
//! Configuration is read from a TOML file and merged over an embedded default:
//!
//! ```toml
//! report-name = "Nightly"
//! environment = "ci"               # assign every result to one environment
//! known-issues = "known.json"
//!
//! [history]
//! path = "history.jsonl"
//! limit = 10
//!
//! [default-labels]
//! severity = "normal"
//! tag = ["smoke", "regression"]
//!
//! [[environments]]
//! name = "chrome"
//! matcher = { label = "browser", pattern = "^chrom" }
//! ```
//!
//! Unknown keys are logged and otherwise ignored.

mod elements;
mod imp;

pub use elements::{EnvironmentConfig, EnvironmentMatcher, HistoryConfig, LabelMatcher};
pub use imp::*;
