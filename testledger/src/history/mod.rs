// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The durable run history.
//!
//! A history file stores one [`HistoryDataPoint`](testledger_metadata::HistoryDataPoint)
//! per line. [`HistoryLog`] reads and rotates it with a backward byte scan, so
//! only the retained tail of the file is ever decoded.

mod log;
mod scan;

pub use log::HistoryLog;
