// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to testledger's data model.
//!
//! These types are shared between result parsers, the result store, and
//! anything that consumes history files or store dumps. They are plain serde
//! types: no I/O happens in this crate.
//!
//! The main groups are:
//!
//! * Normalized results: [`TestResult`], [`TestFixtureResult`], [`AttachmentLink`].
//! * Raw ingestion records, as produced by parsers: [`RawTestResult`],
//!   [`RawTestFixtureResult`], [`RawMetadata`], [`RawGlobals`].
//! * History: [`HistoryDataPoint`] and [`HistoryTestResult`], one data point per
//!   line in a history file.
//! * Dumps: [`StoreDump`], a self-contained snapshot of a store used to merge
//!   results produced by separate shards.

mod attachment;
mod dump;
mod globals;
mod history;
mod ids;
#[cfg(feature = "proptest1")]
mod proptest_helpers;
mod raw;
mod result;

pub use attachment::*;
pub use dump::*;
pub use globals::*;
pub use history::*;
pub use ids::*;
pub use raw::*;
pub use result::*;
