// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for testledger.
//!
//! A report-generation session flows through this crate as follows:
//!
//! 1. [`config::StoreConfig`] is loaded from TOML.
//! 2. [`session::ReportSession::setup`] reads the run history through a
//!    [`history::HistoryLog`], loads known issues, and starts a
//!    [`store::TestResultStore`].
//! 3. Result files are fed through [`reader::read_result_file`], which calls
//!    the store's [`reader::ResultsVisitor`] entry points. Each new entity is
//!    announced on the store's [`bus::RealtimeBus`].
//! 4. [`session::ReportSession::finalize`] marks the store done and appends
//!    this run's entry to the history log. The store then answers queries.
//!
//! Distributed runs produce one [`StoreDump`](testledger_metadata::StoreDump)
//! per shard (see [`dump_archive`]) and merge them with
//! [`store::TestResultStore::restore_state`].

pub mod bus;
pub mod classify;
pub mod config;
pub mod dump_archive;
pub mod errors;
mod helpers;
pub mod history;
pub mod known;
pub mod reader;
pub mod result_file;
pub mod session;
pub mod store;
