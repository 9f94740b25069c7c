// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by testledger.

use crate::store::SessionState;
use camino::Utf8PathBuf;
use thiserror::Error;

/// An error returned by a subscriber of the [`RealtimeBus`](crate::bus::RealtimeBus).
///
/// Subscriber errors are logged by the bus and never reach the publisher.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// An error returned by a [`ResultsReader`](crate::reader::ResultsReader).
pub type ReaderError = Box<dyn std::error::Error + Send + Sync>;

/// An error that occurred while reading from or appending to a history file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryLogError {
    /// The retention limit was negative.
    #[error("history limit must be a non-negative integer, got {limit}")]
    InvalidLimit {
        /// The limit that was provided.
        limit: i64,
    },

    /// Opening the history file failed.
    #[error("error opening history file at `{path}`")]
    Open {
        /// The history file path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Reading file metadata failed.
    #[error("error reading metadata for history file at `{path}`")]
    Metadata {
        /// The history file path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Creating the directory containing the history file failed.
    #[error("error creating history directory at `{path}`")]
    CreateDir {
        /// The directory path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Reading from the history file failed.
    #[error("error reading history file at `{path}`")]
    Read {
        /// The history file path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Writing to the history file failed.
    #[error("error writing history file at `{path}`")]
    Write {
        /// The history file path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Truncating the history file failed.
    #[error("error truncating history file at `{path}` to {len} bytes")]
    Truncate {
        /// The history file path.
        path: Utf8PathBuf,

        /// The requested length.
        len: u64,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Serializing a history entry failed.
    #[error("error serializing history entry")]
    Serialize {
        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// A read returned fewer bytes than the file's size promised.
    #[error(
        "short read from history file at `{path}`: expected {expected} bytes at offset {offset}, \
         got {actual}"
    )]
    ShortRead {
        /// The history file path.
        path: Utf8PathBuf,

        /// The offset the read started at.
        offset: u64,

        /// The number of bytes requested.
        expected: usize,

        /// The number of bytes read.
        actual: usize,
    },

    /// The file's size or modification time changed while it was being
    /// scanned.
    #[error("history file at `{path}` was modified externally while it was being read")]
    ModifiedExternally {
        /// The history file path.
        path: Utf8PathBuf,
    },
}

/// An operation was attempted outside the store's active session.
#[derive(Clone, Debug, Error)]
#[error("cannot {operation}: store session is {state}")]
pub struct StoreStateError {
    operation: &'static str,
    state: SessionState,
}

impl StoreStateError {
    pub(crate) fn new(operation: &'static str, state: SessionState) -> Self {
        Self { operation, state }
    }

    /// The operation that was attempted.
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// The session state at the time.
    pub fn state(&self) -> SessionState {
        self.state
    }
}

/// An error that occurred while ingesting into or reading from the store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The store session was not active.
    #[error(transparent)]
    State(#[from] StoreStateError),

    /// Reading an attachment's content failed.
    #[error("error reading content of attachment `{original_file_name}`")]
    AttachmentContent {
        /// The attachment's original file name.
        original_file_name: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurred while dumping or restoring store state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DumpError {
    /// The store session was not active.
    #[error(transparent)]
    State(#[from] StoreStateError),

    /// The dump was written with an unsupported format version.
    #[error("unsupported dump format version {actual} (supported: {expected})")]
    VersionMismatch {
        /// The supported version.
        expected: u32,

        /// The version found in the dump.
        actual: u32,
    },

    /// An index in the dump refers to an ID that isn't in the dump or the store.
    #[error("dump index `{index}` refers to unknown ID `{id}`")]
    DanglingIndexEntry {
        /// The name of the index.
        index: &'static str,

        /// The dangling ID.
        id: String,
    },

    /// Serializing the dump failed.
    #[error("error serializing store dump")]
    Serialize {
        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// Deserializing the dump failed.
    #[error("error deserializing store dump")]
    Deserialize {
        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that occurred while writing or reading a dump archive.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DumpArchiveError {
    /// Creating the archive file failed.
    #[error("error creating dump archive at `{path}`")]
    Create {
        /// The archive path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Opening the archive file failed.
    #[error("error opening dump archive at `{path}`")]
    Open {
        /// The archive path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A zip-level operation failed.
    #[error("error processing entry `{entry}` in dump archive at `{path}`")]
    Zip {
        /// The archive path.
        path: Utf8PathBuf,

        /// The entry being processed.
        entry: String,

        /// The underlying error.
        #[source]
        error: zip::result::ZipError,
    },

    /// Writing an entry failed.
    #[error("error writing entry `{entry}` to dump archive at `{path}`")]
    Write {
        /// The archive path.
        path: Utf8PathBuf,

        /// The entry being written.
        entry: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Reading an entry failed.
    #[error("error reading entry `{entry}` from dump archive at `{path}`")]
    Read {
        /// The archive path.
        path: Utf8PathBuf,

        /// The entry being read.
        entry: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Producing attachment content for the archive failed.
    #[error("error collecting attachment content for dump archive at `{path}`")]
    AttachmentContent {
        /// The archive path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: StoreError,
    },

    /// Encoding or decoding the dump itself failed.
    #[error(transparent)]
    Dump(#[from] DumpError),
}

/// An error that occurred while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// An explicitly requested config file does not exist.
    #[error("config file not found at `{path}`")]
    FileNotFound {
        /// The path that was requested.
        path: Utf8PathBuf,
    },

    /// Reading the config file failed.
    #[error("error reading config file at `{path}`")]
    Read {
        /// The config file path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Parsing the config file failed.
    #[error("error parsing config file at `{path}`")]
    Parse {
        /// The config file path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: toml::de::Error,
    },

    /// The history limit was negative.
    #[error("history.limit must be a non-negative integer, got {limit}")]
    NegativeHistoryLimit {
        /// The configured limit.
        limit: i64,
    },

    /// An environment matcher's pattern failed to compile.
    #[error("invalid matcher pattern `{pattern}` for environment `{environment}`")]
    InvalidMatcherPattern {
        /// The environment name.
        environment: String,

        /// The pattern that failed to compile.
        pattern: String,

        /// The underlying error.
        #[source]
        error: regex::Error,
    },

    /// An environment matcher didn't specify exactly one of `value` and `pattern`.
    #[error("matcher for environment `{environment}` must specify exactly one of `value` or `pattern`")]
    MatcherValue {
        /// The environment name.
        environment: String,
    },

    /// Two environments were declared with the same name.
    #[error("environment `{name}` is declared more than once")]
    DuplicateEnvironment {
        /// The duplicated name.
        name: String,
    },
}

/// An error that occurred while loading known issues.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KnownIssuesError {
    /// Reading the file failed.
    #[error("error reading known issues file at `{path}`")]
    Read {
        /// The file path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Deserializing the file failed.
    #[error("error deserializing known issues file at `{path}`")]
    Deserialize {
        /// The file path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that occurred while setting up or finalizing a report session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportSessionError {
    /// Reading or appending history failed.
    #[error(transparent)]
    History(#[from] HistoryLogError),

    /// Loading known issues failed.
    #[error(transparent)]
    KnownIssues(#[from] KnownIssuesError),

    /// The store was in the wrong state.
    #[error(transparent)]
    State(#[from] StoreStateError),
}
