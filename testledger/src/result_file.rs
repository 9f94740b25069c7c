// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Files found in a results directory.

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use std::{fs::File, io::Read};

/// A file handed to the store, either as a path on disk or as bytes already
/// in memory.
///
/// The original file name is what attachment links refer to, so it is kept
/// separately from the content's location.
#[derive(Clone, Debug)]
pub struct ResultFile {
    original_file_name: String,
    content: ResultFileContent,
}

/// Where the bytes of a [`ResultFile`] live.
#[derive(Clone, Debug)]
pub enum ResultFileContent {
    /// The content is in memory.
    Bytes(Bytes),

    /// The content is read from this path on demand.
    Path(Utf8PathBuf),
}

impl ResultFile {
    /// Creates a file from in-memory content.
    pub fn from_bytes(original_file_name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            original_file_name: original_file_name.into(),
            content: ResultFileContent::Bytes(content.into()),
        }
    }

    /// Creates a file backed by `path`. The original file name is the last
    /// component of the path.
    pub fn from_path(path: impl Into<Utf8PathBuf>) -> Self {
        let path = path.into();
        let original_file_name = path.file_name().unwrap_or(path.as_str()).to_owned();
        Self {
            original_file_name,
            content: ResultFileContent::Path(path),
        }
    }

    /// The name this file was reported under.
    pub fn original_file_name(&self) -> &str {
        &self.original_file_name
    }

    /// Where the content lives.
    pub fn content(&self) -> &ResultFileContent {
        &self.content
    }

    /// The path backing this file, if it is on disk.
    pub fn path(&self) -> Option<&Utf8Path> {
        match &self.content {
            ResultFileContent::Bytes(_) => None,
            ResultFileContent::Path(path) => Some(path),
        }
    }

    /// Returns the size of the content in bytes.
    pub fn content_length(&self) -> std::io::Result<u64> {
        match &self.content {
            ResultFileContent::Bytes(bytes) => Ok(bytes.len() as u64),
            ResultFileContent::Path(path) => Ok(std::fs::metadata(path)?.len()),
        }
    }

    /// Reads up to `len` bytes from the start of the content.
    pub fn read_head(&self, len: usize) -> std::io::Result<Bytes> {
        match &self.content {
            ResultFileContent::Bytes(bytes) => Ok(bytes.slice(..len.min(bytes.len()))),
            ResultFileContent::Path(path) => {
                let mut head = Vec::with_capacity(len);
                File::open(path)?.take(len as u64).read_to_end(&mut head)?;
                Ok(head.into())
            }
        }
    }

    /// Reads the whole content.
    pub fn read_all(&self) -> std::io::Result<Bytes> {
        match &self.content {
            ResultFileContent::Bytes(bytes) => Ok(bytes.clone()),
            ResultFileContent::Path(path) => Ok(std::fs::read(path)?.into()),
        }
    }
}
