// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Byte-level primitives over history files.
//!
//! Nothing in here decodes text. Offsets are found by counting `\n` bytes in
//! fixed-size chunks read backward from the end of the file, so memory use is
//! bounded by one buffer regardless of file size, and bytes that aren't valid
//! UTF-8 are never touched.

use crate::errors::HistoryLogError;
use camino::Utf8Path;
use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    time::SystemTime,
};

/// The size of the reusable buffer used for scanning and copying.
pub(super) const SCAN_BUFFER_SIZE: usize = 64 * 1024;

/// The size and modification time of a file at a point in time.
///
/// Two stamps of the same file comparing unequal means that something else
/// wrote to the file in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct FileStamp {
    pub(super) len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    /// Returns the stamp for the file at `path`, or `None` if it doesn't exist.
    pub(super) fn of_path(path: &Utf8Path) -> Result<Option<Self>, HistoryLogError> {
        match std::fs::metadata(path) {
            Ok(metadata) => Ok(Some(Self {
                len: metadata.len(),
                modified: metadata.modified().ok(),
            })),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(HistoryLogError::Metadata {
                path: path.to_owned(),
                error,
            }),
        }
    }

    /// Fails with [`HistoryLogError::ModifiedExternally`] if the file at `path`
    /// no longer matches this stamp.
    pub(super) fn ensure_unchanged(self, path: &Utf8Path) -> Result<(), HistoryLogError> {
        if Self::of_path(path)? == Some(self) {
            Ok(())
        } else {
            Err(HistoryLogError::ModifiedExternally {
                path: path.to_owned(),
            })
        }
    }
}

/// Fills `buf` with the bytes at `offset`.
///
/// A read that ends early is an integrity error: the caller computed
/// `offset + buf.len()` from a size that the file no longer has.
pub(super) fn read_exact_at(
    file: &mut File,
    path: &Utf8Path,
    offset: u64,
    buf: &mut [u8],
) -> Result<(), HistoryLogError> {
    let read_error = |error| HistoryLogError::Read {
        path: path.to_owned(),
        error,
    };

    file.seek(SeekFrom::Start(offset)).map_err(read_error)?;
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(HistoryLogError::ShortRead {
                    path: path.to_owned(),
                    offset,
                    expected: buf.len(),
                    actual: filled,
                });
            }
            Ok(n) => filled += n,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(read_error(error)),
        }
    }
    Ok(())
}

/// Writes all of `buf` at `offset`.
pub(super) fn write_all_at(
    file: &mut File,
    path: &Utf8Path,
    offset: u64,
    buf: &[u8],
) -> Result<(), HistoryLogError> {
    let write_error = |error| HistoryLogError::Write {
        path: path.to_owned(),
        error,
    };
    file.seek(SeekFrom::Start(offset)).map_err(write_error)?;
    file.write_all(buf).map_err(write_error)
}

/// Returns the offset of the first byte of the `keep`-th most recent line.
///
/// * `keep = None` retains everything and returns 0.
/// * `keep = Some(0)` retains nothing and returns `size`.
/// * If the file has `keep` lines or fewer, returns 0.
///
/// A `\n` in the final byte terminates the last line rather than separating
/// it from an empty one, so it isn't counted.
pub(super) fn find_retained_start(
    file: &mut File,
    path: &Utf8Path,
    size: u64,
    keep: Option<usize>,
    buf: &mut [u8],
) -> Result<u64, HistoryLogError> {
    let Some(keep) = keep else {
        return Ok(0);
    };
    if keep == 0 {
        return Ok(size);
    }

    let mut end = size;
    let mut separators_seen = 0usize;
    while end > 0 {
        let chunk_len = end.min(buf.len() as u64) as usize;
        let chunk_start = end - chunk_len as u64;
        let chunk = &mut buf[..chunk_len];
        read_exact_at(file, path, chunk_start, chunk)?;

        for (index, byte) in chunk.iter().enumerate().rev() {
            let pos = chunk_start + index as u64;
            if *byte != b'\n' || pos + 1 == size {
                continue;
            }
            separators_seen += 1;
            if separators_seen == keep {
                return Ok(pos + 1);
            }
        }
        end = chunk_start;
    }

    Ok(0)
}

/// Moves `len` bytes starting at `src` to the start of the file.
///
/// Copies front to back one chunk at a time. Since the destination is always
/// before the source, no chunk overwrites bytes that haven't been read yet.
pub(super) fn move_to_front(
    file: &mut File,
    path: &Utf8Path,
    src: u64,
    len: u64,
    buf: &mut [u8],
) -> Result<(), HistoryLogError> {
    let mut copied = 0u64;
    while copied < len {
        let chunk_len = (len - copied).min(buf.len() as u64) as usize;
        let chunk = &mut buf[..chunk_len];
        read_exact_at(file, path, src + copied, chunk)?;
        write_all_at(file, path, copied, chunk)?;
        copied += chunk_len as u64;
    }
    Ok(())
}
