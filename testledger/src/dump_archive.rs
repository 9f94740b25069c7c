// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transporting store dumps between processes.
//!
//! A dump archive is a zip file containing:
//!
//! * `dump.json`: the [`StoreDump`].
//! * `attachments/<id>`: the bytes of each attachment whose file arrived,
//!   named by attachment ID.
//!
//! Shards of a distributed run each write an archive with
//! [`write_dump_archive`]. The merging process reads them back with
//! [`read_dump_archive`] and passes the results to
//! [`TestResultStore::restore_state`](crate::store::TestResultStore::restore_state).

use crate::{
    errors::{DumpArchiveError, DumpError, StoreError},
    result_file::ResultFile,
};
use camino::Utf8Path;
use std::{
    collections::HashMap,
    fs::File,
    io::{Read, Write},
};
use testledger_metadata::StoreDump;
use tracing::debug;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// The name of the dump entry.
pub const DUMP_FILE_NAME: &str = "dump.json";

/// The prefix of attachment entries.
pub const ATTACHMENTS_PREFIX: &str = "attachments/";

/// Writes `dump` and the attachment `contents` to a zip archive at `path`.
///
/// `contents` yields (attachment ID, content) pairs, as returned by
/// [`TestResultStore::all_attachment_contents`](crate::store::TestResultStore::all_attachment_contents).
pub fn write_dump_archive<'a>(
    path: &Utf8Path,
    dump: &StoreDump,
    contents: impl IntoIterator<Item = (&'a str, &'a ResultFile)>,
) -> Result<(), DumpArchiveError> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)
        .map_err(|error| DumpArchiveError::Create {
            path: path.to_owned(),
            error,
        })?;
    let mut writer = ZipWriter::new(file);

    let json = serde_json::to_vec(dump).map_err(|error| DumpError::Serialize { error })?;
    add_entry(&mut writer, path, DUMP_FILE_NAME, &json)?;

    let mut count = 0;
    for (id, content) in contents {
        let bytes = content
            .read_all()
            .map_err(|error| DumpArchiveError::AttachmentContent {
                path: path.to_owned(),
                error: StoreError::AttachmentContent {
                    original_file_name: content.original_file_name().to_owned(),
                    error,
                },
            })?;
        add_entry(&mut writer, path, &format!("{ATTACHMENTS_PREFIX}{id}"), &bytes)?;
        count += 1;
    }

    writer.finish().map_err(|error| DumpArchiveError::Zip {
        path: path.to_owned(),
        entry: DUMP_FILE_NAME.to_owned(),
        error,
    })?;
    debug!(
        "wrote dump archive to `{path}` with {} results and {count} attachment files",
        dump.test_results.len(),
    );
    Ok(())
}

fn add_entry(
    writer: &mut ZipWriter<File>,
    path: &Utf8Path,
    entry: &str,
    contents: &[u8],
) -> Result<(), DumpArchiveError> {
    let options = zip::write::FileOptions::<'_, ()>::default()
        .compression_method(CompressionMethod::Deflated);
    writer
        .start_file(entry, options)
        .map_err(|error| DumpArchiveError::Zip {
            path: path.to_owned(),
            entry: entry.to_owned(),
            error,
        })?;
    writer
        .write_all(contents)
        .map_err(|error| DumpArchiveError::Write {
            path: path.to_owned(),
            entry: entry.to_owned(),
            error,
        })
}

/// Reads a dump archive written by [`write_dump_archive`].
///
/// Returns the dump and the attachment contents keyed by attachment ID.
/// Attachment contents are read into memory and carry the original file name
/// recorded in the dump.
pub fn read_dump_archive(
    path: &Utf8Path,
) -> Result<(StoreDump, HashMap<String, ResultFile>), DumpArchiveError> {
    let file = File::open(path).map_err(|error| DumpArchiveError::Open {
        path: path.to_owned(),
        error,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|error| DumpArchiveError::Zip {
        path: path.to_owned(),
        entry: DUMP_FILE_NAME.to_owned(),
        error,
    })?;

    let json = read_entry(&mut archive, path, DUMP_FILE_NAME)?;
    let dump: StoreDump =
        serde_json::from_slice(&json).map_err(|error| DumpError::Deserialize { error })?;

    let attachment_entries: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with(ATTACHMENTS_PREFIX))
        .map(str::to_owned)
        .collect();
    let mut contents = HashMap::with_capacity(attachment_entries.len());
    for entry in attachment_entries {
        let Some(id) = entry.strip_prefix(ATTACHMENTS_PREFIX) else {
            continue;
        };
        let bytes = read_entry(&mut archive, path, &entry)?;
        let original_file_name = dump
            .attachments
            .get(id)
            .map_or(id, |link| link.original_file_name.as_str());
        contents.insert(id.to_owned(), ResultFile::from_bytes(original_file_name, bytes));
    }

    debug!(
        "read dump archive from `{path}` with {} results and {} attachment files",
        dump.test_results.len(),
        contents.len(),
    );
    Ok((dump, contents))
}

fn read_entry(
    archive: &mut ZipArchive<File>,
    path: &Utf8Path,
    entry: &str,
) -> Result<Vec<u8>, DumpArchiveError> {
    let mut file = archive
        .by_name(entry)
        .map_err(|error| DumpArchiveError::Zip {
            path: path.to_owned(),
            entry: entry.to_owned(),
            error,
        })?;
    let mut contents = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
    file.read_to_end(&mut contents)
        .map_err(|error| DumpArchiveError::Read {
            path: path.to_owned(),
            entry: entry.to_owned(),
            error,
        })?;
    Ok(contents)
}
