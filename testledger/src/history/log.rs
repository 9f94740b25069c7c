// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::scan::{
    FileStamp, SCAN_BUFFER_SIZE, find_retained_start, move_to_front, read_exact_at, write_all_at,
};
use crate::errors::HistoryLogError;
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufReader, Read, Seek, SeekFrom},
};
use testledger_metadata::HistoryDataPoint;
use tracing::{debug, warn};

/// A size-bounded, append-only log of [`HistoryDataPoint`]s.
///
/// The backing file holds one JSON object per `\n`-terminated line, oldest
/// first. Only the most recent `limit` entries are ever read, and appending
/// rotates the file so that at most `limit` entries remain.
///
/// Entries are cached after the first read. The log assumes it is the only
/// writer for its path; concurrent modification by another process is
/// detected and reported as [`HistoryLogError::ModifiedExternally`].
#[derive(Debug)]
pub struct HistoryLog {
    path: Utf8PathBuf,
    limit: Option<usize>,
    cache: Option<Vec<HistoryDataPoint>>,
}

impl HistoryLog {
    /// Creates a new log over `path`, retaining at most `limit` entries.
    ///
    /// `None` retains everything. A negative limit is rejected here, before
    /// any I/O.
    pub fn new(path: impl Into<Utf8PathBuf>, limit: Option<i64>) -> Result<Self, HistoryLogError> {
        let limit = match limit {
            Some(limit) if limit < 0 => return Err(HistoryLogError::InvalidLimit { limit }),
            // Anything past usize::MAX can't be in memory anyway.
            Some(limit) => Some(usize::try_from(limit).unwrap_or(usize::MAX)),
            None => None,
        };
        Ok(Self {
            path: path.into(),
            limit,
            cache: None,
        })
    }

    /// Returns the path to the history file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the retention limit.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Returns the retained entries, oldest first.
    ///
    /// The first call reads from disk. A missing file is treated as empty.
    /// Later calls return the cached entries without touching the file.
    pub fn read_history(&mut self) -> Result<&[HistoryDataPoint], HistoryLogError> {
        let entries = match self.cache.take() {
            Some(entries) => entries,
            None => self.load_with(|| {})?,
        };
        Ok(self.cache.insert(entries).as_slice())
    }

    /// Appends an entry, dropping the oldest entries so that at most `limit`
    /// remain.
    ///
    /// Retained lines are moved as raw bytes and never decoded, so their
    /// contents survive byte-for-byte.
    pub fn append_history(&mut self, entry: HistoryDataPoint) -> Result<(), HistoryLogError> {
        self.append_with(entry, || {})
    }

    fn load_with(&self, after_scan: impl FnOnce()) -> Result<Vec<HistoryDataPoint>, HistoryLogError> {
        if self.limit == Some(0) {
            return Ok(Vec::new());
        }

        let Some(stamp) = FileStamp::of_path(&self.path)? else {
            debug!("history file `{}` does not exist, starting empty", self.path);
            return Ok(Vec::new());
        };
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!("history file `{}` disappeared before opening", self.path);
                return Ok(Vec::new());
            }
            Err(error) => {
                return Err(HistoryLogError::Open {
                    path: self.path.clone(),
                    error,
                });
            }
        };

        let mut buf = vec![0u8; SCAN_BUFFER_SIZE];
        let start = find_retained_start(&mut file, &self.path, stamp.len, self.limit, &mut buf)?;
        drop(buf);
        let entries = self.parse_from(&mut file, start, stamp.len)?;

        after_scan();
        stamp.ensure_unchanged(&self.path)?;

        debug!(
            "read {} history entries from `{}` (offset {start} of {} bytes)",
            entries.len(),
            self.path,
            stamp.len,
        );
        Ok(entries)
    }

    /// Decodes the lines in `start..end`, skipping blank and undecodable ones.
    fn parse_from(
        &self,
        file: &mut File,
        start: u64,
        end: u64,
    ) -> Result<Vec<HistoryDataPoint>, HistoryLogError> {
        let read_error = |error| HistoryLogError::Read {
            path: self.path.clone(),
            error,
        };

        file.seek(SeekFrom::Start(start)).map_err(read_error)?;
        let mut reader = BufReader::with_capacity(SCAN_BUFFER_SIZE, file.take(end - start));
        let mut line = Vec::new();
        let mut line_start = start;
        let mut entries = Vec::new();
        let mut skipped = 0usize;

        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line).map_err(read_error)?;
            if read == 0 {
                break;
            }
            let offset = line_start;
            line_start += read as u64;

            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_slice::<HistoryDataPoint>(trimmed) {
                Ok(entry) => entries.push(entry),
                Err(error) => {
                    skipped += 1;
                    warn!(
                        "skipping undecodable history entry at offset {offset} in `{}`: {error}",
                        self.path,
                    );
                }
            }
        }

        if skipped > 0 {
            debug!("skipped {skipped} history lines in `{}`", self.path);
        }
        Ok(entries)
    }

    fn append_with(
        &mut self,
        entry: HistoryDataPoint,
        after_scan: impl FnOnce(),
    ) -> Result<(), HistoryLogError> {
        let mut line =
            serde_json::to_vec(&entry).map_err(|error| HistoryLogError::Serialize { error })?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent()
            && !parent.as_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|error| HistoryLogError::CreateDir {
                path: parent.to_owned(),
                error,
            })?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|error| HistoryLogError::Open {
                path: self.path.clone(),
                error,
            })?;

        if self.limit == Some(0) {
            self.set_len(&file, 0)?;
            debug!("history limit is 0, truncated `{}`", self.path);
            self.cache = Some(Vec::new());
            return Ok(());
        }

        let stamp = FileStamp::of_path(&self.path)?.ok_or_else(|| {
            HistoryLogError::ModifiedExternally {
                path: self.path.clone(),
            }
        })?;
        let size = stamp.len;
        let keep = self.limit.map(|limit| limit - 1);

        let mut buf = vec![0u8; SCAN_BUFFER_SIZE];
        let start = find_retained_start(&mut file, &self.path, size, keep, &mut buf)?;
        let preserved = size - start;
        let needs_separator = if preserved > 0 {
            let mut last = [0u8; 1];
            read_exact_at(&mut file, &self.path, size - 1, &mut last)?;
            last[0] != b'\n'
        } else {
            false
        };

        after_scan();
        stamp.ensure_unchanged(&self.path)?;

        if start > 0 {
            move_to_front(&mut file, &self.path, start, preserved, &mut buf)?;
        }
        let mut write_pos = preserved;
        if needs_separator {
            write_all_at(&mut file, &self.path, write_pos, b"\n")?;
            write_pos += 1;
        }
        write_all_at(&mut file, &self.path, write_pos, &line)?;
        write_pos += line.len() as u64;
        self.set_len(&file, write_pos)?;

        debug!(
            "appended history entry to `{}`: dropped {start} bytes, kept {preserved}, \
             new length {write_pos}",
            self.path,
        );

        if let Some(cache) = &mut self.cache {
            cache.push(entry);
            if let Some(limit) = self.limit {
                let excess = cache.len().saturating_sub(limit);
                cache.drain(..excess);
            }
        }
        Ok(())
    }

    fn set_len(&self, file: &File, len: u64) -> Result<(), HistoryLogError> {
        file.set_len(len).map_err(|error| HistoryLogError::Truncate {
            path: self.path.clone(),
            len,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use std::io::Write;

    fn entry(name: &str) -> HistoryDataPoint {
        HistoryDataPoint::new(name, 0)
    }

    fn names(entries: &[HistoryDataPoint]) -> Vec<&str> {
        entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    fn append_raw(path: &Utf8Path, bytes: &[u8]) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(bytes).unwrap();
    }

    #[test]
    fn negative_limit_fails_before_io() {
        let error = HistoryLog::new("/nonexistent/dir/history.jsonl", Some(-1)).unwrap_err();
        assert!(
            matches!(error, HistoryLogError::InvalidLimit { limit: -1 }),
            "unexpected error: {error}"
        );
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = Utf8TempDir::new().unwrap();
        let mut log = HistoryLog::new(dir.path().join("history.jsonl"), Some(5)).unwrap();
        assert!(log.read_history().unwrap().is_empty());
    }

    #[test]
    fn append_creates_parent_directories() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/history.jsonl");
        let mut log = HistoryLog::new(&path, None).unwrap();
        log.append_history(entry("first")).unwrap();

        let mut reopened = HistoryLog::new(&path, None).unwrap();
        assert_eq!(names(reopened.read_history().unwrap()), ["first"]);
    }

    #[test]
    fn blank_and_undecodable_lines_are_skipped() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let mut log = HistoryLog::new(&path, None).unwrap();
        log.append_history(entry("a")).unwrap();
        append_raw(&path, b"\n   \nnot json\n");
        log.append_history(entry("b")).unwrap();

        let mut reopened = HistoryLog::new(&path, None).unwrap();
        assert_eq!(names(reopened.read_history().unwrap()), ["a", "b"]);
    }

    #[test]
    fn separator_added_when_final_newline_missing() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let first = serde_json::to_vec(&entry("a")).unwrap();
        std::fs::write(&path, &first).unwrap();

        let mut log = HistoryLog::new(&path, Some(3)).unwrap();
        log.append_history(entry("b")).unwrap();

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(&contents[..first.len()], first.as_slice());
        assert_eq!(contents[first.len()], b'\n');
        assert_eq!(contents.iter().filter(|b| **b == b'\n').count(), 2);

        let mut reopened = HistoryLog::new(&path, Some(3)).unwrap();
        assert_eq!(names(reopened.read_history().unwrap()), ["a", "b"]);
    }

    #[test]
    fn append_updates_loaded_cache() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let mut log = HistoryLog::new(&path, Some(2)).unwrap();
        assert!(log.read_history().unwrap().is_empty());

        for name in ["a", "b", "c"] {
            log.append_history(entry(name)).unwrap();
        }
        std::fs::remove_file(&path).unwrap();
        assert_eq!(names(log.read_history().unwrap()), ["b", "c"]);
    }

    #[test]
    fn limit_zero_truncates() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        std::fs::write(&path, b"whatever\n").unwrap();

        let mut log = HistoryLog::new(&path, Some(0)).unwrap();
        log.append_history(entry("a")).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        assert!(log.read_history().unwrap().is_empty());
    }

    #[test]
    fn read_detects_external_modification() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let mut log = HistoryLog::new(&path, None).unwrap();
        log.append_history(entry("a")).unwrap();

        let error = log
            .load_with(|| append_raw(&path, b"{}\n"))
            .unwrap_err();
        assert!(
            matches!(error, HistoryLogError::ModifiedExternally { .. }),
            "unexpected error: {error}"
        );
    }

    #[test]
    fn append_detects_external_modification() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let mut log = HistoryLog::new(&path, Some(1)).unwrap();
        log.append_history(entry("a")).unwrap();
        let before = std::fs::read(&path).unwrap();

        let error = log
            .append_with(entry("b"), || append_raw(&path, b"x"))
            .unwrap_err();
        assert!(
            matches!(error, HistoryLogError::ModifiedExternally { .. }),
            "unexpected error: {error}"
        );

        // Nothing was moved or truncated.
        let mut expected = before;
        expected.push(b'x');
        assert_eq!(std::fs::read(&path).unwrap(), expected);
    }
}
