// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Known failures tracked against issues.
//!
//! The known issues file is a JSON array of [`KnownTestFailure`] entries,
//! each naming the history ID of a test that is expected to fail.

use crate::errors::KnownIssuesError;
use camino::Utf8Path;
use std::fs;
use testledger_metadata::KnownTestFailure;
use tracing::debug;

/// The contents of a known issues file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KnownIssues {
    failures: Vec<KnownTestFailure>,
}

impl KnownIssues {
    /// Loads known issues from `path`.
    ///
    /// A missing file yields no known issues.
    pub fn load(path: &Utf8Path) -> Result<Self, KnownIssuesError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let failures: Vec<KnownTestFailure> =
                    serde_json::from_str(&contents).map_err(|error| {
                        KnownIssuesError::Deserialize {
                            path: path.to_owned(),
                            error,
                        }
                    })?;
                debug!("loaded {} known issues from `{path}`", failures.len());
                Ok(Self { failures })
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!("known issues file `{path}` not found, assuming none");
                Ok(Self::default())
            }
            Err(error) => Err(KnownIssuesError::Read {
                path: path.to_owned(),
                error,
            }),
        }
    }

    /// The known failures, in file order.
    pub fn failures(&self) -> &[KnownTestFailure] {
        &self.failures
    }

    /// Consumes `self`, returning the known failures.
    pub fn into_failures(self) -> Vec<KnownTestFailure> {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::tempdir;
    use indoc::indoc;

    #[test]
    fn load_known_issues() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("known.json");

        assert_eq!(KnownIssues::load(&path).unwrap(), KnownIssues::default());

        fs::write(
            &path,
            indoc! {r#"
                [
                    {
                        "history-id": "abc.def",
                        "issues": [{"url": "https://issues.example.com/1", "type": "issue"}],
                        "comment": "flaky on CI"
                    }
                ]
            "#},
        )
        .unwrap();
        let known = KnownIssues::load(&path).unwrap();
        assert_eq!(known.failures().len(), 1);
        let failure = &known.failures()[0];
        assert_eq!(failure.history_id, "abc.def");
        assert_eq!(failure.issues[0].link_type.as_deref(), Some("issue"));
        assert_eq!(failure.comment.as_deref(), Some("flaky on CI"));

        fs::write(&path, "{").unwrap();
        assert!(matches!(
            KnownIssues::load(&path),
            Err(KnownIssuesError::Deserialize { .. })
        ));
    }
}
