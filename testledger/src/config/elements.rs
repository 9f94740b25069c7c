// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Individual configuration sections.

use crate::{
    errors::{ConfigError, HistoryLogError},
    history::HistoryLog,
};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Deserialize;
use std::{fmt, sync::Arc};
use testledger_metadata::{TestLabel, TestResult};

/// History configuration (deserialized form).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(in crate::config) struct DeserializedHistoryConfig {
    /// Path to the history file. Relative paths are resolved against the
    /// directory containing the config file.
    pub(in crate::config) path: Option<Utf8PathBuf>,

    /// Number of entries to retain.
    pub(in crate::config) limit: Option<i64>,
}

/// Where run history is kept and how much of it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryConfig {
    /// The history file. No history is read or written if unset.
    pub path: Option<Utf8PathBuf>,

    /// The maximum number of entries to retain. Unbounded if unset.
    pub limit: Option<i64>,
}

impl HistoryConfig {
    /// Creates a history config for the given file.
    pub fn new(path: impl Into<Utf8PathBuf>, limit: Option<i64>) -> Self {
        Self {
            path: Some(path.into()),
            limit,
        }
    }

    /// Opens the history log, if a path is configured.
    pub fn open_log(&self) -> Result<Option<HistoryLog>, HistoryLogError> {
        self.path
            .as_ref()
            .map(|path| HistoryLog::new(path, self.limit))
            .transpose()
    }

    pub(in crate::config) fn resolve(
        default: &DeserializedHistoryConfig,
        user: Option<&DeserializedHistoryConfig>,
        base_dir: Option<&Utf8Path>,
    ) -> Result<Self, ConfigError> {
        let path = user
            .and_then(|user| user.path.as_ref())
            .map(|path| match base_dir {
                Some(base_dir) if path.is_relative() => base_dir.join(path),
                _ => path.clone(),
            })
            .or_else(|| default.path.clone());
        let limit = user.and_then(|user| user.limit).or(default.limit);
        if let Some(limit) = limit
            && limit < 0
        {
            return Err(ConfigError::NegativeHistoryLimit { limit });
        }
        Ok(Self { path, limit })
    }
}

/// The value of an entry in `[default-labels]`: either one value or a list.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub(in crate::config) enum DefaultLabelValues {
    One(String),
    Many(Vec<String>),
}

impl DefaultLabelValues {
    pub(in crate::config) fn to_labels(&self, name: &str) -> Vec<TestLabel> {
        match self {
            Self::One(value) => vec![TestLabel::new(name, value)],
            Self::Many(values) => values
                .iter()
                .map(|value| TestLabel::new(name, value))
                .collect(),
        }
    }
}

/// An `[[environments]]` entry (deserialized form).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(in crate::config) struct DeserializedEnvironment {
    pub(in crate::config) name: String,
    pub(in crate::config) matcher: DeserializedLabelMatcher,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(in crate::config) struct DeserializedLabelMatcher {
    label: String,
    value: Option<String>,
    pattern: Option<String>,
}

impl DeserializedLabelMatcher {
    pub(in crate::config) fn compile(self, environment: &str) -> Result<LabelMatcher, ConfigError> {
        match (self.value, self.pattern) {
            (Some(value), None) => Ok(LabelMatcher::exact(self.label, value)),
            (None, Some(pattern)) => {
                let regex =
                    Regex::new(&pattern).map_err(|error| ConfigError::InvalidMatcherPattern {
                        environment: environment.to_owned(),
                        pattern: pattern.clone(),
                        error,
                    })?;
                Ok(LabelMatcher::pattern(self.label, regex))
            }
            _ => Err(ConfigError::MatcherValue {
                environment: environment.to_owned(),
            }),
        }
    }
}

/// Decides whether a test result belongs to an environment.
///
/// Matchers see the result after default labels have been applied and before
/// its environment is assigned.
pub trait EnvironmentMatcher: fmt::Debug + Send + Sync {
    /// Returns true if `result` belongs to the environment.
    fn matches(&self, result: &TestResult) -> bool;
}

/// Matches results carrying a label with a particular value.
#[derive(Clone, Debug)]
pub struct LabelMatcher {
    label: String,
    kind: LabelMatchKind,
}

#[derive(Clone, Debug)]
enum LabelMatchKind {
    Exact(String),
    Pattern(Regex),
}

impl LabelMatcher {
    /// Matches results with a `label` whose value is exactly `value`.
    pub fn exact(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: LabelMatchKind::Exact(value.into()),
        }
    }

    /// Matches results with a `label` whose value matches `pattern`.
    pub fn pattern(label: impl Into<String>, pattern: Regex) -> Self {
        Self {
            label: label.into(),
            kind: LabelMatchKind::Pattern(pattern),
        }
    }
}

impl EnvironmentMatcher for LabelMatcher {
    fn matches(&self, result: &TestResult) -> bool {
        result
            .label_values(&self.label)
            .any(|value| match &self.kind {
                LabelMatchKind::Exact(expected) => value == expected,
                LabelMatchKind::Pattern(pattern) => pattern.is_match(value),
            })
    }
}

/// A named environment and the matcher that selects its results.
#[derive(Clone, Debug)]
pub struct EnvironmentConfig {
    name: String,
    matcher: Arc<dyn EnvironmentMatcher>,
}

impl EnvironmentConfig {
    /// Creates a new environment definition.
    pub fn new(name: impl Into<String>, matcher: impl EnvironmentMatcher + 'static) -> Self {
        Self {
            name: name.into(),
            matcher: Arc::new(matcher),
        }
    }

    /// The environment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if `result` belongs to this environment.
    pub fn matches(&self, result: &TestResult) -> bool {
        self.matcher.matches(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testledger_metadata::{TestResultId, TestStatus};

    fn result_with_labels(labels: &[(&str, &str)]) -> TestResult {
        TestResult {
            id: TestResultId::new_v4(),
            name: "test".to_owned(),
            full_name: None,
            test_case_id: None,
            history_id: None,
            environment: String::new(),
            status: TestStatus::Passed,
            error: None,
            start: None,
            stop: None,
            duration: None,
            labels: labels
                .iter()
                .map(|(name, value)| TestLabel::new(*name, *value))
                .collect(),
            parameters: Vec::new(),
            links: Vec::new(),
            steps: Vec::new(),
            hidden: false,
            flaky: false,
            muted: false,
            transition: None,
            source_metadata: Default::default(),
        }
    }

    #[test]
    fn label_matchers() {
        let chrome = result_with_labels(&[("browser", "chrome"), ("os", "linux")]);
        let chromium = result_with_labels(&[("browser", "chromium")]);

        let exact = LabelMatcher::exact("browser", "chrome");
        assert!(exact.matches(&chrome));
        assert!(!exact.matches(&chromium));

        let pattern = LabelMatcher::pattern("browser", Regex::new("^chrom").unwrap());
        assert!(pattern.matches(&chrome));
        assert!(pattern.matches(&chromium));
        assert!(!pattern.matches(&result_with_labels(&[("os", "chrome-os")])));
    }

    #[test]
    fn matcher_requires_exactly_one_of_value_and_pattern() {
        let both = DeserializedLabelMatcher {
            label: "browser".to_owned(),
            value: Some("chrome".to_owned()),
            pattern: Some("^chrom".to_owned()),
        };
        assert!(matches!(
            both.compile("chrome"),
            Err(ConfigError::MatcherValue { environment }) if environment == "chrome"
        ));

        let invalid = DeserializedLabelMatcher {
            label: "browser".to_owned(),
            value: None,
            pattern: Some("(".to_owned()),
        };
        assert!(matches!(
            invalid.compile("chrome"),
            Err(ConfigError::InvalidMatcherPattern { .. })
        ));
    }
}
