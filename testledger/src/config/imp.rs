// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::elements::{
    DefaultLabelValues, DeserializedEnvironment, DeserializedHistoryConfig, EnvironmentConfig,
    EnvironmentMatcher, HistoryConfig,
};
use crate::errors::ConfigError;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::Deserialize;
use std::{
    collections::{BTreeSet, HashSet},
    io,
};
use testledger_metadata::{TestLabel, TestResult};
use tracing::{debug, warn};

/// Configuration for a [`TestResultStore`](crate::store::TestResultStore) and
/// the report session around it.
///
/// Obtained from a TOML file with [`StoreConfig::from_path`], or built in code
/// starting from [`StoreConfig::default`].
#[derive(Clone, Debug)]
pub struct StoreConfig {
    report_name: String,
    environment: Option<String>,
    known_issues: Option<Utf8PathBuf>,
    history: HistoryConfig,
    default_labels: Vec<TestLabel>,
    environments: Vec<EnvironmentConfig>,
}

impl StoreConfig {
    /// The environment assigned to results that no matcher selects.
    pub const DEFAULT_ENVIRONMENT: &'static str = "default";

    /// Loads configuration from a TOML file.
    ///
    /// Relative paths within the file are resolved against the directory
    /// containing it. Returns an error if the file doesn't exist.
    pub fn from_path(path: &Utf8Path) -> Result<Self, ConfigError> {
        Self::from_path_with_warnings(path, &mut DefaultStoreConfigWarnings)
    }

    fn from_path_with_warnings(
        path: &Utf8Path,
        warnings: &mut impl StoreConfigWarnings,
    ) -> Result<Self, ConfigError> {
        debug!("store config: loading from {path}");
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::FileNotFound {
                    path: path.to_owned(),
                });
            }
            Err(error) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    error,
                });
            }
        };

        let (config, unknown) =
            DeserializedStoreConfig::deserialize_toml(&contents).map_err(|error| {
                ConfigError::Parse {
                    path: path.to_owned(),
                    error,
                }
            })?;
        if !unknown.is_empty() {
            warnings.unknown_config_keys(path, &unknown);
        }

        let resolved = Self::resolve(&DefaultStoreConfig::from_embedded(), config, path.parent())?;
        debug!("store config: loaded successfully from {path}");
        Ok(resolved)
    }

    fn resolve(
        default: &DefaultStoreConfig,
        user: DeserializedStoreConfig,
        base_dir: Option<&Utf8Path>,
    ) -> Result<Self, ConfigError> {
        let history = HistoryConfig::resolve(&default.history, Some(&user.history), base_dir)?;

        // User entries replace default entries for the same label name.
        let mut label_values = default.default_labels.clone();
        label_values.extend(user.default_labels);
        let default_labels = label_values
            .iter()
            .flat_map(|(name, values)| values.to_labels(name))
            .collect();

        let mut seen = HashSet::new();
        let mut environments = Vec::with_capacity(user.environments.len());
        for DeserializedEnvironment { name, matcher } in user.environments {
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateEnvironment { name });
            }
            let matcher = matcher.compile(&name)?;
            environments.push(EnvironmentConfig::new(name, matcher));
        }

        let known_issues = user.known_issues.map(|path| match base_dir {
            Some(base_dir) if path.is_relative() => base_dir.join(path),
            _ => path,
        });

        Ok(Self {
            report_name: user
                .report_name
                .unwrap_or_else(|| default.report_name.clone()),
            environment: user.environment,
            known_issues,
            history,
            default_labels,
            environments,
        })
    }

    /// Sets the report name.
    pub fn with_report_name(mut self, report_name: impl Into<String>) -> Self {
        self.report_name = report_name.into();
        self
    }

    /// Assigns every result to `environment`, bypassing the matchers.
    pub fn with_environment_override(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Sets the path to the known issues file.
    pub fn with_known_issues(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.known_issues = Some(path.into());
        self
    }

    /// Sets the history configuration.
    pub fn with_history(mut self, history: HistoryConfig) -> Self {
        self.history = history;
        self
    }

    /// Adds a label applied to results that have no label of that name.
    pub fn with_default_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_labels.push(TestLabel::new(name, value));
        self
    }

    /// Adds an environment, evaluated after the ones already present.
    pub fn with_environment(
        mut self,
        name: impl Into<String>,
        matcher: impl EnvironmentMatcher + 'static,
    ) -> Self {
        self.environments.push(EnvironmentConfig::new(name, matcher));
        self
    }

    /// The report name.
    pub fn report_name(&self) -> &str {
        &self.report_name
    }

    /// The environment override, if any.
    pub fn environment_override(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// The known issues file, if any.
    pub fn known_issues(&self) -> Option<&Utf8Path> {
        self.known_issues.as_deref()
    }

    /// The history configuration.
    pub fn history(&self) -> &HistoryConfig {
        &self.history
    }

    /// Labels applied to results lacking a label of the same name.
    pub fn default_labels(&self) -> &[TestLabel] {
        &self.default_labels
    }

    /// Environments in declaration order.
    pub fn environments(&self) -> &[EnvironmentConfig] {
        &self.environments
    }

    /// Returns the environment a result belongs to.
    ///
    /// The override wins if set. Otherwise the first environment whose
    /// matcher selects the result is used, then [`Self::DEFAULT_ENVIRONMENT`].
    pub fn resolve_environment(&self, result: &TestResult) -> &str {
        if let Some(environment) = &self.environment {
            return environment;
        }
        self.environments
            .iter()
            .find(|environment| environment.matches(result))
            .map_or(Self::DEFAULT_ENVIRONMENT, |environment| environment.name())
    }

    /// Appends default labels whose names are entirely absent from `labels`.
    pub(crate) fn apply_default_labels(&self, labels: &mut Vec<TestLabel>) {
        let present: HashSet<String> = labels.iter().map(|label| label.name.clone()).collect();
        labels.extend(
            self.default_labels
                .iter()
                .filter(|label| !present.contains(&label.name))
                .cloned(),
        );
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let default = DefaultStoreConfig::from_embedded();
        Self::resolve(&default, DeserializedStoreConfig::default(), None)
            .unwrap_or_else(|error| panic!("embedded default store config is invalid: {error}"))
    }
}

/// Trait for handling configuration warnings.
trait StoreConfigWarnings {
    /// Handle unknown configuration keys found in a config file.
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

/// Logs warnings using the tracing crate.
struct DefaultStoreConfigWarnings;

impl StoreConfigWarnings for DefaultStoreConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        let mut unknown_str = String::new();
        if let [key] = unknown.iter().collect::<Vec<_>>().as_slice() {
            // Print this on the same line.
            unknown_str.push_str("key: ");
            unknown_str.push_str(key);
        } else {
            unknown_str.push_str("keys:\n");
            for ignored_key in unknown {
                unknown_str.push('\n');
                unknown_str.push_str("  - ");
                unknown_str.push_str(ignored_key);
            }
        }

        warn!("in config file {config_file}, ignoring unknown configuration {unknown_str}");
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DeserializedStoreConfig {
    report_name: Option<String>,
    environment: Option<String>,
    known_issues: Option<Utf8PathBuf>,
    #[serde(default)]
    history: DeserializedHistoryConfig,
    #[serde(default)]
    default_labels: IndexMap<String, DefaultLabelValues>,
    #[serde(default)]
    environments: Vec<DeserializedEnvironment>,
}

impl DeserializedStoreConfig {
    fn deserialize_toml(contents: &str) -> Result<(Self, BTreeSet<String>), toml::de::Error> {
        let deserializer = toml::Deserializer::parse(contents)?;
        let mut unknown = BTreeSet::new();
        let config: DeserializedStoreConfig = serde_ignored::deserialize(deserializer, |path| {
            unknown.insert(path.to_string());
        })?;
        Ok((config, unknown))
    }
}

/// The embedded default configuration. Every field is required.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultStoreConfig {
    report_name: String,
    history: DeserializedHistoryConfig,
    default_labels: IndexMap<String, DefaultLabelValues>,
}

impl DefaultStoreConfig {
    const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Panics if the embedded TOML is invalid or contains unknown keys.
    fn from_embedded() -> Self {
        let deserializer = toml::Deserializer::parse(Self::DEFAULT_CONFIG)
            .expect("embedded default config should parse");
        let mut unknown = BTreeSet::new();
        let config: DefaultStoreConfig =
            serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
                unknown.insert(path.to_string());
            })
            .expect("embedded default config should be valid");

        if !unknown.is_empty() {
            panic!(
                "found unknown keys in default config: {}",
                unknown.into_iter().collect::<Vec<_>>().join(", ")
            );
        }
        config
    }
}
