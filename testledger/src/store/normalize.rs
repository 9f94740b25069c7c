// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Derived identifiers and field normalization for ingested records.

use crate::helpers::hash_str;
use itertools::Itertools;
use testledger_metadata::TestParameter;

/// The parameters hash of a test without (non-excluded) parameters.
pub const EMPTY_PARAMETERS_HASH: &str = "00000000000000000000000000000000";

/// Computes the history ID of a test.
///
/// The ID is `hash(identity) + "." + parameters_hash(parameters)`, where the
/// identity is `test_id` if present, else `full_name`. Returns `None` if both
/// are absent: such a result can't be correlated across runs.
pub fn history_id(
    test_id: Option<&str>,
    full_name: Option<&str>,
    parameters: &[TestParameter],
) -> Option<String> {
    let identity = test_id.or(full_name)?;
    Some(format!("{}.{}", hash_str(identity), parameters_hash(parameters)))
}

/// Computes the test case ID: the hash of `test_id`, else of `full_name`.
pub fn test_case_id(test_id: Option<&str>, full_name: Option<&str>) -> Option<String> {
    test_id.or(full_name).map(hash_str)
}

/// Hashes the non-excluded parameters, independent of their order.
///
/// Parameters are sorted by name and then value, rendered as `name:value` and
/// joined with `,`. No parameters hash to [`EMPTY_PARAMETERS_HASH`].
pub fn parameters_hash(parameters: &[TestParameter]) -> String {
    let joined = parameters
        .iter()
        .filter(|parameter| !parameter.excluded)
        .map(|parameter| (parameter.name.as_str(), parameter.value.as_str()))
        .sorted()
        .map(|(name, value)| format!("{name}:{value}"))
        .join(",");
    if joined.is_empty() {
        EMPTY_PARAMETERS_HASH.to_owned()
    } else {
        hash_str(&joined)
    }
}

/// Returns the display name of a test: `name` if non-empty, else the last
/// segment of `full_name`.
pub(super) fn display_name(name: Option<String>, full_name: Option<&str>) -> String {
    if let Some(name) = name.filter(|name| !name.trim().is_empty()) {
        return name;
    }
    full_name
        .and_then(|full_name| {
            full_name
                .rsplit(['.', '#', '/', ':'])
                .find(|segment| !segment.trim().is_empty())
        })
        .map_or_else(|| "Unknown test".to_owned(), |segment| segment.trim().to_owned())
}

/// Returns the explicit duration, else `stop - start` when both are known.
pub(super) fn duration(
    explicit: Option<i64>,
    start: Option<i64>,
    stop: Option<i64>,
) -> Option<i64> {
    explicit.or_else(|| Some(stop?.saturating_sub(start?).max(0)))
}
