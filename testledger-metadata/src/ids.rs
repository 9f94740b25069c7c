// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use newtype_uuid::{TypedUuid, TypedUuidKind, TypedUuidTag};

/// Kind marker for [`TestResultId`].
pub enum TestResultKind {}

impl TypedUuidKind for TestResultKind {
    #[inline]
    fn tag() -> TypedUuidTag {
        const TAG: TypedUuidTag = TypedUuidTag::new("test_result");
        TAG
    }
}

/// Kind marker for [`TestFixtureResultId`].
pub enum TestFixtureResultKind {}

impl TypedUuidKind for TestFixtureResultKind {
    #[inline]
    fn tag() -> TypedUuidTag {
        const TAG: TypedUuidTag = TypedUuidTag::new("test_fixture_result");
        TAG
    }
}

/// Kind marker for [`HistoryDataPointId`].
pub enum HistoryDataPointKind {}

impl TypedUuidKind for HistoryDataPointKind {
    #[inline]
    fn tag() -> TypedUuidTag {
        const TAG: TypedUuidTag = TypedUuidTag::new("history_data_point");
        TAG
    }
}

/// The run-local identifier of a single test execution attempt.
pub type TestResultId = TypedUuid<TestResultKind>;

/// The run-local identifier of a setup or teardown record.
pub type TestFixtureResultId = TypedUuid<TestFixtureResultKind>;

/// The identifier of one run's entry in a history file.
pub type HistoryDataPointId = TypedUuid<HistoryDataPointKind>;
