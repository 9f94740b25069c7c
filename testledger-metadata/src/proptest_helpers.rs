// Copyright (c) The testledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::TestStatus;
use proptest::prelude::*;

impl Arbitrary for TestStatus {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop::sample::select(TestStatus::ALL.to_vec()).boxed()
    }
}
