// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Shape of the runner's `--list --json` output: source path -> contract
/// name -> test names.
pub type TestListing = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Identity of one property test, discovered once per campaign.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestCase {
    pub source_path: String,
    pub contract: String,
    pub test: String,
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.contract, self.test)
    }
}

/// Flattens a listing into `(sourcePath, contract, test)` triples.
pub fn flatten_listing(listing: TestListing) -> Vec<TestCase> {
    listing
        .into_iter()
        .flat_map(|(source_path, contracts)| {
            contracts.into_iter().flat_map(move |(contract, tests)| {
                let source_path = source_path.clone();
                tests.into_iter().map(move |test| TestCase {
                    source_path: source_path.clone(),
                    contract: contract.clone(),
                    test,
                })
            })
        })
        .collect()
}
