// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Child-process boundary to the external test runner. Everything the
//! campaign knows about forge lives here: the list/execute CLI surface, the
//! JSON result schema, and the persisted failure cache it keeps per test.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::process::Output;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

use crate::catalog::{flatten_listing, TestCase, TestListing};
use crate::config::{CampaignConfig, Configuration};

#[derive(Debug, Error)]
pub enum CampaignError {
    /// The runner process itself failed for a non-property reason.
    #[error("forge exited with code {code:?}: {stderr}")]
    Runner { code: Option<i32>, stderr: String },
    /// The runner produced output that does not match the expected schema.
    #[error("malformed forge output: {0}")]
    Schema(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CampaignError {
    /// Exit code the campaign process terminates with when this error is
    /// fatal: the failing child's own code where one exists, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            CampaignError::Runner { code, .. } => code.unwrap_or(1),
            _ => 1,
        }
    }
}

/// One element of a counterexample sequence. Field names match the
/// runner's JSON verbatim so steps round-trip through artifacts unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStep {
    pub sender: String,
    pub addr: String,
    pub calldata: String,
    #[serde(default)]
    pub contract_name: Option<String>,
    pub signature: String,
    #[serde(default)]
    pub args: String,
}

/// forge emits `Single` for plain fuzz tests and `Sequence` for invariant
/// runs; both normalize to an ordered step list.
#[derive(Clone, Debug, Deserialize)]
pub enum CounterExample {
    Single(CallStep),
    Sequence(Vec<CallStep>),
}

impl CounterExample {
    pub fn into_sequence(self) -> Vec<CallStep> {
        match self {
            CounterExample::Single(step) => vec![step],
            CounterExample::Sequence(steps) => steps,
        }
    }
}

/// Result of one test inside one runner invocation.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "status")]
pub enum TestResult {
    Success {
        #[serde(default)]
        labeled_addresses: BTreeMap<String, String>,
    },
    Failure {
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        counterexample: Option<CounterExample>,
        #[serde(default)]
        labeled_addresses: BTreeMap<String, String>,
    },
}

#[derive(Clone, Debug, Deserialize)]
pub struct SuiteResult {
    pub test_results: BTreeMap<String, TestResult>,
}

/// Wraps every invocation of the external runner.
pub struct ForgeRunner {
    config: Arc<CampaignConfig>,
}

impl ForgeRunner {
    pub fn new(config: Arc<CampaignConfig>) -> Self {
        Self { config }
    }

    /// Discovers the test catalog: every test matching the campaign's name
    /// pattern, excluding the reproduction fixture path.
    pub async fn list_tests(&self) -> Result<Vec<TestCase>, CampaignError> {
        let output = Command::new(&self.config.forge_bin)
            .args(["test", "--list", "--json"])
            .arg("--match-test")
            .arg(&self.config.match_test)
            .arg("--no-match-path")
            .arg(&self.config.repro_path)
            .output()
            .await?;
        let stdout = successful_stdout(output)?;
        let listing: TestListing = serde_json::from_str(json_payload(&stdout))?;
        Ok(flatten_listing(listing))
    }

    /// Runs one test under one configuration and returns every named result
    /// the runner reported, flattened across suites.
    pub async fn run_test(
        &self,
        test: &TestCase,
        configuration: &Configuration,
    ) -> Result<Vec<(String, TestResult)>, CampaignError> {
        let output = Command::new(&self.config.forge_bin)
            .args(["test", "--allow-failure", "--json"])
            .arg("--match-path")
            .arg(&test.source_path)
            .arg("--match-contract")
            .arg(exact_pattern(&test.contract))
            .arg("--match-test")
            .arg(exact_pattern(&test.test))
            .envs(&configuration.env)
            .output()
            .await?;
        let stdout = successful_stdout(output)?;
        let suites: BTreeMap<String, SuiteResult> = serde_json::from_str(json_payload(&stdout))?;
        Ok(suites
            .into_values()
            .flat_map(|suite| suite.test_results.into_iter())
            .collect())
    }

    /// forge replays only the last failing sequence it cached for a test
    /// unless that cache entry is removed first; without this, repeated
    /// runs stop exploring new input space. Deletion is idempotent, so
    /// concurrent attempts racing on the same entry are safe.
    pub fn clear_failure_cache(&self, test: &TestCase) -> std::io::Result<()> {
        let path = self
            .config
            .failure_cache_dir
            .join(&test.contract)
            .join(&test.test);
        match std::fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// forge treats `--match-contract`/`--match-test` values as regexes, so an
/// unanchored name also matches its extensions (`invariant_a` would run
/// `invariant_ab` too). Contract and test names are plain identifiers, so
/// anchoring pins the invocation to exactly one of them.
pub fn exact_pattern(name: &str) -> String {
    format!("^{name}$")
}

fn successful_stdout(output: Output) -> Result<String, CampaignError> {
    if !output.status.success() {
        return Err(CampaignError::Runner {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// forge emits the JSON document on a single line, but compiler
/// diagnostics can precede or trail it and may themselves quote a line
/// opening with a brace; the payload is the first brace-opening line that
/// is a complete JSON document.
fn json_payload(stdout: &str) -> &str {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| {
            line.starts_with('{') && serde_json::from_str::<serde_json::Value>(line).is_ok()
        })
        .unwrap_or_else(|| stdout.trim())
}
