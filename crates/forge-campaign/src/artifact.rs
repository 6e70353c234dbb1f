// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::catalog::TestCase;
use crate::config::{Configuration, EnvOverlay};
use crate::forge::{CallStep, CampaignError};

/// The durable record of one reproducible failure. Written once, never
/// mutated; the reproduction tool consumes it read-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterexampleArtifact {
    pub reason: Option<String>,
    pub sol_path: String,
    pub contract: String,
    pub test: String,
    pub env: EnvOverlay,
    pub labels: BTreeMap<String, String>,
    pub sequence: Vec<CallStep>,
}

impl CounterexampleArtifact {
    pub fn new(
        test: &TestCase,
        configuration: &Configuration,
        reason: Option<String>,
        labels: BTreeMap<String, String>,
        sequence: Vec<CallStep>,
    ) -> Self {
        Self {
            reason,
            sol_path: test.source_path.clone(),
            contract: test.contract.clone(),
            test: test.test.clone(),
            env: configuration.env.clone(),
            labels,
            sequence,
        }
    }
}

/// Artifact filenames carry the configuration key and a millisecond
/// timestamp: concurrent writers race on the same (contract, test)
/// directory, and the timestamp is what keeps repeated observations from
/// colliding.
pub fn artifact_filename(config_key: &str, unix_millis: u128) -> String {
    format!("{config_key}_{unix_millis}.json")
}

/// Writes one artifact as pretty-printed JSON under
/// `<root>/<contract>/<test>/`, creating directories as needed, and
/// returns the path written.
pub fn write_artifact(
    root: &Path,
    artifact: &CounterexampleArtifact,
    config_key: &str,
) -> Result<PathBuf, CampaignError> {
    let dir = root.join(&artifact.contract).join(&artifact.test);
    fs::create_dir_all(&dir)?;
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let path = dir.join(artifact_filename(config_key, millis));
    fs::write(&path, serde_json::to_string_pretty(artifact)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_artifact() -> CounterexampleArtifact {
        CounterexampleArtifact {
            reason: Some("assertion failed".to_string()),
            sol_path: "test/Vault.t.sol".to_string(),
            contract: "VaultInvariants".to_string(),
            test: "invariant_solvency".to_string(),
            env: [("FOUNDRY_INVARIANT_DEPTH".to_string(), "200".to_string())]
                .into_iter()
                .collect(),
            labels: [
                ("0xAAA".to_string(), "alice".to_string()),
                ("0xBBB".to_string(), "bob".to_string()),
            ]
            .into_iter()
            .collect(),
            sequence: vec![CallStep {
                sender: "0xAAA".to_string(),
                addr: "0xBBB".to_string(),
                calldata: "0x095ea7b3".to_string(),
                contract_name: Some("Token".to_string()),
                signature: "approve(address,uint256)".to_string(),
                args: "0xBBB, 100 [1e2]".to_string(),
            }],
        }
    }

    #[test]
    fn filenames_differ_whenever_timestamps_differ() {
        assert_ne!(
            artifact_filename("depth50-runs256", 1_700_000_000_000),
            artifact_filename("depth50-runs256", 1_700_000_000_001),
        );
    }

    #[test]
    fn repeated_writes_never_overwrite() {
        let root = tempfile::tempdir().unwrap();
        let artifact = sample_artifact();
        let first = write_artifact(root.path(), &artifact, "depth50-runs256").unwrap();
        // Force a different millisecond.
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = write_artifact(root.path(), &artifact, "depth50-runs256").unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
        let dir = root.path().join("VaultInvariants").join("invariant_solvency");
        assert_eq!(fs::read_dir(dir).unwrap().count(), 2);
    }

    #[test]
    fn written_artifact_round_trips_losslessly() {
        let root = tempfile::tempdir().unwrap();
        let artifact = sample_artifact();
        let path = write_artifact(root.path(), &artifact, "depth50-runs256").unwrap();
        let reparsed: CounterexampleArtifact =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(reparsed.sequence, artifact.sequence);
        assert_eq!(reparsed.env, artifact.env);
        assert_eq!(reparsed.labels, artifact.labels);
        assert_eq!(reparsed.sol_path, artifact.sol_path);
    }

    #[test]
    fn artifact_serializes_camel_case_top_level_fields() {
        let json = serde_json::to_string_pretty(&sample_artifact()).unwrap();
        assert!(json.contains("\"solPath\""));
        // Steps keep the runner's snake_case field names verbatim.
        assert!(json.contains("\"contract_name\""));
    }
}
