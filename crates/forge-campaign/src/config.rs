// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub type EnvOverlay = BTreeMap<String, String>;

/// Separator between dimension keys in a composite configuration key.
pub const CONFIG_KEY_SEPARATOR: &str = "-";

/// One independent axis of configuration variation. Each choice pairs a
/// short key (used in composite configuration names and artifact filenames)
/// with the environment overlay selecting it.
#[derive(Clone, Debug)]
pub struct Dimension {
    pub choices: Vec<(String, EnvOverlay)>,
}

/// One cell of the Cartesian product over all dimensions: the `-`-joined
/// dimension keys plus the merged environment overlay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Configuration {
    pub key: String,
    pub env: EnvOverlay,
}

/// Expands dimensions into the full configuration matrix. The first
/// dimension varies slowest; on overlay key collisions the later
/// dimension's value wins.
pub fn expand_matrix(dimensions: &[Dimension]) -> Vec<Configuration> {
    let Some((first, rest)) = dimensions.split_first() else {
        return vec![];
    };
    let mut configurations: Vec<Configuration> = first
        .choices
        .iter()
        .map(|(key, env)| Configuration {
            key: key.clone(),
            env: env.clone(),
        })
        .collect();
    for dimension in rest {
        configurations = configurations
            .iter()
            .flat_map(|base| {
                dimension.choices.iter().map(move |(key, env)| {
                    let mut merged = base.env.clone();
                    merged.extend(env.clone());
                    Configuration {
                        key: format!("{}{}{}", base.key, CONFIG_KEY_SEPARATOR, key),
                        env: merged,
                    }
                })
            })
            .collect();
    }
    configurations
}

/// All knobs of a campaign, hoisted into one immutable struct handed to the
/// scheduler at construction.
#[derive(Clone, Debug)]
pub struct CampaignConfig {
    /// Binary name of the external test runner.
    pub forge_bin: String,
    /// Test-name pattern used during discovery.
    pub match_test: String,
    /// Maximum number of concurrently running child processes.
    pub workers: usize,
    /// Fixed delay serializing child-process spawn timing.
    pub softstart_delay: Duration,
    /// Root directory counterexample artifacts are written under.
    pub artifact_dir: PathBuf,
    /// Root of the runner's persisted last-failure cache.
    pub failure_cache_dir: PathBuf,
    /// Fixed path of the generated reproduction fixture. Excluded from
    /// discovery so the campaign never fuzzes its own scratch output.
    pub repro_path: PathBuf,
    pub dimensions: Vec<Dimension>,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            forge_bin: "forge".to_string(),
            match_test: "invariant".to_string(),
            workers: 24,
            softstart_delay: Duration::from_secs(1),
            artifact_dir: PathBuf::from("counterexamples"),
            failure_cache_dir: PathBuf::from("cache/invariant/failures"),
            repro_path: PathBuf::from("test/Repro.t.sol"),
            dimensions: default_dimensions(),
        }
    }
}

fn overlay(pairs: &[(&str, &str)]) -> EnvOverlay {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// The default campaign matrix: an invariant-depth axis crossed with an
/// invariant-runs axis.
pub fn default_dimensions() -> Vec<Dimension> {
    vec![
        Dimension {
            choices: vec![
                (
                    "depth50".to_string(),
                    overlay(&[("FOUNDRY_INVARIANT_DEPTH", "50")]),
                ),
                (
                    "depth200".to_string(),
                    overlay(&[("FOUNDRY_INVARIANT_DEPTH", "200")]),
                ),
                (
                    "depth1000".to_string(),
                    overlay(&[("FOUNDRY_INVARIANT_DEPTH", "1000")]),
                ),
            ],
        },
        Dimension {
            choices: vec![
                (
                    "runs256".to_string(),
                    overlay(&[("FOUNDRY_INVARIANT_RUNS", "256")]),
                ),
                (
                    "runs1024".to_string(),
                    overlay(&[("FOUNDRY_INVARIANT_RUNS", "1024")]),
                ),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dimension(choices: &[(&str, &[(&str, &str)])]) -> Dimension {
        Dimension {
            choices: choices
                .iter()
                .map(|(key, pairs)| (key.to_string(), overlay(pairs)))
                .collect(),
        }
    }

    #[test]
    fn matrix_size_is_product_of_cardinalities() {
        let dims = vec![
            dimension(&[("a1", &[]), ("a2", &[]), ("a3", &[])]),
            dimension(&[("b1", &[]), ("b2", &[])]),
            dimension(&[("c1", &[]), ("c2", &[])]),
        ];
        assert_eq!(expand_matrix(&dims).len(), 3 * 2 * 2);
    }

    #[test]
    fn keys_join_in_dimension_order_first_dimension_slowest() {
        let dims = vec![
            dimension(&[("a1", &[]), ("a2", &[])]),
            dimension(&[("b1", &[]), ("b2", &[])]),
        ];
        let keys: Vec<_> = expand_matrix(&dims).into_iter().map(|c| c.key).collect();
        assert_eq!(keys, vec!["a1-b1", "a1-b2", "a2-b1", "a2-b2"]);
    }

    #[test]
    fn later_dimension_wins_env_collisions() {
        let dims = vec![
            dimension(&[("lo", &[("DEPTH", "50"), ("SEED", "1")])]),
            dimension(&[("hi", &[("DEPTH", "1000")])]),
        ];
        let matrix = expand_matrix(&dims);
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix[0].key, "lo-hi");
        assert_eq!(matrix[0].env.get("DEPTH").map(String::as_str), Some("1000"));
        assert_eq!(matrix[0].env.get("SEED").map(String::as_str), Some("1"));
    }

    #[test]
    fn empty_dimension_list_yields_empty_matrix() {
        assert!(expand_matrix(&[]).is_empty());
    }

    #[test]
    fn default_matrix_covers_all_depth_runs_pairs() {
        let matrix = expand_matrix(&default_dimensions());
        assert_eq!(matrix.len(), 6);
        assert!(matrix.iter().all(|c| {
            c.env.contains_key("FOUNDRY_INVARIANT_DEPTH")
                && c.env.contains_key("FOUNDRY_INVARIANT_RUNS")
        }));
    }
}
