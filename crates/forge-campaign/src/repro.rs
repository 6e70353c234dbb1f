// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Reproduction synthesis: turn one captured counterexample artifact into a
//! throwaway fixture contract that replays the exact call sequence, then
//! run the external runner scoped to just that fixture.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::info;

use crate::artifact::CounterexampleArtifact;
use crate::config::CampaignConfig;
use crate::forge::exact_pattern;

/// Name of the generated replay function; the isolated runner invocation
/// is scoped to exactly this test.
pub const REPRO_TEST_NAME: &str = "test_repro";

/// Structured model of the generated fixture, kept separate from the text
/// templating so the generation target can change without touching the
/// orchestration around it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReproSource {
    pub contract: String,
    pub test: String,
    pub import_path: String,
    pub steps: Vec<ReproStep>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReproStep {
    pub sender_label: String,
    pub target_label: String,
    pub function: String,
    pub args: String,
}

pub fn load_artifact(path: &Path) -> Result<CounterexampleArtifact> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading counterexample artifact {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("parsing counterexample artifact {}", path.display()))
}

/// Extracts the bare function name from a `name(type,...)` signature.
pub fn extract_function_name(signature: &str) -> Result<&str> {
    match signature.split_once('(') {
        Some((name, _)) if !name.is_empty() => Ok(name),
        _ => bail!("malformed call signature {signature:?}"),
    }
}

/// Decoded argument strings may carry a trailing `[...]` annotation, e.g.
/// `100 [1e2]`; only the literal part belongs in generated code.
pub fn strip_type_annotation(args: &str) -> &str {
    let trimmed = args.trim_end();
    if trimmed.ends_with(']') {
        if let Some(idx) = trimmed.rfind(" [") {
            return trimmed[..idx].trim_end();
        }
    }
    trimmed
}

/// Resolves every step of the artifact's sequence against its label table.
/// A sender or target missing from `labels` means the artifact is
/// malformed, which is a hard stop, not a recoverable condition.
pub fn plan_repro(artifact: &CounterexampleArtifact) -> Result<ReproSource> {
    let mut steps = Vec::with_capacity(artifact.sequence.len());
    for step in &artifact.sequence {
        let sender_label = artifact
            .labels
            .get(&step.sender)
            .with_context(|| format!("sender {} has no entry in the label table", step.sender))?;
        let target_label = artifact
            .labels
            .get(&step.addr)
            .with_context(|| format!("target {} has no entry in the label table", step.addr))?;
        steps.push(ReproStep {
            sender_label: sender_label.clone(),
            target_label: target_label.clone(),
            function: extract_function_name(&step.signature)?.to_string(),
            args: strip_type_annotation(&step.args).to_string(),
        });
    }
    Ok(ReproSource {
        contract: artifact.contract.clone(),
        test: artifact.test.trim_end_matches("()").to_string(),
        import_path: artifact.sol_path.clone(),
        steps,
    })
}

/// Renders the fixture contract. The replayed calls must all execute
/// before the final assertion-bearing call, in recorded order: the failure
/// is a function of accumulated state.
pub fn render_repro_contract(source: &ReproSource) -> String {
    let mut body = String::new();
    for step in &source.steps {
        let _ = writeln!(body, "        vm.prank({});", step.sender_label);
        let _ = writeln!(
            body,
            "        {}.{}({});",
            step.target_label, step.function, step.args
        );
    }
    format!(
        r#"// SPDX-License-Identifier: UNLICENSED
pragma solidity ^0.8.13;

import {{{contract}}} from "{import_path}";

contract {contract}Repro is {contract} {{
    function {test_name}() external {{
{body}        this.{test}();
    }}
}}
"#,
        contract = source.contract,
        import_path = source.import_path,
        test_name = REPRO_TEST_NAME,
        body = body,
        test = source.test,
    )
}

/// Full reproduction pipeline: load, plan, overwrite the fixed fixture
/// path, and run the external runner scoped to the generated test with the
/// artifact's recorded env overlay and inherited stdio. Returns the
/// runner's exit code.
pub async fn reproduce(
    config: &CampaignConfig,
    artifact_path: &Path,
    extra_args: &[String],
) -> Result<i32> {
    let artifact = load_artifact(artifact_path)?;
    let source = plan_repro(&artifact)?;
    if let Some(parent) = config.repro_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config.repro_path, render_repro_contract(&source))
        .with_context(|| format!("writing fixture {}", config.repro_path.display()))?;
    info!(
        "replaying {} step(s) against {}::{} via {}",
        source.steps.len(),
        source.contract,
        source.test,
        config.repro_path.display(),
    );
    let status = Command::new(&config.forge_bin)
        .arg("test")
        .arg("--match-path")
        .arg(&config.repro_path)
        .arg("--match-contract")
        .arg(exact_pattern(&format!("{}Repro", source.contract)))
        .arg("--match-test")
        .arg(exact_pattern(REPRO_TEST_NAME))
        .args(extra_args)
        .envs(&artifact.env)
        .status()
        .await
        .with_context(|| format!("launching {}", config.forge_bin))?;
    Ok(status.code().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::CallStep;
    use std::collections::BTreeMap;

    fn step(sender: &str, addr: &str, signature: &str, args: &str) -> CallStep {
        CallStep {
            sender: sender.to_string(),
            addr: addr.to_string(),
            calldata: "0x".to_string(),
            contract_name: Some("Token".to_string()),
            signature: signature.to_string(),
            args: args.to_string(),
        }
    }

    fn artifact(sequence: Vec<CallStep>, labels: &[(&str, &str)]) -> CounterexampleArtifact {
        CounterexampleArtifact {
            reason: Some("assertion failed".to_string()),
            sol_path: "test/Vault.t.sol".to_string(),
            contract: "VaultInvariants".to_string(),
            test: "invariant_solvency".to_string(),
            env: BTreeMap::new(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            sequence,
        }
    }

    #[test]
    fn function_name_extraction() {
        assert_eq!(
            extract_function_name("transfer(address,uint256)").unwrap(),
            "transfer"
        );
        assert!(extract_function_name("(uint256)").is_err());
        assert!(extract_function_name("no_parens").is_err());
    }

    #[test]
    fn annotation_stripping() {
        assert_eq!(strip_type_annotation("100 [1e2]"), "100");
        assert_eq!(strip_type_annotation("0xBBB, 100 [1e2]"), "0xBBB, 100");
        assert_eq!(strip_type_annotation("true"), "true");
        assert_eq!(strip_type_annotation(""), "");
    }

    #[test]
    fn unknown_sender_or_target_is_rejected() {
        let art = artifact(
            vec![step("0xAAA", "0xCCC", "poke()", "")],
            &[("0xAAA", "alice")],
        );
        let err = plan_repro(&art).unwrap_err();
        assert!(err.to_string().contains("0xCCC"));

        let art = artifact(vec![step("0xZZZ", "0xAAA", "poke()", "")], &[("0xAAA", "alice")]);
        assert!(plan_repro(&art).is_err());
    }

    #[test]
    fn rendered_fixture_replays_steps_in_order_then_calls_test() {
        let art = artifact(
            vec![
                step("0xAAA", "0xBBB", "approve(address,uint256)", "0xBBB, 100 [1e2]"),
                step(
                    "0xBBB",
                    "0xBBB",
                    "transferFrom(address,address,uint256)",
                    "0xAAA, 0xBBB, 100 [1e2]",
                ),
            ],
            &[("0xAAA", "alice"), ("0xBBB", "bob")],
        );
        let rendered = render_repro_contract(&plan_repro(&art).unwrap());

        assert!(rendered.contains("contract VaultInvariantsRepro is VaultInvariants"));
        assert!(rendered.contains("import {VaultInvariants} from \"test/Vault.t.sol\""));
        let approve = rendered.find("bob.approve(0xBBB, 100);").unwrap();
        let transfer = rendered
            .find("bob.transferFrom(0xAAA, 0xBBB, 100);")
            .unwrap();
        let final_call = rendered.find("this.invariant_solvency();").unwrap();
        assert!(approve < transfer && transfer < final_call);
        // Each call is preceded by its sender impersonation.
        let first_prank = rendered.find("vm.prank(alice);").unwrap();
        let second_prank = rendered.find("vm.prank(bob);").unwrap();
        assert!(first_prank < approve && approve < second_prank && second_prank < transfer);
    }

    #[test]
    fn test_name_signature_suffix_is_dropped() {
        let mut art = artifact(vec![], &[]);
        art.test = "invariant_solvency()".to_string();
        let source = plan_repro(&art).unwrap();
        assert_eq!(source.test, "invariant_solvency");
    }
}
