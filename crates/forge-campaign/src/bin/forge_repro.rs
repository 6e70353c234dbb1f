// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use forge_campaign::config::CampaignConfig;
use forge_campaign::repro::reproduce;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    FmtSubscriber,
};

/// Replays one captured counterexample in isolation: generates a fixture
/// contract replaying the recorded call sequence and runs the external
/// runner scoped to just that fixture, streaming its output.
#[derive(Parser, Debug)]
#[command(name = env!("CARGO_BIN_NAME"), version)]
struct Args {
    /// Path to a counterexample artifact produced by the campaign daemon.
    artifact: Option<PathBuf>,
    /// Extra arguments forwarded verbatim to the runner invocation.
    #[arg(last = true)]
    forge_args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let args = Args::parse();
    let Some(artifact) = args.artifact else {
        Args::command().print_help()?;
        return Ok(());
    };

    let config = CampaignConfig::default();
    let code = reproduce(&config, &artifact, &args.forge_args).await?;
    std::process::exit(code);
}
