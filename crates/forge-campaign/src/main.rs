// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use forge_campaign::config::{expand_matrix, CampaignConfig};
use forge_campaign::scheduler::Campaign;
use tracing::error;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    FmtSubscriber,
};

/// Continuously fuzzes every invariant test under every configuration in
/// the campaign matrix until killed.
#[derive(Parser, Debug)]
#[command(name = env!("CARGO_BIN_NAME"), version)]
struct Args {
    /// Maximum number of concurrent runner child processes.
    #[arg(long, default_value_t = 24)]
    workers: usize,
    /// Delay serializing consecutive child-process spawns, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    softstart_delay_ms: u64,
    /// Test-name pattern passed to the runner during discovery.
    #[arg(long, default_value = "invariant")]
    match_test: String,
    /// Directory captured counterexamples are written under.
    #[arg(long, default_value = "counterexamples")]
    artifact_dir: PathBuf,
    /// Runner binary to invoke.
    #[arg(long, default_value = "forge")]
    forge_bin: String,
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
    let config = CampaignConfig {
        workers: args.workers,
        softstart_delay: Duration::from_millis(args.softstart_delay_ms),
        match_test: args.match_test,
        artifact_dir: args.artifact_dir,
        forge_bin: args.forge_bin,
        ..Default::default()
    };

    let campaign = Campaign::new(config);
    // Discovery failures are the same fatal path as a mid-campaign infra
    // error: the process exits with the child's own code where one exists.
    let tests = match campaign.discover().await {
        Ok(tests) => tests,
        Err(fatal) => {
            error!("test discovery failed: {fatal}");
            std::process::exit(fatal.exit_code());
        }
    };
    anyhow::ensure!(!tests.is_empty(), "no invariant tests discovered");
    let configurations = expand_matrix(&campaign.config().dimensions);

    // Returns only on an infrastructure error; property failures are
    // harvested inside the loop and never stop the campaign.
    let fatal = campaign.run(tests, configurations).await;
    error!("campaign aborted: {fatal}");
    std::process::exit(fatal.exit_code());
}
