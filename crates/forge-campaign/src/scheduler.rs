// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The campaign scheduler: one perpetually looping task per
//! (test, configuration) job, bounded by a worker-pool semaphore, with a
//! 1-permit softstart semaphore serializing child-process spawn timing.

use std::io::{Error, ErrorKind};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use tracing::{error, info};

use crate::artifact::{write_artifact, CounterexampleArtifact};
use crate::catalog::TestCase;
use crate::config::{CampaignConfig, Configuration};
use crate::forge::{CampaignError, ForgeRunner, TestResult};

/// One recurring unit of work. A job has no terminal state: it is
/// resubmitted for the life of the campaign process.
#[derive(Clone, Debug)]
pub struct Job {
    pub test: TestCase,
    pub configuration: Configuration,
}

/// The full |tests| x |configurations| grid, first configuration's jobs
/// first.
pub fn build_jobs(tests: &[TestCase], configurations: &[Configuration]) -> Vec<Job> {
    configurations
        .iter()
        .flat_map(|configuration| {
            tests.iter().map(|test| Job {
                test: test.clone(),
                configuration: configuration.clone(),
            })
        })
        .collect()
}

pub struct Campaign {
    config: Arc<CampaignConfig>,
    runner: Arc<ForgeRunner>,
}

impl Campaign {
    pub fn new(config: CampaignConfig) -> Self {
        let config = Arc::new(config);
        let runner = Arc::new(ForgeRunner::new(config.clone()));
        Self { config, runner }
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    /// Discovers the campaign's test catalog via the external runner.
    pub async fn discover(&self) -> Result<Vec<TestCase>, CampaignError> {
        self.runner.list_tests().await
    }

    /// Drives the whole job grid forever. Returns only when a job hits an
    /// infrastructure error; the caller terminates the process with the
    /// error's exit code. External kill is the only other way out.
    pub async fn run(
        &self,
        tests: Vec<TestCase>,
        configurations: Vec<Configuration>,
    ) -> CampaignError {
        let jobs = build_jobs(&tests, &configurations);
        let workers = Arc::new(Semaphore::new(self.config.workers));
        let softstart = Arc::new(Semaphore::new(1));
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<CampaignError>(1);

        info!(
            "starting campaign: {} tests x {} configurations = {} perpetual jobs, {} workers",
            tests.len(),
            configurations.len(),
            jobs.len(),
            self.config.workers,
        );
        for job in jobs {
            tokio::spawn(drive_job(
                self.runner.clone(),
                self.config.clone(),
                job,
                workers.clone(),
                softstart.clone(),
                fatal_tx.clone(),
            ));
        }
        drop(fatal_tx);

        match fatal_rx.recv().await {
            Some(error) => error,
            // Only reachable with an empty job grid.
            None => CampaignError::Io(Error::new(ErrorKind::InvalidInput, "no jobs to schedule")),
        }
    }
}

async fn drive_job(
    runner: Arc<ForgeRunner>,
    config: Arc<CampaignConfig>,
    job: Job,
    workers: Arc<Semaphore>,
    softstart: Arc<Semaphore>,
    fatal: mpsc::Sender<CampaignError>,
) {
    // Explicit loop, not recursive resubmission: rare counterexamples only
    // fall out of accumulated search time, so each job reruns indefinitely.
    loop {
        let _worker = workers
            .acquire()
            .await
            .expect("worker semaphore never closes");
        {
            // Hold the softstart permit across the sleep so spawn timing
            // stays serialized across all jobs.
            let _turn = softstart
                .acquire()
                .await
                .expect("softstart semaphore never closes");
            sleep(config.softstart_delay).await;
        }
        if let Err(e) = run_once(&runner, &config, &job).await {
            // First error wins; losers of the race just exit their loop.
            let _ = fatal.try_send(e);
            return;
        }
    }
}

/// One job iteration: clear the runner's stale failure cache, execute,
/// harvest failures. Property failures are the harvest, never an error;
/// anything returned as `Err` is infrastructure and fatal to the campaign.
async fn run_once(
    runner: &ForgeRunner,
    config: &CampaignConfig,
    job: &Job,
) -> Result<(), CampaignError> {
    let prefix = format!("[{} {}]", job.configuration.key, job.test);
    runner.clear_failure_cache(&job.test)?;
    let results = runner.run_test(&job.test, &job.configuration).await?;
    for (name, result) in results {
        match result {
            TestResult::Success { .. } => {}
            TestResult::Failure {
                reason,
                counterexample: Some(counterexample),
                labeled_addresses,
            } => {
                let artifact = CounterexampleArtifact::new(
                    &job.test,
                    &job.configuration,
                    reason,
                    labeled_addresses,
                    counterexample.into_sequence(),
                );
                let path = write_artifact(&config.artifact_dir, &artifact, &job.configuration.key)?;
                info!("{prefix} captured counterexample for {name}: {}", path.display());
            }
            TestResult::Failure {
                reason,
                counterexample: None,
                ..
            } => {
                error!(
                    "{prefix} {name} failed without a reproducible counterexample: {}",
                    reason.as_deref().unwrap_or("unknown reason"),
                );
            }
        }
    }
    Ok(())
}
