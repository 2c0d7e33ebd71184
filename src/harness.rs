//! Top-level orchestration for running batched test matches.
//!
//! This module defines the [`Harness`] type, which drives one invocation:
//!
//! - Resolving the bot roster against the bot directory
//! - Creating the timestamped experiment directory
//! - Running all batches through the [`scheduler`](crate::scheduler)
//! - Sweeping any process the batch teardown could not reap
//! - Aggregating result artifacts into a [`ScoreBoard`]
//!
//! Per-match problems (a server that never listens, a stuck bot, a missing
//! result file) never abort the invocation; they surface as failures on the
//! returned board. `run` only errors for invocation-level problems: a bad
//! roster, a missing bot binary, or an experiment directory that cannot be
//! created.
//!
//! # Example
//!
//! See the crate-level documentation.

use std::path::PathBuf;

use anyhow::bail;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{info, instrument, trace, warn};

use crate::aggregator::{summarize_results, ScoreBoard};
use crate::configuration::Configuration;
use crate::constraints::Constraints;
use crate::experiment::ExperimentDir;
use crate::logger::init_logger;
use crate::scheduler::BatchScheduler;

/// The main type for running batched server/bot test matches.
///
/// It allocates ports, spawns one server and several bots per test,
/// enforces the batch barrier, and scores the result artifacts.
pub struct Harness {
    config: Configuration,
    constraints: Constraints,
}

impl Harness {
    /// Create a [`Harness`] with the given [`Configuration`] and
    /// [`Constraints`].
    #[instrument(skip_all)]
    pub fn new(config: Configuration, constraints: Constraints) -> Harness {
        if config.log {
            init_logger();
        }
        trace!(?config, ?constraints);

        Harness {
            config,
            constraints,
        }
    }

    /// Runs `num_tests` matches with the given bot roster and returns the
    /// aggregated score board.
    ///
    /// # Parameters
    /// - `num_tests`: how many matches to run, with ids `0..num_tests`
    /// - `bots`: one to four binary names, resolved in the bot directory;
    ///   position in the roster is the bot's slot in every match
    ///
    /// # Errors
    /// Fails when the roster is empty or larger than four, a bot binary is
    /// missing, or the experiment directory cannot be created. Per-match
    /// problems never abort the run.
    pub fn run(&self, num_tests: usize, bots: &[String]) -> anyhow::Result<ScoreBoard> {
        let bot_binaries = self.resolve_bots(bots)?;

        let experiment = ExperimentDir::create(&self.config.data_directory)?;
        if self.config.verbose {
            println!("Experiment directory: {}", experiment.root().display());
        }

        let mut scheduler = BatchScheduler::new(&self.config, &self.constraints, &experiment);
        let report = scheduler.run(num_tests, &bot_binaries);

        reap_stragglers(&report.leaked_pids);

        for failure in &report.failures {
            warn!(test_id = failure.test_id, kind = ?failure.kind, "test gave no result");
        }
        let failed_ids: Vec<usize> = report.failures.iter().map(|f| f.test_id).collect();
        let board = summarize_results(experiment.root(), num_tests, bots.len(), &failed_ids);

        if self.config.verbose {
            board.print_report();
        }
        info!(
            draws = board.draws(),
            failures = board.failures(),
            "experiment finished"
        );
        Ok(board)
    }

    fn resolve_bots(&self, bots: &[String]) -> anyhow::Result<Vec<PathBuf>> {
        if bots.is_empty() {
            bail!("at least one bot binary must be given");
        }
        if bots.len() > 4 {
            bail!("at most four bots can play a match, got {}", bots.len());
        }
        let mut paths = Vec::with_capacity(bots.len());
        for name in bots {
            let path = self.config.bot_directory.join(name);
            if !path.is_file() {
                bail!(
                    "bot binary '{}' not found in {}",
                    name,
                    self.config.bot_directory.display()
                );
            }
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Last line of defense: every process this invocation spawned is reaped by
/// its own batch's teardown, so this only ever sees pids whose join failed.
/// Survivors are killed and reported.
fn reap_stragglers(pids: &[u32]) {
    if pids.is_empty() {
        return;
    }
    let pids: Vec<Pid> = pids.iter().map(|&p| Pid::from_u32(p)).collect();
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&pids), true);
    for pid in &pids {
        if let Some(process) = sys.process(*pid) {
            warn!(%pid, "process survived batch teardown, killing");
            process.kill();
        }
    }
}
