//! Batched execution of test runs with a join-all barrier between batches.
//!
//! The requested tests are partitioned into consecutive batches of at most
//! the configured width. Within a batch every server launch is submitted
//! before any bot starts, and the next batch begins only after every bot of
//! the current one has been joined and its servers torn down. Batching
//! bounds the number of simultaneous processes and open ports, and keeps
//! the blast radius of a bad batch to its own width.

use std::collections::BTreeSet;
use std::ops::Range;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::configuration::Configuration;
use crate::constraints::Constraints;
use crate::experiment::ExperimentDir;
use crate::port_allocator::PortAllocator;
use crate::supervisor::{self, BotOutcome, ServerProcess};

const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Extra wall-clock allowed on top of `ticks * broadcast_interval` before a
/// match is written off as stuck.
const MATCH_DEADLINE_MARGIN: Duration = Duration::from_secs(15);

/// One isolated match: a server process plus its assigned bots.
struct TestRun {
    id: usize,
    port: u16,
    server: ServerProcess,
}

/// Why a run produced no usable result.
#[derive(Debug)]
pub(crate) enum FailureKind {
    /// Port allocation or process launch did not succeed.
    Launch(String),
    /// A bot exceeded the match deadline and was killed.
    Stuck,
}

#[derive(Debug)]
pub(crate) struct RunFailure {
    pub test_id: usize,
    pub kind: FailureKind,
}

/// What the schedule left behind: the runs that failed, and any pid the
/// teardown could not reap (for the final sweep).
#[derive(Debug, Default)]
pub(crate) struct ScheduleReport {
    pub failures: Vec<RunFailure>,
    pub leaked_pids: Vec<u32>,
}

pub(crate) struct BatchScheduler<'a> {
    config: &'a Configuration,
    constraints: &'a Constraints,
    experiment: &'a ExperimentDir,
    ports: PortAllocator,
}

impl<'a> BatchScheduler<'a> {
    pub fn new(
        config: &'a Configuration,
        constraints: &'a Constraints,
        experiment: &'a ExperimentDir,
    ) -> Self {
        BatchScheduler {
            config,
            constraints,
            experiment,
            ports: PortAllocator::new(constraints.base_port, constraints.port_span),
        }
    }

    /// Runs all `num_tests` matches batch by batch. Per-run problems are
    /// recorded in the report, never propagated.
    #[instrument(skip(self, bot_binaries))]
    pub fn run(&mut self, num_tests: usize, bot_binaries: &[PathBuf]) -> ScheduleReport {
        let batches = batch_partition(num_tests, self.constraints.batch_width);
        let num_batches = batches.len();
        let mut report = ScheduleReport::default();

        for (index, ids) in batches.into_iter().enumerate() {
            info!(
                batch = index + 1,
                num_batches,
                first = ids.start,
                last = ids.end - 1,
                "starting batch"
            );
            if self.config.verbose {
                println!(
                    "Batch {}/{}: tests {}..{}",
                    index + 1,
                    num_batches,
                    ids.start,
                    ids.end
                );
            }
            self.run_batch(ids, bot_binaries, &mut report);
        }
        report
    }

    fn run_batch(
        &mut self,
        ids: Range<usize>,
        bot_binaries: &[PathBuf],
        report: &mut ScheduleReport,
    ) {
        let config = self.config;
        let experiment = self.experiment;
        let readiness = self.constraints.readiness_timeout;
        let deadline = self.match_deadline();
        let num_players = bot_binaries.len();

        // 1. one port per run; an exhausted range fails the run, not the batch
        let mut pending: Vec<(usize, u16)> = Vec::new();
        for id in ids {
            match self.ports.allocate() {
                Ok(port) => pending.push((id, port)),
                Err(e) => {
                    error!(test_id = id, "port allocation failed: {e}");
                    report.failures.push(RunFailure {
                        test_id: id,
                        kind: FailureKind::Launch(e.to_string()),
                    });
                }
            }
        }

        // 2. every server launch is submitted here, before any bot starts;
        // each task then probes its server for readiness
        let launch_results: Vec<(usize, u16, anyhow::Result<ServerProcess>)> =
            thread::scope(|s| {
                let handles: Vec<_> = pending
                    .iter()
                    .map(|&(id, port)| {
                        let handle = s.spawn(move || {
                            let mut server =
                                supervisor::launch_server(id, port, num_players, config, experiment)?;
                            if let Err(e) = server.wait_ready(&config.host, readiness) {
                                server.kill_now();
                                return Err(e);
                            }
                            Ok(server)
                        });
                        (id, port, handle)
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|(id, port, handle)| {
                        (id, port, handle.join().expect("server launch thread panicked"))
                    })
                    .collect()
            });

        let mut runs: Vec<TestRun> = Vec::new();
        for (id, port, result) in launch_results {
            match result {
                Ok(server) => runs.push(TestRun { id, port, server }),
                Err(e) => {
                    error!(test_id = id, "server launch failed: {e:#}");
                    if config.verbose {
                        println!("{RED}test {id}: server launch failed: {e:#}{RESET}");
                    }
                    report.failures.push(RunFailure {
                        test_id: id,
                        kind: FailureKind::Launch(format!("{e:#}")),
                    });
                    self.ports.release(port);
                }
            }
        }

        // 3. one task per bot; joining the scope is the batch barrier, and
        // every task finishes in bounded time thanks to the deadline
        let bot_results: Vec<(usize, usize, anyhow::Result<BotOutcome>)> = thread::scope(|s| {
            let mut handles = Vec::new();
            for run in &runs {
                for (index, binary) in bot_binaries.iter().enumerate() {
                    let slot = index + 1;
                    let (id, port) = (run.id, run.port);
                    let handle = s.spawn(move || {
                        supervisor::run_bot(id, slot, binary, &config.host, port, deadline, experiment)
                    });
                    handles.push((id, slot, handle));
                }
            }
            handles
                .into_iter()
                .map(|(id, slot, handle)| {
                    (id, slot, handle.join().expect("bot thread panicked"))
                })
                .collect()
        });

        let mut failed: BTreeSet<usize> = BTreeSet::new();
        for (id, slot, result) in bot_results {
            match result {
                Ok(BotOutcome::Exited(status)) if !status.success() => {
                    warn!(test_id = id, slot, %status, "bot exited with failure status");
                }
                Ok(BotOutcome::Exited(_)) => {}
                Ok(BotOutcome::TimedOut) => {
                    if config.verbose {
                        println!("{RED}test {id}: bot {slot} stuck, match written off{RESET}");
                    }
                    if failed.insert(id) {
                        report.failures.push(RunFailure {
                            test_id: id,
                            kind: FailureKind::Stuck,
                        });
                    }
                }
                Err(e) => {
                    error!(test_id = id, slot, "bot launch failed: {e:#}");
                    if failed.insert(id) {
                        report.failures.push(RunFailure {
                            test_id: id,
                            kind: FailureKind::Launch(format!("{e:#}")),
                        });
                    }
                }
            }
        }

        // 4. teardown: all bots of the batch have exited or been killed at
        // this point; surviving servers get a grace period to write their
        // artifacts, failed runs lose theirs immediately
        for mut run in runs {
            let reaped = if failed.contains(&run.id) {
                run.server.kill_now()
            } else {
                run.server.shutdown(self.constraints.shutdown_grace)
            };
            if !reaped {
                report.leaked_pids.push(run.server.pid());
            }
            self.ports.release(run.port);
        }
    }

    fn match_deadline(&self) -> Duration {
        self.constraints.match_timeout.unwrap_or_else(|| {
            self.config.broadcast_interval * self.config.ticks + MATCH_DEADLINE_MARGIN
        })
    }
}

/// Consecutive chunks of `[0, num_tests)`, each at most `width` long.
fn batch_partition(num_tests: usize, width: usize) -> Vec<Range<usize>> {
    assert!(width > 0, "batch width must be positive");
    let mut batches = Vec::with_capacity(num_tests.div_ceil(width));
    let mut start = 0;
    while start < num_tests {
        let end = (start + width).min(num_tests);
        batches.push(start..end);
        start = end;
    }
    batches
}
