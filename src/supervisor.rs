//! Launches and joins the external server and bot processes of a run.
//!
//! Servers are started non-blocking and probed for readiness over TCP; bots
//! are joined with a deadline so a hung process can never stall the batch
//! barrier. Every spawned process writes its output to a per-run log file
//! inside the experiment directory.

use std::fs::File;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use tracing::{debug, info, instrument, warn};

use crate::configuration::Configuration;
use crate::experiment::ExperimentDir;

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A game server owned by one test run. The handle is the only way the
/// process is ever torn down.
#[derive(Debug)]
pub(crate) struct ServerProcess {
    test_id: usize,
    port: u16,
    child: Child,
}

/// Spawns the server binary for one test and returns without waiting.
///
/// Output goes to `server_<id>.log`. A spawn error is the only failure
/// reported here; whether the process actually comes up is the business of
/// [`ServerProcess::wait_ready`].
#[instrument(skip(config, dir))]
pub(crate) fn launch_server(
    test_id: usize,
    port: u16,
    num_players: usize,
    config: &Configuration,
    dir: &ExperimentDir,
) -> anyhow::Result<ServerProcess> {
    let log = File::create(dir.server_log_path(test_id))
        .context("could not create server log file")?;
    let err_log = log.try_clone().context("could not clone server log handle")?;

    let mut command = Command::new(&config.server_binary);
    command
        .arg("--host")
        .arg(&config.host)
        .arg("--port")
        .arg(port.to_string())
        .arg("--number-of-players")
        .arg(num_players.to_string())
        .arg("--grid-dimension")
        .arg(config.grid_dimension.to_string())
        .arg("--ticks")
        .arg(config.ticks.to_string())
        .arg("--broadcast-interval")
        .arg(config.broadcast_interval.as_millis().to_string())
        .arg("--match-name")
        .arg(format!("match_{test_id}"));
    if config.sandbox {
        command.arg("--sandbox");
    }
    if config.eager_broadcast {
        command.arg("--eager-broadcast");
    }
    if config.save_replays {
        command
            .arg("--save-replay")
            .arg("--replay-filepath")
            .arg(dir.replay_path(test_id))
            .arg("--overwrite-replay-file");
    }
    command
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(err_log))
        .stdin(Stdio::null());

    debug!(?command, "starting server");
    let child = command.spawn().with_context(|| {
        format!(
            "could not spawn server binary {}",
            config.server_binary.display()
        )
    })?;
    info!(test_id, port, pid = child.id(), "server started");
    Ok(ServerProcess {
        test_id,
        port,
        child,
    })
}

impl ServerProcess {
    const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Polls until the server accepts a TCP connection on its port.
    ///
    /// Fails when the child exits before listening or when `timeout`
    /// expires, leaving the process running; the caller decides its fate.
    pub fn wait_ready(&mut self, host: &str, timeout: Duration) -> anyhow::Result<()> {
        let addr = (host, self.port)
            .to_socket_addrs()
            .with_context(|| format!("could not resolve host '{host}'"))?
            .next()
            .with_context(|| format!("host '{host}' resolved to no address"))?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self
                .child
                .try_wait()
                .context("could not poll server process")?
            {
                bail!(
                    "server for test {} exited before listening ({status})",
                    self.test_id
                );
            }
            if TcpStream::connect_timeout(&addr, Self::READY_POLL_INTERVAL).is_ok() {
                debug!(test_id = self.test_id, port = self.port, "server ready");
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!(
                    "server for test {} not accepting connections on port {} after {:?}",
                    self.test_id,
                    self.port,
                    timeout
                );
            }
            thread::sleep(Self::READY_POLL_INTERVAL);
        }
    }

    /// Gives the server time to finish writing its artifacts, then reaps
    /// it, killing if the grace period runs out. Returns whether the child
    /// was actually reaped.
    pub fn shutdown(&mut self, grace: Duration) -> bool {
        match wait_with_deadline(&mut self.child, grace) {
            Ok(Some(status)) => {
                debug!(test_id = self.test_id, %status, "server exited");
                true
            }
            Ok(None) => {
                warn!(
                    test_id = self.test_id,
                    "server still running after grace period, killing"
                );
                self.kill_now()
            }
            Err(e) => {
                warn!(test_id = self.test_id, "could not join server: {e}");
                false
            }
        }
    }

    /// Kills and reaps the server without waiting. Returns whether the
    /// child was actually reaped.
    pub fn kill_now(&mut self) -> bool {
        if let Err(e) = self.child.kill() {
            debug!(test_id = self.test_id, "server kill failed: {e}");
        }
        match self.child.wait() {
            Ok(status) => {
                debug!(test_id = self.test_id, %status, "server reaped");
                true
            }
            Err(e) => {
                warn!(test_id = self.test_id, "could not reap server: {e}");
                false
            }
        }
    }
}

/// How a joined bot process ended.
#[derive(Debug)]
pub(crate) enum BotOutcome {
    Exited(ExitStatus),
    /// The deadline expired and the process was killed.
    TimedOut,
}

/// Spawns one bot and blocks until it exits or the deadline runs out.
///
/// The bot is invoked with `--nickname bot_<test>_<slot> --host --port` and
/// its output goes to `bot_<test>_<slot>.log`. On deadline expiry the
/// process is killed and [`BotOutcome::TimedOut`] is returned; the batch
/// barrier therefore always completes in bounded time.
#[instrument(skip(binary, dir))]
pub(crate) fn run_bot(
    test_id: usize,
    slot: usize,
    binary: &Path,
    host: &str,
    port: u16,
    deadline: Duration,
    dir: &ExperimentDir,
) -> anyhow::Result<BotOutcome> {
    let nickname = format!("bot_{test_id}_{slot}");
    let log = File::create(dir.bot_log_path(test_id, slot))
        .context("could not create bot log file")?;
    let err_log = log.try_clone().context("could not clone bot log handle")?;

    let mut command = Command::new(binary);
    command
        .arg("--nickname")
        .arg(&nickname)
        .arg("--host")
        .arg(host)
        .arg("--port")
        .arg(port.to_string())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(err_log))
        .stdin(Stdio::null());

    debug!(?command, "starting bot");
    let mut child = command
        .spawn()
        .with_context(|| format!("could not spawn bot binary {}", binary.display()))?;
    info!(test_id, slot, %nickname, pid = child.id(), "bot started");

    match wait_with_deadline(&mut child, deadline)? {
        Some(status) => {
            debug!(test_id, slot, %status, "bot exited");
            Ok(BotOutcome::Exited(status))
        }
        None => {
            warn!(test_id, slot, "bot exceeded match deadline, killing");
            if let Err(e) = child.kill() {
                debug!(test_id, slot, "bot kill failed: {e}");
            }
            let _ = child.wait();
            Ok(BotOutcome::TimedOut)
        }
    }
}

/// Blocking join with a deadline. `Ok(None)` means the deadline expired
/// with the child still running.
fn wait_with_deadline(child: &mut Child, deadline: Duration) -> anyhow::Result<Option<ExitStatus>> {
    let end = Instant::now() + deadline;
    loop {
        if let Some(status) = child.try_wait().context("could not poll child process")? {
            return Ok(Some(status));
        }
        if Instant::now() >= end {
            return Ok(None);
        }
        thread::sleep(JOIN_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn script(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn bot_exit_status_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let experiment = ExperimentDir::create(dir.path()).unwrap();
        let bot = script(dir.path(), "ok_bot", "#!/bin/sh\nexit 0\n");

        let outcome = run_bot(
            0,
            1,
            &bot,
            "localhost",
            40999,
            Duration::from_secs(10),
            &experiment,
        )
        .unwrap();
        match outcome {
            BotOutcome::Exited(status) => assert!(status.success()),
            BotOutcome::TimedOut => panic!("bot should have exited"),
        }
    }

    #[test]
    fn hung_bot_is_killed_at_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let experiment = ExperimentDir::create(dir.path()).unwrap();
        let bot = script(dir.path(), "hung_bot", "#!/bin/sh\nsleep 30\n");

        let started = Instant::now();
        let outcome = run_bot(
            0,
            1,
            &bot,
            "localhost",
            40998,
            Duration::from_millis(200),
            &experiment,
        )
        .unwrap();
        assert!(matches!(outcome, BotOutcome::TimedOut));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn server_that_never_listens_fails_readiness() {
        let dir = tempfile::tempdir().unwrap();
        let experiment = ExperimentDir::create(dir.path()).unwrap();
        let binary = script(dir.path(), "mute_server", "#!/bin/sh\nsleep 30\n");
        let config = Configuration::new()
            .with_server_binary(binary)
            .with_verbose(false);

        let mut server = launch_server(0, 40997, 2, &config, &experiment).unwrap();
        let err = server
            .wait_ready("localhost", Duration::from_millis(300))
            .unwrap_err();
        assert!(err.to_string().contains("not accepting connections"));
        assert!(server.kill_now());
    }

    #[test]
    fn dead_server_is_detected_before_the_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let experiment = ExperimentDir::create(dir.path()).unwrap();
        let binary = script(dir.path(), "dying_server", "#!/bin/sh\nexit 7\n");
        let config = Configuration::new()
            .with_server_binary(binary)
            .with_verbose(false);

        let mut server = launch_server(1, 40996, 2, &config, &experiment).unwrap();
        let started = Instant::now();
        let err = server
            .wait_ready("localhost", Duration::from_secs(30))
            .unwrap_err();
        assert!(err.to_string().contains("exited before listening"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn server_logs_land_in_the_experiment_directory() {
        let dir = tempfile::tempdir().unwrap();
        let experiment = ExperimentDir::create(dir.path()).unwrap();
        let binary = script(dir.path(), "echo_server", "#!/bin/sh\necho started\n");
        let config = Configuration::new()
            .with_server_binary(binary)
            .with_verbose(false);

        let mut server = launch_server(2, 40995, 2, &config, &experiment).unwrap();
        assert!(server.shutdown(Duration::from_secs(10)));
        let log = fs::read_to_string(experiment.server_log_path(2)).unwrap();
        assert!(log.contains("started"));
    }
}
