//! Match and server parameters for a harness invocation.
//!
//! A [`Configuration`] carries everything the spawned processes need to be
//! invoked: the network host, the match shape (grid dimension, tick count,
//! broadcast interval), the binary locations, and the output options.
//! Values are set with chainable `with_*` methods; the defaults mirror a
//! local checkout with the server binary in `../linux-x64/` and the bot
//! binaries in `./bot_binaries/`.
//!
//! Scheduling bounds (batch width, port range, timeouts) live in
//! [`Constraints`](crate::constraints::Constraints), not here.

use std::path::PathBuf;
use std::time::Duration;

/// Parameters shared by every match of one invocation.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) host: String,
    pub(crate) grid_dimension: u32,
    pub(crate) ticks: u32,
    pub(crate) broadcast_interval: Duration,
    pub(crate) save_replays: bool,
    pub(crate) sandbox: bool,
    pub(crate) eager_broadcast: bool,
    pub(crate) server_binary: PathBuf,
    pub(crate) bot_directory: PathBuf,
    pub(crate) data_directory: PathBuf,
    pub(crate) verbose: bool,
    pub(crate) log: bool,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Servers bind on `localhost`, with a 24x24 grid, 3000 ticks and a
    ///   100 ms broadcast interval.
    /// - Replays are not saved and sandbox mode is off.
    /// - The server binary is expected at `../linux-x64/GameServer` and bot
    ///   binaries under `./bot_binaries/`.
    /// - Experiment directories are created under `./data/`.
    /// - Progress is printed to stdout; logging to a file is disabled.
    pub fn new() -> Self {
        Self {
            host: "localhost".to_string(),
            grid_dimension: 24,
            ticks: 3000,
            broadcast_interval: Duration::from_millis(100),
            save_replays: false,
            sandbox: false,
            eager_broadcast: false,
            server_binary: PathBuf::from("../linux-x64/GameServer"),
            bot_directory: PathBuf::from("./bot_binaries"),
            data_directory: PathBuf::from("./data"),
            verbose: true,
            log: false,
        }
    }

    /// Sets the host address the servers bind and the bots connect to.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the grid dimension passed to every server.
    pub fn with_grid_dimension(mut self, dimension: u32) -> Self {
        self.grid_dimension = dimension;
        self
    }

    /// Sets the number of ticks per match.
    pub fn with_ticks(mut self, ticks: u32) -> Self {
        self.ticks = ticks;
        self
    }

    /// Sets the interval at which servers broadcast state to their bots.
    pub fn with_broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval = interval;
        self
    }

    /// Enable or disable replay capture (`--save-replay` on the server).
    pub fn with_save_replays(mut self, value: bool) -> Self {
        self.save_replays = value;
        self
    }

    /// Enable or disable sandbox mode on the servers.
    pub fn with_sandbox(mut self, value: bool) -> Self {
        self.sandbox = value;
        self
    }

    /// Ask servers to broadcast as soon as every bot has responded instead
    /// of waiting out the full interval.
    pub fn with_eager_broadcast(mut self, value: bool) -> Self {
        self.eager_broadcast = value;
        self
    }

    /// Sets the path of the game server binary.
    pub fn with_server_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.server_binary = path.into();
        self
    }

    /// Sets the directory the bot roster names are resolved in.
    pub fn with_bot_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.bot_directory = path.into();
        self
    }

    /// Sets the directory that receives one experiment directory per run.
    pub fn with_data_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_directory = path.into();
        self
    }

    /// Enable or disable console progress output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to a file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
