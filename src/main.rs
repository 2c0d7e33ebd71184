//! Harness CLI: run batched server/bot test matches from the command line.
//!
//! Usage:
//!   bot-harness -n 20 -b random_bot_v1 random_bot_v1 -r --ticks 500 --broadcast-interval 200 --grid-dimension 8

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use bot_harness::configuration::Configuration;
use bot_harness::constraints::ConstraintsBuilder;
use bot_harness::harness::Harness;

#[derive(Parser)]
#[command(
    name = "bot-harness",
    about = "Run batched game-server/bot test matches and score the results"
)]
struct Cli {
    /// Number of tests to run
    #[arg(short = 'n', long = "num-tests", default_value_t = 100)]
    num_tests: usize,

    /// Bot binaries to use, up to 4, resolved in the bot directory
    #[arg(short, long, num_args = 1..=4, required = true)]
    bots: Vec<String>,

    /// Host address for the game servers
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Grid dimension for the game
    #[arg(long, default_value_t = 24)]
    grid_dimension: u32,

    /// Number of ticks per game
    #[arg(long, default_value_t = 3000)]
    ticks: u32,

    /// Broadcast interval in milliseconds
    #[arg(long, default_value_t = 100)]
    broadcast_interval: u64,

    /// Save replays of matches
    #[arg(short, long)]
    replay: bool,

    /// Run servers in sandbox mode
    #[arg(long)]
    sandbox: bool,

    /// Ask servers to broadcast as soon as all bots responded
    #[arg(long)]
    eager_broadcast: bool,

    /// Path to the game server binary
    #[arg(long, default_value = "../linux-x64/GameServer")]
    server_binary: PathBuf,

    /// Directory containing the bot binaries
    #[arg(long, default_value = "./bot_binaries")]
    bot_directory: PathBuf,

    /// Directory receiving one experiment directory per invocation
    #[arg(long, default_value = "./data")]
    data_directory: PathBuf,

    /// Matches launched and joined together
    #[arg(long, default_value_t = 4)]
    batch_width: usize,

    /// First port probed for the game servers
    #[arg(long, default_value_t = 5000)]
    base_port: u16,

    /// Number of ports available above the base port
    #[arg(long, default_value_t = 512)]
    port_span: u16,

    /// Seconds a server may take to start accepting connections
    #[arg(long, default_value_t = 10)]
    readiness_timeout: u64,

    /// Seconds before a running match is written off as stuck
    /// (derived from ticks and broadcast interval when not set)
    #[arg(long)]
    match_timeout: Option<u64>,

    /// Write a tracing log file in the working directory
    #[arg(long)]
    log: bool,

    /// Suppress console progress output
    #[arg(long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut builder = ConstraintsBuilder::new()
        .with_batch_width(cli.batch_width)
        .with_port_range(cli.base_port, cli.port_span)
        .with_readiness_timeout(Duration::from_secs(cli.readiness_timeout));
    if let Some(secs) = cli.match_timeout {
        builder = builder.with_match_timeout(Duration::from_secs(secs));
    }
    let constraints = builder.build()?;

    let config = Configuration::new()
        .with_host(cli.host)
        .with_grid_dimension(cli.grid_dimension)
        .with_ticks(cli.ticks)
        .with_broadcast_interval(Duration::from_millis(cli.broadcast_interval))
        .with_save_replays(cli.replay)
        .with_sandbox(cli.sandbox)
        .with_eager_broadcast(cli.eager_broadcast)
        .with_server_binary(cli.server_binary)
        .with_bot_directory(cli.bot_directory)
        .with_data_directory(cli.data_directory)
        .with_verbose(!cli.quiet)
        .with_log(cli.log);

    let harness = Harness::new(config, constraints);
    harness.run(cli.num_tests, &cli.bots)?;
    Ok(())
}
