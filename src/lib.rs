//! # Bot Harness
//!
//! A test harness for evaluating competing game-playing bots by running
//! many isolated matches in parallel, each consisting of one freshly
//! started game-server process and several bot-client processes.
//!
//! It provides:
//! - Batched match scheduling with a join-all barrier between batches
//!   (`scheduler`), bounding simultaneous processes and open ports
//! - Bounded port allocation with a live TCP probe per candidate
//! - Process supervision with readiness probing and per-match deadlines,
//!   so a server that never comes up or a bot that never exits costs one
//!   match, not the whole experiment
//! - Deterministic aggregation of the per-match result artifacts into a
//!   per-slot score report ([`aggregator::ScoreBoard`])
//!
//! Every match consists of one server process and one to four bot
//! processes, all spawned from external binaries and owned by their run:
//! teardown only ever touches processes this invocation started.
//!
//! # Documentation Overview
//!
//! - For the orchestration entry point, see [`Harness`](crate::harness::Harness).
//! - For match and server parameters, see
//!   [`Configuration`](crate::configuration::Configuration).
//! - For scheduling bounds (batch width, port range, timeouts), see
//!   [`constraints`].
//! - For artifact classification and scoring, see [`aggregator`].
//!
//! # Usage Example
//!
//! ```no_run
//! use std::time::Duration;
//! use bot_harness::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let constraints = ConstraintsBuilder::new()
//!         .with_batch_width(4)
//!         .with_port_range(5000, 512)
//!         .with_match_timeout(Duration::from_secs(300))
//!         .build()?;
//!
//!     let config = Configuration::new()
//!         .with_ticks(500)
//!         .with_broadcast_interval(Duration::from_millis(200))
//!         .with_save_replays(true);
//!
//!     let harness = Harness::new(config, constraints);
//!     let board = harness.run(
//!         20,
//!         &["random_bot_v1".to_string(), "random_bot_v1".to_string()],
//!     )?;
//!
//!     board.print_report();
//!     Ok(())
//! }
//! ```
//!
//! # Bot Requirements
//!
//! A bot binary is invoked as `<binary> --nickname bot_<test>_<slot>
//! --host <addr> --port <port>`, must connect to the server it is given,
//! and must terminate once the match is over. A bot that never exits is
//! killed at the match deadline and its match is recorded as a failure.
#![warn(missing_docs)]

pub mod aggregator;
pub use anyhow;
pub mod configuration;
pub mod constraints;
mod experiment;
pub mod harness;
mod logger;
mod port_allocator;
mod scheduler;
mod supervisor;

/// Commonly used types for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use bot_harness::prelude::*;
/// ```
///
/// Includes:
/// - [`Configuration`](crate::configuration::Configuration)
/// - [`ConstraintsBuilder`](crate::constraints::ConstraintsBuilder)
/// - [`Harness`](crate::harness::Harness)
/// - [`ScoreBoard`](crate::aggregator::ScoreBoard)
pub mod prelude {
    pub use crate::aggregator::ScoreBoard;
    pub use crate::configuration::Configuration;
    pub use crate::constraints::ConstraintsBuilder;
    pub use crate::harness::Harness;
}
