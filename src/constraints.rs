//! Defines the scheduling bounds for a harness invocation.
//!
//! This module provides tools to configure how many matches run at once and
//! how long the harness waits on the processes it spawns. Bounds include:
//!
//! - **Batch width**: how many matches are launched and joined together.
//! - **Port range**: the base port and the number of ports above it that
//!   servers may be assigned.
//! - **Timing bounds**:
//!   * Readiness timeout: how long a freshly spawned server may take to
//!     start accepting connections.
//!   * Match timeout: how long a bot may run before its match is written
//!     off as stuck. When unset, it is derived from the tick count and
//!     broadcast interval of the configuration.
//!   * Shutdown grace: how long a server may keep running after its bots
//!     exited, to finish writing its result artifacts.
//!
//! Once built, a [`Constraints`] object is passed to the harness and applied
//! to every batch.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use bot_harness::constraints::ConstraintsBuilder;
//!
//! let constraints = ConstraintsBuilder::new()
//!     .with_batch_width(4)
//!     .with_port_range(5000, 512)
//!     .with_readiness_timeout(Duration::from_secs(10))
//!     .with_match_timeout(Duration::from_secs(300))
//!     .build()
//!     .unwrap();
//! ```
//!
//! You may also construct the bounds from environment variables using
//! [`ConstraintsBuilder::from_env()`] for runtime configurability.

use std::env;
use std::time::Duration;

use anyhow::bail;
use tracing::warn;

/// A builder for the scheduling bounds applied to every batch.
///
/// All values are optional; `build()` fills in defaults and rejects
/// combinations that cannot work (an empty batch, a port span smaller than
/// one batch, a range running past the end of the port space).
#[derive(Debug, Default)]
pub struct ConstraintsBuilder {
    batch_width: Option<usize>,
    base_port: Option<u16>,
    port_span: Option<u16>,
    readiness_timeout: Option<Duration>,
    match_timeout: Option<Duration>,
    shutdown_grace: Option<Duration>,
}

impl ConstraintsBuilder {
    /// Creates a new `ConstraintsBuilder` with every bound left at its
    /// default (batch width 4, ports 5000..5512, 10 s readiness timeout,
    /// derived match timeout, 15 s shutdown grace).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `ConstraintsBuilder` configured from environment
    /// variables.
    ///
    /// Read environment variables are:
    /// - `HARNESS_BATCH_WIDTH` (usize): matches launched and joined together
    /// - `HARNESS_BASE_PORT` (u16): first port probed for the servers
    /// - `HARNESS_PORT_SPAN` (u16): number of ports available above the base
    /// - `HARNESS_READINESS_TIMEOUT_SECS` (u64): server readiness timeout
    /// - `HARNESS_MATCH_TIMEOUT_SECS` (u64): per-match deadline
    /// - `HARNESS_SHUTDOWN_GRACE_SECS` (u64): server shutdown grace
    ///
    /// Unset or unparseable variables fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        fn parse<T: std::str::FromStr>(var: &str) -> Option<T> {
            env::var(var).ok()?.parse().ok()
        }

        fn parse_secs(var: &str) -> Option<Duration> {
            parse::<u64>(var).map(Duration::from_secs)
        }

        ConstraintsBuilder {
            batch_width: parse("HARNESS_BATCH_WIDTH"),
            base_port: parse("HARNESS_BASE_PORT"),
            port_span: parse("HARNESS_PORT_SPAN"),
            readiness_timeout: parse_secs("HARNESS_READINESS_TIMEOUT_SECS"),
            match_timeout: parse_secs("HARNESS_MATCH_TIMEOUT_SECS"),
            shutdown_grace: parse_secs("HARNESS_SHUTDOWN_GRACE_SECS"),
        }
    }

    /// Sets how many matches are launched and joined together.
    #[must_use]
    pub fn with_batch_width(self, width: usize) -> Self {
        Self {
            batch_width: Some(width),
            ..self
        }
    }

    /// Sets the port range servers are assigned from: `base..base + span`.
    #[must_use]
    pub fn with_port_range(self, base: u16, span: u16) -> Self {
        Self {
            base_port: Some(base),
            port_span: Some(span),
            ..self
        }
    }

    /// Sets how long a freshly spawned server may take to start accepting
    /// connections before its run is recorded as a launch failure.
    #[must_use]
    pub fn with_readiness_timeout(self, timeout: Duration) -> Self {
        Self {
            readiness_timeout: Some(timeout),
            ..self
        }
    }

    /// Sets the deadline after which a still-running bot is killed and its
    /// match recorded as a failure.
    ///
    /// When not set, the deadline is derived from the configured tick count
    /// and broadcast interval, plus a fixed margin.
    #[must_use]
    pub fn with_match_timeout(self, timeout: Duration) -> Self {
        Self {
            match_timeout: Some(timeout),
            ..self
        }
    }

    /// Sets how long a server may keep running after all its bots exited.
    /// Servers exceeding the grace are killed.
    #[must_use]
    pub fn with_shutdown_grace(self, grace: Duration) -> Self {
        Self {
            shutdown_grace: Some(grace),
            ..self
        }
    }

    /// Consumes the builder and returns the constructed `Constraints`.
    ///
    /// # Errors
    ///
    /// Returns an error when the bounds are impossible, e.g. a batch width
    /// of zero or a port span too small to cover one batch.
    pub fn build(self) -> anyhow::Result<Constraints> {
        let batch_width = self.batch_width.unwrap_or(4);
        let base_port = self.base_port.unwrap_or(5000);
        let port_span = self.port_span.unwrap_or(512);

        if batch_width == 0 {
            bail!("batch width must be at least 1");
        }
        if usize::from(port_span) < batch_width {
            bail!(
                "port span ({port_span}) must cover at least one full batch ({batch_width} ports)"
            );
        }
        if u32::from(base_port) + u32::from(port_span) > u32::from(u16::MAX) + 1 {
            bail!("port range {base_port}+{port_span} runs past the end of the port space");
        }

        if batch_width > num_cpus::get() {
            warn!(
                batch_width,
                cpus = num_cpus::get(),
                "more simultaneous matches than logical CPUs, host may be oversubscribed"
            );
        }

        Ok(Constraints {
            batch_width,
            base_port,
            port_span,
            readiness_timeout: self.readiness_timeout.unwrap_or(Duration::from_secs(10)),
            match_timeout: self.match_timeout,
            shutdown_grace: self.shutdown_grace.unwrap_or(Duration::from_secs(15)),
        })
    }
}

/// Obtained using [`ConstraintsBuilder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constraints {
    pub(crate) batch_width: usize,
    pub(crate) base_port: u16,
    pub(crate) port_span: u16,
    pub(crate) readiness_timeout: Duration,
    pub(crate) match_timeout: Option<Duration>,
    pub(crate) shutdown_grace: Duration,
}

impl Constraints {
    /// Create a [`ConstraintsBuilder`].
    pub fn builder() -> ConstraintsBuilder {
        ConstraintsBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let constraints = ConstraintsBuilder::new().build().unwrap();
        assert_eq!(constraints.batch_width, 4);
        assert_eq!(constraints.base_port, 5000);
        assert_eq!(constraints.port_span, 512);
        assert!(constraints.match_timeout.is_none());
    }

    #[test]
    fn zero_batch_width_is_rejected() {
        assert!(ConstraintsBuilder::new().with_batch_width(0).build().is_err());
    }

    #[test]
    fn span_smaller_than_a_batch_is_rejected() {
        let res = ConstraintsBuilder::new()
            .with_batch_width(8)
            .with_port_range(5000, 4)
            .build();
        assert!(res.is_err());
    }

    #[test]
    fn range_past_the_port_space_is_rejected() {
        let res = ConstraintsBuilder::new()
            .with_batch_width(2)
            .with_port_range(u16::MAX - 1, 16)
            .build();
        assert!(res.is_err());
    }
}
