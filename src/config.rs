//! # Global run configuration.
//!
//! Provides [`RunConfig`], the value surface consumed by the runtime core:
//! iteration count, output paths, per-unit normalization, transport kind,
//! and shutdown grace.
//!
//! Config is used in two ways:
//! 1. **Runtime creation**: `Runtime::new(config)`
//! 2. **Statistics normalization**: `total_units` divides every aggregated
//!    field before reporting.
//!
//! ## Sentinel values
//! - `iterations` is clamped to a minimum of 1 by the run loop.
//! - `total_units = None` → raw totals are reported, no normalization.
//! - `grace = 0s` → forced termination happens immediately on shutdown.

use std::path::PathBuf;
use std::time::Duration;

use crate::transport::TransportKind;

/// Global configuration for a distvisor run.
///
/// Defines:
/// - **Run shape**: number of iterations driven by the run loop
/// - **Outputs**: optional text summary and binary statistics dump
/// - **Normalization**: optional expected-unit count
/// - **Transport**: initial endpoint kind (may still be changed through
///   [`Runtime::select_transport`](crate::Runtime::select_transport) until
///   the first participant is created)
/// - **Shutdown behavior**: grace period before force-terminating runners
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Number of iterations the run loop drives. Clamped to ≥ 1.
    pub iterations: usize,

    /// Optional path for the tab-separated summary line
    /// (`usrtime\ttime\tmem`). Written after the last iteration.
    pub perf_file: Option<PathBuf>,

    /// Optional path for the binary-serialized final statistics record.
    pub dump_file: Option<PathBuf>,

    /// Expected number of completed logical work units.
    ///
    /// When set, every aggregated statistics field is divided by this value
    /// before it is reported (per-unit normalization).
    pub total_units: Option<f64>,

    /// Stop the telemetry collector once `total_units` `totaltime` samples
    /// have been observed.
    ///
    /// Ignored when `total_units` is `None`. Off by default; the collector
    /// then runs until the run loop cancels it.
    pub stop_collector_at_units: bool,

    /// Transport kind used for every endpoint of this run.
    pub transport: TransportKind,

    /// Command-line style parameters forwarded to every spawned role.
    pub params: Vec<String>,

    /// Maximum time to wait for live participants after cancellation before
    /// their runner tasks are aborted outright.
    pub grace: Duration,
}

impl RunConfig {
    /// Returns the iteration count clamped to a minimum of 1.
    #[inline]
    pub fn iterations_clamped(&self) -> usize {
        self.iterations.max(1)
    }

    /// Returns the collector completion target, if configured.
    ///
    /// `Some(n)` only when both `total_units` is set and
    /// `stop_collector_at_units` is enabled; the collector exits after `n`
    /// `totaltime` samples.
    #[inline]
    pub fn collector_stop_after(&self) -> Option<u64> {
        if !self.stop_collector_at_units {
            return None;
        }
        self.total_units.map(|u| u.max(0.0) as u64)
    }
}

impl Default for RunConfig {
    /// Default configuration:
    ///
    /// - `iterations = 1`
    /// - no output files
    /// - no normalization, collector runs until cancelled
    /// - `transport = TransportKind::Datagram`
    /// - `grace = 5s`
    fn default() -> Self {
        Self {
            iterations: 1,
            perf_file: None,
            dump_file: None,
            total_units: None,
            stop_collector_at_units: false,
            transport: TransportKind::Datagram,
            params: Vec::new(),
            grace: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterations_clamp_to_one() {
        let cfg = RunConfig {
            iterations: 0,
            ..RunConfig::default()
        };
        assert_eq!(cfg.iterations_clamped(), 1);
    }

    #[test]
    fn collector_stop_requires_both_settings() {
        let mut cfg = RunConfig::default();
        assert_eq!(cfg.collector_stop_after(), None);

        cfg.total_units = Some(3.0);
        assert_eq!(cfg.collector_stop_after(), None);

        cfg.stop_collector_at_units = true;
        assert_eq!(cfg.collector_stop_after(), Some(3));
    }
}
