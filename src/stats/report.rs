//! # Run-level statistics: folding, averaging, and persistence.
//!
//! [`RunStats`] is the fixed-shape record produced once per iteration by
//! folding the [`CounterTable`](crate::stats::CounterTable), accumulated
//! across iterations, and divided by the iteration count at the end of a run
//! (simple arithmetic mean).
//!
//! Two persisted forms exist:
//! - a one-line tab-separated summary `usrtime\ttime\tmem` (machine-readable);
//! - a bincode-serialized dump of the whole record.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stats::counters::{names, CounterTable};

/// Fixed-shape per-iteration / per-run statistics record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Application messages sent.
    pub sent: f64,
    /// User CPU time, seconds.
    pub usrtime: f64,
    /// System CPU time, seconds.
    pub systime: f64,
    /// Wallclock time of role bodies, seconds.
    pub time: f64,
    /// Completed logical work units.
    pub units: f64,
    /// Memory, bytes.
    pub mem: f64,
}

impl RunStats {
    /// Field-wise addition; used to accumulate across iterations.
    pub fn accumulate(&mut self, other: &RunStats) {
        self.sent += other.sent;
        self.usrtime += other.usrtime;
        self.systime += other.systime;
        self.time += other.time;
        self.units += other.units;
        self.mem += other.mem;
    }

    /// Field-wise division by the iteration count (simple mean).
    ///
    /// `iterations` ≥ 1 is an invariant enforced by the run loop.
    pub fn finalize(&mut self, iterations: usize) {
        self.scale(1.0 / iterations.max(1) as f64);
    }

    pub(crate) fn scale(&mut self, factor: f64) {
        self.sent *= factor;
        self.usrtime *= factor;
        self.systime *= factor;
        self.time *= factor;
        self.units *= factor;
        self.mem *= factor;
    }
}

/// Builds the one-line tab-separated machine-readable form.
pub(crate) fn summary_line(stats: &RunStats) -> String {
    format!("{}\t{}\t{}", stats.usrtime, stats.time, stats.mem)
}

/// Logs the human-readable per-iteration summary.
pub(crate) fn log_summary(walltime: Duration, table: &CounterTable, total_units: Option<f64>) {
    let mut out = String::from("***** Statistics *****\n");
    out.push_str(&format!("* Total participants: {}\n", table.participants()));
    out.push_str(&format!("* Wallclock time: {:.6}\n", walltime.as_secs_f64()));

    if let Some(usr) = table.total_of(names::USRTIME) {
        out.push_str(&format!("** Total usertime: {usr:.6}\n"));
        if let Some(units) = total_units {
            out.push_str(&format!("*** Average usertime: {:.6}\n", usr / units));
        }
    }
    if let Some(sys) = table.total_of(names::SYSTIME) {
        out.push_str(&format!("** Total systemtime: {sys:.6}\n"));
    }
    if let Some(mem) = table.total_of(names::MEM) {
        out.push_str(&format!("** Total memory: {mem:.0}\n"));
        if let Some(units) = total_units {
            out.push_str(&format!("*** Average memory: {:.6}\n", mem / units));
        }
    }

    tracing::info!("{out}");
}
