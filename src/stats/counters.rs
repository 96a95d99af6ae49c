//! # The shared counter table.
//!
//! [`CounterTable`] maps participant identity → counter name → accumulated
//! value. An identity is present iff it was registered through
//! [`CounterTable::init`] before the run started; samples from any other
//! source are rejected by [`CounterTable::apply`] and dropped by the caller.
//!
//! ## Rules
//! - Updates are **additive**: the first write of a key initializes it, every
//!   later write adds. Accumulation is therefore associative and commutative
//!   per key — sample delivery order does not matter.
//! - Structural mutation (adding/removing identities) happens only in `init`.
//! - All access is under one exclusive lock; `fold` takes a consistent
//!   snapshot but may race with in-flight samples, which simply land in the
//!   next snapshot.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::stats::report::RunStats;
use crate::transport::ParticipantId;

/// Well-known counter names reported by runners and folded into [`RunStats`].
pub mod names {
    /// Application messages sent by a participant.
    pub const SENT: &str = "sent";
    /// Accumulated user CPU time, seconds.
    pub const USRTIME: &str = "totalusrtime";
    /// Accumulated system CPU time, seconds.
    pub const SYSTIME: &str = "totalsystime";
    /// Wallclock time of the role body, seconds.
    pub const TOTALTIME: &str = "totaltime";
    /// Peak memory, bytes.
    pub const MEM: &str = "mem";
}

/// One telemetry datum: a named counter increment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Counter name; see [`names`] for the well-known set.
    pub counter: String,
    /// Value to accumulate.
    pub value: f64,
}

/// Shared mapping from participant identity to accumulated named counters.
#[derive(Debug, Default)]
pub struct CounterTable {
    inner: Mutex<HashMap<ParticipantId, HashMap<String, f64>>>,
}

impl CounterTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the table with one empty counter map per participant.
    ///
    /// Called at the start of each iteration, before the start signal goes
    /// out, so every sample a running participant delivers finds its slot.
    pub fn init<I>(&self, participants: I)
    where
        I: IntoIterator<Item = ParticipantId>,
    {
        let mut inner = self.inner.lock().expect("counter lock poisoned");
        inner.clear();
        for p in participants {
            inner.insert(p, HashMap::new());
        }
    }

    /// Accumulates one sample.
    ///
    /// Returns `false` when `source` is not registered; the sample must then
    /// be dropped by the caller (never crash the collector).
    pub fn apply(&self, source: &ParticipantId, sample: &Sample) -> bool {
        let mut inner = self.inner.lock().expect("counter lock poisoned");
        match inner.get_mut(source) {
            Some(counters) => {
                *counters.entry(sample.counter.clone()).or_insert(0.0) += sample.value;
                true
            }
            None => false,
        }
    }

    /// Number of registered participants.
    pub fn participants(&self) -> usize {
        self.inner.lock().expect("counter lock poisoned").len()
    }

    /// Folds every participant's counters into fixed-shape totals.
    ///
    /// Each field is summed only where the counter is present. When
    /// `total_units` is set, every field is divided by it (per-unit
    /// normalization).
    pub fn fold(&self, total_units: Option<f64>) -> RunStats {
        let mut stats = RunStats::default();
        {
            let inner = self.inner.lock().expect("counter lock poisoned");
            for counters in inner.values() {
                if let Some(v) = counters.get(names::SENT) {
                    stats.sent += v;
                }
                if let Some(v) = counters.get(names::USRTIME) {
                    stats.usrtime += v;
                }
                if let Some(v) = counters.get(names::SYSTIME) {
                    stats.systime += v;
                }
                if let Some(v) = counters.get(names::TOTALTIME) {
                    stats.time += v;
                }
                if let Some(v) = counters.get(names::MEM) {
                    stats.mem += v;
                }
            }
        }

        if let Some(units) = total_units {
            stats.scale(1.0 / units);
        }
        stats
    }

    /// Summed value of one counter across all participants (for reporting).
    pub(crate) fn total_of(&self, counter: &str) -> Option<f64> {
        let inner = self.inner.lock().expect("counter lock poisoned");
        let mut total = None;
        for counters in inner.values() {
            if let Some(v) = counters.get(counter) {
                *total.get_or_insert(0.0) += v;
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(port: u16) -> ParticipantId {
        ParticipantId::new(format!("127.0.0.1:{port}").parse().unwrap())
    }

    fn sample(counter: &str, value: f64) -> Sample {
        Sample {
            counter: counter.into(),
            value,
        }
    }

    #[test]
    fn accumulation_is_order_independent() {
        let samples = [
            (id(1), sample(names::SENT, 1.0)),
            (id(2), sample(names::SENT, 2.0)),
            (id(1), sample(names::TOTALTIME, 0.5)),
            (id(1), sample(names::SENT, 3.0)),
            (id(2), sample(names::TOTALTIME, 1.5)),
        ];

        let forward = CounterTable::new();
        forward.init([id(1), id(2)]);
        for (src, s) in &samples {
            assert!(forward.apply(src, s));
        }

        let reverse = CounterTable::new();
        reverse.init([id(1), id(2)]);
        for (src, s) in samples.iter().rev() {
            assert!(reverse.apply(src, s));
        }

        assert_eq!(forward.fold(None), reverse.fold(None));
        assert_eq!(forward.fold(None).sent, 6.0);
        assert_eq!(forward.fold(None).time, 2.0);
    }

    #[test]
    fn unknown_source_is_rejected() {
        let table = CounterTable::new();
        table.init([id(1)]);
        assert!(!table.apply(&id(9), &sample(names::SENT, 1.0)));
        assert_eq!(table.fold(None).sent, 0.0);
    }

    #[test]
    fn init_resets_previous_counters() {
        let table = CounterTable::new();
        table.init([id(1)]);
        table.apply(&id(1), &sample(names::MEM, 100.0));
        table.init([id(1)]);
        assert_eq!(table.fold(None).mem, 0.0);
        assert_eq!(table.participants(), 1);
    }

    #[test]
    fn total_units_scales_every_field() {
        let table = CounterTable::new();
        table.init([id(1)]);
        table.apply(&id(1), &sample(names::USRTIME, 8.0));
        table.apply(&id(1), &sample(names::MEM, 4.0));

        let raw = table.fold(None);
        let scaled = table.fold(Some(2.0));
        assert_eq!(scaled.usrtime, raw.usrtime / 2.0);
        assert_eq!(scaled.mem, raw.mem / 2.0);
    }
}
