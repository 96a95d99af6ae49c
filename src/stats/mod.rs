//! # Statistics: counter accumulation, collection, and run summaries.
//!
//! Three pieces, wired by the runtime core:
//! - [`counters`]: the shared [`CounterTable`] keyed by participant identity;
//! - [`collector`]: the background task draining telemetry envelopes from the
//!   root endpoint into the table;
//! - [`report`]: folding the table into fixed-shape [`RunStats`], iteration
//!   averaging, human-readable summaries, and file persistence.
//!
//! The table is the only state shared between the collector (writer) and the
//! aggregation paths (readers, plus a full reset at the start of each
//! iteration); all access goes through one exclusive lock, distinct from the
//! registry lock so handshakes never block telemetry delivery.

pub(crate) mod collector;
mod counters;
mod report;

pub use counters::{names, CounterTable, Sample};
pub use report::RunStats;
pub(crate) use report::{log_summary, summary_line};
