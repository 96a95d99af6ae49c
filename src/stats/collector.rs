//! # Background telemetry collector.
//!
//! One dedicated task per run, started before the first iteration, draining
//! the root endpoint's inbound stream into the shared [`CounterTable`].
//!
//! ## Loop body
//! ```text
//! loop {
//!   ├─ cancel observed        → exit cleanly
//!   ├─ stream closed          → exit cleanly (logged)
//!   └─ envelope received:
//!        ├─ payload is not a Sample → debug!, drop
//!        ├─ source unregistered     → debug!, drop
//!        └─ known source            → accumulate under the counter lock
//! }
//! ```
//!
//! ## Rules
//! - Nothing the collector encounters propagates: a malformed or spoofed
//!   sample is dropped, never fatal, and collector exit never terminates the
//!   orchestrator.
//! - With an explicit completion target, the collector also exits after the
//!   configured number of `totaltime` samples from known sources.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::stats::counters::{names, CounterTable, Sample};
use crate::transport::Inbound;

/// Drains `inbound` into `counters` until cancellation, stream close, or the
/// optional completion target is reached.
pub(crate) async fn collect(
    mut inbound: Inbound,
    counters: Arc<CounterTable>,
    cancel: CancellationToken,
    stop_after_units: Option<u64>,
) {
    let mut completed: u64 = 0;
    loop {
        let env = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("telemetry collector cancelled");
                return;
            }
            env = inbound.recv() => match env {
                Some(env) => env,
                None => {
                    tracing::debug!("telemetry stream closed, collector exiting");
                    return;
                }
            },
        };

        let sample: Sample = match env.decode() {
            Ok(sample) => sample,
            Err(err) => {
                tracing::debug!(source = %env.source, error = %err, "dropping non-telemetry payload");
                continue;
            }
        };

        if !counters.apply(&env.source, &sample) {
            tracing::debug!(source = %env.source, counter = %sample.counter, "unknown participant, sample dropped");
            continue;
        }

        if sample.counter == names::TOTALTIME {
            completed += 1;
            if stop_after_units.is_some_and(|target| completed >= target) {
                tracing::debug!(completed, "completion target reached, collector exiting");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Envelope, ParticipantId};
    use tokio::sync::mpsc;

    fn id(port: u16) -> ParticipantId {
        ParticipantId::new(format!("127.0.0.1:{port}").parse().unwrap())
    }

    fn telemetry(from: &ParticipantId, counter: &str, value: f64) -> Envelope {
        let sample = Sample {
            counter: counter.into(),
            value,
        };
        Envelope::encode(from.clone(), 0, &sample).unwrap()
    }

    #[tokio::test]
    async fn accumulates_known_and_drops_unknown() {
        let (tx, rx) = mpsc::channel(16);
        let counters = Arc::new(CounterTable::new());
        counters.init([id(1), id(2), id(3)]);

        for p in [id(1), id(2), id(3)] {
            tx.send(telemetry(&p, names::TOTALTIME, 2.0)).await.unwrap();
            tx.send(telemetry(&p, names::SENT, 1.0)).await.unwrap();
        }
        // Unregistered fourth source: must be dropped silently.
        tx.send(telemetry(&id(9), names::SENT, 100.0)).await.unwrap();
        drop(tx);

        collect(rx, counters.clone(), CancellationToken::new(), None).await;

        let stats = counters.fold(None);
        assert_eq!(stats.time, 6.0);
        assert_eq!(stats.sent, 3.0);
    }

    #[tokio::test]
    async fn stops_after_completion_target() {
        let (tx, rx) = mpsc::channel(16);
        let counters = Arc::new(CounterTable::new());
        counters.init([id(1), id(2)]);

        tx.send(telemetry(&id(1), names::TOTALTIME, 1.0)).await.unwrap();
        tx.send(telemetry(&id(2), names::TOTALTIME, 1.0)).await.unwrap();
        // tx intentionally kept open: the collector must exit on its own.
        collect(rx, counters.clone(), CancellationToken::new(), Some(2)).await;
        assert_eq!(counters.fold(None).time, 2.0);
        drop(tx);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let (_tx, rx) = mpsc::channel::<Envelope>(1);
        let counters = Arc::new(CounterTable::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        // Completes immediately instead of blocking on the open channel.
        collect(rx, counters, cancel, None).await;
    }

    #[tokio::test]
    async fn malformed_payload_is_not_fatal() {
        let (tx, rx) = mpsc::channel(4);
        let counters = Arc::new(CounterTable::new());
        counters.init([id(1)]);

        tx.send(Envelope::new(id(1), 0, vec![0xff; 3])).await.unwrap();
        tx.send(telemetry(&id(1), names::MEM, 64.0)).await.unwrap();
        drop(tx);

        collect(rx, counters.clone(), CancellationToken::new(), None).await;
        assert_eq!(counters.fold(None).mem, 64.0);
    }
}
