use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{FetchError, SessionError};
use crate::market_data::client::{SnapshotSource, fetch_snapshot};
use crate::market_data::types::Snapshot;
use crate::metrics::prometheus::{record_fetch_error, record_fetch_latency_ms, record_poll_tick};
use crate::render::surface::Surface;
use crate::session::{DashboardSession, SessionReport};

/// Held for as long as one poll cycle (fetch and apply) is in flight.
/// Dropping it lets the next tick through.
#[derive(Debug)]
pub struct InFlight(Arc<AtomicBool>);

impl InFlight {
    /// `None` when another cycle still holds the flag.
    pub fn acquire(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(busy.clone()))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Result of one poll cycle on its way to the session worker.
#[derive(Debug)]
pub struct Polled {
    pub seq: u64,
    pub snapshot: Result<Snapshot, FetchError>,
    pub in_flight: InFlight,
}

/// Fixed-cadence ticker. A tick that finds the previous cycle still running
/// is dropped, never queued.
pub async fn run_poller<S>(
    source: Arc<S>,
    period: Duration,
    tx: mpsc::Sender<Polled>,
) -> anyhow::Result<()>
where
    S: SnapshotSource + 'static,
{
    let busy = Arc::new(AtomicBool::new(false));
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut seq: u64 = 0;

    info!(period_ms = period.as_millis() as u64, "poller started");

    while !tx.is_closed() {
        ticker.tick().await;

        let Some(in_flight) = InFlight::acquire(&busy) else {
            debug!(last_seq = seq, "previous cycle in flight, dropping tick");
            record_poll_tick("busy");
            continue;
        };
        seq += 1;

        let source = source.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let snapshot = fetch_snapshot(source.as_ref(), seq).await;
            record_fetch_latency_ms(started.elapsed().as_secs_f64() * 1_000.0);

            let polled = Polled {
                seq,
                snapshot,
                in_flight,
            };
            if tx.send(polled).await.is_err() {
                debug!(seq, "session worker gone, discarding snapshot");
            }
        });
    }

    info!("poller stopped");
    Ok(())
}

/// Drains poll results into the session and sweeps expired highlights on
/// `sweep_every`. Returns once every sender is gone.
pub async fn run_session_worker<S, F>(
    mut rx: mpsc::Receiver<Polled>,
    mut session: DashboardSession<S>,
    sweep_every: Duration,
    mut on_applied: F,
) -> anyhow::Result<()>
where
    S: Surface + Send,
    F: FnMut(&DashboardSession<S>, &SessionReport) + Send,
{
    let mut sweep = time::interval(sweep_every);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            polled = rx.recv() => {
                let Some(polled) = polled else {
                    break;
                };
                if let Some(report) = handle_polled(&mut session, polled) {
                    on_applied(&session, &report);
                }
            }
            _ = sweep.tick() => {
                let cleared = session.expire_highlights(Instant::now());
                if cleared > 0 {
                    debug!(cleared, "highlights expired");
                }
            }
        }
    }

    info!(last_seq = ?session.last_seq(), "session worker stopped");
    Ok(())
}

/// Applies one poll result. The in-flight flag is released on return, after
/// the apply, so no fetch overlaps a reconciliation pass.
fn handle_polled<S: Surface>(session: &mut DashboardSession<S>, polled: Polled) -> Option<SessionReport> {
    let Polled { seq, snapshot, in_flight } = polled;
    let outcome = match snapshot {
        Ok(snapshot) => match session.apply(&snapshot, Instant::now()) {
            Ok(report) => {
                record_poll_tick("applied");
                Some(report)
            }
            Err(SessionError::Stale { .. }) => {
                record_poll_tick("stale");
                None
            }
            Err(SessionError::Rejected { .. }) => {
                record_poll_tick("failed");
                None
            }
        },
        Err(err) => {
            warn!(seq, kind = err.kind(), error = %err, "poll failed, keeping current view");
            record_fetch_error(err.kind());
            record_poll_tick("failed");
            None
        }
    };
    drop(in_flight);
    outcome
}
