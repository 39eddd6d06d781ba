use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;

use tickboard::config::Config;
use tickboard::error::FetchError;
use tickboard::market_data::client::{SnapshotSource, fetch_snapshot};
use tickboard::market_data::poller::{run_poller, run_session_worker};
use tickboard::market_data::types::{
    BuySignal, Candle, CashFlowResponse, SummaryResponse, TrendSignal,
};
use tickboard::session::{DashboardSession, MARKET_FEED, NIFTY, POSITIONS, headless_surface};

/// Serves scripted summaries in order, repeating the last one forever.
struct Scripted {
    summaries: Mutex<VecDeque<SummaryResponse>>,
}

impl Scripted {
    fn new(summaries: Vec<SummaryResponse>) -> Self {
        Self {
            summaries: Mutex::new(summaries.into()),
        }
    }
}

#[async_trait]
impl SnapshotSource for Scripted {
    async fn fetch_summary(&self) -> Result<SummaryResponse, FetchError> {
        let mut queue = self.summaries.lock().unwrap();
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        next.ok_or_else(|| FetchError::Api("no data".into()))
    }

    async fn fetch_cash_flow(&self) -> Result<CashFlowResponse, FetchError> {
        Err(FetchError::Status {
            status: 503,
            body: "unavailable".into(),
        })
    }

    async fn fetch_buy_signals(&self) -> Result<Vec<BuySignal>, FetchError> {
        Ok(Vec::new())
    }
}

fn row(key: &str, close: f64) -> Candle {
    Candle {
        instrument_key: Some(key.into()),
        instrument_name: Some(key.into()),
        timestamp: Some("2025-01-02T09:15:00+05:30".into()),
        open: Some(100.0),
        high: Some(105.0),
        low: Some(95.0),
        close: Some(close),
        volume: Some(1_000.0),
        ..Default::default()
    }
}

fn summary(candles: Vec<Candle>) -> SummaryResponse {
    SummaryResponse {
        ok: true,
        candles,
        ..Default::default()
    }
}

fn config(feed_capacity: usize) -> Config {
    Config {
        feed_capacity,
        ..Config::default()
    }
}

#[tokio::test]
async fn nifty_close_change_flashes_only_close() {
    let source = Scripted::new(vec![
        SummaryResponse {
            nifty_data: Some(row("NIFTY", 100.0)),
            ..summary(vec![row("BANKNIFTY", 50.0)])
        },
        SummaryResponse {
            nifty_data: Some(row("NIFTY", 101.0)),
            ..summary(vec![row("BANKNIFTY", 50.0)])
        },
    ]);
    let mut session = DashboardSession::new(&config(20), headless_surface());
    let now = Instant::now();

    let first = fetch_snapshot(&source, 1).await.unwrap();
    assert!(first.cash_flow.is_none());
    session.apply(&first, now).unwrap();

    let second = fetch_snapshot(&source, 2).await.unwrap();
    let report = session.apply(&second, now).unwrap();

    let feed = report.panel(MARKET_FEED).unwrap();
    assert!(feed.created.is_empty());
    assert_eq!(feed.changes_for("NIFTY").unwrap().changed, ["close"]);
    assert!(feed.changes_for("BANKNIFTY").is_none());

    let surface = session.surface();
    assert_eq!(surface.keys(MARKET_FEED), ["BANKNIFTY", "NIFTY"]);
    let card = surface.block(MARKET_FEED, "NIFTY").unwrap();
    assert!(card.is_highlighted("close"));
    for untouched in ["open", "high", "low"] {
        assert!(!card.is_highlighted(untouched), "{untouched} flashed");
    }
    assert_eq!(surface.block(NIFTY, "NIFTY").unwrap().text("price"), Some("₹101.00"));

    session.expire_highlights(now + Duration::from_millis(1_000));
    let card = session.surface().block(MARKET_FEED, "NIFTY").unwrap();
    assert!(!card.is_highlighted("close"));
}

#[tokio::test]
async fn feed_keeps_newest_first_sightings_within_capacity() {
    let keys = ["a", "b", "c", "d", "e"];
    let source = Scripted::new(vec![
        summary(keys[..3].iter().map(|k| row(k, 1.0)).collect()),
        summary(keys[2..].iter().map(|k| row(k, 2.0)).collect()),
    ]);
    let mut session = DashboardSession::new(&config(3), headless_surface());
    let now = Instant::now();

    session.apply(&fetch_snapshot(&source, 1).await.unwrap(), now).unwrap();
    let report = session
        .apply(&fetch_snapshot(&source, 2).await.unwrap(), now)
        .unwrap();

    let feed = report.panel(MARKET_FEED).unwrap();
    assert_eq!(feed.evicted, ["a", "b"]);
    assert_eq!(session.surface().keys(MARKET_FEED), ["c", "d", "e"]);
}

#[tokio::test]
async fn reading_position_survives_appends() {
    let initial: Vec<Candle> = (0..6).map(|i| row(&format!("k{i}"), 1.0)).collect();
    let mut grown = initial.clone();
    grown.push(row("k6", 1.0));
    let source = Scripted::new(vec![summary(initial), summary(grown)]);
    let mut session = DashboardSession::new(&config(20), headless_surface());
    let now = Instant::now();

    session.apply(&fetch_snapshot(&source, 1).await.unwrap(), now).unwrap();
    let surface = session.surface_mut();
    let height = surface.scroll_height(MARKET_FEED);
    let reading_at = height - surface.client_height(MARKET_FEED) - 200.0;
    assert!(reading_at > 0.0);
    surface.scroll_to(MARKET_FEED, reading_at);

    session.apply(&fetch_snapshot(&source, 2).await.unwrap(), now).unwrap();
    let surface = session.surface();
    assert!(surface.scroll_height(MARKET_FEED) > height);
    assert!((surface.scroll_top(MARKET_FEED) - reading_at).abs() <= 10.0);
}

#[tokio::test]
async fn poller_drives_the_session_until_shutdown() {
    let open = TrendSignal {
        timestamp: Some("2025-01-02 09:20:00".into()),
        buy_recommendation: Some("BUY_CE".into()),
        ..Default::default()
    };
    let source = Arc::new(Scripted::new(vec![
        SummaryResponse {
            active_signals: vec![open.clone()],
            ..summary(vec![row("NIFTY", 100.0)])
        },
        SummaryResponse {
            active_signals: vec![open],
            ..summary(vec![row("NIFTY", 101.0)])
        },
    ]));
    let session = DashboardSession::new(&config(20), headless_surface());

    let (tx, rx) = mpsc::channel(4);
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    let poller = tokio::spawn(run_poller(source, Duration::from_millis(10), tx));
    let worker = tokio::spawn(run_session_worker(
        rx,
        session,
        Duration::from_millis(5),
        move |session, report| {
            let close = session
                .surface()
                .block(MARKET_FEED, "NIFTY")
                .and_then(|b| b.text("close").map(str::to_owned));
            let positions = session.surface().keys(POSITIONS).len();
            let _ = frames_tx.send((report.seq, close, positions));
        },
    ));

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let frame = tokio::time::timeout(Duration::from_secs(2), frames_rx.recv())
            .await
            .expect("no frame within timeout")
            .expect("worker stopped early");
        seen.push(frame);
    }

    let seqs: Vec<u64> = seen.iter().map(|(seq, _, _)| *seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "out of order: {seqs:?}");
    assert_eq!(seen[0].1.as_deref(), Some("100.00"));
    assert_eq!(seen[2].1.as_deref(), Some("101.00"));
    assert!(seen.iter().all(|(_, _, positions)| *positions == 1));

    poller.abort();
    let _ = poller.await;
    let result = tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker did not stop after poller shutdown");
    assert!(result.unwrap().is_ok());
}

/// A summary endpoint slower than the poll cadence, counting overlapping calls.
#[derive(Default)]
struct Slow {
    calls: AtomicUsize,
    inflight: AtomicUsize,
    max_inflight: AtomicUsize,
}

#[async_trait]
impl SnapshotSource for Slow {
    async fn fetch_summary(&self) -> Result<SummaryResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inflight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.inflight.fetch_sub(1, Ordering::SeqCst);
        Ok(summary(vec![row("NIFTY", 100.0)]))
    }

    async fn fetch_cash_flow(&self) -> Result<CashFlowResponse, FetchError> {
        Ok(CashFlowResponse::default())
    }

    async fn fetch_buy_signals(&self) -> Result<Vec<BuySignal>, FetchError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn slow_fetches_never_overlap_and_ticks_are_dropped() {
    let source = Arc::new(Slow::default());
    let session = DashboardSession::new(&config(20), headless_surface());

    let (tx, rx) = mpsc::channel(4);
    let poller = tokio::spawn(run_poller(source.clone(), Duration::from_millis(5), tx));
    let worker = tokio::spawn(run_session_worker(rx, session, Duration::from_millis(5), |_, _| {}));

    tokio::time::sleep(Duration::from_millis(300)).await;
    poller.abort();
    let _ = poller.await;
    let _ = tokio::time::timeout(Duration::from_secs(2), worker).await;

    let calls = source.calls.load(Ordering::SeqCst);
    assert_eq!(source.max_inflight.load(Ordering::SeqCst), 1);
    assert!(calls >= 2, "only {calls} fetches");
    // 300ms at a 5ms cadence is ~60 ticks; 50ms fetches allow at most ~6.
    assert!(calls < 30, "{calls} fetches, ticks were queued");
}
