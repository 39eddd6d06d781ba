//! One dashboard: a reconciliation engine per panel plus the view options
//! and ordering state that sit above them.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::reconcile::{ApplyReport, Mode, ReconciliationEngine};
use crate::error::SessionError;
use crate::market_data::types::{CashFlow, CashFlowResponse, CashInterval, Envelope, Snapshot};
use crate::metrics::prometheus::{record_highlights, record_reconcile, record_stale_snapshot};
use crate::render::cards::{
    BuySignalCard, CashFlowCard, IndexTile, InstrumentCard, ItmLegCard, LatestSignalCard,
    PositionCard, RecentSignalCard, TrendCard,
};
use crate::render::headless::HeadlessSurface;
use crate::render::surface::{PanelId, Surface};

pub const MARKET_FEED: PanelId = PanelId("market-feed");
pub const NIFTY: PanelId = PanelId("nifty");
pub const FUTURE: PanelId = PanelId("future");
pub const CASH_FLOW: PanelId = PanelId("cash-flow");
pub const ITM_CE: PanelId = PanelId("itm-ce");
pub const ITM_PE: PanelId = PanelId("itm-pe");
pub const TREND: PanelId = PanelId("trend");
pub const LATEST_SIGNAL: PanelId = PanelId("latest-signal");
pub const POSITIONS: PanelId = PanelId("positions");
pub const RECENT_SIGNALS: PanelId = PanelId("recent-signals");
pub const BUY_SIGNALS: PanelId = PanelId("buy-signals");

/// Visible height of the market feed in the headless surface.
const FEED_VIEWPORT_PX: f64 = 600.0;

/// Viewer-controlled display options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewOptions {
    pub cash_interval: CashInterval,
}

/// Per-panel outcome of one applied snapshot. Panels left untouched (source
/// row missing) do not appear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    pub seq: u64,
    pub panels: Vec<(PanelId, ApplyReport)>,
}

impl SessionReport {
    pub fn panel(&self, panel: PanelId) -> Option<&ApplyReport> {
        self.panels.iter().find(|(p, _)| *p == panel).map(|(_, r)| r)
    }

    pub fn highlighted(&self) -> usize {
        self.panels.iter().map(|(_, r)| r.highlighted).sum()
    }

    pub fn is_noop(&self) -> bool {
        self.panels.iter().all(|(_, r)| r.is_noop())
    }
}

/// Cash-flow figures of the last cycle that carried any.
#[derive(Debug, Clone, Default)]
struct CashFlowSources {
    endpoint: Option<CashFlowResponse>,
    summary: Option<CashFlow>,
}

impl CashFlowSources {
    fn pick(&self, interval: CashInterval) -> Option<&CashFlow> {
        self.endpoint
            .as_ref()
            .and_then(|resp| resp.bucket(interval))
            .or(self.summary.as_ref())
    }
}

#[derive(Debug)]
struct Panels {
    feed: ReconciliationEngine,
    nifty: ReconciliationEngine,
    future: ReconciliationEngine,
    cash_flow: ReconciliationEngine,
    itm_ce: ReconciliationEngine,
    itm_pe: ReconciliationEngine,
    trend: ReconciliationEngine,
    latest_signal: ReconciliationEngine,
    positions: ReconciliationEngine,
    recent_signals: ReconciliationEngine,
    buy_signals: ReconciliationEngine,
}

impl Panels {
    fn new(config: &Config) -> Self {
        let engine = |panel, mode| {
            ReconciliationEngine::new(
                panel,
                mode,
                config.highlight_duration,
                config.scroll_tolerance_px,
            )
        };
        Self {
            feed: engine(
                MARKET_FEED,
                Mode::BoundedFeed {
                    capacity: config.feed_capacity,
                },
            ),
            nifty: engine(NIFTY, Mode::Singleton),
            future: engine(FUTURE, Mode::Singleton),
            cash_flow: engine(CASH_FLOW, Mode::Singleton),
            itm_ce: engine(ITM_CE, Mode::Singleton),
            itm_pe: engine(ITM_PE, Mode::Singleton),
            trend: engine(TREND, Mode::Singleton),
            latest_signal: engine(LATEST_SIGNAL, Mode::Singleton),
            positions: engine(POSITIONS, Mode::PresenceSet),
            recent_signals: engine(RECENT_SIGNALS, Mode::PresenceSet),
            buy_signals: engine(BUY_SIGNALS, Mode::PresenceSet),
        }
    }

    fn all(&self) -> [&ReconciliationEngine; 11] {
        [
            &self.feed,
            &self.nifty,
            &self.future,
            &self.cash_flow,
            &self.itm_ce,
            &self.itm_pe,
            &self.trend,
            &self.latest_signal,
            &self.positions,
            &self.recent_signals,
            &self.buy_signals,
        ]
    }

    fn all_mut(&mut self) -> [&mut ReconciliationEngine; 11] {
        [
            &mut self.feed,
            &mut self.nifty,
            &mut self.future,
            &mut self.cash_flow,
            &mut self.itm_ce,
            &mut self.itm_pe,
            &mut self.trend,
            &mut self.latest_signal,
            &mut self.positions,
            &mut self.recent_signals,
            &mut self.buy_signals,
        ]
    }
}

/// Headless surface laid out for the dashboard: a scrollable feed and the
/// empty-state texts of the list panels.
pub fn headless_surface() -> HeadlessSurface {
    HeadlessSurface::new()
        .with_viewport(MARKET_FEED, FEED_VIEWPORT_PX)
        .with_placeholder(MARKET_FEED, "Waiting for market data")
        .with_placeholder(LATEST_SIGNAL, "No active signals")
        .with_placeholder(POSITIONS, "No active positions")
        .with_placeholder(RECENT_SIGNALS, "No recent signals")
        .with_placeholder(BUY_SIGNALS, "No recent signals")
}

/// Applies poll snapshots to every panel of one surface.
///
/// Snapshots are applied strictly in sequence order; anything at or below the
/// last applied sequence is rejected without touching the surface.
#[derive(Debug)]
pub struct DashboardSession<S: Surface> {
    surface: S,
    panels: Panels,
    options: ViewOptions,
    recent_signals: usize,
    last_seq: Option<u64>,
    cash_flow: CashFlowSources,
}

impl<S: Surface> DashboardSession<S> {
    pub fn new(config: &Config, surface: S) -> Self {
        Self {
            surface,
            panels: Panels::new(config),
            options: ViewOptions {
                cash_interval: config.cash_interval,
            },
            recent_signals: config.recent_signals,
            last_seq: None,
            cash_flow: CashFlowSources::default(),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn options(&self) -> ViewOptions {
        self.options
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    pub fn apply(&mut self, snapshot: &Snapshot, now: Instant) -> Result<SessionReport, SessionError> {
        let seq = snapshot.seq;
        if let Some(last) = self.last_seq.filter(|last| seq <= *last) {
            record_stale_snapshot();
            warn!(seq, last, "dropping stale snapshot");
            return Err(SessionError::Stale { seq, last });
        }
        let summary = &snapshot.summary;
        if !summary.is_ok() {
            let reason = summary.error().unwrap_or("unspecified error").to_string();
            warn!(seq, %reason, "summary reported failure, keeping current view");
            return Err(SessionError::Rejected { seq, reason });
        }
        self.last_seq = Some(seq);

        let mut report = SessionReport {
            seq,
            panels: Vec::new(),
        };
        let surface = &mut self.surface;
        let panels = &mut self.panels;

        let feed: Vec<InstrumentCard<'_>> = summary.feed_candles().map(InstrumentCard).collect();
        let applied = panels.feed.apply(&feed, surface, now);
        report.push(&panels.feed, applied);

        for (engine, row) in [
            (&mut panels.nifty, &summary.nifty_data),
            (&mut panels.future, &summary.future_data),
        ] {
            if let Some(tile) = row.as_ref().map(IndexTile).filter(IndexTile::is_drawable) {
                let applied = engine.apply(&[tile], surface, now);
                report.push(engine, applied);
            }
        }

        let itm = summary.itm_options.as_ref();
        for (engine, leg, row) in [
            (&mut panels.itm_ce, "ITM CE", itm.and_then(|o| o.itm_ce.as_ref())),
            (&mut panels.itm_pe, "ITM PE", itm.and_then(|o| o.itm_pe.as_ref())),
        ] {
            if let Some(candle) = row {
                let applied = engine.apply(&[ItmLegCard { leg, candle }], surface, now);
                report.push(engine, applied);
            }
        }

        if let Some(trend) = summary.latest_trend.as_ref().filter(|t| t.trend_value.is_some()) {
            let applied = panels.trend.apply(&[TrendCard(trend)], surface, now);
            report.push(&panels.trend, applied);
        }

        let latest: Vec<LatestSignalCard<'_>> = summary
            .latest_trend
            .iter()
            .map(LatestSignalCard)
            .filter(LatestSignalCard::is_drawable)
            .collect();
        let applied = panels.latest_signal.apply(&latest, surface, now);
        report.push(&panels.latest_signal, applied);

        let positions: Vec<PositionCard<'_>> = summary
            .active_signals
            .iter()
            .filter(|s| s.is_active())
            .map(PositionCard)
            .collect();
        let applied = panels.positions.apply(&positions, surface, now);
        report.push(&panels.positions, applied);

        let recent: Vec<RecentSignalCard<'_>> = summary
            .active_signals
            .iter()
            .take(self.recent_signals)
            .map(RecentSignalCard)
            .collect();
        let applied = panels.recent_signals.apply(&recent, surface, now);
        report.push(&panels.recent_signals, applied);

        if let Some(signals) = &snapshot.buy_signals {
            let listed: Vec<BuySignalCard<'_>> = signals
                .iter()
                .take(self.recent_signals)
                .map(BuySignalCard)
                .collect();
            let applied = panels.buy_signals.apply(&listed, surface, now);
            report.push(&panels.buy_signals, applied);
        }

        if snapshot.cash_flow.is_some() || summary.cash_flow.is_some() {
            self.cash_flow = CashFlowSources {
                endpoint: snapshot.cash_flow.clone(),
                summary: summary.cash_flow.clone(),
            };
        }
        if let Some(applied) = self.apply_cash_flow(now) {
            report.push(&self.panels.cash_flow, applied);
        }

        debug!(
            seq,
            panels = report.panels.len(),
            highlighted = report.highlighted(),
            "applied snapshot"
        );
        Ok(report)
    }

    /// Switches the cash-flow interval and redraws that panel from the last
    /// figures received, without waiting for the next poll.
    pub fn select_cash_interval(&mut self, interval: CashInterval, now: Instant) -> Option<ApplyReport> {
        if self.options.cash_interval == interval {
            return None;
        }
        info!(from = %self.options.cash_interval, to = %interval, "cash-flow interval changed");
        self.options.cash_interval = interval;
        let applied = self.apply_cash_flow(now)?;
        record(&self.panels.cash_flow, &applied);
        Some(applied)
    }

    fn apply_cash_flow(&mut self, now: Instant) -> Option<ApplyReport> {
        let interval = self.options.cash_interval;
        let flow = self.cash_flow.pick(interval)?;
        Some(
            self.panels
                .cash_flow
                .apply(&[CashFlowCard { flow, interval }], &mut self.surface, now),
        )
    }

    /// Clears every highlight whose window has elapsed.
    pub fn expire_highlights(&mut self, now: Instant) -> usize {
        let surface = &mut self.surface;
        self.panels
            .all_mut()
            .into_iter()
            .map(|engine| engine.expire_highlights(now, surface))
            .sum()
    }

    /// Time until the earliest pending highlight expires.
    pub fn next_expiry(&self, now: Instant) -> Option<Duration> {
        self.panels
            .all()
            .into_iter()
            .filter_map(|engine| engine.highlights().next_deadline())
            .min()
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

impl SessionReport {
    fn push(&mut self, engine: &ReconciliationEngine, applied: ApplyReport) {
        record(engine, &applied);
        self.panels.push((engine.panel(), applied));
    }
}

fn record(engine: &ReconciliationEngine, applied: &ApplyReport) {
    let panel = engine.panel().0;
    record_reconcile(panel, "created", applied.created.len());
    record_reconcile(panel, "patched", applied.changes.len());
    record_reconcile(panel, "removed", applied.removed.len());
    record_reconcile(panel, "evicted", applied.evicted.len());
    record_highlights(panel, applied.highlighted);
}
