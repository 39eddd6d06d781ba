//! Wire rows as reconcilable entities.
//!
//! Each card borrows its row and renders it into a [`RenderedView`]; the
//! engine never sees the raw payload.

use crate::engine::entity::Entity;
use crate::market_data::types::{BuySignal, Candle, CashFlow, CashInterval, TrendSignal};
use crate::render::format::{
    DASH, Tone, Trend, clock, count, fixed, fixed_or_dash, grouped, level_or_dash, percent,
    pnl_tone, rupees, rupees_grouped, signed,
};
use crate::render::surface::{BlockKind, DisplayField, RenderedView};

fn truthy(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v != 0.0)
}

fn candle_key(candle: &Candle) -> String {
    candle
        .instrument_key
        .clone()
        .unwrap_or_else(|| candle.name().to_string())
}

fn pnl_field(pnl: f64) -> DisplayField {
    DisplayField::new("pnl", "P&L", rupees_grouped(pnl)).tone(pnl_tone(Some(pnl)))
}

/// Always-present P&L: an absent figure shows as a neutral `₹0.00`.
fn pnl_or_zero(pnl: Option<f64>) -> DisplayField {
    let pnl = pnl.filter(|v| v.is_finite()).unwrap_or(0.0);
    DisplayField::new("pnl", "P&L", rupees(Some(pnl), 2)).tone(pnl_tone(Some(pnl)))
}

/// Row of the market feed.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentCard<'a>(pub &'a Candle);

impl InstrumentCard<'_> {
    fn volume(&self) -> String {
        let c = self.0;
        match (&c.volume_formatted, c.volume) {
            (Some(text), _) => text.clone(),
            (None, Some(v)) if v.is_finite() => grouped(v.round()),
            _ => DASH.to_string(),
        }
    }

    fn price_change(&self) -> DisplayField {
        let c = self.0;
        let change = c
            .price_change_formatted
            .clone()
            .or_else(|| c.price_change.map(|v| signed(v, 2)))
            .unwrap_or_else(|| "0.00".to_string());
        let pct = c
            .price_change_pct_formatted
            .clone()
            .unwrap_or_else(|| percent(c.price_change_pct));
        let tone = match c.price_change_color.as_deref() {
            Some(hint) => Tone::from_hint(Some(hint)),
            None => Tone::of(c.price_change.unwrap_or(0.0)),
        };
        DisplayField::new("change", "Change", format!("{change} ({pct})")).tone(tone)
    }

    fn delta(&self) -> Option<DisplayField> {
        let c = self.0;
        let delta = c.delta?;
        let mut text = c
            .delta_formatted
            .clone()
            .unwrap_or_else(|| signed(delta, 2));
        if let Some(pct) = &c.delta_pct_formatted {
            text = format!("{text} ({pct})");
        }
        let tone = match c.delta_color.as_deref() {
            Some(hint) => Tone::from_hint(Some(hint)),
            None => Tone::of(delta),
        };
        Some(DisplayField::new("delta", "Delta", text).tone(tone))
    }

    fn trade_details(&self) -> Option<Vec<DisplayField>> {
        let c = self.0;
        if [c.entry_price, c.target, c.sl]
            .into_iter()
            .all(|v| truthy(v).is_none())
        {
            return None;
        }
        let mut fields = vec![
            DisplayField::new("entry", "Entry", level_or_dash(c.entry_price, 2)),
            DisplayField::new("target", "Target", level_or_dash(c.target, 2)),
            DisplayField::new("sl", "SL", level_or_dash(c.sl, 2)),
        ];
        if let Some(pnl) = c.profit_loss {
            fields.push(pnl_field(pnl));
        }
        Some(fields)
    }
}

impl Entity for InstrumentCard<'_> {
    fn key(&self) -> String {
        candle_key(self.0)
    }

    fn view(&self) -> RenderedView {
        let c = self.0;
        let mut view = RenderedView::new(c.name())
            .field(DisplayField::new("open", "Open", fixed_or_dash(c.open, 2)))
            .field(DisplayField::new("high", "High", fixed_or_dash(c.high, 2)))
            .field(DisplayField::new("low", "Low", fixed_or_dash(c.low, 2)))
            .field(DisplayField::new("close", "Close", fixed_or_dash(c.close, 2)))
            .field(DisplayField::new("volume", "Volume", self.volume()))
            .field(self.price_change());

        if let Some(delta) = self.delta() {
            view = view.field(delta);
        }
        if let Some(vwap) = truthy(c.vwap) {
            view = view.field(DisplayField::new("vwap", "VWAP", fixed(vwap, 2)));
        }
        if let Some(ticks) = truthy(c.tick_count) {
            view = view.field(DisplayField::new("ticks", "Ticks", count(Some(ticks))));
        }

        let trend = Trend::from_value(c.trend_value);
        view = view
            .field(DisplayField::new("time", "Time", clock(c.timestamp.as_deref(), true)).quiet())
            .field(
                DisplayField::new("trend", "Trend", trend.label())
                    .tone(trend.tone())
                    .quiet(),
            );

        if let Some(details) = self.trade_details() {
            view = view.block(BlockKind::TradeDetails, details);
        }
        if let Some(rec) = c.buy_recommendation.as_deref() {
            view = view.block(
                BlockKind::Recommendation,
                vec![DisplayField::new("recommendation", "Signal", rec)],
            );
        }
        view
    }
}

/// NIFTY index or future headline tile.
#[derive(Debug, Clone, Copy)]
pub struct IndexTile<'a>(pub &'a Candle);

impl IndexTile<'_> {
    /// A tile is only drawn for rows carrying a usable close.
    pub fn is_drawable(&self) -> bool {
        truthy(self.0.close).is_some()
    }
}

impl Entity for IndexTile<'_> {
    fn key(&self) -> String {
        candle_key(self.0)
    }

    fn view(&self) -> RenderedView {
        let c = self.0;
        let change = c.price_change.filter(|v| v.is_finite()).unwrap_or(0.0);
        let text = format!("{} ({})", signed(change, 2), percent(c.price_change_pct));
        RenderedView::new(c.name())
            .field(DisplayField::new("price", "Price", rupees(c.close, 2)))
            .field(DisplayField::new("change", "Change", text).tone(Tone::of(change)))
    }
}

/// Cash-flow bucket of the selected interval.
#[derive(Debug, Clone, Copy)]
pub struct CashFlowCard<'a> {
    pub flow: &'a CashFlow,
    pub interval: CashInterval,
}

impl Entity for CashFlowCard<'_> {
    // Switching interval swaps the card rather than flashing every figure.
    fn key(&self) -> String {
        format!("cash-flow:{}", self.interval)
    }

    fn view(&self) -> RenderedView {
        let amount = |v: Option<f64>| rupees(Some(v.unwrap_or(0.0)), 4);
        RenderedView::new(format!("Cash Flow ({})", self.interval))
            .field(DisplayField::new("cash", "Cash", amount(self.flow.cash)))
            .field(DisplayField::new("min_cash", "Min", amount(self.flow.min_cash)))
            .field(DisplayField::new("max_cash", "Max", amount(self.flow.max_cash)))
    }
}

/// One in-the-money option leg.
#[derive(Debug, Clone, Copy)]
pub struct ItmLegCard<'a> {
    pub leg: &'static str,
    pub candle: &'a Candle,
}

impl Entity for ItmLegCard<'_> {
    fn key(&self) -> String {
        self.candle
            .instrument_key
            .clone()
            .unwrap_or_else(|| self.leg.to_string())
    }

    fn view(&self) -> RenderedView {
        let strike = truthy(self.candle.strike());
        let price = match strike {
            Some(_) => rupees(Some(self.candle.traded_price().unwrap_or(0.0)), 2),
            None => DASH.to_string(),
        };
        RenderedView::new(self.leg)
            .field(DisplayField::new("strike", "Strike", count(strike)))
            .field(DisplayField::new("price", "Price", price))
    }
}

/// Market direction indicator.
#[derive(Debug, Clone, Copy)]
pub struct TrendCard<'a>(pub &'a TrendSignal);

impl Entity for TrendCard<'_> {
    fn key(&self) -> String {
        "trend".to_string()
    }

    fn view(&self) -> RenderedView {
        let trend = Trend::from_value(self.0.trend_value);
        RenderedView::new("Trend")
            .field(DisplayField::new("direction", "Direction", trend.label()).tone(trend.tone()))
            .field(DisplayField::new("time", "Time", clock(self.0.timestamp.as_deref(), false)).quiet())
    }
}

fn signal_key(signal: &TrendSignal) -> String {
    format!(
        "{}|{}",
        signal.timestamp.as_deref().unwrap_or(DASH),
        signal.buy_recommendation.as_deref().unwrap_or(DASH)
    )
}

/// Most recent trade recommendation.
#[derive(Debug, Clone, Copy)]
pub struct LatestSignalCard<'a>(pub &'a TrendSignal);

impl LatestSignalCard<'_> {
    /// Rows without a recommendation render as "no active signal".
    pub fn is_drawable(&self) -> bool {
        self.0.buy_recommendation.is_some()
    }
}

impl Entity for LatestSignalCard<'_> {
    fn key(&self) -> String {
        signal_key(self.0)
    }

    fn view(&self) -> RenderedView {
        let s = self.0;
        let rec = s.buy_recommendation.as_deref().unwrap_or(DASH);
        let mut view = RenderedView::new(rec)
            .field(DisplayField::new("time", "Time", clock(s.timestamp.as_deref(), false)).quiet());
        for (name, label, value) in [
            ("entry", "Entry", s.entry_price),
            ("target", "Target", s.target),
            ("sl", "SL", s.sl),
        ] {
            if let Some(level) = truthy(value) {
                view = view.field(DisplayField::new(name, label, rupees(Some(level), 2)));
            }
        }
        if let Some(pnl) = s.profit_loss.filter(|v| v.is_finite()) {
            view = view.field(pnl_field(pnl));
        }
        view
    }
}

/// Open position derived from an active trend signal.
#[derive(Debug, Clone, Copy)]
pub struct PositionCard<'a>(pub &'a TrendSignal);

impl Entity for PositionCard<'_> {
    fn key(&self) -> String {
        signal_key(self.0)
    }

    fn view(&self) -> RenderedView {
        let s = self.0;
        let level = |v: Option<f64>| match v.filter(|v| v.is_finite()) {
            Some(v) => rupees(Some(v), 2),
            None => DASH.to_string(),
        };
        RenderedView::new(s.buy_recommendation.as_deref().unwrap_or(DASH))
            .field(DisplayField::new("entry", "Entry", level(s.entry_price)))
            .field(DisplayField::new("target", "Target", level(s.target)))
            .field(DisplayField::new("sl", "SL", level(s.sl)))
            .field(pnl_or_zero(s.profit_loss))
    }
}

/// Row of the recent-signals list: one of the newest summary signals,
/// active or closed.
#[derive(Debug, Clone, Copy)]
pub struct RecentSignalCard<'a>(pub &'a TrendSignal);

impl Entity for RecentSignalCard<'_> {
    fn key(&self) -> String {
        signal_key(self.0)
    }

    fn view(&self) -> RenderedView {
        let s = self.0;
        RenderedView::new(s.buy_recommendation.as_deref().unwrap_or("N/A"))
            .field(DisplayField::new("time", "Time", clock(s.timestamp.as_deref(), true)).quiet())
            .field(pnl_or_zero(s.profit_loss))
    }
}

/// Row of the buy-signal list served by `/api/buy-signals`.
#[derive(Debug, Clone, Copy)]
pub struct BuySignalCard<'a>(pub &'a BuySignal);

impl Entity for BuySignalCard<'_> {
    fn key(&self) -> String {
        let s = self.0;
        match &s.option_key {
            Some(option) => format!("{}|{option}", s.timestamp.as_deref().unwrap_or(DASH)),
            None => format!(
                "{}|{}",
                s.timestamp.as_deref().unwrap_or(DASH),
                s.signal_type.as_deref().unwrap_or(DASH)
            ),
        }
    }

    fn view(&self) -> RenderedView {
        let s = self.0;
        let mut view = RenderedView::new(s.signal_type.as_deref().unwrap_or(DASH))
            .field(DisplayField::new("time", "Time", clock(s.timestamp.as_deref(), false)).quiet())
            .field(DisplayField::new("strike", "Strike", count(truthy(s.strike))))
            .field(DisplayField::new("status", "Status", s.status.as_deref().unwrap_or(DASH)))
            .field(DisplayField::new(
                "cash_flow",
                "Cash",
                rupees(Some(s.cash_flow.unwrap_or(0.0)), 4),
            ));
        if let Some(pnl) = truthy(s.profit_loss) {
            view = view.field(pnl_field(pnl));
        }
        view
    }
}
