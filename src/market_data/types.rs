use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use super::serde_util::{
    lenient_bool, lenient_f64, lenient_i64, lenient_row, lenient_rows, lenient_string,
};

/// Cash-flow aggregation bucket served by `/api/cash-flow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CashInterval {
    OneMin,
    FiveMin,
}

impl CashInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashInterval::OneMin => "1min",
            CashInterval::FiveMin => "5min",
        }
    }
}

impl fmt::Display for CashInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CashInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1min" => Ok(CashInterval::OneMin),
            "5min" => Ok(CashInterval::FiveMin),
            other => Err(format!("unknown cash interval {other:?}, expected 1min or 5min")),
        }
    }
}

/// One row of `latest_candles`: an index, future or option instrument.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Candle {
    #[serde(default, deserialize_with = "lenient_string")]
    pub instrument_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub instrument_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub open: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub high: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub low: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub close: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub last_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub volume_formatted: Option<String>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub price_change: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price_change_pct: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price_change_formatted: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price_change_pct_formatted: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price_change_color: Option<String>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub delta: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub delta_formatted: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub delta_pct_formatted: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub delta_color: Option<String>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub vwap: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub tick_count: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub trend_value: Option<i64>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub entry_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub target: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sl: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub profit_loss: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub buy_recommendation: Option<String>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub strike: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub strike_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub option_type: Option<String>,
}

impl Candle {
    /// Display name, falling back through symbol to the raw key.
    pub fn name(&self) -> &str {
        self.instrument_name
            .as_deref()
            .or(self.symbol.as_deref())
            .or(self.instrument_key.as_deref())
            .unwrap_or("-")
    }

    pub fn strike(&self) -> Option<f64> {
        self.strike.or(self.strike_price)
    }

    /// Traded price for option legs: `last_price` when reported, else `close`.
    pub fn traded_price(&self) -> Option<f64> {
        self.last_price.or(self.close)
    }
}

/// First in-the-money call and put.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ItmOptions {
    #[serde(default, deserialize_with = "lenient_row")]
    pub itm_ce: Option<Candle>,
    #[serde(default, deserialize_with = "lenient_row")]
    pub itm_pe: Option<Candle>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CashFlow {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cash: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min_cash: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max_cash: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
}

/// One row of the `trend` table: direction plus an optional trade recommendation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TrendSignal {
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub trend_value: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub buy_recommendation: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub entry_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub target: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sl: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub profit_loss: Option<f64>,
}

impl TrendSignal {
    /// A signal is an open position while it carries a recommendation and
    /// has not yet booked a (non-zero) profit or loss.
    pub fn is_active(&self) -> bool {
        self.buy_recommendation.is_some() && self.profit_loss.is_none_or(|pnl| pnl == 0.0)
    }
}

/// Row of `/api/buy-signals`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuySignal {
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub signal_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub option_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub strike: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub entry_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub target: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sl: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cash_flow: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub profit_loss: Option<f64>,
}

/// Common `ok` / `error` envelope carried by every endpoint.
pub trait Envelope {
    fn is_ok(&self) -> bool;
    fn error(&self) -> Option<&str>;
}

macro_rules! impl_envelope {
    ($($ty:ty),+ $(,)?) => {
        $(impl Envelope for $ty {
            fn is_ok(&self) -> bool {
                self.ok
            }

            fn error(&self) -> Option<&str> {
                self.error.as_deref()
            }
        })+
    };
}

/// `/api/summary`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SummaryResponse {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub ok: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient_row")]
    pub cash_flow: Option<CashFlow>,
    #[serde(default, deserialize_with = "lenient_row")]
    pub nifty_data: Option<Candle>,
    #[serde(default, deserialize_with = "lenient_row")]
    pub future_data: Option<Candle>,
    #[serde(default, deserialize_with = "lenient_row")]
    pub itm_options: Option<ItmOptions>,
    #[serde(default, deserialize_with = "lenient_row")]
    pub latest_trend: Option<TrendSignal>,
    #[serde(default, deserialize_with = "lenient_rows")]
    pub active_signals: Vec<TrendSignal>,
    #[serde(default, deserialize_with = "lenient_rows")]
    pub candles: Vec<Candle>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
}

impl SummaryResponse {
    /// Instrument rows for the market feed, in arrival order: the explicit
    /// candle list first, then the index, future and ITM legs.
    pub fn feed_candles(&self) -> impl Iterator<Item = &Candle> {
        let itm = self.itm_options.as_ref();
        self.candles
            .iter()
            .chain(self.nifty_data.iter())
            .chain(self.future_data.iter())
            .chain(itm.and_then(|o| o.itm_ce.as_ref()))
            .chain(itm.and_then(|o| o.itm_pe.as_ref()))
            .filter(|candle| candle.instrument_key.is_some())
    }
}

/// `/api/cash-flow`: latest bucket per interval.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CashFlowResponse {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub ok: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub error: Option<String>,
    #[serde(rename = "1min", default, deserialize_with = "lenient_row")]
    pub one_min: Option<CashFlow>,
    #[serde(rename = "5min", default, deserialize_with = "lenient_row")]
    pub five_min: Option<CashFlow>,
}

impl CashFlowResponse {
    pub fn bucket(&self, interval: CashInterval) -> Option<&CashFlow> {
        match interval {
            CashInterval::OneMin => self.one_min.as_ref(),
            CashInterval::FiveMin => self.five_min.as_ref(),
        }
    }
}

/// `/api/buy-signals`, newest first.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuySignalsResponse {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub ok: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient_rows")]
    pub signals: Vec<BuySignal>,
}

impl_envelope!(SummaryResponse, CashFlowResponse, BuySignalsResponse);

/// Everything one poll cycle fetched. Auxiliary endpoints are optional: a
/// failure there leaves only the panels they feed untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Monotonic per process; assigned when the fetch is issued.
    pub seq: u64,
    pub summary: SummaryResponse,
    pub cash_flow: Option<CashFlowResponse>,
    pub buy_signals: Option<Vec<BuySignal>>,
}
