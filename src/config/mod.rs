use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::market_data::types::CashInterval;

/// Process-wide settings, built once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub base_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub feed_capacity: usize,
    pub recent_signals: usize,
    pub highlight_duration: Duration,
    pub scroll_tolerance_px: f64,
    pub cash_interval: CashInterval,
    pub metrics_port: Option<u16>,
    pub print_frames: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            base_url: "http://127.0.0.1:5000".to_string(),
            poll_interval: Duration::from_millis(3_000),
            request_timeout: Duration::from_millis(2_500),
            feed_capacity: 20,
            recent_signals: 5,
            highlight_duration: Duration::from_millis(1_000),
            scroll_tolerance_px: 10.0,
            cash_interval: CashInterval::OneMin,
            metrics_port: None,
            print_frames: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // dotenvy loads .env, but doesn't override already-set env vars
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from an arbitrary variable source. Unset variables keep
    /// their defaults; set but unparsable ones are rejected.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(level) = lookup("RUST_LOG") {
            config.log_level = level;
        }
        if let Some(url) = lookup("TICKBOARD_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TICKBOARD_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(positive("TICKBOARD_POLL_INTERVAL_MS", ms)?);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TICKBOARD_REQUEST_TIMEOUT_MS")? {
            config.request_timeout =
                Duration::from_millis(positive("TICKBOARD_REQUEST_TIMEOUT_MS", ms)?);
        }
        if let Some(n) = parse_var::<usize>(&lookup, "TICKBOARD_FEED_CAPACITY")? {
            config.feed_capacity = positive("TICKBOARD_FEED_CAPACITY", n as u64)? as usize;
        }
        if let Some(n) = parse_var::<usize>(&lookup, "TICKBOARD_RECENT_SIGNALS")? {
            config.recent_signals = n;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "TICKBOARD_HIGHLIGHT_MS")? {
            config.highlight_duration = Duration::from_millis(ms);
        }
        if let Some(px) = parse_var::<f64>(&lookup, "TICKBOARD_SCROLL_TOLERANCE_PX")? {
            if !px.is_finite() || px < 0.0 {
                return Err(invalid("TICKBOARD_SCROLL_TOLERANCE_PX", px.to_string(), "must be >= 0"));
            }
            config.scroll_tolerance_px = px;
        }
        if let Some(interval) = parse_var::<CashInterval>(&lookup, "TICKBOARD_CASH_INTERVAL")? {
            config.cash_interval = interval;
        }
        config.metrics_port = parse_var::<u16>(&lookup, "TICKBOARD_METRICS_PORT")?;
        if let Some(print) = parse_var::<bool>(&lookup, "TICKBOARD_PRINT_FRAMES")? {
            config.print_frames = print;
        }

        Ok(config)
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| invalid(var, raw.clone(), err.to_string())),
    }
}

fn positive(var: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(invalid(var, value.to_string(), "must be > 0"));
    }
    Ok(value)
}

fn invalid(var: &'static str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        value,
        reason: reason.into(),
    }
}
