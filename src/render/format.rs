//! Display formatting: raw numbers and tags to strings plus a tone.
//!
//! Everything here is pure. Comparisons for change detection happen on the
//! strings these functions produce, so they must be deterministic for a given
//! input.

use chrono::{DateTime, NaiveDateTime};

/// Placeholder rendered for an absent or unusable numeric field.
pub const DASH: &str = "-";

const RUPEE: &str = "₹";

/// Colour classification of a displayed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tone {
    Positive,
    Negative,
    Neutral,
}

impl Tone {
    /// Sign classification. Zero is neutral, never negative.
    pub fn of(value: f64) -> Self {
        if value > 0.0 {
            Tone::Positive
        } else if value < 0.0 {
            Tone::Negative
        } else {
            Tone::Neutral
        }
    }

    /// Maps the backend's `*_color` hints (`positive`, `negative`, `green`, ...).
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint.map(|h| h.trim().to_ascii_lowercase()).as_deref() {
            Some("positive" | "up" | "green" | "profit") => Tone::Positive,
            Some("negative" | "down" | "red" | "loss") => Tone::Negative,
            _ => Tone::Neutral,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Positive => "positive",
            Tone::Negative => "negative",
            Tone::Neutral => "neutral",
        }
    }
}

/// Trend direction from the backend's `-1 / 0 / 1` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Neutral,
}

impl Trend {
    pub fn from_value(value: Option<i64>) -> Self {
        match value {
            Some(1) => Trend::Up,
            Some(-1) => Trend::Down,
            _ => Trend::Neutral,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Trend::Up => "UP",
            Trend::Down => "DOWN",
            Trend::Neutral => "NEUTRAL",
        }
    }

    pub fn tone(&self) -> Tone {
        match self {
            Trend::Up => Tone::Positive,
            Trend::Down => Tone::Negative,
            Trend::Neutral => Tone::Neutral,
        }
    }
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Fixed decimals, `-0.00` normalised to `0.00`.
pub fn fixed(value: f64, decimals: usize) -> String {
    let out = format!("{value:.decimals$}");
    match out.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => out,
    }
}

/// Fixed decimals or the dash placeholder when the value is absent.
pub fn fixed_or_dash(value: Option<f64>, decimals: usize) -> String {
    usable(value).map_or_else(|| DASH.to_string(), |v| fixed(v, decimals))
}

/// Price levels (entry, target, stop) where the backend writes `0` for
/// "not set": zero renders as the placeholder too.
pub fn level_or_dash(value: Option<f64>, decimals: usize) -> String {
    fixed_or_dash(usable(value).filter(|v| *v != 0.0), decimals)
}

/// `₹` + fixed decimals, or the placeholder.
pub fn rupees(value: Option<f64>, decimals: usize) -> String {
    usable(value).map_or_else(|| DASH.to_string(), |v| format!("{RUPEE}{}", fixed(v, decimals)))
}

/// `₹` + grouped amount with up to three fraction digits.
pub fn rupees_grouped(value: f64) -> String {
    format!("{RUPEE}{}", grouped(value))
}

/// Thousands separators, at most three fraction digits, trailing zeros trimmed.
pub fn grouped(value: f64) -> String {
    if !value.is_finite() {
        return DASH.to_string();
    }
    let rendered = fixed(value, 3);
    let (sign, unsigned) = match rendered.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rendered.as_str()),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut int_grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            int_grouped.push(',');
        }
        int_grouped.push(ch);
    }

    if frac_part.is_empty() {
        format!("{sign}{int_grouped}")
    } else {
        format!("{sign}{int_grouped}.{frac_part}")
    }
}

/// Signed change with an explicit `+` for non-negative values.
pub fn signed(value: f64, decimals: usize) -> String {
    let body = fixed(value, decimals);
    if body.starts_with('-') {
        body
    } else {
        format!("+{body}")
    }
}

/// Percentage with two decimals.
pub fn percent(value: Option<f64>) -> String {
    format!("{}%", fixed(usable(value).unwrap_or(0.0), 2))
}

/// Integer-like counters (tick counts, strikes); the placeholder when absent.
pub fn count(value: Option<f64>) -> String {
    usable(value).map_or_else(|| DASH.to_string(), |v| format!("{}", v.round() as i64))
}

/// Tone of a profit/loss figure. `None` means "no colour class at all";
/// a zero P&L is neutral.
pub fn pnl_tone(value: Option<f64>) -> Option<Tone> {
    usable(value).map(Tone::of)
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f%:z"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z")
                .ok()
                .map(|dt| dt.naive_local())
        })
}

/// Wall-clock time in the timestamp's own offset (`HH:MM:SS` or `HH:MM`).
/// Unparseable or missing timestamps render as the placeholder.
pub fn clock(raw: Option<&str>, with_seconds: bool) -> String {
    let Some(ts) = raw.and_then(parse_timestamp) else {
        return DASH.to_string();
    };
    if with_seconds {
        ts.format("%H:%M:%S").to_string()
    } else {
        ts.format("%H:%M").to_string()
    }
}

/// CSS-ish slug of a recommendation tag (`BUY_CE` → `buy-ce`).
pub fn slug(tag: &str) -> String {
    tag.to_ascii_lowercase().replace('_', "-")
}
