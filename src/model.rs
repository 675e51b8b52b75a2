use std::fmt;

use serde::{Deserialize, Serialize};

/// Upstream candle provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Bybit,
    Binance,
}

impl SourceKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bybit" => Some(Self::Bybit),
            "binance" => Some(Self::Binance),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bybit => write!(f, "bybit"),
            Self::Binance => write!(f, "binance"),
        }
    }
}

/// Candle timeframe supported by the application.
///
/// String representations match the config file format (e.g. `"1m"`, `"1h"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    Min1,
    Min3,
    Min5,
    Min15,
    Min30,
    Hour1,
    Hour4,
    Day1,
    Week1,
}

impl TimeFrame {
    /// Parse a config-format string into a `TimeFrame`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Self::Min1),
            "3m" => Some(Self::Min3),
            "5m" => Some(Self::Min5),
            "15m" => Some(Self::Min15),
            "30m" => Some(Self::Min30),
            "1h" => Some(Self::Hour1),
            "4h" => Some(Self::Hour4),
            "1d" => Some(Self::Day1),
            "1w" => Some(Self::Week1),
            _ => None,
        }
    }

    /// Return the config-format string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Min1 => "1m",
            Self::Min3 => "3m",
            Self::Min5 => "5m",
            Self::Min15 => "15m",
            Self::Min30 => "30m",
            Self::Hour1 => "1h",
            Self::Hour4 => "4h",
            Self::Day1 => "1d",
            Self::Week1 => "1w",
        }
    }

    /// Return the Bybit v5 kline interval for this timeframe.
    pub fn bybit_interval(self) -> &'static str {
        match self {
            Self::Min1 => "1",
            Self::Min3 => "3",
            Self::Min5 => "5",
            Self::Min15 => "15",
            Self::Min30 => "30",
            Self::Hour1 => "60",
            Self::Hour4 => "240",
            Self::Day1 => "D",
            Self::Week1 => "W",
        }
    }

    /// Return the Binance kline interval string for this timeframe.
    pub fn binance_interval(self) -> &'static str {
        self.as_str()
    }

    /// Nominal bar length in seconds.
    pub fn seconds(self) -> i64 {
        match self {
            Self::Min1 => 60,
            Self::Min3 => 3 * 60,
            Self::Min5 => 5 * 60,
            Self::Min15 => 15 * 60,
            Self::Min30 => 30 * 60,
            Self::Hour1 => 60 * 60,
            Self::Hour4 => 4 * 60 * 60,
            Self::Day1 => 24 * 60 * 60,
            Self::Week1 => 7 * 24 * 60 * 60,
        }
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One OHLCV bar. `timestamp` is the bar open time in epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// `(high + low + close) / 3`
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Anything above this is treated as epoch milliseconds.
const MILLIS_CUTOFF: i64 = 100_000_000_000;

/// Normalise an exchange-native epoch timestamp to seconds.
///
/// Exchanges report either seconds or milliseconds; values beyond year 5138 in
/// seconds are unambiguously milliseconds.
pub fn normalize_timestamp(raw: i64) -> i64 {
    if raw.abs() >= MILLIS_CUTOFF {
        raw / 1000
    } else {
        raw
    }
}
