use error_stack::Report;
use serde::Serialize;

use crate::error::IndicatorError;
use crate::indicator::{ensure_len, ensure_period};
use crate::model::Candle;

/// Fraction of the bar's range a wick must exceed to count as long.
pub const LONG_WICK_RATIO: f64 = 0.5;
/// Accepted breakout candle move, in percent of the open.
pub const BREAKOUT_MOVE_PCT: (f64, f64) = (1.2, 3.0);
pub const BREAKOUT_VOLUME_MULT: f64 = 1.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Wick {
    /// Sellers rejected the high.
    Upper,
    /// Buyers rejected the low.
    Lower,
    None,
}

pub fn body_size(candle: &Candle) -> f64 {
    (candle.close - candle.open).abs()
}

pub fn upper_wick(candle: &Candle) -> f64 {
    candle.high - candle.open.max(candle.close)
}

pub fn lower_wick(candle: &Candle) -> f64 {
    candle.open.min(candle.close) - candle.low
}

/// Long wick on either side. A bar with no range has no wick.
pub fn long_wick(candle: &Candle) -> Wick {
    let range = candle.high - candle.low;
    if range <= 0.0 {
        return Wick::None;
    }
    let upper = upper_wick(candle) / range;
    let lower = lower_wick(candle) / range;
    if upper > LONG_WICK_RATIO && upper >= lower {
        Wick::Upper
    } else if lower > LONG_WICK_RATIO {
        Wick::Lower
    } else {
        Wick::None
    }
}

/// Last bar closes above the high of the preceding `lookback` bars with a
/// controlled move and expanded volume.
pub fn range_breakout(candles: &[Candle], lookback: usize) -> Result<bool, Report<IndicatorError>> {
    ensure_period(lookback, "lookback")?;
    ensure_len(candles.len(), lookback + 1)?;

    let (prior, last) = candles.split_at(candles.len() - 1);
    let last = &last[0];
    let prior = &prior[prior.len() - lookback..];

    let range_high = prior.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let avg_volume = prior.iter().map(|c| c.volume).sum::<f64>() / lookback as f64;
    let move_pct = (last.close - last.open) / last.open * 100.0;

    let (min_move, max_move) = BREAKOUT_MOVE_PCT;
    Ok(last.close > range_high
        && (min_move..=max_move).contains(&move_pct)
        && avg_volume > 0.0
        && last.volume >= avg_volume * BREAKOUT_VOLUME_MULT)
}
