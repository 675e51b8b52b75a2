use error_stack::{Report, bail};

use crate::error::SeriesError;
use crate::model::Candle;

/// Validated OHLCV bars in strictly increasing timestamp order.
///
/// Only [`validate`] builds one, so every bar satisfies
/// `low <= open, close <= high` with positive prices.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }
}

impl AsRef<[Candle]> for CandleSeries {
    fn as_ref(&self) -> &[Candle] {
        &self.candles
    }
}

/// Whether a raw bar is usable: positive finite prices, non-negative volume
/// and open/close inside the high/low range.
pub fn is_well_formed(c: &Candle) -> bool {
    let prices = [c.open, c.high, c.low, c.close];
    if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
        return false;
    }
    if !c.volume.is_finite() || c.volume < 0.0 {
        return false;
    }
    c.high >= c.low
        && (c.low..=c.high).contains(&c.open)
        && (c.low..=c.high).contains(&c.close)
}

/// Turn raw bars into a [`CandleSeries`].
///
/// Malformed bars are dropped and counted, the rest are sorted by timestamp and
/// duplicate timestamps keep the last occurrence. Fails when fewer than
/// `min_len` bars survive.
pub fn validate(
    raw: impl IntoIterator<Item = Candle>,
    min_len: usize,
) -> Result<CandleSeries, Report<SeriesError>> {
    let mut dropped = 0usize;
    let mut kept: Vec<Candle> = raw
        .into_iter()
        .filter(|c| {
            let ok = is_well_formed(c);
            if !ok {
                dropped += 1;
            }
            ok
        })
        .collect();

    // Stable sort preserves arrival order among equal timestamps.
    kept.sort_by_key(|c| c.timestamp);

    let mut candles: Vec<Candle> = Vec::with_capacity(kept.len());
    for candle in kept {
        match candles.last_mut() {
            Some(prev) if prev.timestamp == candle.timestamp => *prev = candle,
            _ => candles.push(candle),
        }
    }

    if dropped > 0 {
        tracing::debug!(dropped, kept = candles.len(), "dropped malformed candles");
    }

    if candles.len() < min_len {
        bail!(SeriesError::InsufficientData {
            required: min_len,
            available: candles.len(),
        });
    }

    Ok(CandleSeries { candles })
}
