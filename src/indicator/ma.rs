use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::{Indicator, Series, close_prices, ensure_len, ensure_period};
use crate::model::Candle;

/// Trailing mean over `[i - period + 1, i]`; the first `period - 1` slots are `None`.
pub(crate) fn rolling_mean(values: &[f64], period: usize) -> Series {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = Some(sum / period as f64);
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = Some(sum / period as f64);
    }
    out
}

/// Exponential smoothing with factor `2 / (period + 1)`, seeded from the first sample.
pub(crate) fn ema_values(values: &[f64], period: usize) -> Vec<f64> {
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            Some(p) => v * k + p * (1.0 - k),
            None => v,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Hide the first `warmup` entries of a fully computed series.
pub(crate) fn mask_warmup(values: Vec<f64>, warmup: usize) -> Series {
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| (i >= warmup).then_some(v))
        .collect()
}

/// Simple Moving Average.
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        ensure_period(period, "period")?;
        Ok(Self { period })
    }

    /// Calculate SMA values from a price slice.
    pub fn calculate_prices(&self, prices: &[f64]) -> Result<Series, Report<IndicatorError>> {
        ensure_len(prices.len(), self.period)?;
        Ok(rolling_mean(prices, self.period))
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        "sma"
    }

    fn required_candles(&self) -> usize {
        self.period
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        self.calculate_prices(&close_prices(candles))
    }
}

/// Exponential Moving Average.
///
/// The recursion starts at the first sample; values before index `period - 1`
/// are reported as warmup.
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        ensure_period(period, "period")?;
        Ok(Self { period })
    }

    /// Calculate EMA values from a price slice.
    pub fn calculate_prices(&self, prices: &[f64]) -> Result<Series, Report<IndicatorError>> {
        ensure_len(prices.len(), self.period)?;
        Ok(mask_warmup(ema_values(prices, self.period), self.period - 1))
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        "ema"
    }

    fn required_candles(&self) -> usize {
        self.period
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        self.calculate_prices(&close_prices(candles))
    }
}
