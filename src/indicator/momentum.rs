use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::{Indicator, Series, close_prices, ensure_len, ensure_period, finite};
use crate::model::Candle;

/// Momentum: `close[i] - close[i - period]`.
pub struct Momentum {
    period: usize,
}

impl Momentum {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        ensure_period(period, "period")?;
        Ok(Self { period })
    }
}

impl Indicator for Momentum {
    fn name(&self) -> &str {
        "momentum"
    }

    fn required_candles(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        ensure_len(candles.len(), self.required_candles())?;
        let closes = close_prices(candles);
        Ok((0..closes.len())
            .map(|i| {
                i.checked_sub(self.period)
                    .map(|prev| closes[i] - closes[prev])
            })
            .collect())
    }
}

/// Rate of change in percent: `(close[i] / close[i - period] - 1) * 100`.
pub struct Roc {
    period: usize,
}

impl Roc {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        ensure_period(period, "period")?;
        Ok(Self { period })
    }
}

impl Indicator for Roc {
    fn name(&self) -> &str {
        "roc"
    }

    fn required_candles(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        ensure_len(candles.len(), self.required_candles())?;
        let closes = close_prices(candles);
        Ok((0..closes.len())
            .map(|i| {
                let prev = closes[i.checked_sub(self.period)?];
                if prev == 0.0 {
                    return None;
                }
                finite((closes[i] / prev - 1.0) * 100.0)
            })
            .collect())
    }
}
