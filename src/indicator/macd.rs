use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::ema_values;
use crate::indicator::{Indicator, Series, close_prices, ensure_len, finite};
use crate::model::Candle;

/// One MACD reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        if fast_period == 0 || slow_period == 0 || signal_period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "all periods must be > 0".into(),
            });
        }
        if fast_period >= slow_period {
            bail!(IndicatorError::InvalidParameter {
                name: "fast_period must be < slow_period".into(),
            });
        }
        Ok(Self {
            fast_period,
            slow_period,
            signal_period,
        })
    }

    /// Full MACD readings, aligned with `candles`.
    ///
    /// The MACD line is defined from index `slow - 1`; signal and histogram
    /// from `slow + signal - 2`. Both EMAs recurse from the first close.
    pub fn calculate_full(
        &self,
        candles: &[Candle],
    ) -> Result<Vec<Option<MacdPoint>>, Report<IndicatorError>> {
        let prices = close_prices(candles);
        ensure_len(prices.len(), self.required_candles())?;

        let fast = ema_values(&prices, self.fast_period);
        let slow = ema_values(&prices, self.slow_period);
        let macd_line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal_line = ema_values(&macd_line, self.signal_period);

        let warmup = self.required_candles() - 1;
        Ok(macd_line
            .iter()
            .zip(&signal_line)
            .enumerate()
            .map(|(i, (&macd, &signal))| {
                if i < warmup {
                    return None;
                }
                Some(MacdPoint {
                    macd: finite(macd)?,
                    signal: finite(signal)?,
                    histogram: finite(macd - signal)?,
                })
            })
            .collect())
    }

    /// Histogram values only.
    pub fn histogram(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        Ok(self
            .calculate_full(candles)?
            .into_iter()
            .map(|p| p.map(|p| p.histogram))
            .collect())
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        "macd"
    }

    fn required_candles(&self) -> usize {
        self.slow_period + self.signal_period - 1
    }

    /// Returns MACD line values only.
    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        Ok(self
            .calculate_full(candles)?
            .into_iter()
            .map(|p| p.map(|p| p.macd))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::ma::Ema;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                timestamp: i as i64 * 60,
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn macd_invalid_fast_ge_slow() {
        assert!(Macd::new(26, 12, 9).is_err());
    }

    #[test]
    fn macd_period_zero_invalid() {
        assert!(Macd::new(0, 26, 9).is_err());
    }

    #[test]
    fn macd_insufficient_data() {
        let macd = Macd::new(12, 26, 9).unwrap();
        assert!(macd.calculate(&candles_from_closes(&[1.0; 30])).is_err());
        assert!(macd.calculate(&candles_from_closes(&[1.0; 34])).is_ok());
    }

    #[test]
    fn macd_flat_prices_returns_zero() {
        let macd = Macd::new(3, 5, 3).unwrap();
        let values = macd.calculate(&candles_from_closes(&[10.0_f64; 10])).unwrap();
        for v in values.into_iter().flatten() {
            assert!(v.abs() < 1e-9, "expected 0 for flat prices, got {v}");
        }
    }

    #[test]
    fn macd_warmup_alignment() {
        let macd = Macd::new(3, 5, 3).unwrap();
        let closes: Vec<f64> = (1..=12).map(|i| i as f64).collect();
        let points = macd.calculate_full(&candles_from_closes(&closes)).unwrap();
        assert_eq!(points.len(), 12);
        assert!(points[5].is_none());
        assert!(points[6].is_some());
    }

    #[test]
    fn macd_sign_follows_ema_spread() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.1)
            .collect();
        let candles = candles_from_closes(&closes);
        let fast = Ema::new(12).unwrap().calculate(&candles).unwrap();
        let slow = Ema::new(26).unwrap().calculate(&candles).unwrap();
        let macd = Macd::new(12, 26, 9).unwrap().calculate(&candles).unwrap();

        for i in 0..closes.len() {
            if let (Some(f), Some(s), Some(m)) = (fast[i], slow[i], macd[i]) {
                if f > s {
                    assert!(m > 0.0, "index {i}: fast {f} > slow {s} but macd {m}");
                }
            }
        }
    }

    #[test]
    fn macd_histogram_positive_in_steady_uptrend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.5).collect();
        let hist = Macd::new(12, 26, 9)
            .unwrap()
            .histogram(&candles_from_closes(&closes))
            .unwrap();
        for h in hist.into_iter().flatten() {
            assert!(h > 0.0);
        }
    }
}
