use error_stack::{Report, bail};
use serde::Serialize;

use crate::error::IndicatorError;
use crate::indicator::ma::Ema;
use crate::indicator::{close_prices, ensure_len};
use crate::model::Candle;

/// Spread between the averages, relative to price, below which the market is flat.
pub const DEFAULT_FLATNESS: f64 = 0.01;
const SLOPE_LOOKBACK: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketPhase {
    Uptrend,
    Downtrend,
    /// Flat after a decline.
    Accumulation,
    /// Flat after an advance.
    Distribution,
}

impl MarketPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uptrend => "uptrend",
            Self::Downtrend => "downtrend",
            Self::Accumulation => "accumulation",
            Self::Distribution => "distribution",
        }
    }
}

/// EMA-fast vs EMA-slow phase detection with a flatness band.
pub struct PhaseClassifier {
    fast: usize,
    slow: usize,
    flatness: f64,
}

impl PhaseClassifier {
    pub fn new(fast: usize, slow: usize, flatness: f64) -> Result<Self, Report<IndicatorError>> {
        if fast == 0 || fast >= slow {
            bail!(IndicatorError::InvalidParameter {
                name: "phase periods must satisfy 0 < fast < slow".into(),
            });
        }
        if flatness < 0.0 || !flatness.is_finite() {
            bail!(IndicatorError::InvalidParameter {
                name: "flatness must be >= 0".into(),
            });
        }
        Ok(Self {
            fast,
            slow,
            flatness,
        })
    }

    pub fn required_candles(&self) -> usize {
        self.slow
    }

    pub fn classify(&self, candles: &[Candle]) -> Result<MarketPhase, Report<IndicatorError>> {
        ensure_len(candles.len(), self.required_candles())?;
        let closes = close_prices(candles);
        let fast = Ema::new(self.fast)?.calculate_prices(&closes)?;
        let slow = Ema::new(self.slow)?.calculate_prices(&closes)?;

        let last = closes.len() - 1;
        let (Some(f), Some(s)) = (fast[last], slow[last]) else {
            bail!(IndicatorError::InsufficientData {
                required: self.required_candles(),
                available: candles.len(),
            });
        };

        if (f - s).abs() / closes[last] >= self.flatness {
            return Ok(if f > s {
                MarketPhase::Uptrend
            } else {
                MarketPhase::Downtrend
            });
        }

        // Flat: the slow average's recent slope tells where the range came from.
        let earlier = slow[last.saturating_sub(SLOPE_LOOKBACK)..]
            .iter()
            .flatten()
            .next()
            .copied()
            .unwrap_or(s);
        Ok(if s < earlier {
            MarketPhase::Accumulation
        } else {
            MarketPhase::Distribution
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn classifier() -> PhaseClassifier {
        PhaseClassifier::new(20, 50, DEFAULT_FLATNESS).unwrap()
    }

    #[test]
    fn invalid_periods() {
        assert!(PhaseClassifier::new(50, 20, 0.01).is_err());
        assert!(PhaseClassifier::new(0, 20, 0.01).is_err());
        assert!(PhaseClassifier::new(5, 20, -1.0).is_err());
    }

    #[test]
    fn rising_prices_are_uptrend() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        assert_eq!(
            classifier().classify(&candles_from_closes(&closes)).unwrap(),
            MarketPhase::Uptrend
        );
    }

    #[test]
    fn falling_prices_are_downtrend() {
        let closes: Vec<f64> = (0..80).map(|i| 200.0 - i as f64).collect();
        assert_eq!(
            classifier().classify(&candles_from_closes(&closes)).unwrap(),
            MarketPhase::Downtrend
        );
    }

    #[test]
    fn flat_after_decline_is_accumulation() {
        let mut closes: Vec<f64> = (0..40).map(|i| 140.0 - i as f64).collect();
        closes.extend(std::iter::repeat_n(100.0, 200));
        assert_eq!(
            classifier().classify(&candles_from_closes(&closes)).unwrap(),
            MarketPhase::Accumulation
        );
    }

    #[test]
    fn flat_after_advance_is_distribution() {
        let mut closes: Vec<f64> = (0..40).map(|i| 60.0 + i as f64).collect();
        closes.extend(std::iter::repeat_n(100.0, 200));
        assert_eq!(
            classifier().classify(&candles_from_closes(&closes)).unwrap(),
            MarketPhase::Distribution
        );
    }

    #[test]
    fn unchanged_flat_range_is_distribution() {
        assert_eq!(
            classifier().classify(&candles_from_closes(&[100.0; 80])).unwrap(),
            MarketPhase::Distribution
        );
    }

    #[test]
    fn insufficient_data() {
        assert!(classifier().classify(&candles_from_closes(&[1.0; 49])).is_err());
    }
}
