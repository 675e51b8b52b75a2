use error_stack::Report;
use serde::Serialize;

use crate::error::IndicatorError;
use crate::indicator::atr::Atr;
use crate::indicator::{Indicator, ensure_len};
use crate::model::Candle;

const LOW_RATIO: f64 = 0.7;
const MEDIUM_RATIO: f64 = 1.2;
const HIGH_RATIO: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityClass {
    /// Compressed range, often ahead of an impulse.
    Low,
    Medium,
    High,
    /// Chaotic; entries are risky.
    Extreme,
}

impl VolatilityClass {
    fn from_ratio(ratio: f64) -> Self {
        if ratio < LOW_RATIO {
            Self::Low
        } else if ratio < MEDIUM_RATIO {
            Self::Medium
        } else if ratio < HIGH_RATIO {
            Self::High
        } else {
            Self::Extreme
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolatilityState {
    pub class: VolatilityClass,
    /// Latest ATR over the mean of every defined ATR value.
    pub ratio: f64,
}

/// Bucket the latest ATR against its own mean across the series.
///
/// A series without any range (mean ATR of zero) is classified `Low` with a
/// ratio of 0.
pub fn classify(candles: &[Candle], period: usize) -> Result<VolatilityState, Report<IndicatorError>> {
    let atr = Atr::new(period)?;
    ensure_len(candles.len(), atr.required_candles())?;
    let values: Vec<f64> = atr.calculate(candles)?.into_iter().flatten().collect();

    let latest = values.last().copied().unwrap_or(0.0);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean <= 0.0 || !mean.is_finite() {
        return Ok(VolatilityState {
            class: VolatilityClass::Low,
            ratio: 0.0,
        });
    }

    let ratio = latest / mean;
    Ok(VolatilityState {
        class: VolatilityClass::from_ratio(ratio),
        ratio,
    })
}

/// Range expansion: latest ATR jumped more than `factor` over the previous bar's.
pub fn expansion(
    candles: &[Candle],
    period: usize,
    factor: f64,
) -> Result<bool, Report<IndicatorError>> {
    let atr = Atr::new(period)?;
    ensure_len(candles.len(), period + 1)?;
    let values = atr.calculate(candles)?;
    let n = values.len();
    match (values[n - 2], values[n - 1]) {
        (Some(prev), Some(last)) => Ok(last > prev * factor),
        _ => Ok(false),
    }
}

/// Stop distance that clears ordinary noise: latest ATR times `multiplier`.
pub fn safe_stop_distance(
    candles: &[Candle],
    period: usize,
    multiplier: f64,
) -> Result<f64, Report<IndicatorError>> {
    Ok(Atr::new(period)?.latest(candles)? * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranged(ranges: &[f64]) -> Vec<Candle> {
        ranges
            .iter()
            .enumerate()
            .map(|(i, &r)| Candle {
                timestamp: i as i64 * 60,
                open: 100.0,
                high: 100.0 + r / 2.0,
                low: 100.0 - r / 2.0,
                close: 100.0,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn steady_range_is_medium() {
        let state = classify(&ranged(&[2.0; 30]), 5).unwrap();
        assert_eq!(state.class, VolatilityClass::Medium);
        assert!((state.ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn range_blowout_is_extreme() {
        let mut ranges = vec![1.0; 40];
        ranges.extend([20.0; 3]);
        let state = classify(&ranged(&ranges), 3).unwrap();
        assert_eq!(state.class, VolatilityClass::Extreme);
    }

    #[test]
    fn squeeze_is_low() {
        let mut ranges = vec![4.0; 30];
        ranges.extend([0.5; 5]);
        let state = classify(&ranged(&ranges), 5).unwrap();
        assert_eq!(state.class, VolatilityClass::Low);
    }

    #[test]
    fn flat_market_is_low_not_nan() {
        let state = classify(&ranged(&[0.0; 25]), 20).unwrap();
        assert_eq!(state.class, VolatilityClass::Low);
        assert_eq!(state.ratio, 0.0);
    }

    #[test]
    fn insufficient_data() {
        assert!(classify(&ranged(&[1.0; 19]), 20).is_err());
    }

    #[test]
    fn expansion_detects_jump() {
        let mut ranges = vec![1.0; 10];
        ranges.push(10.0);
        assert!(expansion(&ranged(&ranges), 3, 1.2).unwrap());
        assert!(!expansion(&ranged(&[1.0; 10]), 3, 1.2).unwrap());
    }

    #[test]
    fn stop_distance_scales_atr() {
        let d = safe_stop_distance(&ranged(&[2.0; 20]), 14, 1.5).unwrap();
        assert!((d - 3.0).abs() < 1e-9);
    }
}
