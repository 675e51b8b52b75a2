use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, Series, close_prices, ensure_len};
use crate::model::Candle;

/// RSI (Relative Strength Index) using Wilder's smoothing method.
///
/// The first value sits at index `period - 1` and averages the price changes
/// inside the first `period` closes. Later values use Wilder smoothing with
/// factor `1 / period`.
pub struct Rsi {
    period: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period < 2 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be >= 2".into(),
            });
        }
        Ok(Self { period })
    }

    pub fn calculate_prices(&self, prices: &[f64]) -> Result<Series, Report<IndicatorError>> {
        ensure_len(prices.len(), self.required_candles())?;

        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
        let seed = &deltas[..self.period - 1];
        let seed_len = seed.len() as f64;

        let mut avg_gain: f64 = seed.iter().map(|&d| d.max(0.0)).sum::<f64>() / seed_len;
        let mut avg_loss: f64 = seed.iter().map(|&d| (-d).max(0.0)).sum::<f64>() / seed_len;

        let mut results = vec![None; prices.len()];
        results[self.period - 1] = Some(rsi_value(avg_gain, avg_loss));

        let n = self.period as f64;
        for (offset, &delta) in deltas[self.period - 1..].iter().enumerate() {
            let gain = delta.max(0.0);
            let loss = (-delta).max(0.0);
            avg_gain = (avg_gain * (n - 1.0) + gain) / n;
            avg_loss = (avg_loss * (n - 1.0) + loss) / n;
            results[self.period + offset] = Some(rsi_value(avg_gain, avg_loss));
        }

        Ok(results)
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        "rsi"
    }

    fn required_candles(&self) -> usize {
        self.period
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        self.calculate_prices(&close_prices(candles))
    }
}

/// No losses in the window reads as 100, including a perfectly flat window.
fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
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

    #[test]
    fn rsi_insufficient_data() {
        let rsi = Rsi::new(14).unwrap();
        assert!(rsi.calculate(&candles_from_closes(&[1.0; 10])).is_err());
    }

    #[test]
    fn rsi_warmup_boundary() {
        let rsi = Rsi::new(14).unwrap();
        let closes: Vec<f64> = (0..14).map(|i| 100.0 + (i % 3) as f64).collect();
        assert!(rsi.calculate(&candles_from_closes(&closes[..13])).is_err());
        let values = rsi.calculate(&candles_from_closes(&closes)).unwrap();
        assert!(values[12].is_none());
        assert!(values[13].is_some());
    }

    #[test]
    fn rsi_period_too_small_invalid() {
        assert!(Rsi::new(0).is_err());
        assert!(Rsi::new(1).is_err());
    }

    #[test]
    fn rsi_all_gains_returns_100() {
        let rsi = Rsi::new(3).unwrap();
        let values = rsi
            .calculate(&candles_from_closes(&[1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        assert_eq!(values[2], Some(100.0));
        assert_eq!(values[3], Some(100.0));
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let rsi = Rsi::new(3).unwrap();
        let values = rsi
            .calculate(&candles_from_closes(&[4.0, 3.0, 2.0, 1.0]))
            .unwrap();
        assert!((values[3].unwrap() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_known_value() {
        // deltas +1, -1 seed: avg_gain = avg_loss = 0.5 -> RSI 50
        let rsi = Rsi::new(3).unwrap();
        let values = rsi
            .calculate(&candles_from_closes(&[10.0, 11.0, 10.0]))
            .unwrap();
        assert!((values[2].unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_output_length() {
        let rsi = Rsi::new(14).unwrap();
        let values = rsi.calculate(&candles_from_closes(&[100.0_f64; 20])).unwrap();
        assert_eq!(values.len(), 20);
        assert_eq!(values.iter().filter(|v| v.is_some()).count(), 20 - 13);
    }

    #[test]
    fn rsi_stays_within_bounds() {
        let rsi = Rsi::new(14).unwrap();
        let closes: Vec<f64> = (0..200)
            .map(|i| 100.0 + ((i * 37) % 23) as f64 - ((i * 11) % 7) as f64 * 1.5)
            .collect();
        let values = rsi.calculate(&candles_from_closes(&closes)).unwrap();
        for v in values.into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v), "rsi out of range: {v}");
        }
    }

    #[test]
    fn rsi_is_deterministic() {
        let rsi = Rsi::new(5).unwrap();
        let candles = candles_from_closes(&[5.0, 6.0, 5.5, 7.0, 6.5, 8.0, 7.5]);
        assert_eq!(
            rsi.calculate(&candles).unwrap(),
            rsi.calculate(&candles).unwrap()
        );
    }
}
