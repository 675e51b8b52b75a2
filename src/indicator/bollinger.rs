use error_stack::{Report, bail};
use serde::Serialize;

use crate::error::IndicatorError;
use crate::indicator::ma::Sma;
use crate::indicator::{Indicator, Series, close_prices, ensure_len};
use crate::model::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl Bands {
    /// Where `price` sits between the bands: 0 at the lower band, 1 at the upper.
    /// `None` when the bands have collapsed.
    pub fn percent_b(&self, price: f64) -> Option<f64> {
        let width = self.upper - self.lower;
        (width > 0.0).then(|| (price - self.lower) / width)
    }
}

pub struct BollingerBands {
    period: usize,
    std_dev_multiplier: f64,
}

impl BollingerBands {
    pub fn new(period: usize, std_dev_multiplier: f64) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        if std_dev_multiplier <= 0.0 || !std_dev_multiplier.is_finite() {
            bail!(IndicatorError::InvalidParameter {
                name: "std_dev_multiplier must be > 0".into(),
            });
        }
        Ok(Self {
            period,
            std_dev_multiplier,
        })
    }

    /// Band values aligned with `candles`. Uses the population standard deviation.
    pub fn calculate_bands(
        &self,
        candles: &[Candle],
    ) -> Result<Vec<Option<Bands>>, Report<IndicatorError>> {
        let prices = close_prices(candles);
        ensure_len(prices.len(), self.period)?;

        let sma = Sma::new(self.period)?.calculate_prices(&prices)?;

        let bands = sma
            .iter()
            .enumerate()
            .map(|(i, middle)| {
                let middle = (*middle)?;
                let window = &prices[i + 1 - self.period..=i];
                let variance =
                    window.iter().map(|&p| (p - middle).powi(2)).sum::<f64>() / self.period as f64;
                let std_dev = variance.sqrt();
                Some(Bands {
                    upper: middle + self.std_dev_multiplier * std_dev,
                    middle,
                    lower: middle - self.std_dev_multiplier * std_dev,
                })
            })
            .collect();

        Ok(bands)
    }
}

impl Indicator for BollingerBands {
    fn name(&self) -> &str {
        "bollinger"
    }

    fn required_candles(&self) -> usize {
        self.period
    }

    /// Returns middle band (SMA) values only.
    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        Ok(self
            .calculate_bands(candles)?
            .into_iter()
            .map(|b| b.map(|b| b.middle))
            .collect())
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

    #[test]
    fn bollinger_period_zero_invalid() {
        assert!(BollingerBands::new(0, 2.0).is_err());
    }

    #[test]
    fn bollinger_negative_multiplier_invalid() {
        assert!(BollingerBands::new(20, -1.0).is_err());
    }

    #[test]
    fn bollinger_insufficient_data() {
        let bb = BollingerBands::new(5, 2.0).unwrap();
        assert!(bb.calculate(&candles_from_closes(&[1.0; 4])).is_err());
    }

    #[test]
    fn bollinger_flat_prices_zero_width() {
        let bb = BollingerBands::new(3, 2.0).unwrap();
        let bands = bb.calculate_bands(&candles_from_closes(&[10.0_f64; 5])).unwrap();
        for b in bands.iter().flatten() {
            assert!((b.upper - 10.0).abs() < 1e-9);
            assert!((b.middle - 10.0).abs() < 1e-9);
            assert!((b.lower - 10.0).abs() < 1e-9);
            assert_eq!(b.percent_b(10.0), None);
        }
    }

    #[test]
    fn bollinger_bands_symmetry() {
        let bb = BollingerBands::new(3, 2.0).unwrap();
        let bands = bb
            .calculate_bands(&candles_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]))
            .unwrap();
        assert!(bands[1].is_none());
        for b in bands.iter().flatten() {
            // upper - middle == middle - lower (symmetric around SMA)
            assert!((b.upper - b.middle - (b.middle - b.lower)).abs() < 1e-9);
        }
    }

    #[test]
    fn bollinger_known_width() {
        // window [1, 2, 3]: mean 2, population std sqrt(2/3)
        let bb = BollingerBands::new(3, 2.0).unwrap();
        let bands = bb.calculate_bands(&candles_from_closes(&[1.0, 2.0, 3.0])).unwrap();
        let b = bands[2].unwrap();
        let expected = 2.0 * (2.0_f64 / 3.0).sqrt();
        assert!((b.upper - b.middle - expected).abs() < 1e-9);
        assert!((b.percent_b(2.0).unwrap() - 0.5).abs() < 1e-9);
    }
}
