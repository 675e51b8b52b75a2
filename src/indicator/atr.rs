use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::ma::rolling_mean;
use crate::indicator::{Indicator, Series, ensure_len, ensure_period};
use crate::model::Candle;

/// True range per bar. The first bar has no previous close and uses `high - low`.
pub fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let range = c.high - c.low;
            match i.checked_sub(1).map(|p| candles[p].close) {
                Some(prev_close) => range
                    .max((c.high - prev_close).abs())
                    .max((c.low - prev_close).abs()),
                None => range,
            }
        })
        .collect()
}

/// Average True Range: rolling mean of true range.
pub struct Atr {
    period: usize,
}

impl Atr {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        ensure_period(period, "period")?;
        Ok(Self { period })
    }
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        "atr"
    }

    fn required_candles(&self) -> usize {
        self.period
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        ensure_len(candles.len(), self.period)?;
        Ok(rolling_mean(&true_ranges(candles), self.period))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdxPoint {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

/// Average Directional Index.
///
/// Directional movement and true range are summed over a rolling `period`
/// window (starting at the second bar), giving +DI/-DI and DX; ADX is the
/// rolling mean of DX. The first reading is at index `2 * period - 1`.
pub struct Adx {
    period: usize,
}

impl Adx {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        ensure_period(period, "period")?;
        Ok(Self { period })
    }

    pub fn calculate_full(
        &self,
        candles: &[Candle],
    ) -> Result<Vec<Option<AdxPoint>>, Report<IndicatorError>> {
        ensure_len(candles.len(), self.required_candles())?;

        let n = candles.len();
        let tr = true_ranges(candles);
        let mut plus_dm = vec![0.0; n];
        let mut minus_dm = vec![0.0; n];
        for i in 1..n {
            let up = candles[i].high - candles[i - 1].high;
            let down = candles[i - 1].low - candles[i].low;
            if up > down && up > 0.0 {
                plus_dm[i] = up;
            }
            if down > up && down > 0.0 {
                minus_dm[i] = down;
            }
        }

        let p = self.period;
        let window_sum = |values: &[f64], i: usize| values[i + 1 - p..=i].iter().sum::<f64>();

        let mut di = vec![None; n];
        let mut dx = vec![0.0; n];
        for i in p..n {
            let tr_sum = window_sum(&tr, i);
            let (plus, minus) = if tr_sum > 0.0 {
                (
                    100.0 * window_sum(&plus_dm, i) / tr_sum,
                    100.0 * window_sum(&minus_dm, i) / tr_sum,
                )
            } else {
                (0.0, 0.0)
            };
            let total = plus + minus;
            dx[i] = if total > 0.0 {
                100.0 * (plus - minus).abs() / total
            } else {
                0.0
            };
            di[i] = Some((plus, minus));
        }

        let mut out = vec![None; n];
        for i in (2 * p - 1)..n {
            let adx = dx[i + 1 - p..=i].iter().sum::<f64>() / p as f64;
            if let Some((plus_di, minus_di)) = di[i] {
                out[i] = Some(AdxPoint {
                    adx,
                    plus_di,
                    minus_di,
                });
            }
        }
        Ok(out)
    }
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        "adx"
    }

    fn required_candles(&self) -> usize {
        2 * self.period
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        Ok(self
            .calculate_full(candles)?
            .into_iter()
            .map(|p| p.map(|p| p.adx))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: 0,
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    fn trending(n: usize, step: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * step;
                candle(base + 1.0, base - 1.0, base)
            })
            .collect()
    }

    #[test]
    fn true_range_uses_previous_close_gap() {
        let candles = vec![candle(11.0, 9.0, 10.0), candle(15.0, 13.0, 14.0)];
        let tr = true_ranges(&candles);
        assert_eq!(tr[0], 2.0);
        // gap up: |15 - 10| = 5 beats high-low = 2
        assert_eq!(tr[1], 5.0);
    }

    #[test]
    fn atr_warmup_boundary() {
        let atr = Atr::new(14).unwrap();
        assert!(atr.calculate(&trending(13, 1.0)).is_err());
        let values = atr.calculate(&trending(14, 1.0)).unwrap();
        assert!(values[12].is_none());
        assert!(values[13].is_some());
    }

    #[test]
    fn atr_constant_range() {
        let candles: Vec<Candle> = (0..10).map(|_| candle(11.0, 9.0, 10.0)).collect();
        let atr = Atr::new(5).unwrap();
        assert!((atr.latest(&candles).unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn adx_invalid_period() {
        assert!(Adx::new(0).is_err());
    }

    #[test]
    fn adx_requires_two_periods() {
        let adx = Adx::new(5).unwrap();
        assert!(adx.calculate(&trending(9, 1.0)).is_err());
        let values = adx.calculate(&trending(10, 1.0)).unwrap();
        assert!(values[8].is_none());
        assert!(values[9].is_some());
    }

    #[test]
    fn adx_strong_uptrend_reads_high() {
        let adx = Adx::new(5).unwrap();
        let points = adx.calculate_full(&trending(30, 2.0)).unwrap();
        let last = points.last().copied().flatten().unwrap();
        assert!(last.plus_di > last.minus_di);
        assert!(last.adx > 90.0, "adx {}", last.adx);
        assert!(last.adx <= 100.0);
    }

    #[test]
    fn adx_flat_market_is_zero() {
        let candles: Vec<Candle> = (0..20).map(|_| candle(10.0, 10.0, 10.0)).collect();
        let adx = Adx::new(5).unwrap();
        assert_eq!(adx.latest(&candles).unwrap(), 0.0);
    }
}
