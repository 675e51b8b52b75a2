//! SuperTrend: ATR bands around the bar midpoint that ratchet with the trend.
//!
//! The side is a two-state machine. Price sitting above the band flips below
//! only when a close breaks the previous bar's lower band; the reverse flip
//! needs a close above the previous bar's upper band. Each bar is folded over
//! the previous bar's `(upper, lower, side)`.

use error_stack::{Report, bail};
use serde::Serialize;

use crate::error::IndicatorError;
use crate::indicator::atr::Atr;
use crate::indicator::{Indicator, Series, ensure_len};
use crate::model::Candle;

/// Which side of the SuperTrend line price is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BandSide {
    /// Price above the line (bullish); the line tracks the lower band.
    Above,
    /// Price below the line (bearish); the line tracks the upper band.
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SuperTrendPoint {
    pub value: f64,
    pub upper: f64,
    pub lower: f64,
    pub side: BandSide,
}

/// Carried from bar to bar.
#[derive(Debug, Clone, Copy)]
struct BandState {
    upper: f64,
    lower: f64,
    prev_close: f64,
    side: Option<BandSide>,
}

impl BandState {
    fn seed(candle: &Candle, basic_upper: f64, basic_lower: f64) -> Self {
        Self {
            upper: basic_upper,
            lower: basic_lower,
            prev_close: candle.close,
            side: None,
        }
    }

    fn step(self, candle: &Candle, basic_upper: f64, basic_lower: f64) -> Self {
        let upper = if basic_upper < self.upper || self.prev_close > self.upper {
            basic_upper
        } else {
            self.upper
        };
        let lower = if basic_lower > self.lower || self.prev_close < self.lower {
            basic_lower
        } else {
            self.lower
        };

        let close = candle.close;
        let side = match self.side {
            None if close >= (self.upper + self.lower) / 2.0 => BandSide::Above,
            None => BandSide::Below,
            Some(BandSide::Above) if close < self.lower => BandSide::Below,
            Some(BandSide::Below) if close > self.upper => BandSide::Above,
            Some(side) => side,
        };

        Self {
            upper,
            lower,
            prev_close: close,
            side: Some(side),
        }
    }

    fn point(&self) -> Option<SuperTrendPoint> {
        let side = self.side?;
        let value = match side {
            BandSide::Above => self.lower,
            BandSide::Below => self.upper,
        };
        Some(SuperTrendPoint {
            value,
            upper: self.upper,
            lower: self.lower,
            side,
        })
    }
}

pub struct SuperTrend {
    period: usize,
    multiplier: f64,
}

impl SuperTrend {
    pub fn new(period: usize, multiplier: f64) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        if multiplier <= 0.0 || !multiplier.is_finite() {
            bail!(IndicatorError::InvalidParameter {
                name: "multiplier must be > 0".into(),
            });
        }
        Ok(Self { period, multiplier })
    }

    /// Readings aligned with `candles`. The first reading needs one bar with a
    /// defined ATR to seed the bands and one more to pick a side.
    pub fn calculate_full(
        &self,
        candles: &[Candle],
    ) -> Result<Vec<Option<SuperTrendPoint>>, Report<IndicatorError>> {
        ensure_len(candles.len(), self.required_candles())?;
        let atr = Atr::new(self.period)?.calculate(candles)?;

        let mut state: Option<BandState> = None;
        let mut out = Vec::with_capacity(candles.len());
        for (candle, atr) in candles.iter().zip(atr) {
            let Some(atr) = atr else {
                out.push(None);
                continue;
            };
            let mid = (candle.high + candle.low) / 2.0;
            let basic_upper = mid + self.multiplier * atr;
            let basic_lower = mid - self.multiplier * atr;

            let next = match state {
                None => BandState::seed(candle, basic_upper, basic_lower),
                Some(prev) => prev.step(candle, basic_upper, basic_lower),
            };
            out.push(next.point());
            state = Some(next);
        }
        Ok(out)
    }
}

impl Indicator for SuperTrend {
    fn name(&self) -> &str {
        "supertrend"
    }

    fn required_candles(&self) -> usize {
        self.period + 1
    }

    /// Returns the SuperTrend line only.
    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        Ok(self
            .calculate_full(candles)?
            .into_iter()
            .map(|p| p.map(|p| p.value))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(close: f64) -> Candle {
        Candle {
            timestamp: 0,
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1.0,
        }
    }

    fn wave(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                bar(100.0 + (t / 6.0).sin() * 12.0 + (t / 2.0).cos() * 2.0)
            })
            .collect()
    }

    #[test]
    fn invalid_parameters() {
        assert!(SuperTrend::new(0, 3.0).is_err());
        assert!(SuperTrend::new(10, 0.0).is_err());
    }

    #[test]
    fn warmup_boundary() {
        let st = SuperTrend::new(10, 3.0).unwrap();
        let candles: Vec<Candle> = (0..11).map(|i| bar(100.0 + i as f64)).collect();
        assert!(st.calculate(&candles[..10]).is_err());
        let points = st.calculate_full(&candles).unwrap();
        assert!(points[9].is_none());
        assert!(points[10].is_some());
    }

    #[test]
    fn uptrend_sits_above_line() {
        let st = SuperTrend::new(10, 3.0).unwrap();
        let candles: Vec<Candle> = (0..40).map(|i| bar(100.0 + i as f64)).collect();
        let last = st.calculate_full(&candles).unwrap().pop().flatten().unwrap();
        assert_eq!(last.side, BandSide::Above);
        assert!(last.value < candles[39].close);
    }

    #[test]
    fn downtrend_sits_below_line() {
        let st = SuperTrend::new(10, 3.0).unwrap();
        let candles: Vec<Candle> = (0..40).map(|i| bar(200.0 - i as f64)).collect();
        let last = st.calculate_full(&candles).unwrap().pop().flatten().unwrap();
        assert_eq!(last.side, BandSide::Below);
        assert!(last.value > candles[39].close);
    }

    #[test]
    fn flips_only_on_opposite_band_cross() {
        let st = SuperTrend::new(5, 1.0).unwrap();
        let candles = wave(200);
        let points = st.calculate_full(&candles).unwrap();

        let mut flips = 0;
        for i in 1..points.len() {
            let (Some(prev), Some(cur)) = (points[i - 1], points[i]) else {
                continue;
            };
            match (prev.side, cur.side) {
                (BandSide::Above, BandSide::Below) => {
                    flips += 1;
                    assert!(candles[i].close < prev.lower, "bar {i}");
                }
                (BandSide::Below, BandSide::Above) => {
                    flips += 1;
                    assert!(candles[i].close > prev.upper, "bar {i}");
                }
                (BandSide::Above, BandSide::Above) => {
                    assert!(candles[i].close >= prev.lower, "bar {i}");
                }
                (BandSide::Below, BandSide::Below) => {
                    assert!(candles[i].close <= prev.upper, "bar {i}");
                }
            }
        }
        assert!(flips > 0, "wave should produce at least one flip");
    }

    #[test]
    fn lower_band_ratchets_up_while_above() {
        let st = SuperTrend::new(5, 2.0).unwrap();
        let candles: Vec<Candle> = (0..30).map(|i| bar(100.0 + i as f64 * 2.0)).collect();
        let points: Vec<SuperTrendPoint> =
            st.calculate_full(&candles).unwrap().into_iter().flatten().collect();
        for w in points.windows(2) {
            assert!(w[1].lower >= w[0].lower);
        }
    }

    #[test]
    fn is_deterministic() {
        let st = SuperTrend::new(7, 2.5).unwrap();
        let candles = wave(80);
        assert_eq!(
            st.calculate_full(&candles).unwrap(),
            st.calculate_full(&candles).unwrap()
        );
    }
}
