use error_stack::{Report, bail};
use serde::Serialize;

use crate::error::IndicatorError;
use crate::indicator::ma::rolling_mean;
use crate::indicator::{Indicator, Series, ensure_len, ensure_period, volumes};
use crate::model::Candle;

/// Volume Moving Average: simple average of trading volume over a period.
pub struct VolumeMA {
    period: usize,
}

impl VolumeMA {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        ensure_period(period, "period")?;
        Ok(Self { period })
    }

    /// `true` at each position where volume exceeds `surge_multiplier * volume_ma`.
    /// Warmup positions are `false`.
    pub fn detect_surges(&self, candles: &[Candle], surge_multiplier: f64) -> Vec<bool> {
        let vols = volumes(candles);
        rolling_mean(&vols, self.period)
            .into_iter()
            .zip(&vols)
            .map(|(ma, &v)| ma.is_some_and(|ma| v > ma * surge_multiplier))
            .collect()
    }

    /// Last volume divided by its moving average. `None` when the average is zero.
    pub fn latest_ratio(&self, candles: &[Candle]) -> Result<Option<f64>, Report<IndicatorError>> {
        let ma = self.latest(candles)?;
        let last = candles.last().map(|c| c.volume).unwrap_or(0.0);
        Ok((ma > 0.0).then(|| last / ma))
    }
}

impl Indicator for VolumeMA {
    fn name(&self) -> &str {
        "volume_ma"
    }

    fn required_candles(&self) -> usize {
        self.period
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        ensure_len(candles.len(), self.period)?;
        Ok(rolling_mean(&volumes(candles), self.period))
    }
}

/// Whether the last candle's volume is a spike against the trailing `lookback`
/// bars (the last bar included), e.g. 1.8x the 20-bar average.
pub fn volume_spike(
    candles: &[Candle],
    lookback: usize,
    multiplier: f64,
) -> Result<bool, Report<IndicatorError>> {
    let vma = VolumeMA::new(lookback)?;
    ensure_len(candles.len(), lookback)?;
    Ok(vma
        .detect_surges(candles, multiplier)
        .last()
        .copied()
        .unwrap_or(false))
}

/// On-Balance Volume: running sum starting at 0, adding volume on up closes and
/// subtracting it on down closes.
pub struct Obv;

impl Indicator for Obv {
    fn name(&self) -> &str {
        "obv"
    }

    fn required_candles(&self) -> usize {
        1
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        ensure_len(candles.len(), 1)?;
        let mut obv = 0.0;
        let mut out = Vec::with_capacity(candles.len());
        out.push(Some(obv));
        for w in candles.windows(2) {
            if w[1].close > w[0].close {
                obv += w[1].volume;
            } else if w[1].close < w[0].close {
                obv -= w[1].volume;
            }
            out.push(Some(obv));
        }
        Ok(out)
    }
}

/// Direction of a cumulative series over a lookback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slope {
    Rising,
    Falling,
    Flat,
}

/// OBV direction: last value compared with the value `lookback` bars earlier.
pub fn obv_trend(candles: &[Candle], lookback: usize) -> Result<Slope, Report<IndicatorError>> {
    if lookback == 0 {
        bail!(IndicatorError::InvalidParameter {
            name: "lookback must be > 0".into(),
        });
    }
    ensure_len(candles.len(), lookback + 1)?;
    let obv = Obv.calculate(candles)?;
    let last = obv[obv.len() - 1].unwrap_or(0.0);
    let earlier = obv[obv.len() - 1 - lookback].unwrap_or(0.0);
    Ok(if last > earlier {
        Slope::Rising
    } else if last < earlier {
        Slope::Falling
    } else {
        Slope::Flat
    })
}
