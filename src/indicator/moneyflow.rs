use error_stack::Report;
use serde::Serialize;

use crate::error::IndicatorError;
use crate::indicator::{Indicator, Series, ensure_len, ensure_period, finite, last_value};
use crate::model::Candle;

/// Cumulative volume-weighted average of the typical price.
///
/// Slots stay `None` until some volume has traded.
pub struct Vwap;

impl Indicator for Vwap {
    fn name(&self) -> &str {
        "vwap"
    }

    fn required_candles(&self) -> usize {
        1
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        ensure_len(candles.len(), 1)?;
        let mut pv = 0.0;
        let mut vol = 0.0;
        Ok(candles
            .iter()
            .map(|c| {
                pv += c.typical_price() * c.volume;
                vol += c.volume;
                if vol > 0.0 { finite(pv / vol) } else { None }
            })
            .collect())
    }
}

/// Money Flow Index over `period` typical-price changes.
///
/// A window with positive flow and no negative flow reads 100; a window with
/// no flow at all reads 50.
pub struct Mfi {
    period: usize,
}

impl Mfi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        ensure_period(period, "period")?;
        Ok(Self { period })
    }
}

impl Indicator for Mfi {
    fn name(&self) -> &str {
        "mfi"
    }

    fn required_candles(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>> {
        ensure_len(candles.len(), self.required_candles())?;
        let n = candles.len();
        let mut positive = vec![0.0; n];
        let mut negative = vec![0.0; n];
        for i in 1..n {
            let tp = candles[i].typical_price();
            let prev = candles[i - 1].typical_price();
            let flow = tp * candles[i].volume;
            if tp > prev {
                positive[i] = flow;
            } else if tp < prev {
                negative[i] = flow;
            }
        }

        let mut out = vec![None; n];
        for (i, slot) in out.iter_mut().enumerate().skip(self.period) {
            let window = i + 1 - self.period..=i;
            let pos: f64 = positive[window.clone()].iter().sum();
            let neg: f64 = negative[window].iter().sum();
            *slot = Some(match (pos > 0.0, neg > 0.0) {
                (_, true) => 100.0 - 100.0 / (1.0 + pos / neg),
                (true, false) => 100.0,
                (false, false) => 50.0,
            });
        }
        Ok(out)
    }
}

/// Whether capital is entering or leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    In,
    Out,
    Neutral,
}

/// Buyer/seller pressure: sign of `sum(delta_close * volume)` over the last
/// `period` bars.
pub fn money_pressure(
    candles: &[Candle],
    period: usize,
) -> Result<FlowDirection, Report<IndicatorError>> {
    ensure_period(period, "period")?;
    ensure_len(candles.len(), period + 1)?;
    let flow: f64 = candles[candles.len() - period - 1..]
        .windows(2)
        .map(|w| (w[1].close - w[0].close) * w[1].volume)
        .sum();
    Ok(if flow > 0.0 {
        FlowDirection::In
    } else if flow < 0.0 {
        FlowDirection::Out
    } else {
        FlowDirection::Neutral
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceVsVwap {
    Above,
    Below,
    At,
}

pub fn price_vs_vwap(price: f64, vwap: f64) -> PriceVsVwap {
    if price > vwap {
        PriceVsVwap::Above
    } else if price < vwap {
        PriceVsVwap::Below
    } else {
        PriceVsVwap::At
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoneyFlowSignal {
    Buy,
    WeakBuy,
    Neutral,
    WeakSell,
    Sell,
}

/// Combine MFI, VWAP position and pressure into one reading.
pub fn money_flow_signal(
    candles: &[Candle],
    mfi_period: usize,
    pressure_period: usize,
) -> Result<MoneyFlowSignal, Report<IndicatorError>> {
    let mfi = last_value(&Mfi::new(mfi_period)?.calculate(candles)?).unwrap_or(50.0);
    let vwap = Vwap.latest(candles)?;
    let price = candles.last().map(|c| c.close).unwrap_or(vwap);
    let relation = price_vs_vwap(price, vwap);
    let pressure = money_pressure(candles, pressure_period)?;

    Ok(match relation {
        PriceVsVwap::Above if mfi > 60.0 && pressure == FlowDirection::In => MoneyFlowSignal::Buy,
        PriceVsVwap::Below if mfi < 40.0 && pressure == FlowDirection::Out => {
            MoneyFlowSignal::Sell
        }
        PriceVsVwap::Above if mfi > 50.0 => MoneyFlowSignal::WeakBuy,
        PriceVsVwap::Below if mfi < 50.0 => MoneyFlowSignal::WeakSell,
        _ => MoneyFlowSignal::Neutral,
    })
}
