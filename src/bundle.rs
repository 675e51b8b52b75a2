use error_stack::Report;
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::error::IndicatorError;
use crate::indicator::atr::Atr;
use crate::indicator::bollinger::{Bands, BollingerBands};
use crate::indicator::candle::{Wick, long_wick, range_breakout};
use crate::indicator::divergence::{self, Divergence};
use crate::indicator::ma::Ema;
use crate::indicator::macd::Macd;
use crate::indicator::moneyflow::{
    FlowDirection, Mfi, MoneyFlowSignal, PriceVsVwap, Vwap, money_flow_signal, money_pressure,
    price_vs_vwap,
};
use crate::indicator::phase::{DEFAULT_FLATNESS, MarketPhase, PhaseClassifier};
use crate::indicator::rsi::Rsi;
use crate::indicator::supertrend::{SuperTrend, SuperTrendPoint};
use crate::indicator::volatility::{self, VolatilityState};
use crate::indicator::volume::{Obv, Slope, VolumeMA, obv_trend, volume_spike};
use crate::indicator::{Indicator, close_prices, ensure_len, last_value};
use crate::model::Candle;

const VOLUME_SPIKE_MULT: f64 = 1.8;
const EXPANSION_FACTOR: f64 = 1.2;

/// EMA-fast vs EMA-slow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

/// Latest indicator readings for one (symbol, timeframe) evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorBundle {
    pub trend: Trend,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub rsi: f64,
    pub macd_histogram: f64,
    pub atr: f64,
    /// ATR as a fraction of the last close.
    pub atr_pct: f64,
    pub bollinger: Bands,
    pub obv_trend: Slope,
    pub supertrend: SuperTrendPoint,
    pub volatility: VolatilityState,
    pub volatility_expanding: bool,
    pub phase: MarketPhase,
    pub money_flow: FlowDirection,
    pub money_flow_signal: MoneyFlowSignal,
    pub mfi: f64,
    pub vwap: f64,
    pub vwap_relation: PriceVsVwap,
    /// Last volume over its moving average; `None` when the average is zero.
    pub volume_ratio: Option<f64>,
    pub volume_spike: bool,
    pub divergence: Divergence,
    pub wick: Wick,
    pub breakout: bool,
    pub last_close: f64,
    pub last_bullish: bool,
    pub last_bearish: bool,
}

/// Smallest series length every indicator in the bundle can be computed on.
pub fn required_warmup(config: &AnalysisConfig) -> usize {
    [
        config.rsi_period + config.divergence_window - 1,
        config.ema_slow,
        config.macd_slow + config.macd_signal - 1,
        config.atr_period + 1,
        config.bollinger_period,
        config.obv_lookback + 1,
        config.supertrend_period + 1,
        config.volatility_period,
        config.money_flow_period + 1,
        config.mfi_period + 1,
        config.volume_period + 1,
    ]
    .into_iter()
    .max()
    .unwrap_or(1)
}

/// Compute every reading from `candles` (oldest first).
pub fn compute(
    candles: &[Candle],
    config: &AnalysisConfig,
) -> Result<IndicatorBundle, Report<IndicatorError>> {
    ensure_len(candles.len(), required_warmup(config))?;
    let closes = close_prices(candles);
    let last = candles[candles.len() - 1];
    let not_ready = || {
        Report::new(IndicatorError::InsufficientData {
            required: required_warmup(config),
            available: candles.len(),
        })
    };

    let ema_fast = last_value(&Ema::new(config.ema_fast)?.calculate_prices(&closes)?)
        .ok_or_else(not_ready)?;
    let ema_slow = last_value(&Ema::new(config.ema_slow)?.calculate_prices(&closes)?)
        .ok_or_else(not_ready)?;
    let trend = if ema_fast > ema_slow {
        Trend::Up
    } else if ema_fast < ema_slow {
        Trend::Down
    } else {
        Trend::Flat
    };

    let rsi_series = Rsi::new(config.rsi_period)?.calculate_prices(&closes)?;
    let rsi = last_value(&rsi_series).ok_or_else(not_ready)?;

    let macd_histogram = last_value(
        &Macd::new(config.macd_fast, config.macd_slow, config.macd_signal)?.histogram(candles)?,
    )
    .ok_or_else(not_ready)?;

    let atr = Atr::new(config.atr_period)?.latest(candles)?;

    let bollinger = BollingerBands::new(config.bollinger_period, config.bollinger_mult)?
        .calculate_bands(candles)?
        .last()
        .copied()
        .flatten()
        .ok_or_else(not_ready)?;

    let supertrend = SuperTrend::new(config.supertrend_period, config.supertrend_mult)?
        .calculate_full(candles)?
        .last()
        .copied()
        .flatten()
        .ok_or_else(not_ready)?;

    let phase = PhaseClassifier::new(config.ema_fast, config.ema_slow, DEFAULT_FLATNESS)?
        .classify(candles)?;

    let vwap = Vwap.latest(candles)?;
    let obv_series = Obv.calculate(candles)?;

    Ok(IndicatorBundle {
        trend,
        ema_fast,
        ema_slow,
        rsi,
        macd_histogram,
        atr,
        atr_pct: if last.close > 0.0 { atr / last.close } else { 0.0 },
        bollinger,
        obv_trend: obv_trend(candles, config.obv_lookback)?,
        supertrend,
        volatility: volatility::classify(candles, config.volatility_period)?,
        volatility_expanding: volatility::expansion(candles, config.atr_period, EXPANSION_FACTOR)?,
        phase,
        money_flow: money_pressure(candles, config.money_flow_period)?,
        money_flow_signal: money_flow_signal(candles, config.mfi_period, config.money_flow_period)?,
        mfi: Mfi::new(config.mfi_period)?.latest(candles)?,
        vwap,
        vwap_relation: price_vs_vwap(last.close, vwap),
        volume_ratio: VolumeMA::new(config.volume_period)?.latest_ratio(candles)?,
        volume_spike: volume_spike(candles, config.volume_period, VOLUME_SPIKE_MULT)?,
        divergence: divergence::confirmed(
            &closes,
            &rsi_series,
            &obv_series,
            config.divergence_window,
        )?,
        wick: long_wick(&last),
        breakout: range_breakout(candles, config.volume_period)?,
        last_close: last.close,
        last_bullish: last.is_bullish(),
        last_bearish: last.is_bearish(),
    })
}
