use std::fmt;

use serde::Serialize;

use crate::bundle::{IndicatorBundle, Trend};
use crate::config::AnalysisConfig;
use crate::indicator::candle::Wick;
use crate::indicator::divergence::Divergence;
use crate::indicator::moneyflow::{FlowDirection, MoneyFlowSignal, PriceVsVwap};
use crate::indicator::supertrend::BandSide;
use crate::indicator::volatility::VolatilityClass;
use crate::indicator::volume::Slope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Entry, stop and targets derived from ATR.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Levels {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit1: f64,
    pub take_profit2: f64,
}

impl Levels {
    fn from_atr(direction: Direction, close: f64, atr: f64, risk_mult: f64) -> Option<Self> {
        let distance = atr * risk_mult;
        let sign = match direction {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
            Direction::Neutral => return None,
        };
        Some(Self {
            entry: close,
            stop_loss: close - sign * distance,
            take_profit1: close + sign * distance,
            take_profit2: close + sign * 2.0 * distance,
        })
    }

    /// Units to buy so that hitting the stop loses `risk_amount`.
    pub fn position_size(&self, risk_amount: f64) -> Option<f64> {
        let per_unit = (self.entry - self.stop_loss).abs();
        (per_unit > 0.0 && risk_amount.is_finite()).then(|| risk_amount / per_unit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub direction: Direction,
    /// `|score|` clamped to the configured maximum.
    pub strength: u32,
    pub score: i32,
    pub reasons: Vec<String>,
    pub levels: Option<Levels>,
}

/// Turns an [`IndicatorBundle`] into a [`Signal`].
///
/// Each check adds -1, 0 or +1 to an integer score and appends one reason.
pub struct SignalScorer {
    config: AnalysisConfig,
}

impl SignalScorer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, bundle: &IndicatorBundle, last_close: f64, atr: Option<f64>) -> Signal {
        let mut score = 0i32;
        let mut reasons = Vec::new();
        let mut add = |delta: i32, reason: String| {
            score += delta;
            reasons.push(reason);
        };

        match bundle.trend {
            Trend::Up => add(1, "trend up (EMA fast above slow)".into()),
            Trend::Down => add(-1, "trend down (EMA fast below slow)".into()),
            Trend::Flat => add(0, "trend flat".into()),
        }

        let hist = bundle.macd_histogram;
        if hist > 0.0 {
            add(1, format!("MACD histogram positive ({hist:.4})"));
        } else if hist < 0.0 {
            add(-1, format!("MACD histogram negative ({hist:.4})"));
        } else {
            add(0, "MACD histogram flat".into());
        }

        let rsi = bundle.rsi;
        if rsi > self.config.rsi_bullish {
            add(1, format!("RSI {rsi:.1} bullish"));
        } else if rsi < self.config.rsi_bearish {
            add(-1, format!("RSI {rsi:.1} bearish"));
        } else {
            add(0, format!("RSI {rsi:.1} neutral"));
        }

        match bundle.supertrend.side {
            BandSide::Above => add(1, "price above SuperTrend".into()),
            BandSide::Below => add(-1, "price below SuperTrend".into()),
        }

        match bundle.money_flow {
            FlowDirection::In => add(1, "money flowing in".into()),
            FlowDirection::Out => add(-1, "money flowing out".into()),
            FlowDirection::Neutral => add(0, "money flow neutral".into()),
        }

        match bundle.volume_ratio {
            Some(ratio) if ratio > 1.0 && bundle.last_bullish => {
                add(1, format!("volume {ratio:.2}x average on a bullish candle"))
            }
            Some(ratio) if ratio > 1.0 && bundle.last_bearish => {
                add(-1, format!("volume {ratio:.2}x average on a bearish candle"))
            }
            Some(ratio) => add(0, format!("volume {ratio:.2}x average, no confirmation")),
            None => add(0, "volume average unavailable".into()),
        }

        let market = match bundle.volatility.class {
            VolatilityClass::Low => "compressed",
            VolatilityClass::Medium => "normal",
            VolatilityClass::High => "high",
            VolatilityClass::Extreme => "extreme",
        };
        add(
            0,
            format!(
                "volatility {market} (ATR {:.2}x its mean, {:.2}% of price)",
                bundle.volatility.ratio,
                bundle.atr_pct * 100.0
            ),
        );

        match bundle.divergence {
            Divergence::Bullish => add(0, "bullish divergence (RSI and OBV)".into()),
            Divergence::Bearish => add(0, "bearish divergence (RSI and OBV)".into()),
            Divergence::None => add(0, "no divergence".into()),
        }
        match bundle.vwap_relation {
            PriceVsVwap::Above => add(0, "price above VWAP".into()),
            PriceVsVwap::Below => add(0, "price below VWAP".into()),
            PriceVsVwap::At => add(0, "price at VWAP".into()),
        }
        add(0, format!("market phase: {}", bundle.phase.as_str()));
        match bundle.obv_trend {
            Slope::Rising => add(0, "OBV rising".into()),
            Slope::Falling => add(0, "OBV falling".into()),
            Slope::Flat => add(0, "OBV flat".into()),
        }
        let flow = match bundle.money_flow_signal {
            MoneyFlowSignal::Buy => "buy",
            MoneyFlowSignal::WeakBuy => "weak buy",
            MoneyFlowSignal::Neutral => "neutral",
            MoneyFlowSignal::WeakSell => "weak sell",
            MoneyFlowSignal::Sell => "sell",
        };
        add(0, format!("money-flow signal {flow} (MFI {:.1})", bundle.mfi));
        match bundle.bollinger.percent_b(last_close) {
            Some(pb) if pb > 1.0 => add(0, "price above upper Bollinger band".into()),
            Some(pb) if pb < 0.0 => add(0, "price below lower Bollinger band".into()),
            Some(pb) => add(0, format!("Bollinger %B {pb:.2}")),
            None => add(0, "Bollinger bands collapsed".into()),
        }

        if bundle.volatility_expanding {
            add(0, "volatility expanding".into());
        }

        if bundle.breakout {
            add(0, "range breakout on expanded volume".into());
        }
        if bundle.volume_spike {
            add(0, "volume spike".into());
        }
        match bundle.wick {
            Wick::Upper => add(0, "long upper wick".into()),
            Wick::Lower => add(0, "long lower wick".into()),
            Wick::None => {}
        }

        let threshold = self.config.score_threshold;
        let direction = if score >= threshold {
            Direction::Long
        } else if score <= -threshold {
            Direction::Short
        } else {
            Direction::Neutral
        };
        let strength = score.unsigned_abs().min(self.config.max_strength);

        let levels = atr
            .filter(|a| a.is_finite() && *a > 0.0)
            .and_then(|a| Levels::from_atr(direction, last_close, a, self.config.atr_risk_mult));

        Signal {
            direction,
            strength,
            score,
            reasons,
            levels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle;
    use crate::indicator::bollinger::Bands;
    use crate::indicator::phase::MarketPhase;
    use crate::indicator::supertrend::SuperTrendPoint;
    use crate::indicator::volatility::VolatilityState;
    use crate::model::Candle;

    /// A bundle where every scored check is neutral except SuperTrend,
    /// which cannot be neutral and is tuned per test.
    fn neutral_bundle(side: BandSide) -> IndicatorBundle {
        IndicatorBundle {
            trend: Trend::Flat,
            ema_fast: 100.0,
            ema_slow: 100.0,
            rsi: 50.0,
            macd_histogram: 0.0,
            atr: 2.0,
            atr_pct: 0.02,
            bollinger: Bands {
                upper: 104.0,
                middle: 100.0,
                lower: 96.0,
            },
            obv_trend: Slope::Flat,
            supertrend: SuperTrendPoint {
                value: 98.0,
                upper: 102.0,
                lower: 98.0,
                side,
            },
            volatility: VolatilityState {
                class: VolatilityClass::Medium,
                ratio: 1.0,
            },
            volatility_expanding: false,
            phase: MarketPhase::Accumulation,
            money_flow: FlowDirection::Neutral,
            money_flow_signal: MoneyFlowSignal::Neutral,
            mfi: 50.0,
            vwap: 100.0,
            vwap_relation: PriceVsVwap::At,
            volume_ratio: Some(1.0),
            volume_spike: false,
            divergence: Divergence::None,
            wick: Wick::None,
            breakout: false,
            last_close: 100.0,
            last_bullish: false,
            last_bearish: false,
        }
    }

    fn scorer() -> SignalScorer {
        SignalScorer::new(AnalysisConfig::default())
    }

    #[test]
    fn plus_three_is_long() {
        let mut b = neutral_bundle(BandSide::Above);
        b.trend = Trend::Up;
        b.macd_histogram = 0.5;
        let signal = scorer().score(&b, 100.0, Some(2.0));
        assert_eq!(signal.score, 3);
        assert_eq!(signal.direction, Direction::Long);
        assert_eq!(signal.strength, 3);
    }

    #[test]
    fn plus_two_is_neutral() {
        let mut b = neutral_bundle(BandSide::Above);
        b.trend = Trend::Up;
        let signal = scorer().score(&b, 100.0, Some(2.0));
        assert_eq!(signal.score, 2);
        assert_eq!(signal.direction, Direction::Neutral);
        assert_eq!(signal.strength, 2);
        assert!(signal.levels.is_none());
    }

    #[test]
    fn minus_three_is_short_with_mirrored_levels() {
        let mut b = neutral_bundle(BandSide::Below);
        b.trend = Trend::Down;
        b.rsi = 30.0;
        let signal = scorer().score(&b, 100.0, Some(2.0));
        assert_eq!(signal.direction, Direction::Short);
        let levels = signal.levels.unwrap();
        assert_eq!(levels.entry, 100.0);
        assert_eq!(levels.stop_loss, 103.0);
        assert_eq!(levels.take_profit1, 97.0);
        assert_eq!(levels.take_profit2, 94.0);
    }

    #[test]
    fn long_levels_from_atr() {
        let mut b = neutral_bundle(BandSide::Above);
        b.trend = Trend::Up;
        b.rsi = 70.0;
        let levels = scorer().score(&b, 100.0, Some(2.0)).levels.unwrap();
        assert_eq!(levels.stop_loss, 97.0);
        assert_eq!(levels.take_profit1, 103.0);
        assert_eq!(levels.take_profit2, 106.0);
        assert_eq!(levels.position_size(30.0), Some(10.0));
    }

    #[test]
    fn levels_omitted_without_usable_atr() {
        let mut b = neutral_bundle(BandSide::Above);
        b.trend = Trend::Up;
        b.rsi = 70.0;
        for atr in [Some(0.0), Some(-1.0), Some(f64::NAN), None] {
            let signal = scorer().score(&b, 100.0, atr);
            assert_eq!(signal.direction, Direction::Long);
            assert!(signal.levels.is_none());
        }
    }

    #[test]
    fn strength_is_clamped() {
        let mut b = neutral_bundle(BandSide::Above);
        b.trend = Trend::Up;
        b.macd_histogram = 1.0;
        b.rsi = 80.0;
        b.money_flow = FlowDirection::In;
        b.volume_ratio = Some(2.0);
        b.last_bullish = true;
        let signal = scorer().score(&b, 100.0, Some(1.0));
        assert_eq!(signal.score, 6);
        assert_eq!(signal.strength, 5);
    }

    #[test]
    fn every_check_leaves_a_reason() {
        let signal = scorer().score(&neutral_bundle(BandSide::Above), 100.0, None);
        // seven scored checks plus six informational readings
        assert_eq!(signal.reasons.len(), 13);
        assert!(signal.reasons[0].contains("trend"));
        assert!(signal.reasons[6].contains("volatility normal"));
        assert!(signal.reasons[6].contains("2.00% of price"));
        assert!(signal.reasons.contains(&"OBV flat".to_string()));
        assert!(signal.reasons.contains(&"money-flow signal neutral (MFI 50.0)".to_string()));
        assert!(signal.reasons.contains(&"Bollinger %B 0.50".to_string()));
    }

    #[test]
    fn readings_outside_the_score_are_reported() {
        let mut b = neutral_bundle(BandSide::Above);
        b.volatility_expanding = true;
        b.obv_trend = Slope::Rising;
        b.money_flow_signal = MoneyFlowSignal::WeakBuy;
        b.mfi = 58.0;
        let signal = scorer().score(&b, 105.0, None);
        assert_eq!(signal.score, 1);
        assert!(signal.reasons.contains(&"volatility expanding".to_string()));
        assert!(signal.reasons.contains(&"OBV rising".to_string()));
        assert!(signal.reasons.contains(&"money-flow signal weak buy (MFI 58.0)".to_string()));
        assert!(signal.reasons.contains(&"price above upper Bollinger band".to_string()));
    }

    #[test]
    fn volume_confirms_candle_direction() {
        let mut b = neutral_bundle(BandSide::Above);
        b.volume_ratio = Some(1.5);
        b.last_bearish = true;
        assert_eq!(scorer().score(&b, 100.0, None).score, 0);
        b.volume_ratio = None;
        assert_eq!(scorer().score(&b, 100.0, None).score, 1);
    }

    #[test]
    fn uptrend_end_to_end() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let close = 100.0 + 0.5 * i as f64;
                let open = close - 0.5;
                Candle {
                    timestamp: 1_700_000_000 + i as i64 * 3600,
                    open,
                    high: close + 0.3,
                    low: open - 0.3,
                    close,
                    volume: 1000.0 + 10.0 * i as f64,
                }
            })
            .collect();
        let config = AnalysisConfig::default();
        let b = bundle::compute(&candles, &config).unwrap();
        assert_eq!(b.trend, Trend::Up);
        assert!(b.macd_histogram > 0.0);

        let signal = SignalScorer::new(config).score(&b, b.last_close, Some(b.atr));
        assert_eq!(signal.direction, Direction::Long);
        assert!(signal.strength >= 1);
        assert!(signal.reasons.iter().any(|r| r.starts_with("trend up")));
        assert!(signal.levels.is_some());
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Long.to_string(), "LONG");
        assert_eq!(Direction::Neutral.to_string(), "NEUTRAL");
    }
}
