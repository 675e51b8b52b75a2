use error_stack::{Report, bail};
use serde::Serialize;

use crate::error::IndicatorError;
use crate::indicator::ensure_len;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Divergence {
    Bullish,
    Bearish,
    None,
}

/// Compare the last bar against the preceding `window - 1` bars.
///
/// Bullish: close makes a new low while the oscillator stays above its prior
/// low. Bearish: close makes a new high while the oscillator stays below its
/// prior high.
pub fn detect(
    closes: &[f64],
    oscillator: &[Option<f64>],
    window: usize,
) -> Result<Divergence, Report<IndicatorError>> {
    if window < 2 {
        bail!(IndicatorError::InvalidParameter {
            name: "window must be >= 2".into(),
        });
    }
    if closes.len() != oscillator.len() {
        bail!(IndicatorError::InvalidParameter {
            name: "closes and oscillator must be aligned".into(),
        });
    }
    ensure_len(closes.len(), window)?;

    let start = closes.len() - window;
    let osc: Vec<f64> = oscillator[start..].iter().flatten().copied().collect();
    if osc.len() < window {
        // oscillator still warming up inside the window
        bail!(IndicatorError::InsufficientData {
            required: window,
            available: osc.len(),
        });
    }

    let prices = &closes[start..];
    let (prior_prices, last_price) = (&prices[..window - 1], prices[window - 1]);
    let (prior_osc, last_osc) = (&osc[..window - 1], osc[window - 1]);

    let min = |xs: &[f64]| xs.iter().copied().fold(f64::INFINITY, f64::min);
    let max = |xs: &[f64]| xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if last_price < min(prior_prices) && last_osc > min(prior_osc) {
        return Ok(Divergence::Bullish);
    }
    if last_price > max(prior_prices) && last_osc < max(prior_osc) {
        return Ok(Divergence::Bearish);
    }
    Ok(Divergence::None)
}

/// Divergence reported only when RSI and OBV agree.
pub fn confirmed(
    closes: &[f64],
    rsi: &[Option<f64>],
    obv: &[Option<f64>],
    window: usize,
) -> Result<Divergence, Report<IndicatorError>> {
    let by_rsi = detect(closes, rsi, window)?;
    let by_obv = detect(closes, obv, window)?;
    Ok(if by_rsi == by_obv {
        by_rsi
    } else {
        Divergence::None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(xs: &[f64]) -> Vec<Option<f64>> {
        xs.iter().copied().map(Some).collect()
    }

    #[test]
    fn bullish_lower_low_with_higher_oscillator_low() {
        let closes = [10.0, 9.0, 9.5, 9.2, 8.5];
        let osc = some(&[40.0, 30.0, 35.0, 33.0, 34.0]);
        assert_eq!(detect(&closes, &osc, 5).unwrap(), Divergence::Bullish);
    }

    #[test]
    fn bearish_higher_high_with_lower_oscillator_high() {
        let closes = [10.0, 11.0, 10.5, 10.8, 11.5];
        let osc = some(&[60.0, 70.0, 65.0, 66.0, 68.0]);
        assert_eq!(detect(&closes, &osc, 5).unwrap(), Divergence::Bearish);
    }

    #[test]
    fn confirming_oscillator_is_no_divergence() {
        let closes = [10.0, 9.0, 9.5, 9.2, 8.5];
        let osc = some(&[40.0, 30.0, 35.0, 33.0, 25.0]);
        assert_eq!(detect(&closes, &osc, 5).unwrap(), Divergence::None);
    }

    #[test]
    fn warming_oscillator_is_insufficient() {
        let closes = [10.0, 9.0, 9.5, 9.2, 8.5];
        let osc = vec![None, Some(30.0), Some(35.0), Some(33.0), Some(34.0)];
        assert!(detect(&closes, &osc, 5).is_err());
        assert!(detect(&closes[..3], &osc[..3], 5).is_err());
    }

    #[test]
    fn misaligned_inputs_rejected() {
        assert!(detect(&[1.0, 2.0], &some(&[1.0]), 2).is_err());
        assert!(detect(&[1.0, 2.0], &some(&[1.0, 2.0]), 1).is_err());
    }

    #[test]
    fn confirmation_requires_agreement() {
        let closes = [10.0, 9.0, 9.5, 9.2, 8.5];
        let rsi = some(&[40.0, 30.0, 35.0, 33.0, 34.0]);
        let obv_agree = some(&[100.0, 80.0, 90.0, 85.0, 88.0]);
        let obv_disagree = some(&[100.0, 80.0, 90.0, 85.0, 70.0]);
        assert_eq!(
            confirmed(&closes, &rsi, &obv_agree, 5).unwrap(),
            Divergence::Bullish
        );
        assert_eq!(
            confirmed(&closes, &rsi, &obv_disagree, 5).unwrap(),
            Divergence::None
        );
    }
}
