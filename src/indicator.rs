pub mod atr;
pub mod bollinger;
pub mod candle;
pub mod divergence;
pub mod ma;
pub mod macd;
pub mod momentum;
pub mod moneyflow;
pub mod phase;
pub mod rsi;
pub mod supertrend;
pub mod volatility;
pub mod volume;

use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::model::Candle;

/// One value per input candle; `None` during the indicator's warmup.
pub type Series = Vec<Option<f64>>;

/// A technical analysis indicator that operates on a slice of candles.
///
/// Candles must be in ascending chronological order (oldest first). The output
/// is aligned with the input: index `i` of the result belongs to candle `i`.
pub trait Indicator: Send {
    /// Unique name of this indicator (e.g., "rsi", "sma").
    fn name(&self) -> &str;

    /// Minimum number of candles required to produce at least one output value.
    fn required_candles(&self) -> usize;

    /// Calculate indicator values from candles.
    fn calculate(&self, candles: &[Candle]) -> Result<Series, Report<IndicatorError>>;

    /// Value at the most recent candle.
    fn latest(&self, candles: &[Candle]) -> Result<f64, Report<IndicatorError>> {
        let series = self.calculate(candles)?;
        last_value(&series).ok_or_else(|| {
            Report::new(IndicatorError::InsufficientData {
                required: self.required_candles(),
                available: candles.len(),
            })
        })
    }
}

/// Extract close prices from a slice of candles.
pub fn close_prices(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Extract volumes from a slice of candles.
pub fn volumes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.volume).collect()
}

/// Last element of a series, if it is defined.
pub fn last_value(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}

pub(crate) fn ensure_period(period: usize, name: &str) -> Result<(), Report<IndicatorError>> {
    if period == 0 {
        bail!(IndicatorError::InvalidParameter {
            name: format!("{name} must be > 0"),
        });
    }
    Ok(())
}

pub(crate) fn ensure_len(available: usize, required: usize) -> Result<(), Report<IndicatorError>> {
    if available < required {
        bail!(IndicatorError::InsufficientData {
            required,
            available,
        });
    }
    Ok(())
}

/// Replace non-finite results with `None` so they never reach the scorer.
pub(crate) fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_value_reads_final_slot() {
        assert_eq!(last_value(&[Some(1.0), None]), None);
        assert_eq!(last_value(&[None, Some(2.0)]), Some(2.0));
        assert_eq!(last_value(&[]), None);
    }

    #[test]
    fn finite_filters_nan_and_inf() {
        assert_eq!(finite(1.5), Some(1.5));
        assert_eq!(finite(f64::NAN), None);
        assert_eq!(finite(f64::INFINITY), None);
    }

    #[test]
    fn ensure_len_reports_counts() {
        assert!(ensure_len(5, 5).is_ok());
        let err = ensure_len(4, 5).unwrap_err();
        assert!(matches!(
            err.current_context(),
            IndicatorError::InsufficientData {
                required: 5,
                available: 4
            }
        ));
    }
}
