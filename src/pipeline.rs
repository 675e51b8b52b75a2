use error_stack::{Report, ResultExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bundle::{self, IndicatorBundle};
use crate::config::AnalysisConfig;
use crate::dedup::{DedupStore, signal_key};
use crate::error::EvaluationError;
use crate::model::TimeFrame;
use crate::notifier::{Notifier, render_signal};
use crate::scorer::{Direction, Signal, SignalScorer};
use crate::source::CandleSource;

/// One scored (symbol, timeframe).
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub symbol: String,
    pub timeframe: TimeFrame,
    pub bundle: IndicatorBundle,
    pub signal: Signal,
}

impl Evaluation {
    pub fn render(&self) -> String {
        render_signal(&self.symbol, self.timeframe, &self.signal)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Fetch, compute and score.
pub async fn evaluate(
    source: &dyn CandleSource,
    symbol: &str,
    timeframe: TimeFrame,
    limit: usize,
    config: &AnalysisConfig,
) -> Result<Evaluation, Report<EvaluationError>> {
    let series = source
        .fetch(symbol, timeframe, limit)
        .await
        .change_context(EvaluationError::Fetch {
            symbol: symbol.into(),
            timeframe: timeframe.to_string(),
        })?;

    let bundle = bundle::compute(series.as_slice(), config).change_context(
        EvaluationError::Indicators {
            symbol: symbol.into(),
            timeframe: timeframe.to_string(),
        },
    )?;

    let signal = SignalScorer::new(config.clone()).score(&bundle, bundle.last_close, Some(bundle.atr));
    debug!(
        symbol,
        timeframe = %timeframe,
        direction = %signal.direction,
        score = signal.score,
        bundle = %serde_json::to_string(&bundle).unwrap_or_default(),
        "signal scored"
    );

    Ok(Evaluation {
        symbol: symbol.into(),
        timeframe,
        bundle,
        signal,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Notified,
    /// Same direction as the last recorded one.
    Unchanged,
    /// Neutral signals are recorded but not sent unless configured.
    NeutralRecorded,
    DeliveryFailed,
    DedupFailed,
}

/// Deliver `evaluation` unless its direction matches the last recorded one.
///
/// The direction is recorded only after a successful delivery, so a failed
/// send is retried on the next cycle.
pub async fn dispatch(
    evaluation: &Evaluation,
    dedup: &dyn DedupStore,
    notifier: &dyn Notifier,
    notify_neutral: bool,
) -> Outcome {
    let key = signal_key(&evaluation.symbol, evaluation.timeframe);
    let direction = evaluation.signal.direction.to_string();

    let previous = match dedup.get(&key).await {
        Ok(p) => p,
        Err(e) => {
            warn!(key = %key, error = ?e, "dedup lookup failed");
            return Outcome::DedupFailed;
        }
    };
    if previous.as_deref() == Some(direction.as_str()) {
        debug!(key = %key, direction = %direction, "direction unchanged, not notifying");
        return Outcome::Unchanged;
    }

    let outcome = if evaluation.signal.direction == Direction::Neutral && !notify_neutral {
        Outcome::NeutralRecorded
    } else {
        if let Err(e) = notifier.send(&evaluation.render()).await {
            warn!(
                key = %key,
                notifier = notifier.name(),
                error = ?e,
                "notification failed"
            );
            return Outcome::DeliveryFailed;
        }
        info!(
            key = %key,
            notifier = notifier.name(),
            direction = %direction,
            strength = evaluation.signal.strength,
            "signal sent"
        );
        Outcome::Notified
    };

    if let Err(e) = dedup.set(&key, &direction).await {
        warn!(key = %key, error = ?e, "dedup update failed");
        return Outcome::DedupFailed;
    }
    outcome
}
