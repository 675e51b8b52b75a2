pub mod binance;
pub mod bybit;

use std::sync::Arc;
use std::time::Duration;

use error_stack::{Report, ResultExt, bail};
use futures::future::BoxFuture;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::model::{Candle, SourceKind, TimeFrame};
use crate::series::{self, CandleSeries};

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Where candles come from.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn CandleSource`).
pub trait CandleSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the most recent `limit` candles, validated and oldest first.
    ///
    /// Fails with `SourceError::NoData` when nothing usable comes back.
    fn fetch(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<CandleSeries, Report<SourceError>>>;
}

pub fn build(kind: SourceKind) -> Arc<dyn CandleSource> {
    match kind {
        SourceKind::Bybit => Arc::new(bybit::BybitSource::new()),
        SourceKind::Binance => Arc::new(binance::BinanceSource::new()),
    }
}

/// Send a request built by `build`, retrying transport errors, 429 and 5xx
/// responses with exponential backoff. Other error statuses fail immediately.
pub(crate) async fn send_with_retry<F>(
    provider: &str,
    build: F,
) -> Result<reqwest::Response, Report<SourceError>>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;
    loop {
        let error = match build().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let report = Report::new(SourceError::Request {
                    provider: provider.into(),
                })
                .attach(format!("HTTP status: {status}"));
                if !(status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS) {
                    return Err(report);
                }
                report
            }
            Err(e) => Report::new(e).change_context(SourceError::Request {
                provider: provider.into(),
            }),
        };

        if attempt >= MAX_ATTEMPTS {
            return Err(error.attach(format!("gave up after {attempt} attempts")));
        }
        warn!(provider, attempt, error = %error, "request failed, retrying");
        sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
        attempt += 1;
    }
}

/// Validate parsed candles, mapping "nothing left" to `NoData`.
pub(crate) fn into_series(
    provider: &str,
    candles: Vec<Candle>,
) -> Result<CandleSeries, Report<SourceError>> {
    series::validate(candles, 1).change_context(SourceError::NoData {
        provider: provider.into(),
    })
}

/// Tries each source in order and returns the first series long enough to analyse.
pub struct FallbackSource {
    sources: Vec<Arc<dyn CandleSource>>,
    min_len: usize,
}

impl FallbackSource {
    pub fn new(sources: Vec<Arc<dyn CandleSource>>, min_len: usize) -> Self {
        Self { sources, min_len }
    }
}

impl CandleSource for FallbackSource {
    fn name(&self) -> &str {
        "fallback"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<CandleSeries, Report<SourceError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            for source in &self.sources {
                match source.fetch(&symbol, timeframe, limit).await {
                    Ok(series) if series.len() >= self.min_len => {
                        debug!(
                            source = source.name(),
                            symbol = %symbol,
                            timeframe = %timeframe,
                            candles = series.len(),
                            "candles fetched"
                        );
                        return Ok(series);
                    }
                    Ok(series) => {
                        warn!(
                            source = source.name(),
                            symbol = %symbol,
                            timeframe = %timeframe,
                            candles = series.len(),
                            required = self.min_len,
                            "too few candles, trying next source"
                        );
                    }
                    Err(e) => {
                        warn!(
                            source = source.name(),
                            symbol = %symbol,
                            timeframe = %timeframe,
                            error = ?e,
                            "source failed, trying next source"
                        );
                    }
                }
            }
            bail!(SourceError::NoData {
                provider: format!("all sources for {symbol} {timeframe}"),
            })
        })
    }
}
