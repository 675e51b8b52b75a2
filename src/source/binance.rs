use std::sync::Arc;

use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use tracing::info;

use crate::error::SourceError;
use crate::model::{Candle, TimeFrame, normalize_timestamp};
use crate::series::CandleSeries;
use crate::source::{CandleSource, into_series, send_with_retry};

const BINANCE_BASE_URL: &str = "https://api.binance.com";
const PROVIDER: &str = "binance";
const MAX_CANDLES_PER_REQUEST: usize = 1000;

pub struct BinanceSource {
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl BinanceSource {
    pub fn new() -> Self {
        // Kline endpoint costs weight 2 of 6000/min; 20 req/s leaves headroom.
        let quota = Quota::per_second(nonzero!(20u32));
        Self {
            client: reqwest::Client::new(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

impl Default for BinanceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CandleSource for BinanceSource {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: TimeFrame,
        limit: usize,
    ) -> BoxFuture<'_, Result<CandleSeries, Report<SourceError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            // Wait for rate limiter before making the request
            self.rate_limiter.until_ready().await;

            let url = format!("{}/api/v3/klines", BINANCE_BASE_URL);
            let limit_str = limit.min(MAX_CANDLES_PER_REQUEST).to_string();
            let params = [
                ("symbol", symbol.as_str()),
                ("interval", timeframe.binance_interval()),
                ("limit", limit_str.as_str()),
            ];

            let response = send_with_retry(PROVIDER, || self.client.get(&url).query(&params)).await?;
            let raw: Vec<BinanceKlineRow> =
                response
                    .json()
                    .await
                    .change_context(SourceError::ResponseParse {
                        provider: PROVIDER.into(),
                    })?;

            info!(
                symbol = %symbol,
                timeframe = %timeframe,
                fetched = raw.len(),
                "binance candle fetch complete"
            );

            let candles = raw
                .into_iter()
                .map(BinanceKlineRow::into_candle)
                .collect::<Result<Vec<_>, _>>()?;

            into_series(PROVIDER, candles)
        })
    }
}

// ── REST response types ───────────────────────────────────────────────────────

/// Binance kline row: 12-element array, oldest row first
/// [open_time, open, high, low, close, volume, close_time, ...]
#[derive(Debug, Deserialize)]
struct BinanceKlineRow(
    i64,                        // 0: open_time (ms)
    String,                     // 1: open
    String,                     // 2: high
    String,                     // 3: low
    String,                     // 4: close
    String,                     // 5: volume
    #[allow(dead_code)] i64,    // 6: close_time
    #[allow(dead_code)] String, // 7: quote asset volume
    #[allow(dead_code)] i64,    // 8: number of trades
    #[allow(dead_code)] String, // 9: taker buy base volume
    #[allow(dead_code)] String, // 10: taker buy quote volume
    #[allow(dead_code)] String, // 11: ignore
);

impl BinanceKlineRow {
    fn into_candle(self) -> Result<Candle, Report<SourceError>> {
        let parse_f64 = |s: &str| -> Result<f64, Report<SourceError>> {
            s.parse::<f64>()
                .change_context(SourceError::ResponseParse {
                    provider: PROVIDER.into(),
                })
                .attach_with(|| format!("value: {s:?}"))
        };

        Ok(Candle {
            timestamp: normalize_timestamp(self.0),
            open: parse_f64(&self.1)?,
            high: parse_f64(&self.2)?,
            low: parse_f64(&self.3)?,
            close: parse_f64(&self.4)?,
            volume: parse_f64(&self.5)?,
        })
    }
}
