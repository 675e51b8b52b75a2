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

const BYBIT_BASE_URL: &str = "https://api.bybit.com";
const PROVIDER: &str = "bybit";
const MAX_CANDLES_PER_REQUEST: usize = 1000;

pub struct BybitSource {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl BybitSource {
    pub fn new() -> Self {
        // Public market endpoints allow 600 req / 5 s per IP; stay far below it.
        let quota = Quota::per_second(nonzero!(10u32));
        Self {
            client: reqwest::Client::new(),
            base_url: BYBIT_BASE_URL.into(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }
}

impl Default for BybitSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CandleSource for BybitSource {
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
            self.rate_limiter.until_ready().await;

            let url = format!("{}/v5/market/kline", self.base_url);
            let limit_str = limit.min(MAX_CANDLES_PER_REQUEST).to_string();
            let params = [
                ("category", "linear"),
                ("symbol", symbol.as_str()),
                ("interval", timeframe.bybit_interval()),
                ("limit", limit_str.as_str()),
            ];

            let response = send_with_retry(PROVIDER, || self.client.get(&url).query(&params)).await?;
            let body: BybitResponse =
                response
                    .json()
                    .await
                    .change_context(SourceError::ResponseParse {
                        provider: PROVIDER.into(),
                    })?;

            let candles = body.into_candles()?;
            info!(
                symbol = %symbol,
                timeframe = %timeframe,
                fetched = candles.len(),
                "bybit candle fetch complete"
            );

            into_series(PROVIDER, candles)
        })
    }
}

// ── REST response types ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitResponse {
    ret_code: i64,
    ret_msg: String,
    result: Option<BybitKlineResult>,
}

#[derive(Debug, Deserialize)]
struct BybitKlineResult {
    #[serde(default)]
    list: Vec<Vec<String>>,
}

impl BybitResponse {
    /// Rows arrive newest first as
    /// `[start_ms, open, high, low, close, volume, turnover]`; returned oldest first.
    fn into_candles(self) -> Result<Vec<Candle>, Report<SourceError>> {
        if self.ret_code != 0 {
            return Err(Report::new(SourceError::Request {
                provider: PROVIDER.into(),
            })
            .attach(format!("retCode {}: {}", self.ret_code, self.ret_msg)));
        }
        let rows = self.result.map(|r| r.list).unwrap_or_default();
        let mut candles = rows
            .iter()
            .map(|row| parse_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        candles.reverse();
        Ok(candles)
    }
}

fn parse_row(row: &[String]) -> Result<Candle, Report<SourceError>> {
    let parse_err = || SourceError::ResponseParse {
        provider: PROVIDER.into(),
    };
    if row.len() < 6 {
        return Err(Report::new(parse_err()).attach(format!("kline row has {} fields", row.len())));
    }
    let parse_f64 = |s: &str| -> Result<f64, Report<SourceError>> {
        s.parse::<f64>().change_context(parse_err())
    };
    let start_ms = row[0].parse::<i64>().change_context(parse_err())?;

    Ok(Candle {
        timestamp: normalize_timestamp(start_ms),
        open: parse_f64(&row[1])?,
        high: parse_f64(&row[2])?,
        low: parse_f64(&row[3])?,
        close: parse_f64(&row[4])?,
        volume: parse_f64(&row[5])?,
    })
}
