pub mod json_file;
pub mod sqlite;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::StorageError;
use crate::model::TimeFrame;

/// Last delivered value per key, used to suppress repeated notifications.
pub trait DedupStore: Send + Sync {
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<String>, Report<StorageError>>>;

    fn set(&self, key: &str, value: &str) -> BoxFuture<'_, Result<(), Report<StorageError>>>;
}

/// `symbol:timeframe`
pub fn signal_key(symbol: &str, timeframe: TimeFrame) -> String {
    format!("{symbol}:{timeframe}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        assert_eq!(signal_key("BTCUSDT", TimeFrame::Hour4), "BTCUSDT:4h");
    }
}
