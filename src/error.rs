use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum SeriesError {
    #[display("insufficient data: need {required} valid candles, got {available}")]
    InsufficientData { required: usize, available: usize },
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("insufficient data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum SourceError {
    #[display("request to {provider} failed")]
    Request { provider: String },
    #[display("failed to parse response from {provider}")]
    ResponseParse { provider: String },
    #[display("no usable candles from {provider}")]
    NoData { provider: String },
}

#[derive(Debug, Display, Error)]
pub enum StorageError {
    #[display("failed to open dedup store")]
    Open,
    #[display("failed to read dedup state")]
    Read,
    #[display("failed to write dedup state")]
    Write,
}

#[derive(Debug, Display, Error)]
pub enum NotifyError {
    #[display("failed to deliver notification via {channel}")]
    Delivery { channel: String },
}

#[derive(Debug, Display, Error)]
pub enum EvaluationError {
    #[display("failed to fetch candles for {symbol} {timeframe}")]
    Fetch { symbol: String, timeframe: String },
    #[display("failed to compute indicators for {symbol} {timeframe}")]
    Indicators { symbol: String, timeframe: String },
}
