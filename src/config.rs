use std::collections::HashSet;
use std::path::{Path, PathBuf};

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::bundle::required_warmup;
use crate::error::ConfigError;
use crate::model::{SourceKind, TimeFrame};

const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_candle_limit() -> usize {
    200
}

fn default_min_candles() -> usize {
    50
}

fn default_dedup_backend() -> String {
    "json".into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub watch: Vec<WatchConfig>,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub dedup: DedupConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Candles requested per fetch.
    #[serde(default = "default_candle_limit")]
    pub candle_limit: usize,
    /// A source answering with fewer valid candles falls through to the next one.
    #[serde(default = "default_min_candles")]
    pub min_candles: usize,
    #[serde(default)]
    pub notify_neutral: bool,
}

/// One candle provider; providers are tried in the order listed.
#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct WatchConfig {
    pub symbol: String,
    pub timeframes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramConfig {
    /// Falls back to the `TELEGRAM_BOT_TOKEN` environment variable.
    pub bot_token: Option<String>,
    pub chat_id: String,
}

impl TelegramConfig {
    pub fn token(&self) -> Option<String> {
        self.bot_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(TELEGRAM_TOKEN_ENV).ok())
    }
}

#[derive(Debug, Deserialize)]
pub struct DedupConfig {
    /// Accepted values: `"json"` | `"sqlite"`
    #[serde(default = "default_dedup_backend")]
    pub backend: String,
    /// Defaults to a file inside `general.data_dir`.
    pub path: Option<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            backend: default_dedup_backend(),
            path: None,
        }
    }
}

impl DedupConfig {
    pub fn resolve_path(&self, data_dir: &str) -> PathBuf {
        match &self.path {
            Some(p) => PathBuf::from(p),
            None if self.backend == "sqlite" => Path::new(data_dir).join("dedup.db"),
            None => Path::new(data_dir).join("last_signals.json"),
        }
    }
}

/// Indicator periods and scoring thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub rsi_period: usize,
    /// RSI above this scores +1.
    pub rsi_bullish: f64,
    /// RSI below this scores -1.
    pub rsi_bearish: f64,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub atr_period: usize,
    /// Stop and first target sit this many ATRs from the close.
    pub atr_risk_mult: f64,
    pub score_threshold: i32,
    pub max_strength: u32,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_mult: f64,
    pub supertrend_period: usize,
    pub supertrend_mult: f64,
    pub obv_lookback: usize,
    pub volatility_period: usize,
    pub divergence_window: usize,
    pub money_flow_period: usize,
    pub mfi_period: usize,
    pub volume_period: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_bullish: 55.0,
            rsi_bearish: 45.0,
            ema_fast: 20,
            ema_slow: 50,
            atr_period: 14,
            atr_risk_mult: 1.5,
            score_threshold: 3,
            max_strength: 5,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_mult: 2.0,
            supertrend_period: 10,
            supertrend_mult: 3.0,
            obv_lookback: 5,
            volatility_period: 20,
            divergence_window: 5,
            money_flow_period: 20,
            mfi_period: 14,
            volume_period: 20,
        }
    }
}

impl AppConfig {
    /// Enabled sources in fallback order.
    pub fn enabled_sources(&self) -> Vec<SourceKind> {
        self.sources
            .iter()
            .filter(|s| s.enabled)
            .filter_map(|s| SourceKind::from_str(&s.name))
            .collect()
    }

    /// Fewest valid candles a source must return before the fallback chain
    /// stops: `general.min_candles`, raised to the indicator warmup.
    pub fn fallback_min_len(&self) -> usize {
        self.general.min_candles.max(required_warmup(&self.analysis))
    }

    /// Every (symbol, timeframe) pair to evaluate.
    pub fn watch_pairs(&self) -> Vec<(String, TimeFrame)> {
        self.watch
            .iter()
            .flat_map(|w| {
                w.timeframes
                    .iter()
                    .filter_map(|tf| TimeFrame::from_str(tf).map(|t| (w.symbol.clone(), t)))
            })
            .collect()
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];
const VALID_DEDUP_BACKENDS: &[&str] = &["json", "sqlite"];

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(config)?;
    validate_sources(config)?;
    validate_timeframes(config)?;
    validate_watch_unique(config)?;
    validate_analysis(&config.analysis)?;
    validate_warmup(config)?;
    validate_dedup(config)?;
    Ok(())
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let general = &config.general;
    if !VALID_LOG_FORMATS.contains(&general.log_format.as_str()) {
        return Err(invalid(format!(
            "general.log_format \"{}\" is not valid",
            general.log_format
        )));
    }
    if general.poll_interval_secs == 0 {
        return Err(invalid("general.poll_interval_secs must be > 0".into()));
    }
    if general.min_candles == 0 || general.candle_limit < general.min_candles {
        return Err(invalid(
            "general.candle_limit must be >= general.min_candles > 0".into(),
        ));
    }
    Ok(())
}

fn validate_sources(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let mut seen = HashSet::new();
    for source in &config.sources {
        if SourceKind::from_str(&source.name).is_none() {
            return Err(invalid(format!(
                "sources.name \"{}\" is not a known source",
                source.name
            )));
        }
        if !seen.insert(source.name.as_str()) {
            return Err(invalid(format!("sources: duplicate name \"{}\"", source.name)));
        }
    }
    Ok(())
}

fn validate_timeframes(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    for watch in &config.watch {
        if watch.timeframes.is_empty() {
            return Err(invalid(format!(
                "watch[symbol={}].timeframes is empty",
                watch.symbol
            )));
        }
        for tf in &watch.timeframes {
            if TimeFrame::from_str(tf).is_none() {
                return Err(invalid(format!(
                    "watch[symbol={}].timeframes: unknown timeframe \"{}\"",
                    watch.symbol, tf
                )));
            }
        }
    }
    Ok(())
}

fn validate_watch_unique(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let mut seen = HashSet::new();
    for watch in &config.watch {
        for tf in &watch.timeframes {
            if !seen.insert((watch.symbol.as_str(), tf.as_str())) {
                return Err(invalid(format!(
                    "watch: duplicate entry {}:{}",
                    watch.symbol, tf
                )));
            }
        }
    }
    Ok(())
}

fn validate_analysis(analysis: &AnalysisConfig) -> Result<(), Report<ConfigError>> {
    let periods = [
        ("rsi_period", analysis.rsi_period),
        ("ema_fast", analysis.ema_fast),
        ("ema_slow", analysis.ema_slow),
        ("atr_period", analysis.atr_period),
        ("macd_fast", analysis.macd_fast),
        ("macd_slow", analysis.macd_slow),
        ("macd_signal", analysis.macd_signal),
        ("bollinger_period", analysis.bollinger_period),
        ("supertrend_period", analysis.supertrend_period),
        ("obv_lookback", analysis.obv_lookback),
        ("volatility_period", analysis.volatility_period),
        ("money_flow_period", analysis.money_flow_period),
        ("mfi_period", analysis.mfi_period),
        ("volume_period", analysis.volume_period),
    ];
    if let Some((name, _)) = periods.iter().find(|(_, p)| *p == 0) {
        return Err(invalid(format!("analysis.{name} must be > 0")));
    }
    if analysis.rsi_period < 2 {
        return Err(invalid("analysis.rsi_period must be >= 2".into()));
    }
    if analysis.divergence_window < 2 {
        return Err(invalid("analysis.divergence_window must be >= 2".into()));
    }
    if analysis.ema_fast >= analysis.ema_slow {
        return Err(invalid("analysis.ema_fast must be < analysis.ema_slow".into()));
    }
    if analysis.macd_fast >= analysis.macd_slow {
        return Err(invalid("analysis.macd_fast must be < analysis.macd_slow".into()));
    }
    if !(0.0..=100.0).contains(&analysis.rsi_bearish)
        || !(0.0..=100.0).contains(&analysis.rsi_bullish)
        || analysis.rsi_bearish > analysis.rsi_bullish
    {
        return Err(invalid(
            "analysis.rsi_bearish <= analysis.rsi_bullish, both within [0, 100]".into(),
        ));
    }
    if analysis.score_threshold <= 0 {
        return Err(invalid("analysis.score_threshold must be > 0".into()));
    }
    let multipliers = [
        ("atr_risk_mult", analysis.atr_risk_mult),
        ("bollinger_mult", analysis.bollinger_mult),
        ("supertrend_mult", analysis.supertrend_mult),
    ];
    if let Some((name, _)) = multipliers
        .iter()
        .find(|(_, m)| !m.is_finite() || *m <= 0.0)
    {
        return Err(invalid(format!("analysis.{name} must be > 0")));
    }
    Ok(())
}

fn validate_warmup(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let warmup = required_warmup(&config.analysis);
    if config.general.candle_limit < warmup {
        return Err(invalid(format!(
            "general.candle_limit {} is below the {warmup} candles the analysis periods need",
            config.general.candle_limit
        )));
    }
    Ok(())
}

fn validate_dedup(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_DEDUP_BACKENDS.contains(&config.dedup.backend.as_str()) {
        return Err(invalid(format!(
            "dedup.backend \"{}\" is not valid",
            config.dedup.backend
        )));
    }
    Ok(())
}
