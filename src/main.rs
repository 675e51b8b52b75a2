use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use coin_signal::config::{self, AnalysisConfig, AppConfig};
use coin_signal::dedup::DedupStore;
use coin_signal::dedup::json_file::JsonFileStore;
use coin_signal::dedup::sqlite::SqliteStore;
use coin_signal::model::TimeFrame;
use coin_signal::notifier::Notifier;
use coin_signal::notifier::telegram::TelegramNotifier;
use coin_signal::notifier::terminal::TerminalNotifier;
use coin_signal::pipeline::{self, Outcome};
use coin_signal::source::{self, CandleSource, FallbackSource};

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("storage error")]
    Storage,
    #[display("source error")]
    Source,
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(name = "coin-signal", about = "Crypto technical-analysis signal bot")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll every watched pair and send signals until Ctrl+C
    Run,
    /// Evaluate one pair once and print the rendered signal
    Analyze {
        #[arg(short, long)]
        symbol: String,
        /// e.g. 15m, 1h, 4h
        #[arg(short, long)]
        timeframe: String,
        /// Print indicator readings and the signal as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Shared by every evaluation task.
struct Context {
    source: Arc<dyn CandleSource>,
    dedup: Arc<dyn DedupStore>,
    notifier: Arc<dyn Notifier>,
    analysis: AnalysisConfig,
    candle_limit: usize,
    notify_neutral: bool,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    let kinds = config.enabled_sources();
    if kinds.is_empty() {
        tracing::warn!("no sources enabled; nothing to do");
        return Ok(());
    }
    let source: Arc<dyn CandleSource> = Arc::new(FallbackSource::new(
        kinds.into_iter().map(source::build).collect(),
        config.fallback_min_len(),
    ));

    match cli.command {
        Command::Analyze {
            symbol,
            timeframe,
            json,
        } => analyze(&config, source, &symbol, &timeframe, json).await,
        Command::Run => serve(config, source).await,
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

async fn analyze(
    config: &AppConfig,
    source: Arc<dyn CandleSource>,
    symbol: &str,
    timeframe: &str,
    json: bool,
) -> Result<(), Report<AppError>> {
    let timeframe = TimeFrame::from_str(timeframe).ok_or_else(|| {
        Report::new(AppError::Config).attach(format!("unknown timeframe \"{timeframe}\""))
    })?;

    let evaluation = pipeline::evaluate(
        source.as_ref(),
        symbol,
        timeframe,
        config.general.candle_limit,
        &config.analysis,
    )
    .await
    .change_context(AppError::Source)?;

    if json {
        let out = evaluation.to_json().change_context(AppError::Runtime)?;
        println!("{out}");
    } else {
        println!("{}", evaluation.render());
    }
    Ok(())
}

async fn serve(config: AppConfig, source: Arc<dyn CandleSource>) -> Result<(), Report<AppError>> {
    // ── Dedup store ───────────────────────────────────────────────────────────
    let dedup_path = config.dedup.resolve_path(&config.general.data_dir);
    let dedup: Arc<dyn DedupStore> = match config.dedup.backend.as_str() {
        "sqlite" => Arc::new(
            SqliteStore::open(&dedup_path)
                .await
                .change_context(AppError::Storage)?,
        ),
        _ => Arc::new(
            JsonFileStore::open(&dedup_path)
                .await
                .change_context(AppError::Storage)?,
        ),
    };

    // ── Notifier ──────────────────────────────────────────────────────────────
    let notifier: Arc<dyn Notifier> = match &config.telegram {
        Some(telegram) => match telegram.token() {
            Some(token) => Arc::new(TelegramNotifier::new(token, telegram.chat_id.clone())),
            None => {
                tracing::warn!("telegram configured without a bot token; logging signals instead");
                Arc::new(TerminalNotifier)
            }
        },
        None => Arc::new(TerminalNotifier),
    };

    let pairs = config.watch_pairs();
    if pairs.is_empty() {
        tracing::warn!("no watch entries configured; nothing to do");
        return Ok(());
    }

    let ctx = Arc::new(Context {
        source,
        dedup,
        notifier,
        analysis: config.analysis.clone(),
        candle_limit: config.general.candle_limit,
        notify_neutral: config.general.notify_neutral,
    });

    info!(
        pairs = pairs.len(),
        interval_secs = config.general.poll_interval_secs,
        notifier = ctx.notifier.name(),
        "starting signal loop"
    );

    // ── Scheduler ─────────────────────────────────────────────────────────────
    let cancel = CancellationToken::new();
    let interval = Duration::from_secs(config.general.poll_interval_secs);
    let scheduler = tokio::spawn(schedule(Arc::clone(&ctx), pairs, interval, cancel.clone()));

    // ── Shutdown ──────────────────────────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .change_context(AppError::Runtime)?;

    info!("ctrl+c received, shutting down");
    cancel.cancel();

    let _ = tokio::time::timeout(Duration::from_secs(5), scheduler).await;

    info!("shutdown complete");
    Ok(())
}

async fn schedule(
    ctx: Arc<Context>,
    pairs: Vec<(String, TimeFrame)>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("scheduler cancelled");
                break;
            }
            _ = ticker.tick() => run_cycle(&ctx, &pairs).await,
        }
    }
}

/// Evaluate every pair concurrently, one task each.
async fn run_cycle(ctx: &Arc<Context>, pairs: &[(String, TimeFrame)]) {
    let handles: Vec<_> = pairs
        .iter()
        .cloned()
        .map(|(symbol, timeframe)| {
            let ctx = Arc::clone(ctx);
            tokio::spawn(async move { process_pair(&ctx, &symbol, timeframe).await })
        })
        .collect();

    let mut notified = 0;
    for handle in handles {
        match handle.await {
            Ok(Some(Outcome::Notified)) => notified += 1,
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "evaluation task panicked"),
        }
    }
    info!(pairs = pairs.len(), notified, "cycle complete");
}

async fn process_pair(ctx: &Context, symbol: &str, timeframe: TimeFrame) -> Option<Outcome> {
    let evaluation = match pipeline::evaluate(
        ctx.source.as_ref(),
        symbol,
        timeframe,
        ctx.candle_limit,
        &ctx.analysis,
    )
    .await
    {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(symbol, timeframe = %timeframe, error = ?e, "evaluation skipped");
            return None;
        }
    };

    Some(
        pipeline::dispatch(
            &evaluation,
            ctx.dedup.as_ref(),
            ctx.notifier.as_ref(),
            ctx.notify_neutral,
        )
        .await,
    )
}
