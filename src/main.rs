use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use nba_engine::adapters::{HttpGameDiscovery, HttpMarketClient};
use nba_engine::calibration;
use nba_engine::config::AppConfig;
use nba_engine::domain::job::{JobStatus, LegSide};
use nba_engine::domain::risk_snapshot::RiskLevel;
use nba_engine::error::{EngineError, Result};
use nba_engine::market_client::WalletClass;
use nba_engine::mode::ExecutionMode;
use nba_engine::notify::LoggingNotifier;
use nba_engine::scheduler::Scheduler;
use nba_engine::signing::{EoaWallet, ProxyWallet, WalletHandle};
use nba_engine::Store;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nba-engine", about = "Directional/hedge/merge trading engine for NBA prediction markets")]
struct Cli {
    /// Directory (or single file) holding default.toml / <ENGINE_ENV>.toml overlays.
    #[arg(long, env = "ENGINE_CONFIG_DIR", default_value = "config")]
    config: String,

    /// Path to the calibration artifact JSON.
    #[arg(long, env = "ENGINE_CALIBRATION_PATH", default_value = "calibration.json")]
    calibration: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scheduler tick: discovery, dispatch, order maintenance, merges, settlement.
    Tick {
        #[arg(long, default_value = "paper")]
        mode: String,
        /// Treat `now` as this date (YYYY-MM-DD, UTC midnight) instead of the real clock.
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        no_settle: bool,
    },
    /// Run a settlement-only pass against already-discovered games.
    Settle {
        #[arg(long)]
        date: Option<String>,
    },
    /// Read-only summary of open jobs and the current risk snapshot.
    Status,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config validation: {e}");
        }
        return Err(EngineError::Validation(format!("{} config error(s)", errors.len())));
    }

    let store = Arc::new(Store::new(&config.database.url, config.database.max_connections).await?);
    store.migrate().await?;

    match cli.command {
        Commands::Tick { mode, date, no_settle } => {
            let mode = ExecutionMode::from_str(&mode).map_err(EngineError::Validation)?;
            let now = resolve_now(date.as_deref())?;
            let artifact = calibration::load_once(&cli.calibration)?.clone();

            let wallet = load_wallet()?;
            let market = Arc::new(HttpMarketClient::new(config.market.rest_url.clone(), wallet.class()));
            let discovery = Arc::new(HttpGameDiscovery::new(config.market.rest_url.clone()));
            let notifier = Arc::new(LoggingNotifier);

            let mut scheduler =
                Scheduler::new(store, market, discovery, notifier, config, mode, artifact).await?;
            let summary = scheduler.tick(now, !no_settle).await?;

            info!(
                games = summary.games_discovered,
                dispatched = summary.jobs_dispatched,
                orders = summary.orders_placed,
                merges = summary.merges_executed,
                settled = summary.signals_settled,
                risk_level = ?summary.risk_level,
                "tick summary"
            );
        }
        Commands::Settle { date } => {
            let now = resolve_now(date.as_deref())?;
            let artifact = calibration::load_once(&cli.calibration)?.clone();
            let wallet = load_wallet()?;
            let market = Arc::new(HttpMarketClient::new(config.market.rest_url.clone(), wallet.class()));
            let discovery = Arc::new(HttpGameDiscovery::new(config.market.rest_url.clone()));
            let notifier = Arc::new(LoggingNotifier);

            let mut scheduler = Scheduler::new(
                store,
                market,
                discovery,
                notifier,
                config,
                ExecutionMode::DryRun,
                artifact,
            )
            .await?;
            let summary = scheduler.tick(now, true).await?;
            info!(settled = summary.signals_settled, "settle pass complete");
        }
        Commands::Status => {
            print_status(&store).await?;
        }
    }

    Ok(())
}

fn resolve_now(date: Option<&str>) -> Result<chrono::DateTime<Utc>> {
    match date {
        None => Ok(Utc::now()),
        Some(s) => {
            let naive = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| EngineError::Validation(format!("invalid --date {s}: {e}")))?;
            Ok(Utc.from_utc_datetime(&naive.and_hms_opt(0, 0, 0).expect("midnight is always valid")))
        }
    }
}

/// Loads the signing wallet from environment. A proxy address (`ENGINE_PROXY_ADDRESS`)
/// selects a 1-of-1 proxy wallet; otherwise the owner key signs directly as an EOA.
fn load_wallet() -> Result<WalletHandle> {
    match std::env::var("ENGINE_PROXY_ADDRESS") {
        Ok(addr) => {
            let proxy_address = addr
                .parse()
                .map_err(|e| EngineError::Wallet(format!("invalid ENGINE_PROXY_ADDRESS: {e}")))?;
            Ok(WalletHandle::Proxy(ProxyWallet::from_env("ENGINE_SIGNER_KEY", proxy_address)?))
        }
        Err(_) => Ok(WalletHandle::Eoa(EoaWallet::from_env("ENGINE_SIGNER_KEY")?)),
    }
}

async fn print_status(store: &Store) -> Result<()> {
    let statuses = [
        JobStatus::Pending,
        JobStatus::Executing,
        JobStatus::DcaActive,
        JobStatus::Executed,
        JobStatus::Failed,
    ];
    let jobs = store.list_dispatchable_jobs(&statuses).await?;
    println!("open jobs: {}", jobs.len());
    for job in &jobs {
        let side = match job.leg_side {
            LegSide::Directional => "directional",
            LegSide::Hedge => "hedge",
        };
        println!(
            "  [{}] {} {} status={:?} tipoff={}",
            job.id.unwrap_or(-1),
            job.event_slug,
            side,
            job.status,
            job.tipoff_utc
        );
    }

    match store.latest_risk_snapshot().await? {
        Some(snap) => {
            println!(
                "risk level: {:?} (sizing_multiplier={}, daily_pnl={}, weekly_pnl={})",
                snap.level, snap.sizing_multiplier, snap.daily_pnl, snap.weekly_pnl
            );
            if snap.level == RiskLevel::Red {
                warn!("risk level is RED: new entries are blocked until acknowledged");
            }
        }
        None => println!("risk level: no snapshot yet"),
    }
    Ok(())
}

/// Console + daily-rotating file logging, filtered by `RUST_LOG` (default
/// `info,nba_engine=debug,sqlx=warn`).
fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,nba_engine=debug,sqlx=warn"));

    let log_dir = std::env::var("ENGINE_LOG_DIR").unwrap_or_else(|_| "/var/log/nba-engine".to_string());

    let file_layer = if std::fs::create_dir_all(&log_dir).is_ok() {
        let test_path = std::path::Path::new(&log_dir).join(".write_test");
        match std::fs::OpenOptions::new().create(true).append(true).open(&test_path) {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);
                let file_appender = tracing_appender::rolling::daily(&log_dir, "engine.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                Box::leak(Box::new(guard));
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!("warning: could not write to log directory {log_dir} ({e}), file logging disabled");
                None
            }
        }
    } else {
        eprintln!("warning: could not create log directory {log_dir}, file logging disabled");
        None
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}
