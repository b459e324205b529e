use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration structure for the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub market: MarketConfig,
    pub sizing: SizingConfig,
    pub dca: DcaConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub database: DatabaseConfig,
    pub dry_run: DryRunConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub health_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Base REST URL of the prediction-market exchange.
    pub rest_url: String,
    /// Chain id the exchange settles on.
    pub chain_id: u64,
    /// Lookahead window for game discovery, in hours.
    #[serde(default = "default_schedule_window_hours")]
    pub schedule_window_hours: u64,
}

fn default_schedule_window_hours() -> u64 {
    8
}

#[derive(Debug, Clone, Deserialize)]
pub struct SizingConfig {
    /// Fractional Kelly constant applied to the full-Kelly fraction.
    #[serde(default = "default_fractional_kelly")]
    pub fractional_kelly: Decimal,
    /// Hard cap on a single order's notional, in USD.
    #[serde(default = "default_max_position_usd")]
    pub max_position_usd: Decimal,
    /// Fraction of bankroll risked per game.
    #[serde(default = "default_capital_risk_pct")]
    pub capital_risk_pct: Decimal,
    /// Fraction of ask-side depth within 5c of best-ask usable for sizing.
    #[serde(default = "default_liquidity_fill_pct")]
    pub liquidity_fill_pct: Decimal,
    /// Reject if bid/ask spread as a fraction of best-ask exceeds this.
    #[serde(default = "default_max_spread_pct")]
    pub max_spread_pct: Decimal,
    /// Confidence level for the calibration curve's Bayesian lower bound.
    #[serde(default = "default_calibration_confidence_level")]
    pub calibration_confidence_level: Decimal,
    /// Minimum order size below which an order is not placed.
    #[serde(default = "default_min_order_usd")]
    pub min_order_usd: Decimal,
    /// Per-entry cap multiplier for the target-holding DCA sizer.
    #[serde(default = "default_cap_mult")]
    pub cap_mult: Decimal,
}

fn default_fractional_kelly() -> Decimal {
    Decimal::new(25, 2) // 0.25
}
fn default_max_position_usd() -> Decimal {
    Decimal::new(100, 0)
}
fn default_capital_risk_pct() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_liquidity_fill_pct() -> Decimal {
    Decimal::new(10, 2) // 0.10
}
fn default_max_spread_pct() -> Decimal {
    Decimal::new(10, 2) // 0.10
}
fn default_calibration_confidence_level() -> Decimal {
    Decimal::new(90, 2) // 0.90
}
fn default_min_order_usd() -> Decimal {
    Decimal::new(1, 0)
}
fn default_cap_mult() -> Decimal {
    Decimal::new(2, 0)
}

#[derive(Debug, Clone, Deserialize)]
pub struct DcaConfig {
    #[serde(default = "default_dca_max_entries")]
    pub dca_max_entries: u32,
    #[serde(default = "default_dca_min_interval_min")]
    pub dca_min_interval_min: u64,
    #[serde(default = "default_dca_max_price_spread")]
    pub dca_max_price_spread: Decimal,
    #[serde(default = "default_min_price_dip_pct")]
    pub min_price_dip_pct: Decimal,
    #[serde(default = "default_bothside_enabled")]
    pub bothside_enabled: bool,
    #[serde(default = "default_merge_enabled")]
    pub merge_enabled: bool,
    #[serde(default = "default_hedge_delay_min")]
    pub hedge_delay_min: u64,
}

fn default_dca_max_entries() -> u32 {
    5
}
fn default_dca_min_interval_min() -> u64 {
    30
}
fn default_dca_max_price_spread() -> Decimal {
    Decimal::new(15, 2) // 0.15
}
fn default_min_price_dip_pct() -> Decimal {
    Decimal::new(3, 2) // 0.03, modest favorable-price trigger
}
fn default_bothside_enabled() -> bool {
    true
}
fn default_merge_enabled() -> bool {
    true
}
fn default_hedge_delay_min() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_daily_loss_limit_pct")]
    pub daily_loss_limit_pct: Decimal,
    #[serde(default = "default_weekly_loss_limit_pct")]
    pub weekly_loss_limit_pct: Decimal,
    #[serde(default = "default_max_drawdown_limit_pct")]
    pub max_drawdown_limit_pct: Decimal,
    #[serde(default = "default_drift_threshold_sigma")]
    pub drift_threshold_sigma: Decimal,
    /// Bankroll used to compute loss/drawdown limits in USD terms.
    pub bankroll_usd: Decimal,
    /// Max per-game USD exposure across all open signals of that game.
    #[serde(default = "default_max_position_usd")]
    pub max_game_exposure_usd: Decimal,
    /// Max total USD exposure across all open jobs in one tick.
    #[serde(default = "default_max_total_exposure_usd")]
    pub max_total_exposure_usd: Decimal,
    /// Max number of orders placed in a single tick.
    #[serde(default = "default_max_orders_per_tick")]
    pub max_orders_per_tick: u32,
    /// Max daily position count (new directional entries).
    #[serde(default = "default_max_daily_positions")]
    pub max_daily_positions: u32,
}

fn default_daily_loss_limit_pct() -> Decimal {
    Decimal::new(3, 0) // 3%
}
fn default_weekly_loss_limit_pct() -> Decimal {
    Decimal::new(5, 0) // 5%
}
fn default_max_drawdown_limit_pct() -> Decimal {
    Decimal::new(15, 0) // 15%
}
fn default_drift_threshold_sigma() -> Decimal {
    Decimal::new(2, 0)
}
fn default_max_total_exposure_usd() -> Decimal {
    Decimal::new(1000, 0)
}
fn default_max_orders_per_tick() -> u32 {
    3
}
fn default_max_daily_positions() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_order_ttl_min")]
    pub order_ttl_min: u64,
    #[serde(default = "default_order_max_replaces")]
    pub order_max_replaces: u32,
    #[serde(default = "default_check_batch_size")]
    pub check_batch_size: u32,
    #[serde(default = "default_rate_limit_sleep_ms")]
    pub rate_limit_sleep_ms: u64,
    #[serde(default = "default_schedule_max_retries")]
    pub schedule_max_retries: u32,
    #[serde(default = "default_est_gas_usd")]
    pub est_gas_usd: Decimal,
    #[serde(default = "default_min_profit_usd")]
    pub min_profit_usd: Decimal,
    #[serde(default = "default_min_shares_floor")]
    pub min_shares_floor: Decimal,
    #[serde(default = "default_heartbeat_path")]
    pub heartbeat_path: String,
    #[serde(default = "default_lock_dir")]
    pub lock_dir: String,
}

fn default_order_ttl_min() -> u64 {
    5
}
fn default_order_max_replaces() -> u32 {
    3
}
fn default_check_batch_size() -> u32 {
    10
}
fn default_rate_limit_sleep_ms() -> u64 {
    500
}
fn default_schedule_max_retries() -> u32 {
    3
}
fn default_est_gas_usd() -> Decimal {
    Decimal::new(5, 1) // $0.50
}
fn default_min_profit_usd() -> Decimal {
    Decimal::new(2, 0) // $2
}
fn default_min_shares_floor() -> Decimal {
    Decimal::new(1, 0)
}
fn default_heartbeat_path() -> String {
    "/tmp/engine-heartbeat".to_string()
}
fn default_lock_dir() -> String {
    "/tmp/engine.lock".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct DryRunConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load from either a config directory or a single TOML file.
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_path = config_dir.as_ref();

        let mut builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            .set_default("market.schedule_window_hours", 8)?
            .set_default("sizing.fractional_kelly", "0.25")?
            .set_default("sizing.max_position_usd", "100")?
            .set_default("sizing.capital_risk_pct", "0.02")?
            .set_default("sizing.liquidity_fill_pct", "0.10")?
            .set_default("sizing.max_spread_pct", "0.10")?
            .set_default("sizing.calibration_confidence_level", "0.90")?
            .set_default("sizing.min_order_usd", "1")?
            .set_default("sizing.cap_mult", "2")?
            .set_default("dca.dca_max_entries", 5)?
            .set_default("dca.dca_min_interval_min", 30)?
            .set_default("dca.dca_max_price_spread", "0.15")?
            .set_default("dca.min_price_dip_pct", "0.03")?
            .set_default("dca.bothside_enabled", true)?
            .set_default("dca.merge_enabled", true)?
            .set_default("dca.hedge_delay_min", 5)?
            .set_default("risk.daily_loss_limit_pct", "3")?
            .set_default("risk.weekly_loss_limit_pct", "5")?
            .set_default("risk.max_drawdown_limit_pct", "15")?
            .set_default("risk.drift_threshold_sigma", "2")?
            .set_default("risk.max_game_exposure_usd", "100")?
            .set_default("risk.max_total_exposure_usd", "1000")?
            .set_default("risk.max_orders_per_tick", 3)?
            .set_default("risk.max_daily_positions", 10)?
            .set_default("execution.order_ttl_min", 5)?
            .set_default("execution.order_max_replaces", 3)?
            .set_default("execution.check_batch_size", 10)?
            .set_default("execution.rate_limit_sleep_ms", 500)?
            .set_default("execution.schedule_max_retries", 3)?
            .set_default("execution.est_gas_usd", "0.5")?
            .set_default("execution.min_profit_usd", "2")?
            .set_default("execution.min_shares_floor", "1")?
            .set_default("execution.heartbeat_path", "/tmp/engine-heartbeat")?
            .set_default("execution.lock_dir", "/tmp/engine.lock")?;

        if config_path.is_file() {
            builder = builder.add_source(File::from(config_path).required(true));
        } else {
            builder = builder
                .add_source(File::from(config_path.join("default.toml")).required(false))
                .add_source(
                    File::from(config_path.join(
                        std::env::var("ENGINE_ENV").unwrap_or_else(|_| "development".to_string()),
                    ))
                    .required(false),
                );
        }

        builder = builder.add_source(
            Environment::with_prefix("ENGINE")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .try_parsing(true),
        );

        let mut cfg: Self = builder.build()?.try_deserialize()?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Construct a default configuration suitable for dry-run CLI usage.
    pub fn default_config(dry_run: bool) -> Self {
        use rust_decimal_macros::dec;

        Self {
            market: MarketConfig {
                rest_url: "https://clob.polymarket.com".to_string(),
                chain_id: 137,
                schedule_window_hours: 8,
            },
            sizing: SizingConfig {
                fractional_kelly: dec!(0.25),
                max_position_usd: dec!(100),
                capital_risk_pct: dec!(0.02),
                liquidity_fill_pct: dec!(0.10),
                max_spread_pct: dec!(0.10),
                calibration_confidence_level: dec!(0.90),
                min_order_usd: dec!(1),
                cap_mult: dec!(2),
            },
            dca: DcaConfig {
                dca_max_entries: 5,
                dca_min_interval_min: 30,
                dca_max_price_spread: dec!(0.15),
                min_price_dip_pct: dec!(0.03),
                bothside_enabled: true,
                merge_enabled: true,
                hedge_delay_min: 5,
            },
            risk: RiskConfig {
                daily_loss_limit_pct: dec!(3),
                weekly_loss_limit_pct: dec!(5),
                max_drawdown_limit_pct: dec!(15),
                drift_threshold_sigma: dec!(2),
                bankroll_usd: dec!(5000),
                max_game_exposure_usd: dec!(100),
                max_total_exposure_usd: dec!(1000),
                max_orders_per_tick: 3,
                max_daily_positions: 10,
            },
            execution: ExecutionConfig {
                order_ttl_min: 5,
                order_max_replaces: 3,
                check_batch_size: 10,
                rate_limit_sleep_ms: 500,
                schedule_max_retries: 3,
                est_gas_usd: dec!(0.5),
                min_profit_usd: dec!(2),
                min_shares_floor: dec!(1),
                heartbeat_path: default_heartbeat_path(),
                lock_dir: default_lock_dir(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/engine".to_string(),
                max_connections: 5,
            },
            dry_run: DryRunConfig { enabled: dry_run },
            logging: LoggingConfig::default(),
            health_port: Some(8080),
        }
    }

    /// Validate configuration values. Returns the list of problems (empty = valid).
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.sizing.fractional_kelly <= Decimal::ZERO || self.sizing.fractional_kelly > Decimal::ONE
        {
            errors.push("sizing.fractional_kelly must be in (0, 1]".to_string());
        }
        if self.sizing.max_position_usd <= Decimal::ZERO {
            errors.push("sizing.max_position_usd must be positive".to_string());
        }
        if self.sizing.capital_risk_pct <= Decimal::ZERO || self.sizing.capital_risk_pct > Decimal::ONE
        {
            errors.push("sizing.capital_risk_pct must be in (0, 1]".to_string());
        }
        if self.sizing.calibration_confidence_level <= Decimal::ZERO
            || self.sizing.calibration_confidence_level >= Decimal::ONE
        {
            errors.push("sizing.calibration_confidence_level must be in (0, 1)".to_string());
        }
        if self.dca.dca_max_entries == 0 {
            errors.push("dca.dca_max_entries must be > 0".to_string());
        }
        if self.risk.daily_loss_limit_pct >= self.risk.weekly_loss_limit_pct {
            errors.push(
                "risk.daily_loss_limit_pct should be less than risk.weekly_loss_limit_pct"
                    .to_string(),
            );
        }
        if self.risk.bankroll_usd <= Decimal::ZERO {
            errors.push("risk.bankroll_usd must be positive".to_string());
        }
        if self.execution.order_ttl_min == 0 {
            errors.push("execution.order_ttl_min must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_bool(&["ENGINE_DRY_RUN__ENABLED"]) {
            self.dry_run.enabled = v;
        }
        if let Some(v) = env_string(&["ENGINE_DATABASE__URL", "DATABASE_URL"]) {
            self.database.url = v;
        }
        if let Some(v) = env_u16(&["ENGINE_HEALTH_PORT"]) {
            self.health_port = Some(v);
        }
        if let Some(v) = env_string(&["ENGINE_DATABASE__MAX_CONNECTIONS"])
            .and_then(|raw| raw.parse::<u32>().ok())
        {
            self.database.max_connections = v;
        }
    }
}

fn env_string(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(v) = std::env::var(key) {
            return Some(v);
        }
    }
    None
}

fn env_u16(keys: &[&str]) -> Option<u16> {
    env_string(keys).and_then(|v| v.parse::<u16>().ok())
}

fn env_bool(keys: &[&str]) -> Option<bool> {
    env_string(keys).and_then(|v| parse_bool_like(&v))
}

fn parse_bool_like(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = AppConfig::default_config(true);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn bad_fractional_kelly_is_rejected() {
        let mut cfg = AppConfig::default_config(true);
        cfg.sizing.fractional_kelly = Decimal::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_bool_like_accepts_common_spellings() {
        assert_eq!(parse_bool_like("yes"), Some(true));
        assert_eq!(parse_bool_like("off"), Some(false));
        assert_eq!(parse_bool_like("maybe"), None);
    }
}
