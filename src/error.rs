use thiserror::Error;

/// Top-level error type for the trading engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    #[error("Invalid market data: {0}")]
    InvalidMarketData(String),

    #[error("Game not found: {0}")]
    GameNotFound(String),

    #[error("Quote unavailable for token: {token_id}")]
    QuoteUnavailable { token_id: String },

    #[error("Stale data: {0}")]
    StaleData(String),

    // Order lifecycle
    #[error("Order submission failed: {0}")]
    OrderSubmission(String),

    #[error("Order timeout: {0}")]
    OrderTimeout(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    // Job state machine
    #[error("Invalid job transition: from {from} to {to}")]
    InvalidJobTransition { from: String, to: String },

    #[error("Unexpected job state: {0}")]
    UnexpectedState(String),

    // Data consistency
    #[error("Data inconsistency: {0}")]
    DataInconsistency(String),

    // Risk management
    #[error("Risk limit exceeded: {0}")]
    RiskLimitExceeded(String),

    #[error("Circuit breaker active: {0}")]
    CircuitBreakerTriggered(String),

    #[error("Daily loss limit reached: {0}")]
    DailyLossLimit(String),

    #[error("Preflight check failed: {0}")]
    PreflightRejected(String),

    // Engine ran in degraded mode because a dependency was unavailable;
    // callers decide whether this should still count as tick success.
    #[error("Degraded mode: {0}")]
    DegradedMode(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Signature error: {0}")]
    Signature(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors specific to order placement/cancellation/repricing.
#[derive(Error, Debug, Clone)]
pub enum OrderError {
    #[error("Order not found: {order_id}")]
    NotFound { order_id: String },

    #[error("Order already filled")]
    AlreadyFilled,

    #[error("Order already cancelled")]
    AlreadyCancelled,

    #[error("Partial fill: requested {requested}, filled {filled}")]
    PartialFill { requested: u64, filled: u64 },

    #[error("Price slippage exceeded: limit {limit}, actual {actual}")]
    SlippageExceeded {
        limit: rust_decimal::Decimal,
        actual: rust_decimal::Decimal,
    },

    #[error("Timeout after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Max replaces exceeded: {attempts}")]
    MaxReplacesExceeded { attempts: u8 },
}

/// Errors specific to the risk engine's veto checks.
#[derive(Error, Debug, Clone)]
pub enum RiskError {
    #[error("Max exposure exceeded: limit ${limit}, requested ${requested}")]
    MaxExposureExceeded {
        limit: rust_decimal::Decimal,
        requested: rust_decimal::Decimal,
    },

    #[error("Daily loss limit: current ${current}, limit ${limit}")]
    DailyLossLimit {
        current: rust_decimal::Decimal,
        limit: rust_decimal::Decimal,
    },

    #[error("Weekly loss limit: current ${current}, limit ${limit}")]
    WeeklyLossLimit {
        current: rust_decimal::Decimal,
        limit: rust_decimal::Decimal,
    },

    #[error("Drawdown limit: current {current}%, limit {limit}%")]
    DrawdownLimit {
        current: rust_decimal::Decimal,
        limit: rust_decimal::Decimal,
    },

    #[error("Spread too wide: {spread_pct} > {max_pct}")]
    SpreadTooWide {
        spread_pct: rust_decimal::Decimal,
        max_pct: rust_decimal::Decimal,
    },

    #[error("Trading halted at level {level}: {reason}")]
    TradingHalted { level: String, reason: String },
}

impl From<OrderError> for EngineError {
    fn from(err: OrderError) -> Self {
        EngineError::OrderSubmission(err.to_string())
    }
}

impl From<RiskError> for EngineError {
    fn from(err: RiskError) -> Self {
        EngineError::RiskLimitExceeded(err.to_string())
    }
}
