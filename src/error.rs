//! Unified error types for the arbitrage engine.

use thiserror::Error;

/// Unified error type for the engine.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Market catalog error.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Risk admission error.
    #[error("risk error: {0}")]
    Risk(#[from] RiskError),

    /// Venue (exchange API) error.
    #[error("venue error: {0}")]
    Venue(#[from] VenueError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Market discovery and catalog refresh errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Failed to fetch the market listing.
    #[error("failed to fetch markets ({timeframe}): {reason}")]
    FetchFailed {
        /// Timeframe whose query failed.
        timeframe: String,
        /// Reason for failure.
        reason: String,
    },

    /// A market entry was missing its YES/NO token pair.
    #[error("market {id} has no resolvable yes/no token pair")]
    TokenPairMissing {
        /// Market condition id.
        id: String,
    },

    /// Failed to parse market data.
    #[error("failed to parse market data: {0}")]
    ParseError(String),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Admission check failures. These are expected outcomes, not faults.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskError {
    /// Process-wide trading halt is in effect.
    #[error("trading halted")]
    Halted,

    /// Another execution already holds this market's dedup slot.
    #[error("market already has an execution in flight or a held position")]
    DuplicateMarket,

    /// Computed size fell below the minimum share count.
    #[error("size below minimum shares")]
    BelowMinimumSize,

    /// Order-placement rate budget cannot cover the trade.
    #[error("insufficient rate budget for order placement")]
    RateBudgetExhausted,

    /// Top-of-book no longer covers the full size on both legs.
    #[error("insufficient top-of-book liquidity")]
    InsufficientLiquidity,
}

/// Errors surfaced by the venue HTTP API.
#[derive(Error, Debug)]
pub enum VenueError {
    /// Venue returned HTTP 429.
    #[error("rate limited by venue: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_seconds: u64,
    },

    /// Credentials rejected. Trips the trading halt.
    #[error("venue authentication failed: {0}")]
    Auth(String),

    /// Unexpected response shape.
    #[error("unexpected venue response: {0}")]
    BadResponse(String),

    /// Transport failure.
    #[error("venue request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// WebSocket connection and message errors.
#[derive(Error, Debug)]
pub enum WsError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Send failed.
    #[error("failed to send websocket message: {0}")]
    SendFailed(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
