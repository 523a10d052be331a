//! Error types for DLMM Sentinel

use thiserror::Error;

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Upstream HTTP failure after retries were exhausted
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Validation error (bad wallet format, over cap, unknown toggle)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Event payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// WebSocket feed error
    #[error("Feed error: {0}")]
    Feed(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error from an upstream HTTP provider.
///
/// Carries the last observed status code when the failure was an HTTP-level
/// rejection, and the underlying cause when it was a transport problem.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("{provider} returned status {status}")]
    Status { provider: &'static str, status: u16 },

    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} request timed out after {attempts} attempts")]
    Timeout { provider: &'static str, attempts: u32 },

    #[error("{provider} returned an unparseable body: {detail}")]
    Parse { provider: &'static str, detail: String },
}

impl UpstreamError {
    /// Status code of the last failed attempt, if the failure was HTTP-level.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            UpstreamError::Status { provider, .. }
            | UpstreamError::Transport { provider, .. }
            | UpstreamError::Timeout { provider, .. }
            | UpstreamError::Parse { provider, .. } => provider,
        }
    }
}

/// Enumerated rejection reasons for command-API input. No state changes on
/// rejection; the front end renders these verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandReject {
    InvalidAddress,
    WalletCapReached,
    WatchlistCapReached,
    PortfolioCapReached,
    AlreadyPresent,
    NotPresent,
    UnknownToggle,
    InvalidHour,
    InvalidThreshold,
    UnknownSubscriber,
}

impl std::fmt::Display for CommandReject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommandReject::InvalidAddress => "invalid_address",
            CommandReject::WalletCapReached => "wallet_cap_reached",
            CommandReject::WatchlistCapReached => "watchlist_cap_reached",
            CommandReject::PortfolioCapReached => "portfolio_cap_reached",
            CommandReject::AlreadyPresent => "already_present",
            CommandReject::NotPresent => "not_present",
            CommandReject::UnknownToggle => "unknown_toggle",
            CommandReject::InvalidHour => "invalid_hour",
            CommandReject::InvalidThreshold => "invalid_threshold",
            CommandReject::UnknownSubscriber => "unknown_subscriber",
        };
        f.write_str(s)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
