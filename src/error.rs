//! Error types for carteira_rs
//!
//! The aggregation modules never fail on data shape. Errors only exist at the
//! edges: payload envelopes coming in from the API and arguments typed by the
//! user on the command line.

use thiserror::Error;

/// Failures while turning an API payload into typed data.
///
/// `Upstream` carries the server's message verbatim so it can be shown to the
/// user as-is.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Upstream(String),

    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Could not read payload: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload loader stopped before answering")]
    Disconnected,

    #[error("No payload request is in flight")]
    Idle,
}

/// Validation errors for user input on the command line.
///
/// These errors are shown directly to users and should be clear and actionable.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Unknown category '{0}' (expected one of: br, us, fii, cripto, fixa)")]
    UnknownCategory(String),

    #[error("Unknown metric '{0}' (expected invested or incomes)")]
    UnknownMetric(String),

    #[error("Invalid portfolio id: {0}")]
    InvalidPortfolioId(String),

    #[error("Unknown sort direction '{0}' (expected asc or desc)")]
    UnknownDirection(String),
}
