//! Crate-level error types.
//!
//! [`VolscanError`] unifies every error source (configuration, HTTP, JSON,
//! per-symbol screening) behind a single enum so callers can match on the
//! variant they care about while still using the `?` operator.
//!
//! [`ScreenError`] is the per-symbol taxonomy. It is cheap to clone because
//! the registry keeps the most recent one on each symbol entry.

use std::fmt;

use serde::Serialize;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VolscanError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum VolscanError {
    /// Configuration is missing, unreadable, or fails validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// An HTTP request to a market data provider failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A market data provider answered with a non-success status.
    #[error("http status {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        /// Leading excerpt of the response body.
        body: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem or runtime I/O failed, or a provider payload was unusable.
    #[error("io error: {0}")]
    Io(String),

    /// A single symbol could not be screened.
    #[error(transparent)]
    Screen(#[from] ScreenError),
}

/// Reason a single symbol could not be screened during a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScreenError {
    /// The gateway failed, timed out, or returned nothing usable.
    DataUnavailable { symbol: String, reason: String },
    /// Fewer closes than the band period.
    InsufficientHistory { required: usize, available: usize },
    /// The IV root-finder did not converge within its bounds.
    IvConvergenceFailure { iterations: usize, price_error: f64 },
    /// An option quote failed domain validation.
    InvalidQuote { reason: String },
}

impl ScreenError {
    pub fn data_unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_quote(reason: impl Into<String>) -> Self {
        Self::InvalidQuote {
            reason: reason.into(),
        }
    }

    /// Short stable label, used in log fields and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataUnavailable { .. } => "data_unavailable",
            Self::InsufficientHistory { .. } => "insufficient_history",
            Self::IvConvergenceFailure { .. } => "iv_convergence_failure",
            Self::InvalidQuote { .. } => "invalid_quote",
        }
    }
}

impl fmt::Display for ScreenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataUnavailable { symbol, reason } => {
                write!(f, "{symbol}: market data unavailable: {reason}")
            }
            Self::InsufficientHistory {
                required,
                available,
            } => {
                write!(
                    f,
                    "insufficient price history: need {required} closes, have {available}"
                )
            }
            Self::IvConvergenceFailure {
                iterations,
                price_error,
            } => {
                write!(
                    f,
                    "implied volatility did not converge after {iterations} iterations (price error {price_error:.6})"
                )
            }
            Self::InvalidQuote { reason } => write!(f, "invalid option quote: {reason}"),
        }
    }
}

impl std::error::Error for ScreenError {}
