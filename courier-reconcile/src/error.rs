//! Error types for the reconciliation engine.
//!
//! Query failures and store failures are recovered inside a pass by the
//! retry loop; these types exist so the places that do surface errors
//! (construction, bootstrap, the HTTP client internals) can say precisely
//! what went wrong.

use courier_store::StoreError;
use thiserror::Error;

/// Top-level engine error type.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The record store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A status query failed.
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// The engine was configured with values it cannot run with.
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// Why a status query produced no usable answer.
///
/// The status client reports every one of these to the engine as an absent
/// result; they are kept distinct for logging.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The request could not be sent or the response could not be read.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success HTTP status.
    #[error("Endpoint returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The response body was not a recognisable status payload.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The endpoint answered with an explicit failure signal.
    #[error("Query rejected by provider: {0}")]
    Rejected(String),

    /// The request exceeded the per-call timeout.
    #[error("Query timed out")]
    Timeout,
}

impl QueryError {
    /// Whether the failure came from the network rather than the provider
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout)
    }
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
