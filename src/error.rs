//! Error types for betabridge

use thiserror::Error;

/// Main error type for the betabridge library
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or inconsistent configuration (app identity, credentials)
    #[error("configuration error: {0}")]
    Config(String),

    /// Authentication failure (401/403) - aborts the whole operation, never retried
    #[error("authentication error ({status:?}): {message}")]
    Auth {
        status: Option<u16>,
        message: String,
    },

    /// Non-auth 4xx from a remote API - caller mistake, never retried
    #[error("client error ({status}): {message}")]
    Client { status: u16, message: String },

    /// Transient transport failure (429, 5xx, timeout, network) - retried with backoff
    #[error("transport error after {attempts} attempt(s) ({status:?}): {message}")]
    Transport {
        status: Option<u16>,
        message: String,
        attempts: usize,
    },

    /// All duplicate-search tiers exhausted - fail closed, issue creation must abort
    #[error("duplicate check failed after {attempts} attempt(s): {message}")]
    DuplicateCheck { message: String, attempts: usize },

    /// Screenshot download or asset upload failure (non-fatal at the image level)
    #[error("asset error: {0}")]
    Asset(String),

    /// Label resolution failure (non-fatal, issue still filed unlabeled)
    #[error("label resolution error: {0}")]
    LabelResolution(String),

    /// Tracker RPC or payload error
    #[error("tracker error: {0}")]
    Tracker(String),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is transient and worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    /// Record how many attempts were made before giving up.
    ///
    /// Only meaningful for variants that carry attempt counts; other
    /// variants pass through unchanged.
    pub fn after_attempts(self, total: usize) -> Self {
        match self {
            Error::Transport {
                status, message, ..
            } => Error::Transport {
                status,
                message,
                attempts: total,
            },
            Error::DuplicateCheck { message, .. } => Error::DuplicateCheck {
                message,
                attempts: total,
            },
            other => other,
        }
    }
}

/// Classify an HTTP status + error message into the error taxonomy.
///
/// 401/403 abort immediately, 429 and 5xx are retryable, other 4xx are
/// caller mistakes. Messages that smell like transient network trouble
/// are retryable regardless of status.
pub fn classify_status(status: u16, message: &str) -> Error {
    match status {
        401 | 403 => Error::Auth {
            status: Some(status),
            message: message.to_string(),
        },
        429 => Error::Transport {
            status: Some(status),
            message: message.to_string(),
            attempts: 1,
        },
        s if s >= 500 => Error::Transport {
            status: Some(status),
            message: message.to_string(),
            attempts: 1,
        },
        s if (400..500).contains(&s) => {
            if is_transient_message(message) {
                Error::Transport {
                    status: Some(status),
                    message: message.to_string(),
                    attempts: 1,
                }
            } else {
                Error::Client {
                    status,
                    message: message.to_string(),
                }
            }
        }
        _ => Error::Transport {
            status: Some(status),
            message: message.to_string(),
            attempts: 1,
        },
    }
}

/// Check whether an error message indicates a transient condition.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("timeout")
        || lower.contains("network")
        || lower.contains("temporarily unavailable")
        || lower.contains("service unavailable")
}

/// Result type alias for betabridge
pub type Result<T> = std::result::Result<T, Error>;
