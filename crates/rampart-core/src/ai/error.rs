//! Provider transport error taxonomy.
//!
//! `AiError` is the error type every provider call site resolves to before
//! entering the retry executor, so classification happens in exactly one
//! place.

use std::time::Duration;

use crate::ai::retry::{is_retryable_status, IsRetryable};

/// Errors from calls to upstream providers.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// HTTP-level failure carrying a status code and an optional
    /// server-supplied Retry-After override.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Network-layer failure without a status (timeout, connection reset,
    /// broken pipe, unexpected end of stream).
    #[error("network error: {0}")]
    Network(String),

    /// The surrounding operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Anything else; never retried.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AiError {
    /// Build from a stringly upstream failure, recovering the HTTP status
    /// when the text carries one and falling back to network-layer
    /// classification for connection-shaped messages.
    pub fn from_upstream(message: impl Into<String>) -> Self {
        let message = message.into();
        if let Some(status) = extract_status_from_error(&message) {
            return AiError::Http {
                status,
                message,
                retry_after: None,
            };
        }
        let lower = message.to_lowercase();
        let network_shaped = ["timed out", "timeout", "connection", "broken pipe", "unexpected end"]
            .iter()
            .any(|pattern| lower.contains(pattern));
        if network_shaped {
            AiError::Network(message)
        } else {
            AiError::Other(anyhow::anyhow!(message))
        }
    }
}

impl IsRetryable for AiError {
    fn is_retryable(&self) -> bool {
        match self {
            AiError::Http { status, .. } => is_retryable_status(*status),
            AiError::Network(_) => true,
            AiError::Cancelled | AiError::Other(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            AiError::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Try to extract an HTTP status code from an error message.
pub fn extract_status_from_error(message: &str) -> Option<u16> {
    // Common patterns: "HTTP 429", "status: 429", "status code: 429"
    for pattern in &["HTTP ", "status: ", "status code: "] {
        if let Some(pos) = message.find(pattern) {
            let start = pos + pattern.len();
            let code_str: String = message[start..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(code) = code_str.parse() {
                return Some(code);
            }
        }
    }
    None
}
