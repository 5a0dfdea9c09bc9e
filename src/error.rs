//! Error taxonomy for table operations
//!
//! - `Network`: the request could not complete (offline, timeout, refused).
//! - `Application`: the request completed but the server reported failure
//!   (`success: false` or a non-2xx status).
//! - `Validation`: a client-side check failed before any request was sent.

use crate::validate::ValidationErrors;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TableError {
    #[error("network error: {0}")]
    Network(String),

    #[error("{message}")]
    Application {
        status: Option<u16>,
        message: String,
    },

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TableError {
    pub fn application(message: impl Into<String>) -> Self {
        TableError::Application {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, TableError::Network(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, TableError::Validation(_))
    }

    /// The backend rejected the session (401/403)
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            TableError::Application {
                status: Some(401 | 403),
                ..
            }
        )
    }

    /// Whether offering a retry makes sense for this failure
    pub fn is_retryable(&self) -> bool {
        match self {
            TableError::Network(_) => true,
            TableError::Application { status, .. } => status.map(|s| s >= 500).unwrap_or(false),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TableError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TableError::Network(format!("request timed out: {}", e))
        } else {
            TableError::Network(e.to_string())
        }
    }
}

impl From<ValidationErrors> for TableError {
    fn from(e: ValidationErrors) -> Self {
        TableError::Validation(e)
    }
}
