//! User-visible notifications raised by table operations

use crate::error::TableError;
use crate::record::RecordId;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// What a notice's retry button re-runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Retry {
    Reload,
    Get { id: RecordId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub retry: Option<Retry>,
    pub dismissible: bool,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Success,
            message: message.into(),
            retry: None,
            dismissible: true,
        }
    }

    /// Notice for a failed read: keeps prior data, offers a retry
    pub fn read_failed(context: &str, error: &TableError, retry: Retry) -> Self {
        Notice {
            level: NoticeLevel::Error,
            message: format!("{}: {}", context, error),
            retry: Some(retry),
            dismissible: true,
        }
    }

    /// Notice for a failed write: the form stays open for correction
    pub fn write_failed(context: &str, error: &TableError) -> Self {
        Notice {
            level: NoticeLevel::Error,
            message: format!("{}: {}", context, error),
            retry: None,
            dismissible: true,
        }
    }
}
