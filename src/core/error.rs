use poem::http::StatusCode;
use thiserror::Error;

use crate::schemas::common::ValidateItem;
use crate::storage::StorageError;

/// Stable, client-facing error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationFailed,
    Unauthorized,
    Forbidden,
    ConcurrencyLimit,
    ReadyFlagTimeout,
    NavigationTimeout,
    StorageFailed,
    RenderFailed,
    InternalError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 9] = [
        ErrorCode::ValidationFailed,
        ErrorCode::Unauthorized,
        ErrorCode::Forbidden,
        ErrorCode::ConcurrencyLimit,
        ErrorCode::ReadyFlagTimeout,
        ErrorCode::NavigationTimeout,
        ErrorCode::StorageFailed,
        ErrorCode::RenderFailed,
        ErrorCode::InternalError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::ConcurrencyLimit => "CONCURRENCY_LIMIT",
            ErrorCode::ReadyFlagTimeout => "READY_FLAG_TIMEOUT",
            ErrorCode::NavigationTimeout => "NAVIGATION_TIMEOUT",
            ErrorCode::StorageFailed => "STORAGE_FAILED",
            ErrorCode::RenderFailed => "RENDER_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::ConcurrencyLimit => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::ReadyFlagTimeout | ErrorCode::NavigationTimeout => {
                StatusCode::REQUEST_TIMEOUT
            }
            ErrorCode::StorageFailed | ErrorCode::RenderFailed | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("request validation failed with {} violation(s)", .0.len())]
    ValidationFailed(Vec<ValidateItem>),

    #[error("missing API key")]
    Unauthorized,

    #[error("invalid API key")]
    Forbidden,

    #[error("too many concurrent render jobs ({active}/{max}), retry later")]
    ConcurrencyLimit { active: usize, max: usize },

    #[error("page did not set its ready flag within {timeout_ms}ms")]
    ReadyFlagTimeout { timeout_ms: u64 },

    #[error("navigation did not finish within {timeout_ms}ms")]
    NavigationTimeout { timeout_ms: u64 },

    #[error("storage operation failed: {0}")]
    StorageFailed(#[from] StorageError),

    #[error("render failed: {0}")]
    RenderFailed(String),

    #[error("browser has not been initialized")]
    BrowserNotInitialized,

    #[error("internal error: {0}")]
    Internal(String),
}

impl RenderError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RenderError::ValidationFailed(_) => ErrorCode::ValidationFailed,
            RenderError::Unauthorized => ErrorCode::Unauthorized,
            RenderError::Forbidden => ErrorCode::Forbidden,
            RenderError::ConcurrencyLimit { .. } => ErrorCode::ConcurrencyLimit,
            RenderError::ReadyFlagTimeout { .. } => ErrorCode::ReadyFlagTimeout,
            RenderError::NavigationTimeout { .. } => ErrorCode::NavigationTimeout,
            RenderError::StorageFailed(_) => ErrorCode::StorageFailed,
            RenderError::RenderFailed(_) | RenderError::BrowserNotInitialized => {
                ErrorCode::RenderFailed
            }
            RenderError::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn render_failed(stage: &str, err: impl std::fmt::Display) -> Self {
        RenderError::RenderFailed(format!("{}: {}", stage, err))
    }
}
