use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

pub mod http;

pub use http::HttpObjectStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend is not configured")]
    NotConfigured,

    #[error("storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("storage rejected {operation} with status {status}: {body}")]
    Rejected {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("unexpected storage response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Object storage that can hand out time-limited download links.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores `bytes` under `path` and returns the stored path.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl, StorageError>;
}
