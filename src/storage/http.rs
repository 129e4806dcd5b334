//! Client for a Supabase-compatible storage REST API.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{ObjectStorage, SignedUrl, StorageError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct HttpObjectStorage {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl HttpObjectStorage {
    pub fn new(
        base_url: &str,
        service_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.into(),
            bucket: bucket.into(),
        })
    }

    fn object_endpoint(&self, action: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object{}/{}/{}",
            self.base_url,
            action,
            self.bucket,
            path.trim_start_matches('/')
        )
    }

    async fn ensure_success(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Rejected {
            operation,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let response = self
            .client
            .post(self.object_endpoint("", path))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;
        Self::ensure_success("upload", response).await?;

        tracing::debug!("uploaded object {}/{}", self.bucket, path);
        Ok(path.to_string())
    }

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl, StorageError> {
        let requested_at = Utc::now();
        let response = self
            .client
            .post(self.object_endpoint("/sign", path))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&json!({ "expiresIn": ttl.as_secs() }))
            .send()
            .await?;
        let signed: SignResponse = Self::ensure_success("sign", response).await?.json().await?;

        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::InvalidResponse(format!("signed url ttl: {}", e)))?;

        Ok(SignedUrl {
            url: format!("{}/storage/v1{}", self.base_url, signed.signed_url),
            expires_at: requested_at + ttl,
        })
    }
}
