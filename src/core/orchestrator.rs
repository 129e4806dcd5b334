//! Request-scoped coordination of one render job.
//!
//! ```text
//! pending ──▶ rendering ──▶ uploading ──▶ completed
//!    │            │  └──────────────────────▲ (no upload)
//!    └────────────┴─────────┴──▶ failed
//! ```
//!
//! The job is registered on admission and deregistered when its [`JobGuard`]
//! drops, whichever way the pipeline ends.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::core::admission::AdmissionGate;
use crate::core::error::RenderError;
use crate::core::registry::{JobGuard, JobKind, JobRegistry, JobStatus, RenderJob};
use crate::core::renderer::{RenderEngine, RenderResult};
use crate::core::request::{OutputFormat, RenderRequest};
use crate::storage::{ObjectStorage, StorageError};

pub const DEFAULT_SIGNED_URL_TTL: Duration = Duration::from_secs(60 * 60);

/// How the rendered bytes reach the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Signed {
        url: String,
        expires_at: DateTime<Utc>,
    },
    Inline {
        data_url: String,
    },
}

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub job_id: Uuid,
    pub delivery: Delivery,
    pub filename: String,
    pub file_size: u64,
    pub render_time_ms: u64,
    pub format: OutputFormat,
    pub page_count: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug)]
pub struct RenderFailure {
    /// Absent when the request never became a job (admission rejected).
    pub job_id: Option<Uuid>,
    pub error: RenderError,
}

pub struct RenderOrchestrator {
    registry: JobRegistry,
    gate: AdmissionGate,
    engine: RenderEngine,
    storage: Option<Arc<dyn ObjectStorage>>,
    signed_url_ttl: Duration,
}

impl RenderOrchestrator {
    pub fn new(
        registry: JobRegistry,
        gate: AdmissionGate,
        engine: RenderEngine,
        storage: Option<Arc<dyn ObjectStorage>>,
        signed_url_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            gate,
            engine,
            storage,
            signed_url_ttl,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn engine(&self) -> &RenderEngine {
        &self.engine
    }

    pub async fn render_pdf(&self, body: &JsonValue) -> Result<RenderOutcome, RenderFailure> {
        self.run(JobKind::Pdf, body).await
    }

    pub async fn render_image(&self, body: &JsonValue) -> Result<RenderOutcome, RenderFailure> {
        self.run(JobKind::Image, body).await
    }

    async fn run(&self, kind: JobKind, body: &JsonValue) -> Result<RenderOutcome, RenderFailure> {
        let target = body
            .get("url")
            .and_then(JsonValue::as_str)
            .and_then(|url| url.split('?').next())
            .unwrap_or_default();
        let job = RenderJob::new(kind, target);

        let guard = match self.gate.admit(&self.registry, job) {
            Ok(guard) => guard,
            Err(error) => {
                tracing::warn!(kind = %kind, "render rejected: {}", error);
                return Err(RenderFailure {
                    job_id: None,
                    error,
                });
            }
        };
        let job_id = guard.id();
        tracing::info!(job_id = %job_id, kind = %kind, "render job started: {}", target);

        let result = self.execute(&guard, kind, body).await;
        match &result {
            Ok(outcome) => {
                guard.set_status(JobStatus::Completed);
                tracing::info!(
                    job_id = %job_id,
                    kind = %kind,
                    "render job completed: {} ({} bytes, {}ms)",
                    outcome.filename,
                    outcome.file_size,
                    outcome.render_time_ms
                );
            }
            Err(error) => {
                guard.set_status(JobStatus::Failed);
                tracing::error!(
                    job_id = %job_id,
                    kind = %kind,
                    code = error.code().as_str(),
                    "render job failed: {}",
                    error
                );
            }
        }
        drop(guard);

        result.map_err(|error| RenderFailure {
            job_id: Some(job_id),
            error,
        })
    }

    async fn execute(
        &self,
        guard: &JobGuard,
        kind: JobKind,
        body: &JsonValue,
    ) -> Result<RenderOutcome, RenderError> {
        let request = RenderRequest::parse(kind, body)?;

        guard.set_status(JobStatus::Rendering);
        let rendered = self.engine.render(&request, guard.id()).await?;

        let delivery = request.delivery();
        let filename = derive_filename(
            delivery.filename.as_deref(),
            rendered.format.extension(),
            Utc::now(),
        );
        let file_size = rendered.bytes.len() as u64;

        let RenderResult {
            bytes,
            duration,
            format,
            page_count,
            width,
            height,
        } = rendered;

        let delivery = if delivery.upload_to_storage {
            guard.set_status(JobStatus::Uploading);
            let prefix = delivery
                .storage_path
                .as_deref()
                .unwrap_or_else(|| default_storage_prefix(kind));
            let object_path = format!("{}/{}", prefix, filename);
            self.upload(bytes, &object_path, format).await?
        } else {
            Delivery::Inline {
                data_url: encode_data_url(format.content_type(), &bytes),
            }
        };

        Ok(RenderOutcome {
            job_id: guard.id(),
            delivery,
            filename,
            file_size,
            render_time_ms: duration.as_millis() as u64,
            format,
            page_count,
            width,
            height,
        })
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        object_path: &str,
        format: OutputFormat,
    ) -> Result<Delivery, RenderError> {
        let storage = self.storage.as_ref().ok_or(StorageError::NotConfigured)?;

        let stored = storage
            .upload(bytes, object_path, format.content_type())
            .await?;
        let signed = storage
            .create_signed_url(&stored, self.signed_url_ttl)
            .await?;

        Ok(Delivery::Signed {
            url: signed.url,
            expires_at: signed.expires_at,
        })
    }
}

fn default_storage_prefix(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Pdf => "pdf",
        JobKind::Image => "images",
    }
}

/// Caller's filename with the extension ensured, or one derived from `now`.
pub fn derive_filename(requested: Option<&str>, extension: &str, now: DateTime<Utc>) -> String {
    let suffix = format!(".{}", extension);
    match requested {
        Some(name) if name.to_ascii_lowercase().ends_with(&suffix) => name.to_string(),
        Some(name) => format!("{}{}", name, suffix),
        None => {
            let stamp = now
                .to_rfc3339_opts(SecondsFormat::Millis, true)
                .replace([':', '.'], "-");
            format!("render-{}{}", stamp, suffix)
        }
    }
}

pub fn encode_data_url(content_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        content_type,
        general_purpose::STANDARD.encode(bytes)
    )
}
