use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time;
use url::Url;
use uuid::Uuid;

use crate::core::error::RenderError;
use crate::core::readiness::ReadinessDetector;
use crate::core::request::{OutputFormat, RenderRequest, RenderTarget};
use crate::core::session::{BrowserDriver, PageSession};
use crate::schemas::common::UnprocessableEntityResponse;

pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Query parameter the rendered application reads its auth token from.
const TOKEN_QUERY_PARAM: &str = "token";

/// Raw capture plus what the caller needs to describe it.
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub bytes: Vec<u8>,
    pub duration: Duration,
    pub format: OutputFormat,
    pub page_count: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Drives one page session through navigate, wait-for-ready and capture.
#[derive(Clone)]
pub struct RenderEngine {
    driver: Arc<dyn BrowserDriver>,
    readiness: ReadinessDetector,
    base_url: Url,
    navigation_timeout: Duration,
}

impl RenderEngine {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        readiness: ReadinessDetector,
        base_url: Url,
        navigation_timeout: Duration,
    ) -> Self {
        Self {
            driver,
            readiness,
            base_url,
            navigation_timeout,
        }
    }

    pub fn driver(&self) -> &Arc<dyn BrowserDriver> {
        &self.driver
    }

    pub async fn render(
        &self,
        request: &RenderRequest,
        job_id: Uuid,
    ) -> Result<RenderResult, RenderError> {
        let started = Instant::now();
        let target = self.resolve_target(request.target())?;

        let mut session = self.driver.open_session(request.viewport()).await?;
        let captured = self.run_pipeline(session.as_mut(), request, &target).await;
        session.close().await;
        let bytes = captured?;

        let duration = started.elapsed();
        tracing::debug!(
            job_id = %job_id,
            "captured {} bytes in {}ms",
            bytes.len(),
            duration.as_millis()
        );

        let (page_count, width, height) = match request {
            RenderRequest::Pdf(_) => (Some(count_pdf_pages(&bytes)), None, None),
            RenderRequest::Image(image) => (None, Some(image.width), Some(image.height)),
        };

        Ok(RenderResult {
            bytes,
            duration,
            format: request.output_format(),
            page_count,
            width,
            height,
        })
    }

    async fn run_pipeline(
        &self,
        session: &mut dyn PageSession,
        request: &RenderRequest,
        target: &Url,
    ) -> Result<Vec<u8>, RenderError> {
        if let RenderRequest::Image(_) = request {
            session.emulate_reduced_motion().await?;
        }

        let navigation = session.navigate(target.as_str(), self.navigation_timeout);
        match time::timeout(self.navigation_timeout, navigation).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RenderError::NavigationTimeout {
                    timeout_ms: self.navigation_timeout.as_millis() as u64,
                });
            }
        }

        self.readiness.wait_until_ready(session).await?;

        match request {
            RenderRequest::Pdf(pdf) => session.capture_pdf(&pdf.capture_options()).await,
            RenderRequest::Image(image) => session.capture_image(&image.capture_options()).await,
        }
    }

    pub fn resolve_target(&self, target: &RenderTarget) -> Result<Url, RenderError> {
        let mut url = self
            .base_url
            .join(&target.path)
            .map_err(|e| RenderError::Internal(format!("invalid render target: {}", e)))?;

        // The token is only ever sent to the application origin.
        if url.origin() != self.base_url.origin() {
            let mut errors = UnprocessableEntityResponse::new();
            errors.add_error(
                vec!["body".to_string(), "url".to_string()],
                "must resolve to the application host".to_string(),
            );
            return Err(RenderError::ValidationFailed(errors.into_detail()));
        }

        if let Some(token) = &target.token {
            url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
        }
        Ok(url)
    }
}

/// Counts page objects (`/Type /Page`, not `/Pages`) in a PDF body.
pub fn count_pdf_pages(bytes: &[u8]) -> u32 {
    const MARKER: &[u8] = b"/Type";
    let mut count = 0;
    let mut i = 0;

    while i + MARKER.len() <= bytes.len() {
        if &bytes[i..i + MARKER.len()] != MARKER {
            i += 1;
            continue;
        }
        let mut j = i + MARKER.len();
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if bytes[j..].starts_with(b"/Page") && !bytes[j + 5..].starts_with(b"s") {
            count += 1;
        }
        i = j;
    }
    count
}
