#![allow(dead_code)]

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use page_renderer::core::error::RenderError;
use page_renderer::core::session::{
    BrowserDriver, ImageCaptureOptions, PageSession, PdfCaptureOptions, Viewport,
};
use page_renderer::settings::Config;
use page_renderer::storage::{ObjectStorage, SignedUrl, StorageError};
use page_renderer::{AppState, init_openapi_route};
use parking_lot::Mutex;
use poem::test::TestClient;
use serde_json::Value;
use tokio::sync::Semaphore;

pub const API_KEY: &str = "test-render-key";

pub const FAKE_PDF: &[u8] = b"%PDF-1.4\n1 0 obj << /Type /Pages /Count 1 >> endobj\n\
2 0 obj << /Type /Page /Parent 1 0 R >> endobj\n%%EOF";
pub const FAKE_IMAGE: &[u8] = b"\x89PNG\r\n\x1a\nfake-image";

/// Counters and knobs shared by a fake driver and every page it opens.
pub struct FakeBrowser {
    pub ready: AtomicBool,
    pub sets_ready_flag: AtomicBool,
    pub page_error: Mutex<Option<String>>,
    /// When set, navigation waits for a permit before completing.
    pub navigation_gate: Option<Arc<Semaphore>>,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub viewports: Mutex<Vec<Viewport>>,
    pub urls: Mutex<Vec<String>>,
    pub pdf_options: Mutex<Vec<PdfCaptureOptions>>,
    pub image_options: Mutex<Vec<ImageCaptureOptions>>,
}

/// Browser stand-in.
#[derive(Clone)]
pub struct FakeDriver(Arc<FakeBrowser>);

impl Deref for FakeDriver {
    type Target = FakeBrowser;

    fn deref(&self) -> &FakeBrowser {
        &self.0
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Navigation blocks until the returned semaphore receives permits.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (Self::build(Some(gate.clone())), gate)
    }

    fn build(navigation_gate: Option<Arc<Semaphore>>) -> Self {
        Self(Arc::new(FakeBrowser {
            ready: AtomicBool::new(true),
            sets_ready_flag: AtomicBool::new(true),
            page_error: Mutex::new(None),
            navigation_gate,
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            viewports: Mutex::new(Vec::new()),
            urls: Mutex::new(Vec::new()),
            pdf_options: Mutex::new(Vec::new()),
            image_options: Mutex::new(Vec::new()),
        }))
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Yields until `count` sessions have been opened.
    pub async fn wait_for_opened(&self, count: usize) {
        for _ in 0..500 {
            if self.opened() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} open sessions, saw {}", count, self.opened());
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn open_session(&self, viewport: Viewport) -> Result<Box<dyn PageSession>, RenderError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(RenderError::BrowserNotInitialized);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.viewports.lock().push(viewport);
        Ok(Box::new(FakePage {
            browser: self.0.clone(),
            closed: false,
        }))
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

struct FakePage {
    browser: Arc<FakeBrowser>,
    closed: bool,
}

#[async_trait]
impl PageSession for FakePage {
    async fn emulate_reduced_motion(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), RenderError> {
        self.browser.urls.lock().push(url.to_string());
        if let Some(gate) = &self.browser.navigation_gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| RenderError::RenderFailed(e.to_string()))?;
        }
        Ok(())
    }

    async fn wait_for_fonts(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    async fn ready_flag(&mut self) -> Result<bool, RenderError> {
        Ok(self.browser.sets_ready_flag.load(Ordering::SeqCst))
    }

    async fn render_error(&mut self) -> Result<Option<String>, RenderError> {
        Ok(self.browser.page_error.lock().clone())
    }

    async fn capture_pdf(&mut self, options: &PdfCaptureOptions) -> Result<Vec<u8>, RenderError> {
        self.browser.pdf_options.lock().push(options.clone());
        Ok(FAKE_PDF.to_vec())
    }

    async fn capture_image(
        &mut self,
        options: &ImageCaptureOptions,
    ) -> Result<Vec<u8>, RenderError> {
        self.browser.image_options.lock().push(*options);
        Ok(FAKE_IMAGE.to_vec())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.browser.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Storage stand-in that records uploads and can be told to fail.
#[derive(Default)]
pub struct FakeStorage {
    pub fail_uploads: AtomicBool,
    pub uploads: Mutex<Vec<(String, String, usize)>>,
}

impl FakeStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let storage = Self::default();
        storage.fail_uploads.store(true, Ordering::SeqCst);
        Arc::new(storage)
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("bucket unavailable".to_string()));
        }
        self.uploads
            .lock()
            .push((path.to_string(), content_type.to_string(), bytes.len()));
        Ok(path.to_string())
    }

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl, StorageError> {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(SignedUrl {
            url: format!("https://storage.test/signed/{}?token=abc", path),
            expires_at,
        })
    }
}

pub fn test_config() -> Config {
    Config {
        render_api_key: API_KEY.to_string(),
        app_base_url: "https://app.test".to_string(),
        ..Config::default()
    }
}

pub fn build_state(
    config: Config,
    driver: &FakeDriver,
    storage: Option<Arc<FakeStorage>>,
) -> Arc<AppState> {
    let storage = storage.map(|storage| storage as Arc<dyn ObjectStorage>);
    Arc::new(AppState::new(config, Arc::new(driver.clone()), storage).unwrap())
}

pub fn client(state: Arc<AppState>) -> TestClient<impl poem::Endpoint> {
    let config = state.config.clone();
    TestClient::new(init_openapi_route(state, &config))
}

pub async fn post_render(
    cli: &TestClient<impl poem::Endpoint>,
    path: &str,
    body: &Value,
) -> (u16, Value) {
    let resp = cli
        .post(path)
        .header("X-API-Key", API_KEY)
        .content_type("application/json")
        .body_json(body)
        .send()
        .await;
    let status = resp.0.status().as_u16();
    let text = resp.0.into_body().into_string().await.unwrap();
    (status, serde_json::from_str(&text).unwrap())
}
