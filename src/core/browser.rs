use anyhow::anyhow;
use async_trait::async_trait;
use headless_chrome::protocol::cdp::{Emulation, Page, Target};
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions, Tab};
use parking_lot::Mutex;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::RenderError;
use crate::core::session::{
    BrowserDriver, ImageCaptureOptions, ImageCodec, PageSession, PdfCaptureOptions, Viewport,
};

const READY_FLAG_SCRIPT: &str = "window.renderReady === true";
const RENDER_ERROR_SCRIPT: &str = "window.renderError";
const FONTS_READY_SCRIPT: &str = "document.fonts.ready.then(() => true)";

/// headless_chrome drops the connection after this much inactivity.
const BROWSER_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);
/// Waits inside the tab outlive the pipeline's own timeout, so the pipeline
/// reports the timeout rather than the driver.
const TAB_TIMEOUT_MARGIN: Duration = Duration::from_secs(1);

/// Process-wide Chrome handle with an explicit init/shutdown lifecycle.
#[derive(Clone)]
pub struct ChromeBrowser {
    browser: Arc<Mutex<Option<Browser>>>,
    launch_options: LaunchOptions<'static>,
}

impl ChromeBrowser {
    pub fn new(chrome_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .path(chrome_path)
            .idle_browser_timeout(BROWSER_IDLE_TIMEOUT)
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-setuid-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-software-rasterizer"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-background-networking"),
                OsStr::new("--disable-sync"),
                OsStr::new("--metrics-recording-only"),
                OsStr::new("--mute-audio"),
                OsStr::new("--no-first-run"),
                OsStr::new("--disable-default-apps"),
                OsStr::new("--font-render-hinting=none"),
            ])
            .build()
            .map_err(|_| anyhow!("Could not find Chrome/Chromium binary"))?;

        Ok(Self {
            browser: Arc::new(Mutex::new(None)),
            launch_options,
        })
    }

    /// Launches Chrome. Calling it again while running is a no-op.
    pub fn init(&self) -> anyhow::Result<()> {
        let mut browser_lock = self.browser.lock();
        if browser_lock.is_some() {
            tracing::debug!("Browser already initialized");
            return Ok(());
        }

        let browser = Browser::new(self.launch_options.clone())?;
        tracing::info!("Browser launched");
        *browser_lock = Some(browser);
        Ok(())
    }

    /// Closes Chrome. Rendering afterwards fails until `init` is called again.
    pub fn shutdown(&self) {
        if let Some(browser) = self.browser.lock().take() {
            drop(browser);
            tracing::info!("Browser shut down");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.browser.lock().is_some()
    }

    fn live_browser(&self) -> Result<Browser, RenderError> {
        let mut browser_lock = self.browser.lock();

        let Some(browser) = browser_lock.as_ref() else {
            return Err(RenderError::BrowserNotInitialized);
        };
        if browser.get_version().is_ok() {
            return Ok(browser.clone());
        }

        tracing::warn!("Browser health check failed, relaunching");
        let relaunched = Browser::new(self.launch_options.clone())
            .map_err(|e| RenderError::render_failed("browser relaunch", e))?;
        *browser_lock = Some(relaunched.clone());
        Ok(relaunched)
    }

    fn open_session_sync(&self, viewport: Viewport) -> Result<ChromeSession, RenderError> {
        let browser = self.live_browser()?;
        // Browser-level CDP calls go through a tab of the default context.
        let control_tab = browser
            .wait_for_initial_tab()
            .map_err(|e| RenderError::render_failed("find control tab", e))?;
        let context = browser
            .new_context()
            .map_err(|e| RenderError::render_failed("create browser context", e))?;
        let context_id = context.get_id().to_string();

        let tab = match context.new_tab() {
            Ok(tab) => tab,
            Err(e) => {
                dispose_context(&control_tab, &context_id);
                return Err(RenderError::render_failed("open tab", e));
            }
        };
        // From here on the session's Drop releases tab and context.
        let session = ChromeSession {
            control_tab,
            tab,
            context_id,
            closed: false,
        };

        session
            .tab
            .call_method(Emulation::SetDeviceMetricsOverride {
                width: viewport.width,
                height: viewport.height,
                device_scale_factor: viewport.device_scale_factor,
                mobile: false,
                scale: None,
                screen_width: Some(viewport.width),
                screen_height: Some(viewport.height),
                position_x: Some(0),
                position_y: Some(0),
                dont_set_visible_size: None,
                screen_orientation: None,
                viewport: None,
                display_feature: None,
                device_posture: None,
            })
            .map_err(|e| RenderError::render_failed("set viewport", e))?;

        Ok(session)
    }
}

#[async_trait]
impl BrowserDriver for ChromeBrowser {
    async fn open_session(&self, viewport: Viewport) -> Result<Box<dyn PageSession>, RenderError> {
        let engine = self.clone();
        let session = tokio::task::spawn_blocking(move || engine.open_session_sync(viewport))
            .await
            .map_err(|e| RenderError::render_failed("open session", e))??;
        Ok(Box::new(session))
    }

    fn is_ready(&self) -> bool {
        self.is_initialized()
    }
}

/// A tab inside its own browser context.
struct ChromeSession {
    control_tab: Arc<Tab>,
    tab: Arc<Tab>,
    context_id: String,
    closed: bool,
}

/// Runs a blocking tab call off the async runtime.
async fn on_tab<T, F>(tab: Arc<Tab>, stage: &'static str, f: F) -> Result<T, RenderError>
where
    F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&tab))
        .await
        .map_err(|e| RenderError::render_failed(stage, e))?
        .map_err(|e| RenderError::render_failed(stage, e))
}

#[async_trait]
impl PageSession for ChromeSession {
    async fn emulate_reduced_motion(&mut self) -> Result<(), RenderError> {
        on_tab(self.tab.clone(), "emulate reduced motion", |tab| {
            tab.call_method(Emulation::SetEmulatedMedia {
                media: None,
                features: Some(vec![Emulation::MediaFeature {
                    name: "prefers-reduced-motion".to_string(),
                    value: "reduce".to_string(),
                }]),
            })?;
            Ok(())
        })
        .await
    }

    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), RenderError> {
        let url = url.to_string();
        on_tab(self.tab.clone(), "navigate", move |tab| {
            tab.set_default_timeout(timeout + TAB_TIMEOUT_MARGIN);
            // Waits for the load event; headless_chrome has no network-idle wait,
            // late requests are covered by the page's ready flag.
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn wait_for_fonts(&mut self) -> Result<(), RenderError> {
        on_tab(self.tab.clone(), "wait for fonts", |tab| {
            tab.evaluate(FONTS_READY_SCRIPT, true)?;
            Ok(())
        })
        .await
    }

    async fn ready_flag(&mut self) -> Result<bool, RenderError> {
        on_tab(self.tab.clone(), "poll ready flag", |tab| {
            Ok(tab
                .evaluate(READY_FLAG_SCRIPT, false)?
                .value
                .and_then(|v| v.as_bool())
                .unwrap_or(false))
        })
        .await
    }

    async fn render_error(&mut self) -> Result<Option<String>, RenderError> {
        on_tab(self.tab.clone(), "poll render error", |tab| {
            Ok(tab
                .evaluate(RENDER_ERROR_SCRIPT, false)?
                .value
                .and_then(|v| v.as_str().map(String::from)))
        })
        .await
    }

    async fn capture_pdf(&mut self, options: &PdfCaptureOptions) -> Result<Vec<u8>, RenderError> {
        let options = PrintToPdfOptions {
            landscape: Some(options.landscape),
            print_background: Some(options.print_background),
            paper_width: Some(options.paper_width),
            paper_height: Some(options.paper_height),
            margin_top: Some(options.margin_top),
            margin_right: Some(options.margin_right),
            margin_bottom: Some(options.margin_bottom),
            margin_left: Some(options.margin_left),
            ..Default::default()
        };
        on_tab(self.tab.clone(), "capture pdf", move |tab| tab.print_to_pdf(Some(options)))
            .await
    }

    async fn capture_image(
        &mut self,
        options: &ImageCaptureOptions,
    ) -> Result<Vec<u8>, RenderError> {
        let (format, quality) = match options.codec {
            ImageCodec::Png => (Page::CaptureScreenshotFormatOption::Png, None),
            ImageCodec::Jpeg => (
                Page::CaptureScreenshotFormatOption::Jpeg,
                options.quality.map(u32::from),
            ),
        };
        on_tab(self.tab.clone(), "capture image", move |tab| {
            tab.capture_screenshot(format, quality, None, true)
        })
        .await
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let control_tab = self.control_tab.clone();
        let tab = self.tab.clone();
        let context_id = self.context_id.clone();
        let released =
            tokio::task::spawn_blocking(move || release(&control_tab, &tab, &context_id)).await;
        if let Err(e) = released {
            tracing::warn!("Failed to release browser context: {}", e);
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // Cancelled or panicked mid-pipeline: release without blocking the runtime.
        let control_tab = self.control_tab.clone();
        let tab = self.tab.clone();
        let context_id = std::mem::take(&mut self.context_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || release(&control_tab, &tab, &context_id));
            }
            Err(_) => release(&control_tab, &tab, &context_id),
        }
    }
}

fn release(control_tab: &Tab, tab: &Tab, context_id: &str) {
    if let Err(e) = tab.close(true) {
        tracing::warn!("Failed to close tab during cleanup: {}", e);
    } else {
        tracing::debug!("Tab closed successfully");
    }
    dispose_context(control_tab, context_id);
}

/// Disposing the context also closes any tab still open inside it.
fn dispose_context(control_tab: &Tab, context_id: &str) {
    let disposed = control_tab.call_method(Target::DisposeBrowserContext {
        browser_context_id: context_id.to_string(),
    });
    if let Err(e) = disposed {
        tracing::warn!("Failed to dispose browser context {}: {}", context_id, e);
    }
}
