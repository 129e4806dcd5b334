//! Seams between the render pipeline and the headless browser.

use async_trait::async_trait;
use std::time::Duration;

use crate::core::error::RenderError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

impl Viewport {
    /// Fixed viewport PDF pages are laid out in.
    pub const PDF: Viewport = Viewport {
        width: 1200,
        height: 800,
        device_scale_factor: 1.0,
    };
}

/// Paper, orientation and margins for a PDF capture. Lengths are in inches.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfCaptureOptions {
    pub paper_width: f64,
    pub paper_height: f64,
    pub landscape: bool,
    pub print_background: bool,
    pub margin_top: f64,
    pub margin_right: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCodec {
    Png,
    Jpeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCaptureOptions {
    pub codec: ImageCodec,
    /// Only honored by lossy codecs.
    pub quality: Option<u8>,
}

/// Process-wide browser capability.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Opens a page inside a fresh, isolated browsing context.
    async fn open_session(&self, viewport: Viewport) -> Result<Box<dyn PageSession>, RenderError>;

    fn is_ready(&self) -> bool {
        true
    }
}

/// One page inside its own browsing context.
#[async_trait]
pub trait PageSession: Send {
    async fn emulate_reduced_motion(&mut self) -> Result<(), RenderError>;

    /// Navigates and waits for the page to finish loading. `timeout` is a hint
    /// for the driver's own waits; the caller enforces the budget.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), RenderError>;

    async fn wait_for_fonts(&mut self) -> Result<(), RenderError>;

    async fn ready_flag(&mut self) -> Result<bool, RenderError>;

    /// Error message the page published while initializing, if any.
    async fn render_error(&mut self) -> Result<Option<String>, RenderError>;

    async fn capture_pdf(&mut self, options: &PdfCaptureOptions) -> Result<Vec<u8>, RenderError>;

    async fn capture_image(
        &mut self,
        options: &ImageCaptureOptions,
    ) -> Result<Vec<u8>, RenderError>;

    /// Releases the page and its browsing context. Must be safe to call twice.
    async fn close(&mut self);
}
