//! Typed render requests, built from raw JSON bodies.
//!
//! Parsing never stops at the first problem: every violation is recorded with
//! its location so the caller can fix the whole request in one round trip.

use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::core::error::RenderError;
use crate::core::registry::JobKind;
use crate::core::session::{ImageCaptureOptions, ImageCodec, PdfCaptureOptions, Viewport};
use crate::schemas::common::UnprocessableEntityResponse;

const MAX_TARGET_LEN: usize = 2048;
const MAX_FILENAME_LEN: usize = 255;
const DEFAULT_MARGIN: &str = "10mm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperSize {
    A4,
    Letter,
    Legal,
}

impl PaperSize {
    /// Width and height in inches, portrait.
    pub fn dimensions(&self) -> (f64, f64) {
        match self {
            PaperSize::A4 => (8.27, 11.69),
            PaperSize::Letter => (8.5, 11.0),
            PaperSize::Legal => (8.5, 14.0),
        }
    }
}

impl FromStr for PaperSize {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A4" => Ok(PaperSize::A4),
            "Letter" => Ok(PaperSize::Letter),
            "Legal" => Ok(PaperSize::Legal),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl FromStr for Orientation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl FromStr for ImageFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "png" => Ok(ImageFormat::Png),
            "jpeg" => Ok(ImageFormat::Jpeg),
            "webp" => Ok(ImageFormat::Webp),
            _ => Err(()),
        }
    }
}

/// Format of the bytes handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pdf,
    Png,
    Jpeg,
    Webp,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            other => other.as_str(),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Webp => "image/webp",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A CSS length accepted for PDF margins.
#[derive(Debug, Clone, PartialEq)]
pub struct Margin(String);

impl Margin {
    pub fn parse(raw: &str) -> Option<Self> {
        Self::inches_of(raw).map(|_| Margin(raw.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_inches(&self) -> f64 {
        Self::inches_of(&self.0).unwrap_or(0.0)
    }

    fn inches_of(raw: &str) -> Option<f64> {
        let raw = raw.trim();
        if raw == "0" {
            return Some(0.0);
        }
        let split = raw.len().checked_sub(2)?;
        if !raw.is_char_boundary(split) {
            return None;
        }
        let (number, unit) = raw.split_at(split);
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return None;
        }
        let value: f64 = number.parse().ok()?;
        let inches = match unit {
            "in" => value,
            "cm" => value / 2.54,
            "mm" => value / 25.4,
            "px" => value / 96.0,
            _ => return None,
        };
        Some(inches)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Margins {
    pub top: Margin,
    pub right: Margin,
    pub bottom: Margin,
    pub left: Margin,
}

impl Default for Margins {
    fn default() -> Self {
        let margin = Margin(DEFAULT_MARGIN.to_string());
        Self {
            top: margin.clone(),
            right: margin.clone(),
            bottom: margin.clone(),
            left: margin,
        }
    }
}

/// Page to render, relative to the configured application base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTarget {
    pub path: String,
    pub token: Option<String>,
}

/// Where and how the output is delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOptions {
    pub filename: Option<String>,
    pub upload_to_storage: bool,
    pub storage_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfRenderRequest {
    pub target: RenderTarget,
    pub paper_size: PaperSize,
    pub orientation: Orientation,
    pub print_background: bool,
    pub margin: Margins,
    pub delivery: DeliveryOptions,
}

impl PdfRenderRequest {
    pub fn capture_options(&self) -> PdfCaptureOptions {
        let (paper_width, paper_height) = self.paper_size.dimensions();
        PdfCaptureOptions {
            paper_width,
            paper_height,
            landscape: self.orientation == Orientation::Landscape,
            print_background: self.print_background,
            margin_top: self.margin.top.to_inches(),
            margin_right: self.margin.right.to_inches(),
            margin_bottom: self.margin.bottom.to_inches(),
            margin_left: self.margin.left.to_inches(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRenderRequest {
    pub target: RenderTarget,
    pub format: ImageFormat,
    pub quality: u8,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
    pub delivery: DeliveryOptions,
}

impl ImageRenderRequest {
    pub fn capture_options(&self) -> ImageCaptureOptions {
        match self.format {
            ImageFormat::Jpeg => ImageCaptureOptions {
                codec: ImageCodec::Jpeg,
                quality: Some(self.quality),
            },
            // webp goes through the lossless path, same as png.
            ImageFormat::Png | ImageFormat::Webp => ImageCaptureOptions {
                codec: ImageCodec::Png,
                quality: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderRequest {
    Pdf(PdfRenderRequest),
    Image(ImageRenderRequest),
}

impl RenderRequest {
    /// Validates `body` for the given job kind, reporting every violation.
    pub fn parse(kind: JobKind, body: &JsonValue) -> Result<Self, RenderError> {
        let mut reader = FieldReader::new(body);

        let target = reader.target();
        let request = match kind {
            JobKind::Pdf => {
                let paper_size = reader.choice("paperSize", &["A4", "Letter", "Legal"], PaperSize::A4);
                let orientation = reader.choice(
                    "orientation",
                    &["portrait", "landscape"],
                    Orientation::Portrait,
                );
                let print_background = reader.boolean("printBackground", true);
                let margin = reader.margins();
                let delivery = reader.delivery();
                RenderRequest::Pdf(PdfRenderRequest {
                    target,
                    paper_size,
                    orientation,
                    print_background,
                    margin,
                    delivery,
                })
            }
            JobKind::Image => {
                let format = reader.choice("format", &["png", "jpeg", "webp"], ImageFormat::Png);
                let quality = reader.integer("quality", 1..=100, 90) as u8;
                let width = reader.integer("width", 1..=4096, 1200) as u32;
                let height = reader.integer("height", 1..=4096, 800) as u32;
                let scale = reader.number("scale", 1.0..=3.0, 1.0);
                let delivery = reader.delivery();
                RenderRequest::Image(ImageRenderRequest {
                    target,
                    format,
                    quality,
                    width,
                    height,
                    scale,
                    delivery,
                })
            }
        };

        reader.finish()?;
        Ok(request)
    }

    pub fn kind(&self) -> JobKind {
        match self {
            RenderRequest::Pdf(_) => JobKind::Pdf,
            RenderRequest::Image(_) => JobKind::Image,
        }
    }

    pub fn target(&self) -> &RenderTarget {
        match self {
            RenderRequest::Pdf(req) => &req.target,
            RenderRequest::Image(req) => &req.target,
        }
    }

    pub fn delivery(&self) -> &DeliveryOptions {
        match self {
            RenderRequest::Pdf(req) => &req.delivery,
            RenderRequest::Image(req) => &req.delivery,
        }
    }

    pub fn viewport(&self) -> Viewport {
        match self {
            RenderRequest::Pdf(_) => Viewport::PDF,
            RenderRequest::Image(req) => Viewport {
                width: req.width,
                height: req.height,
                device_scale_factor: req.scale,
            },
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        match self {
            RenderRequest::Pdf(_) => OutputFormat::Pdf,
            RenderRequest::Image(req) => match req.format {
                ImageFormat::Png => OutputFormat::Png,
                ImageFormat::Jpeg => OutputFormat::Jpeg,
                ImageFormat::Webp => OutputFormat::Webp,
            },
        }
    }
}

struct FieldReader<'a> {
    fields: Option<&'a Map<String, JsonValue>>,
    errors: UnprocessableEntityResponse,
}

impl<'a> FieldReader<'a> {
    fn new(body: &'a JsonValue) -> Self {
        let mut errors = UnprocessableEntityResponse::new();
        let fields = body.as_object();
        if fields.is_none() {
            errors.add_error(loc(&[]), "request body must be a JSON object".to_string());
        }
        Self { fields, errors }
    }

    fn finish(self) -> Result<(), RenderError> {
        if self.errors.is_has_error() {
            return Err(RenderError::ValidationFailed(self.errors.into_detail()));
        }
        Ok(())
    }

    fn reject(&mut self, path: &[&str], msg: impl Into<String>) {
        self.errors.add_error(loc(path), msg.into());
    }

    /// Present, non-null value of a top-level field.
    fn field(&self, name: &str) -> Option<&'a JsonValue> {
        self.fields
            .and_then(|fields| fields.get(name))
            .filter(|value| !value.is_null())
    }

    fn string_at(&mut self, path: &[&str], value: Option<&'a JsonValue>) -> Option<&'a str> {
        match value {
            None => None,
            Some(JsonValue::String(s)) => Some(s.as_str()),
            Some(_) => {
                self.reject(path, "must be a string");
                None
            }
        }
    }

    fn string(&mut self, name: &str) -> Option<&'a str> {
        let value = self.field(name);
        self.string_at(&[name], value)
    }

    fn boolean(&mut self, name: &str, default: bool) -> bool {
        match self.field(name) {
            None => default,
            Some(JsonValue::Bool(b)) => *b,
            Some(_) => {
                self.reject(&[name], "must be a boolean");
                default
            }
        }
    }

    fn integer(&mut self, name: &str, range: RangeInclusive<u64>, default: u64) -> u64 {
        let Some(value) = self.field(name) else {
            return default;
        };
        let in_range = value.as_u64().filter(|n| range.contains(n));
        match in_range {
            Some(n) => n,
            None if value.is_number() && (value.is_u64() || value.is_i64()) => {
                self.reject(
                    &[name],
                    format!("must be between {} and {}", range.start(), range.end()),
                );
                default
            }
            None => {
                self.reject(
                    &[name],
                    format!(
                        "must be an integer between {} and {}",
                        range.start(),
                        range.end()
                    ),
                );
                default
            }
        }
    }

    fn number(&mut self, name: &str, range: RangeInclusive<f64>, default: f64) -> f64 {
        let Some(value) = self.field(name) else {
            return default;
        };
        match value.as_f64() {
            Some(n) if range.contains(&n) => n,
            _ => {
                self.reject(
                    &[name],
                    format!("must be a number between {} and {}", range.start(), range.end()),
                );
                default
            }
        }
    }

    fn choice<T: FromStr>(&mut self, name: &str, allowed: &[&str], default: T) -> T {
        let Some(raw) = self.string(name) else {
            return default;
        };
        match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                self.reject(&[name], format!("must be one of: {}", allowed.join(", ")));
                default
            }
        }
    }

    fn target(&mut self) -> RenderTarget {
        let path = match self.field("url") {
            None => {
                self.reject(&["url"], "field required");
                String::new()
            }
            Some(_) => match self.string("url") {
                Some(path) => {
                    if let Err(msg) = check_target_path(path) {
                        self.reject(&["url"], msg);
                    }
                    path.to_string()
                }
                None => String::new(),
            },
        };

        let token = match self.string("token") {
            Some(token) if token.trim().is_empty() => {
                self.reject(&["token"], "must not be empty");
                None
            }
            other => other.map(str::to_string),
        };

        RenderTarget { path, token }
    }

    fn margins(&mut self) -> Margins {
        let mut margins = Margins::default();
        let Some(value) = self.field("margin") else {
            return margins;
        };
        let Some(sides) = value.as_object() else {
            self.reject(&["margin"], "must be an object with top, right, bottom and left");
            return margins;
        };

        for (side, slot) in [
            ("top", &mut margins.top),
            ("right", &mut margins.right),
            ("bottom", &mut margins.bottom),
            ("left", &mut margins.left),
        ] {
            let path = ["margin", side];
            if let Some(raw) = self.string_at(&path, sides.get(side).filter(|v| !v.is_null())) {
                match Margin::parse(raw) {
                    Some(margin) => *slot = margin,
                    None => self.reject(&path, "must be a length in px, in, cm or mm"),
                }
            }
        }
        margins
    }

    fn delivery(&mut self) -> DeliveryOptions {
        let filename = self.string("filename").and_then(|name| match check_filename(name) {
            Ok(()) => Some(name.to_string()),
            Err(msg) => {
                self.reject(&["filename"], msg);
                None
            }
        });
        let upload_to_storage = self.boolean("uploadToStorage", true);
        let storage_path =
            self.string("storagePath")
                .and_then(|prefix| match check_storage_path(prefix) {
                    Ok(()) => Some(prefix.trim_matches('/').to_string()),
                    Err(msg) => {
                        self.reject(&["storagePath"], msg);
                        None
                    }
                });

        DeliveryOptions {
            filename,
            upload_to_storage,
            storage_path,
        }
    }
}

fn loc(path: &[&str]) -> Vec<String> {
    std::iter::once("body")
        .chain(path.iter().copied())
        .map(str::to_string)
        .collect()
}

/// Decodes a raw request body, reporting malformed JSON as a body violation.
pub fn parse_json_body(raw: &[u8]) -> Result<JsonValue, RenderError> {
    serde_json::from_slice(raw).map_err(|e| {
        let mut errors = UnprocessableEntityResponse::new();
        errors.add_error(loc(&[]), format!("request body is not valid JSON: {}", e));
        RenderError::ValidationFailed(errors.into_detail())
    })
}

fn check_target_path(path: &str) -> Result<(), &'static str> {
    if !path.starts_with('/') || path.starts_with("//") || path.starts_with("/\\") {
        return Err("must be a path starting with '/'");
    }
    if path.len() > MAX_TARGET_LEN {
        return Err("must be at most 2048 characters");
    }
    if path.chars().any(char::is_control) {
        return Err("must not contain control characters");
    }
    Ok(())
}

fn check_filename(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("must not be empty");
    }
    if name.len() > MAX_FILENAME_LEN {
        return Err("must be at most 255 characters");
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err("must not contain path separators");
    }
    if name.chars().any(char::is_control) {
        return Err("must not contain control characters");
    }
    Ok(())
}

fn check_storage_path(prefix: &str) -> Result<(), &'static str> {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        return Err("must not be empty");
    }
    if trimmed.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
        return Err("must not contain empty, '.' or '..' segments");
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'))
    {
        return Err("may only contain letters, digits, '/', '-', '_' and '.'");
    }
    Ok(())
}
