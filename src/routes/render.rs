use std::sync::Arc;

use poem::web::Data;
use poem_openapi::{OpenApi, Tags, param::Header};

use crate::{
    AppState,
    core::{
        error::RenderError, orchestrator::RenderFailure, registry::JobKind,
        request::parse_json_body,
    },
    routes::auth::authorize,
    schemas::render::RenderResponse,
};

#[derive(Tags)]
enum ApiRenderTags {
    Render,
}

pub struct ApiRender;

impl ApiRender {
    fn rejected(state: &AppState, error: RenderError) -> RenderResponse {
        let failure = RenderFailure {
            job_id: None,
            error,
        };
        RenderResponse::from_result(Err(failure), state.config.is_production())
    }

    /// Authorizes before the body is even decoded, so bad credentials always win.
    async fn handle(
        state: &AppState,
        kind: JobKind,
        api_key: Option<&str>,
        authorization: Option<&str>,
        raw: &[u8],
    ) -> RenderResponse {
        if let Err(error) = authorize(&state.config.render_api_key, api_key, authorization) {
            tracing::warn!("rejected render request: {}", error);
            return Self::rejected(state, error);
        }

        let body = match parse_json_body(raw) {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(kind = %kind, "rejected render request: {}", error);
                return Self::rejected(state, error);
            }
        };

        let result = match kind {
            JobKind::Pdf => state.orchestrator.render_pdf(&body).await,
            JobKind::Image => state.orchestrator.render_image(&body).await,
        };
        RenderResponse::from_result(result, state.config.is_production())
    }
}

#[OpenApi()]
impl ApiRender {
    /// Render PDF
    ///
    /// Render an application page to PDF with the headless browser.
    ///
    /// # Example Request
    /// ```json
    /// {
    ///   "url": "/reports/2024-q3",
    ///   "token": "eyJhbGciOi...",
    ///   "paperSize": "A4",
    ///   "orientation": "portrait",
    ///   "printBackground": true,
    ///   "margin": { "top": "10mm", "right": "10mm", "bottom": "10mm", "left": "10mm" },
    ///   "uploadToStorage": false
    /// }
    /// ```
    #[oai(path = "/render/pdf", method = "post", tag = "ApiRenderTags::Render")]
    async fn render_pdf(
        &self,
        body: Vec<u8>,
        #[oai(name = "X-API-Key")] api_key: Header<Option<String>>,
        #[oai(name = "Authorization")] authorization: Header<Option<String>>,
        state: Data<&Arc<AppState>>,
    ) -> RenderResponse {
        Self::handle(
            &state,
            JobKind::Pdf,
            api_key.0.as_deref(),
            authorization.0.as_deref(),
            &body,
        )
        .await
    }

    /// Render Image
    ///
    /// Capture an application page as a png, jpeg or webp image.
    ///
    /// # Example Request
    /// ```json
    /// {
    ///   "url": "/dashboards/sales",
    ///   "format": "jpeg",
    ///   "quality": 85,
    ///   "width": 1600,
    ///   "height": 900,
    ///   "scale": 2,
    ///   "uploadToStorage": true,
    ///   "storagePath": "dashboards"
    /// }
    /// ```
    #[oai(path = "/render/image", method = "post", tag = "ApiRenderTags::Render")]
    async fn render_image(
        &self,
        body: Vec<u8>,
        #[oai(name = "X-API-Key")] api_key: Header<Option<String>>,
        #[oai(name = "Authorization")] authorization: Header<Option<String>>,
        state: Data<&Arc<AppState>>,
    ) -> RenderResponse {
        Self::handle(
            &state,
            JobKind::Image,
            api_key.0.as_deref(),
            authorization.0.as_deref(),
            &body,
        )
        .await
    }
}
