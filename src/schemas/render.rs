use poem_openapi::{ApiResponse, Object, payload::Json};

use super::common::ErrorResponse;
use crate::core::error::{ErrorCode, RenderError};
use crate::core::orchestrator::{Delivery, RenderFailure, RenderOutcome};

const REDACTED_MESSAGE: &str = "An internal error occurred while processing the render job";

#[derive(Object, Debug, Clone)]
#[oai(rename_all = "camelCase")]
pub struct RenderMetadata {
    pub render_time_ms: u64,
    pub format: String,
    #[oai(skip_serializing_if_is_none)]
    pub page_count: Option<u32>,
    #[oai(skip_serializing_if_is_none)]
    pub width: Option<u32>,
    #[oai(skip_serializing_if_is_none)]
    pub height: Option<u32>,
}

#[derive(Object, Debug, Clone)]
#[oai(rename_all = "camelCase")]
pub struct RenderSuccessResponse {
    pub success: bool,
    pub job_id: String,
    /// Signed download link, when the output was uploaded
    #[oai(skip_serializing_if_is_none)]
    pub url: Option<String>,
    /// Base64 `data:` URL, when the output is returned inline
    #[oai(skip_serializing_if_is_none)]
    pub data_url: Option<String>,
    pub filename: String,
    pub file_size: u64,
    /// RFC 3339 expiry of `url`
    #[oai(skip_serializing_if_is_none)]
    pub expires_at: Option<String>,
    pub metadata: RenderMetadata,
}

impl From<RenderOutcome> for RenderSuccessResponse {
    fn from(outcome: RenderOutcome) -> Self {
        let (url, data_url, expires_at) = match outcome.delivery {
            Delivery::Signed { url, expires_at } => (Some(url), None, Some(expires_at.to_rfc3339())),
            Delivery::Inline { data_url } => (None, Some(data_url), None),
        };

        Self {
            success: true,
            job_id: outcome.job_id.to_string(),
            url,
            data_url,
            filename: outcome.filename,
            file_size: outcome.file_size,
            expires_at,
            metadata: RenderMetadata {
                render_time_ms: outcome.render_time_ms,
                format: outcome.format.as_str().to_string(),
                page_count: outcome.page_count,
                width: outcome.width,
                height: outcome.height,
            },
        }
    }
}

impl ErrorResponse {
    /// Builds the failure body; 500-class messages are hidden in production.
    pub fn from_failure(failure: &RenderFailure, production: bool) -> Self {
        let code = failure.error.code();
        let message = if production && code.status().is_server_error() {
            REDACTED_MESSAGE.to_string()
        } else {
            failure.error.to_string()
        };
        let details = match &failure.error {
            RenderError::ValidationFailed(items) => Some(items.clone()),
            _ => None,
        };

        Self {
            success: false,
            error: code.as_str().to_string(),
            message,
            job_id: failure.job_id.map(|id| id.to_string()),
            details,
        }
    }
}

#[derive(ApiResponse)]
pub enum RenderResponse {
    #[oai(status = 200)]
    Ok(Json<RenderSuccessResponse>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorResponse>),

    #[oai(status = 401)]
    Unauthorized(Json<ErrorResponse>),

    #[oai(status = 403)]
    Forbidden(Json<ErrorResponse>),

    #[oai(status = 408)]
    RequestTimeout(Json<ErrorResponse>),

    #[oai(status = 500)]
    InternalServerError(Json<ErrorResponse>),

    #[oai(status = 503)]
    ServiceUnavailable(Json<ErrorResponse>),
}

impl RenderResponse {
    /// Picks the response variant from the error code alone.
    pub fn failure(code: ErrorCode, body: ErrorResponse) -> Self {
        let body = Json(body);
        match code {
            ErrorCode::ValidationFailed => RenderResponse::BadRequest(body),
            ErrorCode::Unauthorized => RenderResponse::Unauthorized(body),
            ErrorCode::Forbidden => RenderResponse::Forbidden(body),
            ErrorCode::ConcurrencyLimit => RenderResponse::ServiceUnavailable(body),
            ErrorCode::ReadyFlagTimeout | ErrorCode::NavigationTimeout => {
                RenderResponse::RequestTimeout(body)
            }
            ErrorCode::StorageFailed | ErrorCode::RenderFailed | ErrorCode::InternalError => {
                RenderResponse::InternalServerError(body)
            }
        }
    }

    pub fn from_result(result: Result<RenderOutcome, RenderFailure>, production: bool) -> Self {
        match result {
            Ok(outcome) => RenderResponse::Ok(Json(outcome.into())),
            Err(failure) => {
                let body = ErrorResponse::from_failure(&failure, production);
                Self::failure(failure.error.code(), body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poem::IntoResponse;

    #[test]
    fn response_status_follows_error_code() {
        for code in ErrorCode::ALL {
            let body = ErrorResponse {
                success: false,
                error: code.as_str().to_string(),
                message: String::new(),
                job_id: None,
                details: None,
            };
            let response = RenderResponse::failure(code, body).into_response();
            assert_eq!(response.status(), code.status(), "{}", code.as_str());
        }
    }

    #[test]
    fn production_hides_internal_messages_only() {
        let internal = RenderFailure {
            job_id: None,
            error: RenderError::RenderFailed("chrome crashed at 0xdeadbeef".to_string()),
        };
        let timeout = RenderFailure {
            job_id: None,
            error: RenderError::NavigationTimeout { timeout_ms: 15_000 },
        };

        assert_eq!(
            ErrorResponse::from_failure(&internal, true).message,
            REDACTED_MESSAGE
        );
        assert!(
            ErrorResponse::from_failure(&internal, false)
                .message
                .contains("0xdeadbeef")
        );
        assert!(
            ErrorResponse::from_failure(&timeout, true)
                .message
                .contains("15000ms")
        );
    }
}
