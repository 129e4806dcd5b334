use poem_openapi::Object;
use serde::Serialize;

#[derive(Object, Serialize, Debug, Clone, PartialEq)]
pub struct ValidateItem {
    pub loc: Vec<String>,
    pub msg: String,
}

/// Collects every validation violation of a request body before failing.
#[derive(Object, Debug, Clone)]
pub struct UnprocessableEntityResponse {
    pub detail: Vec<ValidateItem>,
}

impl Default for UnprocessableEntityResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl UnprocessableEntityResponse {
    pub fn new() -> Self {
        Self { detail: vec![] }
    }

    pub fn is_has_error(&self) -> bool {
        !self.detail.is_empty()
    }

    pub fn add_error(&mut self, loc: Vec<String>, msg: String) {
        self.detail.push(ValidateItem { loc, msg });
    }

    pub fn into_detail(self) -> Vec<ValidateItem> {
        self.detail
    }
}

/// Failure body shared by every render endpoint.
#[derive(Object, Debug, Clone)]
#[oai(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[oai(skip_serializing_if_is_none)]
    pub job_id: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub details: Option<Vec<ValidateItem>>,
}
