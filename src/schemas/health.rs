use poem_openapi::{ApiResponse, Object, payload::Json};
use serde_json::Value as JsonValue;

#[derive(Object, Debug)]
pub struct ReadyResponse {
    pub ready: bool,
}

#[derive(Object, Debug)]
pub struct LiveResponse {
    pub alive: bool,
}

#[derive(ApiResponse)]
pub enum ReadinessProbeResponse {
    #[oai(status = 200)]
    Ready(Json<ReadyResponse>),

    #[oai(status = 503)]
    NotReady(Json<ReadyResponse>),
}

#[derive(ApiResponse)]
pub enum HealthResponse {
    #[oai(status = 200)]
    Ok(Json<JsonValue>),
}
