use std::sync::Arc;

use poem::web::Data;
use poem_openapi::{OpenApi, Tags, payload::Json};

use crate::{
    AppState,
    schemas::health::{HealthResponse, LiveResponse, ReadinessProbeResponse, ReadyResponse},
};

#[derive(Tags)]
enum ApiHealthTags {
    Health,
}

pub struct ApiHealth;

#[OpenApi()]
impl ApiHealth {
    /// Service health
    ///
    /// Reports `degraded` while every render slot is taken.
    #[oai(path = "/health", method = "get", tag = "ApiHealthTags::Health")]
    async fn health(&self, state: Data<&Arc<AppState>>) -> HealthResponse {
        let registry = state.orchestrator.registry();
        let gate = state.orchestrator.gate();
        let max = gate.max_jobs();
        let active = registry.count();
        let status = if gate.has_capacity(registry) {
            "healthy"
        } else {
            "degraded"
        };

        let mut body = serde_json::json!({
            "status": status,
            "uptimeSeconds": state.started_at.elapsed().as_secs(),
            "browser": {
                "ready": state.orchestrator.engine().driver().is_ready()
            },
            "jobs": {
                "active": active,
                "max": max,
                "utilizationPct": active as f64 / max as f64 * 100.0
            }
        });

        if !state.config.is_production() {
            body["activeJobs"] = serde_json::json!(registry.list());
        }

        HealthResponse::Ok(Json(body))
    }

    #[oai(path = "/health/ready", method = "get", tag = "ApiHealthTags::Health")]
    async fn ready(&self, state: Data<&Arc<AppState>>) -> ReadinessProbeResponse {
        let ready = state.orchestrator.engine().driver().is_ready();
        if ready {
            ReadinessProbeResponse::Ready(Json(ReadyResponse { ready }))
        } else {
            ReadinessProbeResponse::NotReady(Json(ReadyResponse { ready }))
        }
    }

    #[oai(path = "/health/live", method = "get", tag = "ApiHealthTags::Health")]
    async fn live(&self) -> Json<LiveResponse> {
        Json(LiveResponse { alive: true })
    }
}
