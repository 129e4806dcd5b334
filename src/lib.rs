use std::sync::Arc;
use std::time::Instant;

use poem::{
    EndpointExt, Route,
    middleware::{AddData, AddDataEndpoint, Cors, CorsEndpoint},
};
use poem_openapi::OpenApiService;

use crate::core::admission::AdmissionGate;
use crate::core::orchestrator::RenderOrchestrator;
use crate::core::readiness::ReadinessDetector;
use crate::core::registry::JobRegistry;
use crate::core::renderer::RenderEngine;
use crate::core::session::BrowserDriver;
use crate::routes::{health::ApiHealth, render::ApiRender};
use crate::settings::{Config, ConfigError};
use crate::storage::ObjectStorage;

pub mod core;
pub mod routes;
pub mod schemas;
pub mod settings;
pub mod storage;

pub struct AppState {
    pub orchestrator: Arc<RenderOrchestrator>,
    pub config: Config,
    pub started_at: Instant,
}

impl AppState {
    /// Wires registry, admission gate, engine and storage from `config`.
    pub fn new(
        config: Config,
        driver: Arc<dyn BrowserDriver>,
        storage: Option<Arc<dyn ObjectStorage>>,
    ) -> Result<Self, ConfigError> {
        let engine = RenderEngine::new(
            driver,
            ReadinessDetector::new(config.ready_flag_timeout()),
            config.base_url()?,
            config.navigation_timeout(),
        );
        let orchestrator = RenderOrchestrator::new(
            JobRegistry::new(),
            AdmissionGate::new(config.max_concurrent_jobs),
            engine,
            storage,
            config.signed_url_ttl(),
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            config,
            started_at: Instant::now(),
        })
    }
}

pub fn init_openapi_route(
    app_state: Arc<AppState>,
    config: &Config,
) -> CorsEndpoint<AddDataEndpoint<Route, Arc<AppState>>> {
    let prefix = config.prefix.clone().unwrap_or("/".to_string());
    let openapi_route = OpenApiService::new((ApiRender, ApiHealth), "Page Renderer API", "1.0")
        .server(prefix.clone());

    let openapi_json_endpoint = openapi_route.spec_endpoint();
    let ui = openapi_route.swagger_ui();
    Route::new()
        .nest(prefix, openapi_route)
        .nest("/docs", ui)
        .at("openapi.json", openapi_json_endpoint)
        .with(AddData::new(app_state))
        .with(Cors::new())
}
