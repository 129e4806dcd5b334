use anyhow::Context;
use page_renderer::core::browser::ChromeBrowser;
use page_renderer::core::session::BrowserDriver;
use page_renderer::settings::{Config, get_config};
use page_renderer::storage::{HttpObjectStorage, ObjectStorage};
use page_renderer::{AppState, init_openapi_route};
use poem::listener::TcpListener;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use std::sync::Arc;

fn build_storage(config: &Config) -> anyhow::Result<Option<Arc<dyn ObjectStorage>>> {
    match (&config.storage_url, &config.storage_service_key) {
        (Some(url), Some(key)) => {
            let storage = HttpObjectStorage::new(url, key.clone(), config.storage_bucket.clone())
                .context("failed to build storage client")?;
            tracing::info!("storage enabled: {} bucket={}", url, config.storage_bucket);
            Ok(Some(Arc::new(storage)))
        }
        _ => {
            tracing::warn!("storage not configured, uploads will fail");
            Ok(None)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config().context("invalid configuration")?;

    // Logging to file and stdout
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking.and(std::io::stdout))
        .with_max_level(config.log_level()?)
        .init();

    tracing::info!("Initializing Page Renderer...");
    tracing::info!("using {} as environment variable", config.env_source());
    tracing::info!("run with config: {:?}", config);

    let browser = ChromeBrowser::new(config.chrome_path.clone())?;
    {
        let browser = browser.clone();
        tokio::task::spawn_blocking(move || browser.init())
            .await
            .context("browser launch task panicked")??;
    }
    tracing::info!("Browser initialized successfully");

    let storage = build_storage(&config)?;
    let driver: Arc<dyn BrowserDriver> = Arc::new(browser.clone());
    let app_state = Arc::new(AppState::new(config.clone(), driver, storage)?);

    let app = init_openapi_route(app_state, &config);
    tracing::info!("run server on {}:{}", config.host, config.port);
    let served = poem::Server::new(TcpListener::bind(format!(
        "{}:{}",
        config.host, config.port
    )))
    .run_with_graceful_shutdown(app, shutdown_signal(), None)
    .await;

    tokio::task::spawn_blocking(move || browser.shutdown()).await?;
    served?;
    Ok(())
}
