//! # MindEase Binary
//!
//! Assembles the application from its configuration and the backends
//! compiled in through cargo features.

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use me_api::handlers::AppState;
use me_api::{configure_routes, middleware};
use me_config::{AppConfig, BackendConfig, BackendKind};
use me_core::{AuthProvider, TableClient};

#[cfg(feature = "backend-rest")]
use me_backend_rest::RestBackend;

#[cfg(feature = "backend-memory")]
use me_backend_memory::MemoryBackend;

type Ports = (Arc<dyn AuthProvider>, Arc<dyn TableClient>);

/// Both ports are served by the same backend instance.
fn init_backend(config: BackendConfig) -> anyhow::Result<Ports> {
    match config.kind {
        #[cfg(feature = "backend-rest")]
        BackendKind::Rest => {
            let url = config.url.context("backend.url is not set")?;
            let anon_key = config.anon_key.context("backend.anon_key is not set")?;
            let backend = Arc::new(RestBackend::new(&url, anon_key)?);
            log::info!("using REST backend at {url}");

            let auth: Arc<dyn AuthProvider> = backend.clone();
            let db: Arc<dyn TableClient> = backend;
            Ok((auth, db))
        }
        #[cfg(feature = "backend-memory")]
        BackendKind::Memory => {
            log::warn!("using in-memory backend, data is lost on exit");
            let backend = Arc::new(MemoryBackend::new());

            let auth: Arc<dyn AuthProvider> = backend.clone();
            let db: Arc<dyn TableClient> = backend;
            Ok((auth, db))
        }
        #[allow(unreachable_patterns)]
        other => anyhow::bail!("backend {other:?} is not compiled into this build"),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let AppConfig { server, backend, log: log_config } = AppConfig::load()?;
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(log_config.level));

    let (auth, db) = init_backend(backend)?;
    let state = web::Data::new(AppState::new(auth, db));

    // Pages answer "loading" until the stored session is resolved.
    let resolving = state.clone();
    actix_web::rt::spawn(async move {
        resolving.guard.resolve(resolving.auth.as_ref()).await;
    });

    log::info!("MindEase starting on http://{}:{}", server.host, server.port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::standard_middleware())
            .wrap(middleware::cors_policy())
            .configure(configure_routes)
    })
    .bind((server.host.as_str(), server.port))?
    .run()
    .await?;

    Ok(())
}
