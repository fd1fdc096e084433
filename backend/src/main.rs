//! ISA Catalogue - Main Entry Point

use std::net::SocketAddr;

use axum::http::{header, HeaderValue, Method};
use axum::{middleware, Router, ServiceExt};
use clap::Parser;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use isa_catalogue_backend::{
    api::{self, middleware::security_headers::security_headers_middleware},
    cli::{self, Cli, Command},
    config::Config,
    error::{AppError, Result},
    storage, telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    telemetry::init_tracing(config.log_format);
    tracing::debug!(?config, "Configuration loaded");

    // Connects and runs migrations for the postgres store
    let store = storage::connect(&config).await?;

    match cli.command() {
        Command::Serve => serve(config, store).await,
        command => cli::run(store, command).await,
    }
}

async fn serve(
    config: Config,
    store: std::sync::Arc<dyn storage::CatalogueStore>,
) -> Result<()> {
    tracing::info!("Starting ISA Catalogue {}", env!("CARGO_PKG_VERSION"));
    let addr: SocketAddr = config.bind_address.parse()?;
    let cors = cors_layer(config.cors_origins.as_deref())?;

    let state = std::sync::Arc::new(api::AppState::new(config, store));
    let app = Router::new()
        .merge(api::routes::create_router(state))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let app = api::routes::trim_trailing_slash(app);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, ServiceExt::<axum::extract::Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Explicit origins from `CORS_ORIGINS` (comma separated), otherwise any origin.
fn cors_layer(origins: Option<&str>) -> Result<CorsLayer> {
    let Some(origins) = origins else {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    };

    let origins = origins
        .split(',')
        .map(|s| {
            s.trim()
                .parse::<HeaderValue>()
                .map_err(|_| AppError::Config(format!("Invalid CORS origin '{}'", s.trim())))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutting down"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
