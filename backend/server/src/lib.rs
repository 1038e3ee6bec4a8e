//! # APK Hub Server
//!
//! JSON API over the APK catalog.
//!
//! ## Routes
//!
//! | Method | Path | Who |
//! |---|---|---|
//! | GET | `/api/apks?category=<id>` | anyone |
//! | GET | `/api/apks/{id}` | anyone |
//! | POST | `/api/apks` | admin |
//! | PATCH | `/api/apks/{id}` | admin |
//! | DELETE | `/api/apks/{id}` | admin |
//! | POST | `/api/apks/{id}/download` | anyone, answers `{ "url": ... }` |
//! | GET | `/api/apks/{id}/download` | anyone, answers 303 |
//! | GET | `/api/categories` | anyone |
//! | GET | `/api/me` | anyone |
//!
//! ## Collaborators
//! - Redis holds the catalog and does the atomic download counting
//! - The storage service signs download URLs when `STORAGE_BACKEND=signed`
//! - The auth provider answers who the caller is, admin checks happen here
use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod memory;
pub mod routes;
pub mod service;
pub mod state;
pub mod storage;
pub mod store;
pub mod utils;

use config::Config;
use routes::{
    categories_handler, create_apk_handler, delete_apk_handler, download_handler,
    download_redirect_handler, get_apk_handler, list_apks_handler, me_handler,
    update_apk_handler,
};
use state::State;

pub fn app(state: Arc<State>, cors_max_age: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(cors_max_age);

    Router::new()
        .route("/api/apks", get(list_apks_handler).post(create_apk_handler))
        .route(
            "/api/apks/{id}",
            get(get_apk_handler)
                .patch(update_apk_handler)
                .delete(delete_apk_handler),
        )
        .route(
            "/api/apks/{id}/download",
            post(download_handler).get(download_redirect_handler),
        )
        .route("/api/categories", get(categories_handler))
        .route("/api/me", get(me_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = State::new(&config).await?;

    info!("Starting server...");

    let app = app(state, config.cors_max_age);

    let address = format!("0.0.0.0:{}", config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
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
}
