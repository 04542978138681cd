//! # Resolve API
//!
//! The HTTP surface of the engine, built on actix-web:
//!
//! - `GET /health` - liveness plus vector store health
//! - `POST /entities`, `GET|PUT|DELETE /entities/{id}`,
//!   `POST /entities/batch`, `GET /entities/count` - entity CRUD
//! - `POST /match`, `POST /match/text` - match queries
//! - `GET|POST /entities/{id}/group` - match-group resolution
//! - `POST /clusters/recompute` - asynchronous bulk re-blocking (202)

pub mod rest;

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use tracing::info;

use resolve_core::{Config, Result};

pub use rest::AppState;

/// Run the HTTP server until it is stopped. Binds to `api.host:api.port`
/// with the configured timeouts.
pub async fn run(state: AppState) -> Result<()> {
    let config = state.config.clone();
    let state = web::Data::new(state);

    info!(
        host = %config.api.host,
        port = config.api.port,
        "starting API server"
    );

    server(state, &config)?
        .await
        .map_err(|e| resolve_core::Error::Internal(format!("server error: {e}")))
}

fn server(
    state: web::Data<AppState>,
    config: &Arc<Config>,
) -> Result<actix_web::dev::Server> {
    let read_timeout = Duration::from_secs(config.api.read_timeout_secs);
    let write_timeout = Duration::from_secs(config.api.write_timeout_secs);
    let idle_timeout = Duration::from_secs(config.api.idle_timeout_secs);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .configure(rest::configure)
    })
    .client_request_timeout(read_timeout)
    .client_disconnect_timeout(write_timeout)
    .keep_alive(idle_timeout)
    .bind((config.api.host.as_str(), config.api.port))
    .map_err(|e| {
        resolve_core::Error::Config(format!(
            "failed to bind {}:{}: {e}",
            config.api.host, config.api.port
        ))
    })?
    .run();

    Ok(server)
}
