//! School Yourself grade relay — verifies signed mastery callbacks from the
//! School Yourself server and publishes course grades for embedded blocks.
//!
//! ## Endpoints
//!
//! - `GET  /health`                   — Health check
//! - `GET  /blocks/{id}`              — Public settings of a configured block
//! - `GET  /blocks/{id}/launch`       — Signed partner params and iframe URLs
//! - `POST /blocks/{id}/grade`        — Signed mastery callback

mod auth;
mod callback;
mod config;
mod error;
mod grading;
mod handlers;
mod launch;
mod models;
mod publish;
mod state;

use axum::{routing::{get, post}, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/blocks/:block_id", get(handlers::block_info))
        .route("/blocks/:block_id/launch", get(handlers::launch))
        .route("/blocks/:block_id/grade", post(handlers::grade))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sy_grade_relay=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = Arc::new(AppState::from_env()?);
    tracing::info!("Grade relay configured with {} block(s)", state.blocks.len());

    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3100".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Grade relay listening on http://{addr}");

    axum::serve(listener, app(state)).await?;
    Ok(())
}
