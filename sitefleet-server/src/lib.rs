//! # Sitefleet Server
//!
//! HTTP control plane over [`sitefleet_core::DeploymentCoordinator`]. Sites
//! are created, deployed, stopped, started and removed through a JSON API
//! nested under `/api/v1`; records live in PostgreSQL when a database URL is
//! configured and in memory otherwise.

pub mod api;
pub mod handlers;
pub mod infra;
pub mod persistence;
pub mod routes;

pub use infra::app_state::AppState;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
};
use sqlx::migrate::Migrator;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Full application router with tracing and CORS layers applied.
pub fn create_app(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config()
        .server
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    let cors_layer = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    routes::create_api_router(state.clone())
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
