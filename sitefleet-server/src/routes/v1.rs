use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    AppState,
    api::routes,
    handlers::{engine, health, sites},
};

/// Create all v1 API routes
pub fn create_v1_router(_state: AppState) -> Router<AppState> {
    Router::new()
        .route(routes::HEALTH, get(health::health))
        .route(
            routes::SITES,
            get(sites::list_sites).post(sites::create_site),
        )
        .route(
            routes::SITE,
            get(sites::get_site).delete(sites::remove_site),
        )
        .route(routes::SITE_DEPLOY, post(sites::deploy_site))
        .route(routes::SITE_STOP, post(sites::stop_site))
        .route(routes::SITE_START, post(sites::start_site))
        .route(routes::PORTS_AVAILABLE, get(engine::available_ports))
        .route(routes::ENGINE, get(engine::engine_status))
}
