use axum::{Json, extract::State};

use crate::{api::HealthResponse, infra::app_state::AppState};

/// Liveness of the control plane itself; does not touch the engine.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        store: state.store_backend.as_str(),
        in_flight_deployments: state.coordinator.in_flight().len(),
        started_at: state.started_at,
    })
}
