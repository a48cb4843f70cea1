use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    api::{EngineResponse, PortsQuery, PortsResponse},
    infra::{app_state::AppState, errors::AppResult},
};

const DEFAULT_PORT_COUNT: usize = 5;

/// `GET /ports/available?count=&base=`
pub async fn available_ports(
    State(state): State<AppState>,
    Query(query): Query<PortsQuery>,
) -> AppResult<Json<PortsResponse>> {
    let ports = state
        .coordinator
        .list_available_ports(query.count.unwrap_or(DEFAULT_PORT_COUNT), query.base)
        .await?;
    Ok(Json(PortsResponse { ports }))
}

/// `GET /engine`
pub async fn engine_status(State(state): State<AppState>) -> Json<EngineResponse> {
    let connectivity = state.coordinator.check_engine_connectivity().await;
    Json(EngineResponse { connectivity })
}
