use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    api::{
        CreateSiteRequest, CreatedSiteResponse, DeployAccepted,
        OperationResponse, RemovalResponse, SiteDetailResponse, SiteResponse,
    },
    infra::{app_state::AppState, errors::AppResult},
};

/// `POST /sites`
pub async fn create_site(
    State(state): State<AppState>,
    Json(request): Json<CreateSiteRequest>,
) -> AppResult<(StatusCode, Json<CreatedSiteResponse>)> {
    let created = state
        .coordinator
        .create_deployment_config(
            &request.name,
            &request.domain,
            &request.admin_email,
        )
        .await?;

    let response = CreatedSiteResponse {
        site: SiteResponse::from(&created.record),
        credentials: created.record.config.credentials_echo(),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /sites`
pub async fn list_sites(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<SiteResponse>>> {
    let sites = state.coordinator.list_sites().await?;
    Ok(Json(sites.iter().map(SiteResponse::from).collect()))
}

/// `GET /sites/{id}`
pub async fn get_site(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SiteDetailResponse>> {
    let detail = state.coordinator.get_status(id).await?;
    Ok(Json(SiteDetailResponse {
        site: SiteResponse::from(&detail.record),
        services: detail.services,
    }))
}

/// `POST /sites/{id}/deploy`
pub async fn deploy_site(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<DeployAccepted>)> {
    let record = state.coordinator.deploy(id).await?;
    info!(site = %id, "deployment accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(DeployAccepted {
            id: record.id,
            status: record.status,
        }),
    ))
}

/// `POST /sites/{id}/stop`
pub async fn stop_site(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<OperationResponse>> {
    let services = state.coordinator.stop(id).await?;
    operation_response(&state, id, services).await
}

/// `POST /sites/{id}/start`
pub async fn start_site(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<OperationResponse>> {
    let services = state.coordinator.start(id).await?;
    operation_response(&state, id, services).await
}

/// `DELETE /sites/{id}`
pub async fn remove_site(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RemovalResponse>> {
    let removal = state.coordinator.remove(id).await?;
    Ok(Json(RemovalResponse {
        id,
        deleted: removal.deleted,
        report: removal.report,
    }))
}

async fn operation_response(
    state: &AppState,
    id: Uuid,
    services: sitefleet_core::lifecycle::OperationReport,
) -> AppResult<Json<OperationResponse>> {
    let record = state.coordinator.get_record(id).await?;
    Ok(Json(OperationResponse {
        id,
        status: record.status,
        error: record.error,
        services,
    }))
}
