use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use sitefleet_core::{OrchestratorError, StoreError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::SiteNotFound(_) => Self::not_found(err.to_string()),
            OrchestratorError::InvalidState { .. }
            | OrchestratorError::Busy { .. }
            | OrchestratorError::Transition(_)
            | OrchestratorError::PrefixInUse(_)
            | OrchestratorError::ForeignContainer { .. }
            | OrchestratorError::PortsExhausted { .. } => {
                Self::conflict(err.to_string())
            }
            OrchestratorError::InvalidInput(message) => Self::bad_request(message),
            OrchestratorError::Engine(engine) => {
                tracing::warn!(error = %engine, "container engine request failed");
                Self::unavailable(format!("container engine unavailable: {engine}"))
            }
            OrchestratorError::Store(store) => store.into(),
            other => {
                tracing::error!(error = %other, "orchestrator operation failed");
                Self::internal(other.to_string())
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::not_found(err.to_string()),
            StoreError::Conflict(_) => Self::conflict(err.to_string()),
            StoreError::Backend(_) => {
                tracing::error!(error = %err, "site store operation failed");
                Self::internal("Site store operation failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use sitefleet_core::{EngineError, SiteStatus};

    #[test]
    fn orchestrator_errors_map_to_statuses() {
        let cases = [
            (OrchestratorError::SiteNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (
                OrchestratorError::InvalidState {
                    action: "deploy",
                    status: SiteStatus::Running,
                },
                StatusCode::CONFLICT,
            ),
            (
                OrchestratorError::PrefixInUse("site-acme".into()),
                StatusCode::CONFLICT,
            ),
            (
                OrchestratorError::InvalidInput("bad domain".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                OrchestratorError::Engine(EngineError::Rejected("daemon down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                OrchestratorError::Store(StoreError::Backend("pool closed".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                OrchestratorError::TaskAborted("panicked".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn backend_store_errors_hide_details() {
        let err = AppError::from(StoreError::Backend("password=hunter2".into()));
        assert!(!err.message.contains("hunter2"));
    }
}
