use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::{
    engine::EngineError,
    site::{SiteStatus, TransitionError, store::StoreError},
};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("container engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("site store error: {0}")]
    Store(#[from] StoreError),

    #[error(
        "container {container} reported unhealthy {observations} times in a row"
    )]
    Unhealthy {
        container: String,
        observations: u32,
        /// Tail of the container log captured when the check gave up.
        logs: String,
    },

    #[error("container {container} did not become healthy within {timeout:?}")]
    HealthTimeout { container: String, timeout: Duration },

    #[error(
        "no {count} free host ports available at or above {start_port}"
    )]
    PortsExhausted { count: usize, start_port: u16 },

    #[error("site {0} not found")]
    SiteNotFound(Uuid),

    #[error("cannot {action} site while it is {status}")]
    InvalidState {
        action: &'static str,
        status: SiteStatus,
    },

    #[error("site {id} is busy with {operation}")]
    Busy { id: Uuid, operation: &'static str },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("container {name} belongs to {owner}, refusing to replace it")]
    ForeignContainer { name: String, owner: String },

    #[error("a site with container prefix {0} already exists")]
    PrefixInUse(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("deployment task ended unexpectedly: {0}")]
    TaskAborted(String),
}

impl OrchestratorError {
    /// Whether the failure came from an individual container never reaching
    /// a healthy state.
    pub fn is_health_failure(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Unhealthy { .. }
                | OrchestratorError::HealthTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
