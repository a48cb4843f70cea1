//! # Sitefleet Core
//!
//! Orchestration core for Sitefleet: each tenant ("site") gets an isolated
//! stack of containers (database, cache, application backend, edge proxy,
//! proxy-manager, proxy-manager database and a management console) on one
//! shared container engine.
//!
//! ## Overview
//!
//! - **Engine port**: [`engine::ContainerEngine`] abstracts the container
//!   engine control API. [`engine::docker::DockerCliEngine`] drives the
//!   docker CLI; an in-memory engine is available behind `test-utils`.
//! - **Helpers**: secret generation ([`credentials`]), port allocation
//!   ([`ports`]), per-tenant networks ([`network`]) and health gating
//!   ([`health`]).
//! - **Stack**: [`stack`] turns a [`stack::DeploymentConfig`] into an ordered
//!   list of container specs and runs them through a create, start and
//!   wait-healthy pipeline.
//! - **Lifecycle**: [`lifecycle`] stops, starts, removes and rolls back stacks;
//!   [`status`] reports live per-service state.
//! - **Coordinator**: [`coordinator::DeploymentCoordinator`] owns the site
//!   state machine ([`site`]) and runs deployments as supervised background
//!   tasks.
//!
//! ## Feature Flags
//!
//! - `test-utils`: exposes the in-memory container engine (`engine::memory`).

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

pub mod coordinator;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod naming;
pub mod network;
pub mod ports;
pub mod settings;
pub mod site;
pub mod stack;
pub mod status;

pub use coordinator::{
    CreatedSite, DeploymentCoordinator, EngineConnectivity, SiteDetail,
    SiteRemoval,
};
pub use engine::{ContainerEngine, EngineError};
pub use error::{OrchestratorError, Result};
pub use naming::ServiceKind;
pub use ports::PortRole;
pub use settings::{HealthPolicy, ImageSet, OrchestratorSettings, ServiceTimings};
pub use site::{
    SiteRecord, SiteStatus,
    store::{InMemorySiteStore, SiteStore, StoreError},
};
pub use stack::{DeploymentConfig, DeploymentResult};
