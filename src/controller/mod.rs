//! Controller module for Cluster reconciliation
//! This module contains the main controller loop, the API client
//! abstraction, and routing of requests to workload clusters.

pub mod client;
pub mod conditions;
mod reconciler;
#[cfg(test)]
mod reconciler_test;
pub mod registry;
pub mod result;

pub use client::{ClusterClient, ClusterKey, KubeClusterClient, FIELD_MANAGER};
pub use reconciler::{run_controller, ControllerState};
pub use registry::{KubeconfigClientRegistry, RemoteClientRegistry};
pub use result::ReconcileResult;
