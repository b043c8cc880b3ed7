//! Shared types used across the cluster-gitops CRDs

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group for every custom resource this crate manages
pub const API_GROUP: &str = "anywhere.clusterops.io";

/// Reference to another object by kind and name, in the referrer's namespace
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Ref {
    pub kind: String,
    pub name: String,
}

impl Ref {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// Control plane API endpoint
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub host: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneConfiguration {
    #[serde(default = "default_count")]
    pub count: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_group_ref: Option<Ref>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerNodeGroupConfiguration {
    pub name: String,

    #[serde(default = "default_count")]
    pub count: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_group_ref: Option<Ref>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEtcdConfiguration {
    #[serde(default = "default_count")]
    pub count: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_group_ref: Option<Ref>,
}

/// Name of the cluster that manages this one
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagementCluster {
    pub name: String,
}

fn default_count() -> i32 {
    1
}

/// Condition for status reporting (Kubernetes convention)
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "IamAuthReady")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
