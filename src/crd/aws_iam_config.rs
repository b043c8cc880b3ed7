//! AWSIamConfig Custom Resource Definition
//!
//! Configures the IAM authenticator deployed to a cluster: which backends
//! it reads mappings from and the role/user mappings themselves.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PARTITION: &str = "aws";
pub const BACKEND_MODE_CONFIG_MAP: &str = "EKSConfigMap";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "anywhere.clusterops.io",
    version = "v1alpha1",
    kind = "AWSIamConfig",
    root = "AwsIamConfig",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AwsIamConfigSpec {
    pub aws_region: String,

    #[serde(default)]
    pub backend_mode: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub map_roles: Vec<MapRoles>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub map_users: Vec<MapUsers>,

    #[serde(default = "default_partition")]
    pub partition: String,
}

/// Maps an IAM role to a Kubernetes identity
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct MapRoles {
    #[serde(rename = "roleARN")]
    pub role_arn: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

/// Maps an IAM user to a Kubernetes identity
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct MapUsers {
    #[serde(rename = "userARN")]
    pub user_arn: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

fn default_partition() -> String {
    DEFAULT_PARTITION.to_string()
}

impl AwsIamConfigSpec {
    /// Backends the authenticator reads mappings from; the config map
    /// backend is always first.
    pub fn effective_backend_modes(&self) -> Vec<String> {
        let mut modes = vec![BACKEND_MODE_CONFIG_MAP.to_string()];
        for m in &self.backend_mode {
            if !modes.contains(m) {
                modes.push(m.clone());
            }
        }
        modes
    }
}
