//! Custom Resource Definitions for cluster-gitops
//!
//! `Cluster`, `GitOpsConfig` and `AWSIamConfig` objects live in the
//! management cluster alongside the configuration committed to git.

mod aws_iam_config;
mod cluster;
mod gitops_config;
pub mod types;


pub use aws_iam_config::{
    AwsIamConfig, AwsIamConfigSpec, MapRoles, MapUsers, BACKEND_MODE_CONFIG_MAP,
    DEFAULT_PARTITION,
};
pub use cluster::{Cluster, ClusterSpec, ClusterStatus, AWS_IAM_CONFIG_KIND};
pub use gitops_config::{
    GitOpsConfig, GitOpsConfigSpec, GitOpsMode, GitProviderConfig, GithubProviderConfig,
    DEFAULT_BRANCH, DEFAULT_SYSTEM_NAMESPACE,
};
pub use types::*;
