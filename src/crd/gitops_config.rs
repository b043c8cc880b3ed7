//! GitOpsConfig Custom Resource Definition
//!
//! Describes the git repository a cluster's configuration is committed to
//! and which Flux bootstrap backend installs the controller.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SYSTEM_NAMESPACE: &str = "flux-system";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_SSH_KEY_ALGORITHM: &str = "ecdsa";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "anywhere.clusterops.io",
    version = "v1alpha1",
    kind = "GitOpsConfig",
    namespaced,
    printcolumn = r#"{"name":"Branch","type":"string","jsonPath":".spec.branch"}"#,
    printcolumn = r#"{"name":"Path","type":"string","jsonPath":".spec.clusterConfigPath"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsConfigSpec {
    /// Namespace the Flux controllers are installed into
    #[serde(default = "default_system_namespace")]
    pub system_namespace: String,

    /// Repository path holding cluster configuration. Defaults to
    /// `clusters/<management cluster name>`.
    #[serde(default)]
    pub cluster_config_path: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Hosted (GitHub) backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<GithubProviderConfig>,

    /// Generic git backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitProviderConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GithubProviderConfig {
    pub owner: String,
    pub repository: String,
    /// The repository belongs to a user account rather than an organization
    #[serde(default)]
    pub personal: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitProviderConfig {
    pub repository_url: String,
    #[serde(default = "default_ssh_key_algorithm")]
    pub ssh_key_algorithm: String,
}

fn default_system_namespace() -> String {
    DEFAULT_SYSTEM_NAMESPACE.to_string()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_ssh_key_algorithm() -> String {
    DEFAULT_SSH_KEY_ALGORITHM.to_string()
}

/// Which bootstrap backend is active for a cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GitOpsMode<'a> {
    Disabled,
    Hosted(&'a GithubProviderConfig),
    Generic(&'a GitProviderConfig),
}

impl<'a> GitOpsMode<'a> {
    pub fn is_disabled(&self) -> bool {
        matches!(self, GitOpsMode::Disabled)
    }
}

impl GitOpsConfigSpec {
    /// Active backend. `validate` rejects specs with both backends set;
    /// an unvalidated spec with both prefers the hosted one.
    pub fn mode(&self) -> GitOpsMode<'_> {
        match (&self.github, &self.git) {
            (Some(gh), _) => GitOpsMode::Hosted(gh),
            (None, Some(g)) => GitOpsMode::Generic(g),
            (None, None) => GitOpsMode::Disabled,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.github.is_some() && self.git.is_some() {
            return Err("only one of spec.github or spec.git may be set".to_string());
        }
        if let Some(gh) = &self.github {
            if gh.owner.is_empty() || gh.repository.is_empty() {
                return Err("spec.github.owner and spec.github.repository are required".to_string());
            }
        }
        if let Some(g) = &self.git {
            if g.repository_url.is_empty() {
                return Err("spec.git.repositoryUrl is required".to_string());
            }
        }
        if self.branch.is_empty() {
            return Err("spec.branch must not be empty".to_string());
        }
        Ok(())
    }

    /// Fill in the config path from the management cluster name when unset.
    pub fn set_defaults(&mut self, management_cluster_name: &str) {
        if self.cluster_config_path.is_empty() {
            self.cluster_config_path = format!("clusters/{management_cluster_name}");
        }
        if self.system_namespace.is_empty() {
            self.system_namespace = default_system_namespace();
        }
        if self.branch.is_empty() {
            self.branch = default_branch();
        }
    }

    /// Human readable repository coordinates for logging.
    pub fn repository(&self) -> String {
        match self.mode() {
            GitOpsMode::Hosted(gh) => format!("{}/{}", gh.owner, gh.repository),
            GitOpsMode::Generic(g) => g.repository_url.clone(),
            GitOpsMode::Disabled => String::new(),
        }
    }
}
