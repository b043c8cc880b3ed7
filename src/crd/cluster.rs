//! Cluster Custom Resource Definition
//!
//! A `Cluster` describes one management or workload cluster: its topology,
//! the provider objects it references, and whether GitOps and IAM
//! authentication are configured for it.

use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    Condition, ControlPlaneConfiguration, ExternalEtcdConfiguration, ManagementCluster, Ref,
    WorkerNodeGroupConfiguration,
};

/// Kind used in `identityProviderRefs` for IAM authenticator configuration
pub const AWS_IAM_CONFIG_KIND: &str = "AWSIamConfig";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "anywhere.clusterops.io",
    version = "v1alpha1",
    kind = "Cluster",
    namespaced,
    status = "ClusterStatus",
    shortname = "cl",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.kubernetesVersion"}"#,
    printcolumn = r#"{"name":"Management","type":"string","jsonPath":".spec.managementCluster.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub kubernetes_version: String,

    pub control_plane_configuration: ControlPlaneConfiguration,

    #[serde(default)]
    pub worker_node_group_configurations: Vec<WorkerNodeGroupConfiguration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_etcd_configuration: Option<ExternalEtcdConfiguration>,

    pub datacenter_ref: Ref,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ops_ref: Option<Ref>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identity_provider_refs: Vec<Ref>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_cluster: Option<ManagementCluster>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Cluster {
    /// A cluster with no management cluster, or one naming itself, runs its
    /// own lifecycle controllers.
    pub fn is_self_managed(&self) -> bool {
        match &self.spec.management_cluster {
            Some(m) => m.name.is_empty() || m.name == self.name_any(),
            None => true,
        }
    }

    pub fn is_managed(&self) -> bool {
        !self.is_self_managed()
    }

    /// Name of the cluster whose controllers own this one.
    pub fn management_cluster_name(&self) -> String {
        match &self.spec.management_cluster {
            Some(m) if !m.name.is_empty() => m.name.clone(),
            _ => self.name_any(),
        }
    }

    /// Fully qualified resource type, as used by kubectl.
    pub fn resource_type() -> String {
        format!("clusters.{}", Cluster::group(&()))
    }

    /// Machine config references from control plane, etcd and worker node
    /// groups, de-duplicated by name, in that order.
    pub fn machine_config_refs(&self) -> Vec<Ref> {
        let mut refs: Vec<Ref> = Vec::new();
        let candidates = std::iter::once(
            self.spec
                .control_plane_configuration
                .machine_group_ref
                .as_ref(),
        )
        .chain(std::iter::once(
            self.spec
                .external_etcd_configuration
                .as_ref()
                .and_then(|e| e.machine_group_ref.as_ref()),
        ))
        .chain(
            self.spec
                .worker_node_group_configurations
                .iter()
                .map(|w| w.machine_group_ref.as_ref()),
        );

        for r in candidates.flatten() {
            if !refs.iter().any(|existing| existing.name == r.name) {
                refs.push(r.clone());
            }
        }
        refs
    }

    /// The IAM authenticator config this cluster references, if any.
    pub fn iam_auth_ref(&self) -> Option<&Ref> {
        self.spec
            .identity_provider_refs
            .iter()
            .find(|r| r.kind == AWS_IAM_CONFIG_KIND)
    }
}
