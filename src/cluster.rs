//! Cluster identity and cluster config file loading
//!
//! A cluster config file is a multi-document YAML holding one `Cluster`,
//! optionally the `GitOpsConfig` and `AWSIamConfig` it references, and the
//! provider datacenter and machine objects.

use std::path::{Path, PathBuf};

use kube::ResourceExt;
use serde::Deserialize;
use tracing::debug;

use crate::crd::{
    AwsIamConfig, Cluster, GitOpsConfig, GitOpsConfigSpec, GitOpsMode, AWS_IAM_CONFIG_KIND,
};
use crate::error::{Error, Result};
use crate::providers::{GenericProvider, GenericProviderObject};

const CLUSTER_KIND: &str = "Cluster";
const GITOPS_CONFIG_KIND: &str = "GitOpsConfig";

/// The cluster an operation acts on
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetCluster {
    pub name: String,
    /// Kubeconfig for the cluster's API server; the ambient config when unset.
    pub kubeconfig: Option<PathBuf>,
    /// The cluster is being adopted by an existing management cluster that
    /// already runs Flux, so bootstrap must not run again.
    pub existing_management: bool,
}

impl TargetCluster {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_kubeconfig(mut self, kubeconfig: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(kubeconfig.into());
        self
    }

    pub fn with_existing_management(mut self, existing: bool) -> Self {
        self.existing_management = existing;
        self
    }
}

/// A `Cluster` together with the GitOps configuration it references
#[derive(Clone, Debug)]
pub struct Spec {
    pub cluster: Cluster,
    pub gitops_config: Option<GitOpsConfig>,
}

impl Spec {
    pub fn new(cluster: Cluster, gitops_config: Option<GitOpsConfig>) -> Self {
        Self {
            cluster,
            gitops_config,
        }
    }

    pub fn name(&self) -> String {
        self.cluster.name_any()
    }

    pub fn gitops_mode(&self) -> GitOpsMode<'_> {
        match &self.gitops_config {
            Some(cfg) => cfg.spec.mode(),
            None => GitOpsMode::Disabled,
        }
    }

    pub fn gitops_spec(&self) -> Option<&GitOpsConfigSpec> {
        self.gitops_config.as_ref().map(|c| &c.spec)
    }
}

/// Everything a cluster config file declares
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    pub spec: Spec,
    pub datacenter: GenericProviderObject,
    pub machines: Vec<GenericProviderObject>,
    pub aws_iam_config: Option<AwsIamConfig>,
}

impl ClusterConfig {
    /// Provider view derived from the kinds the cluster references.
    pub fn provider(&self) -> GenericProvider {
        GenericProvider {
            datacenter_kind: self.spec.cluster.spec.datacenter_ref.kind.clone(),
            machine_kind: self
                .spec
                .cluster
                .machine_config_refs()
                .first()
                .map(|r| r.kind.clone()),
        }
    }
}

pub fn load_cluster_config(path: &Path) -> Result<ClusterConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!(
            "reading cluster config {}: {e}",
            path.display()
        ))
    })?;
    parse_cluster_config(&contents)
}

pub fn parse_cluster_config(contents: &str) -> Result<ClusterConfig> {
    let mut documents = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(contents) {
        let value = serde_yaml::Value::deserialize(doc)?;
        if value.is_null() {
            continue;
        }
        documents.push(value);
    }

    let cluster: Cluster = take_single(&documents, CLUSTER_KIND, None)?
        .ok_or_else(|| Error::ConfigError("cluster config has no Cluster object".to_string()))?;
    let cluster_name = cluster.name_any();
    debug!(cluster = %cluster_name, documents = documents.len(), "Parsed cluster config");

    let gitops_config = match &cluster.spec.git_ops_ref {
        Some(r) if r.kind == GITOPS_CONFIG_KIND => {
            let mut cfg: GitOpsConfig = take_single(&documents, GITOPS_CONFIG_KIND, Some(&r.name))?
                .ok_or_else(|| {
                    Error::ConfigError(format!("GitOpsConfig {} not found in cluster config", r.name))
                })?;
            cfg.spec.set_defaults(&cluster.management_cluster_name());
            cfg.spec
                .validate()
                .map_err(|e| Error::ValidationError(format!("GitOpsConfig {}: {e}", r.name)))?;
            Some(cfg)
        }
        Some(r) => {
            return Err(Error::ConfigError(format!(
                "unsupported gitOpsRef kind {}",
                r.kind
            )))
        }
        None => None,
    };

    let aws_iam_config = match cluster.iam_auth_ref() {
        Some(r) => take_single(&documents, AWS_IAM_CONFIG_KIND, Some(&r.name))?,
        None => None,
    };

    let dc_ref = &cluster.spec.datacenter_ref;
    let datacenter = find_object(&documents, &dc_ref.kind, &dc_ref.name)?.ok_or_else(|| {
        Error::ConfigError(format!(
            "{} {} not found in cluster config",
            dc_ref.kind, dc_ref.name
        ))
    })?;

    let mut machines = Vec::new();
    for r in cluster.machine_config_refs() {
        let machine = find_object(&documents, &r.kind, &r.name)?.ok_or_else(|| {
            Error::ConfigError(format!("{} {} not found in cluster config", r.kind, r.name))
        })?;
        machines.push(machine);
    }

    Ok(ClusterConfig {
        spec: Spec::new(cluster, gitops_config),
        datacenter,
        machines,
        aws_iam_config,
    })
}

fn doc_kind(doc: &serde_yaml::Value) -> Option<&str> {
    doc.get("kind").and_then(serde_yaml::Value::as_str)
}

fn doc_name(doc: &serde_yaml::Value) -> Option<&str> {
    doc.get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(serde_yaml::Value::as_str)
}

fn matching<'a>(
    documents: &'a [serde_yaml::Value],
    kind: &'a str,
    name: Option<&'a str>,
) -> impl Iterator<Item = &'a serde_yaml::Value> + 'a {
    documents
        .iter()
        .filter(move |d| doc_kind(d) == Some(kind) && name.map_or(true, |n| doc_name(d) == Some(n)))
}

fn take_single<T: serde::de::DeserializeOwned>(
    documents: &[serde_yaml::Value],
    kind: &str,
    name: Option<&str>,
) -> Result<Option<T>> {
    let mut found = matching(documents, kind, name);
    let Some(first) = found.next() else {
        return Ok(None);
    };
    if found.next().is_some() {
        return Err(Error::ConfigError(format!(
            "cluster config has more than one {kind}{}",
            name.map(|n| format!(" named {n}")).unwrap_or_default()
        )));
    }
    Ok(Some(serde_yaml::from_value(first.clone())?))
}

fn find_object(
    documents: &[serde_yaml::Value],
    kind: &str,
    name: &str,
) -> Result<Option<GenericProviderObject>> {
    match matching(documents, kind, Some(name)).next() {
        Some(doc) => {
            let manifest = serde_json::to_value(doc)?;
            Ok(Some(GenericProviderObject::from_manifest(manifest)?))
        }
        None => Ok(None),
    }
}
