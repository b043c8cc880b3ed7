//! Kubernetes API access used by the reconcilers

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
#[cfg(test)]
use mockall::automock;
use tracing::debug;

use crate::crd::AwsIamConfig;
use crate::error::{Error, Result};

pub const FIELD_MANAGER: &str = "cluster-gitops";

/// Identifies a cluster by its `Cluster` object's name and namespace
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClusterKey {
    pub name: String,
    pub namespace: String,
}

impl ClusterKey {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reads and writes against one cluster's API server.
///
/// `create_secret` fails with a 409 when the secret already exists;
/// `apply_*` use server-side apply and overwrite.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;

    async fn create_secret(&self, secret: &Secret) -> Result<()>;

    async fn apply_secret(&self, secret: &Secret) -> Result<()>;

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<()>;

    async fn get_aws_iam_config(&self, namespace: &str, name: &str)
        -> Result<Option<AwsIamConfig>>;
}

/// `ClusterClient` over a `kube::Client`
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn namespace_of<K: ResourceExt>(obj: &K) -> Result<String> {
    obj.namespace()
        .ok_or_else(|| Error::ConfigError(format!("{} has no namespace", obj.name_any())))
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace_of(secret)?);
        api.create(&PostParams::default(), secret).await?;
        debug!(name = %secret.name_any(), "Created secret");
        Ok(())
    }

    async fn apply_secret(&self, secret: &Secret) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace_of(secret)?);
        api.patch(
            &secret.name_any(),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(secret),
        )
        .await?;
        Ok(())
    }

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        let api: Api<ConfigMap> =
            Api::namespaced(self.client.clone(), &namespace_of(config_map)?);
        api.patch(
            &config_map.name_any(),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(config_map),
        )
        .await?;
        Ok(())
    }

    async fn get_aws_iam_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AwsIamConfig>> {
        let api: Api<AwsIamConfig> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}
