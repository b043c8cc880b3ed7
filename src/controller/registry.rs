//! Routes a cluster identity to an API client for that cluster

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
#[cfg(test)]
use mockall::automock;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::client::{ClusterClient, ClusterKey, KubeClusterClient};
use crate::error::{Error, Result};

/// Data key holding the kubeconfig in a CAPI `<cluster>-kubeconfig` secret
pub const KUBECONFIG_SECRET_KEY: &str = "value";

pub fn kubeconfig_secret_name(cluster: &str) -> String {
    format!("{cluster}-kubeconfig")
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteClientRegistry: Send + Sync {
    async fn client_for(&self, key: &ClusterKey) -> Result<Arc<dyn ClusterClient>>;

    /// Drop any cached client, so the next lookup reads the kubeconfig again.
    async fn invalidate(&self, key: &ClusterKey);
}

/// Builds workload cluster clients from the kubeconfig secrets on the
/// management cluster and keeps them for reuse.
pub struct KubeconfigClientRegistry {
    management: Client,
    management_name: String,
    cache: RwLock<HashMap<ClusterKey, Arc<dyn ClusterClient>>>,
}

impl KubeconfigClientRegistry {
    pub fn new(management: Client, management_name: impl Into<String>) -> Self {
        Self {
            management,
            management_name: management_name.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn build(&self, key: &ClusterKey) -> Result<Arc<dyn ClusterClient>> {
        let secrets: Api<Secret> = Api::namespaced(self.management.clone(), &key.namespace);
        let name = kubeconfig_secret_name(&key.name);
        let secret = secrets.get_opt(&name).await?.ok_or_else(|| {
            Error::ConfigError(format!("kubeconfig secret {}/{name} not found", key.namespace))
        })?;
        let client = client_from_kubeconfig_secret(&secret).await?;
        Ok(Arc::new(KubeClusterClient::new(client)))
    }
}

pub async fn client_from_kubeconfig_secret(secret: &Secret) -> Result<Client> {
    let raw = secret
        .data
        .as_ref()
        .and_then(|d| d.get(KUBECONFIG_SECRET_KEY))
        .ok_or_else(|| {
            Error::ConfigError(format!(
                "secret has no {KUBECONFIG_SECRET_KEY} key"
            ))
        })?;
    let yaml = std::str::from_utf8(&raw.0)
        .map_err(|e| Error::ConfigError(format!("kubeconfig is not UTF-8: {e}")))?;
    let kubeconfig = Kubeconfig::from_yaml(yaml)
        .map_err(|e| Error::ConfigError(format!("parsing kubeconfig: {e}")))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::ConfigError(format!("loading kubeconfig: {e}")))?;
    Ok(Client::try_from(config)?)
}

#[async_trait]
impl RemoteClientRegistry for KubeconfigClientRegistry {
    async fn client_for(&self, key: &ClusterKey) -> Result<Arc<dyn ClusterClient>> {
        if key.name == self.management_name {
            return Ok(Arc::new(KubeClusterClient::new(self.management.clone())));
        }
        if let Some(client) = self.cache.read().await.get(key) {
            debug!(cluster = %key, "Using cached client");
            return Ok(Arc::clone(client));
        }

        // Built without the lock held; a concurrent build for the same key
        // loses to whichever insert lands first.
        let client = self.build(key).await?;
        info!(cluster = %key, "Built client for workload cluster");
        let mut cache = self.cache.write().await;
        Ok(Arc::clone(cache.entry(key.clone()).or_insert(client)))
    }

    async fn invalidate(&self, key: &ClusterKey) {
        if self.cache.write().await.remove(key).is_some() {
            debug!(cluster = %key, "Dropped cached client");
        }
    }
}
