//! Per-cluster IAM authenticator reconciliation

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::certs::CertificateGenerator;
use super::{kubeconfig, manifests, CaMaterial, SYSTEM_NAMESPACE};
use crate::cancel::cancellable;
use crate::controller::client::{ClusterClient, ClusterKey};
use crate::controller::registry::RemoteClientRegistry;
use crate::controller::result::ReconcileResult;
use crate::crd::Cluster;
use crate::error::{Error, Result};

const IAM_CONFIG_REQUEUE: Duration = Duration::from_secs(10);
const KUBECONFIG_REQUEUE: Duration = Duration::from_secs(5);
const CLUSTER_CA_CERT_KEY: &str = "tls.crt";

pub struct Reconciler {
    certs: Arc<dyn CertificateGenerator>,
    cluster_id: Uuid,
    registry: Arc<dyn RemoteClientRegistry>,
}

fn cluster_namespace(cluster: &Cluster) -> String {
    cluster.namespace().unwrap_or_else(|| "default".to_string())
}

impl Reconciler {
    pub fn new(
        certs: Arc<dyn CertificateGenerator>,
        cluster_id: Uuid,
        registry: Arc<dyn RemoteClientRegistry>,
    ) -> Self {
        Self {
            certs,
            cluster_id,
            registry,
        }
    }

    pub fn cluster_id(&self) -> Uuid {
        self.cluster_id
    }

    /// Create the cluster's CA secret if it does not exist yet.
    ///
    /// Existing material is never touched. Losing a create race to another
    /// reconcile counts as success.
    pub async fn ensure_ca_secret(
        &self,
        cancel: &CancellationToken,
        client: &dyn ClusterClient,
        cluster: &Cluster,
    ) -> Result<ReconcileResult> {
        let name = super::ca_secret_name(&cluster.name_any());
        if cancellable(cancel, client.get_secret(SYSTEM_NAMESPACE, &name))
            .await?
            .is_some()
        {
            debug!(secret = %name, "CA secret already exists");
            return Ok(ReconcileResult::done());
        }

        let (cert, key) = self.certs.generate_self_signed_ca_key_pair()?;
        let ca = CaMaterial::for_cluster(&cluster.name_any(), cert, key);
        match cancellable(cancel, client.create_secret(&manifests::ca_secret(&ca))).await {
            Ok(()) => info!(secret = %name, namespace = SYSTEM_NAMESPACE, "Created CA secret"),
            Err(e) if e.is_already_exists() => {
                debug!(secret = %name, "CA secret created concurrently")
            }
            Err(e) => return Err(e),
        }
        Ok(ReconcileResult::done())
    }

    /// Bring the authenticator setup for one cluster up to date.
    #[instrument(skip(self, cancel, client, cluster), fields(name = %cluster.name_any(), namespace = cluster.namespace()))]
    pub async fn reconcile(
        &self,
        cancel: &CancellationToken,
        client: &dyn ClusterClient,
        cluster: &Cluster,
    ) -> Result<ReconcileResult> {
        let namespace = cluster_namespace(cluster);
        let key = ClusterKey::new(cluster.name_any(), &namespace);
        if cluster.metadata.deletion_timestamp.is_some() {
            debug!("Cluster is being deleted, dropping its client");
            self.registry.invalidate(&key).await;
            return Ok(ReconcileResult::done());
        }

        let mut result = self.ensure_ca_secret(cancel, client, cluster).await?;

        let Some(iam_ref) = cluster.iam_auth_ref() else {
            info!("AWS IAM authenticator not configured, skipping");
            return Ok(result);
        };
        let Some(iam_config) = cancellable(
            cancel,
            client.get_aws_iam_config(&namespace, &iam_ref.name),
        )
        .await?
        else {
            info!(config = %iam_ref.name, "AWSIamConfig not found yet, requeueing");
            return Ok(result.merge(ReconcileResult::requeue_after(IAM_CONFIG_REQUEUE)));
        };

        let remote = cancellable(cancel, self.registry.client_for(&key)).await?;
        if let Err(e) = self
            .reconcile_remote_resources(cancel, client, remote.as_ref(), cluster, &iam_config.spec)
            .await
        {
            // Stale credentials stay cached otherwise.
            if !e.is_cancelled() {
                self.registry.invalidate(&key).await;
            }
            return Err(e);
        }

        result = result.merge(self.ensure_kubeconfig_secret(cancel, client, cluster).await?);
        Ok(result)
    }

    /// Push the CA and authenticator configuration to the target cluster.
    pub async fn reconcile_remote_resources(
        &self,
        cancel: &CancellationToken,
        client: &dyn ClusterClient,
        remote: &dyn ClusterClient,
        cluster: &Cluster,
        iam_config: &crate::crd::AwsIamConfigSpec,
    ) -> Result<()> {
        let name = cluster.name_any();
        let secret_name = super::ca_secret_name(&name);
        let secret = cancellable(cancel, client.get_secret(SYSTEM_NAMESPACE, &secret_name))
            .await?
            .ok_or_else(|| Error::ConfigError(format!("CA secret {secret_name} not found")))?;
        let ca = manifests::ca_from_secret(&name, &secret).ok_or_else(|| {
            Error::ConfigError(format!("CA secret {secret_name} is missing cert or key"))
        })?;

        cancellable(cancel, remote.apply_secret(&manifests::remote_ca_secret(&ca)))
            .await
            .map_err(|e| e.wrap("applying authenticator CA secret"))?;
        let config = manifests::authenticator_config_map(self.cluster_id, iam_config)?;
        cancellable(cancel, remote.apply_config_map(&config))
            .await
            .map_err(|e| e.wrap("applying authenticator config"))?;
        let aws_auth = manifests::aws_auth_config_map(iam_config)?;
        cancellable(cancel, remote.apply_config_map(&aws_auth))
            .await
            .map_err(|e| e.wrap("applying aws-auth config map"))?;

        debug!("Applied authenticator resources to target cluster");
        Ok(())
    }

    /// Publish a kubeconfig that authenticates through the authenticator.
    ///
    /// Requeues while the cluster CA or control plane endpoint is not known.
    pub async fn ensure_kubeconfig_secret(
        &self,
        cancel: &CancellationToken,
        client: &dyn ClusterClient,
        cluster: &Cluster,
    ) -> Result<ReconcileResult> {
        let name = cluster.name_any();
        let namespace = cluster_namespace(cluster);

        let Some(host) = cluster
            .spec
            .control_plane_configuration
            .endpoint
            .as_ref()
            .map(|e| e.host.as_str())
            .filter(|h| !h.is_empty())
        else {
            debug!("Control plane endpoint not set, requeueing");
            return Ok(ReconcileResult::requeue_after(KUBECONFIG_REQUEUE));
        };

        let ca_name = super::cluster_ca_secret_name(&name);
        let cluster_ca = cancellable(cancel, client.get_secret(&namespace, &ca_name))
            .await?
            .and_then(|s| s.data)
            .and_then(|mut d| d.remove(CLUSTER_CA_CERT_KEY));
        let Some(cluster_ca) = cluster_ca else {
            debug!(secret = %ca_name, "Cluster CA not available yet, requeueing");
            return Ok(ReconcileResult::requeue_after(KUBECONFIG_REQUEUE));
        };

        let rendered = kubeconfig::render(&name, host, &cluster_ca.0, self.cluster_id)?;
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(super::kubeconfig_secret_name(&name)),
                namespace: Some(namespace),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                kubeconfig::KUBECONFIG_KEY.to_string(),
                ByteString(rendered.into_bytes()),
            )])),
            ..Default::default()
        };
        cancellable(cancel, client.apply_secret(&secret)).await?;
        Ok(ReconcileResult::done())
    }
}
