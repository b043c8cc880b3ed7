//! GitOps orchestrator
//!
//! Commits cluster configuration to the repository Flux reconciles from,
//! bootstraps Flux, and pauses, resumes or tears down reconciliation.
//! Every operation is a no-op when the cluster has no GitOps configuration.

use std::sync::Arc;

use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::flux_client::GitOpsFluxClient;
use super::git::GitTools;
use super::validations::Validation;
use super::working_copy::WorkingCopy;
use crate::cancel::cancellable;
use crate::cluster::{Spec, TargetCluster};
use crate::config::CliConfig;
use crate::crd::{Cluster, GitOpsConfigSpec, GitOpsMode};
use crate::error::Result;
use crate::providers::{DatacenterConfig, MachineConfig, Provider};

pub const INITIAL_COMMIT_MESSAGE: &str =
    "Initial commit of cluster configuration; generated by cluster-gitops CLI";
pub const UPDATE_COMMIT_MESSAGE: &str =
    "Update commit of cluster configuration; generated by cluster-gitops CLI";
pub const DELETE_COMMIT_MESSAGE: &str =
    "Delete commit of cluster configuration; generated by cluster-gitops CLI";

pub const FLUX_PATH_VALIDATION: &str = "Flux path";
pub const FLUX_PATH_REMEDIATION: &str = "Please provide a different path or different cluster name";

#[derive(Clone, Copy, Debug)]
enum Toggle {
    Disable,
    Enable,
}

impl Toggle {
    fn verb(self) -> &'static str {
        match self {
            Toggle::Disable => "disable",
            Toggle::Enable => "enable",
        }
    }
}

pub struct Flux {
    flux_client: Arc<dyn GitOpsFluxClient>,
    git: Option<GitTools>,
    cli_config: CliConfig,
}

impl Flux {
    /// `git` is `None` when no working copy is available, which disables
    /// every repository-touching operation.
    pub fn new(
        flux_client: Arc<dyn GitOpsFluxClient>,
        git: Option<GitTools>,
        cli_config: CliConfig,
    ) -> Self {
        Self {
            flux_client,
            git,
            cli_config,
        }
    }

    fn enabled<'s>(
        &'s self,
        spec: &'s Spec,
        operation: &str,
    ) -> Option<(&'s GitTools, &'s GitOpsConfigSpec)> {
        let config = configured(spec, operation)?;
        let Some(git) = &self.git else {
            info!(cluster = %spec.name(), "No git working copy configured, {operation} skipped");
            return None;
        };
        Some((git, config))
    }

    /// Set up the repository, commit the cluster's configuration, then
    /// bootstrap Flux against it.
    #[instrument(skip_all, fields(cluster = %cluster.name))]
    pub async fn install_gitops(
        &self,
        cancel: &CancellationToken,
        cluster: &TargetCluster,
        spec: &Spec,
        datacenter: &dyn DatacenterConfig,
        machines: &[&dyn MachineConfig],
    ) -> Result<()> {
        let Some((git, _)) = self.enabled(spec, "bootstrap flux") else {
            return Ok(());
        };
        let wc = WorkingCopy::new(git, spec)?;

        wc.setup_repository(cancel).await?;
        wc.commit_initial_config(cancel, datacenter, machines, INITIAL_COMMIT_MESSAGE)
            .await?;
        self.bootstrap(cancel, cluster, spec).await?;

        debug!(branch = %wc.branch(), "Pulling from remote after Flux bootstrap");
        if let Err(e) = cancellable(cancel, git.client.pull(wc.branch())).await {
            error!(
                branch = %wc.branch(),
                error = %e,
                "Failed pulling from remote after Flux bootstrap; run `git pull` to bring the local repository up to date"
            );
        }
        Ok(())
    }

    /// Run the hosted then the generic bootstrap step. A failed step
    /// uninstalls whatever was installed before returning the error.
    pub async fn bootstrap(
        &self,
        cancel: &CancellationToken,
        cluster: &TargetCluster,
        spec: &Spec,
    ) -> Result<()> {
        if let Err(e) = self.bootstrap_github(cancel, cluster, spec).await {
            let _ = self.uninstall(cancel, cluster, spec).await;
            return Err(e.wrap("installing GitHub gitops"));
        }
        if let Err(e) = self.bootstrap_git(cancel, cluster, spec).await {
            let _ = self.uninstall(cancel, cluster, spec).await;
            return Err(e.wrap("installing generic git gitops"));
        }
        Ok(())
    }

    pub async fn bootstrap_github(
        &self,
        cancel: &CancellationToken,
        cluster: &TargetCluster,
        spec: &Spec,
    ) -> Result<()> {
        if cluster.existing_management {
            return Ok(());
        }
        let (GitOpsMode::Hosted(_), Some(config)) = (spec.gitops_mode(), spec.gitops_spec()) else {
            return Ok(());
        };
        cancellable(cancel, self.flux_client.bootstrap_github(cluster, config)).await
    }

    pub async fn bootstrap_git(
        &self,
        cancel: &CancellationToken,
        cluster: &TargetCluster,
        spec: &Spec,
    ) -> Result<()> {
        if cluster.existing_management {
            return Ok(());
        }
        let (GitOpsMode::Generic(_), Some(config)) = (spec.gitops_mode(), spec.gitops_spec()) else {
            return Ok(());
        };
        cancellable(
            cancel,
            self.flux_client
                .bootstrap_git(cluster, config, &self.cli_config),
        )
        .await
    }

    pub async fn uninstall(
        &self,
        cancel: &CancellationToken,
        cluster: &TargetCluster,
        spec: &Spec,
    ) -> Result<()> {
        let Some(config) = configured(spec, "uninstall flux") else {
            return Ok(());
        };
        if let Err(e) = cancellable(cancel, self.flux_client.uninstall(cluster, config)).await {
            info!(cluster = %cluster.name, error = %e, "Could not uninstall flux components");
            return Err(e);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(cluster = %cluster.name))]
    pub async fn pause_cluster_resources_reconcile(
        &self,
        cancel: &CancellationToken,
        cluster: &TargetCluster,
        spec: &Spec,
        provider: &dyn Provider,
    ) -> Result<()> {
        if self.enabled(spec, "pause cluster resources reconcile").is_none() {
            return Ok(());
        }
        debug!("Pausing Flux reconcile of cluster resources");
        self.toggle_resources(cancel, cluster, spec, provider, Toggle::Disable)
            .await
    }

    #[instrument(skip_all, fields(cluster = %cluster.name))]
    pub async fn resume_cluster_resources_reconcile(
        &self,
        cancel: &CancellationToken,
        cluster: &TargetCluster,
        spec: &Spec,
        provider: &dyn Provider,
    ) -> Result<()> {
        if self.enabled(spec, "resume cluster resources reconcile").is_none() {
            return Ok(());
        }
        debug!("Resuming Flux reconcile of cluster resources");
        self.toggle_resources(cancel, cluster, spec, provider, Toggle::Enable)
            .await
    }

    async fn toggle_resources(
        &self,
        cancel: &CancellationToken,
        cluster: &TargetCluster,
        spec: &Spec,
        provider: &dyn Provider,
        toggle: Toggle,
    ) -> Result<()> {
        let namespace = spec
            .cluster
            .namespace()
            .unwrap_or_else(|| "default".to_string());

        let mut targets = vec![
            (Cluster::resource_type(), spec.name()),
            (
                provider.datacenter_resource_type(),
                spec.cluster.spec.datacenter_ref.name.clone(),
            ),
        ];
        if let Some(machine_type) = provider.machine_resource_type() {
            for r in spec.cluster.machine_config_refs() {
                targets.push((machine_type.clone(), r.name));
            }
        }

        for (resource_type, name) in targets {
            let call = match toggle {
                Toggle::Disable => self.flux_client.disable_resource_reconcile(
                    cluster,
                    &resource_type,
                    &name,
                    &namespace,
                ),
                Toggle::Enable => self.flux_client.enable_resource_reconcile(
                    cluster,
                    &resource_type,
                    &name,
                    &namespace,
                ),
            };
            cancellable(cancel, call).await.map_err(|e| {
                e.wrap(format!(
                    "{} resource {resource_type} {name} from Flux reconcile",
                    toggle.verb()
                ))
            })?;
        }
        Ok(())
    }

    pub async fn pause_gitops_kustomization(
        &self,
        cancel: &CancellationToken,
        cluster: &TargetCluster,
        spec: &Spec,
    ) -> Result<()> {
        let Some((_, config)) = self.enabled(spec, "pause flux kustomization") else {
            return Ok(());
        };
        let live = cancellable(cancel, self.flux_client.get_cluster(cluster, spec)).await?;
        if live.spec.git_ops_ref.is_none() {
            info!(
                cluster = %cluster.name,
                "GitOps not enabled in the existing cluster, pause flux kustomization skipped"
            );
            return Ok(());
        }
        debug!(namespace = %config.system_namespace, "Pausing reconciliation of all Kustomizations");
        cancellable(cancel, self.flux_client.suspend_kustomization(cluster, config)).await
    }

    pub async fn resume_gitops_kustomization(
        &self,
        cancel: &CancellationToken,
        cluster: &TargetCluster,
        spec: &Spec,
    ) -> Result<()> {
        let Some((_, config)) = self.enabled(spec, "resume flux kustomization") else {
            return Ok(());
        };
        debug!(namespace = %config.system_namespace, "Resuming reconciliation of all Kustomizations");
        cancellable(cancel, self.flux_client.resume_kustomization(cluster, config)).await
    }

    pub async fn force_reconcile_git_repo(
        &self,
        cancel: &CancellationToken,
        cluster: &TargetCluster,
        spec: &Spec,
    ) -> Result<()> {
        let Some((_, config)) = self.enabled(spec, "force reconcile flux git repo") else {
            return Ok(());
        };
        cancellable(
            cancel,
            self.flux_client
                .force_reconcile(cluster, &config.system_namespace),
        )
        .await
    }

    /// Re-render the cluster files and push them to the configured branch.
    #[instrument(skip_all, fields(cluster = %spec.name()))]
    pub async fn update_git_eksa_spec(
        &self,
        cancel: &CancellationToken,
        spec: &Spec,
        datacenter: &dyn DatacenterConfig,
        machines: &[&dyn MachineConfig],
    ) -> Result<()> {
        let Some((git, _)) = self.enabled(spec, "update git repo") else {
            return Ok(());
        };
        let wc = WorkingCopy::new(git, spec)?;
        wc.sync(cancel).await?;

        wc.file_generator()
            .write_cluster_files(spec, datacenter, machines)?;

        let path = wc.system_dir();
        cancellable(cancel, git.client.add(&path))
            .await
            .map_err(|e| e.wrap(format!("adding {path} to git")))?;
        wc.commit_and_push(cancel, &path, UPDATE_COMMIT_MESSAGE)
            .await?;
        info!(repository = %wc.repository(), "Finished pushing updated cluster config file to git");
        Ok(())
    }

    /// Checks to run before install. Empty when GitOps is disabled.
    pub fn validations<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        spec: &'a Spec,
    ) -> Vec<Validation<'a>> {
        let Some((git, _)) = self.enabled(spec, "flux validations") else {
            return Vec::new();
        };
        vec![Validation::new(
            FLUX_PATH_VALIDATION,
            FLUX_PATH_REMEDIATION,
            async move {
                WorkingCopy::new(git, spec)?
                    .validate_remote_config_path(cancel)
                    .await
            },
        )]
    }

    /// Remove the cluster's files from the repository. A workload cluster
    /// only loses its own system dir; a management cluster loses its whole path.
    #[instrument(skip_all, fields(cluster = %spec.name()))]
    pub async fn cleanup_git_repo(&self, cancel: &CancellationToken, spec: &Spec) -> Result<()> {
        let Some((git, _)) = self.enabled(spec, "clean up git repo") else {
            return Ok(());
        };
        let wc = WorkingCopy::new(git, spec)?;
        wc.sync(cancel).await?;

        let target = if spec.cluster.is_managed() {
            wc.system_dir()
        } else {
            wc.path().to_string()
        };
        if !wc.local(&target).exists() {
            debug!(path = %target, "Cluster dir does not exist in git, skip clean up");
            return Ok(());
        }

        cancellable(cancel, git.client.remove(&target))
            .await
            .map_err(|e| e.wrap(format!("removing {target} in git")))?;
        wc.commit_and_push(cancel, &target, DELETE_COMMIT_MESSAGE)
            .await?;
        info!(repository = %wc.repository(), "Finished cleaning up cluster files in git");
        Ok(())
    }
}

/// The cluster's GitOps config, or `None` after logging the skip.
fn configured<'s>(spec: &'s Spec, operation: &str) -> Option<&'s GitOpsConfigSpec> {
    let config = spec.gitops_spec().filter(|c| !c.mode().is_disabled());
    if config.is_none() {
        info!(cluster = %spec.name(), "GitOps not configured, {operation} skipped");
    }
    config
}
