//! One operation's view of the local checkout for a cluster

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::files::FileGenerator;
use super::git::{CreateRepoOpts, GitClient, GitTools};
use crate::cancel::cancellable;
use crate::cluster::Spec;
use crate::crd::{GitOpsConfigSpec, GitOpsMode};
use crate::error::{Error, Result};
use crate::providers::{DatacenterConfig, MachineConfig};

pub const SYSTEM_DIR_NAME: &str = "eksa-system";
pub const REPOSITORY_DESCRIPTION: &str = "cluster-gitops cluster configuration repository";
pub const INIT_COMMIT_MESSAGE: &str = "initializing repository";

pub struct WorkingCopy<'a> {
    git: &'a GitTools,
    spec: &'a Spec,
    config: &'a GitOpsConfigSpec,
}

impl<'a> WorkingCopy<'a> {
    pub fn new(git: &'a GitTools, spec: &'a Spec) -> Result<Self> {
        let config = spec
            .gitops_spec()
            .ok_or_else(|| Error::ConfigError("cluster has no GitOpsConfig".to_string()))?;
        Ok(Self { git, spec, config })
    }

    fn client(&self) -> &dyn GitClient {
        self.git.client.as_ref()
    }

    pub fn branch(&self) -> &str {
        &self.config.branch
    }

    /// Repository path holding this management cluster's configuration
    pub fn path(&self) -> &str {
        &self.config.cluster_config_path
    }

    /// `<path>/<cluster>/eksa-system`
    pub fn system_dir(&self) -> String {
        format!("{}/{}/{}", self.path(), self.spec.name(), SYSTEM_DIR_NAME)
    }

    /// `<path>/<system namespace>`
    pub fn controller_dir(&self) -> String {
        format!("{}/{}", self.path(), self.config.system_namespace)
    }

    pub fn repository(&self) -> String {
        self.config.repository()
    }

    /// Absolute location of a checkout-relative path.
    pub fn local(&self, rel: &str) -> PathBuf {
        self.git.dir().join(rel)
    }

    pub fn file_generator(&self) -> FileGenerator {
        FileGenerator::new(
            self.local(&self.system_dir()),
            self.local(&self.controller_dir()),
        )
    }

    /// Make a checkout of the configured branch exist locally, creating the
    /// hosted repository first when it does not exist yet.
    pub async fn setup_repository(&self, cancel: &CancellationToken) -> Result<()> {
        match self.config.mode() {
            GitOpsMode::Hosted(gh) => {
                let existing = cancellable(cancel, self.client().get_repo()).await?;
                if existing.is_some() {
                    debug!(repository = %self.repository(), "Repository exists, cloning");
                    return self.clone_and_branch(cancel).await;
                }

                info!(repository = %self.repository(), "Creating repository");
                let opts = CreateRepoOpts {
                    name: gh.repository.clone(),
                    owner: gh.owner.clone(),
                    description: REPOSITORY_DESCRIPTION.to_string(),
                    personal: gh.personal,
                    privacy: true,
                };
                cancellable(cancel, self.client().create_repo(opts)).await?;
                cancellable(cancel, self.client().init()).await?;
                cancellable(cancel, self.client().commit(INIT_COMMIT_MESSAGE)).await?;
                cancellable(cancel, self.client().branch(self.branch())).await
            }
            GitOpsMode::Generic(_) => self.clone_and_branch(cancel).await,
            GitOpsMode::Disabled => Ok(()),
        }
    }

    async fn clone_and_branch(&self, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, self.client().clone_repo()).await?;
        cancellable(cancel, self.client().branch(self.branch())).await
    }

    /// Bring an existing checkout up to date, or clone when there is none.
    pub async fn sync(&self, cancel: &CancellationToken) -> Result<()> {
        if !self.local(".git").exists() {
            return self
                .clone_and_branch(cancel)
                .await
                .map_err(|e| e.wrap("cloning git repo"));
        }
        cancellable(cancel, self.client().branch(self.branch()))
            .await
            .map_err(|e| e.wrap(format!("switching to git branch {}", self.branch())))
    }

    /// A self-managed cluster must not reuse a path that already exists.
    pub fn validate_local_config_path(&self) -> Result<()> {
        if self.spec.cluster.is_self_managed() && self.local(self.path()).exists() {
            return Err(Error::ValidationError(format!(
                "a gitops config path {} already exists in the local repository",
                self.path()
            )));
        }
        Ok(())
    }

    pub async fn validate_remote_config_path(&self, cancel: &CancellationToken) -> Result<()> {
        let GitOpsMode::Hosted(gh) = self.config.mode() else {
            return Ok(());
        };
        if self.spec.cluster.is_managed() {
            return Ok(());
        }
        let exists = cancellable(
            cancel,
            self.client()
                .path_exists(&gh.owner, &gh.repository, self.branch(), self.path()),
        )
        .await
        .map_err(|e| e.wrap("failed validating remote flux config path"))?;
        if exists {
            return Err(Error::ValidationError(format!(
                "flux path {} already exists in remote repository",
                self.path()
            )));
        }
        Ok(())
    }

    /// Write every file for the cluster, then add, commit and push `path`.
    pub async fn commit_initial_config(
        &self,
        cancel: &CancellationToken,
        datacenter: &dyn DatacenterConfig,
        machines: &[&dyn MachineConfig],
        message: &str,
    ) -> Result<()> {
        info!(repository = %self.repository(), "Adding cluster configuration files to git");
        self.validate_local_config_path()?;

        let gen = self.file_generator();
        gen.write_cluster_files(self.spec, datacenter, machines)?;
        if self.spec.cluster.is_self_managed() {
            gen.write_controller_files(self.spec)?;
        }

        let path = self.path().to_string();
        cancellable(cancel, self.client().add(&path))
            .await
            .map_err(|e| e.wrap(format!("adding {path} to git")))?;
        self.commit_and_push(cancel, &path, message).await
    }

    pub async fn commit_and_push(
        &self,
        cancel: &CancellationToken,
        path: &str,
        message: &str,
    ) -> Result<()> {
        cancellable(cancel, self.client().commit(message))
            .await
            .map_err(|e| e.wrap(format!("committing {path} to git")))?;
        cancellable(cancel, self.client().push())
            .await
            .map_err(|e| e.wrap(format!("pushing {path} to git")))
    }
}
