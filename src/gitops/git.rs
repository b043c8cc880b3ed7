//! Git working copy client abstraction

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::error::Result;

/// A repository as reported by the hosting service
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
    pub owner: String,
    pub organization: String,
    pub clone_url: String,
}

/// Options for creating a hosted repository
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateRepoOpts {
    pub name: String,
    pub owner: String,
    pub description: String,
    /// Create under the authenticated user instead of an organization
    pub personal: bool,
    pub privacy: bool,
}

/// Operations on one local checkout of the configuration repository.
///
/// Paths passed to `add` and `remove` are relative to the checkout root.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Look up the remote repository; `None` when it does not exist.
    async fn get_repo(&self) -> Result<Option<Repository>>;

    async fn create_repo(&self, opts: CreateRepoOpts) -> Result<()>;

    async fn clone_repo(&self) -> Result<()>;

    async fn push(&self) -> Result<()>;

    async fn pull(&self, branch: &str) -> Result<()>;

    /// Whether `path` exists on `branch` of the remote repository.
    async fn path_exists(&self, owner: &str, repo: &str, branch: &str, path: &str)
        -> Result<bool>;

    async fn add(&self, path: &str) -> Result<()>;

    async fn remove(&self, path: &str) -> Result<()>;

    async fn commit(&self, message: &str) -> Result<()>;

    /// Check out `name`, creating it when missing and pulling it when the
    /// remote already has it.
    async fn branch(&self, name: &str) -> Result<()>;

    async fn init(&self) -> Result<()>;
}

/// A git client bound to the directory its checkout lives in
#[derive(Clone)]
pub struct GitTools {
    pub client: Arc<dyn GitClient>,
    pub dir: PathBuf,
}

impl GitTools {
    pub fn new(client: Arc<dyn GitClient>, dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl std::fmt::Debug for GitTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitTools").field("dir", &self.dir).finish()
    }
}
