//! `GitClient` backed by the `git` binary
//!
//! Hosted repositories authenticate with a token embedded in the https
//! remote; generic repositories authenticate over SSH with a private key.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::git::{CreateRepoOpts, GitClient, Repository};
use super::github::GithubApi;
use crate::config::CliConfig;
use crate::crd::{GitProviderConfig, GithubProviderConfig};
use crate::error::{Error, Result};

const GITHUB_HOST: &str = "github.com";
const REMOTE: &str = "origin";

#[derive(Clone, Debug)]
struct Hosted {
    api: GithubApi,
    owner: String,
    repository: String,
}

/// Runs git commands in one checkout directory
#[derive(Clone, Debug)]
pub struct GitCli {
    dir: PathBuf,
    remote_url: String,
    hosted: Option<Hosted>,
    ssh_command: Option<String>,
    secret: Option<String>,
    author_name: String,
    author_email: String,
}

impl GitCli {
    /// Client for a repository on the hosted service. Requires a token.
    pub fn for_github(
        dir: impl Into<PathBuf>,
        github: &GithubProviderConfig,
        config: &CliConfig,
    ) -> Result<Self> {
        let token = config.github_token.clone().ok_or_else(|| {
            Error::ConfigError("GITHUB_TOKEN is required for a github gitops repository".to_string())
        })?;
        let api = GithubApi::new(&config.github_api_url, &token)?;
        Ok(Self {
            dir: dir.into(),
            remote_url: github_remote_url(&token, &github.owner, &github.repository),
            hosted: Some(Hosted {
                api,
                owner: github.owner.clone(),
                repository: github.repository.clone(),
            }),
            ssh_command: None,
            secret: Some(token),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
        })
    }

    /// Client for a repository reachable at an arbitrary git URL.
    pub fn for_git(
        dir: impl Into<PathBuf>,
        git: &GitProviderConfig,
        config: &CliConfig,
    ) -> Self {
        Self {
            dir: dir.into(),
            remote_url: git.repository_url.clone(),
            hosted: None,
            ssh_command: config
                .git_private_key_file
                .as_deref()
                .map(|key| ssh_command(key, config.git_known_hosts_file.as_deref())),
            secret: None,
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(ssh) = &self.ssh_command {
            cmd.env("GIT_SSH_COMMAND", ssh);
        }
        cmd
    }

    async fn run(&self, operation: &str, args: &[&str]) -> Result<String> {
        debug!(operation, dir = %self.dir.display(), "Running git");
        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| self.git_error(operation, e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.git_error(operation, stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn succeeds(&self, args: &[&str]) -> Result<bool> {
        let status = self
            .command(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        Ok(status.success())
    }

    fn git_error(&self, operation: &str, message: String) -> Error {
        Error::GitError {
            operation: operation.to_string(),
            message: redact(&message, self.secret.as_deref()),
        }
    }

    async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn remote_has_branch(&self, name: &str) -> Result<bool> {
        let out = self.run("ls-remote", &["ls-remote", "--heads", REMOTE, name]).await?;
        Ok(!out.trim().is_empty())
    }
}

#[async_trait]
impl GitClient for GitCli {
    async fn get_repo(&self) -> Result<Option<Repository>> {
        match &self.hosted {
            Some(h) => h.api.get_repo(&h.owner, &h.repository).await,
            None => Ok(None),
        }
    }

    async fn create_repo(&self, opts: CreateRepoOpts) -> Result<()> {
        match &self.hosted {
            Some(h) => h.api.create_repo(&opts).await.map(|_| ()),
            None => Err(Error::GitError {
                operation: "create repository".to_string(),
                message: "repositories can only be created on the hosted service".to_string(),
            }),
        }
    }

    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn clone_repo(&self) -> Result<()> {
        self.ensure_dir().await?;
        self.run("clone", &["clone", &self.remote_url, "."]).await?;
        Ok(())
    }

    async fn push(&self) -> Result<()> {
        self.run("push", &["push", "--set-upstream", REMOTE, "HEAD"])
            .await?;
        Ok(())
    }

    async fn pull(&self, branch: &str) -> Result<()> {
        self.run("pull", &["pull", "--ff-only", REMOTE, branch]).await?;
        Ok(())
    }

    async fn path_exists(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<bool> {
        match &self.hosted {
            Some(h) => h.api.path_exists(owner, repo, branch, path).await,
            None => Ok(false),
        }
    }

    async fn add(&self, path: &str) -> Result<()> {
        self.run("add", &["add", "--", path]).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.run("rm", &["rm", "-r", "--", path]).await?;
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<()> {
        let name = format!("user.name={}", self.author_name);
        let email = format!("user.email={}", self.author_email);
        self.run(
            "commit",
            &["-c", &name, "-c", &email, "commit", "--allow-empty", "-m", message],
        )
        .await?;
        Ok(())
    }

    async fn branch(&self, name: &str) -> Result<()> {
        let local_ref = format!("refs/heads/{name}");
        if self
            .succeeds(&["rev-parse", "--verify", "--quiet", &local_ref])
            .await?
        {
            self.run("checkout", &["checkout", name]).await?;
        } else {
            self.run("checkout", &["checkout", "-b", name]).await?;
        }

        if self.remote_has_branch(name).await? {
            self.pull(name).await?;
        }
        Ok(())
    }

    async fn init(&self) -> Result<()> {
        self.ensure_dir().await?;
        self.run("init", &["init"]).await?;
        self.run("remote", &["remote", "add", REMOTE, &self.remote_url])
            .await?;
        Ok(())
    }
}

fn github_remote_url(token: &str, owner: &str, repository: &str) -> String {
    format!("https://x-access-token:{token}@{GITHUB_HOST}/{owner}/{repository}.git")
}

fn ssh_command(private_key: &Path, known_hosts: Option<&Path>) -> String {
    let mut cmd = format!(
        "ssh -i {} -o IdentitiesOnly=yes",
        private_key.display()
    );
    if let Some(kh) = known_hosts {
        cmd.push_str(&format!(" -o UserKnownHostsFile={}", kh.display()));
    }
    cmd
}

pub(crate) fn redact(message: &str, secret: Option<&str>) -> String {
    match secret {
        Some(s) if !s.is_empty() => message.replace(s, "***"),
        _ => message.to_string(),
    }
}
