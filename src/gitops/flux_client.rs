//! GitOps controller client: bootstrap, suspend/resume and reconcile toggles
//!
//! `FluxCli` drives the `flux` and `kubectl` binaries against the target
//! cluster's kubeconfig.

use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::cluster::{Spec, TargetCluster};
use crate::config::CliConfig;
use crate::crd::{Cluster, GitOpsConfigSpec, GitOpsMode};
use super::git_cli::redact;
use crate::error::{Error, Result};

/// Kustomization and GitRepository name created by `flux bootstrap`
pub const FLUX_SYSTEM_OBJECT: &str = "flux-system";
pub const RECONCILE_ANNOTATION: &str = "kustomize.toolkit.fluxcd.io/reconcile";
pub const REQUESTED_AT_ANNOTATION: &str = "reconcile.fluxcd.io/requestedAt";

#[cfg_attr(test, automock)]
#[async_trait]
pub trait GitOpsFluxClient: Send + Sync {
    async fn bootstrap_github(&self, cluster: &TargetCluster, config: &GitOpsConfigSpec)
        -> Result<()>;

    async fn bootstrap_git(
        &self,
        cluster: &TargetCluster,
        config: &GitOpsConfigSpec,
        cli_config: &CliConfig,
    ) -> Result<()>;

    async fn uninstall(&self, cluster: &TargetCluster, config: &GitOpsConfigSpec) -> Result<()>;

    /// Fetch the live `Cluster` object the spec describes.
    async fn get_cluster(&self, cluster: &TargetCluster, spec: &Spec) -> Result<Cluster>;

    async fn suspend_kustomization(
        &self,
        cluster: &TargetCluster,
        config: &GitOpsConfigSpec,
    ) -> Result<()>;

    async fn resume_kustomization(
        &self,
        cluster: &TargetCluster,
        config: &GitOpsConfigSpec,
    ) -> Result<()>;

    async fn disable_resource_reconcile(
        &self,
        cluster: &TargetCluster,
        resource_type: &str,
        name: &str,
        namespace: &str,
    ) -> Result<()>;

    async fn enable_resource_reconcile(
        &self,
        cluster: &TargetCluster,
        resource_type: &str,
        name: &str,
        namespace: &str,
    ) -> Result<()>;

    async fn force_reconcile(&self, cluster: &TargetCluster, namespace: &str) -> Result<()>;
}

/// `GitOpsFluxClient` over the flux and kubectl CLIs
#[derive(Clone, Debug)]
pub struct FluxCli {
    flux_binary: String,
    kubectl_binary: String,
    cli_config: CliConfig,
}

impl FluxCli {
    pub fn new(cli_config: CliConfig) -> Self {
        Self {
            flux_binary: "flux".to_string(),
            kubectl_binary: "kubectl".to_string(),
            cli_config,
        }
    }

    /// Override binary locations, e.g. for pinned tool versions.
    pub fn with_binaries(mut self, flux: impl Into<String>, kubectl: impl Into<String>) -> Self {
        self.flux_binary = flux.into();
        self.kubectl_binary = kubectl.into();
        self
    }

    async fn exec(
        &self,
        binary: &str,
        cluster: &TargetCluster,
        args: Vec<String>,
        env: Vec<(&str, String)>,
        secret: Option<&str>,
    ) -> Result<String> {
        let mut cmd = Command::new(binary);
        cmd.args(&args)
            .args(kubeconfig_args(cluster))
            .envs(env)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let command = redact(&format!("{binary} {}", args.join(" ")), secret);
        debug!(command = %command, cluster = %cluster.name, "Executing");

        let output = cmd.output().await.map_err(|e| Error::CommandError {
            command: command.clone(),
            message: redact(&e.to_string(), secret),
        })?;
        if !output.status.success() {
            return Err(Error::CommandError {
                command,
                message: redact(String::from_utf8_lossy(&output.stderr).trim(), secret),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn flux(&self, cluster: &TargetCluster, args: Vec<String>) -> Result<String> {
        self.exec(&self.flux_binary, cluster, args, Vec::new(), None)
            .await
    }

    async fn kubectl(&self, cluster: &TargetCluster, args: Vec<String>) -> Result<String> {
        self.exec(&self.kubectl_binary, cluster, args, Vec::new(), None)
            .await
    }
}

fn kubeconfig_args(cluster: &TargetCluster) -> Vec<String> {
    match &cluster.kubeconfig {
        Some(path) => vec!["--kubeconfig".to_string(), path.display().to_string()],
        None => Vec::new(),
    }
}

fn strings<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn github_bootstrap_args(config: &GitOpsConfigSpec) -> Result<Vec<String>> {
    let GitOpsMode::Hosted(gh) = config.mode() else {
        return Err(Error::ConfigError(
            "github bootstrap requires spec.github".to_string(),
        ));
    };
    let mut args = strings(["bootstrap", "github"]);
    args.extend([
        format!("--owner={}", gh.owner),
        format!("--repository={}", gh.repository),
        format!("--branch={}", config.branch),
        format!("--path={}", config.cluster_config_path),
        format!("--namespace={}", config.system_namespace),
    ]);
    if gh.personal {
        args.push("--personal".to_string());
    }
    Ok(args)
}

pub(crate) fn git_bootstrap_args(
    config: &GitOpsConfigSpec,
    cli_config: &CliConfig,
) -> Result<Vec<String>> {
    let GitOpsMode::Generic(git) = config.mode() else {
        return Err(Error::ConfigError(
            "git bootstrap requires spec.git".to_string(),
        ));
    };
    let key = cli_config.git_private_key_file.as_ref().ok_or_else(|| {
        Error::ConfigError("GIT_PRIVATE_KEY_FILE is required for a generic git repository".to_string())
    })?;
    let mut args = strings(["bootstrap", "git"]);
    args.extend([
        format!("--url={}", git.repository_url),
        format!("--branch={}", config.branch),
        format!("--path={}", config.cluster_config_path),
        format!("--namespace={}", config.system_namespace),
        format!("--private-key-file={}", key.display()),
        format!("--ssh-key-algorithm={}", git.ssh_key_algorithm),
    ]);
    if let Some(pass) = &cli_config.git_ssh_key_passphrase {
        args.push(format!("--password={pass}"));
    }
    args.push("--silent".to_string());
    Ok(args)
}

#[async_trait]
impl GitOpsFluxClient for FluxCli {
    #[instrument(skip(self, config), fields(cluster = %cluster.name))]
    async fn bootstrap_github(
        &self,
        cluster: &TargetCluster,
        config: &GitOpsConfigSpec,
    ) -> Result<()> {
        let token = self.cli_config.github_token.clone().ok_or_else(|| {
            Error::ConfigError("GITHUB_TOKEN is required for github bootstrap".to_string())
        })?;
        let args = github_bootstrap_args(config)?;
        self.exec(&self.flux_binary, cluster, args, vec![("GITHUB_TOKEN", token)], None)
            .await?;
        info!(repository = %config.repository(), "Flux bootstrapped from github");
        Ok(())
    }

    #[instrument(skip(self, config, cli_config), fields(cluster = %cluster.name))]
    async fn bootstrap_git(
        &self,
        cluster: &TargetCluster,
        config: &GitOpsConfigSpec,
        cli_config: &CliConfig,
    ) -> Result<()> {
        let args = git_bootstrap_args(config, cli_config)?;
        let env = cli_config
            .git_known_hosts_file
            .as_ref()
            .map(|kh| vec![("SSH_KNOWN_HOSTS", kh.display().to_string())])
            .unwrap_or_default();
        let passphrase = cli_config.git_ssh_key_passphrase.as_deref();
        self.exec(&self.flux_binary, cluster, args, env, passphrase)
            .await?;
        info!(repository = %config.repository(), "Flux bootstrapped from git");
        Ok(())
    }

    async fn uninstall(&self, cluster: &TargetCluster, config: &GitOpsConfigSpec) -> Result<()> {
        self.flux(
            cluster,
            vec![
                "uninstall".to_string(),
                "--silent".to_string(),
                format!("--namespace={}", config.system_namespace),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_cluster(&self, cluster: &TargetCluster, spec: &Spec) -> Result<Cluster> {
        let namespace = spec
            .cluster
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let out = self
            .kubectl(
                cluster,
                vec![
                    "get".to_string(),
                    Cluster::resource_type(),
                    spec.name(),
                    "-n".to_string(),
                    namespace,
                    "-o".to_string(),
                    "json".to_string(),
                ],
            )
            .await?;
        Ok(serde_json::from_str(&out)?)
    }

    async fn suspend_kustomization(
        &self,
        cluster: &TargetCluster,
        config: &GitOpsConfigSpec,
    ) -> Result<()> {
        let mut args = strings(["suspend", "ks", FLUX_SYSTEM_OBJECT]);
        args.push(format!("--namespace={}", config.system_namespace));
        self.flux(cluster, args).await?;
        Ok(())
    }

    async fn resume_kustomization(
        &self,
        cluster: &TargetCluster,
        config: &GitOpsConfigSpec,
    ) -> Result<()> {
        let mut args = strings(["resume", "ks", FLUX_SYSTEM_OBJECT]);
        args.push(format!("--namespace={}", config.system_namespace));
        self.flux(cluster, args).await?;
        Ok(())
    }

    async fn disable_resource_reconcile(
        &self,
        cluster: &TargetCluster,
        resource_type: &str,
        name: &str,
        namespace: &str,
    ) -> Result<()> {
        let args = vec![
            "annotate".to_string(),
            resource_type.to_string(),
            name.to_string(),
            format!("{RECONCILE_ANNOTATION}=disabled"),
            "--overwrite".to_string(),
            "-n".to_string(),
            namespace.to_string(),
        ];
        self.kubectl(cluster, args).await?;
        Ok(())
    }

    async fn enable_resource_reconcile(
        &self,
        cluster: &TargetCluster,
        resource_type: &str,
        name: &str,
        namespace: &str,
    ) -> Result<()> {
        let args = vec![
            "annotate".to_string(),
            resource_type.to_string(),
            name.to_string(),
            format!("{RECONCILE_ANNOTATION}-"),
            "-n".to_string(),
            namespace.to_string(),
        ];
        self.kubectl(cluster, args).await?;
        Ok(())
    }

    async fn force_reconcile(&self, cluster: &TargetCluster, namespace: &str) -> Result<()> {
        let args = vec![
            "annotate".to_string(),
            "gitrepository".to_string(),
            FLUX_SYSTEM_OBJECT.to_string(),
            format!("{REQUESTED_AT_ANNOTATION}={}", Utc::now().to_rfc3339()),
            "--overwrite".to_string(),
            "-n".to_string(),
            namespace.to_string(),
        ];
        self.kubectl(cluster, args).await?;
        Ok(())
    }
}
