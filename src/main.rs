use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use clap::{Args as ClapArgs, Parser, Subcommand};
use cluster_gitops::cluster::{load_cluster_config, ClusterConfig, TargetCluster};
use cluster_gitops::config::CliConfig;
use cluster_gitops::controller::{self, KubeconfigClientRegistry};
use cluster_gitops::crd::GitOpsMode;
use cluster_gitops::gitops::{run_validations, Flux, FluxCli, GitCli, GitClient, GitTools};
use cluster_gitops::iamauth::{RcgenCertificateGenerator, Reconciler};
use cluster_gitops::providers::MachineConfig;
use cluster_gitops::{telemetry, Error};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the IAM authenticator controller against the management cluster
    Run(RunArgs),
    /// Manage the GitOps repository and Flux installation for a cluster
    Gitops(GitopsArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Only watch clusters in this namespace
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Name of the management cluster this controller runs in
    #[arg(long, env = "MANAGEMENT_CLUSTER_NAME")]
    management_cluster: String,

    /// Cluster ID baked into the authenticator config and kubeconfigs
    #[arg(long, env = "IAM_CLUSTER_ID")]
    iam_cluster_id: Option<Uuid>,

    /// Coordinate replicas through a Lease
    #[arg(long, env = "LEADER_ELECTION", default_value_t = true, action = clap::ArgAction::Set)]
    leader_election: bool,

    /// Namespace holding the leader election Lease
    #[arg(long, env = "POD_NAMESPACE", default_value = "default")]
    lease_namespace: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(ClapArgs, Debug)]
struct GitopsArgs {
    #[command(subcommand)]
    action: GitopsAction,

    /// Cluster config file
    #[arg(short = 'f', long = "filename", global = true)]
    filename: Option<PathBuf>,

    /// Kubeconfig of the cluster Flux runs in
    #[arg(long, global = true, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Where the git working copy is kept
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    /// The cluster is managed by a management cluster already running Flux
    #[arg(long, global = true)]
    existing_management: bool,

    /// flux binary to run
    #[arg(long, global = true, env = "FLUX_BINARY", default_value = "flux")]
    flux_binary: String,

    /// kubectl binary to run
    #[arg(long, global = true, env = "KUBECTL_BINARY", default_value = "kubectl")]
    kubectl_binary: String,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum GitopsAction {
    /// Run pre-flight validations only
    Validate,
    /// Commit the cluster config and bootstrap Flux
    Install,
    /// Commit the current cluster config and trigger a reconcile
    Update,
    /// Remove the cluster's config from the repository
    Cleanup,
    /// Uninstall Flux from the cluster
    Uninstall,
    /// Stop Flux from reconciling the cluster's objects
    Pause,
    /// Let Flux reconcile the cluster's objects again
    Resume,
    /// Suspend the Flux kustomization
    PauseKustomization,
    /// Resume the Flux kustomization
    ResumeKustomization,
    /// Ask Flux to fetch the repository now
    Reconcile,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("cluster-gitops v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Run(run_args) => {
            telemetry::init_tracing(run_args.log_json)?;
            let result = run_operator(run_args).await;
            telemetry::shutdown_telemetry();
            result
        }
        Commands::Gitops(gitops_args) => {
            telemetry::init_tracing(gitops_args.log_json)?;
            let result = run_gitops(gitops_args).await;
            if let Err(e) = &result {
                error!("{}", e);
            }
            telemetry::shutdown_telemetry();
            result
        }
    }
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
}

async fn run_gitops(args: GitopsArgs) -> Result<(), Error> {
    let filename = args
        .filename
        .as_ref()
        .ok_or_else(|| Error::ConfigError("--filename is required".to_string()))?;
    let config = load_cluster_config(filename)?;
    let cli_config = CliConfig::from_env();

    let name = config.spec.name();
    let mut target = TargetCluster::new(&name).with_existing_management(args.existing_management);
    if let Some(kubeconfig) = &args.kubeconfig {
        target = target.with_kubeconfig(kubeconfig.clone());
    }

    let workdir = args
        .workdir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&name).join("git"));
    let git = git_tools(&config, workdir, &cli_config)?;
    let flux_cli = FluxCli::new(cli_config.clone())
        .with_binaries(args.flux_binary.clone(), args.kubectl_binary.clone());
    let flux = Flux::new(Arc::new(flux_cli), git, cli_config);

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    let spec = &config.spec;
    let machines: Vec<&dyn MachineConfig> = config
        .machines
        .iter()
        .map(|m| m as &dyn MachineConfig)
        .collect();
    let provider = config.provider();

    info!(cluster = %name, action = ?args.action, "Running gitops action");
    match args.action {
        GitopsAction::Validate => run_validations(flux.validations(&cancel, spec)).await,
        GitopsAction::Install => {
            run_validations(flux.validations(&cancel, spec)).await?;
            flux.install_gitops(&cancel, &target, spec, &config.datacenter, &machines)
                .await
        }
        GitopsAction::Update => {
            flux.update_git_eksa_spec(&cancel, spec, &config.datacenter, &machines)
                .await?;
            flux.force_reconcile_git_repo(&cancel, &target, spec).await
        }
        GitopsAction::Cleanup => flux.cleanup_git_repo(&cancel, spec).await,
        GitopsAction::Uninstall => flux.uninstall(&cancel, &target, spec).await,
        GitopsAction::Pause => {
            flux.pause_cluster_resources_reconcile(&cancel, &target, spec, &provider)
                .await
        }
        GitopsAction::Resume => {
            flux.resume_cluster_resources_reconcile(&cancel, &target, spec, &provider)
                .await
        }
        GitopsAction::PauseKustomization => {
            flux.pause_gitops_kustomization(&cancel, &target, spec).await
        }
        GitopsAction::ResumeKustomization => {
            flux.resume_gitops_kustomization(&cancel, &target, spec).await
        }
        GitopsAction::Reconcile => flux.force_reconcile_git_repo(&cancel, &target, spec).await,
    }
}

/// Git tooling for the repository backend the cluster config selects.
fn git_tools(
    config: &ClusterConfig,
    workdir: PathBuf,
    cli_config: &CliConfig,
) -> Result<Option<GitTools>, Error> {
    let client: Arc<dyn GitClient> = match config.spec.gitops_mode() {
        GitOpsMode::Disabled => return Ok(None),
        GitOpsMode::Hosted(github) => Arc::new(GitCli::for_github(workdir.clone(), github, cli_config)?),
        GitOpsMode::Generic(git) => Arc::new(GitCli::for_git(workdir.clone(), git, cli_config)),
    };
    Ok(Some(GitTools::new(client, workdir)))
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    info!("Starting cluster-gitops controller v{}", env!("CARGO_PKG_VERSION"));

    // Initialize Kubernetes client
    let client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let cluster_id = args.iam_cluster_id.unwrap_or_else(|| {
        let id = Uuid::new_v4();
        warn!("No IAM cluster ID configured, generated {}", id);
        id
    });

    let is_leader = Arc::new(AtomicBool::new(!args.leader_election));
    if args.leader_election {
        let holder_identity = std::env::var("HOSTNAME").unwrap_or_else(|_| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown-host".to_string())
        });
        info!("Leader election using holder ID: {}", holder_identity);

        let lease_client = client.clone();
        let lease_ns = args.lease_namespace.clone();
        let is_leader_bg = Arc::clone(&is_leader);
        tokio::spawn(async move {
            run_leader_election(lease_client, &lease_ns, &holder_identity, is_leader_bg).await;
        });
    }

    let registry = Arc::new(KubeconfigClientRegistry::new(
        client.clone(),
        args.management_cluster.clone(),
    ));
    let reconciler = Reconciler::new(Arc::new(RcgenCertificateGenerator), cluster_id, registry);

    let cancel = CancellationToken::new();
    let state = Arc::new(controller::ControllerState {
        client: client.clone(),
        reconciler: Arc::new(reconciler),
        is_leader,
        cancel: cancel.clone(),
    });

    let result = controller::run_controller(state, args.namespace).await;
    cancel.cancel();
    result
}

const LEASE_NAME: &str = "cluster-gitops-leader";
const LEASE_DURATION_SECS: i32 = 15;
const RENEW_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);
const RETRY_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

async fn run_leader_election(
    client: kube::Client,
    namespace: &str,
    identity: &str,
    is_leader: Arc<AtomicBool>,
) {
    let leases: Api<Lease> = Api::namespaced(client, namespace);

    loop {
        match try_acquire_or_renew(&leases, namespace, identity).await {
            Ok(true) => {
                if !is_leader.load(Ordering::Relaxed) {
                    info!("Acquired leadership for lease {}", LEASE_NAME);
                }
                is_leader.store(true, Ordering::Relaxed);
                tokio::time::sleep(RENEW_INTERVAL).await;
            }
            Ok(false) => {
                if is_leader.load(Ordering::Relaxed) {
                    warn!("Lost leadership for lease {}", LEASE_NAME);
                }
                is_leader.store(false, Ordering::Relaxed);
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
            Err(e) => {
                warn!("Leader election error: {:?}", e);
                is_leader.store(false, Ordering::Relaxed);
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    }
}

async fn try_acquire_or_renew(
    leases: &Api<Lease>,
    namespace: &str,
    identity: &str,
) -> Result<bool, kube::Error> {
    let now = Utc::now();

    let Some(existing) = leases.get_opt(LEASE_NAME).await? else {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(LEASE_NAME.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(identity.to_string()),
                acquire_time: Some(MicroTime(now)),
                renew_time: Some(MicroTime(now)),
                lease_duration_seconds: Some(LEASE_DURATION_SECS),
                ..Default::default()
            }),
        };
        return match leases.create(&PostParams::default(), &lease).await {
            Ok(_) => {
                info!("Created lease {} with holder {}", LEASE_NAME, identity);
                Ok(true)
            }
            // Another replica created it first
            Err(kube::Error::Api(err)) if err.code == 409 => Ok(false),
            Err(e) => Err(e),
        };
    };

    let spec = existing.spec.as_ref();
    let current_holder = spec.and_then(|s| s.holder_identity.as_deref());

    if current_holder == Some(identity) {
        let patch = serde_json::json!({
            "spec": {
                "renewTime": MicroTime(now),
                "leaseDurationSeconds": LEASE_DURATION_SECS,
            }
        });
        leases
            .patch(LEASE_NAME, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        return Ok(true);
    }

    let expired = spec
        .and_then(|s| s.renew_time.as_ref())
        .map(|renew| {
            let duration = spec
                .and_then(|s| s.lease_duration_seconds)
                .unwrap_or(LEASE_DURATION_SECS);
            now > renew.0 + chrono::Duration::seconds(duration as i64)
        })
        .unwrap_or(true);

    if !expired {
        return Ok(false);
    }

    info!("Lease held by {:?} has expired, taking over", current_holder);
    let patch = serde_json::json!({
        "spec": {
            "holderIdentity": identity,
            "acquireTime": MicroTime(now),
            "renewTime": MicroTime(now),
            "leaseDurationSeconds": LEASE_DURATION_SECS,
        }
    });
    leases
        .patch(LEASE_NAME, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(true)
}
