//! Tests for the GitOps orchestrator
//!
//! Collaborators are mocks: any call without a matching expectation panics,
//! so a test that sets no expectation on a client also proves it was not
//! touched.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use crate::cluster::{parse_cluster_config, ClusterConfig, TargetCluster};
    use crate::config::CliConfig;
    use crate::crd::GitOpsConfigSpec;
    use crate::error::Error;
    use crate::gitops::flux_client::MockGitOpsFluxClient;
    use crate::gitops::git::{GitTools, MockGitClient, Repository};
    use crate::gitops::{
        run_validations, Flux, DELETE_COMMIT_MESSAGE, INITIAL_COMMIT_MESSAGE,
        UPDATE_COMMIT_MESSAGE,
    };
    use crate::providers::{GenericProvider, MachineConfig};

    const CLUSTER: &str = r#"
apiVersion: anywhere.clusterops.io/v1alpha1
kind: Cluster
metadata:
  name: NAME
  namespace: default
spec:
  kubernetesVersion: "1.30"
  controlPlaneConfiguration:
    count: 1
    machineGroupRef: {kind: VSphereMachineConfig, name: NAME-cp}
  workerNodeGroupConfigurations:
    - name: md-0
      machineGroupRef: {kind: VSphereMachineConfig, name: NAME-workers}
  datacenterRef: {kind: VSphereDatacenterConfig, name: dc1}
  MANAGEMENT
GITOPS_REF
---
apiVersion: anywhere.clusterops.io/v1alpha1
kind: VSphereDatacenterConfig
metadata: {name: dc1, namespace: default}
spec: {}
---
apiVersion: anywhere.clusterops.io/v1alpha1
kind: VSphereMachineConfig
metadata: {name: NAME-cp, namespace: default}
spec: {}
---
apiVersion: anywhere.clusterops.io/v1alpha1
kind: VSphereMachineConfig
metadata: {name: NAME-workers, namespace: default}
spec: {}
"#;

    const GITHUB: &str = r#"
---
apiVersion: anywhere.clusterops.io/v1alpha1
kind: GitOpsConfig
metadata: {name: fleet, namespace: default}
spec:
  github: {owner: acme, repository: fleet}
"#;

    const GIT: &str = r#"
---
apiVersion: anywhere.clusterops.io/v1alpha1
kind: GitOpsConfig
metadata: {name: fleet, namespace: default}
spec:
  git: {repositoryUrl: "ssh://git@example.com/fleet.git"}
"#;

    enum Backend {
        None,
        Github,
        Git,
    }

    fn config(name: &str, management: Option<&str>, backend: Backend) -> ClusterConfig {
        let management = management
            .map(|m| format!("managementCluster: {{name: {m}}}"))
            .unwrap_or_default();
        let (gitops_ref, gitops_doc) = match backend {
            Backend::None => ("", ""),
            Backend::Github => ("  gitOpsRef: {kind: GitOpsConfig, name: fleet}", GITHUB),
            Backend::Git => ("  gitOpsRef: {kind: GitOpsConfig, name: fleet}", GIT),
        };
        let yaml = CLUSTER
            .replace("NAME", name)
            .replace("MANAGEMENT", &management)
            .replace("GITOPS_REF", gitops_ref)
            + gitops_doc;
        parse_cluster_config(&yaml).unwrap()
    }

    fn machines(cfg: &ClusterConfig) -> Vec<&dyn MachineConfig> {
        cfg.machines.iter().map(|m| m as &dyn MachineConfig).collect()
    }

    fn flux(flux_client: MockGitOpsFluxClient, git: MockGitClient, dir: &std::path::Path) -> Flux {
        Flux::new(
            Arc::new(flux_client),
            Some(GitTools::new(Arc::new(git), dir)),
            CliConfig::default(),
        )
    }

    fn command_error(msg: &str) -> Error {
        Error::CommandError {
            command: "flux".to_string(),
            message: msg.to_string(),
        }
    }

    fn existing_repo() -> Repository {
        Repository {
            name: "fleet".to_string(),
            owner: "acme".to_string(),
            organization: "acme".to_string(),
            clone_url: "https://github.com/acme/fleet.git".to_string(),
        }
    }

    // ── skip semantics ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_disabled_gitops_makes_no_calls() {
        let cfg = config("mgmt", None, Backend::None);
        let dir = tempfile::tempdir().unwrap();
        let f = flux(MockGitOpsFluxClient::new(), MockGitClient::new(), dir.path());
        let cancel = CancellationToken::new();
        let target = TargetCluster::new("mgmt");
        let provider = cfg.provider();

        f.install_gitops(&cancel, &target, &cfg.spec, &cfg.datacenter, &machines(&cfg))
            .await
            .unwrap();
        f.bootstrap(&cancel, &target, &cfg.spec).await.unwrap();
        f.uninstall(&cancel, &target, &cfg.spec).await.unwrap();
        f.pause_cluster_resources_reconcile(&cancel, &target, &cfg.spec, &provider)
            .await
            .unwrap();
        f.resume_cluster_resources_reconcile(&cancel, &target, &cfg.spec, &provider)
            .await
            .unwrap();
        f.pause_gitops_kustomization(&cancel, &target, &cfg.spec)
            .await
            .unwrap();
        f.resume_gitops_kustomization(&cancel, &target, &cfg.spec)
            .await
            .unwrap();
        f.force_reconcile_git_repo(&cancel, &target, &cfg.spec)
            .await
            .unwrap();
        f.update_git_eksa_spec(&cancel, &cfg.spec, &cfg.datacenter, &machines(&cfg))
            .await
            .unwrap();
        f.cleanup_git_repo(&cancel, &cfg.spec).await.unwrap();
        assert!(f.validations(&cancel, &cfg.spec).is_empty());
    }

    #[tokio::test]
    async fn test_missing_git_tools_skips_repository_operations() {
        let cfg = config("mgmt", None, Backend::Github);
        let f = Flux::new(
            Arc::new(MockGitOpsFluxClient::new()),
            None,
            CliConfig::default(),
        );
        let cancel = CancellationToken::new();

        f.install_gitops(
            &cancel,
            &TargetCluster::new("mgmt"),
            &cfg.spec,
            &cfg.datacenter,
            &machines(&cfg),
        )
        .await
        .unwrap();
        f.cleanup_git_repo(&cancel, &cfg.spec).await.unwrap();
        assert!(f.validations(&cancel, &cfg.spec).is_empty());
    }

    #[tokio::test]
    async fn test_existing_management_skips_bootstrap() {
        let cfg = config("w01", Some("mgmt"), Backend::Github);
        let dir = tempfile::tempdir().unwrap();
        let f = flux(MockGitOpsFluxClient::new(), MockGitClient::new(), dir.path());
        let target = TargetCluster::new("w01").with_existing_management(true);

        f.bootstrap(&CancellationToken::new(), &target, &cfg.spec)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_uninstall_runs_without_git_tools() {
        let cfg = config("mgmt", None, Backend::Git);
        let mut fc = MockGitOpsFluxClient::new();
        fc.expect_uninstall()
            .withf(|t: &TargetCluster, c: &GitOpsConfigSpec| {
                t.name == "mgmt" && c.system_namespace == "flux-system"
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let f = Flux::new(Arc::new(fc), None, CliConfig::default());

        f.uninstall(&CancellationToken::new(), &TargetCluster::new("mgmt"), &cfg.spec)
            .await
            .unwrap();
    }

    // ── install ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_install_hosted_existing_repo() {
        let cfg = config("mgmt", None, Backend::Github);
        let dir = tempfile::tempdir().unwrap();

        let mut git = MockGitClient::new();
        git.expect_get_repo()
            .times(1)
            .returning(|| Ok(Some(existing_repo())));
        git.expect_clone_repo().times(1).returning(|| Ok(()));
        git.expect_branch()
            .withf(|name: &str| name == "main")
            .times(1)
            .returning(|_| Ok(()));
        git.expect_add()
            .withf(|path: &str| path == "clusters/mgmt")
            .times(1)
            .returning(|_| Ok(()));
        git.expect_commit()
            .withf(|msg: &str| msg == INITIAL_COMMIT_MESSAGE)
            .times(1)
            .returning(|_| Ok(()));
        git.expect_push().times(1).returning(|| Ok(()));
        git.expect_pull()
            .withf(|branch: &str| branch == "main")
            .times(1)
            .returning(|_| Ok(()));

        let mut fc = MockGitOpsFluxClient::new();
        fc.expect_bootstrap_github()
            .withf(|_, cfg| cfg.cluster_config_path == "clusters/mgmt")
            .times(1)
            .returning(|_, _| Ok(()));

        let f = flux(fc, git, dir.path());
        f.install_gitops(
            &CancellationToken::new(),
            &TargetCluster::new("mgmt"),
            &cfg.spec,
            &cfg.datacenter,
            &machines(&cfg),
        )
        .await
        .unwrap();

        let root = dir.path().join("clusters/mgmt");
        assert!(root.join("mgmt/eksa-system/eksa-cluster.yaml").exists());
        assert!(root.join("mgmt/eksa-system/kustomization.yaml").exists());
        assert!(root.join("flux-system/kustomization.yaml").exists());
        assert!(root.join("flux-system/gotk-patches.yaml").exists());
    }

    #[tokio::test]
    async fn test_install_hosted_creates_missing_repo() {
        let cfg = config("mgmt", None, Backend::Github);
        let dir = tempfile::tempdir().unwrap();

        let mut git = MockGitClient::new();
        git.expect_get_repo().times(1).returning(|| Ok(None));
        git.expect_create_repo()
            .withf(|opts| opts.name == "fleet" && opts.owner == "acme" && opts.privacy)
            .times(1)
            .returning(|_| Ok(()));
        git.expect_init().times(1).returning(|| Ok(()));
        git.expect_commit()
            .withf(|msg: &str| msg == "initializing repository")
            .times(1)
            .returning(|_| Ok(()));
        git.expect_commit()
            .withf(|msg: &str| msg == INITIAL_COMMIT_MESSAGE)
            .times(1)
            .returning(|_| Ok(()));
        git.expect_branch().times(1).returning(|_| Ok(()));
        git.expect_add().times(1).returning(|_| Ok(()));
        git.expect_push().times(1).returning(|| Ok(()));
        git.expect_pull().times(1).returning(|_| Ok(()));

        let mut fc = MockGitOpsFluxClient::new();
        fc.expect_bootstrap_github()
            .times(1)
            .returning(|_, _| Ok(()));

        let f = flux(fc, git, dir.path());
        f.install_gitops(
            &CancellationToken::new(),
            &TargetCluster::new("mgmt"),
            &cfg.spec,
            &cfg.datacenter,
            &machines(&cfg),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_install_workload_skips_controller_files() {
        let cfg = config("w01", Some("mgmt"), Backend::Git);
        let dir = tempfile::tempdir().unwrap();

        let mut git = MockGitClient::new();
        git.expect_clone_repo().times(1).returning(|| Ok(()));
        git.expect_branch().times(1).returning(|_| Ok(()));
        git.expect_add().times(1).returning(|_| Ok(()));
        git.expect_commit().times(1).returning(|_| Ok(()));
        git.expect_push().times(1).returning(|| Ok(()));
        git.expect_pull().times(1).returning(|_| Ok(()));

        let mut fc = MockGitOpsFluxClient::new();
        fc.expect_bootstrap_git()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let f = flux(fc, git, dir.path());
        f.install_gitops(
            &CancellationToken::new(),
            &TargetCluster::new("w01"),
            &cfg.spec,
            &cfg.datacenter,
            &machines(&cfg),
        )
        .await
        .unwrap();

        let root = dir.path().join("clusters/mgmt");
        assert!(root.join("w01/eksa-system/eksa-cluster.yaml").exists());
        assert!(!root.join("flux-system").exists());
    }

    #[tokio::test]
    async fn test_pull_failure_after_bootstrap_is_swallowed() {
        let cfg = config("mgmt", None, Backend::Github);
        let dir = tempfile::tempdir().unwrap();

        let mut git = MockGitClient::new();
        git.expect_get_repo()
            .returning(|| Ok(Some(existing_repo())));
        git.expect_clone_repo().returning(|| Ok(()));
        git.expect_branch().returning(|_| Ok(()));
        git.expect_add().returning(|_| Ok(()));
        git.expect_commit().returning(|_| Ok(()));
        git.expect_push().returning(|| Ok(()));
        git.expect_pull().times(1).returning(|_| {
            Err(Error::GitError {
                operation: "pull".to_string(),
                message: "diverged".to_string(),
            })
        });

        let mut fc = MockGitOpsFluxClient::new();
        fc.expect_bootstrap_github().returning(|_, _| Ok(()));

        let f = flux(fc, git, dir.path());
        let res = f
            .install_gitops(
                &CancellationToken::new(),
                &TargetCluster::new("mgmt"),
                &cfg.spec,
                &cfg.datacenter,
                &machines(&cfg),
            )
            .await;
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn test_local_path_collision_stops_before_writing() {
        let cfg = config("mgmt", None, Backend::Github);
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("clusters/mgmt")).unwrap();

        let mut git = MockGitClient::new();
        git.expect_get_repo()
            .returning(|| Ok(Some(existing_repo())));
        git.expect_clone_repo().times(1).returning(|| Ok(()));
        git.expect_branch().times(1).returning(|_| Ok(()));

        let f = flux(MockGitOpsFluxClient::new(), git, dir.path());
        let err = f
            .install_gitops(
                &CancellationToken::new(),
                &TargetCluster::new("mgmt"),
                &cfg.spec,
                &cfg.datacenter,
                &machines(&cfg),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
        assert!(!dir.path().join("clusters/mgmt/mgmt").exists());
    }

    // ── bootstrap rollback ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_hosted_bootstrap_failure_uninstalls() {
        let cfg = config("mgmt", None, Backend::Github);
        let dir = tempfile::tempdir().unwrap();

        let mut fc = MockGitOpsFluxClient::new();
        fc.expect_bootstrap_github()
            .times(1)
            .returning(|_, _| Err(command_error("bootstrap timed out")));
        fc.expect_uninstall().times(1).returning(|_, _| Ok(()));

        let f = flux(fc, MockGitClient::new(), dir.path());
        let err = f
            .bootstrap(&CancellationToken::new(), &TargetCluster::new("mgmt"), &cfg.spec)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("installing GitHub gitops: "));
        assert!(err.to_string().contains("bootstrap timed out"));
    }

    #[tokio::test]
    async fn test_generic_bootstrap_failure_uninstalls_even_if_uninstall_fails() {
        let cfg = config("mgmt", None, Backend::Git);
        let dir = tempfile::tempdir().unwrap();

        let mut fc = MockGitOpsFluxClient::new();
        fc.expect_bootstrap_git()
            .times(1)
            .returning(|_, _, _| Err(command_error("auth failed")));
        fc.expect_uninstall()
            .times(1)
            .returning(|_, _| Err(command_error("nothing to uninstall")));

        let f = flux(fc, MockGitClient::new(), dir.path());
        let err = f
            .bootstrap(&CancellationToken::new(), &TargetCluster::new("mgmt"), &cfg.spec)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("installing generic git gitops: "));
        assert!(err.to_string().contains("auth failed"));
        assert!(!err.to_string().contains("nothing to uninstall"));
    }

    // ── validations ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_remote_path_collision_fails_flux_path_validation() {
        let cfg = config("mgmt", None, Backend::Github);
        let dir = tempfile::tempdir().unwrap();

        let mut git = MockGitClient::new();
        git.expect_path_exists()
            .withf(|owner: &str, repo: &str, branch: &str, path: &str| {
                owner == "acme" && repo == "fleet" && branch == "main" && path == "clusters/mgmt"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(true));

        let f = flux(MockGitOpsFluxClient::new(), git, dir.path());
        let cancel = CancellationToken::new();
        let validations = f.validations(&cancel, &cfg.spec);
        assert_eq!(validations.len(), 1);
        assert_eq!(validations[0].name, "Flux path");

        let err = run_validations(validations).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Flux path"));
        assert!(msg.contains("flux path clusters/mgmt already exists in remote repository"));
        assert!(msg.contains("Please provide a different path or different cluster name"));
    }

    #[tokio::test]
    async fn test_remote_path_check_failure_is_wrapped() {
        let cfg = config("mgmt", None, Backend::Github);
        let dir = tempfile::tempdir().unwrap();

        let mut git = MockGitClient::new();
        git.expect_path_exists().returning(|_, _, _, _| {
            Err(Error::GitError {
                operation: "check path".to_string(),
                message: "API returned 500".to_string(),
            })
        });

        let f = flux(MockGitOpsFluxClient::new(), git, dir.path());
        let cancel = CancellationToken::new();
        let result = f
            .validations(&cancel, &cfg.spec)
            .pop()
            .unwrap()
            .run()
            .await;
        assert!(!result.is_ok());
        assert!(result
            .err
            .unwrap()
            .to_string()
            .starts_with("failed validating remote flux config path"));
    }

    #[tokio::test]
    async fn test_workload_cluster_skips_remote_path_check() {
        let cfg = config("w01", Some("mgmt"), Backend::Github);
        let dir = tempfile::tempdir().unwrap();
        let f = flux(MockGitOpsFluxClient::new(), MockGitClient::new(), dir.path());
        let cancel = CancellationToken::new();

        run_validations(f.validations(&cancel, &cfg.spec))
            .await
            .unwrap();
    }

    // ── reconcile toggles ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_pause_aborts_on_first_failure() {
        let cfg = config("mgmt", None, Backend::Github);
        let dir = tempfile::tempdir().unwrap();

        let mut fc = MockGitOpsFluxClient::new();
        fc.expect_disable_resource_reconcile()
            .times(2)
            .returning(|_, resource_type, _, _| {
                if resource_type.starts_with("vspheredatacenterconfigs") {
                    Err(command_error("forbidden"))
                } else {
                    Ok(())
                }
            });

        let f = flux(fc, MockGitClient::new(), dir.path());
        let err = f
            .pause_cluster_resources_reconcile(
                &CancellationToken::new(),
                &TargetCluster::new("mgmt"),
                &cfg.spec,
                &cfg.provider(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with(
            "disable resource vspheredatacenterconfigs.anywhere.clusterops.io dc1 from Flux reconcile"
        ));
    }

    #[tokio::test]
    async fn test_resume_covers_cluster_datacenter_and_machines() {
        let cfg = config("mgmt", None, Backend::Github);
        let dir = tempfile::tempdir().unwrap();

        let mut fc = MockGitOpsFluxClient::new();
        fc.expect_enable_resource_reconcile()
            .withf(|_, _, _, ns: &str| ns == "default")
            .times(4)
            .returning(|_, _, _, _| Ok(()));

        let f = flux(fc, MockGitClient::new(), dir.path());
        f.resume_cluster_resources_reconcile(
            &CancellationToken::new(),
            &TargetCluster::new("mgmt"),
            &cfg.spec,
            &cfg.provider(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_provider_without_machine_type_skips_machines() {
        let cfg = config("mgmt", None, Backend::Github);
        let dir = tempfile::tempdir().unwrap();
        let provider = GenericProvider {
            datacenter_kind: "DockerDatacenterConfig".to_string(),
            machine_kind: None,
        };

        let mut fc = MockGitOpsFluxClient::new();
        fc.expect_disable_resource_reconcile()
            .times(2)
            .returning(|_, _, _, _| Ok(()));

        let f = flux(fc, MockGitClient::new(), dir.path());
        f.pause_cluster_resources_reconcile(
            &CancellationToken::new(),
            &TargetCluster::new("mgmt"),
            &cfg.spec,
            &provider,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_pause_kustomization_noop_when_live_cluster_has_no_gitops() {
        let cfg = config("mgmt", None, Backend::Github);
        let live = config("mgmt", None, Backend::None).spec.cluster;
        let dir = tempfile::tempdir().unwrap();

        let mut fc = MockGitOpsFluxClient::new();
        fc.expect_get_cluster()
            .times(1)
            .returning(move |_, _| Ok(live.clone()));

        let f = flux(fc, MockGitClient::new(), dir.path());
        f.pause_gitops_kustomization(&CancellationToken::new(), &TargetCluster::new("mgmt"), &cfg.spec)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pause_kustomization_suspends() {
        let cfg = config("mgmt", None, Backend::Github);
        let live = cfg.spec.cluster.clone();
        let dir = tempfile::tempdir().unwrap();

        let mut fc = MockGitOpsFluxClient::new();
        fc.expect_get_cluster()
            .times(1)
            .returning(move |_, _| Ok(live.clone()));
        fc.expect_suspend_kustomization()
            .withf(|_, cfg| cfg.system_namespace == "flux-system")
            .times(1)
            .returning(|_, _| Ok(()));

        let f = flux(fc, MockGitClient::new(), dir.path());
        f.pause_gitops_kustomization(&CancellationToken::new(), &TargetCluster::new("mgmt"), &cfg.spec)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_force_reconcile_uses_system_namespace() {
        let cfg = config("mgmt", None, Backend::Git);
        let dir = tempfile::tempdir().unwrap();

        let mut fc = MockGitOpsFluxClient::new();
        fc.expect_force_reconcile()
            .withf(|_, ns: &str| ns == "flux-system")
            .times(1)
            .returning(|_, _| Ok(()));

        let f = flux(fc, MockGitClient::new(), dir.path());
        f.force_reconcile_git_repo(&CancellationToken::new(), &TargetCluster::new("mgmt"), &cfg.spec)
            .await
            .unwrap();
    }

    // ── update and cleanup ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_update_push_failure_names_path() {
        let cfg = config("mgmt", None, Backend::Github);
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();

        let mut git = MockGitClient::new();
        git.expect_branch().times(1).returning(|_| Ok(()));
        git.expect_add()
            .withf(|p: &str| p == "clusters/mgmt/mgmt/eksa-system")
            .times(1)
            .returning(|_| Ok(()));
        git.expect_commit()
            .withf(|msg: &str| msg == UPDATE_COMMIT_MESSAGE)
            .times(1)
            .returning(|_| Ok(()));
        git.expect_push().times(1).returning(|| {
            Err(Error::GitError {
                operation: "push".to_string(),
                message: "rejected".to_string(),
            })
        });

        let f = flux(MockGitOpsFluxClient::new(), git, dir.path());
        let err = f
            .update_git_eksa_spec(
                &CancellationToken::new(),
                &cfg.spec,
                &cfg.datacenter,
                &machines(&cfg),
            )
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("pushing clusters/mgmt/mgmt/eksa-system to git"));
        assert!(dir
            .path()
            .join("clusters/mgmt/mgmt/eksa-system/eksa-cluster.yaml")
            .exists());
    }

    #[tokio::test]
    async fn test_cleanup_absent_path_is_noop() {
        let cfg = config("mgmt", None, Backend::Github);
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();

        let mut git = MockGitClient::new();
        git.expect_branch().times(1).returning(|_| Ok(()));

        let f = flux(MockGitOpsFluxClient::new(), git, dir.path());
        f.cleanup_git_repo(&CancellationToken::new(), &cfg.spec)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_workload_removes_only_its_system_dir() {
        let cfg = config("w01", Some("mgmt"), Backend::Github);
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("clusters/mgmt/w01/eksa-system")).unwrap();

        let mut git = MockGitClient::new();
        git.expect_clone_repo().times(1).returning(|| Ok(()));
        git.expect_branch().times(1).returning(|_| Ok(()));
        git.expect_remove()
            .withf(|p: &str| p == "clusters/mgmt/w01/eksa-system")
            .times(1)
            .returning(|_| Ok(()));
        git.expect_commit()
            .withf(|msg: &str| msg == DELETE_COMMIT_MESSAGE)
            .times(1)
            .returning(|_| Ok(()));
        git.expect_push().times(1).returning(|| Ok(()));

        let f = flux(MockGitOpsFluxClient::new(), git, dir.path());
        f.cleanup_git_repo(&CancellationToken::new(), &cfg.spec)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_collaborators() {
        let cfg = config("mgmt", None, Backend::Github);
        let dir = tempfile::tempdir().unwrap();
        let mut fc = MockGitOpsFluxClient::new();
        fc.expect_force_reconcile().returning(|_, _| Ok(()));
        let f = flux(fc, MockGitClient::new(), dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = f
            .force_reconcile_git_repo(&cancel, &TargetCluster::new("mgmt"), &cfg.spec)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
