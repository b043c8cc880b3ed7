//! Renders the files committed to the configuration repository

use std::path::{Path, PathBuf};

use kube::ResourceExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::cluster::Spec;
use crate::error::{Error, Result};
use crate::providers::{DatacenterConfig, MachineConfig};

pub const CLUSTER_CONFIG_FILE: &str = "eksa-cluster.yaml";
pub const KUSTOMIZATION_FILE: &str = "kustomization.yaml";
pub const PATCHES_FILE: &str = "gotk-patches.yaml";

/// Writes cluster and controller files under a checkout
#[derive(Clone, Debug)]
pub struct FileGenerator {
    system_dir: PathBuf,
    controller_dir: PathBuf,
}

impl FileGenerator {
    /// `system_dir` and `controller_dir` are absolute, inside the checkout.
    pub fn new(system_dir: impl Into<PathBuf>, controller_dir: impl Into<PathBuf>) -> Self {
        Self {
            system_dir: system_dir.into(),
            controller_dir: controller_dir.into(),
        }
    }

    pub fn write_cluster_files(
        &self,
        spec: &Spec,
        datacenter: &dyn DatacenterConfig,
        machines: &[&dyn MachineConfig],
    ) -> Result<()> {
        let manifest = render_cluster_manifest(spec, datacenter, machines)?;
        write_file(&self.system_dir, CLUSTER_CONFIG_FILE, &manifest)?;
        write_file(
            &self.system_dir,
            KUSTOMIZATION_FILE,
            &render_kustomization(&[CLUSTER_CONFIG_FILE], &[])?,
        )?;
        Ok(())
    }

    /// Controller patches; only a self-managed cluster's path carries them.
    pub fn write_controller_files(&self, spec: &Spec) -> Result<()> {
        let namespace = spec
            .gitops_spec()
            .map(|g| g.system_namespace.clone())
            .ok_or_else(|| Error::ConfigError("controller files need a GitOpsConfig".to_string()))?;
        write_file(
            &self.controller_dir,
            KUSTOMIZATION_FILE,
            &render_kustomization(&["gotk-components.yaml", "gotk-sync.yaml"], &[PATCHES_FILE])?,
        )?;
        write_file(&self.controller_dir, PATCHES_FILE, &render_patches(&namespace)?)?;
        Ok(())
    }
}

fn write_file(dir: &Path, name: &str, contents: &str) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, contents)?;
    debug!(path = %path.display(), "Wrote file");
    Ok(())
}

/// Cluster, datacenter and machine objects as one multi-document YAML.
pub fn render_cluster_manifest(
    spec: &Spec,
    datacenter: &dyn DatacenterConfig,
    machines: &[&dyn MachineConfig],
) -> Result<String> {
    let cluster = &spec.cluster;
    let mut cluster_doc = json!({
        "apiVersion": "anywhere.clusterops.io/v1alpha1",
        "kind": "Cluster",
        "metadata": {"name": cluster.name_any()},
        "spec": serde_json::to_value(&cluster.spec)?,
    });
    if let Some(ns) = cluster.namespace() {
        cluster_doc["metadata"]["namespace"] = Value::String(ns);
    }

    let mut docs = vec![cluster_doc];
    docs.push(strip_server_fields(datacenter.manifest()?));
    for m in machines {
        docs.push(strip_server_fields(m.manifest()?));
    }

    let mut out = String::new();
    for (i, doc) in docs.iter().enumerate() {
        if i > 0 {
            out.push_str("---\n");
        }
        out.push_str(&serde_yaml::to_string(doc)?);
    }
    Ok(out)
}

/// Drop fields the API server owns so the committed file stays declarative.
fn strip_server_fields(mut manifest: Value) -> Value {
    if let Some(obj) = manifest.as_object_mut() {
        obj.remove("status");
    }
    if let Some(meta) = manifest.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in [
            "creationTimestamp",
            "generation",
            "managedFields",
            "resourceVersion",
            "uid",
        ] {
            meta.remove(field);
        }
    }
    manifest
}

fn render_kustomization(resources: &[&str], patches: &[&str]) -> Result<String> {
    let mut doc = json!({
        "apiVersion": "kustomize.config.k8s.io/v1beta1",
        "kind": "Kustomization",
        "resources": resources,
    });
    if !patches.is_empty() {
        doc["patches"] = patches.iter().map(|p| json!({"path": p})).collect();
    }
    Ok(serde_yaml::to_string(&doc)?)
}

fn render_patches(namespace: &str) -> Result<String> {
    let controllers = [
        "source-controller",
        "kustomize-controller",
        "helm-controller",
        "notification-controller",
    ];
    let mut out = String::new();
    for (i, name) in controllers.iter().enumerate() {
        if i > 0 {
            out.push_str("---\n");
        }
        let patch = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": name, "namespace": namespace},
            "spec": {"template": {"spec": {
                "nodeSelector": {"node-role.kubernetes.io/control-plane": ""},
                "tolerations": [{
                    "key": "node-role.kubernetes.io/control-plane",
                    "effect": "NoSchedule"
                }]
            }}}
        });
        out.push_str(&serde_yaml::to_string(&patch)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::parse_cluster_config;

    const CONFIG: &str = r#"
apiVersion: anywhere.clusterops.io/v1alpha1
kind: Cluster
metadata:
  name: w01
  namespace: default
spec:
  kubernetesVersion: "1.30"
  controlPlaneConfiguration:
    count: 1
    machineGroupRef: {kind: DockerMachineConfig, name: w01-cp}
  datacenterRef: {kind: DockerDatacenterConfig, name: w01}
  managementCluster: {name: mgmt}
---
apiVersion: anywhere.clusterops.io/v1alpha1
kind: DockerDatacenterConfig
metadata:
  name: w01
  namespace: default
  resourceVersion: "42"
spec: {}
status:
  ready: true
---
apiVersion: anywhere.clusterops.io/v1alpha1
kind: DockerMachineConfig
metadata:
  name: w01-cp
spec: {}
"#;

    #[test]
    fn test_cluster_files_are_written() {
        let cfg = parse_cluster_config(CONFIG).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let system_dir = dir.path().join("clusters/mgmt/w01/eksa-system");
        let gen = FileGenerator::new(&system_dir, dir.path().join("clusters/mgmt/flux-system"));

        let machines: Vec<&dyn MachineConfig> =
            cfg.machines.iter().map(|m| m as &dyn MachineConfig).collect();
        gen.write_cluster_files(&cfg.spec, &cfg.datacenter, &machines)
            .unwrap();

        let manifest = std::fs::read_to_string(system_dir.join(CLUSTER_CONFIG_FILE)).unwrap();
        let docs: Vec<serde_yaml::Value> = serde_yaml::Deserializer::from_str(&manifest)
            .map(|d| serde::Deserialize::deserialize(d).unwrap())
            .collect();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0]["kind"].as_str(), Some("Cluster"));
        assert_eq!(docs[1]["kind"].as_str(), Some("DockerDatacenterConfig"));
        assert!(docs[1].get("status").is_none());
        assert!(docs[1]["metadata"].get("resourceVersion").is_none());

        let kustomization =
            std::fs::read_to_string(system_dir.join(KUSTOMIZATION_FILE)).unwrap();
        assert!(kustomization.contains(CLUSTER_CONFIG_FILE));
        assert!(!dir.path().join("clusters/mgmt/flux-system").exists());
    }

    #[test]
    fn test_controller_files_require_gitops_config() {
        let cfg = parse_cluster_config(CONFIG).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let gen = FileGenerator::new(dir.path().join("a"), dir.path().join("b"));
        assert!(gen.write_controller_files(&cfg.spec).is_err());
    }

    #[test]
    fn test_patches_target_namespace() {
        let patches = render_patches("gitops").unwrap();
        assert_eq!(patches.matches("namespace: gitops").count(), 4);
    }
}
