//! Provider-specific datacenter and machine objects
//!
//! Provider internals are out of scope here; the orchestrator only needs each
//! object's kind, name and manifest, plus the resource types Flux addresses
//! them by.

use serde_json::Value;

use crate::crd::API_GROUP;
use crate::error::{Error, Result};

/// A provider datacenter config object (e.g. `VSphereDatacenterConfig`)
pub trait DatacenterConfig: Send + Sync {
    fn kind(&self) -> &str;
    fn name(&self) -> &str;
    /// Full manifest to commit to the configuration repository.
    fn manifest(&self) -> Result<Value>;
}

/// A provider machine config object (e.g. `VSphereMachineConfig`)
pub trait MachineConfig: Send + Sync {
    fn kind(&self) -> &str;
    fn name(&self) -> &str;
    fn manifest(&self) -> Result<Value>;
}

/// Resource types a provider exposes to Flux reconciliation toggles
pub trait Provider: Send + Sync {
    fn datacenter_resource_type(&self) -> String;
    /// `None` for providers without a machine config kind.
    fn machine_resource_type(&self) -> Option<String>;
}

/// A provider object carried through as its raw manifest
#[derive(Clone, Debug, PartialEq)]
pub struct GenericProviderObject {
    kind: String,
    name: String,
    manifest: Value,
}

impl GenericProviderObject {
    pub fn from_manifest(manifest: Value) -> Result<Self> {
        let kind = manifest
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::ConfigError("provider object has no kind".to_string()))?
            .to_string();
        let name = manifest
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::ConfigError(format!("{kind} object has no metadata.name")))?
            .to_string();
        Ok(Self {
            kind,
            name,
            manifest,
        })
    }

    pub fn api_version(&self) -> Option<&str> {
        self.manifest.get("apiVersion").and_then(Value::as_str)
    }
}

impl DatacenterConfig for GenericProviderObject {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn manifest(&self) -> Result<Value> {
        Ok(self.manifest.clone())
    }
}

impl MachineConfig for GenericProviderObject {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn manifest(&self) -> Result<Value> {
        Ok(self.manifest.clone())
    }
}

/// Provider described only by the kinds it uses
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenericProvider {
    pub datacenter_kind: String,
    pub machine_kind: Option<String>,
}

impl Provider for GenericProvider {
    fn datacenter_resource_type(&self) -> String {
        resource_type_for_kind(&self.datacenter_kind)
    }

    fn machine_resource_type(&self) -> Option<String> {
        self.machine_kind.as_deref().map(resource_type_for_kind)
    }
}

/// `VSphereDatacenterConfig` -> `vspheredatacenterconfigs.anywhere.clusterops.io`
pub fn resource_type_for_kind(kind: &str) -> String {
    format!("{}s.{}", kind.to_lowercase(), API_GROUP)
}
