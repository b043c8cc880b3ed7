//! IAM authenticator trust setup
//!
//! Each cluster gets one self-signed CA, stored on the management cluster
//! and created at most once. The CA and the authenticator configuration are
//! then pushed to the target cluster, and a kubeconfig that authenticates
//! through the authenticator is published next to the cluster object.

pub mod certs;
pub mod kubeconfig;
pub mod manifests;
mod reconciler;


pub use certs::{CertificateGenerator, RcgenCertificateGenerator};
pub use reconciler::Reconciler;

pub const SYSTEM_NAMESPACE: &str = "eksa-system";
pub const CA_CERT_KEY: &str = "cert.pem";
pub const CA_KEY_KEY: &str = "key.pem";

pub fn ca_secret_name(cluster: &str) -> String {
    format!("{cluster}-aws-iam-authenticator-ca")
}

pub fn kubeconfig_secret_name(cluster: &str) -> String {
    format!("{cluster}-aws-iam-kubeconfig")
}

/// Secret holding the cluster's own CA, written by the provisioning layer
pub fn cluster_ca_secret_name(cluster: &str) -> String {
    format!("{cluster}-ca")
}

/// The authenticator CA as stored on the management cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaMaterial {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
    pub secret_name: String,
    pub namespace: String,
}

impl CaMaterial {
    pub fn for_cluster(cluster: &str, cert: Vec<u8>, key: Vec<u8>) -> Self {
        Self {
            cert,
            key,
            secret_name: ca_secret_name(cluster),
            namespace: SYSTEM_NAMESPACE.to_string(),
        }
    }
}
