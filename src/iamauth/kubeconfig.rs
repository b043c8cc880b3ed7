//! Kubeconfig that authenticates through the IAM authenticator

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use uuid::Uuid;

use crate::error::Result;

pub const API_SERVER_PORT: u16 = 6443;
pub const AUTHENTICATOR_BINARY: &str = "aws-iam-authenticator";
pub const KUBECONFIG_KEY: &str = "value";

pub fn render(cluster: &str, endpoint_host: &str, cluster_ca: &[u8], cluster_id: Uuid) -> Result<String> {
    let user = format!("{cluster}-aws");
    let context = format!("{user}@{cluster}");
    let doc = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": cluster,
            "cluster": {
                "server": format!("https://{endpoint_host}:{API_SERVER_PORT}"),
                "certificate-authority-data": STANDARD.encode(cluster_ca),
            },
        }],
        "contexts": [{
            "name": context,
            "context": {"cluster": cluster, "user": user},
        }],
        "current-context": context,
        "users": [{
            "name": user,
            "user": {
                "exec": {
                    "apiVersion": "client.authentication.k8s.io/v1beta1",
                    "command": AUTHENTICATOR_BINARY,
                    "args": ["token", "-i", cluster_id.to_string()],
                },
            },
        }],
    });
    Ok(serde_yaml::to_string(&doc)?)
}
