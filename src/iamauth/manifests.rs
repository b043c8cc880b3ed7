//! Objects the authenticator needs, on both sides of the trust relationship

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use serde_json::json;
use uuid::Uuid;

use super::{CaMaterial, CA_CERT_KEY, CA_KEY_KEY};
use crate::crd::{AwsIamConfigSpec, MapRoles, MapUsers};
use crate::error::Result;

pub const REMOTE_NAMESPACE: &str = "kube-system";
pub const REMOTE_CA_SECRET_NAME: &str = "aws-iam-authenticator-ca";
pub const AUTHENTICATOR_CONFIG_MAP_NAME: &str = "aws-iam-authenticator";
pub const AWS_AUTH_CONFIG_MAP_NAME: &str = "aws-auth";
pub const AUTHENTICATOR_CONFIG_KEY: &str = "config.yaml";
pub const AUTHENTICATOR_PORT: u16 = 21362;
const STATE_DIR: &str = "/var/aws-iam-authenticator";

fn meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([(
            "app.kubernetes.io/managed-by".to_string(),
            "cluster-gitops".to_string(),
        )])),
        ..Default::default()
    }
}

fn ca_data(ca: &CaMaterial) -> BTreeMap<String, ByteString> {
    BTreeMap::from([
        (CA_CERT_KEY.to_string(), ByteString(ca.cert.clone())),
        (CA_KEY_KEY.to_string(), ByteString(ca.key.clone())),
    ])
}

/// The CA secret kept on the management cluster
pub fn ca_secret(ca: &CaMaterial) -> Secret {
    Secret {
        metadata: meta(&ca.secret_name, &ca.namespace),
        data: Some(ca_data(ca)),
        ..Default::default()
    }
}

/// Read the CA back out of its management secret.
pub fn ca_from_secret(cluster: &str, secret: &Secret) -> Option<CaMaterial> {
    let data = secret.data.as_ref()?;
    let cert = data.get(CA_CERT_KEY)?.0.clone();
    let key = data.get(CA_KEY_KEY)?.0.clone();
    Some(CaMaterial::for_cluster(cluster, cert, key))
}

/// The same CA, copied to where the authenticator pods mount it
pub fn remote_ca_secret(ca: &CaMaterial) -> Secret {
    Secret {
        metadata: meta(REMOTE_CA_SECRET_NAME, REMOTE_NAMESPACE),
        data: Some(ca_data(ca)),
        ..Default::default()
    }
}

fn role_mappings(roles: &[MapRoles]) -> serde_json::Value {
    roles
        .iter()
        .map(|r| json!({"rolearn": r.role_arn, "username": r.username, "groups": r.groups}))
        .collect()
}

fn user_mappings(users: &[MapUsers]) -> serde_json::Value {
    users
        .iter()
        .map(|u| json!({"userarn": u.user_arn, "username": u.username, "groups": u.groups}))
        .collect()
}

pub fn authenticator_config_map(cluster_id: Uuid, spec: &AwsIamConfigSpec) -> Result<ConfigMap> {
    let config = json!({
        "clusterID": cluster_id.to_string(),
        "server": {
            "port": AUTHENTICATOR_PORT,
            "stateDir": STATE_DIR,
            "backendMode": spec.effective_backend_modes(),
            "partition": spec.partition,
            "mapRoles": role_mappings(&spec.map_roles),
            "mapUsers": user_mappings(&spec.map_users),
        },
    });

    Ok(ConfigMap {
        metadata: meta(AUTHENTICATOR_CONFIG_MAP_NAME, REMOTE_NAMESPACE),
        data: Some(BTreeMap::from([(
            AUTHENTICATOR_CONFIG_KEY.to_string(),
            serde_yaml::to_string(&config)?,
        )])),
        ..Default::default()
    })
}

/// Identity bindings read by the authenticator's config map backend
pub fn aws_auth_config_map(spec: &AwsIamConfigSpec) -> Result<ConfigMap> {
    let mut data = BTreeMap::new();
    if !spec.map_roles.is_empty() {
        data.insert(
            "mapRoles".to_string(),
            serde_yaml::to_string(&role_mappings(&spec.map_roles))?,
        );
    }
    if !spec.map_users.is_empty() {
        data.insert(
            "mapUsers".to_string(),
            serde_yaml::to_string(&user_mappings(&spec.map_users))?,
        );
    }

    Ok(ConfigMap {
        metadata: meta(AWS_AUTH_CONFIG_MAP_NAME, REMOTE_NAMESPACE),
        data: Some(data),
        ..Default::default()
    })
}
