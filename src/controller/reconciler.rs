//! Controller loop for Cluster resources
//!
//! Implements the controller pattern using kube-rs runtime. Each pass hands
//! the cluster to the IAM authenticator reconciler and records the outcome
//! as an `IamAuthReady` condition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;
use kube::{
    api::{Api, Patch, PatchParams, PostParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    Resource, ResourceExt,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::client::{KubeClusterClient, FIELD_MANAGER};
use super::conditions::{
    set_condition, CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE, CONDITION_TYPE_IAM_AUTH_READY,
    REASON_FAILED, REASON_NOT_CONFIGURED, REASON_RECONCILED, REASON_WAITING,
};
use super::result::ReconcileResult;
use crate::crd::Cluster;
use crate::error::{Error, Result};
use crate::iamauth::Reconciler;

const NOT_LEADER_REQUEUE: Duration = Duration::from_secs(15);
const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Shared state for the controller
pub struct ControllerState {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    /// Flipped by leader election; always true when election is disabled
    pub is_leader: Arc<AtomicBool>,
    /// Parent of every per-reconcile token; cancelled on shutdown
    pub cancel: CancellationToken,
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>, namespace: Option<String>) -> Result<()> {
    let client = state.client.clone();
    let clusters: Api<Cluster> = match &namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };

    info!("Starting Cluster controller");

    // Verify CRD exists
    match clusters.list(&Default::default()).await {
        Ok(_) => info!("Cluster CRD is available"),
        Err(e) => {
            error!("Cluster CRD not found. Please install the CRD first: {:?}", e);
            return Err(Error::ConfigError("Cluster CRD not installed".to_string()));
        }
    }

    Controller::new(clusters, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<Cluster>, ctx: Arc<ControllerState>) -> Result<Action> {
    if !ctx.is_leader.load(Ordering::Relaxed) {
        debug!("Not the leader, requeueing");
        return Ok(Action::requeue(NOT_LEADER_REQUEUE));
    }

    let cancel = ctx.cancel.child_token();
    let management = KubeClusterClient::new(ctx.client.clone());
    let outcome = ctx.reconciler.reconcile(&cancel, &management, &obj).await;

    let (status, reason, message) = iam_auth_condition(&obj, &outcome);
    if let Err(e) = update_status(&ctx.client, &obj, status, reason, &message).await {
        warn!("Failed to update status: {}", e);
    }

    match outcome {
        Ok(result) => Ok(result.into_action()),
        Err(e) => {
            report_failure(&ctx.client, &obj, &e).await;
            Err(e)
        }
    }
}

/// Status, reason and message of the `IamAuthReady` condition for one pass
pub(crate) fn iam_auth_condition(
    cluster: &Cluster,
    outcome: &Result<ReconcileResult>,
) -> (&'static str, &'static str, String) {
    match outcome {
        Ok(_) if cluster.iam_auth_ref().is_none() => (
            CONDITION_STATUS_FALSE,
            REASON_NOT_CONFIGURED,
            "no AWSIamConfig referenced".to_string(),
        ),
        Ok(r) if r.is_done() => (
            CONDITION_STATUS_TRUE,
            REASON_RECONCILED,
            "IAM authenticator configured".to_string(),
        ),
        Ok(_) => (
            CONDITION_STATUS_FALSE,
            REASON_WAITING,
            "waiting for IAM config or cluster CA".to_string(),
        ),
        Err(e) => (CONDITION_STATUS_FALSE, REASON_FAILED, e.to_string()),
    }
}

/// Patch the `IamAuthReady` condition into the cluster status
async fn update_status(
    client: &Client,
    cluster: &Cluster,
    status: &str,
    reason: &str,
    message: &str,
) -> Result<()> {
    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<Cluster> = Api::namespaced(client.clone(), &namespace);

    let mut conditions = cluster
        .status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default();
    set_condition(
        &mut conditions,
        CONDITION_TYPE_IAM_AUTH_READY,
        status,
        reason,
        message,
        cluster.metadata.generation,
    );

    let patch = serde_json::json!({
        "status": {
            "conditions": conditions,
            "observedGeneration": cluster.metadata.generation,
        }
    });
    api.patch_status(
        &cluster.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

/// Record a failed pass as a Warning event. Cancellation is not a failure.
pub(crate) async fn report_failure(client: &Client, cluster: &Cluster, error: &Error) {
    if error.is_cancelled() {
        return;
    }
    if let Err(e) = emit_event(client, cluster, "Warning", REASON_FAILED, &error.to_string()).await {
        warn!("Failed to emit event: {}", e);
    }
}

/// Helper to emit a Kubernetes Event
async fn emit_event(
    client: &Client,
    cluster: &Cluster,
    event_type: &str,
    reason: &str,
    message: &str,
) -> Result<()> {
    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
    let events: Api<Event> = Api::namespaced(client.clone(), &namespace);

    let time = chrono::Utc::now();
    let event = Event {
        metadata: kube::api::ObjectMeta {
            generate_name: Some(format!("{}-event-", cluster.name_any())),
            ..Default::default()
        },
        type_: Some(event_type.to_string()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        involved_object: cluster.object_ref(&()),
        first_timestamp: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(time)),
        last_timestamp: Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(time)),
        count: Some(1),
        ..Default::default()
    };

    events.create(&PostParams::default(), &event).await?;
    Ok(())
}

/// Error policy determines how to handle reconciliation errors
fn error_policy(cluster: Arc<Cluster>, error: &Error, _ctx: Arc<ControllerState>) -> Action {
    error!("Reconciliation error for {}: {}", cluster.name_any(), error);
    Action::requeue(ERROR_REQUEUE)
}
