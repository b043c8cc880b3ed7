//! Tests for the controller reconcile outcome handling

#[cfg(test)]
mod tests {
    use super::super::conditions::*;
    use super::super::reconciler::{iam_auth_condition, report_failure};
    use super::super::result::ReconcileResult;
    use crate::crd::{Cluster, ClusterSpec, Ref, AWS_IAM_CONFIG_KIND};
    use crate::error::Error;
    use kube::{Client, Config};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cluster(with_iam: bool) -> Cluster {
        let mut spec = ClusterSpec::default();
        if with_iam {
            spec.identity_provider_refs = vec![Ref::new(AWS_IAM_CONFIG_KIND, "iam")];
        }
        Cluster::new("mgmt", spec)
    }

    #[test]
    fn test_condition_not_configured() {
        let (status, reason, _) = iam_auth_condition(&cluster(false), &Ok(ReconcileResult::done()));
        assert_eq!(status, CONDITION_STATUS_FALSE);
        assert_eq!(reason, REASON_NOT_CONFIGURED);
    }

    #[test]
    fn test_condition_ready_when_done() {
        let (status, reason, _) = iam_auth_condition(&cluster(true), &Ok(ReconcileResult::done()));
        assert_eq!(status, CONDITION_STATUS_TRUE);
        assert_eq!(reason, REASON_RECONCILED);
    }

    #[test]
    fn test_condition_waiting_on_requeue() {
        let outcome = Ok(ReconcileResult::requeue_after(Duration::from_secs(5)));
        let (status, reason, _) = iam_auth_condition(&cluster(true), &outcome);
        assert_eq!(status, CONDITION_STATUS_FALSE);
        assert_eq!(reason, REASON_WAITING);
    }

    #[test]
    fn test_condition_carries_error_message() {
        let outcome = Err(Error::ConfigError("kubeconfig secret ns/w01-kubeconfig not found".into()));
        let (status, reason, message) = iam_auth_condition(&cluster(true), &outcome);
        assert_eq!(status, CONDITION_STATUS_FALSE);
        assert_eq!(reason, REASON_FAILED);
        assert!(message.contains("w01-kubeconfig"));
    }

    async fn events_server(status: u16) -> (MockServer, Client) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/namespaces/default/events"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        let client = Client::try_from(Config::new(server.uri().parse().unwrap())).unwrap();
        (server, client)
    }

    #[tokio::test]
    async fn test_failure_event_rejected_by_api_is_not_fatal() {
        let (server, client) = events_server(500).await;
        report_failure(&client, &cluster(true), &Error::ConfigError("boom".to_string())).await;
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_pass_emits_no_event() {
        let (server, client) = events_server(201).await;
        report_failure(&client, &cluster(true), &Error::Cancelled).await;
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
