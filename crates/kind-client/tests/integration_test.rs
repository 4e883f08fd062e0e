//! Integration tests for the kind and Docker clients
//!
//! These tests require `kind` and `docker` on PATH and at least one kind
//! cluster. Set KIND_CLUSTER to choose which cluster is inspected.

use kind_client::{DockerClient, FLEET_LABEL_KEY, KindClient, KubeconfigEndpoint};

#[tokio::test]
#[ignore] // Requires kind and a running cluster
async fn test_list_clusters() {
    let client = KindClient::default();

    let clusters = client.list_clusters().await
        .expect("Failed to list kind clusters");

    println!("Found {} clusters", clusters.len());
}

#[tokio::test]
#[ignore]
async fn test_external_and_internal_kubeconfig() {
    let cluster = std::env::var("KIND_CLUSTER")
        .unwrap_or_else(|_| "kind".to_string());
    let client = KindClient::default();

    let external = client.get_kubeconfig(&cluster, KubeconfigEndpoint::External).await
        .expect("Failed to get external kubeconfig");
    let internal = client.get_kubeconfig(&cluster, KubeconfigEndpoint::Internal).await
        .expect("Failed to get internal kubeconfig");

    assert!(external.contains("server: https://127.0.0.1:"), "external kubeconfig should target the host port");
    assert!(internal.contains("-control-plane:6443"), "internal kubeconfig should target the node container");
}

#[tokio::test]
#[ignore]
async fn test_unknown_cluster_kubeconfig() {
    let client = KindClient::default();

    let result = client.get_kubeconfig("kind-fleet-does-not-exist", KubeconfigEndpoint::External).await;
    assert!(result.is_err(), "Unknown cluster should not yield a kubeconfig");
}

#[tokio::test]
#[ignore] // Requires docker
async fn test_list_labelled_containers() {
    let client = DockerClient::default();

    let ids = client.list_containers_by_label(FLEET_LABEL_KEY).await
        .expect("Failed to list containers");

    println!("Found {} labelled containers", ids.len());
}
