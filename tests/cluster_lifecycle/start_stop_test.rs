use std::collections::BTreeSet;

use kafka_cluster_harness::client_config::BOOTSTRAP_SERVERS_CONFIG;
use kafka_cluster_harness::client_config::SECURITY_PROTOCOL_CONFIG;
use kafka_cluster_harness::ClusterError;
use kafka_cluster_harness::Error;
use kafka_cluster_harness::Listener;
use kafka_cluster_harness::TerminationStyle;
use tracing_test::traced_test;

use crate::common::check_bootstrap_is_reachable;
use crate::common::cluster_config;
use crate::common::is_reachable;
use crate::common::start_cluster;

#[tokio::test]
#[traced_test]
async fn test_single_node_kraft_cluster() {
    let cluster = start_cluster(cluster_config(1, true)).await;

    assert_eq!(cluster.num_of_brokers(), 1);
    assert!(cluster.stopped_brokers().is_empty());
    assert_eq!(cluster.bootstrap_servers().split(',').count(), 1);
    assert!(check_bootstrap_is_reachable(&cluster).await);

    // combined-mode node serves the controller listener too
    let controller = cluster.endpoints(0).unwrap()[&Listener::Controller].to_string();
    assert!(is_reachable(&controller).await);

    let client = cluster.kafka_client_configuration().unwrap();
    assert_eq!(client[BOOTSTRAP_SERVERS_CONFIG], cluster.bootstrap_servers());
    assert_eq!(client[SECURITY_PROTOCOL_CONFIG], "PLAINTEXT");

    cluster.close().await.unwrap();
    assert_eq!(cluster.driver().running_nodes(), 0);
}

#[tokio::test]
#[traced_test]
async fn test_stop_and_restart_node() {
    let cluster = start_cluster(cluster_config(3, true)).await;
    let endpoint = cluster.endpoints(2).unwrap()[&Listener::External].to_string();

    cluster.stop_nodes(|id| id == 2, TerminationStyle::Graceful).await.unwrap();

    assert_eq!(cluster.stopped_brokers(), BTreeSet::from([2]));
    assert!(!cluster.bootstrap_servers().contains(&endpoint));
    assert!(!is_reachable(&endpoint).await);

    cluster.start_nodes(|id| id == 2).await.unwrap();

    assert!(cluster.stopped_brokers().is_empty());
    assert!(cluster.bootstrap_servers().contains(&endpoint));
    assert!(check_bootstrap_is_reachable(&cluster).await);

    cluster.close().await.unwrap();
}

#[tokio::test]
#[traced_test]
async fn test_abrupt_stop_of_whole_cluster() {
    let cluster = start_cluster(cluster_config(2, false)).await;
    let bootstrap = cluster.bootstrap_servers();

    cluster.stop_nodes(|_| true, TerminationStyle::Abrupt).await.unwrap();

    assert_eq!(cluster.stopped_brokers(), BTreeSet::from([0, 1]));
    assert_eq!(cluster.bootstrap_servers(), "");
    for endpoint in bootstrap.split(',') {
        assert!(!is_reachable(endpoint).await);
    }

    cluster.start_nodes(|_| true).await.unwrap();
    assert_eq!(cluster.bootstrap_servers(), bootstrap);

    cluster.close().await.unwrap();
}

#[tokio::test]
#[traced_test]
async fn test_close_is_idempotent() {
    let cluster = start_cluster(cluster_config(2, true)).await;
    let bootstrap = cluster.bootstrap_servers();

    cluster.close().await.unwrap();
    cluster.close().await.unwrap();

    for endpoint in bootstrap.split(',') {
        assert!(!is_reachable(endpoint).await);
    }
    assert!(matches!(cluster.start().await, Err(Error::Cluster(ClusterError::Closed))));
}
