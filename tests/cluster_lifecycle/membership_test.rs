use std::collections::HashSet;
use std::sync::Arc;

use kafka_cluster_harness::ClusterError;
use kafka_cluster_harness::Error;
use kafka_cluster_harness::Listener;
use tracing_test::traced_test;

use crate::common::check_bootstrap_is_reachable;
use crate::common::cluster_config;
use crate::common::is_reachable;
use crate::common::start_cluster;

#[tokio::test]
#[traced_test]
async fn test_add_then_remove_broker() {
    let cluster = start_cluster(cluster_config(1, false)).await;

    let node_id = cluster.add_broker().await.unwrap();
    assert_eq!(node_id, 1);
    assert_eq!(cluster.num_of_brokers(), 2);
    assert!(check_bootstrap_is_reachable(&cluster).await);

    let removed = cluster.endpoints(0).unwrap()[&Listener::External].to_string();
    cluster.remove_broker(0).await.unwrap();

    assert_eq!(cluster.num_of_brokers(), 1);
    assert!(!is_reachable(&removed).await);
    assert!(!cluster.bootstrap_servers().contains(&removed));

    assert!(matches!(
        cluster.remove_broker(1).await,
        Err(Error::Cluster(ClusterError::LastBrokerRemoval(1)))
    ));
    assert!(matches!(
        cluster.remove_broker(0).await,
        Err(Error::Cluster(ClusterError::UnknownOrReusedNodeId(0)))
    ));

    cluster.close().await.unwrap();
}

#[tokio::test]
#[traced_test]
async fn test_added_broker_joins_kraft_quorum_as_broker_only() {
    let cluster = start_cluster(cluster_config(1, true)).await;

    let node_id = cluster.add_broker().await.unwrap();

    assert!(matches!(
        cluster.remove_broker(0).await,
        Err(Error::Cluster(ClusterError::ControllerRemoval(0)))
    ));
    cluster.remove_broker(node_id).await.unwrap();
    assert_eq!(cluster.num_of_brokers(), 1);

    cluster.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[traced_test]
async fn test_concurrent_membership_changes() {
    let cluster = Arc::new(start_cluster(cluster_config(1, false)).await);

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let cluster = cluster.clone();
            tokio::spawn(async move {
                let node_id = cluster.add_broker().await?;
                cluster.remove_broker(node_id).await?;
                Ok::<u32, Error>(node_id)
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap().unwrap());
    }

    assert_eq!(ids.len(), 6);
    assert!(!ids.contains(&0));
    assert_eq!(cluster.num_of_brokers(), 1);
    assert_eq!(cluster.driver().running_nodes(), 1);
    assert!(check_bootstrap_is_reachable(&cluster).await);

    cluster.close().await.unwrap();
}
