use std::time::Duration;

use kafka_cluster_harness::ClusterOrchestrator;
use kafka_cluster_harness::HarnessConfig;
use kafka_cluster_harness::InProcessDriver;
use tokio::net::TcpStream;
use tokio::time;

pub const WAIT_FOR_CONNECT_IN_MS: u64 = 500;

pub type InProcessCluster = ClusterOrchestrator<InProcessDriver>;

pub fn cluster_config(
    brokers_num: u32,
    kraft_mode: bool,
) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.cluster.brokers_num = brokers_num;
    config.cluster.kraft_mode = kraft_mode;
    config.cluster.advertised_host = "127.0.0.1".to_string();
    config.lifecycle.graceful_stop_timeout_ms = 2_000;
    config
}

pub async fn start_cluster(config: HarnessConfig) -> InProcessCluster {
    let driver = InProcessDriver::from_config(&config.cluster);
    let cluster = ClusterOrchestrator::new(config, driver).expect("valid config");
    cluster.start().await.expect("cluster starts");
    cluster
}

pub async fn is_reachable(endpoint: &str) -> bool {
    matches!(
        time::timeout(Duration::from_millis(WAIT_FOR_CONNECT_IN_MS), TcpStream::connect(endpoint))
            .await,
        Ok(Ok(_))
    )
}

/// Every bootstrap endpoint accepts connections.
pub async fn check_bootstrap_is_reachable(cluster: &InProcessCluster) -> bool {
    let bootstrap = cluster.bootstrap_servers();
    if bootstrap.is_empty() {
        return false;
    }
    for endpoint in bootstrap.split(',') {
        if !is_reachable(endpoint).await {
            return false;
        }
    }
    true
}
