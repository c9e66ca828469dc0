use crate::HarnessConfig;

pub const TEST_GRACEFUL_STOP_TIMEOUT_MS: u64 = 50;

/// Config for a cluster of `brokers_num` nodes with a short graceful stop
/// timeout.
pub fn test_config(
    brokers_num: u32,
    kraft_mode: bool,
) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.cluster.brokers_num = brokers_num;
    config.cluster.kraft_mode = kraft_mode;
    config.cluster.kraft_controllers = 1;
    config.cluster.advertised_host = "localhost".to_string();
    config.lifecycle.graceful_stop_timeout_ms = TEST_GRACEFUL_STOP_TIMEOUT_MS;
    config
}

/// ZooKeeper-mode config: no node is a controller, so any node may be removed.
pub fn zk_config(brokers_num: u32) -> HarnessConfig {
    test_config(brokers_num, false)
}
