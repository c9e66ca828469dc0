use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LifecycleConfig {
    /// Allow `remove_broker` to take away the last running broker
    #[serde(default)]
    pub allow_empty_cluster: bool,

    /// Upper bound on a graceful driver stop (unit: milliseconds)
    #[serde(default = "default_graceful_stop_timeout_ms")]
    pub graceful_stop_timeout_ms: u64,

    /// Kill the node abruptly once a graceful stop times out, instead of failing
    #[serde(default = "default_escalate_on_graceful_timeout")]
    pub escalate_on_graceful_timeout: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            allow_empty_cluster: false,
            graceful_stop_timeout_ms: default_graceful_stop_timeout_ms(),
            escalate_on_graceful_timeout: default_escalate_on_graceful_timeout(),
        }
    }
}

impl LifecycleConfig {
    pub fn graceful_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_stop_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.graceful_stop_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "graceful_stop_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_graceful_stop_timeout_ms() -> u64 {
    30_000
}
fn default_escalate_on_graceful_timeout() -> bool {
    true
}
