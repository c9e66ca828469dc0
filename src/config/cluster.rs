use std::net::IpAddr;
use std::net::Ipv4Addr;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Listener;
use crate::Result;
use crate::MAX_NODES_PER_BATCH;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterConfig {
    /// Number of brokers created by `start()`
    #[serde(default = "default_brokers_num")]
    pub brokers_num: u32,

    /// KRaft mode adds a controller listener and combined controller nodes
    #[serde(default = "default_kraft_mode")]
    pub kraft_mode: bool,

    /// Number of leading node ids acting as controller+broker in KRaft mode
    #[serde(default = "default_kraft_controllers")]
    pub kraft_controllers: u32,

    /// Fixed cluster id; generated at start when absent
    #[serde(default)]
    pub cluster_id: Option<String>,

    /// Interface used to probe for free ports and to bind listeners
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Host name brokers advertise to clients
    #[serde(default = "default_advertised_host")]
    pub advertised_host: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            brokers_num: default_brokers_num(),
            kraft_mode: default_kraft_mode(),
            kraft_controllers: default_kraft_controllers(),
            cluster_id: None,
            bind_address: default_bind_address(),
            advertised_host: default_advertised_host(),
        }
    }
}

impl ClusterConfig {
    /// Listeners every node leases a port for.
    pub fn listeners(&self) -> Vec<Listener> {
        let mut listeners = vec![Listener::External, Listener::Anon, Listener::Internal];
        if self.kraft_mode {
            listeners.push(Listener::Controller);
        }
        listeners
    }

    /// Whether `node_id` takes part in the KRaft controller quorum.
    pub fn is_controller(
        &self,
        node_id: u32,
    ) -> bool {
        self.kraft_mode && node_id < self.kraft_controllers
    }

    /// # Errors
    /// Returns `Error::InvalidConfig` if any configuration rules are violated
    pub fn validate(&self) -> Result<()> {
        if self.brokers_num == 0 {
            return Err(Error::InvalidConfig("brokers_num must be at least 1".into()));
        }

        if self.brokers_num > MAX_NODES_PER_BATCH {
            return Err(Error::InvalidConfig(format!(
                "brokers_num must be at most {MAX_NODES_PER_BATCH}, got {}",
                self.brokers_num
            )));
        }

        if self.kraft_mode
            && (self.kraft_controllers == 0 || self.kraft_controllers > self.brokers_num)
        {
            return Err(Error::InvalidConfig(format!(
                "kraft_controllers must be within 1..={}, got {}",
                self.brokers_num, self.kraft_controllers
            )));
        }

        if let Some(cluster_id) = &self.cluster_id {
            if cluster_id.trim().is_empty() {
                return Err(Error::InvalidConfig("cluster_id cannot be blank".into()));
            }
        }

        if self.advertised_host.trim().is_empty() {
            return Err(Error::InvalidConfig("advertised_host cannot be empty".into()));
        }

        Ok(())
    }
}

fn default_brokers_num() -> u32 {
    1
}
fn default_kraft_mode() -> bool {
    true
}
fn default_kraft_controllers() -> u32 {
    1
}
fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}
fn default_advertised_host() -> String {
    "localhost".to_string()
}
