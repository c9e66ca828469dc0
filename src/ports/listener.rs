use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Logical network endpoint role exposed by a broker node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Listener {
    /// Client-facing listener, advertised through the bootstrap address
    External,
    /// Unauthenticated plaintext listener for harness-side administration
    Anon,
    /// Inter-broker replication traffic
    Internal,
    /// KRaft controller quorum traffic
    Controller,
}

impl Listener {
    /// Name used for the listener in broker configuration (`EXTERNAL://...`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Listener::External => "EXTERNAL",
            Listener::Anon => "ANON",
            Listener::Internal => "INTERNAL",
            Listener::Controller => "CONTROLLER",
        }
    }
}

impl fmt::Display for Listener {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
