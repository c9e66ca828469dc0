use lazy_static::lazy_static;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;

lazy_static! {
    pub static ref RUNNING_BROKERS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("running_brokers", "Brokers currently running per cluster"),
        &["cluster_id"]
    )
    .expect("metric can not be created");

    pub static ref NODE_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("node_transitions", "Node lifecycle transitions"),
        &["transition"]
    )
    .expect("metric can not be created");

    pub static ref PORT_PROBES: IntCounter =
        IntCounter::new("port_probes", "Sockets bound while probing for free ports")
            .expect("metric can not be created");
}

/// Registers the harness collectors with `registry`.
///
/// A registry rejects duplicate collectors, so call this once per registry.
pub fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(RUNNING_BROKERS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(NODE_TRANSITIONS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(PORT_PROBES.clone()))
        .expect("collector can be registered");
}

pub(crate) fn record_transition(transition: &str) {
    NODE_TRANSITIONS.with_label_values(&[transition]).inc();
}

#[cfg(test)]
mod metrics_test;
