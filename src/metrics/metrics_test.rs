use super::*;

fn create_test_registry() -> Registry {
    let registry = Registry::new_custom(Some("harness".to_string()), None).unwrap();
    register_custom_metrics(&registry);
    registry
}

#[test]
fn custom_registry_exposes_harness_metrics() {
    let registry = create_test_registry();

    record_transition("running->stopped");
    PORT_PROBES.inc();

    let metrics = registry.gather();
    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();
    assert!(
        metric_names.contains(&"harness_node_transitions"),
        "Missing harness_node_transitions"
    );
    assert!(metric_names.contains(&"harness_port_probes"), "Missing harness_port_probes");
}

#[test]
fn running_brokers_gauge_is_tracked_per_cluster() {
    RUNNING_BROKERS.with_label_values(&["metrics-test-a"]).set(3);
    RUNNING_BROKERS.with_label_values(&["metrics-test-b"]).inc();

    assert_eq!(RUNNING_BROKERS.with_label_values(&["metrics-test-a"]).get(), 3);
    assert_eq!(RUNNING_BROKERS.with_label_values(&["metrics-test-b"]).get(), 1);
}

#[test]
fn transitions_are_counted_by_label() {
    let before = NODE_TRANSITIONS.with_label_values(&["metrics-test"]).get();

    record_transition("metrics-test");
    record_transition("metrics-test");

    assert_eq!(NODE_TRANSITIONS.with_label_values(&["metrics-test"]).get(), before + 2);
}
