//! Observability for the cluster state cache
//!
//! Provides:
//! - Prometheus metrics (tracked objects, snapshot build latency, event counts)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Snapshot builds are dominated by API round trips (seconds)
const BUILD_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Node time-to-ready (seconds)
const STARTUP_BUCKETS: &[f64] = &[10.0, 20.0, 30.0, 45.0, 60.0, 90.0, 120.0, 180.0, 300.0, 600.0];

static GLOBAL_METRICS: OnceLock<StateMetricsInner> = OnceLock::new();

struct StateMetricsInner {
    tracked_nodes: IntGauge,
    bound_pods: IntGauge,
    unbound_pods: IntGauge,
    snapshot_build_seconds: Histogram,
    snapshot_build_failures: IntCounter,
    events: IntCounterVec,
    observer_failures: IntCounter,
    node_startup_seconds: Histogram,
}

impl StateMetricsInner {
    fn new() -> Self {
        Self {
            tracked_nodes: register_int_gauge!(
                "cluster_state_tracked_nodes",
                "Number of nodes with a cached snapshot"
            )
            .expect("Failed to register tracked_nodes"),

            bound_pods: register_int_gauge!(
                "cluster_state_bound_pods",
                "Number of pods attributed to a tracked node"
            )
            .expect("Failed to register bound_pods"),

            unbound_pods: register_int_gauge!(
                "cluster_state_unbound_pods",
                "Number of live pods with no node assignment"
            )
            .expect("Failed to register unbound_pods"),

            snapshot_build_seconds: register_histogram!(
                "cluster_state_snapshot_build_seconds",
                "Time spent building a node snapshot from the data source",
                BUILD_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register snapshot_build_seconds"),

            snapshot_build_failures: register_int_counter!(
                "cluster_state_snapshot_build_failures_total",
                "Node snapshot builds that failed"
            )
            .expect("Failed to register snapshot_build_failures"),

            events: register_int_counter_vec!(
                "cluster_state_events_total",
                "State transitions applied to the cache",
                &["kind", "action"]
            )
            .expect("Failed to register events"),

            observer_failures: register_int_counter!(
                "cluster_state_observer_failures_total",
                "Observer callbacks that panicked"
            )
            .expect("Failed to register observer_failures"),

            node_startup_seconds: register_histogram!(
                "cluster_state_node_startup_seconds",
                "Time from node creation until it first reported Ready",
                STARTUP_BUCKETS.to_vec()
            )
            .expect("Failed to register node_startup_seconds"),
        }
    }
}

/// Lightweight handle to the global metrics; clones share the same metrics
#[derive(Clone)]
pub struct StateMetrics {
    _private: (),
}

impl Default for StateMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(StateMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &StateMetricsInner {
        GLOBAL_METRICS.get_or_init(StateMetricsInner::new)
    }

    pub fn set_tracked(&self, nodes: usize, bound_pods: usize, unbound_pods: usize) {
        let inner = self.inner();
        inner.tracked_nodes.set(nodes as i64);
        inner.bound_pods.set(bound_pods as i64);
        inner.unbound_pods.set(unbound_pods as i64);
    }

    pub fn observe_snapshot_build(&self, duration_secs: f64) {
        self.inner().snapshot_build_seconds.observe(duration_secs);
    }

    pub fn inc_snapshot_build_failures(&self) {
        self.inner().snapshot_build_failures.inc();
    }

    pub fn inc_events(&self, kind: &str, action: &str) {
        self.inner().events.with_label_values(&[kind, action]).inc();
    }

    pub fn inc_observer_failures(&self) {
        self.inner().observer_failures.inc();
    }

    pub fn observe_node_startup(&self, duration_secs: f64) {
        self.inner().node_startup_seconds.observe(duration_secs);
    }
}

/// Structured logger for significant cache events
#[derive(Clone)]
pub struct StructuredLogger {
    cluster_name: String,
}

impl StructuredLogger {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
        }
    }

    pub fn log_node_built(&self, node: &str, pods: usize, duration_ms: u64) {
        info!(
            event = "node_snapshot_built",
            cluster = %self.cluster_name,
            node = %node,
            pods = pods,
            duration_ms = duration_ms,
            "Built node snapshot"
        );
    }

    pub fn log_build_failed(&self, node: &str, error: &str, evicted: bool) {
        warn!(
            event = "node_snapshot_failed",
            cluster = %self.cluster_name,
            node = %node,
            error = %error,
            evicted = evicted,
            "Snapshot build failed"
        );
    }

    pub fn log_pod_moved(&self, pod: &str, from: Option<&str>, to: Option<&str>) {
        info!(
            event = "pod_moved",
            cluster = %self.cluster_name,
            pod = %pod,
            from = ?from,
            to = ?to,
            "Pod attribution changed"
        );
    }

    pub fn log_resync(&self, kind: &str, live: usize, removed: usize) {
        info!(
            event = "resync",
            cluster = %self.cluster_name,
            kind = %kind,
            live = live,
            removed = removed,
            "Watch stream restarted, cache resynchronized"
        );
    }

    pub fn log_node_ready(&self, node: &str, seconds: f64) {
        info!(
            event = "node_ready",
            cluster = %self.cluster_name,
            node = %node,
            startup_seconds = seconds,
            "Node became ready"
        );
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "agent_started",
            cluster = %self.cluster_name,
            agent_version = %version,
            "Cluster state agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            cluster = %self.cluster_name,
            reason = %reason,
            "Cluster state agent shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let metrics = StateMetrics::new();
        let other = StateMetrics::new();

        metrics.set_tracked(3, 10, 2);
        metrics.observe_snapshot_build(0.02);
        metrics.inc_events("Node", "Create");
        other.inc_events("Node", "Create");
        metrics.observe_node_startup(42.0);

        assert!(metrics.inner().events.with_label_values(&["Node", "Create"]).get() >= 2);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("prod");
        assert_eq!(logger.cluster_name, "prod");
        logger.log_pod_moved("default/a", Some("n1"), None);
    }
}
