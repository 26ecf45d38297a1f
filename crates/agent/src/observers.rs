//! Observers the agent registers on the cluster store

use cluster_state::{
    Cluster, ClusterEvent, EventAction, NodeStartupTracker, ObserverId, StateMetrics,
    StructuredLogger,
};
use std::sync::Arc;

/// Count applied events by kind and action
pub fn register_event_metrics(cluster: &Cluster, metrics: StateMetrics) -> ObserverId {
    cluster.add_observer(move |event| {
        metrics.inc_events(&event.kind().to_string(), &event.action().to_string());
    })
}

/// Time each node from creation until its first Ready observation
pub fn register_startup_tracking(
    cluster: &Cluster,
    tracker: Arc<NodeStartupTracker>,
    metrics: StateMetrics,
    logger: StructuredLogger,
) -> ObserverId {
    cluster.add_observer(move |event| {
        let ClusterEvent::Node { action, name, node } = event else {
            return;
        };
        match (action, node) {
            (EventAction::Delete, _) => tracker.forget(name),
            (_, Some(node)) => {
                if let Some(elapsed) = tracker.observe(node) {
                    metrics.observe_node_startup(elapsed.as_secs_f64());
                    logger.log_node_ready(name, elapsed.as_secs_f64());
                }
            }
            (_, None) => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use cluster_state::{FakeClock, MemorySource};
    use k8s_openapi::api::core::v1::{Node, NodeCondition, NodeStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    fn ready_node(name: &str, created_secs: i64) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                creation_timestamp: Some(Time(Utc.timestamp_opt(created_secs, 0).unwrap())),
                ..Default::default()
            },
            status: Some(NodeStatus {
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_startup_observer_records_new_nodes() {
        let clock = Arc::new(FakeClock::new(Utc.timestamp_opt(120, 0).unwrap()));
        let cluster = Cluster::new(clock.clone(), Arc::new(MemorySource::new()));
        let tracker = Arc::new(NodeStartupTracker::new(clock));
        register_startup_tracking(
            &cluster,
            tracker.clone(),
            StateMetrics::new(),
            StructuredLogger::new("test"),
        );
        register_event_metrics(&cluster, StateMetrics::new());

        cluster.update_node(ready_node("n1", 30)).await.unwrap();
        cluster.update_node(ready_node("n1", 30)).await.unwrap();
        cluster.delete_node("n1").await;

        let stats = tracker.stats().unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.longest_seconds, 90.0);
    }
}
