//! Node time-to-ready statistics
//!
//! The first time a node reports Ready, the time since its creation is
//! recorded. Durations of ten seconds or less are ignored; they come from
//! nodes that were already running when the cache started.

use crate::clock::Clock;
use crate::nodes::{self, NodeStatus};
use k8s_openapi::api::core::v1::Node;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const MIN_RECORDED: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartupStats {
    pub longest_seconds: f64,
    pub shortest_seconds: f64,
    pub average_seconds: f64,
    pub count: u64,
}

#[derive(Debug, Default)]
struct TrackerState {
    ready: HashSet<String>,
    longest: Duration,
    shortest: Duration,
    total: Duration,
    count: u64,
}

pub struct NodeStartupTracker {
    clock: Arc<dyn Clock>,
    state: Mutex<TrackerState>,
}

impl NodeStartupTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Observe a node descriptor. Returns the recorded duration when this is
    /// the node's first Ready observation and it took longer than ten seconds.
    pub fn observe(&self, node: &Node) -> Option<Duration> {
        let name = node.metadata.name.as_deref()?;
        if nodes::ready_status(node) != NodeStatus::Ready {
            return None;
        }
        let created = node.metadata.creation_timestamp.as_ref()?.0;

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !state.ready.insert(name.to_string()) {
            return None;
        }

        let elapsed = (self.clock.now() - created).to_std().ok()?;
        if elapsed <= MIN_RECORDED {
            return None;
        }

        state.longest = state.longest.max(elapsed);
        state.shortest = if state.count == 0 {
            elapsed
        } else {
            state.shortest.min(elapsed)
        };
        state.total += elapsed;
        state.count += 1;
        Some(elapsed)
    }

    /// Drop a deleted node so a replacement with the same name is timed again
    pub fn forget(&self, name: &str) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .ready
            .remove(name);
    }

    pub fn stats(&self) -> Option<StartupStats> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        (state.count > 0).then(|| StartupStats {
            longest_seconds: state.longest.as_secs_f64(),
            shortest_seconds: state.shortest.as_secs_f64(),
            average_seconds: state.total.as_secs_f64() / state.count as f64,
            count: state.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::nodes::fixtures::{node, with_ready};
    use chrono::Duration as ChronoDuration;

    fn tracker() -> (Arc<FakeClock>, NodeStartupTracker) {
        let clock = Arc::new(FakeClock::default());
        let tracker = NodeStartupTracker::new(clock.clone());
        (clock, tracker)
    }

    #[test]
    fn test_records_first_ready_only() {
        let (clock, tracker) = tracker();
        clock.step(ChronoDuration::seconds(40));

        let n1 = node("n1", "u1", 0, "4");
        assert_eq!(tracker.observe(&n1), Some(Duration::from_secs(40)));
        clock.step(ChronoDuration::seconds(40));
        assert_eq!(tracker.observe(&n1), None);

        let stats = tracker.stats().unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.longest_seconds, 40.0);
    }

    #[test]
    fn test_ignores_short_and_not_ready() {
        let (clock, tracker) = tracker();
        clock.step(ChronoDuration::seconds(5));
        assert_eq!(tracker.observe(&node("fast", "u1", 0, "4")), None);

        clock.step(ChronoDuration::seconds(60));
        let pending = with_ready(node("slow", "u2", 0, "4"), "False");
        assert_eq!(tracker.observe(&pending), None);
        assert!(tracker.stats().is_none());
    }

    #[test]
    fn test_aggregates_and_forget() {
        let (clock, tracker) = tracker();
        clock.step(ChronoDuration::seconds(100));
        tracker.observe(&node("n1", "u1", 80, "4"));
        tracker.observe(&node("n2", "u2", 40, "4"));

        let stats = tracker.stats().unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.shortest_seconds, 20.0);
        assert_eq!(stats.longest_seconds, 60.0);
        assert_eq!(stats.average_seconds, 40.0);

        tracker.forget("n1");
        clock.step(ChronoDuration::seconds(20));
        assert_eq!(
            tracker.observe(&node("n1", "u3", 80, "4")),
            Some(Duration::from_secs(40))
        );
    }
}
