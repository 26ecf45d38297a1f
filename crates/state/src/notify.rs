//! Change notification
//!
//! Observers are plain callbacks. Each notification runs every observer in
//! its own blocking task and waits for all of them, so a mutation returns
//! only after every observer has seen the change. A panicking observer is
//! logged and does not affect the others.

use crate::observability::StateMetrics;
use crate::pods::PodKey;
use k8s_openapi::api::core::v1::{Node, Pod};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Node,
    Pod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventAction {
    Create,
    Update,
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Node => write!(f, "Node"),
            EventKind::Pod => write!(f, "Pod"),
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventAction::Create => write!(f, "Create"),
            EventAction::Update => write!(f, "Update"),
            EventAction::Delete => write!(f, "Delete"),
        }
    }
}

/// A state transition applied to the store
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    Node {
        action: EventAction,
        name: String,
        /// Descriptor, absent for deletions by name
        node: Option<Arc<Node>>,
    },
    Pod {
        action: EventAction,
        key: PodKey,
        pod: Option<Arc<Pod>>,
    },
}

impl ClusterEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClusterEvent::Node { .. } => EventKind::Node,
            ClusterEvent::Pod { .. } => EventKind::Pod,
        }
    }

    pub fn action(&self) -> EventAction {
        match self {
            ClusterEvent::Node { action, .. } | ClusterEvent::Pod { action, .. } => *action,
        }
    }

    /// Node name, or `namespace/name` for pods
    pub fn name(&self) -> String {
        match self {
            ClusterEvent::Node { name, .. } => name.clone(),
            ClusterEvent::Pod { key, .. } => key.to_string(),
        }
    }
}

pub type Observer = Arc<dyn Fn(&ClusterEvent) + Send + Sync>;

/// Handle returned on registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    observers: RwLock<Vec<(ObserverId, Observer)>>,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    pub fn add(&self, observer: Observer) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, observer));
        id
    }

    pub fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Run every observer against the event and wait for all of them
    pub async fn notify(&self, event: ClusterEvent, metrics: &StateMetrics) {
        let observers: Vec<Observer> = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        if observers.is_empty() {
            return;
        }

        let event = Arc::new(event);
        let mut tasks = JoinSet::new();
        for observer in observers {
            let event = event.clone();
            tasks.spawn_blocking(move || observer(&event));
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(
                    kind = %event.kind(),
                    action = %event.action(),
                    name = %event.name(),
                    error = %e,
                    "Observer failed"
                );
                metrics.inc_observer_failures();
            }
        }
        debug!(kind = %event.kind(), action = %event.action(), "Observers notified");
    }
}
