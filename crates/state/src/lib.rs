//! Cluster state cache
//!
//! This crate keeps a derived view of a Kubernetes cluster's nodes and the
//! pods bound to them, updated incrementally from reconciliation events:
//! - Resource quantity arithmetic and parsing
//! - Per-node resource snapshots (requests, limits, availability, daemon sets)
//! - Pod to node binding tracking
//! - Change notification for observers
//! - Health checks and observability

pub mod bindings;
pub mod clock;
pub mod error;
pub mod health;
pub mod nodes;
pub mod notify;
pub mod observability;
pub mod pods;
pub mod resources;
pub mod snapshot;
pub mod source;
pub mod startup;
pub mod store;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{SourceError, StateError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use notify::{ClusterEvent, EventAction, EventKind, ObserverId};
pub use observability::{StateMetrics, StructuredLogger};
pub use pods::PodKey;
pub use resources::ResourceList;
pub use snapshot::{ClusterSummary, NodeSnapshot, NodeSummary, PodSummary};
pub use source::{ClusterSource, KubeSource, MemorySource};
pub use startup::{NodeStartupTracker, StartupStats};
pub use store::{Cluster, ClusterConfig};
