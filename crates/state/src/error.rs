//! Error types for the cluster state cache

use std::time::Duration;
use thiserror::Error;

/// Failure reported by a cluster data source. Absence is not an error;
/// lookups return `Ok(None)` for objects that do not exist.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("listing pods on node {node}: {message}")]
    ListPods { node: String, message: String },

    #[error("getting node {node}: {message}")]
    GetNode { node: String, message: String },

    #[error("getting CSINode to determine volume limits for {node}: {message}")]
    GetCsiNode { node: String, message: String },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },
}

#[derive(Debug, Error)]
pub enum StateError {
    /// Every failure hit while building one node snapshot
    #[error("building snapshot for node {node}: {}", join(.errors))]
    NodeBuild {
        node: String,
        errors: Vec<SourceError>,
    },

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl StateError {
    /// Node whose snapshot could not be built, if that is what failed
    pub fn node(&self) -> Option<&str> {
        match self {
            StateError::NodeBuild { node, .. } => Some(node),
            StateError::Source(_) => None,
        }
    }
}

fn join(errors: &[SourceError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
