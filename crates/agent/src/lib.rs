//! Cluster state agent
//!
//! Feeds the cluster state cache from Kubernetes watch streams and serves
//! health, metrics and JSON views of the cache over HTTP.

pub mod api;
pub mod config;
pub mod controllers;
pub mod observers;
