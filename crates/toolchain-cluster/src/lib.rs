//! Liveness tracking for remote clusters
//!
//! The registration flow turns ToolchainCluster resources into live clients
//! kept in a [`ClusterRegistry`]. The controller probes every registered
//! cluster on a fixed interval and publishes a `Ready` condition.

#![deny(missing_docs)]

pub mod conditions;
pub mod controller;
pub mod error;
pub mod health;
pub mod registration;
pub mod registry;

pub use controller::{
    error_policy, reconcile, reconcile_request, Context, ContextBuilder, KubeClient,
    KubeClientImpl,
};
pub use error::ReconcileError;
pub use health::{HealthProbe, HealthzProbe};
pub use registration::{run_cache_sync, ToolchainClusterService};
pub use registry::{CachedCluster, ClusterRegistry, ClusterType, SharedClusterRegistry};
pub use toolchain_common::{Error, Result};
