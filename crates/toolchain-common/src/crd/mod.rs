//! Custom Resource Definitions for the toolchain operator

mod toolchain_cluster;
mod types;

pub use toolchain_cluster::{
    LocalSecretReference, TlsValidation, ToolchainCluster, ToolchainClusterSpec,
    ToolchainClusterStatus,
};
pub use types::{find_condition, set_condition, Condition, ConditionStatus};
