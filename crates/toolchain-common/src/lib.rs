//! Common types for the toolchain operator: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for every write the operator performs
pub const FIELD_MANAGER: &str = "toolchain-controller";

/// Label on a ToolchainCluster naming the role of the remote cluster (host or member)
pub const CLUSTER_TYPE_LABEL: &str = "type";

/// Label on a ToolchainCluster naming the operator namespace on the remote side
pub const OPERATOR_NAMESPACE_LABEL: &str = "namespace";

/// Label on a ToolchainCluster naming this cluster as the remote side knows it
pub const OWNER_CLUSTER_NAME_LABEL: &str = "ownerClusterName";

/// Secret key holding the bearer token used to reach a remote cluster
pub const TOKEN_SECRET_KEY: &str = "token";
