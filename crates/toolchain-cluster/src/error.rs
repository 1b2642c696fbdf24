//! Controller-specific error types
//!
//! The messages here are what the scheduler logs and what callers match on,
//! so each variant formats exactly one way.

use toolchain_common::Error;

/// Error returned from one reconciliation of a ToolchainCluster
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Reading the ToolchainCluster failed; shown as the underlying error
    #[error(transparent)]
    Fetch(Error),

    /// No registry entry exists for the cluster
    #[error("cluster {name} not found in cache")]
    ClusterNotCached {
        /// Name of the ToolchainCluster
        name: String,
    },

    /// Writing the status after the health check failed
    #[error("failed to update the status of cluster - {name}: {source}")]
    StatusUpdate {
        /// Name of the ToolchainCluster
        name: String,
        /// The write error
        source: Error,
    },

    /// The ToolchainCluster handed to the controller has no namespace
    #[error("missing namespace on ToolchainCluster {name}")]
    MissingNamespace {
        /// Name of the ToolchainCluster
        name: String,
    },
}

impl ReconcileError {
    /// Name of the cluster the error is about, if known
    pub fn cluster(&self) -> Option<&str> {
        match self {
            Self::Fetch(_) => None,
            Self::ClusterNotCached { name }
            | Self::StatusUpdate { name, .. }
            | Self::MissingNamespace { name } => Some(name),
        }
    }

    /// Whether retrying later can succeed without a change to the resource
    ///
    /// A cache miss is retried since the registration flow may catch up.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(source) | Self::StatusUpdate { source, .. } => source.is_retryable(),
            Self::ClusterNotCached { .. } => true,
            Self::MissingNamespace { .. } => false,
        }
    }
}
