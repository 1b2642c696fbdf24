//! Kubernetes client helpers shared by the operator crates

use std::time::Duration;

use kube::{Client, Config};

use crate::Error;

/// Default connect timeout for API server connections
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default read timeout; must stay above the watcher timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a client for the local cluster with explicit timeouts
///
/// Uses the in-cluster service account when running in a pod, otherwise the
/// local kubeconfig.
pub async fn create_client(
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = Config::infer().await.map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
    })?;
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}
