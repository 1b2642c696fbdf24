//! ToolchainCluster controller implementation
//!
//! Each reconciliation reads the ToolchainCluster, looks up its connection in
//! the [`ClusterRegistry`](crate::registry::ClusterRegistry), probes the remote
//! API server and writes the resulting `Ready` condition to the status.
//!
//! Outcomes:
//! - resource gone: done, no requeue
//! - read failed: the read error is returned as-is
//! - no registry entry: Offline condition written (best effort), cache-miss error returned
//! - probe ran: Ready/NotReady written; a failed write is returned, otherwise requeue
//!
//! There is no retry loop here. The controller runtime retries on error and
//! re-runs after the requeue interval on success.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use toolchain_common::crd::{set_condition, Condition, ToolchainCluster};
use toolchain_common::{Error, FIELD_MANAGER};

use crate::conditions::{cache_miss_message, health_condition, offline_condition};
use crate::error::ReconcileError;
use crate::health::{HealthProbe, HealthzProbe};
use crate::registry::SharedClusterRegistry;

/// Default interval between health checks of a reachable cluster
pub const DEFAULT_REQUEUE_AFTER: Duration = Duration::from_secs(10);

/// Delay before retrying a failed reconciliation
pub const ERROR_REQUEUE_AFTER: Duration = Duration::from_secs(5);

/// Trait abstracting Kubernetes client operations for ToolchainCluster
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get a ToolchainCluster, `None` if it does not exist
    async fn get_toolchain_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ToolchainCluster>, Error>;

    /// Write the status of a ToolchainCluster
    ///
    /// The write carries the object's `resourceVersion` when it has one, so a
    /// concurrent writer causes a conflict instead of a lost update.
    async fn update_status(&self, cluster: &ToolchainCluster) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_toolchain_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ToolchainCluster>, Error> {
        let api: Api<ToolchainCluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn update_status(&self, cluster: &ToolchainCluster) -> Result<(), Error> {
        let name = cluster.name_any();
        let namespace = cluster
            .namespace()
            .ok_or_else(|| Error::validation_for(&name, "ToolchainCluster has no namespace"))?;
        let api: Api<ToolchainCluster> = Api::namespaced(self.client.clone(), &namespace);

        let mut patch = serde_json::json!({ "status": cluster.status });
        if let Some(version) = cluster.resource_version() {
            patch["metadata"] = serde_json::json!({ "resourceVersion": version });
        }

        api.patch_status(
            &name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

        Ok(())
    }
}

/// Shared context for the ToolchainCluster controller
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```text
/// let ctx = Context::builder(client, registry)
///     .requeue_after(Duration::from_secs(10))
///     .build();
/// ```
pub struct Context {
    /// Kubernetes client for the local cluster (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Connections to remote clusters, filled by the registration flow
    pub registry: SharedClusterRegistry,
    /// Strategy used to probe remote clusters
    pub health: Arc<dyn HealthProbe>,
    /// Delay before re-checking a cluster after a successful reconciliation
    pub requeue_after: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client, registry: SharedClusterRegistry) -> ContextBuilder {
        ContextBuilder::new(client, registry)
    }

    /// Create a context for testing with custom mock clients
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn KubeClient>,
        registry: SharedClusterRegistry,
        health: Arc<dyn HealthProbe>,
        requeue_after: Duration,
    ) -> Self {
        Self {
            kube,
            registry,
            health,
            requeue_after,
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    registry: SharedClusterRegistry,
    kube: Option<Arc<dyn KubeClient>>,
    health: Option<Arc<dyn HealthProbe>>,
    requeue_after: Duration,
}

impl ContextBuilder {
    fn new(client: Client, registry: SharedClusterRegistry) -> Self {
        Self {
            client,
            registry,
            kube: None,
            health: None,
            requeue_after: DEFAULT_REQUEUE_AFTER,
        }
    }

    /// Override the Kubernetes client (primarily for testing)
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Override the health probe
    pub fn health_probe(mut self, health: Arc<dyn HealthProbe>) -> Self {
        self.health = Some(health);
        self
    }

    /// Set the interval between health checks
    pub fn requeue_after(mut self, requeue_after: Duration) -> Self {
        self.requeue_after = requeue_after;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: self
                .kube
                .unwrap_or_else(|| Arc::new(KubeClientImpl::new(self.client.clone()))),
            registry: self.registry,
            health: self
                .health
                .unwrap_or_else(|| Arc::new(HealthzProbe::default())),
            requeue_after: self.requeue_after,
        }
    }
}

/// Reconcile a ToolchainCluster handed over by the controller runtime
///
/// The object is only used for its key; the latest version is read again.
pub async fn reconcile(
    cluster: Arc<ToolchainCluster>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let name = cluster.name_any();
    let namespace = cluster
        .namespace()
        .ok_or_else(|| ReconcileError::MissingNamespace { name: name.clone() })?;
    reconcile_request(&namespace, &name, &ctx).await
}

/// Reconcile the ToolchainCluster with the given namespace and name
#[instrument(skip(ctx), fields(cluster = %name))]
pub async fn reconcile_request(
    namespace: &str,
    name: &str,
    ctx: &Context,
) -> Result<Action, ReconcileError> {
    debug!("reconciling ToolchainCluster");

    let mut cluster = match ctx.kube.get_toolchain_cluster(namespace, name).await {
        Ok(Some(cluster)) => cluster,
        Ok(None) => {
            debug!("ToolchainCluster not found, nothing to do");
            return Ok(Action::await_change());
        }
        Err(e) => return Err(ReconcileError::Fetch(e)),
    };

    let Some(cached) = ctx.registry.get(name) else {
        let message = cache_miss_message(name);
        warn!(%message, "no connection registered for cluster");
        apply_condition(&mut cluster, offline_condition(&message));
        // the cache miss is what gets reported, a failed write only gets logged
        if let Err(e) = ctx.kube.update_status(&cluster).await {
            error!(error = %e, "failed to update the status of ToolchainCluster");
        }
        return Err(ReconcileError::ClusterNotCached {
            name: name.to_string(),
        });
    };

    let outcome = ctx.health.check(name, &cached.client).await;
    match &outcome {
        Ok(true) => debug!("cluster is healthy"),
        Ok(false) => warn!("cluster is reachable but not healthy"),
        Err(e) => warn!(error = %e, "cluster health check failed"),
    }

    let ready = matches!(outcome, Ok(true));
    let changed = apply_condition(&mut cluster, health_condition(&outcome));

    if let Err(source) = ctx.kube.update_status(&cluster).await {
        return Err(ReconcileError::StatusUpdate {
            name: name.to_string(),
            source,
        });
    }

    // only persisted statuses are mirrored onto the registry entry
    if let Some(status) = cluster.status {
        ctx.registry.update_status(name, status);
    }

    if changed {
        info!(ready, "cluster readiness changed");
    }

    Ok(Action::requeue(ctx.requeue_after))
}

/// Upsert a condition into the cluster's status, creating the status if needed
///
/// Returns true if the condition changed.
fn apply_condition(cluster: &mut ToolchainCluster, condition: Condition) -> bool {
    let status = cluster.status.get_or_insert_with(Default::default);
    set_condition(&mut status.conditions, condition)
}

/// Error policy for ToolchainCluster reconciliation
///
/// - Retryable errors (transient, cache misses, conflicts): requeue after a fixed delay
/// - Non-retryable errors (validation, 4xx): await a change to the resource
pub fn error_policy(
    cluster: Arc<ToolchainCluster>,
    error: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    let name = cluster.name_any();
    error!(
        %error,
        cluster = %error.cluster().unwrap_or(name.as_str()),
        retryable = error.is_retryable(),
        "ToolchainCluster reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(ERROR_REQUEUE_AFTER)
    } else {
        Action::await_change()
    }
}
