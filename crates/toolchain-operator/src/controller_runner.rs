//! Controller runner - wires the registry, the cache sync and the controller

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};
use tracing::{info, warn};

use toolchain_cluster::{
    error_policy, reconcile, run_cache_sync, ClusterRegistry, Context, HealthzProbe,
    ToolchainClusterService,
};
use toolchain_common::crd::ToolchainCluster;

use crate::config::OperatorConfig;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Run the operator until a shutdown signal stops the controller
pub async fn run(client: Client, config: OperatorConfig) {
    let registry = Arc::new(ClusterRegistry::new());
    let operator_namespace = config
        .namespace
        .clone()
        .unwrap_or_else(|| client.default_namespace().to_string());

    let service = Arc::new(
        ToolchainClusterService::new(client.clone(), registry.clone(), operator_namespace)
            .with_timeout(config.health_timeout),
    );

    let ctx = Arc::new(
        Context::builder(client.clone(), registry)
            .health_probe(Arc::new(HealthzProbe::new(config.health_timeout)))
            .requeue_after(config.requeue_after)
            .build(),
    );

    let clusters = toolchain_cluster_api(client, config.namespace.as_deref());

    info!(
        namespace = config.namespace.as_deref().unwrap_or("<all>"),
        requeue_after_secs = config.requeue_after.as_secs(),
        health_timeout_secs = config.health_timeout.as_secs(),
        "starting ToolchainCluster controller"
    );

    let controller = Controller::new(
        clusters.clone(),
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .shutdown_on_signal()
    .run(reconcile, error_policy, ctx)
    .for_each(log_reconcile_result("ToolchainCluster"));

    tokio::select! {
        _ = controller => info!("ToolchainCluster controller stopped"),
        _ = run_cache_sync(service, clusters) => warn!("ToolchainCluster cache sync stopped"),
    }
}

fn toolchain_cluster_api(client: Client, namespace: Option<&str>) -> Api<ToolchainCluster> {
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
