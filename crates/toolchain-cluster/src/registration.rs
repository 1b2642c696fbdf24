//! Registration flow - turns ToolchainCluster resources into registry entries
//!
//! Each ToolchainCluster names a Secret holding a bearer token for the remote
//! API server. The service reads it, builds a client for `spec.apiEndpoint`
//! and stores the result in the [`ClusterRegistry`](crate::registry::ClusterRegistry).
//! [`run_cache_sync`] keeps the registry in step with the resources.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::runtime::watcher::{self, watcher, Event};
use kube::{Client, Config, ResourceExt};
use tracing::{debug, error, info, warn};

use toolchain_common::crd::ToolchainCluster;
use toolchain_common::{Error, TOKEN_SECRET_KEY};

use crate::registry::{CachedCluster, ClusterType, SharedClusterRegistry};

/// Default connect and read timeout for remote cluster clients
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Backoff after a watcher error
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// PEM tag of the certificates accepted in a CA bundle
const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Builds remote clients for ToolchainClusters and keeps them in the registry
pub struct ToolchainClusterService {
    client: Client,
    registry: SharedClusterRegistry,
    operator_namespace: String,
    timeout: Duration,
}

impl ToolchainClusterService {
    /// Create a service reading Secrets through `client`
    ///
    /// `operator_namespace` is used for entries whose resource has no
    /// `namespace` label.
    pub fn new(
        client: Client,
        registry: SharedClusterRegistry,
        operator_namespace: impl Into<String>,
    ) -> Self {
        Self {
            client,
            registry,
            operator_namespace: operator_namespace.into(),
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    /// Set the connect and read timeout of remote clients
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The registry this service fills
    pub fn registry(&self) -> &SharedClusterRegistry {
        &self.registry
    }

    /// Read the cluster's token and register a client for it
    pub async fn add_or_update(&self, cluster: &ToolchainCluster) -> Result<(), Error> {
        let token = self.read_token(cluster).await?;
        self.register(cluster, &token)
    }

    /// Register a client for `cluster` authenticated with `token`
    ///
    /// Replaces any existing entry of the same name. Must run inside a tokio
    /// runtime.
    pub fn register(&self, cluster: &ToolchainCluster, token: &str) -> Result<(), Error> {
        let config = remote_config(cluster, token, self.timeout)?;
        let client = Client::try_from(config)?;
        let cached = cached_cluster_from(cluster, client, &self.operator_namespace)?;

        info!(
            cluster = %cached.name,
            cluster_type = %cached.cluster_type,
            api_endpoint = %cluster.spec.api_endpoint,
            "registered remote cluster"
        );
        self.registry.add_or_update(cached);
        Ok(())
    }

    /// Drop the entry for a cluster
    pub fn delete(&self, name: &str) {
        if self.registry.delete(name) {
            info!(cluster = %name, "removed remote cluster");
        }
    }

    async fn read_token(&self, cluster: &ToolchainCluster) -> Result<String, Error> {
        let name = cluster.name_any();
        let namespace = cluster
            .namespace()
            .ok_or_else(|| Error::validation_for(&name, "ToolchainCluster has no namespace"))?;
        let secret_name = &cluster.spec.secret_ref.name;

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let secret = secrets.get_opt(secret_name).await?.ok_or_else(|| {
            Error::validation_for(
                &name,
                format!("secret {}/{} not found", namespace, secret_name),
            )
        })?;

        token_from_secret(&name, &secret)
    }
}

/// Extract the bearer token from a credentials Secret
pub fn token_from_secret(cluster: &str, secret: &Secret) -> Result<String, Error> {
    let secret_name = secret.name_any();
    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(TOKEN_SECRET_KEY))
        .map(|value| value.0.clone())
        .or_else(|| {
            secret
                .string_data
                .as_ref()
                .and_then(|data| data.get(TOKEN_SECRET_KEY))
                .map(|value| value.clone().into_bytes())
        })
        .ok_or_else(|| {
            Error::validation_for(
                cluster,
                format!(
                    "secret {} has no '{}' key",
                    secret_name, TOKEN_SECRET_KEY
                ),
            )
        })?;

    let token = String::from_utf8(bytes).map_err(|_| {
        Error::validation_for(
            cluster,
            format!("token in secret {} is not valid UTF-8", secret_name),
        )
    })?;
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::validation_for(
            cluster,
            format!("token in secret {} is empty", secret_name),
        ));
    }
    Ok(token.to_string())
}

/// Build the client configuration for a remote cluster
pub fn remote_config(
    cluster: &ToolchainCluster,
    token: &str,
    timeout: Duration,
) -> Result<Config, Error> {
    let name = cluster.name_any();
    let endpoint = cluster.spec.api_endpoint.trim();
    let uri: http::Uri = endpoint.parse().map_err(|e| {
        Error::validation_for(&name, format!("invalid apiEndpoint '{}': {}", endpoint, e))
    })?;
    if uri.scheme().is_none() || uri.host().is_none() {
        return Err(Error::validation_for(
            &name,
            format!("invalid apiEndpoint '{}': scheme and host are required", endpoint),
        ));
    }

    let mut config = Config::new(uri);
    config.auth_info.token = Some(token.to_string().into());
    config.accept_invalid_certs = cluster.spec.tls_verification_disabled();
    if let Some(bundle) = &cluster.spec.ca_bundle {
        config.root_cert = Some(parse_ca_bundle(&name, bundle)?);
    }
    config.connect_timeout = Some(timeout);
    config.read_timeout = Some(timeout);
    if let Some(namespace) = cluster.operator_namespace() {
        config.default_namespace = namespace.to_string();
    }
    Ok(config)
}

/// Decode a base64 PEM bundle into DER certificates
pub fn parse_ca_bundle(cluster: &str, bundle: &str) -> Result<Vec<Vec<u8>>, Error> {
    let pem_bytes = base64::engine::general_purpose::STANDARD
        .decode(bundle.trim())
        .map_err(|e| Error::validation_for(cluster, format!("caBundle is not base64: {}", e)))?;

    let certs: Vec<Vec<u8>> = pem::parse_many(&pem_bytes)
        .map_err(|e| Error::validation_for(cluster, format!("caBundle is not PEM: {}", e)))?
        .into_iter()
        .filter(|p| p.tag() == CERTIFICATE_TAG)
        .map(|p| p.contents().to_vec())
        .collect();

    if certs.is_empty() {
        return Err(Error::validation_for(
            cluster,
            "caBundle contains no certificates",
        ));
    }
    Ok(certs)
}

/// Build the registry entry from the resource's labels
pub fn cached_cluster_from(
    cluster: &ToolchainCluster,
    client: Client,
    default_operator_namespace: &str,
) -> Result<CachedCluster, Error> {
    let cluster_type = match cluster.cluster_type_label() {
        Some(label) => label.parse::<ClusterType>()?,
        None => ClusterType::default(),
    };
    let operator_namespace = cluster
        .operator_namespace()
        .unwrap_or(default_operator_namespace);

    Ok(
        CachedCluster::new(cluster.name_any(), client, cluster_type)
            .operator_namespace(operator_namespace)
            .owner_cluster_name(cluster.owner_cluster_name().unwrap_or_default()),
    )
}

/// Names seen since the watcher last started listing
#[derive(Default)]
struct SyncState {
    listed: HashSet<String>,
}

/// Keep the registry in step with the ToolchainClusters visible to `api`
///
/// Runs until the watch stream ends. A relist removes entries whose resource
/// no longer exists.
pub async fn run_cache_sync(service: Arc<ToolchainClusterService>, api: Api<ToolchainCluster>) {
    let mut stream = watcher(api, watcher::Config::default()).boxed();
    let mut state = SyncState::default();

    info!("ToolchainCluster cache sync started");
    while let Some(event) = stream.next().await {
        handle_cluster_event(&service, event, &mut state).await;
    }
    warn!("ToolchainCluster watch stream ended");
}

async fn handle_cluster_event(
    service: &ToolchainClusterService,
    event: Result<Event<ToolchainCluster>, watcher::Error>,
    state: &mut SyncState,
) {
    match event {
        Ok(Event::Apply(cluster)) => register_logged(service, &cluster).await,
        Ok(Event::InitApply(cluster)) => {
            state.listed.insert(cluster.name_any());
            register_logged(service, &cluster).await;
        }
        Ok(Event::Delete(cluster)) => service.delete(&cluster.name_any()),
        Ok(Event::Init) => {
            debug!("relisting ToolchainClusters");
            state.listed.clear();
        }
        Ok(Event::InitDone) => {
            let listed = std::mem::take(&mut state.listed);
            let removed = service.registry.retain(|name| listed.contains(name));
            if !removed.is_empty() {
                info!(clusters = ?removed, "removed clusters no longer present");
            }
        }
        Err(e) => {
            warn!(error = %e, "ToolchainCluster watcher error, will retry");
            tokio::time::sleep(WATCH_RETRY_DELAY).await;
        }
    }
}

async fn register_logged(service: &ToolchainClusterService, cluster: &ToolchainCluster) {
    if let Err(e) = service.add_or_update(cluster).await {
        error!(cluster = %cluster.name_any(), error = %e, "failed to register remote cluster");
    }
}
