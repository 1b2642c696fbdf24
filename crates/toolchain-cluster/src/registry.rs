//! Cluster Registry - live connections to remote clusters
//!
//! The registration flow fills the registry from ToolchainCluster resources
//! and their credential Secrets. The controller only reads from it: a miss
//! means no usable connection exists for that cluster.
//!
//! Entries are immutable once inserted. Updates replace the whole `Arc`, so a
//! reader holding an entry never sees a half-written one.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use kube::Client;
use parking_lot::RwLock;

use toolchain_common::crd::ToolchainClusterStatus;
use toolchain_common::Error;

/// Relationship of a remote cluster to this one
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClusterType {
    /// The cluster running the host operator
    Host,
    /// A cluster running the member operator
    #[default]
    Member,
}

impl std::fmt::Display for ClusterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Member => write!(f, "member"),
        }
    }
}

impl FromStr for ClusterType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "host" => Ok(Self::Host),
            "member" => Ok(Self::Member),
            other => Err(Error::validation(format!(
                "invalid cluster type '{}' (expected host or member)",
                other
            ))),
        }
    }
}

/// A remote cluster with a ready-to-use client
#[derive(Clone)]
pub struct CachedCluster {
    /// Cluster name, unique within the registry
    pub name: String,
    /// Client connected to the remote API server
    pub client: Client,
    /// Host or member
    pub cluster_type: ClusterType,
    /// Namespace the operator runs in on the remote cluster
    pub operator_namespace: String,
    /// Name under which the remote cluster knows this one
    ///
    /// A ToolchainCluster for the host lives in a member, so this holds the
    /// member's name as the host registered it. Used to match the two sides
    /// of a bidirectional registration.
    pub owner_cluster_name: String,
    /// Status as of the last health check, if any ran
    pub cluster_status: Option<ToolchainClusterStatus>,
}

impl CachedCluster {
    /// Create an entry with no owner name and no health history
    pub fn new(name: impl Into<String>, client: Client, cluster_type: ClusterType) -> Self {
        Self {
            name: name.into(),
            client,
            cluster_type,
            operator_namespace: String::new(),
            owner_cluster_name: String::new(),
            cluster_status: None,
        }
    }

    /// Set the remote operator namespace
    pub fn operator_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.operator_namespace = namespace.into();
        self
    }

    /// Set the owner cluster name
    pub fn owner_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.owner_cluster_name = name.into();
        self
    }
}

impl std::fmt::Debug for CachedCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedCluster")
            .field("name", &self.name)
            .field("cluster_type", &self.cluster_type)
            .field("operator_namespace", &self.operator_namespace)
            .field("owner_cluster_name", &self.owner_cluster_name)
            .field("cluster_status", &self.cluster_status)
            .finish_non_exhaustive()
    }
}

/// Registry shared between the controller and the registration flow
pub type SharedClusterRegistry = Arc<ClusterRegistry>;

/// Registry of remote clusters keyed by name
///
/// Readers run in parallel; a writer holds the lock for one mutation only.
#[derive(Default)]
pub struct ClusterRegistry {
    clusters: RwLock<HashMap<String, Arc<CachedCluster>>>,
}

impl ClusterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the entry, replacing any entry with the same name
    pub fn add_or_update(&self, cluster: CachedCluster) {
        let mut clusters = self.clusters.write();
        clusters.insert(cluster.name.clone(), Arc::new(cluster));
    }

    /// Get the entry for a cluster
    pub fn get(&self, name: &str) -> Option<Arc<CachedCluster>> {
        self.clusters.read().get(name).cloned()
    }

    /// Get any entry
    ///
    /// Which one is unspecified. Used by callers that need some live
    /// connection, not a particular one.
    pub fn get_first(&self) -> Option<Arc<CachedCluster>> {
        self.clusters.read().values().next().cloned()
    }

    /// Get all entries of the given type
    pub fn get_by_type(&self, cluster_type: ClusterType) -> Vec<Arc<CachedCluster>> {
        self.clusters
            .read()
            .values()
            .filter(|c| c.cluster_type == cluster_type)
            .cloned()
            .collect()
    }

    /// Remove the entry for a cluster
    ///
    /// Returns true if an entry was removed.
    pub fn delete(&self, name: &str) -> bool {
        self.clusters.write().remove(name).is_some()
    }

    /// Keep only entries whose name satisfies the predicate
    ///
    /// Returns the names that were removed.
    pub fn retain(&self, keep: impl Fn(&str) -> bool) -> Vec<String> {
        let mut clusters = self.clusters.write();
        let removed: Vec<String> = clusters
            .keys()
            .filter(|name| !keep(name.as_str()))
            .cloned()
            .collect();
        for name in &removed {
            clusters.remove(name);
        }
        removed
    }

    /// Record the latest health check result on an existing entry
    ///
    /// The entry is replaced, not mutated. Returns false if the cluster is
    /// not registered.
    pub fn update_status(&self, name: &str, status: ToolchainClusterStatus) -> bool {
        let mut clusters = self.clusters.write();
        match clusters.get(name) {
            Some(existing) => {
                let mut updated = CachedCluster::clone(existing);
                updated.cluster_status = Some(status);
                clusters.insert(name.to_string(), Arc::new(updated));
                true
            }
            None => false,
        }
    }

    /// Sorted names of all registered clusters
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clusters.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered clusters
    pub fn len(&self) -> usize {
        self.clusters.read().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.clusters.read().is_empty()
    }
}
