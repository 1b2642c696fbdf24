//! ToolchainCluster Custom Resource Definition
//!
//! A ToolchainCluster describes a remote cluster this operator talks to:
//! where its API server lives and which Secret holds the credentials.
//! The controller projects the remote cluster's liveness into the status.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{find_condition, Condition};
use crate::{CLUSTER_TYPE_LABEL, OPERATOR_NAMESPACE_LABEL, OWNER_CLUSTER_NAME_LABEL};

/// Desired state of a ToolchainCluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "toolchain.dev",
    version = "v1alpha1",
    kind = "ToolchainCluster",
    plural = "toolchainclusters",
    shortname = "tc",
    status = "ToolchainClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"API Endpoint","type":"string","jsonPath":".spec.apiEndpoint"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ToolchainClusterSpec {
    /// URL of the remote cluster's API server (e.g. `https://api.member-1.example.com:6443`)
    pub api_endpoint: String,

    /// Secret in the same namespace holding the bearer token under the `token` key
    pub secret_ref: LocalSecretReference,

    /// Base64-encoded PEM bundle of CAs trusted for the API server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,

    /// TLS validations to skip when talking to the API server
    #[serde(
        default,
        rename = "disabledTLSValidations",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub disabled_tls_validations: Vec<TlsValidation>,
}

impl ToolchainClusterSpec {
    /// Whether any TLS validation is disabled
    ///
    /// The kube client cannot skip individual checks, so any entry turns
    /// certificate verification off entirely.
    pub fn tls_verification_disabled(&self) -> bool {
        !self.disabled_tls_validations.is_empty()
    }
}

/// Reference to a Secret in the resource's own namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct LocalSecretReference {
    /// Name of the Secret
    pub name: String,
}

/// A TLS validation that can be disabled for a remote cluster
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum TlsValidation {
    /// Every validation
    #[serde(rename = "*")]
    All,
    /// Hostname verification
    SubjectName,
    /// Certificate expiry verification
    ValidityPeriod,
}

/// Status for a ToolchainCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolchainClusterStatus {
    /// Observed conditions, at most one per type
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ToolchainClusterStatus {
    /// Add a condition (builder style)
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// The condition of the given type, if present
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        find_condition(&self.conditions, type_)
    }
}

impl ToolchainCluster {
    /// Value of the `type` label (host or member)
    pub fn cluster_type_label(&self) -> Option<&str> {
        self.labels().get(CLUSTER_TYPE_LABEL).map(String::as_str)
    }

    /// Operator namespace on the remote cluster, from the `namespace` label
    pub fn operator_namespace(&self) -> Option<&str> {
        self.labels()
            .get(OPERATOR_NAMESPACE_LABEL)
            .map(String::as_str)
    }

    /// Name under which the remote cluster knows this one, from the `ownerClusterName` label
    pub fn owner_cluster_name(&self) -> Option<&str> {
        self.labels()
            .get(OWNER_CLUSTER_NAME_LABEL)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ConditionStatus;
    use kube::CustomResourceExt;

    const MEMBER_YAML: &str = r#"
apiVersion: toolchain.dev/v1alpha1
kind: ToolchainCluster
metadata:
  name: member-1
  namespace: toolchain-host-operator
  labels:
    type: member
    namespace: toolchain-member-operator
    ownerClusterName: host-1
spec:
  apiEndpoint: https://api.member-1.example.com:6443
  secretRef:
    name: member-1-token
  disabledTLSValidations:
    - "*"
"#;

    #[test]
    fn deserializes_from_manifest() {
        let tc: ToolchainCluster = serde_yaml::from_str(MEMBER_YAML).unwrap();

        assert_eq!(tc.name_any(), "member-1");
        assert_eq!(tc.spec.api_endpoint, "https://api.member-1.example.com:6443");
        assert_eq!(tc.spec.secret_ref.name, "member-1-token");
        assert_eq!(tc.spec.disabled_tls_validations, vec![TlsValidation::All]);
        assert!(tc.spec.tls_verification_disabled());
        assert!(tc.spec.ca_bundle.is_none());
        assert!(tc.status.is_none());
    }

    #[test]
    fn labels_carry_registry_metadata() {
        let tc: ToolchainCluster = serde_yaml::from_str(MEMBER_YAML).unwrap();

        assert_eq!(tc.cluster_type_label(), Some("member"));
        assert_eq!(tc.operator_namespace(), Some("toolchain-member-operator"));
        assert_eq!(tc.owner_cluster_name(), Some("host-1"));
    }

    #[test]
    fn missing_labels_are_none() {
        let tc = ToolchainCluster::new(
            "bare",
            ToolchainClusterSpec {
                api_endpoint: "https://bare:6443".to_string(),
                secret_ref: LocalSecretReference {
                    name: "bare".to_string(),
                },
                ca_bundle: None,
                disabled_tls_validations: vec![],
            },
        );

        assert!(tc.cluster_type_label().is_none());
        assert!(tc.operator_namespace().is_none());
        assert!(tc.owner_cluster_name().is_none());
        assert!(!tc.spec.tls_verification_disabled());
    }

    #[test]
    fn status_serializes_conditions_in_camel_case() {
        let status = ToolchainClusterStatus::default().condition(Condition::new(
            "Ready",
            ConditionStatus::True,
            "ClusterReady",
            "cluster is ready",
        ));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["conditions"][0]["type"], "Ready");
        assert_eq!(
            status.get_condition("Ready").unwrap().status,
            ConditionStatus::True
        );
    }

    #[test]
    fn crd_is_namespaced_with_status_subresource() {
        let crd = ToolchainCluster::crd();

        assert_eq!(crd.metadata.name.as_deref(), Some("toolchainclusters.toolchain.dev"));
        assert_eq!(crd.spec.scope, "Namespaced");
        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1alpha1");
        assert!(version
            .subresources
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .is_some());
    }
}
