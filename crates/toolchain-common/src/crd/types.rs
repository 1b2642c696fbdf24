//! Shared status types used across toolchain CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
///
/// Conditions are keyed by `type_`: a status holds at most one condition
/// of each type. Use [`set_condition`] to keep that invariant.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned from one status to another
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,

    /// Last time the condition was written, whether or not it changed
    #[serde(
        rename = "lastUpdatedTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
            last_updated_time: None,
        }
    }

    /// True when type, status, reason and message match, ignoring timestamps
    pub fn same_as(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Find the condition of the given type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Insert or replace the condition with the same type
///
/// The previous `lastTransitionTime` is kept when the status did not change.
/// `lastUpdatedTime` is always refreshed. New types are appended so the
/// order of existing conditions is stable.
///
/// Returns true if anything other than the timestamps changed.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    condition.last_updated_time = Some(Utc::now());

    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            let changed = !existing.same_as(&condition);
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
            changed
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ready(status: ConditionStatus, reason: &str) -> Condition {
        Condition::new("Ready", status, reason, "message")
    }

    #[test]
    fn new_condition_is_stamped_now() {
        let before = Utc::now();
        let condition = Condition::new(
            "Ready",
            ConditionStatus::True,
            "ClusterReady",
            "cluster is ready",
        );
        let after = Utc::now();

        assert_eq!(condition.type_, "Ready");
        assert_eq!(condition.status, ConditionStatus::True);
        assert!(condition.last_transition_time >= before);
        assert!(condition.last_transition_time <= after);
        assert!(condition.last_updated_time.is_none());
    }

    #[test]
    fn default_condition_status_is_unknown() {
        assert_eq!(ConditionStatus::default(), ConditionStatus::Unknown);
        assert_eq!(ConditionStatus::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn condition_serializes_with_kubernetes_field_names() {
        let condition = ready(ConditionStatus::False, "ClusterNotReady");
        let json = serde_json::to_value(&condition).unwrap();

        assert_eq!(json["type"], "Ready");
        assert_eq!(json["status"], "False");
        assert!(json.get("lastTransitionTime").is_some());
        assert!(json.get("lastUpdatedTime").is_none());
    }

    #[test]
    fn set_condition_appends_new_types() {
        let mut conditions = vec![Condition::new(
            "Synced",
            ConditionStatus::True,
            "Synced",
            "",
        )];

        assert!(set_condition(
            &mut conditions,
            ready(ConditionStatus::True, "ClusterReady")
        ));

        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].type_, "Synced");
        assert_eq!(conditions[1].type_, "Ready");
        assert!(conditions[1].last_updated_time.is_some());
    }

    #[test]
    fn set_condition_keeps_transition_time_when_status_is_unchanged() {
        let mut old = ready(ConditionStatus::True, "ClusterReady");
        old.last_transition_time = Utc::now() - Duration::hours(1);
        let original_transition = old.last_transition_time;
        let mut conditions = vec![old];

        let changed = set_condition(&mut conditions, ready(ConditionStatus::True, "ClusterReady"));

        assert!(!changed);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, original_transition);
        assert!(conditions[0].last_updated_time.unwrap() > original_transition);
    }

    #[test]
    fn set_condition_moves_transition_time_when_status_flips() {
        let mut old = ready(ConditionStatus::True, "ClusterReady");
        old.last_transition_time = Utc::now() - Duration::hours(1);
        let original_transition = old.last_transition_time;
        let mut conditions = vec![old];

        let changed = set_condition(
            &mut conditions,
            ready(ConditionStatus::False, "ClusterNotReachable"),
        );

        assert!(changed);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, ConditionStatus::False);
        assert_eq!(conditions[0].reason, "ClusterNotReachable");
        assert!(conditions[0].last_transition_time > original_transition);
    }

    #[test]
    fn find_condition_by_type() {
        let conditions = vec![
            Condition::new("Synced", ConditionStatus::True, "Synced", ""),
            ready(ConditionStatus::False, "ClusterNotReady"),
        ];

        let found = find_condition(&conditions, "Ready").unwrap();
        assert_eq!(found.reason, "ClusterNotReady");
        assert!(find_condition(&conditions, "Missing").is_none());
    }
}
