//! Ready condition values written by the controller
//!
//! Three outcomes share the `Ready` type: Ready, NotReady (the probe ran and
//! failed) and Offline (no connection to probe with).

use toolchain_common::crd::{Condition, ConditionStatus};
use toolchain_common::Error;

/// Condition type for cluster readiness
pub const CONDITION_READY: &str = "Ready";

/// Reason when the health check passed
pub const REASON_CLUSTER_READY: &str = "ClusterReady";

/// Reason when the health check ran and failed
pub const REASON_CLUSTER_NOT_READY: &str = "ClusterNotReady";

/// Reason when there is no connection to the cluster
pub const REASON_CLUSTER_NOT_REACHABLE: &str = "ClusterNotReachable";

/// Message for a healthy cluster
pub const MESSAGE_CLUSTER_READY: &str = "cluster is ready";

/// Message for an unhealthy cluster
pub const MESSAGE_CLUSTER_NOT_READY: &str = "cluster is not ready";

/// Message used when a cluster has no registry entry
pub fn cache_miss_message(name: &str) -> String {
    format!("cluster {} not found in cache", name)
}

/// The cluster answered its health check
pub fn ready_condition() -> Condition {
    Condition::new(
        CONDITION_READY,
        ConditionStatus::True,
        REASON_CLUSTER_READY,
        MESSAGE_CLUSTER_READY,
    )
}

/// The health check ran and failed, optionally with the probe error
pub fn not_ready_condition(cause: Option<&Error>) -> Condition {
    let message = match cause {
        Some(err) => format!("{}: {}", MESSAGE_CLUSTER_NOT_READY, err),
        None => MESSAGE_CLUSTER_NOT_READY.to_string(),
    };
    Condition::new(
        CONDITION_READY,
        ConditionStatus::False,
        REASON_CLUSTER_NOT_READY,
        message,
    )
}

/// There is no connection to probe the cluster with
pub fn offline_condition(message: impl Into<String>) -> Condition {
    Condition::new(
        CONDITION_READY,
        ConditionStatus::False,
        REASON_CLUSTER_NOT_REACHABLE,
        message,
    )
}

/// Map a probe outcome to the condition to persist
pub fn health_condition(outcome: &Result<bool, Error>) -> Condition {
    match outcome {
        Ok(true) => ready_condition(),
        Ok(false) => not_ready_condition(None),
        Err(err) => not_ready_condition(Some(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn cache_miss_message_names_the_cluster() {
        assert_eq!(
            cache_miss_message("unstable"),
            "cluster unstable not found in cache"
        );
    }

    #[rstest]
    #[case::healthy(Ok(true), ConditionStatus::True, REASON_CLUSTER_READY, "cluster is ready")]
    #[case::unhealthy(Ok(false), ConditionStatus::False, REASON_CLUSTER_NOT_READY, "cluster is not ready")]
    #[case::probe_error(
        Err(Error::connection_for("member-1", "connection refused")),
        ConditionStatus::False,
        REASON_CLUSTER_NOT_READY,
        "cluster is not ready: connection refused"
    )]
    fn probe_outcome_maps_to_ready_condition(
        #[case] outcome: Result<bool, Error>,
        #[case] status: ConditionStatus,
        #[case] reason: &str,
        #[case] message: &str,
    ) {
        let condition = health_condition(&outcome);

        assert_eq!(condition.type_, CONDITION_READY);
        assert_eq!(condition.status, status);
        assert_eq!(condition.reason, reason);
        assert_eq!(condition.message, message);
    }

    #[test]
    fn offline_condition_keeps_the_given_message() {
        let condition = offline_condition(cache_miss_message("unstable"));

        assert_eq!(condition.type_, CONDITION_READY);
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.reason, REASON_CLUSTER_NOT_REACHABLE);
        assert_eq!(condition.message, "cluster unstable not found in cache");
    }
}
