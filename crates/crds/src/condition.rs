//! Typed status conditions
//!
//! A `TraceStack` carries exactly one condition per type. The transition
//! timestamp moves only when the boolean value flips, never on a no-op
//! recompute, so watchers can rely on it for ordering.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type attached to a `TraceStack` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionType {
    /// All components operational, no reconcile error
    Ready,

    /// At least one component has pods waiting on dependencies
    Pending,

    /// Reconciliation failed or components are failing
    Failed,

    /// The declared spec or values document is invalid; requires user correction
    ConfigurationError,
}

/// A timestamped boolean health signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackCondition {
    /// Condition type; exactly one condition per type is kept in the list
    #[serde(rename = "type")]
    pub condition_type: ConditionType,

    /// Whether the condition currently holds
    pub status: bool,

    /// Machine-readable reason for the last evaluation
    pub reason: String,

    /// Human-readable detail
    pub message: String,

    /// When `status` last changed value
    pub last_transition_time: DateTime<Utc>,
}

impl StackCondition {
    /// Build a condition stamped with `now`; the status engine overwrites the
    /// timestamp with the prior one when the value did not flip.
    pub fn new(
        condition_type: ConditionType,
        status: bool,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            condition_type,
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: now,
        }
    }
}

/// Find a condition by type.
pub fn find_condition(
    conditions: &[StackCondition],
    condition_type: ConditionType,
) -> Option<&StackCondition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}
