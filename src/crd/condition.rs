//! Status conditions shared by all resource kinds
//!
//! Conditions are kept in an insertion-ordered map keyed by type and
//! serialized as the usual Kubernetes list.

use chrono::Utc;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition status values
pub mod condition_status {
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
    pub const UNKNOWN: &str = "Unknown";
}

/// Condition for status reporting
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: String,

    /// Reason for the condition's last transition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned
    #[serde(default)]
    pub last_transition_time: String,

    /// Generation observed when condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn new(
        type_: &str,
        status: bool,
        reason: &str,
        message: &str,
        observed_generation: Option<i64>,
    ) -> Self {
        Self {
            type_: type_.to_string(),
            status: if status {
                condition_status::TRUE
            } else {
                condition_status::FALSE
            }
            .to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: Utc::now().to_rfc3339(),
            observed_generation,
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == condition_status::TRUE
    }
}

/// At most one condition per type, in first-seen order
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct Conditions(IndexMap<String, Condition>);

impl Conditions {
    /// Insert or replace the entry for `condition.type_`
    ///
    /// Returns `false` without touching anything when an entry with the same
    /// type and status already exists.
    pub fn upsert(&mut self, condition: Condition) -> bool {
        match self.0.get_mut(&condition.type_) {
            Some(existing) if existing.status == condition.status => false,
            Some(existing) => {
                *existing = condition;
                true
            }
            None => {
                self.0.insert(condition.type_.clone(), condition);
                true
            }
        }
    }

    pub fn get(&self, type_: &str) -> Option<&Condition> {
        self.0.get(type_)
    }

    /// `Some(true|false)` for a known type, `None` if the type was never set
    pub fn status_of(&self, type_: &str) -> Option<bool> {
        self.get(type_).map(Condition::is_true)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.values()
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(list: Vec<Condition>) -> Self {
        let mut map = IndexMap::with_capacity(list.len());
        for condition in list {
            map.insert(condition.type_.clone(), condition);
        }
        Self(map)
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(conditions: Conditions) -> Self {
        conditions.0.into_values().collect()
    }
}

/// Resources that carry a condition list in their status
pub trait HasConditions {
    fn conditions(&self) -> Option<&Conditions>;

    fn conditions_mut(&mut self) -> &mut Conditions;
}
