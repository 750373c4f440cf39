//! Goals and their lifecycle

use crate::{
    types::{all_hold, values_equal, Condition, GoalId, Resources},
    IntentError, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use synapsed_beliefs::WorldState;

/// Status of a goal.
///
/// Transitions run pending → active → {achieved, failed}. Terminal states are
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// Adopted but not yet committed to
    Pending,
    /// Backed by an intention
    Active,
    /// Completed successfully
    Achieved,
    /// Abandoned after failure
    Failed,
}

impl GoalStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, GoalStatus::Achieved | GoalStatus::Failed)
    }

    pub fn can_transition_to(self, next: GoalStatus) -> bool {
        matches!(
            (self, next),
            (GoalStatus::Pending, GoalStatus::Active)
                | (GoalStatus::Active, GoalStatus::Achieved)
                | (GoalStatus::Active, GoalStatus::Failed)
        )
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GoalStatus::Pending => "pending",
            GoalStatus::Active => "active",
            GoalStatus::Achieved => "achieved",
            GoalStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a goal exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalSource {
    /// Promoted from the desire with this id
    Desire(String),
    /// Produced by decomposing a parent goal
    Decomposition(GoalId),
    /// Raised by a REQUEST from another agent
    Request { from: String },
    /// Raised by a reactive rule
    Reactive(String),
    /// Injected by the host
    External,
}

/// A state of affairs an agent has adopted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    /// Stable key plans are indexed by, e.g. `reduce_costs`
    pub name: String,
    pub description: String,
    pub priority: f64,
    status: GoalStatus,
    pub parent: Option<GoalId>,
    pub children: Vec<GoalId>,
    pub preconditions: Vec<Condition>,
    /// Belief values that hold once the goal is achieved
    pub effects: BTreeMap<String, Value>,
    pub resources: Resources,
    pub source: GoalSource,
    pub created_at: DateTime<Utc>,
}

impl Goal {
    pub fn new(name: impl Into<String>, description: impl Into<String>, priority: f64) -> Self {
        Self {
            id: GoalId::new(),
            name: name.into(),
            description: description.into(),
            priority,
            status: GoalStatus::Pending,
            parent: None,
            children: Vec::new(),
            preconditions: Vec::new(),
            effects: BTreeMap::new(),
            resources: Resources::new(),
            source: GoalSource::External,
            created_at: Utc::now(),
        }
    }

    pub fn with_precondition(mut self, condition: Condition) -> Self {
        self.preconditions.push(condition);
        self
    }

    pub fn with_effect(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.effects.insert(key.into(), value.into());
        self
    }

    pub fn requires(mut self, resource: impl Into<String>, amount: f64) -> Self {
        self.resources.insert(resource.into(), amount);
        self
    }

    pub fn with_source(mut self, source: GoalSource) -> Self {
        self.source = source;
        self
    }

    pub fn status(&self) -> GoalStatus {
        self.status
    }

    /// Moves to `next`, rejecting anything outside the allowed transitions
    pub fn transition(&mut self, next: GoalStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(IntentError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Preconditions hold in `state`
    pub fn is_achievable(&self, state: &WorldState) -> bool {
        all_hold(&self.preconditions, state)
    }

    /// Every declared effect already holds in `state`
    pub fn is_satisfied(&self, state: &WorldState) -> bool {
        !self.effects.is_empty()
            && self
                .effects
                .iter()
                .all(|(key, value)| state.get(key).is_some_and(|actual| values_equal(actual, value)))
    }
}
