//! Reasoning oracle: an async, fallible source of desires, decompositions and plans
//!
//! Production deployments put a language model behind [`ReasoningOracle`].
//! [`RuleOracle`] answers from lookup tables and is used in tests and demos.

use crate::desire::Desire;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use synapsed_beliefs::{Belief, WorldState};

/// Result type for oracle calls
pub type OracleResult<T> = std::result::Result<T, OracleError>;

/// Oracle failures; never fatal to an agent
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle returned unusable output: {0}")]
    Unusable(String),

    #[error("Oracle call cancelled")]
    Cancelled,
}

/// A decision the oracle may be asked to explain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub agent: String,
    /// What kind of decision, e.g. `goal_failed`
    pub kind: String,
    pub summary: String,
    #[serde(default)]
    pub details: Value,
}

#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Desires worth holding given the current beliefs
    async fn generate_desires(&self, beliefs: &[Belief]) -> OracleResult<Vec<Desire>>;

    /// Raw subgoal descriptions for a goal; validated by the goal tree
    async fn decompose_goal(&self, description: &str) -> OracleResult<Vec<Value>>;

    /// Raw step descriptions achieving a goal from `state`
    async fn plan_steps(&self, goal_description: &str, state: &WorldState) -> OracleResult<Vec<Value>>;

    /// Natural-language account of a decision
    async fn explain(&self, decision: &Decision) -> OracleResult<String>;
}

/// Oracle answering from fixed tables
#[derive(Debug, Clone, Default)]
pub struct RuleOracle {
    desires: Vec<Desire>,
    decompositions: HashMap<String, Vec<Value>>,
    steps: HashMap<String, Vec<Value>>,
}

impl RuleOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offered whenever its activation conditions hold
    pub fn with_desire(mut self, desire: Desire) -> Self {
        self.desires.push(desire);
        self
    }

    pub fn with_decomposition<I, V>(mut self, goal_description: impl Into<String>, subgoals: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.decompositions.insert(
            goal_description.into(),
            subgoals.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn with_steps<I, V>(mut self, goal_description: impl Into<String>, steps: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.steps.insert(
            goal_description.into(),
            steps.into_iter().map(Into::into).collect(),
        );
        self
    }
}

#[async_trait]
impl ReasoningOracle for RuleOracle {
    async fn generate_desires(&self, beliefs: &[Belief]) -> OracleResult<Vec<Desire>> {
        let state: WorldState = beliefs
            .iter()
            .map(|b| (b.key.clone(), b.value.clone()))
            .collect();
        Ok(self
            .desires
            .iter()
            .filter(|d| d.is_active(&state))
            .cloned()
            .collect())
    }

    async fn decompose_goal(&self, description: &str) -> OracleResult<Vec<Value>> {
        self.decompositions
            .get(description)
            .cloned()
            .ok_or_else(|| OracleError::Unusable(format!("no decomposition for '{description}'")))
    }

    async fn plan_steps(&self, goal_description: &str, _state: &WorldState) -> OracleResult<Vec<Value>> {
        self.steps
            .get(goal_description)
            .cloned()
            .ok_or_else(|| OracleError::Unusable(format!("no steps for '{goal_description}'")))
    }

    async fn explain(&self, decision: &Decision) -> OracleResult<String> {
        Ok(format!("{} ({}): {}", decision.kind, decision.agent, decision.summary))
    }
}
