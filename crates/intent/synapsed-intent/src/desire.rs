//! Desires: candidate goals gated by activation conditions

use crate::{
    goal::{Goal, GoalSource},
    types::{all_hold, Condition, Resources},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use synapsed_beliefs::WorldState;

/// The goal a desire turns into once it activates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalTemplate {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub preconditions: Vec<Condition>,
    #[serde(default)]
    pub effects: BTreeMap<String, Value>,
    #[serde(default)]
    pub resources: Resources,
}

impl GoalTemplate {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            preconditions: Vec::new(),
            effects: BTreeMap::new(),
            resources: Resources::new(),
        }
    }

    /// A fresh pending goal built from this template
    pub fn instantiate(&self, priority: f64) -> Goal {
        let mut goal = Goal::new(self.name.clone(), self.description.clone(), priority);
        goal.preconditions = self.preconditions.clone();
        goal.effects = self.effects.clone();
        goal.resources = self.resources.clone();
        goal
    }
}

/// Something the agent wants, not yet committed to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Desire {
    pub id: String,
    pub description: String,
    pub priority: f64,
    /// All must hold for the desire to be pursued
    #[serde(default)]
    pub activation: Vec<Condition>,
    /// When all hold, the desire is satisfied
    #[serde(default)]
    pub completion: Vec<Condition>,
    /// Goal to adopt; defaults to a goal named after the desire
    #[serde(default)]
    pub goal: Option<GoalTemplate>,
}

impl Desire {
    pub fn new(id: impl Into<String>, description: impl Into<String>, priority: f64) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            priority,
            activation: Vec::new(),
            completion: Vec::new(),
            goal: None,
        }
    }

    pub fn activates_when(mut self, condition: Condition) -> Self {
        self.activation.push(condition);
        self
    }

    pub fn completes_when(mut self, condition: Condition) -> Self {
        self.completion.push(condition);
        self
    }

    /// Pursue a goal with its own name and description
    pub fn pursues(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.goal = Some(GoalTemplate::new(name, description));
        self
    }

    pub fn pursues_template(mut self, template: GoalTemplate) -> Self {
        self.goal = Some(template);
        self
    }

    /// Completion conditions are declared and all hold
    pub fn is_complete(&self, state: &WorldState) -> bool {
        !self.completion.is_empty() && all_hold(&self.completion, state)
    }

    /// Activation conditions hold and the desire is not yet complete
    pub fn is_active(&self, state: &WorldState) -> bool {
        all_hold(&self.activation, state) && !self.is_complete(state)
    }

    pub fn goal_template(&self) -> GoalTemplate {
        self.goal
            .clone()
            .unwrap_or_else(|| GoalTemplate::new(self.id.clone(), self.description.clone()))
    }

    /// The goal this desire promotes to, sharing its priority
    pub fn to_goal(&self) -> Goal {
        self.goal_template()
            .instantiate(self.priority)
            .with_source(GoalSource::Desire(self.id.clone()))
    }
}
