//! Behavior strategies composing an agent's capability set

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use synapsed_beliefs::WorldState;
use synapsed_intent::{all_hold, Condition, GoalTemplate};

/// Condition → response rule evaluated every tick before deliberation.
///
/// A rule fires once when its trigger starts holding and again only after
/// the trigger has stopped holding for at least one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactiveRule {
    pub name: String,
    pub trigger: Vec<Condition>,
    /// Beliefs written when the rule fires
    #[serde(default)]
    pub sets: BTreeMap<String, Value>,
    /// Goal raised when the rule fires
    #[serde(default)]
    pub raises: Option<GoalTemplate>,
    #[serde(default = "default_rule_priority")]
    pub priority: f64,
}

fn default_rule_priority() -> f64 {
    1.0
}

impl ReactiveRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trigger: Vec::new(),
            sets: BTreeMap::new(),
            raises: None,
            priority: default_rule_priority(),
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.trigger.push(condition);
        self
    }

    pub fn sets(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sets.insert(key.into(), value.into());
        self
    }

    pub fn raises(mut self, name: impl Into<String>, description: impl Into<String>, priority: f64) -> Self {
        self.raises = Some(GoalTemplate::new(name, description));
        self.priority = priority;
        self
    }

    /// An empty trigger never fires
    pub fn is_triggered(&self, state: &WorldState) -> bool {
        !self.trigger.is_empty() && all_hold(&self.trigger, state)
    }
}

/// Which strategies an agent carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub reactive_rules: bool,
    pub planner: bool,
    pub domain_goals: bool,
}

/// How an agent behaves, derived from its capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Only responds to triggers
    Reactive,
    /// Pursues goals through planning
    Deliberative,
    /// Both
    Hybrid,
}

impl Capabilities {
    pub fn kind(&self) -> AgentKind {
        let deliberates = self.planner || self.domain_goals;
        match (self.reactive_rules, deliberates) {
            (true, true) => AgentKind::Hybrid,
            (true, false) => AgentKind::Reactive,
            (false, _) => AgentKind::Deliberative,
        }
    }
}
