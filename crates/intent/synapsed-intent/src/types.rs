//! Identifiers and conditions shared across the intent system

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use synapsed_beliefs::WorldState;
use uuid::Uuid;

/// Named resource amounts, e.g. `{"budget": 1000.0, "staff": 3.0}`
pub type Resources = HashMap<String, f64>;

/// Unique identifier for a goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GoalId(pub Uuid);

impl GoalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GoalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(pub Uuid);

impl PlanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a plan step or task node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub Uuid);

impl StepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for an intention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentionId(pub Uuid);

impl IntentionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IntentionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IntentionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Comparison applied by a [`Condition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    In,
    NotIn,
}

/// A predicate over one belief key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub key: String,
    pub op: ConditionOp,
    pub value: Value,
}

impl Condition {
    pub fn new(key: impl Into<String>, op: ConditionOp, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            op,
            value: value.into(),
        }
    }

    pub fn equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(key, ConditionOp::Equals, value)
    }

    pub fn not_equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(key, ConditionOp::NotEquals, value)
    }

    pub fn greater_than(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(key, ConditionOp::GreaterThan, value)
    }

    pub fn less_than(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(key, ConditionOp::LessThan, value)
    }

    pub fn is_in(key: impl Into<String>, values: impl Into<Value>) -> Self {
        Self::new(key, ConditionOp::In, values)
    }

    pub fn not_in(key: impl Into<String>, values: impl Into<Value>) -> Self {
        Self::new(key, ConditionOp::NotIn, values)
    }

    /// Evaluates the condition against a belief state.
    ///
    /// A missing key satisfies only the negative operators.
    pub fn holds(&self, state: &WorldState) -> bool {
        let Some(actual) = state.get(&self.key) else {
            return matches!(self.op, ConditionOp::NotEquals | ConditionOp::NotIn);
        };
        match self.op {
            ConditionOp::Equals => values_equal(actual, &self.value),
            ConditionOp::NotEquals => !values_equal(actual, &self.value),
            ConditionOp::GreaterThan => compare(actual, &self.value).is_some_and(|o| o.is_gt()),
            ConditionOp::LessThan => compare(actual, &self.value).is_some_and(|o| o.is_lt()),
            ConditionOp::In => contains(&self.value, actual),
            ConditionOp::NotIn => !contains(&self.value, actual),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            ConditionOp::Equals => "==",
            ConditionOp::NotEquals => "!=",
            ConditionOp::GreaterThan => ">",
            ConditionOp::LessThan => "<",
            ConditionOp::In => "in",
            ConditionOp::NotIn => "not in",
        };
        write!(f, "{} {} {}", self.key, op, self.value)
    }
}

/// Whether every condition holds
pub fn all_hold(conditions: &[Condition], state: &WorldState) -> bool {
    conditions.iter().all(|c| c.holds(state))
}

/// First condition that does not hold
pub fn first_unmet<'a>(conditions: &'a [Condition], state: &WorldState) -> Option<&'a Condition> {
    conditions.iter().find(|c| !c.holds(state))
}

/// Equality that treats `1` and `1.0` as equal
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn contains(collection: &Value, item: &Value) -> bool {
    match collection {
        Value::Array(items) => items.iter().any(|candidate| values_equal(candidate, item)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> WorldState {
        WorldState::from([
            ("profit_margin".to_string(), json!(0.15)),
            ("status".to_string(), json!("active")),
            ("staff".to_string(), json!(3)),
        ])
    }

    #[test]
    fn test_comparisons() {
        let state = state();
        assert!(Condition::less_than("profit_margin", 0.2).holds(&state));
        assert!(!Condition::greater_than("profit_margin", 0.2).holds(&state));
        assert!(Condition::equals("staff", 3.0).holds(&state));
        assert!(Condition::not_equals("status", "inactive").holds(&state));
        assert!(Condition::is_in("status", json!(["active", "idle"])).holds(&state));
        assert!(Condition::not_in("status", json!(["down"])).holds(&state));
    }

    #[test]
    fn test_missing_key() {
        let state = state();
        assert!(!Condition::equals("missing", 1).holds(&state));
        assert!(!Condition::greater_than("missing", 1).holds(&state));
        assert!(Condition::not_equals("missing", 1).holds(&state));
        assert!(Condition::not_in("missing", json!([1])).holds(&state));
    }

    #[test]
    fn test_type_mismatch_does_not_order() {
        let state = state();
        assert!(!Condition::greater_than("status", 1).holds(&state));
        assert!(!Condition::less_than("status", 1).holds(&state));
    }

    #[test]
    fn test_condition_serde() {
        let condition: Condition =
            serde_json::from_value(json!({"key": "load", "op": "greater_than", "value": 0.8})).unwrap();
        assert_eq!(condition, Condition::greater_than("load", 0.8));
        assert_eq!(condition.to_string(), "load > 0.8");
    }
}
