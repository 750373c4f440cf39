//! Domain rules: pairwise constraints beyond what the ontology expresses

use crate::types::Belief;
use serde_json::Value;

/// A constraint that two beliefs must not violate together
pub trait DomainRule: Send + Sync {
    fn name(&self) -> &str;

    /// Whether holding both beliefs at once breaks the rule
    fn violated_by(&self, a: &Belief, b: &Belief) -> bool;
}

/// Rule backed by a closure
pub struct FnRule<F> {
    name: String,
    check: F,
}

impl<F> FnRule<F>
where
    F: Fn(&Belief, &Belief) -> bool + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self { name: name.into(), check }
    }
}

impl<F> DomainRule for FnRule<F>
where
    F: Fn(&Belief, &Belief) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn violated_by(&self, a: &Belief, b: &Belief) -> bool {
        (self.check)(a, b)
    }
}

/// Two facts that cannot both hold, e.g. `door_open = true` and `door_locked = true`
#[derive(Debug, Clone)]
pub struct ExclusivePair {
    name: String,
    first: (String, Value),
    second: (String, Value),
}

impl ExclusivePair {
    pub fn new(
        name: impl Into<String>,
        first: (impl Into<String>, impl Into<Value>),
        second: (impl Into<String>, impl Into<Value>),
    ) -> Self {
        Self {
            name: name.into(),
            first: (first.0.into(), first.1.into()),
            second: (second.0.into(), second.1.into()),
        }
    }

    fn matches(fact: &(String, Value), belief: &Belief) -> bool {
        belief.key == fact.0 && belief.value == fact.1
    }
}

impl DomainRule for ExclusivePair {
    fn name(&self) -> &str {
        &self.name
    }

    fn violated_by(&self, a: &Belief, b: &Belief) -> bool {
        (Self::matches(&self.first, a) && Self::matches(&self.second, b))
            || (Self::matches(&self.second, a) && Self::matches(&self.first, b))
    }
}
