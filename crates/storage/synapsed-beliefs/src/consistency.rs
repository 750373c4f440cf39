//! Conflict detection over candidate belief sets

use crate::{
    ontology::{Ontology, PropertyKind, IS_A},
    rules::DomainRule,
    types::{Belief, BeliefId},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Classification of a detected conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Same proposition, incompatible values
    Contradiction,
    /// Violates a property constraint, class disjointness or a domain rule
    LogicalInconsistency,
    /// Different values claimed over overlapping validity intervals
    TemporalConflict,
    /// A single belief that does not fit the ontology
    OntologyViolation,
}

/// A conflict between two beliefs, or a single belief for ontology violations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub first: BeliefId,
    pub second: Option<BeliefId>,
    pub reason: String,
}

/// Heuristics deciding when two values of the same proposition contradict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContradictionPolicy {
    /// Numbers diverging by more than this fraction of the larger magnitude contradict
    pub numeric_tolerance: f64,
    /// Strings considered opposites, compared case-insensitively in either order
    pub opposites: Vec<(String, String)>,
}

impl Default for ContradictionPolicy {
    fn default() -> Self {
        let pairs = [
            ("true", "false"),
            ("yes", "no"),
            ("on", "off"),
            ("active", "inactive"),
            ("enabled", "disabled"),
        ];
        Self {
            numeric_tolerance: 0.1,
            opposites: pairs
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
        }
    }
}

impl ContradictionPolicy {
    pub fn are_opposites(&self, a: &str, b: &str) -> bool {
        let a = a.trim().to_ascii_lowercase();
        let b = b.trim().to_ascii_lowercase();
        self.opposites.iter().any(|(x, y)| {
            let x = x.to_ascii_lowercase();
            let y = y.to_ascii_lowercase();
            (a == x && b == y) || (a == y && b == x)
        })
    }

    /// Whether two values for the same proposition cannot both hold
    pub fn incompatible(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Bool(x), Value::Bool(y)) => x != y,
            (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => {
                    let scale = x.abs().max(y.abs());
                    (x - y).abs() > self.numeric_tolerance * scale
                }
                _ => false,
            },
            (Value::String(x), Value::String(y)) => self.are_opposites(x, y),
            (Value::Array(x), Value::Array(y)) => {
                if x.is_empty() && y.is_empty() {
                    return false;
                }
                !x.iter().any(|item| y.contains(item))
            }
            _ => false,
        }
    }
}

/// Detects conflicts among a set of beliefs.
///
/// Pairs are classified by the first matching kind, checked in the order
/// contradiction, logical inconsistency, temporal conflict. Ontology
/// violations are reported per belief after the pairwise pass.
pub struct ConsistencyChecker {
    ontology: Arc<Ontology>,
    rules: Vec<Arc<dyn DomainRule>>,
    policy: ContradictionPolicy,
}

impl ConsistencyChecker {
    pub fn new(ontology: Arc<Ontology>) -> Self {
        Self {
            ontology,
            rules: Vec::new(),
            policy: ContradictionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ContradictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_rule(mut self, rule: impl DomainRule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    pub fn add_rule(&mut self, rule: Arc<dyn DomainRule>) {
        self.rules.push(rule);
    }

    pub fn ontology(&self) -> &Arc<Ontology> {
        &self.ontology
    }

    pub fn policy(&self) -> &ContradictionPolicy {
        &self.policy
    }

    /// Finds every conflict in `beliefs`
    pub fn detect_conflicts(&self, beliefs: &[Belief]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();

        for (i, a) in beliefs.iter().enumerate() {
            for b in &beliefs[i + 1..] {
                if let Some((kind, reason)) = self.classify(a, b) {
                    conflicts.push(Conflict {
                        kind,
                        first: a.id,
                        second: Some(b.id),
                        reason,
                    });
                }
            }
        }

        let mut reported = HashSet::new();
        for belief in beliefs {
            if let Err(violation) = self.ontology.check(belief) {
                if reported.insert(belief.id) {
                    conflicts.push(Conflict {
                        kind: ConflictKind::OntologyViolation,
                        first: belief.id,
                        second: None,
                        reason: violation.reason,
                    });
                }
            }
        }

        if !conflicts.is_empty() {
            debug!(count = conflicts.len(), beliefs = beliefs.len(), "conflicts detected");
        }
        conflicts
    }

    fn classify(&self, a: &Belief, b: &Belief) -> Option<(ConflictKind, String)> {
        // Beliefs confined to disjoint periods describe different moments
        if let (Some(va), Some(vb)) = (&a.validity, &b.validity) {
            if !va.overlaps(vb) {
                return None;
            }
        }

        if self.are_contradictory(a, b) {
            return Some((
                ConflictKind::Contradiction,
                format!("'{}' is both {} and {}", a.predicate, a.value, b.value),
            ));
        }
        if let Some(reason) = self.logical_inconsistency(a, b) {
            return Some((ConflictKind::LogicalInconsistency, reason));
        }
        if self.temporal_conflict(a, b) {
            return Some((
                ConflictKind::TemporalConflict,
                format!("'{}' has overlapping claims {} and {}", a.predicate, a.value, b.value),
            ));
        }
        None
    }

    fn are_contradictory(&self, a: &Belief, b: &Belief) -> bool {
        a.same_proposition(b) && self.policy.incompatible(&a.value, &b.value)
    }

    fn logical_inconsistency(&self, a: &Belief, b: &Belief) -> Option<String> {
        if a.predicate == IS_A && b.predicate == IS_A && a.subject == b.subject {
            if let (Some(x), Some(y)) = (a.value.as_str(), b.value.as_str()) {
                if self.ontology.are_mutually_exclusive(x, y) {
                    return Some(format!("classes '{x}' and '{y}' are disjoint"));
                }
            }
        }

        if a.predicate == b.predicate {
            match self.ontology.property_kind(&a.predicate) {
                PropertyKind::Functional if a.subject == b.subject && a.value != b.value => {
                    return Some(format!(
                        "functional property '{}' has values {} and {}",
                        a.predicate, a.value, b.value
                    ));
                }
                PropertyKind::InverseFunctional
                    if a.subject != b.subject && a.value == b.value =>
                {
                    return Some(format!(
                        "inverse-functional property '{}' maps {} to several subjects",
                        a.predicate, a.value
                    ));
                }
                _ => {}
            }
        }

        self.rules
            .iter()
            .find(|rule| rule.violated_by(a, b))
            .map(|rule| format!("domain rule '{}' violated", rule.name()))
    }

    fn temporal_conflict(&self, a: &Belief, b: &Belief) -> bool {
        match (&a.validity, &b.validity) {
            (Some(va), Some(vb)) => a.same_proposition(b) && a.value != b.value && va.overlaps(vb),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ontology::{PropertyDef, ValueType},
        rules::ExclusivePair,
        types::Validity,
    };
    use chrono::{TimeZone, Utc};

    fn checker() -> ConsistencyChecker {
        ConsistencyChecker::new(Arc::new(Ontology::new()))
    }

    fn kinds(conflicts: &[Conflict]) -> Vec<ConflictKind> {
        conflicts.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn test_opposite_strings_contradict() {
        let beliefs = vec![
            Belief::new("status", "active", 0.8),
            Belief::new("status", "inactive", 0.8),
        ];
        assert_eq!(kinds(&checker().detect_conflicts(&beliefs)), vec![ConflictKind::Contradiction]);
    }

    #[test]
    fn test_numeric_tolerance() {
        let policy = ContradictionPolicy::default();
        assert!(!policy.incompatible(&Value::from(100), &Value::from(105)));
        assert!(policy.incompatible(&Value::from(100), &Value::from(120)));
        assert!(!policy.incompatible(&Value::from(0), &Value::from(0)));
    }

    #[test]
    fn test_disjoint_lists_and_booleans() {
        let policy = ContradictionPolicy::default();
        assert!(policy.incompatible(&serde_json::json!(["a"]), &serde_json::json!(["b"])));
        assert!(!policy.incompatible(&serde_json::json!(["a", "b"]), &serde_json::json!(["b"])));
        assert!(!policy.incompatible(&serde_json::json!([]), &serde_json::json!([])));
        assert!(policy.incompatible(&Value::Bool(true), &Value::Bool(false)));
    }

    #[test]
    fn test_different_keys_do_not_contradict() {
        let beliefs = vec![
            Belief::new("door", "open", 0.8),
            Belief::new("window", "closed", 0.8),
        ];
        assert!(checker().detect_conflicts(&beliefs).is_empty());
    }

    #[test]
    fn test_functional_property_inconsistency() {
        let ontology = Ontology::new().with_property("color", PropertyDef::functional(ValueType::String));
        let checker = ConsistencyChecker::new(Arc::new(ontology));
        let beliefs = vec![
            Belief::new("car_color", "red", 0.8).about("car", "color"),
            Belief::new("car_color_2", "blue", 0.6).about("car", "color"),
        ];
        assert_eq!(
            kinds(&checker.detect_conflicts(&beliefs)),
            vec![ConflictKind::LogicalInconsistency]
        );
    }

    #[test]
    fn test_inverse_functional_property_inconsistency() {
        let ontology = Ontology::new()
            .with_property("badge", PropertyDef::inverse_functional(ValueType::String));
        let checker = ConsistencyChecker::new(Arc::new(ontology));
        let beliefs = vec![
            Belief::new("alice_badge", "B-17", 0.8).about("alice", "badge"),
            Belief::new("bob_badge", "B-17", 0.6).about("bob", "badge"),
        ];
        assert_eq!(
            kinds(&checker.detect_conflicts(&beliefs)),
            vec![ConflictKind::LogicalInconsistency]
        );
    }

    #[test]
    fn test_disjoint_classes() {
        let ontology = Ontology::new()
            .with_class("animal", None)
            .with_class("plant", None)
            .with_disjoint("animal", "plant");
        let checker = ConsistencyChecker::new(Arc::new(ontology));
        let beliefs = vec![
            Belief::new("rex_is_a", "animal", 0.8).about("rex", IS_A),
            Belief::new("rex_is_a_2", "plant", 0.3).about("rex", IS_A),
        ];
        assert_eq!(
            kinds(&checker.detect_conflicts(&beliefs)),
            vec![ConflictKind::LogicalInconsistency]
        );
    }

    #[test]
    fn test_domain_rule() {
        let checker = checker().with_rule(ExclusivePair::new(
            "door",
            ("door_open", true),
            ("door_locked", true),
        ));
        let beliefs = vec![
            Belief::new("door_open", true, 0.9),
            Belief::new("door_locked", true, 0.9),
        ];
        let conflicts = checker.detect_conflicts(&beliefs);
        assert_eq!(kinds(&conflicts), vec![ConflictKind::LogicalInconsistency]);
        assert!(conflicts[0].reason.contains("door"));
    }

    #[test]
    fn test_temporal_conflict() {
        let t = |s| Utc.timestamp_opt(s, 0).unwrap();
        let beliefs = vec![
            Belief::new("location", "room_1", 0.9).valid_during(Validity::new(t(0), t(10))),
            Belief::new("location", "room_2", 0.9).valid_during(Validity::new(t(5), t(15))),
            Belief::new("location", "room_3", 0.9).valid_during(Validity::new(t(20), t(30))),
        ];
        assert_eq!(
            kinds(&checker().detect_conflicts(&beliefs)),
            vec![ConflictKind::TemporalConflict]
        );
    }

    #[test]
    fn test_ontology_violation_reported_once_per_belief() {
        let ontology = Ontology::new().with_property(
            "temperature",
            PropertyDef::functional(ValueType::Number).bounded(-50.0, 60.0),
        );
        let checker = ConsistencyChecker::new(Arc::new(ontology));
        let beliefs = vec![Belief::new("temperature", "hot", 0.5)];
        let conflicts = checker.detect_conflicts(&beliefs);
        assert_eq!(kinds(&conflicts), vec![ConflictKind::OntologyViolation]);
        assert_eq!(conflicts[0].second, None);
    }
}
