//! Lightweight ontology: class hierarchy, disjointness and property definitions

use crate::types::Belief;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Predicate naming class membership (`subject is_a Class`)
pub const IS_A: &str = "is_a";

/// Cardinality constraint on a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    /// No cardinality constraint
    #[default]
    Plain,
    /// At most one value per subject
    Functional,
    /// At most one subject per value
    InverseFunctional,
}

/// Expected type of a property's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    Any,
    Boolean,
    Number,
    String,
    List,
    /// The name of a class declared in the ontology
    Class,
}

/// Definition of a property (predicate)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyDef {
    pub kind: PropertyKind,
    pub range: ValueType,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl PropertyDef {
    pub fn new(kind: PropertyKind, range: ValueType) -> Self {
        Self { kind, range, min: None, max: None }
    }

    pub fn functional(range: ValueType) -> Self {
        Self::new(PropertyKind::Functional, range)
    }

    pub fn inverse_functional(range: ValueType) -> Self {
        Self::new(PropertyKind::InverseFunctional, range)
    }

    /// Numeric bounds, inclusive
    pub fn bounded(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

/// A belief that does not fit the ontology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyViolation {
    pub predicate: String,
    pub reason: String,
}

/// Class hierarchy plus property definitions used by consistency checking
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ontology {
    /// Class name → parent class
    classes: HashMap<String, Option<String>>,
    /// Pairs of classes that share no instances
    disjoint: Vec<(String, String)>,
    properties: HashMap<String, PropertyDef>,
}

impl Ontology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, name: impl Into<String>, parent: Option<&str>) -> Self {
        self.classes.insert(name.into(), parent.map(str::to_string));
        self
    }

    pub fn with_disjoint(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.disjoint.push((a.into(), b.into()));
        self
    }

    pub fn with_property(mut self, predicate: impl Into<String>, def: PropertyDef) -> Self {
        self.properties.insert(predicate.into(), def);
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    pub fn property(&self, predicate: &str) -> Option<&PropertyDef> {
        self.properties.get(predicate)
    }

    pub fn property_kind(&self, predicate: &str) -> PropertyKind {
        self.properties.get(predicate).map(|p| p.kind).unwrap_or_default()
    }

    /// The class followed by its ancestors, nearest first
    pub fn ancestors(&self, class: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(class.to_string());
        while let Some(name) = current {
            if !seen.insert(name.clone()) {
                break;
            }
            current = self.classes.get(&name).cloned().flatten();
            chain.push(name);
        }
        chain
    }

    /// Depth of a class in the hierarchy. Unknown classes and roots are 0.
    pub fn specificity(&self, class: &str) -> usize {
        if !self.has_class(class) {
            return 0;
        }
        self.ancestors(class).len().saturating_sub(1)
    }

    /// Specificity of a belief's value, when the value names a class
    pub fn value_specificity(&self, value: &Value) -> usize {
        value.as_str().map(|class| self.specificity(class)).unwrap_or(0)
    }

    /// Whether no individual can be an instance of both classes
    pub fn are_mutually_exclusive(&self, a: &str, b: &str) -> bool {
        if a == b {
            return false;
        }
        let left = self.ancestors(a);
        let right = self.ancestors(b);
        self.disjoint.iter().any(|(x, y)| {
            (left.contains(x) && right.contains(y)) || (left.contains(y) && right.contains(x))
        })
    }

    /// Checks a belief's value against its property definition
    pub fn check(&self, belief: &Belief) -> Result<(), OntologyViolation> {
        let violation = |reason: String| OntologyViolation {
            predicate: belief.predicate.clone(),
            reason,
        };

        if belief.predicate == IS_A && !self.classes.is_empty() {
            let known = belief.value.as_str().is_some_and(|class| self.has_class(class));
            if !known {
                return Err(violation(format!("unknown class {}", belief.value)));
            }
        }

        let Some(def) = self.properties.get(&belief.predicate) else {
            return Ok(());
        };

        if !type_matches(def.range, &belief.value, self) {
            return Err(violation(format!(
                "value {} is not of type {:?}",
                belief.value, def.range
            )));
        }

        if let Some(n) = belief.value.as_f64() {
            if def.min.is_some_and(|min| n < min) || def.max.is_some_and(|max| n > max) {
                return Err(violation(format!(
                    "value {} outside [{:?}, {:?}]",
                    n, def.min, def.max
                )));
            }
        }

        Ok(())
    }

    /// A sanctioned replacement value that passes [`Ontology::check`], if any
    pub fn correct(&self, belief: &Belief) -> Option<Value> {
        if self.check(belief).is_ok() {
            return None;
        }
        let def = self.properties.get(&belief.predicate)?;

        let coerced = match def.range {
            ValueType::Any => Some(belief.value.clone()),
            ValueType::Boolean => coerce_bool(&belief.value).map(Value::Bool),
            ValueType::Number => coerce_number(&belief.value).map(Value::from),
            ValueType::String => match &belief.value {
                Value::Bool(b) => Some(Value::String(b.to_string())),
                Value::Number(n) => Some(Value::String(n.to_string())),
                Value::String(s) => Some(Value::String(s.clone())),
                _ => None,
            },
            ValueType::List => match &belief.value {
                Value::Array(items) => Some(Value::Array(items.clone())),
                Value::Null => None,
                scalar => Some(Value::Array(vec![scalar.clone()])),
            },
            ValueType::Class => None,
        }?;

        let clamped = match coerced.as_f64() {
            Some(n) => {
                let n = def.min.map_or(n, |min| n.max(min));
                let n = def.max.map_or(n, |max| n.min(max));
                Value::from(n)
            }
            None => coerced,
        };

        let mut candidate = belief.clone();
        candidate.value = clamped;
        self.check(&candidate).ok().map(|_| candidate.value)
    }
}

fn type_matches(range: ValueType, value: &Value, ontology: &Ontology) -> bool {
    match range {
        ValueType::Any => true,
        ValueType::Boolean => value.is_boolean(),
        ValueType::Number => value.is_number(),
        ValueType::String => value.is_string(),
        ValueType::List => value.is_array(),
        ValueType::Class => value.as_str().is_some_and(|c| ontology.has_class(c)),
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 0.0 => Some(false),
            Some(x) if x == 1.0 => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}
