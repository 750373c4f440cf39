//! Core belief types

use crate::{BeliefError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Flat key → value view of an agent's beliefs, used for condition checks
pub type WorldState = HashMap<String, Value>;

/// Unique identifier for a belief
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeliefId(pub Uuid);

impl BeliefId {
    /// Creates a new random belief ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BeliefId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BeliefId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a belief came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeliefSource {
    /// Observed in the environment
    #[default]
    Perception,
    /// Received from another agent
    Communication,
    /// Derived by the agent itself
    Inference,
    /// Written by an executed action
    Effect,
    /// Loaded from a repository
    Recall,
    /// Rewritten by the conflict resolver
    Correction,
}

/// Closed time interval during which a belief holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validity {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Validity {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Two closed intervals overlap when neither ends before the other starts
    pub fn overlaps(&self, other: &Validity) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// A single fact held by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    pub id: BeliefId,
    /// Store key, unique per agent
    pub key: String,
    /// Entity the belief is about, if any
    pub subject: Option<String>,
    /// Property asserted; defaults to the key
    pub predicate: String,
    pub value: Value,
    /// Confidence in [0, 1]
    pub certainty: f64,
    pub last_updated: DateTime<Utc>,
    pub validity: Option<Validity>,
    pub source: BeliefSource,
}

impl Belief {
    /// Creates a belief stamped with the current time.
    ///
    /// Certainty is not checked here; stores validate on insert.
    pub fn new(key: impl Into<String>, value: impl Into<Value>, certainty: f64) -> Self {
        let key = key.into();
        Self {
            id: BeliefId::new(),
            predicate: key.clone(),
            key,
            subject: None,
            value: value.into(),
            certainty,
            last_updated: Utc::now(),
            validity: None,
            source: BeliefSource::default(),
        }
    }

    /// Sets the subject and predicate this belief asserts
    pub fn about(mut self, subject: impl Into<String>, predicate: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self.predicate = predicate.into();
        self
    }

    pub fn valid_during(mut self, validity: Validity) -> Self {
        self.validity = Some(validity);
        self
    }

    /// Overrides the update timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.last_updated = timestamp;
        self
    }

    pub fn from_source(mut self, source: BeliefSource) -> Self {
        self.source = source;
        self
    }

    /// Whether both beliefs assert the same predicate about the same subject
    pub fn same_proposition(&self, other: &Belief) -> bool {
        self.predicate == other.predicate && self.subject == other.subject
    }

    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(BeliefError::ValidationFailed("belief key must not be empty".to_string()));
        }
        check_certainty(&self.key, self.certainty)
    }
}

/// Rejects certainties outside [0, 1], including NaN
pub fn check_certainty(key: &str, certainty: f64) -> Result<()> {
    if (0.0..=1.0).contains(&certainty) {
        Ok(())
    } else {
        Err(BeliefError::InvalidCertainty {
            key: key.to_string(),
            certainty,
        })
    }
}
