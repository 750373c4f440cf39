//! Keyed belief storage owned by a single agent

use crate::{
    types::{Belief, WorldState},
    Result,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::trace;

/// A mutation recorded by the store since the last [`BeliefStore::take_changes`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeliefChange {
    Upserted(String),
    Removed(String),
}

/// Per-agent belief store.
///
/// Holds at most one belief per key. Every write is validated before the
/// store is touched, so a rejected write leaves it unchanged.
#[derive(Debug, Clone, Default)]
pub struct BeliefStore {
    beliefs: BTreeMap<String, Belief>,
    changes: Vec<BeliefChange>,
}

impl BeliefStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the belief at `key`, stamped with the current time
    pub fn upsert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
        certainty: f64,
    ) -> Result<&Belief> {
        self.upsert_belief(Belief::new(key, value, certainty))
    }

    /// Inserts or replaces a fully described belief, refreshing its timestamp
    pub fn upsert_belief(&mut self, mut belief: Belief) -> Result<&Belief> {
        belief.validate()?;
        belief.last_updated = Utc::now();
        Ok(self.put(belief))
    }

    /// Inserts a belief keeping its recorded timestamp.
    ///
    /// Used when committing resolved sets and when loading from a repository.
    pub fn restore(&mut self, belief: Belief) -> Result<&Belief> {
        belief.validate()?;
        Ok(self.put(belief))
    }

    fn put(&mut self, belief: Belief) -> &Belief {
        let key = belief.key.clone();
        trace!(key = %key, certainty = belief.certainty, "belief upserted");
        self.changes.push(BeliefChange::Upserted(key.clone()));
        self.beliefs.insert(key.clone(), belief);
        &self.beliefs[&key]
    }

    pub fn get(&self, key: &str) -> Option<&Belief> {
        self.beliefs.get(key)
    }

    /// Value of the belief at `key`
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.beliefs.get(key).map(|b| &b.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.beliefs.contains_key(key)
    }

    /// All beliefs whose key starts with `prefix`, in key order
    pub fn query_by_prefix(&self, prefix: &str) -> Vec<&Belief> {
        self.beliefs
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, belief)| belief)
            .collect()
    }

    pub fn remove(&mut self, key: &str) -> Option<Belief> {
        let removed = self.beliefs.remove(key);
        if removed.is_some() {
            self.changes.push(BeliefChange::Removed(key.to_string()));
        }
        removed
    }

    /// Owned copy of every belief, in key order
    pub fn snapshot(&self) -> Vec<Belief> {
        self.beliefs.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Belief> {
        self.beliefs.values()
    }

    /// Key → value view for condition evaluation
    pub fn state(&self) -> WorldState {
        self.beliefs
            .iter()
            .map(|(key, belief)| (key.clone(), belief.value.clone()))
            .collect()
    }

    pub fn keys(&self) -> HashSet<String> {
        self.beliefs.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.beliefs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beliefs.is_empty()
    }

    /// Makes the store hold exactly `retained`.
    ///
    /// Keys absent from `retained` are removed. Beliefs whose id and value are
    /// unchanged are left alone, so committing the current snapshot records no
    /// changes. Everything is validated before the store is modified.
    pub fn commit(&mut self, retained: Vec<Belief>) -> Result<()> {
        for belief in &retained {
            belief.validate()?;
        }

        let keep: HashSet<&str> = retained.iter().map(|b| b.key.as_str()).collect();
        let stale: Vec<String> = self
            .beliefs
            .keys()
            .filter(|key| !keep.contains(key.as_str()))
            .cloned()
            .collect();
        for key in stale {
            self.remove(&key);
        }

        for belief in retained {
            let unchanged = self
                .beliefs
                .get(&belief.key)
                .is_some_and(|current| current.id == belief.id && current.value == belief.value);
            if !unchanged {
                self.put(belief);
            }
        }
        Ok(())
    }

    /// Drains the mutation log
    pub fn take_changes(&mut self) -> Vec<BeliefChange> {
        std::mem::take(&mut self.changes)
    }

    /// Certainty of the belief at `key`, or 0 when absent
    pub fn certainty(&self, key: &str) -> f64 {
        self.beliefs.get(key).map(|b| b.certainty).unwrap_or(0.0)
    }
}
