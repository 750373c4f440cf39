//! Persistence boundary for belief stores

use crate::{types::Belief, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Storage for agents' beliefs, keyed by agent and belief key
#[async_trait]
pub trait BeliefRepository: Send + Sync {
    /// Load every belief stored for an agent
    async fn load_all(&self, agent_id: &str) -> Result<Vec<Belief>>;

    /// Store or replace a belief
    async fn save(&self, agent_id: &str, belief: &Belief) -> Result<()>;

    /// Delete the belief stored under `key`, if present
    async fn delete(&self, agent_id: &str, key: &str) -> Result<()>;
}

/// In-memory repository, mainly for tests and single-process hosts
#[derive(Debug, Clone, Default)]
pub struct InMemoryBeliefRepository {
    beliefs: Arc<DashMap<String, HashMap<String, Belief>>>,
}

impl InMemoryBeliefRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of beliefs stored for an agent
    pub fn count(&self, agent_id: &str) -> usize {
        self.beliefs.get(agent_id).map(|b| b.len()).unwrap_or(0)
    }
}

#[async_trait]
impl BeliefRepository for InMemoryBeliefRepository {
    async fn load_all(&self, agent_id: &str) -> Result<Vec<Belief>> {
        let mut beliefs: Vec<Belief> = self
            .beliefs
            .get(agent_id)
            .map(|entry| entry.values().cloned().collect())
            .unwrap_or_default();
        beliefs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(beliefs)
    }

    async fn save(&self, agent_id: &str, belief: &Belief) -> Result<()> {
        belief.validate()?;
        self.beliefs
            .entry(agent_id.to_string())
            .or_default()
            .insert(belief.key.clone(), belief.clone());
        Ok(())
    }

    async fn delete(&self, agent_id: &str, key: &str) -> Result<()> {
        if let Some(mut entry) = self.beliefs.get_mut(agent_id) {
            entry.remove(key);
        }
        Ok(())
    }
}
