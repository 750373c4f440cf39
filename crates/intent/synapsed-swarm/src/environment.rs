//! Percept sources for agents

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use synapsed_acl::AgentId;
use synapsed_beliefs::{Belief, BeliefSource};

/// Supplies what each agent perceives at a tick
#[async_trait]
pub trait Environment: Send + Sync {
    async fn perceive(&self, agent: &AgentId, tick: u64) -> Vec<Belief>;
}

/// Environment that perceives nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEnvironment;

#[async_trait]
impl Environment for NullEnvironment {
    async fn perceive(&self, _agent: &AgentId, _tick: u64) -> Vec<Belief> {
        Vec::new()
    }
}

#[derive(Debug, Default)]
struct Script {
    /// Perceived every tick until changed
    standing: HashMap<AgentId, Vec<Belief>>,
    /// Perceived once each, one batch per tick
    queued: HashMap<AgentId, VecDeque<Vec<Belief>>>,
}

/// Environment driven by the host: standing facts plus queued one-shot percepts
#[derive(Debug, Default)]
pub struct ScriptedEnvironment {
    script: Mutex<Script>,
}

impl ScriptedEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a fact the agent perceives every tick
    pub fn set_fact(&self, agent: &AgentId, key: impl Into<String>, value: impl Into<Value>, certainty: f64) {
        let belief = Belief::new(key, value, certainty).from_source(BeliefSource::Perception);
        let mut script = self.script.lock();
        let facts = script.standing.entry(agent.clone()).or_default();
        facts.retain(|b| b.key != belief.key);
        facts.push(belief);
    }

    pub fn clear_fact(&self, agent: &AgentId, key: &str) {
        if let Some(facts) = self.script.lock().standing.get_mut(agent) {
            facts.retain(|b| b.key != key);
        }
    }

    /// Queues a batch the agent perceives on one upcoming tick
    pub fn push_percepts(&self, agent: &AgentId, percepts: Vec<Belief>) {
        self.script
            .lock()
            .queued
            .entry(agent.clone())
            .or_default()
            .push_back(percepts);
    }
}

#[async_trait]
impl Environment for ScriptedEnvironment {
    async fn perceive(&self, agent: &AgentId, _tick: u64) -> Vec<Belief> {
        let mut script = self.script.lock();
        let mut percepts: Vec<Belief> = script
            .standing
            .get(agent)
            .map(|facts| facts.to_vec())
            .unwrap_or_default();
        if let Some(batch) = script.queued.get_mut(agent).and_then(VecDeque::pop_front) {
            percepts.extend(batch);
        }
        percepts
    }
}
