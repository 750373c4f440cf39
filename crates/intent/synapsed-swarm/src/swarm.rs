//! Drives a set of agents tick by tick

use crate::{
    agent::{BdiAgent, BdiAgentBuilder, TickReport},
    config::SwarmConfig,
    error::{SwarmError, SwarmResult},
    world::World,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use synapsed_acl::AgentId;
use synapsed_intent::{Decision, GoalId, IntentError, OracleError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of one [`Swarm::step`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub tick: u64,
    pub reports: Vec<TickReport>,
    /// Agents whose tick returned an error
    pub errors: Vec<(AgentId, String)>,
}

impl StepSummary {
    pub fn report(&self, agent: &AgentId) -> Option<&TickReport> {
        self.reports.iter().find(|r| &r.agent == agent)
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A set of agents sharing one [`World`].
///
/// Each agent sits behind its own lock, so an agent's cycle is never
/// re-entered while it runs; different agents may tick in parallel.
#[derive(Debug)]
pub struct Swarm {
    world: World,
    config: SwarmConfig,
    agents: BTreeMap<AgentId, Arc<Mutex<BdiAgent>>>,
    ticks: u64,
}

impl Swarm {
    pub fn new(config: SwarmConfig) -> Self {
        let world = World::from_config(&config);
        Self::with_world(config, world)
    }

    pub fn with_world(config: SwarmConfig, world: World) -> Self {
        Self {
            world,
            config,
            agents: BTreeMap::new(),
            ticks: 0,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.keys().cloned().collect()
    }

    pub fn agent(&self, id: &AgentId) -> Option<Arc<Mutex<BdiAgent>>> {
        self.agents.get(id).cloned()
    }

    /// Builder preloaded with the swarm's agent defaults
    pub fn agent_builder(&self, id: impl Into<AgentId>) -> BdiAgentBuilder {
        BdiAgent::builder(id).config(self.config.agent.clone())
    }

    /// Adds an agent, joins it to the bus and restores its persisted beliefs
    pub async fn add_agent(&mut self, mut agent: BdiAgent) -> SwarmResult<AgentId> {
        if self.agents.len() >= self.config.max_agents {
            return Err(SwarmError::SwarmSizeLimitExceeded {
                current: self.agents.len(),
                max: self.config.max_agents,
            });
        }
        let id = agent.id().clone();
        if self.agents.contains_key(&id) || !agent.join(&self.world) {
            return Err(SwarmError::DuplicateAgent(id.to_string()));
        }
        if let Some(repository) = self.world.belief_repository.clone() {
            if let Err(e) = agent.restore_beliefs(repository.as_ref()).await {
                self.world.bus.unregister(&id);
                return Err(e);
            }
        }

        self.agents.insert(id.clone(), Arc::new(Mutex::new(agent)));
        info!(agent = %id, agents = self.agents.len(), "agent joined swarm");
        Ok(id)
    }

    pub fn remove_agent(&mut self, id: &AgentId) -> SwarmResult<()> {
        self.agents
            .remove(id)
            .ok_or_else(|| SwarmError::AgentNotFound(id.to_string()))?;
        self.world.bus.unregister(id);
        info!(agent = %id, "agent left swarm");
        Ok(())
    }

    /// Advances every agent by one tick.
    ///
    /// An agent whose tick fails is recorded in the summary; the others still run.
    pub async fn step(&mut self) -> StepSummary {
        self.ticks += 1;
        let mut summary = StepSummary {
            tick: self.ticks,
            ..StepSummary::default()
        };

        if self.config.parallel_ticks {
            let handles: Vec<_> = self
                .agents
                .iter()
                .map(|(id, agent)| {
                    let agent = Arc::clone(agent);
                    let world = self.world.clone();
                    let id = id.clone();
                    let handle = tokio::spawn(async move { agent.lock().await.tick(&world).await });
                    async move { (id, handle.await) }
                })
                .collect();
            for (id, joined) in futures::future::join_all(handles).await {
                match joined {
                    Ok(result) => Self::record(&mut summary, id, result),
                    Err(e) => {
                        warn!(agent = %id, error = %e, "agent task aborted");
                        summary.errors.push((id, e.to_string()));
                    }
                }
            }
        } else {
            for (id, agent) in &self.agents {
                let result = agent.lock().await.tick(&self.world).await;
                Self::record(&mut summary, id.clone(), result);
            }
        }

        debug!(
            tick = self.ticks,
            agents = summary.reports.len(),
            errors = summary.errors.len(),
            "swarm stepped"
        );
        summary
    }

    fn record(summary: &mut StepSummary, id: AgentId, result: SwarmResult<TickReport>) {
        match result {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                warn!(agent = %id, error = %e, "agent tick failed");
                summary.errors.push((id, e.to_string()));
            }
        }
    }

    /// Runs `ticks` steps, returning each summary
    pub async fn run(&mut self, ticks: usize) -> Vec<StepSummary> {
        let mut summaries = Vec::with_capacity(ticks);
        for _ in 0..ticks {
            summaries.push(self.step().await);
        }
        summaries
    }

    /// Asks the oracle to explain where an agent's goal stands
    pub async fn explain(&self, agent: &AgentId, goal: GoalId) -> SwarmResult<String> {
        let oracle = self
            .world
            .oracle
            .clone()
            .ok_or_else(|| OracleError::Unavailable("no reasoning oracle configured".to_string()))?;
        let handle = self
            .agent(agent)
            .ok_or_else(|| SwarmError::AgentNotFound(agent.to_string()))?;

        let decision = {
            let agent = handle.lock().await;
            let target = agent.goals().get(goal).ok_or(IntentError::GoalNotFound(goal))?;
            Decision {
                agent: agent.id().to_string(),
                kind: format!("goal_{}", target.status()),
                summary: target.description.clone(),
                details: json!({
                    "goal": target.name,
                    "priority": target.priority,
                    "source": target.source,
                    "children": target.children.len(),
                }),
            }
        };
        Ok(oracle.explain(&decision).await?)
    }
}
