//! Intentions: bounded commitments to goals

use crate::{
    desire::Desire,
    goal::{Goal, GoalSource, GoalStatus},
    tree::GoalTree,
    types::{values_equal, GoalId, IntentionId, PlanId, Resources},
    IntentError, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use synapsed_beliefs::WorldState;
use tracing::{debug, info};

/// Finished intentions kept for inspection
const HISTORY_LIMIT: usize = 256;

/// Lifecycle of an intention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentionStatus {
    /// Counted against the commitment bound and executed each cycle
    Active,
    /// Kept but not executed
    Suspended,
    Completed,
    Failed,
    /// Released because its goal stopped being achievable
    Dropped,
}

/// Commitment to pursue one goal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intention {
    pub id: IntentionId,
    pub goal_id: GoalId,
    /// Desire this intention serves, if any
    pub desire_id: Option<String>,
    pub plan_id: Option<PlanId>,
    pub priority: f64,
    status: IntentionStatus,
    pub created_at: DateTime<Utc>,
}

impl Intention {
    pub fn new(goal_id: GoalId, priority: f64) -> Self {
        Self {
            id: IntentionId::new(),
            goal_id,
            desire_id: None,
            plan_id: None,
            priority,
            status: IntentionStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn status(&self) -> IntentionStatus {
        self.status
    }
}

/// Configuration for intention selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentionConfig {
    /// Maximum simultaneously active intentions
    pub max_active: usize,
}

impl Default for IntentionConfig {
    fn default() -> Self {
        Self { max_active: 3 }
    }
}

/// Tracks resource capacity and what intentions have reserved.
///
/// A resource absent from the capacity table has nothing available.
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    capacity: Resources,
    reserved: HashMap<IntentionId, Resources>,
}

impl ResourceLedger {
    pub fn new(capacity: Resources) -> Self {
        Self {
            capacity,
            reserved: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> &Resources {
        &self.capacity
    }

    pub fn available(&self, resource: &str) -> f64 {
        let total = self.capacity.get(resource).copied().unwrap_or(0.0);
        let used: f64 = self
            .reserved
            .values()
            .filter_map(|r| r.get(resource))
            .sum();
        total - used
    }

    pub fn fits(&self, requirements: &Resources) -> bool {
        requirements
            .iter()
            .all(|(resource, amount)| *amount <= 0.0 || self.available(resource) >= *amount)
    }

    pub fn reserve(&mut self, id: IntentionId, requirements: &Resources) -> bool {
        if !self.fits(requirements) {
            return false;
        }
        if !requirements.is_empty() {
            self.reserved.insert(id, requirements.clone());
        }
        true
    }

    pub fn release(&mut self, id: IntentionId) {
        self.reserved.remove(&id);
    }
}

enum Candidate<'a> {
    Desire(&'a Desire),
    Goal(GoalId),
}

/// Selects, tracks and retires an agent's intentions
#[derive(Debug, Default)]
pub struct IntentionManager {
    config: IntentionConfig,
    intentions: Vec<Intention>,
    history: Vec<Intention>,
    ledger: ResourceLedger,
}

impl IntentionManager {
    pub fn new(config: IntentionConfig, resources: Resources) -> Self {
        Self {
            config,
            intentions: Vec::new(),
            history: Vec::new(),
            ledger: ResourceLedger::new(resources),
        }
    }

    pub fn config(&self) -> &IntentionConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn get(&self, id: IntentionId) -> Option<&Intention> {
        self.intentions.iter().find(|i| i.id == id)
    }

    /// Live intentions in adoption order
    pub fn live(&self) -> &[Intention] {
        &self.intentions
    }

    pub fn active(&self) -> impl Iterator<Item = &Intention> {
        self.intentions
            .iter()
            .filter(|i| i.status == IntentionStatus::Active)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn has_capacity(&self) -> bool {
        self.active_count() < self.config.max_active
    }

    /// Recently finished intentions, oldest first
    pub fn history(&self) -> &[Intention] {
        &self.history
    }

    pub fn for_goal(&self, goal_id: GoalId) -> Option<&Intention> {
        self.intentions.iter().find(|i| i.goal_id == goal_id)
    }

    fn backs_desire(&self, desire_id: &str) -> bool {
        self.intentions
            .iter()
            .any(|i| i.desire_id.as_deref() == Some(desire_id))
    }

    /// Commits to the highest-priority candidates that fit.
    ///
    /// Candidates are the active desires plus open goals not raised by a
    /// desire (requests, reactive rules, decompositions). A candidate is
    /// skipped when its goal is already intended, unachievable in `state`,
    /// short of resources, or would undo the effects of an intended goal.
    /// Selection stops at the active-intention bound.
    pub fn select_intentions(
        &mut self,
        desires: &[Desire],
        goals: &mut GoalTree,
        state: &WorldState,
    ) -> Result<Vec<IntentionId>> {
        let mut candidates: Vec<(f64, Candidate<'_>)> = desires
            .iter()
            .filter(|d| d.is_active(state))
            .map(|d| (d.priority, Candidate::Desire(d)))
            .collect();
        candidates.extend(
            goals
                .iter()
                .filter(|g| g.is_open() && !matches!(g.source, GoalSource::Desire(_)))
                .filter(|g| self.for_goal(g.id).is_none())
                .map(|g| (g.priority, Candidate::Goal(g.id))),
        );
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut created = Vec::new();
        for (_, candidate) in candidates {
            if !self.has_capacity() {
                debug!(max = self.config.max_active, "intention bound reached");
                break;
            }

            let (goal_id, desire_id) = match candidate {
                Candidate::Desire(desire) => {
                    if self.backs_desire(&desire.id) {
                        continue;
                    }
                    let existing = goals.goal_for_desire(desire);
                    match existing.or_else(|| goals.promote_desire(desire, state)) {
                        Some(id) => (id, Some(desire.id.clone())),
                        None => continue,
                    }
                }
                Candidate::Goal(id) => (id, None),
            };

            if let Some(id) = self.commit(goal_id, desire_id, goals, state)? {
                created.push(id);
            }
        }
        Ok(created)
    }

    /// Commits to a single goal if it passes the selection checks
    pub fn adopt(&mut self, goal_id: GoalId, goals: &mut GoalTree, state: &WorldState) -> Result<Option<IntentionId>> {
        if !self.has_capacity() {
            return Ok(None);
        }
        self.commit(goal_id, None, goals, state)
    }

    fn commit(
        &mut self,
        goal_id: GoalId,
        desire_id: Option<String>,
        goals: &mut GoalTree,
        state: &WorldState,
    ) -> Result<Option<IntentionId>> {
        if self.for_goal(goal_id).is_some() {
            return Ok(None);
        }
        let goal = goals.get(goal_id).ok_or(IntentError::GoalNotFound(goal_id))?;
        if !goal.is_open() || !goal.is_achievable(state) {
            return Ok(None);
        }
        if !self.ledger.fits(&goal.resources) {
            debug!(goal = %goal.name, "insufficient resources for goal");
            return Ok(None);
        }
        if self.conflicts_with_intended(goal, goals) {
            debug!(goal = %goal.name, "goal conflicts with an intended goal");
            return Ok(None);
        }

        let mut intention = Intention::new(goal_id, goal.priority);
        intention.desire_id = desire_id;
        let requirements = goal.resources.clone();
        let name = goal.name.clone();

        if goal.status() == GoalStatus::Pending {
            goals.activate(goal_id)?;
        }
        self.ledger.reserve(intention.id, &requirements);
        info!(intention = %intention.id, goal = %name, "intention adopted");
        let id = intention.id;
        self.intentions.push(intention);
        Ok(Some(id))
    }

    /// Two goals are exclusive when they demand different values for the same key
    fn conflicts_with_intended(&self, goal: &Goal, goals: &GoalTree) -> bool {
        self.intentions
            .iter()
            .filter_map(|i| goals.get(i.goal_id))
            .any(|intended| {
                goal.effects.iter().any(|(key, value)| {
                    intended
                        .effects
                        .get(key)
                        .is_some_and(|other| !values_equal(other, value))
                })
            })
    }

    pub fn attach_plan(&mut self, id: IntentionId, plan_id: PlanId) -> Result<()> {
        let intention = self.live_mut(id)?;
        intention.plan_id = Some(plan_id);
        Ok(())
    }

    pub fn suspend(&mut self, id: IntentionId) -> Result<()> {
        self.live_mut(id)?.status = IntentionStatus::Suspended;
        Ok(())
    }

    /// Reactivates a suspended intention if the bound allows it
    pub fn resume(&mut self, id: IntentionId) -> Result<bool> {
        if !self.has_capacity() {
            return Ok(false);
        }
        self.live_mut(id)?.status = IntentionStatus::Active;
        Ok(true)
    }

    /// Retires an intention whose goal was achieved
    pub fn complete(&mut self, id: IntentionId, goals: &mut GoalTree) -> Result<()> {
        let goal_id = self.live_mut(id)?.goal_id;
        if goals.get(goal_id).is_some_and(|g| g.status() == GoalStatus::Active) {
            goals.achieve(goal_id)?;
        }
        self.retire(id, IntentionStatus::Completed);
        Ok(())
    }

    /// Retires an intention and fails its goal
    pub fn fail(&mut self, id: IntentionId, goals: &mut GoalTree) -> Result<()> {
        let goal_id = self.live_mut(id)?.goal_id;
        if goals.get(goal_id).is_some_and(|g| g.status() == GoalStatus::Active) {
            goals.fail(goal_id)?;
        }
        self.retire(id, IntentionStatus::Failed);
        Ok(())
    }

    /// Retires intentions whose goals finished or stopped being achievable.
    ///
    /// Dropped intentions leave their goal open so a persisting desire can
    /// be re-selected in a later cycle.
    pub fn reconsider(&mut self, goals: &GoalTree, state: &WorldState) -> Vec<(IntentionId, IntentionStatus)> {
        let verdicts: Vec<(IntentionId, IntentionStatus)> = self
            .intentions
            .iter()
            .filter_map(|intention| {
                let status = match goals.get(intention.goal_id) {
                    None => IntentionStatus::Dropped,
                    Some(goal) => match goal.status() {
                        GoalStatus::Achieved => IntentionStatus::Completed,
                        GoalStatus::Failed => IntentionStatus::Failed,
                        _ if !goal.is_achievable(state) => IntentionStatus::Dropped,
                        _ => return None,
                    },
                };
                Some((intention.id, status))
            })
            .collect();

        for (id, status) in &verdicts {
            debug!(intention = %id, ?status, "intention reconsidered");
            self.retire(*id, *status);
        }
        verdicts
    }

    fn retire(&mut self, id: IntentionId, status: IntentionStatus) {
        if let Some(pos) = self.intentions.iter().position(|i| i.id == id) {
            let mut intention = self.intentions.remove(pos);
            intention.status = status;
            self.ledger.release(id);
            self.history.push(intention);
            if self.history.len() > HISTORY_LIMIT {
                self.history.remove(0);
            }
        }
    }

    fn live_mut(&mut self, id: IntentionId) -> Result<&mut Intention> {
        self.intentions
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(IntentError::IntentionNotFound(id))
    }
}
