//! Plan library shared across agents

use crate::{
    plan::Plan,
    repository::PlanRepository,
    types::PlanId,
    IntentError, Result,
};
use dashmap::DashMap;
use std::collections::HashSet;
use synapsed_beliefs::WorldState;
use tracing::debug;

/// Reusable plans indexed by goal name.
///
/// Agents read plans concurrently and work on private copies made with
/// [`Plan::instantiate`]; the stored templates are only replaced through
/// [`PlanLibrary::update_plan`].
#[derive(Debug, Default)]
pub struct PlanLibrary {
    plans: DashMap<String, Vec<Plan>>,
}

impl PlanLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_plan(&self, plan: Plan) {
        debug!(goal = %plan.goal_key, plan = %plan.id, "plan added to library");
        self.plans.entry(plan.goal_key.clone()).or_default().push(plan);
    }

    /// Removes a plan; the goal's entry disappears once it holds no plans
    pub fn remove_plan(&self, goal_key: &str, plan_id: PlanId) -> bool {
        let removed = match self.plans.get_mut(goal_key) {
            Some(mut plans) => {
                let before = plans.len();
                plans.retain(|p| p.id != plan_id);
                before != plans.len()
            }
            None => false,
        };
        self.plans.remove_if(goal_key, |_, plans| plans.is_empty());
        removed
    }

    /// Replaces a stored plan with the same id
    pub fn update_plan(&self, plan: Plan) {
        self.remove_plan(&plan.goal_key, plan.id);
        self.add_plan(plan);
    }

    pub fn plans_for(&self, goal_key: &str) -> Vec<Plan> {
        self.plans.get(goal_key).map(|p| p.value().clone()).unwrap_or_default()
    }

    pub fn contains_goal(&self, goal_key: &str) -> bool {
        self.plans.contains_key(goal_key)
    }

    /// Highest-priority plan whose precondition keys are all present in `state_keys`.
    ///
    /// Ties go to the plan added first.
    pub fn select_plan(&self, goal_key: &str, state_keys: &HashSet<String>) -> Result<Plan> {
        self.best(goal_key, |plan| plan.preconditions_satisfiable_by(state_keys))
    }

    /// Highest-priority plan whose preconditions hold in `state`
    pub fn select_for_state(&self, goal_key: &str, state: &WorldState) -> Result<Plan> {
        self.best(goal_key, |plan| plan.preconditions_hold(state))
    }

    fn best(&self, goal_key: &str, eligible: impl Fn(&Plan) -> bool) -> Result<Plan> {
        let plans = self
            .plans
            .get(goal_key)
            .ok_or_else(|| IntentError::PlanNotFound(goal_key.to_string()))?;
        let mut best: Option<&Plan> = None;
        for plan in plans.iter().filter(|&p| eligible(p)) {
            if best.map_or(true, |b| plan.priority > b.priority) {
                best = Some(plan);
            }
        }
        best.cloned()
            .ok_or_else(|| IntentError::PlanNotFound(goal_key.to_string()))
    }

    /// Loads stored plans for a goal into the library
    pub async fn hydrate(&self, repository: &dyn PlanRepository, goal_key: &str) -> Result<usize> {
        let plans = repository.load_for_goal(goal_key).await?;
        let count = plans.len();
        for plan in plans {
            if !self.plans_for(goal_key).iter().any(|p| p.id == plan.id) {
                self.add_plan(plan);
            }
        }
        Ok(count)
    }

    /// Number of goals with at least one plan
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
