//! Plan execution against a belief store

use crate::{
    goal::Goal,
    htn::{Domain, HtnPlanner},
    plan::{Plan, PlanStatus, PlanStep},
    types::{first_unmet, PlanId},
    IntentError, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use synapsed_beliefs::{Belief, BeliefSource, BeliefStore, WorldState};
use tracing::{debug, trace, warn};

/// Produces fresh steps for a goal after a step failed
pub trait Replanner: Send + Sync {
    fn replan(&self, goal: &Goal, state: &WorldState) -> Result<Vec<PlanStep>>;
}

impl Replanner for HtnPlanner {
    fn replan(&self, goal: &Goal, state: &WorldState) -> Result<Vec<PlanStep>> {
        Ok(self.plan_for(goal, state)?.steps().to_vec())
    }
}

/// Replanner that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReplanner;

impl Replanner for NoReplanner {
    fn replan(&self, goal: &Goal, _state: &WorldState) -> Result<Vec<PlanStep>> {
        Err(IntentError::PlanNotFound(goal.name.clone()))
    }
}

/// Replanning bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Replans allowed without a successful step in between
    pub max_consecutive_replans: u32,
    /// Replans allowed over the life of one plan
    pub max_total_replans: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_consecutive_replans: 1,
            max_total_replans: 4,
        }
    }
}

/// Outcome of one [`ExecutionEngine::execute_plan`] call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub plan_id: PlanId,
    pub steps_executed: usize,
    /// Belief keys written by action effects, in order
    pub applied_effects: Vec<String>,
    pub replans: u32,
    pub completed: bool,
}

/// Runs plan steps by applying domain action effects as beliefs
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    domain: Arc<Domain>,
    /// `None` lets the engine run any action
    capabilities: Option<HashSet<String>>,
    config: ExecutionConfig,
}

impl ExecutionEngine {
    pub fn new(domain: Arc<Domain>) -> Self {
        Self {
            domain,
            capabilities: None,
            config: ExecutionConfig::default(),
        }
    }

    /// Restricts execution to actions whose required capabilities are all held
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = Some(capabilities.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Runs one step, returning the belief keys it wrote.
    ///
    /// Every check happens before any effect is applied, so a failed step
    /// leaves the store untouched.
    pub fn execute_step(&self, step: &mut PlanStep, store: &mut BeliefStore) -> Result<Vec<String>> {
        if step.is_completed() {
            return Ok(Vec::new());
        }
        let state = store.state();
        let fail = |reason: String| IntentError::PreconditionFailed {
            step: step.description.clone(),
            reason,
        };

        if let Some(unmet) = first_unmet(&step.preconditions, &state) {
            return Err(fail(format!("{unmet} does not hold")));
        }

        let Some(name) = step.action.as_deref() else {
            trace!(step = %step.description, "unbound step recorded");
            step.mark_completed();
            return Ok(Vec::new());
        };
        let action = self
            .domain
            .action(name)
            .ok_or_else(|| fail(format!("unknown action '{name}'")))?;

        if let Some(held) = &self.capabilities {
            if let Some(missing) = action.required_capabilities.iter().find(|c| !held.contains(*c)) {
                return Err(fail(format!("missing capability '{missing}'")));
            }
        }
        if let Some(unmet) = first_unmet(&action.preconditions, &state) {
            return Err(fail(format!("action '{name}' requires {unmet}")));
        }

        let mut applied = Vec::with_capacity(action.effects.len());
        for (key, value) in &action.effects {
            let belief = Belief::new(key.clone(), value.clone(), 1.0).from_source(BeliefSource::Effect);
            store.upsert_belief(belief)?;
            applied.push(key.clone());
        }
        trace!(step = %step.description, action = name, effects = applied.len(), "step executed");
        step.mark_completed();
        Ok(applied)
    }

    /// Runs the plan's remaining steps in order.
    ///
    /// A step whose preconditions fail triggers a replan: the unfinished tail
    /// is replaced by fresh steps from `replanner` and execution resumes. A
    /// second failure before any step succeeds, or running out of total
    /// replans, marks the plan failed with [`IntentError::ReplanExhausted`].
    pub fn execute_plan(
        &self,
        plan: &mut Plan,
        goal: &Goal,
        store: &mut BeliefStore,
        replanner: &dyn Replanner,
    ) -> Result<ExecutionReport> {
        let mut report = ExecutionReport {
            plan_id: plan.id,
            steps_executed: 0,
            applied_effects: Vec::new(),
            replans: 0,
            completed: false,
        };
        plan.set_status(PlanStatus::Executing);
        let mut consecutive = 0;

        while let Some(index) = plan.next_step_index() {
            let Some(step) = plan.step_mut(index) else {
                break;
            };
            match self.execute_step(step, store) {
                Ok(applied) => {
                    report.steps_executed += 1;
                    report.applied_effects.extend(applied);
                    consecutive = 0;
                }
                Err(IntentError::PreconditionFailed { step, reason }) => {
                    if consecutive >= self.config.max_consecutive_replans
                        || plan.replans >= self.config.max_total_replans
                    {
                        warn!(goal = %goal.name, %step, %reason, replans = plan.replans, "replanning exhausted");
                        plan.set_status(PlanStatus::Failed);
                        return Err(IntentError::ReplanExhausted {
                            goal: goal.id,
                            step,
                            attempts: consecutive,
                        });
                    }

                    debug!(goal = %goal.name, %step, %reason, "step failed, replanning");
                    let steps = match replanner.replan(goal, &store.state()) {
                        Ok(steps) if !steps.is_empty() => steps,
                        Ok(_) => {
                            plan.set_status(PlanStatus::Failed);
                            return Err(IntentError::PlanNotFound(goal.name.clone()));
                        }
                        Err(e) => {
                            plan.set_status(PlanStatus::Failed);
                            return Err(e);
                        }
                    };
                    plan.splice_replan(steps);
                    plan.replans += 1;
                    report.replans += 1;
                    consecutive += 1;
                }
                Err(e) => {
                    plan.set_status(PlanStatus::Failed);
                    return Err(e);
                }
            }
        }

        plan.set_status(PlanStatus::Completed);
        report.completed = true;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::htn::Action;
    use crate::types::{Condition, GoalId};
    use serde_json::json;

    fn domain() -> Arc<Domain> {
        Arc::new(
            Domain::new()
                .with_action(Action::new("unlock").effect("door", "unlocked"))
                .with_action(
                    Action::new("open")
                        .requires(Condition::equals("door", "unlocked"))
                        .effect("door", "open"),
                )
                .with_action(Action::new("weld").needs_capability("welding").effect("seam", "closed")),
        )
    }

    #[test]
    fn test_effects_become_beliefs() {
        let engine = ExecutionEngine::new(domain());
        let mut store = BeliefStore::new();
        let mut step = PlanStep::primitive("Unlock", "unlock");

        let applied = engine.execute_step(&mut step, &mut store).unwrap();
        assert_eq!(applied, vec!["door"]);
        assert!(step.is_completed());
        let belief = store.get("door").unwrap();
        assert_eq!(belief.value, json!("unlocked"));
        assert_eq!(belief.certainty, 1.0);
        assert_eq!(belief.source, BeliefSource::Effect);
    }

    #[test]
    fn test_failed_step_has_no_side_effects() {
        let engine = ExecutionEngine::new(domain());
        let mut store = BeliefStore::new();
        let mut step = PlanStep::primitive("Open", "open");

        let err = engine.execute_step(&mut step, &mut store).unwrap_err();
        assert!(matches!(err, IntentError::PreconditionFailed { .. }));
        assert!(store.is_empty());
        assert!(!step.is_completed());

        let mut unknown = PlanStep::primitive("Fly", "fly");
        assert!(engine.execute_step(&mut unknown, &mut store).is_err());
    }

    #[test]
    fn test_capabilities_gate_actions() {
        let engine = ExecutionEngine::new(domain()).with_capabilities(["driving"]);
        let mut store = BeliefStore::new();
        let err = engine
            .execute_step(&mut PlanStep::primitive("Weld", "weld"), &mut store)
            .unwrap_err();
        assert!(err.to_string().contains("welding"));

        let welder = ExecutionEngine::new(domain()).with_capabilities(["welding"]);
        assert!(welder.execute_step(&mut PlanStep::primitive("Weld", "weld"), &mut store).is_ok());
    }

    #[test]
    fn test_plan_completes_in_order() {
        let engine = ExecutionEngine::new(domain());
        let goal = Goal::new("enter", "Enter the room", 0.5);
        let mut plan = Plan::for_goal(
            &goal,
            vec![PlanStep::primitive("Unlock", "unlock"), PlanStep::primitive("Open", "open")],
        );
        let mut store = BeliefStore::new();

        let report = engine.execute_plan(&mut plan, &goal, &mut store, &NoReplanner).unwrap();
        assert!(report.completed);
        assert_eq!(report.steps_executed, 2);
        assert_eq!(report.replans, 0);
        assert_eq!(plan.status(), PlanStatus::Completed);
        assert_eq!(store.value("door"), Some(&json!("open")));
    }

    #[test]
    fn test_failure_without_replanner_fails_plan() {
        let engine = ExecutionEngine::new(domain());
        let goal = Goal::new("enter", "Enter the room", 0.5);
        let mut plan = Plan::new(GoalId::new(), "enter", vec![PlanStep::primitive("Open", "open")]);
        let mut store = BeliefStore::new();

        let err = engine.execute_plan(&mut plan, &goal, &mut store, &NoReplanner).unwrap_err();
        assert!(matches!(err, IntentError::PlanNotFound(_)));
        assert_eq!(plan.status(), PlanStatus::Failed);
    }
}
