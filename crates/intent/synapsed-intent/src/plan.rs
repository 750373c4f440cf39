//! Plans: ordered steps toward a goal

use crate::{
    goal::Goal,
    htn::{Domain, TaskKind},
    tree::goal_key,
    types::{all_hold, Condition, GoalId, PlanId, StepId},
    IntentError, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use synapsed_beliefs::WorldState;

/// Execution status of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

/// One step of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: StepId,
    pub description: String,
    pub kind: TaskKind,
    /// Domain action run by this step; unbound steps only record progress
    pub action: Option<String>,
    pub preconditions: Vec<Condition>,
    completed: bool,
}

impl PlanStep {
    /// Step bound to a domain action
    pub fn primitive(description: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: StepId::new(),
            description: description.into(),
            kind: TaskKind::Primitive,
            action: Some(action.into()),
            preconditions: Vec::new(),
            completed: false,
        }
    }

    /// Step with no action behind it
    pub fn unbound(description: impl Into<String>) -> Self {
        Self {
            id: StepId::new(),
            description: description.into(),
            kind: TaskKind::Primitive,
            action: None,
            preconditions: Vec::new(),
            completed: false,
        }
    }

    pub fn with_precondition(mut self, condition: Condition) -> Self {
        self.preconditions.push(condition);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub(crate) fn mark_completed(&mut self) {
        self.completed = true;
    }

    /// Same step with a new id, not yet completed
    fn fresh(&self) -> Self {
        Self {
            id: StepId::new(),
            completed: false,
            ..self.clone()
        }
    }

    fn same_task(&self, other: &PlanStep) -> bool {
        self.description == other.description && self.action == other.action
    }
}

/// Ordered steps toward one goal.
///
/// Steps complete strictly in order; a plan is completed iff every step is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub goal_id: GoalId,
    /// Name of the goal; plan libraries are keyed by it
    pub goal_key: String,
    steps: Vec<PlanStep>,
    status: PlanStatus,
    pub priority: f64,
    /// Conditions required to adopt this plan
    pub preconditions: Vec<Condition>,
    pub symbolic: Option<String>,
    /// Replans performed while executing this instance
    pub replans: u32,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(goal_id: GoalId, goal_key: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        Self {
            id: PlanId::new(),
            goal_id,
            goal_key: goal_key.into(),
            steps,
            status: PlanStatus::Pending,
            priority: 0.0,
            preconditions: Vec::new(),
            symbolic: None,
            replans: 0,
            created_at: Utc::now(),
        }
    }

    /// Plan for `goal`, inheriting its priority
    pub fn for_goal(goal: &Goal, steps: Vec<PlanStep>) -> Self {
        Self::new(goal.id, goal.name.clone(), steps).with_priority(goal.priority)
    }

    /// Builds a plan from oracle step descriptions.
    ///
    /// Descriptions naming a domain action are bound to it; the rest become
    /// unbound steps.
    pub fn from_descriptions(goal: &Goal, candidates: &[Value], domain: Option<&Domain>) -> Result<Self> {
        if candidates.is_empty() {
            return Err(IntentError::ValidationFailed(format!(
                "no steps proposed for goal '{}'",
                goal.name
            )));
        }
        let mut steps = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            let description = match candidate.as_str().map(str::trim) {
                Some(text) if !text.is_empty() => text,
                _ => {
                    return Err(IntentError::ValidationFailed(format!(
                        "step {i} is not a non-empty string: {candidate}"
                    )))
                }
            };
            let bound = domain.and_then(|d| {
                [description.to_string(), goal_key(description)]
                    .into_iter()
                    .find(|name| d.action(name).is_some())
            });
            steps.push(match bound {
                Some(action) => PlanStep::primitive(description, action),
                None => PlanStep::unbound(description),
            });
        }
        Ok(Self::for_goal(goal, steps))
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_precondition(mut self, condition: Condition) -> Self {
        self.preconditions.push(condition);
        self
    }

    /// Records the plan's symbolic form, e.g. `reduce_costs :- audit, cut.`
    pub fn with_symbolic(mut self) -> Self {
        self.symbolic = Some(self.to_symbolic());
        self
    }

    pub fn to_symbolic(&self) -> String {
        let body: Vec<&str> = self
            .steps
            .iter()
            .map(|s| s.action.as_deref().unwrap_or(&s.description))
            .collect();
        format!("{} :- {}.", self.goal_key, body.join(", "))
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: PlanStatus) {
        self.status = status;
    }

    pub fn is_completed(&self) -> bool {
        self.steps.iter().all(PlanStep::is_completed)
    }

    /// Index of the first step not yet completed
    pub fn next_step_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| !s.is_completed())
    }

    pub fn completed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.is_completed()).count()
    }

    pub(crate) fn step_mut(&mut self, index: usize) -> Option<&mut PlanStep> {
        self.steps.get_mut(index)
    }

    /// Every precondition refers to a key present in `keys`
    pub fn preconditions_satisfiable_by(&self, keys: &HashSet<String>) -> bool {
        self.preconditions.iter().all(|c| keys.contains(&c.key))
    }

    pub fn preconditions_hold(&self, state: &WorldState) -> bool {
        all_hold(&self.preconditions, state)
    }

    /// A private, unstarted copy of a library plan bound to `goal_id`
    pub fn instantiate(&self, goal_id: GoalId) -> Plan {
        Plan {
            id: PlanId::new(),
            goal_id,
            steps: self.steps.iter().map(PlanStep::fresh).collect(),
            status: PlanStatus::Pending,
            replans: 0,
            created_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Replaces the unfinished tail with `new_steps`.
    ///
    /// Completed steps stay in place. Leading new steps that repeat the
    /// completed prefix are skipped so their effects are not applied twice.
    pub(crate) fn splice_replan(&mut self, new_steps: Vec<PlanStep>) {
        let done = self.completed_steps();
        self.steps.truncate(done);
        let skip = self
            .steps
            .iter()
            .zip(new_steps.iter())
            .take_while(|(old, new)| old.same_task(new))
            .count();
        self.steps.extend(new_steps.into_iter().skip(skip).map(|s| s.fresh()));
    }
}
