//! HTN (Hierarchical Task Network) planning
//!
//! A goal's name is the root task. Primitive tasks bind to domain actions;
//! compound tasks expand through the first method whose preconditions hold in
//! the simulated state, and primitive effects are applied to that state as
//! expansion proceeds.

use crate::{
    execution::ExecutionEngine,
    goal::Goal,
    plan::{Plan, PlanStep},
    types::{all_hold, Condition, GoalId, StepId},
    IntentError, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use synapsed_beliefs::{BeliefStore, WorldState};
use tracing::{debug, trace, warn};

/// Whether a task runs an action directly or expands into subtasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Primitive,
    Compound,
}

/// A primitive operation the execution engine can run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub preconditions: Vec<Condition>,
    /// Belief values written when the action runs
    #[serde(default)]
    pub effects: BTreeMap<String, Value>,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preconditions: Vec::new(),
            effects: BTreeMap::new(),
            required_capabilities: Vec::new(),
        }
    }

    pub fn requires(mut self, condition: Condition) -> Self {
        self.preconditions.push(condition);
        self
    }

    pub fn effect(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.effects.insert(key.into(), value.into());
        self
    }

    pub fn needs_capability(mut self, capability: impl Into<String>) -> Self {
        self.required_capabilities.push(capability.into());
        self
    }
}

/// One way of accomplishing a compound task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    /// Compound task this method expands
    pub task: String,
    #[serde(default)]
    pub preconditions: Vec<Condition>,
    pub subtasks: Vec<String>,
}

impl Method {
    pub fn new(name: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task: task.into(),
            preconditions: Vec::new(),
            subtasks: Vec::new(),
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.preconditions.push(condition);
        self
    }

    pub fn then(mut self, subtask: impl Into<String>) -> Self {
        self.subtasks.push(subtask.into());
        self
    }
}

/// Actions and methods available to a planner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Domain {
    #[serde(default)]
    actions: BTreeMap<String, Action>,
    /// Methods per task, tried in declaration order
    #[serde(default)]
    methods: BTreeMap<String, Vec<Method>>,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.add_action(action);
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.add_method(method);
        self
    }

    pub fn add_action(&mut self, action: Action) {
        self.actions.insert(action.name.clone(), action);
    }

    pub fn add_method(&mut self, method: Method) {
        self.methods.entry(method.task.clone()).or_default().push(method);
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn methods_for(&self, task: &str) -> &[Method] {
        self.methods.get(task).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A node of a task tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: StepId,
    pub name: String,
    pub kind: TaskKind,
    /// Method chosen for a compound task
    pub method: Option<String>,
    pub subtasks: Vec<Task>,
    /// False when no method applied or a planning bound was hit
    pub expanded: bool,
}

impl Task {
    fn primitive(name: &str) -> Self {
        Self {
            id: StepId::new(),
            name: name.to_string(),
            kind: TaskKind::Primitive,
            method: None,
            subtasks: Vec::new(),
            expanded: true,
        }
    }

    fn unexpanded(name: &str) -> Self {
        Self {
            id: StepId::new(),
            name: name.to_string(),
            kind: TaskKind::Compound,
            method: None,
            subtasks: Vec::new(),
            expanded: false,
        }
    }

    fn collect_primitives<'a>(&'a self, out: &mut Vec<&'a Task>) {
        match self.kind {
            TaskKind::Primitive => out.push(self),
            TaskKind::Compound => {
                for subtask in &self.subtasks {
                    subtask.collect_primitives(out);
                }
            }
        }
    }

    fn collect_unexpanded<'a>(&'a self, out: &mut Vec<&'a str>) {
        if !self.expanded {
            out.push(&self.name);
        }
        for subtask in &self.subtasks {
            subtask.collect_unexpanded(out);
        }
    }
}

/// Result of planning one goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTree {
    pub goal_id: GoalId,
    pub goal_key: String,
    pub root: Task,
    /// Method applications performed while planning
    pub expansions: usize,
}

impl TaskTree {
    /// Primitive tasks in execution order
    pub fn primitives(&self) -> Vec<&Task> {
        let mut out = Vec::new();
        self.root.collect_primitives(&mut out);
        out
    }

    pub fn is_fully_expanded(&self) -> bool {
        self.unexpanded().is_empty()
    }

    /// Names of tasks that could not be expanded
    pub fn unexpanded(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.root.collect_unexpanded(&mut out);
        out
    }

    /// Linearizes the tree into plan steps
    pub fn to_steps(&self) -> Vec<PlanStep> {
        self.primitives()
            .into_iter()
            .map(|task| PlanStep::primitive(task.name.clone(), task.name.clone()))
            .collect()
    }
}

/// Bounds on a planning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtnPlannerConfig {
    /// Maximum method applications per plan
    pub max_expansions: usize,
    /// Maximum nesting of compound tasks
    pub max_depth: usize,
}

impl Default for HtnPlannerConfig {
    fn default() -> Self {
        Self {
            max_expansions: 1024,
            max_depth: 32,
        }
    }
}

/// HTN planner over a shared domain
#[derive(Debug, Clone)]
pub struct HtnPlanner {
    domain: Arc<Domain>,
    config: HtnPlannerConfig,
}

impl HtnPlanner {
    pub fn new(domain: Arc<Domain>) -> Self {
        Self {
            domain,
            config: HtnPlannerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: HtnPlannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.domain
    }

    /// Expands the goal into a task tree.
    ///
    /// Branches that cannot expand are marked and left empty; the rest of the
    /// tree is still planned.
    pub fn plan(&self, goal: &Goal, state: &WorldState) -> TaskTree {
        let mut simulated = state.clone();
        let mut expansions = 0;
        let root = self.expand(&goal.name, &mut simulated, 0, &mut expansions);
        let tree = TaskTree {
            goal_id: goal.id,
            goal_key: goal.name.clone(),
            root,
            expansions,
        };
        debug!(
            goal = %goal.name,
            primitives = tree.primitives().len(),
            unexpanded = tree.unexpanded().len(),
            "task tree planned"
        );
        tree
    }

    /// Plans and linearizes, failing when nothing executable came out
    pub fn plan_for(&self, goal: &Goal, state: &WorldState) -> Result<Plan> {
        let tree = self.plan(goal, state);
        self.to_plan(goal, &tree)
    }

    pub fn to_plan(&self, goal: &Goal, tree: &TaskTree) -> Result<Plan> {
        let steps = tree.to_steps();
        if steps.is_empty() {
            return Err(IntentError::PlanNotFound(goal.name.clone()));
        }
        Ok(Plan::for_goal(goal, steps))
    }

    /// Runs every bound action of the tree; true only if all succeed
    pub fn execute_tree(&self, tree: &TaskTree, engine: &ExecutionEngine, store: &mut BeliefStore) -> bool {
        let mut steps = tree.to_steps();
        if steps.is_empty() {
            return false;
        }
        steps
            .iter_mut()
            .all(|step| engine.execute_step(step, store).is_ok())
    }

    fn expand(&self, name: &str, state: &mut WorldState, depth: usize, expansions: &mut usize) -> Task {
        if let Some(action) = self.domain.action(name) {
            for (key, value) in &action.effects {
                state.insert(key.clone(), value.clone());
            }
            return Task::primitive(name);
        }

        if depth >= self.config.max_depth || *expansions >= self.config.max_expansions {
            warn!(task = name, depth, expansions = *expansions, "planning bound reached");
            return Task::unexpanded(name);
        }

        let Some(method) = self
            .domain
            .methods_for(name)
            .iter()
            .find(|m| all_hold(&m.preconditions, state))
        else {
            debug!(task = name, "no applicable method");
            return Task::unexpanded(name);
        };

        *expansions += 1;
        trace!(task = name, method = %method.name, "expanding");
        let subtasks = method
            .subtasks
            .iter()
            .map(|subtask| self.expand(subtask, state, depth + 1, expansions))
            .collect();

        Task {
            id: StepId::new(),
            name: name.to_string(),
            kind: TaskKind::Compound,
            method: Some(method.name.clone()),
            subtasks,
            expanded: true,
        }
    }
}
