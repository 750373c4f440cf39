//! # Synapsed Intent
//!
//! Goals, desires and intentions for BDI agents, with HTN (Hierarchical Task
//! Network) planning and plan execution against a belief store.
//!
//! ## Key Features
//!
//! - **Goal Tree**: arena of goals with strictly ordered status transitions
//! - **Desire Promotion**: desires become goals once their activation conditions hold
//! - **HTN Planning**: compound tasks expand through methods gated by preconditions
//! - **Plan Library**: reusable plans shared across agents, selected by priority
//! - **Intentions**: bounded commitments backed by a resource ledger
//! - **Execution**: ordered step execution with a bounded single replan
//! - **Reasoning Oracle**: async, fallible source of desires, decompositions and steps

pub mod types;
pub mod goal;
pub mod desire;
pub mod tree;
pub mod oracle;
pub mod plan;
pub mod htn;
pub mod library;
pub mod intention;
pub mod execution;
pub mod repository;

pub use types::*;
pub use goal::{Goal, GoalSource, GoalStatus};
pub use desire::{Desire, GoalTemplate};
pub use tree::{goal_key, validate_decomposition, GoalTree};
pub use oracle::{Decision, OracleError, OracleResult, ReasoningOracle, RuleOracle};
pub use plan::{Plan, PlanStatus, PlanStep};
pub use htn::{Action, Domain, HtnPlanner, HtnPlannerConfig, Method, Task, TaskKind, TaskTree};
pub use library::PlanLibrary;
pub use intention::{Intention, IntentionConfig, IntentionManager, IntentionStatus, ResourceLedger};
pub use execution::{ExecutionConfig, ExecutionEngine, ExecutionReport, NoReplanner, Replanner};
pub use repository::{InMemoryPlanRepository, PlanRepository};

/// Result type for intent operations
pub type Result<T> = std::result::Result<T, IntentError>;

/// Intent-specific errors
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Goal not found: {0}")]
    GoalNotFound(GoalId),

    #[error("No plan found for goal '{0}'")]
    PlanNotFound(String),

    #[error("Intention not found: {0}")]
    IntentionNotFound(IntentionId),

    /// A step's preconditions did not hold; recovered inside plan execution
    #[error("Precondition failed for step '{step}': {reason}")]
    PreconditionFailed { step: String, reason: String },

    /// A step failed again after the allowed replans
    #[error("Replanning exhausted for goal {goal}: step '{step}' failed after {attempts} replan(s)")]
    ReplanExhausted {
        goal: GoalId,
        step: String,
        attempts: u32,
    },

    #[error("Invalid goal transition from {from} to {to}")]
    InvalidTransition { from: GoalStatus, to: GoalStatus },

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Belief error: {0}")]
    Belief(#[from] synapsed_beliefs::BeliefError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}
