//! # Synapsed Swarm
//!
//! BDI agent loop and multi-agent driver. Each agent perceives, revises its
//! beliefs, promotes desires to goals, commits to intentions, plans and acts,
//! and talks to other agents over an ACL message bus.
//!
//! ## Key Features
//!
//! - **Agent Loop**: one tick runs perceive → revise → deliberate → plan → execute → communicate
//! - **Strategies**: reactive rules, HTN planning and domain desires compose an agent
//! - **World Context**: bus, plan library, domain, oracle and repositories shared explicitly
//! - **Async Oracle**: reasoning oracle calls run in the background, consumed on a later tick
//! - **Swarm Driver**: sequential or parallel ticks with per-agent error isolation
//! - **Configuration**: file and environment layered settings
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                 Swarm                   │
//! ├─────────────────────────────────────────┤
//! │   BdiAgent₁     BdiAgent₂     BdiAgent₃  │
//! ├─────────────────────────────────────────┤
//! │  World: MessageBus │ PlanLibrary │ Oracle │
//! ├─────────────────────────────────────────┤
//! │   Beliefs   │   Intent   │     ACL      │
//! └─────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod environment;
pub mod error;
pub mod oracle_calls;
pub mod strategy;
pub mod swarm;
pub mod telemetry;
pub mod world;

pub use agent::{BdiAgent, BdiAgentBuilder, TickReport};
pub use config::{AgentConfig, SwarmConfig, ENV_PREFIX};
pub use environment::{Environment, NullEnvironment, ScriptedEnvironment};
pub use error::{SwarmError, SwarmResult};
pub use oracle_calls::{OracleCalls, OracleOutcome, OracleRequest, Ticket};
pub use strategy::{AgentKind, Capabilities, ReactiveRule};
pub use swarm::{StepSummary, Swarm};
pub use telemetry::{init_json_tracing, init_tracing};
pub use world::World;

/// Maximum number of agents in a swarm
pub const MAX_SWARM_SIZE: usize = 100;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AgentConfig, AgentKind, BdiAgent, Environment, ReactiveRule, ScriptedEnvironment,
        StepSummary, Swarm, SwarmConfig, SwarmError, SwarmResult, TickReport, World,
    };

    pub use synapsed_acl::{AgentId, Message, MessageBus, MessageContent, Performative};
    pub use synapsed_beliefs::{Belief, BeliefStore, ContradictionPolicy, Ontology};
    pub use synapsed_intent::{
        Action, Condition, Desire, Domain, Goal, GoalStatus, Method, PlanLibrary, RuleOracle,
    };
}
