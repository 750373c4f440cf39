//! # Synapsed Beliefs
//!
//! Per-agent belief storage for BDI agents.
//!
//! ## Key Features
//!
//! - **Belief Store**: keyed, timestamped facts with a certainty in [0, 1]
//! - **Consistency Checking**: contradictions, logical inconsistencies, temporal
//!   conflicts and ontology violations over a candidate belief set
//! - **Conflict Resolution**: deterministic, idempotent policies per conflict kind
//! - **Ontology**: class hierarchy, disjointness, property kinds and value ranges
//! - **Persistence**: async repository trait with an in-memory implementation
//!
//! ## Revision cycle
//!
//! ```text
//! staged beliefs ─┐
//!                 ├─► ConsistencyChecker ─► ConflictResolver ─► BeliefStore::commit
//! store snapshot ─┘
//! ```

pub mod types;
pub mod store;
pub mod ontology;
pub mod rules;
pub mod consistency;
pub mod resolution;
pub mod repository;

pub use types::{check_certainty, Belief, BeliefId, BeliefSource, Validity, WorldState};
pub use store::{BeliefChange, BeliefStore};
pub use ontology::{Ontology, OntologyViolation, PropertyDef, PropertyKind, ValueType, IS_A};
pub use rules::{DomainRule, ExclusivePair, FnRule};
pub use consistency::{Conflict, ConflictKind, ConsistencyChecker, ContradictionPolicy};
pub use resolution::{ConflictResolver, ResolutionAction, ResolutionReport};
pub use repository::{BeliefRepository, InMemoryBeliefRepository};

/// Result type for belief operations
pub type Result<T> = std::result::Result<T, BeliefError>;

/// Errors that can occur in belief management
#[derive(Debug, thiserror::Error)]
pub enum BeliefError {
    /// Certainty outside the closed unit interval
    #[error("Invalid certainty {certainty} for belief '{key}': must be within [0, 1]")]
    InvalidCertainty { key: String, certainty: f64 },

    #[error("Belief validation failed: {0}")]
    ValidationFailed(String),

    #[error("Belief not found: {0}")]
    NotFound(String),

    /// Backing repository failed
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}
