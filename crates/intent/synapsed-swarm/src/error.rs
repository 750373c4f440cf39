//! Error types for the agent loop and swarm driver

use thiserror::Error;

/// Result type for swarm operations
pub type SwarmResult<T> = std::result::Result<T, SwarmError>;

/// Errors that can occur while running agents
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Agent not found in swarm
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// An agent with this id already joined
    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    /// Swarm size limit exceeded
    #[error("Swarm size limit exceeded: {current} >= {max}")]
    SwarmSizeLimitExceeded { current: usize, max: usize },

    /// Invalid agent or swarm configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Belief error
    #[error("Belief error: {0}")]
    Belief(#[from] synapsed_beliefs::BeliefError),

    /// Intent error
    #[error("Intent error: {0}")]
    Intent(#[from] synapsed_intent::IntentError),

    /// Messaging error
    #[error("Messaging error: {0}")]
    Acl(#[from] synapsed_acl::AclError),

    /// Reasoning oracle error
    #[error("Oracle error: {0}")]
    Oracle(#[from] synapsed_intent::OracleError),

    /// Other errors
    #[error("Swarm error: {0}")]
    Other(#[from] anyhow::Error),
}
