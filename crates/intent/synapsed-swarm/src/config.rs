//! Agent and swarm configuration

use crate::error::{SwarmError, SwarmResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use synapsed_beliefs::{ContradictionPolicy, Ontology};
use synapsed_intent::{ExecutionConfig, IntentionConfig, Resources};

/// Environment variable prefix, e.g. `SYNAPSED_BDI_AGENT__MAX_INTENTIONS=5`
pub const ENV_PREFIX: &str = "SYNAPSED_BDI";

/// Per-agent settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum concurrently active intentions
    pub max_intentions: usize,
    /// Replans allowed per step failure
    pub max_consecutive_replans: u32,
    /// Replans allowed per plan
    pub max_total_replans: u32,
    /// Priority of goals raised by REQUEST messages that carry none
    pub request_priority: f64,
    /// Mailbox bound; unbounded when unset
    pub mailbox_capacity: Option<usize>,
    /// Ask the reasoning oracle for desires when beliefs change
    pub oracle_desires: bool,
    /// Resource capacity available to intentions
    pub resources: Resources,
    /// Capabilities actions may require; unrestricted when unset
    pub capabilities: Option<Vec<String>>,
    /// Oracle calls still unanswered after this long count as unavailable
    pub oracle_timeout_ms: u64,
    /// Finished goal trees kept for inspection
    pub finished_goal_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_intentions: 3,
            max_consecutive_replans: 1,
            max_total_replans: 4,
            request_priority: 0.5,
            mailbox_capacity: None,
            oracle_desires: true,
            resources: Resources::new(),
            capabilities: None,
            oracle_timeout_ms: 30_000,
            finished_goal_limit: 64,
        }
    }
}

impl AgentConfig {
    pub fn intention_config(&self) -> IntentionConfig {
        IntentionConfig {
            max_active: self.max_intentions,
        }
    }

    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            max_consecutive_replans: self.max_consecutive_replans,
            max_total_replans: self.max_total_replans,
        }
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    pub fn validate(&self) -> SwarmResult<()> {
        if self.oracle_timeout_ms == 0 {
            return Err(SwarmError::InvalidConfiguration(
                "oracle_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.max_intentions == 0 {
            return Err(SwarmError::InvalidConfiguration(
                "max_intentions must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.request_priority) {
            return Err(SwarmError::InvalidConfiguration(format!(
                "request_priority {} is outside [0, 1]",
                self.request_priority
            )));
        }
        if self.mailbox_capacity == Some(0) {
            return Err(SwarmError::InvalidConfiguration(
                "mailbox_capacity must be at least 1".to_string(),
            ));
        }
        if let Some((name, amount)) = self.resources.iter().find(|(_, amount)| **amount < 0.0) {
            return Err(SwarmError::InvalidConfiguration(format!(
                "resource '{name}' has negative capacity {amount}"
            )));
        }
        Ok(())
    }
}

/// Settings shared by every agent of a swarm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Defaults for agents added without their own configuration
    pub agent: AgentConfig,
    pub contradiction: ContradictionPolicy,
    pub ontology: Ontology,
    /// Maximum number of agents in the swarm
    pub max_agents: usize,
    /// Run agent ticks on separate tasks
    pub parallel_ticks: bool,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            contradiction: ContradictionPolicy::default(),
            ontology: Ontology::default(),
            max_agents: crate::MAX_SWARM_SIZE,
            parallel_ticks: false,
        }
    }
}

impl SwarmConfig {
    /// Loads `path` (TOML, JSON or YAML by extension, optional) overlaid
    /// with `SYNAPSED_BDI_*` environment variables, `__` separating levels.
    pub fn load(path: impl AsRef<Path>) -> SwarmResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let loaded: SwarmConfig = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> SwarmResult<()> {
        if self.max_agents == 0 {
            return Err(SwarmError::InvalidConfiguration(
                "max_agents must be at least 1".to_string(),
            ));
        }
        let tolerance = self.contradiction.numeric_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(SwarmError::InvalidConfiguration(format!(
                "contradiction tolerance {} must be non-negative",
                self.contradiction.numeric_tolerance
            )));
        }
        self.agent.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SwarmConfig::default();
        assert_eq!(config.agent.max_intentions, 3);
        assert_eq!(config.agent.max_consecutive_replans, 1);
        assert_eq!(config.contradiction.numeric_tolerance, 0.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
max_agents = 4
parallel_ticks = true

[agent]
max_intentions = 2
request_priority = 0.7
oracle_timeout_ms = 500

[agent.resources]
budget = 100.0

[contradiction]
numeric_tolerance = 0.25
"#
        )
        .unwrap();

        let config = SwarmConfig::load(file.path()).unwrap();
        assert_eq!(config.max_agents, 4);
        assert!(config.parallel_ticks);
        assert_eq!(config.agent.max_intentions, 2);
        assert_eq!(config.agent.request_priority, 0.7);
        assert_eq!(config.agent.oracle_timeout(), Duration::from_millis(500));
        assert_eq!(config.agent.resources.get("budget"), Some(&100.0));
        assert_eq!(config.contradiction.numeric_tolerance, 0.25);
        // Unset fields keep their defaults
        assert_eq!(config.agent.max_total_replans, 4);
        assert_eq!(config.agent.finished_goal_limit, 64);
        assert_eq!(config.contradiction.opposites.len(), 5);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SwarmConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SwarmConfig::default());
    }

    #[test]
    fn test_validation() {
        let mut config = SwarmConfig::default();
        config.agent.max_intentions = 0;
        assert!(matches!(config.validate(), Err(SwarmError::InvalidConfiguration(_))));

        let mut config = SwarmConfig::default();
        config.agent.request_priority = 1.5;
        assert!(config.validate().is_err());

        let mut config = SwarmConfig::default();
        config.agent.oracle_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = SwarmConfig::default();
        config.contradiction.numeric_tolerance = -0.1;
        assert!(config.validate().is_err());
    }
}
