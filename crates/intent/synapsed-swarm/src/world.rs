//! Shared context passed into every agent tick

use crate::{
    config::SwarmConfig,
    environment::{Environment, NullEnvironment},
};
use std::sync::Arc;
use synapsed_acl::MessageBus;
use synapsed_beliefs::{BeliefRepository, ContradictionPolicy, Ontology};
use synapsed_intent::{Domain, PlanLibrary, PlanRepository, ReasoningOracle};

/// Everything agents share.
///
/// Built by the host and handed to each tick. Agents never share belief
/// stores; the bus is the only channel between them. Cloning is cheap.
#[derive(Clone)]
pub struct World {
    pub bus: MessageBus,
    /// Plans learned by any agent, reused by all
    pub library: Arc<PlanLibrary>,
    pub domain: Arc<Domain>,
    pub oracle: Option<Arc<dyn ReasoningOracle>>,
    pub environment: Arc<dyn Environment>,
    pub belief_repository: Option<Arc<dyn BeliefRepository>>,
    pub plan_repository: Option<Arc<dyn PlanRepository>>,
    pub ontology: Arc<Ontology>,
    pub contradiction: ContradictionPolicy,
}

impl Default for World {
    fn default() -> Self {
        Self {
            bus: MessageBus::new(),
            library: Arc::new(PlanLibrary::new()),
            domain: Arc::new(Domain::new()),
            oracle: None,
            environment: Arc::new(NullEnvironment),
            belief_repository: None,
            plan_repository: None,
            ontology: Arc::new(Ontology::new()),
            contradiction: ContradictionPolicy::default(),
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("bus", &self.bus)
            .field("library_goals", &self.library.len())
            .field("oracle", &self.oracle.is_some())
            .field("belief_repository", &self.belief_repository.is_some())
            .field("plan_repository", &self.plan_repository.is_some())
            .finish()
    }
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// World carrying the swarm's ontology and contradiction policy
    pub fn from_config(config: &SwarmConfig) -> Self {
        Self {
            ontology: Arc::new(config.ontology.clone()),
            contradiction: config.contradiction.clone(),
            ..Self::default()
        }
    }

    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = Arc::new(domain);
        self
    }

    pub fn with_library(mut self, library: Arc<PlanLibrary>) -> Self {
        self.library = library;
        self
    }

    pub fn with_oracle(mut self, oracle: impl ReasoningOracle + 'static) -> Self {
        self.oracle = Some(Arc::new(oracle));
        self
    }

    pub fn with_shared_oracle(mut self, oracle: Arc<dyn ReasoningOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_belief_repository(mut self, repository: Arc<dyn BeliefRepository>) -> Self {
        self.belief_repository = Some(repository);
        self
    }

    pub fn with_plan_repository(mut self, repository: Arc<dyn PlanRepository>) -> Self {
        self.plan_repository = Some(repository);
        self
    }

    pub fn with_ontology(mut self, ontology: Ontology) -> Self {
        self.ontology = Arc::new(ontology);
        self
    }

    pub fn with_contradiction_policy(mut self, policy: ContradictionPolicy) -> Self {
        self.contradiction = policy;
        self
    }

    pub fn with_bus(mut self, bus: MessageBus) -> Self {
        self.bus = bus;
        self
    }
}
