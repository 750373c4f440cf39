//! BDI agent and its reasoning cycle
//!
//! One [`BdiAgent::tick`] runs the full cycle:
//!
//! ```text
//! perceive ─► drain mailbox ─► revise beliefs ─► reactive rules
//!     ─► oracle results ─► desires ─► intentions ─► plan ─► execute
//!     ─► communicate ─► persist
//! ```
//!
//! Everything inside a tick is synchronous except perception, oracle calls
//! (spawned, consumed on a later tick) and repository writes.

use crate::{
    config::AgentConfig,
    error::SwarmResult,
    oracle_calls::{OracleCalls, OracleOutcome, OracleRequest},
    strategy::{AgentKind, Capabilities, ReactiveRule},
    world::World,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use synapsed_acl::{AgentId, FifoMailbox, Message, MessageContent, Performative};
use synapsed_beliefs::{
    Belief, BeliefChange, BeliefRepository, BeliefSource, BeliefStore, ConflictResolver,
    ConsistencyChecker, DomainRule, WorldState,
};
use synapsed_intent::{
    goal_key, Desire, ExecutionEngine, Goal, GoalId, GoalSource, GoalStatus, GoalTree,
    HtnPlanner, IntentError, IntentionId, IntentionManager, IntentionStatus, NoReplanner,
    OracleError, Plan, Replanner,
};
use tracing::{debug, info, trace, warn};

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub agent: AgentId,
    pub tick: u64,
    pub percepts: usize,
    pub messages_handled: usize,
    pub conflicts_detected: usize,
    pub rules_fired: usize,
    pub goals_promoted: usize,
    pub intentions_adopted: usize,
    pub intentions_dropped: usize,
    pub plans_adopted: usize,
    pub steps_executed: usize,
    pub replans: u32,
    pub goals_achieved: usize,
    pub goals_failed: usize,
    pub messages_sent: usize,
    /// Oracle calls that failed; retried on a later tick
    pub oracle_errors: usize,
    /// Recoverable problems, logged and carried here
    pub errors: Vec<String>,
}

impl TickReport {
    fn new(agent: AgentId, tick: u64) -> Self {
        Self {
            agent,
            tick,
            ..Self::default()
        }
    }
}

/// An agent holding beliefs, desires and intentions
pub struct BdiAgent {
    id: AgentId,
    config: AgentConfig,
    beliefs: BeliefStore,
    /// Percepts and message content awaiting revision
    staged: Vec<Belief>,
    goals: GoalTree,
    intentions: IntentionManager,
    plans: HashMap<IntentionId, Plan>,
    desires: Vec<Desire>,
    /// Latest desires proposed by the oracle
    oracle_desires: Vec<Desire>,
    /// State the last desire request was made from
    desires_basis: Option<WorldState>,
    rules: Vec<ReactiveRule>,
    /// Rules whose trigger held on the previous tick
    latched: HashSet<String>,
    domain_rules: Vec<Arc<dyn DomainRule>>,
    planner: bool,
    oracle_calls: OracleCalls,
    /// Request goals and every message asking for them
    requests: HashMap<GoalId, Vec<Message>>,
    decomposed: HashSet<GoalId>,
    outbox: Vec<Message>,
    ticks: u64,
}

impl std::fmt::Debug for BdiAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BdiAgent")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("beliefs", &self.beliefs.len())
            .field("goals", &self.goals.len())
            .field("intentions", &self.intentions.active_count())
            .field("ticks", &self.ticks)
            .finish()
    }
}

impl BdiAgent {
    pub fn builder(id: impl Into<AgentId>) -> BdiAgentBuilder {
        BdiAgentBuilder::new(id.into())
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn beliefs(&self) -> &BeliefStore {
        &self.beliefs
    }

    pub fn goals(&self) -> &GoalTree {
        &self.goals
    }

    pub fn intentions(&self) -> &IntentionManager {
        &self.intentions
    }

    /// The plan an intention is executing
    pub fn plan(&self, intention: IntentionId) -> Option<&Plan> {
        self.plans.get(&intention)
    }

    pub fn desires(&self) -> impl Iterator<Item = &Desire> {
        self.desires.iter().chain(&self.oracle_desires)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            reactive_rules: !self.rules.is_empty(),
            planner: self.planner,
            domain_goals: !self.desires.is_empty(),
        }
    }

    pub fn kind(&self) -> AgentKind {
        self.capabilities().kind()
    }

    pub fn add_desire(&mut self, desire: Desire) {
        self.desires.push(desire);
    }

    pub fn add_rule(&mut self, rule: ReactiveRule) {
        self.rules.push(rule);
    }

    /// Queues a belief for the next revision; invalid ones are dropped there
    pub fn stage(&mut self, belief: Belief) {
        self.staged.push(belief);
    }

    /// Adopts a goal handed over by the host
    pub fn inject_goal(&mut self, goal: Goal) -> GoalId {
        self.goals.insert(goal)
    }

    /// Registers the agent's mailbox on the world's bus
    pub fn join(&self, world: &World) -> bool {
        match self.config.mailbox_capacity {
            Some(capacity) => world.bus.register_mailbox(
                self.id.clone(),
                Arc::new(FifoMailbox::bounded(self.id.clone(), capacity)),
            ),
            None => world.bus.register(self.id.clone()),
        }
    }

    /// Loads persisted beliefs into the store
    pub async fn restore_beliefs(&mut self, repository: &dyn BeliefRepository) -> SwarmResult<usize> {
        let beliefs = repository.load_all(self.id.as_str()).await?;
        let count = beliefs.len();
        for belief in beliefs {
            self.beliefs.restore(belief)?;
        }
        // Already persisted
        self.beliefs.take_changes();
        debug!(agent = %self.id, count, "beliefs restored");
        Ok(count)
    }

    /// Runs one reasoning cycle against the shared world
    pub async fn tick(&mut self, world: &World) -> SwarmResult<TickReport> {
        self.ticks += 1;
        let mut report = TickReport::new(self.id.clone(), self.ticks);
        trace!(agent = %self.id, tick = self.ticks, "tick started");

        let percepts = world.environment.perceive(&self.id, self.ticks).await;
        report.percepts = percepts.len();
        self.staged.extend(percepts);

        let inbox = world.bus.drain(&self.id)?;
        report.messages_handled = inbox.len();
        for message in inbox {
            self.handle_message(message);
        }

        self.revise(world, &mut report)?;
        self.fire_rules(&mut report)?;

        // Let calls spawned on earlier ticks make progress
        tokio::task::yield_now().await;
        self.absorb_oracle_outcomes(world, &mut report)?;

        let state = self.deliberate(world, &mut report)?;
        self.plan_intentions(world, &state, &mut report)?;
        self.execute_intentions(world, &mut report).await?;

        self.answer_requests();
        self.prune_goals();
        self.flush_outbox(world, &mut report);
        self.persist(world, &mut report).await;

        debug!(
            agent = %self.id,
            tick = self.ticks,
            intentions = self.intentions.active_count(),
            achieved = report.goals_achieved,
            failed = report.goals_failed,
            "tick finished"
        );
        Ok(report)
    }

    fn communicated(key: String, value: impl Into<Value>, certainty: f64) -> Belief {
        Belief::new(key, value, certainty).from_source(BeliefSource::Communication)
    }

    fn handle_message(&mut self, message: Message) {
        let sender = message.sender.clone();
        debug!(agent = %self.id, from = %sender, performative = %message.performative, "message received");
        self.stage(Self::communicated(format!("received_message_from_{sender}"), true, 1.0));

        match message.performative {
            Performative::Request => {
                let description = format!("Respond to request: {}", message.content);
                if let Some(existing) = self.goals.find_open(&description) {
                    debug!(agent = %self.id, %description, "request joined an open goal");
                    self.requests.entry(existing).or_default().push(message);
                    return;
                }
                let priority = message.derived_priority(self.config.request_priority);
                let goal = Goal::new(goal_key(&message.content.to_string()), description, priority)
                    .with_source(GoalSource::Request {
                        from: sender.to_string(),
                    });
                let goal_id = self.goals.insert(goal);
                self.requests.insert(goal_id, vec![message]);
            }
            Performative::Inform => match &message.content {
                MessageContent::Text(text) => {
                    let belief = Self::communicated(format!("info_from_{sender}"), text.clone(), 1.0);
                    self.stage(belief);
                }
                MessageContent::Fact { key, value, certainty } => {
                    let belief = Self::communicated(key.clone(), value.clone(), certainty.unwrap_or(1.0));
                    self.stage(belief);
                }
                MessageContent::Json(Value::Object(fields)) => {
                    for (key, value) in fields {
                        let belief = Self::communicated(key.clone(), value.clone(), 1.0);
                        self.stage(belief);
                    }
                }
                MessageContent::Json(value) => {
                    let belief = Self::communicated(format!("info_from_{sender}"), value.clone(), 1.0);
                    self.stage(belief);
                }
            },
            Performative::Query => {
                let key = match &message.content {
                    MessageContent::Fact { key, .. } => key.clone(),
                    other => other.to_string(),
                };
                let reply = match self.beliefs.get(&key) {
                    Some(belief) => message.reply(
                        Performative::Inform,
                        MessageContent::Fact {
                            key: key.clone(),
                            value: belief.value.clone(),
                            certainty: Some(belief.certainty),
                        },
                    ),
                    None => message.reply(Performative::Reject, format!("unknown: {key}")),
                };
                self.outbox.push(reply);
            }
            Performative::Propose => {
                let belief = Self::communicated(format!("proposal_from_{sender}"), message.content.to_value(), 1.0);
                self.stage(belief);
                let answer = if self.intentions.has_capacity() {
                    Performative::Accept
                } else {
                    Performative::Reject
                };
                self.outbox.push(message.reply(answer, message.content.clone()));
            }
            Performative::Accept => {
                let belief = Self::communicated(format!("accepted_by_{sender}"), message.content.to_value(), 1.0);
                self.stage(belief);
            }
            Performative::Reject => {
                let belief = Self::communicated(format!("rejected_by_{sender}"), message.content.to_value(), 1.0);
                self.stage(belief);
            }
        }
    }

    /// Runs staged beliefs and the current store through conflict resolution.
    ///
    /// A staged belief that fails validation is dropped and reported; the
    /// rest of the batch is still revised.
    fn revise(&mut self, world: &World, report: &mut TickReport) -> SwarmResult<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let mut candidates = self.beliefs.snapshot();
        for belief in self.staged.drain(..) {
            match belief.validate() {
                Ok(()) => candidates.push(belief),
                Err(e) => {
                    warn!(agent = %self.id, key = %belief.key, error = %e, "rejected staged belief");
                    report.errors.push(e.to_string());
                }
            }
        }

        let mut checker =
            ConsistencyChecker::new(world.ontology.clone()).with_policy(world.contradiction.clone());
        for rule in &self.domain_rules {
            checker.add_rule(rule.clone());
        }
        let conflicts = checker.detect_conflicts(&candidates);
        report.conflicts_detected = conflicts.len();

        let resolution = ConflictResolver::new(world.ontology.clone()).resolve_conflicts(candidates, &conflicts);
        if !conflicts.is_empty() {
            debug!(
                agent = %self.id,
                conflicts = conflicts.len(),
                dropped = resolution.dropped().len(),
                "beliefs revised"
            );
        }
        self.beliefs.commit(resolution.retained)?;
        Ok(())
    }

    fn fire_rules(&mut self, report: &mut TickReport) -> SwarmResult<()> {
        let state = self.beliefs.state();
        for rule in &self.rules {
            if !rule.is_triggered(&state) {
                self.latched.remove(&rule.name);
                continue;
            }
            if !self.latched.insert(rule.name.clone()) {
                continue;
            }
            info!(agent = %self.id, rule = %rule.name, "reactive rule fired");
            report.rules_fired += 1;
            for (key, value) in &rule.sets {
                let belief = Belief::new(key.clone(), value.clone(), 1.0).from_source(BeliefSource::Inference);
                self.beliefs.upsert_belief(belief)?;
            }
            if let Some(template) = &rule.raises {
                if self.goals.find_open(&template.description).is_none() {
                    let goal = template
                        .instantiate(rule.priority)
                        .with_source(GoalSource::Reactive(rule.name.clone()));
                    self.goals.insert(goal);
                }
            }
        }
        Ok(())
    }

    fn absorb_oracle_outcomes(&mut self, world: &World, report: &mut TickReport) -> SwarmResult<()> {
        for outcome in self.oracle_calls.collect() {
            match outcome {
                OracleOutcome::Desires(Ok(desires)) => {
                    debug!(agent = %self.id, count = desires.len(), "oracle desires received");
                    self.oracle_desires = desires;
                }
                OracleOutcome::Desires(Err(e)) => {
                    warn!(agent = %self.id, error = %e, "oracle failed to generate desires");
                    report.oracle_errors += 1;
                    self.desires_basis = None;
                }
                OracleOutcome::Steps { goal, result } => {
                    let Some(intention) = self.awaiting_plan(goal) else {
                        continue;
                    };
                    let attempt = result
                        .map_err(IntentError::from)
                        .and_then(|candidates| {
                            let target = self.goals.get(goal).ok_or(IntentError::GoalNotFound(goal))?;
                            Plan::from_descriptions(target, &candidates, Some(&world.domain))
                        });
                    match attempt {
                        Ok(plan) => {
                            info!(agent = %self.id, goal = %plan.goal_key, steps = plan.steps().len(), "plan proposed by oracle");
                            self.adopt_plan(intention, plan, report)?;
                        }
                        Err(IntentError::Oracle(OracleError::Unavailable(reason))) => {
                            warn!(agent = %self.id, goal = %goal, %reason, "oracle unavailable for planning");
                            report.oracle_errors += 1;
                        }
                        Err(e) => {
                            debug!(agent = %self.id, goal = %goal, error = %e, "oracle steps unusable");
                            self.decompose_or_fail(world, intention, goal, report)?;
                        }
                    }
                }
                OracleOutcome::Decomposition { goal, result } => {
                    let Some(intention) = self.awaiting_plan(goal) else {
                        continue;
                    };
                    let attempt = result
                        .map_err(IntentError::from)
                        .and_then(|candidates| self.goals.decompose(goal, &candidates));
                    match attempt {
                        Ok(subgoals) => {
                            info!(agent = %self.id, goal = %goal, subgoals = subgoals.len(), "goal decomposed by oracle");
                            self.intentions.suspend(intention)?;
                        }
                        Err(IntentError::Oracle(OracleError::Unavailable(reason))) => {
                            warn!(agent = %self.id, goal = %goal, %reason, "oracle unavailable for decomposition");
                            report.oracle_errors += 1;
                            self.decomposed.remove(&goal);
                        }
                        Err(e) => {
                            warn!(agent = %self.id, goal = %goal, error = %e, "no usable decomposition");
                            self.fail_intention(intention, report)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Live intention for `goal` that has no plan yet
    fn awaiting_plan(&self, goal: GoalId) -> Option<IntentionId> {
        self.intentions
            .for_goal(goal)
            .filter(|i| i.status() == IntentionStatus::Active && !self.plans.contains_key(&i.id))
            .map(|i| i.id)
    }

    fn decompose_or_fail(
        &mut self,
        world: &World,
        intention: IntentionId,
        goal: GoalId,
        report: &mut TickReport,
    ) -> SwarmResult<()> {
        let description = self.goals.get(goal).map(|g| g.description.clone());
        match (&world.oracle, description) {
            (Some(oracle), Some(description)) if !self.decomposed.contains(&goal) => {
                self.decomposed.insert(goal);
                self.oracle_calls.request_decomposition(oracle.clone(), goal, description);
                Ok(())
            }
            _ => self.fail_intention(intention, report),
        }
    }

    /// Promotes desires and settles which intentions the agent holds
    fn deliberate(&mut self, world: &World, report: &mut TickReport) -> SwarmResult<WorldState> {
        let state = self.beliefs.state();

        if self.config.oracle_desires && !self.oracle_calls.is_pending(&OracleRequest::Desires) {
            if let Some(oracle) = &world.oracle {
                if self.desires_basis.as_ref() != Some(&state) {
                    self.oracle_calls.request_desires(oracle.clone(), self.beliefs.snapshot());
                    self.desires_basis = Some(state.clone());
                }
            }
        }

        let desires: Vec<Desire> = self.desires().cloned().collect();
        for desire in &desires {
            if desire.is_complete(&state) {
                if let Some(goal) = self.goals.goal_for_desire(desire) {
                    if self.goals.get(goal).is_some_and(|g| g.status() == GoalStatus::Active) {
                        info!(agent = %self.id, desire = %desire.id, "desire fulfilled");
                        self.goals.achieve(goal)?;
                    }
                }
            } else if self.goals.promote_desire(desire, &state).is_some() {
                report.goals_promoted += 1;
            }
        }

        let live: HashMap<IntentionId, GoalId> =
            self.intentions.live().iter().map(|i| (i.id, i.goal_id)).collect();
        for (id, status) in self.intentions.reconsider(&self.goals, &state) {
            self.plans.remove(&id);
            if let Some(goal) = live.get(&id) {
                self.oracle_calls.cancel_for_goal(*goal);
            }
            match status {
                IntentionStatus::Dropped => report.intentions_dropped += 1,
                IntentionStatus::Completed => report.goals_achieved += 1,
                IntentionStatus::Failed => report.goals_failed += 1,
                _ => {}
            }
        }
        self.review_suspended(report)?;

        let adopted = self.intentions.select_intentions(&desires, &mut self.goals, &state)?;
        report.intentions_adopted = adopted.len();
        Ok(state)
    }

    /// Settles parents waiting on subgoals: a failed subgoal fails the
    /// parent, and a parent with nothing left open is resumed
    fn review_suspended(&mut self, report: &mut TickReport) -> SwarmResult<()> {
        let suspended: Vec<(IntentionId, GoalId)> = self
            .intentions
            .live()
            .iter()
            .filter(|i| i.status() == IntentionStatus::Suspended)
            .map(|i| (i.id, i.goal_id))
            .collect();

        for (intention, goal_id) in suspended {
            let children = self.goals.children(goal_id);
            let status = |c: &GoalId| self.goals.get(*c).map(|g| g.status());
            let failed = children.iter().any(|c| status(c) == Some(GoalStatus::Failed));
            let waiting = children
                .iter()
                .any(|c| matches!(status(c), Some(GoalStatus::Pending | GoalStatus::Active)));
            if failed {
                warn!(agent = %self.id, goal = %goal_id, "subgoal failed");
                self.fail_intention(intention, report)?;
            } else if !waiting && self.intentions.resume(intention)? {
                debug!(agent = %self.id, goal = %goal_id, "intention resumed");
            }
        }
        Ok(())
    }

    fn plan_intentions(&mut self, world: &World, state: &WorldState, report: &mut TickReport) -> SwarmResult<()> {
        let planner = HtnPlanner::new(world.domain.clone());
        let unplanned: Vec<(IntentionId, GoalId)> = self
            .intentions
            .active()
            .filter(|i| !self.plans.contains_key(&i.id))
            .map(|i| (i.id, i.goal_id))
            .collect();

        for (intention, goal_id) in unplanned {
            let Some(goal) = self.goals.get(goal_id).cloned() else {
                continue;
            };
            if goal.is_satisfied(state) {
                debug!(agent = %self.id, goal = %goal.name, "goal already satisfied");
                self.intentions.complete(intention, &mut self.goals)?;
                report.goals_achieved += 1;
                continue;
            }
            if !goal.children.is_empty() {
                let child_failed = goal
                    .children
                    .iter()
                    .any(|c| self.goals.get(*c).is_some_and(|g| g.status() == GoalStatus::Failed));
                if child_failed {
                    warn!(agent = %self.id, goal = %goal.name, "subgoal failed");
                    self.fail_intention(intention, report)?;
                } else {
                    // Frees the slot for the subgoals
                    self.intentions.suspend(intention)?;
                }
                continue;
            }
            if self.oracle_calls.is_pending_for_goal(goal_id) {
                continue;
            }

            if let Some(plan) = self.find_plan(world, &planner, &goal, state) {
                self.adopt_plan(intention, plan, report)?;
                continue;
            }
            match &world.oracle {
                Some(oracle) => {
                    debug!(agent = %self.id, goal = %goal.name, "asking oracle for steps");
                    self.oracle_calls
                        .request_steps(oracle.clone(), goal_id, goal.description.clone(), state.clone());
                }
                None => {
                    warn!(agent = %self.id, goal = %goal.name, "no plan for goal");
                    self.fail_intention(intention, report)?;
                }
            }
        }
        Ok(())
    }

    /// Library first, re-validated against `state`, then the HTN planner
    fn find_plan(&self, world: &World, planner: &HtnPlanner, goal: &Goal, state: &WorldState) -> Option<Plan> {
        let reusable = world
            .library
            .select_plan(&goal.name, &self.beliefs.keys())
            .ok()
            .filter(|plan| plan.preconditions_hold(state))
            .or_else(|| world.library.select_for_state(&goal.name, state).ok());
        if let Some(template) = reusable {
            debug!(agent = %self.id, goal = %goal.name, plan = %template.id, "plan reused from library");
            return Some(template.instantiate(goal.id));
        }
        if !self.planner {
            return None;
        }
        match planner.plan_for(goal, state) {
            Ok(plan) => Some(plan),
            Err(e) => {
                trace!(agent = %self.id, goal = %goal.name, error = %e, "htn planning found nothing");
                None
            }
        }
    }

    fn adopt_plan(&mut self, intention: IntentionId, plan: Plan, report: &mut TickReport) -> SwarmResult<()> {
        self.intentions.attach_plan(intention, plan.id)?;
        debug!(agent = %self.id, intention = %intention, plan = %plan.id, "plan attached");
        self.plans.insert(intention, plan);
        report.plans_adopted += 1;
        Ok(())
    }

    fn fail_intention(&mut self, intention: IntentionId, report: &mut TickReport) -> SwarmResult<()> {
        if let Some(goal) = self.intentions.get(intention).map(|i| i.goal_id) {
            self.oracle_calls.cancel_for_goal(goal);
        }
        self.plans.remove(&intention);
        self.intentions.fail(intention, &mut self.goals)?;
        report.goals_failed += 1;
        Ok(())
    }

    async fn execute_intentions(&mut self, world: &World, report: &mut TickReport) -> SwarmResult<()> {
        let mut engine = ExecutionEngine::new(world.domain.clone()).with_config(self.config.execution_config());
        if let Some(capabilities) = &self.config.capabilities {
            engine = engine.with_capabilities(capabilities.iter().cloned());
        }
        let planner = HtnPlanner::new(world.domain.clone());
        let replanner: &dyn Replanner = if self.planner { &planner } else { &NoReplanner };

        let ready: Vec<(IntentionId, GoalId)> = self
            .intentions
            .active()
            .filter(|i| self.plans.contains_key(&i.id))
            .map(|i| (i.id, i.goal_id))
            .collect();

        for (intention, goal_id) in ready {
            let Some(goal) = self.goals.get(goal_id).cloned() else {
                continue;
            };
            let Some(plan) = self.plans.get_mut(&intention) else {
                continue;
            };
            let replans_before = plan.replans;
            let result = engine.execute_plan(plan, &goal, &mut self.beliefs, replanner);
            report.replans += plan.replans - replans_before;
            match result {
                Ok(outcome) => {
                    report.steps_executed += outcome.steps_executed;
                    if !outcome.completed {
                        continue;
                    }
                    info!(agent = %self.id, goal = %goal.name, steps = outcome.steps_executed, "goal achieved");
                    let finished = self.plans.remove(&intention);
                    self.intentions.complete(intention, &mut self.goals)?;
                    report.goals_achieved += 1;
                    if let Some(plan) = finished {
                        self.learn(world, plan).await;
                    }
                }
                Err(e) => {
                    warn!(agent = %self.id, goal = %goal.name, error = %e, "goal failed");
                    report.errors.push(e.to_string());
                    self.fail_intention(intention, report)?;
                }
            }
        }
        Ok(())
    }

    /// Shares a completed plan as a library template
    async fn learn(&self, world: &World, plan: Plan) {
        let template = plan.instantiate(plan.goal_id).with_symbolic();
        let known = world
            .library
            .plans_for(&template.goal_key)
            .iter()
            .any(|p| p.to_symbolic() == template.to_symbolic());
        if known {
            return;
        }
        if let Some(repository) = &world.plan_repository {
            if let Err(e) = repository.save(&template).await {
                warn!(agent = %self.id, goal = %template.goal_key, error = %e, "failed to persist plan");
            }
        }
        debug!(agent = %self.id, goal = %template.goal_key, "plan learned");
        world.library.add_plan(template);
    }

    /// Replies to requesters whose goals reached a terminal state
    fn answer_requests(&mut self) {
        let finished: Vec<GoalId> = self
            .requests
            .keys()
            .filter(|id| self.goals.get(**id).map_or(true, |g| !g.is_open()))
            .copied()
            .collect();
        for id in finished {
            let Some(requesters) = self.requests.remove(&id) else {
                continue;
            };
            let achieved = self.goals.get(id).is_some_and(|g| g.status() == GoalStatus::Achieved);
            for request in requesters {
                let reply = if achieved {
                    request.reply(Performative::Inform, format!("done: {}", request.content))
                } else {
                    request.reply(Performative::Reject, format!("failed: {}", request.content))
                };
                self.outbox.push(reply);
            }
        }
    }

    /// Forgets the oldest finished goal trees past the configured limit
    fn prune_goals(&mut self) {
        let intentions = &self.intentions;
        let requests = &self.requests;
        let pruned = self.goals.prune_finished(self.config.finished_goal_limit, |id| {
            intentions.for_goal(id).is_some() || requests.contains_key(&id)
        });
        for id in &pruned {
            self.decomposed.remove(id);
        }
        if !pruned.is_empty() {
            trace!(agent = %self.id, pruned = pruned.len(), "finished goals pruned");
        }
    }

    fn flush_outbox(&mut self, world: &World, report: &mut TickReport) {
        for message in std::mem::take(&mut self.outbox) {
            let receiver = message.receiver.clone();
            match world.bus.send(message) {
                Ok(_) => report.messages_sent += 1,
                Err(e) => {
                    warn!(agent = %self.id, to = %receiver, error = %e, "message not delivered");
                    report.errors.push(e.to_string());
                }
            }
        }
    }

    /// Mirrors this tick's belief changes into the repository
    async fn persist(&mut self, world: &World, report: &mut TickReport) {
        let changes = self.beliefs.take_changes();
        let Some(repository) = &world.belief_repository else {
            return;
        };
        let mut touched = BTreeSet::new();
        for change in changes {
            match change {
                BeliefChange::Upserted(key) | BeliefChange::Removed(key) => {
                    touched.insert(key);
                }
            }
        }
        for key in touched {
            let result = match self.beliefs.get(&key) {
                Some(belief) => repository.save(self.id.as_str(), belief).await,
                None => repository.delete(self.id.as_str(), &key).await,
            };
            if let Err(e) = result {
                warn!(agent = %self.id, %key, error = %e, "failed to persist belief");
                report.errors.push(e.to_string());
            }
        }
    }
}

/// Assembles a [`BdiAgent`]
pub struct BdiAgentBuilder {
    id: AgentId,
    config: AgentConfig,
    desires: Vec<Desire>,
    rules: Vec<ReactiveRule>,
    domain_rules: Vec<Arc<dyn DomainRule>>,
    beliefs: Vec<Belief>,
    planner: bool,
}

impl BdiAgentBuilder {
    fn new(id: AgentId) -> Self {
        Self {
            id,
            config: AgentConfig::default(),
            desires: Vec::new(),
            rules: Vec::new(),
            domain_rules: Vec::new(),
            beliefs: Vec::new(),
            planner: true,
        }
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn desire(mut self, desire: Desire) -> Self {
        self.desires.push(desire);
        self
    }

    pub fn rule(mut self, rule: ReactiveRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn domain_rule(mut self, rule: impl DomainRule + 'static) -> Self {
        self.domain_rules.push(Arc::new(rule));
        self
    }

    /// Initial belief, revised on the first tick
    pub fn belief(mut self, belief: Belief) -> Self {
        self.beliefs.push(belief);
        self
    }

    /// Reactive-only agents plan from the library and the oracle, never HTN
    pub fn without_planner(mut self) -> Self {
        self.planner = false;
        self
    }

    pub fn build(self) -> SwarmResult<BdiAgent> {
        self.config.validate()?;
        let intentions = IntentionManager::new(self.config.intention_config(), self.config.resources.clone());
        Ok(BdiAgent {
            id: self.id,
            beliefs: BeliefStore::new(),
            staged: self.beliefs,
            goals: GoalTree::new(),
            intentions,
            plans: HashMap::new(),
            desires: self.desires,
            oracle_desires: Vec::new(),
            desires_basis: None,
            rules: self.rules,
            latched: HashSet::new(),
            domain_rules: self.domain_rules,
            planner: self.planner,
            oracle_calls: OracleCalls::new(self.config.oracle_timeout()),
            requests: HashMap::new(),
            decomposed: HashSet::new(),
            outbox: Vec::new(),
            ticks: 0,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapsed_acl::MessageBus;
    use synapsed_beliefs::ExclusivePair;
    use synapsed_intent::{Action, Condition, Domain, Method};

    fn world() -> World {
        World::new().with_domain(
            Domain::new()
                .with_action(Action::new("sound_alarm").effect("alarm", "sounding"))
                .with_action(Action::new("evacuate").effect("building", "empty"))
                .with_method(Method::new("evacuation", "ensure_safety").then("sound_alarm").then("evacuate")),
        )
    }

    fn joined(agent: BdiAgent, world: &World) -> BdiAgent {
        assert!(agent.join(world));
        agent
    }

    #[tokio::test]
    async fn test_reactive_rule_fires_once_per_rising_edge() {
        let world = world();
        let mut agent = joined(
            BdiAgent::builder("guard")
                .rule(
                    ReactiveRule::new("danger")
                        .when(Condition::equals("danger_level", "high"))
                        .sets("alert", true)
                        .raises("ensure_safety", "Ensure safety", 1.0),
                )
                .build()
                .unwrap(),
            &world,
        );
        assert_eq!(agent.kind(), AgentKind::Hybrid);

        agent.stage(Belief::new("danger_level", "high", 1.0));
        let first = agent.tick(&world).await.unwrap();
        assert_eq!(first.rules_fired, 1);
        assert_eq!(first.goals_achieved, 1);
        assert_eq!(agent.beliefs().value("building"), Some(&Value::from("empty")));

        let second = agent.tick(&world).await.unwrap();
        assert_eq!(second.rules_fired, 0);

        agent.stage(Belief::new("danger_level", "low", 1.0));
        agent.tick(&world).await.unwrap();
        agent.stage(Belief::new("danger_level", "high", 1.0));
        assert_eq!(agent.tick(&world).await.unwrap().rules_fired, 1);
    }

    #[tokio::test]
    async fn test_domain_rule_resolves_staged_conflict() {
        let world = World::new();
        let mut agent = joined(
            BdiAgent::builder("door")
                .domain_rule(ExclusivePair::new("open_or_locked", ("door_open", true), ("door_locked", true)))
                .build()
                .unwrap(),
            &world,
        );

        agent.stage(Belief::new("door_open", true, 0.9));
        agent.stage(Belief::new("door_locked", true, 0.6));
        let report = agent.tick(&world).await.unwrap();

        assert_eq!(report.conflicts_detected, 1);
        assert!(agent.beliefs().contains("door_open") != agent.beliefs().contains("door_locked"));
    }

    #[tokio::test]
    async fn test_query_and_propose_replies() {
        let world = World::new().with_bus(MessageBus::new());
        let config = AgentConfig {
            max_intentions: 1,
            ..AgentConfig::default()
        };
        let mut agent = joined(
            BdiAgent::builder("y")
                .config(config)
                .belief(Belief::new("budget", 500, 1.0))
                .build()
                .unwrap(),
            &world,
        );
        let asker = AgentId::named("x");
        world.bus.register(asker.clone());
        agent.tick(&world).await.unwrap();

        world.bus.tell(&asker, agent.id(), Performative::Query, "budget").unwrap();
        world.bus.tell(&asker, agent.id(), Performative::Query, "headcount").unwrap();
        world.bus.tell(&asker, agent.id(), Performative::Propose, "share the audit").unwrap();
        let report = agent.tick(&world).await.unwrap();
        assert_eq!(report.messages_handled, 3);
        assert_eq!(report.messages_sent, 3);

        let replies = world.bus.drain(&asker).unwrap();
        let performatives: Vec<Performative> = replies.iter().map(|m| m.performative).collect();
        assert_eq!(
            performatives,
            vec![Performative::Inform, Performative::Reject, Performative::Accept]
        );
        assert_eq!(replies[0].content.to_value(), Value::from(500));
        assert!(agent.beliefs().contains("proposal_from_x"));
        assert!(agent.beliefs().contains("received_message_from_x"));
    }

    #[tokio::test]
    async fn test_invalid_informed_certainty_is_rejected() {
        let world = World::new();
        let mut agent = joined(BdiAgent::builder("y").build().unwrap(), &world);
        let sender = AgentId::named("x");
        world.bus.register(sender.clone());

        let content = MessageContent::Fact {
            key: "temperature".to_string(),
            value: Value::from(21),
            certainty: Some(1.5),
        };
        world.bus.tell(&sender, agent.id(), Performative::Inform, content).unwrap();
        let report = agent.tick(&world).await.unwrap();

        assert_eq!(report.errors.len(), 1);
        assert!(!agent.beliefs().contains("temperature"));
        assert!(agent.beliefs().contains("received_message_from_x"));
    }

    #[tokio::test]
    async fn test_invalid_staged_belief_does_not_block_revision() {
        let world = World::new();
        let mut agent = joined(
            BdiAgent::builder("y")
                .belief(Belief::new("budget", 500, 1.0))
                .build()
                .unwrap(),
            &world,
        );
        agent.stage(Belief::new("humidity", 40, -0.2));

        let report = agent.tick(&world).await.unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(agent.beliefs().value("budget"), Some(&Value::from(500)));
        assert!(!agent.beliefs().contains("humidity"));
    }

    #[tokio::test]
    async fn test_goal_without_any_plan_fails() {
        let world = World::new();
        let mut agent = joined(BdiAgent::builder("solo").build().unwrap(), &world);
        let goal = agent.inject_goal(Goal::new("fly", "Fly to the moon", 0.5));

        let report = agent.tick(&world).await.unwrap();
        assert_eq!(report.intentions_adopted, 1);
        assert_eq!(report.goals_failed, 1);
        assert_eq!(agent.goals().get(goal).unwrap().status(), GoalStatus::Failed);
    }

    #[test]
    fn test_builder_validates_config() {
        let config = AgentConfig {
            max_intentions: 0,
            ..AgentConfig::default()
        };
        assert!(BdiAgent::builder("a").config(config).build().is_err());
    }
}
