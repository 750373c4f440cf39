//! End-to-end agent scenarios driven through the swarm

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use synapsed_acl::{AgentId, MessageContent, Performative};
use synapsed_beliefs::{Belief, BeliefRepository, InMemoryBeliefRepository, WorldState};
use synapsed_intent::{
    Action, Condition, Decision, Desire, Domain, Goal, GoalStatus, Method, OracleError,
    OracleResult, ReasoningOracle, RuleOracle,
};
use synapsed_swarm::{AgentConfig, BdiAgent, ScriptedEnvironment, Swarm, SwarmConfig, World};

/// Gives spawned oracle calls a chance to finish between ticks
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

fn beliefs_by_key(agent: &BdiAgent) -> Vec<Belief> {
    let mut beliefs = agent.beliefs().snapshot();
    beliefs.sort_by(|a, b| a.key.cmp(&b.key));
    beliefs
}

struct UnavailableOracle;

#[async_trait]
impl ReasoningOracle for UnavailableOracle {
    async fn generate_desires(&self, _beliefs: &[Belief]) -> OracleResult<Vec<Desire>> {
        Err(OracleError::Unavailable("offline".to_string()))
    }

    async fn decompose_goal(&self, _description: &str) -> OracleResult<Vec<Value>> {
        Err(OracleError::Unavailable("offline".to_string()))
    }

    async fn plan_steps(&self, _goal_description: &str, _state: &WorldState) -> OracleResult<Vec<Value>> {
        Err(OracleError::Unavailable("offline".to_string()))
    }

    async fn explain(&self, _decision: &Decision) -> OracleResult<String> {
        Err(OracleError::Unavailable("offline".to_string()))
    }
}

/// Accepts every call and never answers
struct SilentOracle;

#[async_trait]
impl ReasoningOracle for SilentOracle {
    async fn generate_desires(&self, _beliefs: &[Belief]) -> OracleResult<Vec<Desire>> {
        futures::future::pending().await
    }

    async fn decompose_goal(&self, _description: &str) -> OracleResult<Vec<Value>> {
        futures::future::pending().await
    }

    async fn plan_steps(&self, _goal_description: &str, _state: &WorldState) -> OracleResult<Vec<Value>> {
        futures::future::pending().await
    }

    async fn explain(&self, _decision: &Decision) -> OracleResult<String> {
        futures::future::pending().await
    }
}

fn offsite_oracle() -> RuleOracle {
    RuleOracle::new()
        .with_decomposition("Organize the offsite", ["Book venue", "Send invites"])
        .with_steps("Book venue", ["call venue"])
        .with_steps("Send invites", ["draft invite", "mail invite"])
}

fn profit_desire() -> Desire {
    Desire::new("increase_profit", "Increase profit", 0.9)
        .activates_when(Condition::less_than("profit_margin", 0.2))
        .pursues("reduce_costs", "Reduce operating costs")
}

#[tokio::test]
async fn test_low_margin_leads_to_cost_reduction_intention() {
    let oracle = RuleOracle::new().with_steps("Reduce operating costs", ["audit expenses", "cut spending"]);
    let world = World::new().with_oracle(oracle);
    let mut swarm = Swarm::with_world(SwarmConfig::default(), world);
    let id = swarm
        .add_agent(
            BdiAgent::builder("cfo")
                .desire(profit_desire())
                .belief(Belief::new("profit_margin", 0.15, 1.0))
                .build()
                .unwrap(),
        )
        .await
        .unwrap();
    let handle = swarm.agent(&id).unwrap();

    let first = swarm.step().await;
    assert!(first.is_clean());
    {
        let agent = handle.lock().await;
        let intention = agent.intentions().active().next().expect("an intention");
        assert_eq!(agent.goals().get(intention.goal_id).unwrap().name, "reduce_costs");
        assert!(agent.plan(intention.id).is_none());
    }

    // The oracle's steps arrive on the next tick
    settle().await;
    let second = swarm.step().await;
    let report = second.report(&id).unwrap();
    assert_eq!(report.plans_adopted, 1);
    assert_eq!(report.goals_achieved, 1);
    assert_eq!(swarm.world().library.plans_for("reduce_costs").len(), 1);

    // The desire still holds; the learned plan is reused rather than relearned
    let third = swarm.step().await;
    assert_eq!(third.report(&id).unwrap().goals_achieved, 1);
    assert_eq!(swarm.world().library.plans_for("reduce_costs").len(), 1);
}

#[tokio::test]
async fn test_finished_goals_are_pruned_while_desire_persists() {
    let oracle = RuleOracle::new().with_steps("Reduce operating costs", ["audit expenses", "cut spending"]);
    let world = World::new().with_oracle(oracle);
    let config = AgentConfig {
        finished_goal_limit: 2,
        ..AgentConfig::default()
    };
    let mut swarm = Swarm::with_world(SwarmConfig::default(), world);
    let id = swarm
        .add_agent(
            BdiAgent::builder("cfo")
                .config(config)
                .desire(profit_desire())
                .belief(Belief::new("profit_margin", 0.15, 1.0))
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

    let mut achieved = 0;
    for _ in 0..12 {
        let summary = swarm.step().await;
        achieved += summary.report(&id).unwrap().goals_achieved;
        settle().await;
    }
    assert!(achieved >= 10, "only {achieved} goals achieved");

    let handle = swarm.agent(&id).unwrap();
    let agent = handle.lock().await;
    assert!(agent.goals().len() <= 3, "{} goals kept", agent.goals().len());
}

#[tokio::test]
async fn test_newer_contradicting_status_wins() {
    let at = |secs| Utc.timestamp_opt(secs, 0).unwrap();
    let mut swarm = Swarm::new(SwarmConfig::default());
    let id = swarm
        .add_agent(
            BdiAgent::builder("monitor")
                .belief(Belief::new("status", "active", 0.8).at(at(10)))
                .belief(Belief::new("status", "inactive", 0.8).at(at(12)))
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

    let summary = swarm.step().await;
    assert!(summary.report(&id).unwrap().conflicts_detected >= 1);

    let handle = swarm.agent(&id).unwrap();
    let agent = handle.lock().await;
    assert_eq!(agent.beliefs().len(), 1);
    assert_eq!(agent.beliefs().value("status"), Some(&json!("inactive")));
}

#[tokio::test]
async fn test_blocked_step_fails_goal_after_one_replan() {
    let domain = Domain::new()
        .with_action(Action::new("a").effect("a_done", true))
        .with_action(
            Action::new("b")
                .requires(Condition::equals("gate", "open"))
                .effect("b_done", true),
        )
        .with_action(Action::new("c").effect("c_done", true))
        .with_method(Method::new("direct", "abc").then("a").then("b").then("c"));
    let world = World::new().with_domain(domain);
    let mut swarm = Swarm::with_world(SwarmConfig::default(), world);
    let id = swarm.add_agent(BdiAgent::builder("worker").build().unwrap()).await.unwrap();
    let handle = swarm.agent(&id).unwrap();
    let goal = handle.lock().await.inject_goal(Goal::new("abc", "Run A, B and C", 0.5));

    let summary = swarm.step().await;
    let report = summary.report(&id).unwrap();
    assert_eq!(report.replans, 1);
    assert_eq!(report.goals_failed, 1);

    let agent = handle.lock().await;
    assert_eq!(agent.goals().get(goal).unwrap().status(), GoalStatus::Failed);
    assert_eq!(agent.beliefs().value("a_done"), Some(&json!(true)));
    assert!(!agent.beliefs().contains("b_done"));
    assert_eq!(agent.intentions().active_count(), 0);
}

#[tokio::test]
async fn test_replan_routes_around_blocked_step() {
    let domain = Domain::new()
        .with_action(Action::new("a").effect("a_done", true))
        .with_action(
            Action::new("b")
                .requires(Condition::equals("gate", "open"))
                .effect("b_done", true),
        )
        .with_action(Action::new("c").effect("c_done", true))
        .with_action(Action::new("open_gate").effect("gate", "open"))
        .with_method(
            Method::new("direct", "abc")
                .when(Condition::not_equals("a_done", true))
                .then("a")
                .then("b")
                .then("c"),
        )
        .with_method(Method::new("via_gate", "abc").then("open_gate").then("b").then("c"));
    let world = World::new().with_domain(domain);
    let mut swarm = Swarm::with_world(SwarmConfig::default(), world);
    let id = swarm.add_agent(BdiAgent::builder("worker").build().unwrap()).await.unwrap();
    let handle = swarm.agent(&id).unwrap();
    let goal = handle.lock().await.inject_goal(Goal::new("abc", "Run A, B and C", 0.5));

    let summary = swarm.step().await;
    let report = summary.report(&id).unwrap();
    assert_eq!(report.replans, 1);
    assert_eq!(report.goals_achieved, 1);

    let agent = handle.lock().await;
    assert_eq!(agent.goals().get(goal).unwrap().status(), GoalStatus::Achieved);
    for key in ["a_done", "gate", "b_done", "c_done"] {
        assert!(agent.beliefs().contains(key), "missing {key}");
    }
}

#[tokio::test]
async fn test_request_creates_goal_and_gets_answered() {
    let world = World::new().with_domain(
        Domain::new().with_action(Action::new("audit_q3_budget").effect("q3_audited", true)),
    );
    let mut swarm = Swarm::with_world(SwarmConfig::default(), world);
    let x = swarm.add_agent(BdiAgent::builder("X").build().unwrap()).await.unwrap();
    let y = swarm.add_agent(BdiAgent::builder("Y").build().unwrap()).await.unwrap();

    swarm
        .world()
        .bus
        .tell(&x, &y, Performative::Request, "audit Q3 budget")
        .unwrap();
    swarm.step().await;

    {
        let handle = swarm.agent(&y).unwrap();
        let agent = handle.lock().await;
        let goal = agent
            .goals()
            .iter()
            .find(|g| g.description == "Respond to request: audit Q3 budget")
            .expect("request goal");
        assert_eq!(goal.name, "audit_q3_budget");
        assert_eq!(goal.status(), GoalStatus::Achieved);
        assert_eq!(agent.beliefs().value("received_message_from_X"), Some(&json!(true)));
        assert_eq!(agent.beliefs().value("q3_audited"), Some(&json!(true)));
    }

    // X reads Y's answer on the next tick
    swarm.step().await;
    let handle = swarm.agent(&x).unwrap();
    let agent = handle.lock().await;
    assert_eq!(
        agent.beliefs().value("info_from_Y"),
        Some(&json!("done: audit Q3 budget"))
    );
}

#[tokio::test]
async fn test_every_requester_of_a_shared_goal_is_answered() {
    let world = World::new().with_domain(
        Domain::new().with_action(Action::new("audit_q3_budget").effect("q3_audited", true)),
    );
    let mut swarm = Swarm::with_world(SwarmConfig::default(), world);
    let x = swarm.add_agent(BdiAgent::builder("X").build().unwrap()).await.unwrap();
    let y = swarm.add_agent(BdiAgent::builder("Y").build().unwrap()).await.unwrap();
    let z = swarm.add_agent(BdiAgent::builder("Z").build().unwrap()).await.unwrap();

    let bus = &swarm.world().bus;
    bus.tell(&x, &y, Performative::Request, "audit Q3 budget").unwrap();
    bus.tell(&z, &y, Performative::Request, "audit Q3 budget").unwrap();
    swarm.run(2).await;

    {
        let handle = swarm.agent(&y).unwrap();
        let agent = handle.lock().await;
        let shared = agent
            .goals()
            .iter()
            .filter(|g| g.description == "Respond to request: audit Q3 budget")
            .count();
        assert_eq!(shared, 1);
    }
    for requester in [&x, &z] {
        let handle = swarm.agent(requester).unwrap();
        let agent = handle.lock().await;
        assert_eq!(
            agent.beliefs().value("info_from_Y"),
            Some(&json!("done: audit Q3 budget")),
            "{requester} got no answer"
        );
    }
}

#[tokio::test]
async fn test_unplannable_request_is_rejected() {
    let mut swarm = Swarm::new(SwarmConfig::default());
    let x = swarm.add_agent(BdiAgent::builder("X").build().unwrap()).await.unwrap();
    let y = swarm.add_agent(BdiAgent::builder("Y").build().unwrap()).await.unwrap();

    swarm.world().bus.tell(&x, &y, Performative::Request, "paint the moon").unwrap();
    swarm.run(2).await;

    let handle = swarm.agent(&x).unwrap();
    let agent = handle.lock().await;
    assert_eq!(
        agent.beliefs().value("rejected_by_Y"),
        Some(&json!("failed: paint the moon"))
    );
}

#[tokio::test]
async fn test_oracle_failure_leaves_state_untouched() {
    let world = World::new().with_oracle(UnavailableOracle);
    let mut swarm = Swarm::with_world(SwarmConfig::default(), world);
    let id = swarm
        .add_agent(
            BdiAgent::builder("planner")
                .belief(Belief::new("budget", 1000, 1.0))
                .build()
                .unwrap(),
        )
        .await
        .unwrap();
    let handle = swarm.agent(&id).unwrap();
    let goal = handle.lock().await.inject_goal(Goal::new("offsite", "Organize the offsite", 0.7));

    swarm.step().await;
    let (beliefs, intention) = {
        let agent = handle.lock().await;
        let intention = agent.intentions().for_goal(goal).expect("intention").id;
        (beliefs_by_key(&agent), intention)
    };

    for _ in 0..2 {
        settle().await;
        let summary = swarm.step().await;
        let report = summary.report(&id).unwrap();
        assert!(report.oracle_errors >= 1);
        assert_eq!(report.goals_failed, 0);

        let agent = handle.lock().await;
        assert_eq!(beliefs_by_key(&agent), beliefs);
        assert_eq!(agent.intentions().for_goal(goal).map(|i| i.id), Some(intention));
        assert_eq!(agent.goals().get(goal).unwrap().status(), GoalStatus::Active);
    }
}

#[tokio::test]
async fn test_unusable_steps_fall_back_to_decomposition() {
    let world = World::new().with_oracle(offsite_oracle());
    let mut swarm = Swarm::with_world(SwarmConfig::default(), world);
    let id = swarm.add_agent(BdiAgent::builder("organizer").build().unwrap()).await.unwrap();
    let handle = swarm.agent(&id).unwrap();
    let goal = handle.lock().await.inject_goal(Goal::new("offsite", "Organize the offsite", 0.7));

    for _ in 0..6 {
        swarm.step().await;
        settle().await;
    }

    let agent = handle.lock().await;
    let parent = agent.goals().get(goal).unwrap();
    assert_eq!(parent.children.len(), 2);
    assert_eq!(parent.status(), GoalStatus::Achieved);
    assert_eq!(agent.intentions().active_count(), 0);
}

#[tokio::test]
async fn test_decomposed_goal_completes_with_single_intention() {
    let world = World::new().with_oracle(offsite_oracle());
    let config = AgentConfig {
        max_intentions: 1,
        ..AgentConfig::default()
    };
    let mut swarm = Swarm::with_world(SwarmConfig::default(), world);
    let id = swarm
        .add_agent(BdiAgent::builder("organizer").config(config).build().unwrap())
        .await
        .unwrap();
    let handle = swarm.agent(&id).unwrap();
    let goal = handle.lock().await.inject_goal(Goal::new("offsite", "Organize the offsite", 0.7));

    for _ in 0..12 {
        swarm.step().await;
        settle().await;
    }

    let agent = handle.lock().await;
    let parent = agent.goals().get(goal).unwrap();
    assert_eq!(parent.status(), GoalStatus::Achieved);
    for child in &parent.children {
        assert_eq!(agent.goals().get(*child).unwrap().status(), GoalStatus::Achieved);
    }
    assert!(agent.intentions().live().is_empty());
}

#[tokio::test]
async fn test_failed_subgoal_fails_waiting_parent() {
    let oracle = RuleOracle::new()
        .with_decomposition("Organize the offsite", ["Book venue", "Send invites"])
        .with_steps("Book venue", ["call venue"]);
    let world = World::new().with_oracle(oracle);
    let config = AgentConfig {
        max_intentions: 1,
        ..AgentConfig::default()
    };
    let mut swarm = Swarm::with_world(SwarmConfig::default(), world);
    let id = swarm
        .add_agent(BdiAgent::builder("organizer").config(config).build().unwrap())
        .await
        .unwrap();
    let handle = swarm.agent(&id).unwrap();
    let goal = handle.lock().await.inject_goal(Goal::new("offsite", "Organize the offsite", 0.7));

    for _ in 0..12 {
        swarm.step().await;
        settle().await;
    }

    let agent = handle.lock().await;
    assert_eq!(agent.goals().get(goal).unwrap().status(), GoalStatus::Failed);
    assert!(agent.intentions().live().is_empty());
}

#[tokio::test]
async fn test_hung_oracle_call_expires_and_is_retried() {
    let config = AgentConfig {
        oracle_timeout_ms: 20,
        oracle_desires: false,
        ..AgentConfig::default()
    };
    let world = World::new().with_oracle(SilentOracle);
    let mut swarm = Swarm::with_world(SwarmConfig::default(), world);
    let id = swarm
        .add_agent(BdiAgent::builder("planner").config(config).build().unwrap())
        .await
        .unwrap();
    let handle = swarm.agent(&id).unwrap();
    let goal = handle.lock().await.inject_goal(Goal::new("offsite", "Organize the offsite", 0.7));
    swarm.step().await;

    for _ in 0..2 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let summary = swarm.step().await;
        let report = summary.report(&id).unwrap();
        assert_eq!(report.oracle_errors, 1);
        assert_eq!(report.goals_failed, 0);

        let agent = handle.lock().await;
        assert!(agent.intentions().for_goal(goal).is_some());
        assert_eq!(agent.goals().get(goal).unwrap().status(), GoalStatus::Active);
    }
}

#[tokio::test]
async fn test_invalid_percept_is_dropped_without_losing_the_tick() {
    let environment = Arc::new(ScriptedEnvironment::new());
    let y = AgentId::named("Y");
    environment.set_fact(&y, "humidity", 40, 1.5);
    environment.set_fact(&y, "door", "open", 1.0);

    let world = World::new().with_environment(environment);
    let mut swarm = Swarm::with_world(SwarmConfig::default(), world);
    let x = swarm.add_agent(BdiAgent::builder("X").build().unwrap()).await.unwrap();
    swarm.add_agent(BdiAgent::builder("Y").build().unwrap()).await.unwrap();
    swarm
        .world()
        .bus
        .tell(&x, &y, Performative::Inform, MessageContent::fact("budget", 5))
        .unwrap();

    for _ in 0..3 {
        let summary = swarm.step().await;
        assert!(summary.is_clean(), "{:?}", summary.errors);
        assert_eq!(summary.report(&y).unwrap().errors.len(), 1);
    }

    let handle = swarm.agent(&y).unwrap();
    let agent = handle.lock().await;
    assert_eq!(agent.beliefs().value("door"), Some(&json!("open")));
    assert_eq!(agent.beliefs().value("budget"), Some(&json!(5)));
    assert_eq!(agent.beliefs().value("received_message_from_X"), Some(&json!(true)));
    assert!(!agent.beliefs().contains("humidity"));
}

#[tokio::test]
async fn test_beliefs_persist_and_restore() {
    let repository = Arc::new(InMemoryBeliefRepository::new());
    let environment = Arc::new(ScriptedEnvironment::new());
    let sensor = AgentId::named("sensor");
    environment.set_fact(&sensor, "temperature", 21, 0.9);

    let world = World::new()
        .with_environment(environment.clone())
        .with_belief_repository(repository.clone());
    let mut swarm = Swarm::with_world(SwarmConfig::default(), world.clone());
    swarm.add_agent(BdiAgent::builder("sensor").build().unwrap()).await.unwrap();
    swarm.run(2).await;
    assert_eq!(repository.count("sensor"), 1);

    environment.clear_fact(&sensor, "temperature");
    let stored = repository.load_all("sensor").await.unwrap();
    assert_eq!(stored[0].value, json!(21));

    // A fresh swarm over the same repository picks the beliefs back up
    let mut restarted = Swarm::with_world(SwarmConfig::default(), world.with_bus(Default::default()));
    restarted.add_agent(BdiAgent::builder("sensor").build().unwrap()).await.unwrap();
    let handle = restarted.agent(&sensor).unwrap();
    assert_eq!(handle.lock().await.beliefs().value("temperature"), Some(&json!(21)));
}

#[tokio::test]
async fn test_published_facts_reach_subscribers() {
    let mut swarm = Swarm::new(SwarmConfig::default());
    let lead = swarm.add_agent(BdiAgent::builder("lead").build().unwrap()).await.unwrap();
    let analyst = swarm.add_agent(BdiAgent::builder("analyst").build().unwrap()).await.unwrap();
    let auditor = swarm
        .add_agent(
            BdiAgent::builder("auditor")
                .config(AgentConfig {
                    mailbox_capacity: Some(4),
                    ..AgentConfig::default()
                })
                .build()
                .unwrap(),
        )
        .await
        .unwrap();

    let bus = &swarm.world().bus;
    bus.subscribe(&analyst, "finance").unwrap();
    bus.subscribe(&lead, "finance").unwrap();
    let reached = bus
        .publish(&lead, "finance", Performative::Inform, MessageContent::fact("q3_revenue", 1200))
        .unwrap();
    assert_eq!(reached, 1);
    swarm.step().await;

    let handle = swarm.agent(&analyst).unwrap();
    assert_eq!(handle.lock().await.beliefs().value("q3_revenue"), Some(&json!(1200)));
    let handle = swarm.agent(&auditor).unwrap();
    assert!(!handle.lock().await.beliefs().contains("q3_revenue"));
}
