//! Two BDI agents: a CFO chasing profit and an auditor answering requests
//!
//! Run with `RUST_LOG=debug` to watch each phase of the loop.

use synapsed_swarm::prelude::*;
use synapsed_swarm::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    // Optional bdi.toml next to the working directory, SYNAPSED_BDI_* overrides
    let config = SwarmConfig::load("bdi.toml")?;

    let domain = Domain::new()
        .with_action(Action::new("audit_expenses").effect("expenses_audited", true))
        .with_action(
            Action::new("cut_spending")
                .requires(Condition::equals("expenses_audited", true))
                .effect("profit_margin", 0.25),
        )
        .with_action(Action::new("audit_q3_budget").effect("q3_audited", true))
        .with_method(
            Method::new("audit_then_cut", "reduce_costs")
                .then("audit_expenses")
                .then("cut_spending"),
        );
    let oracle = RuleOracle::new().with_steps(
        "Respond to request: Hire an analyst",
        ["post listing", "interview", "make offer"],
    );
    let world = World::from_config(&config).with_domain(domain).with_oracle(oracle);
    let mut swarm = Swarm::with_world(config, world);

    let cfo = swarm
        .agent_builder("cfo")
        .desire(
            Desire::new("increase_profit", "Increase profit", 0.9)
                .activates_when(Condition::less_than("profit_margin", 0.2))
                .pursues("reduce_costs", "Reduce operating costs"),
        )
        .belief(Belief::new("profit_margin", 0.15, 1.0))
        .build()?;
    let auditor = swarm.agent_builder("auditor").build()?;

    let cfo = swarm.add_agent(cfo).await?;
    let auditor = swarm.add_agent(auditor).await?;
    info!(agents = swarm.len(), "swarm ready");

    swarm.world().bus.tell(&cfo, &auditor, Performative::Request, "audit Q3 budget")?;
    swarm.world().bus.tell(&cfo, &auditor, Performative::Request, "Hire an analyst")?;

    for summary in swarm.run(4).await {
        for report in &summary.reports {
            info!(
                tick = summary.tick,
                agent = %report.agent,
                achieved = report.goals_achieved,
                failed = report.goals_failed,
                messages = report.messages_sent,
                "tick finished"
            );
        }
        tokio::task::yield_now().await;
    }

    for id in swarm.agent_ids() {
        if let Some(handle) = swarm.agent(&id) {
            let agent = handle.lock().await;
            for goal in agent.goals().iter() {
                info!(agent = %id, goal = %goal.name, status = %goal.status(), "goal");
            }
            for belief in agent.beliefs().iter() {
                info!(agent = %id, key = %belief.key, value = %belief.value, "belief");
            }
        }
    }
    Ok(())
}
