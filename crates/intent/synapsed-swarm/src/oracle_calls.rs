//! In-flight reasoning oracle calls
//!
//! Oracle futures run as tokio tasks and report back over a channel. An agent
//! drains the channel at the start of its next tick, so a result is never
//! consumed in the tick that asked for it. Cancelling only forgets the ticket;
//! the call itself runs to completion and its late result is discarded. A call
//! that outlives the timeout reports [`OracleError::Unavailable`].

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use synapsed_beliefs::{Belief, WorldState};
use synapsed_intent::{Desire, GoalId, OracleError, OracleResult, ReasoningOracle};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

/// Identifies one oracle call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

/// What was asked of the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OracleRequest {
    Desires,
    Steps { goal: GoalId },
    Decompose { goal: GoalId },
}

impl OracleRequest {
    fn goal(&self) -> Option<GoalId> {
        match self {
            OracleRequest::Desires => None,
            OracleRequest::Steps { goal } | OracleRequest::Decompose { goal } => Some(*goal),
        }
    }
}

/// A finished oracle call
#[derive(Debug)]
pub enum OracleOutcome {
    Desires(OracleResult<Vec<Desire>>),
    Steps { goal: GoalId, result: OracleResult<Vec<Value>> },
    Decomposition { goal: GoalId, result: OracleResult<Vec<Value>> },
}

/// Tracks an agent's outstanding oracle calls
#[derive(Debug)]
pub struct OracleCalls {
    timeout: Duration,
    next_ticket: u64,
    pending: HashMap<Ticket, OracleRequest>,
    tx: UnboundedSender<(Ticket, OracleOutcome)>,
    rx: UnboundedReceiver<(Ticket, OracleOutcome)>,
}

async fn within<T>(timeout: Duration, call: impl Future<Output = OracleResult<T>>) -> OracleResult<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(OracleError::Unavailable(format!("no answer within {timeout:?}"))),
    }
}

impl OracleCalls {
    pub fn new(timeout: Duration) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            timeout,
            next_ticket: 0,
            pending: HashMap::new(),
            tx,
            rx,
        }
    }

    fn issue(&mut self, request: OracleRequest) -> Ticket {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        self.pending.insert(ticket, request);
        trace!(?request, "oracle call issued");
        ticket
    }

    /// Asks for desires given a belief snapshot
    pub fn request_desires(&mut self, oracle: Arc<dyn ReasoningOracle>, beliefs: Vec<Belief>) -> Ticket {
        let ticket = self.issue(OracleRequest::Desires);
        let (tx, timeout) = (self.tx.clone(), self.timeout);
        tokio::spawn(async move {
            let result = within(timeout, oracle.generate_desires(&beliefs)).await;
            // The receiver is gone once the agent is dropped
            let _ = tx.send((ticket, OracleOutcome::Desires(result)));
        });
        ticket
    }

    /// Asks for step descriptions achieving a goal
    pub fn request_steps(
        &mut self,
        oracle: Arc<dyn ReasoningOracle>,
        goal: GoalId,
        description: String,
        state: WorldState,
    ) -> Ticket {
        let ticket = self.issue(OracleRequest::Steps { goal });
        let (tx, timeout) = (self.tx.clone(), self.timeout);
        tokio::spawn(async move {
            let result = within(timeout, oracle.plan_steps(&description, &state)).await;
            let _ = tx.send((ticket, OracleOutcome::Steps { goal, result }));
        });
        ticket
    }

    /// Asks for subgoal descriptions of a goal
    pub fn request_decomposition(
        &mut self,
        oracle: Arc<dyn ReasoningOracle>,
        goal: GoalId,
        description: String,
    ) -> Ticket {
        let ticket = self.issue(OracleRequest::Decompose { goal });
        let (tx, timeout) = (self.tx.clone(), self.timeout);
        tokio::spawn(async move {
            let result = within(timeout, oracle.decompose_goal(&description)).await;
            let _ = tx.send((ticket, OracleOutcome::Decomposition { goal, result }));
        });
        ticket
    }

    pub fn is_pending(&self, request: &OracleRequest) -> bool {
        self.pending.values().any(|r| r == request)
    }

    /// Whether any call concerning `goal` is outstanding
    pub fn is_pending_for_goal(&self, goal: GoalId) -> bool {
        self.pending.values().any(|r| r.goal() == Some(goal))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Forgets every call concerning `goal`
    pub fn cancel_for_goal(&mut self, goal: GoalId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, request| request.goal() != Some(goal));
        let cancelled = before - self.pending.len();
        if cancelled > 0 {
            debug!(goal = %goal, cancelled, "oracle calls cancelled");
        }
        cancelled
    }

    /// Takes the results that have arrived, skipping cancelled calls
    pub fn collect(&mut self) -> Vec<OracleOutcome> {
        let mut outcomes = Vec::new();
        while let Ok((ticket, outcome)) = self.rx.try_recv() {
            if self.pending.remove(&ticket).is_some() {
                outcomes.push(outcome);
            } else {
                trace!(?ticket, "late oracle result discarded");
            }
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use synapsed_intent::{Condition, Decision, RuleOracle};

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn oracle() -> Arc<dyn ReasoningOracle> {
        Arc::new(
            RuleOracle::new()
                .with_desire(Desire::new("stay_warm", "Stay warm", 0.5).activates_when(Condition::less_than("temperature", 18)))
                .with_steps("Stay warm", ["close_window", "turn_on_heater"]),
        )
    }

    #[tokio::test]
    async fn test_results_arrive_after_yielding() {
        let mut calls = OracleCalls::new(Duration::from_secs(5));
        calls.request_desires(oracle(), vec![Belief::new("temperature", 15, 1.0)]);
        assert!(calls.is_pending(&OracleRequest::Desires));

        settle().await;
        let outcomes = calls.collect();
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            OracleOutcome::Desires(Ok(desires)) => assert_eq!(desires[0].id, "stay_warm"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(calls.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_result_is_discarded() {
        let mut calls = OracleCalls::new(Duration::from_secs(5));
        let goal = GoalId::new();
        calls.request_steps(oracle(), goal, "Stay warm".to_string(), WorldState::new());
        calls.request_decomposition(oracle(), goal, "Stay warm".to_string());
        assert!(calls.is_pending_for_goal(goal));

        assert_eq!(calls.cancel_for_goal(goal), 2);
        settle().await;
        assert!(calls.collect().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let mut calls = OracleCalls::new(Duration::from_secs(5));
        let goal = GoalId::new();
        calls.request_steps(oracle(), goal, "Unknown goal".to_string(), WorldState::new());
        settle().await;

        let outcomes = calls.collect();
        assert!(matches!(
            &outcomes[..],
            [OracleOutcome::Steps { result: Err(_), .. }]
        ));
    }

    /// Never answers
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

    #[tokio::test]
    async fn test_hung_call_times_out_as_unavailable() {
        let mut calls = OracleCalls::new(Duration::from_millis(20));
        let goal = GoalId::new();
        calls.request_decomposition(Arc::new(SilentOracle), goal, "Stay warm".to_string());
        assert!(calls.collect().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let outcomes = calls.collect();
        assert!(matches!(
            &outcomes[..],
            [OracleOutcome::Decomposition { result: Err(OracleError::Unavailable(_)), .. }]
        ));
        assert!(!calls.is_pending_for_goal(goal));
    }
}
