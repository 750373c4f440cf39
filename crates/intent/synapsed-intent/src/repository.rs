//! Persistence boundary for plan libraries

use crate::{plan::Plan, types::PlanId, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Storage for reusable plans, keyed by goal name
#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn load_for_goal(&self, goal_key: &str) -> Result<Vec<Plan>>;

    /// Store or replace a plan
    async fn save(&self, plan: &Plan) -> Result<()>;

    async fn delete(&self, goal_key: &str, plan_id: PlanId) -> Result<()>;
}

/// In-memory plan repository
#[derive(Debug, Clone, Default)]
pub struct InMemoryPlanRepository {
    plans: Arc<DashMap<String, Vec<Plan>>>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanRepository for InMemoryPlanRepository {
    async fn load_for_goal(&self, goal_key: &str) -> Result<Vec<Plan>> {
        Ok(self
            .plans
            .get(goal_key)
            .map(|plans| plans.value().clone())
            .unwrap_or_default())
    }

    async fn save(&self, plan: &Plan) -> Result<()> {
        let mut plans = self.plans.entry(plan.goal_key.clone()).or_default();
        plans.retain(|p| p.id != plan.id);
        plans.push(plan.clone());
        Ok(())
    }

    async fn delete(&self, goal_key: &str, plan_id: PlanId) -> Result<()> {
        if let Some(mut plans) = self.plans.get_mut(goal_key) {
            plans.retain(|p| p.id != plan_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{library::PlanLibrary, plan::PlanStep, types::GoalId};

    #[tokio::test]
    async fn test_hydrate_library_from_repository() {
        let repo = InMemoryPlanRepository::new();
        let plan = Plan::new(GoalId::new(), "patrol", vec![PlanStep::unbound("walk")]);
        repo.save(&plan).await.unwrap();
        repo.save(&plan).await.unwrap();

        let library = PlanLibrary::new();
        assert_eq!(library.hydrate(&repo, "patrol").await.unwrap(), 1);
        assert_eq!(library.hydrate(&repo, "patrol").await.unwrap(), 1);
        assert_eq!(library.plans_for("patrol").len(), 1);

        repo.delete("patrol", plan.id).await.unwrap();
        assert!(repo.load_for_goal("patrol").await.unwrap().is_empty());
    }

    #[test]
    fn test_plans_are_kept_per_goal() {
        let repo = InMemoryPlanRepository::new();
        let patrol = Plan::new(GoalId::new(), "patrol", vec![PlanStep::unbound("walk")]);
        let guard = Plan::new(GoalId::new(), "guard", vec![PlanStep::unbound("stand")]);
        tokio_test::block_on(async {
            repo.save(&patrol).await.unwrap();
            repo.save(&guard).await.unwrap();
            assert_eq!(repo.load_for_goal("patrol").await.unwrap().len(), 1);
            assert_eq!(repo.load_for_goal("guard").await.unwrap()[0].id, guard.id);
        });
    }
}
