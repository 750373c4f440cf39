//! Goal tree: an arena of goals linked parent → child

use crate::{
    desire::Desire,
    goal::{Goal, GoalSource, GoalStatus},
    oracle::ReasoningOracle,
    types::GoalId,
    IntentError, Result,
};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use petgraph::Direction;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use synapsed_beliefs::WorldState;
use tracing::{debug, info};

/// Goals owned by one agent, indexed by id.
///
/// The graph holds only ids; goal data lives in the arena so lookups never
/// walk the graph.
#[derive(Debug, Default)]
pub struct GoalTree {
    goals: HashMap<GoalId, Goal>,
    graph: DiGraph<GoalId, ()>,
    node_map: HashMap<GoalId, NodeIndex>,
}

impl GoalTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a root goal
    pub fn insert(&mut self, goal: Goal) -> GoalId {
        let id = goal.id;
        let idx = self.graph.add_node(id);
        self.node_map.insert(id, idx);
        self.goals.insert(id, goal);
        id
    }

    /// Adds `goal` beneath `parent`
    pub fn add_child(&mut self, parent: GoalId, mut goal: Goal) -> Result<GoalId> {
        let parent_idx = *self
            .node_map
            .get(&parent)
            .ok_or(IntentError::GoalNotFound(parent))?;
        goal.parent = Some(parent);
        let id = self.insert(goal);
        self.graph.add_edge(parent_idx, self.node_map[&id], ());
        if let Some(parent_goal) = self.goals.get_mut(&parent) {
            parent_goal.children.push(id);
        }
        Ok(id)
    }

    pub fn get(&self, id: GoalId) -> Option<&Goal> {
        self.goals.get(&id)
    }

    pub fn get_mut(&mut self, id: GoalId) -> Option<&mut Goal> {
        self.goals.get_mut(&id)
    }

    pub fn contains(&self, id: GoalId) -> bool {
        self.goals.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    /// Goals in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Goal> {
        self.graph.node_weights().filter_map(|id| self.goals.get(id))
    }

    pub fn children(&self, id: GoalId) -> Vec<GoalId> {
        let Some(&idx) = self.node_map.get(&id) else {
            return Vec::new();
        };
        let mut children: Vec<GoalId> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge| self.graph[edge.target()])
            .collect();
        // petgraph yields the newest edge first
        children.reverse();
        children
    }

    pub fn parent(&self, id: GoalId) -> Option<GoalId> {
        let idx = *self.node_map.get(&id)?;
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .next()
            .map(|edge| self.graph[edge.source()])
    }

    pub fn roots(&self) -> Vec<GoalId> {
        self.iter().filter(|g| g.parent.is_none()).map(|g| g.id).collect()
    }

    /// The goal and everything beneath it, breadth first
    pub fn descendants(&self, id: GoalId) -> Vec<GoalId> {
        let Some(&start) = self.node_map.get(&id) else {
            return Vec::new();
        };
        let mut bfs = Bfs::new(&self.graph, start);
        let mut result = Vec::new();
        while let Some(idx) = bfs.next(&self.graph) {
            result.push(self.graph[idx]);
        }
        result
    }

    pub fn depth(&self, id: GoalId) -> usize {
        let mut depth = 0;
        let mut current = self.parent(id);
        while let Some(parent) = current {
            depth += 1;
            current = self.parent(parent);
        }
        depth
    }

    /// A non-terminal goal with this description
    pub fn find_open(&self, description: &str) -> Option<GoalId> {
        self.iter()
            .find(|g| g.is_open() && g.description == description)
            .map(|g| g.id)
    }

    /// The open goal backing `desire`, if one exists
    pub fn goal_for_desire(&self, desire: &Desire) -> Option<GoalId> {
        self.find_open(&desire.goal_template().description)
    }

    /// Adopts the desire's goal once its activation conditions hold.
    ///
    /// Returns the new goal's id, or `None` when the desire is inactive or an
    /// open goal with the same description already exists.
    pub fn promote_desire(&mut self, desire: &Desire, state: &WorldState) -> Option<GoalId> {
        if !desire.is_active(state) || self.goal_for_desire(desire).is_some() {
            return None;
        }
        let goal = desire.to_goal();
        debug!(desire = %desire.id, goal = %goal.name, "desire promoted to goal");
        Some(self.insert(goal))
    }

    /// Attaches validated subgoal descriptions beneath `goal_id`
    pub fn decompose(&mut self, goal_id: GoalId, candidates: &[Value]) -> Result<Vec<GoalId>> {
        let parent = self.get(goal_id).ok_or(IntentError::GoalNotFound(goal_id))?;
        let priority = parent.priority;
        let descriptions = validate_decomposition(candidates)?;

        let mut ids = Vec::with_capacity(descriptions.len());
        for description in descriptions {
            let subgoal = Goal::new(goal_key(&description), description, priority)
                .with_source(GoalSource::Decomposition(goal_id));
            ids.push(self.add_child(goal_id, subgoal)?);
        }
        info!(goal = %goal_id, subgoals = ids.len(), "goal decomposed");
        Ok(ids)
    }

    /// Asks the oracle for subgoals and attaches them
    pub async fn decompose_with(
        &mut self,
        goal_id: GoalId,
        oracle: &dyn ReasoningOracle,
    ) -> Result<Vec<GoalId>> {
        let description = self
            .get(goal_id)
            .ok_or(IntentError::GoalNotFound(goal_id))?
            .description
            .clone();
        let candidates = oracle.decompose_goal(&description).await?;
        self.decompose(goal_id, &candidates)
    }

    /// Drops the oldest finished root goals, with their subgoals, past `keep`.
    ///
    /// A tree is finished once none of its goals is open. Trees holding a
    /// goal for which `pinned` returns true are never dropped. Returns the
    /// removed ids in insertion order.
    pub fn prune_finished(&mut self, keep: usize, pinned: impl Fn(GoalId) -> bool) -> Vec<GoalId> {
        let finished: Vec<Vec<GoalId>> = self
            .roots()
            .into_iter()
            .map(|root| self.descendants(root))
            .filter(|tree| {
                tree.iter()
                    .all(|id| self.get(*id).is_some_and(|g| !g.is_open()) && !pinned(*id))
            })
            .collect();
        if finished.len() <= keep {
            return Vec::new();
        }
        let excess = finished.len() - keep;
        let removed: HashSet<GoalId> = finished.into_iter().take(excess).flatten().collect();

        // Rebuilt rather than removed in place: removal would renumber nodes
        let old = std::mem::take(&mut self.graph);
        self.node_map.clear();
        let mut pruned = Vec::with_capacity(removed.len());
        for &id in old.node_weights() {
            if removed.contains(&id) {
                self.goals.remove(&id);
                pruned.push(id);
            } else {
                let idx = self.graph.add_node(id);
                self.node_map.insert(id, idx);
            }
        }
        for edge in old.raw_edges() {
            let source = self.node_map.get(&old[edge.source()]).copied();
            let target = self.node_map.get(&old[edge.target()]).copied();
            if let (Some(source), Some(target)) = (source, target) {
                self.graph.add_edge(source, target, ());
            }
        }
        debug!(pruned = pruned.len(), remaining = self.goals.len(), "finished goals pruned");
        pruned
    }

    pub fn activate(&mut self, id: GoalId) -> Result<()> {
        self.transition(id, GoalStatus::Active)
    }

    /// Marks the goal achieved, then its parent once every sibling is achieved
    pub fn achieve(&mut self, id: GoalId) -> Result<()> {
        self.transition(id, GoalStatus::Achieved)?;

        let mut current = self.parent(id);
        while let Some(parent) = current {
            let ready = self.get(parent).is_some_and(|p| p.status() == GoalStatus::Active)
                && self
                    .children(parent)
                    .iter()
                    .all(|child| self.get(*child).is_some_and(|c| c.status() == GoalStatus::Achieved));
            if !ready {
                break;
            }
            self.transition(parent, GoalStatus::Achieved)?;
            current = self.parent(parent);
        }
        Ok(())
    }

    pub fn fail(&mut self, id: GoalId) -> Result<()> {
        self.transition(id, GoalStatus::Failed)
    }

    fn transition(&mut self, id: GoalId, next: GoalStatus) -> Result<()> {
        let goal = self.goals.get_mut(&id).ok_or(IntentError::GoalNotFound(id))?;
        goal.transition(next)?;
        debug!(goal = %id, name = %goal.name, status = %next, "goal transitioned");
        Ok(())
    }
}

/// Checks oracle output: a non-empty list of non-empty strings
pub fn validate_decomposition(candidates: &[Value]) -> Result<Vec<String>> {
    if candidates.is_empty() {
        return Err(IntentError::ValidationFailed(
            "decomposition produced no subgoals".to_string(),
        ));
    }
    candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| match candidate.as_str().map(str::trim) {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            _ => Err(IntentError::ValidationFailed(format!(
                "subgoal {i} is not a non-empty string: {candidate}"
            ))),
        })
        .collect()
}

/// Stable key derived from a description, e.g. "Audit Q3 budget" → "audit_q3_budget"
pub fn goal_key(description: &str) -> String {
    let mut key = String::with_capacity(description.len());
    for c in description.trim().chars() {
        if c.is_alphanumeric() {
            key.extend(c.to_lowercase());
        } else if !key.ends_with('_') {
            key.push('_');
        }
    }
    key.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Condition;
    use serde_json::json;

    fn state(margin: f64) -> WorldState {
        WorldState::from([("profit_margin".to_string(), json!(margin))])
    }

    #[test]
    fn test_promotion_is_deduplicated() {
        let mut tree = GoalTree::new();
        let desire = Desire::new("increase_profit", "Increase profit", 0.9)
            .activates_when(Condition::less_than("profit_margin", 0.2))
            .pursues("reduce_costs", "Reduce operational costs");

        assert!(tree.promote_desire(&desire, &state(0.5)).is_none());
        let id = tree.promote_desire(&desire, &state(0.1)).unwrap();
        assert!(tree.promote_desire(&desire, &state(0.1)).is_none());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(id).unwrap().name, "reduce_costs");
        assert_eq!(tree.goal_for_desire(&desire), Some(id));
    }

    #[test]
    fn test_failed_goal_allows_new_promotion() {
        let mut tree = GoalTree::new();
        let desire = Desire::new("explore", "Explore", 0.3);
        let first = tree.promote_desire(&desire, &WorldState::new()).unwrap();
        tree.activate(first).unwrap();
        tree.fail(first).unwrap();

        let second = tree.promote_desire(&desire, &WorldState::new()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_decompose_validates_output() {
        let mut tree = GoalTree::new();
        let root = tree.insert(Goal::new("launch", "Launch product", 0.7));

        assert!(matches!(tree.decompose(root, &[]), Err(IntentError::ValidationFailed(_))));
        assert!(tree.decompose(root, &[json!("Build"), json!(3)]).is_err());
        assert!(tree.decompose(root, &[json!("  ")]).is_err());
        assert!(tree.children(root).is_empty());

        let ids = tree
            .decompose(root, &[json!("Build prototype"), json!("Run beta")])
            .unwrap();
        assert_eq!(tree.children(root), ids);
        assert_eq!(tree.get(ids[0]).unwrap().name, "build_prototype");
        assert_eq!(tree.parent(ids[1]), Some(root));
        assert_eq!(tree.depth(ids[1]), 1);
        assert_eq!(tree.descendants(root).len(), 3);
    }

    #[test]
    fn test_parent_achieved_when_children_achieved() {
        let mut tree = GoalTree::new();
        let root = tree.insert(Goal::new("launch", "Launch product", 0.7));
        let ids = tree.decompose(root, &[json!("Build"), json!("Ship")]).unwrap();
        tree.activate(root).unwrap();
        for id in &ids {
            tree.activate(*id).unwrap();
        }

        tree.achieve(ids[0]).unwrap();
        assert_eq!(tree.get(root).unwrap().status(), GoalStatus::Active);
        tree.achieve(ids[1]).unwrap();
        assert_eq!(tree.get(root).unwrap().status(), GoalStatus::Achieved);
    }

    #[test]
    fn test_prune_finished_keeps_open_and_recent_trees() {
        let mut tree = GoalTree::new();
        let launch = tree.insert(Goal::new("launch", "Launch product", 0.7));
        let parts = tree.decompose(launch, &[json!("Build"), json!("Ship")]).unwrap();
        tree.activate(launch).unwrap();
        for id in &parts {
            tree.activate(*id).unwrap();
            tree.achieve(*id).unwrap();
        }
        assert_eq!(tree.get(launch).unwrap().status(), GoalStatus::Achieved);

        let hire = tree.insert(Goal::new("hire", "Hire analyst", 0.5));
        let failed: Vec<GoalId> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let id = tree.insert(Goal::new(name, name, 0.5));
                tree.activate(id).unwrap();
                tree.fail(id).unwrap();
                id
            })
            .collect();
        let steps = tree.decompose(hire, &[json!("Post listing"), json!("Interview")]).unwrap();

        let pruned = tree.prune_finished(2, |_| false);
        assert_eq!(pruned, vec![launch, parts[0], parts[1], failed[0]]);
        assert_eq!(tree.len(), 5);
        assert!(!tree.contains(parts[1]));
        assert_eq!(tree.roots(), vec![hire, failed[1], failed[2]]);
        assert_eq!(tree.children(hire), steps);
        assert_eq!(tree.parent(steps[1]), Some(hire));

        assert!(tree.prune_finished(2, |_| false).is_empty());
        assert_eq!(tree.prune_finished(0, |id| id == failed[2]), vec![failed[1]]);
        assert_eq!(tree.find_open("Hire analyst"), Some(hire));
    }

    #[test]
    fn test_unknown_goal() {
        let mut tree = GoalTree::new();
        let missing = GoalId::new();
        assert!(matches!(tree.activate(missing), Err(IntentError::GoalNotFound(_))));
        assert!(tree.add_child(missing, Goal::new("a", "a", 0.1)).is_err());
    }

    #[test]
    fn test_goal_key() {
        assert_eq!(goal_key("Audit Q3 budget"), "audit_q3_budget");
        assert_eq!(goal_key("  Respond to request: ping! "), "respond_to_request_ping");
    }
}
