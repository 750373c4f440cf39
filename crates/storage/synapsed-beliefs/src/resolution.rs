//! Deterministic conflict resolution

use crate::{
    consistency::{Conflict, ConflictKind},
    ontology::Ontology,
    types::{Belief, BeliefId, BeliefSource},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// What the resolver did about one conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResolutionAction {
    /// One belief of a pair won, the other was dropped
    Kept {
        kind: ConflictKind,
        winner: BeliefId,
        loser: BeliefId,
    },
    /// A belief's value was replaced by the ontology's correction
    Corrected { belief: BeliefId, from: Value, to: Value },
    /// A belief was dropped with no replacement
    Dropped { belief: BeliefId, reason: String },
    /// A newer belief for the same key replaced an older one
    Superseded { winner: BeliefId, loser: BeliefId },
}

/// Outcome of resolving a candidate set
#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
    pub actions: Vec<ResolutionAction>,
    /// Surviving beliefs, in their original order
    pub retained: Vec<Belief>,
}

impl ResolutionReport {
    /// Ids of every belief removed from the set
    pub fn dropped(&self) -> Vec<BeliefId> {
        self.actions
            .iter()
            .filter_map(|action| match action {
                ResolutionAction::Kept { loser, .. } => Some(*loser),
                ResolutionAction::Superseded { loser, .. } => Some(*loser),
                ResolutionAction::Dropped { belief, .. } => Some(*belief),
                ResolutionAction::Corrected { .. } => None,
            })
            .collect()
    }

    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Applies the per-kind resolution policies.
///
/// Running the resolver twice over its own output changes nothing: losers are
/// gone, corrected beliefs pass the ontology, and at most one belief per key
/// survives.
pub struct ConflictResolver {
    ontology: Arc<Ontology>,
}

impl ConflictResolver {
    pub fn new(ontology: Arc<Ontology>) -> Self {
        Self { ontology }
    }

    pub fn resolve_conflicts(&self, beliefs: Vec<Belief>, conflicts: &[Conflict]) -> ResolutionReport {
        let mut report = ResolutionReport::default();
        // The same belief offered twice counts once
        let mut seen = HashSet::new();
        let mut beliefs: Vec<Belief> = beliefs.into_iter().filter(|b| seen.insert(b.id)).collect();
        let index: HashMap<BeliefId, usize> =
            beliefs.iter().enumerate().map(|(i, b)| (b.id, i)).collect();
        let mut dropped: HashSet<BeliefId> = HashSet::new();

        for conflict in conflicts {
            let Some(&first) = index.get(&conflict.first) else {
                continue;
            };
            if dropped.contains(&conflict.first) {
                continue;
            }

            match (conflict.kind, conflict.second) {
                (ConflictKind::OntologyViolation, _) => {
                    let belief = &mut beliefs[first];
                    if self.ontology.check(belief).is_ok() {
                        continue;
                    }
                    match self.ontology.correct(belief) {
                        Some(corrected) => {
                            report.actions.push(ResolutionAction::Corrected {
                                belief: belief.id,
                                from: belief.value.clone(),
                                to: corrected.clone(),
                            });
                            belief.value = corrected;
                            belief.source = BeliefSource::Correction;
                        }
                        None => {
                            dropped.insert(belief.id);
                            report.actions.push(ResolutionAction::Dropped {
                                belief: belief.id,
                                reason: conflict.reason.clone(),
                            });
                        }
                    }
                }
                (kind, Some(second_id)) => {
                    let Some(&second) = index.get(&second_id) else {
                        continue;
                    };
                    if dropped.contains(&second_id) {
                        continue;
                    }
                    let (a, b) = (&beliefs[first], &beliefs[second]);
                    let (winner, loser) = if self.keep_first(kind, a, b) {
                        (a.id, b.id)
                    } else {
                        (b.id, a.id)
                    };
                    debug!(?kind, %winner, %loser, "conflict resolved");
                    dropped.insert(loser);
                    report.actions.push(ResolutionAction::Kept { kind, winner, loser });
                }
                (_, None) => {}
            }
        }

        let mut latest: HashMap<&str, usize> = HashMap::new();
        for (i, belief) in beliefs.iter().enumerate() {
            if dropped.contains(&belief.id) {
                continue;
            }
            match latest.get(belief.key.as_str()) {
                Some(&j) => {
                    let current = &beliefs[j];
                    let (winner, loser) = if supersedes(belief, current) { (i, j) } else { (j, i) };
                    latest.insert(belief.key.as_str(), winner);
                    report.actions.push(ResolutionAction::Superseded {
                        winner: beliefs[winner].id,
                        loser: beliefs[loser].id,
                    });
                }
                None => {
                    latest.insert(belief.key.as_str(), i);
                }
            }
        }
        let superseded: HashSet<BeliefId> = report
            .actions
            .iter()
            .filter_map(|action| match action {
                ResolutionAction::Superseded { loser, .. } => Some(*loser),
                _ => None,
            })
            .collect();

        report.retained = beliefs
            .into_iter()
            .filter(|b| !dropped.contains(&b.id) && !superseded.contains(&b.id))
            .collect();
        report
    }

    fn keep_first(&self, kind: ConflictKind, a: &Belief, b: &Belief) -> bool {
        match kind {
            ConflictKind::LogicalInconsistency => self.prefer_specific(a, b),
            ConflictKind::TemporalConflict => prefer_later_interval(a, b),
            ConflictKind::Contradiction | ConflictKind::OntologyViolation => prefer_confident(a, b),
        }
    }

    /// Keeps the more ontology-specific value, falling back to certainty then recency
    fn prefer_specific(&self, a: &Belief, b: &Belief) -> bool {
        let sa = self.ontology.value_specificity(&a.value);
        let sb = self.ontology.value_specificity(&b.value);
        match sa.cmp(&sb) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => prefer_confident(a, b),
        }
    }
}

/// Higher certainty wins; equal certainty falls to the most recent, then the later candidate
fn prefer_confident(a: &Belief, b: &Belief) -> bool {
    match a.certainty.total_cmp(&b.certainty) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => a.last_updated > b.last_updated,
    }
}

/// Later-ending interval wins; equal ends fall to the most recently updated
fn prefer_later_interval(a: &Belief, b: &Belief) -> bool {
    let end_a = a.validity.map(|v| v.end);
    let end_b = b.validity.map(|v| v.end);
    match end_a.cmp(&end_b) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => a.last_updated > b.last_updated,
    }
}

/// Whether `candidate` should replace `current` under the same key
fn supersedes(candidate: &Belief, current: &Belief) -> bool {
    match candidate.last_updated.cmp(&current.last_updated) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => candidate.certainty >= current.certainty,
    }
}
