//! Exploration solutions and explorer biddings.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash;

use super::model::DecisionModel;

/// One point of the explored trade-off space.
///
/// Pairs an objective-name→value map with the decision model instance
/// that achieves it. Objective keys are unique by construction of the
/// map; all objectives are minimized.
#[derive(Clone)]
pub struct ExplorationSolution {
    /// Objective values, keyed by objective name.
    pub objectives: BTreeMap<String, f64>,
    /// The solved decision model.
    pub solved: Arc<dyn DecisionModel>,
}

impl ExplorationSolution {
    /// Pair objectives with a solved model.
    pub fn new(objectives: BTreeMap<String, f64>, solved: Arc<dyn DecisionModel>) -> Self {
        Self { objectives, solved }
    }

    /// Strict Pareto dominance.
    ///
    /// Holds iff both solutions score the same objective set, this one
    /// is less than or equal on every objective, and strictly less on
    /// at least one. Irreflexive and antisymmetric.
    pub fn dominates(&self, other: &ExplorationSolution) -> bool {
        if self.objectives.len() != other.objectives.len()
            || !self
                .objectives
                .keys()
                .all(|k| other.objectives.contains_key(k))
        {
            return false;
        }
        let all_leq = self
            .objectives
            .iter()
            .all(|(k, v)| v <= &other.objectives[k]);
        let one_less = self
            .objectives
            .iter()
            .any(|(k, v)| v < &other.objectives[k]);
        all_leq && one_less
    }

    /// Stable fingerprint of the (objectives, model) pair.
    ///
    /// Used to guarantee the same pair is never emitted twice within
    /// one exploration call.
    pub fn fingerprint(&self) -> u64 {
        let objective_bits: Vec<(&String, u64)> = self
            .objectives
            .iter()
            .map(|(k, v)| (k, v.to_bits()))
            .collect();
        canonical_hash(&(
            &objective_bits,
            self.solved.category(),
            self.solved.body_as_json(),
        ))
    }
}

impl std::fmt::Debug for ExplorationSolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplorationSolution")
            .field("objectives", &self.objectives)
            .field("solved", &self.solved.category())
            .finish()
    }
}

impl PartialEq for ExplorationSolution {
    fn eq(&self, other: &Self) -> bool {
        self.objectives == other.objectives && self.solved.as_ref() == other.solved.as_ref()
    }
}

/// An explorer's declared capability for a decision model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationBidding {
    /// The bidding explorer.
    pub explorer_unique_identifier: String,
    /// Whether the explorer can search this model at all.
    pub can_explore: bool,
    /// Whether the result would be provably optimal.
    pub is_exact: bool,
    /// Self-declared competitiveness, higher is better.
    pub competitiveness: f64,
    /// Objective names the explorer can target.
    pub target_objectives: BTreeSet<String>,
    /// Auxiliary numeric properties, higher is better.
    pub additional_numeric_properties: BTreeMap<String, f64>,
}

impl ExplorationBidding {
    /// A bidding that declines the model.
    pub fn declined(explorer: impl Into<String>) -> Self {
        Self {
            explorer_unique_identifier: explorer.into(),
            can_explore: false,
            is_exact: false,
            competitiveness: 0.0,
            target_objectives: BTreeSet::new(),
            additional_numeric_properties: BTreeMap::new(),
        }
    }

    /// Dominance among competing biddings.
    ///
    /// A capable bidding beats an incapable one; an exact bidding beats
    /// a heuristic one; otherwise the bidding must be at least as
    /// competitive and at least as good on every shared auxiliary
    /// property.
    pub fn dominates(&self, other: &ExplorationBidding) -> bool {
        if !self.can_explore {
            return false;
        }
        if !other.can_explore {
            return true;
        }
        if self.is_exact != other.is_exact {
            return self.is_exact;
        }
        self.competitiveness >= other.competitiveness
            && self.additional_numeric_properties.iter().all(|(k, v)| {
                other
                    .additional_numeric_properties
                    .get(k)
                    .map(|o| v >= o)
                    .unwrap_or(true)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::model::OpaqueDecisionModel;

    fn solution(pairs: &[(&str, f64)]) -> ExplorationSolution {
        ExplorationSolution::new(
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            Arc::new(OpaqueDecisionModel {
                category: "Solved".to_string(),
                part: BTreeSet::new(),
                body_json: None,
                body_cbor: None,
            }),
        )
    }

    #[test]
    fn test_dominance_strict() {
        let a = solution(&[("x", 1.0), ("y", 2.0)]);
        let b = solution(&[("x", 1.0), ("y", 3.0)]);
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
    }

    #[test]
    fn test_dominance_irreflexive() {
        let a = solution(&[("x", 1.0)]);
        assert!(!a.dominates(&a));
    }

    #[test]
    fn test_dominance_requires_same_objectives() {
        let a = solution(&[("x", 0.0)]);
        let b = solution(&[("x", 1.0), ("y", 1.0)]);
        assert!(!a.dominates(&b));
        assert!(!b.dominates(&a));
    }

    #[test]
    fn test_dominance_incomparable() {
        let a = solution(&[("x", 1.0), ("y", 3.0)]);
        let b = solution(&[("x", 2.0), ("y", 2.0)]);
        assert!(!a.dominates(&b));
        assert!(!b.dominates(&a));
    }

    #[test]
    fn test_fingerprint_distinguishes_objectives() {
        let a = solution(&[("x", 1.0)]);
        let b = solution(&[("x", 2.0)]);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.fingerprint());
    }

    #[test]
    fn test_bidding_capability_gates() {
        let can = ExplorationBidding {
            explorer_unique_identifier: "e1".to_string(),
            can_explore: true,
            is_exact: false,
            competitiveness: 1.0,
            target_objectives: BTreeSet::new(),
            additional_numeric_properties: BTreeMap::new(),
        };
        let cannot = ExplorationBidding::declined("e2");
        assert!(can.dominates(&cannot));
        assert!(!cannot.dominates(&can));
    }

    #[test]
    fn test_bidding_exactness_beats_heuristic() {
        let exact = ExplorationBidding {
            explorer_unique_identifier: "e1".to_string(),
            can_explore: true,
            is_exact: true,
            competitiveness: 0.5,
            target_objectives: BTreeSet::new(),
            additional_numeric_properties: BTreeMap::new(),
        };
        let heuristic = ExplorationBidding {
            explorer_unique_identifier: "e2".to_string(),
            can_explore: true,
            is_exact: false,
            competitiveness: 2.0,
            target_objectives: BTreeSet::new(),
            additional_numeric_properties: BTreeMap::new(),
        };
        assert!(exact.dominates(&heuristic));
        assert!(!heuristic.dominates(&exact));
    }
}
