//! Chance nodes: uniform or explicit distributions, plus the per-key tables
//! used when distributed chance decisions are collapsed.

use std::ops::RangeInclusive;
use std::sync::{PoisonError, RwLock};

use rustc_hash::FxHashMap;

use crate::cfr::error::{SolverError, SolverResult};
use crate::cfr::nodes::PROBABILITY_TOLERANCE;

/// Distribution over a chance decision's actions.
#[derive(Debug, Clone, PartialEq)]
pub enum ChanceProbabilities {
    /// Every action has probability `1 / num_actions`.
    Uniform,
    /// One probability per action, indexed by `action - 1`.
    Explicit(Box<[f64]>),
}

/// Probability vectors accumulated per distributor-chance-input key.
#[derive(Debug, Default, Clone)]
struct DistributorTable {
    vectors: FxHashMap<u32, Vec<f64>>,
    normalized: bool,
}

/// A chance decision as reached through a particular chance key.
#[derive(Debug)]
pub struct ChanceNode {
    id: usize,
    decision_index: usize,
    num_actions: u8,
    pinned: bool,
    probabilities: ChanceProbabilities,
    distributor: RwLock<DistributorTable>,
}

impl ChanceNode {
    /// Create a chance node, checking that an explicit distribution is valid.
    ///
    /// `pinned` marks a distributed decision that is only descended through
    /// action 1.
    pub fn new(
        id: usize,
        decision_index: usize,
        num_actions: u8,
        pinned: bool,
        probabilities: Option<Vec<f64>>,
    ) -> SolverResult<Self> {
        let probabilities = match probabilities {
            None => ChanceProbabilities::Uniform,
            Some(p) => {
                check_distribution(decision_index, num_actions, &p)?;
                ChanceProbabilities::Explicit(p.into_boxed_slice())
            }
        };
        Ok(Self {
            id,
            decision_index,
            num_actions,
            pinned,
            probabilities,
            distributor: RwLock::new(DistributorTable::default()),
        })
    }

    /// Stable id assigned by the store.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Index of the decision in the game definition.
    pub fn decision_index(&self) -> usize {
        self.decision_index
    }

    /// Number of actions.
    pub fn num_actions(&self) -> u8 {
        self.num_actions
    }

    /// Whether only action 1 is descended.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// The stored distribution.
    pub fn distribution(&self) -> &ChanceProbabilities {
        &self.probabilities
    }

    /// Probability of `action` (1-based) under the stored distribution.
    pub fn probability(&self, action: u8) -> f64 {
        match &self.probabilities {
            ChanceProbabilities::Uniform => 1.0 / self.num_actions as f64,
            ChanceProbabilities::Explicit(p) => p[action as usize - 1],
        }
    }

    /// The stored distribution as a vector.
    pub fn probabilities(&self) -> Vec<f64> {
        (1..=self.num_actions).map(|a| self.probability(a)).collect()
    }

    /// Actions a traversal descends into.
    pub fn branch_actions(&self) -> RangeInclusive<u8> {
        if self.pinned {
            1..=1
        } else {
            1..=self.num_actions
        }
    }

    /// Probability attached to descending through `action`.
    ///
    /// A pinned node's single branch stands for every outcome, so it carries
    /// probability 1.
    pub fn branch_probability(&self, action: u8) -> f64 {
        if self.pinned {
            1.0
        } else {
            self.probability(action)
        }
    }

    /// Add `weight * probabilities` to the vector kept for `key`.
    pub fn accumulate_distributor_probabilities(
        &self,
        key: u32,
        weight: f64,
        probabilities: &[f64],
    ) -> SolverResult<()> {
        if probabilities.len() != self.num_actions as usize {
            return Err(SolverError::ActionCountMismatch {
                decision_index: self.decision_index,
                expected: self.num_actions as usize,
                actual: probabilities.len(),
            });
        }
        let mut table = self
            .distributor
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = table
            .vectors
            .entry(key)
            .or_insert_with(|| vec![0.0; probabilities.len()]);
        for (sum, p) in entry.iter_mut().zip(probabilities) {
            *sum += weight * p;
        }
        table.normalized = false;
        Ok(())
    }

    /// Rescale every accumulated vector to sum to 1. Returns the key count.
    ///
    /// Vectors that accumulated no weight are dropped, so lookups for those
    /// keys fall back to the stored distribution.
    pub fn normalize_distributor_probabilities(&self) -> usize {
        let mut table = self
            .distributor
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        table.vectors.retain(|_, v| v.iter().sum::<f64>() > 0.0);
        for v in table.vectors.values_mut() {
            let total: f64 = v.iter().sum();
            v.iter_mut().for_each(|p| *p /= total);
        }
        table.normalized = true;
        table.vectors.len()
    }

    /// Aggregated distribution for `key`, once normalized.
    pub fn distributor_probabilities(&self, key: u32) -> Option<Vec<f64>> {
        let table = self
            .distributor
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if !table.normalized {
            return None;
        }
        table.vectors.get(&key).cloned()
    }

    /// Probability of `action` given `key`, falling back to the stored
    /// distribution when no aggregated vector exists.
    pub fn distributor_probability(&self, key: u32, action: u8) -> f64 {
        let table = self
            .distributor
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match table.vectors.get(&key) {
            Some(v) if table.normalized => v[action as usize - 1],
            _ => self.probability(action),
        }
    }

    /// Keys with an aggregated vector.
    pub fn distributor_keys(&self) -> Vec<u32> {
        let table = self
            .distributor
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<u32> = table.vectors.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Drop every aggregated vector.
    pub fn clear_distributor_probabilities(&self) {
        let mut table = self
            .distributor
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *table = DistributorTable::default();
    }
}

/// Check length and sum of a distribution supplied for `decision_index`.
pub(crate) fn check_distribution(
    decision_index: usize,
    num_actions: u8,
    probabilities: &[f64],
) -> SolverResult<()> {
    if probabilities.len() != num_actions as usize {
        return Err(SolverError::ActionCountMismatch {
            decision_index,
            expected: num_actions as usize,
            actual: probabilities.len(),
        });
    }
    let sum: f64 = probabilities.iter().sum();
    if (sum - 1.0).abs() > PROBABILITY_TOLERANCE || probabilities.iter().any(|p| *p < 0.0) {
        return Err(SolverError::ChanceProbabilities {
            decision_index,
            sum,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_is_computed() {
        let node = ChanceNode::new(0, 0, 4, false, None).unwrap();
        assert_eq!(node.probability(3), 0.25);
        assert_eq!(node.distribution(), &ChanceProbabilities::Uniform);
        assert_eq!(node.branch_actions(), 1..=4);
    }

    #[test]
    fn test_explicit_must_sum_to_one() {
        assert!(ChanceNode::new(0, 2, 2, false, Some(vec![0.3, 0.7])).is_ok());
        let err = ChanceNode::new(0, 2, 2, false, Some(vec![0.3, 0.6])).unwrap_err();
        assert!(matches!(err, SolverError::ChanceProbabilities { decision_index: 2, .. }));
        assert!(ChanceNode::new(0, 2, 3, false, Some(vec![0.5, 0.5])).is_err());
    }

    #[test]
    fn test_pinned_branches_once_with_certainty() {
        let node = ChanceNode::new(0, 0, 3, true, Some(vec![0.2, 0.3, 0.5])).unwrap();
        assert_eq!(node.branch_actions(), 1..=1);
        assert_eq!(node.branch_probability(1), 1.0);
        assert_eq!(node.probability(1), 0.2);
    }

    #[test]
    fn test_distributor_accumulation_normalizes_per_key() {
        let node = ChanceNode::new(0, 1, 2, true, None).unwrap();
        node.accumulate_distributor_probabilities(1, 0.3, &[0.8, 0.2]).unwrap();
        node.accumulate_distributor_probabilities(2, 0.7, &[0.4, 0.6]).unwrap();
        node.accumulate_distributor_probabilities(2, 0.1, &[0.0, 1.0]).unwrap();
        assert_eq!(node.distributor_probabilities(1), None);

        assert_eq!(node.normalize_distributor_probabilities(), 2);
        let one = node.distributor_probabilities(1).unwrap();
        assert!((one[0] - 0.8).abs() < 1e-12);
        let two = node.distributor_probabilities(2).unwrap();
        assert!((two[0] - 0.28 / 0.8).abs() < 1e-12);
        assert!((two.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(node.distributor_probability(9, 1), 0.5);
        assert_eq!(node.distributor_keys(), vec![1, 2]);
    }
}
