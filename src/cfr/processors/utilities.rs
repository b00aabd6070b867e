//! Expected payoffs under a chosen strategy profile.
//!
//! Besides the root value, the calculator records for every information set
//! the probability of reaching it and the reach-weighted expected payoff
//! vector of the histories it contains.

use std::sync::{Mutex, PoisonError};

use rustc_hash::FxHashMap;

use crate::cfr::error::SolverResult;
use crate::cfr::game::MAX_NUM_ACTIONS;
use crate::cfr::nodes::{ChanceNode, FinalUtilitiesNode, InformationSetNode};
use crate::cfr::processors::source_probability;
use crate::cfr::tree_walk::{TreeNodeProcessor, Visit};

/// Which strategy each information set plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategySource {
    /// Current strategy.
    Current,
    /// Average strategy.
    Average,
    /// The given player plays its stored best-response actions, everyone
    /// else the average strategy.
    BestResponse(usize),
}

/// Reach and payoff accumulated at one information set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InformationSetUtility {
    /// Probability of reaching any history in the set.
    pub reach: f64,
    /// Sum over histories of reach times payoff, per player.
    pub weighted_utilities: Vec<f64>,
}

impl InformationSetUtility {
    /// Expected payoffs given that the set is reached.
    pub fn expected(&self) -> Vec<f64> {
        if self.reach > 0.0 {
            self.weighted_utilities.iter().map(|u| u / self.reach).collect()
        } else {
            vec![0.0; self.weighted_utilities.len()]
        }
    }
}

/// Computes expected payoffs with `f64` arithmetic.
#[derive(Debug)]
pub struct UtilityCalculator {
    source: StrategySource,
    per_information_set: Mutex<FxHashMap<usize, InformationSetUtility>>,
}

impl UtilityCalculator {
    /// Evaluate the profile described by `source`.
    pub fn new(source: StrategySource) -> Self {
        Self {
            source,
            per_information_set: Mutex::new(FxHashMap::default()),
        }
    }

    /// Per-information-set results, keyed by node id.
    pub fn into_information_set_utilities(self) -> FxHashMap<usize, InformationSetUtility> {
        self.per_information_set
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn reach(&self, visit: &Visit<'_>, parent_reach: f64) -> f64 {
        let edge = match visit.information_set_edge() {
            Some((node, action)) => source_probability(node, self.source, action),
            None => visit.chance_edge_probability(),
        };
        parent_reach * edge
    }
}

impl TreeNodeProcessor for UtilityCalculator {
    type Forward = f64;
    type Back = Vec<f64>;

    fn chance_forward(&self, _node: &ChanceNode, visit: &Visit<'_>, reach: &f64) -> SolverResult<f64> {
        Ok(self.reach(visit, *reach))
    }

    fn information_set_forward(
        &self,
        _node: &InformationSetNode,
        visit: &Visit<'_>,
        reach: &f64,
    ) -> SolverResult<f64> {
        Ok(self.reach(visit, *reach))
    }

    fn final_utilities_turn_around(
        &self,
        node: &FinalUtilitiesNode,
        _visit: &Visit<'_>,
        _reach: &f64,
    ) -> SolverResult<Vec<f64>> {
        Ok(node.utilities())
    }

    fn chance_backward(
        &self,
        node: &ChanceNode,
        _visit: &Visit<'_>,
        _reach: &f64,
        children: Vec<Vec<f64>>,
    ) -> SolverResult<Vec<f64>> {
        let mut total = vec![0.0; children.first().map_or(0, Vec::len)];
        for (action, child) in node.branch_actions().zip(&children) {
            let p = node.branch_probability(action);
            for (t, u) in total.iter_mut().zip(child) {
                *t += p * u;
            }
        }
        Ok(total)
    }

    fn information_set_backward(
        &self,
        node: &InformationSetNode,
        _visit: &Visit<'_>,
        reach: &f64,
        children: Vec<Vec<f64>>,
    ) -> SolverResult<Vec<f64>> {
        let n = node.num_actions() as usize;
        let mut buf = [0.0; MAX_NUM_ACTIONS];
        let probs = &mut buf[..n];
        for (i, p) in probs.iter_mut().enumerate() {
            *p = source_probability(node, self.source, i as u8 + 1);
        }
        let mut value = vec![0.0; children.first().map_or(0, Vec::len)];
        for (p, child) in probs.iter().zip(&children) {
            for (v, u) in value.iter_mut().zip(child) {
                *v += p * u;
            }
        }

        let mut recorded = self
            .per_information_set
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let entry = recorded
            .entry(node.id())
            .or_insert_with(|| InformationSetUtility {
                reach: 0.0,
                weighted_utilities: vec![0.0; value.len()],
            });
        entry.reach += reach;
        for (w, v) in entry.weighted_utilities.iter_mut().zip(&value) {
            *w += reach * v;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfr::config::CFRConfig;
    use crate::cfr::navigation::Navigation;
    use crate::cfr::nodes::{Dimension, NodeStore};
    use crate::cfr::tree_walk::TreeWalk;
    use crate::games::kuhn::KuhnPoker;

    #[test]
    fn test_uniform_kuhn_value() {
        let nav = Navigation::new(KuhnPoker::new(), NodeStore::new(&CFRConfig::default()));
        let calculator = UtilityCalculator::new(StrategySource::Current);
        let root = TreeWalk::new(&nav).walk(&calculator, 1.0).unwrap();
        // Showdowns cancel across mirrored deals; only folds remain:
        // bet-fold wins 1 a quarter of the time, pass-bet-fold loses 1 an eighth.
        assert!((root[0] - 0.125).abs() < 1e-12);
        assert!((root[0] + root[1]).abs() < 1e-12);

        let per_set = calculator.into_information_set_utilities();
        assert_eq!(per_set.len(), 12);
        for utility in per_set.values() {
            assert!(utility.reach > 0.0 && utility.reach <= 1.0 / 3.0 + 1e-12);
        }
    }

    #[test]
    fn test_best_response_source_is_deterministic() {
        let nav = Navigation::new(KuhnPoker::new(), NodeStore::new(&CFRConfig::default()));
        TreeWalk::new(&nav)
            .walk(&UtilityCalculator::new(StrategySource::Average), 1.0)
            .unwrap();
        let node = &nav.store().information_sets()[0];
        node.set_best_response_action(2);
        assert_eq!(source_probability(node, StrategySource::BestResponse(node.player()), 2), 1.0);
        assert_eq!(source_probability(node, StrategySource::BestResponse(node.player()), 1), 0.0);
        assert_eq!(
            source_probability(node, StrategySource::BestResponse(1 - node.player()), 1),
            node.get(Dimension::AverageStrategyProbability, 1)
        );
    }
}
