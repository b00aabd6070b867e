//! One simultaneous-update CFR traversal.
//!
//! Reach probabilities flow down and utility vectors flow up. At every
//! information set the owner's counterfactual regret and pending
//! cumulative-strategy increment are accumulated; nothing is committed until
//! the driver runs the per-stratum update after the walk.

use crate::cfr::error::SolverResult;
use crate::cfr::game::MAX_NUM_ACTIONS;
use crate::cfr::nodes::{ChanceNode, Dimension, FinalUtilitiesNode, InformationSetNode};
use crate::cfr::tree_walk::{TreeNodeProcessor, Visit};

/// Reach of a position, split by who is responsible for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachProbabilities {
    /// Product of each player's own current-strategy probabilities.
    pub own: Vec<f64>,
    /// Product of each player's probabilities as published to opponents.
    pub published: Vec<f64>,
    /// Product of chance probabilities.
    pub chance: f64,
}

impl ReachProbabilities {
    /// Reach of the root for `num_players` players.
    pub fn root(num_players: usize) -> Self {
        Self {
            own: vec![1.0; num_players],
            published: vec![1.0; num_players],
            chance: 1.0,
        }
    }

    /// Probability that chance and everyone except `player` play here.
    pub fn opponent_reach(&self, player: usize) -> f64 {
        self.published
            .iter()
            .enumerate()
            .filter(|(q, _)| *q != player)
            .fold(self.chance, |acc, (_, p)| acc * p)
    }

    fn extend(&self, visit: &Visit<'_>) -> Self {
        let mut next = self.clone();
        match visit.information_set_edge() {
            Some((node, action)) => {
                let q = node.player();
                next.own[q] *= node.get(Dimension::CurrentProbability, action);
                next.published[q] *= node.get(Dimension::CurrentProbabilityForOpponent, action);
            }
            None => next.chance *= visit.chance_edge_probability(),
        }
        next
    }
}

/// Accumulates regret and cumulative strategy for every player at once.
#[derive(Debug, Clone, Copy)]
pub struct RegretUpdateProcessor {
    regret_factor: f64,
}

impl RegretUpdateProcessor {
    /// Scale this iteration's regret increments by `regret_factor`.
    pub fn new(regret_factor: f64) -> Self {
        Self { regret_factor }
    }
}

impl TreeNodeProcessor for RegretUpdateProcessor {
    type Forward = ReachProbabilities;
    type Back = Vec<f64>;

    fn chance_forward(
        &self,
        _node: &ChanceNode,
        visit: &Visit<'_>,
        reach: &ReachProbabilities,
    ) -> SolverResult<ReachProbabilities> {
        Ok(reach.extend(visit))
    }

    fn information_set_forward(
        &self,
        _node: &InformationSetNode,
        visit: &Visit<'_>,
        reach: &ReachProbabilities,
    ) -> SolverResult<ReachProbabilities> {
        Ok(reach.extend(visit))
    }

    fn final_utilities_turn_around(
        &self,
        node: &FinalUtilitiesNode,
        _visit: &Visit<'_>,
        _reach: &ReachProbabilities,
    ) -> SolverResult<Vec<f64>> {
        Ok(node.utilities())
    }

    fn chance_backward(
        &self,
        node: &ChanceNode,
        _visit: &Visit<'_>,
        _reach: &ReachProbabilities,
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
        reach: &ReachProbabilities,
        children: Vec<Vec<f64>>,
    ) -> SolverResult<Vec<f64>> {
        let n = node.num_actions() as usize;
        let player = node.player();
        let mut current_buf = [0.0; MAX_NUM_ACTIONS];
        let current = &mut current_buf[..n];
        node.distribution_into(Dimension::CurrentProbability, current)?;
        let mut published_buf = [0.0; MAX_NUM_ACTIONS];
        let published = &mut published_buf[..n];
        node.distribution_into(Dimension::CurrentProbabilityForOpponent, published)?;

        let width = children.first().map_or(0, Vec::len);
        let mut value = vec![0.0; width];
        for (i, child) in children.iter().enumerate() {
            for (q, (v, u)) in value.iter_mut().zip(child).enumerate() {
                let p = if q == player { current[i] } else { published[i] };
                *v += p * u;
            }
        }

        let opponent_reach = reach.opponent_reach(player);
        let own_reach = reach.own[player];
        for (i, child) in children.iter().enumerate() {
            let action = i as u8 + 1;
            node.accumulate_regret(
                action,
                opponent_reach,
                child[player],
                value[player],
                self.regret_factor,
            );
            node.accumulate_cumulative_strategy_increment(action, own_reach * current[i]);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfr::config::CFRConfig;
    use crate::cfr::navigation::Navigation;
    use crate::cfr::nodes::NodeStore;
    use crate::cfr::tree_walk::TreeWalk;
    use crate::games::kuhn::KuhnPoker;

    fn walked() -> (Navigation<KuhnPoker>, Vec<f64>) {
        let nav = Navigation::new(KuhnPoker::new(), NodeStore::new(&CFRConfig::default()));
        let root = TreeWalk::new(&nav)
            .walk(&RegretUpdateProcessor::new(1.0), ReachProbabilities::root(2))
            .unwrap();
        (nav, root)
    }

    #[test]
    fn test_root_value_is_current_profile_value() {
        let (_, root) = walked();
        assert!((root[0] - 0.125).abs() < 1e-12);
        assert!((root[0] + root[1]).abs() < 1e-12);
    }

    #[test]
    fn test_strategy_weighted_regret_is_zero() {
        let (nav, _) = walked();
        for node in nav.store().information_sets() {
            let weighted: f64 = (1..=node.num_actions())
                .map(|a| {
                    node.get(Dimension::CurrentProbability, a)
                        * node.get(Dimension::CumulativeRegret, a)
                })
                .sum();
            assert!(weighted.abs() < 1e-12, "node {}", node.id());
        }
    }

    #[test]
    fn test_pending_increments_use_own_reach() {
        let (nav, _) = walked();
        let first = nav.store().find_information_set(2, &b"1:".to_vec()).unwrap();
        let second = nav.store().find_information_set(4, &b"1:pb".to_vec()).unwrap();
        let response = nav.store().find_information_set(3, &b"1:p".to_vec()).unwrap();
        for action in 1..=2 {
            let pending = Dimension::LastCumulativeStrategyIncrement;
            // Every deal of the queen to a player is visited twice.
            assert!((first.get(pending, action) - 1.0).abs() < 1e-12);
            assert!((response.get(pending, action) - 1.0).abs() < 1e-12);
            assert!((second.get(pending, action) - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_king_regrets_passing() {
        let (nav, _) = walked();
        let king = nav.store().find_information_set(2, &b"2:".to_vec()).unwrap();
        assert!(king.get(Dimension::CumulativeRegret, 2) > 0.0);
        assert!(king.get(Dimension::CumulativeRegret, 1) < 0.0);
    }
}
