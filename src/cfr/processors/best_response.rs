//! Best response by full tree walks.
//!
//! The responding player's decisions are resolved one decision index at a
//! time, deepest first. Each walk accumulates, at every node of the current
//! layer, the opponent-reach-weighted value of each action given the actions
//! already fixed below it. A final walk reads off the best-response value.
//!
//! This is the reference the accelerated engine is checked against.

use log::debug;

use crate::cfr::error::SolverResult;
use crate::cfr::game::GameDefinition;
use crate::cfr::navigation::Navigation;
use crate::cfr::nodes::{ChanceNode, Dimension, FinalUtilitiesNode, InformationSetNode};
use crate::cfr::processors::{StrategySource, UtilityCalculator};
use crate::cfr::tree_walk::{TreeNodeProcessor, TreeWalk, Visit};

/// One walk of the layered best response for `player`.
///
/// Forward is the probability that chance and the opponents play to the
/// position; back is the value for `player`.
#[derive(Debug, Clone, Copy)]
pub struct BestResponseLayer {
    player: usize,
    layer: Option<usize>,
}

impl BestResponseLayer {
    /// Accumulate best-response rows at decision `layer`, or with `None`
    /// only evaluate the stored best-response actions.
    pub fn new(player: usize, layer: Option<usize>) -> Self {
        Self { player, layer }
    }

    fn reach(&self, visit: &Visit<'_>, parent: f64) -> f64 {
        match visit.information_set_edge() {
            Some((node, _)) if node.player() == self.player => parent,
            Some((node, action)) => parent * node.get(Dimension::AverageStrategyProbability, action),
            None => parent * visit.chance_edge_probability(),
        }
    }
}

impl TreeNodeProcessor for BestResponseLayer {
    type Forward = f64;
    type Back = f64;

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
    ) -> SolverResult<f64> {
        Ok(node.utility(self.player))
    }

    fn chance_backward(
        &self,
        node: &ChanceNode,
        _visit: &Visit<'_>,
        _reach: &f64,
        children: Vec<f64>,
    ) -> SolverResult<f64> {
        Ok(node
            .branch_actions()
            .zip(children)
            .map(|(action, v)| node.branch_probability(action) * v)
            .sum())
    }

    fn information_set_backward(
        &self,
        node: &InformationSetNode,
        _visit: &Visit<'_>,
        reach: &f64,
        children: Vec<f64>,
    ) -> SolverResult<f64> {
        if node.player() != self.player {
            return Ok((1..=node.num_actions())
                .zip(children)
                .map(|(action, v)| node.get(Dimension::AverageStrategyProbability, action) * v)
                .sum());
        }
        match self.layer {
            Some(layer) if node.decision_index() == layer => {
                let mut best = f64::NEG_INFINITY;
                for (action, v) in (1..=node.num_actions()).zip(children) {
                    node.accumulate_best_response(action, *reach, v);
                    best = best.max(v);
                }
                Ok(best)
            }
            // Above the layer the value is not used.
            Some(layer) if node.decision_index() < layer => {
                Ok(children.first().copied().unwrap_or(0.0))
            }
            _ => {
                let action = node.best_response_action() as usize;
                Ok(children.get(action - 1).copied().unwrap_or(0.0))
            }
        }
    }
}

/// Best response and exploitability by repeated full tree walks.
#[derive(Debug, Default)]
pub struct BruteForceBestResponse;

impl BruteForceBestResponse {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }

    /// Best-response value for `player` against the stored average
    /// strategies. Leaves every best-response action of `player` set.
    pub fn best_response_value<G: GameDefinition>(
        &self,
        navigation: &Navigation<G>,
        player: usize,
    ) -> SolverResult<f64> {
        let walk = TreeWalk::new(navigation);
        let mut layers: Vec<usize> = navigation
            .store()
            .information_sets()
            .iter()
            .filter(|n| n.player() == player)
            .map(|n| n.decision_index())
            .collect();
        layers.sort_unstable();
        layers.dedup();

        for &layer in layers.iter().rev() {
            let nodes: Vec<_> = navigation
                .store()
                .information_sets()
                .into_iter()
                .filter(|n| n.player() == player && n.decision_index() == layer)
                .collect();
            nodes.iter().for_each(|n| n.reset_best_response());
            walk.walk(&BestResponseLayer::new(player, Some(layer)), 1.0)?;
            nodes.iter().for_each(|n| {
                n.determine_best_response_action();
            });
        }
        let value = walk.walk(&BestResponseLayer::new(player, None), 1.0)?;
        debug!(
            "brute-force best response for player {}: {} layer(s), value {:.6}",
            player,
            layers.len(),
            value
        );
        Ok(value)
    }

    /// Sum over players of best-response value minus average-strategy value.
    pub fn exploitability<G: GameDefinition>(&self, navigation: &Navigation<G>) -> SolverResult<f64> {
        let average = TreeWalk::new(navigation).walk(&UtilityCalculator::new(StrategySource::Average), 1.0)?;
        let mut total = 0.0;
        for player in 0..navigation.num_players() {
            total += self.best_response_value(navigation, player)? - average[player];
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfr::config::CFRConfig;
    use crate::cfr::nodes::NodeStore;
    use crate::games::kuhn::KuhnPoker;

    fn kuhn() -> Navigation<KuhnPoker> {
        let nav = Navigation::new(KuhnPoker::new(), NodeStore::new(&CFRConfig::default()));
        TreeWalk::new(&nav)
            .walk(&UtilityCalculator::new(StrategySource::Average), 1.0)
            .unwrap();
        nav
    }

    #[test]
    fn test_best_response_to_uniform_kuhn() {
        let nav = kuhn();
        let engine = BruteForceBestResponse::new();
        let br0 = engine.best_response_value(&nav, 0).unwrap();
        let br1 = engine.best_response_value(&nav, 1).unwrap();
        // Uniform play is exploitable by both players.
        assert!(br0 > 0.125);
        assert!(br1 > -0.125);
        let exploitability = engine.exploitability(&nav).unwrap();
        assert!((exploitability - (br0 + br1)).abs() < 1e-12);
        assert!(exploitability > 0.0);
    }

    #[test]
    fn test_best_response_value_matches_best_response_profile() {
        let nav = kuhn();
        let engine = BruteForceBestResponse::new();
        for player in 0..2 {
            let br = engine.best_response_value(&nav, player).unwrap();
            let profile = TreeWalk::new(&nav)
                .walk(&UtilityCalculator::new(StrategySource::BestResponse(player)), 1.0)
                .unwrap();
            assert!((br - profile[player]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_king_always_bets_against_uniform() {
        let nav = kuhn();
        BruteForceBestResponse::new().best_response_value(&nav, 1).unwrap();
        // Player 1 holding the king facing a bet calls.
        let node = nav
            .store()
            .find_information_set(3, &b"2:b".to_vec())
            .unwrap();
        assert_eq!(node.best_response_action(), 2);
    }
}
