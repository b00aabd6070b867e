//! Aggregation of distributed chance decisions.
//!
//! With chance distribution enabled, each distributed decision is pinned to
//! action 1 and shared across every distributor-chance-input key. One walk
//! collects, per key, the chance-reach-weighted sum of the true outcome
//! distributions seen at the pinned node; the sums are then normalized so
//! later lookups by key return a proper distribution.

use log::info;

use crate::cfr::error::SolverResult;
use crate::cfr::game::GameDefinition;
use crate::cfr::navigation::Navigation;
use crate::cfr::nodes::{ChanceNode, FinalUtilitiesNode, InformationSetNode};
use crate::cfr::tree_walk::{TreeNodeProcessor, TreeWalk, Visit};

/// Forward value is the chance reach of the position; players' actions
/// count with probability one.
#[derive(Debug, Default)]
pub struct DistributedChanceAggregator;

impl DistributedChanceAggregator {
    /// Create the processor.
    pub fn new() -> Self {
        Self
    }

    /// Rebuild the per-key tables of every pinned chance node. Returns the
    /// number of (node, key) vectors produced.
    pub fn aggregate<G: GameDefinition>(navigation: &Navigation<G>) -> SolverResult<usize> {
        if !navigation.distributes_chance() {
            return Ok(0);
        }
        for node in navigation.store().chance_nodes() {
            node.clear_distributor_probabilities();
        }
        TreeWalk::new(navigation).walk(&Self::new(), 1.0)?;

        let mut vectors = 0;
        let mut pinned = 0;
        for node in navigation.store().chance_nodes() {
            if node.is_pinned() {
                pinned += 1;
                vectors += node.normalize_distributor_probabilities();
            }
        }
        info!(
            "aggregated {} distributed chance node(s) into {} keyed distribution(s)",
            pinned, vectors
        );
        Ok(vectors)
    }
}

impl TreeNodeProcessor for DistributedChanceAggregator {
    type Forward = f64;
    type Back = ();

    fn chance_forward(&self, node: &ChanceNode, visit: &Visit<'_>, reach: &f64) -> SolverResult<f64> {
        let reach = reach * visit.chance_edge_probability();
        if let Some(truth) = visit.true_probabilities {
            if reach > 0.0 {
                node.accumulate_distributor_probabilities(visit.distributor_key, reach, truth)?;
            }
        }
        Ok(reach)
    }

    fn information_set_forward(
        &self,
        _node: &InformationSetNode,
        visit: &Visit<'_>,
        reach: &f64,
    ) -> SolverResult<f64> {
        Ok(reach * visit.chance_edge_probability())
    }

    fn final_utilities_turn_around(
        &self,
        _node: &FinalUtilitiesNode,
        _visit: &Visit<'_>,
        _reach: &f64,
    ) -> SolverResult<()> {
        Ok(())
    }

    fn chance_backward(
        &self,
        _node: &ChanceNode,
        _visit: &Visit<'_>,
        _reach: &f64,
        _children: Vec<()>,
    ) -> SolverResult<()> {
        Ok(())
    }

    fn information_set_backward(
        &self,
        _node: &InformationSetNode,
        _visit: &Visit<'_>,
        _reach: &f64,
        _children: Vec<()>,
    ) -> SolverResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfr::config::{CFRConfig, NavigationMode};
    use crate::cfr::nodes::{GameNode, NodeStore};
    use crate::cfr::processors::{StrategySource, UtilityCalculator};
    use crate::games::signals::SignalsGame;
    use rstest::rstest;

    fn navigation(distribute: bool, mode: NavigationMode) -> Navigation<SignalsGame> {
        let config = CFRConfig::default()
            .with_distributed_chance(distribute)
            .with_navigation(mode);
        Navigation::new(SignalsGame::new(), NodeStore::new(&config))
    }

    #[rstest]
    #[case(NavigationMode::CachedTree)]
    #[case(NavigationMode::CachedHistory)]
    #[case(NavigationMode::Verified)]
    fn test_aggregate_matches_direct_distribution(#[case] mode: NavigationMode) {
        let nav = navigation(true, mode);
        assert_eq!(DistributedChanceAggregator::aggregate(&nav).unwrap(), 2);

        let pinned: Vec<_> = nav
            .store()
            .chance_nodes()
            .into_iter()
            .filter(|c| c.is_pinned())
            .collect();
        assert_eq!(pinned.len(), 1);
        let verdict = &pinned[0];
        assert_eq!(verdict.distributor_keys(), vec![1, 2]);

        let game = SignalsGame::new();
        for quality in 1..=2u8 {
            let direct = game.verdict_probabilities(quality);
            let aggregated = verdict.distributor_probabilities(quality as u32).unwrap();
            for (a, d) in aggregated.iter().zip(&direct) {
                assert!((a - d).abs() < 1e-12, "{:?} vs {:?}", aggregated, direct);
            }
        }
    }

    #[test]
    fn test_no_pinned_nodes_without_distribution() {
        let nav = navigation(false, NavigationMode::CachedTree);
        assert_eq!(DistributedChanceAggregator::aggregate(&nav).unwrap(), 0);
        TreeWalk::new(&nav).walk(&DistributedChanceAggregator::new(), 1.0).unwrap();
        assert!(nav.store().chance_nodes().iter().all(|c| !c.is_pinned()));
    }

    #[test]
    fn test_pinning_preserves_expected_values() {
        let collapsed = navigation(true, NavigationMode::CachedTree);
        let full = navigation(false, NavigationMode::CachedTree);
        DistributedChanceAggregator::aggregate(&collapsed).unwrap();
        let a = TreeWalk::new(&collapsed)
            .walk(&UtilityCalculator::new(StrategySource::Current), 1.0)
            .unwrap();
        let b = TreeWalk::new(&full)
            .walk(&UtilityCalculator::new(StrategySource::Current), 1.0)
            .unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-12);
        }
        assert!(collapsed.store().num_leaves() < full.store().num_leaves());

        let leaf = collapsed.follow(&[1, 1, 2, 1]).unwrap();
        assert!(matches!(leaf.node(), GameNode::FinalUtilities(_)));
        assert!(leaf.below_pinned_decision());
    }

    #[rstest]
    #[case(NavigationMode::CachedTree)]
    #[case(NavigationMode::GamePlayer)]
    fn test_leaf_values_follow_keyed_tables(#[case] mode: NavigationMode) {
        let nav = navigation(true, mode);
        DistributedChanceAggregator::aggregate(&nav).unwrap();
        let calculator = UtilityCalculator::new(StrategySource::Current);
        let aggregated = TreeWalk::new(&nav).walk(&calculator, 1.0).unwrap();

        let verdict = nav
            .store()
            .chance_nodes()
            .into_iter()
            .find(|c| c.is_pinned())
            .unwrap();
        verdict.clear_distributor_probabilities();
        for quality in 1..=2 {
            verdict
                .accumulate_distributor_probabilities(quality, 1.0, &[1.0, 0.0])
                .unwrap();
        }
        verdict.normalize_distributor_probabilities();
        let claimant_always_wins = TreeWalk::new(&nav).walk(&calculator, 1.0).unwrap();
        assert!(claimant_always_wins[0] > aggregated[0] + 0.05);
        assert!(claimant_always_wins[1] < aggregated[1] - 0.05);

        let leaf = nav.follow(&[2, 1, 2, 1]).unwrap();
        match leaf.node() {
            GameNode::FinalUtilities(leaf) => assert_eq!(leaf.utilities(), vec![1.0, -1.0]),
            other => panic!("expected a leaf, found {}", other.describe()),
        }
    }
}
