//! Minimum and maximum achievable payoffs below every information set.
//!
//! Multiplicative weights normalizes each action's value with these bounds.

use crate::cfr::error::SolverResult;
use crate::cfr::nodes::{ChanceNode, FinalUtilitiesNode, InformationSetNode, UtilityBounds};
use crate::cfr::tree_walk::{TreeNodeProcessor, Visit};

/// Records [`UtilityBounds`] into every information set it passes.
#[derive(Debug, Default)]
pub struct MinMaxProcessor;

impl MinMaxProcessor {
    /// Create the processor.
    pub fn new() -> Self {
        Self
    }
}

fn merge_children(children: Vec<UtilityBounds>) -> UtilityBounds {
    let mut iter = children.into_iter();
    let mut merged = iter.next().unwrap_or(UtilityBounds {
        min: Vec::new(),
        max: Vec::new(),
    });
    for child in iter {
        merged.merge(&child);
    }
    merged
}

impl TreeNodeProcessor for MinMaxProcessor {
    type Forward = ();
    type Back = UtilityBounds;

    fn chance_forward(&self, _node: &ChanceNode, _visit: &Visit<'_>, _forward: &()) -> SolverResult<()> {
        Ok(())
    }

    fn information_set_forward(
        &self,
        _node: &InformationSetNode,
        _visit: &Visit<'_>,
        _forward: &(),
    ) -> SolverResult<()> {
        Ok(())
    }

    fn final_utilities_turn_around(
        &self,
        node: &FinalUtilitiesNode,
        _visit: &Visit<'_>,
        _forward: &(),
    ) -> SolverResult<UtilityBounds> {
        Ok(UtilityBounds::point(&node.utilities()))
    }

    fn chance_backward(
        &self,
        _node: &ChanceNode,
        _visit: &Visit<'_>,
        _forward: &(),
        children: Vec<UtilityBounds>,
    ) -> SolverResult<UtilityBounds> {
        Ok(merge_children(children))
    }

    fn information_set_backward(
        &self,
        node: &InformationSetNode,
        _visit: &Visit<'_>,
        _forward: &(),
        children: Vec<UtilityBounds>,
    ) -> SolverResult<UtilityBounds> {
        let merged = merge_children(children);
        node.merge_bounds(&merged);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfr::config::CFRConfig;
    use crate::cfr::game::{GameDefinition, InformationSetKey};
    use crate::cfr::navigation::Navigation;
    use crate::cfr::nodes::NodeStore;
    use crate::cfr::tree_walk::TreeWalk;
    use crate::games::random_tree::RandomTreeGame;
    use rstest::rstest;
    use rustc_hash::FxHashMap;

    /// Every information set on every terminal history, with that history's
    /// payoffs, found by playing the game directly.
    fn enumerate<G: GameDefinition>(
        game: &G,
        progress: G::Progress,
        seen: &mut Vec<(usize, InformationSetKey)>,
        out: &mut FxHashMap<(usize, InformationSetKey), UtilityBounds>,
    ) {
        let Some(d) = game.next_decision(&progress) else {
            let bounds = UtilityBounds::point(&game.utilities(&progress));
            for key in seen.iter() {
                out.entry(key.clone())
                    .and_modify(|b| b.merge(&bounds))
                    .or_insert_with(|| bounds.clone());
            }
            return;
        };
        let decision = &game.decisions()[d];
        let pushed = !decision.is_chance;
        if pushed {
            seen.push((d, game.information_set_key(&progress, d)));
        }
        for action in 1..=decision.num_actions {
            enumerate(game, game.apply_action(&progress, d, action), seen, out);
        }
        if pushed {
            seen.pop();
        }
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(17)]
    fn test_bounds_match_enumeration(#[case] seed: u64) {
        let game = RandomTreeGame::new(seed);
        let mut expected = FxHashMap::default();
        enumerate(&game, game.initial_progress(), &mut Vec::new(), &mut expected);

        let nav = Navigation::new(game, NodeStore::new(&CFRConfig::default()));
        let root = TreeWalk::new(&nav).walk(&MinMaxProcessor::new(), ()).unwrap();
        assert_eq!(root.min.len(), 2);

        assert_eq!(nav.store().num_information_sets(), expected.len());
        for ((d, key), bounds) in expected {
            let node = nav.store().find_information_set(d, &key).unwrap();
            assert_eq!(node.bounds(), Some(bounds));
            assert!(node.min_possible(node.player()).unwrap() <= node.max_possible(node.player()).unwrap());
        }
    }
}
