//! Processors that run on the generic tree walk.
//!
//! Each one is a [`TreeNodeProcessor`](crate::cfr::tree_walk::TreeNodeProcessor)
//! and nothing more; the traversal itself lives in
//! [`tree_walk`](crate::cfr::tree_walk).

pub mod best_response;
pub mod distribution;
pub mod min_max;
pub mod regret_update;
pub mod utilities;

pub use best_response::{BestResponseLayer, BruteForceBestResponse};
pub use distribution::DistributedChanceAggregator;
pub use min_max::MinMaxProcessor;
pub use regret_update::{ReachProbabilities, RegretUpdateProcessor};
pub use utilities::{InformationSetUtility, StrategySource, UtilityCalculator};

use crate::cfr::nodes::{Dimension, InformationSetNode};

/// Strategy a node's owner plays under `source`, for one action.
pub(crate) fn source_probability(
    node: &InformationSetNode,
    source: StrategySource,
    action: u8,
) -> f64 {
    match source {
        StrategySource::Current => node.get(Dimension::CurrentProbability, action),
        StrategySource::Average => node.get(Dimension::AverageStrategyProbability, action),
        StrategySource::BestResponse(player) if player == node.player() => {
            if node.best_response_action() == action {
                1.0
            } else {
                0.0
            }
        }
        StrategySource::BestResponse(_) => node.get(Dimension::AverageStrategyProbability, action),
    }
}
