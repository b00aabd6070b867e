//! The game-state model: chance nodes, information sets and leaves, plus the
//! store that owns them.

pub mod chance;
pub mod final_utilities;
pub mod information_set;
pub mod store;

use std::sync::Arc;

pub use chance::{ChanceNode, ChanceProbabilities};
pub use final_utilities::{FinalUtilitiesNode, PinnedSite};
pub use information_set::{
    Dimension, InformationSetNode, NodeBackup, PredecessorLink, UtilityBounds,
};
pub use store::{NodeStore, StoreBackup, StoreExport};

/// Probability vectors must sum to one within this tolerance.
pub const PROBABILITY_TOLERANCE: f64 = 1e-7;

/// A node of the game tree.
#[derive(Debug, Clone)]
pub enum GameNode {
    /// A chance decision.
    Chance(Arc<ChanceNode>),
    /// A player decision.
    InformationSet(Arc<InformationSetNode>),
    /// The end of the game.
    FinalUtilities(Arc<FinalUtilitiesNode>),
}

impl GameNode {
    /// Id of the node within its kind.
    pub fn id(&self) -> usize {
        match self {
            GameNode::Chance(n) => n.id(),
            GameNode::InformationSet(n) => n.id(),
            GameNode::FinalUtilities(n) => n.id(),
        }
    }

    /// Decision index, or `None` for a leaf.
    pub fn decision_index(&self) -> Option<usize> {
        match self {
            GameNode::Chance(n) => Some(n.decision_index()),
            GameNode::InformationSet(n) => Some(n.decision_index()),
            GameNode::FinalUtilities(_) => None,
        }
    }

    /// Number of actions, zero for a leaf.
    pub fn num_actions(&self) -> u8 {
        match self {
            GameNode::Chance(n) => n.num_actions(),
            GameNode::InformationSet(n) => n.num_actions(),
            GameNode::FinalUtilities(_) => 0,
        }
    }

    /// Whether both values are the same node.
    pub fn same_node(&self, other: &GameNode) -> bool {
        match (self, other) {
            (GameNode::Chance(a), GameNode::Chance(b)) => Arc::ptr_eq(a, b),
            (GameNode::InformationSet(a), GameNode::InformationSet(b)) => Arc::ptr_eq(a, b),
            (GameNode::FinalUtilities(a), GameNode::FinalUtilities(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Short description for error messages.
    pub fn describe(&self) -> String {
        match self {
            GameNode::Chance(n) => format!("chance node {} (decision {})", n.id(), n.decision_index()),
            GameNode::InformationSet(n) => {
                format!("information set {} (decision {})", n.id(), n.decision_index())
            }
            GameNode::FinalUtilities(n) => format!("leaf {}", n.id()),
        }
    }
}
