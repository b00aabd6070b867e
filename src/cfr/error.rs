//! Errors raised by the solver core.
//!
//! Every variant of [`SolverError`] except [`SolverError::Config`] describes an
//! internal-consistency failure: the game tree was built in a way the engine
//! cannot reason about. They abort the current computation and are never
//! retried. Degenerate numeric situations (zero regret sums, zero reach) are
//! handled locally and never show up here.

use crate::cfr::config::ConfigError;

/// Convenience alias used throughout the core.
pub type SolverResult<T> = Result<T, SolverError>;

/// Fatal errors surfaced to the enclosing algorithm driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    /// Two navigation strategies produced different nodes for the same position.
    ///
    /// This means two distinct game positions were not disambiguated by the
    /// information set key supplied by the game definition.
    NavigationMismatch {
        /// Actions (1-based) from the root to the position.
        path: Vec<u8>,
        /// What differed.
        detail: String,
    },

    /// An information set was never reached during best-response preparation.
    MissingPredecessor {
        /// Id of the information set.
        node_id: usize,
    },

    /// An information set was reached from two different predecessors.
    InconsistentPredecessor {
        /// Id of the information set.
        node_id: usize,
    },

    /// Current-strategy probabilities did not sum to 1 after all retries.
    ProbabilitySum {
        /// Id of the information set.
        node_id: usize,
        /// The offending sum.
        sum: f64,
    },

    /// A chance distribution supplied by the game does not sum to 1.
    ChanceProbabilities {
        /// Index of the chance decision.
        decision_index: usize,
        /// The offending sum.
        sum: f64,
    },

    /// A decision declares more actions than the engine supports.
    TooManyActions {
        /// Index of the decision.
        decision_index: usize,
        /// Declared number of actions.
        num_actions: usize,
    },

    /// The game supplied a vector whose length disagrees with the decision.
    ActionCountMismatch {
        /// Index of the decision.
        decision_index: usize,
        /// Expected number of actions.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// A player decision names a player the game does not have.
    InvalidPlayer {
        /// Index of the decision.
        decision_index: usize,
        /// The player it names.
        player: usize,
    },

    /// A node id was looked up that the store never created.
    UnknownNode {
        /// The id requested.
        node_id: usize,
    },

    /// The configuration was rejected.
    Config(ConfigError),
}

impl std::fmt::Display for SolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverError::NavigationMismatch { path, detail } => {
                write!(f, "navigation mismatch at path {:?}: {}", path, detail)
            }
            SolverError::MissingPredecessor { node_id } => {
                write!(f, "information set {} has no recorded predecessor", node_id)
            }
            SolverError::InconsistentPredecessor { node_id } => {
                write!(
                    f,
                    "information set {} was reached from more than one predecessor",
                    node_id
                )
            }
            SolverError::ProbabilitySum { node_id, sum } => {
                write!(
                    f,
                    "probabilities at information set {} sum to {} after retries",
                    node_id, sum
                )
            }
            SolverError::ChanceProbabilities { decision_index, sum } => {
                write!(
                    f,
                    "chance probabilities for decision {} sum to {}",
                    decision_index, sum
                )
            }
            SolverError::TooManyActions {
                decision_index,
                num_actions,
            } => {
                write!(
                    f,
                    "decision {} declares {} actions (maximum {})",
                    decision_index,
                    num_actions,
                    crate::cfr::game::MAX_NUM_ACTIONS
                )
            }
            SolverError::ActionCountMismatch {
                decision_index,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "decision {} expects {} actions but {} were supplied",
                    decision_index, expected, actual
                )
            }
            SolverError::InvalidPlayer {
                decision_index,
                player,
            } => write!(f, "decision {} names unknown player {}", decision_index, player),
            SolverError::UnknownNode { node_id } => write!(f, "unknown node id {}", node_id),
            SolverError::Config(e) => write!(f, "invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for SolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SolverError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for SolverError {
    fn from(e: ConfigError) -> Self {
        SolverError::Config(e)
    }
}
