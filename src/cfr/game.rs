//! Game definition contract for the solver core.
//!
//! The core never knows the rules of a particular game. A game definition
//! supplies the ordered list of decisions, tells the engine which decision
//! comes next for a given state of play, and supplies chance probabilities and
//! terminal payoffs. Everything else (node creation, caching, traversal,
//! strategy updates) happens on the engine side.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::cfr::error::{SolverError, SolverResult};

/// Upper bound on the number of actions at any decision.
///
/// Per-node scratch buffers are stack arrays of this size.
pub const MAX_NUM_ACTIONS: usize = 100;

/// Opaque key distinguishing information sets within a decision.
///
/// Two positions that share a decision and a key share an information set
/// (or, for chance decisions, a chance node), so the key must capture
/// everything that can change the node's behavior.
pub type InformationSetKey = Vec<u8>;

/// A decision point in the game, owned by a player or by chance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Human-readable name.
    pub name: String,

    /// Short name used in logs.
    pub abbreviation: String,

    /// Owning player. Ignored for chance decisions.
    pub player: usize,

    /// Number of actions, numbered from 1.
    pub num_actions: u8,

    /// Whether chance makes this decision.
    pub is_chance: bool,

    /// Whether the outcome is collapsed onto action 1 when chance
    /// distribution is enabled.
    pub distributed: bool,

    /// If set, this decision's action times the multiplier is added to the
    /// distributor-chance-input key of every later position.
    pub distributor_chance_input_multiplier: Option<u32>,

    /// Whether the game state can be rolled back past this decision.
    pub is_reversible: bool,

    /// Whether the actions discretize a continuous quantity.
    pub is_continuous: bool,
}

impl Decision {
    /// A decision made by `player`.
    pub fn player(name: &str, abbreviation: &str, player: usize, num_actions: u8) -> Self {
        Self {
            name: name.to_string(),
            abbreviation: abbreviation.to_string(),
            player,
            num_actions,
            is_chance: false,
            distributed: false,
            distributor_chance_input_multiplier: None,
            is_reversible: true,
            is_continuous: false,
        }
    }

    /// A decision made by chance.
    pub fn chance(name: &str, abbreviation: &str, num_actions: u8) -> Self {
        Self {
            is_chance: true,
            ..Self::player(name, abbreviation, usize::MAX, num_actions)
        }
    }

    /// Builder method: mark as a distributed chance decision.
    pub fn distributed(mut self) -> Self {
        self.distributed = true;
        self
    }

    /// Builder method: contribute to the distributor-chance-input key.
    pub fn distributor_input(mut self, multiplier: u32) -> Self {
        self.distributor_chance_input_multiplier = Some(multiplier);
        self
    }

    /// Builder method: mark as discretizing a continuous quantity.
    pub fn continuous(mut self) -> Self {
        self.is_continuous = true;
        self
    }

    /// Builder method: mark as irreversible.
    pub fn irreversible(mut self) -> Self {
        self.is_reversible = false;
        self
    }
}

/// The rules of a game, as consumed by the solver core.
///
/// `Progress` is the game's own record of play so far. The engine only clones
/// it and hands it back; it never inspects it.
pub trait GameDefinition: Send + Sync {
    /// State of play accumulated along a path of actions.
    type Progress: Clone + Debug + Send + Sync;

    /// Number of non-chance players.
    fn num_players(&self) -> usize;

    /// Every decision in the order the game can visit them.
    ///
    /// Along any path, decision indices must strictly increase; navigation
    /// fails on a path where they do not.
    fn decisions(&self) -> &[Decision];

    /// State of play before any decision.
    fn initial_progress(&self) -> Self::Progress;

    /// Index of the next decision, or `None` once the game is over.
    fn next_decision(&self, progress: &Self::Progress) -> Option<usize>;

    /// Key of the information set (or chance node) at the next decision.
    fn information_set_key(&self, progress: &Self::Progress, decision_index: usize)
        -> InformationSetKey;

    /// State of play after `action` (1-based) at `decision_index`.
    fn apply_action(
        &self,
        progress: &Self::Progress,
        decision_index: usize,
        action: u8,
    ) -> Self::Progress;

    /// Non-uniform chance probabilities, indexed by `action - 1`.
    ///
    /// Return `None` for a uniform distribution. For a distributed decision
    /// this is the true distribution given the inputs realized so far.
    fn chance_probabilities(
        &self,
        _progress: &Self::Progress,
        _decision_index: usize,
    ) -> Option<Vec<f64>> {
        None
    }

    /// Payoff for every non-chance player once the game is over.
    fn utilities(&self, progress: &Self::Progress) -> Vec<f64>;

    /// Name used in logs.
    fn name(&self) -> String {
        "game".to_string()
    }
}

/// Check that every decision respects the engine's limits.
pub fn validate_decisions(decisions: &[Decision], num_players: usize) -> SolverResult<()> {
    for (decision_index, decision) in decisions.iter().enumerate() {
        let num_actions = decision.num_actions as usize;
        if num_actions == 0 || num_actions > MAX_NUM_ACTIONS {
            return Err(SolverError::TooManyActions {
                decision_index,
                num_actions,
            });
        }
        if !decision.is_chance && decision.player >= num_players {
            return Err(SolverError::InvalidPlayer {
                decision_index,
                player: decision.player,
            });
        }
    }
    Ok(())
}
