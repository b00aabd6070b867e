//! Kuhn Poker implementation for CFR validation.
//!
//! Kuhn Poker is a simplified poker game used to validate CFR implementations
//! because it has a known, mathematically proven Nash equilibrium.
//!
//! ## Game Rules
//!
//! - 3 cards: Jack (0), Queen (1), King (2)
//! - 2 players, each antes 1 chip
//! - Each player receives 1 card
//! - Player 1 acts first: Pass or Bet (1 chip)
//! - Player 2 responds based on P1's action
//! - Higher card wins at showdown
//!
//! ## Decisions
//!
//! ```text
//! 0  Deal P1     chance, 3 actions (card = action - 1)
//! 1  Deal P2     chance, 2 actions (lower or higher remaining card)
//! 2  Open        P1: Pass / Bet
//! 3  Respond     P2: Pass / Bet, after "p" or "b"
//! 4  Answer      P1: Pass / Bet, after "pb"
//! ```
//!
//! Information set keys are `"card:history"`, e.g. `"2:pb"`.
//!
//! ## Known Nash Equilibrium
//!
//! - **Player 1 with Jack**: Bet with probability α ∈ [0, 1/3]
//! - **Player 1 with Queen**: Always Pass
//! - **Player 1 with King**: Bet with probability 3α
//! - **Player 2 facing Bet with Jack**: Always Fold
//! - **Player 2 facing Bet with Queen**: Call with probability 1/3
//! - **Player 2 facing Bet with King**: Always Call
//!
//! **Expected Value**: Player 1 EV = -1/18 ≈ -0.0556

use std::fmt;

use crate::cfr::game::{Decision, GameDefinition, InformationSetKey};

/// Decision index of the first betting decision.
pub const OPEN: usize = 2;
/// Decision index of player 2's response.
pub const RESPOND: usize = 3;
/// Decision index of player 1's answer to a bet after passing.
pub const ANSWER: usize = 4;

/// Actions in Kuhn Poker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KuhnAction {
    /// Pass (check if no bet, fold if facing bet)
    Pass,
    /// Bet (or call if facing bet)
    Bet,
}

impl KuhnAction {
    /// Action for a 1-based action number.
    pub fn from_action(action: u8) -> Self {
        match action {
            1 => KuhnAction::Pass,
            _ => KuhnAction::Bet,
        }
    }

    /// History character.
    pub fn symbol(&self) -> char {
        match self {
            KuhnAction::Pass => 'p',
            KuhnAction::Bet => 'b',
        }
    }
}

impl fmt::Display for KuhnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KuhnAction::Pass => write!(f, "Pass"),
            KuhnAction::Bet => write!(f, "Bet"),
        }
    }
}

/// Information state in Kuhn Poker.
///
/// What a player knows: their card and the action history.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KuhnInfoState {
    /// Player's card (0=Jack, 1=Queen, 2=King)
    pub card: u8,
    /// Action history as string (e.g., "pb" = pass then bet)
    pub history: String,
}

impl KuhnInfoState {
    /// Key in `"card:history"` form.
    pub fn key(&self) -> InformationSetKey {
        format!("{}:{}", self.card, self.history).into_bytes()
    }
}

impl fmt::Display for KuhnInfoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let card_name = match self.card {
            0 => "J",
            1 => "Q",
            2 => "K",
            _ => "?",
        };
        write!(f, "{}|{}", card_name, self.history)
    }
}

/// Complete game state in Kuhn Poker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KuhnState {
    /// Cards dealt to each player (0=Jack, 1=Queen, 2=King)
    /// cards[0] is Player 1's card, cards[1] is Player 2's card
    pub cards: [u8; 2],
    /// Action history as string
    pub history: String,
    /// Amount each player has invested in the pot
    pub pot: [i32; 2],
    /// Number of cards dealt so far
    pub dealt: u8,
}

impl Default for KuhnState {
    fn default() -> Self {
        Self {
            cards: [0, 0],
            history: String::new(),
            pot: [1, 1], // Both ante 1
            dealt: 0,
        }
    }
}

impl fmt::Display for KuhnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P1:{} P2:{} History:{} Pot:{:?}",
            KuhnPoker::card_name(self.cards[0]),
            KuhnPoker::card_name(self.cards[1]),
            self.history,
            self.pot
        )
    }
}

/// Kuhn Poker game.
#[derive(Debug, Clone)]
pub struct KuhnPoker {
    decisions: Vec<Decision>,
}

impl Default for KuhnPoker {
    fn default() -> Self {
        Self::new()
    }
}

impl KuhnPoker {
    /// Create a new Kuhn Poker game.
    pub fn new() -> Self {
        Self {
            decisions: vec![
                Decision::chance("Deal P1", "D1", 3).irreversible(),
                Decision::chance("Deal P2", "D2", 2).irreversible(),
                Decision::player("Open", "O", 0, 2),
                Decision::player("Respond", "R", 1, 2),
                Decision::player("Answer", "A", 0, 2),
            ],
        }
    }

    /// Get card name for display.
    pub fn card_name(card: u8) -> &'static str {
        match card {
            0 => "Jack",
            1 => "Queen",
            2 => "King",
            _ => "Unknown",
        }
    }

    /// Decision and key of the information set where the player holding
    /// `card` acts after `history`.
    pub fn information_set(card: u8, history: &str) -> (usize, InformationSetKey) {
        let decision = match history {
            "" => OPEN,
            "pb" => ANSWER,
            _ => RESPOND,
        };
        let info = KuhnInfoState {
            card,
            history: history.to_string(),
        };
        (decision, info.key())
    }

    /// Whether the betting is over.
    pub fn is_terminal(&self, state: &KuhnState) -> bool {
        // "pp" showdown, "pbp" fold, "pbb" call, "bp" fold, "bb" call
        matches!(state.history.as_str(), "pp" | "pbp" | "pbb" | "bp" | "bb")
    }

    /// Player to act, `None` while dealing or once the hand is over.
    pub fn current_player(&self, state: &KuhnState) -> Option<usize> {
        if state.dealt < 2 {
            return None;
        }
        match state.history.as_str() {
            "" | "pb" => Some(0),
            "p" | "b" => Some(1),
            _ => None,
        }
    }

    /// What the acting player knows.
    pub fn info_state(&self, state: &KuhnState) -> KuhnInfoState {
        let player = self.current_player(state).unwrap_or(0);
        KuhnInfoState {
            card: state.cards[player],
            history: state.history.clone(),
        }
    }

    /// Payoff for player 1.
    fn payoff(&self, state: &KuhnState) -> f64 {
        let p0_card = state.cards[0];
        let p1_card = state.cards[1];
        match state.history.as_str() {
            // Showdown after both pass - pot is 2 (1+1 ante)
            "pp" => {
                if p0_card > p1_card {
                    1.0
                } else {
                    -1.0
                }
            }
            // Player 2 folded
            "bp" => 1.0,
            // Player 1 folded
            "pbp" => -1.0,
            // Showdown after bet-call - pot is 4 (2+2)
            "bb" | "pbb" => {
                if p0_card > p1_card {
                    2.0
                } else {
                    -2.0
                }
            }
            _ => 0.0,
        }
    }
}

impl GameDefinition for KuhnPoker {
    type Progress = KuhnState;

    fn num_players(&self) -> usize {
        2
    }

    fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    fn initial_progress(&self) -> KuhnState {
        KuhnState::default()
    }

    fn next_decision(&self, state: &KuhnState) -> Option<usize> {
        if state.dealt < 2 {
            return Some(state.dealt as usize);
        }
        if self.is_terminal(state) {
            return None;
        }
        match state.history.as_str() {
            "" => Some(OPEN),
            "pb" => Some(ANSWER),
            _ => Some(RESPOND),
        }
    }

    fn information_set_key(&self, state: &KuhnState, decision_index: usize) -> InformationSetKey {
        if decision_index < OPEN {
            return Vec::new();
        }
        self.info_state(state).key()
    }

    fn apply_action(&self, state: &KuhnState, decision_index: usize, action: u8) -> KuhnState {
        let mut new_state = state.clone();
        match decision_index {
            0 => {
                new_state.cards[0] = action - 1;
                new_state.dealt = 1;
            }
            1 => {
                let remaining: Vec<u8> = (0..3).filter(|c| *c != state.cards[0]).collect();
                new_state.cards[1] = remaining[action as usize - 1];
                new_state.dealt = 2;
            }
            _ => {
                let kuhn_action = KuhnAction::from_action(action);
                new_state.history.push(kuhn_action.symbol());
                if kuhn_action == KuhnAction::Bet {
                    if let Some(player) = self.current_player(state) {
                        new_state.pot[player] += 1;
                    }
                }
            }
        }
        new_state
    }

    fn utilities(&self, state: &KuhnState) -> Vec<f64> {
        let p0_payoff = self.payoff(state);
        vec![p0_payoff, -p0_payoff]
    }

    fn name(&self) -> String {
        "kuhn".to_string()
    }
}
