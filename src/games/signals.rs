//! A small bargaining game with a distributed chance decision.
//!
//! Chance picks the quality of a claim (weak or strong), which only the
//! claimant sees. The claimant demands a high or a low settlement; the
//! defendant, seeing only the demand, accepts or goes to court. In court a
//! verdict is drawn whose odds depend on the quality of the claim.
//!
//! The quality decision is the distributor chance input and the verdict is
//! distributed: with chance distribution enabled the verdict is never
//! expanded, and one verdict node serves both qualities.

use crate::cfr::game::{Decision, GameDefinition, InformationSetKey};

const QUALITY: usize = 0;
const DEMAND: usize = 1;
const RESPONSE: usize = 2;
const VERDICT: usize = 3;

const ACCEPT: u8 = 1;
const CLAIMANT_WINS: u8 = 1;

/// Prior over claim quality: weak, strong.
const QUALITY_PRIOR: [f64; 2] = [0.3, 0.7];

/// Settlement paid for a high and a low demand.
const SETTLEMENTS: [f64; 2] = [0.7, 0.3];

/// Claimant's payoff after losing in court.
const COURT_LOSS: f64 = -0.2;

/// Claim-settlement game with a quality-dependent verdict.
#[derive(Debug, Clone)]
pub struct SignalsGame {
    decisions: Vec<Decision>,
}

impl Default for SignalsGame {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalsGame {
    /// Create the game.
    pub fn new() -> Self {
        Self {
            decisions: vec![
                Decision::chance("Quality", "Q", 2).distributor_input(1),
                Decision::player("Demand", "D", 0, 2),
                Decision::player("Response", "R", 1, 2),
                Decision::chance("Verdict", "V", 2).distributed(),
            ],
        }
    }

    /// Odds of the claimant winning and losing in court for a claim of
    /// `quality` (1 weak, 2 strong).
    pub fn verdict_probabilities(&self, quality: u8) -> Vec<f64> {
        match quality {
            2 => vec![0.4, 0.6],
            _ => vec![0.8, 0.2],
        }
    }
}

impl GameDefinition for SignalsGame {
    type Progress = Vec<u8>;

    fn num_players(&self) -> usize {
        2
    }

    fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    fn initial_progress(&self) -> Vec<u8> {
        Vec::new()
    }

    fn next_decision(&self, progress: &Vec<u8>) -> Option<usize> {
        match progress.len() {
            QUALITY | DEMAND | RESPONSE => Some(progress.len()),
            VERDICT if progress[RESPONSE] != ACCEPT => Some(VERDICT),
            _ => None,
        }
    }

    fn information_set_key(&self, progress: &Vec<u8>, decision_index: usize) -> InformationSetKey {
        match decision_index {
            DEMAND => vec![progress[QUALITY]],
            RESPONSE => vec![progress[DEMAND]],
            _ => Vec::new(),
        }
    }

    fn apply_action(&self, progress: &Vec<u8>, _decision_index: usize, action: u8) -> Vec<u8> {
        let mut next = progress.clone();
        next.push(action);
        next
    }

    fn chance_probabilities(&self, progress: &Vec<u8>, decision_index: usize) -> Option<Vec<f64>> {
        match decision_index {
            QUALITY => Some(QUALITY_PRIOR.to_vec()),
            VERDICT => Some(self.verdict_probabilities(progress[QUALITY])),
            _ => None,
        }
    }

    fn utilities(&self, progress: &Vec<u8>) -> Vec<f64> {
        let claimant = if progress[RESPONSE] == ACCEPT {
            SETTLEMENTS[progress[DEMAND] as usize - 1]
        } else if progress[VERDICT] == CLAIMANT_WINS {
            1.0
        } else {
            COURT_LOSS
        };
        vec![claimant, -claimant]
    }

    fn name(&self) -> String {
        "signals".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_court_only_after_rejection() {
        let game = SignalsGame::new();
        assert_eq!(game.next_decision(&vec![1, 2, 1]), None);
        assert_eq!(game.next_decision(&vec![1, 2, 2]), Some(VERDICT));
        assert_eq!(game.utilities(&vec![2, 1, 1]), vec![0.7, -0.7]);
        assert_eq!(game.utilities(&vec![2, 1, 2, 2]), vec![COURT_LOSS, -COURT_LOSS]);
    }

    #[test]
    fn test_defendant_does_not_see_quality() {
        let game = SignalsGame::new();
        assert_eq!(
            game.information_set_key(&vec![1, 2], RESPONSE),
            game.information_set_key(&vec![2, 2], RESPONSE)
        );
        assert_ne!(
            game.information_set_key(&vec![1], DEMAND),
            game.information_set_key(&vec![2], DEMAND)
        );
    }
}
