//! Seeded synthetic games for property tests and benches.
//!
//! A game has three to five decisions, one per depth, each owned by chance or
//! by one of two players and offering two or three actions. Every action is
//! visible to its owner and, at random, to the other player. Some histories
//! end early. Payoffs are zero-sum and derived from a hash of the history,
//! so the same seed always produces the same game.

use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHasher;

use crate::cfr::game::{Decision, GameDefinition, InformationSetKey};

const NUM_PLAYERS: usize = 2;

/// A random perfect-recall game.
#[derive(Debug, Clone)]
pub struct RandomTreeGame {
    seed: u64,
    decisions: Vec<Decision>,
    chance: Vec<Option<Vec<f64>>>,
    visible: Vec<[bool; NUM_PLAYERS]>,
}

impl RandomTreeGame {
    /// Generate the game for `seed`.
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let depth = rng.gen_range(3..=5);
        let mut owners: Vec<Option<usize>> = (0..depth)
            .map(|_| match rng.gen_range(0..3) {
                0 => None,
                p => Some(p - 1),
            })
            .collect();
        for player in 0..NUM_PLAYERS {
            if !owners.contains(&Some(player)) {
                // Prefer replacing a chance decision.
                let slot = owners
                    .iter()
                    .position(|o| o.is_none())
                    .unwrap_or(depth - 1);
                owners[slot] = Some(player);
            }
        }

        let mut decisions = Vec::with_capacity(depth);
        let mut chance = Vec::with_capacity(depth);
        let mut visible = Vec::with_capacity(depth);
        for (d, owner) in owners.into_iter().enumerate() {
            let num_actions: u8 = rng.gen_range(2..=3);
            let name = format!("Decision{}", d);
            let abbreviation = format!("D{}", d);
            match owner {
                None => {
                    let weights: Vec<f64> = (0..num_actions).map(|_| rng.gen_range(0.1..1.0)).collect();
                    let total: f64 = weights.iter().sum();
                    decisions.push(Decision::chance(&name, &abbreviation, num_actions));
                    chance.push(Some(weights.iter().map(|w| w / total).collect()));
                }
                Some(player) => {
                    decisions.push(Decision::player(&name, &abbreviation, player, num_actions));
                    chance.push(None);
                }
            }
            let mut seen = [false; NUM_PLAYERS];
            for (p, s) in seen.iter_mut().enumerate() {
                *s = owner == Some(p) || rng.gen_bool(0.5);
            }
            visible.push(seen);
        }

        Self {
            seed,
            decisions,
            chance,
            visible,
        }
    }

    fn hash(&self, tag: u8, progress: &[u8]) -> u64 {
        let mut hasher = FxHasher::default();
        self.seed.hash(&mut hasher);
        tag.hash(&mut hasher);
        progress.hash(&mut hasher);
        hasher.finish()
    }
}

impl GameDefinition for RandomTreeGame {
    type Progress = Vec<u8>;

    fn num_players(&self) -> usize {
        NUM_PLAYERS
    }

    fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    fn initial_progress(&self) -> Vec<u8> {
        Vec::new()
    }

    fn next_decision(&self, progress: &Vec<u8>) -> Option<usize> {
        let depth = progress.len();
        if depth >= self.decisions.len() || (depth >= 2 && self.hash(0, progress) % 5 == 0) {
            None
        } else {
            Some(depth)
        }
    }

    fn information_set_key(&self, progress: &Vec<u8>, decision_index: usize) -> InformationSetKey {
        let decision = &self.decisions[decision_index];
        if decision.is_chance {
            return Vec::new();
        }
        progress
            .iter()
            .enumerate()
            .filter(|(d, _)| self.visible[*d][decision.player])
            .flat_map(|(d, a)| [d as u8, *a])
            .collect()
    }

    fn apply_action(&self, progress: &Vec<u8>, _decision_index: usize, action: u8) -> Vec<u8> {
        let mut next = progress.clone();
        next.push(action);
        next
    }

    fn chance_probabilities(&self, _progress: &Vec<u8>, decision_index: usize) -> Option<Vec<f64>> {
        self.chance[decision_index].clone()
    }

    fn utilities(&self, progress: &Vec<u8>) -> Vec<f64> {
        let u = (self.hash(1, progress) % 2001) as f64 / 1000.0 - 1.0;
        vec![u, -u]
    }

    fn name(&self) -> String {
        format!("random-{}", self.seed)
    }
}
