//! Leaves of the game tree.
//!
//! A leaf below pinned distributed chance decisions holds one payoff row per
//! combination of the pinned decisions' outcomes. Its payoff is the
//! expectation of those rows under the per-key distributions aggregated on
//! the pinned chance nodes, read at the time of the call.

use std::sync::Arc;

use crate::cfr::atomic::AtomicF64;
use crate::cfr::error::{SolverError, SolverResult};
use crate::cfr::nodes::chance::ChanceNode;

/// A pinned chance decision on a leaf's path, with the distributor key in
/// force where it was reached.
#[derive(Debug, Clone)]
pub struct PinnedSite {
    /// The pinned chance node.
    pub node: Arc<ChanceNode>,
    /// Distributor-chance-input key at the chance node.
    pub distributor_key: u32,
}

/// Terminal payoffs, one per non-chance player.
#[derive(Debug)]
pub struct FinalUtilitiesNode {
    id: usize,
    num_players: usize,
    /// One row of `num_players` payoffs per outcome combination; the last
    /// site varies fastest.
    rows: Box<[f64]>,
    sites: Box<[PinnedSite]>,
    weight_on_opponent: AtomicF64,
}

impl FinalUtilitiesNode {
    /// Create a leaf holding `utilities`.
    pub fn new(id: usize, utilities: Vec<f64>) -> Self {
        Self {
            id,
            num_players: utilities.len(),
            rows: utilities.into_boxed_slice(),
            sites: Box::new([]),
            weight_on_opponent: AtomicF64::new(0.0),
        }
    }

    /// Create a leaf below the pinned decisions `sites`.
    ///
    /// `rows` holds the payoffs for every outcome combination, with the
    /// outcome of the last site varying fastest.
    pub fn with_pinned_outcomes(
        id: usize,
        num_players: usize,
        sites: Vec<PinnedSite>,
        rows: Vec<f64>,
    ) -> SolverResult<Self> {
        let combinations: usize = sites.iter().map(|s| s.node.num_actions() as usize).product();
        if rows.len() != combinations * num_players {
            return Err(SolverError::ActionCountMismatch {
                decision_index: sites.last().map_or(0, |s| s.node.decision_index()),
                expected: combinations * num_players,
                actual: rows.len(),
            });
        }
        Ok(Self {
            id,
            num_players,
            rows: rows.into_boxed_slice(),
            sites: sites.into_boxed_slice(),
            weight_on_opponent: AtomicF64::new(0.0),
        })
    }

    /// Stable id assigned by the store.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Payoff rows as supplied by the game, one per outcome combination.
    pub fn raw_utilities(&self) -> &[f64] {
        &self.rows
    }

    /// Pinned decisions this leaf averages over.
    pub fn pinned_sites(&self) -> &[PinnedSite] {
        &self.sites
    }

    /// Set the weight placed on the opponent's payoff (two-player games).
    pub fn set_weight_on_opponent(&self, weight: f64) {
        self.weight_on_opponent.store(weight);
    }

    /// Current weight on the opponent's payoff.
    pub fn weight_on_opponent(&self) -> f64 {
        self.weight_on_opponent.load()
    }

    /// Payoffs before the opponent weight, averaged over pinned outcomes.
    pub fn expected_utilities(&self) -> Vec<f64> {
        if self.sites.is_empty() {
            return self.rows.to_vec();
        }
        let mut total = vec![0.0; self.num_players];
        for (index, row) in self.rows.chunks_exact(self.num_players).enumerate() {
            let p = self.combination_probability(index);
            if p == 0.0 {
                continue;
            }
            for (t, u) in total.iter_mut().zip(row) {
                *t += p * u;
            }
        }
        total
    }

    fn combination_probability(&self, mut index: usize) -> f64 {
        let mut p = 1.0;
        for site in self.sites.iter().rev() {
            let n = site.node.num_actions() as usize;
            let action = (index % n) as u8 + 1;
            index /= n;
            p *= site.node.distributor_probability(site.distributor_key, action);
        }
        p
    }

    /// Payoff for `player`, interpolated toward the opponent's payoff.
    ///
    /// With weight `w`, player `p` receives `(1 - w) * u[p] + w * u[1 - p]`.
    /// The weight is ignored unless there are exactly two players.
    pub fn utility(&self, player: usize) -> f64 {
        if self.sites.is_empty() {
            return weighted(&self.rows, player, self.weight_on_opponent.load());
        }
        weighted(&self.expected_utilities(), player, self.weight_on_opponent.load())
    }

    /// Payoffs for every player with the opponent weight applied.
    pub fn utilities(&self) -> Vec<f64> {
        let expected = self.expected_utilities();
        let w = self.weight_on_opponent.load();
        (0..self.num_players).map(|p| weighted(&expected, p, w)).collect()
    }
}

fn weighted(utilities: &[f64], player: usize, w: f64) -> f64 {
    if w == 0.0 || utilities.len() != 2 {
        return utilities[player];
    }
    (1.0 - w) * utilities[player] + w * utilities[1 - player]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_interested_by_default() {
        let leaf = FinalUtilitiesNode::new(3, vec![2.0, -2.0]);
        assert_eq!(leaf.id(), 3);
        assert_eq!(leaf.utilities(), vec![2.0, -2.0]);
        assert!(leaf.pinned_sites().is_empty());
    }

    #[test]
    fn test_weight_on_opponent_interpolates() {
        let leaf = FinalUtilitiesNode::new(0, vec![4.0, 0.0]);
        leaf.set_weight_on_opponent(0.25);
        assert_eq!(leaf.utility(0), 3.0);
        assert_eq!(leaf.utility(1), 1.0);
        assert_eq!(leaf.raw_utilities(), &[4.0, 0.0]);
    }

    #[test]
    fn test_weight_ignored_for_three_players() {
        let leaf = FinalUtilitiesNode::new(0, vec![1.0, 2.0, 3.0]);
        leaf.set_weight_on_opponent(0.5);
        assert_eq!(leaf.utility(2), 3.0);
    }

    #[test]
    fn test_pinned_rows_follow_keyed_distribution() {
        let chance = Arc::new(ChanceNode::new(0, 3, 2, true, None).unwrap());
        let site = PinnedSite {
            node: Arc::clone(&chance),
            distributor_key: 7,
        };
        let leaf =
            FinalUtilitiesNode::with_pinned_outcomes(0, 2, vec![site], vec![1.0, -1.0, -0.5, 0.5])
                .unwrap();
        // Uniform until a vector for key 7 exists.
        assert_eq!(leaf.utilities(), vec![0.25, -0.25]);

        chance.accumulate_distributor_probabilities(7, 1.0, &[0.8, 0.2]).unwrap();
        chance.normalize_distributor_probabilities();
        let u = leaf.utilities();
        assert!((u[0] - 0.7).abs() < 1e-12);
        assert!((leaf.utility(1) + 0.7).abs() < 1e-12);

        chance.clear_distributor_probabilities();
        chance.accumulate_distributor_probabilities(7, 1.0, &[0.0, 1.0]).unwrap();
        chance.normalize_distributor_probabilities();
        assert_eq!(leaf.utilities(), vec![-0.5, 0.5]);
    }

    #[test]
    fn test_pinned_rows_must_cover_every_outcome() {
        let chance = Arc::new(ChanceNode::new(0, 1, 3, true, None).unwrap());
        let site = PinnedSite {
            node: chance,
            distributor_key: 0,
        };
        assert!(FinalUtilitiesNode::with_pinned_outcomes(0, 2, vec![site], vec![0.0; 4]).is_err());
    }
}
