//! Information set nodes: the per-decision-point strategy store.
//!
//! Each node owns a dense block of `Dimension::COUNT * num_actions` atomic
//! floats indexed by `[dimension, action - 1]`. Accumulators are updated with
//! atomic adds so that many threads can write different nodes (or different
//! actions of one node) without locks. Derived distributions are written one
//! slot at a time, so a reader racing a writer can observe a mixed vector;
//! reads of a distribution therefore check the sum and retry, and finally
//! recompute from the underlying accumulators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError, RwLock};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cfr::accelerated::PathFromPredecessor;
use crate::cfr::atomic::AtomicF64;
use crate::cfr::config::{CFRConfig, RegretAlgorithm};
use crate::cfr::error::{SolverError, SolverResult};
use crate::cfr::game::{InformationSetKey, MAX_NUM_ACTIONS};
use crate::cfr::nodes::PROBABILITY_TOLERANCE;

/// Attempts at reading a consistent distribution before recomputing it.
const MAX_READ_ATTEMPTS: usize = 8;

/// Adjusted weights are rescaled once their sum drops below this.
const HEDGE_UNDERFLOW: f64 = 1e-150;

/// Factor applied to every adjusted weight on underflow.
const HEDGE_RESCALE: f64 = 1e150;

/// Named rows of the numeric block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// Current strategy.
    CurrentProbability,
    /// Current strategy as seen by opponents; may lag or be pruned.
    CurrentProbabilityForOpponent,
    /// Last computed average strategy.
    AverageStrategyProbability,
    /// Sum of inverse-opponent-probability times value, per action.
    BestResponseNumerator,
    /// Sum of inverse-opponent-probability, per action.
    BestResponseDenominator,
    /// Cumulative (possibly discounted) counterfactual regret.
    CumulativeRegret,
    /// Cumulative (possibly discounted) reach-weighted strategy.
    CumulativeStrategy,
    /// Multiplicative weights.
    AdjustedWeight,
    /// Opponent-reach-weighted action values for the last iteration.
    LastRegretNumerator,
    /// Opponent reach for the last iteration.
    LastRegretDenominator,
    /// Cumulative-strategy increment pending for the current iteration.
    LastCumulativeStrategyIncrement,
    /// Free row for processors.
    Scratch,
}

impl Dimension {
    /// Number of rows.
    pub const COUNT: usize = 12;

    /// Every row, in storage order.
    pub const ALL: [Dimension; Dimension::COUNT] = [
        Dimension::CurrentProbability,
        Dimension::CurrentProbabilityForOpponent,
        Dimension::AverageStrategyProbability,
        Dimension::BestResponseNumerator,
        Dimension::BestResponseDenominator,
        Dimension::CumulativeRegret,
        Dimension::CumulativeStrategy,
        Dimension::AdjustedWeight,
        Dimension::LastRegretNumerator,
        Dimension::LastRegretDenominator,
        Dimension::LastCumulativeStrategyIncrement,
        Dimension::Scratch,
    ];

    fn row(self) -> usize {
        self as usize
    }
}

/// Minimum and maximum achievable payoff for every player below a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityBounds {
    /// Per-player minimum.
    pub min: Vec<f64>,
    /// Per-player maximum.
    pub max: Vec<f64>,
}

impl UtilityBounds {
    /// Bounds of a single payoff vector.
    pub fn point(utilities: &[f64]) -> Self {
        Self {
            min: utilities.to_vec(),
            max: utilities.to_vec(),
        }
    }

    /// Widen to include `other`.
    pub fn merge(&mut self, other: &UtilityBounds) {
        for (m, o) in self.min.iter_mut().zip(&other.min) {
            *m = m.min(*o);
        }
        for (m, o) in self.max.iter_mut().zip(&other.max) {
            *m = m.max(*o);
        }
    }
}

/// How play reaches an information set from its owner's previous decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredecessorLink {
    /// The owner has not acted before this node.
    Root,
    /// The owner last acted at `node_id`, choosing `action`.
    InformationSet {
        /// Id of the predecessor information set.
        node_id: usize,
        /// Action taken there.
        action: u8,
    },
}

/// Copy of a node's numeric state, used for rollback and checkpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeBackup {
    /// Id of the node the copy was taken from.
    pub node_id: usize,
    /// Decision of the node.
    pub decision_index: usize,
    /// Information set key of the node.
    pub key: InformationSetKey,
    /// Numeric block, `[dimension * num_actions + action - 1]`.
    pub values: Vec<f64>,
    /// Best-response action at the time of the copy.
    pub best_response_action: u8,
}

/// A decision point as perceived by its owning player.
#[derive(Debug)]
pub struct InformationSetNode {
    id: usize,
    decision_index: usize,
    player: usize,
    num_actions: u8,
    key: InformationSetKey,
    values: Box<[AtomicF64]>,
    algorithm: AtomicU8,
    zero_threshold: AtomicF64,
    best_response_action: AtomicU8,
    bounds: RwLock<Option<UtilityBounds>>,
    past_capacity: AtomicUsize,
    past_strategies: Mutex<VecDeque<Box<[f64]>>>,
    predecessor: OnceLock<PredecessorLink>,
    reachable_under_best_response: AtomicBool,
    prunable: Box<[AtomicBool]>,
    pub(crate) paths: RwLock<Vec<PathFromPredecessor>>,
}

impl InformationSetNode {
    /// Create a node with every row initialized for a fresh run.
    pub fn new(
        id: usize,
        decision_index: usize,
        player: usize,
        num_actions: u8,
        key: InformationSetKey,
        config: &CFRConfig,
    ) -> Self {
        let n = num_actions as usize;
        let node = Self {
            id,
            decision_index,
            player,
            num_actions,
            key,
            values: (0..Dimension::COUNT * n).map(|_| AtomicF64::new(0.0)).collect(),
            algorithm: AtomicU8::new(0),
            zero_threshold: AtomicF64::new(0.0),
            best_response_action: AtomicU8::new(1),
            bounds: RwLock::new(None),
            past_capacity: AtomicUsize::new(0),
            past_strategies: Mutex::new(VecDeque::new()),
            predecessor: OnceLock::new(),
            reachable_under_best_response: AtomicBool::new(false),
            prunable: (0..n).map(|_| AtomicBool::new(false)).collect(),
            paths: RwLock::new(Vec::new()),
        };
        node.reset(config);
        node
    }

    /// Stable id assigned by the store.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Index of the decision in the game definition.
    pub fn decision_index(&self) -> usize {
        self.decision_index
    }

    /// Owning player.
    pub fn player(&self) -> usize {
        self.player
    }

    /// Number of actions.
    pub fn num_actions(&self) -> u8 {
        self.num_actions
    }

    /// Key supplied by the game definition.
    pub fn key(&self) -> &InformationSetKey {
        &self.key
    }

    /// Reinitialize every row for a new run.
    ///
    /// Strategies become uniform, accumulators zero, adjusted weights one.
    /// Bounds and best-response paths are structural and survive.
    pub fn reset(&self, config: &CFRConfig) {
        let uniform = 1.0 / self.num_actions as f64;
        for dim in Dimension::ALL {
            let initial = match dim {
                Dimension::CurrentProbability
                | Dimension::CurrentProbabilityForOpponent
                | Dimension::AverageStrategyProbability => uniform,
                Dimension::AdjustedWeight => 1.0,
                _ => 0.0,
            };
            for action in 1..=self.num_actions {
                self.set(dim, action, initial);
            }
        }
        self.algorithm.store(
            match config.algorithm {
                RegretAlgorithm::RegretMatching => 0,
                RegretAlgorithm::MultiplicativeWeights => 1,
            },
            Ordering::Release,
        );
        self.zero_threshold
            .store(config.average_strategy_zero_threshold);
        self.best_response_action.store(1, Ordering::Release);
        self.reachable_under_best_response
            .store(false, Ordering::Release);
        for p in self.prunable.iter() {
            p.store(false, Ordering::Release);
        }
        self.past_capacity
            .store(config.past_strategy_capacity, Ordering::Release);
        self.past_strategies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Algorithm selected at the last reset.
    pub fn algorithm(&self) -> RegretAlgorithm {
        match self.algorithm.load(Ordering::Acquire) {
            0 => RegretAlgorithm::RegretMatching,
            _ => RegretAlgorithm::MultiplicativeWeights,
        }
    }

    #[inline]
    fn slot(&self, dim: Dimension, action: u8) -> &AtomicF64 {
        &self.values[dim.row() * self.num_actions as usize + action as usize - 1]
    }

    /// Value at `[dim, action - 1]`.
    #[inline]
    pub fn get(&self, dim: Dimension, action: u8) -> f64 {
        self.slot(dim, action).load()
    }

    /// Overwrite `[dim, action - 1]`.
    #[inline]
    pub fn set(&self, dim: Dimension, action: u8, value: f64) {
        self.slot(dim, action).store(value)
    }

    /// Atomically add to `[dim, action - 1]`.
    #[inline]
    pub fn add(&self, dim: Dimension, action: u8, delta: f64) {
        self.slot(dim, action).fetch_add(delta);
    }

    /// Copy one row into `out`, which must hold `num_actions` entries.
    pub fn row_into(&self, dim: Dimension, out: &mut [f64]) {
        for (i, v) in out.iter_mut().enumerate() {
            *v = self.get(dim, i as u8 + 1);
        }
    }

    /// One row as a vector.
    pub fn row(&self, dim: Dimension) -> Vec<f64> {
        let mut out = vec![0.0; self.num_actions as usize];
        self.row_into(dim, &mut out);
        out
    }

    fn write_row(&self, dim: Dimension, values: &[f64]) {
        for (i, v) in values.iter().enumerate() {
            self.set(dim, i as u8 + 1, *v);
        }
    }

    // ------------------------------------------------------------------
    // Reading distributions
    // ------------------------------------------------------------------

    /// Read a probability row into `out`, retrying torn reads.
    ///
    /// After `MAX_READ_ATTEMPTS` failures the row is recomputed from its
    /// accumulators and read once more; failing that is an internal error.
    pub fn distribution_into(&self, dim: Dimension, out: &mut [f64]) -> SolverResult<()> {
        for _ in 0..MAX_READ_ATTEMPTS {
            self.row_into(dim, out);
            if sums_to_one(out) {
                return Ok(());
            }
        }
        match dim {
            Dimension::AverageStrategyProbability => {
                self.calculate_average_strategy(self.zero_threshold.load());
            }
            _ => self.recompute_current_strategy(),
        }
        self.row_into(dim, out);
        if sums_to_one(out) {
            Ok(())
        } else {
            Err(SolverError::ProbabilitySum {
                node_id: self.id,
                sum: out.iter().sum(),
            })
        }
    }

    /// Current strategy.
    pub fn current_probabilities(&self) -> SolverResult<Vec<f64>> {
        let mut out = vec![0.0; self.num_actions as usize];
        self.distribution_into(Dimension::CurrentProbability, &mut out)?;
        Ok(out)
    }

    /// Current strategy as published to opponents.
    pub fn opponent_probabilities(&self) -> SolverResult<Vec<f64>> {
        let mut out = vec![0.0; self.num_actions as usize];
        self.distribution_into(Dimension::CurrentProbabilityForOpponent, &mut out)?;
        Ok(out)
    }

    /// Last computed average strategy.
    pub fn average_strategy_probabilities(&self) -> SolverResult<Vec<f64>> {
        let mut out = vec![0.0; self.num_actions as usize];
        self.distribution_into(Dimension::AverageStrategyProbability, &mut out)?;
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Accumulation during a traversal
    // ------------------------------------------------------------------

    /// Record the counterfactual outcome of `action` for one history.
    ///
    /// Cumulative regret grows by `factor * opponent_reach * (action_value -
    /// node_value)`; the last-iteration rows collect the reach-weighted action
    /// value used by multiplicative weights.
    pub fn accumulate_regret(
        &self,
        action: u8,
        opponent_reach: f64,
        action_value: f64,
        node_value: f64,
        factor: f64,
    ) {
        if opponent_reach == 0.0 {
            return;
        }
        self.add(
            Dimension::CumulativeRegret,
            action,
            factor * opponent_reach * (action_value - node_value),
        );
        self.add(
            Dimension::LastRegretNumerator,
            action,
            opponent_reach * action_value,
        );
        self.add(Dimension::LastRegretDenominator, action, opponent_reach);
    }

    /// Queue `amount` of cumulative strategy for `action` this iteration.
    pub fn accumulate_cumulative_strategy_increment(&self, action: u8, amount: f64) {
        if amount != 0.0 {
            self.add(Dimension::LastCumulativeStrategyIncrement, action, amount);
        }
    }

    /// Fold this iteration's pending increments into the cumulative rows.
    ///
    /// With `normalize`, the pending increments are rescaled to sum to one
    /// before discounting. With `regret_plus`, cumulative regret is floored
    /// at zero.
    pub fn commit_iteration(&self, strategy_factor: f64, normalize: bool, regret_plus: bool) {
        let n = self.num_actions as usize;
        let mut buf = [0.0; MAX_NUM_ACTIONS];
        let pending = &mut buf[..n];
        self.row_into(Dimension::LastCumulativeStrategyIncrement, pending);
        let total: f64 = pending.iter().sum();
        let scale = if normalize && total > 0.0 {
            strategy_factor / total
        } else {
            strategy_factor
        };
        for action in 1..=self.num_actions {
            let inc = pending[action as usize - 1];
            if inc != 0.0 {
                self.add(Dimension::CumulativeStrategy, action, inc * scale);
            }
            self.set(Dimension::LastCumulativeStrategyIncrement, action, 0.0);
            if regret_plus && self.get(Dimension::CumulativeRegret, action) < 0.0 {
                self.set(Dimension::CumulativeRegret, action, 0.0);
            }
        }
    }

    // ------------------------------------------------------------------
    // Strategy updates
    // ------------------------------------------------------------------

    /// Regret matching over the current cumulative regret, into `out`.
    ///
    /// Uniform when no action has positive regret; exactly one when a single
    /// action does.
    pub fn regret_matching_into(&self, out: &mut [f64]) {
        self.row_into(Dimension::CumulativeRegret, out);
        regret_matching(out);
    }

    /// Recompute the current strategy with the node's algorithm.
    ///
    /// Multiplicative weights renormalizes the existing weights without
    /// applying another step.
    pub fn recompute_current_strategy(&self) {
        let n = self.num_actions as usize;
        let mut buf = [0.0; MAX_NUM_ACTIONS];
        let probs = &mut buf[..n];
        match self.algorithm() {
            RegretAlgorithm::RegretMatching => self.regret_matching_into(probs),
            RegretAlgorithm::MultiplicativeWeights => {
                self.row_into(Dimension::AdjustedWeight, probs);
                normalize_or_uniform(probs);
            }
        }
        self.write_row(Dimension::CurrentProbability, probs);
    }

    /// Regret-matching update of the current strategy.
    pub fn update_regret_matching(&self) -> SolverResult<()> {
        let n = self.num_actions as usize;
        let mut buf = [0.0; MAX_NUM_ACTIONS];
        let probs = &mut buf[..n];
        for _ in 0..MAX_READ_ATTEMPTS {
            self.regret_matching_into(probs);
            if sums_to_one(probs) {
                self.write_row(Dimension::CurrentProbability, probs);
                self.clear_last_regret();
                return Ok(());
            }
        }
        Err(SolverError::ProbabilitySum {
            node_id: self.id,
            sum: probs.iter().sum(),
        })
    }

    /// Multiplicative-weights update of the current strategy.
    ///
    /// Each action's last-iteration value is normalized into [0, 1] with the
    /// owner's achievable utility range, and its weight is multiplied by
    /// `(1 - epsilon)^(1 - normalized)`. Actions not reached this iteration
    /// keep their weight.
    pub fn update_hedge(&self, epsilon: f64) -> SolverResult<()> {
        let n = self.num_actions as usize;
        let mut values_buf = [0.0; MAX_NUM_ACTIONS];
        let mut reached_buf = [false; MAX_NUM_ACTIONS];
        let values = &mut values_buf[..n];
        let reached = &mut reached_buf[..n];
        for action in 1..=self.num_actions {
            let den = self.get(Dimension::LastRegretDenominator, action);
            if den > 0.0 {
                values[action as usize - 1] =
                    self.get(Dimension::LastRegretNumerator, action) / den;
                reached[action as usize - 1] = true;
            }
        }

        let (low, high) = match self.utility_range() {
            Some(range) => range,
            None => local_range(values, reached),
        };
        let span = high - low;
        let log_keep = (1.0 - epsilon).ln();

        let mut weights_buf = [0.0; MAX_NUM_ACTIONS];
        let weights = &mut weights_buf[..n];
        self.row_into(Dimension::AdjustedWeight, weights);
        for i in 0..n {
            if !reached[i] {
                continue;
            }
            let normalized = if span > 0.0 {
                ((values[i] - low) / span).clamp(0.0, 1.0)
            } else {
                1.0
            };
            weights[i] *= (log_keep * (1.0 - normalized)).exp();
        }

        let sum: f64 = weights.iter().sum();
        if sum < HEDGE_UNDERFLOW {
            weights.iter_mut().for_each(|w| *w *= HEDGE_RESCALE);
        }
        self.write_row(Dimension::AdjustedWeight, weights);

        let mut probs_buf = [0.0; MAX_NUM_ACTIONS];
        let probs = &mut probs_buf[..n];
        probs.copy_from_slice(weights);
        normalize_or_uniform(probs);
        if !sums_to_one(probs) {
            return Err(SolverError::ProbabilitySum {
                node_id: self.id,
                sum: probs.iter().sum(),
            });
        }
        self.write_row(Dimension::CurrentProbability, probs);
        self.clear_last_regret();
        Ok(())
    }

    /// Update with whichever algorithm was selected at reset.
    pub fn update_current_strategy(&self, hedge_epsilon: f64) -> SolverResult<()> {
        match self.algorithm() {
            RegretAlgorithm::RegretMatching => self.update_regret_matching(),
            RegretAlgorithm::MultiplicativeWeights => self.update_hedge(hedge_epsilon),
        }
    }

    fn clear_last_regret(&self) {
        for action in 1..=self.num_actions {
            self.set(Dimension::LastRegretNumerator, action, 0.0);
            self.set(Dimension::LastRegretDenominator, action, 0.0);
        }
    }

    /// Publish the current strategy to opponents.
    ///
    /// Probabilities below `threshold` are published as zero and the rest
    /// renormalized.
    pub fn publish_opponent_probabilities(&self, threshold: Option<f64>) -> SolverResult<()> {
        let n = self.num_actions as usize;
        let mut buf = [0.0; MAX_NUM_ACTIONS];
        let probs = &mut buf[..n];
        self.distribution_into(Dimension::CurrentProbability, probs)?;
        if let Some(t) = threshold {
            let mut pruned_buf = [0.0; MAX_NUM_ACTIONS];
            let pruned = &mut pruned_buf[..n];
            for (q, p) in pruned.iter_mut().zip(probs.iter()) {
                *q = if *p < t { 0.0 } else { *p };
            }
            if pruned.iter().sum::<f64>() > 0.0 {
                normalize_or_uniform(pruned);
                probs.copy_from_slice(pruned);
            }
        }
        self.write_row(Dimension::CurrentProbabilityForOpponent, probs);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Average strategy
    // ------------------------------------------------------------------

    /// Average strategy from the cumulative row, without storing it.
    ///
    /// Entries below `zero_threshold` are zeroed and the rest renormalized.
    pub fn compute_average_strategy(&self, zero_threshold: f64) -> Vec<f64> {
        let mut probs = self.row(Dimension::CumulativeStrategy);
        let total: f64 = probs.iter().sum();
        if total <= 0.0 {
            let uniform = 1.0 / probs.len() as f64;
            probs.iter_mut().for_each(|p| *p = uniform);
            return probs;
        }
        probs.iter_mut().for_each(|p| *p /= total);
        if zero_threshold > 0.0 {
            let kept: f64 = probs.iter().filter(|p| **p >= zero_threshold).sum();
            if kept > 0.0 {
                for p in probs.iter_mut() {
                    *p = if *p < zero_threshold { 0.0 } else { *p / kept };
                }
            }
        }
        probs
    }

    /// Compute and store the average strategy.
    pub fn calculate_average_strategy(&self, zero_threshold: f64) -> Vec<f64> {
        let probs = self.compute_average_strategy(zero_threshold);
        self.write_row(Dimension::AverageStrategyProbability, &probs);
        probs
    }

    /// Draw an action (1-based) from the stored average strategy.
    pub fn sample_average_action<R: Rng + ?Sized>(&self, rng: &mut R) -> SolverResult<u8> {
        let probs = self.average_strategy_probabilities()?;
        let r: f64 = rng.gen();
        let mut cumulative = 0.0;
        for (i, p) in probs.iter().enumerate() {
            cumulative += p;
            if r < cumulative {
                return Ok(i as u8 + 1);
            }
        }
        Ok(self.num_actions)
    }

    // ------------------------------------------------------------------
    // Best response
    // ------------------------------------------------------------------

    /// Zero the best-response rows.
    pub fn reset_best_response(&self) {
        for action in 1..=self.num_actions {
            self.set(Dimension::BestResponseNumerator, action, 0.0);
            self.set(Dimension::BestResponseDenominator, action, 0.0);
        }
    }

    /// Add one history's contribution to the best-response rows.
    pub fn accumulate_best_response(&self, action: u8, inverse_pi: f64, value: f64) {
        self.add(Dimension::BestResponseNumerator, action, inverse_pi * value);
        self.add(Dimension::BestResponseDenominator, action, inverse_pi);
    }

    /// Numerator over denominator for `action`, or zero when unreached.
    pub fn best_response_value(&self, action: u8) -> f64 {
        let den = self.get(Dimension::BestResponseDenominator, action);
        if den > 0.0 {
            self.get(Dimension::BestResponseNumerator, action) / den
        } else {
            0.0
        }
    }

    /// Pick and store the action with the highest best-response value.
    ///
    /// Ties go to the lowest action.
    pub fn determine_best_response_action(&self) -> u8 {
        let mut best = 1;
        let mut best_value = self.best_response_value(1);
        for action in 2..=self.num_actions {
            let v = self.best_response_value(action);
            if v > best_value {
                best = action;
                best_value = v;
            }
        }
        self.best_response_action.store(best, Ordering::Release);
        best
    }

    /// Action chosen by the last best-response computation.
    pub fn best_response_action(&self) -> u8 {
        self.best_response_action.load(Ordering::Acquire)
    }

    /// Overwrite the best-response action.
    pub fn set_best_response_action(&self, action: u8) {
        self.best_response_action.store(action, Ordering::Release);
    }

    /// Mark whether play reaches this node when its owner best-responds.
    pub fn set_reachable_under_best_response(&self, reachable: bool) {
        self.reachable_under_best_response
            .store(reachable, Ordering::Release);
    }

    /// Whether play reaches this node when its owner best-responds.
    pub fn reachable_under_best_response(&self) -> bool {
        self.reachable_under_best_response.load(Ordering::Acquire)
    }

    /// Mark `action` as carrying negligible opponent mass.
    pub fn set_prunable(&self, action: u8, prunable: bool) {
        self.prunable[action as usize - 1].store(prunable, Ordering::Release);
    }

    /// Whether `action` carries negligible opponent mass.
    pub fn is_prunable(&self, action: u8) -> bool {
        self.prunable[action as usize - 1].load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Structure recorded by tree walks
    // ------------------------------------------------------------------

    /// Widen the stored utility bounds.
    pub fn merge_bounds(&self, bounds: &UtilityBounds) {
        let mut stored = self.bounds.write().unwrap_or_else(PoisonError::into_inner);
        match stored.as_mut() {
            Some(existing) => existing.merge(bounds),
            None => *stored = Some(bounds.clone()),
        }
    }

    /// Forget the stored utility bounds.
    pub fn clear_bounds(&self) {
        *self.bounds.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Stored utility bounds for every player.
    pub fn bounds(&self) -> Option<UtilityBounds> {
        self.bounds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Minimum payoff `player` can receive below this node.
    pub fn min_possible(&self, player: usize) -> Option<f64> {
        self.bounds().map(|b| b.min[player])
    }

    /// Maximum payoff `player` can receive below this node.
    pub fn max_possible(&self, player: usize) -> Option<f64> {
        self.bounds().map(|b| b.max[player])
    }

    fn utility_range(&self) -> Option<(f64, f64)> {
        let bounds = self.bounds.read().unwrap_or_else(PoisonError::into_inner);
        bounds
            .as_ref()
            .map(|b| (b.min[self.player], b.max[self.player]))
    }

    /// Record the predecessor seen during best-response preparation.
    ///
    /// Reaching the node again from a different predecessor is an error.
    pub fn record_predecessor(&self, link: PredecessorLink) -> SolverResult<()> {
        let stored = self.predecessor.get_or_init(|| link);
        if *stored == link {
            Ok(())
        } else {
            Err(SolverError::InconsistentPredecessor { node_id: self.id })
        }
    }

    /// The recorded predecessor. Fails if preparation never reached the node.
    pub fn predecessor(&self) -> SolverResult<PredecessorLink> {
        self.predecessor
            .get()
            .copied()
            .ok_or(SolverError::MissingPredecessor { node_id: self.id })
    }

    // ------------------------------------------------------------------
    // Past strategies
    // ------------------------------------------------------------------

    /// Push the current strategy onto the ring buffer.
    pub fn record_past_strategy(&self) -> SolverResult<()> {
        let capacity = self.past_capacity.load(Ordering::Acquire);
        if capacity == 0 {
            return Ok(());
        }
        let probs = self.current_probabilities()?;
        let mut past = self
            .past_strategies
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if past.len() == capacity {
            past.pop_front();
        }
        past.push_back(probs.into_boxed_slice());
        Ok(())
    }

    /// Recorded strategies, oldest first.
    pub fn past_strategies(&self) -> Vec<Vec<f64>> {
        self.past_strategies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| p.to_vec())
            .collect()
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Copy the numeric block.
    pub fn backup(&self) -> NodeBackup {
        NodeBackup {
            node_id: self.id,
            decision_index: self.decision_index,
            key: self.key.clone(),
            values: self.values.iter().map(|v| v.load()).collect(),
            best_response_action: self.best_response_action(),
        }
    }

    /// Restore a copy taken with [`backup`](Self::backup).
    pub fn restore(&self, backup: &NodeBackup) -> SolverResult<()> {
        if backup.values.len() != self.values.len() {
            return Err(SolverError::ActionCountMismatch {
                decision_index: self.decision_index,
                expected: self.values.len(),
                actual: backup.values.len(),
            });
        }
        for (slot, v) in self.values.iter().zip(&backup.values) {
            slot.store(*v);
        }
        self.set_best_response_action(backup.best_response_action);
        Ok(())
    }
}

/// Whether `probs` sums to one within tolerance.
#[inline]
pub(crate) fn sums_to_one(probs: &[f64]) -> bool {
    (probs.iter().sum::<f64>() - 1.0).abs() <= PROBABILITY_TOLERANCE
}

/// In-place regret matching of `values`.
pub(crate) fn regret_matching(values: &mut [f64]) {
    let mut positive_count = 0;
    let mut last_positive = 0;
    let mut sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        if *v > 0.0 {
            positive_count += 1;
            last_positive = i;
            sum += v;
        }
    }
    match positive_count {
        0 => {
            let uniform = 1.0 / values.len() as f64;
            values.iter_mut().for_each(|v| *v = uniform);
        }
        1 => {
            values.iter_mut().for_each(|v| *v = 0.0);
            values[last_positive] = 1.0;
        }
        _ => {
            for v in values.iter_mut() {
                *v = if *v > 0.0 { *v / sum } else { 0.0 };
            }
        }
    }
}

fn normalize_or_uniform(values: &mut [f64]) {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        values.iter_mut().for_each(|v| *v /= sum);
    } else {
        let uniform = 1.0 / values.len() as f64;
        values.iter_mut().for_each(|v| *v = uniform);
    }
}

fn local_range(values: &[f64], reached: &[bool]) -> (f64, f64) {
    let mut low = f64::INFINITY;
    let mut high = f64::NEG_INFINITY;
    for (v, r) in values.iter().zip(reached) {
        if *r {
            low = low.min(*v);
            high = high.max(*v);
        }
    }
    if low > high {
        (0.0, 0.0)
    } else {
        (low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rayon::prelude::*;

    fn node(num_actions: u8) -> InformationSetNode {
        InformationSetNode::new(0, 0, 0, num_actions, vec![1], &CFRConfig::default())
    }

    fn set_regrets(node: &InformationSetNode, regrets: &[f64]) {
        for (i, r) in regrets.iter().enumerate() {
            node.set(Dimension::CumulativeRegret, i as u8 + 1, *r);
        }
    }

    #[test]
    fn test_fresh_node_is_uniform() {
        let n = node(4);
        assert_eq!(n.current_probabilities().unwrap(), vec![0.25; 4]);
        assert_eq!(n.average_strategy_probabilities().unwrap(), vec![0.25; 4]);
        assert_eq!(n.get(Dimension::AdjustedWeight, 2), 1.0);
    }

    #[test]
    fn test_regret_matching_proportional() {
        let n = node(3);
        set_regrets(&n, &[3.0, -1.0, 1.0]);
        n.update_regret_matching().unwrap();
        assert_eq!(n.current_probabilities().unwrap(), vec![0.75, 0.0, 0.25]);
    }

    #[test]
    fn test_regret_matching_all_nonpositive_is_uniform() {
        let n = node(2);
        set_regrets(&n, &[0.0, -5.0]);
        n.update_regret_matching().unwrap();
        assert_eq!(n.current_probabilities().unwrap(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_single_positive_regret_gets_exactly_one() {
        let n = node(3);
        set_regrets(&n, &[-2.0, 1e-300, -7.0]);
        n.update_regret_matching().unwrap();
        let probs = n.current_probabilities().unwrap();
        assert_eq!(probs[1], 1.0);
        assert_eq!(probs[0], 0.0);
        assert_eq!(probs[2], 0.0);
    }

    #[test]
    fn test_regret_matching_is_idempotent() {
        let n = node(4);
        set_regrets(&n, &[0.1, 0.7, 0.0, 2.3]);
        n.update_regret_matching().unwrap();
        let first = n.current_probabilities().unwrap();
        n.update_regret_matching().unwrap();
        let second = n.current_probabilities().unwrap();
        assert_eq!(
            first.iter().map(|p| p.to_bits()).collect::<Vec<_>>(),
            second.iter().map(|p| p.to_bits()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_accumulate_regret_and_commit() {
        let n = node(2);
        n.accumulate_regret(1, 0.5, 2.0, 1.0, 1.0);
        n.accumulate_regret(2, 0.5, 0.0, 1.0, 1.0);
        assert_eq!(n.get(Dimension::CumulativeRegret, 1), 0.5);
        assert_eq!(n.get(Dimension::CumulativeRegret, 2), -0.5);
        n.commit_iteration(1.0, false, true);
        assert_eq!(n.get(Dimension::CumulativeRegret, 2), 0.0);
        n.update_regret_matching().unwrap();
        assert_eq!(n.current_probabilities().unwrap(), vec![1.0, 0.0]);
        assert_eq!(n.get(Dimension::LastRegretDenominator, 1), 0.0);
    }

    #[test]
    fn test_cumulative_strategy_normalized_increment() {
        let n = node(2);
        n.accumulate_cumulative_strategy_increment(1, 0.02);
        n.accumulate_cumulative_strategy_increment(2, 0.06);
        n.commit_iteration(2.0, true, false);
        assert!((n.get(Dimension::CumulativeStrategy, 1) - 0.5).abs() < 1e-12);
        assert!((n.get(Dimension::CumulativeStrategy, 2) - 1.5).abs() < 1e-12);
        assert_eq!(n.get(Dimension::LastCumulativeStrategyIncrement, 1), 0.0);
    }

    #[test]
    fn test_average_strategy_zero_threshold() {
        let n = node(3);
        n.set(Dimension::CumulativeStrategy, 1, 0.005);
        n.set(Dimension::CumulativeStrategy, 2, 0.495);
        n.set(Dimension::CumulativeStrategy, 3, 0.5);
        let avg = n.calculate_average_strategy(0.01);
        assert_eq!(avg[0], 0.0);
        assert!((avg.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((avg[2] - 0.5 / 0.995).abs() < 1e-12);
        assert_eq!(n.average_strategy_probabilities().unwrap(), avg);
    }

    #[test]
    fn test_hedge_moves_toward_better_action() {
        let config = CFRConfig::hedge(0.5);
        let n = InformationSetNode::new(0, 0, 0, 2, vec![], &config);
        n.merge_bounds(&UtilityBounds {
            min: vec![-1.0, -1.0],
            max: vec![1.0, 1.0],
        });
        n.accumulate_regret(1, 1.0, 1.0, 0.0, 1.0);
        n.accumulate_regret(2, 1.0, -1.0, 0.0, 1.0);
        n.update_current_strategy(0.5).unwrap();
        let probs = n.current_probabilities().unwrap();
        assert!((probs[0] - 1.0 / 1.5).abs() < 1e-12);
        assert!((probs[1] - 0.5 / 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_hedge_rescales_on_underflow() {
        let config = CFRConfig::hedge(0.5);
        let n = InformationSetNode::new(0, 0, 0, 2, vec![], &config);
        n.set(Dimension::AdjustedWeight, 1, 1e-200);
        n.set(Dimension::AdjustedWeight, 2, 3e-200);
        n.update_hedge(0.5).unwrap();
        assert!(n.get(Dimension::AdjustedWeight, 1) > 1e-100);
        let probs = n.current_probabilities().unwrap();
        assert!((probs[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_best_response_ties_go_to_first() {
        let n = node(3);
        n.accumulate_best_response(1, 0.5, 2.0);
        n.accumulate_best_response(2, 0.25, 4.0);
        n.accumulate_best_response(3, 0.5, 1.0);
        assert_eq!(n.best_response_value(1), 2.0);
        assert_eq!(n.determine_best_response_action(), 2);
        n.reset_best_response();
        n.accumulate_best_response(1, 1.0, 3.0);
        n.accumulate_best_response(3, 1.0, 3.0);
        assert_eq!(n.determine_best_response_action(), 1);
    }

    #[test]
    fn test_publish_opponent_probabilities_prunes() {
        let n = node(3);
        set_regrets(&n, &[0.001, 0.5, 0.499]);
        n.update_regret_matching().unwrap();
        n.publish_opponent_probabilities(Some(0.01)).unwrap();
        let published = n.opponent_probabilities().unwrap();
        assert_eq!(published[0], 0.0);
        assert!((published.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_backup_restore() {
        let n = node(2);
        set_regrets(&n, &[1.0, 2.0]);
        n.set_best_response_action(2);
        let backup = n.backup();
        set_regrets(&n, &[9.0, 9.0]);
        n.set_best_response_action(1);
        n.restore(&backup).unwrap();
        assert_eq!(n.row(Dimension::CumulativeRegret), vec![1.0, 2.0]);
        assert_eq!(n.best_response_action(), 2);
    }

    #[test]
    fn test_predecessor_must_be_consistent() {
        let n = node(2);
        assert_eq!(
            n.predecessor(),
            Err(SolverError::MissingPredecessor { node_id: 0 })
        );
        let link = PredecessorLink::InformationSet {
            node_id: 4,
            action: 2,
        };
        n.record_predecessor(link).unwrap();
        n.record_predecessor(link).unwrap();
        assert!(n.record_predecessor(PredecessorLink::Root).is_err());
        assert_eq!(n.predecessor(), Ok(link));
    }

    #[test]
    fn test_past_strategy_ring_buffer() {
        let config = CFRConfig::default().with_past_strategies(2);
        let n = InformationSetNode::new(0, 0, 0, 2, vec![], &config);
        for regrets in [[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]] {
            set_regrets(&n, &regrets);
            n.update_regret_matching().unwrap();
            n.record_past_strategy().unwrap();
        }
        assert_eq!(n.past_strategies(), vec![vec![0.0, 1.0], vec![0.5, 0.5]]);
    }

    #[test]
    fn test_sample_average_action() {
        let n = node(2);
        n.set(Dimension::CumulativeStrategy, 2, 1.0);
        n.calculate_average_strategy(0.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(n.sample_average_action(&mut rng).unwrap(), 2);
        }
    }

    #[test]
    fn test_concurrent_updates_keep_distribution_valid() {
        let n = node(3);
        (0..2_000u32).into_par_iter().for_each(|i| {
            let action = (i % 3) as u8 + 1;
            n.accumulate_regret(action, 1.0, (i % 7) as f64, 3.0, 1.0);
            if i % 10 == 0 {
                n.update_regret_matching().unwrap();
            }
            let probs = n.current_probabilities().unwrap();
            assert!(sums_to_one(&probs));
        });
    }
}
