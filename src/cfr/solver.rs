//! Full-width Counterfactual Regret Minimization driver.
//!
//! Each iteration is one simultaneous-update tree walk followed by a
//! stratum-by-stratum update of every information set:
//! - **Commit**: fold the pending regret and cumulative-strategy increments
//!   into the cumulative rows, discounted if configured (CFR+ floors regret)
//! - **Update**: regret matching or multiplicative weights (hedge)
//! - **Publish**: the probabilities opponents see, with tiny ones pruned
//!
//! The solver is generic over any game that implements [`GameDefinition`].

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::cfr::accelerated::{AcceleratedBestResponse, BestResponseSummary};
use crate::cfr::config::{CFRConfig, CFRStats, ConfigError};
use crate::cfr::discount::DiscountSchedule;
use crate::cfr::error::SolverResult;
use crate::cfr::game::{validate_decisions, GameDefinition};
use crate::cfr::navigation::Navigation;
use crate::cfr::nodes::{Dimension, InformationSetNode, NodeStore, StoreExport};
use crate::cfr::processors::{
    BruteForceBestResponse, DistributedChanceAggregator, MinMaxProcessor, ReachProbabilities,
    RegretUpdateProcessor, StrategySource, UtilityCalculator,
};
use crate::cfr::tree_walk::TreeWalk;

/// The main CFR solver.
///
/// Construction materializes the whole tree, aggregates distributed chance
/// decisions, computes utility bounds and prepares the accelerated best
/// response, so the solver is ready to train as soon as it exists.
///
/// # Type Parameters
/// - `G`: The game type implementing the `GameDefinition` trait
///
/// # Example
/// ```
/// use cfr_engine::cfr::{CFRConfig, CFRSolver};
/// use cfr_engine::games::kuhn::KuhnPoker;
///
/// let mut solver = CFRSolver::new(KuhnPoker::new(), CFRConfig::default()).unwrap();
/// solver.train(100).unwrap();
/// let exploitability = solver.calculate_exploitability().unwrap();
/// assert!(exploitability >= 0.0);
/// ```
pub struct CFRSolver<G: GameDefinition> {
    /// Configuration for the solver.
    config: CFRConfig,

    /// The game together with the nodes it has materialized.
    navigation: Navigation<G>,

    /// Current iteration count.
    iteration: u64,

    /// Statistics tracking.
    stats: CFRStats,

    /// Random number generator for sampling from average strategies.
    rng: StdRng,

    /// Dedicated pool when a thread count is configured.
    pool: Option<ThreadPool>,

    /// Discount schedule for the planned run, if discounting.
    schedule: Option<DiscountSchedule>,

    /// Length of the run the schedule was built for.
    planned_iterations: u64,

    /// Best-response engine prepared over the materialized tree.
    best_response: AcceleratedBestResponse,
}

impl<G: GameDefinition> CFRSolver<G> {
    /// Create a new CFR solver for the given game.
    ///
    /// # Arguments
    /// * `game` - The game to solve
    /// * `config` - Configuration options for the solver
    pub fn new(game: G, config: CFRConfig) -> SolverResult<Self> {
        config.validate()?;
        validate_decisions(game.decisions(), game.num_players())?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let pool = config.num_threads.and_then(|threads| {
            match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!("falling back to the global rayon pool: {}", e);
                    None
                }
            }
        });

        let start = Instant::now();
        let navigation = Navigation::new(game, NodeStore::new(&config));
        let best_response = Self::initialize(&navigation, &config)?;
        info!(
            "{}: {} information sets, {} chance nodes, {} leaves ready in {:.3}s",
            navigation.game().name(),
            navigation.store().num_information_sets(),
            navigation.store().num_chance_nodes(),
            navigation.store().num_leaves(),
            start.elapsed().as_secs_f64()
        );

        let mut stats = CFRStats::new();
        stats.info_sets = navigation.store().num_information_sets();
        stats.chance_nodes = navigation.store().num_chance_nodes();

        Ok(Self {
            config,
            navigation,
            iteration: 0,
            stats,
            rng,
            pool,
            schedule: None,
            planned_iterations: 0,
            best_response,
        })
    }

    /// Chance aggregation, bounds walk, node reset and best-response
    /// preparation, in that order.
    fn initialize(
        navigation: &Navigation<G>,
        config: &CFRConfig,
    ) -> SolverResult<AcceleratedBestResponse> {
        let store = navigation.store();
        let walk = TreeWalk::new(navigation);

        // Leaves below pinned decisions read the keyed tables.
        DistributedChanceAggregator::aggregate(navigation)?;
        // The first bounds walk materializes the leaves the weight applies to.
        walk.walk(&MinMaxProcessor::new(), ())?;
        if config.weight_on_opponent_utility != 0.0 {
            store.set_weight_on_opponent(config.weight_on_opponent_utility);
            for node in store.information_sets() {
                node.clear_bounds();
            }
            walk.walk(&MinMaxProcessor::new(), ())?;
        }
        debug!("navigation cache holds {} histories", navigation.cached_histories());

        store.reset_all();
        AcceleratedBestResponse::prepare(navigation)
    }

    /// Run `f` on the dedicated pool if there is one.
    fn install<T: Send>(&self, f: impl FnOnce() -> T + Send) -> T {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }

    fn for_each_node<F>(&self, nodes: &[Arc<InformationSetNode>], f: F) -> SolverResult<()>
    where
        F: Fn(&InformationSetNode) -> SolverResult<()> + Sync + Send,
    {
        if self.config.parallel {
            self.install(|| nodes.par_iter().try_for_each(|n| f(n)))
        } else {
            nodes.iter().try_for_each(|n| f(n))
        }
    }

    /// Build the discount schedule for a run ending at `total` iterations.
    ///
    /// [`train`](Self::train) does this itself; call it directly only when
    /// driving [`run_iteration`](Self::run_iteration) by hand.
    pub fn plan_iterations(&mut self, total: u64) {
        self.planned_iterations = total;
        self.schedule = self
            .config
            .discounting
            .as_ref()
            .map(|d| DiscountSchedule::new(d, total));
    }

    /// Run a single iteration.
    ///
    /// One walk accumulates every player's regret and pending cumulative
    /// strategy; then every information set is updated.
    pub fn run_iteration(&mut self) -> SolverResult<()> {
        self.iteration += 1;
        let iteration = self.iteration;
        let (regret_factor, strategy_factor) = match &self.schedule {
            Some(s) => (s.regret_factor(iteration), s.average_strategy_factor(iteration)),
            None => (1.0, 1.0),
        };

        let start = Instant::now();
        let processor = RegretUpdateProcessor::new(regret_factor);
        let reach = ReachProbabilities::root(self.navigation.num_players());
        let walk = TreeWalk::new(&self.navigation);
        let root = if self.config.parallel {
            self.install(|| walk.walk_parallel(&processor, reach))?
        } else {
            walk.walk(&processor, reach)?
        };
        let walked = start.elapsed();

        let normalize = self.config.normalize_cumulative_strategy_increments;
        let regret_plus = self.config.use_regret_plus;
        let epsilon = self.config.hedge_epsilon;
        let threshold = self.config.opponent_pruning_threshold;
        for stratum in self.navigation.store().strata() {
            self.for_each_node(&stratum, |node| {
                node.commit_iteration(strategy_factor, normalize, regret_plus);
                node.update_current_strategy(epsilon)?;
                node.publish_opponent_probabilities(threshold)?;
                node.record_past_strategy()
            })?;
        }

        trace!(
            "iteration {}: walk {:.3}ms, update {:.3}ms, current values {:?}",
            iteration,
            walked.as_secs_f64() * 1e3,
            (start.elapsed() - walked).as_secs_f64() * 1e3,
            root
        );
        Ok(())
    }

    /// Train the solver for a specified number of iterations.
    ///
    /// # Arguments
    /// * `iterations` - Number of iterations to run
    ///
    /// # Returns
    /// Statistics from the training run.
    pub fn train(&mut self, iterations: u64) -> SolverResult<&CFRStats> {
        self.train_with_callback(iterations, 0, |_| {})
    }

    /// Train with a callback for progress tracking.
    ///
    /// # Arguments
    /// * `iterations` - Number of iterations to run
    /// * `callback_interval` - How often to call the callback (0 never calls it)
    /// * `callback` - Function called every `callback_interval` iterations
    pub fn train_with_callback<F>(
        &mut self,
        iterations: u64,
        callback_interval: u64,
        mut callback: F,
    ) -> SolverResult<&CFRStats>
    where
        F: FnMut(&CFRStats),
    {
        let target = self.iteration + iterations;
        if self.config.discounting.is_some() && self.planned_iterations < target {
            self.plan_iterations(target);
        }
        info!(
            "training {} for {} iterations from iteration {}",
            self.navigation.game().name(),
            iterations,
            self.iteration
        );

        let start_time = Instant::now();
        let elapsed_before = self.stats.elapsed_seconds;
        for i in 0..iterations {
            self.run_iteration()?;

            if let Some(every) = self.config.best_response_every {
                if self.iteration % every == 0 {
                    self.calculate_exploitability()?;
                }
            }

            if callback_interval > 0 && (i + 1) % callback_interval == 0 {
                self.refresh_stats(elapsed_before + start_time.elapsed().as_secs_f64());
                callback(&self.stats);
            }
        }

        self.refresh_stats(elapsed_before + start_time.elapsed().as_secs_f64());
        info!(
            "trained to iteration {} in {:.2}s ({:.0} it/s)",
            self.iteration, self.stats.elapsed_seconds, self.stats.iterations_per_second
        );
        Ok(&self.stats)
    }

    fn refresh_stats(&mut self, elapsed_seconds: f64) {
        self.stats.iterations = self.iteration;
        self.stats.info_sets = self.navigation.store().num_information_sets();
        self.stats.chance_nodes = self.navigation.store().num_chance_nodes();
        self.stats.elapsed_seconds = elapsed_seconds;
        self.stats.update_rate();
    }

    /// Store every average strategy, run `f`, and restore the numeric state
    /// afterwards if configured.
    fn with_average_strategies<T>(
        &self,
        f: impl FnOnce(&Self) -> SolverResult<T>,
    ) -> SolverResult<T> {
        let store = self.navigation.store();
        let backup = self
            .config
            .restore_after_best_response
            .then(|| store.backup_all());
        let zero_threshold = self.config.average_strategy_zero_threshold;
        self.for_each_node(&store.information_sets(), |node| {
            node.calculate_average_strategy(zero_threshold);
            Ok(())
        })?;
        let result = f(self);
        if let Some(backup) = backup {
            store.restore_all(&backup)?;
        }
        result
    }

    /// Best response of every player to the average strategies.
    pub fn best_response_summary(&mut self) -> SolverResult<BestResponseSummary> {
        let start = Instant::now();
        let summary = self.with_average_strategies(|solver| {
            let engine = &solver.best_response;
            solver.install(|| engine.measure())
        })?;
        let nash_conv = summary.nash_conv();
        self.stats.record_exploitability(self.iteration, nash_conv);
        info!(
            "iteration {}: exploitability {:.6} (best response {:?}, average {:?}) in {:.3}s",
            self.iteration,
            nash_conv,
            summary.best_response_values,
            summary.average_values,
            start.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    /// Calculate exploitability of the average strategy.
    ///
    /// Exploitability is the sum over players of what a best response gains
    /// over the average strategy. Lower is better; 0 means Nash equilibrium.
    pub fn calculate_exploitability(&mut self) -> SolverResult<f64> {
        Ok(self.best_response_summary()?.nash_conv())
    }

    /// Exploitability by layered full tree walks instead of the accelerated
    /// engine. Much slower; useful as a cross-check.
    pub fn brute_force_exploitability(&self) -> SolverResult<f64> {
        self.with_average_strategies(|solver| {
            BruteForceBestResponse::new().exploitability(&solver.navigation)
        })
    }

    /// Expected payoff of every player when everyone plays their average
    /// strategy.
    pub fn average_strategy_values(&self) -> SolverResult<Vec<f64>> {
        self.with_average_strategies(|solver| {
            TreeWalk::new(&solver.navigation)
                .walk(&UtilityCalculator::new(StrategySource::Average), 1.0)
        })
    }

    fn find(&self, decision_index: usize, key: &[u8]) -> Option<Arc<InformationSetNode>> {
        self.navigation
            .store()
            .find_information_set(decision_index, key)
    }

    /// Get the current strategy for an information set.
    pub fn get_current_strategy(&self, decision_index: usize, key: &[u8]) -> Option<Vec<f64>> {
        self.find(decision_index, key)
            .map(|node| node.row(Dimension::CurrentProbability))
    }

    /// Get the average strategy for an information set.
    ///
    /// This returns the time-averaged strategy which converges to Nash equilibrium.
    pub fn get_average_strategy(&self, decision_index: usize, key: &[u8]) -> Option<Vec<f64>> {
        self.find(decision_index, key)
            .map(|node| node.compute_average_strategy(self.config.average_strategy_zero_threshold))
    }

    /// Draw an action (1-based) from an information set's average strategy.
    pub fn sample_average_action(
        &mut self,
        decision_index: usize,
        key: &[u8],
    ) -> SolverResult<Option<u8>> {
        let Some(node) = self.find(decision_index, key) else {
            return Ok(None);
        };
        node.calculate_average_strategy(self.config.average_strategy_zero_threshold);
        node.sample_average_action(&mut self.rng).map(Some)
    }

    /// Get the current iteration count.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Get the number of information sets in the tree.
    pub fn num_info_sets(&self) -> usize {
        self.navigation.store().num_information_sets()
    }

    /// Get current statistics.
    pub fn stats(&self) -> &CFRStats {
        &self.stats
    }

    /// Get reference to the node store for analysis.
    pub fn store(&self) -> &NodeStore {
        self.navigation.store()
    }

    /// Get reference to the navigation, e.g. to run other processors.
    pub fn navigation(&self) -> &Navigation<G> {
        &self.navigation
    }

    /// Get reference to the game.
    pub fn game(&self) -> &G {
        self.navigation.game()
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &CFRConfig {
        &self.config
    }

    /// Get reference to the best-response engine.
    pub fn best_response(&self) -> &AcceleratedBestResponse {
        &self.best_response
    }

    /// Export solver state for checkpointing.
    pub fn export_state(&self) -> SolverState {
        SolverState {
            game: self.navigation.game().name(),
            iteration: self.iteration,
            store: self.navigation.store().export(),
            stats: self.stats.clone(),
        }
    }

    /// Import solver state from checkpoint. Returns the number of
    /// information sets restored.
    pub fn import_state(&mut self, state: &SolverState) -> SolverResult<usize> {
        let restored = self.navigation.store().import(&state.store)?;
        self.iteration = state.iteration;
        self.stats = state.stats.clone();
        self.refresh_stats(self.stats.elapsed_seconds);
        info!(
            "restored {} information sets of {} at iteration {}",
            restored, state.game, state.iteration
        );
        Ok(restored)
    }

    /// Reset the solver to initial state.
    pub fn reset(&mut self) {
        self.navigation.store().reset_all();
        self.iteration = 0;
        self.schedule = None;
        self.planned_iterations = 0;
        self.stats = CFRStats::new();
        self.refresh_stats(0.0);
    }
}

/// Serializable solver state for checkpointing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverState {
    /// Name of the game the state belongs to.
    pub game: String,
    /// Current iteration.
    pub iteration: u64,
    /// Numeric state of every information set.
    pub store: StoreExport,
    /// Statistics.
    pub stats: CFRStats,
}

impl SolverState {
    /// Save as JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json =
            serde_json::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, json).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Load from JSON written by [`save_json`](Self::save_json).
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfr::config::{DiscountingConfig, NavigationMode, RegretAlgorithm};
    use crate::cfr::error::SolverError;
    use crate::cfr::nodes::PROBABILITY_TOLERANCE;
    use crate::games::kuhn::KuhnPoker;
    use crate::games::signals::SignalsGame;
    use rstest::rstest;

    fn kuhn(config: CFRConfig) -> CFRSolver<KuhnPoker> {
        CFRSolver::new(KuhnPoker::new(), config).unwrap()
    }

    fn discounted() -> CFRConfig {
        CFRConfig::discounted(0.25, 0.001)
    }

    fn pruned() -> CFRConfig {
        let mut config = CFRConfig::default();
        config.opponent_pruning_threshold = Some(0.01);
        config
    }

    #[test]
    fn test_initialization_materializes_tree() {
        let solver = kuhn(CFRConfig::default());
        assert_eq!(solver.num_info_sets(), 12);
        assert_eq!(solver.stats().info_sets, 12);
        assert_eq!(solver.store().num_leaves(), 30);
        assert_eq!(solver.iteration(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = CFRConfig::default();
        config.hedge_epsilon = 1.5;
        let result = CFRSolver::new(KuhnPoker::new(), config);
        assert!(matches!(
            result,
            Err(SolverError::Config(ConfigError::InvalidEpsilon(_)))
        ));
    }

    #[rstest]
    #[case::regret_matching(CFRConfig::regret_matching())]
    #[case::regret_plus(CFRConfig::default().with_regret_plus(true))]
    #[case::hedge(CFRConfig::hedge(0.5))]
    #[case::discounted(discounted())]
    #[case::pruned(pruned())]
    fn test_strategies_stay_distributions(#[case] config: CFRConfig) {
        let mut solver = kuhn(config);
        solver.train(200).unwrap();
        for node in solver.store().information_sets() {
            let current: f64 = node.current_probabilities().unwrap().iter().sum();
            let published: f64 = node.opponent_probabilities().unwrap().iter().sum();
            let average: f64 = node.compute_average_strategy(0.0).iter().sum();
            assert!((current - 1.0).abs() < PROBABILITY_TOLERANCE);
            assert!((published - 1.0).abs() < PROBABILITY_TOLERANCE);
            assert!((average - 1.0).abs() < PROBABILITY_TOLERANCE);
        }
    }

    #[test]
    fn test_exploitability_decreases() {
        let mut solver = kuhn(CFRConfig::default());
        solver.train(50).unwrap();
        let early = solver.calculate_exploitability().unwrap();
        solver.train(1_950).unwrap();
        let late = solver.calculate_exploitability().unwrap();
        assert!(late < early, "{} should be below {}", late, early);
        assert!(late < 0.05, "exploitability {} after 2000 iterations", late);
        assert_eq!(solver.stats().exploitability_history.len(), 2);
    }

    #[test]
    fn test_accelerated_matches_brute_force() {
        let mut solver = kuhn(CFRConfig::default());
        solver.train(300).unwrap();
        let accelerated = solver.calculate_exploitability().unwrap();
        let brute_force = solver.brute_force_exploitability().unwrap();
        assert!((accelerated - brute_force).abs() < 1e-9);
    }

    #[test]
    fn test_scheduled_measurements() {
        let mut solver = kuhn(CFRConfig::default().with_best_response_every(25));
        solver.train(100).unwrap();
        let iterations: Vec<u64> = solver
            .stats()
            .exploitability_history
            .iter()
            .map(|p| p.iteration)
            .collect();
        assert_eq!(iterations, vec![25, 50, 75, 100]);
        assert!(solver.stats().exploitability.is_some());
    }

    #[test]
    fn test_measurement_does_not_perturb_training() {
        let mut measured = kuhn(CFRConfig::default());
        measured.train(100).unwrap();
        measured.calculate_exploitability().unwrap();
        measured.train(100).unwrap();

        let mut plain = kuhn(CFRConfig::default());
        plain.train(200).unwrap();

        for node in plain.store().information_sets() {
            let other = measured.get_average_strategy(node.decision_index(), node.key()).unwrap();
            for (a, b) in node.compute_average_strategy(0.0).iter().zip(&other) {
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut sequential = kuhn(CFRConfig::default());
        sequential.train(100).unwrap();
        let mut parallel = kuhn(CFRConfig::default().with_parallel(Some(2)));
        parallel.train(100).unwrap();

        for node in sequential.store().information_sets() {
            let other = parallel.get_average_strategy(node.decision_index(), node.key()).unwrap();
            for (a, b) in node.compute_average_strategy(0.0).iter().zip(&other) {
                assert!((a - b).abs() < 1e-9);
            }
        }
        let a = sequential.calculate_exploitability().unwrap();
        let b = parallel.calculate_exploitability().unwrap();
        assert!((a - b).abs() < 1e-9);
    }

    #[rstest]
    #[case(NavigationMode::GamePlayer)]
    #[case(NavigationMode::CachedHistory)]
    #[case(NavigationMode::Verified)]
    fn test_navigation_modes_agree(#[case] mode: NavigationMode) {
        let mut reference = kuhn(CFRConfig::default());
        reference.train(50).unwrap();
        let mut other = kuhn(CFRConfig::default().with_navigation(mode));
        other.train(50).unwrap();
        let a = reference.average_strategy_values().unwrap();
        let b = other.average_strategy_values().unwrap();
        assert!((a[0] - b[0]).abs() < 1e-12);
    }

    #[test]
    fn test_distributed_chance_preserves_training() {
        let config = CFRConfig::default();
        let mut expanded = CFRSolver::new(SignalsGame::new(), config.clone()).unwrap();
        let mut distributed =
            CFRSolver::new(SignalsGame::new(), config.with_distributed_chance(true)).unwrap();
        assert!(distributed.store().num_leaves() < expanded.store().num_leaves());

        expanded.train(50).unwrap();
        distributed.train(50).unwrap();
        let a = expanded.average_strategy_values().unwrap();
        let b = distributed.average_strategy_values().unwrap();
        assert!((a[0] - b[0]).abs() < 1e-6, "{:?} vs {:?}", a, b);

        let x = expanded.calculate_exploitability().unwrap();
        let y = distributed.calculate_exploitability().unwrap();
        assert!((x - y).abs() < 1e-6);
    }

    #[test]
    fn test_discounting_schedule_is_planned() {
        let mut config = discounted();
        config.discounting = Some(DiscountingConfig {
            discount_regrets: false,
            ..DiscountingConfig::default()
        });
        let mut solver = kuhn(config);
        solver.train(40).unwrap();
        assert_eq!(solver.planned_iterations, 40);
        solver.train(10).unwrap();
        assert_eq!(solver.planned_iterations, 50);
    }

    #[test]
    fn test_hedge_algorithm_is_selected() {
        let mut solver = kuhn(CFRConfig::hedge(0.3));
        solver.train(10).unwrap();
        assert!(solver
            .store()
            .information_sets()
            .iter()
            .all(|n| n.algorithm() == RegretAlgorithm::MultiplicativeWeights));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let mut solver = kuhn(CFRConfig::default().with_seed(3));
        solver.train(150).unwrap();
        let state = solver.export_state();
        assert_eq!(state.game, "kuhn");

        let json = serde_json::to_string(&state).unwrap();
        let restored_state: SolverState = serde_json::from_str(&json).unwrap();

        let mut resumed = kuhn(CFRConfig::default().with_seed(3));
        assert_eq!(resumed.import_state(&restored_state).unwrap(), 12);
        assert_eq!(resumed.iteration(), 150);

        for node in solver.store().information_sets() {
            let a = node.compute_average_strategy(0.0);
            let b = resumed.get_average_strategy(node.decision_index(), node.key()).unwrap();
            assert_eq!(a, b);
            let c = resumed.get_current_strategy(node.decision_index(), node.key()).unwrap();
            assert_eq!(node.row(Dimension::CurrentProbability), c);
        }

        solver.train(10).unwrap();
        resumed.train(10).unwrap();
        let x = solver.average_strategy_values().unwrap();
        let y = resumed.average_strategy_values().unwrap();
        assert!((x[0] - y[0]).abs() < 1e-12);
    }

    #[test]
    fn test_reset_clears_progress() {
        let mut solver = kuhn(CFRConfig::default());
        solver.train(100).unwrap();
        solver.reset();
        assert_eq!(solver.iteration(), 0);
        let (decision, key) = KuhnPoker::information_set(2, "");
        assert_eq!(solver.get_average_strategy(decision, &key).unwrap(), vec![0.5, 0.5]);
        assert_eq!(solver.get_current_strategy(decision, &key).unwrap(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_sample_average_action() {
        let mut solver = kuhn(CFRConfig::default().with_seed(11));
        solver.train(500).unwrap();
        let (decision, key) = KuhnPoker::information_set(0, "b");
        for _ in 0..20 {
            let action = solver.sample_average_action(decision, &key).unwrap().unwrap();
            assert!((1..=2).contains(&action));
        }
        assert_eq!(solver.sample_average_action(decision, b"9:").unwrap(), None);
    }
}
