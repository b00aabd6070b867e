//! Configuration options for the CFR solver.
//!
//! The configuration is an immutable value built once per solver run and
//! passed explicitly to every component that needs it: the strategy store,
//! the navigation layer, and the best-response engines.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// How current strategies are derived from accumulated regret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegretAlgorithm {
    /// Probability proportional to positive cumulative regret.
    RegretMatching,
    /// Multiplicative weights (hedge) over normalized last-iteration regret.
    MultiplicativeWeights,
}

/// Strategy used by the navigation layer to materialize the game tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationMode {
    /// Replay the game definition's rules at every step.
    GamePlayer,
    /// Serve nodes from a cache keyed by the action path; misses replay once.
    CachedHistory,
    /// Walk a lazily materialized tree of cursors.
    CachedTree,
    /// Run `GamePlayer` and `CachedHistory` together and require agreement.
    Verified,
}

/// Iteration-dependent discounting of regret and strategy increments.
///
/// The discount applied at iteration `t` of `T` is `(t / T)^k` with
/// `k = ln(target_discount) / ln(target_proportion_of_iterations)`, so the
/// factor at `p * T` is exactly `target_discount` times the factor at `T`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscountingConfig {
    /// Fraction of the run at which the target discount is reached.
    pub target_proportion_of_iterations: f64,

    /// Discount relative to the final iteration at that fraction.
    pub target_discount: f64,

    /// Freeze the discount factor after this fraction of the run.
    pub cutoff_proportion_of_iterations: Option<f64>,

    /// Scale regret increments.
    pub discount_regrets: bool,

    /// Scale cumulative-strategy increments.
    pub discount_average_strategy: bool,
}

impl Default for DiscountingConfig {
    fn default() -> Self {
        Self {
            target_proportion_of_iterations: 0.25,
            target_discount: 1.0 / 1000.0,
            cutoff_proportion_of_iterations: None,
            discount_regrets: true,
            discount_average_strategy: true,
        }
    }
}

/// Configuration for the CFR solver.
///
/// # Example
/// ```
/// use cfr_engine::cfr::{CFRConfig, RegretAlgorithm};
///
/// let config = CFRConfig::default();
/// assert_eq!(config.algorithm, RegretAlgorithm::RegretMatching);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CFRConfig {
    /// Strategy update rule used by every information set.
    pub algorithm: RegretAlgorithm,

    /// Floor cumulative regret at zero after each update (CFR+).
    pub use_regret_plus: bool,

    /// Learning rate for multiplicative weights, in (0, 1).
    pub hedge_epsilon: f64,

    /// Optional discounting schedule. `None` weights all iterations equally.
    pub discounting: Option<DiscountingConfig>,

    /// Rescale each iteration's cumulative-strategy increment to sum to 1.
    ///
    /// Information sets that are pruned but still reachable then contribute
    /// the same total weight as any other iteration.
    pub normalize_cumulative_strategy_increments: bool,

    /// Average-strategy entries below this are zeroed before renormalizing.
    pub average_strategy_zero_threshold: f64,

    /// Current probabilities below this are published as zero to opponents.
    pub opponent_pruning_threshold: Option<f64>,

    /// Opponent actions whose average probability is below this are
    /// skipped by the accelerated best response.
    pub best_response_pruning_threshold: Option<f64>,

    /// How the tree is materialized.
    pub navigation: NavigationMode,

    /// Collapse distributed chance decisions onto their first action.
    pub distribute_chance_decisions: bool,

    /// Number of past current-strategy vectors kept per information set.
    pub past_strategy_capacity: usize,

    /// Use rayon for node updates, tree walks and best-response passes.
    pub parallel: bool,

    /// Size of the dedicated thread pool. `None` uses rayon's global pool.
    pub num_threads: Option<usize>,

    /// Measure exploitability every this many iterations.
    pub best_response_every: Option<u64>,

    /// Snapshot every node before a best-response measurement and restore it
    /// afterwards.
    pub restore_after_best_response: bool,

    /// Weight placed on the opponent's utility at every leaf (two players).
    pub weight_on_opponent_utility: f64,

    /// Random seed for sampling helpers.
    pub seed: Option<u64>,
}

impl Default for CFRConfig {
    fn default() -> Self {
        Self {
            algorithm: RegretAlgorithm::RegretMatching,
            use_regret_plus: false,
            hedge_epsilon: 0.5,
            discounting: None,
            normalize_cumulative_strategy_increments: false,
            average_strategy_zero_threshold: 0.0,
            opponent_pruning_threshold: None,
            best_response_pruning_threshold: None,
            navigation: NavigationMode::CachedTree,
            distribute_chance_decisions: false,
            past_strategy_capacity: 0,
            parallel: false,
            num_threads: None,
            best_response_every: None,
            restore_after_best_response: true,
            weight_on_opponent_utility: 0.0,
            seed: None,
        }
    }
}

impl CFRConfig {
    /// Create a new CFRConfig with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain regret matching with no discounting.
    pub fn regret_matching() -> Self {
        Self::default()
    }

    /// Multiplicative weights with the given learning rate.
    pub fn hedge(epsilon: f64) -> Self {
        Self {
            algorithm: RegretAlgorithm::MultiplicativeWeights,
            hedge_epsilon: epsilon,
            ..Default::default()
        }
    }

    /// Regret matching with the target-based discounting schedule.
    ///
    /// # Arguments
    /// * `proportion` - Fraction of the run at which `discount` is reached
    /// * `discount` - Relative weight of that iteration versus the last one
    pub fn discounted(proportion: f64, discount: f64) -> Self {
        Self {
            discounting: Some(DiscountingConfig {
                target_proportion_of_iterations: proportion,
                target_discount: discount,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Builder method: set the update algorithm.
    pub fn with_algorithm(mut self, algorithm: RegretAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Builder method: set whether to floor regrets at zero.
    pub fn with_regret_plus(mut self, enable: bool) -> Self {
        self.use_regret_plus = enable;
        self
    }

    /// Builder method: set the navigation mode.
    pub fn with_navigation(mut self, mode: NavigationMode) -> Self {
        self.navigation = mode;
        self
    }

    /// Builder method: enable or disable chance distribution.
    pub fn with_distributed_chance(mut self, enable: bool) -> Self {
        self.distribute_chance_decisions = enable;
        self
    }

    /// Builder method: enable rayon with an optional thread count.
    pub fn with_parallel(mut self, threads: Option<usize>) -> Self {
        self.parallel = true;
        self.num_threads = threads;
        self
    }

    /// Builder method: measure exploitability periodically.
    pub fn with_best_response_every(mut self, every: u64) -> Self {
        self.best_response_every = Some(every);
        self
    }

    /// Builder method: set the accelerated best response pruning threshold.
    pub fn with_best_response_pruning(mut self, threshold: f64) -> Self {
        self.best_response_pruning_threshold = Some(threshold);
        self
    }

    /// Builder method: keep a ring buffer of past strategies.
    pub fn with_past_strategies(mut self, capacity: usize) -> Self {
        self.past_strategy_capacity = capacity;
        self
    }

    /// Builder method: set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_json_str(&content)
    }

    /// Parse configuration from a JSON string. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.hedge_epsilon > 0.0 && self.hedge_epsilon < 1.0) {
            return Err(ConfigError::InvalidEpsilon(self.hedge_epsilon));
        }

        if let Some(d) = &self.discounting {
            let p = d.target_proportion_of_iterations;
            if !(p > 0.0 && p < 1.0) {
                return Err(ConfigError::InvalidProportion("target", p));
            }
            if !(d.target_discount > 0.0 && d.target_discount <= 1.0) {
                return Err(ConfigError::InvalidDiscount(d.target_discount));
            }
            if let Some(c) = d.cutoff_proportion_of_iterations {
                if !(c > 0.0 && c <= 1.0) {
                    return Err(ConfigError::InvalidProportion("cutoff", c));
                }
            }
        }

        for (name, threshold) in [
            ("opponent pruning", self.opponent_pruning_threshold),
            ("best response pruning", self.best_response_pruning_threshold),
            ("average strategy zero", Some(self.average_strategy_zero_threshold)),
        ] {
            if let Some(t) = threshold {
                if !(0.0..1.0).contains(&t) {
                    return Err(ConfigError::InvalidThreshold(name, t));
                }
            }
        }

        if !(0.0..=1.0).contains(&self.weight_on_opponent_utility) {
            return Err(ConfigError::InvalidWeight(self.weight_on_opponent_utility));
        }

        if self.num_threads == Some(0) {
            return Err(ConfigError::InvalidThreadCount);
        }

        if self.best_response_every == Some(0) {
            return Err(ConfigError::InvalidMeasurementInterval);
        }

        Ok(())
    }
}

/// Errors that can occur when validating or loading CFR configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Hedge learning rate outside (0, 1).
    InvalidEpsilon(f64),
    /// A proportion of iterations outside its valid range.
    InvalidProportion(&'static str, f64),
    /// Target discount outside (0, 1].
    InvalidDiscount(f64),
    /// A threshold outside [0, 1).
    InvalidThreshold(&'static str, f64),
    /// Weight on opponent utility outside [0, 1].
    InvalidWeight(f64),
    /// A thread pool of zero threads was requested.
    InvalidThreadCount,
    /// Exploitability measurement interval of zero.
    InvalidMeasurementInterval,
    /// The configuration file could not be read.
    IoError(String),
    /// The configuration JSON could not be parsed.
    ParseError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidEpsilon(val) => {
                write!(f, "Hedge epsilon {} is out of range (0, 1)", val)
            }
            ConfigError::InvalidProportion(name, val) => {
                write!(f, "{} proportion {} is out of range", name, val)
            }
            ConfigError::InvalidDiscount(val) => {
                write!(f, "Target discount {} is out of range (0, 1]", val)
            }
            ConfigError::InvalidThreshold(name, val) => {
                write!(f, "{} threshold {} is out of range [0, 1)", name, val)
            }
            ConfigError::InvalidWeight(val) => {
                write!(f, "Opponent utility weight {} is out of range [0, 1]", val)
            }
            ConfigError::InvalidThreadCount => write!(f, "Thread count must be positive"),
            ConfigError::InvalidMeasurementInterval => {
                write!(f, "Best response interval must be positive")
            }
            ConfigError::IoError(e) => write!(f, "Failed to read config: {}", e),
            ConfigError::ParseError(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Statistics tracked during CFR training.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CFRStats {
    /// Total number of iterations completed.
    pub iterations: u64,

    /// Number of information sets materialized.
    pub info_sets: usize,

    /// Number of chance nodes materialized.
    pub chance_nodes: usize,

    /// Total time spent training (in seconds).
    pub elapsed_seconds: f64,

    /// Iterations per second.
    pub iterations_per_second: f64,

    /// Latest exploitability measurement.
    pub exploitability: Option<f64>,

    /// History of exploitability measurements.
    pub exploitability_history: Vec<ExploitabilityPoint>,
}

/// A single exploitability measurement at a specific iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploitabilityPoint {
    /// Iteration number when this measurement was taken.
    pub iteration: u64,
    /// Sum over players of best-response value minus average-strategy value.
    pub exploitability: f64,
}

impl CFRStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update iterations per second based on elapsed time.
    pub fn update_rate(&mut self) {
        if self.elapsed_seconds > 0.0 {
            self.iterations_per_second = self.iterations as f64 / self.elapsed_seconds;
        }
    }

    /// Record an exploitability measurement.
    pub fn record_exploitability(&mut self, iteration: u64, exploitability: f64) {
        self.exploitability = Some(exploitability);
        self.exploitability_history.push(ExploitabilityPoint {
            iteration,
            exploitability,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CFRConfig::default().validate().is_ok());
        assert!(CFRConfig::hedge(0.3).validate().is_ok());
        assert!(CFRConfig::discounted(0.25, 0.01).validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert_eq!(
            CFRConfig::hedge(1.5).validate(),
            Err(ConfigError::InvalidEpsilon(1.5))
        );
        assert!(CFRConfig::discounted(1.0, 0.5).validate().is_err());
        assert!(CFRConfig::discounted(0.5, 0.0).validate().is_err());
        assert!(CFRConfig::default()
            .with_parallel(Some(0))
            .validate()
            .is_err());
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let config = CFRConfig::from_json_str(r#"{"algorithm":"MultiplicativeWeights"}"#).unwrap();
        assert_eq!(config.algorithm, RegretAlgorithm::MultiplicativeWeights);
        assert_eq!(config.navigation, NavigationMode::CachedTree);

        let json = serde_json::to_string(&CFRConfig::discounted(0.5, 0.1)).unwrap();
        let back = CFRConfig::from_json_str(&json).unwrap();
        assert_eq!(
            back.discounting.map(|d| d.target_discount),
            Some(0.1)
        );
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            CFRConfig::from_json_str("{"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_stats_rate() {
        let mut stats = CFRStats::new();
        stats.iterations = 100;
        stats.elapsed_seconds = 2.0;
        stats.update_rate();
        assert_eq!(stats.iterations_per_second, 50.0);
        stats.record_exploitability(100, 0.5);
        assert_eq!(stats.exploitability, Some(0.5));
        assert_eq!(stats.exploitability_history.len(), 1);
    }
}
