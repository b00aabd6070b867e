//! CFR (Counterfactual Regret Minimization) Engine Module.
//!
//! This module provides a domain-agnostic implementation of the CFR algorithm
//! family for computing Nash equilibrium strategies in extensive-form games.
//!
//! # Overview
//!
//! The engine is split into three layers:
//! 1. **Game-state model** ([`nodes`]): chance nodes, information sets and
//!    leaves, created once each by the [`NodeStore`]
//! 2. **Tree walk** ([`tree_walk`]): a two-phase traversal parameterized by a
//!    [`TreeNodeProcessor`], over a tree materialized by [`navigation`]
//! 3. **Algorithms**: the per-iteration regret update, min/max bounds,
//!    distributed chance aggregation and best responses ([`processors`],
//!    [`accelerated`]), driven by the [`CFRSolver`]
//!
//! # Supported Variants
//!
//! - **Vanilla CFR**: Regret matching with full tree traversal
//! - **CFR+**: Floors negative regrets to zero for faster convergence
//! - **Hedge**: Multiplicative weights over normalized regret
//! - **Discounted CFR**: Target-based discounting of regrets and strategies
//!
//! # Usage
//!
//! 1. Implement the [`GameDefinition`] trait for your game
//! 2. Create a [`CFRSolver`] with your game and configuration
//! 3. Call `train()` to run iterations
//! 4. Extract strategies using `get_average_strategy()`
//!
//! # Example
//!
//! ```
//! use cfr_engine::cfr::{CFRConfig, CFRSolver};
//! use cfr_engine::games::kuhn::KuhnPoker;
//!
//! let mut solver = CFRSolver::new(KuhnPoker::new(), CFRConfig::default()).unwrap();
//! solver.train(1_000).unwrap();
//!
//! let (decision, key) = KuhnPoker::information_set(2, "");
//! let strategy = solver.get_average_strategy(decision, &key).unwrap();
//! assert_eq!(strategy.len(), 2);
//! ```
//!
//! # Theory
//!
//! **Regret**: The difference between the value of an action and the value of the current strategy.
//! ```text
//! Regret(a) = Value(a) - Value(current_strategy)
//! ```
//!
//! **Regret Matching**: Set strategy proportional to positive regrets.
//! ```text
//! Strategy(a) = max(0, Regret(a)) / sum(max(0, Regret(a')))
//! ```
//!
//! **Convergence**: Average regret decreases as O(1/sqrt(T)), and the average strategy
//! converges to Nash equilibrium.
//!
//! # References
//!
//! - Zinkevich, M., et al. "Regret Minimization in Games with Incomplete Information" (2007)
//! - Tammelin, O. "Solving Large Imperfect Information Games Using CFR+" (2014)
//! - Brown, N., Sandholm, T. "Solving Imperfect-Information Games via Discounted Regret Minimization" (2019)
//! - Johanson, M., et al. "Accelerating Best Response Calculation in Large Extensive Games" (2011)

pub mod accelerated;
pub mod atomic;
pub mod config;
pub mod discount;
pub mod error;
pub mod game;
pub mod navigation;
pub mod nodes;
pub mod processors;
pub mod solver;
pub mod tree_walk;

// Re-export main types for convenient access
pub use accelerated::{AcceleratedBestResponse, BestResponseSummary, PathFromPredecessor};
pub use config::{
    CFRConfig, CFRStats, ConfigError, DiscountingConfig, ExploitabilityPoint, NavigationMode,
    RegretAlgorithm,
};
pub use discount::DiscountSchedule;
pub use error::{SolverError, SolverResult};
pub use game::{Decision, GameDefinition, InformationSetKey, MAX_NUM_ACTIONS};
pub use navigation::{HistoryPoint, Navigation};
pub use nodes::{ChanceNode, Dimension, FinalUtilitiesNode, GameNode, InformationSetNode, NodeStore};
pub use solver::{CFRSolver, SolverState};
pub use tree_walk::{TreeNodeProcessor, TreeWalk, Visit};
