//! # CFR Engine
//!
//! A generic Counterfactual Regret Minimization (CFR) engine for computing
//! Nash equilibrium strategies in extensive-form games.
//!
//! ## Features
//!
//! - **Generic Tree Walk**: Any algorithm implementing `TreeNodeProcessor`
//!   runs over any game implementing `GameDefinition`
//! - **Multiple Variants**: Regret matching, CFR+, hedge and discounted CFR
//! - **Thread-Safe Storage**: Lock-free numeric updates, rayon-parallel walks
//! - **Accelerated Best Response**: Exact exploitability without a recursive walk
//! - **Distributed Chance Decisions**: Collapse chance nodes whose outcome
//!   only matters through a distributor input
//! - **Checkpointing**: Save and resume solver state
//!
//! ## Quick Start
//!
//! ```
//! use cfr_engine::{CFRConfig, CFRSolver};
//! use cfr_engine::games::kuhn::KuhnPoker;
//!
//! let mut solver = CFRSolver::new(KuhnPoker::new(), CFRConfig::default()).unwrap();
//! solver.train(500).unwrap();
//! println!("exploitability {:.4}", solver.calculate_exploitability().unwrap());
//! ```
//!
//! ## Modules
//!
//! - [`cfr`]: Core CFR engine and solver
//! - [`games`]: Reference game definitions (Kuhn Poker, etc.)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      CFR Solver (Generic)                       │
//! │  - Regret update walk     - Per-stratum strategy updates        │
//! │  - Discounting            - Accelerated best response           │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               │ TreeWalk + TreeNodeProcessor
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │         Navigation  ──►  NodeStore (chance / info set / leaf)   │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               │ implements GameDefinition
//!                               ▼
//!         ┌─────────────────────┼─────────────────────┐
//!         │                     │                     │
//!         ▼                     ▼                     ▼
//!    ┌─────────┐         ┌───────────┐         ┌───────────┐
//!    │  Kuhn   │         │  Signals  │         │  Random   │
//!    │  Poker  │         │   Game    │         │   Trees   │
//!    └─────────┘         └───────────┘         └───────────┘
//! ```

#![warn(missing_docs)]

/// CFR (Counterfactual Regret Minimization) engine module.
///
/// This is the core module containing the domain-agnostic algorithms.
pub mod cfr;

/// Game implementations module.
///
/// Contains reference games for testing, benchmarks and the demo binary.
pub mod games;

// Re-export commonly used types at crate root for convenience
pub use cfr::{
    CFRConfig, CFRSolver, CFRStats, Decision, GameDefinition, SolverError, SolverResult,
    TreeNodeProcessor,
};
