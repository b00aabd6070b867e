//! Game implementations for the CFR engine.
//!
//! These games serve as:
//!
//! 1. **Validation**: Games with known Nash equilibria (like Kuhn Poker) verify
//!    that the CFR implementation is correct.
//!
//! 2. **Examples**: Demonstrate how to implement the `GameDefinition` trait.
//!
//! 3. **Benchmarks**: Provide standardized games for performance testing.
//!
//! ## Available Games
//!
//! - [`kuhn`]: Kuhn Poker - A simplified 3-card poker game with known Nash equilibrium
//! - [`signals`]: A bargaining game with a distributed chance decision
//! - [`random_tree`]: Seeded synthetic games for property tests
//!
//! ## Adding New Games
//!
//! 1. Create a new module under `src/games/`
//! 2. Define the decisions and a progress type
//! 3. Implement the `GameDefinition` trait
//! 4. Add tests that verify expected behavior
//!
//! See the [`kuhn`] module for a complete example.

pub mod kuhn;
pub mod random_tree;
pub mod signals;
