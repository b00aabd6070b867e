//! Cursors over the implicit game tree.
//!
//! A [`HistoryPoint`] identifies a position by the actions taken from the
//! root. [`Navigation`] turns a point into its node and branches it into
//! child points, creating store entries the first time a position is seen.
//! How that happens depends on [`NavigationMode`]:
//!
//! - `GamePlayer` replays the game definition at every step.
//! - `CachedHistory` looks positions up by action path; a miss replays the
//!   game from the root once.
//! - `CachedTree` keeps a lazily built tree of cursors. Each child slot is a
//!   `OnceLock`, so reads never lock; creating a child takes the parent's
//!   creation lock.
//! - `Verified` steps the game forward like `GamePlayer` and resolves every
//!   position a second time through the history cache, whose misses replay
//!   the game from the root. The two must agree exactly, down to leaf
//!   payoffs; any difference means the game is not deterministic or its
//!   information set keys fail to separate distinct positions.
//!
//! Decision indices must strictly increase along every path; branching into
//! a decision that does not is an error.
//!
//! With chance distribution enabled, distributed chance decisions are pinned:
//! only action 1 is descended and the game is told action 1 was taken. A
//! leaf below pinned decisions keeps one payoff row per combination of their
//! outcomes, found by substituting each outcome for the pinned action, and
//! weights the rows by the per-key distributions on the pinned nodes.

use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use log::debug;
use rustc_hash::FxHashMap;

use crate::cfr::config::NavigationMode;
use crate::cfr::error::{SolverError, SolverResult};
use crate::cfr::game::{Decision, GameDefinition};
use crate::cfr::nodes::chance::check_distribution;
use crate::cfr::nodes::{ChanceProbabilities, GameNode, NodeStore, PinnedSite};

/// A resolved position: its node, and for a pinned chance node the true
/// distribution at this position.
#[derive(Debug, Clone)]
struct Position {
    node: GameNode,
    true_probabilities: Option<Arc<[f64]>>,
}

#[derive(Debug)]
struct TreeCursor<P> {
    position: Position,
    progress: P,
    children: Box<[OnceLock<Arc<TreeCursor<P>>>]>,
    creation: Mutex<()>,
}

impl<P> TreeCursor<P> {
    fn new(position: Position, progress: P) -> Self {
        let n = position.node.num_actions() as usize;
        Self {
            position,
            progress,
            children: (0..n).map(|_| OnceLock::new()).collect(),
            creation: Mutex::new(()),
        }
    }
}

#[derive(Debug, Clone)]
enum Backing<P> {
    Progress(P),
    History,
    Tree(Arc<TreeCursor<P>>),
}

/// A pinned chance node on a path and the depth it sits at.
#[derive(Debug, Clone)]
struct PinnedVisit {
    depth: usize,
    site: PinnedSite,
}

/// A position in the game tree.
#[derive(Debug, Clone)]
pub struct HistoryPoint<P> {
    path: Vec<u8>,
    distributor_key: u32,
    pinned: Vec<PinnedVisit>,
    position: Position,
    backing: Backing<P>,
}

impl<P> HistoryPoint<P> {
    /// Node at this position.
    pub fn node(&self) -> &GameNode {
        &self.position.node
    }

    /// Actions (1-based) taken from the root.
    pub fn path(&self) -> &[u8] {
        &self.path
    }

    /// Sum of action times multiplier over every distributor-input decision
    /// on the path.
    pub fn distributor_key(&self) -> u32 {
        self.distributor_key
    }

    /// True distribution of a pinned chance node at this position.
    pub fn true_probabilities(&self) -> Option<&[f64]> {
        self.position.true_probabilities.as_deref()
    }

    /// Whether a pinned chance decision lies on the path.
    pub fn below_pinned_decision(&self) -> bool {
        !self.pinned.is_empty()
    }
}

/// Materializes and caches the game tree for one game definition.
#[derive(Debug)]
pub struct Navigation<G: GameDefinition> {
    game: G,
    mode: NavigationMode,
    distribute: bool,
    store: NodeStore,
    history: RwLock<FxHashMap<Vec<u8>, Position>>,
    tree_root: OnceLock<Arc<TreeCursor<G::Progress>>>,
}

impl<G: GameDefinition> Navigation<G> {
    /// Navigate `game`, creating nodes in `store`.
    pub fn new(game: G, store: NodeStore) -> Self {
        let mode = store.config().navigation;
        let distribute = store.config().distribute_chance_decisions;
        Self {
            game,
            mode,
            distribute,
            store,
            history: RwLock::new(FxHashMap::default()),
            tree_root: OnceLock::new(),
        }
    }

    /// The game definition.
    pub fn game(&self) -> &G {
        &self.game
    }

    /// The node store.
    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// Backing strategy in use.
    pub fn mode(&self) -> NavigationMode {
        self.mode
    }

    /// Whether distributed chance decisions are pinned.
    pub fn distributes_chance(&self) -> bool {
        self.distribute
    }

    /// Number of non-chance players.
    pub fn num_players(&self) -> usize {
        self.game.num_players()
    }

    /// Decision at `decision_index`.
    pub fn decision(&self, decision_index: usize) -> SolverResult<&Decision> {
        self.game
            .decisions()
            .get(decision_index)
            .ok_or_else(|| SolverError::NavigationMismatch {
                path: Vec::new(),
                detail: format!("game named unknown decision {}", decision_index),
            })
    }

    /// Number of positions in the history cache.
    pub fn cached_histories(&self) -> usize {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The root position.
    pub fn root(&self) -> SolverResult<HistoryPoint<G::Progress>> {
        let progress = self.game.initial_progress();
        let (position, backing) = match self.mode {
            NavigationMode::GamePlayer => {
                let (position, _) = self.resolve(&progress, &[], &[], 0)?;
                (position, Backing::Progress(progress))
            }
            NavigationMode::Verified => {
                let (position, fresh) = self.resolve(&progress, &[], &[], 0)?;
                self.verify(&[], &[], 0, &position, fresh.as_deref())?;
                (position, Backing::Progress(progress))
            }
            NavigationMode::CachedHistory => {
                (self.cached_history(&[], &[], 0)?.0, Backing::History)
            }
            NavigationMode::CachedTree => {
                let cursor = match self.tree_root.get() {
                    Some(cursor) => Arc::clone(cursor),
                    None => {
                        let (position, _) = self.resolve(&progress, &[], &[], 0)?;
                        let cursor = Arc::new(TreeCursor::new(position, progress));
                        let _ = self.tree_root.set(Arc::clone(&cursor));
                        self.tree_root.get().cloned().unwrap_or(cursor)
                    }
                };
                (cursor.position.clone(), Backing::Tree(cursor))
            }
        };
        Ok(HistoryPoint {
            path: Vec::new(),
            distributor_key: 0,
            pinned: Vec::new(),
            position,
            backing,
        })
    }

    /// The position reached by taking `action` at `point`.
    pub fn branch(
        &self,
        point: &HistoryPoint<G::Progress>,
        action: u8,
    ) -> SolverResult<HistoryPoint<G::Progress>> {
        let (decision_index, pinned_here) = match point.node() {
            GameNode::FinalUtilities(_) => {
                return Err(SolverError::NavigationMismatch {
                    path: point.path.clone(),
                    detail: "cannot branch from a leaf".to_string(),
                })
            }
            GameNode::Chance(c) => (c.decision_index(), c.is_pinned().then(|| Arc::clone(c))),
            GameNode::InformationSet(n) => (n.decision_index(), None),
        };
        let num_actions = point.node().num_actions();
        if action == 0 || action > num_actions {
            return Err(SolverError::NavigationMismatch {
                path: point.path.clone(),
                detail: format!("action {} out of range 1..={}", action, num_actions),
            });
        }

        let decision = self.decision(decision_index)?;
        let mut path = Vec::with_capacity(point.path.len() + 1);
        path.extend_from_slice(&point.path);
        path.push(action);
        let distributor_key = point.distributor_key
            + decision
                .distributor_chance_input_multiplier
                .map_or(0, |m| m * action as u32);
        let mut pinned = point.pinned.clone();
        if let Some(node) = pinned_here {
            pinned.push(PinnedVisit {
                depth: point.path.len(),
                site: PinnedSite {
                    node,
                    distributor_key: point.distributor_key,
                },
            });
        }

        let (position, backing) = match &point.backing {
            Backing::Progress(progress) => {
                let next = self.game.apply_action(progress, decision_index, action);
                let (position, fresh) = self.resolve(&next, &path, &pinned, distributor_key)?;
                if self.mode == NavigationMode::Verified {
                    self.verify(&path, &pinned, distributor_key, &position, fresh.as_deref())?;
                }
                (position, Backing::Progress(next))
            }
            Backing::History => (
                self.cached_history(&path, &pinned, distributor_key)?.0,
                Backing::History,
            ),
            Backing::Tree(cursor) => {
                let child = self.tree_child(
                    cursor,
                    decision_index,
                    action,
                    &path,
                    &pinned,
                    distributor_key,
                )?;
                (child.position.clone(), Backing::Tree(child))
            }
        };

        if let Some(next_decision) = position.node.decision_index() {
            if next_decision <= decision_index {
                return Err(SolverError::NavigationMismatch {
                    path,
                    detail: format!(
                        "decision {} follows decision {}; indices must increase along a path",
                        next_decision, decision_index
                    ),
                });
            }
        }

        Ok(HistoryPoint {
            path,
            distributor_key,
            pinned,
            position,
            backing,
        })
    }

    /// Position reached by following `path` from the root.
    pub fn follow(&self, path: &[u8]) -> SolverResult<HistoryPoint<G::Progress>> {
        let mut point = self.root()?;
        for &action in path {
            point = self.branch(&point, action)?;
        }
        Ok(point)
    }

    fn tree_child(
        &self,
        cursor: &TreeCursor<G::Progress>,
        decision_index: usize,
        action: u8,
        path: &[u8],
        pinned: &[PinnedVisit],
        distributor_key: u32,
    ) -> SolverResult<Arc<TreeCursor<G::Progress>>> {
        let slot = &cursor.children[action as usize - 1];
        if let Some(child) = slot.get() {
            return Ok(Arc::clone(child));
        }
        let _guard = cursor
            .creation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(child) = slot.get() {
            return Ok(Arc::clone(child));
        }
        let progress = self
            .game
            .apply_action(&cursor.progress, decision_index, action);
        let (position, _) = self.resolve(&progress, path, pinned, distributor_key)?;
        let child = Arc::new(TreeCursor::new(position, progress));
        let _ = slot.set(Arc::clone(&child));
        Ok(child)
    }

    /// Position at `path` from the history cache. On a miss the game is
    /// replayed from the root, and the leaf payoffs that replay computed are
    /// returned alongside.
    fn cached_history(
        &self,
        path: &[u8],
        pinned: &[PinnedVisit],
        distributor_key: u32,
    ) -> SolverResult<(Position, Option<Vec<f64>>)> {
        if let Some(position) = self
            .history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            return Ok((position.clone(), None));
        }
        let progress = self.replay(path)?;
        let (position, replayed) = self.resolve(&progress, path, pinned, distributor_key)?;
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        let position = history
            .entry(path.to_vec())
            .or_insert(position)
            .clone();
        Ok((position, replayed))
    }

    fn replay(&self, path: &[u8]) -> SolverResult<G::Progress> {
        let mut progress = self.game.initial_progress();
        for (depth, &action) in path.iter().enumerate() {
            let decision_index =
                self.game
                    .next_decision(&progress)
                    .ok_or_else(|| SolverError::NavigationMismatch {
                        path: path.to_vec(),
                        detail: format!("game ended after {} actions", depth),
                    })?;
            progress = self.game.apply_action(&progress, decision_index, action);
        }
        Ok(progress)
    }

    /// Resolve the node at `progress`. For a new leaf, or any leaf in
    /// `Verified` mode, also returns the payoff rows just computed, which
    /// may differ from a leaf created earlier.
    ///
    /// A distributed decision that is not pinned has the distributor key
    /// appended to its chance key, since its true distribution depends on it.
    fn resolve(
        &self,
        progress: &G::Progress,
        path: &[u8],
        pinned: &[PinnedVisit],
        distributor_key: u32,
    ) -> SolverResult<(Position, Option<Vec<f64>>)> {
        let decision_index = match self.game.next_decision(progress) {
            Some(d) => d,
            None => {
                let existing = match self.mode {
                    NavigationMode::Verified => None,
                    _ => self.store.find_leaf(path),
                };
                let (leaf, rows) = match existing {
                    Some(leaf) => (leaf, None),
                    None if pinned.is_empty() => {
                        let utilities = self.game.utilities(progress);
                        self.check_utilities(path, &utilities)?;
                        (self.store.leaf(path, utilities.clone())?, Some(utilities))
                    }
                    None => {
                        let rows = self.pinned_outcome_rows(path, pinned)?;
                        let sites = pinned.iter().map(|v| v.site.clone()).collect();
                        let leaf = self.store.pinned_leaf(
                            path,
                            self.game.num_players(),
                            sites,
                            rows.clone(),
                        )?;
                        (leaf, Some(rows))
                    }
                };
                let position = Position {
                    node: GameNode::FinalUtilities(leaf),
                    true_probabilities: None,
                };
                return Ok((position, rows));
            }
        };

        let decision = self.decision(decision_index)?;
        let key = self.game.information_set_key(progress, decision_index);
        let num_actions = decision.num_actions;
        if !decision.is_chance {
            let node = self
                .store
                .information_set(decision_index, decision.player, num_actions, key);
            return Ok((
                Position {
                    node: GameNode::InformationSet(node),
                    true_probabilities: None,
                },
                None,
            ));
        }

        let probabilities = self.game.chance_probabilities(progress, decision_index);
        if self.distribute && decision.distributed {
            let truth = match probabilities {
                Some(p) => {
                    check_distribution(decision_index, num_actions, &p)?;
                    p
                }
                None => vec![1.0 / num_actions as f64; num_actions as usize],
            };
            let node = self
                .store
                .chance_node(decision_index, num_actions, true, key, None)?;
            return Ok((
                Position {
                    node: GameNode::Chance(node),
                    true_probabilities: Some(truth.into()),
                },
                None,
            ));
        }

        let mut key = key;
        if decision.distributed {
            key.extend_from_slice(&distributor_key.to_le_bytes());
        }
        let node = self.store.chance_node(
            decision_index,
            num_actions,
            false,
            key,
            probabilities.clone(),
        )?;
        let agrees = match (node.distribution(), &probabilities) {
            (ChanceProbabilities::Uniform, None) => true,
            (ChanceProbabilities::Explicit(stored), Some(fresh)) => bits_equal(stored, fresh),
            _ => false,
        };
        if !agrees {
            return Err(SolverError::NavigationMismatch {
                path: path.to_vec(),
                detail: format!(
                    "chance node {} is shared by positions with different probabilities",
                    node.id()
                ),
            });
        }
        Ok((
            Position {
                node: GameNode::Chance(node),
                true_probabilities: None,
            },
            None,
        ))
    }

    fn check_utilities(&self, path: &[u8], utilities: &[f64]) -> SolverResult<()> {
        if utilities.len() != self.game.num_players() {
            return Err(SolverError::NavigationMismatch {
                path: path.to_vec(),
                detail: format!(
                    "game supplied {} utilities for {} players",
                    utilities.len(),
                    self.game.num_players()
                ),
            });
        }
        Ok(())
    }

    /// Compare a position reached by stepping the game forward with the one
    /// the history cache holds for the same path.
    fn verify(
        &self,
        path: &[u8],
        pinned: &[PinnedVisit],
        distributor_key: u32,
        fresh: &Position,
        fresh_utilities: Option<&[f64]>,
    ) -> SolverResult<()> {
        let (cached, replayed) = self.cached_history(path, pinned, distributor_key)?;
        let mismatch = |detail: String| SolverError::NavigationMismatch {
            path: path.to_vec(),
            detail,
        };
        if let (Some(replayed), Some(utilities)) = (&replayed, fresh_utilities) {
            if !bits_equal(replayed, utilities) {
                return Err(mismatch(format!(
                    "payoffs {:?} differ from {:?} found by replaying from the root",
                    utilities, replayed
                )));
            }
        }
        if !cached.node.same_node(&fresh.node) {
            return Err(mismatch(format!(
                "stepping the game reached {} but the history cache holds {}",
                fresh.node.describe(),
                cached.node.describe()
            )));
        }
        if let (GameNode::FinalUtilities(leaf), Some(utilities)) = (&cached.node, fresh_utilities) {
            if !bits_equal(leaf.raw_utilities(), utilities) {
                return Err(mismatch(format!(
                    "payoffs {:?} differ from cached {:?}",
                    utilities,
                    leaf.raw_utilities()
                )));
            }
        }
        match (&cached.true_probabilities, &fresh.true_probabilities) {
            (Some(a), Some(b)) if bits_equal(a, b) => {}
            (None, None) => {}
            _ => {
                return Err(mismatch(
                    "true chance probabilities differ from cached".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Payoff rows for the leaf ending `path`, one per combination of the
    /// pinned decisions' outcomes with the last varying fastest. Each row
    /// follows `path` with the pinned actions replaced by that combination.
    fn pinned_outcome_rows(&self, path: &[u8], pinned: &[PinnedVisit]) -> SolverResult<Vec<f64>> {
        let mut rows = Vec::new();
        self.collect_outcome_rows(self.game.initial_progress(), path, 0, pinned, &mut rows)?;
        Ok(rows)
    }

    fn collect_outcome_rows(
        &self,
        progress: G::Progress,
        path: &[u8],
        depth: usize,
        pinned: &[PinnedVisit],
        rows: &mut Vec<f64>,
    ) -> SolverResult<()> {
        let next = self.game.next_decision(&progress);
        if depth == path.len() {
            if next.is_some() {
                return Err(SolverError::NavigationMismatch {
                    path: path.to_vec(),
                    detail: "a distributed outcome changed the length of play".to_string(),
                });
            }
            let utilities = self.game.utilities(&progress);
            self.check_utilities(path, &utilities)?;
            rows.extend(utilities);
            return Ok(());
        }
        let decision_index = next.ok_or_else(|| SolverError::NavigationMismatch {
            path: path.to_vec(),
            detail: "a distributed outcome ended play early".to_string(),
        })?;
        match pinned.split_first() {
            Some((visit, rest)) if visit.depth == depth => {
                for action in 1..=visit.site.node.num_actions() {
                    let child = self.game.apply_action(&progress, decision_index, action);
                    self.collect_outcome_rows(child, path, depth + 1, rest, rows)?;
                }
                Ok(())
            }
            _ => {
                let child = self.game.apply_action(&progress, decision_index, path[depth]);
                self.collect_outcome_rows(child, path, depth + 1, pinned, rows)
            }
        }
    }

    /// Log cache sizes.
    pub fn log_cache_sizes(&self) {
        debug!(
            "navigation ({:?}): {} information sets, {} chance nodes, {} leaves, {} cached histories",
            self.mode,
            self.store.num_information_sets(),
            self.store.num_chance_nodes(),
            self.store.num_leaves(),
            self.cached_histories()
        );
    }
}

fn bits_equal(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}
