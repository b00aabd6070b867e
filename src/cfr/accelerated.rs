//! Accelerated best response.
//!
//! A one-time preparation walk records, for every history reaching an
//! information set, the path from its owner's previous information set: which
//! record it continues, which action was taken there, and the chance and
//! opponent steps in between. Terminal histories are recorded the same way
//! for every player. Measurements then never walk the tree again:
//!
//! 1. A forward pass over the strata, lowest decision first, computes the
//!    opponent reach and own reach of every record from its parent record.
//! 2. For each player, a backward pass over that player's strata, deepest
//!    first, chooses the best action at each node from the values pushed up
//!    by its successors and pushes its own best-response and
//!    average-strategy values to the parent record.
//! 3. A reachability pass marks the nodes play reaches when their owner
//!    follows the best response.
//!
//! Nodes within a stratum are independent, so each pass runs a stratum at a
//! time on the rayon pool.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cfr::atomic::AtomicF64;
use crate::cfr::error::{SolverError, SolverResult};
use crate::cfr::game::{GameDefinition, MAX_NUM_ACTIONS};
use crate::cfr::navigation::Navigation;
use crate::cfr::nodes::{
    ChanceNode, Dimension, FinalUtilitiesNode, GameNode, InformationSetNode, PredecessorLink,
};
use crate::cfr::tree_walk::{TreeNodeProcessor, TreeWalk, Visit};

/// The record a path continues: the owner's previous information set, the
/// action taken there and the index of the record in that node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    /// Id of the previous information set of the same player.
    pub node_id: usize,
    /// Action taken there.
    pub action: u8,
    /// Index into that node's records.
    pub record: usize,
}

/// Who chose an edge between two records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// A chance node.
    Chance,
    /// An information set of another player.
    Opponent,
}

/// One edge not chosen by the path's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep {
    /// Who chose the edge.
    pub kind: StepKind,
    /// Id of the chance node or information set.
    pub node_id: usize,
    /// Action taken.
    pub action: u8,
}

/// One history reaching an information set, described relative to its
/// owner's previous information set.
#[derive(Debug)]
pub struct PathFromPredecessor {
    anchor: Option<Anchor>,
    steps: Box<[PathStep]>,
    opponent_reach: AtomicF64,
    self_reach: AtomicF64,
    best_response_by_action: Box<[AtomicF64]>,
    average_by_action: Box<[AtomicF64]>,
}

impl PathFromPredecessor {
    fn new(anchor: Option<Anchor>, steps: &[PathStep], num_actions: u8) -> Self {
        let n = num_actions as usize;
        Self {
            anchor,
            steps: steps.into(),
            opponent_reach: AtomicF64::new(0.0),
            self_reach: AtomicF64::new(0.0),
            best_response_by_action: (0..n).map(|_| AtomicF64::new(0.0)).collect(),
            average_by_action: (0..n).map(|_| AtomicF64::new(0.0)).collect(),
        }
    }

    /// Previous record of the same player, `None` for the player's first
    /// decision.
    pub fn anchor(&self) -> Option<Anchor> {
        self.anchor
    }

    /// Chance and opponent steps since the anchor.
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Opponent reach computed by the last measurement.
    pub fn opponent_reach(&self) -> f64 {
        self.opponent_reach.load()
    }

    /// Own reach computed by the last measurement.
    pub fn self_reach(&self) -> f64 {
        self.self_reach.load()
    }

    fn clear_values(&self) {
        for v in self
            .best_response_by_action
            .iter()
            .chain(self.average_by_action.iter())
        {
            v.store(0.0);
        }
    }
}

/// A terminal history as seen by one player.
#[derive(Debug)]
struct TerminalPath {
    player: usize,
    anchor: Option<Anchor>,
    steps: Box<[PathStep]>,
    utility: f64,
}

/// Path under construction for one player during preparation.
#[derive(Debug, Clone, Default)]
struct ChainState {
    anchor: Option<Anchor>,
    current_record: Option<usize>,
    steps: Vec<PathStep>,
}

/// Preparation walk recording every path.
#[derive(Debug)]
struct PathRecorder {
    terminals: Mutex<Vec<TerminalPath>>,
}

impl PathRecorder {
    fn extend(&self, chains: &[ChainState], visit: &Visit<'_>) -> SolverResult<Vec<ChainState>> {
        let mut next = chains.to_vec();
        match visit.predecessor {
            Some(GameNode::Chance(c)) => {
                let step = PathStep {
                    kind: StepKind::Chance,
                    node_id: c.id(),
                    action: visit.predecessor_action,
                };
                next.iter_mut().for_each(|chain| chain.steps.push(step));
            }
            Some(GameNode::InformationSet(n)) => {
                let owner = n.player();
                for (player, chain) in next.iter_mut().enumerate() {
                    if player == owner {
                        let record = chain
                            .current_record
                            .ok_or(SolverError::MissingPredecessor { node_id: n.id() })?;
                        chain.anchor = Some(Anchor {
                            node_id: n.id(),
                            action: visit.predecessor_action,
                            record,
                        });
                        chain.current_record = None;
                        chain.steps.clear();
                    } else {
                        chain.steps.push(PathStep {
                            kind: StepKind::Opponent,
                            node_id: n.id(),
                            action: visit.predecessor_action,
                        });
                    }
                }
            }
            Some(GameNode::FinalUtilities(_)) | None => {}
        }
        Ok(next)
    }
}

impl TreeNodeProcessor for PathRecorder {
    type Forward = Vec<ChainState>;
    type Back = ();

    fn chance_forward(
        &self,
        _node: &ChanceNode,
        visit: &Visit<'_>,
        chains: &Vec<ChainState>,
    ) -> SolverResult<Vec<ChainState>> {
        self.extend(chains, visit)
    }

    fn information_set_forward(
        &self,
        node: &InformationSetNode,
        visit: &Visit<'_>,
        chains: &Vec<ChainState>,
    ) -> SolverResult<Vec<ChainState>> {
        let mut next = self.extend(chains, visit)?;
        let chain = next
            .get_mut(node.player())
            .ok_or(SolverError::UnknownNode { node_id: node.id() })?;
        node.record_predecessor(match chain.anchor {
            None => PredecessorLink::Root,
            Some(a) => PredecessorLink::InformationSet {
                node_id: a.node_id,
                action: a.action,
            },
        })?;
        let mut paths = node.paths.write().unwrap_or_else(PoisonError::into_inner);
        paths.push(PathFromPredecessor::new(
            chain.anchor,
            &chain.steps,
            node.num_actions(),
        ));
        chain.current_record = Some(paths.len() - 1);
        Ok(next)
    }

    fn final_utilities_turn_around(
        &self,
        node: &FinalUtilitiesNode,
        visit: &Visit<'_>,
        chains: &Vec<ChainState>,
    ) -> SolverResult<()> {
        let chains = self.extend(chains, visit)?;
        let mut terminals = self
            .terminals
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (player, chain) in chains.into_iter().enumerate() {
            terminals.push(TerminalPath {
                player,
                anchor: chain.anchor,
                steps: chain.steps.into_boxed_slice(),
                utility: node.utility(player),
            });
        }
        Ok(())
    }

    fn chance_backward(
        &self,
        _node: &ChanceNode,
        _visit: &Visit<'_>,
        _chains: &Vec<ChainState>,
        _children: Vec<()>,
    ) -> SolverResult<()> {
        Ok(())
    }

    fn information_set_backward(
        &self,
        _node: &InformationSetNode,
        _visit: &Visit<'_>,
        _chains: &Vec<ChainState>,
        _children: Vec<()>,
    ) -> SolverResult<()> {
        Ok(())
    }
}

/// Result of one best-response measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestResponseSummary {
    /// Value each player obtains by best-responding to the others' average
    /// strategies.
    pub best_response_values: Vec<f64>,
    /// Value each player obtains when everyone plays the average strategy.
    pub average_values: Vec<f64>,
}

impl BestResponseSummary {
    /// Gain `player` could obtain by deviating to the best response.
    pub fn exploitability(&self, player: usize) -> f64 {
        self.best_response_values[player] - self.average_values[player]
    }

    /// Sum of every player's exploitability.
    pub fn nash_conv(&self) -> f64 {
        (0..self.best_response_values.len())
            .map(|p| self.exploitability(p))
            .sum()
    }
}

/// Probability tables frozen for one measurement, indexed by node id.
struct ProbabilityTables {
    average: Vec<Box<[f64]>>,
    opponent: Vec<Box<[f64]>>,
    chance: Vec<Box<[f64]>>,
}

impl ProbabilityTables {
    fn step(&self, step: &PathStep) -> f64 {
        let i = step.action as usize - 1;
        match step.kind {
            StepKind::Chance => self.chance[step.node_id][i],
            StepKind::Opponent => self.opponent[step.node_id][i],
        }
    }

    fn path(&self, steps: &[PathStep]) -> f64 {
        steps.iter().map(|s| self.step(s)).product()
    }
}

/// Accumulators for the player's first decisions and for leaves reached
/// before the player acts.
#[derive(Debug, Default)]
struct RootValues {
    best_response: AtomicF64,
    average: AtomicF64,
}

/// Best response computed over recorded paths instead of tree walks.
#[derive(Debug)]
pub struct AcceleratedBestResponse {
    num_players: usize,
    information_sets: Vec<Arc<InformationSetNode>>,
    strata: Vec<Vec<Arc<InformationSetNode>>>,
    chance_nodes: Vec<Arc<ChanceNode>>,
    terminals: Vec<TerminalPath>,
    pruning_threshold: Option<f64>,
    parallel: bool,
}

impl AcceleratedBestResponse {
    /// Walk the tree once and record every path.
    pub fn prepare<G: GameDefinition>(navigation: &Navigation<G>) -> SolverResult<Self> {
        let start = Instant::now();
        for node in navigation.store().information_sets() {
            node.paths
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
        let num_players = navigation.num_players();
        let recorder = PathRecorder {
            terminals: Mutex::new(Vec::new()),
        };
        TreeWalk::new(navigation).walk(&recorder, vec![ChainState::default(); num_players])?;
        let terminals = recorder
            .terminals
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        let store = navigation.store();
        let information_sets = store.information_sets();
        let records: usize = information_sets
            .iter()
            .map(|n| n.paths.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum();
        debug!(
            "best response prepared in {:.3}s: {} records over {} information sets, {} terminal paths",
            start.elapsed().as_secs_f64(),
            records,
            information_sets.len(),
            terminals.len()
        );
        let config = store.config();
        Ok(Self {
            num_players,
            information_sets,
            strata: store.strata(),
            chance_nodes: store.chance_nodes(),
            terminals,
            pruning_threshold: config.best_response_pruning_threshold,
            parallel: config.parallel,
        })
    }

    /// Override the pruning threshold taken from the configuration.
    pub fn with_pruning_threshold(mut self, threshold: Option<f64>) -> Self {
        self.pruning_threshold = threshold;
        self
    }

    /// Total opponent reach of `node` at the last measurement.
    pub fn opponent_reach(&self, node: &InformationSetNode) -> f64 {
        node.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.opponent_reach())
            .sum()
    }

    /// Probability that `node`'s owner plays to it under the average
    /// strategy, at the last measurement.
    pub fn self_reach(&self, node: &InformationSetNode) -> f64 {
        node.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .first()
            .map_or(0.0, |r| r.self_reach())
    }

    /// Best response of every player to the stored average strategies.
    ///
    /// Overwrites the best-response rows and actions of every node.
    pub fn measure(&self) -> SolverResult<BestResponseSummary> {
        let start = Instant::now();
        let tables = self.tables()?;
        self.forward(&tables)?;

        let mut best_response_values = Vec::with_capacity(self.num_players);
        let mut average_values = Vec::with_capacity(self.num_players);
        for player in 0..self.num_players {
            let root = self.backward(player, &tables)?;
            best_response_values.push(root.best_response.load());
            average_values.push(root.average.load());
        }
        self.mark_reachable()?;

        let summary = BestResponseSummary {
            best_response_values,
            average_values,
        };
        debug!(
            "accelerated best response in {:.3}s: nash conv {:.6}",
            start.elapsed().as_secs_f64(),
            summary.nash_conv()
        );
        Ok(summary)
    }

    fn for_each_node<F>(&self, nodes: &[Arc<InformationSetNode>], f: F) -> SolverResult<()>
    where
        F: Fn(&InformationSetNode) -> SolverResult<()> + Sync + Send,
    {
        if self.parallel {
            nodes.par_iter().try_for_each(|n| f(n))
        } else {
            nodes.iter().try_for_each(|n| f(n))
        }
    }

    fn tables(&self) -> SolverResult<ProbabilityTables> {
        let mut average = Vec::with_capacity(self.information_sets.len());
        let mut opponent = Vec::with_capacity(self.information_sets.len());
        for node in &self.information_sets {
            let n = node.num_actions() as usize;
            let mut buf = [0.0; MAX_NUM_ACTIONS];
            let probs = &mut buf[..n];
            node.distribution_into(Dimension::AverageStrategyProbability, probs)?;
            let mut pruned = probs.to_vec();
            if let Some(threshold) = self.pruning_threshold {
                let kept = probs.iter().filter(|p| **p >= threshold).count();
                for action in 1..=node.num_actions() {
                    let prune = kept > 0 && probs[action as usize - 1] < threshold;
                    node.set_prunable(action, prune);
                    if prune {
                        pruned[action as usize - 1] = 0.0;
                    }
                }
            }
            average.push(probs.to_vec().into_boxed_slice());
            opponent.push(pruned.into_boxed_slice());
        }
        let chance: Vec<Box<[f64]>> = self
            .chance_nodes
            .iter()
            .map(|c| {
                (1..=c.num_actions())
                    .map(|a| c.branch_probability(a))
                    .collect::<Box<[f64]>>()
            })
            .collect();
        Ok(ProbabilityTables {
            average,
            opponent,
            chance,
        })
    }

    fn node(&self, node_id: usize) -> SolverResult<&Arc<InformationSetNode>> {
        self.information_sets
            .get(node_id)
            .ok_or(SolverError::UnknownNode { node_id })
    }

    fn forward(&self, tables: &ProbabilityTables) -> SolverResult<()> {
        for stratum in &self.strata {
            self.for_each_node(stratum, |node| {
                let paths = node.paths.read().unwrap_or_else(PoisonError::into_inner);
                for record in paths.iter() {
                    let steps = tables.path(&record.steps);
                    let (opponent, own) = match record.anchor {
                        None => (1.0, 1.0),
                        Some(anchor) => {
                            let parent = self.node(anchor.node_id)?;
                            let parent_paths =
                                parent.paths.read().unwrap_or_else(PoisonError::into_inner);
                            let parent_record = parent_paths
                                .get(anchor.record)
                                .ok_or(SolverError::MissingPredecessor { node_id: node.id() })?;
                            (
                                parent_record.opponent_reach(),
                                parent_record.self_reach()
                                    * tables.average[anchor.node_id][anchor.action as usize - 1],
                            )
                        }
                    };
                    record.opponent_reach.store(opponent * steps);
                    record.self_reach.store(own);
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Add `best_response` and `average`, reached through `steps`, to the
    /// record `anchor` points at or to the root.
    fn push_up(
        &self,
        tables: &ProbabilityTables,
        anchor: Option<Anchor>,
        steps: &[PathStep],
        best_response: f64,
        average: f64,
        root: &RootValues,
    ) -> SolverResult<()> {
        let weight = tables.path(steps);
        if weight == 0.0 {
            return Ok(());
        }
        match anchor {
            None => {
                root.best_response.fetch_add(weight * best_response);
                root.average.fetch_add(weight * average);
            }
            Some(anchor) => {
                let parent = self.node(anchor.node_id)?;
                let paths = parent.paths.read().unwrap_or_else(PoisonError::into_inner);
                let record = paths.get(anchor.record).ok_or(SolverError::MissingPredecessor {
                    node_id: anchor.node_id,
                })?;
                let i = anchor.action as usize - 1;
                record.best_response_by_action[i].fetch_add(weight * best_response);
                record.average_by_action[i].fetch_add(weight * average);
            }
        }
        Ok(())
    }

    fn backward(&self, player: usize, tables: &ProbabilityTables) -> SolverResult<RootValues> {
        for node in self.information_sets.iter().filter(|n| n.player() == player) {
            node.reset_best_response();
            for record in node
                .paths
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
            {
                record.clear_values();
            }
        }

        let root = RootValues::default();
        for terminal in self.terminals.iter().filter(|t| t.player == player) {
            let u = terminal.utility;
            self.push_up(tables, terminal.anchor, &terminal.steps, u, u, &root)?;
        }

        for stratum in self.strata.iter().rev() {
            let owned: Vec<_> = stratum
                .iter()
                .filter(|n| n.player() == player)
                .cloned()
                .collect();
            self.for_each_node(&owned, |node| {
                let paths = node.paths.read().unwrap_or_else(PoisonError::into_inner);
                for record in paths.iter() {
                    let reach = record.opponent_reach();
                    if reach == 0.0 {
                        continue;
                    }
                    for (i, v) in record.best_response_by_action.iter().enumerate() {
                        node.accumulate_best_response(i as u8 + 1, reach, v.load());
                    }
                }
                let best = node.determine_best_response_action() as usize;
                let average = &tables.average[node.id()];
                for record in paths.iter() {
                    let best_response = record.best_response_by_action[best - 1].load();
                    let expected: f64 = record
                        .average_by_action
                        .iter()
                        .zip(average.iter())
                        .map(|(v, p)| v.load() * p)
                        .sum();
                    self.push_up(
                        tables,
                        record.anchor,
                        &record.steps,
                        best_response,
                        expected,
                        &root,
                    )?;
                }
                Ok(())
            })?;
        }
        Ok(root)
    }

    fn mark_reachable(&self) -> SolverResult<()> {
        for stratum in &self.strata {
            self.for_each_node(stratum, |node| {
                let reachable = match node.predecessor()? {
                    PredecessorLink::Root => true,
                    PredecessorLink::InformationSet { node_id, action } => {
                        let parent = self.node(node_id)?;
                        parent.reachable_under_best_response()
                            && parent.best_response_action() == action
                    }
                };
                node.set_reachable_under_best_response(reachable);
                Ok(())
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfr::config::CFRConfig;
    use crate::cfr::nodes::NodeStore;
    use crate::cfr::processors::{
        BruteForceBestResponse, MinMaxProcessor, StrategySource, UtilityCalculator,
    };
    use crate::games::kuhn::KuhnPoker;
    use crate::games::random_tree::RandomTreeGame;
    use crate::games::signals::SignalsGame;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rstest::rstest;

    /// Give every information set a random average strategy.
    fn randomize<G: GameDefinition>(navigation: &Navigation<G>, seed: u64) {
        TreeWalk::new(navigation).walk(&MinMaxProcessor::new(), ()).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        for node in navigation.store().information_sets() {
            for action in 1..=node.num_actions() {
                node.set(Dimension::CumulativeStrategy, action, rng.gen_range(0.0..1.0));
            }
            node.calculate_average_strategy(0.0);
        }
    }

    fn compare<G: GameDefinition>(navigation: &Navigation<G>) {
        let engine = AcceleratedBestResponse::prepare(navigation).unwrap();
        let summary = engine.measure().unwrap();

        let brute = BruteForceBestResponse::new();
        let average = TreeWalk::new(navigation)
            .walk(&UtilityCalculator::new(StrategySource::Average), 1.0)
            .unwrap();
        for player in 0..navigation.num_players() {
            let br = brute.best_response_value(navigation, player).unwrap();
            assert!(
                (summary.best_response_values[player] - br).abs() < 1e-9,
                "player {}: {} vs {}",
                player,
                summary.best_response_values[player],
                br
            );
            assert!((summary.average_values[player] - average[player]).abs() < 1e-9);
        }
        let exploitability = brute.exploitability(navigation).unwrap();
        assert!((summary.nash_conv() - exploitability).abs() < 1e-9);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(7)]
    #[case(17)]
    #[case(42)]
    fn test_matches_brute_force_on_random_trees(#[case] seed: u64) {
        let nav = Navigation::new(RandomTreeGame::new(seed), NodeStore::new(&CFRConfig::default()));
        randomize(&nav, seed + 100);
        compare(&nav);
    }

    #[test]
    fn test_matches_brute_force_on_kuhn() {
        let nav = Navigation::new(KuhnPoker::new(), NodeStore::new(&CFRConfig::default()));
        randomize(&nav, 5);
        compare(&nav);
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_matches_brute_force_with_distributed_chance(#[case] distribute: bool) {
        let config = CFRConfig::default().with_distributed_chance(distribute);
        let nav = Navigation::new(SignalsGame::new(), NodeStore::new(&config));
        randomize(&nav, 11);
        compare(&nav);
    }

    #[test]
    fn test_parallel_measurement_agrees() {
        let config = CFRConfig::default().with_parallel(None);
        let nav = Navigation::new(RandomTreeGame::new(9), NodeStore::new(&config));
        randomize(&nav, 9);
        let parallel = AcceleratedBestResponse::prepare(&nav).unwrap().measure().unwrap();
        let brute = BruteForceBestResponse::new();
        for player in 0..2 {
            let br = brute.best_response_value(&nav, player).unwrap();
            assert!((parallel.best_response_values[player] - br).abs() < 1e-9);
        }
    }

    #[test]
    fn test_reach_probabilities_under_uniform_kuhn() {
        let nav = Navigation::new(KuhnPoker::new(), NodeStore::new(&CFRConfig::default()));
        let engine = AcceleratedBestResponse::prepare(&nav).unwrap();
        engine.measure().unwrap();

        let first = nav.store().find_information_set(2, &b"0:".to_vec()).unwrap();
        assert!((engine.opponent_reach(&first) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(engine.self_reach(&first), 1.0);
        assert_eq!(first.predecessor().unwrap(), PredecessorLink::Root);

        let second = nav.store().find_information_set(4, &b"0:pb".to_vec()).unwrap();
        assert!((engine.opponent_reach(&second) - 1.0 / 6.0).abs() < 1e-12);
        assert!((engine.self_reach(&second) - 0.5).abs() < 1e-12);
        assert_eq!(
            second.predecessor().unwrap(),
            PredecessorLink::InformationSet {
                node_id: first.id(),
                action: 1
            }
        );
    }

    #[test]
    fn test_reachability_follows_best_response_actions() {
        let nav = Navigation::new(KuhnPoker::new(), NodeStore::new(&CFRConfig::default()));
        let engine = AcceleratedBestResponse::prepare(&nav).unwrap();
        engine.measure().unwrap();
        for node in nav.store().information_sets() {
            let expected = match node.predecessor().unwrap() {
                PredecessorLink::Root => true,
                PredecessorLink::InformationSet { node_id, action } => {
                    let parent = nav.store().information_set_by_id(node_id).unwrap();
                    parent.reachable_under_best_response() && parent.best_response_action() == action
                }
            };
            assert_eq!(node.reachable_under_best_response(), expected);
        }
        // The king bets against uniform play, so it never reaches "pb".
        let king = nav.store().find_information_set(2, &b"2:".to_vec()).unwrap();
        assert_eq!(king.best_response_action(), 2);
        let king_again = nav.store().find_information_set(4, &b"2:pb".to_vec()).unwrap();
        assert!(!king_again.reachable_under_best_response());
    }

    #[test]
    fn test_unreached_node_fails_fast() {
        let nav = Navigation::new(KuhnPoker::new(), NodeStore::new(&CFRConfig::default()));
        let stray = nav.store().information_set(2, 0, 2, b"9:".to_vec());
        let engine = AcceleratedBestResponse::prepare(&nav).unwrap();
        let err = engine.measure().unwrap_err();
        assert_eq!(err, SolverError::MissingPredecessor { node_id: stray.id() });
    }

    #[test]
    fn test_pruning_marks_negligible_actions() {
        let nav = Navigation::new(KuhnPoker::new(), NodeStore::new(&CFRConfig::default()));
        let engine = AcceleratedBestResponse::prepare(&nav)
            .unwrap()
            .with_pruning_threshold(Some(1e-3));
        let queen = nav.store().find_information_set(2, &b"1:".to_vec()).unwrap();
        queen.set(Dimension::CumulativeStrategy, 1, 1.0);
        queen.set(Dimension::CumulativeStrategy, 2, 1e-6);
        for node in nav.store().information_sets() {
            node.calculate_average_strategy(0.0);
        }
        let summary = engine.measure().unwrap();
        assert!(queen.is_prunable(2));
        assert!(!queen.is_prunable(1));
        assert!(summary.nash_conv().is_finite());
    }
}
