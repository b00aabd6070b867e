//! Node storage.
//!
//! Every node the tree walks reach is created here, exactly once per
//! `(decision, key)` for information sets and chance nodes and once per
//! action path for leaves. Maps sit behind `RwLock`s: lookups take the read
//! lock, and only a miss takes the write lock (re-checking before inserting).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cfr::config::CFRConfig;
use crate::cfr::error::{SolverError, SolverResult};
use crate::cfr::game::InformationSetKey;
use crate::cfr::nodes::chance::ChanceNode;
use crate::cfr::nodes::final_utilities::{FinalUtilitiesNode, PinnedSite};
use crate::cfr::nodes::information_set::{InformationSetNode, NodeBackup};

type NodeKey = (usize, InformationSetKey);

/// Snapshot of every information set's numeric block.
#[derive(Debug, Clone, Default)]
pub struct StoreBackup {
    nodes: Vec<NodeBackup>,
}

impl StoreBackup {
    /// Number of nodes captured.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no nodes were captured.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Serializable export format for the strategy store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreExport {
    /// One entry per information set, in id order.
    pub information_sets: Vec<NodeBackup>,
}

/// Owner of every node in the game tree.
#[derive(Debug)]
pub struct NodeStore {
    config: CFRConfig,
    information_sets: RwLock<FxHashMap<NodeKey, Arc<InformationSetNode>>>,
    information_sets_by_id: RwLock<Vec<Arc<InformationSetNode>>>,
    chance_nodes: RwLock<FxHashMap<NodeKey, Arc<ChanceNode>>>,
    chance_nodes_by_id: RwLock<Vec<Arc<ChanceNode>>>,
    leaves: RwLock<FxHashMap<Vec<u8>, Arc<FinalUtilitiesNode>>>,
    next_leaf_id: AtomicUsize,
}

impl NodeStore {
    /// Create an empty store. New information sets are initialized from
    /// `config`.
    pub fn new(config: &CFRConfig) -> Self {
        Self {
            config: config.clone(),
            information_sets: RwLock::new(FxHashMap::default()),
            information_sets_by_id: RwLock::new(Vec::new()),
            chance_nodes: RwLock::new(FxHashMap::default()),
            chance_nodes_by_id: RwLock::new(Vec::new()),
            leaves: RwLock::new(FxHashMap::default()),
            next_leaf_id: AtomicUsize::new(0),
        }
    }

    /// Configuration used for new nodes.
    pub fn config(&self) -> &CFRConfig {
        &self.config
    }

    /// The information set for `(decision_index, key)`, created on first use.
    pub fn information_set(
        &self,
        decision_index: usize,
        player: usize,
        num_actions: u8,
        key: InformationSetKey,
    ) -> Arc<InformationSetNode> {
        let map_key = (decision_index, key);
        if let Some(node) = self
            .information_sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&map_key)
        {
            return Arc::clone(node);
        }

        let mut map = self
            .information_sets
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(node) = map.get(&map_key) {
            return Arc::clone(node);
        }
        let mut by_id = self
            .information_sets_by_id
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let node = Arc::new(InformationSetNode::new(
            by_id.len(),
            decision_index,
            player,
            num_actions,
            map_key.1.clone(),
            &self.config,
        ));
        by_id.push(Arc::clone(&node));
        map.insert(map_key, Arc::clone(&node));
        node
    }

    /// The chance node for `(decision_index, key)`, created on first use.
    ///
    /// `probabilities` is only consulted when the node is created.
    pub fn chance_node(
        &self,
        decision_index: usize,
        num_actions: u8,
        pinned: bool,
        key: InformationSetKey,
        probabilities: Option<Vec<f64>>,
    ) -> SolverResult<Arc<ChanceNode>> {
        let map_key = (decision_index, key);
        if let Some(node) = self
            .chance_nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&map_key)
        {
            return Ok(Arc::clone(node));
        }

        let mut map = self
            .chance_nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(node) = map.get(&map_key) {
            return Ok(Arc::clone(node));
        }
        let mut by_id = self
            .chance_nodes_by_id
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let node = Arc::new(ChanceNode::new(
            by_id.len(),
            decision_index,
            num_actions,
            pinned,
            probabilities,
        )?);
        by_id.push(Arc::clone(&node));
        map.insert(map_key, Arc::clone(&node));
        Ok(node)
    }

    /// The leaf at the end of `path`, created on first use.
    ///
    /// `utilities` is only consulted when the leaf is created.
    pub fn leaf(&self, path: &[u8], utilities: Vec<f64>) -> SolverResult<Arc<FinalUtilitiesNode>> {
        self.insert_leaf(path, |id| Ok(FinalUtilitiesNode::new(id, utilities)))
    }

    /// The leaf at the end of `path` below the pinned decisions `sites`,
    /// created on first use from one payoff row per outcome combination.
    pub fn pinned_leaf(
        &self,
        path: &[u8],
        num_players: usize,
        sites: Vec<PinnedSite>,
        rows: Vec<f64>,
    ) -> SolverResult<Arc<FinalUtilitiesNode>> {
        self.insert_leaf(path, |id| {
            FinalUtilitiesNode::with_pinned_outcomes(id, num_players, sites, rows)
        })
    }

    fn insert_leaf(
        &self,
        path: &[u8],
        create: impl FnOnce(usize) -> SolverResult<FinalUtilitiesNode>,
    ) -> SolverResult<Arc<FinalUtilitiesNode>> {
        if let Some(leaf) = self.find_leaf(path) {
            return Ok(leaf);
        }

        let mut map = self.leaves.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(leaf) = map.get(path) {
            return Ok(Arc::clone(leaf));
        }
        let leaf = Arc::new(create(self.next_leaf_id.fetch_add(1, Ordering::Relaxed))?);
        leaf.set_weight_on_opponent(self.config.weight_on_opponent_utility);
        map.insert(path.to_vec(), Arc::clone(&leaf));
        Ok(leaf)
    }

    /// Look up the leaf at the end of `path` without creating it.
    pub fn find_leaf(&self, path: &[u8]) -> Option<Arc<FinalUtilitiesNode>> {
        self.leaves
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Look up an information set without creating it.
    pub fn find_information_set(
        &self,
        decision_index: usize,
        key: &[u8],
    ) -> Option<Arc<InformationSetNode>> {
        self.information_sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(decision_index, key.to_vec()))
            .cloned()
    }

    /// Information set by id.
    pub fn information_set_by_id(&self, node_id: usize) -> SolverResult<Arc<InformationSetNode>> {
        self.information_sets_by_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node_id)
            .cloned()
            .ok_or(SolverError::UnknownNode { node_id })
    }

    /// Chance node by id.
    pub fn chance_node_by_id(&self, node_id: usize) -> SolverResult<Arc<ChanceNode>> {
        self.chance_nodes_by_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node_id)
            .cloned()
            .ok_or(SolverError::UnknownNode { node_id })
    }

    /// Every information set, in id order.
    pub fn information_sets(&self) -> Vec<Arc<InformationSetNode>> {
        self.information_sets_by_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every chance node, in id order.
    pub fn chance_nodes(&self) -> Vec<Arc<ChanceNode>> {
        self.chance_nodes_by_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every leaf, in id order.
    pub fn leaves(&self) -> Vec<Arc<FinalUtilitiesNode>> {
        let mut leaves: Vec<_> = self
            .leaves
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        leaves.sort_by_key(|l| l.id());
        leaves
    }

    /// Information sets grouped by decision index, lowest decision first.
    ///
    /// Navigation rejects paths along which decision indices fail to
    /// increase, so every stratum only depends on strata before it.
    pub fn strata(&self) -> Vec<Vec<Arc<InformationSetNode>>> {
        let mut by_decision: BTreeMap<usize, Vec<Arc<InformationSetNode>>> = BTreeMap::new();
        for node in self.information_sets() {
            by_decision
                .entry(node.decision_index())
                .or_default()
                .push(node);
        }
        by_decision.into_values().collect()
    }

    /// Number of information sets.
    pub fn num_information_sets(&self) -> usize {
        self.information_sets_by_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of chance nodes.
    pub fn num_chance_nodes(&self) -> usize {
        self.chance_nodes_by_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of leaves.
    pub fn num_leaves(&self) -> usize {
        self.leaves.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Reinitialize every information set for a new run.
    pub fn reset_all(&self) {
        for node in self.information_sets() {
            node.reset(&self.config);
        }
    }

    /// Set the weight on the opponent's utility at every leaf.
    pub fn set_weight_on_opponent(&self, weight: f64) {
        for leaf in self.leaves() {
            leaf.set_weight_on_opponent(weight);
        }
    }

    /// Deep copy of every information set's numeric block.
    pub fn backup_all(&self) -> StoreBackup {
        StoreBackup {
            nodes: self.information_sets().iter().map(|n| n.backup()).collect(),
        }
    }

    /// Restore a snapshot taken with [`backup_all`](Self::backup_all).
    pub fn restore_all(&self, backup: &StoreBackup) -> SolverResult<()> {
        for saved in &backup.nodes {
            self.information_set_by_id(saved.node_id)?.restore(saved)?;
        }
        Ok(())
    }

    /// Export the strategy store to a serializable format.
    pub fn export(&self) -> StoreExport {
        StoreExport {
            information_sets: self.backup_all().nodes,
        }
    }

    /// Import a previously exported store. Returns the number of nodes
    /// restored.
    ///
    /// Entries are matched by decision and key, so node ids may differ
    /// between the exporting and importing store. Every entry must match a
    /// node that already exists.
    pub fn import(&self, data: &StoreExport) -> SolverResult<usize> {
        for saved in &data.information_sets {
            let node = self
                .find_information_set(saved.decision_index, &saved.key)
                .ok_or(SolverError::UnknownNode {
                    node_id: saved.node_id,
                })?;
            node.restore(saved)?;
        }
        Ok(data.information_sets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfr::nodes::information_set::Dimension;
    use rayon::prelude::*;

    #[test]
    fn test_information_set_created_once() {
        let store = NodeStore::new(&CFRConfig::default());
        let a = store.information_set(2, 0, 3, vec![1, 2]);
        let b = store.information_set(2, 0, 3, vec![1, 2]);
        let c = store.information_set(2, 0, 3, vec![2, 1]);
        assert!(Arc::ptr_eq(&a, &b));
        assert_ne!(a.id(), c.id());
        assert_eq!(store.num_information_sets(), 2);
        assert_eq!(store.information_set_by_id(c.id()).unwrap().key(), &vec![2, 1]);
        assert!(store.information_set_by_id(7).is_err());
    }

    #[test]
    fn test_concurrent_creation_yields_one_node_per_key() {
        let store = NodeStore::new(&CFRConfig::default());
        (0..1_000u32).into_par_iter().for_each(|i| {
            store.information_set(0, 0, 2, vec![(i % 10) as u8]);
        });
        assert_eq!(store.num_information_sets(), 10);
        let ids: Vec<usize> = store.information_sets().iter().map(|n| n.id()).collect();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_leaves_keyed_by_path() {
        let store = NodeStore::new(&CFRConfig::default());
        let a = store.leaf(&[1, 2], vec![1.0, -1.0]).unwrap();
        let b = store.leaf(&[1, 2], vec![5.0, -5.0]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.raw_utilities(), &[1.0, -1.0]);
        store.leaf(&[2, 1], vec![0.0, 0.0]).unwrap();
        assert_eq!(store.num_leaves(), 2);
    }

    #[test]
    fn test_strata_ordered_by_decision() {
        let store = NodeStore::new(&CFRConfig::default());
        store.information_set(4, 1, 2, vec![]);
        store.information_set(1, 0, 2, vec![0]);
        store.information_set(1, 0, 2, vec![1]);
        let strata = store.strata();
        assert_eq!(strata.len(), 2);
        assert_eq!(strata[0].len(), 2);
        assert_eq!(strata[1][0].decision_index(), 4);
    }

    #[test]
    fn test_backup_restore_and_export_import() {
        let store = NodeStore::new(&CFRConfig::default());
        let node = store.information_set(0, 0, 2, vec![9]);
        node.set(Dimension::CumulativeRegret, 1, 4.0);
        let backup = store.backup_all();
        node.set(Dimension::CumulativeRegret, 1, -4.0);
        store.restore_all(&backup).unwrap();
        assert_eq!(node.get(Dimension::CumulativeRegret, 1), 4.0);

        let exported = store.export();
        let json = serde_json::to_string(&exported).unwrap();
        let other = NodeStore::new(&CFRConfig::default());
        other.information_set(3, 1, 2, vec![]);
        let twin = other.information_set(0, 0, 2, vec![9]);
        let parsed: StoreExport = serde_json::from_str(&json).unwrap();
        assert_eq!(other.import(&parsed).unwrap(), 1);
        assert_eq!(twin.get(Dimension::CumulativeRegret, 1), 4.0);

        let empty = NodeStore::new(&CFRConfig::default());
        assert!(empty.import(&parsed).is_err());
    }
}
