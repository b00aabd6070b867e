//! Generic two-phase traversal of the game tree.
//!
//! A walk calls the processor's forward method on the way down (pre-order)
//! and its backward method on the way up (post-order), visiting children in
//! increasing action order. Leaves turn the walk around. Processors never
//! recurse themselves; the traversal order is fixed here and only the
//! per-node computation varies.

use rayon::prelude::*;

use crate::cfr::error::SolverResult;
use crate::cfr::game::GameDefinition;
use crate::cfr::navigation::{HistoryPoint, Navigation};
use crate::cfr::nodes::{ChanceNode, FinalUtilitiesNode, GameNode, InformationSetNode};

/// Where a node was entered from.
#[derive(Debug, Clone, Copy)]
pub struct Visit<'a> {
    /// Parent node, `None` at the root.
    pub predecessor: Option<&'a GameNode>,
    /// Action taken at the parent, 0 at the root.
    pub predecessor_action: u8,
    /// Distributor-chance-input key at this position.
    pub distributor_key: u32,
    /// True distribution when this is a pinned chance node.
    pub true_probabilities: Option<&'a [f64]>,
    /// Actions taken from the root.
    pub path: &'a [u8],
}

impl Visit<'_> {
    /// Probability chance assigned to the edge into this node, or 1 when the
    /// parent is not a chance node.
    pub fn chance_edge_probability(&self) -> f64 {
        match self.predecessor {
            Some(GameNode::Chance(c)) => c.branch_probability(self.predecessor_action),
            _ => 1.0,
        }
    }

    /// The parent information set and the action taken there, if the parent
    /// is an information set.
    pub fn information_set_edge(&self) -> Option<(&InformationSetNode, u8)> {
        match self.predecessor {
            Some(GameNode::InformationSet(n)) => Some((n.as_ref(), self.predecessor_action)),
            _ => None,
        }
    }
}

/// Per-node computation plugged into a [`TreeWalk`].
///
/// `Forward` flows from parent to child; `Back` flows from child to parent.
/// The forward value passed to a child is the one its parent returned; the
/// child sees the parent and action through [`Visit`].
pub trait TreeNodeProcessor {
    /// Context flowing down.
    type Forward: Clone;
    /// Result flowing up.
    type Back;

    /// Called before descending into a chance node's children.
    fn chance_forward(
        &self,
        node: &ChanceNode,
        visit: &Visit<'_>,
        forward: &Self::Forward,
    ) -> SolverResult<Self::Forward>;

    /// Called before descending into an information set's children.
    fn information_set_forward(
        &self,
        node: &InformationSetNode,
        visit: &Visit<'_>,
        forward: &Self::Forward,
    ) -> SolverResult<Self::Forward>;

    /// Produces a leaf's back value directly.
    fn final_utilities_turn_around(
        &self,
        node: &FinalUtilitiesNode,
        visit: &Visit<'_>,
        forward: &Self::Forward,
    ) -> SolverResult<Self::Back>;

    /// Combines the children of a chance node. A pinned node has one child.
    fn chance_backward(
        &self,
        node: &ChanceNode,
        visit: &Visit<'_>,
        forward: &Self::Forward,
        children: Vec<Self::Back>,
    ) -> SolverResult<Self::Back>;

    /// Combines the children of an information set, in action order.
    fn information_set_backward(
        &self,
        node: &InformationSetNode,
        visit: &Visit<'_>,
        forward: &Self::Forward,
        children: Vec<Self::Back>,
    ) -> SolverResult<Self::Back>;
}

/// Drives a processor over the tree materialized by a [`Navigation`].
pub struct TreeWalk<'a, G: GameDefinition> {
    navigation: &'a Navigation<G>,
}

impl<'a, G: GameDefinition> TreeWalk<'a, G> {
    /// Walk the tree of `navigation`.
    pub fn new(navigation: &'a Navigation<G>) -> Self {
        Self { navigation }
    }

    /// Walk the whole tree and return the root's back value.
    pub fn walk<P: TreeNodeProcessor>(
        &self,
        processor: &P,
        initial: P::Forward,
    ) -> SolverResult<P::Back> {
        let root = self.navigation.root()?;
        let visit = root_visit(&root);
        self.walk_from(&root, &visit, processor, &initial)
    }

    fn walk_from<P: TreeNodeProcessor>(
        &self,
        point: &HistoryPoint<G::Progress>,
        visit: &Visit<'_>,
        processor: &P,
        forward_in: &P::Forward,
    ) -> SolverResult<P::Back> {
        match point.node() {
            GameNode::FinalUtilities(leaf) => {
                processor.final_utilities_turn_around(leaf, visit, forward_in)
            }
            GameNode::Chance(node) => {
                let forward = processor.chance_forward(node, visit, forward_in)?;
                let mut children = Vec::with_capacity(node.num_actions() as usize);
                for action in node.branch_actions() {
                    let child = self.navigation.branch(point, action)?;
                    let child_visit = child_visit(point, &child, action);
                    children.push(self.walk_from(&child, &child_visit, processor, &forward)?);
                }
                processor.chance_backward(node, visit, &forward, children)
            }
            GameNode::InformationSet(node) => {
                let forward = processor.information_set_forward(node, visit, forward_in)?;
                let mut children = Vec::with_capacity(node.num_actions() as usize);
                for action in 1..=node.num_actions() {
                    let child = self.navigation.branch(point, action)?;
                    let child_visit = child_visit(point, &child, action);
                    children.push(self.walk_from(&child, &child_visit, processor, &forward)?);
                }
                processor.information_set_backward(node, visit, &forward, children)
            }
        }
    }
}

impl<'a, G: GameDefinition> TreeWalk<'a, G> {
    /// Walk the whole tree, descending into siblings on the rayon pool.
    ///
    /// Children are still combined in action order, but forward calls on
    /// different subtrees may interleave.
    pub fn walk_parallel<P>(&self, processor: &P, initial: P::Forward) -> SolverResult<P::Back>
    where
        P: TreeNodeProcessor + Sync,
        P::Forward: Send + Sync,
        P::Back: Send,
    {
        let root = self.navigation.root()?;
        let visit = root_visit(&root);
        self.walk_parallel_from(&root, &visit, processor, &initial)
    }

    fn walk_parallel_from<P>(
        &self,
        point: &HistoryPoint<G::Progress>,
        visit: &Visit<'_>,
        processor: &P,
        forward_in: &P::Forward,
    ) -> SolverResult<P::Back>
    where
        P: TreeNodeProcessor + Sync,
        P::Forward: Send + Sync,
        P::Back: Send,
    {
        match point.node() {
            GameNode::FinalUtilities(leaf) => {
                processor.final_utilities_turn_around(leaf, visit, forward_in)
            }
            GameNode::Chance(node) => {
                let forward = processor.chance_forward(node, visit, forward_in)?;
                let children = node
                    .branch_actions()
                    .collect::<Vec<u8>>()
                    .into_par_iter()
                    .map(|action| self.descend_parallel(point, action, processor, &forward))
                    .collect::<SolverResult<Vec<_>>>()?;
                processor.chance_backward(node, visit, &forward, children)
            }
            GameNode::InformationSet(node) => {
                let forward = processor.information_set_forward(node, visit, forward_in)?;
                let children = (1..=node.num_actions())
                    .into_par_iter()
                    .map(|action| self.descend_parallel(point, action, processor, &forward))
                    .collect::<SolverResult<Vec<_>>>()?;
                processor.information_set_backward(node, visit, &forward, children)
            }
        }
    }

    fn descend_parallel<P>(
        &self,
        point: &HistoryPoint<G::Progress>,
        action: u8,
        processor: &P,
        forward: &P::Forward,
    ) -> SolverResult<P::Back>
    where
        P: TreeNodeProcessor + Sync,
        P::Forward: Send + Sync,
        P::Back: Send,
    {
        let child = self.navigation.branch(point, action)?;
        let child_visit = child_visit(point, &child, action);
        self.walk_parallel_from(&child, &child_visit, processor, forward)
    }
}

fn root_visit<P>(root: &HistoryPoint<P>) -> Visit<'_> {
    Visit {
        predecessor: None,
        predecessor_action: 0,
        distributor_key: root.distributor_key(),
        true_probabilities: root.true_probabilities(),
        path: root.path(),
    }
}

fn child_visit<'p, P>(
    parent: &'p HistoryPoint<P>,
    child: &'p HistoryPoint<P>,
    action: u8,
) -> Visit<'p> {
    Visit {
        predecessor: Some(parent.node()),
        predecessor_action: action,
        distributor_key: child.distributor_key(),
        true_probabilities: child.true_probabilities(),
        path: child.path(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfr::config::{CFRConfig, NavigationMode};
    use crate::cfr::game::{Decision, InformationSetKey};
    use crate::cfr::nodes::NodeStore;
    use std::sync::Mutex;

    /// Chance picks one of two rooms; the only player picks one of two doors.
    /// 1 chance node, 2 information sets, 4 leaves.
    struct Doors {
        decisions: Vec<Decision>,
    }

    impl Doors {
        fn new() -> Self {
            Self {
                decisions: vec![
                    Decision::chance("Room", "R", 2),
                    Decision::player("Door", "D", 0, 2),
                ],
            }
        }
    }

    impl GameDefinition for Doors {
        type Progress = Vec<u8>;

        fn num_players(&self) -> usize {
            2
        }

        fn decisions(&self) -> &[Decision] {
            &self.decisions
        }

        fn initial_progress(&self) -> Vec<u8> {
            Vec::new()
        }

        fn next_decision(&self, progress: &Vec<u8>) -> Option<usize> {
            (progress.len() < 2).then_some(progress.len())
        }

        fn information_set_key(&self, progress: &Vec<u8>, _d: usize) -> InformationSetKey {
            progress.clone()
        }

        fn apply_action(&self, progress: &Vec<u8>, _d: usize, action: u8) -> Vec<u8> {
            let mut next = progress.clone();
            next.push(action);
            next
        }

        fn utilities(&self, progress: &Vec<u8>) -> Vec<f64> {
            let u = (progress[0] * 10 + progress[1]) as f64;
            vec![u, -u]
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl TreeNodeProcessor for Recorder {
        type Forward = usize;
        type Back = f64;

        fn chance_forward(&self, node: &ChanceNode, _v: &Visit<'_>, depth: &usize) -> SolverResult<usize> {
            self.push(format!("F chance {}", node.id()));
            Ok(depth + 1)
        }

        fn information_set_forward(
            &self,
            node: &InformationSetNode,
            visit: &Visit<'_>,
            depth: &usize,
        ) -> SolverResult<usize> {
            self.push(format!("F info {} via {}", node.id(), visit.predecessor_action));
            Ok(depth + 1)
        }

        fn final_utilities_turn_around(
            &self,
            node: &FinalUtilitiesNode,
            visit: &Visit<'_>,
            depth: &usize,
        ) -> SolverResult<f64> {
            self.push(format!("T leaf {:?} depth {}", visit.path, depth));
            Ok(node.utility(0))
        }

        fn chance_backward(
            &self,
            node: &ChanceNode,
            _v: &Visit<'_>,
            _f: &usize,
            children: Vec<f64>,
        ) -> SolverResult<f64> {
            self.push(format!("B chance {} {:?}", node.id(), children));
            Ok(children.iter().sum())
        }

        fn information_set_backward(
            &self,
            node: &InformationSetNode,
            _v: &Visit<'_>,
            _f: &usize,
            children: Vec<f64>,
        ) -> SolverResult<f64> {
            self.push(format!("B info {} {:?}", node.id(), children));
            Ok(children.iter().sum())
        }
    }

    fn expected_events() -> Vec<String> {
        [
            "F chance 0",
            "F info 0 via 1",
            "T leaf [1, 1] depth 2",
            "T leaf [1, 2] depth 2",
            "B info 0 [11.0, 12.0]",
            "F info 1 via 2",
            "T leaf [2, 1] depth 2",
            "T leaf [2, 2] depth 2",
            "B info 1 [21.0, 22.0]",
            "B chance 0 [23.0, 43.0]",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn test_visitation_order() {
        for mode in [
            NavigationMode::GamePlayer,
            NavigationMode::CachedHistory,
            NavigationMode::CachedTree,
            NavigationMode::Verified,
        ] {
            let config = CFRConfig::default().with_navigation(mode);
            let nav = Navigation::new(Doors::new(), NodeStore::new(&config));
            let recorder = Recorder::default();
            let total = TreeWalk::new(&nav).walk(&recorder, 0).unwrap();
            assert_eq!(total, 66.0);
            assert_eq!(*recorder.events.lock().unwrap(), expected_events(), "{:?}", mode);
            assert_eq!(nav.store().num_information_sets(), 2);
            assert_eq!(nav.store().num_leaves(), 4);
        }
    }

    #[test]
    fn test_repeated_walks_reuse_nodes() {
        let nav = Navigation::new(Doors::new(), NodeStore::new(&CFRConfig::default()));
        let walk = TreeWalk::new(&nav);
        let first = Recorder::default();
        walk.walk(&first, 0).unwrap();
        let second = Recorder::default();
        walk.walk(&second, 0).unwrap();
        assert_eq!(*second.events.lock().unwrap(), expected_events());
    }

    #[test]
    fn test_parallel_walk_combines_in_action_order() {
        let nav = Navigation::new(Doors::new(), NodeStore::new(&CFRConfig::default()));
        let walk = TreeWalk::new(&nav);
        let sequential = walk.walk(&Recorder::default(), 0).unwrap();
        let recorder = Recorder::default();
        let parallel = walk.walk_parallel(&recorder, 0).unwrap();
        assert_eq!(parallel, sequential);
        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 10);
        assert_eq!(events.last().map(String::as_str), Some("B chance 0 [23.0, 43.0]"));
        assert!(events.contains(&"B info 1 [21.0, 22.0]".to_string()));
    }
}
