//! Call-graph-aware packing.
//!
//! Works on a DAG of strongly-connected components of the (pagerando-only)
//! call graph. The transitive size of a node is its own size plus the
//! sizes of all transitive callees. Each round selects the node with the
//! greatest transitive size that still fits a bin, assigns it and its
//! whole callee subtree to one bin via the first-fit packer, and shrinks
//! the transitive size of its callers accordingly.
//!
//! The graph must be built bottom-up (callees before callers):
//! [`CallGraphAlgo::add_edge`] folds the callee's transitive-callee set
//! into the caller, which is only complete once the callee saw all of its
//! own edges.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::debug;

use crate::first_fit::{BinId, FirstFit};

/// Node id in the SCC graph.
pub type NodeId = u32;

/// One SCC of the call graph, restricted to pagerando functions.
struct Node {
    size: u32,
    /// Transitive size; computed once, then shrunk as callee subtrees get
    /// packed.
    tra_size: u32,
    /// Transitive callees, including the node itself.
    tra_callees: BTreeSet<NodeId>,
    callers: BTreeSet<NodeId>,
}

/// The clustering state: an indexed arena of nodes.
pub struct CallGraphAlgo {
    bin_size: u32,
    nodes: Vec<Node>,
}

impl CallGraphAlgo {
    pub fn new(bin_size: u32) -> Self {
        Self {
            bin_size,
            nodes: Vec::new(),
        }
    }

    /// Add a node with the given aggregate self size.
    pub fn add_node(&mut self, size: u32) -> NodeId {
        let id = self.nodes.len() as NodeId;
        let mut tra_callees = BTreeSet::new();
        tra_callees.insert(id);
        self.nodes.push(Node {
            size,
            tra_size: 0,
            tra_callees,
            callers: BTreeSet::new(),
        });
        id
    }

    /// Record a caller-to-callee edge. The callee must already have all
    /// of its own edges (bottom-up construction).
    pub fn add_edge(&mut self, caller: NodeId, callee: NodeId) {
        self.nodes[callee as usize].callers.insert(caller);
        let callee_set = self.nodes[callee as usize].tra_callees.clone();
        self.nodes[caller as usize].tra_callees.extend(callee_set);
    }

    fn compute_transitive_size(&mut self, id: NodeId) {
        let sum = self.nodes[id as usize]
            .tra_callees
            .iter()
            .map(|&c| self.nodes[c as usize].size)
            .sum();
        self.nodes[id as usize].tra_size = sum;
    }

    /// Largest transitive size that still fits a bin; if nothing fits,
    /// the smallest (an oversized SCC that will expand its own bin).
    /// Ties break towards the lowest node id.
    fn select_node(&self, worklist: &[NodeId]) -> NodeId {
        let mut fitting: Option<NodeId> = None;
        let mut smallest = worklist[0];
        for &n in worklist {
            let tra = self.nodes[n as usize].tra_size;
            if tra <= self.bin_size
                && fitting.is_none_or(|b| tra > self.nodes[b as usize].tra_size)
            {
                fitting = Some(n);
            }
            if tra < self.nodes[smallest as usize].tra_size {
                smallest = n;
            }
        }
        fitting.unwrap_or(smallest)
    }

    /// Breadth-first walk from `start` along edges chosen by `expand`.
    fn bfs(
        &mut self,
        start: NodeId,
        expand: impl Fn(&Node) -> &BTreeSet<NodeId>,
        mut action: impl FnMut(&mut Node),
    ) {
        let mut queue = VecDeque::from([start]);
        let mut discovered = BTreeSet::from([start]);

        while let Some(id) = queue.pop_front() {
            action(&mut self.nodes[id as usize]);
            let next: Vec<NodeId> = expand(&self.nodes[id as usize]).iter().copied().collect();
            for n in next {
                if discovered.insert(n) {
                    queue.push_back(n);
                }
            }
        }
    }

    /// Pack all nodes into bins. Consumes the accumulated graph state.
    pub fn compute_assignments(&mut self) -> BTreeMap<NodeId, BinId> {
        let mut worklist: Vec<NodeId> = (0..self.nodes.len() as NodeId).collect();
        for &n in &worklist {
            self.compute_transitive_size(n);
        }

        let mut first_fit = FirstFit::new(self.bin_size);
        let mut bins = BTreeMap::new();

        while !worklist.is_empty() {
            let picked = self.select_node(&worklist);
            let tra_size = self.nodes[picked as usize].tra_size;
            let bin = first_fit.assign(tra_size);
            debug!(node = picked, tra_size, bin, "packed callee subtree");

            // Assign the whole callee subtree; nodes packed by an earlier
            // round keep their first bin.
            let callees = self.nodes[picked as usize].tra_callees.clone();
            for &c in &callees {
                bins.entry(c).or_insert(bin);
            }
            worklist.retain(|n| !callees.contains(n));

            // The subtree no longer drags its callers' weight up.
            // Saturating: diamond-shaped caller graphs can subtract a
            // shared subtree more than once.
            self.bfs(
                picked,
                |n| &n.callers,
                |n| n.tra_size = n.tra_size.saturating_sub(tra_size),
            );
        }

        bins
    }
}
