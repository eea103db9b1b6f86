//! Call graph construction and bottom-up SCC iteration.
//!
//! The clustering strategy needs strongly-connected components in
//! bottom-up order (callees before callers): edge insertion into the
//! cluster graph assumes the callee's transitive-callee set is final.
//! Tarjan's algorithm yields SCCs in exactly that order, since a
//! component is only completed after all components it reaches.

use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

use pagerando_ir::module::Module;
use pagerando_ir::value::{FuncId, Value};

/// Direct-call graph over a module's functions.
pub struct CallGraph {
    nodes: Vec<FuncId>,
    callees: FxHashMap<FuncId, BTreeSet<FuncId>>,
}

impl CallGraph {
    /// Build the graph from direct call sites (including calls through
    /// constant pointer casts, which lower to direct calls).
    pub fn build(module: &Module) -> Self {
        let nodes: Vec<FuncId> = module.order().to_vec();
        let mut callees: FxHashMap<FuncId, BTreeSet<FuncId>> = FxHashMap::default();

        for (fid, func) in module.funcs() {
            let edges = callees.entry(fid).or_default();
            for inst in func.inst_ids() {
                let op = &func.inst(inst).op;
                if !op.is_call() {
                    continue;
                }
                if let Value::Const(c) = op.values()[0] {
                    if let Some(target) = c.as_function_target() {
                        edges.insert(target);
                    }
                }
            }
        }

        Self { nodes, callees }
    }

    pub fn callees(&self, func: FuncId) -> impl Iterator<Item = FuncId> + '_ {
        self.callees
            .get(&func)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    /// SCCs in bottom-up (reverse topological) order.
    pub fn sccs_bottom_up(&self) -> Vec<Vec<FuncId>> {
        Tarjan::new(self).run()
    }
}

/// Iterative Tarjan SCC computation.
struct Tarjan<'a> {
    graph: &'a CallGraph,
    index: FxHashMap<FuncId, u32>,
    lowlink: FxHashMap<FuncId, u32>,
    on_stack: BTreeSet<FuncId>,
    stack: Vec<FuncId>,
    next_index: u32,
    sccs: Vec<Vec<FuncId>>,
}

impl<'a> Tarjan<'a> {
    fn new(graph: &'a CallGraph) -> Self {
        Self {
            graph,
            index: FxHashMap::default(),
            lowlink: FxHashMap::default(),
            on_stack: BTreeSet::new(),
            stack: Vec::new(),
            next_index: 0,
            sccs: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Vec<FuncId>> {
        for &node in &self.graph.nodes {
            if !self.index.contains_key(&node) {
                self.visit(node);
            }
        }
        self.sccs
    }

    fn visit(&mut self, root: FuncId) {
        // Explicit DFS stack: (node, callees, next callee position).
        self.begin(root);
        let root_callees: Vec<FuncId> = self.graph.callees(root).collect();
        let mut work: Vec<(FuncId, Vec<FuncId>, usize)> = vec![(root, root_callees, 0)];

        while let Some(top) = work.last_mut() {
            let node = top.0;
            if top.2 < top.1.len() {
                let next = top.1[top.2];
                top.2 += 1;
                if !self.index.contains_key(&next) {
                    self.begin(next);
                    let callees: Vec<FuncId> = self.graph.callees(next).collect();
                    work.push((next, callees, 0));
                } else if self.on_stack.contains(&next) {
                    let low = self.lowlink[&node].min(self.index[&next]);
                    self.lowlink.insert(node, low);
                }
            } else {
                work.pop();
                if let Some(parent) = work.last() {
                    let low = self.lowlink[&parent.0].min(self.lowlink[&node]);
                    self.lowlink.insert(parent.0, low);
                }
                if self.lowlink[&node] == self.index[&node] {
                    let mut scc = Vec::new();
                    loop {
                        let popped = self.stack.pop().expect("tarjan stack underflow");
                        self.on_stack.remove(&popped);
                        scc.push(popped);
                        if popped == node {
                            break;
                        }
                    }
                    self.sccs.push(scc);
                }
            }
        }
    }

    fn begin(&mut self, node: FuncId) {
        self.index.insert(node, self.next_index);
        self.lowlink.insert(node, self.next_index);
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack.insert(node);
    }
}
