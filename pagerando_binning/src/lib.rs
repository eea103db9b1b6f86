//! pagerando_binning: assigns pagerando functions to page-sized bins.
//!
//! Function sizes are estimated from the lowered machine functions, so
//! this should run as late as possible but before the intra-bin
//! optimizers (they rely on bin assignments).
//!
//! Strategies:
//! - `Simple`: greedy first-fit per function in module order.
//! - `CallGraph` (default): clusters SCCs of the call graph so functions
//!   that call each other tend to share a bin, giving the intra-bin
//!   optimizers more opportunities.

pub mod callgraph;
pub mod cluster;
pub mod first_fit;

#[cfg(test)]
mod tests;

use rustc_hash::FxHashMap;
use tracing::debug;

use pagerando_ir::function::Attr;
use pagerando_ir::module::Module;
use pagerando_ir::value::FuncId;
use pagerando_mir::size::estimate_function_size;
use pagerando_mir::{MachineModule, MachineTarget};

use crate::callgraph::CallGraph;
use crate::cluster::CallGraphAlgo;
use crate::first_fit::{BinId, FirstFit};

/// Section prefix carrying the bin assignment; bin N becomes `.bin_N`.
pub const SECTION_PREFIX: &str = ".bin_";

/// Default bin capacity: one page.
pub const DEFAULT_BIN_SIZE: u32 = 4096;

/// Binning strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Greedy first-fit, function by function.
    Simple,
    /// Cluster call-graph SCCs, then first-fit per cluster.
    #[default]
    CallGraph,
}

/// Configuration for the binning pass.
#[derive(Debug, Clone)]
pub struct BinningConfig {
    pub strategy: Strategy,
    pub bin_size: u32,
}

impl Default for BinningConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            bin_size: DEFAULT_BIN_SIZE,
        }
    }
}

fn is_pagerando(module: &Module, func: FuncId) -> bool {
    module.func(func).attrs.has(Attr::Pagerando)
}

fn estimate<T: MachineTarget>(machine: &MachineModule<T>, func: FuncId) -> u32 {
    let mf = machine
        .get(func)
        .expect("no machine function for pagerando function");
    estimate_function_size(mf)
}

/// Note: overwrites an existing section prefix.
fn set_bin(module: &mut Module, func: FuncId, bin: BinId) {
    let f = module.func_mut(func);
    f.section_prefix = Some(format!("{SECTION_PREFIX}{bin}"));
    debug!(func = %f.name, bin, "assigned bin");
}

/// Assign every pagerando function in the module to a bin. Returns true
/// if any assignment was made.
pub fn run_binning<T: MachineTarget>(
    module: &mut Module,
    machine: &MachineModule<T>,
    config: &BinningConfig,
) -> bool {
    match config.strategy {
        Strategy::Simple => bin_simple(module, machine, config),
        Strategy::CallGraph => bin_call_graph(module, machine, config),
    }
}

fn bin_simple<T: MachineTarget>(
    module: &mut Module,
    machine: &MachineModule<T>,
    config: &BinningConfig,
) -> bool {
    let mut first_fit = FirstFit::new(config.bin_size);
    let mut changed = false;
    for func in module.order().to_vec() {
        if is_pagerando(module, func) {
            let size = estimate(machine, func);
            let bin = first_fit.assign(size);
            set_bin(module, func, bin);
            changed = true;
        }
    }
    changed
}

fn bin_call_graph<T: MachineTarget>(
    module: &mut Module,
    machine: &MachineModule<T>,
    config: &BinningConfig,
) -> bool {
    let cg = CallGraph::build(module);
    let mut algo = CallGraphAlgo::new(config.bin_size);
    let mut funcs_to_node: FxHashMap<FuncId, cluster::NodeId> = FxHashMap::default();

    // One cluster node per SCC with at least one pagerando function.
    // Bottom-up order guarantees a callee's node exists before any edge
    // to it is recorded.
    for scc in cg.sccs_bottom_up() {
        let members: Vec<FuncId> = scc
            .into_iter()
            .filter(|&f| is_pagerando(module, f))
            .collect();
        if members.is_empty() {
            continue;
        }

        let size = members.iter().map(|&f| estimate(machine, f)).sum();
        let id = algo.add_node(size);
        for &f in &members {
            for callee in cg.callees(f) {
                if is_pagerando(module, callee) && !members.contains(&callee) {
                    let callee_node = *funcs_to_node
                        .get(&callee)
                        .expect("callee SCC not yet visited");
                    algo.add_edge(id, callee_node);
                }
            }
            funcs_to_node.insert(f, id);
        }
    }

    let bins = algo.compute_assignments();
    for (func, node) in funcs_to_node {
        set_bin(module, func, bins[&node]);
    }

    !bins.is_empty()
}
