//! Unit tests for the packers and the binning driver.

use proptest::prelude::*;

use pagerando_ir::builder::Builder;
use pagerando_ir::function::{Attr, Function, Linkage};
use pagerando_ir::instruction::CallConv;
use pagerando_ir::module::Module;
use pagerando_ir::types::Signature;
use pagerando_ir::value::{FuncId, Value};
use pagerando_mir::{MachineFunction, MachineInst, MachineModule, MachineTarget};

use crate::cluster::CallGraphAlgo;
use crate::first_fit::FirstFit;
use crate::{run_binning, BinningConfig, Strategy, DEFAULT_BIN_SIZE};

// --- First-fit tests ---

fn assert_assignments(algo: &mut FirstFit, assignments: &[(u32, u32)]) {
    for &(fn_size, expected_bin) in assignments {
        assert_eq!(algo.assign(fn_size), expected_bin, "request {fn_size}");
    }
}

#[test]
fn never_returns_default_bin() {
    let mut algo = FirstFit::new(DEFAULT_BIN_SIZE);
    assert_ne!(algo.assign(100), 0);
}

#[test]
fn uses_greedy_algorithm() {
    let mut algo = FirstFit::new(DEFAULT_BIN_SIZE);
    assert_assignments(
        &mut algo,
        &[(3000, 1), (3000, 2), (1000, 1), (1000, 2), (1000, 3)],
    );
}

#[test]
fn uses_remaining_free_space() {
    let mut algo = FirstFit::new(DEFAULT_BIN_SIZE);
    assert_assignments(
        &mut algo,
        &[(3000, 1), (1000, 1), (100, 2), (90, 1), (6, 1), (1, 2)],
    );
}

#[test]
fn uses_bin_with_least_free_space() {
    let mut algo = FirstFit::new(DEFAULT_BIN_SIZE);
    assert_assignments(&mut algo, &[(3000, 1), (3001, 2), (3000, 3), (100, 2)]);
}

#[test]
fn free_space_must_be_at_least_min_fn_size() {
    let mut algo = FirstFit::new(DEFAULT_BIN_SIZE);
    assert_assignments(&mut algo, &[(4095, 1), (1, 2), (4095, 2)]);
}

#[test]
fn bin_sized_functions_always_get_their_own_bin() {
    let mut algo = FirstFit::new(DEFAULT_BIN_SIZE);
    assert_assignments(&mut algo, &[(4096, 1), (8192, 2), (1, 3)]);
}

#[test]
fn large_functions_are_still_packed() {
    let mut algo = FirstFit::new(DEFAULT_BIN_SIZE);
    assert_assignments(&mut algo, &[(8000, 1), (100, 1)]);
}

proptest! {
    /// Every request gets a non-zero bin, and a bin only exceeds its
    /// capacity when an individually oversized function forced it to
    /// expand.
    #[test]
    fn packer_totality_and_capacity(sizes in prop::collection::vec(1u32..10_000, 1..64)) {
        let mut algo = FirstFit::new(DEFAULT_BIN_SIZE);
        let mut by_bin: std::collections::BTreeMap<u32, Vec<u32>> = Default::default();

        for &size in &sizes {
            let bin = algo.assign(size);
            prop_assert_ne!(bin, 0);
            by_bin.entry(bin).or_default().push(size);
        }

        for (bin, members) in by_bin {
            let total: u32 = members.iter().sum();
            let oversized = members.iter().any(|&s| s > DEFAULT_BIN_SIZE);
            prop_assert!(
                total <= DEFAULT_BIN_SIZE || oversized,
                "bin {} holds {} bytes without an oversized member",
                bin,
                total
            );
        }
    }
}

// --- Call-graph clustering tests ---

fn define_graph(algo: &mut CallGraphAlgo, sizes: &[u32], edges: &[(u32, u32)]) {
    for (expected, &size) in sizes.iter().enumerate() {
        let id = algo.add_node(size);
        assert_eq!(id, expected as u32);
    }
    // Edges must be added bottom-up: callees see all their own edges
    // first. Reversing the top-down edge list achieves that here.
    for &(caller, callee) in edges.iter().rev() {
        algo.add_edge(caller, callee);
    }
}

fn assert_cluster_assignments(algo: &mut CallGraphAlgo, expected: &[u32]) {
    let bins = algo.compute_assignments();
    assert_eq!(bins.len(), expected.len());
    for (node, &bin) in expected.iter().enumerate() {
        assert_eq!(bins[&(node as u32)], bin, "node {node}");
    }
}

#[test]
fn no_edges() {
    let mut algo = CallGraphAlgo::new(DEFAULT_BIN_SIZE);
    define_graph(&mut algo, &[2003, 2002, 2001], &[]);
    assert_cluster_assignments(&mut algo, &[1, 1, 2]);
}

#[test]
fn standard_example() {
    let mut algo = CallGraphAlgo::new(DEFAULT_BIN_SIZE);
    //       0     1     2     3     4     5     6     7
    define_graph(
        &mut algo,
        &[600, 800, 3500, 1000, 1000, 1000, 4000, 100],
        &[(0, 1), (0, 2), (1, 3), (1, 4), (1, 5), (2, 6), (2, 7)],
    );
    // Packing rounds:
    //   node 6 (4000)          -> bin 1 (free   96)
    //   node 1 (800+3000)      -> bin 2 (free  296), callees 3, 4, 5
    //   node 2 (3500+100)      -> bin 3 (free  496), callee 7
    //   node 0 (600)           -> bin 4 (free 3496)
    assert_cluster_assignments(&mut algo, &[4, 2, 3, 2, 2, 2, 1, 3]);
}

#[test]
fn callee_subtree_shares_one_bin() {
    let mut algo = CallGraphAlgo::new(DEFAULT_BIN_SIZE);
    define_graph(&mut algo, &[100, 200, 300], &[(0, 1), (0, 2)]);
    let bins = algo.compute_assignments();
    assert_eq!(bins[&0], bins[&1]);
    assert_eq!(bins[&0], bins[&2]);
}

#[test]
fn oversized_sccs_expand_their_own_bins() {
    let mut algo = CallGraphAlgo::new(DEFAULT_BIN_SIZE);
    define_graph(&mut algo, &[5000, 6000], &[]);
    // Nothing fits: the smallest oversized node goes first; each expands
    // its own bin through the first-fit remainder rule.
    let bins = algo.compute_assignments();
    assert_eq!(bins[&0], 1);
    assert_eq!(bins[&1], 2);
}

// --- Driver tests ---

/// Fixed-size toy target: every instruction is one byte, no calls.
struct ByteTarget;

impl MachineTarget for ByteTarget {
    type Opcode = u8;
    type Info = ();

    fn is_call(_opcode: u8) -> bool {
        false
    }

    fn inst_size_in_bytes(_inst: &MachineInst<Self>) -> u32 {
        1
    }
}

/// A module of empty pagerando functions plus machine bodies with the
/// given byte sizes.
fn lowered_module(sizes: &[u32]) -> (Module, MachineModule<ByteTarget>, Vec<FuncId>) {
    let mut module = Module::new("m");
    let mut machine = MachineModule::new();
    let mut ids = Vec::new();

    for (i, &size) in sizes.iter().enumerate() {
        let mut func = Function::new(
            format!("f{i}"),
            Signature::new(vec![], None),
            Linkage::Internal,
        );
        func.attrs.add(Attr::Pagerando);
        let mut b = Builder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        b.ret(None);
        let id = module.add_function(func);

        let mut mf = MachineFunction::new(id);
        for _ in 0..size {
            mf.push_inst(0, MachineInst::new(0u8, vec![]));
        }
        machine.insert(mf);
        ids.push(id);
    }

    (module, machine, ids)
}

#[test]
fn simple_strategy_tags_section_prefixes() {
    let (mut module, machine, ids) = lowered_module(&[3000, 3000, 1000]);
    let config = BinningConfig {
        strategy: Strategy::Simple,
        bin_size: DEFAULT_BIN_SIZE,
    };
    assert!(run_binning(&mut module, &machine, &config));

    assert_eq!(module.func(ids[0]).section_prefix.as_deref(), Some(".bin_1"));
    assert_eq!(module.func(ids[1]).section_prefix.as_deref(), Some(".bin_2"));
    assert_eq!(module.func(ids[2]).section_prefix.as_deref(), Some(".bin_1"));
}

#[test]
fn simple_strategy_skips_non_pagerando() {
    let (mut module, machine, ids) = lowered_module(&[100, 100]);
    module.func_mut(ids[1]).attrs.remove(Attr::Pagerando);
    let config = BinningConfig {
        strategy: Strategy::Simple,
        bin_size: DEFAULT_BIN_SIZE,
    };
    run_binning(&mut module, &machine, &config);

    assert!(module.func(ids[0]).section_prefix.is_some());
    assert!(module.func(ids[1]).section_prefix.is_none());
}

/// Replace a function's body with a single direct call to `callee`.
fn make_caller(module: &mut Module, caller: FuncId, callee: FuncId) {
    let name = module.func(caller).name.clone();
    let mut f = Function::new(name, Signature::new(vec![], None), Linkage::Internal);
    f.attrs.add(Attr::Pagerando);
    let mut b = Builder::new(&mut f);
    let entry = b.create_block();
    b.switch_to_block(entry);
    b.call(Value::function(callee), vec![], CallConv::C);
    b.ret(None);
    *module.func_mut(caller) = f;
}

#[test]
fn callgraph_strategy_groups_caller_and_callee() {
    let (mut module, machine, ids) = lowered_module(&[1000, 1000, 3500]);
    // f0 calls f1; f2 stands alone and nearly fills a bin.
    make_caller(&mut module, ids[0], ids[1]);

    let config = BinningConfig::default();
    assert_eq!(config.strategy, Strategy::CallGraph);
    assert!(run_binning(&mut module, &machine, &config));

    let bin0 = module.func(ids[0]).section_prefix.clone();
    let bin1 = module.func(ids[1]).section_prefix.clone();
    let bin2 = module.func(ids[2]).section_prefix.clone();
    assert_eq!(bin0, bin1, "caller and callee should share a bin");
    assert_ne!(bin0, bin2);
}

#[test]
fn recursive_functions_share_an_scc_node() {
    let (mut module, machine, ids) = lowered_module(&[500, 500]);
    // Mutual recursion: f0 <-> f1.
    make_caller(&mut module, ids[0], ids[1]);
    make_caller(&mut module, ids[1], ids[0]);

    let config = BinningConfig::default();
    run_binning(&mut module, &machine, &config);
    assert_eq!(
        module.func(ids[0]).section_prefix,
        module.func(ids[1]).section_prefix
    );
}
