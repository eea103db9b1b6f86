//! pagerando_optimizer: rewrites intra-bin indirect calls into direct
//! calls.
//!
//! Calls between functions in the same bin do not need the indirection
//! through the page-offset table: both ends move together at load time,
//! so a PC-relative call reaches the callee regardless of where the bin
//! lands. Targets recognize their address-materialization patterns
//! through [`IntraBinTarget`]; the driver tears the whole def-use chain
//! down and lets the target rewrite the call at its end.

use rustc_hash::FxHashSet;
use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace};

use pagerando_ir::function::Attr;
use pagerando_ir::module::Module;
use pagerando_ir::value::FuncId;
use pagerando_mir::{MachineFunction, MachineTarget, MirId};


/// Intra-bin call sites discovered in one function.
#[derive(Debug, Default)]
pub struct Candidates {
    /// Address-materialization instructions with their resolved callees.
    pub sites: Vec<(MirId, FuncId)>,
    /// Constant-pool indices made dead by rewriting every site, in
    /// ascending order.
    pub dead_cp: Vec<u32>,
}

/// Target hooks for the intra-bin optimizer.
pub trait IntraBinTarget: MachineTarget {
    /// Scan a function for intra-bin candidates: instructions that
    /// materialize the address of a same-bin callee through the
    /// page-offset table.
    fn find_candidates(
        mf: &MachineFunction<Self>,
        module: &Module,
        bin_prefix: &str,
    ) -> Candidates;

    /// Rewrite a call at the end of a torn-down materialization chain.
    /// The implementation decides whether the call is replaced by a
    /// fresh direct call (and erased) or patched in place.
    fn rewrite_call(mf: &mut MachineFunction<Self>, call: MirId, callee: FuncId);

    /// Erase constant-pool entries made dead by the rewrites and remap
    /// surviving index uses. Targets without a constant pool keep the
    /// default no-op.
    fn cleanup(mf: &mut MachineFunction<Self>, dead_cp: &[u32]) {
        let _ = (mf, dead_cp);
    }
}

/// Optimize one machine function. `skip` is the host's per-function
/// opt-out; the pass is an optimization and must honor it.
pub fn optimize_function<T: IntraBinTarget>(
    module: &Module,
    mf: &mut MachineFunction<T>,
    skip: bool,
) -> bool {
    let func = module.func(mf.func);
    if !func.attrs.has(Attr::Pagerando) || skip {
        return false;
    }

    // The bin prefix was assigned by the binning pass.
    let bin_prefix = func
        .section_prefix
        .clone()
        .expect("pagerando function without bin assignment");

    let candidates = T::find_candidates(mf, module, &bin_prefix);
    if candidates.sites.is_empty() {
        return false;
    }
    debug!(
        func = %func.name,
        sites = candidates.sites.len(),
        "optimizing intra-bin calls"
    );

    for &(site, callee) in &candidates.sites {
        rewrite_chain(mf, site, callee);
    }

    T::cleanup(mf, &candidates.dead_cp);
    true
}

/// Tear down the address-materialization chain rooted at `start` and
/// rewrite the calls it feeds. Worklist + discovered set: SSA graphs can
/// reconverge, and a chain must be visited once.
fn rewrite_chain<T: IntraBinTarget>(mf: &mut MachineFunction<T>, start: MirId, callee: FuncId) {
    let mut queue: SmallVec<[MirId; 4]> = smallvec![start];
    let mut discovered = FxHashSet::default();
    discovered.insert(start);

    while let Some(id) = queue.pop() {
        if mf.is_erased(id) {
            continue;
        }
        if mf.inst(id).is_call() {
            trace!(?id, "rewriting call");
            T::rewrite_call(mf, id, callee);
        } else {
            // Not a call: enqueue the users of everything it defines,
            // then delete it.
            for def in mf.inst(id).defs() {
                for user in mf.vreg_users(def) {
                    if discovered.insert(user) {
                        queue.push(user);
                    }
                }
            }
            mf.erase(id);
        }
    }
}
