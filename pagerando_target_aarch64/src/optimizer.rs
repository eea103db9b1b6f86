//! Intra-bin optimizer hooks for AArch64.

use pagerando_ir::module::Module;
use pagerando_ir::value::{FuncId, GlobalValueRef};
use pagerando_mir::{MachineFunction, MachineInst, MachineOperand, MirId};
use pagerando_optimizer::{Candidates, IntraBinTarget};

use crate::inst::{Aarch64Opcode, Aarch64Target};

/// The callee of a bin-addressing pseudo: its global operand.
fn callee_of(inst: &MachineInst<Aarch64Target>) -> FuncId {
    match inst.operands.get(2) {
        Some(MachineOperand::Global(GlobalValueRef::Function(f))) => *f,
        _ => panic!("bin-addressing pseudo without callee operand"),
    }
}

impl IntraBinTarget for Aarch64Target {
    fn find_candidates(
        mf: &MachineFunction<Self>,
        module: &Module,
        bin_prefix: &str,
    ) -> Candidates {
        let mut candidates = Candidates::default();
        for (id, inst) in mf.iter_insts() {
            if inst.opcode != Aarch64Opcode::MovAddrBin {
                continue;
            }
            let callee = callee_of(inst);
            if module.func(callee).section_prefix.as_deref() == Some(bin_prefix) {
                candidates.sites.push((id, callee));
            }
        }
        candidates
    }

    fn rewrite_call(mf: &mut MachineFunction<Self>, call: MirId, callee: FuncId) {
        let old = mf.inst(call).clone();
        let opcode = to_direct_call(old.opcode);

        let mut operands = Vec::with_capacity(old.operands.len());
        operands.push(MachineOperand::Global(GlobalValueRef::Function(callee)));
        operands.extend_from_slice(&old.operands[1..]);

        mf.insert_before(call, MachineInst::new(opcode, operands));
        mf.erase(call);
        // The POT-base load feeding the torn-down pseudo may now be
        // dead; dead-machine-instruction elimination runs after this
        // pass and picks it up.
    }
}

fn to_direct_call(opcode: Aarch64Opcode) -> Aarch64Opcode {
    assert!(
        opcode == Aarch64Opcode::Blr,
        "unhandled call opcode: {opcode:?}"
    );
    Aarch64Opcode::Bl
}
