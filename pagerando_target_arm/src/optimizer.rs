//! Intra-bin optimizer hooks for ARM.
//!
//! Candidates are constant-pool loads whose entry carries a POTOFF or
//! BINOFF modifier and references a same-bin function. Most indirect
//! calls become direct `bl`/`tbl`; BX-sequence calls have no direct form
//! and instead get their register operand fed by a PC-relative
//! materialization of the callee.

use pagerando_ir::module::Module;
use pagerando_ir::value::{FuncId, GlobalValueRef};
use pagerando_mir::pool::{CpEntry, CpModifier};
use pagerando_mir::{MachineFunction, MachineInst, MachineOperand, MirId, Pred};
use pagerando_optimizer::{Candidates, IntraBinTarget};
use rustc_hash::FxHashSet;

use crate::inst::{ArmOpcode, ArmTarget};

fn is_intra_bin(entry: &CpEntry, module: &Module, bin_prefix: &str) -> bool {
    if !matches!(entry.modifier, CpModifier::PotOff | CpModifier::BinOff) {
        return false;
    }
    match entry.value.as_function() {
        Some(f) => module.func(f).section_prefix.as_deref() == Some(bin_prefix),
        None => false,
    }
}

fn callee_of(entry: &CpEntry) -> FuncId {
    entry
        .value
        .as_function()
        .expect("intra-bin constant-pool entry without function")
}

/// The constant-pool index a load reads, if this is a CP load.
fn cp_load_index(inst: &MachineInst<ArmTarget>) -> Option<u32> {
    if !matches!(inst.opcode, ArmOpcode::Ldrcp | ArmOpcode::T2Ldrpci) {
        return None;
    }
    match inst.operands.get(1) {
        Some(MachineOperand::CpIndex(index)) => Some(*index),
        _ => None,
    }
}

impl IntraBinTarget for ArmTarget {
    fn find_candidates(
        mf: &MachineFunction<Self>,
        module: &Module,
        bin_prefix: &str,
    ) -> Candidates {
        let mut candidates = Candidates::default();
        let mut indices = FxHashSet::default();

        for (index, entry) in mf.pool.entries().iter().enumerate() {
            if is_intra_bin(entry, module, bin_prefix) {
                indices.insert(index as u32);
                candidates.dead_cp.push(index as u32);
            }
        }
        if indices.is_empty() {
            return candidates;
        }

        for (id, inst) in mf.iter_insts() {
            if let Some(index) = cp_load_index(inst) {
                if indices.contains(&index) {
                    candidates.sites.push((id, callee_of(mf.pool.entry(index))));
                }
            }
        }
        candidates
    }

    fn rewrite_call(mf: &mut MachineFunction<Self>, call: MirId, callee: FuncId) {
        match mf.inst(call).opcode {
            ArmOpcode::BxCall | ArmOpcode::TBxCall => {
                replace_with_pc_relative_call(mf, call, callee)
            }
            _ => replace_with_direct_call(mf, call, callee),
        }
    }

    fn cleanup(mf: &mut MachineFunction<Self>, dead_cp: &[u32]) {
        delete_cp_entries(mf, dead_cp);
    }
}

fn to_direct_call(opcode: ArmOpcode) -> ArmOpcode {
    match opcode {
        ArmOpcode::TcReturnRi => ArmOpcode::TcReturnDi,
        ArmOpcode::Blx => ArmOpcode::Bl,
        ArmOpcode::TBlxr => ArmOpcode::TBl,
        _ => panic!("unhandled call opcode: {opcode:?}"),
    }
}

fn replace_with_direct_call(mf: &mut MachineFunction<ArmTarget>, call: MirId, callee: FuncId) {
    let old = mf.inst(call).clone();
    let opcode = to_direct_call(old.opcode);

    let mut operands = Vec::with_capacity(old.operands.len() + 1);
    // The register operand goes away.
    let mut skip = 1;
    if old.opcode == ArmOpcode::TBlxr {
        // The short encoding predicates the link; re-emit it ahead of the
        // callee and skip the old one.
        operands.push(MachineOperand::Pred(Pred::Al));
        skip += 1;
    }
    operands.push(MachineOperand::Global(GlobalValueRef::Function(callee)));
    operands.extend_from_slice(&old.operands[skip..]);

    mf.insert_before(call, MachineInst::new(opcode, operands));
    mf.erase(call);
}

/// BX-sequence calls keep their register operand; feed it with a
/// PC-relative materialization of the callee through a fresh
/// constant-pool entry.
fn replace_with_pc_relative_call(mf: &mut MachineFunction<ArmTarget>, call: MirId, callee: FuncId) {
    let thumb = mf.info.thumb;
    let label = mf.info.create_pic_label();

    let mut entry = CpEntry::new(GlobalValueRef::Function(callee), CpModifier::None);
    entry.pic_label = Some(label);
    entry.pc_adjust = if thumb { 4 } else { 8 };
    let index = mf.pool.push(entry);

    // Load the callee offset.
    let offset_reg = mf.new_vreg();
    let load_opcode = if mf.info.thumb2 {
        ArmOpcode::T2Ldrpci
    } else {
        ArmOpcode::Ldrcp
    };
    let mut operands = vec![
        MachineOperand::Def(offset_reg),
        MachineOperand::CpIndex(index),
    ];
    if load_opcode == ArmOpcode::Ldrcp {
        operands.push(MachineOperand::Imm(0));
    }
    operands.push(MachineOperand::Pred(Pred::Al));
    mf.insert_before(call, MachineInst::new(load_opcode, operands));

    // Add the PC to form the callee address.
    let address_reg = mf.new_vreg();
    let add_opcode = if thumb {
        ArmOpcode::TPicAdd
    } else {
        ArmOpcode::PicAdd
    };
    let mut operands = vec![
        MachineOperand::Def(address_reg),
        MachineOperand::Use(offset_reg),
        MachineOperand::PicLabel(label),
    ];
    if !thumb {
        operands.push(MachineOperand::Pred(Pred::Al));
    }
    mf.insert_before(call, MachineInst::new(add_opcode, operands));

    // Swap the call's register operand; the call itself stays.
    let reg = mf
        .inst_mut(call)
        .operands
        .iter_mut()
        .find(|op| matches!(op, MachineOperand::Use(_)))
        .expect("BX call without register operand");
    *reg = MachineOperand::Use(address_reg);
}

/// Erase the now-dead constant-pool entries and renumber the survivors.
fn delete_cp_entries(mf: &mut MachineFunction<ArmTarget>, dead_cp: &[u32]) {
    if dead_cp.is_empty() {
        return;
    }
    let size = mf.pool.len();

    // Old -> new mapping closing the gaps; -1 marks a dead entry.
    let mut mapping = vec![0i32; size];
    let mut next = 0i32;
    for (old, slot) in mapping.iter_mut().enumerate() {
        if dead_cp.contains(&(old as u32)) {
            *slot = -1;
        } else {
            *slot = next;
            next += 1;
        }
    }

    // Remap surviving (inter-bin) constant-pool references.
    let ids: Vec<MirId> = mf.iter_insts().map(|(id, _)| id).collect();
    for id in ids {
        for op in &mut mf.inst_mut(id).operands {
            if let MachineOperand::CpIndex(index) = op {
                let new = mapping[*index as usize];
                assert!(new != -1, "CP entry use should have been deleted");
                *index = new as u32;
            }
        }
    }

    // Erase in reverse order so earlier erasures do not shift the
    // indices of later ones.
    for old in (0..size).rev() {
        if mapping[old] == -1 {
            mf.pool.erase_index(old);
        }
    }
}
