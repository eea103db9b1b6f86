//! Unit tests for the ARM intra-bin rewrites and constant-pool cleanup.

use pagerando_ir::builder::Builder;
use pagerando_ir::function::{Attr, Function, Linkage};
use pagerando_ir::module::Module;
use pagerando_ir::types::Signature;
use pagerando_ir::value::{FuncId, GlobalValueRef};
use pagerando_mir::pool::{CpEntry, CpModifier};
use pagerando_mir::{MachineFunction, MachineInst, MachineOperand, Pred, VReg};
use pagerando_optimizer::optimize_function;

use crate::inst::{ArmFunctionInfo, ArmOpcode, ArmTarget};

fn binned_pagerando(module: &mut Module, name: &str, bin: &str) -> FuncId {
    let mut f = Function::new(name, Signature::new(vec![], None), Linkage::Internal);
    f.attrs.add(Attr::Pagerando);
    f.section_prefix = Some(bin.into());
    let mut b = Builder::new(&mut f);
    let entry = b.create_block();
    b.switch_to_block(entry);
    b.ret(None);
    module.add_function(f)
}

fn pot_entry(callee: FuncId) -> CpEntry {
    CpEntry::new(GlobalValueRef::Function(callee), CpModifier::PotOff)
}

/// Constant-pool load of `index` into a fresh register.
fn cp_load(mf: &mut MachineFunction<ArmTarget>, index: u32) -> VReg {
    let reg = mf.new_vreg();
    mf.push_inst(
        0,
        MachineInst::new(
            ArmOpcode::Ldrcp,
            vec![
                MachineOperand::Def(reg),
                MachineOperand::CpIndex(index),
                MachineOperand::Imm(0),
                MachineOperand::Pred(Pred::Al),
            ],
        ),
    );
    reg
}

/// POT dereference: load the bin base using the offset in `offset`.
fn pot_deref(mf: &mut MachineFunction<ArmTarget>, offset: VReg) -> VReg {
    let reg = mf.new_vreg();
    mf.push_inst(
        0,
        MachineInst::new(
            ArmOpcode::Ldr,
            vec![MachineOperand::Def(reg), MachineOperand::Use(offset)],
        ),
    );
    reg
}

#[test]
fn blx_chain_becomes_bl() {
    let mut module = Module::new("m");
    let caller = binned_pagerando(&mut module, "caller", ".bin_1");
    let callee = binned_pagerando(&mut module, "callee", ".bin_1");

    let mut mf: MachineFunction<ArmTarget> = MachineFunction::new(caller);
    mf.pool.push(pot_entry(callee));
    let offset = cp_load(&mut mf, 0);
    let addr = pot_deref(&mut mf, offset);
    mf.push_inst(
        0,
        MachineInst::new(
            ArmOpcode::Blx,
            vec![MachineOperand::Use(addr), MachineOperand::RegMask],
        ),
    );

    assert!(optimize_function(&module, &mut mf, false));

    let insts: Vec<_> = mf.iter_insts().map(|(_, i)| i.clone()).collect();
    assert_eq!(insts.len(), 1);
    assert_eq!(insts[0].opcode, ArmOpcode::Bl);
    assert_eq!(
        insts[0].operands,
        vec![
            MachineOperand::Global(GlobalValueRef::Function(callee)),
            MachineOperand::RegMask,
        ]
    );
    assert!(mf.pool.is_empty());
}

#[test]
fn thumb_blx_reemits_predicate() {
    let mut module = Module::new("m");
    let caller = binned_pagerando(&mut module, "caller", ".bin_1");
    let callee = binned_pagerando(&mut module, "callee", ".bin_1");

    let mut mf: MachineFunction<ArmTarget> = MachineFunction::new(caller);
    mf.info = ArmFunctionInfo::thumb2();
    mf.pool.push(pot_entry(callee));
    let offset = cp_load(&mut mf, 0);
    let addr = pot_deref(&mut mf, offset);
    mf.push_inst(
        0,
        MachineInst::new(
            ArmOpcode::TBlxr,
            vec![
                MachineOperand::Pred(Pred::Al),
                MachineOperand::Use(addr),
                MachineOperand::RegMask,
            ],
        ),
    );

    optimize_function(&module, &mut mf, false);

    let insts: Vec<_> = mf.iter_insts().map(|(_, i)| i.clone()).collect();
    assert_eq!(insts.len(), 1);
    assert_eq!(insts[0].opcode, ArmOpcode::TBl);
    assert_eq!(
        insts[0].operands,
        vec![
            MachineOperand::Pred(Pred::Al),
            MachineOperand::Global(GlobalValueRef::Function(callee)),
            MachineOperand::RegMask,
        ]
    );
}

#[test]
fn indirect_tail_call_becomes_direct() {
    let mut module = Module::new("m");
    let caller = binned_pagerando(&mut module, "caller", ".bin_1");
    let callee = binned_pagerando(&mut module, "callee", ".bin_1");

    let mut mf: MachineFunction<ArmTarget> = MachineFunction::new(caller);
    mf.pool.push(pot_entry(callee));
    let offset = cp_load(&mut mf, 0);
    let addr = pot_deref(&mut mf, offset);
    mf.push_inst(
        0,
        MachineInst::new(ArmOpcode::TcReturnRi, vec![MachineOperand::Use(addr)]),
    );

    optimize_function(&module, &mut mf, false);
    let insts: Vec<_> = mf.iter_insts().map(|(_, i)| i.opcode).collect();
    assert_eq!(insts, vec![ArmOpcode::TcReturnDi]);
}

#[test]
fn bx_call_gets_pc_relative_materialization() {
    let mut module = Module::new("m");
    let caller = binned_pagerando(&mut module, "caller", ".bin_1");
    let callee = binned_pagerando(&mut module, "callee", ".bin_1");

    let mut mf: MachineFunction<ArmTarget> = MachineFunction::new(caller);
    mf.info = ArmFunctionInfo::thumb2();
    mf.pool.push(pot_entry(callee));
    let offset = cp_load(&mut mf, 0);
    let addr = pot_deref(&mut mf, offset);
    let call = mf.push_inst(
        0,
        MachineInst::new(
            ArmOpcode::TBxCall,
            vec![MachineOperand::Use(addr), MachineOperand::RegMask],
        ),
    );

    optimize_function(&module, &mut mf, false);

    // The call survives; its address now comes from a PC-relative pair.
    let opcodes: Vec<_> = mf.iter_insts().map(|(_, i)| i.opcode).collect();
    assert_eq!(
        opcodes,
        vec![ArmOpcode::T2Ldrpci, ArmOpcode::TPicAdd, ArmOpcode::TBxCall]
    );

    // One fresh unmodified entry replaced the POT-modified one.
    assert_eq!(mf.pool.len(), 1);
    let entry = mf.pool.entry(0);
    assert_eq!(entry.modifier, CpModifier::None);
    assert_eq!(entry.value, GlobalValueRef::Function(callee));
    assert!(entry.pic_label.is_some());
    assert_eq!(entry.pc_adjust, 4);

    // The load was renumbered onto the fresh entry, and the call's
    // register operand points at the PIC add result.
    let load = mf.iter_insts().next().unwrap().1;
    assert!(load.operands.contains(&MachineOperand::CpIndex(0)));
    let add_def = match mf
        .iter_insts()
        .nth(1)
        .unwrap()
        .1
        .operands
        .first()
        .unwrap()
    {
        MachineOperand::Def(r) => *r,
        other => panic!("unexpected operand {other:?}"),
    };
    assert!(mf.inst(call).reads(add_def));
}

#[test]
fn surviving_cp_uses_are_renumbered() {
    let mut module = Module::new("m");
    let caller = binned_pagerando(&mut module, "caller", ".bin_1");
    let near = binned_pagerando(&mut module, "near", ".bin_1");
    let far = binned_pagerando(&mut module, "far", ".bin_2");

    let mut mf: MachineFunction<ArmTarget> = MachineFunction::new(caller);
    // Entry 0: intra-bin (dead after rewrite). Entry 1: cross-bin
    // (survives and must slide down to index 0).
    mf.pool.push(pot_entry(near));
    mf.pool.push(pot_entry(far));

    let near_offset = cp_load(&mut mf, 0);
    let near_addr = pot_deref(&mut mf, near_offset);
    mf.push_inst(
        0,
        MachineInst::new(ArmOpcode::Blx, vec![MachineOperand::Use(near_addr)]),
    );

    let far_offset = cp_load(&mut mf, 1);
    let far_addr = pot_deref(&mut mf, far_offset);
    mf.push_inst(
        0,
        MachineInst::new(ArmOpcode::Blx, vec![MachineOperand::Use(far_addr)]),
    );

    optimize_function(&module, &mut mf, false);

    // The cross-bin chain is untouched except for the renumbered index.
    let opcodes: Vec<_> = mf.iter_insts().map(|(_, i)| i.opcode).collect();
    assert_eq!(
        opcodes,
        vec![
            ArmOpcode::Bl,
            ArmOpcode::Ldrcp,
            ArmOpcode::Ldr,
            ArmOpcode::Blx
        ]
    );
    assert_eq!(mf.pool.len(), 1);
    assert_eq!(mf.pool.entry(0).value, GlobalValueRef::Function(far));
    let cp_uses: Vec<u32> = mf
        .iter_insts()
        .flat_map(|(_, i)| i.operands.iter())
        .filter_map(|op| match op {
            MachineOperand::CpIndex(i) => Some(*i),
            _ => None,
        })
        .collect();
    assert_eq!(cp_uses, vec![0]);
}

#[test]
#[should_panic(expected = "unhandled call opcode")]
fn direct_call_in_chain_is_a_bug() {
    let mut module = Module::new("m");
    let caller = binned_pagerando(&mut module, "caller", ".bin_1");
    let callee = binned_pagerando(&mut module, "callee", ".bin_1");

    let mut mf: MachineFunction<ArmTarget> = MachineFunction::new(caller);
    mf.pool.push(pot_entry(callee));
    let offset = cp_load(&mut mf, 0);
    // A Bl consuming the offset register cannot be made "more direct".
    mf.push_inst(
        0,
        MachineInst::new(ArmOpcode::Bl, vec![MachineOperand::Use(offset)]),
    );

    optimize_function(&module, &mut mf, false);
}
