//! Unit tests for the AArch64 intra-bin rewrite.

use pagerando_ir::builder::Builder;
use pagerando_ir::function::{Attr, Function, Linkage};
use pagerando_ir::module::Module;
use pagerando_ir::types::Signature;
use pagerando_ir::value::{FuncId, GlobalValueRef};
use pagerando_mir::{MachineFunction, MachineInst, MachineOperand, VReg};
use pagerando_optimizer::optimize_function;

use crate::inst::{Aarch64Opcode, Aarch64Target};

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

/// POT load, bin-addressing pseudo, indirect call; returns the POT base
/// register.
fn bin_call_chain(mf: &mut MachineFunction<Aarch64Target>, callee: FuncId) -> VReg {
    let pot_base = mf.new_vreg();
    let addr = mf.new_vreg();
    mf.push_inst(
        0,
        MachineInst::new(
            Aarch64Opcode::LoadPot,
            vec![MachineOperand::Def(pot_base)],
        ),
    );
    mf.push_inst(
        0,
        MachineInst::new(
            Aarch64Opcode::MovAddrBin,
            vec![
                MachineOperand::Def(addr),
                MachineOperand::Use(pot_base),
                MachineOperand::Global(GlobalValueRef::Function(callee)),
            ],
        ),
    );
    mf.push_inst(
        0,
        MachineInst::new(
            Aarch64Opcode::Blr,
            vec![MachineOperand::Use(addr), MachineOperand::RegMask],
        ),
    );
    pot_base
}

#[test]
fn movaddrbin_chain_becomes_bl() {
    let mut module = Module::new("m");
    let caller = binned_pagerando(&mut module, "caller", ".bin_1");
    let callee = binned_pagerando(&mut module, "callee", ".bin_1");

    let mut mf: MachineFunction<Aarch64Target> = MachineFunction::new(caller);
    bin_call_chain(&mut mf, callee);

    assert!(optimize_function(&module, &mut mf, false));

    // The POT-base load stays for the host's dead-instruction
    // elimination; the pseudo and the indirect call are gone.
    let insts: Vec<_> = mf.iter_insts().map(|(_, i)| i.clone()).collect();
    assert_eq!(insts.len(), 2);
    assert_eq!(insts[0].opcode, Aarch64Opcode::LoadPot);
    assert_eq!(insts[1].opcode, Aarch64Opcode::Bl);
    assert_eq!(
        insts[1].operands,
        vec![
            MachineOperand::Global(GlobalValueRef::Function(callee)),
            MachineOperand::RegMask,
        ]
    );
}

#[test]
fn cross_bin_pseudo_is_kept() {
    let mut module = Module::new("m");
    let caller = binned_pagerando(&mut module, "caller", ".bin_1");
    let callee = binned_pagerando(&mut module, "callee", ".bin_2");

    let mut mf: MachineFunction<Aarch64Target> = MachineFunction::new(caller);
    bin_call_chain(&mut mf, callee);

    assert!(!optimize_function(&module, &mut mf, false));
    assert_eq!(mf.iter_insts().count(), 3);
}

#[test]
#[should_panic(expected = "unhandled call opcode")]
fn non_blr_call_in_chain_is_a_bug() {
    let mut module = Module::new("m");
    let caller = binned_pagerando(&mut module, "caller", ".bin_1");
    let callee = binned_pagerando(&mut module, "callee", ".bin_1");

    let mut mf: MachineFunction<Aarch64Target> = MachineFunction::new(caller);
    let addr = mf.new_vreg();
    let pot_base = mf.new_vreg();
    mf.push_inst(
        0,
        MachineInst::new(
            Aarch64Opcode::MovAddrBin,
            vec![
                MachineOperand::Def(addr),
                MachineOperand::Use(pot_base),
                MachineOperand::Global(GlobalValueRef::Function(callee)),
            ],
        ),
    );
    mf.push_inst(
        0,
        MachineInst::new(Aarch64Opcode::Bl, vec![MachineOperand::Use(addr)]),
    );

    optimize_function(&module, &mut mf, false);
}
