//! AArch64 machine instruction definitions.

use pagerando_mir::{MachineInst, MachineTarget};

/// The AArch64 opcode subset the pagerando passes care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aarch64Opcode {
    /// Pseudo: load the page-offset table base.
    LoadPot,
    /// Pseudo: materialize a binned callee's address from the POT base
    /// and the callee's bin offset.
    MovAddrBin,
    /// Indirect call through a register.
    Blr,
    /// Direct call.
    Bl,
    Add,
    Mov,
    Ret,
}

/// The AArch64 target. Fixed-width encoding: every instruction is four
/// bytes.
pub struct Aarch64Target;

impl MachineTarget for Aarch64Target {
    type Opcode = Aarch64Opcode;
    type Info = ();

    fn is_call(opcode: Aarch64Opcode) -> bool {
        matches!(opcode, Aarch64Opcode::Blr | Aarch64Opcode::Bl)
    }

    fn inst_size_in_bytes(_inst: &MachineInst<Self>) -> u32 {
        4
    }
}
