//! ARM/Thumb machine instruction definitions.

use pagerando_mir::{MachineInst, MachineTarget};

/// The ARM opcode subset the pagerando passes care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOpcode {
    /// Constant-pool load, ARM encoding.
    Ldrcp,
    /// Constant-pool load, Thumb2 encoding.
    T2Ldrpci,
    /// Register-offset load.
    Ldr,
    Add,
    Mov,
    /// PC-relative add pairing with a constant-pool label.
    PicAdd,
    /// Thumb PC-relative add.
    TPicAdd,
    /// Indirect call through a register.
    Blx,
    /// Thumb indirect call (short, predicated encoding).
    TBlxr,
    /// Indirect call lowered through a BX sequence; has no direct form.
    BxCall,
    /// Thumb BX-sequence call.
    TBxCall,
    /// Direct call.
    Bl,
    /// Thumb direct call.
    TBl,
    /// Indirect tail call.
    TcReturnRi,
    /// Direct tail call.
    TcReturnDi,
    /// Return.
    Bx,
}

/// Per-function ARM state: instruction-set mode and the PIC label
/// counter for PC-relative constant-pool entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArmFunctionInfo {
    pub thumb: bool,
    pub thumb2: bool,
    pic_label_count: u32,
}

impl ArmFunctionInfo {
    pub fn thumb2() -> Self {
        Self {
            thumb: true,
            thumb2: true,
            pic_label_count: 0,
        }
    }

    /// A fresh PIC label id, unique within the function.
    pub fn create_pic_label(&mut self) -> u32 {
        let label = self.pic_label_count;
        self.pic_label_count += 1;
        label
    }
}

/// The ARM target.
pub struct ArmTarget;

impl MachineTarget for ArmTarget {
    type Opcode = ArmOpcode;
    type Info = ArmFunctionInfo;

    fn is_call(opcode: ArmOpcode) -> bool {
        matches!(
            opcode,
            ArmOpcode::Blx
                | ArmOpcode::TBlxr
                | ArmOpcode::BxCall
                | ArmOpcode::TBxCall
                | ArmOpcode::Bl
                | ArmOpcode::TBl
                | ArmOpcode::TcReturnRi
                | ArmOpcode::TcReturnDi
        )
    }

    fn inst_size_in_bytes(inst: &MachineInst<Self>) -> u32 {
        match inst.opcode {
            // Narrow Thumb encodings.
            ArmOpcode::TBlxr | ArmOpcode::TPicAdd => 2,
            // BX call pseudos expand to a mov/bx pair.
            ArmOpcode::BxCall | ArmOpcode::TBxCall => 8,
            _ => 4,
        }
    }
}
