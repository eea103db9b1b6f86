//! Function size estimation.

use crate::{MachineFunction, MachineTarget};

/// Minimum size a function occupies in a bin ("bx lr" on Thumb).
///
/// Also the smallest residual free space worth keeping in the packer.
pub const MIN_FN_SIZE: u32 = 2;

/// Estimate a lowered function's size as the sum of its instruction
/// sizes, floored at [`MIN_FN_SIZE`] so trivially empty functions still
/// occupy a packing unit. Accuracy improves the later this runs.
pub fn estimate_function_size<T: MachineTarget>(mf: &MachineFunction<T>) -> u32 {
    let size: u32 = mf
        .iter_insts()
        .map(|(_, inst)| T::inst_size_in_bytes(inst))
        .sum();
    size.max(MIN_FN_SIZE)
}
