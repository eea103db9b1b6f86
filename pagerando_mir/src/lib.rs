//! pagerando_mir: machine-level IR contracts for the pagerando passes.
//!
//! Provides the machine-function container the binning and intra-bin
//! optimizer passes operate on, generic over a target. Targets supply an
//! opcode type, per-function info, call classification, and instruction
//! sizes through the [`MachineTarget`] trait.

pub mod pool;
pub mod size;

use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use pagerando_ir::value::{FuncId, GlobalValueRef};

use crate::pool::ConstantPool;


/// A virtual register in SSA machine IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VReg(pub u32);

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A physical register, target-agnostic representation. The field holds
/// the hardware encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PReg(pub u8);

/// Reference to a machine instruction in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MirId(pub u32);

/// Condition predicate operand. Only the always-true form matters to the
/// passes; targets re-emit it when rewriting short-form calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pred {
    Al,
}

/// A machine instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum MachineOperand {
    /// Virtual register defined by this instruction.
    Def(VReg),
    /// Virtual register read by this instruction.
    Use(VReg),
    /// Physical register (e.g. implicit argument registers of a call).
    Reg(PReg),
    /// Address of a module-level value.
    Global(GlobalValueRef),
    /// Index into the function's constant pool.
    CpIndex(u32),
    Imm(i64),
    /// PC-relative label id pairing an instruction with a constant-pool
    /// entry.
    PicLabel(u32),
    Pred(Pred),
    /// Clobber mask of a call.
    RegMask,
}

/// Target integration for the machine layer.
pub trait MachineTarget: Sized {
    /// Target opcode type.
    type Opcode: Copy + Eq + fmt::Debug;
    /// Per-function target info (e.g. instruction-set mode flags).
    type Info: Default;

    /// Whether the opcode is a call.
    fn is_call(opcode: Self::Opcode) -> bool;

    /// Byte size of an instruction, for function-size estimation.
    fn inst_size_in_bytes(inst: &MachineInst<Self>) -> u32;
}

/// A machine instruction.
pub struct MachineInst<T: MachineTarget> {
    pub opcode: T::Opcode,
    pub operands: Vec<MachineOperand>,
}

// Manual impls: deriving would demand `T: Clone + Debug` although only
// the opcode is stored.
impl<T: MachineTarget> Clone for MachineInst<T> {
    fn clone(&self) -> Self {
        Self {
            opcode: self.opcode,
            operands: self.operands.clone(),
        }
    }
}

impl<T: MachineTarget> fmt::Debug for MachineInst<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineInst")
            .field("opcode", &self.opcode)
            .field("operands", &self.operands)
            .finish()
    }
}

impl<T: MachineTarget> MachineInst<T> {
    pub fn new(opcode: T::Opcode, operands: Vec<MachineOperand>) -> Self {
        Self { opcode, operands }
    }

    pub fn is_call(&self) -> bool {
        T::is_call(self.opcode)
    }

    /// Registers defined by this instruction.
    pub fn defs(&self) -> SmallVec<[VReg; 2]> {
        self.operands
            .iter()
            .filter_map(|op| match op {
                MachineOperand::Def(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    /// Whether this instruction reads `reg`.
    pub fn reads(&self, reg: VReg) -> bool {
        self.operands
            .iter()
            .any(|op| matches!(op, MachineOperand::Use(r) if *r == reg))
    }
}

/// A machine basic block: an ordered list of instruction ids.
#[derive(Debug, Clone, Default)]
pub struct MachineBlock {
    pub insts: Vec<MirId>,
}

/// A lowered function in SSA form, pre register allocation.
pub struct MachineFunction<T: MachineTarget> {
    /// The IR function this was lowered from.
    pub func: FuncId,
    insts: Vec<Option<MachineInst<T>>>,
    pub blocks: Vec<MachineBlock>,
    pub pool: ConstantPool,
    pub info: T::Info,
    next_vreg: u32,
}

impl<T: MachineTarget> MachineFunction<T> {
    pub fn new(func: FuncId) -> Self {
        Self {
            func,
            insts: Vec::new(),
            blocks: vec![MachineBlock::default()],
            pool: ConstantPool::default(),
            info: T::Info::default(),
            next_vreg: 0,
        }
    }

    pub fn new_vreg(&mut self) -> VReg {
        let r = VReg(self.next_vreg);
        self.next_vreg += 1;
        r
    }

    /// Append an instruction to a block.
    pub fn push_inst(&mut self, block: usize, inst: MachineInst<T>) -> MirId {
        let id = MirId(self.insts.len() as u32);
        self.insts.push(Some(inst));
        self.blocks[block].insts.push(id);
        id
    }

    /// Insert an instruction immediately before `before`.
    pub fn insert_before(&mut self, before: MirId, inst: MachineInst<T>) -> MirId {
        let id = MirId(self.insts.len() as u32);
        self.insts.push(Some(inst));
        for block in &mut self.blocks {
            if let Some(pos) = block.insts.iter().position(|&i| i == before) {
                block.insts.insert(pos, id);
                return id;
            }
        }
        panic!("insert_before: anchor instruction not found");
    }

    /// Erase an instruction: removed from its block, arena slot
    /// tombstoned.
    pub fn erase(&mut self, id: MirId) {
        for block in &mut self.blocks {
            if let Some(pos) = block.insts.iter().position(|&i| i == id) {
                block.insts.remove(pos);
                break;
            }
        }
        self.insts[id.0 as usize] = None;
    }

    pub fn is_erased(&self, id: MirId) -> bool {
        self.insts[id.0 as usize].is_none()
    }

    pub fn inst(&self, id: MirId) -> &MachineInst<T> {
        self.insts[id.0 as usize]
            .as_ref()
            .expect("use of erased machine instruction")
    }

    pub fn inst_mut(&mut self, id: MirId) -> &mut MachineInst<T> {
        self.insts[id.0 as usize]
            .as_mut()
            .expect("use of erased machine instruction")
    }

    /// Iterate live instructions in block order.
    pub fn iter_insts(&self) -> impl Iterator<Item = (MirId, &MachineInst<T>)> + '_ {
        self.blocks
            .iter()
            .flat_map(|b| b.insts.iter().copied())
            .map(move |id| (id, self.inst(id)))
    }

    /// Instructions reading `reg`, in block order.
    pub fn vreg_users(&self, reg: VReg) -> Vec<MirId> {
        self.iter_insts()
            .filter(|(_, inst)| inst.reads(reg))
            .map(|(id, _)| id)
            .collect()
    }
}

/// Machine functions for a whole module, keyed by IR function id. The
/// binning driver queries this for size estimation.
pub struct MachineModule<T: MachineTarget> {
    funcs: FxHashMap<FuncId, MachineFunction<T>>,
}

impl<T: MachineTarget> Default for MachineModule<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MachineTarget> MachineModule<T> {
    pub fn new() -> Self {
        Self {
            funcs: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, mf: MachineFunction<T>) {
        self.funcs.insert(mf.func, mf);
    }

    pub fn get(&self, func: FuncId) -> Option<&MachineFunction<T>> {
        self.funcs.get(&func)
    }

    pub fn get_mut(&mut self, func: FuncId) -> Option<&mut MachineFunction<T>> {
        self.funcs.get_mut(&func)
    }
}
