//! Instruction definitions for the pagerando IR.

use smallvec::SmallVec;

use crate::types::Type;
use crate::value::{BlockId, Value};

/// Calling convention of a function or call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallConv {
    #[default]
    C,
    Fast,
    Cold,
}

/// Token arithmetic, enough to give test bodies some substance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
}

/// An instruction.
#[derive(Debug, Clone)]
pub struct Inst {
    pub op: Op,
}

/// Instruction opcodes.
#[derive(Debug, Clone)]
pub enum Op {
    /// Allocate a stack slot of the given type, returns a pointer.
    Alloca(Type),
    /// Load from a pointer.
    Load(Value),
    /// Store `value` to `ptr`.
    Store { value: Value, ptr: Value },
    /// Call `callee` with arguments.
    Call {
        callee: Value,
        args: Vec<Value>,
        conv: CallConv,
    },
    BinOp(BinOpKind, Value, Value),
    /// Return from the function.
    Ret(Option<Value>),
    /// Unconditional branch.
    Br(BlockId),
    /// Conditional branch.
    CondBr {
        cond: Value,
        then_bb: BlockId,
        else_bb: BlockId,
    },
    /// Begin variadic iteration over the `va_list` at the pointer.
    VaStart(Value),
    /// End variadic iteration.
    VaEnd(Value),
    /// Copy variadic iteration state from `src` to `dst`.
    VaCopy { dst: Value, src: Value },
    /// Abort execution.
    Trap,
    Unreachable,
    /// Stand-in for debug-info intrinsics; carries no semantics.
    DbgMarker,
}

impl Op {
    /// All value operands, in operand order. The callee of a call is
    /// operand 0.
    pub fn values(&self) -> SmallVec<[&Value; 4]> {
        let mut out = SmallVec::new();
        match self {
            Op::Load(v) | Op::VaStart(v) | Op::VaEnd(v) => out.push(v),
            Op::Store { value, ptr } => {
                out.push(value);
                out.push(ptr);
            }
            Op::Call { callee, args, .. } => {
                out.push(callee);
                out.extend(args.iter());
            }
            Op::BinOp(_, a, b) => {
                out.push(a);
                out.push(b);
            }
            Op::Ret(Some(v)) | Op::CondBr { cond: v, .. } => out.push(v),
            Op::VaCopy { dst, src } => {
                out.push(dst);
                out.push(src);
            }
            Op::Alloca(_)
            | Op::Ret(None)
            | Op::Br(_)
            | Op::Trap
            | Op::Unreachable
            | Op::DbgMarker => {}
        }
        out
    }

    /// Mutable view of all value operands, in operand order.
    pub fn values_mut(&mut self) -> SmallVec<[&mut Value; 4]> {
        let mut out = SmallVec::new();
        match self {
            Op::Load(v) | Op::VaStart(v) | Op::VaEnd(v) => out.push(v),
            Op::Store { value, ptr } => {
                out.push(value);
                out.push(ptr);
            }
            Op::Call { callee, args, .. } => {
                out.push(callee);
                out.extend(args.iter_mut());
            }
            Op::BinOp(_, a, b) => {
                out.push(a);
                out.push(b);
            }
            Op::Ret(Some(v)) | Op::CondBr { cond: v, .. } => out.push(v),
            Op::VaCopy { dst, src } => {
                out.push(dst);
                out.push(src);
            }
            Op::Alloca(_)
            | Op::Ret(None)
            | Op::Br(_)
            | Op::Trap
            | Op::Unreachable
            | Op::DbgMarker => {}
        }
        out
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Op::Call { .. })
    }
}
