//! Builder API for constructing function bodies.

use crate::function::{Block, Function};
use crate::instruction::{BinOpKind, CallConv, Inst, Op};
use crate::types::Type;
use crate::value::{BlockId, InstId, Value};

/// Builder for appending instructions to a function.
pub struct Builder<'a> {
    func: &'a mut Function,
    current_block: Option<BlockId>,
}

impl<'a> Builder<'a> {
    pub fn new(func: &'a mut Function) -> Self {
        Self {
            func,
            current_block: None,
        }
    }

    /// Create a new basic block and return its reference.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.func.blocks.len() as u32);
        self.func.blocks.push(Block::default());
        id
    }

    /// Set the block subsequent instructions are appended to.
    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = Some(block);
    }

    fn push(&mut self, op: Op) -> InstId {
        let block = self.current_block.expect("no active block");
        let id = InstId(self.func.insts.len() as u32);
        self.func.insts.push(Inst { op });
        self.func.blocks[block.0 as usize].insts.push(id);
        id
    }

    pub fn alloca(&mut self, ty: Type) -> Value {
        Value::Inst(self.push(Op::Alloca(ty)))
    }

    pub fn load(&mut self, ptr: Value) -> Value {
        Value::Inst(self.push(Op::Load(ptr)))
    }

    pub fn store(&mut self, value: Value, ptr: Value) {
        self.push(Op::Store { value, ptr });
    }

    pub fn call(&mut self, callee: Value, args: Vec<Value>, conv: CallConv) -> Value {
        Value::Inst(self.push(Op::Call { callee, args, conv }))
    }

    pub fn binop(&mut self, kind: BinOpKind, a: Value, b: Value) -> Value {
        Value::Inst(self.push(Op::BinOp(kind, a, b)))
    }

    pub fn ret(&mut self, value: Option<Value>) {
        self.push(Op::Ret(value));
    }

    pub fn br(&mut self, target: BlockId) {
        self.push(Op::Br(target));
    }

    pub fn cond_br(&mut self, cond: Value, then_bb: BlockId, else_bb: BlockId) {
        self.push(Op::CondBr {
            cond,
            then_bb,
            else_bb,
        });
    }

    pub fn va_start(&mut self, list: Value) {
        self.push(Op::VaStart(list));
    }

    pub fn va_end(&mut self, list: Value) {
        self.push(Op::VaEnd(list));
    }

    pub fn va_copy(&mut self, dst: Value, src: Value) {
        self.push(Op::VaCopy { dst, src });
    }

    pub fn trap(&mut self) {
        self.push(Op::Trap);
    }

    pub fn unreachable(&mut self) {
        self.push(Op::Unreachable);
    }

    pub fn dbg_marker(&mut self) {
        self.push(Op::DbgMarker);
    }
}
