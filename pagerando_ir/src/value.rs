//! Opaque handles for IR entities and the operand value model.
//!
//! All references into the IR are u32 indices, not pointers. This enables
//! arena-based storage: functions, globals, and instructions live in
//! contiguous containers owned by `Module`/`Function`.

use crate::types::Type;

/// Reference to a function in the module arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

/// Reference to a global variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(pub u32);

/// Reference to a global alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AliasId(pub u32);

/// Reference to an instruction in a function's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(pub u32);

/// Reference to a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// A reference to a module-level value (function or global variable).
///
/// Shared with the machine layer: constant-pool entries and machine
/// operands reference globals through this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalValueRef {
    Function(FuncId),
    Variable(GlobalId),
}

impl GlobalValueRef {
    /// The referenced function, if this references one.
    pub fn as_function(self) -> Option<FuncId> {
        match self {
            GlobalValueRef::Function(f) => Some(f),
            GlobalValueRef::Variable(_) => None,
        }
    }
}

/// An instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Result of an instruction in the same function.
    Inst(InstId),
    /// Function parameter by index.
    Param(u32),
    /// A constant, possibly referencing module-level entities.
    Const(Const),
}

impl Value {
    pub fn function(f: FuncId) -> Value {
        Value::Const(Const::Function(f))
    }
}

/// A constant value.
///
/// Constants are stored by value (trees), not interned: each occurrence in
/// an operand or initializer is independent.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(i64),
    Null,
    /// Address of a function.
    Function(FuncId),
    /// Address of a global variable.
    Global(GlobalId),
    /// Address of a basic block inside a function.
    BlockAddress(FuncId, BlockId),
    /// Pointer cast of another constant.
    Cast(Box<Const>, Type),
    Array(Vec<Const>),
    Struct(Vec<Const>),
}

impl Const {
    /// The function this constant resolves to when stripped of pointer
    /// casts, if any.
    pub fn as_function_target(&self) -> Option<FuncId> {
        match self {
            Const::Function(f) => Some(*f),
            Const::Cast(inner, _) => inner.as_function_target(),
            _ => None,
        }
    }

    /// Whether this constant takes the address of `f`.
    ///
    /// Block addresses do not count: they reference a position inside the
    /// body and always stay with the body-bearing function.
    pub fn takes_address_of(&self, f: FuncId) -> bool {
        match self {
            Const::Function(g) => *g == f,
            Const::Cast(inner, _) => inner.takes_address_of(f),
            Const::Array(elems) | Const::Struct(elems) => {
                elems.iter().any(|e| e.takes_address_of(f))
            }
            _ => false,
        }
    }

    /// Whether this constant mentions `f` at all, including block addresses.
    pub fn mentions(&self, f: FuncId) -> bool {
        match self {
            Const::Function(g) | Const::BlockAddress(g, _) => *g == f,
            Const::Cast(inner, _) => inner.mentions(f),
            Const::Array(elems) | Const::Struct(elems) => elems.iter().any(|e| e.mentions(f)),
            _ => false,
        }
    }

    /// Replace every address reference to `from` with `to`, leaving block
    /// addresses untouched. Returns true if anything changed.
    pub fn replace_function(&mut self, from: FuncId, to: FuncId) -> bool {
        match self {
            Const::Function(g) if *g == from => {
                *g = to;
                true
            }
            Const::Cast(inner, _) => inner.replace_function(from, to),
            Const::Array(elems) | Const::Struct(elems) => {
                let mut changed = false;
                for e in elems {
                    changed |= e.replace_function(from, to);
                }
                changed
            }
            _ => false,
        }
    }
}
