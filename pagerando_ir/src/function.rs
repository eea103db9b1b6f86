//! Function definitions: linkage, visibility, attributes, and body storage.
//!
//! A function owns its instruction arena; basic blocks hold ordered lists
//! of instruction ids into it. Erasing an instruction removes it from its
//! block but leaves the arena slot behind, so ids stay stable.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::instruction::{CallConv, Inst, Op};
use crate::types::Signature;
use crate::value::{FuncId, InstId, Value};

/// Linkage of a function or global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    /// Not visible outside the compilation unit.
    Internal,
    External,
    /// Definition may be discarded; an external copy exists.
    AvailableExternally,
}

impl Linkage {
    pub fn is_local(self) -> bool {
        matches!(self, Linkage::Internal)
    }
}

/// Symbol visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Default,
    Hidden,
    /// Visible but not preemptible by the dynamic linker.
    Protected,
}

/// Enumerated function attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attr {
    Pagerando,
    Naked,
    NoInline,
    AlwaysInline,
    InlineHint,
    OptimizeForSize,
    OptimizeNone,
    MinSize,
    Alignment,
    StackAlignment,
    AllocSize,
    Cold,
    Convergent,
    NoReturn,
    NoUnwind,
    NoRecurse,
    NoBuiltin,
    Builtin,
    NoDuplicate,
    NoImplicitFloat,
    NoRedZone,
    ReadOnly,
    ReadNone,
    WriteOnly,
    ArgMemOnly,
    InaccessibleMemOnly,
    InaccessibleMemOrArgMemOnly,
    ReturnsTwice,
    SafeStack,
    SanitizeAddress,
    SanitizeHwAddress,
    SanitizeMemory,
    SanitizeThread,
    Speculatable,
    StackProtect,
    StackProtectReq,
    StackProtectStrong,
    StrictFp,
    UwTable,
    NonLazyBind,
    JumpTable,
}

/// Attribute set: enumerated attributes plus free-form string attributes
/// (`"thunk"`, `"no-frame-pointer-elim"`, ...).
#[derive(Debug, Clone, Default)]
pub struct AttrSet {
    enums: FxHashSet<Attr>,
    strings: FxHashMap<String, String>,
}

impl AttrSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, attr: Attr) {
        self.enums.insert(attr);
    }

    pub fn remove(&mut self, attr: Attr) {
        self.enums.remove(&attr);
    }

    pub fn has(&self, attr: Attr) -> bool {
        self.enums.contains(&attr)
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.strings.insert(key.into(), value.into());
    }

    pub fn remove_string(&mut self, key: &str) {
        self.strings.remove(key);
    }

    pub fn has_string(&self, key: &str) -> bool {
        self.strings.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = Attr> + '_ {
        self.enums.iter().copied()
    }

    pub fn iter_strings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.strings.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A basic block: an ordered list of instruction ids.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub insts: Vec<InstId>,
}

/// A function in the pagerando IR.
///
/// A function with no blocks is a declaration.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub sig: Signature,
    pub linkage: Linkage,
    pub visibility: Visibility,
    pub call_conv: CallConv,
    pub attrs: AttrSet,
    /// Comdat group name, if any.
    pub comdat: Option<String>,
    /// Explicitly requested section.
    pub section: Option<String>,
    /// Section prefix; bin assignment stores `.bin_<N>` here.
    pub section_prefix: Option<String>,
    /// Personality function for exception handling.
    pub personality: Option<FuncId>,
    /// Instruction arena.
    pub insts: Vec<Inst>,
    pub blocks: Vec<Block>,
}

impl Function {
    /// Create a declaration with the given signature.
    pub fn new(name: impl Into<String>, sig: Signature, linkage: Linkage) -> Self {
        Self {
            name: name.into(),
            sig,
            linkage,
            visibility: Visibility::Default,
            call_conv: CallConv::C,
            attrs: AttrSet::new(),
            comdat: None,
            section: None,
            section_prefix: None,
            personality: None,
            insts: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn is_variadic(&self) -> bool {
        self.sig.variadic
    }

    pub fn has_local_linkage(&self) -> bool {
        self.linkage.is_local()
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.0 as usize]
    }

    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.0 as usize]
    }

    pub fn entry_block(&self) -> Option<&Block> {
        self.blocks.first()
    }

    /// Iterate instruction ids in block order.
    pub fn inst_ids(&self) -> impl Iterator<Item = InstId> + '_ {
        self.blocks.iter().flat_map(|b| b.insts.iter().copied())
    }

    /// Remove an instruction from whichever block contains it. The arena
    /// slot is left behind; the id must not be used again.
    pub fn erase_inst(&mut self, id: InstId) {
        for block in &mut self.blocks {
            if let Some(pos) = block.insts.iter().position(|&i| i == id) {
                block.insts.remove(pos);
                return;
            }
        }
        panic!("erase_inst: instruction not found in any block");
    }

    /// Replace every operand equal to `from` with `to`, across all
    /// instructions.
    pub fn replace_value_uses(&mut self, from: &Value, to: &Value) {
        for inst in &mut self.insts {
            for v in inst.op.values_mut() {
                if v == from {
                    *v = to.clone();
                }
            }
        }
    }

    /// Find all instructions with the given predicate, in block order.
    pub fn find_insts(&self, mut pred: impl FnMut(&Op) -> bool) -> Vec<InstId> {
        self.inst_ids()
            .filter(|&id| pred(&self.inst(id).op))
            .collect()
    }
}
