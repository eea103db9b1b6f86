//! Use enumeration and classification for function values.
//!
//! A "use" is any place the module references a function: an instruction
//! operand, a global initializer, an alias target, or a personality slot.
//! Classification decides which uses can leak a function pointer out of
//! the module at runtime (address-taken) and which are harmless
//! (direct-call callees, block addresses, personality references, pointer
//! casts that are only ever called).

use smallvec::SmallVec;

use crate::module::Module;
use crate::value::{AliasId, Const, FuncId, GlobalId, InstId, Value};

/// A single use of a function value, captured by location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseSite {
    /// Operand `index` of an instruction. The callee of a call is
    /// operand 0.
    Operand {
        func: FuncId,
        inst: InstId,
        index: u32,
    },
    /// The initializer of a global variable.
    GlobalInit { global: GlobalId },
    /// The aliasee of a global alias.
    AliaseeOf { alias: AliasId },
    /// The personality slot of a function.
    PersonalityOf { func: FuncId },
}

/// Classification of a use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseKind {
    /// The function is the direct callee of a call.
    CalleeOfCall,
    /// The function is the target of a global alias.
    AliasTarget,
    /// A block-address constant into the function's body.
    BlockAddress,
    /// Referenced as a personality function.
    PersonalityRef,
    /// A pointer cast of the function that is itself only used as a
    /// callee.
    CastOfSkippableUses,
    /// Everything else: the address escapes.
    AddressTaken,
}

impl UseKind {
    /// Skippable uses cannot leak the function's address at runtime.
    pub fn is_skippable(self) -> bool {
        !matches!(self, UseKind::AddressTaken)
    }
}

/// Enumerate all uses of `f` across the module, captured by value so
/// rewriting may proceed while iterating the result.
pub fn function_uses(module: &Module, f: FuncId) -> SmallVec<[UseSite; 4]> {
    let mut sites = SmallVec::new();

    for (fid, func) in module.funcs() {
        if func.personality == Some(f) {
            sites.push(UseSite::PersonalityOf { func: fid });
        }
        for inst in func.inst_ids() {
            for (index, value) in func.inst(inst).op.values().iter().enumerate() {
                if let Value::Const(c) = value {
                    if c.mentions(f) {
                        sites.push(UseSite::Operand {
                            func: fid,
                            inst,
                            index: index as u32,
                        });
                    }
                }
            }
        }
    }

    for (i, global) in module.globals.iter().enumerate() {
        if let Some(init) = &global.init {
            if init.mentions(f) {
                sites.push(UseSite::GlobalInit {
                    global: GlobalId(i as u32),
                });
            }
        }
    }

    for (i, alias) in module.aliases.iter().enumerate() {
        if alias.aliasee.mentions(f) {
            sites.push(UseSite::AliaseeOf {
                alias: AliasId(i as u32),
            });
        }
    }

    sites
}

/// Classify a use of `f`. Total over all use sites.
pub fn classify_use(module: &Module, f: FuncId, site: UseSite) -> UseKind {
    match site {
        UseSite::PersonalityOf { .. } => UseKind::PersonalityRef,
        UseSite::AliaseeOf { .. } => UseKind::AliasTarget,
        UseSite::GlobalInit { global } => {
            let init = module
                .global(global)
                .init
                .as_ref()
                .expect("captured use of a global without initializer");
            if init.takes_address_of(f) {
                UseKind::AddressTaken
            } else {
                UseKind::BlockAddress
            }
        }
        UseSite::Operand { func, inst, index } => {
            let op = &module.func(func).inst(inst).op;
            let values = op.values();
            let value = values[index as usize];
            let c = match value {
                Value::Const(c) => c,
                _ => return UseKind::AddressTaken,
            };
            // A mention only through a block address stays with the body.
            if !c.takes_address_of(f) {
                return UseKind::BlockAddress;
            }
            if op.is_call() && index == 0 {
                return match c {
                    Const::Function(_) => UseKind::CalleeOfCall,
                    // A cast callee lowers to a direct call anyway.
                    Const::Cast(..) => UseKind::CastOfSkippableUses,
                    _ => UseKind::AddressTaken,
                };
            }
            UseKind::AddressTaken
        }
    }
}

/// Replace every use of `from` with `to` across the whole module: operand
/// constants, global initializers, alias targets, and personality slots.
/// Block addresses stay with `from`, which keeps the body.
pub fn replace_function_uses(module: &mut Module, from: FuncId, to: FuncId) {
    let func_ids: Vec<FuncId> = module.order().to_vec();
    for fid in func_ids {
        let func = module.func_mut(fid);
        if func.personality == Some(from) {
            func.personality = Some(to);
        }
        for inst in &mut func.insts {
            for value in inst.op.values_mut() {
                if let Value::Const(c) = value {
                    c.replace_function(from, to);
                }
            }
        }
    }
    for global in &mut module.globals {
        if let Some(init) = &mut global.init {
            init.replace_function(from, to);
        }
    }
    for alias in &mut module.aliases {
        alias.aliasee.replace_function(from, to);
    }
}
