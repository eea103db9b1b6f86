//! pagerando_wrappers: entry wrappers for pagerando functions.
//!
//! A pagerando function needs a wrapper if it has non-local linkage or
//! its address is taken, i.e. if it can be reached from outside the
//! module. The wrapper keeps the original symbol name, lives in the
//! ordinary text section, and holds a single call to the renamed binned
//! original, so no caller ever sees a binned address directly.
//!
//! Variadic functions get the special treatment in [`varargs`]: their
//! on-stack argument tail must survive the indirection.

mod attrs;
mod varargs;


use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::debug;

use pagerando_ir::builder::Builder;
use pagerando_ir::function::{Attr, Function, Linkage, Visibility};
use pagerando_ir::instruction::Op;
use pagerando_ir::module::{GlobalVariable, Module};
use pagerando_ir::types::Type;
use pagerando_ir::uses::{
    classify_use, function_uses, replace_function_uses, UseKind, UseSite,
};
use pagerando_ir::value::{FuncId, GlobalValueRef, Value};

/// Suffix given to a wrapped original.
pub const ORIG_SUFFIX: &str = "$$orig";
/// Suffix given to a wrapped variadic original.
pub const ORIG_VA_SUFFIX: &str = "$$origva";
/// The page-offset table global.
pub const POT_SYMBOL: &str = "llvm.pot";
/// Anchor symbol for the table's base address.
pub const POT_ANCHOR_SYMBOL: &str = "_POT_";

/// Run wrapper synthesis over a module. Returns true if anything was
/// processed.
pub fn run_wrappers(module: &mut Module) -> bool {
    let mut worklist = Vec::new();
    let mut skipped = Vec::new();
    for (id, func) in module.funcs() {
        if !func.attrs.has(Attr::Pagerando) {
            continue;
        }
        if skip_function(func) {
            skipped.push(id);
        } else {
            worklist.push(id);
        }
    }

    for id in skipped {
        debug!(func = %module.func(id).name, "skipping degenerate pagerando function");
        module.func_mut(id).attrs.remove(Attr::Pagerando);
    }

    let mut wrapped = false;
    for &id in &worklist {
        wrapped |= process_function(module, id);
    }

    if wrapped {
        create_pot(module);
    }

    !worklist.is_empty()
}

/// Functions consisting of only debug, trap, and unreachable
/// instructions are created for abstract non-base destructors; they are
/// trivial and not useful for an attacker to reuse.
fn is_trap_only(func: &Function) -> bool {
    let Some(entry) = func.entry_block() else {
        return false;
    };
    entry
        .insts
        .iter()
        .all(|&id| matches!(func.inst(id).op, Op::DbgMarker | Op::Trap | Op::Unreachable))
}

/// Declarations, available-externally and comdat functions, trivial trap
/// functions, and naked or thunk functions are not wrapped. Naked
/// functions matter: CFI jump tables are emitted as naked functions and
/// must not land in pagerando sections.
fn skip_function(func: &Function) -> bool {
    func.is_declaration()
        || func.linkage == Linkage::AvailableExternally
        || func.comdat.is_some()
        || is_trap_only(func)
        || func.attrs.has(Attr::Naked)
        || func.attrs.has_string("thunk")
}

fn process_function(module: &mut Module, f: FuncId) -> bool {
    let address_uses: SmallVec<[UseSite; 4]> = function_uses(module, f)
        .into_iter()
        .filter(|&u| classify_use(module, f, u) == UseKind::AddressTaken)
        .collect();

    let needs_wrapper = !module.func(f).has_local_linkage() || !address_uses.is_empty();
    let mut callee = f;
    if needs_wrapper {
        let wrapper = create_wrapper(module, f, &address_uses);
        let mut va_list_ty = None;
        if module.func(f).is_variadic() {
            callee = varargs::rewrite_varargs(module, f, &mut va_list_ty);
        }
        create_wrapper_body(module, wrapper, callee, va_list_ty);
    }

    // Clear any explicit section so the bin prefix alone controls
    // placement later.
    module.func_mut(callee).section = None;
    needs_wrapper
}

fn create_wrapper(module: &mut Module, f: FuncId, address_uses: &[UseSite]) -> FuncId {
    let func = module.func_mut(f);
    let original_name = func.name.clone();
    let suffix = if func.is_variadic() {
        ORIG_VA_SUFFIX
    } else {
        ORIG_SUFFIX
    };
    func.name = format!("{original_name}{suffix}");
    debug!(func = %func.name, wrapper = %original_name, "creating wrapper");

    let mut wrapper = Function::new(original_name, func.sig.clone(), func.linkage);
    wrapper.visibility = func.visibility;
    wrapper.call_conv = func.call_conv;
    wrapper.comdat = func.comdat.clone();
    // Wrappers cannot throw, so no personality function.

    for attr in func.attrs.iter() {
        match attrs::transfer_kind(attr) {
            attrs::Transfer::Keep => wrapper.attrs.add(attr),
            attrs::Transfer::KeepIfVarArg if func.is_variadic() => wrapper.attrs.add(attr),
            _ => {}
        }
    }
    for (key, value) in func.attrs.iter_strings() {
        if !attrs::drops_string_attr(key) {
            wrapper.attrs.set_string(key, value);
        }
    }
    wrapper.attrs.add(Attr::NoInline);
    wrapper.attrs.add(Attr::OptimizeForSize);

    // Prepend so at least one function in the ordinary text section
    // precedes every binned function; otherwise the linker may place a
    // bin at the start of the image.
    let wrapper = module.prepend_function(wrapper);

    replace_with_wrapper(module, f, wrapper, address_uses);

    wrapper
}

/// Replace uses of `f` with its wrapper:
/// - Calls to vararg functions must always go through the wrapper so the
///   on-stack arguments survive the indirection.
/// - Calls to a non-local, non-protected function must go through the
///   wrapper since the dynamic linker could redirect them.
/// - Protected functions cannot be preempted at load time, so their
///   same-module calls stay direct.
/// - Address-taken uses of local functions might escape, so those
///   addresses become the wrapper's.
fn replace_with_wrapper(module: &mut Module, f: FuncId, wrapper: FuncId, address_uses: &[UseSite]) {
    let func = module.func(f);
    if func.is_variadic()
        || (!func.has_local_linkage() && func.visibility != Visibility::Protected)
    {
        replace_function_uses(module, f, wrapper);
        if !module.func(f).has_local_linkage() {
            module.func_mut(f).visibility = Visibility::Protected;
        }
    } else {
        let mut visited: FxHashSet<UseSite> = FxHashSet::default();
        for &site in address_uses {
            replace_address_use(module, f, wrapper, site, &mut visited);
        }
    }
}

fn replace_address_use(
    module: &mut Module,
    f: FuncId,
    wrapper: FuncId,
    site: UseSite,
    visited: &mut FxHashSet<UseSite>,
) {
    // A constant is bulk-rewritten at most once per user.
    if !visited.insert(site) {
        return;
    }
    match site {
        UseSite::GlobalInit { global } => {
            let init = module
                .global_mut(global)
                .init
                .as_mut()
                .expect("captured use of a global without initializer");
            init.replace_function(f, wrapper);
        }
        UseSite::AliaseeOf { alias } => {
            // Aliases cannot take a piecewise operand change; swap the
            // aliasee directly.
            module.alias_mut(alias).aliasee.replace_function(f, wrapper);
        }
        UseSite::Operand { func, inst, index } => {
            let op = &mut module.func_mut(func).inst_mut(inst).op;
            if let Some(Value::Const(c)) = op.values_mut().into_iter().nth(index as usize) {
                // Already replaced through an earlier captured use?
                if c.takes_address_of(f) {
                    c.replace_function(f, wrapper);
                }
            }
        }
        UseSite::PersonalityOf { .. } => {
            unreachable!("personality uses are never address-taken")
        }
    }
}

/// Entry block of a wrapper: forward the arguments (plus a freshly
/// captured va_list for variadic callees), call the renamed original,
/// return its result.
fn create_wrapper_body(
    module: &mut Module,
    wrapper: FuncId,
    callee: FuncId,
    va_list_ty: Option<Type>,
) {
    let conv = module.func(callee).call_conv;
    let func = module.func_mut(wrapper);
    let is_void = func.sig.ret.is_none();
    let arity = func.sig.params.len() as u32;

    let mut b = Builder::new(func);
    let entry = b.create_block();
    b.switch_to_block(entry);

    let mut args: Vec<Value> = (0..arity).map(Value::Param).collect();

    let va_list = va_list_ty.map(|ty| {
        let slot = b.alloca(ty);
        b.va_start(slot.clone());
        args.push(slot.clone());
        slot
    });

    // The call adopts the callee's calling convention.
    let call = b.call(Value::function(callee), args, conv);

    if let Some(slot) = va_list {
        b.va_end(slot);
    }

    if is_void {
        b.ret(None);
    } else {
        b.ret(Some(call));
    }
}

/// Emit the page-offset table global and its base-address anchor, once
/// per module. Contents are populated by the linker and loader; the
/// "used" entry keeps the table alive through dead-global elimination.
fn create_pot(module: &mut Module) {
    if module.find_global(POT_SYMBOL).is_some() {
        return;
    }
    let pot = module.add_global(GlobalVariable {
        name: POT_SYMBOL.into(),
        ty: Type::Array(Box::new(Type::i8_ptr()), 0),
        linkage: Linkage::External,
        visibility: Visibility::Protected,
        is_const: true,
        init: None,
    });
    module.append_to_used(GlobalValueRef::Variable(pot));

    if module.find_global(POT_ANCHOR_SYMBOL).is_none() {
        module.add_global(GlobalVariable {
            name: POT_ANCHOR_SYMBOL.into(),
            ty: Type::Int(8),
            linkage: Linkage::External,
            visibility: Visibility::Protected,
            is_const: true,
            init: None,
        });
    }
}
