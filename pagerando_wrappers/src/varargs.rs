//! Variadic rewrite: `foo(i32, ...)` becomes `foo$$origva(i32, va_list*)`.
//!
//! Variable arguments live on the caller's stack and would be lost across
//! the indirection through the page-offset table. The wrapper captures
//! them into a `va_list` and passes a pointer as an explicit trailing
//! argument; the original function is replaced by a non-variadic twin
//! consuming that pointer.

use std::mem;

use tracing::debug;

use pagerando_ir::function::Function;
use pagerando_ir::instruction::Op;
use pagerando_ir::module::Module;
use pagerando_ir::types::Type;
use pagerando_ir::value::{FuncId, InstId, Value};

/// Replace `f` with a non-variadic twin taking a trailing `va_list*`.
/// Returns the new function and reports the `va_list` type through
/// `va_list_ty`; a variadic function with no `va_start` is left alone
/// (degenerate varargs, treated as non-variadic).
pub(crate) fn rewrite_varargs(
    module: &mut Module,
    f: FuncId,
    va_list_ty: &mut Option<Type>,
) -> FuncId {
    let va_starts = find_va_starts(module.func(f));
    if va_starts.is_empty() {
        return f;
    }

    // The va_list type comes from the allocation feeding any va_start.
    let alloca = find_alloca(module.func(f), va_starts[0]);
    let ty = match &module.func(f).inst(alloca).op {
        Op::Alloca(ty) => ty.clone(),
        _ => unreachable!(),
    };
    *va_list_ty = Some(ty.clone());

    let func = module.func_mut(f);
    let old_arity = func.sig.params.len() as u32;
    debug!(func = %func.name, va_starts = va_starts.len(), "rewriting varargs");

    let mut sig = func.sig.clone();
    sig.params.push(ty.ptr_to());
    sig.variadic = false;

    let mut nf = Function::new(func.name.clone(), sig, func.linkage);
    nf.visibility = func.visibility;
    nf.call_conv = func.call_conv;
    nf.attrs = func.attrs.clone();
    nf.comdat = func.comdat.clone();
    nf.section = func.section.clone();
    nf.personality = func.personality;

    // Move the body wholesale. Parameter indices are unchanged (the new
    // va_list* is appended), so operands need no adaption.
    nf.insts = mem::take(&mut func.insts);
    nf.blocks = mem::take(&mut func.blocks);

    let va_arg = Value::Param(old_arity);
    if va_starts.len() == 1 {
        // A single va_start: the incoming parameter replaces the va_list
        // slot outright and both the slot and the va_start go away.
        nf.replace_value_uses(&Value::Inst(alloca), &va_arg);
        nf.erase_inst(alloca);
        nf.erase_inst(va_starts[0]);
    } else {
        // Multiple va_starts: the slot survives; each va_start becomes a
        // va_copy from the incoming parameter into the slot.
        for &vs in &va_starts {
            let dst = match &nf.inst(vs).op {
                Op::VaStart(v) => v.clone(),
                _ => unreachable!(),
            };
            nf.inst_mut(vs).op = Op::VaCopy {
                dst,
                src: va_arg.clone(),
            };
        }
    }

    let nf = module.add_function(nf);
    module.remove_function(f);
    nf
}

fn find_va_starts(func: &Function) -> Vec<InstId> {
    func.find_insts(|op| matches!(op, Op::VaStart(_)))
}

/// Trace from a `va_start` back to its originating stack allocation.
fn find_alloca(func: &Function, va_start: InstId) -> InstId {
    let mut inst = va_start;
    loop {
        if matches!(func.inst(inst).op, Op::Alloca(_)) {
            return inst;
        }
        inst = func
            .inst(inst)
            .op
            .values()
            .iter()
            .find_map(|v| match v {
                Value::Inst(id) => Some(*id),
                _ => None,
            })
            .expect("could not find va_list alloca in var args function");
    }
}
