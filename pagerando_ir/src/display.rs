//! Text format for pagerando IR, for debugging and test diagnostics.
//!
//! Output format:
//! ```text
//! module @m
//! global @fn_ptr = @global
//! define external @global() pagerando {
//! bb0:
//!   v2 = call @internal()
//!   ret
//! }
//! ```

use std::fmt;

use crate::function::{Function, Linkage, Visibility};
use crate::instruction::Op;
use crate::module::Module;
use crate::types::Type;
use crate::value::{Const, Value};

fn fmt_type(ty: &Type) -> String {
    match ty {
        Type::Int(bits) => format!("i{bits}"),
        Type::Ptr(inner) => format!("{}*", fmt_type(inner)),
        Type::Aggregate(name) => format!("%{name}"),
        Type::Array(elem, n) => format!("[{} x {}]", n, fmt_type(elem)),
    }
}

fn fmt_linkage(linkage: Linkage) -> &'static str {
    match linkage {
        Linkage::Internal => "internal",
        Linkage::External => "external",
        Linkage::AvailableExternally => "available_externally",
    }
}

fn fmt_visibility(vis: Visibility) -> &'static str {
    match vis {
        Visibility::Default => "",
        Visibility::Hidden => " hidden",
        Visibility::Protected => " protected",
    }
}

struct ConstFmt<'a>(&'a Module, &'a Const);

impl fmt::Display for ConstFmt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ConstFmt(m, c) = self;
        match c {
            Const::Int(v) => write!(f, "{v}"),
            Const::Null => write!(f, "null"),
            Const::Function(id) => write!(f, "@{}", m.func(*id).name),
            Const::Global(id) => write!(f, "@{}", m.global(*id).name),
            Const::BlockAddress(id, bb) => {
                write!(f, "blockaddress(@{}, bb{})", m.func(*id).name, bb.0)
            }
            Const::Cast(inner, ty) => {
                write!(f, "cast({} to {})", ConstFmt(m, inner), fmt_type(ty))
            }
            Const::Array(elems) | Const::Struct(elems) => {
                let (open, close) = if matches!(c, Const::Array(_)) {
                    ("[", "]")
                } else {
                    ("{", "}")
                };
                write!(f, "{open}")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", ConstFmt(m, e))?;
                }
                write!(f, "{close}")
            }
        }
    }
}

fn fmt_value(m: &Module, v: &Value) -> String {
    match v {
        Value::Inst(id) => format!("v{}", id.0),
        Value::Param(i) => format!("arg{i}"),
        Value::Const(c) => format!("{}", ConstFmt(m, c)),
    }
}

fn fmt_function(f: &mut fmt::Formatter<'_>, m: &Module, func: &Function) -> fmt::Result {
    let kind = if func.is_declaration() {
        "declare"
    } else {
        "define"
    };
    write!(
        f,
        "{} {}{} @{}(",
        kind,
        fmt_linkage(func.linkage),
        fmt_visibility(func.visibility),
        func.name
    )?;
    for (i, ty) in func.sig.params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", fmt_type(ty))?;
    }
    if func.sig.variadic {
        if !func.sig.params.is_empty() {
            write!(f, ", ")?;
        }
        write!(f, "...")?;
    }
    write!(f, ")")?;
    if let Some(prefix) = &func.section_prefix {
        write!(f, " prefix \"{prefix}\"")?;
    }
    if func.is_declaration() {
        return writeln!(f);
    }
    writeln!(f, " {{")?;
    for (bi, block) in func.blocks.iter().enumerate() {
        writeln!(f, "bb{bi}:")?;
        for &id in &block.insts {
            let inst = func.inst(id);
            write!(f, "  ")?;
            match &inst.op {
                Op::Alloca(ty) => writeln!(f, "v{} = alloca {}", id.0, fmt_type(ty))?,
                Op::Load(p) => writeln!(f, "v{} = load {}", id.0, fmt_value(m, p))?,
                Op::Store { value, ptr } => {
                    writeln!(f, "store {}, {}", fmt_value(m, value), fmt_value(m, ptr))?
                }
                Op::Call { callee, args, .. } => {
                    write!(f, "v{} = call {}(", id.0, fmt_value(m, callee))?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", fmt_value(m, a))?;
                    }
                    writeln!(f, ")")?;
                }
                Op::BinOp(kind, a, b) => writeln!(
                    f,
                    "v{} = {:?} {}, {}",
                    id.0,
                    kind,
                    fmt_value(m, a),
                    fmt_value(m, b)
                )?,
                Op::Ret(None) => writeln!(f, "ret")?,
                Op::Ret(Some(v)) => writeln!(f, "ret {}", fmt_value(m, v))?,
                Op::Br(bb) => writeln!(f, "br bb{}", bb.0)?,
                Op::CondBr {
                    cond,
                    then_bb,
                    else_bb,
                } => writeln!(
                    f,
                    "condbr {}, bb{}, bb{}",
                    fmt_value(m, cond),
                    then_bb.0,
                    else_bb.0
                )?,
                Op::VaStart(v) => writeln!(f, "va_start {}", fmt_value(m, v))?,
                Op::VaEnd(v) => writeln!(f, "va_end {}", fmt_value(m, v))?,
                Op::VaCopy { dst, src } => {
                    writeln!(f, "va_copy {}, {}", fmt_value(m, dst), fmt_value(m, src))?
                }
                Op::Trap => writeln!(f, "trap")?,
                Op::Unreachable => writeln!(f, "unreachable")?,
                Op::DbgMarker => writeln!(f, "dbg")?,
            }
        }
    }
    writeln!(f, "}}")
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module @{}", self.name)?;
        for global in &self.globals {
            write!(
                f,
                "global {}{} @{} : {}",
                fmt_linkage(global.linkage),
                fmt_visibility(global.visibility),
                global.name,
                fmt_type(&global.ty)
            )?;
            match &global.init {
                Some(init) => writeln!(f, " = {}", ConstFmt(self, init))?,
                None => writeln!(f)?,
            }
        }
        for alias in &self.aliases {
            writeln!(f, "alias @{} = {}", alias.name, ConstFmt(self, &alias.aliasee))?;
        }
        for (_, func) in self.funcs() {
            fmt_function(f, self, func)?;
        }
        Ok(())
    }
}
