//! Attribute transfer policy for wrapper creation.
//!
//! Both categories are listed exhaustively so adding a new attribute
//! forces a decision here.

use pagerando_ir::function::Attr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transfer {
    Keep,
    Drop,
    /// Propagated only when the wrapper itself allocates (the `va_list`
    /// slot of a variadic wrapper).
    KeepIfVarArg,
}

/// Whether an attribute transfers from the wrapped function to its
/// wrapper.
pub(crate) fn transfer_kind(attr: Attr) -> Transfer {
    use Attr::*;
    match attr {
        // Cannot be propagated safely to a thin trampoline.
        Alignment | AlwaysInline | ArgMemOnly | Builtin | InlineHint | MinSize | Naked
        | NoInline | NoRedZone | OptimizeForSize | OptimizeNone | Pagerando | ReadNone
        | ReturnsTwice | WriteOnly => Transfer::Drop,

        // Safe on a trampoline.
        AllocSize | Cold | Convergent | InaccessibleMemOnly | InaccessibleMemOrArgMemOnly
        | JumpTable | NoBuiltin | NoDuplicate | NoImplicitFloat | NoRecurse | NoReturn
        | NoUnwind | NonLazyBind | ReadOnly | SafeStack | SanitizeAddress
        | SanitizeHwAddress | SanitizeMemory | SanitizeThread | Speculatable
        | StackAlignment | StackProtectReq | StrictFp | UwTable => Transfer::Keep,

        StackProtect | StackProtectStrong => Transfer::KeepIfVarArg,
    }
}

/// String attributes stripped from wrappers. Wrappers should be as small
/// as possible, so the frame pointer may be eliminated.
pub(crate) fn drops_string_attr(key: &str) -> bool {
    matches!(key, "no-frame-pointer-elim" | "no-frame-pointer-elim-non-leaf")
}
