//! pagerando_target_aarch64: AArch64 target for the pagerando passes.
//!
//! The bin-addressing pseudo `MovAddrBin` materializes a callee address
//! in two steps (load the bin base from the page-offset table, add the
//! callee's offset within the bin). When the callee shares the caller's
//! bin the whole chain collapses into a direct `bl`.

pub mod inst;
pub mod optimizer;

#[cfg(test)]
mod tests;
