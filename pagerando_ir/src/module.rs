//! Module-level IR container.
//!
//! The module owns all functions in a tombstoned arena so `FuncId`s stay
//! stable across deletion, plus an explicit emission-order list that
//! passes may prepend to (wrapper synthesis relies on this to keep a
//! non-binned function first in the module).

use crate::function::{Function, Linkage, Visibility};
use crate::types::Type;
use crate::value::{AliasId, Const, FuncId, GlobalId, GlobalValueRef};

/// A global variable.
#[derive(Debug, Clone)]
pub struct GlobalVariable {
    pub name: String,
    pub ty: Type,
    pub linkage: Linkage,
    pub visibility: Visibility,
    pub is_const: bool,
    /// `None` for declarations.
    pub init: Option<Const>,
}

/// A global alias: another name for an existing global value.
#[derive(Debug, Clone)]
pub struct GlobalAlias {
    pub name: String,
    pub linkage: Linkage,
    pub visibility: Visibility,
    pub aliasee: Const,
}

/// Top-level IR container.
pub struct Module {
    pub name: String,
    funcs: Vec<Option<Function>>,
    order: Vec<FuncId>,
    pub globals: Vec<GlobalVariable>,
    pub aliases: Vec<GlobalAlias>,
    /// The compiler's "used" list: values that must survive dead-global
    /// elimination.
    pub used: Vec<GlobalValueRef>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            funcs: Vec::new(),
            order: Vec::new(),
            globals: Vec::new(),
            aliases: Vec::new(),
            used: Vec::new(),
        }
    }

    /// Add a function at the end of the module order.
    pub fn add_function(&mut self, func: Function) -> FuncId {
        let id = FuncId(self.funcs.len() as u32);
        self.funcs.push(Some(func));
        self.order.push(id);
        id
    }

    /// Add a function at the front of the module order.
    pub fn prepend_function(&mut self, func: Function) -> FuncId {
        let id = FuncId(self.funcs.len() as u32);
        self.funcs.push(Some(func));
        self.order.insert(0, id);
        id
    }

    /// Delete a function. Its arena slot becomes a tombstone; the id must
    /// not be dereferenced again.
    pub fn remove_function(&mut self, id: FuncId) {
        self.funcs[id.0 as usize] = None;
        self.order.retain(|&f| f != id);
    }

    pub fn func(&self, id: FuncId) -> &Function {
        self.funcs[id.0 as usize]
            .as_ref()
            .expect("use of deleted function")
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        self.funcs[id.0 as usize]
            .as_mut()
            .expect("use of deleted function")
    }

    pub fn try_func(&self, id: FuncId) -> Option<&Function> {
        self.funcs.get(id.0 as usize).and_then(|f| f.as_ref())
    }

    /// Emission order of live functions.
    pub fn order(&self) -> &[FuncId] {
        &self.order
    }

    /// Iterate live functions in module order.
    pub fn funcs(&self) -> impl Iterator<Item = (FuncId, &Function)> + '_ {
        self.order.iter().map(move |&id| (id, self.func(id)))
    }

    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.funcs().find(|(_, f)| f.name == name).map(|(id, _)| id)
    }

    pub fn add_global(&mut self, global: GlobalVariable) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(global);
        id
    }

    pub fn global(&self, id: GlobalId) -> &GlobalVariable {
        &self.globals[id.0 as usize]
    }

    pub fn global_mut(&mut self, id: GlobalId) -> &mut GlobalVariable {
        &mut self.globals[id.0 as usize]
    }

    pub fn find_global(&self, name: &str) -> Option<GlobalId> {
        self.globals
            .iter()
            .position(|g| g.name == name)
            .map(|i| GlobalId(i as u32))
    }

    pub fn add_alias(&mut self, alias: GlobalAlias) -> AliasId {
        let id = AliasId(self.aliases.len() as u32);
        self.aliases.push(alias);
        id
    }

    pub fn alias(&self, id: AliasId) -> &GlobalAlias {
        &self.aliases[id.0 as usize]
    }

    pub fn alias_mut(&mut self, id: AliasId) -> &mut GlobalAlias {
        &mut self.aliases[id.0 as usize]
    }

    /// Append a value to the "used" list.
    pub fn append_to_used(&mut self, value: GlobalValueRef) {
        self.used.push(value);
    }
}
