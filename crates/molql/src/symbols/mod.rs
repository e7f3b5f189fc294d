//! Symbol registry
//!
//! Maps dotted operator names (`core.rel.eq`, `structure.generator.atom-groups`)
//! to their implementations. The table is open: callers add symbols at
//! runtime with [`SymbolRegistry::register`] or process-wide with
//! [`register_symbols`].

mod hierarchy;
mod primitives;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use crate::eval::{EvalContext, Operands, Value};
use crate::{MolqlError, Result};

/// Names of the built-in symbols
pub mod names {
    pub const ATOM_GROUPS: &str = "structure.generator.atom-groups";

    pub const SET: &str = "core.type.set";
    pub const SET_HAS: &str = "core.set.has";

    pub const EQ: &str = "core.rel.eq";
    pub const NEQ: &str = "core.rel.neq";
    pub const LT: &str = "core.rel.lt";
    pub const LTE: &str = "core.rel.lte";
    pub const GR: &str = "core.rel.gr";
    pub const GRE: &str = "core.rel.gre";
    pub const IN_RANGE: &str = "core.rel.inRange";

    pub const AND: &str = "core.logic.and";
    pub const OR: &str = "core.logic.or";
    pub const NOT: &str = "core.logic.not";

    pub const STR_MATCH: &str = "core.str.match";

    pub const MODEL_NUM: &str = "structure.atom-property.macromolecular.pdbx_PDB_model_num";
    pub const AUTH_ASYM_ID: &str = "structure.atom-property.macromolecular.auth_asym_id";
    pub const AUTH_SEQ_ID: &str = "structure.atom-property.macromolecular.auth_seq_id";
    pub const INS_CODE: &str = "structure.atom-property.macromolecular.pdbx_PDB_ins_code";
    pub const LABEL_COMP_ID: &str = "structure.atom-property.macromolecular.label_comp_id";
    pub const GROUP_PDB: &str = "structure.atom-property.macromolecular.group_PDB";
    pub const AUTH_ATOM_ID: &str = "structure.atom-property.macromolecular.auth_atom_id";
    pub const B_FACTOR: &str = "structure.atom-property.macromolecular.B_iso_or_equiv";
    pub const OCCUPANCY: &str = "structure.atom-property.macromolecular.occupancy";
    pub const ELEMENT_SYMBOL: &str = "structure.atom-property.core.element-symbol";
}

/// Implementation of a symbol
pub type SymbolFn =
    Arc<dyn for<'a> Fn(&EvalContext<'a>, Operands<'a>) -> Result<Value<'a>> + Send + Sync>;

/// Whether a symbol yields fragments or a single value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Produces a value from evaluated operands
    Value,
    /// Produces a lazy fragment sequence; only legal at the root of a query
    Generator,
    /// Produces a value from unevaluated expression operands, forcing them
    /// with [`EvalContext::force`] as needed
    Form,
}

#[derive(Clone)]
pub struct Symbol {
    kind: SymbolKind,
    func: SymbolFn,
}

impl Symbol {
    pub fn new(kind: SymbolKind, func: SymbolFn) -> Self {
        Self { kind, func }
    }

    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    pub fn call<'a>(&self, ctx: &EvalContext<'a>, operands: Operands<'a>) -> Result<Value<'a>> {
        (self.func)(ctx, operands)
    }
}

/// Name → symbol table
#[derive(Clone, Default)]
pub struct SymbolRegistry {
    symbols: HashMap<String, Symbol>,
}

impl SymbolRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in symbol
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        primitives::register(&mut registry);
        hierarchy::register(&mut registry);
        registry
    }

    /// Register a value-producing symbol (overwrites)
    pub fn register<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: for<'a> Fn(&EvalContext<'a>, Operands<'a>) -> Result<Value<'a>> + Send + Sync + 'static,
    {
        self.symbols
            .insert(name.into(), Symbol::new(SymbolKind::Value, Arc::new(func)));
    }

    /// Register a fragment-producing symbol (overwrites)
    pub fn register_generator<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: for<'a> Fn(&EvalContext<'a>, Operands<'a>) -> Result<Value<'a>> + Send + Sync + 'static,
    {
        self.symbols
            .insert(name.into(), Symbol::new(SymbolKind::Generator, Arc::new(func)));
    }

    /// Register a value-producing symbol whose expression operands arrive
    /// unevaluated (overwrites)
    pub fn register_form<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: for<'a> Fn(&EvalContext<'a>, Operands<'a>) -> Result<Value<'a>> + Send + Sync + 'static,
    {
        self.symbols
            .insert(name.into(), Symbol::new(SymbolKind::Form, Arc::new(func)));
    }

    /// Merge symbols in, overwriting existing names
    pub fn register_many(&mut self, symbols: impl IntoIterator<Item = (String, Symbol)>) {
        self.symbols.extend(symbols);
    }

    pub fn get(&self, name: &str) -> Result<&Symbol> {
        self.symbols
            .get(name)
            .ok_or_else(|| MolqlError::UnknownSymbol(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.symbols.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Symbol)> {
        self.symbols.iter().map(|(name, symbol)| (name.as_str(), symbol))
    }
}

// ============ Process-wide registry ============

static SYMBOLS: LazyLock<RwLock<Arc<SymbolRegistry>>> =
    LazyLock::new(|| RwLock::new(Arc::new(SymbolRegistry::with_builtins())));

/// Snapshot of the process-wide symbol registry
pub fn global_symbols() -> Arc<SymbolRegistry> {
    SYMBOLS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Update the process-wide symbol registry.
///
/// Queries created earlier keep the snapshot they were built with.
pub fn register_symbols(update: impl FnOnce(&mut SymbolRegistry)) {
    let mut guard = SYMBOLS.write().unwrap_or_else(PoisonError::into_inner);
    update(Arc::make_mut(&mut *guard));
}
