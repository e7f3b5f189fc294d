//! MolQL - molecular structure queries
//!
//! Queries select substructures (models → chains → residues → atoms) and can be
//! written in several interchangeable syntaxes. Every syntax parses into the
//! same [`Expression`] tree, which is evaluated against a [`Structure`]
//! through a registry of named symbols.
//!
//! ## Quick Start
//!
//! ```ignore
//! use molql::{DumpOptions, Query};
//!
//! let query = Query::new("B.18-20", "range")?;
//!
//! // Lazy: one single-atom fragment per matching atom
//! for fragment in query.apply(&structure) {
//!     let atoms = fragment?;
//! }
//!
//! // Eager: a new structure holding only the matched atoms
//! let substructure = query.extract(&structure)?;
//!
//! // Same query in another syntax
//! let script = query.dumps("molql", &DumpOptions::pretty(0))?;
//! ```
//!
//! ## Syntaxes
//!
//! - `range`: `A.1-10,B,C.5` (read-only)
//! - `molql`: `(structure.generator.atom-groups :chain-test (core.rel.eq ...))`
//! - `json`: `{"source": ..., "version": ..., "expression": {"head": ..., "args": ...}}`
//!
//! New syntaxes and symbols can be registered process-wide with
//! [`register_syntax`] and [`register_symbols`], or passed privately to
//! [`Query::with_registries`].

mod ast;
mod eval;
mod query;
pub mod structure;
mod symbols;
mod syntax;

use thiserror::Error;

// ============ Primary Public API ============

pub use ast::{ArgKey, Expression, Literal, Node};
pub use eval::{Cursor, EvalContext, Fragment, FragmentIter, Fragments, Operands, Value, validate};
pub use query::{AUTO_FORMAT, Query};
pub use structure::Structure;
pub use symbols::names;
pub use symbols::{Symbol, SymbolFn, SymbolKind, SymbolRegistry, global_symbols, register_symbols};
pub use syntax::json::JsonSyntax;
pub use syntax::lisp::LispSyntax;
pub use syntax::range::{RangeItem, RangeSyntax, ResidueBound, parse_ranges};
pub use syntax::{
    DumpOptions, Syntax, SyntaxError, SyntaxRegistry, SyntaxWriter, global_syntaxes,
    register_syntax,
};

// ============ Errors ============

#[derive(Error, Debug)]
pub enum MolqlError {
    #[error("Syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("Unsupported query format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Malformed arguments to '{head}': positional keys {keys:?} are not 0..n")]
    MalformedArguments { head: String, keys: Vec<usize> },

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MolqlError>;
