//! Pluggable concrete syntaxes
//!
//! A syntax parses text into an [`Expression`]. Writing is a separate,
//! optional capability ([`SyntaxWriter`]) because some syntaxes can only
//! express a fraction of the query language.

pub mod json;
pub mod lisp;
pub mod range;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use thiserror::Error;

use crate::ast::Expression;
use crate::{MolqlError, Result};

/// Malformed text for a given syntax
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{syntax}: {message} at '{fragment}' (line {line}, column {column}, offset {offset})")]
pub struct SyntaxError {
    pub syntax: String,
    pub message: String,
    /// The offending substring
    pub fragment: String,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl SyntaxError {
    /// Build an error for `input[offset..offset + len]`
    pub fn at(
        syntax: &str,
        message: impl Into<String>,
        input: &str,
        offset: usize,
        len: usize,
    ) -> Self {
        let offset = floor_char_boundary(input, offset.min(input.len()));
        let end = floor_char_boundary(input, (offset + len).min(input.len()));
        let (line, column) = offset_to_line_column(input, offset);
        Self {
            syntax: syntax.to_string(),
            message: message.into(),
            fragment: input[offset..end].to_string(),
            offset,
            line,
            column,
        }
    }
}

fn floor_char_boundary(input: &str, mut idx: usize) -> usize {
    while !input.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn offset_to_line_column(input: &str, offset: usize) -> (usize, usize) {
    let mut line = 1usize;
    let mut column = 1usize;

    for ch in input[..offset].chars() {
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }

    (line, column)
}

/// Serialization options shared by all writers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpOptions {
    /// `None` for compact single-line output, `Some(n)` for pretty output
    pub indent: Option<usize>,
}

impl DumpOptions {
    pub fn compact() -> Self {
        Self { indent: None }
    }

    pub fn pretty(indent: usize) -> Self {
        Self {
            indent: Some(indent),
        }
    }
}

/// A concrete query syntax
pub trait Syntax: Send + Sync {
    /// Registry name (matched case-insensitively)
    fn name(&self) -> &str;

    fn parse(&self, text: &str) -> Result<Expression>;

    /// Writer capability, if this syntax can serialize
    fn writer(&self) -> Option<&dyn SyntaxWriter> {
        None
    }
}

pub trait SyntaxWriter {
    fn write(&self, expr: &Expression, options: &DumpOptions) -> Result<String>;
}

/// Name → syntax table
#[derive(Clone, Default)]
pub struct SyntaxRegistry {
    syntaxes: HashMap<String, Arc<dyn Syntax>>,
}

impl SyntaxRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `range`, `molql` and `json` syntaxes
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(range::RangeSyntax));
        registry.register(Arc::new(lisp::LispSyntax));
        registry.register(Arc::new(json::JsonSyntax));
        registry
    }

    /// Register a syntax, replacing any prior one with the same name
    pub fn register(&mut self, syntax: Arc<dyn Syntax>) {
        self.syntaxes.insert(syntax.name().to_lowercase(), syntax);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Syntax>> {
        self.syntaxes
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| MolqlError::UnsupportedFormat(name.to_string()))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.syntaxes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Parse `text` with the named syntax
    pub fn parse(&self, text: &str, format: &str) -> Result<Expression> {
        self.get(format)?.parse(text)
    }

    /// Serialize `expr` with the named syntax
    pub fn write(&self, expr: &Expression, format: &str, options: &DumpOptions) -> Result<String> {
        let syntax = self.get(format)?;
        let writer = syntax.writer().ok_or_else(|| {
            MolqlError::UnsupportedFormat(format!("syntax '{}' cannot serialize", syntax.name()))
        })?;
        writer.write(expr, options)
    }
}

// ============ Process-wide registry ============

// Written during start-up, read afterwards. Writers swap in a new snapshot so
// readers holding an `Arc` never observe a half-applied update.
static SYNTAXES: LazyLock<RwLock<Arc<SyntaxRegistry>>> =
    LazyLock::new(|| RwLock::new(Arc::new(SyntaxRegistry::with_builtins())));

/// Snapshot of the process-wide syntax registry
pub fn global_syntaxes() -> Arc<SyntaxRegistry> {
    SYNTAXES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Register a syntax process-wide (replaces by name)
pub fn register_syntax(syntax: Arc<dyn Syntax>) {
    let mut guard = SYNTAXES.write().unwrap_or_else(PoisonError::into_inner);
    Arc::make_mut(&mut *guard).register(syntax);
}
