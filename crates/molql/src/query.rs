//! Query facade: parse once, apply to structures, serialize to any syntax

use std::collections::HashSet;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::ast::Expression;
use crate::eval::{EvalContext, Fragments};
use crate::structure::{Atom, Chain, Model, Residue, Select, Structure, extract_to_structure};
use crate::symbols::{SymbolRegistry, global_symbols};
use crate::syntax::{DumpOptions, SyntaxRegistry, global_syntaxes};
use crate::Result;

/// Format name that picks a syntax from the first character of the text
pub const AUTO_FORMAT: &str = "auto";

/// A parsed query bound to the registries it was built with
#[derive(Clone)]
pub struct Query {
    expression: Expression,
    syntaxes: Arc<SyntaxRegistry>,
    symbols: Arc<SymbolRegistry>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("expression", &self.expression)
            .finish_non_exhaustive()
    }
}

impl Query {
    /// Parse `text` with the process-wide registries
    pub fn new(text: &str, format: &str) -> Result<Self> {
        Self::with_registries(text, format, global_syntaxes(), global_symbols())
    }

    pub fn with_registries(
        text: &str,
        format: &str,
        syntaxes: Arc<SyntaxRegistry>,
        symbols: Arc<SymbolRegistry>,
    ) -> Result<Self> {
        let format = if format.eq_ignore_ascii_case(AUTO_FORMAT) {
            detect_format(text)
        } else {
            format
        };
        log::debug!("parsing {} byte query as '{format}'", text.len());
        let expression = syntaxes.parse(text, format)?;
        Ok(Self {
            expression,
            syntaxes,
            symbols,
        })
    }

    /// Wrap an already built expression
    pub fn from_expression(expression: Expression) -> Self {
        Self {
            expression,
            syntaxes: global_syntaxes(),
            symbols: global_symbols(),
        }
    }

    /// Replace the symbol table used for evaluation
    pub fn with_symbols(mut self, symbols: Arc<SymbolRegistry>) -> Self {
        self.symbols = symbols;
        self
    }

    /// Read the whole source and parse it
    pub fn load<R: Read>(mut reader: R, format: &str) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::new(&text, format)
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Lazy fragment sequence. Nothing is evaluated until the first pull.
    pub fn apply<'a>(&'a self, structure: &'a Structure) -> Fragments<'a> {
        EvalContext::new(&self.expression, structure, &self.symbols).apply()
    }

    /// Merge every matched atom into a new structure. The source is untouched.
    pub fn extract(&self, structure: &Structure) -> Result<Structure> {
        let mut selected = HashSet::new();
        for fragment in self.apply(structure) {
            selected.extend(fragment?.into_iter().map(|atom| atom as *const Atom));
        }
        log::debug!("query matched {} atoms", selected.len());
        Ok(extract_to_structure(structure, &FragmentSelector { selected }))
    }

    pub fn dumps(&self, format: &str, options: &DumpOptions) -> Result<String> {
        self.syntaxes.write(&self.expression, format, options)
    }

    pub fn dump<W: Write>(&self, format: &str, mut sink: W, options: &DumpOptions) -> Result<()> {
        let text = self.dumps(format, options)?;
        sink.write_all(text.as_bytes())?;
        Ok(())
    }
}

/// `{` → json, `(` → molql, anything else → range
fn detect_format(text: &str) -> &'static str {
    match text.trim_start().chars().next() {
        Some('{') => "json",
        Some('(') => "molql",
        _ => "range",
    }
}

/// Accepts exactly the atoms a query matched, and the containers holding them
struct FragmentSelector {
    selected: HashSet<*const Atom>,
}

impl FragmentSelector {
    fn holds(&self, residue: &Residue) -> bool {
        residue.atoms.iter().any(|atom| self.accept_atom(atom))
    }
}

impl Select for FragmentSelector {
    fn accept_model(&self, model: &Model) -> bool {
        model.chains.iter().any(|chain| self.accept_chain(chain))
    }

    fn accept_chain(&self, chain: &Chain) -> bool {
        chain.residues.iter().any(|residue| self.holds(residue))
    }

    fn accept_residue(&self, _chain: &Chain, residue: &Residue) -> bool {
        self.holds(residue)
    }

    fn accept_atom(&self, atom: &Atom) -> bool {
        self.selected.contains(&(atom as *const Atom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_detection() {
        assert_eq!(detect_format("{\"expression\": {}}"), "json");
        assert_eq!(detect_format("  (core.rel.eq 1 1)"), "molql");
        assert_eq!(detect_format("A.1-10"), "range");
        assert_eq!(detect_format(""), "range");
    }

    #[test]
    fn auto_format_parses_each_syntax() {
        let from_range = Query::new("A", "auto").unwrap();
        let lisp = from_range.dumps("molql", &DumpOptions::compact()).unwrap();
        let from_lisp = Query::new(&lisp, "AUTO").unwrap();
        let json = from_lisp.dumps("json", &DumpOptions::compact()).unwrap();
        let from_json = Query::new(&json, "auto").unwrap();
        assert_eq!(from_json.expression(), from_range.expression());
    }

    #[test]
    fn load_and_dump_use_io() {
        let query = Query::load("B.1-3".as_bytes(), "range").unwrap();
        let mut sink = Vec::new();
        query.dump("json", &mut sink, &DumpOptions::pretty(2)).unwrap();
        let text = String::from_utf8(sink).unwrap();
        assert_eq!(Query::new(&text, "json").unwrap().expression(), query.expression());
    }
}
