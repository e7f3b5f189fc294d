//! Syntax-agnostic query AST
//!
//! Every concrete syntax parses into an [`Expression`] and serializes from
//! one. Literals are decoded at parse time, so evaluation never re-parses
//! text.

use indexmap::IndexMap;

use crate::{MolqlError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Bool(bool),
}

impl Literal {
    /// Short type name used in evaluation error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::String(_) => "string",
            Literal::Number(_) => "number",
            Literal::Bool(_) => "boolean",
        }
    }
}

/// Argument key: positional index or label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArgKey {
    Index(usize),
    Name(String),
}

impl ArgKey {
    pub fn is_positional(&self) -> bool {
        matches!(self, ArgKey::Index(_))
    }
}

impl From<usize> for ArgKey {
    fn from(index: usize) -> Self {
        ArgKey::Index(index)
    }
}

impl From<&str> for ArgKey {
    fn from(name: &str) -> Self {
        ArgKey::Name(name.to_string())
    }
}

impl From<String> for ArgKey {
    fn from(name: String) -> Self {
        ArgKey::Name(name)
    }
}

/// An argument value: nested application or literal
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Expr(Expression),
    Literal(Literal),
}

impl From<Expression> for Node {
    fn from(expr: Expression) -> Self {
        Node::Expr(expr)
    }
}

impl From<Literal> for Node {
    fn from(lit: Literal) -> Self {
        Node::Literal(lit)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Literal(Literal::String(s.to_string()))
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Literal(Literal::String(s))
    }
}

impl From<f64> for Node {
    fn from(n: f64) -> Self {
        Node::Literal(Literal::Number(n))
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Literal(Literal::Bool(b))
    }
}

/// An application: `head` applied to ordered positional and named arguments.
///
/// Positional arguments are keyed `ArgKey::Index`, named ones
/// `ArgKey::Name`. Equality compares argument maps as maps, so two
/// expressions built with different insertion orders still compare equal.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub head: String,
    pub args: IndexMap<ArgKey, Node>,
}

impl Expression {
    pub fn new(head: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            args: IndexMap::new(),
        }
    }

    /// Build an application from positional arguments only
    pub fn apply<N: Into<Node>>(head: impl Into<String>, args: impl IntoIterator<Item = N>) -> Self {
        args.into_iter().fold(Self::new(head), |expr, arg| expr.push(arg))
    }

    /// Append the next positional argument
    pub fn push(mut self, arg: impl Into<Node>) -> Self {
        let index = self.args.keys().filter(|k| k.is_positional()).count();
        self.args.insert(ArgKey::Index(index), arg.into());
        self
    }

    /// Set a named argument
    pub fn named(mut self, name: impl Into<String>, arg: impl Into<Node>) -> Self {
        self.args.insert(ArgKey::Name(name.into()), arg.into());
        self
    }

    /// Insert an argument under an arbitrary key (no contiguity check)
    pub fn with_arg(mut self, key: impl Into<ArgKey>, arg: impl Into<Node>) -> Self {
        self.args.insert(key.into(), arg.into());
        self
    }

    pub fn has_positional(&self) -> bool {
        self.args.keys().any(ArgKey::is_positional)
    }

    pub fn has_named(&self) -> bool {
        self.args.keys().any(|k| !k.is_positional())
    }

    /// Positional arguments in ascending index order.
    ///
    /// Fails with `MalformedArguments` unless the indices are exactly
    /// `0..n`.
    pub fn positional(&self) -> Result<Vec<&Node>> {
        let mut indexed: Vec<(usize, &Node)> = self
            .args
            .iter()
            .filter_map(|(key, node)| match key {
                ArgKey::Index(i) => Some((*i, node)),
                ArgKey::Name(_) => None,
            })
            .collect();
        indexed.sort_by_key(|(i, _)| *i);

        let contiguous = indexed.iter().enumerate().all(|(pos, (i, _))| pos == *i);
        if !contiguous {
            return Err(MolqlError::MalformedArguments {
                head: self.head.clone(),
                keys: indexed.iter().map(|(i, _)| *i).collect(),
            });
        }
        Ok(indexed.into_iter().map(|(_, node)| node).collect())
    }

    /// Named arguments in stored order
    pub fn named_args(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.args.iter().filter_map(|(key, node)| match key {
            ArgKey::Name(name) => Some((name.as_str(), node)),
            ArgKey::Index(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_numbers_positionals_in_order() {
        let expr = Expression::new("f").named("a", 1.0).push("x").push(true);
        let positional = expr.positional().unwrap();
        assert_eq!(positional.len(), 2);
        assert_eq!(positional[0], &Node::from("x"));
        assert_eq!(positional[1], &Node::from(true));
        assert_eq!(expr.named_args().count(), 1);
    }

    #[test]
    fn positional_gap_is_malformed() {
        let expr = Expression::new("f").with_arg(0usize, 1.0).with_arg(2usize, 2.0);
        match expr.positional() {
            Err(MolqlError::MalformedArguments { head, keys }) => {
                assert_eq!(head, "f");
                assert_eq!(keys, vec![0, 2]);
            }
            other => panic!("expected MalformedArguments, got {other:?}"),
        }
    }

    #[test]
    fn numeric_label_stays_named() {
        let expr = Expression::new("f").with_arg("0", 1.0);
        assert!(!expr.has_positional());
        assert!(expr.positional().unwrap().is_empty());
    }
}
