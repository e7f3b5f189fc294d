//! Evaluator that walks an [`Expression`] against a [`Structure`]
//!
//! Every node is resolved through the symbol registry. Value symbols receive
//! their evaluated operands. Generators and forms receive nested expressions
//! unevaluated ([`Value::Test`]) and decide themselves when, and against which
//! element, to run them.

use std::fmt;

use indexmap::IndexMap;

use crate::ast::{Expression, Literal, Node};
use crate::structure::{Atom, Chain, Model, Residue, Structure};
use crate::symbols::{SymbolKind, SymbolRegistry};
use crate::{MolqlError, Result};

/// One match group
pub type Fragment<'a> = Vec<&'a Atom>;

pub type FragmentIter<'a> = Box<dyn Iterator<Item = Result<Fragment<'a>>> + 'a>;

/// Runtime value produced by evaluation
pub enum Value<'a> {
    Literal(Literal),
    Set(Vec<Literal>),
    /// Unevaluated test handed to a generator
    Test(&'a Expression),
    /// Lazy fragment sequence from a generator
    Fragments(FragmentIter<'a>),
}

impl fmt::Debug for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Literal(lit) => f.debug_tuple("Literal").field(lit).finish(),
            Value::Set(items) => f.debug_tuple("Set").field(items).finish(),
            Value::Test(expr) => f.debug_tuple("Test").field(&expr.head).finish(),
            Value::Fragments(_) => f.write_str("Fragments(..)"),
        }
    }
}

impl<'a> Value<'a> {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Literal(lit) => lit.type_name(),
            Value::Set(_) => "set",
            Value::Test(_) => "test",
            Value::Fragments(_) => "fragments",
        }
    }

    pub fn into_literal(self) -> Result<Literal> {
        match self {
            Value::Literal(lit) => Ok(lit),
            other => Err(type_error("literal", &other)),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Literal(Literal::Bool(b)) => Ok(*b),
            other => Err(type_error("boolean", other)),
        }
    }

    pub fn as_number(&self) -> Result<f64> {
        match self {
            Value::Literal(Literal::Number(n)) => Ok(*n),
            other => Err(type_error("number", other)),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Literal(Literal::String(s)) => Ok(s),
            other => Err(type_error("string", other)),
        }
    }
}

fn type_error(expected: &str, got: &Value<'_>) -> MolqlError {
    MolqlError::Evaluation(format!("expected {expected}, got {}", got.type_name()))
}

// ============ Operands ============

/// Evaluated arguments passed to a symbol implementation
#[derive(Debug)]
pub struct Operands<'a> {
    head: &'a str,
    pub positional: Vec<Value<'a>>,
    pub named: IndexMap<&'a str, Value<'a>>,
}

impl<'a> Operands<'a> {
    pub fn head(&self) -> &'a str {
        self.head
    }

    /// Remove a named operand
    pub fn take(&mut self, name: &str) -> Option<Value<'a>> {
        self.named.shift_remove(name)
    }

    /// Exactly `N` positional operands and no named ones
    pub fn exactly<const N: usize>(self) -> Result<[Value<'a>; N]> {
        let head = self.head;
        self.no_named()?;
        let count = self.positional.len();
        <[Value<'a>; N]>::try_from(self.positional).map_err(|_| {
            MolqlError::Evaluation(format!("'{head}' takes {N} argument(s), got {count}"))
        })
    }

    /// All positional operands; fails on named ones
    pub fn into_positional(self) -> Result<Vec<Value<'a>>> {
        self.no_named()?;
        Ok(self.positional)
    }

    fn no_named(&self) -> Result<()> {
        match self.named.keys().next() {
            Some(name) => Err(MolqlError::Evaluation(format!(
                "'{}' has no argument named '{name}'",
                self.head
            ))),
            None => Ok(()),
        }
    }
}

// ============ Context ============

/// Position in the hierarchy a test is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    pub model: &'a Model,
    pub chain: Option<&'a Chain>,
    pub residue: Option<&'a Residue>,
    pub atom: Option<&'a Atom>,
}

impl<'a> Cursor<'a> {
    pub fn model(model: &'a Model) -> Self {
        Self {
            model,
            chain: None,
            residue: None,
            atom: None,
        }
    }

    pub fn with_chain(self, chain: &'a Chain) -> Self {
        Self {
            chain: Some(chain),
            ..self
        }
    }

    pub fn with_residue(self, residue: &'a Residue) -> Self {
        Self {
            residue: Some(residue),
            ..self
        }
    }

    pub fn with_atom(self, atom: &'a Atom) -> Self {
        Self {
            atom: Some(atom),
            ..self
        }
    }
}

/// One query expression bound to one structure.
///
/// Cheap to copy; [`EvalContext::at`] derives a context focused on a single
/// element for generator tests.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    root: &'a Expression,
    structure: &'a Structure,
    symbols: &'a SymbolRegistry,
    cursor: Option<Cursor<'a>>,
}

impl<'a> EvalContext<'a> {
    pub fn new(root: &'a Expression, structure: &'a Structure, symbols: &'a SymbolRegistry) -> Self {
        Self {
            root,
            structure,
            symbols,
            cursor: None,
        }
    }

    pub fn root(&self) -> &'a Expression {
        self.root
    }

    pub fn structure(&self) -> &'a Structure {
        self.structure
    }

    /// Element under test, if any
    pub fn cursor(&self) -> Option<Cursor<'a>> {
        self.cursor
    }

    pub fn at(&self, cursor: Cursor<'a>) -> Self {
        Self {
            cursor: Some(cursor),
            ..*self
        }
    }

    /// Evaluate the root and return its fragments (lazily)
    pub fn apply(self) -> Fragments<'a> {
        Fragments {
            state: State::Pending(self),
        }
    }

    fn eval_root(&self) -> Result<FragmentIter<'a>> {
        validate(self.root, self.symbols)?;
        if self.symbols.get(&self.root.head)?.kind() != SymbolKind::Generator {
            return Err(MolqlError::MalformedQuery(format!(
                "top-level '{}' is not a generator",
                self.root.head
            )));
        }
        log::debug!("applying query rooted at '{}'", self.root.head);
        match self.eval_expression(self.root, true)? {
            Value::Fragments(iter) => Ok(iter),
            other => Err(MolqlError::Evaluation(format!(
                "generator '{}' produced a {}",
                self.root.head,
                other.type_name()
            ))),
        }
    }

    /// Evaluate a nested node
    pub fn eval(&self, node: &'a Node) -> Result<Value<'a>> {
        match node {
            Node::Literal(lit) => Ok(Value::Literal(lit.clone())),
            Node::Expr(expr) => self.eval_expression(expr, false),
        }
    }

    fn eval_expression(&self, expr: &'a Expression, top_level: bool) -> Result<Value<'a>> {
        let positional = expr.positional()?;
        let symbol = self.symbols.get(&expr.head)?;
        let quote = match symbol.kind() {
            SymbolKind::Generator if !top_level => return Err(nested_generator(&expr.head)),
            SymbolKind::Generator | SymbolKind::Form => true,
            SymbolKind::Value => false,
        };

        let operand = |node: &'a Node| match node {
            Node::Expr(inner) if quote => Ok(Value::Test(inner)),
            _ => self.eval(node),
        };

        let positional = positional
            .into_iter()
            .map(&operand)
            .collect::<Result<Vec<_>>>()?;
        let mut named = IndexMap::new();
        for (name, node) in expr.named_args() {
            named.insert(name, operand(node)?);
        }

        log::trace!("invoking '{}'", expr.head);
        symbol.call(
            self,
            Operands {
                head: &expr.head,
                positional,
                named,
            },
        )
    }

    /// Evaluate an operand a form received unevaluated
    pub fn force(&self, value: Value<'a>) -> Result<Value<'a>> {
        match value {
            Value::Test(expr) => self.eval_expression(expr, false),
            other => Ok(other),
        }
    }

    /// Run a generator test against one element
    pub fn test(&self, test: &Value<'a>, cursor: Cursor<'a>) -> Result<bool> {
        match test {
            Value::Test(expr) => self.at(cursor).eval_expression(*expr, false)?.as_bool(),
            other => other.as_bool(),
        }
    }
}

fn nested_generator(head: &str) -> MolqlError {
    MolqlError::MalformedQuery(format!(
        "generator '{head}' may only appear at the top level"
    ))
}

/// Check the whole tree before anything runs: contiguous positional keys,
/// every head registered, generators only at the root.
pub fn validate(root: &Expression, symbols: &SymbolRegistry) -> Result<()> {
    fn walk(expr: &Expression, symbols: &SymbolRegistry, top_level: bool) -> Result<()> {
        expr.positional()?;
        let symbol = symbols.get(&expr.head)?;
        if symbol.kind() == SymbolKind::Generator && !top_level {
            return Err(nested_generator(&expr.head));
        }
        for node in expr.args.values() {
            if let Node::Expr(inner) = node {
                walk(inner, symbols, false)?;
            }
        }
        Ok(())
    }
    walk(root, symbols, true)
}

// ============ Fragment sequence ============

/// Lazy fragment sequence returned by [`EvalContext::apply`].
///
/// The root is evaluated on the first pull. The first error ends the
/// sequence.
pub struct Fragments<'a> {
    state: State<'a>,
}

enum State<'a> {
    Pending(EvalContext<'a>),
    Running(FragmentIter<'a>),
    Done,
}

impl<'a> Iterator for Fragments<'a> {
    type Item = Result<Fragment<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Pending(ctx) => match ctx.eval_root() {
                Ok(iter) => {
                    self.state = State::Running(iter);
                    self.next()
                }
                Err(e) => Some(Err(e)),
            },
            State::Running(mut iter) => match iter.next() {
                Some(Ok(fragment)) => {
                    self.state = State::Running(iter);
                    Some(Ok(fragment))
                }
                other => other,
            },
            State::Done => None,
        }
    }
}
