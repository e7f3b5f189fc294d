//! MolQL Lisp-like script syntax
//!
//! ```text
//! (structure.generator.atom-groups
//!   :chain-test (core.rel.eq (structure.atom-property.macromolecular.auth_asym_id) "B"))
//! ```
//!
//! Positional arguments are numbered by their order among positional
//! arguments only, so `(f :a 1 2)` and `(f 2 :a 1)` parse to the same
//! expression. Repeating a label is a syntax error.

use std::fmt::{self, Display, Write};

use winnow::ascii::multispace0;
use winnow::combinator::{alt, delimited, opt, preceded};
use winnow::error::{AddContext, ContextError, ErrMode, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::stream::Stream;
use winnow::token::take_while;

use super::{DumpOptions, Syntax, SyntaxError, SyntaxWriter};
use crate::ast::{ArgKey, Expression, Literal, Node};
use crate::{MolqlError, Result};

type PResult<T> = winnow::ModalResult<T>;

const SYNTAX: &str = "molql";

/// Parse a single application from script text
pub fn parse(input: &str) -> std::result::Result<Expression, SyntaxError> {
    let input = input.trim();
    let mut stream = input;
    match application.parse_next(&mut stream) {
        Ok(parsed) if stream.trim().is_empty() => Ok(parsed),
        Ok(_) => {
            let offset = input.len() - stream.trim_start().len();
            Err(SyntaxError::at(
                SYNTAX,
                "unexpected trailing input",
                input,
                offset,
                stream.trim().len(),
            ))
        }
        Err(e) => {
            let offset = input.len().saturating_sub(stream.len());
            let message = match e {
                ErrMode::Backtrack(ctx) | ErrMode::Cut(ctx) => ctx.to_string(),
                ErrMode::Incomplete(_) => String::new(),
            };
            let message = if message.is_empty() {
                "invalid expression".to_string()
            } else {
                message
            };
            Err(SyntaxError::at(SYNTAX, message, input, offset, token_len(&input[offset..])))
        }
    }
}

fn token_len(rest: &str) -> usize {
    rest.find(|c: char| c.is_whitespace() || matches!(c, '(' | ')'))
        .unwrap_or(rest.len())
        .max(1)
}

// ============ Grammar ============

fn application(input: &mut &str) -> PResult<Expression> {
    ('(', ws).parse_next(input)?;
    let head = bare_token
        .context(StrContext::Expected(StrContextValue::Description("symbol")))
        .parse_next(input)?;
    let mut expr = Expression::new(head);

    loop {
        ws.parse_next(input)?;
        if opt(')').parse_next(input)?.is_some() {
            return Ok(expr);
        }

        let start = input.checkpoint();
        let label = opt(preceded(':', bare_token)).parse_next(input)?;
        if label.is_some() {
            ws.parse_next(input)?;
        }
        let value = node
            .context(StrContext::Expected(StrContextValue::Description("argument")))
            .parse_next(input)?;

        match label {
            Some(label) => {
                let key = ArgKey::Name(label.to_string());
                if expr.args.contains_key(&key) {
                    input.reset(&start);
                    return Err(ErrMode::Cut(ContextError::new().add_context(
                        input,
                        &start,
                        StrContext::Expected(StrContextValue::Description("unique argument label")),
                    )));
                }
                expr.args.insert(key, value);
            }
            None => expr = expr.push(value),
        }
    }
}

fn node(input: &mut &str) -> PResult<Node> {
    alt((
        application.map(Node::Expr),
        string_lit.map(|s| Node::Literal(Literal::String(s))),
        literal_token.map(Node::Literal),
    ))
    .parse_next(input)
}

/// Unquoted literal; numerals that overflow `f64` are rejected
fn literal_token(input: &mut &str) -> PResult<Literal> {
    let start = input.checkpoint();
    let token = bare_token.parse_next(input)?;
    match decode_token(token) {
        Literal::Number(n) if !n.is_finite() => {
            input.reset(&start);
            Err(ErrMode::Cut(ContextError::new().add_context(
                input,
                &start,
                StrContext::Expected(StrContextValue::Description("finite number")),
            )))
        }
        lit => Ok(lit),
    }
}

fn is_token_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '"' | ':')
}

fn bare_token<'a>(input: &mut &'a str) -> PResult<&'a str> {
    take_while(1.., is_token_char).parse_next(input)
}

/// Numbers and case-insensitive booleans; anything else is a string
fn decode_token(token: &str) -> Literal {
    if token.eq_ignore_ascii_case("true") {
        return Literal::Bool(true);
    }
    if token.eq_ignore_ascii_case("false") {
        return Literal::Bool(false);
    }
    let numeric = token.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | '.'))
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    match token.parse::<f64>() {
        Ok(n) if numeric => Literal::Number(n),
        _ => Literal::String(token.to_string()),
    }
}

fn string_lit(input: &mut &str) -> PResult<String> {
    delimited('"', string_contents, '"').parse_next(input)
}

fn string_contents(input: &mut &str) -> PResult<String> {
    let mut result = String::new();
    loop {
        let Some(c) = input.chars().next() else {
            return Err(ErrMode::Backtrack(ContextError::new()));
        };
        if c == '"' {
            break;
        }
        *input = &input[c.len_utf8()..];
        if c == '\\' {
            let Some(escaped) = input.chars().next() else {
                return Err(ErrMode::Backtrack(ContextError::new()));
            };
            result.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                _ => escaped,
            });
            *input = &input[escaped.len_utf8()..];
        } else {
            result.push(c);
        }
    }
    Ok(result)
}

fn ws(input: &mut &str) -> PResult<()> {
    multispace0.void().parse_next(input)
}

// ============ Writing ============

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "\"{}\"", escape_string(s)),
            Literal::Number(n) => write!(f, "{n}"),
            Literal::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Compact single-line script form
impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.head)?;
        for (label, node) in ordered_args(self) {
            write!(f, " ")?;
            if let Some(label) = label {
                write!(f, ":{label} ")?;
            }
            match node {
                Node::Expr(e) => write!(f, "{e}")?,
                Node::Literal(lit) => write!(f, "{lit}")?,
            }
        }
        write!(f, ")")
    }
}

/// Positional arguments by ascending index, then named in stored order
fn ordered_args(expr: &Expression) -> Vec<(Option<&str>, &Node)> {
    let mut positional: Vec<(usize, &Node)> = expr
        .args
        .iter()
        .filter_map(|(key, node)| match key {
            ArgKey::Index(i) => Some((*i, node)),
            ArgKey::Name(_) => None,
        })
        .collect();
    positional.sort_by_key(|(i, _)| *i);

    positional
        .into_iter()
        .map(|(_, node)| (None, node))
        .chain(expr.named_args().map(|(name, node)| (Some(name), node)))
        .collect()
}

/// One argument per line, two extra spaces per nesting level
pub fn pretty(expr: &Expression, indent: usize) -> String {
    let mut out = String::new();
    write_pretty(&mut out, None, expr, indent);
    out
}

fn write_pretty(out: &mut String, label: Option<&str>, expr: &Expression, indent: usize) {
    let pad = " ".repeat(indent);
    let label = label.map(|l| format!(":{l} ")).unwrap_or_default();
    let args = ordered_args(expr);

    if args.is_empty() {
        let _ = writeln!(out, "{pad}{label}({})", expr.head);
        return;
    }

    let _ = writeln!(out, "{pad}{label}({}", expr.head);
    for (arg_label, node) in args {
        match node {
            Node::Expr(e) => write_pretty(out, arg_label, e, indent + 2),
            Node::Literal(lit) => {
                let arg_label = arg_label.map(|l| format!(":{l} ")).unwrap_or_default();
                let _ = writeln!(out, "{}{arg_label}{lit}", " ".repeat(indent + 2));
            }
        }
    }
    let _ = writeln!(out, "{pad})");
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// The `molql` script syntax
#[derive(Debug, Clone, Copy, Default)]
pub struct LispSyntax;

impl Syntax for LispSyntax {
    fn name(&self) -> &str {
        SYNTAX
    }

    fn parse(&self, text: &str) -> Result<Expression> {
        Ok(parse(text)?)
    }

    fn writer(&self) -> Option<&dyn SyntaxWriter> {
        Some(self)
    }
}

/// Reject trees the script form would print ambiguously: heads and labels
/// that are not bare tokens, non-finite numbers, positional gaps
fn check_writable(expr: &Expression) -> Result<()> {
    let bare = |s: &str| !s.is_empty() && s.chars().all(is_token_char);
    if !bare(&expr.head) {
        return Err(MolqlError::MalformedQuery(format!(
            "head {:?} cannot be written as a script symbol",
            expr.head
        )));
    }
    expr.positional()?;
    for (key, node) in &expr.args {
        match key {
            ArgKey::Name(label) if !bare(label) => {
                return Err(MolqlError::MalformedQuery(format!(
                    "label {label:?} of '{}' cannot be written as a script label",
                    expr.head
                )));
            }
            _ => {}
        }
        match node {
            Node::Expr(inner) => check_writable(inner)?,
            Node::Literal(Literal::Number(n)) if !n.is_finite() => {
                return Err(MolqlError::MalformedQuery(format!("{n} has no script form")));
            }
            Node::Literal(_) => {}
        }
    }
    Ok(())
}

impl SyntaxWriter for LispSyntax {
    fn write(&self, expr: &Expression, options: &DumpOptions) -> Result<String> {
        check_writable(expr)?;
        Ok(match options.indent {
            Some(indent) => pretty(expr, indent),
            None => expr.to_string(),
        })
    }
}

// ============ Sanity Tests ============
// Cross-syntax behavior is covered in tests/integration.rs
