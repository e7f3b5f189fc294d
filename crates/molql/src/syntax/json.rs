//! MolQL JSON syntax
//!
//! ```json
//! {"source": "...", "version": "0.1.0",
//!  "expression": {"head": "core.rel.eq", "args": [{"head": "..."}, "B"]}}
//! ```
//!
//! An `args` array holds positional arguments; an `args` object holds named
//! arguments, even when a key looks like a number. An expression mixing
//! both kinds therefore has no JSON form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as Json};

use super::{DumpOptions, Syntax, SyntaxError, SyntaxWriter};
use crate::ast::{ArgKey, Expression, Literal, Node};
use crate::{MolqlError, Result};

const SYNTAX: &str = "json";

/// Query language version written to documents
pub const MOLQL_VERSION: &str = "0.1.0";

/// `source` field written to documents
pub const SOURCE: &str = concat!("molql-rs ", env!("CARGO_PKG_VERSION"));

/// Document envelope. `source` and `version` are metadata only.
#[derive(Debug, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    expression: Option<Json>,
}

pub fn parse(text: &str) -> Result<Expression> {
    let doc: Document = serde_json::from_str(text).map_err(|e| json_error(text, &e))?;
    let root = doc
        .expression
        .ok_or_else(|| MolqlError::MalformedQuery("missing 'expression'".into()))?;
    match decode_node(&root)? {
        Node::Expr(expr) => Ok(expr),
        Node::Literal(_) => Err(MolqlError::MalformedQuery(
            "'expression' must be an object with a 'head'".into(),
        )),
    }
}

fn json_error(text: &str, e: &serde_json::Error) -> MolqlError {
    // serde_json reports 1-based line and column
    let offset = text
        .split_inclusive('\n')
        .take(e.line().saturating_sub(1))
        .map(str::len)
        .sum::<usize>()
        + e.column().saturating_sub(1);
    SyntaxError::at(SYNTAX, e.to_string(), text, offset, 1).into()
}

fn decode_node(value: &Json) -> Result<Node> {
    match value {
        Json::String(s) => Ok(Node::Literal(Literal::String(s.clone()))),
        Json::Bool(b) => Ok(Node::Literal(Literal::Bool(*b))),
        Json::Number(n) => n
            .as_f64()
            .map(|n| Node::Literal(Literal::Number(n)))
            .ok_or_else(|| MolqlError::MalformedQuery(format!("unrepresentable number {n}"))),
        Json::Object(obj) => decode_expression(obj).map(Node::Expr),
        Json::Null | Json::Array(_) => Err(MolqlError::MalformedQuery(format!(
            "unsupported argument value {value}"
        ))),
    }
}

fn decode_expression(obj: &Map<String, Json>) -> Result<Expression> {
    let head = match obj.get("head") {
        Some(Json::String(head)) => head,
        Some(other) => {
            return Err(MolqlError::MalformedQuery(format!(
                "'head' must be a string, got {other}"
            )));
        }
        None => return Err(MolqlError::MalformedQuery("missing 'head'".into())),
    };

    let mut expr = Expression::new(head.as_str());
    match obj.get("args") {
        None => {}
        Some(Json::Array(items)) => {
            for item in items {
                expr = expr.push(decode_node(item)?);
            }
        }
        Some(Json::Object(named)) => {
            for (name, item) in named {
                expr = expr.named(name.as_str(), decode_node(item)?);
            }
        }
        Some(other) => {
            return Err(MolqlError::MalformedQuery(format!(
                "'args' of '{head}' must be an array or object, got {other}"
            )));
        }
    }
    Ok(expr)
}

// ============ Writing ============

pub fn to_document(expr: &Expression) -> Result<Json> {
    let doc = Document {
        source: Some(SOURCE.to_string()),
        version: Some(MOLQL_VERSION.to_string()),
        expression: Some(encode_expression(expr)?),
    };
    serde_json::to_value(doc).map_err(|e| MolqlError::MalformedQuery(e.to_string()))
}

fn encode_expression(expr: &Expression) -> Result<Json> {
    let mut obj = Map::new();
    obj.insert("head".into(), Json::String(expr.head.clone()));

    match (expr.has_positional(), expr.has_named()) {
        (false, false) => {}
        (true, false) => {
            let items = expr
                .positional()?
                .into_iter()
                .map(encode_node)
                .collect::<Result<Vec<_>>>()?;
            obj.insert("args".into(), Json::Array(items));
        }
        (false, true) => {
            let mut named = Map::new();
            for (key, node) in &expr.args {
                if let ArgKey::Name(name) = key {
                    named.insert(name.clone(), encode_node(node)?);
                }
            }
            obj.insert("args".into(), Json::Object(named));
        }
        (true, true) => {
            return Err(MolqlError::MalformedQuery(format!(
                "'{}' mixes positional and named arguments, which JSON cannot express",
                expr.head
            )));
        }
    }
    Ok(Json::Object(obj))
}

fn encode_node(node: &Node) -> Result<Json> {
    match node {
        Node::Expr(expr) => encode_expression(expr),
        Node::Literal(Literal::String(s)) => Ok(Json::String(s.clone())),
        Node::Literal(Literal::Bool(b)) => Ok(Json::Bool(*b)),
        Node::Literal(Literal::Number(n)) => Number::from_f64(*n)
            .map(Json::Number)
            .ok_or_else(|| MolqlError::MalformedQuery(format!("{n} has no JSON form"))),
    }
}

/// The `json` syntax
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSyntax;

impl Syntax for JsonSyntax {
    fn name(&self) -> &str {
        SYNTAX
    }

    fn parse(&self, text: &str) -> Result<Expression> {
        parse(text)
    }

    fn writer(&self) -> Option<&dyn SyntaxWriter> {
        Some(self)
    }
}

impl SyntaxWriter for JsonSyntax {
    fn write(&self, expr: &Expression, options: &DumpOptions) -> Result<String> {
        let doc = to_document(expr)?;
        let text = match options.indent {
            None => serde_json::to_string(&doc),
            Some(indent) => {
                let indent = " ".repeat(indent);
                let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
                let mut buf = Vec::new();
                let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
                doc.serialize(&mut ser)
                    .map(|()| String::from_utf8_lossy(&buf).into_owned())
            }
        };
        text.map_err(|e| MolqlError::MalformedQuery(e.to_string()))
    }
}
