//! `core.*` symbols: sets, relations, logic, strings

use std::collections::HashMap;
use std::sync::{LazyLock, PoisonError, RwLock};

use regex::Regex;

use super::{SymbolRegistry, names};
use crate::ast::Literal;
use crate::eval::{EvalContext, Operands, Value};
use crate::{MolqlError, Result};

pub(super) fn register(registry: &mut SymbolRegistry) {
    registry.register(names::SET, set);
    registry.register(names::SET_HAS, set_has);

    registry.register(names::EQ, eq);
    registry.register(names::NEQ, neq);
    registry.register(names::LT, |_, args| compare(args, |a, b| a < b));
    registry.register(names::LTE, |_, args| compare(args, |a, b| a <= b));
    registry.register(names::GR, |_, args| compare(args, |a, b| a > b));
    registry.register(names::GRE, |_, args| compare(args, |a, b| a >= b));
    registry.register(names::IN_RANGE, in_range);

    registry.register_form(names::AND, and);
    registry.register_form(names::OR, or);
    registry.register(names::NOT, not);

    registry.register(names::STR_MATCH, str_match);
}

fn bool_value<'a>(b: bool) -> Result<Value<'a>> {
    Ok(Value::Literal(Literal::Bool(b)))
}

fn set<'a>(_: &EvalContext<'a>, args: Operands<'a>) -> Result<Value<'a>> {
    let mut items: Vec<Literal> = Vec::new();
    for value in args.into_positional()? {
        let lit = value.into_literal()?;
        if !items.contains(&lit) {
            items.push(lit);
        }
    }
    Ok(Value::Set(items))
}

fn set_has<'a>(_: &EvalContext<'a>, args: Operands<'a>) -> Result<Value<'a>> {
    let [set, value] = args.exactly()?;
    let Value::Set(items) = set else {
        return Err(MolqlError::Evaluation(format!(
            "'{}' expects a set, got {}",
            names::SET_HAS,
            set.type_name()
        )));
    };
    bool_value(items.contains(&value.into_literal()?))
}

/// Equality of two literals of the same type
fn literal_eq(head: &str, a: Value<'_>, b: Value<'_>) -> Result<bool> {
    let (a, b) = (a.into_literal()?, b.into_literal()?);
    if a.type_name() != b.type_name() {
        return Err(MolqlError::Evaluation(format!(
            "'{head}' cannot compare {} with {}",
            a.type_name(),
            b.type_name()
        )));
    }
    Ok(a == b)
}

fn eq<'a>(_: &EvalContext<'a>, args: Operands<'a>) -> Result<Value<'a>> {
    let head = args.head();
    let [a, b] = args.exactly()?;
    bool_value(literal_eq(head, a, b)?)
}

fn neq<'a>(_: &EvalContext<'a>, args: Operands<'a>) -> Result<Value<'a>> {
    let head = args.head();
    let [a, b] = args.exactly()?;
    bool_value(!literal_eq(head, a, b)?)
}

fn compare<'a>(args: Operands<'a>, op: fn(f64, f64) -> bool) -> Result<Value<'a>> {
    let [a, b] = args.exactly()?;
    bool_value(op(a.as_number()?, b.as_number()?))
}

fn in_range<'a>(_: &EvalContext<'a>, args: Operands<'a>) -> Result<Value<'a>> {
    let [value, min, max] = args.exactly()?;
    let value = value.as_number()?;
    bool_value(min.as_number()? <= value && value <= max.as_number()?)
}

/// Left to right; stops at the first `false`
fn and<'a>(ctx: &EvalContext<'a>, args: Operands<'a>) -> Result<Value<'a>> {
    for value in args.into_positional()? {
        if !ctx.force(value)?.as_bool()? {
            return bool_value(false);
        }
    }
    bool_value(true)
}

/// Left to right; stops at the first `true`
fn or<'a>(ctx: &EvalContext<'a>, args: Operands<'a>) -> Result<Value<'a>> {
    for value in args.into_positional()? {
        if ctx.force(value)?.as_bool()? {
            return bool_value(true);
        }
    }
    bool_value(false)
}

fn not<'a>(_: &EvalContext<'a>, args: Operands<'a>) -> Result<Value<'a>> {
    let [value] = args.exactly()?;
    bool_value(!value.as_bool()?)
}

const PATTERN_CACHE_LIMIT: usize = 256;

/// Compiled `core.str.match` patterns shared by every query
static PATTERNS: LazyLock<RwLock<HashMap<String, Regex>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn compiled(pattern: &str) -> Result<Regex> {
    if let Some(re) = PATTERNS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(pattern)
    {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern)
        .map_err(|e| MolqlError::Evaluation(format!("invalid pattern: {e}")))?;
    let mut cache = PATTERNS.write().unwrap_or_else(PoisonError::into_inner);
    if cache.len() >= PATTERN_CACHE_LIMIT {
        cache.clear();
    }
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}

/// `(core.str.match pattern value)`: unanchored regex search
fn str_match<'a>(_: &EvalContext<'a>, args: Operands<'a>) -> Result<Value<'a>> {
    let [pattern, value] = args.exactly()?;
    let re = compiled(pattern.as_str()?)?;
    bool_value(re.is_match(value.as_str()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Expression;
    use crate::structure::Structure;

    fn eval_bool(expr: Expression) -> Result<bool> {
        let registry = SymbolRegistry::with_builtins();
        let structure = Structure::new("empty");
        let root = Expression::new("unused");
        let ctx = EvalContext::new(&root, &structure, &registry);
        let node = expr.into();
        ctx.eval(&node)?.as_bool()
    }

    #[test]
    fn relations() {
        assert!(eval_bool(Expression::apply(names::EQ, ["a", "a"])).unwrap());
        assert!(!eval_bool(Expression::apply(names::EQ, [1.0, 2.0])).unwrap());
        assert!(eval_bool(Expression::apply(names::NEQ, [1.0, 2.0])).unwrap());
        assert!(eval_bool(Expression::apply(names::LT, [1.0, 2.0])).unwrap());
        assert!(eval_bool(Expression::apply(names::GRE, [2.0, 2.0])).unwrap());
        assert!(eval_bool(Expression::apply(names::IN_RANGE, [5.0, 1.0, 5.0])).unwrap());
        assert!(!eval_bool(Expression::apply(names::IN_RANGE, [6.0, 1.0, 5.0])).unwrap());
    }

    #[test]
    fn eq_type_mismatch_is_an_error() {
        let expr = Expression::new(names::EQ).push("1").push(1.0);
        assert!(matches!(eval_bool(expr), Err(MolqlError::Evaluation(_))));
    }

    #[test]
    fn logic() {
        let t = || Expression::apply(names::EQ, [1.0, 1.0]);
        let f = || Expression::apply(names::EQ, [1.0, 2.0]);
        assert!(eval_bool(Expression::apply(names::AND, [t(), t()])).unwrap());
        assert!(!eval_bool(Expression::apply(names::AND, [t(), f()])).unwrap());
        assert!(eval_bool(Expression::apply(names::OR, [f(), t()])).unwrap());
        assert!(eval_bool(Expression::new(names::NOT).push(f())).unwrap());
        assert!(eval_bool(Expression::new(names::AND)).unwrap());
    }

    #[test]
    fn logic_short_circuits() {
        // The second operand would fail with a type mismatch if evaluated
        let bad = || Expression::new(names::EQ).push("a").push(1.0);
        let f = Expression::apply(names::EQ, [1.0, 2.0]);
        let t = Expression::apply(names::EQ, [1.0, 1.0]);
        assert!(!eval_bool(Expression::new(names::AND).push(f).push(bad())).unwrap());
        assert!(eval_bool(Expression::new(names::OR).push(t.clone()).push(bad())).unwrap());
        assert!(matches!(
            eval_bool(Expression::new(names::AND).push(t).push(bad())),
            Err(MolqlError::Evaluation(_))
        ));
        assert!(matches!(
            eval_bool(Expression::new(names::AND).push("yes")),
            Err(MolqlError::Evaluation(_))
        ));
    }

    #[test]
    fn set_membership() {
        let set = Expression::apply(names::SET, ["A", "B", "A"]);
        let has = |v: &str| Expression::new(names::SET_HAS).push(set.clone()).push(v);
        assert!(eval_bool(has("B")).unwrap());
        assert!(!eval_bool(has("C")).unwrap());

        let not_a_set = Expression::new(names::SET_HAS).push("A").push("A");
        assert!(matches!(eval_bool(not_a_set), Err(MolqlError::Evaluation(_))));
    }

    #[test]
    fn string_match() {
        let m = |p: &str, v: &str| Expression::new(names::STR_MATCH).push(p).push(v);
        assert!(eval_bool(m("^[123 ]*H", "1HB")).unwrap());
        assert!(!eval_bool(m("^[123 ]*H", "CA")).unwrap());
        assert!(matches!(eval_bool(m("(", "x")), Err(MolqlError::Evaluation(_))));
    }

    #[test]
    fn patterns_are_compiled_once() {
        let pattern = "^cached[0-9]+$";
        let first = compiled(pattern).unwrap();
        let second = compiled(pattern).unwrap();
        assert_eq!(first.as_str(), second.as_str());
        assert!(PATTERNS.read().unwrap().contains_key(pattern));

        assert!(compiled("cached(").is_err());
        assert!(!PATTERNS.read().unwrap().contains_key("cached("));
    }

    #[test]
    fn arity_is_checked() {
        let expr = Expression::apply(names::NOT, [true, false]);
        assert!(matches!(eval_bool(expr), Err(MolqlError::Evaluation(_))));
        let expr = Expression::new(names::NOT).push(true).named("x", true);
        assert!(matches!(eval_bool(expr), Err(MolqlError::Evaluation(_))));
    }
}
