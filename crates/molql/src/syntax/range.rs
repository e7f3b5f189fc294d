//! Residue-range syntax: `A.1-10,B,C.5`
//!
//! Ranges are desugared into a `structure.generator.atom-groups` expression,
//! so they evaluate through the same symbols as every other syntax. The
//! desugared query also keeps the conventions of the plain chain/range
//! selector: first model only, hetero residues skipped, hydrogens dropped.

use std::fmt;

use winnow::ascii::digit1;
use winnow::combinator::{eof, opt, preceded};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use super::{Syntax, SyntaxError};
use crate::Result;
use crate::ast::Expression;
use crate::structure::HYDROGEN_NAME_PATTERN;
use crate::symbols::names;

type PResult<T> = winnow::ModalResult<T>;

const SYNTAX: &str = "range";

/// One residue endpoint: sequence number plus insertion code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResidueBound {
    pub seq: i32,
    /// `' '` when absent
    pub icode: char,
}

impl ResidueBound {
    pub fn new(seq: i32) -> Self {
        Self { seq, icode: ' ' }
    }
}

/// An inclusive residue range on one chain.
///
/// A missing `start` means the beginning of the chain, a missing `end` the
/// end of the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeItem {
    pub chain_id: String,
    pub start: Option<ResidueBound>,
    pub end: Option<ResidueBound>,
}

impl fmt::Display for RangeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = |b: Option<ResidueBound>, open: &str| match b {
            Some(b) => format!("{}{}", b.seq, b.icode.to_string().trim()),
            None => open.to_string(),
        };
        write!(
            f,
            "{}.{}-{}",
            self.chain_id,
            bound(self.start, "^"),
            bound(self.end, "$")
        )
    }
}

/// Parse a comma-separated list of ranges
pub fn parse_ranges(input: &str) -> std::result::Result<Vec<RangeItem>, SyntaxError> {
    let mut items = Vec::new();
    let mut offset = 0usize;

    for piece in input.split(',') {
        let lead = piece.len() - piece.trim_start().len();
        let item_text = piece.trim();
        let start = offset + lead;
        offset += piece.len() + 1;

        if item_text.is_empty() {
            return Err(SyntaxError::at(SYNTAX, "empty range", input, start, piece.len()));
        }

        let mut stream = item_text;
        match range_item.parse_next(&mut stream) {
            Ok(item) => items.push(item),
            Err(_) => {
                let failed_at = item_text.len() - stream.len();
                return Err(SyntaxError::at(
                    SYNTAX,
                    format!("malformed range '{item_text}' near column {}", failed_at + 1),
                    input,
                    start + failed_at,
                    item_text.len() - failed_at,
                ));
            }
        }
    }

    Ok(items)
}

fn range_item(input: &mut &str) -> PResult<RangeItem> {
    let chain_id = take_while(1.., |c: char| c.is_ascii_alphanumeric()).parse_next(input)?;
    let residues = opt(preceded('.', (residue, opt(preceded('-', residue))))).parse_next(input)?;
    eof.parse_next(input)?;

    let (start, end) = match residues {
        Some((start, end)) => (Some(start), end),
        None => (None, None),
    };
    Ok(RangeItem {
        chain_id: chain_id.to_string(),
        start,
        end,
    })
}

fn residue(input: &mut &str) -> PResult<ResidueBound> {
    let seq = (opt(one_of(['+', '-'])), digit1)
        .take()
        .try_map(|s: &str| s.parse::<i32>())
        .parse_next(input)?;
    let icode = opt(one_of(|c: char| c.is_ascii_alphabetic())).parse_next(input)?;
    Ok(ResidueBound {
        seq,
        icode: icode.unwrap_or(' '),
    })
}

// ============ Desugaring ============

/// Rewrite parsed ranges as an atom-groups query
pub fn to_expression(items: &[RangeItem]) -> Expression {
    let mut chain_ids: Vec<&str> = Vec::new();
    for item in items {
        if !chain_ids.contains(&item.chain_id.as_str()) {
            chain_ids.push(&item.chain_id);
        }
    }

    let chain_test = any_of(chain_ids.into_iter().map(chain_is).collect());

    let per_range = items
        .iter()
        .map(|item| {
            let mut tests = vec![chain_is(&item.chain_id)];
            let seq = || Expression::new(names::AUTH_SEQ_ID);
            match (item.start, item.end) {
                (Some(start), Some(end)) => tests.push(
                    Expression::new(names::IN_RANGE)
                        .push(seq())
                        .push(f64::from(start.seq))
                        .push(f64::from(end.seq)),
                ),
                (Some(start), None) => tests.push(
                    Expression::new(names::GRE)
                        .push(seq())
                        .push(f64::from(start.seq)),
                ),
                (None, Some(end)) => tests.push(
                    Expression::new(names::LTE)
                        .push(seq())
                        .push(f64::from(end.seq)),
                ),
                (None, None) => {}
            }
            all_of(tests)
        })
        .collect();

    let polymer = Expression::new(names::EQ)
        .push(Expression::new(names::GROUP_PDB))
        .push("ATOM");
    let residue_test = all_of(vec![polymer, any_of(per_range)]);

    let atom_test = Expression::new(names::NOT).push(
        Expression::new(names::STR_MATCH)
            .push(HYDROGEN_NAME_PATTERN)
            .push(Expression::new(names::AUTH_ATOM_ID)),
    );

    Expression::new(names::ATOM_GROUPS)
        .named("chain-test", chain_test)
        .named("residue-test", residue_test)
        .named("atom-test", atom_test)
}

fn chain_is(chain_id: &str) -> Expression {
    Expression::new(names::EQ)
        .push(Expression::new(names::AUTH_ASYM_ID))
        .push(chain_id)
}

fn all_of(mut tests: Vec<Expression>) -> Expression {
    if tests.len() == 1 {
        tests.remove(0)
    } else {
        Expression::apply(names::AND, tests)
    }
}

fn any_of(mut tests: Vec<Expression>) -> Expression {
    if tests.len() == 1 {
        tests.remove(0)
    } else {
        Expression::apply(names::OR, tests)
    }
}

/// The `range` syntax (parse only)
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeSyntax;

impl Syntax for RangeSyntax {
    fn name(&self) -> &str {
        SYNTAX
    }

    fn parse(&self, text: &str) -> Result<Expression> {
        let items = parse_ranges(text.trim())?;
        Ok(to_expression(&items))
    }
}
