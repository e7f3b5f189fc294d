//! `structure.*` symbols: the atom-groups generator and atom properties

use super::{SymbolRegistry, names};
use crate::ast::Literal;
use crate::eval::{Cursor, EvalContext, Fragment, Operands, Value};
use crate::structure::Model;
use crate::{MolqlError, Result};

/// Test names accepted by atom-groups, in positional order
const TESTS: [&str; 4] = ["model-test", "chain-test", "residue-test", "atom-test"];

type Read = fn(&Cursor<'_>) -> Option<Literal>;

pub(super) fn register(registry: &mut SymbolRegistry) {
    registry.register_generator(names::ATOM_GROUPS, atom_groups);

    let properties: [(&'static str, &'static str, Read); 10] = [
        (names::MODEL_NUM, "a model", |c| {
            Some(Literal::Number(f64::from(c.model.serial)))
        }),
        (names::AUTH_ASYM_ID, "a chain", |c| {
            c.chain.map(|chain| Literal::String(chain.id.clone()))
        }),
        (names::AUTH_SEQ_ID, "a residue", |c| {
            c.residue.map(|residue| {
                if residue.id.has_icode() {
                    log::warn!(
                        "Icode {} at position {} cannot be discriminated by a range",
                        residue.id.icode,
                        residue.id.seq
                    );
                }
                Literal::Number(f64::from(residue.id.seq))
            })
        }),
        (names::INS_CODE, "a residue", |c| {
            c.residue
                .map(|residue| Literal::String(residue.id.icode.to_string().trim().to_string()))
        }),
        (names::LABEL_COMP_ID, "a residue", |c| {
            c.residue.map(|residue| Literal::String(residue.name.clone()))
        }),
        (names::GROUP_PDB, "a residue", |c| {
            c.residue.map(|residue| {
                let group = if residue.id.is_hetero() { "HETATM" } else { "ATOM" };
                Literal::String(group.to_string())
            })
        }),
        (names::AUTH_ATOM_ID, "an atom", |c| {
            c.atom.map(|atom| Literal::String(atom.name.clone()))
        }),
        (names::B_FACTOR, "an atom", |c| {
            c.atom.map(|atom| Literal::Number(atom.bfactor))
        }),
        (names::OCCUPANCY, "an atom", |c| {
            c.atom.map(|atom| Literal::Number(atom.occupancy))
        }),
        (names::ELEMENT_SYMBOL, "an atom", |c| {
            c.atom.map(|atom| Literal::String(atom.element.clone()))
        }),
    ];
    for (name, level, read) in properties {
        register_property(registry, name, level, read);
    }
}

/// A property reads one field of the element under test and takes no arguments
fn register_property(registry: &mut SymbolRegistry, name: &'static str, level: &'static str, read: Read) {
    registry.register(name, move |ctx, args| {
        args.exactly::<0>()?;
        let cursor = ctx.cursor().ok_or_else(|| {
            MolqlError::Evaluation(format!("'{name}' is only valid inside a generator test"))
        })?;
        read(&cursor).map(Value::Literal).ok_or_else(|| {
            MolqlError::Evaluation(format!("'{name}' needs {level} in scope"))
        })
    });
}

// ============ atom-groups ============

/// Optional per-level tests, each run against every element at its level
struct GroupTests<'a> {
    model: Option<Value<'a>>,
    chain: Option<Value<'a>>,
    residue: Option<Value<'a>>,
    atom: Option<Value<'a>>,
}

/// `(structure.generator.atom-groups :model-test .. :chain-test .. :residue-test .. :atom-test ..)`
///
/// Tests may also be given positionally in that order. Without a model test
/// only the first model is searched.
fn atom_groups<'a>(ctx: &EvalContext<'a>, mut args: Operands<'a>) -> Result<Value<'a>> {
    let head = args.head();
    let positional = std::mem::take(&mut args.positional);
    if positional.len() > TESTS.len() {
        return Err(MolqlError::Evaluation(format!(
            "'{head}' takes at most {} tests, got {}",
            TESTS.len(),
            positional.len()
        )));
    }

    let mut slots: [Option<Value<'a>>; 4] = [None, None, None, None];
    for (slot, value) in slots.iter_mut().zip(positional) {
        *slot = Some(value);
    }
    for (slot, name) in slots.iter_mut().zip(TESTS) {
        if let Some(value) = args.take(name) {
            if slot.is_some() {
                return Err(MolqlError::Evaluation(format!(
                    "'{head}' got '{name}' twice"
                )));
            }
            *slot = Some(value);
        }
    }
    // Anything left is an unknown test name
    args.into_positional()?;

    let [model, chain, residue, atom] = slots;
    let tests = GroupTests {
        model,
        chain,
        residue,
        atom,
    };
    let models = &ctx.structure().models;
    let models = if tests.model.is_some() {
        &models[..]
    } else {
        &models[..models.len().min(1)]
    };

    Ok(Value::Fragments(Box::new(AtomGroups {
        ctx: *ctx,
        tests,
        models,
        pos: Position::default(),
        done: false,
    })))
}

/// Walk state; the `*_ok` flags cache the verdict for the current element
#[derive(Debug, Default)]
struct Position {
    model: usize,
    chain: usize,
    residue: usize,
    atom: usize,
    model_ok: bool,
    chain_ok: bool,
    residue_ok: bool,
}

impl Position {
    fn next_model(&mut self) {
        *self = Self {
            model: self.model + 1,
            ..Self::default()
        };
    }

    fn next_chain(&mut self) {
        self.chain += 1;
        self.residue = 0;
        self.atom = 0;
        self.chain_ok = false;
        self.residue_ok = false;
    }

    fn next_residue(&mut self) {
        self.residue += 1;
        self.atom = 0;
        self.residue_ok = false;
    }
}

/// Lazy depth-first walk yielding one single-atom fragment per accepted atom
struct AtomGroups<'a> {
    ctx: EvalContext<'a>,
    tests: GroupTests<'a>,
    models: &'a [Model],
    pos: Position,
    done: bool,
}

impl<'a> AtomGroups<'a> {
    fn accepts(&self, test: &Option<Value<'a>>, cursor: Cursor<'a>) -> Result<bool> {
        match test {
            None => Ok(true),
            Some(test) => self.ctx.test(test, cursor),
        }
    }

    fn advance(&mut self) -> Result<Option<Fragment<'a>>> {
        let models = self.models;
        loop {
            let Some(model) = models.get(self.pos.model) else {
                return Ok(None);
            };
            let cursor = Cursor::model(model);
            if !self.pos.model_ok {
                if !self.accepts(&self.tests.model, cursor)? {
                    self.pos.next_model();
                    continue;
                }
                self.pos.model_ok = true;
            }

            let Some(chain) = model.chains.get(self.pos.chain) else {
                self.pos.next_model();
                continue;
            };
            let cursor = cursor.with_chain(chain);
            if !self.pos.chain_ok {
                if !self.accepts(&self.tests.chain, cursor)? {
                    self.pos.next_chain();
                    continue;
                }
                self.pos.chain_ok = true;
            }

            let Some(residue) = chain.residues.get(self.pos.residue) else {
                self.pos.next_chain();
                continue;
            };
            let cursor = cursor.with_residue(residue);
            if !self.pos.residue_ok {
                if !self.accepts(&self.tests.residue, cursor)? {
                    self.pos.next_residue();
                    continue;
                }
                self.pos.residue_ok = true;
            }

            let Some(atom) = residue.atoms.get(self.pos.atom) else {
                self.pos.next_residue();
                continue;
            };
            self.pos.atom += 1;
            if self.accepts(&self.tests.atom, cursor.with_atom(atom))? {
                return Ok(Some(vec![atom]));
            }
        }
    }
}

impl<'a> Iterator for AtomGroups<'a> {
    type Item = Result<Fragment<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(fragment)) => Some(Ok(fragment)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Expression;
    use crate::structure::{Atom, Chain, Residue, ResidueId, Structure};

    fn atom(name: &str) -> Atom {
        Atom {
            name: name.to_string(),
            coord: [0.0; 3],
            bfactor: 20.0,
            occupancy: 1.0,
            altloc: ' ',
            fullname: format!(" {name:<3}"),
            serial: 1,
            element: name[..1].to_string(),
        }
    }

    fn residue(seq: i32, name: &str, atoms: &[&str]) -> Residue {
        Residue {
            id: ResidueId::new(seq),
            name: name.to_string(),
            segid: String::new(),
            atoms: atoms.iter().map(|n| atom(n)).collect(),
        }
    }

    fn sample() -> Structure {
        let chain = |id: &str| Chain {
            id: id.to_string(),
            residues: vec![residue(1, "GLY", &["N", "CA"]), residue(2, "ALA", &["N", "CB"])],
        };
        Structure {
            id: "s".into(),
            models: vec![
                Model {
                    id: 0,
                    serial: 1,
                    chains: vec![chain("A"), chain("B")],
                },
                Model {
                    id: 1,
                    serial: 2,
                    chains: vec![chain("A")],
                },
            ],
        }
    }

    fn eq(property: &str, value: impl Into<crate::Node>) -> Expression {
        Expression::new(names::EQ)
            .push(Expression::new(property))
            .push(value)
    }

    fn run(structure: &Structure, query: &Expression) -> Result<Vec<String>> {
        let registry = SymbolRegistry::with_builtins();
        EvalContext::new(query, structure, &registry)
            .apply()
            .map(|fragment| fragment.map(|atoms| atoms[0].name.clone()))
            .collect()
    }

    #[test]
    fn no_tests_selects_first_model_only() {
        let s = sample();
        let atoms = run(&s, &Expression::new(names::ATOM_GROUPS)).unwrap();
        assert_eq!(atoms.len(), 8);
    }

    #[test]
    fn model_test_opens_all_models() {
        let s = sample();
        let query = Expression::new(names::ATOM_GROUPS).named("model-test", true);
        assert_eq!(run(&s, &query).unwrap().len(), 12);

        let query = Expression::new(names::ATOM_GROUPS).named("model-test", eq(names::MODEL_NUM, 2.0));
        assert_eq!(run(&s, &query).unwrap().len(), 4);
    }

    #[test]
    fn named_and_positional_tests_agree() {
        let s = sample();
        let named = Expression::new(names::ATOM_GROUPS)
            .named("chain-test", eq(names::AUTH_ASYM_ID, "B"))
            .named("residue-test", eq(names::LABEL_COMP_ID, "ALA"))
            .named("atom-test", eq(names::AUTH_ATOM_ID, "CB"));
        let positional = Expression::new(names::ATOM_GROUPS)
            .push(true)
            .push(eq(names::AUTH_ASYM_ID, "B"))
            .push(eq(names::LABEL_COMP_ID, "ALA"))
            .push(eq(names::AUTH_ATOM_ID, "CB"));
        assert_eq!(run(&s, &named).unwrap(), vec!["CB"]);
        assert_eq!(run(&s, &positional).unwrap(), vec!["CB"]);
    }

    #[test]
    fn duplicate_and_unknown_tests_are_rejected() {
        let s = sample();
        let twice = Expression::new(names::ATOM_GROUPS)
            .push(true)
            .named("model-test", true);
        assert!(matches!(run(&s, &twice), Err(MolqlError::Evaluation(_))));

        let unknown = Expression::new(names::ATOM_GROUPS).named("bond-test", true);
        assert!(matches!(run(&s, &unknown), Err(MolqlError::Evaluation(_))));
    }

    #[test]
    fn property_out_of_scope_is_an_error() {
        let s = sample();
        // Atom names are not known while testing chains
        let query = Expression::new(names::ATOM_GROUPS)
            .named("chain-test", eq(names::AUTH_ATOM_ID, "N"));
        let err = run(&s, &query).unwrap_err();
        assert!(err.to_string().contains("needs an atom"));
    }

    #[test]
    fn non_boolean_test_is_an_error() {
        let s = sample();
        let query = Expression::new(names::ATOM_GROUPS)
            .named("atom-test", Expression::new(names::AUTH_ATOM_ID));
        assert!(matches!(run(&s, &query), Err(MolqlError::Evaluation(_))));
    }

    #[test]
    fn group_pdb_distinguishes_hetero_residues() {
        let mut s = sample();
        s.models[0].chains[0].residues[1].id.hetero = "H_ALA".into();
        let query = Expression::new(names::ATOM_GROUPS)
            .named("residue-test", eq(names::GROUP_PDB, "HETATM"));
        assert_eq!(run(&s, &query).unwrap(), vec!["N", "CB"]);
    }
}
