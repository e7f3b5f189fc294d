//! Macromolecular structure hierarchy and selection-driven extraction
//!
//! Structure → Model → Chain → Residue → Atom, each level ordered as read
//! from the source file. Queries never mutate a structure: extraction copies
//! the accepted parts into a new one.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Matches atom names the plain selector treats as hydrogens (`H`, `1HB`, ...)
pub const HYDROGEN_NAME_PATTERN: &str = "^[123 ]*H";

static HYDROGEN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(HYDROGEN_NAME_PATTERN).expect("static pattern"));

pub fn is_hydrogen_name(name: &str) -> bool {
    HYDROGEN_NAME.is_match(name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub id: String,
    pub models: Vec<Model>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// 0-based position in the source file
    pub id: usize,
    /// `MODEL` record serial number
    pub serial: i32,
    pub chains: Vec<Chain>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub id: String,
    pub residues: Vec<Residue>,
}

/// `(hetero flag, sequence number, insertion code)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidueId {
    /// `" "` for standard residues, `"W"` for water, `"H_<name>"` for hetero groups
    pub hetero: String,
    pub seq: i32,
    /// `' '` when absent
    pub icode: char,
}

impl ResidueId {
    pub fn new(seq: i32) -> Self {
        Self {
            hetero: " ".to_string(),
            seq,
            icode: ' ',
        }
    }

    pub fn is_hetero(&self) -> bool {
        !self.hetero.trim().is_empty()
    }

    pub fn has_icode(&self) -> bool {
        !self.icode.is_whitespace()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Residue {
    pub id: ResidueId,
    pub name: String,
    pub segid: String,
    pub atoms: Vec<Atom>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub name: String,
    pub coord: [f64; 3],
    pub bfactor: f64,
    pub occupancy: f64,
    pub altloc: char,
    /// Name as written in the file, including padding
    pub fullname: String,
    pub serial: i64,
    pub element: String,
}

impl Structure {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            models: Vec::new(),
        }
    }

    pub fn chains(&self) -> impl Iterator<Item = &Chain> {
        self.models.iter().flat_map(|m| m.chains.iter())
    }

    pub fn residues(&self) -> impl Iterator<Item = &Residue> {
        self.chains().flat_map(|c| c.residues.iter())
    }

    pub fn atoms(&self) -> impl Iterator<Item = &Atom> {
        self.residues().flat_map(|r| r.atoms.iter())
    }
}

// ============ Selection ============

/// Per-level acceptance predicates used by [`extract_to_structure`]
pub trait Select {
    fn accept_model(&self, _model: &Model) -> bool {
        true
    }

    fn accept_chain(&self, _chain: &Chain) -> bool {
        true
    }

    fn accept_residue(&self, _chain: &Chain, _residue: &Residue) -> bool {
        true
    }

    fn accept_atom(&self, _atom: &Atom) -> bool {
        true
    }
}

/// Accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectAll;

impl Select for SelectAll {}

/// Build a new structure from the parts of `structure` that `select` accepts
pub fn extract_to_structure(structure: &Structure, select: &dyn Select) -> Structure {
    let models = structure
        .models
        .iter()
        .filter(|model| select.accept_model(model))
        .map(|model| Model {
            id: model.id,
            serial: model.serial,
            chains: model
                .chains
                .iter()
                .filter(|chain| select.accept_chain(chain))
                .map(|chain| Chain {
                    id: chain.id.clone(),
                    residues: chain
                        .residues
                        .iter()
                        .filter(|residue| select.accept_residue(chain, residue))
                        .map(|residue| Residue {
                            id: residue.id.clone(),
                            name: residue.name.clone(),
                            segid: residue.segid.clone(),
                            atoms: residue
                                .atoms
                                .iter()
                                .filter(|atom| select.accept_atom(atom))
                                .cloned()
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    Structure {
        id: structure.id.clone(),
        models,
    }
}

/// Plain chain/residue-range selector: model 0 only, standard residues with
/// `start <= seq <= end` on one chain, hydrogens dropped.
#[derive(Debug, Clone)]
pub struct ChainRangeSelector {
    pub chain_id: String,
    pub start: i32,
    pub end: i32,
    pub model_id: usize,
}

impl ChainRangeSelector {
    pub fn new(chain_id: impl Into<String>, start: i32, end: i32) -> Self {
        Self {
            chain_id: chain_id.into(),
            start,
            end,
            model_id: 0,
        }
    }
}

impl Select for ChainRangeSelector {
    fn accept_model(&self, model: &Model) -> bool {
        model.id == self.model_id
    }

    fn accept_chain(&self, chain: &Chain) -> bool {
        chain.id == self.chain_id
    }

    fn accept_residue(&self, _chain: &Chain, residue: &Residue) -> bool {
        if residue.id.is_hetero() {
            return false;
        }
        if residue.id.has_icode() {
            log::warn!(
                "Icode {} at position {} cannot be discriminated by a range",
                residue.id.icode,
                residue.id.seq
            );
        }
        (self.start..=self.end).contains(&residue.id.seq)
    }

    fn accept_atom(&self, atom: &Atom) -> bool {
        !is_hydrogen_name(&atom.name)
    }
}

/// Extract one chain's residue range into a new structure
pub fn extract(structure: &Structure, chain_id: &str, start: i32, end: i32) -> Structure {
    extract_to_structure(structure, &ChainRangeSelector::new(chain_id, start, end))
}
