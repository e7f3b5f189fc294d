use criterion::{Criterion, black_box, criterion_group, criterion_main};
use molql::structure::{Atom, Chain, Model, Residue, ResidueId, Structure};
use molql::{DumpOptions, Query};

const ATOM_NAMES: [&str; 8] = ["N", "CA", "C", "O", "CB", "H", "HA", "1HB"];

fn large_structure() -> Structure {
    let chains = ["A", "B", "C", "D"]
        .iter()
        .map(|id| Chain {
            id: id.to_string(),
            residues: (1..=500)
                .map(|seq| Residue {
                    id: ResidueId::new(seq),
                    name: "ALA".to_string(),
                    segid: String::new(),
                    atoms: ATOM_NAMES
                        .iter()
                        .enumerate()
                        .map(|(i, name)| Atom {
                            name: name.to_string(),
                            coord: [f64::from(seq), i as f64, 0.0],
                            bfactor: 20.0,
                            occupancy: 1.0,
                            altloc: ' ',
                            fullname: format!("{name:^4}"),
                            serial: i64::from(seq) * 10 + i as i64,
                            element: name.trim_start_matches('1')[..1].to_string(),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();
    Structure {
        id: "bench".to_string(),
        models: vec![Model {
            id: 0,
            serial: 1,
            chains,
        }],
    }
}

const LISP_QUERY: &str = r#"(structure.generator.atom-groups
  :chain-test (core.set.has (core.type.set "A" "C") (structure.atom-property.macromolecular.auth_asym_id))
  :residue-test (core.rel.inRange (structure.atom-property.macromolecular.auth_seq_id) 100 400)
  :atom-test (core.logic.not (core.str.match "^[123 ]*H" (structure.atom-property.macromolecular.auth_atom_id))))"#;

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_range_query", |b| {
        b.iter(|| Query::new(black_box("A.1-100,B.200-300,C,D.450"), "range").unwrap())
    });
    c.bench_function("parse_molql_query", |b| {
        b.iter(|| Query::new(black_box(LISP_QUERY), "molql").unwrap())
    });
}

fn bench_dump(c: &mut Criterion) {
    let query = Query::new(LISP_QUERY, "molql").unwrap();
    c.bench_function("dump_json_pretty", |b| {
        b.iter(|| query.dumps("json", black_box(&DumpOptions::pretty(2))).unwrap())
    });
}

fn bench_apply(c: &mut Criterion) {
    let structure = large_structure();
    let range = Query::new("A.100-400,C.100-400", "range").unwrap();
    let lisp = Query::new(LISP_QUERY, "molql").unwrap();

    c.bench_function("apply_range_query", |b| {
        b.iter(|| range.apply(black_box(&structure)).count())
    });
    c.bench_function("apply_molql_query", |b| {
        b.iter(|| lisp.apply(black_box(&structure)).count())
    });
    c.bench_function("extract_range_query", |b| {
        b.iter(|| range.extract(black_box(&structure)).unwrap())
    });
}

criterion_group!(benches, bench_parse, bench_dump, bench_apply);
criterion_main!(benches);
