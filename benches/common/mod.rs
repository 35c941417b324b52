use std::path::Path;

use pycxx::ast::Program;
use pycxx::parser;
use test_support::{Case, load_cases};

/// A fixture program marked for benchmarking.
pub struct Workload {
    pub name: String,
    pub source: String,
    pub program: Program,
}

pub fn load_workloads() -> Vec<Workload> {
    let cases = load_cases(Path::new("tests/programs"))
        .unwrap_or_else(|err| panic!("load fixture cases: {err:#}"));
    cases
        .iter()
        .filter(|case| case.spec.bench.enabled)
        .map(load_workload)
        .collect()
}

fn load_workload(case: &Case) -> Workload {
    let source = case
        .read_program()
        .unwrap_or_else(|err| panic!("read {}: {err:#}", case.name));
    let program = parser::parse(&source).unwrap_or_else(|err| panic!("parse {}: {err}", case.name));
    Workload {
        name: case.name.clone(),
        source,
        program,
    }
}
