//! Walks the hand-authored fixtures under `suite/`, written in the JSON
//! Schema Test Suite's own per-keyword-family shape (one file per keyword
//! family, each holding a list of `{description, schema, tests:
//! [{description, data, valid}]}` groups) but not copied from the upstream
//! suite's case data. The fixture-driven harness shape is grounded on
//! `examples/chanced-grill/tests/tests/test_suite.rs`.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Group {
    description: String,
    schema: Value,
    tests: Vec<Case>,
}

#[derive(Debug, Deserialize)]
struct Case {
    description: String,
    data: Value,
    valid: bool,
}

fn run_suite_file(path: &Path) {
    let contents = fs::read_to_string(path).expect("fixture file readable");
    let groups: Vec<Group> = serde_json::from_str(&contents).expect("fixture file is valid JSON");
    for group in groups {
        let validator = grate::compile(&group.schema)
            .unwrap_or_else(|e| panic!("{}: schema failed to compile: {e}", group.description));
        for case in group.tests {
            let result = validator.evaluate(&case.data);
            assert_eq!(
                result.is_ok(),
                case.valid,
                "{} / {}: expected valid={}, got {:?}",
                group.description,
                case.description,
                case.valid,
                result
            );
        }
    }
}

#[test]
fn type_suite() {
    run_suite_file(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/suite/type.json")));
}

#[test]
fn object_suite() {
    run_suite_file(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/suite/object.json")));
}

#[test]
fn every_bundled_fixture_file_is_exercised() {
    let suite_dir = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/suite"));
    let mut seen = 0;
    for entry in fs::read_dir(suite_dir).unwrap() {
        let entry = entry.unwrap();
        if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
            run_suite_file(&entry.path());
            seen += 1;
        }
    }
    assert!(seen >= 2, "expected at least the type/object fixture files");
}
