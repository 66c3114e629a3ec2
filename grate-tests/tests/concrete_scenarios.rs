//! Seven concrete end-to-end scenarios covering `if`/`then`/`else`
//! dispatch, `uniqueItems` integer/float/boolean distinctness, tuple-mode
//! `additionalItems`, `oneOf` exclusivity, `$anchor`/`$ref` resolution, and
//! self-referential schema compilation, each as its own named `#[test]`
//! rather than folded into the broader property/conformance suites.

mod common;

#[test]
fn if_then_else_us_postal_code_accepts() {
    common::init_tracing();
    let schema = serde_json::json!({
        "type": "object",
        "properties": {"country": {"enum": ["US", "CA"]}},
        "if": {"properties": {"country": {"const": "US"}}},
        "then": {"properties": {"postal_code": {"pattern": "[0-9]{5}"}}},
        "else": {"properties": {"postal_code": {"pattern": "[A-Z][0-9][A-Z] [0-9][A-Z][0-9]"}}}
    });
    let validator = grate::compile(&schema).unwrap();
    assert!(validator
        .evaluate(&serde_json::json!({"country": "US", "postal_code": "20500"}))
        .is_ok());
}

#[test]
fn if_then_else_canadian_postal_code_in_us_form_rejects() {
    common::init_tracing();
    let schema = serde_json::json!({
        "type": "object",
        "properties": {"country": {"enum": ["US", "CA"]}},
        "if": {"properties": {"country": {"const": "US"}}},
        "then": {"properties": {"postal_code": {"pattern": "[0-9]{5}"}}},
        "else": {"properties": {"postal_code": {"pattern": "[A-Z][0-9][A-Z] [0-9][A-Z][0-9]"}}}
    });
    let validator = grate::compile(&schema).unwrap();
    let err = validator
        .evaluate(&serde_json::json!({"country": "CA", "postal_code": "10000"}))
        .unwrap_err();
    assert!(err.code().starts_with("property_value_error"));
}

#[test]
fn unique_items_treats_boolean_and_float_as_distinct_from_integer() {
    common::init_tracing();
    let schema = serde_json::json!({"type": "array", "uniqueItems": true});
    let validator = grate::compile(&schema).unwrap();
    // `1` and `1.0` are different literal kinds (integer vs float) and do not
    // collide; only the two literal integer `1`s at index 0 and 2 do.
    let err = validator.evaluate(&serde_json::json!([1, 1.0, 1])).unwrap_err();
    assert_eq!(err.code(), "unique_items_error");
}

#[test]
fn tuple_mode_rejects_disallowed_additional_item() {
    common::init_tracing();
    let schema = serde_json::json!({
        "type": "array",
        "items": [{"type": "number"}, {"type": "string"}],
        "additionalItems": false
    });
    let validator = grate::compile(&schema).unwrap();
    let err = validator
        .evaluate(&serde_json::json!([1, "a", "extra"]))
        .unwrap_err();
    assert_eq!(err.code(), "additional_items_error");
}

#[test]
fn one_of_rejects_a_value_matching_both_branches() {
    common::init_tracing();
    let schema = serde_json::json!({
        "oneOf": [
            {"type": "number", "multipleOf": 5},
            {"type": "number", "multipleOf": 3}
        ]
    });
    let validator = grate::compile(&schema).unwrap();
    let err = validator.evaluate(&serde_json::json!(15)).unwrap_err();
    assert_eq!(err.code(), "one_of_error");
}

#[test]
fn ref_to_an_anchored_subschema_in_defs_accepts() {
    common::init_tracing();
    let schema = serde_json::json!({
        "type": "object",
        "properties": {
            "name": {"type": "string", "minLength": 2},
            "email": {"$ref": "#/$defs/email"}
        },
        "$defs": {
            "email": {"$anchor": "email", "type": "string", "format": "email"}
        }
    });
    let validator = grate::compile(&schema).unwrap();
    assert!(validator
        .evaluate(&serde_json::json!({"name": "Bob", "email": "bob@test.com"}))
        .is_ok());
}

#[test]
fn self_referential_definitions_compile_without_infinite_recursion() {
    common::init_tracing();
    let schema = serde_json::json!({
        "definitions": {
            "Item": {"type": "object", "items": {"$ref": "#/definitions/Item"}}
        }
    });
    grate::compile(&schema).unwrap();
}
