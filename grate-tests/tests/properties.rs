//! Property-based coverage of idempotence, referential transparency, and
//! the integer/float/boolean equality distinctions this engine must hold
//! for *every* input, not just the concrete cases already exercised as
//! plain `#[test]`s in `end_to_end.rs`.

use proptest::prelude::*;
use serde_json::Value;

fn arbitrary_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| serde_json::json!(n)),
        (-10_000i32..10_000).prop_map(|n| serde_json::json!(f64::from(n) + 0.25)),
        "[a-z]{0,12}".prop_map(Value::String),
    ]
}

proptest! {
    /// Applying a compiled validator twice to the same accepted value
    /// returns the same value.
    #[test]
    fn evaluate_is_idempotent_on_accepted_values(value in arbitrary_scalar()) {
        let schema = serde_json::json!({"type": ["string", "number", "boolean", "null"]});
        let validator = grate::compile(&schema).unwrap();
        if let Ok(first) = validator.evaluate(&value) {
            let second = validator.evaluate(&first).unwrap();
            prop_assert_eq!(first, second);
        }
    }

    /// Repeated calls on the same validator with the same input produce the
    /// same result.
    #[test]
    fn evaluate_is_referentially_transparent(value in arbitrary_scalar()) {
        let schema = serde_json::json!({"type": ["string", "number", "boolean", "null"], "minLength": 0});
        let validator = grate::compile(&schema).unwrap();
        let a = validator.evaluate(&value);
        let b = validator.evaluate(&value);
        prop_assert_eq!(a.is_ok(), b.is_ok());
        if let (Ok(a), Ok(b)) = (a, b) {
            prop_assert_eq!(a, b);
        }
    }

    /// `type: integer` rejects every float (even a whole-valued one);
    /// `type: number` accepts both ints and floats; `true`/`false` pass
    /// neither.
    #[test]
    fn integer_rejects_floats_and_booleans_never_pass_as_numbers(
        n in any::<i64>(),
        f in any::<f64>().prop_filter("finite", |f| f.is_finite()),
    ) {
        let int_validator = grate::compile(&serde_json::json!({"type": "integer"})).unwrap();
        let num_validator = grate::compile(&serde_json::json!({"type": "number"})).unwrap();

        prop_assert!(int_validator.evaluate(&serde_json::json!(n)).is_ok());
        prop_assert!(num_validator.evaluate(&serde_json::json!(n)).is_ok());
        prop_assert!(num_validator.evaluate(&serde_json::json!(f)).is_ok());
        prop_assert!(int_validator.evaluate(&serde_json::json!(f)).is_err());
        prop_assert!(int_validator.evaluate(&Value::Bool(true)).is_err());
        prop_assert!(num_validator.evaluate(&Value::Bool(true)).is_err());
    }

    /// `uniqueItems`/`enum` treat `1`, `1.0`, and `true` as pairwise
    /// distinct, for any integer seed (not just a single literal `1`).
    #[test]
    fn unique_items_keeps_matching_integer_and_boolean_distinct(n in any::<i32>()) {
        let schema = serde_json::json!({"uniqueItems": true});
        let validator = grate::compile(&schema).unwrap();
        let array = serde_json::json!([n, true, false]);
        prop_assert!(validator.evaluate(&array).is_ok());
    }
}
