//! Error taxonomy.
//!
//! `ValidationError` is the runtime evaluator's failure type: a single closed
//! enum of machine-readable codes, one variant per leaf check, following the
//! struct-per-error / umbrella-enum convention this crate is grounded on
//! (`grill::error`). Unlike `grill`'s per-crate error domains, the evaluator
//! has one flat, closed code set, so leaf variants live directly on the
//! umbrella enum rather than in satellite structs.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::uri::AbsoluteUri;

/// A single validation failure. Construction order matters: evaluators
/// report the first failure encountered and stop; they never accumulate a
/// list of errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Value `{value}` is not of type `{expected_type}`.")]
    Type { value: Value, expected_type: String },

    #[error("Value `{value}` did not match any of the allowed values.")]
    Enum { value: Value },

    #[error("Value `{value}` is not equal to `{expected}`.")]
    Equal { value: Value, expected: Value },

    #[error("Value `{value}` does not match format `{format_name}`.")]
    Format { value: Value, format_name: String },

    #[error("String `{value}` is shorter than the minimum length of `{minimum}`.")]
    MinimumLength { value: String, minimum: usize },

    #[error("String `{value}` is longer than the maximum length of `{maximum}`.")]
    MaximumLength { value: String, maximum: usize },

    #[error("String `{value}` does not match pattern `{pattern}`.")]
    Pattern { value: String, pattern: String },

    #[error("Value `{value}` is not a multiple of `{multiple_of}`.")]
    MultipleOf { value: Value, multiple_of: Value },

    #[error("Value `{value}` is less than the minimum of `{minimum}`.")]
    Minimum { value: Value, minimum: Value },

    #[error("Value `{value}` is greater than the maximum of `{maximum}`.")]
    Maximum { value: Value, maximum: Value },

    #[error("Array `{value}` contains duplicate items.")]
    UniqueItems { value: Value },

    #[error("Array `{value}` contains items beyond the allowed tuple length.")]
    AdditionalItems { value: Value },

    #[error("Array `{value}` has fewer than `{minimum}` items.")]
    MinimumItems { value: Value, minimum: usize },

    #[error("Array `{value}` has more than `{maximum}` items.")]
    MaximumItems { value: Value, maximum: usize },

    #[error("Required property `{property_name}` is missing.")]
    RequiredProperty { property_name: String },

    #[error("Property `{property_name}` is invalid: {validation_error}")]
    PropertyValue {
        property_name: String,
        sub_code: String,
        validation_error: Box<ValidationError>,
    },

    #[error("Property name `{property_name}` is invalid: {validation_error}")]
    PropertyName {
        property_name: String,
        sub_code: String,
        validation_error: Box<ValidationError>,
    },

    #[error("Additional property `{property_name}` is not allowed.")]
    AdditionalProperties { property_name: String },

    #[error("Object has fewer than `{minimum}` properties.")]
    MinimumProperties { minimum: usize },

    #[error("Object has more than `{maximum}` properties.")]
    MaximumProperties { maximum: usize },

    #[error("Property `{property}` requires {dependencies:?} to be provided.")]
    Dependency { property: String, dependencies: Vec<String> },

    #[error("Value could not be validated against any of the allowed schemas.")]
    AnyOf { value: Value },

    #[error("Value matched more than one of the mutually exclusive schemas.")]
    OneOf { value: Value },

    #[error("Value matched a schema it was required not to match.")]
    Not { value: Value },
}

impl ValidationError {
    /// The stable, machine-readable error code.
    pub fn code(&self) -> String {
        use ValidationError::*;
        match self {
            Type { .. } => "type_error".into(),
            Enum { .. } => "enum_error".into(),
            Equal { .. } => "equal_error".into(),
            Format { .. } => "format_error".into(),
            MultipleOf { .. } => "multiple_of_error".into(),
            Minimum { .. } => "minimum_error".into(),
            Maximum { .. } => "maximum_error".into(),
            MinimumLength { .. } => "minimum_length_error".into(),
            MaximumLength { .. } => "maximum_length_error".into(),
            Pattern { .. } => "pattern_error".into(),
            UniqueItems { .. } => "unique_items_error".into(),
            AdditionalItems { .. } => "additional_items_error".into(),
            MinimumItems { .. } => "minimum_items_error".into(),
            MaximumItems { .. } => "maximum_items_error".into(),
            RequiredProperty { .. } => "required_property_error".into(),
            PropertyValue { sub_code, .. } => format!("property_value_error:{sub_code}"),
            PropertyName { sub_code, .. } => format!("property_name_error:{sub_code}"),
            AdditionalProperties { .. } => "additional_properties_error".into(),
            MinimumProperties { .. } => "minimum_properties_error".into(),
            MaximumProperties { .. } => "maximum_properties_error".into(),
            Dependency { .. } => "dependency_error".into(),
            AnyOf { .. } => "any_error".into(),
            OneOf { .. } => "one_of_error".into(),
            Not { .. } => "not_error".into(),
        }
    }

    /// Interpolated context fields, for callers that want structured access
    /// instead of the `Display` message.
    pub fn context(&self) -> Map<String, Value> {
        use ValidationError::*;
        let mut ctx = Map::new();
        match self {
            Type { value, expected_type } => {
                ctx.insert("value".into(), value.clone());
                ctx.insert("expected_type".into(), Value::String(expected_type.clone()));
            }
            Enum { value } | AnyOf { value } | OneOf { value } | Not { value } => {
                ctx.insert("value".into(), value.clone());
            }
            Equal { value, expected } => {
                ctx.insert("value".into(), value.clone());
                ctx.insert("expected".into(), expected.clone());
            }
            Format { value, format_name } => {
                ctx.insert("value".into(), value.clone());
                ctx.insert("format_name".into(), Value::String(format_name.clone()));
            }
            MinimumLength { value, minimum } => {
                ctx.insert("value".into(), Value::String(value.clone()));
                ctx.insert("minimum".into(), Value::from(*minimum));
            }
            MaximumLength { value, maximum } => {
                ctx.insert("value".into(), Value::String(value.clone()));
                ctx.insert("maximum".into(), Value::from(*maximum));
            }
            Pattern { value, pattern } => {
                ctx.insert("value".into(), Value::String(value.clone()));
                ctx.insert("pattern".into(), Value::String(pattern.clone()));
            }
            MultipleOf { value, multiple_of } => {
                ctx.insert("value".into(), value.clone());
                ctx.insert("multiple_of".into(), multiple_of.clone());
            }
            Minimum { value, minimum } => {
                ctx.insert("value".into(), value.clone());
                ctx.insert("minimum".into(), minimum.clone());
            }
            Maximum { value, maximum } => {
                ctx.insert("value".into(), value.clone());
                ctx.insert("maximum".into(), maximum.clone());
            }
            UniqueItems { value } | AdditionalItems { value } => {
                ctx.insert("value".into(), value.clone());
            }
            MinimumItems { value, minimum } => {
                ctx.insert("value".into(), value.clone());
                ctx.insert("minimum".into(), Value::from(*minimum));
            }
            MaximumItems { value, maximum } => {
                ctx.insert("value".into(), value.clone());
                ctx.insert("maximum".into(), Value::from(*maximum));
            }
            RequiredProperty { property_name } => {
                ctx.insert("property_name".into(), Value::String(property_name.clone()));
            }
            PropertyValue { property_name, sub_code, validation_error }
            | PropertyName { property_name, sub_code, validation_error } => {
                ctx.insert("property_name".into(), Value::String(property_name.clone()));
                ctx.insert("sub_code".into(), Value::String(sub_code.clone()));
                ctx.insert(
                    "validation_error".into(),
                    Value::String(validation_error.to_string()),
                );
            }
            AdditionalProperties { property_name } => {
                ctx.insert("property_name".into(), Value::String(property_name.clone()));
            }
            MinimumProperties { minimum } => {
                ctx.insert("minimum".into(), Value::from(*minimum));
            }
            MaximumProperties { maximum } => {
                ctx.insert("maximum".into(), Value::from(*maximum));
            }
            Dependency { property, dependencies } => {
                ctx.insert("property".into(), Value::String(property.clone()));
                ctx.insert(
                    "dependencies".into(),
                    Value::Array(dependencies.iter().cloned().map(Value::String).collect()),
                );
            }
        }
        ctx
    }

    /// Wraps `self` as the cause of a failing property, dot-chaining the
    /// path the way `opyapi`'s `_validate_property` does when the inner
    /// error is itself a `PropertyValue`.
    pub fn into_property_value(self, property_name: impl Into<String>) -> ValidationError {
        let property_name = property_name.into();
        match self {
            ValidationError::PropertyValue {
                property_name: inner_name,
                sub_code,
                validation_error,
            } => ValidationError::PropertyValue {
                property_name: format!("{property_name}.{inner_name}"),
                sub_code,
                validation_error,
            },
            other => {
                let sub_code = other.code();
                ValidationError::PropertyValue {
                    property_name,
                    sub_code,
                    validation_error: Box::new(other),
                }
            }
        }
    }
}

/// Failures resolving, loading, or parsing a document.
#[derive(Debug, Error, Clone)]
pub enum SourceError {
    #[error("no loader registered for scheme `{scheme}`")]
    UnsupportedScheme { scheme: String },

    #[error("failed to load `{uri}`: {message}")]
    Load { uri: AbsoluteUri, message: String },

    #[error("failed to deserialize `{uri}`: {message}")]
    Deserialize { uri: AbsoluteUri, message: String },

    #[error("document at `{uri}` could not be found by any registered resolver")]
    NotFound { uri: AbsoluteUri },
}

/// Failures identifying, anchoring, or normalizing a schema document.
#[derive(Debug, Error, Clone)]
pub enum DialectError {
    #[error("`$id` at `{uri}` must not contain a fragment")]
    FragmentedId { uri: AbsoluteUri },

    #[error("no format named `{format_name}` is registered")]
    UnknownFormat { format_name: String },

    #[error("`$schema` dialect `{dialect}` is not known to this registry")]
    UnknownDialect { dialect: String },
}

/// Failures resolving a `$ref`/`$dynamicRef` handle.
#[derive(Debug, Error, Clone)]
pub enum ResolveError {
    #[error("`{uri}` does not point at a JSON value (stepped into a scalar)")]
    NotAnObjectOrArray { uri: AbsoluteUri },

    #[error("pointer segment `{segment}` not found at `{uri}`")]
    PointerNotFound { uri: AbsoluteUri, segment: String },

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// The umbrella error returned by [`crate::compile`].
#[derive(Debug, Error, Clone)]
pub enum CompileError {
    #[error("schema is invalid: {0}")]
    SchemaInvalid(String),

    #[error(transparent)]
    Uri(#[from] crate::uri::UriError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Dialect(#[from] DialectError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}
