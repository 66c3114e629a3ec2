//! `grate` -- a JSON Schema Draft-7 validation engine: compiler, reference
//! resolver, and runtime evaluator.
//!
//! ```
//! let schema = serde_json::json!({"type": "string", "minLength": 3});
//! let validator = grate::compile(&schema).unwrap();
//! assert!(validator.evaluate(&serde_json::json!("ok!")).is_ok());
//! assert!(validator.evaluate(&serde_json::json!("no")).is_err());
//! ```

pub mod error;
pub mod format;
pub mod keyword;
pub mod number;
pub mod registry;
pub mod schema;
pub mod source;
pub mod uri;

pub use error::{CompileError, ValidationError};
pub use format::{Format, FormatRegistry};
pub use keyword::Validator;
pub use registry::Registry;
pub use schema::{Schema, SchemaStore};
pub use source::Resolve;
pub use uri::AbsoluteUri;

use serde_json::Value;
use thiserror::Error;

/// Either half of the pipeline can fail: compilation (bad schema, unresolved
/// `$ref`) or evaluation (the instance doesn't conform).
#[derive(Debug, Error, Clone)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Compiles `schema` against the process-wide [`Registry`], registering it
/// at a synthetic base URI.
pub fn compile(schema: &Value) -> Result<Validator, CompileError> {
    compile_with(Registry::global(), schema)
}

/// Compiles `schema` against an explicit [`Registry`], the non-singleton
/// entry point for callers that want isolated state (tests, multi-tenant
/// hosts).
pub fn compile_with(registry: &Registry, schema: &Value) -> Result<Validator, CompileError> {
    let base = AbsoluteUri::synthetic();
    registry.add_schema(base.clone(), schema.clone())?;
    let compiler = keyword::Compiler::new(&registry.store, registry.formats_snapshot());
    compiler.compile_root(&base, schema)
}

/// Compiles and immediately evaluates `instance` against `schema`, the
/// convenience entry point for one-off checks. Returns the (possibly
/// defaulted) instance on success.
pub fn validate(schema: &Value, instance: &Value) -> Result<Value, Error> {
    let validator = compile(schema)?;
    Ok(validator.evaluate(instance)?)
}

/// Registers a custom string-format checker on the process-wide registry.
pub fn register_format(name: impl Into<String>, format: impl Format + 'static) {
    Registry::global().register_format(name, format);
}

/// Registers a custom document loader on the process-wide registry.
pub fn register_loader(loader: impl Resolve + 'static) {
    Registry::global().register_loader(loader);
}

/// Registers a schema document the caller already has in hand at `base` on
/// the process-wide registry, without fetching or compiling it. For
/// pre-populating `$ref` targets other schemas depend on; a pre-loaded
/// document primitive, as distinct from [`load_schema`]'s fetch-by-URI.
pub fn add_schema(base: AbsoluteUri, document: Value) -> Result<(), error::SourceError> {
    Registry::global().add_schema(base, document)
}

/// Fetches a schema document by URI through the registered loader chain
/// (the `file://` loader by default, plus anything added with
/// [`register_loader`]) and registers it on the process-wide registry,
/// returning a handle that can be compiled with [`compile_schema`] or left
/// in the store as a `$ref` target for other schemas.
pub fn load_schema(uri: &str) -> Result<Schema, CompileError> {
    let uri = AbsoluteUri::parse(uri)?;
    Ok(Registry::global().load_schema(&uri)?)
}

/// Compiles a previously loaded [`Schema`] handle against the process-wide
/// [`Registry`], the counterpart to [`compile`] for a schema obtained via
/// [`load_schema`] rather than an in-memory [`Value`].
pub fn compile_schema(schema: &Schema) -> Result<Validator, CompileError> {
    compile_schema_with(Registry::global(), schema)
}

/// Compiles a previously loaded [`Schema`] handle against an explicit
/// [`Registry`].
pub fn compile_schema_with(registry: &Registry, schema: &Schema) -> Result<Validator, CompileError> {
    let compiler = keyword::Compiler::new(&registry.store, registry.formats_snapshot());
    compiler.compile_root(&schema.uri, &schema.document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_with_isolated_registry_does_not_touch_global_state() {
        let registry = Registry::new();
        let schema = serde_json::json!({"type": "boolean"});
        let validator = compile_with(&registry, &schema).unwrap();
        assert!(validator.evaluate(&serde_json::json!(true)).is_ok());
    }

    #[test]
    fn validate_reports_compile_errors_and_validation_errors_distinctly() {
        let bad_schema = serde_json::json!({"type": "not-a-real-type"});
        assert!(matches!(
            validate(&bad_schema, &serde_json::json!(1)),
            Err(Error::Compile(_))
        ));

        let schema = serde_json::json!({"type": "string"});
        assert!(matches!(
            validate(&schema, &serde_json::json!(1)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn load_schema_fetches_through_the_resolver_chain_and_compiles() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("grate-load-schema-test-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"type": "integer", "minimum": 0}"#).unwrap();

        let uri = format!("file://{}", path.display());
        let schema = load_schema(&uri).unwrap();
        let validator = compile_schema(&schema).unwrap();
        assert!(validator.evaluate(&serde_json::json!(5)).is_ok());
        assert!(validator.evaluate(&serde_json::json!(-5)).is_err());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn ref_across_two_registered_documents_resolves() {
        let registry = Registry::new();
        let defs_uri = AbsoluteUri::parse("self://defs").unwrap();
        registry
            .add_schema(defs_uri, serde_json::json!({"positiveInt": {"type": "integer", "minimum": 0}}))
            .unwrap();

        let schema = serde_json::json!({"$ref": "self://defs#/positiveInt"});
        let validator = compile_with(&registry, &schema).unwrap();
        assert!(validator.evaluate(&serde_json::json!(5)).is_ok());
        assert!(validator.evaluate(&serde_json::json!(-5)).is_err());
    }
}
