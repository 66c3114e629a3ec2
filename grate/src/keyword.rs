//! Leaf validators, combinators, and the compiler.
//!
//! `grill::keyword::Keyword` is a `Box<dyn SyncKeyword>`/
//! `Box<dyn AsyncKeyword>` registry, dispatched dynamically and composed via
//! a `Dialect`'s ordered handler list. This engine takes a different
//! approach instead, favoring inspectability over a `dyn Trait` registry: a
//! tagged `Validator` enum walked by a small interpreter. Every keyword
//! `grill`'s handlers implement has a corresponding `Validator` variant
//! here; the control flow that assembles them mirrors
//! `opyapi.schema_validator.build_validator_for` exactly, including its
//! short-circuiting for `enum`/`const`/bare-`if`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use fancy_regex::Regex;
use once_cell::unsync::OnceCell;
use serde_json::{Map, Value};

use crate::error::{CompileError, ValidationError};
use crate::format::{Format, FormatRegistry};
use crate::number;
use crate::schema::{merge_overlay, SchemaStore};
use crate::uri::AbsoluteUri;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    fn parse(name: &str) -> Result<Self, CompileError> {
        Ok(match name {
            "null" => JsonType::Null,
            "boolean" => JsonType::Boolean,
            "integer" => JsonType::Integer,
            "number" => JsonType::Number,
            "string" => JsonType::String,
            "array" => JsonType::Array,
            "object" => JsonType::Object,
            other => {
                return Err(CompileError::SchemaInvalid(format!(
                    "unknown `type` value `{other}`"
                )))
            }
        })
    }

    fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (JsonType::Null, Value::Null) => true,
            (JsonType::Boolean, Value::Bool(_)) => true,
            (JsonType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (JsonType::Number, Value::Number(_)) => true,
            (JsonType::String, Value::String(_)) => true,
            (JsonType::Array, Value::Array(_)) => true,
            (JsonType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }

    fn name(self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Integer => "integer",
            JsonType::Number => "number",
            JsonType::String => "string",
            JsonType::Array => "array",
            JsonType::Object => "object",
        }
    }
}

/// JSON-equality used by `enum`/`const`/`uniqueItems`: booleans never equal
/// numbers, and an integer literal never equals a float literal even when
/// numerically equal, grounded on `opyapi.validators._wrap_booleans`/`_Bool`.
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Bool(_), _) | (_, Value::Bool(_)) => false,
        (Value::Number(x), Value::Number(y)) => {
            // `1` and `1.0` are pairwise distinct for `uniqueItems`/`enum`/
            // `const` purposes even though they are numerically equal --
            // an integer literal never collides with a float literal.
            let x_is_int = x.is_i64() || x.is_u64();
            let y_is_int = y.is_i64() || y.is_u64();
            x_is_int == y_is_int
                && match (number::parse(&x.to_string()), number::parse(&y.to_string())) {
                    (Some(x), Some(y)) => x == y,
                    _ => x == y,
                }
        }
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_eq(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).is_some_and(|v2| json_eq(v, v2)))
        }
        _ => false,
    }
}

#[derive(Clone)]
pub struct StringChecks {
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<(String, Regex)>,
    pub format: Option<(String, std::sync::Arc<dyn Format>)>,
}

impl std::fmt::Debug for StringChecks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringChecks")
            .field("min_length", &self.min_length)
            .field("max_length", &self.max_length)
            .field("pattern", &self.pattern)
            .field("format", &self.format.as_ref().map(|(name, _)| name))
            .finish()
    }
}

impl StringChecks {
    fn evaluate(&self, value: &Value) -> Result<(), ValidationError> {
        let Value::String(s) = value else { return Ok(()) };
        if let Some(min) = self.min_length {
            if s.chars().count() < min {
                return Err(ValidationError::MinimumLength { value: s.clone(), minimum: min });
            }
        }
        if let Some(max) = self.max_length {
            if s.chars().count() > max {
                return Err(ValidationError::MaximumLength { value: s.clone(), maximum: max });
            }
        }
        if let Some((pattern, re)) = &self.pattern {
            if !re.is_match(s).unwrap_or(false) {
                return Err(ValidationError::Pattern { value: s.clone(), pattern: pattern.clone() });
            }
        }
        if let Some((name, format)) = &self.format {
            if !format.validate(s) {
                return Err(ValidationError::Format { value: value.clone(), format_name: name.clone() });
            }
        }
        Ok(())
    }
}

/// Substitutes `default` for a `null` input, prepended as the outermost step
/// before the rest of the node's compiled validators run.
/// `opyapi.schema_validator._return_default` only ever sees `null`, never
/// "absent", since the object validator only invokes a property's validator
/// for keys that are actually present; this substitution mirrors that and is
/// applied before `inner` so a schema like `{"type": "string", "default":
/// "x"}` accepts a `null` input.
#[derive(Debug, Clone)]
pub struct DefaultChecks {
    pub default: Value,
    pub inner: Box<Validator>,
}

#[derive(Debug, Clone, Default)]
pub struct NumberChecks {
    pub minimum: Option<Value>,
    pub maximum: Option<Value>,
    pub exclusive_minimum: Option<Value>,
    pub exclusive_maximum: Option<Value>,
    pub multiple_of: Option<Value>,
}

impl NumberChecks {
    fn evaluate(&self, value: &Value) -> Result<(), ValidationError> {
        // Booleans are never numbers, even though `serde_json` can't tell
        // `true` from `1` by `Value` variant alone -- they're distinct
        // variants already, so this guard only matters conceptually here.
        let Value::Number(n) = value else { return Ok(()) };
        let Some(v) = number::parse(&n.to_string()) else { return Ok(()) };
        if let Some(min) = &self.minimum {
            if let Some(min) = number::parse(&min.to_string()) {
                if v < min {
                    return Err(ValidationError::Minimum { value: value.clone(), minimum: self.minimum.clone().unwrap() });
                }
            }
        }
        if let Some(max) = &self.maximum {
            if let Some(max) = number::parse(&max.to_string()) {
                if v > max {
                    return Err(ValidationError::Maximum { value: value.clone(), maximum: self.maximum.clone().unwrap() });
                }
            }
        }
        if let Some(min) = &self.exclusive_minimum {
            if let Some(min) = number::parse(&min.to_string()) {
                if v <= min {
                    return Err(ValidationError::Minimum { value: value.clone(), minimum: self.exclusive_minimum.clone().unwrap() });
                }
            }
        }
        if let Some(max) = &self.exclusive_maximum {
            if let Some(max) = number::parse(&max.to_string()) {
                if v >= max {
                    return Err(ValidationError::Maximum { value: value.clone(), maximum: self.exclusive_maximum.clone().unwrap() });
                }
            }
        }
        if let Some(multiple_of) = &self.multiple_of {
            if let Some(m) = number::parse(&multiple_of.to_string()) {
                if !number::is_multiple_of(&v, &m) {
                    return Err(ValidationError::MultipleOf { value: value.clone(), multiple_of: multiple_of.clone() });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArrayChecks {
    pub items: Option<Box<Validator>>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub unique_items: bool,
    pub contains: Option<Box<Validator>>,
}

impl ArrayChecks {
    fn evaluate(&self, value: &Value) -> Result<Value, ValidationError> {
        let Value::Array(items) = value else { return Ok(value.clone()) };

        let evaluated: Vec<Value> = match &self.items {
            Some(item_validator) => items
                .iter()
                .map(|item| item_validator.evaluate(item))
                .collect::<Result<_, _>>()?,
            None => items.clone(),
        };

        if self.unique_items {
            for i in 0..items.len() {
                for j in (i + 1)..items.len() {
                    if json_eq(&items[i], &items[j]) {
                        return Err(ValidationError::UniqueItems { value: value.clone() });
                    }
                }
            }
        }
        if let Some(min) = self.min_items {
            if items.len() < min {
                return Err(ValidationError::MinimumItems { value: value.clone(), minimum: min });
            }
        }
        if let Some(max) = self.max_items {
            if items.len() > max {
                return Err(ValidationError::MaximumItems { value: value.clone(), maximum: max });
            }
        }
        if let Some(contains) = &self.contains {
            if !items.iter().any(|item| contains.evaluate(item).is_ok()) {
                return Err(ValidationError::AnyOf { value: value.clone() });
            }
        }
        Ok(Value::Array(evaluated))
    }
}

#[derive(Debug, Clone)]
pub enum AdditionalItems {
    Allow,
    Deny,
    Schema(Box<Validator>),
}

#[derive(Debug, Clone)]
pub struct TupleChecks {
    pub items: Vec<Validator>,
    pub additional: AdditionalItems,
    pub unique_items: bool,
    pub contains: Option<Box<Validator>>,
}

impl TupleChecks {
    fn evaluate(&self, value: &Value) -> Result<Value, ValidationError> {
        let Value::Array(items) = value else { return Ok(value.clone()) };

        if self.unique_items {
            for i in 0..items.len() {
                for j in (i + 1)..items.len() {
                    if json_eq(&items[i], &items[j]) {
                        return Err(ValidationError::UniqueItems { value: value.clone() });
                    }
                }
            }
        }
        if let Some(contains) = &self.contains {
            if !items.iter().any(|item| contains.evaluate(item).is_ok()) {
                return Err(ValidationError::AnyOf { value: value.clone() });
            }
        }

        let mut evaluated = Vec::with_capacity(items.len());
        for (item, validator) in items.iter().zip(&self.items) {
            evaluated.push(validator.evaluate(item)?);
        }
        if items.len() > self.items.len() {
            match &self.additional {
                AdditionalItems::Allow => evaluated.extend(items[self.items.len()..].iter().cloned()),
                AdditionalItems::Deny => {
                    return Err(ValidationError::AdditionalItems { value: value.clone() })
                }
                AdditionalItems::Schema(validator) => {
                    for item in &items[self.items.len()..] {
                        evaluated.push(validator.evaluate(item)?);
                    }
                }
            }
        }
        Ok(Value::Array(evaluated))
    }
}

#[derive(Debug, Clone)]
pub enum AdditionalProperties {
    Allow,
    Deny,
    Schema(Box<Validator>),
}

#[derive(Debug, Clone)]
pub enum Dependency {
    Required(Vec<String>),
    Schema(Box<Validator>),
}

#[derive(Debug, Clone, Default)]
pub struct ObjectChecks {
    pub properties: HashMap<String, Validator>,
    pub pattern_properties: Vec<(String, Regex, Validator)>,
    pub additional_properties: Option<AdditionalProperties>,
    pub required: Vec<String>,
    pub min_properties: Option<usize>,
    pub max_properties: Option<usize>,
    pub dependencies: HashMap<String, Dependency>,
    pub property_names: Option<Box<Validator>>,
}

impl ObjectChecks {
    fn evaluate(&self, value: &Value) -> Result<Value, ValidationError> {
        let Value::Object(obj) = value else { return Ok(value.clone()) };

        let mut evaluated = Map::with_capacity(obj.len());

        for (key, val) in obj {
            if let Some(property_names) = &self.property_names {
                property_names
                    .evaluate(&Value::String(key.clone()))
                    .map_err(|e| e.into_property_value(key.clone()))
                    .map_err(|e| match e {
                        ValidationError::PropertyValue { property_name, sub_code, validation_error } => {
                            ValidationError::PropertyName { property_name, sub_code, validation_error }
                        }
                        other => other,
                    })?;
            }

            let pattern_match = self
                .pattern_properties
                .iter()
                .find(|(_, re, _)| re.is_match(key).unwrap_or(false));

            let new_val = if let Some((_, _, validator)) = pattern_match {
                validator.evaluate(val).map_err(|e| e.into_property_value(key.clone()))?
            } else if let Some(validator) = self.properties.get(key) {
                validator.evaluate(val).map_err(|e| e.into_property_value(key.clone()))?
            } else {
                match &self.additional_properties {
                    None | Some(AdditionalProperties::Allow) => val.clone(),
                    Some(AdditionalProperties::Deny) => {
                        return Err(ValidationError::AdditionalProperties { property_name: key.clone() })
                    }
                    Some(AdditionalProperties::Schema(validator)) => {
                        validator.evaluate(val).map_err(|e| e.into_property_value(key.clone()))?
                    }
                }
            };

            if let Some(dependency) = self.dependencies.get(key) {
                match dependency {
                    Dependency::Required(required) => {
                        for dep in required {
                            if !obj.contains_key(dep) {
                                return Err(ValidationError::Dependency {
                                    property: key.clone(),
                                    dependencies: required.clone(),
                                });
                            }
                        }
                    }
                    Dependency::Schema(validator) => {
                        validator.evaluate(value)?;
                    }
                }
            }

            evaluated.insert(key.clone(), new_val);
        }

        if let Some(min) = self.min_properties {
            if obj.len() < min {
                return Err(ValidationError::MinimumProperties { minimum: min });
            }
        }
        if let Some(max) = self.max_properties {
            if obj.len() > max {
                return Err(ValidationError::MaximumProperties { maximum: max });
            }
        }
        for required in &self.required {
            if !obj.contains_key(required) {
                return Err(ValidationError::RequiredProperty { property_name: required.clone() });
            }
        }
        Ok(Value::Object(evaluated))
    }
}

/// The compiled, executable form of a schema. Walked by [`Validator::evaluate`].
#[derive(Debug, Clone)]
pub enum Validator {
    True,
    False,
    Type(Vec<JsonType>),
    Enum(Vec<Value>),
    Const(Value),
    String(StringChecks),
    Number(NumberChecks),
    Array(ArrayChecks),
    Tuple(TupleChecks),
    Object(ObjectChecks),
    AllOf(Vec<Validator>),
    AnyOf(Vec<Validator>),
    OneOf(Vec<Validator>),
    Not(Box<Validator>),
    IfThenElse {
        if_: Box<Validator>,
        then_: Option<Box<Validator>>,
        else_: Option<Box<Validator>>,
    },
    /// `default`, wrapping the rest of the node's compiled validators. See
    /// [`DefaultChecks`].
    Default(DefaultChecks),
    /// A `$ref`/`$dynamicRef` handle. Lazily memoized so cyclic schemas
    /// compile without recursing forever; by the time the top-level
    /// `compile()` call returns, every reachable cell has been filled.
    Ref(Rc<OnceCell<Validator>>),
}

impl Validator {
    /// Applies this validator to `value`, returning the (possibly
    /// defaulted) accepted value or the first failure encountered. Mirrors
    /// `opyapi`'s validators, which thread a return value through
    /// `allOf`/`properties`/`items` rather than only signalling pass/fail.
    pub fn evaluate(&self, value: &Value) -> Result<Value, ValidationError> {
        tracing::trace!(validator = ?std::mem::discriminant(self), "evaluating");
        match self {
            Validator::True => Ok(value.clone()),
            Validator::False => Err(ValidationError::Type {
                value: value.clone(),
                expected_type: "never".into(),
            }),
            Validator::Type(types) => {
                if types.iter().any(|t| t.matches(value)) {
                    Ok(value.clone())
                } else {
                    Err(ValidationError::Type {
                        value: value.clone(),
                        expected_type: types.iter().map(|t| t.name()).collect::<Vec<_>>().join(" | "),
                    })
                }
            }
            Validator::Enum(values) => {
                if values.iter().any(|v| json_eq(v, value)) {
                    Ok(value.clone())
                } else {
                    Err(ValidationError::Enum { value: value.clone() })
                }
            }
            Validator::Const(expected) => {
                if json_eq(expected, value) {
                    Ok(value.clone())
                } else {
                    Err(ValidationError::Equal { value: value.clone(), expected: expected.clone() })
                }
            }
            Validator::String(checks) => checks.evaluate(value).map(|()| value.clone()),
            Validator::Number(checks) => checks.evaluate(value).map(|()| value.clone()),
            Validator::Array(checks) => checks.evaluate(value),
            Validator::Tuple(checks) => checks.evaluate(value),
            Validator::Object(checks) => checks.evaluate(value),
            Validator::AllOf(members) => {
                // Threads the evaluated value through each member in turn,
                // per `opyapi.validators.validate_all_of`: later members see
                // the defaulting/reconstruction earlier members produced.
                let mut current = value.clone();
                for member in members {
                    current = member.evaluate(&current)?;
                }
                Ok(current)
            }
            Validator::AnyOf(branches) => {
                // Each attempt runs on an independent clone so a branch
                // that defaults or partially reconstructs the value never
                // contaminates a sibling attempt.
                for branch in branches {
                    if let Ok(result) = branch.evaluate(&value.clone()) {
                        return Ok(result);
                    }
                }
                Err(ValidationError::AnyOf { value: value.clone() })
            }
            Validator::OneOf(branches) => {
                let mut matched = None;
                let mut count = 0;
                for branch in branches {
                    if let Ok(result) = branch.evaluate(&value.clone()) {
                        count += 1;
                        matched.get_or_insert(result);
                    }
                }
                if count == 1 {
                    Ok(matched.expect("count == 1 implies a recorded match"))
                } else {
                    Err(ValidationError::OneOf { value: value.clone() })
                }
            }
            Validator::Not(inner) => {
                if inner.evaluate(&value.clone()).is_ok() {
                    Err(ValidationError::Not { value: value.clone() })
                } else {
                    Ok(value.clone())
                }
            }
            Validator::IfThenElse { if_, then_, else_ } => {
                // `if` is evaluated on a clone: its own defaulting must not
                // leak into the value `then`/`else` receives.
                if if_.evaluate(&value.clone()).is_ok() {
                    match then_ {
                        Some(then_) => then_.evaluate(value),
                        None => Ok(value.clone()),
                    }
                } else {
                    match else_ {
                        Some(else_) => else_.evaluate(value),
                        None => Ok(value.clone()),
                    }
                }
            }
            Validator::Default(checks) => {
                let substituted = if value.is_null() { checks.default.clone() } else { value.clone() };
                checks.inner.evaluate(&substituted)
            }
            Validator::Ref(cell) => cell
                .get()
                .expect("reference cell filled before evaluation begins")
                .evaluate(value),
        }
    }
}

fn as_usize(value: &Value) -> Option<usize> {
    value.as_u64().map(|n| n as usize)
}

fn has_any(map: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().any(|k| map.contains_key(*k))
}

/// Compiles raw schema documents into [`Validator`] trees, resolving
/// `$ref`/`$dynamicRef` handles against a [`SchemaStore`] and looking up
/// named formats in a [`FormatRegistry`] snapshot taken at the start of
/// compilation -- format registry mutation mid-compile is not supported.
pub struct Compiler<'a> {
    store: &'a SchemaStore,
    formats: FormatRegistry,
    cache: RefCell<HashMap<String, Rc<OnceCell<Validator>>>>,
}

impl<'a> Compiler<'a> {
    pub fn new(store: &'a SchemaStore, formats: FormatRegistry) -> Self {
        Self {
            store,
            formats,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn compile_root(&self, base: &AbsoluteUri, schema: &Value) -> Result<Validator, CompileError> {
        self.compile_node(base, schema)
    }

    fn compile_node(&self, base: &AbsoluteUri, schema: &Value) -> Result<Validator, CompileError> {
        match schema {
            Value::Bool(true) => return Ok(Validator::True),
            Value::Bool(false) => return Ok(Validator::False),
            Value::Object(_) => {}
            other => {
                return Err(CompileError::SchemaInvalid(format!(
                    "schema node must be an object or boolean, got `{other}`"
                )))
            }
        }
        let map = schema.as_object().expect("checked above");

        let mut base = base.clone();
        if let Some(Value::String(id)) = map.get("$id") {
            base = base.append(id)?;
        }

        if let Some(Value::String(reference)) = map.get("$ref").or_else(|| map.get("$dynamicRef")) {
            let target = base.append(reference)?;
            let mut overlay = map.clone();
            overlay.remove("$ref");
            overlay.remove("$dynamicRef");
            overlay.remove("$id");
            return self.compile_ref(&target, &overlay);
        }

        if let Some(enum_values) = map.get("enum").and_then(Value::as_array) {
            return Ok(Validator::Enum(enum_values.clone()));
        }
        if let Some(const_value) = map.get("const") {
            return Ok(Validator::Const(const_value.clone()));
        }

        let mut members = Vec::new();

        if let Some(type_value) = map.get("type") {
            members.push(self.compile_type(type_value)?);
        }
        if has_any(map, &["minLength", "maxLength", "pattern", "format"]) {
            members.push(Validator::String(self.compile_string(map)?));
        }
        if has_any(map, &["minimum", "maximum", "exclusiveMinimum", "exclusiveMaximum", "multipleOf"]) {
            members.push(Validator::Number(self.compile_number(map)));
        }
        if has_any(map, &["items", "minItems", "maxItems", "uniqueItems", "contains"]) {
            members.push(self.compile_array(&base, map)?);
        }
        if has_any(
            map,
            &[
                "properties",
                "patternProperties",
                "additionalProperties",
                "required",
                "minProperties",
                "maxProperties",
                "dependencies",
                "dependentRequired",
                "propertyNames",
            ],
        ) {
            members.push(Validator::Object(self.compile_object(&base, map)?));
        }
        if let Some(all_of) = map.get("allOf").and_then(Value::as_array) {
            let compiled = all_of
                .iter()
                .map(|s| self.compile_node(&base, s))
                .collect::<Result<Vec<_>, _>>()?;
            members.push(Validator::AllOf(compiled));
        }
        if let Some(any_of) = map.get("anyOf").and_then(Value::as_array) {
            let compiled = any_of
                .iter()
                .map(|s| self.compile_node(&base, s))
                .collect::<Result<Vec<_>, _>>()?;
            members.push(Validator::AnyOf(compiled));
        }
        if let Some(one_of) = map.get("oneOf").and_then(Value::as_array) {
            let compiled = one_of
                .iter()
                .map(|s| self.compile_node(&base, s))
                .collect::<Result<Vec<_>, _>>()?;
            members.push(Validator::OneOf(compiled));
        }
        if let Some(not_schema) = map.get("not") {
            members.push(Validator::Not(Box::new(self.compile_node(&base, not_schema)?)));
        }
        if let Some(if_schema) = map.get("if") {
            let then_ = map.get("then").map(|s| self.compile_node(&base, s)).transpose()?.map(Box::new);
            let else_ = map.get("else").map(|s| self.compile_node(&base, s)).transpose()?.map(Box::new);
            // A bare `if` with neither branch is identity (opyapi treats a
            // conditional with nothing to dispatch to as a no-op).
            if then_.is_some() || else_.is_some() {
                members.push(Validator::IfThenElse {
                    if_: Box::new(self.compile_node(&base, if_schema)?),
                    then_,
                    else_,
                });
            }
        }

        let composed = match members.len() {
            0 => Validator::True,
            1 => members.into_iter().next().unwrap(),
            _ => Validator::AllOf(members),
        };

        Ok(match map.get("default") {
            Some(default) => Validator::Default(DefaultChecks {
                default: default.clone(),
                inner: Box::new(composed),
            }),
            None => composed,
        })
    }

    fn compile_ref(&self, target: &AbsoluteUri, overlay: &Map<String, Value>) -> Result<Validator, CompileError> {
        let key = if overlay.is_empty() {
            target.to_string()
        } else {
            format!("{target}!{}", serde_json::to_string(overlay).unwrap_or_default())
        };
        if let Some(cell) = self.cache.borrow().get(&key) {
            return Ok(Validator::Ref(cell.clone()));
        }
        let cell = Rc::new(OnceCell::new());
        self.cache.borrow_mut().insert(key, cell.clone());

        let raw_target = self.store.resolve(target)?;
        let merged = merge_overlay(&raw_target, overlay);
        let validator = self.compile_node(&target.base(), &merged)?;
        let _ = cell.set(validator);
        Ok(Validator::Ref(cell))
    }

    fn compile_type(&self, value: &Value) -> Result<Validator, CompileError> {
        let types = match value {
            Value::String(name) => vec![JsonType::parse(name)?],
            Value::Array(names) => names
                .iter()
                .map(|v| match v {
                    Value::String(name) => JsonType::parse(name),
                    other => Err(CompileError::SchemaInvalid(format!("`type` entries must be strings, got `{other}`"))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => return Err(CompileError::SchemaInvalid(format!("`type` must be a string or array, got `{other}`"))),
        };
        Ok(Validator::Type(types))
    }

    fn compile_string(&self, map: &Map<String, Value>) -> Result<StringChecks, CompileError> {
        let pattern = match map.get("pattern").and_then(Value::as_str) {
            Some(p) => Some((
                p.to_string(),
                Regex::new(p).map_err(|e| CompileError::SchemaInvalid(format!("invalid `pattern`: {e}")))?,
            )),
            None => None,
        };
        let format = map
            .get("format")
            .and_then(Value::as_str)
            .and_then(|name| self.formats.get(name).map(|f| (name.to_string(), f.clone())));
        Ok(StringChecks {
            min_length: map.get("minLength").and_then(as_usize),
            max_length: map.get("maxLength").and_then(as_usize),
            pattern,
            format,
        })
    }

    fn compile_number(&self, map: &Map<String, Value>) -> NumberChecks {
        NumberChecks {
            minimum: map.get("minimum").cloned(),
            maximum: map.get("maximum").cloned(),
            exclusive_minimum: map.get("exclusiveMinimum").cloned(),
            exclusive_maximum: map.get("exclusiveMaximum").cloned(),
            multiple_of: map.get("multipleOf").cloned(),
        }
    }

    fn compile_array(&self, base: &AbsoluteUri, map: &Map<String, Value>) -> Result<Validator, CompileError> {
        match map.get("items") {
            Some(Value::Array(tuple_schemas)) => {
                let items = tuple_schemas
                    .iter()
                    .map(|s| self.compile_node(base, s))
                    .collect::<Result<Vec<_>, _>>()?;
                let additional = match map.get("additionalItems") {
                    None | Some(Value::Bool(true)) => AdditionalItems::Allow,
                    Some(Value::Bool(false)) => AdditionalItems::Deny,
                    Some(schema) => AdditionalItems::Schema(Box::new(self.compile_node(base, schema)?)),
                };
                // `uniqueItems`/`contains` apply regardless of tuple vs. list
                // `items` mode; only `minItems`/`maxItems` are list-mode only.
                let contains = map
                    .get("contains")
                    .map(|s| self.compile_node(base, s))
                    .transpose()?
                    .map(Box::new);
                Ok(Validator::Tuple(TupleChecks {
                    items,
                    additional,
                    unique_items: map.get("uniqueItems") == Some(&Value::Bool(true)),
                    contains,
                }))
            }
            items_schema => {
                let items = match items_schema {
                    Some(Value::Bool(false)) => Some(Box::new(Validator::False)),
                    Some(schema) => Some(Box::new(self.compile_node(base, schema)?)),
                    None => None,
                };
                let contains = map
                    .get("contains")
                    .map(|s| self.compile_node(base, s))
                    .transpose()?
                    .map(Box::new);
                Ok(Validator::Array(ArrayChecks {
                    items,
                    min_items: map.get("minItems").and_then(as_usize),
                    max_items: map.get("maxItems").and_then(as_usize),
                    unique_items: map.get("uniqueItems") == Some(&Value::Bool(true)),
                    contains,
                }))
            }
        }
    }

    fn compile_object(&self, base: &AbsoluteUri, map: &Map<String, Value>) -> Result<ObjectChecks, CompileError> {
        let mut properties = HashMap::new();
        if let Some(Value::Object(props)) = map.get("properties") {
            for (key, schema) in props {
                properties.insert(key.clone(), self.compile_node(base, schema)?);
            }
        }

        let mut pattern_properties = Vec::new();
        if let Some(Value::Object(props)) = map.get("patternProperties") {
            for (pattern, schema) in props {
                let re = Regex::new(pattern)
                    .map_err(|e| CompileError::SchemaInvalid(format!("invalid `patternProperties` key: {e}")))?;
                pattern_properties.push((pattern.clone(), re, self.compile_node(base, schema)?));
            }
        }

        let additional_properties = match map.get("additionalProperties") {
            None => None,
            Some(Value::Bool(true)) => Some(AdditionalProperties::Allow),
            Some(Value::Bool(false)) => Some(AdditionalProperties::Deny),
            Some(schema) => Some(AdditionalProperties::Schema(Box::new(self.compile_node(base, schema)?))),
        };

        let required = map
            .get("required")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();

        // `dependentRequired` is accepted alongside Draft-7's `dependencies`
        // array form, so a schema naming a key in both is honored for both
        // rather than one shadowing the other; `dependencies` also allows
        // the Draft-7 schema form that `dependentRequired` doesn't.
        let mut dependencies = HashMap::new();
        for key_name in ["dependencies", "dependentRequired"] {
            if let Some(Value::Object(deps)) = map.get(key_name) {
                for (key, value) in deps {
                    let dependency = match value {
                        Value::Array(names) => Dependency::Required(
                            names.iter().filter_map(Value::as_str).map(String::from).collect(),
                        ),
                        schema => Dependency::Schema(Box::new(self.compile_node(base, schema)?)),
                    };
                    dependencies.insert(key.clone(), dependency);
                }
            }
        }

        let property_names = map
            .get("propertyNames")
            .map(|s| self.compile_node(base, s))
            .transpose()?
            .map(Box::new);

        Ok(ObjectChecks {
            properties,
            pattern_properties,
            additional_properties,
            required,
            min_properties: map.get("minProperties").and_then(as_usize),
            max_properties: map.get("maxProperties").and_then(as_usize),
            dependencies,
            property_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaStore;

    fn compile(schema: Value) -> Validator {
        let store = SchemaStore::new();
        let base = AbsoluteUri::synthetic();
        store.add_schema(base.clone(), schema.clone()).unwrap();
        let compiler = Compiler::new(&store, FormatRegistry::with_builtins());
        compiler.compile_root(&base, &schema).unwrap()
    }

    #[test]
    fn type_mismatch_fails() {
        let v = compile(serde_json::json!({"type": "string"}));
        assert!(v.evaluate(&serde_json::json!(42)).is_err());
        assert!(v.evaluate(&serde_json::json!("ok")).is_ok());
    }

    #[test]
    fn integer_rejects_float_literal() {
        let v = compile(serde_json::json!({"type": "integer"}));
        assert!(v.evaluate(&serde_json::json!(1.0)).is_err());
        assert!(v.evaluate(&serde_json::json!(1)).is_ok());
    }

    #[test]
    fn enum_short_circuits_other_keywords() {
        let v = compile(serde_json::json!({"type": "string", "enum": [1, 2, 3]}));
        assert!(v.evaluate(&serde_json::json!(2)).is_ok());
        assert!(v.evaluate(&serde_json::json!("nope")).is_err());
    }

    #[test]
    fn enum_never_matches_boolean_against_integer() {
        let v = compile(serde_json::json!({"enum": [1]}));
        assert!(v.evaluate(&serde_json::json!(true)).is_err());
    }

    #[test]
    fn all_of_threads_every_member() {
        let v = compile(serde_json::json!({"allOf": [{"type": "number"}, {"minimum": 5}]}));
        assert!(v.evaluate(&serde_json::json!(10)).is_ok());
        assert!(v.evaluate(&serde_json::json!(1)).is_err());
    }

    #[test]
    fn any_of_does_not_mutate_on_failed_branches() {
        let v = compile(serde_json::json!({"anyOf": [{"type": "string"}, {"type": "number"}]}));
        let value = serde_json::json!(5);
        assert!(v.evaluate(&value).is_ok());
        assert_eq!(value, serde_json::json!(5));
    }

    #[test]
    fn one_of_requires_exactly_one_match() {
        let v = compile(serde_json::json!({"oneOf": [{"multipleOf": 2}, {"multipleOf": 3}]}));
        assert!(v.evaluate(&serde_json::json!(6)).is_err());
        assert!(v.evaluate(&serde_json::json!(4)).is_ok());
    }

    #[test]
    fn multiple_of_is_exact_for_decimals() {
        let v = compile(serde_json::json!({"multipleOf": 0.1}));
        assert!(v.evaluate(&serde_json::json!(0.3)).is_ok());
    }

    #[test]
    fn pattern_properties_take_precedence_over_properties() {
        let v = compile(serde_json::json!({
            "properties": {"foo": {"type": "string"}},
            "patternProperties": {"^f": {"type": "number"}}
        }));
        assert!(v.evaluate(&serde_json::json!({"foo": 1})).is_ok());
        assert!(v.evaluate(&serde_json::json!({"foo": "x"})).is_err());
    }

    #[test]
    fn required_reports_missing_property() {
        let v = compile(serde_json::json!({"required": ["a", "b"]}));
        let err = v.evaluate(&serde_json::json!({"a": 1})).unwrap_err();
        assert_eq!(err.code(), "required_property_error");
    }

    #[test]
    fn additional_properties_false_rejects_unknown_keys() {
        let v = compile(serde_json::json!({
            "properties": {"a": true},
            "additionalProperties": false
        }));
        assert!(v.evaluate(&serde_json::json!({"a": 1})).is_ok());
        assert!(v.evaluate(&serde_json::json!({"a": 1, "b": 2})).is_err());
    }

    #[test]
    fn tuple_items_with_additional_items_false() {
        let v = compile(serde_json::json!({
            "items": [{"type": "string"}, {"type": "number"}],
            "additionalItems": false
        }));
        assert!(v.evaluate(&serde_json::json!(["a", 1])).is_ok());
        assert!(v.evaluate(&serde_json::json!(["a", 1, "extra"])).is_err());
    }

    #[test]
    fn if_then_else_dispatches_on_condition() {
        let v = compile(serde_json::json!({
            "if": {"type": "string"},
            "then": {"minLength": 3},
            "else": {"minimum": 10}
        }));
        assert!(v.evaluate(&serde_json::json!("ab")).is_err());
        assert!(v.evaluate(&serde_json::json!("abc")).is_ok());
        assert!(v.evaluate(&serde_json::json!(5)).is_err());
        assert!(v.evaluate(&serde_json::json!(20)).is_ok());
    }

    #[test]
    fn bare_if_without_branches_is_identity() {
        let v = compile(serde_json::json!({"if": {"type": "string"}}));
        assert!(v.evaluate(&serde_json::json!(42)).is_ok());
    }

    #[test]
    fn dependent_required_checks_sibling_keys() {
        let v = compile(serde_json::json!({"dependentRequired": {"credit_card": ["billing_address"]}}));
        assert!(v.evaluate(&serde_json::json!({"credit_card": "1234"})).is_err());
        assert!(v
            .evaluate(&serde_json::json!({"credit_card": "1234", "billing_address": "x"}))
            .is_ok());
    }

    #[test]
    fn unique_items_distinguishes_boolean_from_integer() {
        let v = compile(serde_json::json!({"uniqueItems": true}));
        assert!(v.evaluate(&serde_json::json!([true, 1])).is_ok());
        assert!(v.evaluate(&serde_json::json!([1, 1])).is_err());
    }

    #[test]
    fn self_referential_schema_compiles_and_terminates() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "child": {"$ref": "#"}
            }
        });
        let v = compile(schema);
        assert!(v.evaluate(&serde_json::json!({"child": {"child": {}}})).is_ok());
        assert!(v.evaluate(&serde_json::json!({"child": "not an object"})).is_err());
    }

    #[test]
    fn default_substitutes_for_a_null_value() {
        let v = compile(serde_json::json!({"type": "string", "default": "fallback"}));
        assert_eq!(v.evaluate(&Value::Null).unwrap(), serde_json::json!("fallback"));
        assert_eq!(v.evaluate(&serde_json::json!("given")).unwrap(), serde_json::json!("given"));
    }

    #[test]
    fn default_on_a_property_is_reflected_in_the_reconstructed_object() {
        let v = compile(serde_json::json!({
            "type": "object",
            "properties": {
                "role": {"type": "string", "default": "guest"}
            }
        }));
        let result = v.evaluate(&serde_json::json!({"role": null})).unwrap();
        assert_eq!(result, serde_json::json!({"role": "guest"}));

        // A property that's absent entirely is left absent -- `opyapi`
        // only ever substitutes a default for a present `null`, since its
        // object validator only invokes a property's validator for keys
        // that are actually present.
        let result = v.evaluate(&serde_json::json!({})).unwrap();
        assert_eq!(result, serde_json::json!({}));
    }

    #[test]
    fn evaluate_is_idempotent_on_an_accepting_value() {
        let v = compile(serde_json::json!({"type": "object", "properties": {"n": {"type": "integer", "default": 0}}}));
        let input = serde_json::json!({"n": null});
        let once = v.evaluate(&input).unwrap();
        let twice = v.evaluate(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn exclusive_maximum_shares_the_inclusive_maximum_error_code() {
        let v = compile(serde_json::json!({"exclusiveMaximum": 10}));
        let err = v.evaluate(&serde_json::json!(10)).unwrap_err();
        assert_eq!(err.code(), "maximum_error");
        assert!(v.evaluate(&serde_json::json!(9)).is_ok());
    }

    #[test]
    fn integer_and_float_literals_never_collide_under_unique_items() {
        let v = compile(serde_json::json!({"uniqueItems": true}));
        assert!(v.evaluate(&serde_json::json!([1, 1.0])).is_ok());
        assert!(v.evaluate(&serde_json::json!([1, 1])).is_err());
        assert!(v.evaluate(&serde_json::json!([1.0, 1.0])).is_err());
    }

    #[test]
    fn tuple_mode_still_enforces_unique_items() {
        let v = compile(serde_json::json!({
            "items": [{"type": "string"}, {"type": "string"}],
            "uniqueItems": true
        }));
        assert!(v.evaluate(&serde_json::json!(["a", "b"])).is_ok());
        assert!(v.evaluate(&serde_json::json!(["a", "a"])).is_err());
    }

    #[test]
    fn tuple_mode_still_enforces_contains() {
        let v = compile(serde_json::json!({
            "items": [{"type": "string"}, {"type": "string"}],
            "contains": {"const": "a"}
        }));
        assert!(v.evaluate(&serde_json::json!(["a", "b"])).is_ok());
        assert!(v.evaluate(&serde_json::json!(["b", "c"])).is_err());
    }
}
