//! Schema store, normalizer, and reference handle resolution.
//!
//! Grounded on `opyapi.json_schema.JsonSchemaStore`/`JsonSchema`, which is
//! the authoritative source for the pointer-query dialect used here: a
//! simplified, non-RFC-6901 dialect that never escapes `/` or `~` in key
//! names. `$anchor` and `$dynamicAnchor` are collected into a flat
//! per-document table during a single scanning pass, matching
//! `JsonSchema._process_node`'s behavior of recording the anchor and then
//! continuing to recurse into the same node.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::{Map, Value};

use crate::error::{ResolveError, SourceError};
use crate::source::Sources;
use crate::uri::AbsoluteUri;

/// Builds the anchor table for one document: every `$anchor`/`$dynamicAnchor`
/// found while walking the tree, mapped to the JSON pointer (in this
/// engine's own slash-joined, unescaped dialect) of the node that carries it.
pub fn collect_anchors(document: &Value) -> HashMap<String, String> {
    let mut anchors = HashMap::new();
    let mut path = Vec::new();
    walk_anchors(document, &mut path, &mut anchors);
    anchors
}

fn walk_anchors(node: &Value, path: &mut Vec<String>, anchors: &mut HashMap<String, String>) {
    match node {
        Value::Object(map) => {
            for key in ["$anchor", "$dynamicAnchor"] {
                if let Some(Value::String(name)) = map.get(key) {
                    let pointer = format!("/{}", path.join("/"));
                    anchors.insert(name.clone(), pointer);
                }
            }
            for (key, value) in map {
                if key == "$anchor" || key == "$dynamicAnchor" {
                    continue;
                }
                path.push(key.clone());
                walk_anchors(value, path, anchors);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                path.push(i.to_string());
                walk_anchors(item, path, anchors);
                path.pop();
            }
        }
        _ => {}
    }
}

/// Steps into `document` following a pointer in this engine's simplified
/// dialect, grounded on `JsonSchema.query`: split on `/` after stripping a
/// leading `#` and leading/trailing `/`, step into objects by key and
/// arrays by parsed index.
pub fn query_pointer<'a>(document: &'a Value, pointer: &str) -> Result<&'a Value, ()> {
    let trimmed = pointer.trim_start_matches('#').trim_matches('/');
    if trimmed.is_empty() {
        return Ok(document);
    }
    // A literal `\/` inside a segment is an escaped slash, not a separator;
    // placeholder-substitute it before splitting, then restore it in each
    // segment, matching `JsonSchema.query`'s `replace("\\/", "&slash;")`
    // round trip.
    const SLASH_PLACEHOLDER: &str = "\u{0}slash\u{0}";
    let protected = trimmed.replace("\\/", SLASH_PLACEHOLDER);
    let mut current = document;
    for segment in protected.split('/') {
        let segment = segment.replace(SLASH_PLACEHOLDER, "/");
        current = match current {
            Value::Object(map) => map.get(&segment).ok_or(())?,
            Value::Array(items) => {
                let index: usize = segment.parse().map_err(|_| ())?;
                items.get(index).ok_or(())?
            }
            _ => return Err(()),
        };
    }
    Ok(current)
}

/// A handle to a document that has been fetched (via the resolver chain, or
/// the cache on a hit) and registered in the store, ready to be compiled or
/// to serve as a `$ref` target. Returned by [`crate::load_schema`].
#[derive(Debug, Clone)]
pub struct Schema {
    pub uri: AbsoluteUri,
    pub document: Value,
}

/// The schema store: cached documents (via [`Sources`]) plus their derived
/// anchor tables, keyed by the document's base (fragment-less) URI.
pub struct SchemaStore {
    pub sources: Sources,
    anchors: RwLock<HashMap<AbsoluteUri, HashMap<String, String>>>,
}

impl Default for SchemaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaStore {
    pub fn new() -> Self {
        Self {
            sources: Sources::new(),
            anchors: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a schema document directly, the way `compile()`'s
    /// value-entry point does for a caller-supplied root schema.
    pub fn add_schema(&self, base: AbsoluteUri, document: Value) -> Result<(), SourceError> {
        self.sources.insert(base.clone(), document)?;
        tracing::debug!(uri = %base, "registered schema");
        Ok(())
    }

    fn document(&self, base: &AbsoluteUri) -> Result<Value, SourceError> {
        self.sources.get_or_load(base)
    }

    /// Fetches `uri` through the registered loader chain (a cache hit short
    /// circuits straight to the cached document) and returns a handle to it,
    /// the fetch-by-URI counterpart to [`SchemaStore::add_schema`]'s
    /// pre-loaded-document primitive.
    pub fn load(&self, uri: &AbsoluteUri) -> Result<Schema, SourceError> {
        let base = uri.base();
        let document = self.sources.get_or_load(&base)?;
        Ok(Schema { uri: base, document })
    }

    fn anchors_for(&self, base: &AbsoluteUri, document: &Value) -> HashMap<String, String> {
        if let Some(table) = self.anchors.read().expect("anchor table poisoned").get(base) {
            return table.clone();
        }
        let table = collect_anchors(document);
        self.anchors
            .write()
            .expect("anchor table poisoned")
            .insert(base.clone(), table.clone());
        table
    }

    /// Resolves a `$ref`/`$dynamicRef` value (already joined against the
    /// referring node's base) to the raw schema `Value` it points at.
    pub fn resolve(&self, target: &AbsoluteUri) -> Result<Value, ResolveError> {
        let base = target.base();
        let document = self.document(&base)?;
        let Some(fragment) = target.fragment() else {
            return Ok(document);
        };
        if fragment.is_empty() {
            return Ok(document);
        }
        let anchors = self.anchors_for(&base, &document);
        let pointer = anchors
            .get(fragment)
            .map(String::as_str)
            .unwrap_or(fragment);
        query_pointer(&document, pointer)
            .map(Value::clone)
            .map_err(|_| ResolveError::PointerNotFound {
                uri: target.clone(),
                segment: pointer.to_string(),
            })
    }
}

/// Merges `overlay`'s keys onto `target`, overlay winning on collision, the
/// way sibling keywords beside a `$ref` are merged into the resolved target
/// when a reference handle is dereferenced. This is the *opposite* merge
/// direction from `opyapi.json_schema.JsonReference`'s literal
/// `{**self._ref_document, **doc_fragment}`, where the resolved target wins;
/// sibling keywords overlaying (and winning over) the `$ref` target is the
/// more useful and widely expected behavior, so that's what this does.
pub fn merge_overlay(target: &Value, overlay: &Map<String, Value>) -> Value {
    if overlay.is_empty() {
        return target.clone();
    }
    let mut merged = match target {
        Value::Object(map) => map.clone(),
        Value::Bool(true) => Map::new(),
        other => {
            // A $ref to a non-object schema (boolean `false`, or a scalar
            // reached through a malformed document) has no keys to merge
            // onto; the overlay stands alone.
            let _ = other;
            Map::new()
        }
    };
    for (key, value) in overlay {
        merged.insert(key.clone(), value.clone());
    }
    Value::Object(merged)
}
