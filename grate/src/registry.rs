//! The process-wide `Registry`: the document loader chain, schema store, and
//! format table bundled behind locks, exposed as an object callers may pass
//! explicitly or default to a process singleton. Grounded on
//! `grill::Interrogator`'s role as the single object bundling a build's
//! stores, generalized here to a simpler, non-builder-pattern struct since
//! this engine has no async dialect registration step to build up first.

use std::sync::RwLock;

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::SourceError;
use crate::format::{Format, FormatRegistry};
use crate::schema::{Schema, SchemaStore};
use crate::source::Resolve;
use crate::uri::AbsoluteUri;

pub struct Registry {
    pub store: SchemaStore,
    formats: RwLock<FormatRegistry>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// An empty registry: no schemas registered, only built-in formats and
    /// the default `file://` loader.
    pub fn new() -> Self {
        Self {
            store: SchemaStore::new(),
            formats: RwLock::new(FormatRegistry::with_builtins()),
        }
    }

    /// The process-wide singleton used by the free functions
    /// [`crate::compile`]/[`crate::validate`].
    pub fn global() -> &'static Registry {
        static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
        &REGISTRY
    }

    pub fn register_format(&self, name: impl Into<String>, format: impl Format + 'static) {
        self.formats.write().expect("format registry poisoned").register(name, format);
    }

    pub fn register_loader(&self, loader: impl Resolve + 'static) {
        self.store.sources.register_loader(loader);
    }

    pub fn add_schema(&self, base: AbsoluteUri, document: Value) -> Result<(), SourceError> {
        self.store.add_schema(base, document)
    }

    /// Fetches `uri` through the registered loader chain and returns a
    /// handle to it, registering it in the store as a side effect so later
    /// `$ref`s targeting it resolve against the same document.
    pub fn load_schema(&self, uri: &AbsoluteUri) -> Result<Schema, SourceError> {
        self.store.load(uri)
    }

    /// A snapshot of the format table, taken at the start of a `compile`
    /// call so later registrations never affect a compilation already in
    /// flight.
    pub fn formats_snapshot(&self) -> FormatRegistry {
        self.formats.read().expect("format registry poisoned").clone()
    }
}
