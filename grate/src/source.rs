//! The document loader registry.
//!
//! Grounded on `grill::source::resolve::Resolve` and `grill::source::Source`,
//! but synchronous: this engine compiles on a single thread, with only I/O
//! loaders ever blocking, so the `async_trait`/`reqwest` pairing `grill`
//! uses is replaced with a plain blocking trait and, behind the optional
//! `http` feature, `ureq` instead of `reqwest`.

use std::collections::HashMap;
use std::fs;
use std::sync::RwLock;

use serde_json::Value;

use crate::error::SourceError;
use crate::uri::AbsoluteUri;

/// A pluggable document fetcher, keyed by URI scheme.
///
/// Implementors return `Ok(None)` when they don't recognize the URI (so a
/// chain of resolvers can be tried in order) and `Err` only for a resolver
/// that recognized the scheme but failed to fetch or parse the content.
pub trait Resolve: Send + Sync {
    fn resolve(&self, uri: &AbsoluteUri) -> Result<Option<Value>, SourceError>;
}

/// Loads `file://` URIs from disk, dispatching on extension the way
/// `opyapi.json_schema.FileLoader` dispatches on `FILE_LOADERS`.
#[derive(Debug, Clone, Default)]
pub struct FileLoader;

impl Resolve for FileLoader {
    fn resolve(&self, uri: &AbsoluteUri) -> Result<Option<Value>, SourceError> {
        if uri.scheme() != "file" {
            return Ok(None);
        }
        let path = uri.path();
        let contents = fs::read_to_string(path).map_err(|e| SourceError::Load {
            uri: uri.clone(),
            message: e.to_string(),
        })?;
        deserialize(uri, path, &contents)
    }
}

#[cfg(feature = "http")]
/// Loads `http(s)://` URIs, grounded on `grill::source::resolve::HttpResolver`
/// but synchronous via `ureq` instead of `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpLoader;

#[cfg(feature = "http")]
impl Resolve for HttpLoader {
    fn resolve(&self, uri: &AbsoluteUri) -> Result<Option<Value>, SourceError> {
        if uri.scheme() != "http" && uri.scheme() != "https" {
            return Ok(None);
        }
        let body = ureq::get(&uri.to_string())
            .call()
            .map_err(|e| SourceError::Load {
                uri: uri.clone(),
                message: e.to_string(),
            })?
            .into_string()
            .map_err(|e| SourceError::Load {
                uri: uri.clone(),
                message: e.to_string(),
            })?;
        deserialize(uri, uri.path(), &body)
    }
}

fn deserialize(uri: &AbsoluteUri, path: &str, contents: &str) -> Result<Option<Value>, SourceError> {
    let ext = path.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    let value = match ext.as_str() {
        "json" => serde_json::from_str(contents).map_err(|e| SourceError::Deserialize {
            uri: uri.clone(),
            message: e.to_string(),
        })?,
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| SourceError::Deserialize {
            uri: uri.clone(),
            message: e.to_string(),
        })?,
        _ => serde_json::from_str(contents)
            .or_else(|_| {
                #[cfg(feature = "yaml")]
                {
                    serde_yaml::from_str(contents)
                }
                #[cfg(not(feature = "yaml"))]
                {
                    Err(())
                }
            })
            .map_err(|_| SourceError::Deserialize {
                uri: uri.clone(),
                message: format!("unrecognized document extension for `{path}`"),
            })?,
    };
    Ok(Some(value))
}

/// Tries each registered [`Resolve`] in order, the way
/// `grill::source::resolve::Resolvers::resolve` does.
#[derive(Default)]
pub struct Resolvers(Vec<Box<dyn Resolve>>);

impl Resolvers {
    pub fn new() -> Self {
        Self(vec![Box::new(FileLoader)])
    }

    pub fn push(&mut self, resolver: impl Resolve + 'static) {
        self.0.push(Box::new(resolver));
    }

    pub fn resolve(&self, uri: &AbsoluteUri) -> Result<Value, SourceError> {
        for resolver in &self.0 {
            if let Some(value) = resolver.resolve(uri)? {
                return Ok(value);
            }
        }
        Err(SourceError::NotFound { uri: uri.clone() })
    }
}

/// The document cache: raw, unnormalized JSON values keyed by base URI
/// (fragment-less), grounded on `grill::source::source::Sources`.
#[derive(Default)]
pub struct Sources {
    resolvers: RwLock<Resolvers>,
    cache: RwLock<HashMap<AbsoluteUri, Value>>,
}

impl Sources {
    pub fn new() -> Self {
        Self {
            resolvers: RwLock::new(Resolvers::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Registers an additional loader. This is a setup-time operation; call
    /// it before any `compile`/`validate` call that might read the resolver
    /// chain concurrently.
    pub fn register_loader(&self, resolver: impl Resolve + 'static) {
        self.resolvers.write().expect("resolver chain poisoned").push(resolver);
    }

    /// Inserts a document the caller already has in hand (e.g. from
    /// `grate::compile`'s direct-`Value` entry point). A second registration
    /// at the same URI is a no-op that keeps the first: duplicate `$id`
    /// registrations reuse the first rather than failing, matching how a
    /// bundle that reaches the same shared document from two different
    /// roots is expected to compile.
    pub fn insert(&self, uri: AbsoluteUri, value: Value) -> Result<(), SourceError> {
        let base = uri.base();
        let mut cache = self.cache.write().expect("source cache poisoned");
        if cache.contains_key(&base) {
            return Ok(());
        }
        tracing::debug!(uri = %base, "registered document");
        cache.insert(base, value);
        Ok(())
    }

    /// Returns the cached document at `base`, loading it via the resolver
    /// chain on a cache miss.
    pub fn get_or_load(&self, base: &AbsoluteUri) -> Result<Value, SourceError> {
        if let Some(value) = self.cache.read().expect("source cache poisoned").get(base) {
            return Ok(value.clone());
        }
        let value = self.resolvers.read().expect("resolver chain poisoned").resolve(base)?;
        tracing::debug!(uri = %base, "loaded document");
        self.cache
            .write()
            .expect("source cache poisoned")
            .insert(base.clone(), value.clone());
        Ok(value)
    }
}

impl std::fmt::Debug for Sources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sources")
            .field("cached", &self.cache.read().map(|c| c.len()).unwrap_or(0))
            .finish()
    }
}
