//! The URI model: absolute URIs, relative composition, and fragment
//! access. Grounded on `grill::uri::AbsoluteUri`, which wraps `url::Url`
//! (and, for that crate's broader purposes, `urn::Urn`). This engine's URI
//! model only ever needs `scheme://path#fragment` forms — `$id`, `$ref`, and
//! loader keys are all resolved against `http(s)`/`file`/`self` schemes — so
//! `urn` is dropped and `AbsoluteUri` wraps `url::Url` directly.
//!
//! Relative composition is implemented entirely in terms of `Url::join`,
//! whose WHATWG relative-resolution semantics already match the rules a
//! `$ref`/`$id` resolver needs: a fragment-only operand replaces only the
//! fragment, an absolute operand replaces everything, an absolute-path
//! operand replaces the path and fragment, and a relative-path operand
//! resolves against the parent "directory" with `.`/`..` segments
//! collapsed.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UriError {
    #[error("`{0}` is not a valid URI")]
    Parse(String),

    #[error("`{0}` could not be resolved against base `{1}`")]
    Relative(String, String),
}

/// An absolute URI, optionally carrying a fragment.
///
/// Equality and hashing are by normalized string form (`url::Url`'s own
/// normalization): two `AbsoluteUri` values are equal iff their normalized
/// string forms are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AbsoluteUri(Url);

static SYNTHETIC_COUNTER: AtomicU64 = AtomicU64::new(0);

impl AbsoluteUri {
    /// Parses an absolute URI. Relative references must go through
    /// [`AbsoluteUri::append`] against a base instead.
    pub fn parse(s: &str) -> Result<Self, UriError> {
        Url::parse(s)
            .map(AbsoluteUri)
            .map_err(|_| UriError::Parse(s.to_string()))
    }

    /// A synthetic, process-unique base URI for a schema document with no
    /// `$id`, grounded on `opyapi.json_schema.JsonSchema`'s
    /// `self://schema:local@{id(document)}` fallback — here a monotonic
    /// counter stands in for `id(document)`, since Rust has no object-identity
    /// equivalent and a counter is simpler than pulling in a UUID generator
    /// for a value never meant to be parsed by a caller.
    pub fn synthetic() -> Self {
        let n = SYNTHETIC_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::parse(&format!("self://schema/{n}")).expect("synthetic uri is always valid")
    }

    /// The URI with any fragment removed.
    pub fn base(&self) -> Self {
        let mut url = self.0.clone();
        url.set_fragment(None);
        AbsoluteUri(url)
    }

    /// The fragment, if any, without the leading `#`.
    pub fn fragment(&self) -> Option<&str> {
        self.0.fragment()
    }

    /// Returns a copy of this URI with `fragment` set (replacing any
    /// existing one).
    pub fn with_fragment(&self, fragment: &str) -> Self {
        let mut url = self.0.clone();
        url.set_fragment(Some(fragment.trim_start_matches('#')));
        AbsoluteUri(url)
    }

    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    /// Resolves `relative` against `self` using WHATWG relative-composition
    /// rules.
    pub fn append(&self, relative: &str) -> Result<Self, UriError> {
        if relative.is_empty() {
            return Ok(self.clone());
        }
        self.0
            .join(relative)
            .map(AbsoluteUri)
            .map_err(|_| UriError::Relative(relative.to_string(), self.0.to_string()))
    }
}

impl fmt::Display for AbsoluteUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AbsoluteUri {
    type Err = UriError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AbsoluteUri::parse(s)
    }
}

impl TryFrom<String> for AbsoluteUri {
    type Error = UriError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        AbsoluteUri::parse(&value)
    }
}

impl From<AbsoluteUri> for String {
    fn from(value: AbsoluteUri) -> Self {
        value.0.into()
    }
}
