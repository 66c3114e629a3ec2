//! The string-format registry.
//!
//! Built-in formats and their patterns are carried over verbatim from
//! `opyapi.validators.format_validators`, the ground truth this engine's
//! format table was distilled from. Format names absent from the registry
//! are accepted silently (unknown formats pass), a deliberate deviation
//! from `opyapi`'s `StringFormat[format_name]` enum lookup, which raises
//! `KeyError` on an unknown name.

use std::collections::HashMap;
use std::sync::Arc;

use fancy_regex::Regex;
use once_cell::sync::Lazy;

/// A named string-format check. Implementors receive the raw string value
/// (format checks only ever apply to JSON strings) and report pass/fail.
pub trait Format: Send + Sync {
    fn validate(&self, value: &str) -> bool;
}

impl<F> Format for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn validate(&self, value: &str) -> bool {
        self(value)
    }
}

/// A snapshot-able table of named format checks.
#[derive(Clone)]
pub struct FormatRegistry {
    formats: HashMap<String, Arc<dyn Format>>,
}

impl FormatRegistry {
    /// The registry with every built-in format keyword value registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            formats: HashMap::new(),
        };
        registry.register("date-time", is_date_time);
        registry.register("date", is_date);
        registry.register("time", is_time);
        registry.register("time-duration", is_time_duration);
        registry.register("decimal", is_decimal);
        registry.register("email", is_email);
        registry.register("hostname", is_hostname);
        registry.register("ip-address", is_ip_address);
        registry.register("ip-address-v4", is_ipv4);
        registry.register("ip-address-v6", is_ipv6);
        registry.register("semver", is_semver);
        registry.register("uri", is_uri);
        registry.register("url", is_url);
        registry.register("uuid", is_uuid);
        registry.register("boolean", is_boolean_string);
        registry.register("byte", is_byte);
        registry.register("pattern", is_valid_pattern);
        registry.register("password", is_password);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, format: impl Format + 'static) {
        self.formats.insert(name.into(), Arc::new(format));
    }

    /// Looks up `name`; `None` means the format is unknown and the caller
    /// should treat the check as passing.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Format>> {
        self.formats.get(name)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("registered", &self.formats.keys().collect::<Vec<_>>())
            .finish()
    }
}

macro_rules! regex {
    ($name:ident, $pattern:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($pattern).expect("valid regex"));
    };
}

regex!(
    ISO_8601_DATETIME_REGEX,
    r"^\d{4}-\d{2}-\d{2}[Tt]\d{2}:\d{2}:\d{2}(\.\d+)?([Zz]|[+-]\d{2}:\d{2})$"
);
regex!(ISO_8601_DATE_REGEX, r"^\d{4}-\d{2}-\d{2}$");
regex!(
    ISO_8601_TIME_REGEX,
    r"^\d{2}:\d{2}:\d{2}(\.\d+)?([Zz]|[+-]\d{2}:\d{2})?$"
);
regex!(
    ISO_8601_TIME_DURATION_REGEX,
    r"^P(?!$)(\d+Y)?(\d+M)?(\d+D)?(T(?=\d)(\d+H)?(\d+M)?(\d+S)?)?$"
);
regex!(
    EMAIL_REGEX,
    r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$"
);
regex!(
    HOSTNAME_REGEX,
    r"^(?=.{1,253}$)(?!-)[A-Za-z0-9-]{1,63}(?<!-)(\.(?!-)[A-Za-z0-9-]{1,63}(?<!-))*$"
);
regex!(
    SEMVER_REGEX,
    r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$"
);
regex!(
    URI_REGEX,
    r"^[a-zA-Z][a-zA-Z0-9+.-]*:[^\s]*$"
);
regex!(
    URL_REGEX,
    r"^(https?|ftp)://(?!(?:10|127)(?:\.\d{1,3}){3})(?!(?:169\.254|192\.168)(?:\.\d{1,3}){2})(?!172\.(?:1[6-9]|2\d|3[0-1])(?:\.\d{1,3}){2})(?:[A-Za-z0-9-]+\.)+[A-Za-z]{2,}(:\d+)?(/[^\s]*)?$"
);
regex!(
    UUID_REGEX,
    r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
);

fn matches(re: &Regex, value: &str) -> bool {
    re.is_match(value).unwrap_or(false)
}

fn is_date_time(value: &str) -> bool {
    matches(&ISO_8601_DATETIME_REGEX, value)
}

fn is_date(value: &str) -> bool {
    matches(&ISO_8601_DATE_REGEX, value)
}

fn is_time(value: &str) -> bool {
    matches(&ISO_8601_TIME_REGEX, value)
}

fn is_time_duration(value: &str) -> bool {
    matches(&ISO_8601_TIME_DURATION_REGEX, value)
}

fn is_decimal(value: &str) -> bool {
    crate::number::parse(value).is_some()
}

fn is_email(value: &str) -> bool {
    if value.contains("..") {
        return false;
    }
    matches(&EMAIL_REGEX, value)
}

fn is_hostname(value: &str) -> bool {
    matches(&HOSTNAME_REGEX, value)
}

fn is_ipv4(value: &str) -> bool {
    value.parse::<std::net::Ipv4Addr>().is_ok()
}

fn is_ipv6(value: &str) -> bool {
    value.parse::<std::net::Ipv6Addr>().is_ok()
}

fn is_ip_address(value: &str) -> bool {
    is_ipv4(value) || is_ipv6(value)
}

fn is_semver(value: &str) -> bool {
    matches(&SEMVER_REGEX, value)
}

fn is_uri(value: &str) -> bool {
    matches(&URI_REGEX, value)
}

fn is_url(value: &str) -> bool {
    matches(&URL_REGEX, value)
}

fn is_uuid(value: &str) -> bool {
    matches(&UUID_REGEX, value)
}

const FALSY: [&str; 7] = ["0", "false", "f", "n", "no", "nope", "off"];
const TRUTHY: [&str; 8] = ["1", "true", "t", "y", "yes", "yup", "ok", "on"];

fn is_boolean_string(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    FALSY.contains(&lower.as_str()) || TRUTHY.contains(&lower.as_str())
}

fn is_byte(value: &str) -> bool {
    base64::decode(value).is_ok()
}

fn is_password(_value: &str) -> bool {
    true
}

/// `format: "pattern"` validates that the string is itself a syntactically
/// valid regex, grounded on `opyapi.validators.format_validators.validate_format_pattern`'s
/// `re.compile(value)` probe.
fn is_valid_pattern(value: &str) -> bool {
    Regex::new(value).is_ok()
}
