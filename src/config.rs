//! Configuration management using Figment
//!
//! [`ProviderConfig`] holds the knobs of a generated route group: the default page
//! size and where each read handler takes its parameters from. It layers, lowest
//! priority first:
//!
//! 1. built-in defaults
//! 2. `DOCPROVIDER_*` environment variables (`DOCPROVIDER_DEFAULT_PAGE_SIZE=25`)
//!
//! Namespaced settings in the dotted form `<namespace>.<a>.<b>` are read through
//! [`environment_tree`], which never touches the process environment.

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

use crate::query::{DEFAULT_PAGE_SIZE, Source};

/// Prefix marking a priority override: `_PO.app.db.host` beats `app.db.host`.
pub const PRIORITY_PREFIX: &str = "_PO.";

/// Environment prefix read by [`ProviderConfig::load`].
pub const ENV_PREFIX: &str = "DOCPROVIDER_";

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Page size used when a request sends no `pageSize`
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub default_page_size: u64,
    /// Parameter source of `GET /`
    pub list_source: Source,
    /// Parameter source of `GET /find`
    pub find_source: Source,
    /// Parameter source of `GET /one`
    pub find_one_source: Source,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            list_source: Source::Query,
            find_source: Source::Query,
            find_one_source: Source::Query,
        }
    }
}

impl ProviderConfig {
    /// Defaults overridden by `DOCPROVIDER_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a variable cannot be converted to its field type.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::extract_from(Figment::new().merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Read the `namespace` subtree of dotted environment keys, see [`environment_tree`].
    ///
    /// # Errors
    ///
    /// Returns an error when a value cannot be converted to its field type.
    pub fn from_environment<I, K, V>(vars: I, namespace: &str) -> Result<Self, Box<figment::Error>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let tree = environment_tree(vars, namespace);
        Self::extract_from(Figment::new().merge(Serialized::defaults(tree)))
    }

    /// Extract from `figment` layered over the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when a provided value has the wrong type.
    pub fn extract_from(figment: Figment) -> Result<Self, Box<figment::Error>> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(figment)
            .extract()
            .map_err(Box::new)?;
        tracing::debug!(?config, "Loaded provider configuration");
        Ok(config)
    }
}

fn strip_priority(key: &str) -> Option<&str> {
    let head = key.get(..PRIORITY_PREFIX.len())?;
    head.eq_ignore_ascii_case(PRIORITY_PREFIX)
        .then(|| &key[PRIORITY_PREFIX.len()..])
}

fn insert_nested(tree: &mut Map<String, Value>, path: &str, value: &str) {
    let mut segments = path.split('.').filter(|s| !s.is_empty()).peekable();
    let mut node = tree;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            node.insert(segment.to_string(), Value::String(value.to_string()));
            return;
        }
        let child = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !child.is_object() {
            *child = Value::Object(Map::new());
        }
        let Value::Object(next) = child else { return };
        node = next;
    }
}

/// Build the nested tree of every `<namespace>.<a>.<b>=value` variable.
///
/// Keys carrying the case-insensitive `_PO.` prefix are stripped of it and win over
/// plain keys with the same path. Keys outside `namespace` are ignored. The input is
/// only read.
///
/// ```rust
/// use docprovider::config::environment_tree;
/// use serde_json::json;
///
/// let vars = [
///     ("app.db.host", "localhost"),
///     ("_PO.app.db.host", "primary"),
///     ("app.db.port", "5432"),
///     ("other.key", "ignored"),
/// ];
/// let tree = environment_tree(vars, "app");
/// assert_eq!(
///     serde_json::Value::Object(tree),
///     json!({"db": {"host": "primary", "port": "5432"}})
/// );
/// ```
pub fn environment_tree<I, K, V>(vars: I, namespace: &str) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let scope = format!("{namespace}.");
    let mut plain = Vec::new();
    let mut priority = Vec::new();
    for (key, value) in vars {
        let key = key.as_ref();
        match strip_priority(key) {
            Some(stripped) => priority.push((stripped.to_string(), value.into())),
            None => plain.push((key.to_string(), value.into())),
        }
    }

    let mut tree = Map::new();
    for (key, value) in plain.iter().chain(priority.iter()) {
        if let Some(path) = key.strip_prefix(&scope) {
            insert_nested(&mut tree, path, value);
        }
    }
    tree
}
