//! Variable scopes and their precedence.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

/// Key of the resolved namespace.
pub const NAMESPACE_VAR: &str = "app_var_namespace";
/// Key of the user's home directory.
pub const HOME_VAR: &str = "app_var_home";
/// Key of the fixed host data directory.
pub const DATA_DIR_VAR: &str = "app_var_data_dir";
/// Key of the process working directory.
pub const CWD_VAR: &str = "app_var_cwd";
/// Key of the resolved project root folder.
pub const ROOT_VAR: &str = "app_var_root";

/// Host path mounted into workloads that need persistent local data.
pub const DATA_DIR: &str = "/mnt/sda1/var/data";

/// Prefix of variables derived from builds.
pub const BUILD_VAR_PREFIX: &str = "build_var_";

macro_rules! static_regex {
    ($pattern:expr) => {
        LazyLock::new(|| {
            Regex::new($pattern)
                .unwrap_or_else(|_| panic!("static regex {:?} failed to compile", $pattern))
        })
    };
}

static NON_IDENT: LazyLock<Regex> = static_regex!(r"[^a-zA-Z0-9_]");
static REPEATED_UNDERSCORE: LazyLock<Regex> = static_regex!(r"_+");

/// A flat string-to-string variable mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableScope {
    vars: BTreeMap<String, String>,
}

impl VariableScope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge scopes ordered from lowest to highest priority.
    pub fn merge<'a>(scopes: impl IntoIterator<Item = &'a VariableScope>) -> Self {
        let mut merged = Self::new();
        for scope in scopes {
            merged.extend(scope);
        }
        merged
    }

    /// Bind `key`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Overlay every binding of `other` on top of this scope.
    pub fn extend(&mut self, other: &VariableScope) {
        for (k, v) in &other.vars {
            self.vars.insert(k.clone(), v.clone());
        }
    }

    /// Look up a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Whether the scope has no bindings.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Iterate bindings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse `key=value` pairs, ignoring entries without `=`.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut scope = Self::new();
        for pair in pairs {
            match pair.as_ref().split_once('=') {
                Some((k, v)) => scope.insert(k, v),
                None => tracing::debug!(entry = pair.as_ref(), "Ignoring malformed variable"),
            }
        }
        scope
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VariableScope {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut scope = Self::new();
        for (k, v) in iter {
            scope.insert(k, v);
        }
        scope
    }
}

/// Values computed once per invocation and injected at lowest priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Builtins {
    /// Resolved namespace.
    pub namespace: String,
    /// Home directory of the invoking user.
    pub home: String,
    /// Process working directory.
    pub cwd: String,
    /// Resolved project root folder.
    pub root: String,
}

impl Builtins {
    /// Detect home and working directory from the process environment.
    pub fn detect(namespace: &str, root: &Path) -> Self {
        let home = dirs::home_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        Self {
            namespace: namespace.to_string(),
            home,
            cwd,
            root: root.display().to_string(),
        }
    }

    /// The built-in bindings as a scope.
    pub fn scope(&self) -> VariableScope {
        [
            (NAMESPACE_VAR, self.namespace.as_str()),
            (HOME_VAR, self.home.as_str()),
            (DATA_DIR_VAR, DATA_DIR),
            (CWD_VAR, self.cwd.as_str()),
            (ROOT_VAR, self.root.as_str()),
        ]
        .into_iter()
        .collect()
    }
}

/// Default variable key for a build: `build_var_` plus the sanitized name.
pub fn build_var_name(name: &str) -> String {
    let replaced = NON_IDENT.replace_all(name, "_");
    let collapsed = REPEATED_UNDERSCORE.replace_all(&replaced, "_");
    format!("{BUILD_VAR_PREFIX}{collapsed}")
}
