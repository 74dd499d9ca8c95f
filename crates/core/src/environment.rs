//! Environment management for scoped tool execution
//!
//! This module handles the variables visible to a unit of work: the inherited
//! [`Environment`], the [`EnvironmentOverlay`] a wrapper contributes for one
//! scope, and the [`EnvironmentExpander`] chain composing overlays from every
//! enclosing scope. Overlays never mutate the environment they are applied
//! to; applying produces a fresh [`Environment`].

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::sync::{Arc, LazyLock};

/// Matches `${NAME}` and `$NAME` references.
#[allow(clippy::expect_used)]
static VAR_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_.]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("variable reference pattern is valid")
});

/// Variable naming and path list rules of the platform work runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvConvention {
    /// Case-sensitive names, `:` between path entries
    #[default]
    Unix,
    /// Case-insensitive names (`Path` is `PATH`), `;` between path entries
    Windows,
}

impl EnvConvention {
    /// Convention of the machine this process runs on.
    #[must_use]
    pub fn host() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Unix }
    }

    /// Separator between entries of PATH-like variables.
    #[must_use]
    pub fn path_separator(self) -> char {
        match self {
            Self::Unix => ':',
            Self::Windows => ';',
        }
    }

    /// Whether variable names compare case-insensitively.
    #[must_use]
    pub fn case_insensitive_names(self) -> bool {
        self == Self::Windows
    }
}

/// Runtime environment variables for a unit of work
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Environment {
    /// Map of environment variable names to values
    #[serde(flatten)]
    pub vars: BTreeMap<String, String>,
}

impl Environment {
    /// Create a new empty environment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create environment from a map
    #[must_use]
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    /// Capture the current process environment
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    /// Get an environment variable value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set an environment variable
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Check if an environment variable exists
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Get all environment variables as a vector of key=value strings
    #[must_use]
    pub fn to_env_vec(&self) -> Vec<String> {
        self.vars.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }

    /// Get the number of environment variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Check if the environment is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over all variables in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }

    /// Expand `$NAME` and `${NAME}` references in `text` against this environment.
    ///
    /// References to variables that are not defined expand to the empty
    /// string, so the result never contains an unexpanded reference.
    #[must_use]
    pub fn expand(&self, text: &str) -> String {
        if !text.contains('$') {
            return text.to_string();
        }
        VAR_REFERENCE
            .replace_all(text, |caps: &Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map_or("", |m| m.as_str());
                self.get(name).map_or_else(
                    || {
                        tracing::debug!(variable = name, "Undefined variable expanded to empty");
                        String::new()
                    },
                    str::to_string,
                )
            })
            .into_owned()
    }

    /// Apply a single override.
    ///
    /// A key of the form `NAME+TAG` prepends `value` to `NAME` using the
    /// convention's path separator. An empty value removes a plain key and
    /// leaves a `NAME+TAG` target untouched. Under the Windows convention an
    /// existing variable matching the name in any case is the one updated.
    pub fn override_var(&mut self, key: &str, value: &str, convention: EnvConvention) {
        if let Some((real_key, _tag)) = key.split_once('+')
            && !real_key.is_empty()
        {
            if value.is_empty() {
                return;
            }
            let target = self.existing_key(real_key, convention);
            let combined = match self.vars.get(&target) {
                Some(existing) if !existing.is_empty() => {
                    format!("{value}{}{existing}", convention.path_separator())
                }
                _ => value.to_string(),
            };
            self.vars.insert(target, combined);
            return;
        }

        let target = self.existing_key(key, convention);
        if value.is_empty() {
            self.vars.remove(&target);
        } else {
            self.vars.insert(target, value.to_string());
        }
    }

    /// Name under which `key` is stored, keeping the existing spelling when
    /// names are case-insensitive.
    fn existing_key(&self, key: &str, convention: EnvConvention) -> String {
        if convention.case_insensitive_names()
            && !self.vars.contains_key(key)
            && let Some(existing) = self.vars.keys().find(|k| k.eq_ignore_ascii_case(key))
        {
            return existing.clone();
        }
        key.to_string()
    }
}

impl FromIterator<(String, String)> for Environment {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

/// Variable bindings contributed by one execution scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentOverlay {
    overrides: BTreeMap<String, String>,
}

impl EnvironmentOverlay {
    /// Create an empty overlay
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding, returning the extended overlay
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Get the value bound to `key`, if the overlay carries that key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    /// Iterate over the bindings in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.overrides.iter()
    }

    /// Number of bindings
    #[must_use]
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    /// Whether the overlay has no bindings
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    /// Apply every binding to `env` in key order.
    pub fn apply_to(&self, env: &mut Environment, convention: EnvConvention) {
        for (key, value) in &self.overrides {
            env.override_var(key, value, convention);
        }
    }
}

/// Immutable chain of overlays, outermost scope first.
///
/// Each nested scope produces a new expander with [`EnvironmentExpander::merge`];
/// the outer expander is shared, never modified, so a scope's overlay stops
/// being visible as soon as its expander is dropped.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentExpander {
    layers: Vec<Arc<EnvironmentOverlay>>,
}

impl EnvironmentExpander {
    /// An expander with a single overlay
    #[must_use]
    pub fn of(overlay: EnvironmentOverlay) -> Self {
        Self {
            layers: vec![Arc::new(overlay)],
        }
    }

    /// Compose `overlay` inside `outer`.
    ///
    /// Bindings from `outer` stay visible except where `overlay` binds the
    /// same key.
    #[must_use]
    pub fn merge(outer: Option<&Self>, overlay: EnvironmentOverlay) -> Self {
        let mut layers = outer.map(|e| e.layers.clone()).unwrap_or_default();
        layers.push(Arc::new(overlay));
        Self { layers }
    }

    /// Number of composed overlays
    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Produce the effective environment for `base`, outermost overlay first.
    #[must_use]
    pub fn apply(&self, base: &Environment, convention: EnvConvention) -> Environment {
        let mut env = base.clone();
        for layer in &self.layers {
            layer.apply_to(&mut env, convention);
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Environment {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_environment_basics() {
        let mut env = Environment::new();
        assert!(env.is_empty());

        env.set("FOO", "bar");
        assert_eq!(env.len(), 1);
        assert!(env.contains("FOO"));
        assert_eq!(env.get("FOO"), Some("bar"));
        assert!(!env.contains("BAR"));
        assert_eq!(env.to_env_vec(), vec!["FOO=bar".to_string()]);
    }

    #[test]
    fn test_expand_braced_and_bare_references() {
        let env = env(&[("AGENT", "/mnt/agent"), ("VERSION", "2.9")]);
        assert_eq!(
            env.expand("${AGENT}/codeql-$VERSION"),
            "/mnt/agent/codeql-2.9"
        );
        assert_eq!(env.expand("/opt/codeql"), "/opt/codeql");
    }

    #[test]
    fn test_expand_undefined_reference_is_empty() {
        let env = Environment::new();
        assert_eq!(env.expand("/opt/${MISSING}/codeql"), "/opt//codeql");
        assert_eq!(env.expand("$MISSING"), "");
    }

    #[test]
    fn test_expand_dotted_braced_reference() {
        let env = env(&[("user.home", "/home/ci")]);
        assert_eq!(env.expand("${user.home}/tools"), "/home/ci/tools");
    }

    #[test]
    fn test_override_prepends_path() {
        let mut env = env(&[("PATH", "/usr/bin")]);
        env.override_var("PATH+CODEQL", "/opt/codeql", EnvConvention::Unix);
        assert_eq!(env.get("PATH"), Some("/opt/codeql:/usr/bin"));
    }

    #[test]
    fn test_override_prepend_without_existing_value() {
        let mut env = Environment::new();
        env.override_var("PATH+CODEQL", "/opt/codeql", EnvConvention::Windows);
        assert_eq!(env.get("PATH"), Some("/opt/codeql"));
    }

    #[test]
    fn test_empty_override_clears_plain_key_and_keeps_path() {
        let mut env = env(&[("PATH", "/usr/bin"), ("CODEQL_CLI_HOME", "/old")]);
        env.override_var("PATH+CODEQL", "", EnvConvention::Unix);
        env.override_var("CODEQL_CLI_HOME", "", EnvConvention::Unix);
        assert_eq!(env.get("PATH"), Some("/usr/bin"));
        assert!(!env.contains("CODEQL_CLI_HOME"));
    }

    #[test]
    fn test_windows_override_updates_existing_spelling() {
        let mut env = env(&[("Path", "C:\\Windows\\system32"), ("CodeQL_CLI_Home", "C:\\old")]);
        env.override_var("PATH+CODEQL", "C:\\codeql", EnvConvention::Windows);
        env.override_var("CODEQL_CLI_HOME", "", EnvConvention::Windows);

        assert_eq!(env.to_env_vec(), vec!["Path=C:\\codeql;C:\\Windows\\system32".to_string()]);
    }

    #[test]
    fn test_unix_override_keeps_names_distinct() {
        let mut env = env(&[("Path", "/not/the/path")]);
        env.override_var("PATH+CODEQL", "/opt/codeql", EnvConvention::Unix);
        assert_eq!(env.get("PATH"), Some("/opt/codeql"));
        assert_eq!(env.get("Path"), Some("/not/the/path"));
    }

    #[test]
    fn test_expander_composes_without_mutating_base() {
        let base = env(&[("PATH", "/usr/bin"), ("KEEP", "1")]);
        let outer = EnvironmentExpander::of(
            EnvironmentOverlay::new()
                .with("OUTER", "yes")
                .with("SHADOWED", "outer"),
        );
        let inner = EnvironmentExpander::merge(
            Some(&outer),
            EnvironmentOverlay::new()
                .with("SHADOWED", "inner")
                .with("PATH+CODEQL", "/opt/codeql"),
        );

        let effective = inner.apply(&base, EnvConvention::Unix);
        assert_eq!(inner.depth(), 2);
        assert_eq!(effective.get("OUTER"), Some("yes"));
        assert_eq!(effective.get("SHADOWED"), Some("inner"));
        assert_eq!(effective.get("KEEP"), Some("1"));
        assert_eq!(effective.get("PATH"), Some("/opt/codeql:/usr/bin"));

        // The inherited environment and the outer scope are untouched
        assert_eq!(base.get("PATH"), Some("/usr/bin"));
        assert_eq!(outer.apply(&base, EnvConvention::Unix).get("SHADOWED"), Some("outer"));
    }
}
