//! Name-keyed factory registries.
//!
//! Model and search backends are both chosen by a config string. A
//! [`Registry`] maps that string (or an alias of it) to a factory; the
//! provider-specific `create`/`validate` live next to each factory trait.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A factory that can be looked up by name.
pub trait Registered: Send + Sync {
    /// What the registry holds, for error messages ("model provider").
    const KIND: &'static str;

    /// Registered name, e.g. "openai" or "exa".
    fn registered_name(&self) -> &'static str;

    /// One-line description for listings.
    fn registered_description(&self) -> &'static str;
}

/// Lookup of a name no factory is registered under.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind}: '{name}'. Available: {available:?}")]
pub struct UnknownName {
    pub kind: &'static str,
    pub name: String,
    pub available: Vec<String>,
}

/// Factories keyed by name, plus aliases.
pub struct Registry<F: ?Sized> {
    factories: BTreeMap<String, Arc<F>>,
    aliases: BTreeMap<String, String>,
}

impl<F: ?Sized + Registered> Registry<F> {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Register a factory under its name, replacing any previous one.
    pub fn register(&mut self, factory: Arc<F>) {
        self.factories
            .insert(factory.registered_name().to_string(), factory);
    }

    /// Make `alias` resolve to `target`.
    pub fn alias(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        self.aliases.insert(alias.into(), target.into());
    }

    /// Resolve an alias. Names that are not aliases resolve to themselves.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    /// The factory registered under `name` or its alias target.
    pub fn get(&self, name: &str) -> Result<&Arc<F>, UnknownName> {
        self.factories.get(self.resolve(name)).ok_or_else(|| UnknownName {
            kind: F::KIND,
            name: name.to_string(),
            available: self.available_names().into_iter().map(str::to_string).collect(),
        })
    }

    /// Whether `name` resolves to a factory.
    pub fn has_provider(&self, name: &str) -> bool {
        self.factories.contains_key(self.resolve(name))
    }

    /// Every name that resolves, registered names and live aliases, sorted.
    pub fn available_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.extend(
            self.aliases
                .iter()
                .filter(|(_, target)| self.factories.contains_key(target.as_str()))
                .map(|(alias, _)| alias.as_str()),
        );
        names.sort_unstable();
        names
    }

    /// Registered names with their descriptions. Aliases are not listed.
    pub fn describe(&self) -> Vec<(&str, &'static str)> {
        self.factories
            .iter()
            .map(|(name, f)| (name.as_str(), f.registered_description()))
            .collect()
    }
}

impl<F: ?Sized + Registered> Default for Registry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized + Registered> fmt::Debug for Registry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &F::KIND)
            .field("names", &self.available_names())
            .finish()
    }
}
