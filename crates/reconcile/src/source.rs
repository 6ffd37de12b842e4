//! Config source abstraction
//!
//! The engine never touches the file system itself. A [`ConfigSource`] hands
//! it parsed JSON fragments and turns import references into locators.

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;

/// Provider of configuration fragments
pub trait ConfigSource {
    /// Load and parse the fragment at `locator`
    fn load_fragment(&self, locator: &str) -> Result<Value>;

    /// Turn an `import` reference found in `base` into a locator
    fn resolve_import(&self, reference: &str, base: &str) -> Result<String>;
}

/// In-memory source keyed by locator
///
/// Import references are used as locators unchanged.
///
/// ```
/// use reconcile::source::{ConfigSource, MemorySource};
/// use serde_json::json;
///
/// let mut source = MemorySource::new();
/// source.insert("dev", json!({"dbtopo": {"format": "0.1"}}));
/// assert!(source.load_fragment("dev").is_ok());
/// assert!(source.load_fragment("prod").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    fragments: HashMap<String, Value>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, locator: impl Into<String>, fragment: Value) {
        self.fragments.insert(locator.into(), fragment);
    }

    pub fn with(mut self, locator: impl Into<String>, fragment: Value) -> Self {
        self.insert(locator, fragment);
        self
    }
}

impl ConfigSource for MemorySource {
    fn load_fragment(&self, locator: &str) -> Result<Value> {
        self.fragments
            .get(locator)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no fragment named {locator}"))
    }

    fn resolve_import(&self, reference: &str, _base: &str) -> Result<String> {
        Ok(reference.to_string())
    }
}
