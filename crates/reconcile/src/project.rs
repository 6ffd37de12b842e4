//! Fragment loading
//!
//! A project is the root fragment plus everything it imports, transitively.
//! Fragments are kept in discovery order: root first, then depth-first into
//! each import in the order they are listed. That order is the precedence
//! order used by composition and parameter lookup.

use crate::compose::{Composition, compose};
use crate::error::{Error, Result};
use crate::params::{Layer, ParamStore};
use crate::source::ConfigSource;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Key wrapping every fragment document
pub const DOCUMENT_KEY: &str = "dbtopo";

/// Fragment formats this version understands
pub const SUPPORTED_FORMATS: &[&str] = &["0.1"];

/// Project-namespace keys a fragment may set
const PROJECT_KEYS: &[&str] = &["code", "title", "host", "user", "password"];

/// `import` accepts a single locator or a list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Imports {
    One(String),
    Many(Vec<String>),
}

impl Default for Imports {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl Imports {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

/// One parsed configuration fragment
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fragment {
    /// Where the fragment was loaded from
    #[serde(skip)]
    pub locator: String,

    pub format: String,

    #[serde(default)]
    pub import: Imports,

    #[serde(default)]
    pub comment: Option<String>,

    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// User parameters, referenced as `${name}`
    #[serde(default)]
    pub params: Map<String, Value>,

    /// API endpoint overrides, by API name
    #[serde(default)]
    pub apis: Map<String, Value>,

    #[serde(default)]
    pub databases: Vec<Map<String, Value>>,

    #[serde(default)]
    pub servers: Vec<Map<String, Value>>,
}

impl Fragment {
    /// Parse a fragment document, checking its wrapper and format tag
    pub fn from_document(locator: &str, document: Value) -> Result<Self> {
        let unsupported = |found: String| Error::UnsupportedFormat {
            locator: locator.to_string(),
            found,
        };

        let Value::Object(mut document) = document else {
            return Err(unsupported("document is not a JSON object".to_string()));
        };
        let Some(inner) = document.remove(DOCUMENT_KEY) else {
            return Err(unsupported(format!("no top-level \"{DOCUMENT_KEY}\" key")));
        };

        match inner.get("format") {
            Some(Value::String(f)) if SUPPORTED_FORMATS.contains(&f.as_str()) => {}
            Some(other) => return Err(unsupported(format!("format {other}"))),
            None => return Err(unsupported("missing format".to_string())),
        }

        let mut fragment: Fragment = serde_json::from_value(inner)
            .map_err(|e| Error::composition(format!("invalid fragment {locator}: {e}")))?;
        fragment.locator = locator.to_string();
        Ok(fragment)
    }

    /// The parameter layer this fragment contributes
    pub fn layer(&self) -> Layer {
        let mut layer = Layer::new(&self.locator);
        let values = [
            &self.code,
            &self.title,
            &self.host,
            &self.user,
            &self.password,
        ];
        for (key, value) in PROJECT_KEYS.iter().zip(values) {
            if let Some(v) = value {
                layer.project.insert((*key).to_string(), Value::String(v.clone()));
            }
        }
        layer.params = self.params.clone();
        layer
    }
}

/// The root fragment and its transitive imports
#[derive(Debug, Clone)]
pub struct Project {
    pub fragments: Vec<Fragment>,
}

impl Project {
    /// Load `root` and every fragment it imports
    pub fn load(source: &dyn ConfigSource, root: &str) -> Result<Self> {
        let mut fragments = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = Vec::new();
        visit(source, root, &mut stack, &mut seen, &mut fragments)?;
        log::debug!(
            "Loaded {} fragment(s): {}",
            fragments.len(),
            fragments
                .iter()
                .map(|f| f.locator.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self { fragments })
    }

    /// Parameter store with one layer per fragment, root first
    pub fn params(&self) -> ParamStore {
        let mut store = ParamStore::new();
        for fragment in &self.fragments {
            store.push_layer(fragment.layer());
        }
        store
    }

    /// Compose all fragments into one set of declarations
    pub fn compose(&self) -> Result<Composition> {
        compose(&self.fragments, &self.params())
    }
}

fn visit(
    source: &dyn ConfigSource,
    locator: &str,
    stack: &mut Vec<String>,
    seen: &mut HashSet<String>,
    out: &mut Vec<Fragment>,
) -> Result<()> {
    if stack.iter().any(|l| l == locator) {
        return Err(Error::composition(format!(
            "import cycle: {} -> {locator}",
            stack.join(" -> ")
        )));
    }
    if !seen.insert(locator.to_string()) {
        log::trace!("{locator} already loaded through another import");
        return Ok(());
    }

    let document = source.load_fragment(locator).map_err(|e| Error::Source {
        locator: locator.to_string(),
        message: format!("{e:#}"),
    })?;
    let fragment = Fragment::from_document(locator, document)?;
    let imports = fragment.import.to_vec();
    out.push(fragment);

    stack.push(locator.to_string());
    for reference in imports {
        let target = source
            .resolve_import(&reference, locator)
            .map_err(|e| Error::Source {
                locator: reference.clone(),
                message: format!("{e:#}"),
            })?;
        visit(source, &target, stack, seen, out)?;
    }
    stack.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Namespace;
    use crate::source::MemorySource;
    use serde_json::json;

    fn doc(body: Value) -> Value {
        let mut body = body;
        body["format"] = json!("0.1");
        json!({ "dbtopo": body })
    }

    #[test]
    fn test_load_discovery_order() {
        let source = MemorySource::new()
            .with("root", doc(json!({"import": ["a", "b"]})))
            .with("a", doc(json!({"import": "c"})))
            .with("b", doc(json!({"import": "c"})))
            .with("c", doc(json!({})));

        let project = Project::load(&source, "root").unwrap();
        let order: Vec<_> = project.fragments.iter().map(|f| f.locator.as_str()).collect();
        assert_eq!(order, vec!["root", "a", "c", "b"]);
    }

    #[test]
    fn test_load_import_cycle() {
        let source = MemorySource::new()
            .with("root", doc(json!({"import": "a"})))
            .with("a", doc(json!({"import": "root"})));

        let err = Project::load(&source, "root").unwrap_err();
        assert!(matches!(err, Error::Composition(ref m) if m.contains("import cycle")));
    }

    #[test]
    fn test_load_missing_fragment() {
        let source = MemorySource::new().with("root", doc(json!({"import": "gone"})));
        let err = Project::load(&source, "root").unwrap_err();
        assert!(matches!(err, Error::Source { ref locator, .. } if locator == "gone"));
    }

    #[test]
    fn test_rejects_unknown_format() {
        let err = Fragment::from_document("x", json!({"dbtopo": {"format": "9.9"}})).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));

        let err = Fragment::from_document("x", json!({"other": {}})).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));

        let err = Fragment::from_document("x", json!({"dbtopo": {}})).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_rejects_unknown_top_level_key() {
        let err = Fragment::from_document("x", doc(json!({"dataabses": []}))).unwrap_err();
        assert!(matches!(err, Error::Composition(_)));
    }

    #[test]
    fn test_params_layers_root_first() {
        let source = MemorySource::new()
            .with(
                "root",
                doc(json!({"import": "base", "code": "shop", "params": {"port": 8010}})),
            )
            .with(
                "base",
                doc(json!({"code": "base", "title": "Base", "params": {"port": 8000, "x": 1}})),
            );

        let params = Project::load(&source, "root").unwrap().params();
        assert_eq!(params.layers().len(), 2);
        assert_eq!(params.lookup(Namespace::Project, "code"), Some(&json!("shop")));
        assert_eq!(params.lookup(Namespace::Project, "title"), Some(&json!("Base")));
        assert_eq!(params.lookup(Namespace::Params, "port"), Some(&json!(8010)));
        assert_eq!(params.lookup(Namespace::Params, "x"), Some(&json!(1)));
    }
}
