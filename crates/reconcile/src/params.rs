//! Parameter resolution
//!
//! Strings in a topology may reference two namespaces:
//! - `@{name}` - project values (`code`, `title`, `host`, ...)
//! - `${name}` - user parameters declared under `params`
//!
//! Values are looked up in a stack of layers, most specific first (the root
//! fragment, then its imports in discovery order). A value found in a layer
//! may itself contain references; they are resolved with the referenced name
//! guarded so a value can never expand into itself.

use crate::error::{Error, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::LazyLock;

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]+(-[A-Za-z0-9]+)*$").expect("name pattern is a valid regex")
});

/// Namespace a reference is looked up in, selected by its sigil
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// `@{name}`
    Project,
    /// `${name}`
    Params,
}

impl Namespace {
    /// The sigil introducing references to this namespace
    pub fn sigil(self) -> char {
        match self {
            Self::Project => '@',
            Self::Params => '$',
        }
    }

    fn from_sigil(c: char) -> Option<Self> {
        match c {
            '@' => Some(Self::Project),
            '$' => Some(Self::Params),
            _ => None,
        }
    }
}

/// A named value in one namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub namespace: Namespace,
    pub name: String,
}

impl Reference {
    pub fn new(namespace: Namespace, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self::new(Namespace::Params, name)
    }

    pub fn project(name: impl Into<String>) -> Self {
        Self::new(Namespace::Project, name)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{{}}}", self.namespace.sigil(), self.name)
    }
}

/// Values contributed by one fragment
#[derive(Debug, Clone, Default)]
pub struct Layer {
    /// Locator of the fragment this layer comes from
    pub origin: String,
    pub project: Map<String, Value>,
    pub params: Map<String, Value>,
}

impl Layer {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }

    fn get(&self, namespace: Namespace, name: &str) -> Option<&Value> {
        match namespace {
            Namespace::Project => self.project.get(name),
            Namespace::Params => self.params.get(name),
        }
    }
}

/// Layered parameter store
#[derive(Debug, Clone, Default)]
pub struct ParamStore {
    layers: Vec<Layer>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer, less specific than every layer already pushed
    pub fn push_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Find the raw value of a name, most specific layer first
    pub fn lookup(&self, namespace: Namespace, name: &str) -> Option<&Value> {
        self.layers.iter().find_map(|l| l.get(namespace, name))
    }

    /// Every name visible in a namespace, with its winning raw value
    pub fn visible(&self, namespace: Namespace) -> Map<String, Value> {
        let mut out = Map::new();
        for layer in &self.layers {
            let values = match namespace {
                Namespace::Project => &layer.project,
                Namespace::Params => &layer.params,
            };
            for (k, v) in values {
                if !out.contains_key(k) {
                    out.insert(k.clone(), v.clone());
                }
            }
        }
        out
    }

    /// Resolve every reference in `raw`
    ///
    /// `forbidden` names the value being resolved, if any; referencing it is a
    /// `SelfReference` error.
    pub fn resolve(&self, raw: &str, forbidden: Option<&Reference>) -> Result<String> {
        let mut stack: Vec<Reference> = forbidden.into_iter().cloned().collect();
        self.resolve_guarded(raw, &mut stack)
    }

    /// Resolve the value stored under a name
    pub fn resolve_named(&self, reference: &Reference) -> Result<String> {
        let mut stack = Vec::new();
        self.expand(reference, &mut stack)
    }

    /// Resolve every string inside a JSON tree (object keys are left alone)
    pub fn resolve_value(&self, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::String(s) => Value::String(self.resolve(s, None)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.resolve_value(v))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve_value(v)?);
                }
                Value::Object(out)
            }
            other => other.clone(),
        })
    }

    fn resolve_guarded(&self, raw: &str, stack: &mut Vec<Reference>) -> Result<String> {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;

        while let Some(pos) = rest.find(|c| c == '@' || c == '$') {
            let (before, from_sigil) = rest.split_at(pos);
            out.push_str(before);

            let sigil = from_sigil.chars().next().unwrap_or_default();
            let after_sigil = &from_sigil[sigil.len_utf8()..];
            let (Some(namespace), Some(body)) =
                (Namespace::from_sigil(sigil), after_sigil.strip_prefix('{'))
            else {
                // A sigil not followed by `{` is plain text
                out.push(sigil);
                rest = after_sigil;
                continue;
            };

            let Some(end) = body.find('}') else {
                return Err(Error::MalformedReference {
                    text: raw.to_string(),
                    reason: format!("unclosed {sigil}{{"),
                });
            };
            let name = &body[..end];
            if !NAME_PATTERN.is_match(name) {
                return Err(Error::MalformedReference {
                    text: raw.to_string(),
                    reason: format!("invalid name {name:?}"),
                });
            }

            let reference = Reference::new(namespace, name);
            out.push_str(&self.expand(&reference, stack)?);
            rest = &body[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }

    fn expand(&self, reference: &Reference, stack: &mut Vec<Reference>) -> Result<String> {
        if stack.contains(reference) {
            return Err(Error::SelfReference {
                sigil: reference.namespace.sigil(),
                name: reference.name.clone(),
            });
        }

        let value = self
            .lookup(reference.namespace, &reference.name)
            .ok_or_else(|| Error::UnresolvedReference {
                sigil: reference.namespace.sigil(),
                name: reference.name.clone(),
            })?;

        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(Error::MalformedReference {
                    text: reference.to_string(),
                    reason: format!("value is not a scalar: {other}"),
                });
            }
        };

        stack.push(reference.clone());
        let resolved = self.resolve_guarded(&text, stack);
        stack.pop();
        log::trace!("{reference} -> {resolved:?}");
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> ParamStore {
        let mut root = Layer::new("dev.json");
        root.project.insert("code".into(), json!("shop"));
        root.params.insert("port".into(), json!(8010));
        root.params.insert("app-name".into(), json!("@{code}-app"));
        root.params.insert("loop".into(), json!("x${loop}"));
        root.params.insert("ping".into(), json!("${pong}"));
        root.params.insert("pong".into(), json!("${ping}"));

        let mut base = Layer::new("base.json");
        base.project.insert("code".into(), json!("base"));
        base.project.insert("title".into(), json!("Shop project"));
        base.params.insert("port".into(), json!(8000));
        base.params.insert("host".into(), json!("localhost"));

        let mut store = ParamStore::new();
        store.push_layer(root);
        store.push_layer(base);
        store
    }

    #[test]
    fn test_resolve_most_specific_layer_wins() {
        let s = store();
        assert_eq!(s.resolve("${port}", None).unwrap(), "8010");
        assert_eq!(s.resolve("@{code}", None).unwrap(), "shop");
        assert_eq!(s.resolve("${host}:@{title}", None).unwrap(), "localhost:Shop project");
    }

    #[test]
    fn test_resolve_recursive_value() {
        let s = store();
        assert_eq!(s.resolve("name=${app-name}", None).unwrap(), "name=shop-app");
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let s = store();
        let once = s.resolve("@{code}-content", None).unwrap();
        assert_eq!(s.resolve(&once, None).unwrap(), once);
        assert_eq!(s.resolve("user@example.com $5", None).unwrap(), "user@example.com $5");
    }

    #[test]
    fn test_resolve_unresolved() {
        let err = store().resolve("${nope}", None).unwrap_err();
        assert!(matches!(
            err,
            Error::UnresolvedReference { sigil: '$', ref name } if name == "nope"
        ));
    }

    #[test]
    fn test_resolve_self_reference() {
        let s = store();
        let err = s.resolve_named(&Reference::param("loop")).unwrap_err();
        assert!(matches!(err, Error::SelfReference { ref name, .. } if name == "loop"));

        let err = s
            .resolve("${port}", Some(&Reference::param("port")))
            .unwrap_err();
        assert!(matches!(err, Error::SelfReference { .. }));
    }

    #[test]
    fn test_resolve_longer_cycle_terminates() {
        let err = store().resolve("${ping}", None).unwrap_err();
        assert!(matches!(err, Error::SelfReference { .. }));
    }

    #[test]
    fn test_resolve_malformed() {
        let s = store();
        assert!(matches!(
            s.resolve("${port", None),
            Err(Error::MalformedReference { .. })
        ));
        assert!(matches!(
            s.resolve("${bad name}", None),
            Err(Error::MalformedReference { .. })
        ));
        assert!(matches!(
            s.resolve("${-x}", None),
            Err(Error::MalformedReference { .. })
        ));
    }

    #[test]
    fn test_resolve_value_tree() {
        let s = store();
        let raw = json!({
            "name": "@{code}-content",
            "port": "${port}",
            "forests": 2,
            "list": ["${host}"]
        });
        let resolved = s.resolve_value(&raw).unwrap();
        assert_eq!(
            resolved,
            json!({"name": "shop-content", "port": "8010", "forests": 2, "list": ["localhost"]})
        );
    }

    #[test]
    fn test_visible_namespace() {
        let visible = store().visible(Namespace::Project);
        assert_eq!(visible.get("code"), Some(&json!("shop")));
        assert_eq!(visible.get("title"), Some(&json!("Shop project")));
    }
}
