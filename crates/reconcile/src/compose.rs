//! Fragment composition
//!
//! Fragments arrive in precedence order (nearest to the root first). Each
//! database or server is matched against the entities already collected by id
//! or by name, compared after parameter resolution:
//!
//! - no match: the entity is appended
//! - `merge`: properties missing on the earlier entity are copied into it
//! - `hide`: the newly encountered entity is dropped
//!
//! The nearer entity's mode decides (`merge` when it declares none). A farther
//! entity that declares a different mode is a configuration error; one that
//! declares nothing follows the nearer entity.

use crate::error::{Error, Result};
use crate::params::ParamStore;
use crate::project::Fragment;
use serde_json::{Map, Value};
use std::fmt;

/// Property holding an entity's composition mode
pub const MODE_KEY: &str = "compose";

/// How colliding entities combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComposeMode {
    #[default]
    Merge,
    Hide,
}

impl ComposeMode {
    pub const VALUES: &'static [&'static str] = &["merge", "hide"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "merge" => Some(Self::Merge),
            "hide" => Some(Self::Hide),
            _ => None,
        }
    }

    /// The mode an entity declares, if it declares one
    fn declared(entity: &Map<String, Value>, label: &str) -> Result<Option<Self>> {
        match entity.get(MODE_KEY) {
            None => Ok(None),
            Some(Value::String(s)) => Self::parse(s).map(Some).ok_or_else(|| {
                Error::composition(format!(
                    "{label}: unknown compose mode {s:?}, expected merge or hide"
                ))
            }),
            Some(other) => Err(Error::composition(format!(
                "{label}: compose mode must be a string, got {other}"
            ))),
        }
    }
}

impl fmt::Display for ComposeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Hide => write!(f, "hide"),
        }
    }
}

/// Kind of entity being composed, for messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Database,
    Server,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database => write!(f, "database"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// Unified declarations from every fragment
#[derive(Debug, Clone, Default)]
pub struct Composition {
    pub databases: Vec<Map<String, Value>>,
    pub servers: Vec<Map<String, Value>>,
    /// API endpoint settings, by API name
    pub apis: Map<String, Value>,
}

impl Composition {
    /// Resolve every parameter reference in the composed declarations
    pub fn resolve(self, params: &ParamStore) -> Result<Self> {
        Ok(Self {
            databases: self
                .databases
                .into_iter()
                .map(|e| resolve_map(params, e))
                .collect::<Result<_>>()?,
            servers: self
                .servers
                .into_iter()
                .map(|e| resolve_map(params, e))
                .collect::<Result<_>>()?,
            apis: resolve_map(params, self.apis)?,
        })
    }
}

fn resolve_map(params: &ParamStore, map: Map<String, Value>) -> Result<Map<String, Value>> {
    map.into_iter()
        .map(|(k, v)| Ok((k, params.resolve_value(&v)?)))
        .collect()
}

/// Resolved `id` and `name` of an entity
#[derive(Debug, Clone, PartialEq)]
struct Identity {
    id: Option<Value>,
    name: Option<Value>,
}

impl Identity {
    fn of(entity: &Map<String, Value>, params: &ParamStore) -> Result<Self> {
        let resolved = |key: &str| entity.get(key).map(|v| params.resolve_value(v)).transpose();
        Ok(Self {
            id: resolved("id")?,
            name: resolved("name")?,
        })
    }

    fn collides(&self, other: &Self) -> bool {
        let same = |a: &Option<Value>, b: &Option<Value>| {
            matches!((a, b), (Some(x), Some(y)) if x == y)
        };
        same(&self.id, &other.id) || same(&self.name, &other.name)
    }
}

/// Collected entities of one kind, with where each came from
struct Collector<'p> {
    kind: Kind,
    params: &'p ParamStore,
    entities: Vec<Map<String, Value>>,
    identities: Vec<Identity>,
    modes: Vec<Option<ComposeMode>>,
    origins: Vec<String>,
}

impl<'p> Collector<'p> {
    fn new(kind: Kind, params: &'p ParamStore) -> Self {
        Self {
            kind,
            params,
            entities: Vec::new(),
            identities: Vec::new(),
            modes: Vec::new(),
            origins: Vec::new(),
        }
    }

    fn add(&mut self, entity: &Map<String, Value>, origin: &str) -> Result<()> {
        let label = format!("{} {} in {origin}", self.kind, identity(entity));
        let mode = ComposeMode::declared(entity, &label)?;
        let key = Identity::of(entity, self.params)?;

        let Some(index) = self.identities.iter().position(|k| k.collides(&key)) else {
            self.entities.push(entity.clone());
            self.identities.push(key);
            self.modes.push(mode);
            self.origins.push(origin.to_string());
            return Ok(());
        };

        if self.origins[index] == origin {
            return Err(Error::composition(format!(
                "{label}: declared twice in the same fragment"
            )));
        }

        let nearer = self.modes[index].unwrap_or_default();
        if let Some(mode) = mode
            && mode != nearer
        {
            return Err(Error::composition(format!(
                "{label}: compose mode {mode} conflicts with {nearer} in {}",
                self.origins[index]
            )));
        }

        match nearer {
            ComposeMode::Merge => {
                let target = &mut self.entities[index];
                for (key, value) in entity {
                    if !target.contains_key(key) {
                        target.insert(key.clone(), value.clone());
                    }
                }
                log::debug!("Merged {label} into {}", self.origins[index]);
            }
            ComposeMode::Hide => {
                log::debug!("Hid {label} behind {}", self.origins[index]);
            }
        }
        Ok(())
    }
}

/// Compose fragments given in precedence order
///
/// `params` is only used to resolve `id` and `name` for matching; the
/// composed declarations keep their references.
pub fn compose(fragments: &[Fragment], params: &ParamStore) -> Result<Composition> {
    let mut databases = Collector::new(Kind::Database, params);
    let mut servers = Collector::new(Kind::Server, params);
    let mut apis = Map::new();

    for fragment in fragments {
        for db in &fragment.databases {
            databases.add(db, &fragment.locator)?;
        }
        for srv in &fragment.servers {
            servers.add(srv, &fragment.locator)?;
        }
        for (name, settings) in &fragment.apis {
            merge_api(&mut apis, name, settings, &fragment.locator)?;
        }
    }

    Ok(Composition {
        databases: databases.entities,
        servers: servers.entities,
        apis,
    })
}

fn merge_api(
    apis: &mut Map<String, Value>,
    name: &str,
    settings: &Value,
    origin: &str,
) -> Result<()> {
    let Value::Object(settings) = settings else {
        return Err(Error::composition(format!(
            "api {name} in {origin} must be an object"
        )));
    };
    let entry = apis
        .entry(name.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(target) = entry {
        for (key, value) in settings {
            if !target.contains_key(key) {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

/// Short label for messages: id, then name
pub(crate) fn identity(entity: &Map<String, Value>) -> String {
    for key in ["id", "name"] {
        if let Some(Value::String(s)) = entity.get(key) {
            return s.clone();
        }
    }
    "<anonymous>".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compose_all(fragments: &[Fragment]) -> Result<Composition> {
        let mut params = ParamStore::new();
        for fragment in fragments {
            params.push_layer(fragment.layer());
        }
        compose(fragments, &params)
    }

    fn fragment(locator: &str, body: Value) -> Fragment {
        let mut body = body;
        body["format"] = json!("0.1");
        Fragment::from_document(locator, json!({ "dbtopo": body })).unwrap()
    }

    #[test]
    fn test_merge_precedence() {
        let root = fragment(
            "R",
            json!({"databases": [{"name": "content", "forests": 3, "compose": "merge"}]}),
        );
        let imported = fragment(
            "F",
            json!({"databases": [{
                "name": "content",
                "forests": 1,
                "lexicons": {"uri": true},
                "compose": "merge"
            }]}),
        );

        let c = compose_all(&[root, imported]).unwrap();
        assert_eq!(c.databases.len(), 1);
        let db = &c.databases[0];
        assert_eq!(db["forests"], json!(3));
        assert_eq!(db["lexicons"], json!({"uri": true}));
    }

    #[test]
    fn test_hide_precedence() {
        let root = fragment(
            "R",
            json!({"databases": [{"name": "content", "compose": "hide", "forests": 2}]}),
        );
        let imported = fragment(
            "F",
            json!({"databases": [
                {"name": "content", "lexicons": {"uri": true}},
                {"name": "other"}
            ]}),
        );

        let c = compose_all(&[root, imported]).unwrap();
        assert_eq!(c.databases.len(), 2);
        assert!(c.databases[0].get("lexicons").is_none());
        assert_eq!(c.databases[1]["name"], json!("other"));
    }

    #[test]
    fn test_hide_without_base_keeps_entity() {
        let root = fragment("R", json!({"databases": [{"name": "solo", "compose": "hide"}]}));
        let c = compose_all(&[root]).unwrap();
        assert_eq!(c.databases.len(), 1);
    }

    #[test]
    fn test_collision_by_id() {
        let root = fragment("R", json!({"databases": [{"id": "content", "name": "shop-content"}]}));
        let imported = fragment(
            "F",
            json!({"databases": [{"id": "content", "name": "x", "forests": 4}]}),
        );

        let c = compose_all(&[root, imported]).unwrap();
        assert_eq!(c.databases.len(), 1);
        assert_eq!(c.databases[0]["name"], json!("shop-content"));
        assert_eq!(c.databases[0]["forests"], json!(4));
    }

    #[test]
    fn test_collision_by_resolved_name() {
        let root = fragment(
            "R",
            json!({"code": "shop", "databases": [{"name": "@{code}-content", "forests": 3}]}),
        );
        let imported = fragment(
            "F",
            json!({"databases": [
                {"name": "shop-content", "forests": 1, "lexicons": {"uri": true}}
            ]}),
        );

        let c = compose_all(&[root, imported]).unwrap();
        assert_eq!(c.databases.len(), 1);
        assert_eq!(c.databases[0]["name"], json!("@{code}-content"));
        assert_eq!(c.databases[0]["forests"], json!(3));
        assert_eq!(c.databases[0]["lexicons"], json!({"uri": true}));
    }

    #[test]
    fn test_mode_mismatch() {
        let root = fragment("R", json!({"servers": [{"name": "app", "compose": "hide"}]}));
        let imported = fragment("F", json!({"servers": [{"name": "app", "compose": "merge"}]}));

        let err = compose_all(&[root, imported]).unwrap_err();
        assert!(matches!(err, Error::Composition(ref m) if m.contains("conflicts")));
    }

    #[test]
    fn test_unknown_mode() {
        let root = fragment("R", json!({"databases": [{"name": "x", "compose": "replace"}]}));
        let err = compose_all(&[root]).unwrap_err();
        assert!(matches!(err, Error::Composition(ref m) if m.contains("unknown compose mode")));
    }

    #[test]
    fn test_duplicate_in_same_fragment() {
        let root = fragment("R", json!({"databases": [{"name": "x"}, {"name": "x"}]}));
        assert!(compose_all(&[root]).is_err());
    }

    #[test]
    fn test_api_precedence() {
        let root = fragment("R", json!({"apis": {"manage": {"port": 18002}}}));
        let imported = fragment("F", json!({"apis": {"manage": {"port": 8002, "ssl": true}}}));

        let c = compose_all(&[root, imported]).unwrap();
        assert_eq!(c.apis["manage"], json!({"port": 18002, "ssl": true}));
    }

    #[test]
    fn test_resolve_after_compose() {
        let root = fragment(
            "R",
            json!({"code": "shop", "params": {"port": 8010},
                   "servers": [{"name": "@{code}-app", "port": "${port}"}]}),
        );
        let mut params = ParamStore::new();
        params.push_layer(root.layer());

        let c = compose(&[root], &params).unwrap().resolve(&params).unwrap();
        assert_eq!(c.servers[0]["name"], json!("shop-app"));
        assert_eq!(c.servers[0]["port"], json!("8010"));
    }
}
