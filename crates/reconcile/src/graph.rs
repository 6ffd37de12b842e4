//! Dependency linearization
//!
//! Databases point at other databases through their `schema`, `security` and
//! `triggers` links; servers point at databases through `content` and
//! `modules`. A link is one of:
//!
//! - absent
//! - a reference object (`id`, `name`, `ref`, `nameref` or `system`)
//! - an inline database definition, hoisted into the database list just
//!   before the declaration that contains it
//!
//! Databases are instantiated in passes. Each pass takes, in declaration
//! order, every database whose links are all absent, self, system or
//! pointing at an already-instantiated database. Passes repeat until one
//! finds nothing. Whatever is left, plus every server with a link that does
//! not land on an instantiated database, is reported in one error.

use crate::compose::identity;
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Well-known databases that exist on every system
pub const SYSTEM_DATABASES: &[&str] = &[
    "App-Services",
    "Documents",
    "Extensions",
    "Fab",
    "Last-Login",
    "Meters",
    "Modules",
    "Schemas",
    "Security",
    "Triggers",
];

/// Link fields of a database declaration
pub const DATABASE_LINKS: &[&str] = &["schema", "security", "triggers"];

/// Link fields of a server declaration
pub const SERVER_LINKS: &[&str] = &["content", "modules"];

const REF_KEYS: &[&str] = &["id", "name", "ref", "nameref", "system"];

/// A reference to a database
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    /// Literal id
    Id(String),
    /// Literal name
    Name(String),
    /// Id first, then name
    Ref(String),
    /// Name reference
    NameRef(String),
    /// One of [`SYSTEM_DATABASES`]
    System(String),
}

impl EntityRef {
    /// Parse a link object; `None` means the object is an inline definition
    fn parse(obj: &Map<String, Value>, entity: &str, field: &str) -> Result<Option<Self>> {
        let invalid = |reason: String| Error::InvalidEntityRef {
            entity: entity.to_string(),
            field: field.to_string(),
            reason,
        };

        if obj.keys().any(|k| !REF_KEYS.contains(&k.as_str())) {
            return Ok(None);
        }
        let mut entries = obj.iter();
        let (key, value) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            (None, _) => return Err(invalid("empty reference".to_string())),
            (Some(_), Some(_)) => {
                return Err(invalid(format!(
                    "a reference has exactly one of {}, got {}",
                    REF_KEYS.join(", "),
                    obj.keys().cloned().collect::<Vec<_>>().join(", ")
                )));
            }
        };
        let Value::String(target) = value else {
            return Err(invalid(format!("{key} must be a string, got {value}")));
        };
        let target = target.clone();

        let reference = match key.as_str() {
            "id" => Self::Id(target),
            "name" => Self::Name(target),
            "ref" => Self::Ref(target),
            "nameref" => Self::NameRef(target),
            _ => {
                if !SYSTEM_DATABASES.contains(&target.as_str()) {
                    return Err(invalid(format!(
                        "unknown system database {target:?}, expected one of: {}",
                        SYSTEM_DATABASES.join(", ")
                    )));
                }
                Self::System(target)
            }
        };
        Ok(Some(reference))
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(s) => write!(f, "id {s}"),
            Self::Name(s) => write!(f, "name {s}"),
            Self::Ref(s) => write!(f, "ref {s}"),
            Self::NameRef(s) => write!(f, "nameref {s}"),
            Self::System(s) => write!(f, "system {s}"),
        }
    }
}

/// A database declaration with its links parsed
#[derive(Debug, Clone)]
struct DatabaseDecl {
    id: Option<String>,
    name: String,
    links: Vec<(&'static str, EntityRef)>,
    raw: Map<String, Value>,
}

impl DatabaseDecl {
    fn label(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    fn is_self(&self, reference: &EntityRef) -> bool {
        match reference {
            EntityRef::Id(s) => self.id.as_deref() == Some(s),
            EntityRef::Name(s) | EntityRef::NameRef(s) => self.name == *s,
            EntityRef::Ref(s) => self.id.as_deref() == Some(s) || self.name == *s,
            EntityRef::System(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
struct ServerDecl {
    name: String,
    links: Vec<(&'static str, EntityRef)>,
    raw: Map<String, Value>,
}

/// An entity whose links all point at named databases
#[derive(Debug, Clone)]
pub struct Linked {
    pub id: Option<String>,
    pub name: String,
    /// The declaration with every link replaced by its target's name
    pub properties: Map<String, Value>,
    /// Link field and target database name
    pub links: Vec<(&'static str, String)>,
}

impl Linked {
    pub fn link(&self, field: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, target)| target.as_str())
    }
}

/// Databases in instantiation order, servers in declaration order
#[derive(Debug, Clone, Default)]
pub struct Linearization {
    pub databases: Vec<Linked>,
    pub servers: Vec<Linked>,
    /// Number of passes that instantiated at least one database
    pub passes: usize,
}

fn string_field(raw: &Map<String, Value>, key: &str, entity: &str) -> Result<Option<String>> {
    match raw.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(Error::InvalidPropertyShape {
            entity: entity.to_string(),
            path: key.to_string(),
            expected: "a string",
        }),
    }
}

/// Parse one link; inline definitions are parsed and pushed to `hoisted`
fn parse_link(
    raw: &Value,
    entity: &str,
    field: &str,
    hoisted: &mut Vec<DatabaseDecl>,
) -> Result<EntityRef> {
    let Value::Object(obj) = raw else {
        return Err(Error::InvalidEntityRef {
            entity: entity.to_string(),
            field: field.to_string(),
            reason: format!("expected a reference or a database definition, got {raw}"),
        });
    };
    if let Some(reference) = EntityRef::parse(obj, entity, field)? {
        return Ok(reference);
    }

    let inline = parse_database(obj, hoisted)?;
    let reference = match &inline.id {
        Some(id) => EntityRef::Id(id.clone()),
        None => EntityRef::Name(inline.name.clone()),
    };
    // The same definition given inline in several places is one database
    if hoisted
        .iter()
        .any(|d| d.id == inline.id && d.name == inline.name && d.raw == inline.raw)
    {
        log::trace!("Reused inline database {} in {entity}.{field}", inline.label());
        return Ok(reference);
    }
    log::trace!("Hoisted inline database {} out of {entity}.{field}", inline.label());
    hoisted.push(inline);
    Ok(reference)
}

/// Parse a database declaration, pushing its inline definitions to `out` first
fn parse_database(raw: &Map<String, Value>, out: &mut Vec<DatabaseDecl>) -> Result<DatabaseDecl> {
    let label = format!("database {}", identity(raw));
    let id = string_field(raw, "id", &label)?;
    let name = match (string_field(raw, "name", &label)?, &id) {
        (Some(name), _) => name,
        (None, Some(id)) => id.clone(),
        (None, None) => {
            return Err(Error::MissingMandatoryProperty {
                entity: label,
                path: "name".to_string(),
            });
        }
    };

    let mut links = Vec::new();
    for field in DATABASE_LINKS {
        if let Some(value) = raw.get(*field) {
            links.push((*field, parse_link(value, &label, field, out)?));
        }
    }
    Ok(DatabaseDecl {
        id,
        name,
        links,
        raw: raw.clone(),
    })
}

fn parse_server(raw: &Map<String, Value>, hoisted: &mut Vec<DatabaseDecl>) -> Result<ServerDecl> {
    let label = format!("server {}", identity(raw));
    let Some(name) = string_field(raw, "name", &label)? else {
        return Err(Error::MissingMandatoryProperty {
            entity: label,
            path: "name".to_string(),
        });
    };
    if !raw.contains_key("content") {
        return Err(Error::MissingMandatoryProperty {
            entity: label,
            path: "content".to_string(),
        });
    }

    let mut links = Vec::new();
    for field in SERVER_LINKS {
        if let Some(value) = raw.get(*field) {
            links.push((*field, parse_link(value, &label, field, hoisted)?));
        }
    }
    Ok(ServerDecl {
        name,
        links,
        raw: raw.clone(),
    })
}

fn check_unique(decls: &[DatabaseDecl]) -> Result<()> {
    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for decl in decls {
        if let Some(id) = &decl.id
            && !ids.insert(id.as_str())
        {
            return Err(Error::composition(format!("database id {id} is declared twice")));
        }
        if !names.insert(decl.name.as_str()) {
            return Err(Error::composition(format!(
                "database name {} is declared twice",
                decl.name
            )));
        }
    }
    Ok(())
}

/// Index of the declaration a reference points at
fn find(decls: &[DatabaseDecl], reference: &EntityRef) -> Option<usize> {
    let by_id = |s: &str| decls.iter().position(|d| d.id.as_deref() == Some(s));
    let by_name = |s: &str| decls.iter().position(|d| d.name == s);
    match reference {
        EntityRef::Id(s) => by_id(s),
        EntityRef::Name(s) | EntityRef::NameRef(s) => by_name(s),
        EntityRef::Ref(s) => by_id(s).or_else(|| by_name(s)),
        EntityRef::System(_) => None,
    }
}

/// Target name of a link, if it is satisfied by the instantiated set
fn target(
    decls: &[DatabaseDecl],
    done: &[bool],
    owner: Option<&DatabaseDecl>,
    reference: &EntityRef,
) -> Option<String> {
    if let EntityRef::System(name) = reference {
        return Some(name.clone());
    }
    if let Some(owner) = owner
        && owner.is_self(reference)
    {
        return Some(owner.name.clone());
    }
    find(decls, reference)
        .filter(|i| done[*i])
        .map(|i| decls[i].name.clone())
}

fn link_all(
    decls: &[DatabaseDecl],
    done: &[bool],
    owner: Option<&DatabaseDecl>,
    links: &[(&'static str, EntityRef)],
) -> Option<Vec<(&'static str, String)>> {
    links
        .iter()
        .map(|(field, reference)| target(decls, done, owner, reference).map(|t| (*field, t)))
        .collect()
}

fn with_links(raw: &Map<String, Value>, links: &[(&'static str, String)]) -> Map<String, Value> {
    let mut properties = raw.clone();
    for (field, target) in links {
        properties.insert((*field).to_string(), Value::String(target.clone()));
    }
    properties
}

/// Compute the instantiation order of composed declarations
pub fn linearize(
    databases: &[Map<String, Value>],
    servers: &[Map<String, Value>],
) -> Result<Linearization> {
    let mut decls = Vec::new();
    for raw in databases {
        let decl = parse_database(raw, &mut decls)?;
        decls.push(decl);
    }
    let mut server_decls = Vec::new();
    for raw in servers {
        let decl = parse_server(raw, &mut decls)?;
        server_decls.push(decl);
    }
    check_unique(&decls)?;

    let mut done = vec![false; decls.len()];
    let mut out = Linearization::default();
    let mut pass = 0;
    loop {
        pass += 1;
        let candidates: Vec<(usize, Vec<(&'static str, String)>)> = decls
            .iter()
            .enumerate()
            .filter(|(i, _)| !done[*i])
            .filter_map(|(i, d)| link_all(&decls, &done, Some(d), &d.links).map(|links| (i, links)))
            .collect();
        if candidates.is_empty() {
            out.passes = pass - 1;
            break;
        }

        log::debug!(
            "Linearization pass {pass}: {}",
            candidates
                .iter()
                .map(|(i, _)| decls[*i].label())
                .collect::<Vec<_>>()
                .join(", ")
        );
        for (i, links) in candidates {
            done[i] = true;
            let decl = &decls[i];
            out.databases.push(Linked {
                id: decl.id.clone(),
                name: decl.name.clone(),
                properties: with_links(&decl.raw, &links),
                links,
            });
        }
    }

    let stuck_databases: Vec<String> = decls
        .iter()
        .zip(&done)
        .filter(|(_, done)| !**done)
        .map(|(d, _)| d.label().to_string())
        .collect();

    let mut stuck_servers = Vec::new();
    for server in server_decls {
        match link_all(&decls, &done, None, &server.links) {
            Some(links) => out.servers.push(Linked {
                id: string_field(&server.raw, "id", &server.name)?,
                properties: with_links(&server.raw, &links),
                name: server.name,
                links,
            }),
            None => stuck_servers.push(server.name),
        }
    }

    if !stuck_databases.is_empty() || !stuck_servers.is_empty() {
        return Err(Error::UnresolvedDependency {
            databases: stuck_databases,
            servers: stuck_servers,
        });
    }
    Ok(out)
}
