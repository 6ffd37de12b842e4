//! Entity trait for reconciling live state
//!
//! An entity is something on the remote system that can be fetched, created
//! and updated. Planning an entity walks a small state machine:
//!
//! ```text
//! Unchecked --fetch--> Creating --create--> Planned
//!                  \-> Diffing  --update--> Planned
//! ```
//!
//! Live state is fetched exactly once per entity.

use crate::diff::diff;
use crate::error::{Error, Result};
use crate::graph::Linked;
use crate::planner::RunContext;
use crate::remote::ATTACHED_FORESTS_KEY;
use crate::schema::catalog::FORESTS_KEY;
use crate::schema::{EntityKind, NormalizedSet, Schema};
use crate::types::{Action, Target, Verb};
use serde_json::{Map, Value, json};
use std::fmt;

/// Planning state of one entity
#[derive(Debug)]
pub enum EntityState {
    Unchecked,
    /// Not found on the remote system
    Creating,
    /// Found; carries the live properties
    Diffing(Map<String, Value>),
    Planned(Vec<Action>),
}

/// Core trait for reconciled entities
pub trait Entity: fmt::Debug {
    fn kind(&self) -> EntityKind;

    fn name(&self) -> &str;

    /// Address of the entity on the remote system
    fn target(&self) -> Target;

    /// Read live properties; `None` when the entity does not exist
    fn fetch(&self, ctx: &mut RunContext<'_>) -> Result<Option<Map<String, Value>>> {
        ctx.transport()
            .fetch(&self.target())
            .map_err(Error::transport)
    }

    /// Actions bringing a missing entity into existence
    fn create(&self, ctx: &mut RunContext<'_>) -> Result<Vec<Action>>;

    /// Actions bringing an existing entity in line with the configuration
    fn update(&self, ctx: &mut RunContext<'_>, live: &Map<String, Value>) -> Result<Vec<Action>>;

    /// Drive the entity from `Unchecked` to `Planned`
    fn plan(&self, ctx: &mut RunContext<'_>) -> Result<Vec<Action>> {
        let mut state = EntityState::Unchecked;
        loop {
            state = match state {
                EntityState::Unchecked => {
                    ctx.reporter().checking(self.kind(), self.name());
                    match self.fetch(ctx)? {
                        None => EntityState::Creating,
                        Some(live) => EntityState::Diffing(live),
                    }
                }
                EntityState::Creating => {
                    ctx.reporter().need(self.kind(), self.name(), "to be created");
                    EntityState::Planned(self.create(ctx)?)
                }
                EntityState::Diffing(live) => {
                    let actions = self.update(ctx, &live)?;
                    if !actions.is_empty() {
                        let what = format!("{} change(s)", actions.len());
                        ctx.reporter().need(self.kind(), self.name(), &what);
                    }
                    EntityState::Planned(actions)
                }
                EntityState::Planned(actions) => {
                    log::trace!(
                        "{} {} planned: {} action(s)",
                        self.kind(),
                        self.name(),
                        actions.len()
                    );
                    return Ok(actions);
                }
            };
        }
    }
}

/// A forest belonging to one database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forest {
    pub name: String,
    pub database: String,
}

impl Forest {
    pub fn new(name: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: database.into(),
        }
    }

    /// Name of the `index`th (1-based) generated forest of a database
    pub fn generated_name(database: &str, index: usize) -> String {
        format!("{database}-{index:03}")
    }

    fn target(&self) -> Target {
        Target::forest(&self.name, &self.database)
    }

    /// Attach when the forest already exists, create it otherwise
    pub fn provision(&self, ctx: &mut RunContext<'_>) -> Result<Action> {
        if ctx.forest_exists(&self.name)? {
            Ok(Action::new(
                Verb::AttachForest,
                self.target(),
                json!({"state": "attach", "database": self.database}),
            ))
        } else {
            Ok(Action::new(
                Verb::CreateForest,
                self.target(),
                json!({"forest-name": self.name, "database": self.database}),
            ))
        }
    }

    pub fn detach(&self) -> Action {
        Action::new(
            Verb::DetachForest,
            self.target(),
            json!({"state": "detach", "database": self.database}),
        )
    }
}

/// Desired forest names from a `forests` declaration
///
/// A count generates `{db}-001`, `{db}-002`, ...; a list names them
/// explicitly. Absent means one generated forest.
fn desired_forests(database: &str, raw: Option<&Value>) -> Result<Vec<String>> {
    let invalid = || Error::InvalidPropertyShape {
        entity: format!("database {database}"),
        path: FORESTS_KEY.to_string(),
        expected: "a forest count or a list of forest names",
    };
    let count = |n: u64| -> Result<Vec<String>> {
        let n = usize::try_from(n).map_err(|_| invalid())?;
        Ok((1..=n).map(|i| Forest::generated_name(database, i)).collect())
    };

    match raw {
        None => count(1),
        Some(Value::Number(n)) => count(n.as_u64().ok_or_else(invalid)?),
        Some(Value::String(s)) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            count(s.parse().map_err(|_| invalid())?)
        }
        Some(Value::Array(items)) => items
            .iter()
            .map(|f| f.as_str().map(str::to_string).ok_or_else(invalid))
            .collect(),
        Some(_) => Err(invalid()),
    }
}

/// Forest names attached to a live database
fn attached_forests(live: &Map<String, Value>) -> Vec<String> {
    match live.get(ATTACHED_FORESTS_KEY) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// A database with its validated properties and forests
#[derive(Debug, Clone)]
pub struct Database {
    pub id: Option<String>,
    pub name: String,
    pub properties: NormalizedSet,
    pub forests: Vec<Forest>,
    /// Link field and target database name
    pub links: Vec<(&'static str, String)>,
}

impl Database {
    /// Validate a linked declaration against the database schema
    pub fn from_linked(linked: &Linked, schema: &Schema) -> Result<Self> {
        let mut raw = linked.properties.clone();
        let forests = desired_forests(&linked.name, raw.remove(FORESTS_KEY).as_ref())?
            .into_iter()
            .map(|f| Forest::new(f, &linked.name))
            .collect();
        let properties = schema.parse(&linked.name, &raw)?;
        Ok(Self {
            id: linked.id.clone(),
            name: linked.name.clone(),
            properties,
            forests,
            links: linked.links.clone(),
        })
    }
}

impl Entity for Database {
    fn kind(&self) -> EntityKind {
        EntityKind::Database
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> Target {
        Target::database(&self.name)
    }

    fn create(&self, ctx: &mut RunContext<'_>) -> Result<Vec<Action>> {
        let mut actions = vec![Action::new(
            Verb::CreateDatabase,
            self.target(),
            Value::Object(self.properties.to_payload()),
        )];
        for forest in &self.forests {
            actions.push(forest.provision(ctx)?);
        }
        Ok(actions)
    }

    fn update(&self, ctx: &mut RunContext<'_>, live: &Map<String, Value>) -> Result<Vec<Action>> {
        let attached = attached_forests(live);
        let mut actions = Vec::new();

        for forest in self.forests.iter().filter(|f| !attached.contains(&f.name)) {
            actions.push(forest.provision(ctx)?);
        }
        for name in attached
            .iter()
            .filter(|a| !self.forests.iter().any(|f| &f.name == *a))
        {
            actions.push(Forest::new(name.as_str(), &self.name).detach());
        }
        for change in diff(&self.properties, live)? {
            actions.push(Action::new(
                Verb::UpdateDatabaseProperty,
                self.target(),
                change.payload(),
            ));
        }
        Ok(actions)
    }
}

/// Server properties that cannot change on a live server
pub const IMMUTABLE_SERVER_PROPERTIES: &[&str] = &["server-type", "port"];

/// An application server with its validated properties
#[derive(Debug, Clone)]
pub struct Server {
    pub name: String,
    pub group: String,
    pub properties: NormalizedSet,
    pub links: Vec<(&'static str, String)>,
}

impl Server {
    pub fn from_linked(linked: &Linked, schema: &Schema) -> Result<Self> {
        let properties = schema.parse(&linked.name, &linked.properties)?;
        let group = properties
            .get_str("group-name")
            .unwrap_or("Default")
            .to_string();
        Ok(Self {
            name: linked.name.clone(),
            group,
            properties,
            links: linked.links.clone(),
        })
    }
}

impl Entity for Server {
    fn kind(&self) -> EntityKind {
        EntityKind::Server
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn target(&self) -> Target {
        Target::server(&self.name, &self.group)
    }

    fn create(&self, _ctx: &mut RunContext<'_>) -> Result<Vec<Action>> {
        Ok(vec![Action::new(
            Verb::CreateServer,
            self.target(),
            Value::Object(self.properties.to_payload()),
        )])
    }

    fn update(&self, _ctx: &mut RunContext<'_>, live: &Map<String, Value>) -> Result<Vec<Action>> {
        for property in IMMUTABLE_SERVER_PROPERTIES {
            if let Some(desired) = self.properties.get(property)
                && !desired.value.matches(live.get(*property))
            {
                let current = live
                    .get(*property)
                    .map_or_else(|| "nothing".to_string(), Value::to_string);
                return Err(Error::IncompatibleChange {
                    entity: self.name.clone(),
                    property: (*property).to_string(),
                    reason: format!(
                        "{property} cannot change on a live server (live {current}, desired {})",
                        desired.value
                    ),
                });
            }
        }

        Ok(diff(&self.properties, live)?
            .into_iter()
            .map(|change| Action::new(Verb::UpdateServerProperty, self.target(), change.payload()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_forest_names() {
        assert_eq!(Forest::generated_name("content", 1), "content-001");
        assert_eq!(Forest::generated_name("content", 12), "content-012");
    }

    #[test]
    fn test_desired_forests() {
        assert_eq!(desired_forests("db", None).unwrap(), vec!["db-001"]);
        assert_eq!(
            desired_forests("db", Some(&json!(2))).unwrap(),
            vec!["db-001", "db-002"]
        );
        assert_eq!(
            desired_forests("db", Some(&json!("3"))).unwrap().len(),
            3
        );
        assert!(desired_forests("db", Some(&json!(0))).unwrap().is_empty());
        assert_eq!(
            desired_forests("db", Some(&json!(["a", "b"]))).unwrap(),
            vec!["a", "b"]
        );
        assert!(desired_forests("db", Some(&json!(-1))).is_err());
        assert!(desired_forests("db", Some(&json!({"n": 1}))).is_err());
    }

    #[test]
    fn test_attached_forests() {
        let live = json!({"forest": ["a", "b"]});
        assert_eq!(attached_forests(live.as_object().unwrap()), vec!["a", "b"]);
        let live = json!({"forest": "a"});
        assert_eq!(attached_forests(live.as_object().unwrap()), vec!["a"]);
        let live = json!({});
        assert!(attached_forests(live.as_object().unwrap()).is_empty());
    }
}
