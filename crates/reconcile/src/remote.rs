//! Management transport
//!
//! The planner reads live state and the executor applies actions through a
//! [`Transport`]. [`MemoryTransport`] keeps a whole management API in memory
//! and applies actions to it, which is enough to plan, apply and re-plan
//! without a remote system.

use crate::types::{Action, Target, Verb};
use anyhow::{Result, anyhow, bail};
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// Live property holding the forests attached to a database
pub const ATTACHED_FORESTS_KEY: &str = "forest";

/// Access to the remote management API
pub trait Transport {
    /// Fetch live properties of an entity; `None` when it does not exist
    fn fetch(&self, target: &Target) -> Result<Option<Map<String, Value>>>;

    /// Names of every forest known to the remote system
    fn fetch_forest_catalog(&self) -> Result<Vec<String>>;

    /// Perform one action
    fn apply(&self, action: &Action) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    databases: BTreeMap<String, Map<String, Value>>,
    servers: BTreeMap<(String, String), Map<String, Value>>,
    /// Forest name to the database it is attached to
    forests: BTreeMap<String, Option<String>>,
    applied: Vec<Action>,
}

impl MemoryState {
    fn database_mut(&mut self, name: &str) -> Result<&mut Map<String, Value>> {
        self.databases
            .get_mut(name)
            .ok_or_else(|| anyhow!("database {name} does not exist"))
    }

    fn attached_mut(&mut self, database: &str) -> Result<&mut Vec<Value>> {
        let db = self.database_mut(database)?;
        let entry = db
            .entry(ATTACHED_FORESTS_KEY)
            .or_insert_with(|| Value::Array(Vec::new()));
        entry
            .as_array_mut()
            .ok_or_else(|| anyhow!("database {database} has a malformed forest list"))
    }

    fn attach(&mut self, forest: &str, database: &str) -> Result<()> {
        self.attached_mut(database)?.push(Value::String(forest.to_string()));
        self.forests
            .insert(forest.to_string(), Some(database.to_string()));
        Ok(())
    }

    fn apply(&mut self, action: &Action) -> Result<()> {
        let payload = || {
            action
                .payload
                .as_object()
                .cloned()
                .ok_or_else(|| anyhow!("payload of {action} is not an object"))
        };

        match (&action.verb, &action.target) {
            (Verb::CreateDatabase, Target::Database { name }) => {
                if self.databases.contains_key(name) {
                    bail!("database {name} already exists");
                }
                let mut props = payload()?;
                props.insert(ATTACHED_FORESTS_KEY.to_string(), Value::Array(Vec::new()));
                self.databases.insert(name.clone(), props);
            }
            (Verb::CreateForest, Target::Forest { name, database }) => {
                if self.forests.contains_key(name) {
                    bail!("forest {name} already exists");
                }
                self.attach(name, database)?;
            }
            (Verb::AttachForest, Target::Forest { name, database }) => {
                match self.forests.get(name) {
                    None => bail!("forest {name} does not exist"),
                    Some(Some(other)) => bail!("forest {name} is attached to {other}"),
                    Some(None) => self.attach(name, database)?,
                }
            }
            (Verb::DetachForest, Target::Forest { name, database }) => {
                if self.forests.get(name) != Some(&Some(database.clone())) {
                    bail!("forest {name} is not attached to {database}");
                }
                self.attached_mut(database)?
                    .retain(|f| f.as_str() != Some(name.as_str()));
                self.forests.insert(name.clone(), None);
            }
            (Verb::CreateServer, Target::Server { name, group }) => {
                let key = (name.clone(), group.clone());
                if self.servers.contains_key(&key) {
                    bail!("server {name} already exists in group {group}");
                }
                self.servers.insert(key, payload()?);
            }
            (Verb::UpdateDatabaseProperty, Target::Database { name }) => {
                let update = payload()?;
                self.database_mut(name)?.extend(update);
            }
            (Verb::UpdateServerProperty, Target::Server { name, group }) => {
                let update = payload()?;
                self.servers
                    .get_mut(&(name.clone(), group.clone()))
                    .ok_or_else(|| anyhow!("server {name} does not exist in group {group}"))?
                    .extend(update);
            }
            (verb, target) => bail!("{verb} cannot target {target}"),
        }
        Ok(())
    }
}

/// In-memory management API
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: RefCell<MemoryState>,
    failures: RefCell<Vec<(Verb, String, String)>>,
    fetches: Cell<usize>,
    catalog_fetches: Cell<usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live database with the given properties
    pub fn with_database(self, name: &str, properties: Value) -> Self {
        let mut props = properties.as_object().cloned().unwrap_or_default();
        props
            .entry(ATTACHED_FORESTS_KEY)
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Some(forests) = props.get(ATTACHED_FORESTS_KEY).and_then(Value::as_array) {
            let mut state = self.state.borrow_mut();
            for forest in forests.iter().filter_map(Value::as_str) {
                state
                    .forests
                    .insert(forest.to_string(), Some(name.to_string()));
            }
        }
        self.state
            .borrow_mut()
            .databases
            .insert(name.to_string(), props);
        self
    }

    /// Add a live forest attached to no database
    pub fn with_forest(self, name: &str) -> Self {
        self.state
            .borrow_mut()
            .forests
            .insert(name.to_string(), None);
        self
    }

    /// Add a live server
    pub fn with_server(self, name: &str, group: &str, properties: Value) -> Self {
        self.state.borrow_mut().servers.insert(
            (name.to_string(), group.to_string()),
            properties.as_object().cloned().unwrap_or_default(),
        );
        self
    }

    /// Make `verb` on the entity named `target` fail with `message`
    pub fn fail_on(&self, verb: Verb, target: &str, message: &str) {
        self.failures
            .borrow_mut()
            .push((verb, target.to_string(), message.to_string()));
    }

    /// Live properties of a database
    pub fn database(&self, name: &str) -> Option<Map<String, Value>> {
        self.state.borrow().databases.get(name).cloned()
    }

    /// Live properties of a server
    pub fn server(&self, name: &str, group: &str) -> Option<Map<String, Value>> {
        self.state
            .borrow()
            .servers
            .get(&(name.to_string(), group.to_string()))
            .cloned()
    }

    /// Every action applied so far, in order
    pub fn applied(&self) -> Vec<Action> {
        self.state.borrow().applied.clone()
    }

    /// Number of entity fetches served
    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }

    /// Number of forest catalog fetches served
    pub fn catalog_fetch_count(&self) -> usize {
        self.catalog_fetches.get()
    }
}

impl Transport for MemoryTransport {
    fn fetch(&self, target: &Target) -> Result<Option<Map<String, Value>>> {
        self.fetches.set(self.fetches.get() + 1);
        let state = self.state.borrow();
        let found = match target {
            Target::Database { name } => state.databases.get(name).cloned(),
            Target::Server { name, group } => {
                state.servers.get(&(name.clone(), group.clone())).cloned()
            }
            Target::Forest { name, .. } => state.forests.get(name).map(|attached| {
                let mut props = Map::new();
                props.insert("forest-name".to_string(), Value::String(name.clone()));
                props.insert(
                    "database".to_string(),
                    attached.clone().map_or(Value::Null, Value::String),
                );
                props
            }),
        };
        Ok(found)
    }

    fn fetch_forest_catalog(&self) -> Result<Vec<String>> {
        self.catalog_fetches.set(self.catalog_fetches.get() + 1);
        Ok(self.state.borrow().forests.keys().cloned().collect())
    }

    fn apply(&self, action: &Action) -> Result<()> {
        if let Some((_, _, message)) = self
            .failures
            .borrow()
            .iter()
            .find(|(verb, target, _)| *verb == action.verb && target == action.target.name())
        {
            bail!("{message}");
        }
        let mut state = self.state.borrow_mut();
        state.apply(action)?;
        state.applied.push(action.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_forest_lifecycle() {
        let transport = MemoryTransport::new().with_forest("spare");
        transport
            .apply(&Action::new(
                Verb::CreateDatabase,
                Target::database("content"),
                json!({"database-name": "content"}),
            ))
            .unwrap();
        transport
            .apply(&Action::new(
                Verb::AttachForest,
                Target::forest("spare", "content"),
                json!({}),
            ))
            .unwrap();
        assert_eq!(
            transport.database("content").unwrap()[ATTACHED_FORESTS_KEY],
            json!(["spare"])
        );

        transport
            .apply(&Action::new(
                Verb::DetachForest,
                Target::forest("spare", "content"),
                json!({}),
            ))
            .unwrap();
        assert_eq!(
            transport.database("content").unwrap()[ATTACHED_FORESTS_KEY],
            json!([])
        );
        assert_eq!(transport.fetch_forest_catalog().unwrap(), vec!["spare"]);
    }

    #[test]
    fn test_memory_rejects_invalid_actions() {
        let transport = MemoryTransport::new();
        let attach = Action::new(Verb::AttachForest, Target::forest("f", "db"), json!({}));
        assert!(transport.apply(&attach).is_err());

        let update = Action::new(
            Verb::UpdateServerProperty,
            Target::server("app", "Default"),
            json!({"root": "/"}),
        );
        assert!(transport.apply(&update).is_err());
        assert!(transport.applied().is_empty());
    }

    #[test]
    fn test_memory_injected_failure() {
        let transport = MemoryTransport::new();
        transport.fail_on(Verb::CreateDatabase, "content", "HTTP 500");
        let create = Action::new(Verb::CreateDatabase, Target::database("content"), json!({}));
        let err = transport.apply(&create).unwrap_err();
        assert_eq!(err.to_string(), "HTTP 500");
        assert!(transport.database("content").is_none());
    }

    #[test]
    fn test_memory_fetch_counts() {
        let transport = MemoryTransport::new()
            .with_database("Documents", json!({"database-name": "Documents"}));
        assert!(transport.fetch(&Target::database("Documents")).unwrap().is_some());
        assert!(transport.fetch(&Target::database("nope")).unwrap().is_none());
        assert_eq!(transport.fetch_count(), 2);
    }
}
