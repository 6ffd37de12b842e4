//! Desired topology
//!
//! Loads a project and runs it through composition, parameter resolution,
//! linearization and schema validation. Nothing here talks to the remote
//! system, so every error raised while building a [`Topology`] happens
//! before any mutation.

use crate::entity::{Database, Server};
use crate::error::Result;
use crate::graph::linearize;
use crate::params::{Namespace, ParamStore, Reference};
use crate::planner::{Plan, RunContext, plan};
use crate::project::Project;
use crate::schema::{database_schema, server_schema};
use crate::source::ConfigSource;
use serde_json::{Map, Value};

/// Validated databases (in creation order) and servers of a project
#[derive(Debug, Clone)]
pub struct Topology {
    pub params: ParamStore,
    /// API endpoint settings, by API name
    pub apis: Map<String, Value>,
    pub databases: Vec<Database>,
    pub servers: Vec<Server>,
}

impl Topology {
    /// Load the project rooted at `root` and build its topology
    pub fn load(source: &dyn ConfigSource, root: &str) -> Result<Self> {
        let project = Project::load(source, root)?;
        Self::from_project(&project)
    }

    pub fn from_project(project: &Project) -> Result<Self> {
        let params = project.params();
        let composition = project.compose()?.resolve(&params)?;
        log::debug!(
            "Composed {} database(s) and {} server(s)",
            composition.databases.len(),
            composition.servers.len()
        );

        let linear = linearize(&composition.databases, &composition.servers)?;
        let db_schema = database_schema()?;
        let srv_schema = server_schema()?;

        let databases = linear
            .databases
            .iter()
            .map(|l| Database::from_linked(l, &db_schema))
            .collect::<Result<Vec<_>>>()?;
        let servers = linear
            .servers
            .iter()
            .map(|l| Server::from_linked(l, &srv_schema))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            params,
            apis: composition.apis,
            databases,
            servers,
        })
    }

    /// A resolved project value (`code`, `title`, `host`, `user`, `password`)
    pub fn project_value(&self, name: &str) -> Result<Option<String>> {
        if self.params.lookup(Namespace::Project, name).is_none() {
            return Ok(None);
        }
        self.params.resolve_named(&Reference::project(name)).map(Some)
    }

    /// Settings of one management API, if any fragment declares them
    pub fn api(&self, name: &str) -> Option<&Map<String, Value>> {
        self.apis.get(name).and_then(Value::as_object)
    }

    /// Plan the actions that bring live state in line with this topology
    pub fn plan(&self, ctx: &mut RunContext<'_>) -> Result<Plan> {
        plan(self, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::source::MemorySource;
    use serde_json::json;

    fn doc(body: Value) -> Value {
        let mut body = body;
        body["format"] = json!("0.1");
        json!({ "dbtopo": body })
    }

    #[test]
    fn test_full_pipeline() {
        let source = MemorySource::new()
            .with(
                "dev",
                doc(json!({
                    "import": "base",
                    "code": "shop",
                    "host": "dev.example.com",
                    "params": {"port": 8010},
                    "apis": {"manage": {"port": 18002}}
                })),
            )
            .with(
                "base",
                doc(json!({
                    "databases": [{
                        "id": "content",
                        "name": "@{code}-content",
                        "schema": {"name": "@{code}-schemas", "forests": 1},
                        "forests": 2
                    }],
                    "servers": [{
                        "name": "@{code}-app",
                        "type": "http",
                        "port": "${port}",
                        "content": {"ref": "content"}
                    }]
                })),
            );

        let t = Topology::load(&source, "dev").unwrap();
        let names: Vec<_> = t.databases.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["shop-schemas", "shop-content"]);
        assert_eq!(t.databases[1].forests.len(), 2);
        assert_eq!(
            t.databases[1].properties.get_str("schema-database"),
            Some("shop-schemas")
        );

        let server = &t.servers[0];
        assert_eq!(server.name, "shop-app");
        assert_eq!(server.group, "Default");
        assert_eq!(server.properties.get_str("content-database"), Some("shop-content"));

        assert_eq!(t.project_value("host").unwrap().as_deref(), Some("dev.example.com"));
        assert_eq!(t.project_value("user").unwrap(), None);
        assert_eq!(t.api("manage").unwrap()["port"], json!(18002));
    }

    #[test]
    fn test_validation_runs_after_linking() {
        let source = MemorySource::new().with(
            "dev",
            doc(json!({"servers": [
                {"name": "app", "type": "ftp", "port": 21, "content": {"system": "Documents"}}
            ]})),
        );
        let err = Topology::load(&source, "dev").unwrap_err();
        assert!(matches!(err, Error::InvalidEnumValue { .. }));
    }
}
