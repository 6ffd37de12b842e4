//! Core types for planned remote operations

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Kind of remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verb {
    CreateDatabase,
    CreateForest,
    AttachForest,
    DetachForest,
    CreateServer,
    UpdateDatabaseProperty,
    UpdateServerProperty,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateDatabase => "create-database",
            Self::CreateForest => "create-forest",
            Self::AttachForest => "attach-forest",
            Self::DetachForest => "detach-forest",
            Self::CreateServer => "create-server",
            Self::UpdateDatabaseProperty => "update-database-property",
            Self::UpdateServerProperty => "update-server-property",
        }
    }

    /// Whether the operation brings a new entity into existence
    pub fn is_creation(self) -> bool {
        matches!(
            self,
            Self::CreateDatabase | Self::CreateForest | Self::CreateServer
        )
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity an action operates on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Target {
    Database { name: String },
    Forest { name: String, database: String },
    Server { name: String, group: String },
}

impl Target {
    pub fn database(name: impl Into<String>) -> Self {
        Self::Database { name: name.into() }
    }

    pub fn forest(name: impl Into<String>, database: impl Into<String>) -> Self {
        Self::Forest {
            name: name.into(),
            database: database.into(),
        }
    }

    pub fn server(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self::Server {
            name: name.into(),
            group: group.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Database { name } | Self::Forest { name, .. } | Self::Server { name, .. } => name,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database { name } => write!(f, "database {name}"),
            Self::Forest { name, database } => write!(f, "forest {name} ({database})"),
            Self::Server { name, group } => write!(f, "server {name} ({group})"),
        }
    }
}

/// One remote operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub verb: Verb,
    pub target: Target,
    pub payload: Value,
}

impl Action {
    pub fn new(verb: Verb, target: Target, payload: Value) -> Self {
        Self {
            verb,
            target,
            payload,
        }
    }

    /// Human-readable description
    pub fn describe(&self) -> String {
        match self.verb {
            Verb::UpdateDatabaseProperty | Verb::UpdateServerProperty => {
                let property = self
                    .payload
                    .as_object()
                    .and_then(|m| m.keys().next())
                    .map_or("?", String::as_str);
                format!("{}: set {property}", self.target)
            }
            _ => format!("{} {}", self.verb, self.target),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Outcome counts of an execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecuteSummary {
    pub done: usize,
    pub failed: usize,
    pub pending: usize,
}

impl ExecuteSummary {
    /// Check if execution was fully successful
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.pending == 0
    }

    /// Total number of actions in the plan
    pub fn total(&self) -> usize {
        self.done + self.failed + self.pending
    }
}
