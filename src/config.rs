//! Tool settings and connection parameters
//!
//! Settings live in `~/.config/dbtopo/config.toml`; every key is optional.
//! `DBTOPO_HOST`, `DBTOPO_USER` and `DBTOPO_PASSWORD` override the file.

use anyhow::{Context, Result, bail};
use reconcile::Topology;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Default management API port
pub const DEFAULT_MANAGE_PORT: u16 = 8002;

pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("dbtopo"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub manage_port: Option<u16>,
    pub ssl: Option<bool>,
    pub default_environment: Option<String>,
    pub project_dir: Option<String>,
}

impl Settings {
    /// Load settings from the config directory and the environment
    pub fn load() -> Result<Self> {
        let path = config_dir()?.join("config.toml");
        let mut settings = Self::load_from(&path)?;
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Load settings from a file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings file at {}", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Override values from environment variables
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        for (key, slot) in [
            ("DBTOPO_HOST", &mut self.host),
            ("DBTOPO_USER", &mut self.user),
            ("DBTOPO_PASSWORD", &mut self.password),
        ] {
            if let Some(value) = var(key) {
                *slot = Some(value);
            }
        }
    }

    /// Project directory with `~` expanded
    pub fn project_dir(&self) -> Option<PathBuf> {
        self.project_dir
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
    }

    pub fn environment(&self) -> &str {
        self.default_environment
            .as_deref()
            .unwrap_or(DEFAULT_ENVIRONMENT)
    }
}

/// Where and how to reach the management API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub user: String,
    pub password: String,
}

/// Explicit command-line overrides
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub user: Option<String>,
}

impl Connection {
    /// Combine settings, project values and command-line flags
    ///
    /// Command-line flags win, then project values (`host`, `user`,
    /// `password`, `apis.manage`), then settings.
    pub fn resolve(
        settings: &Settings,
        topology: &Topology,
        overrides: &Overrides,
    ) -> Result<Self> {
        let project = |name: &str| -> Result<Option<String>> {
            topology
                .project_value(name)
                .with_context(|| format!("Could not resolve project value {name}"))
        };

        let host = overrides
            .host
            .clone()
            .or(project("host")?)
            .or_else(|| settings.host.clone())
            .unwrap_or_else(|| "localhost".to_string());
        let user = overrides
            .user
            .clone()
            .or(project("user")?)
            .or_else(|| settings.user.clone());
        let password = project("password")?.or_else(|| settings.password.clone());

        let manage = topology.api("manage");
        let port = match manage.and_then(|m| m.get("port")) {
            Some(value) => parse_port(value)?,
            None => settings.manage_port.unwrap_or(DEFAULT_MANAGE_PORT),
        };
        let ssl = match manage.and_then(|m| m.get("ssl")) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) if s == "true" || s == "false" => s == "true",
            Some(other) => bail!("apis.manage.ssl must be a boolean, got {other}"),
            None => settings.ssl.unwrap_or(false),
        };

        let Some(user) = user else {
            bail!(
                "No user configured: pass --user, set DBTOPO_USER or add \"user\" to the project"
            );
        };
        let Some(password) = password else {
            bail!(
                "No password configured: set DBTOPO_PASSWORD or add \"password\" to the \
                 settings file"
            );
        };

        Ok(Self {
            host,
            port,
            ssl,
            user,
            password,
        })
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

fn parse_port(value: &Value) -> Result<u16> {
    let port = match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    port.with_context(|| format!("apis.manage.port must be a port number, got {value}"))
}
