//! File-system config source
//!
//! Fragments are JSON files. Imports are resolved relative to the directory
//! of the importing file; `~` is expanded.

use anyhow::{Context, Result};
use reconcile::ConfigSource;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory holding one fragment per environment
pub const ENVIRONMENTS_DIR: &str = "environments";

/// Path of an environment's root fragment
pub fn environment_path(project_dir: &Path, env: &str) -> PathBuf {
    project_dir.join(ENVIRONMENTS_DIR).join(format!("{env}.json"))
}

/// Reads fragments from JSON files
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl ConfigSource for FsSource {
    fn load_fragment(&self, locator: &str) -> Result<Value> {
        let content =
            fs::read_to_string(locator).with_context(|| format!("Could not read {locator}"))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {locator}"))
    }

    fn resolve_import(&self, reference: &str, base: &str) -> Result<String> {
        let reference = PathBuf::from(shellexpand::tilde(reference).as_ref());
        let path = if reference.is_absolute() {
            reference
        } else {
            Path::new(base)
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(reference)
        };
        // Canonical paths make the same file reached through different
        // relative paths one locator
        let path = path
            .canonicalize()
            .with_context(|| format!("Could not find {}", path.display()))?;
        Ok(path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{Error, Project};
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, body: &Value) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, serde_json::to_string_pretty(body).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_environment_path() {
        assert_eq!(
            environment_path(Path::new("/srv/shop"), "prod"),
            PathBuf::from("/srv/shop/environments/prod.json")
        );
    }

    #[test]
    fn test_relative_imports() {
        let dir = TempDir::new().unwrap();
        let env = write(
            dir.path(),
            "environments/dev.json",
            &json!({"dbtopo": {
                "format": "0.1",
                "import": ["../base.json", "../shared/servers.json"]
            }}),
        );
        write(
            dir.path(),
            "base.json",
            &json!({"dbtopo": {"format": "0.1", "import": "shared/servers.json"}}),
        );
        write(dir.path(), "shared/servers.json", &json!({"dbtopo": {"format": "0.1"}}));

        let project = Project::load(&FsSource, &env.to_string_lossy()).unwrap();
        assert_eq!(project.fragments.len(), 3);
        assert!(project.fragments[2].locator.ends_with("servers.json"));
    }

    #[test]
    fn test_missing_import() {
        let dir = TempDir::new().unwrap();
        let env = write(
            dir.path(),
            "environments/dev.json",
            &json!({"dbtopo": {"format": "0.1", "import": "nope.json"}}),
        );
        let err = Project::load(&FsSource, &env.to_string_lossy()).unwrap_err();
        assert!(matches!(err, Error::Source { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = FsSource.load_fragment(&path.to_string_lossy()).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid JSON"));
    }
}
