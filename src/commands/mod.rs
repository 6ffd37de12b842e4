pub mod apply;
pub mod plan;
pub mod show;

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use reconcile::{Plan, Topology};
use std::path::PathBuf;

use crate::Context;
use crate::cli::EnvArgs;
use crate::config::{Connection, Settings};
use crate::source::{FsSource, environment_path};
use crate::transport::HttpTransport;
use crate::ui;

/// A composed environment and the settings it was loaded with
pub struct Loaded {
    pub settings: Settings,
    pub environment: String,
    pub path: PathBuf,
    pub topology: Topology,
}

/// Load and compose the selected environment
pub fn load(ctx: &Context, args: &EnvArgs) -> Result<Loaded> {
    let settings = Settings::load()?;

    let project_dir = match (&ctx.project, settings.project_dir()) {
        (Some(dir), _) => dir.clone(),
        (None, Some(dir)) => dir,
        (None, None) => std::env::current_dir().context("Could not determine current directory")?,
    };
    let environment = args
        .env
        .clone()
        .unwrap_or_else(|| settings.environment().to_string());

    let path = environment_path(&project_dir, &environment);
    if !path.exists() {
        bail!(
            "No environment '{}' in {} (expected {})",
            environment,
            project_dir.display(),
            path.display()
        );
    }
    let path = path
        .canonicalize()
        .with_context(|| format!("Could not resolve {}", path.display()))?;
    log::info!("Loading {}", path.display());

    let topology = Topology::load(&FsSource, &path.to_string_lossy())?;
    log::debug!(
        "Composed {} databases and {} servers",
        topology.databases.len(),
        topology.servers.len()
    );

    Ok(Loaded {
        settings,
        environment,
        path,
        topology,
    })
}

/// Open the management API described by settings, project and flags
pub fn connect(ctx: &Context, loaded: &Loaded) -> Result<HttpTransport> {
    let connection = Connection::resolve(&loaded.settings, &loaded.topology, &ctx.overrides)?;
    log::info!("Connecting to {} as {}", connection.base_url(), connection.user);
    Ok(HttpTransport::new(&connection))
}

/// Print the actions of a plan and any rejected changes
pub fn print_plan(plan: &Plan) {
    if !plan.rejections.is_empty() {
        ui::section("Rejected");
        for rejection in &plan.rejections {
            println!("  {} {}", "✗".red(), rejection);
        }
    }

    if plan.is_empty() {
        if plan.is_executable() {
            println!();
            ui::success("Everything is up to date");
        }
        return;
    }

    ui::section(&format!("Actions ({})", plan.len()));
    for action in &plan.actions {
        ui::action(action);
    }

    let counts: Vec<String> = plan
        .counts()
        .into_iter()
        .map(|(verb, n)| format!("{n} {verb}"))
        .collect();
    println!();
    ui::dim(&counts.join(", "));
}
