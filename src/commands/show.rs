//! Show the composed topology without contacting the remote system

use anyhow::Result;
use colored::Colorize;
use reconcile::{Namespace, NormalizedSet, Topology};
use serde_json::Value;

use super::load;
use crate::Context;
use crate::cli::EnvArgs;
use crate::ui;

/// Project values never printed in clear
const SECRETS: &[&str] = &["password"];

pub fn run(ctx: &Context, args: EnvArgs) -> Result<()> {
    let loaded = load(ctx, &args)?;
    let topology = &loaded.topology;

    ui::header(&format!("Environment: {}", loaded.environment));
    ui::dim(&loaded.path.display().to_string());

    let project = topology.params.visible(Namespace::Project);
    if !project.is_empty() {
        ui::section("Project");
        for (name, value) in &project {
            if SECRETS.contains(&name.as_str()) {
                ui::kv(name, "********");
            } else {
                ui::kv(name, &display_value(topology, value));
            }
        }
    }

    let params = topology.params.visible(Namespace::Params);
    if !params.is_empty() {
        ui::section("Parameters");
        for (name, value) in &params {
            ui::kv(name, &display_value(topology, value));
        }
    }

    ui::section(&format!("Databases ({})", topology.databases.len()));
    for (i, db) in topology.databases.iter().enumerate() {
        println!("  {} {}", format!("{:>2}.", i + 1).dimmed(), db.name.bold());
        for (field, target) in &db.links {
            ui::dim(&format!("    {field} → {target}"));
        }
        let forests: Vec<&str> = db.forests.iter().map(|f| f.name.as_str()).collect();
        if !forests.is_empty() {
            ui::dim(&format!("    forests: {}", forests.join(", ")));
        }
        if ctx.verbose > 0 {
            print_properties(&db.properties);
        }
    }

    if !topology.servers.is_empty() {
        ui::section(&format!("Servers ({})", topology.servers.len()));
        for server in &topology.servers {
            let kind = server.properties.get_str("server-type").unwrap_or("?");
            let port = server
                .properties
                .get("port")
                .map(|p| p.value.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!(
                "  {} {}",
                server.name.bold(),
                format!("({kind} :{port}, group {})", server.group).dimmed()
            );
            for (field, target) in &server.links {
                ui::dim(&format!("    {field} → {target}"));
            }
            if ctx.verbose > 0 {
                print_properties(&server.properties);
            }
        }
    }

    Ok(())
}

fn print_properties(properties: &NormalizedSet) {
    for (name, property) in properties.iter() {
        let value = property.value.to_string();
        if property.frozen {
            ui::dim(&format!("    {name} = {value} (frozen)"));
        } else {
            ui::dim(&format!("    {name} = {value}"));
        }
    }
}

/// A value with its references resolved, or as written if that fails
fn display_value(topology: &Topology, value: &Value) -> String {
    let value = topology
        .params
        .resolve_value(value)
        .unwrap_or_else(|_| value.clone());
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
