//! Run the planned actions against the remote system

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use reconcile::{Executor, ExecuteSummary, RunContext};

use super::{connect, load, print_plan};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::ui::{self, ConsoleReporter};

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let loaded = load(ctx, &args.env)?;
    let transport = connect(ctx, &loaded)?;

    ui::header(&format!("Apply: {}", loaded.environment));

    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let mut reporter = ConsoleReporter::new(ctx.quiet);
    let plan = loaded
        .topology
        .plan(&mut RunContext::new(&transport, &mut reporter))?;
    print_plan(&plan);

    if plan.is_empty() && plan.is_executable() {
        return Ok(());
    }
    let mut executor = plan.into_executor()?.dry_run(args.dry_run);

    if !args.dry_run && !args.yes {
        println!();
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Apply these actions?")
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            ui::info("Cancelled, nothing was changed");
            return Ok(());
        }
    }

    println!();
    let summary = executor.execute(&transport, &mut reporter);
    print_outcome(ctx, &executor, &summary, args.dry_run);

    if !summary.is_success() {
        bail!(
            "Apply stopped after {} of {} actions",
            summary.done,
            summary.total()
        );
    }
    Ok(())
}

fn print_outcome(ctx: &Context, executor: &Executor, summary: &ExecuteSummary, dry_run: bool) {
    if let Some((action, error)) = executor.error() {
        ui::section("Failed");
        println!("  {} {}", "✗".red(), action);
        ui::dim(&format!("    {error}"));

        let pending: Vec<_> = executor.pending().collect();
        if !pending.is_empty() {
            ui::section(&format!("Not done ({})", pending.len()));
            for action in pending {
                println!("  {} {}", "·".dimmed(), action);
            }
        }
    }

    if ctx.verbose > 0 && !executor.done().is_empty() {
        ui::section(&format!("Done ({})", executor.done().len()));
        for action in executor.done() {
            println!("  {} {}", "✓".green(), action);
        }
    }

    println!();
    if summary.is_success() && dry_run {
        ui::success(&format!("{} actions would be applied", summary.done));
    } else if summary.is_success() {
        ui::success(&format!("{} actions applied", summary.done));
    } else {
        ui::error(&format!(
            "{} done, {} failed, {} not done",
            summary.done, summary.failed, summary.pending
        ));
    }
}
