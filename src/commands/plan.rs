//! Compare desired with live state and list the actions apply would run

use anyhow::Result;
use reconcile::RunContext;

use super::{connect, load, print_plan};
use crate::Context;
use crate::cli::EnvArgs;
use crate::ui::{self, ConsoleReporter};

pub fn run(ctx: &Context, args: EnvArgs) -> Result<()> {
    let loaded = load(ctx, &args)?;
    let transport = connect(ctx, &loaded)?;

    ui::header(&format!("Plan: {}", loaded.environment));

    let mut reporter = ConsoleReporter::new(ctx.quiet);
    let plan = loaded
        .topology
        .plan(&mut RunContext::new(&transport, &mut reporter))?;
    print_plan(&plan);

    // A rejected change fails the command like it would fail apply
    plan.into_executor()?;
    Ok(())
}
