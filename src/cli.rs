use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dbtopo")]
#[command(version)]
#[command(about = "Reconcile databases, forests and app servers with a topology")]
#[command(long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Project directory (contains environments/)
    #[arg(short = 'C', long = "project", global = true, env = "DBTOPO_PROJECT")]
    pub project: Option<PathBuf>,

    /// Management host, overrides settings and project
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Management user, overrides settings and project
    #[arg(long, global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the composed topology: parameters, database order, servers
    Show(EnvArgs),

    /// Compare with live state and list the actions apply would run
    Plan(EnvArgs),

    /// Run the planned actions against the remote system
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct EnvArgs {
    /// Environment to load from environments/ENV.json
    #[arg(short, long)]
    pub env: Option<String>,
}

#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub env: EnvArgs,

    /// Dry run - report every action as done without running it
    #[arg(short, long)]
    pub dry_run: bool,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "dbtopo", "-vv", "-C", "/srv/shop", "apply", "-e", "prod", "--dry-run", "-y",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.project, Some(PathBuf::from("/srv/shop")));
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.env.env.as_deref(), Some("prod"));
        assert!(args.dry_run);
        assert!(args.yes);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["dbtopo", "plan", "--host", "db.example.com", "--user", "admin"])
                .unwrap();
        assert_eq!(cli.host.as_deref(), Some("db.example.com"));
        assert_eq!(cli.user.as_deref(), Some("admin"));
        assert!(matches!(cli.command, Command::Plan(EnvArgs { env: None })));
    }
}
