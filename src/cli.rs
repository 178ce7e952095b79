use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ytconverge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge YTsaurus accounts, principals, nodes, bundles, pools and media onto a manifest", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Provider config file [default: <config dir>/config.toml]
    #[arg(long, global = true, env = "YTCONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Manifest of declared resources
    #[arg(long, global = true, default_value = crate::paths::MANIFEST_FILE)]
    pub manifest: PathBuf,

    /// State file [default: <state dir>/state.json]
    #[arg(long, global = true, env = "YTCONVERGE_STATE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Re-read every tracked object from the cluster
    Refresh,

    /// Show what apply would change
    Plan(TargetArgs),

    /// Converge the cluster onto the manifest
    Apply(ApplyArgs),

    /// Delete tracked objects, children first
    Destroy(ApplyArgs),

    /// Start tracking an existing object
    Import {
        /// Address as kind.key, e.g. account.analytics
        address: String,

        /// Object id (with or without the leading #)
        id: String,
    },

    /// Print tracked snapshots
    Show {
        /// Address as kind.key, or just a kind
        target: Option<String>,
    },

    /// Check the manifest without contacting the cluster
    Validate,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Shared Arguments
// ============================================================================

#[derive(Args)]
pub struct TargetArgs {
    /// Limit to one kind or one object (kind or kind.key)
    #[arg(short, long)]
    pub target: Option<String>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Limit to one kind or one object (kind or kind.key)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show the plan without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "ytconverge",
            "-vv",
            "apply",
            "--yes",
            "--target",
            "account.analytics",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.manifest, PathBuf::from("ytconverge.toml"));
        match cli.command {
            Command::Apply(args) => {
                assert!(args.yes);
                assert_eq!(args.target.as_deref(), Some("account.analytics"));
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_parse_import() {
        let cli = Cli::try_parse_from(["ytconverge", "import", "group.devs", "#1-2-3-4"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Import { ref address, ref id } if address == "group.devs" && id == "#1-2-3-4"
        ));
    }
}
