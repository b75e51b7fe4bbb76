use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rosaform")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative lifecycle management for managed OpenShift clusters", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Control plane URL
    #[arg(long, env = "OCM_URL", global = true)]
    pub url: Option<String>,

    /// Access token
    #[arg(long, env = "OCM_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check a cluster spec without contacting the control plane
    Validate(SpecArgs),

    /// List installable OpenShift versions
    Versions {
        /// Channel group to list
        #[arg(long, default_value = reconcile::DEFAULT_CHANNEL_GROUP)]
        channel_group: String,
    },

    /// Show what apply would change
    Plan(SpecArgs),

    /// Create the cluster, or bring it in line with the spec
    Apply {
        #[command(flatten)]
        spec: SpecArgs,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the remote state of a cluster
    Show(SpecArgs),

    /// Delete the cluster and wait for it to disappear
    Destroy {
        #[command(flatten)]
        spec: SpecArgs,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,

        /// Return right after the delete request
        #[arg(long)]
        no_wait: bool,

        /// Minutes to wait for the cluster to disappear
        #[arg(long, value_name = "MINUTES", conflicts_with = "no_wait")]
        timeout: Option<u64>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct SpecArgs {
    /// Cluster spec file (TOML)
    #[arg(value_name = "SPEC")]
    pub spec: PathBuf,
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
    fn test_parse_destroy() {
        let cli = Cli::try_parse_from(["rosaform", "destroy", "c.toml", "--yes", "--timeout", "15"]).unwrap();
        match cli.command {
            Command::Destroy {
                spec,
                yes,
                no_wait,
                timeout,
            } => {
                assert_eq!(spec.spec, PathBuf::from("c.toml"));
                assert!(yes);
                assert!(!no_wait);
                assert_eq!(timeout, Some(15));
            }
            _ => panic!("expected destroy"),
        }
    }

    #[test]
    fn test_no_wait_conflicts_with_timeout() {
        assert!(Cli::try_parse_from(["rosaform", "destroy", "c.toml", "--no-wait", "--timeout", "5"]).is_err());
    }

    #[test]
    fn test_versions_default_channel_group() {
        let cli = Cli::try_parse_from(["rosaform", "versions"]).unwrap();
        match cli.command {
            Command::Versions { channel_group } => assert_eq!(channel_group, "stable"),
            _ => panic!("expected versions"),
        }
    }
}
