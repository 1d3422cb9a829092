use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "materia")]
#[command(author = "materia contributors")]
#[command(version)]
#[command(about = "Keep a host's quadlet components in sync with a repository", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what update would change
    Plan(PlanArgs),

    /// Plan and apply changes to this host
    Update(UpdateArgs),

    /// Show the resolved configuration
    Config,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Print the plan as a JSON array of actions
    #[arg(long)]
    pub json: bool,

    /// Show content diffs under each step
    #[arg(short, long, conflicts_with = "json")]
    pub diff: bool,
}

#[derive(Parser)]
pub struct UpdateArgs {
    /// Don't ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Show the plan without applying it
    #[arg(long)]
    pub dry_run: bool,
}
