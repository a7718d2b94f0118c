//! Command-line surface (C9): argument parsing and the operation dispatch table.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gistore",
    version,
    about = "Back up scattered host files into a git repository via bind mounts"
)]
pub struct Cli {
    /// Increase logging verbosity (stackable: -v, -vv).
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors.
    #[arg(short = 'q', long = "quiet", global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Select a task by name or path instead of the current directory.
    #[arg(short = 'C', long = "config", global = true, value_name = "TASK")]
    pub task: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new task at the selected directory.
    Init,

    /// Show pending changes for the selected task without committing.
    Status,

    /// Mount, commit, and unmount the selected task.
    Commit {
        #[arg(short = 'm', long = "message")]
        message: Option<String>,
    },

    /// Run `commit` over every registered task, isolating per-task failures.
    CommitAll {
        #[arg(short = 'm', long = "message")]
        message: Option<String>,
    },

    /// Mark a path as a backup source for the selected task.
    Add { paths: Vec<String> },

    /// Unmark a path as a backup source for the selected task.
    Rm { paths: Vec<String> },

    /// List every registered task and its root.
    List,

    /// Run `git log` against the selected task's repository.
    Log {
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },

    /// Internal: bring up the staging mount without committing.
    #[command(hide = true)]
    Mount,

    /// Internal: tear down the staging mount without committing.
    #[command(hide = true)]
    Umount,
}
