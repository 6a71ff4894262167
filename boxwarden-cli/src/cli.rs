//! Top-level argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "boxwarden", version, about = "Operate boxwarden sandboxes from the command line")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug)]
pub struct GlobalFlags {
    /// Root directory under which each sandbox's delta and mount state lives.
    #[arg(long, global = true, env = "BOXWARDEN_HOME")]
    pub base_dir: Option<PathBuf>,
}

impl GlobalFlags {
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("boxwarden")
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create, start, run one command, then tear the sandbox down.
    Run(crate::commands::run::RunArgs),
    /// Create, start, and attach an interactive shell session.
    Shell(crate::commands::shell::ShellArgs),
}
