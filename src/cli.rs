use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::module::ModuleName;
use crate::stack::command::DEFAULT_PROGRAM;

/// modstack - install and tear down interdependent infrastructure stacks
#[derive(Parser, Debug)]
#[command(name = "modstack")]
#[command(about = "Installs and deletes infrastructure modules in dependency order")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: show the plan without calling the stack CLI.
    ///
    /// Selection, resolution and every module's validation still run, so
    /// configuration errors surface exactly as in a real run. Answers are not
    /// modified or saved.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Answers file, read before the run and written after it
    #[arg(long, global = true, default_value = "modstack-answers.json")]
    pub answers: PathBuf,

    /// Target environment (overrides the answers file)
    #[arg(short, long, global = true)]
    pub environment: Option<String>,

    /// Target region (overrides the answers file)
    #[arg(short, long, global = true)]
    pub region: Option<String>,

    /// Comma-separated modules to act on. Defaults to the modules recorded in
    /// the answers file, or every module when none are recorded
    #[arg(short, long, global = true, value_delimiter = ',')]
    pub modules: Vec<String>,

    /// Add the mandatory dependencies of the selected modules to the selection
    #[arg(long, global = true)]
    pub with_dependencies: bool,

    /// Cancel the run after this many seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Stack CLI program to invoke
    #[arg(long, global = true, env = "MODSTACK_STACK_CLI", default_value = DEFAULT_PROGRAM)]
    pub stack_cli: String,

    /// Directory holding each component's templates
    #[arg(long, global = true, default_value = ".")]
    pub source_root: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Install the selected modules and their stacks
    Install,
    /// Delete the selected modules' stacks in reverse dependency order
    Delete,
    /// Print the plan for an install (or delete) without running it
    Plan {
        /// Plan a delete instead of an install
        #[arg(long)]
        delete: bool,
    },
    /// Validate answers and the selection without planning tasks
    Validate,
    /// List registered modules and their dependencies
    Modules,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Modules named with `--modules`, empty entries dropped
    pub fn module_names(&self) -> Vec<ModuleName> {
        self.modules
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(ModuleName::from)
            .collect()
    }
}
