//! Type-safe stack CLI argument contracts.
//!
//! Each stack CLI invocation is a struct implementing [`StackCliArgs`]. The
//! struct is the single source of truth for flag spelling, so a mismatch like
//! `--parameters` vs `--parameter-overrides` is a code change in one place
//! rather than a runtime failure on a half-deployed stack.

use std::path::{Path, PathBuf};

use crate::types::Capability;

/// Service namespace every invocation starts with.
const SERVICE: &str = "cloudformation";

/// Trait for typed stack CLI arguments.
///
/// # Contract
///
/// - `to_cli_args()`: full argument vector after the program name
/// - `get_env_vars()`: environment the CLI needs (pager off, region)
/// - `stack_name()`: the stack this call operates on, for errors and logs
pub trait StackCliArgs {
    fn to_cli_args(&self) -> Vec<String>;

    fn get_env_vars(&self) -> Vec<(String, String)>;

    fn stack_name(&self) -> &str;

    /// Directory to run the CLI in; relative template paths resolve here.
    fn working_dir(&self) -> Option<&Path> {
        None
    }
}

fn base_env(region: &str) -> Vec<(String, String)> {
    vec![
        // An interactive pager would block a piped child forever
        ("AWS_PAGER".to_string(), String::new()),
        ("AWS_REGION".to_string(), region.to_string()),
    ]
}

fn base_args(subcommand: &str) -> Vec<String> {
    vec![SERVICE.to_string(), subcommand.to_string()]
}

/// `cloudformation package`: upload local artifacts, rewrite the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageArgs {
    pub stack_name: String,
    pub template: PathBuf,
    pub bucket: String,
    pub output_template: PathBuf,
    pub region: String,
    pub working_dir: Option<PathBuf>,
}

impl StackCliArgs for PackageArgs {
    fn to_cli_args(&self) -> Vec<String> {
        let mut args = base_args("package");
        args.extend([
            "--template-file".to_string(),
            self.template.display().to_string(),
            "--s3-bucket".to_string(),
            self.bucket.clone(),
            "--output-template-file".to_string(),
            self.output_template.display().to_string(),
            "--region".to_string(),
            self.region.clone(),
        ]);
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        base_env(&self.region)
    }

    fn stack_name(&self) -> &str {
        &self.stack_name
    }

    fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}

/// `cloudformation deploy`: create or update through a change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployArgs {
    pub stack_name: String,
    pub template: PathBuf,
    pub parameter_overrides: Vec<String>,
    pub capabilities: Vec<Capability>,
    pub region: String,
    pub working_dir: Option<PathBuf>,
}

impl StackCliArgs for DeployArgs {
    fn to_cli_args(&self) -> Vec<String> {
        let mut args = base_args("deploy");
        args.extend([
            "--stack-name".to_string(),
            self.stack_name.clone(),
            "--template-file".to_string(),
            self.template.display().to_string(),
        ]);
        if !self.parameter_overrides.is_empty() {
            args.push("--parameter-overrides".to_string());
            args.extend(self.parameter_overrides.iter().cloned());
        }
        if !self.capabilities.is_empty() {
            args.push("--capabilities".to_string());
            args.extend(self.capabilities.iter().map(|c| c.to_string()));
        }
        // An empty change set means "already up to date", not an error
        args.push("--no-fail-on-empty-changeset".to_string());
        args.extend(["--region".to_string(), self.region.clone()]);
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        base_env(&self.region)
    }

    fn stack_name(&self) -> &str {
        &self.stack_name
    }

    fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}

/// `cloudformation describe-stacks` for a single stack, JSON output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeArgs {
    pub stack_name: String,
    pub region: String,
}

impl StackCliArgs for DescribeArgs {
    fn to_cli_args(&self) -> Vec<String> {
        let mut args = base_args("describe-stacks");
        args.extend([
            "--stack-name".to_string(),
            self.stack_name.clone(),
            "--output".to_string(),
            "json".to_string(),
            "--region".to_string(),
            self.region.clone(),
        ]);
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        base_env(&self.region)
    }

    fn stack_name(&self) -> &str {
        &self.stack_name
    }
}

/// `cloudformation delete-stack`, or the matching `wait stack-delete-complete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteArgs {
    pub stack_name: String,
    pub region: String,
    /// Block until deletion finishes instead of issuing the delete
    pub wait: bool,
}

impl StackCliArgs for DeleteArgs {
    fn to_cli_args(&self) -> Vec<String> {
        let mut args = if self.wait {
            let mut a = base_args("wait");
            a.push("stack-delete-complete".to_string());
            a
        } else {
            base_args("delete-stack")
        };
        args.extend([
            "--stack-name".to_string(),
            self.stack_name.clone(),
            "--region".to_string(),
            self.region.clone(),
        ]);
        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        base_env(&self.region)
    }

    fn stack_name(&self) -> &str {
        &self.stack_name
    }
}
