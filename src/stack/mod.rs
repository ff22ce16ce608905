//! Stack lifecycle client contract.
//!
//! Module task actions talk to the remote deployment service only through
//! [`StackClient`]. The engine never looks at deployment internals.
//!
//! # Implementations
//!
//! - [`command::CommandStackClient`]: drives the stack CLI as a child process
//! - [`memory::MemoryStackClient`]: in-process stacks, used by tests

pub mod args;
pub mod command;
pub mod memory;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::types::{Capability, DeployStatus};

/// Output key to output value, as reported by `describe`.
pub type StackOutputs = BTreeMap<String, String>;

/// Errors returned by a [`StackClient`].
///
/// `NotFound` is a designed result: delete tasks opt in to treating it as
/// success, everything else treats it as a failure.
#[derive(Error, Debug)]
pub enum StackError {
    #[error("Stack '{stack}' does not exist")]
    NotFound { stack: String },

    #[error("Stack CLI '{program}' failed for stack '{stack}' (exit code {code:?}): {stderr}")]
    Command {
        stack: String,
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Stack '{stack}' has no output '{key}'")]
    MissingOutput { stack: String, key: String },

    #[error("Unexpected response for stack '{stack}': {reason}")]
    InvalidResponse { stack: String, reason: String },

    #[error("Operation on stack '{stack}' was cancelled")]
    Cancelled { stack: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StackError {
    pub fn not_found(stack: impl Into<String>) -> Self {
        Self::NotFound {
            stack: stack.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Everything needed to deploy or update one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub stack_name: String,
    /// Template path, relative to `working_dir` when one is set
    pub template: PathBuf,
    pub parameters: BTreeMap<String, String>,
    pub capabilities: Vec<Capability>,
    /// When set, local artifacts are packaged into this bucket before deploy
    pub artifacts_bucket: Option<String>,
    pub working_dir: Option<PathBuf>,
}

impl DeployRequest {
    pub fn new(stack_name: impl Into<String>, template: impl Into<PathBuf>) -> Self {
        Self {
            stack_name: stack_name.into(),
            template: template.into(),
            parameters: BTreeMap::new(),
            capabilities: Vec::new(),
            artifacts_bucket: None,
            working_dir: None,
        }
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    pub fn artifacts_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.artifacts_bucket = Some(bucket.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Parameter overrides as `Key=Value` strings, sorted by key.
    pub fn parameter_overrides(&self) -> Vec<String> {
        self.parameters
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }

    /// Deterministic summary of everything that affects the deployed stack.
    ///
    /// Two requests with equal fingerprints deploy the same thing, so a
    /// recorded fingerprint lets a re-run skip the deploy.
    pub fn fingerprint(&self) -> String {
        let mut caps: Vec<String> = self.capabilities.iter().map(|c| c.to_string()).collect();
        caps.sort();
        format!(
            "{}|{}|{}|{}",
            self.template.display(),
            self.parameter_overrides().join(";"),
            caps.join(","),
            self.artifacts_bucket.as_deref().unwrap_or("")
        )
    }
}

/// The three operations module tasks may perform against a remote stack.
pub trait StackClient {
    /// Create the stack, or update it in place. Safe to call against an
    /// existing, unchanged stack.
    fn deploy_or_update(
        &self,
        request: &DeployRequest,
        cancel: &CancelToken,
    ) -> Result<DeployStatus, StackError>;

    /// Read the stack's outputs.
    fn describe(&self, stack_name: &str, cancel: &CancelToken) -> Result<StackOutputs, StackError>;

    /// Remove the stack. Returns `NotFound` if it does not exist.
    fn delete(&self, stack_name: &str, cancel: &CancelToken) -> Result<(), StackError>;
}

/// Look up a required output, failing with `MissingOutput`.
pub fn require_output<'a>(
    outputs: &'a StackOutputs,
    stack: &str,
    key: &str,
) -> Result<&'a str, StackError> {
    outputs
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| StackError::MissingOutput {
            stack: stack.to_string(),
            key: key.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_overrides_sorted() {
        let req = DeployRequest::new("s", "t.yaml")
            .parameter("Environment", "dev")
            .parameter("ArtifactsBucket", "b");
        assert_eq!(
            req.parameter_overrides(),
            vec!["ArtifactsBucket=b".to_string(), "Environment=dev".to_string()]
        );
    }

    #[test]
    fn test_fingerprint_ignores_capability_order() {
        let a = DeployRequest::new("s", "t.yaml")
            .capability(Capability::NamedIam)
            .capability(Capability::AutoExpand);
        let b = DeployRequest::new("s", "t.yaml")
            .capability(Capability::AutoExpand)
            .capability(Capability::NamedIam);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_parameters() {
        let a = DeployRequest::new("s", "t.yaml").parameter("VpcId", "vpc-1");
        let b = DeployRequest::new("s", "t.yaml").parameter("VpcId", "vpc-2");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_duplicate_capability_ignored() {
        let req = DeployRequest::new("s", "t.yaml")
            .capability(Capability::Iam)
            .capability(Capability::Iam);
        assert_eq!(req.capabilities.len(), 1);
    }

    #[test]
    fn test_require_output() {
        let mut outputs = StackOutputs::new();
        outputs.insert("Arn".to_string(), "arn:1".to_string());
        assert_eq!(require_output(&outputs, "s", "Arn").unwrap(), "arn:1");
        assert!(matches!(
            require_output(&outputs, "s", "Missing"),
            Err(StackError::MissingOutput { .. })
        ));
    }
}
