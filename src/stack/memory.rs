//! In-process stack client.
//!
//! Keeps stacks in a map and counts every call, which makes it the
//! collaborator of choice for engine tests: "the action never ran" becomes
//! "the deploy count is zero". Outputs for a stack are configured up front
//! with [`MemoryStackClient::set_outputs`] and published when the stack is
//! deployed. Failures can be injected per stack and operation.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use super::{DeployRequest, StackClient, StackError, StackOutputs};
use crate::cancel::CancelToken;
use crate::types::DeployStatus;

/// Which client operation a call or injected failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackOp {
    Deploy,
    Describe,
    Delete,
}

#[derive(Debug, Clone)]
struct DeployedStack {
    fingerprint: String,
    outputs: StackOutputs,
}

#[derive(Debug, Default)]
struct State {
    stacks: BTreeMap<String, DeployedStack>,
    planned_outputs: HashMap<String, StackOutputs>,
    failures: HashMap<(String, StackOp), String>,
    calls: Vec<(StackOp, String)>,
    requests: Vec<DeployRequest>,
}

#[derive(Debug, Default)]
pub struct MemoryStackClient {
    state: RefCell<State>,
}

impl MemoryStackClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outputs the stack will report once deployed.
    pub fn set_outputs<I, K, V>(&self, stack: &str, outputs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let outputs = outputs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.state
            .borrow_mut()
            .planned_outputs
            .insert(stack.to_string(), outputs);
    }

    /// Pretend a stack already exists, e.g. deployed by an earlier run.
    pub fn insert_existing(&self, stack: &str, outputs: StackOutputs) {
        self.state.borrow_mut().stacks.insert(
            stack.to_string(),
            DeployedStack {
                fingerprint: String::new(),
                outputs,
            },
        );
    }

    /// Make the next calls of `op` on `stack` fail with a command error.
    pub fn fail_on(&self, stack: &str, op: StackOp, message: &str) {
        self.state
            .borrow_mut()
            .failures
            .insert((stack.to_string(), op), message.to_string());
    }

    pub fn exists(&self, stack: &str) -> bool {
        self.state.borrow().stacks.contains_key(stack)
    }

    /// Number of calls of `op`, across all stacks.
    pub fn count(&self, op: StackOp) -> usize {
        self.state.borrow().calls.iter().filter(|(o, _)| *o == op).count()
    }

    /// Number of calls of `op` against one stack.
    pub fn count_for(&self, op: StackOp, stack: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|(o, s)| *o == op && s == stack)
            .count()
    }

    /// Every call in order, as `(operation, stack)`.
    pub fn calls(&self) -> Vec<(StackOp, String)> {
        self.state.borrow().calls.clone()
    }

    /// Every deploy request received, in order.
    pub fn deploy_requests(&self) -> Vec<DeployRequest> {
        self.state.borrow().requests.clone()
    }

    fn record(&self, op: StackOp, stack: &str, cancel: &CancelToken) -> Result<(), StackError> {
        let mut state = self.state.borrow_mut();
        state.calls.push((op, stack.to_string()));
        if cancel.is_cancelled() {
            return Err(StackError::Cancelled {
                stack: stack.to_string(),
            });
        }
        if let Some(message) = state.failures.get(&(stack.to_string(), op)) {
            return Err(StackError::Command {
                stack: stack.to_string(),
                program: "memory".to_string(),
                code: Some(1),
                stderr: message.clone(),
            });
        }
        Ok(())
    }
}

impl StackClient for MemoryStackClient {
    fn deploy_or_update(
        &self,
        request: &DeployRequest,
        cancel: &CancelToken,
    ) -> Result<DeployStatus, StackError> {
        self.record(StackOp::Deploy, &request.stack_name, cancel)?;

        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        state.requests.push(request.clone());
        let fingerprint = request.fingerprint();
        let outputs = state
            .planned_outputs
            .get(&request.stack_name)
            .cloned()
            .unwrap_or_default();

        let status = match state.stacks.get_mut(&request.stack_name) {
            Some(existing) if existing.fingerprint == fingerprint => DeployStatus::Unchanged,
            Some(existing) => {
                existing.fingerprint = fingerprint;
                existing.outputs.extend(outputs);
                DeployStatus::Updated
            }
            None => {
                state.stacks.insert(
                    request.stack_name.clone(),
                    DeployedStack {
                        fingerprint,
                        outputs,
                    },
                );
                DeployStatus::Created
            }
        };
        Ok(status)
    }

    fn describe(&self, stack_name: &str, cancel: &CancelToken) -> Result<StackOutputs, StackError> {
        self.record(StackOp::Describe, stack_name, cancel)?;
        self.state
            .borrow()
            .stacks
            .get(stack_name)
            .map(|s| s.outputs.clone())
            .ok_or_else(|| StackError::not_found(stack_name))
    }

    fn delete(&self, stack_name: &str, cancel: &CancelToken) -> Result<(), StackError> {
        self.record(StackOp::Delete, stack_name, cancel)?;
        self.state
            .borrow_mut()
            .stacks
            .remove(stack_name)
            .map(|_| ())
            .ok_or_else(|| StackError::not_found(stack_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_then_describe_publishes_outputs() {
        let client = MemoryStackClient::new();
        client.set_outputs("s", [("Arn", "arn:1")]);
        let token = CancelToken::new();

        assert!(client.describe("s", &token).unwrap_err().is_not_found());

        let status = client.deploy_or_update(&DeployRequest::new("s", "t.yaml"), &token).unwrap();
        assert_eq!(status, DeployStatus::Created);
        assert_eq!(client.describe("s", &token).unwrap().get("Arn").unwrap(), "arn:1");
    }

    #[test]
    fn test_redeploy_same_request_is_unchanged() {
        let client = MemoryStackClient::new();
        let token = CancelToken::new();
        let req = DeployRequest::new("s", "t.yaml").parameter("A", "1");

        client.deploy_or_update(&req, &token).unwrap();
        assert_eq!(client.deploy_or_update(&req, &token).unwrap(), DeployStatus::Unchanged);

        let changed = req.clone().parameter("A", "2");
        assert_eq!(client.deploy_or_update(&changed, &token).unwrap(), DeployStatus::Updated);
        assert_eq!(client.count(StackOp::Deploy), 3);
    }

    #[test]
    fn test_delete_missing_stack_is_not_found() {
        let client = MemoryStackClient::new();
        let err = client.delete("gone", &CancelToken::new()).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(client.count_for(StackOp::Delete, "gone"), 1);
    }

    #[test]
    fn test_injected_failure() {
        let client = MemoryStackClient::new();
        client.fail_on("s", StackOp::Deploy, "boom");
        let err = client
            .deploy_or_update(&DeployRequest::new("s", "t.yaml"), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, StackError::Command { .. }));
        assert!(!client.exists("s"));
    }

    #[test]
    fn test_cancelled_token_rejects_calls() {
        let client = MemoryStackClient::new();
        let token = CancelToken::new();
        token.cancel();
        assert!(client.describe("s", &token).unwrap_err().is_cancelled());
    }
}
