//! Stack client backed by the stack CLI (`aws cloudformation ...`).
//!
//! Every invocation goes through [`run_cli_safe`], which:
//!
//! - spawns the CLI in a new process group and registers its PID
//! - drains stdout/stderr on helper threads so a chatty CLI never blocks
//! - polls the run's [`CancelToken`] and terminates the group on cancellation
//!
//! The CLI reports a missing stack only as text on stderr. That string check
//! lives here and nowhere else; callers get a typed [`StackError::NotFound`].

use serde::Deserialize;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::args::{DeleteArgs, DeployArgs, DescribeArgs, PackageArgs, StackCliArgs};
use super::{DeployRequest, StackClient, StackError, StackOutputs};
use crate::cancel::CancelToken;
use crate::process_guard::{terminate_group, ChildRegistry, CommandProcessGroup};
use crate::types::DeployStatus;

/// Default stack CLI program
pub const DEFAULT_PROGRAM: &str = "aws";

/// How often a running child is checked for exit and cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Grace period between SIGTERM and SIGKILL on cancellation
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Output from one stack CLI invocation.
#[derive(Debug, Clone)]
pub struct CliOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    pub success: bool,
}

/// Run the stack CLI with typed arguments.
///
/// Returns `Ok` for any completed process, successful or not; callers decide
/// how to classify a non-zero exit. Returns `Cancelled` if the token tripped
/// before or while the process ran.
pub fn run_cli_safe<A: StackCliArgs>(
    program: &str,
    args: &A,
    cancel: &CancelToken,
) -> Result<CliOutput, StackError> {
    let stack = args.stack_name().to_string();
    if cancel.is_cancelled() {
        return Err(StackError::Cancelled { stack });
    }

    let cli_args = args.to_cli_args();
    info!(program, args = ?cli_args, "running stack CLI");

    let mut cmd = Command::new(program);
    cmd.args(&cli_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .in_new_process_group();
    if let Some(dir) = args.working_dir() {
        cmd.current_dir(dir);
    }
    for (key, value) in args.get_env_vars() {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn()?;
    let pid = child.id();
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.register(pid);
    }

    let stdout = child.stdout.take().map(|s| thread::spawn(move || drain(s)));
    let stderr = child.stderr.take().map(|s| thread::spawn(move || drain(s)));

    let waited = wait_or_cancel(&mut child, pid, cancel);

    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.unregister(pid);
    }

    let stdout = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
    let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();

    let status = match waited? {
        Some(status) => status,
        None => return Err(StackError::Cancelled { stack }),
    };

    let output = CliOutput {
        stdout,
        stderr,
        exit_code: status.code(),
        success: status.success(),
    };
    debug!(
        program,
        exit_code = ?output.exit_code,
        success = output.success,
        "stack CLI finished"
    );
    Ok(output)
}

/// Wait for the child, terminating it if the token trips. `None` means the
/// child was cancelled.
fn wait_or_cancel(
    child: &mut std::process::Child,
    pid: u32,
    cancel: &CancelToken,
) -> Result<Option<std::process::ExitStatus>, StackError> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {}
            Err(e) => {
                // Don't leave an unsupervised deploy behind
                terminate_group(pid, TERMINATE_GRACE);
                let _ = child.wait();
                return Err(e.into());
            }
        }
        if cancel.is_cancelled() {
            warn!(pid, "run cancelled, terminating stack CLI");
            terminate_group(pid, TERMINATE_GRACE);
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn drain<R: Read>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

/// The CLI's way of saying the stack is absent.
fn is_not_found_message(stderr: &str) -> bool {
    stderr.contains("does not exist")
}

/// The CLI's way of saying an update had nothing to do.
fn is_no_change_message(stdout: &str) -> bool {
    stdout.contains("No changes to deploy")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeResponse {
    #[serde(default)]
    stacks: Vec<DescribedStack>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribedStack {
    #[serde(default)]
    outputs: Vec<DescribedOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribedOutput {
    output_key: String,
    output_value: String,
}

/// Parse `describe-stacks --output json` into an outputs map.
pub fn parse_describe_output(stack: &str, json: &str) -> Result<StackOutputs, StackError> {
    let response: DescribeResponse =
        serde_json::from_str(json).map_err(|e| StackError::InvalidResponse {
            stack: stack.to_string(),
            reason: e.to_string(),
        })?;

    let described = response
        .stacks
        .into_iter()
        .next()
        .ok_or_else(|| StackError::not_found(stack))?;

    Ok(described
        .outputs
        .into_iter()
        .map(|o| (o.output_key, o.output_value))
        .collect())
}

/// [`StackClient`] that shells out to the stack CLI.
#[derive(Debug, Clone)]
pub struct CommandStackClient {
    program: String,
    region: String,
    /// Where packaged templates are written
    scratch_dir: PathBuf,
}

impl CommandStackClient {
    pub fn new(program: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            region: region.into(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn failure(&self, stack: &str, output: CliOutput) -> StackError {
        if is_not_found_message(&output.stderr) {
            return StackError::not_found(stack);
        }
        StackError::Command {
            stack: stack.to_string(),
            program: self.program.clone(),
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        }
    }

    fn exists(&self, stack: &str, cancel: &CancelToken) -> Result<bool, StackError> {
        match self.describe(stack, cancel) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Package local artifacts and return the rewritten template path.
    fn package(
        &self,
        request: &DeployRequest,
        bucket: &str,
        cancel: &CancelToken,
    ) -> Result<PathBuf, StackError> {
        let output_template = self
            .scratch_dir
            .join(format!("{}.packaged.yaml", request.stack_name));
        let args = PackageArgs {
            stack_name: request.stack_name.clone(),
            template: request.template.clone(),
            bucket: bucket.to_string(),
            output_template: output_template.clone(),
            region: self.region.clone(),
            working_dir: request.working_dir.clone(),
        };
        let output = run_cli_safe(&self.program, &args, cancel)?;
        if !output.success {
            return Err(self.failure(&request.stack_name, output));
        }
        Ok(output_template)
    }
}

impl StackClient for CommandStackClient {
    fn deploy_or_update(
        &self,
        request: &DeployRequest,
        cancel: &CancelToken,
    ) -> Result<DeployStatus, StackError> {
        let existed = self.exists(&request.stack_name, cancel)?;

        let template = match &request.artifacts_bucket {
            Some(bucket) => self.package(request, bucket, cancel)?,
            None => request.template.clone(),
        };

        let args = DeployArgs {
            stack_name: request.stack_name.clone(),
            template,
            parameter_overrides: request.parameter_overrides(),
            capabilities: request.capabilities.clone(),
            region: self.region.clone(),
            working_dir: request.working_dir.clone(),
        };
        let output = run_cli_safe(&self.program, &args, cancel)?;
        if !output.success {
            return Err(self.failure(&request.stack_name, output));
        }

        let status = if !existed {
            DeployStatus::Created
        } else if is_no_change_message(&output.stdout) {
            DeployStatus::Unchanged
        } else {
            DeployStatus::Updated
        };
        info!(stack = %request.stack_name, %status, "stack deployed");
        Ok(status)
    }

    fn describe(&self, stack_name: &str, cancel: &CancelToken) -> Result<StackOutputs, StackError> {
        let args = DescribeArgs {
            stack_name: stack_name.to_string(),
            region: self.region.clone(),
        };
        let output = run_cli_safe(&self.program, &args, cancel)?;
        if !output.success {
            return Err(self.failure(stack_name, output));
        }
        parse_describe_output(stack_name, &output.stdout)
    }

    fn delete(&self, stack_name: &str, cancel: &CancelToken) -> Result<(), StackError> {
        // delete-stack succeeds silently for absent stacks; check first so
        // the caller sees a typed NotFound
        if !self.exists(stack_name, cancel)? {
            return Err(StackError::not_found(stack_name));
        }

        for wait in [false, true] {
            let args = DeleteArgs {
                stack_name: stack_name.to_string(),
                region: self.region.clone(),
                wait,
            };
            let output = run_cli_safe(&self.program, &args, cancel)?;
            if !output.success {
                return Err(self.failure(stack_name, output));
            }
        }
        info!(stack = stack_name, "stack deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIBE_JSON: &str = r#"{
        "Stacks": [{
            "StackName": "modstack-deployment-helper-dev",
            "StackStatus": "CREATE_COMPLETE",
            "Outputs": [
                { "OutputKey": "CustomResourceLambdaArn", "OutputValue": "arn:aws:lambda:us-west-2:1:function:helper" },
                { "OutputKey": "Other", "OutputValue": "x", "Description": "ignored" }
            ]
        }]
    }"#;

    #[test]
    fn test_parse_describe_output() {
        let outputs = parse_describe_output("modstack-deployment-helper-dev", DESCRIBE_JSON).unwrap();
        assert_eq!(
            outputs.get("CustomResourceLambdaArn").map(String::as_str),
            Some("arn:aws:lambda:us-west-2:1:function:helper")
        );
        assert_eq!(outputs.len(), 2);
    }

    #[test]
    fn test_parse_describe_without_outputs() {
        let outputs =
            parse_describe_output("s", r#"{"Stacks":[{"StackName":"s"}]}"#).unwrap();
        assert!(outputs.is_empty());
    }

    #[test]
    fn test_parse_describe_empty_stack_list_is_not_found() {
        let err = parse_describe_output("s", r#"{"Stacks":[]}"#).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_parse_describe_garbage() {
        let err = parse_describe_output("s", "not json").unwrap_err();
        assert!(matches!(err, StackError::InvalidResponse { .. }));
    }

    #[test]
    fn test_not_found_classification() {
        let client = CommandStackClient::new("aws", "us-west-2");
        let err = client.failure(
            "s",
            CliOutput {
                stdout: String::new(),
                stderr: "An error occurred (ValidationError) when calling the DescribeStacks \
                         operation: Stack with id s does not exist"
                    .to_string(),
                exit_code: Some(254),
                success: false,
            },
        );
        assert!(err.is_not_found());

        let err = client.failure(
            "s",
            CliOutput {
                stdout: String::new(),
                stderr: "AccessDenied".to_string(),
                exit_code: Some(255),
                success: false,
            },
        );
        assert!(matches!(err, StackError::Command { code: Some(255), .. }));
    }

    #[test]
    fn test_run_cli_safe_cancelled_before_spawn() {
        let token = CancelToken::new();
        token.cancel();
        let args = DescribeArgs {
            stack_name: "s".to_string(),
            region: "us-west-2".to_string(),
        };
        let err = run_cli_safe("true", &args, &token).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_run_cli_safe_captures_output() {
        // `echo` stands in for the CLI: it prints its arguments and exits 0
        let args = DescribeArgs {
            stack_name: "s".to_string(),
            region: "us-west-2".to_string(),
        };
        let output = run_cli_safe("echo", &args, &CancelToken::new()).unwrap();
        assert!(output.success);
        assert!(output.stdout.contains("describe-stacks"));
        assert!(output.stdout.contains("--stack-name s"));
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let args = DescribeArgs {
            stack_name: "s".to_string(),
            region: "us-west-2".to_string(),
        };
        let err = run_cli_safe("/nonexistent/stack-cli", &args, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, StackError::Io(_)));
    }

    /// Shell script standing in for a CLI that hangs with a child of its own.
    struct HangingScript {
        script: String,
    }

    impl StackCliArgs for HangingScript {
        fn to_cli_args(&self) -> Vec<String> {
            vec!["-c".to_string(), self.script.clone()]
        }

        fn get_env_vars(&self) -> Vec<(String, String)> {
            Vec::new()
        }

        fn stack_name(&self) -> &str {
            "hanging"
        }
    }

    fn read_pid(path: &std::path::Path) -> Option<u32> {
        std::fs::read_to_string(path).ok()?.trim().parse().ok()
    }

    #[test]
    fn test_cancel_while_running_kills_process_group() {
        use crate::process_guard::is_process_alive;
        use std::time::Instant;

        let dir = tempfile::TempDir::new().unwrap();
        let shell_pid = dir.path().join("shell.pid");
        let sleep_pid = dir.path().join("sleep.pid");
        let args = HangingScript {
            script: format!(
                "echo $$ > {shell}; sleep 30 >/dev/null 2>&1 & echo $! > {sleep}; wait",
                shell = shell_pid.display(),
                sleep = sleep_pid.display(),
            ),
        };

        let token = CancelToken::new();
        let canceller = {
            let token = token.clone();
            let sleep_pid = sleep_pid.clone();
            thread::spawn(move || {
                let start = Instant::now();
                while read_pid(&sleep_pid).is_none() && start.elapsed() < Duration::from_secs(10) {
                    thread::sleep(Duration::from_millis(50));
                }
                token.cancel();
            })
        };

        let start = Instant::now();
        let err = run_cli_safe("sh", &args, &token).unwrap_err();
        canceller.join().unwrap();

        assert!(err.is_cancelled(), "expected cancellation, got {:?}", err);
        assert!(start.elapsed() < Duration::from_secs(20));

        let pids = [read_pid(&shell_pid).unwrap(), read_pid(&sleep_pid).unwrap()];
        let deadline = Instant::now() + TERMINATE_GRACE;
        while pids.iter().any(|&pid| is_process_alive(pid)) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        for pid in pids {
            assert!(!is_process_alive(pid), "pid {} survived cancellation", pid);
        }
    }
}
