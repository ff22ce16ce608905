//! End-to-end orchestration tests
//!
//! Every run goes through the in-memory stack client, so "a task never ran"
//! is asserted as "the client never saw the call".

use modstack::engine::plan;
use modstack::{
    builtin_registry, Answers, CancelToken, DeployRequest, InstallModule, InstallerError,
    ModuleInfo, ModuleName, ModuleSettings, MemoryStackClient, Orchestrator, RecordingSink,
    Registry, RunOutcome, RunPhase, StackOp, Task, TaskEventKind,
};

// =============================================================================
// Test modules
// =============================================================================

type PlanFn = fn(&ModuleName, &Answers) -> Vec<Task>;

/// Module whose install plan is a plain function and whose delete plan
/// removes one stack.
struct TestModule {
    info: ModuleInfo,
    install: PlanFn,
    stack: &'static str,
}

impl InstallModule for TestModule {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn plan_install(&self, answers: &Answers) -> Vec<Task> {
        (self.install)(self.name(), answers)
    }

    fn plan_delete(&self, _answers: &Answers) -> Vec<Task> {
        vec![remove(self.name(), self.stack)]
    }
}

fn deploy(module: &ModuleName, stack: &'static str) -> Task {
    Task::new(module, format!("deploy {}", stack), move |ctx| {
        let request = DeployRequest::new(stack, format!("{}.yaml", stack));
        ctx.stacks().deploy_or_update(&request, ctx.cancel())?;
        Ok(())
    })
}

fn remove(module: &ModuleName, stack: &'static str) -> Task {
    Task::new(module, format!("delete {}", stack), move |ctx| {
        ctx.stacks().delete(stack, ctx.cancel())
    })
    .tolerate_not_found()
}

fn plan_a(module: &ModuleName, _answers: &Answers) -> Vec<Task> {
    vec![deploy(module, "stack-a")]
}

fn plan_b(module: &ModuleName, _answers: &Answers) -> Vec<Task> {
    vec![
        deploy(module, "stack-b"),
        Task::new(module, "record arn", |ctx| {
            ctx.own().set("arn", "arn:example:1");
            Ok(())
        }),
    ]
}

/// Wires in B's ARN only when B has published one.
fn plan_c(module: &ModuleName, answers: &Answers) -> Vec<Task> {
    let mut tasks = vec![deploy(module, "stack-c")];
    if let Some(arn) = answers.get_str("b", "arn") {
        let arn = arn.to_string();
        tasks.push(Task::new(module, "wire b", move |ctx| {
            let request = DeployRequest::new("stack-c-wiring", "wiring.yaml").parameter("BArn", arn);
            ctx.stacks().deploy_or_update(&request, ctx.cancel())?;
            Ok(())
        }));
    }
    tasks
}

fn plan_always_skipped(module: &ModuleName, _answers: &Answers) -> Vec<Task> {
    vec![deploy(module, "stack-s").skip_if(|_| true)]
}

fn plan_cancel_midway(module: &ModuleName, _answers: &Answers) -> Vec<Task> {
    vec![
        deploy(module, "stack-a"),
        Task::new(module, "interrupt", |ctx| {
            ctx.cancel().cancel();
            Ok(())
        }),
        deploy(module, "stack-a2"),
    ]
}

fn module(name: &str, install: PlanFn, stack: &'static str) -> TestModule {
    TestModule {
        info: ModuleInfo::new(name, name.to_uppercase()),
        install,
        stack,
    }
}

/// `a`; `b`; `c` requires `a` and uses `b` when selected.
fn abc() -> Registry {
    let mut c = module("c", plan_c, "stack-c");
    c.info = c.info.mandatory(["a"]).optional(["b"]);

    Registry::new()
        .with(module("a", plan_a, "stack-a"))
        .and_then(|r| r.with(module("b", plan_b, "stack-b")))
        .and_then(|r| r.with(c))
        .expect("registry")
}

fn names(list: &[&str]) -> Vec<ModuleName> {
    list.iter().map(|n| ModuleName::from(*n)).collect()
}

fn answers() -> Answers {
    Answers::new("dev", "us-west-2")
}

fn deploys(client: &MemoryStackClient) -> Vec<String> {
    client
        .calls()
        .into_iter()
        .filter(|(op, _)| *op == StackOp::Deploy)
        .map(|(_, stack)| stack)
        .collect()
}

// =============================================================================
// Ordering and data flow
// =============================================================================

#[test]
fn test_install_runs_modules_in_dependency_order() {
    let registry = abc();
    let client = MemoryStackClient::new();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);
    let mut answers = answers();

    let outcome = orchestrator.install(&names(&["c", "b", "a"]), &mut answers).unwrap();

    assert!(outcome.is_success());
    assert_eq!(sink.modules(), names(&["a", "b", "c"]));
    assert_eq!(deploys(&client), vec!["stack-a", "stack-b", "stack-c", "stack-c-wiring"]);
    assert_eq!(answers.modules, names(&["a", "b", "c"]));
}

#[test]
fn test_downstream_module_sees_upstream_output() {
    let registry = abc();
    let client = MemoryStackClient::new();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);
    let mut answers = answers();

    orchestrator.install(&names(&["a", "b", "c"]), &mut answers).unwrap();

    assert_eq!(answers.get_str("b", "arn"), Some("arn:example:1"));
    let wiring = client
        .deploy_requests()
        .into_iter()
        .find(|r| r.stack_name == "stack-c-wiring")
        .expect("wiring deployed");
    assert_eq!(wiring.parameters.get("BArn").map(String::as_str), Some("arn:example:1"));
}

#[test]
fn test_unselected_optional_dependency_is_left_out() {
    let registry = abc();
    let client = MemoryStackClient::new();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);
    let mut answers = answers();

    let outcome = orchestrator.install(&names(&["a", "c"]), &mut answers).unwrap();

    assert!(outcome.is_success());
    assert_eq!(sink.modules(), names(&["a", "c"]));
    assert_eq!(deploys(&client), vec!["stack-a", "stack-c"]);
    assert_eq!(client.count_for(StackOp::Deploy, "stack-b"), 0);
    assert!(answers.namespace("b").is_none());
}

#[test]
fn test_skipped_task_never_reaches_client() {
    let registry = Registry::new()
        .with(module("s", plan_always_skipped, "stack-s"))
        .expect("registry");
    let client = MemoryStackClient::new();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);

    let outcome = orchestrator.install(&names(&["s"]), &mut answers()).unwrap();

    assert!(outcome.is_success());
    assert_eq!(client.count(StackOp::Deploy), 0);
    assert_eq!(sink.titles(&TaskEventKind::Skipped), vec!["deploy stack-s"]);
    assert!(sink.titles(&TaskEventKind::Started).is_empty());
    assert_eq!(orchestrator.state().tasks_skipped(), 1);
}

// =============================================================================
// Errors before execution
// =============================================================================

#[test]
fn test_cycle_is_reported_and_nothing_runs() {
    let mut x = module("x", plan_a, "stack-x");
    x.info = x.info.mandatory(["y"]);
    let mut y = module("y", plan_b, "stack-y");
    y.info = y.info.mandatory(["x"]);
    let registry = Registry::new().with(x).and_then(|r| r.with(y)).expect("registry");

    let client = MemoryStackClient::new();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);

    let err = orchestrator.install(&names(&["x", "y"]), &mut answers()).unwrap_err();

    match err {
        InstallerError::CyclicDependency { cycle } => {
            assert!(cycle.len() >= 3);
            assert_eq!(cycle.first(), cycle.last());
        }
        other => panic!("expected a cycle, got {other}"),
    }
    assert!(client.calls().is_empty());
    assert!(sink.events().is_empty());
    assert_eq!(orchestrator.state().phase(), RunPhase::Failed);
}

#[test]
fn test_missing_mandatory_dependency_rejected() {
    let registry = abc();
    let client = MemoryStackClient::new();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);

    let err = orchestrator.install(&names(&["c"]), &mut answers()).unwrap_err();

    assert!(matches!(
        err,
        InstallerError::MissingDependency { ref module, ref dependency }
            if module.as_str() == "c" && dependency.as_str() == "a"
    ));
    assert!(client.calls().is_empty());
}

#[test]
fn test_unknown_module_rejected() {
    let registry = abc();
    let client = MemoryStackClient::new();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);
    let mut answers = answers();

    let err = orchestrator.install(&names(&["a", "ghost"]), &mut answers).unwrap_err();

    assert!(matches!(err, InstallerError::UnknownModule(ref name) if name.as_str() == "ghost"));
    assert!(answers.modules.is_empty());
}

// =============================================================================
// Failure and cancellation
// =============================================================================

#[test]
fn test_failure_stops_the_run() {
    let registry = abc();
    let client = MemoryStackClient::new();
    client.fail_on("stack-b", StackOp::Deploy, "boom");
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);

    let outcome = orchestrator.install(&names(&["a", "b", "c"]), &mut answers()).unwrap();

    match &outcome {
        RunOutcome::Failed { module, task, cause } => {
            assert_eq!(module.as_str(), "b");
            assert_eq!(task, "deploy stack-b");
            assert!(cause.to_string().contains("boom"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(client.count_for(StackOp::Deploy, "stack-c"), 0);
    assert_eq!(orchestrator.state().phase(), RunPhase::Failed);
}

#[test]
fn test_cancellation_stops_remaining_tasks() {
    let registry = Registry::new()
        .with(module("a", plan_cancel_midway, "stack-a"))
        .and_then(|r| r.with(module("b", plan_b, "stack-b")))
        .expect("registry");
    let client = MemoryStackClient::new();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);

    let outcome = orchestrator.install(&names(&["a", "b"]), &mut answers()).unwrap();

    assert!(outcome.is_cancelled());
    assert_eq!(outcome.exit_code(), 130);
    assert_eq!(deploys(&client), vec!["stack-a"]);
    assert!(orchestrator.cancel_token().is_cancelled());
    assert_eq!(orchestrator.state().phase(), RunPhase::Cancelled);
}

#[test]
fn test_pre_cancelled_token_runs_nothing() {
    let registry = abc();
    let client = MemoryStackClient::new();
    let sink = RecordingSink::new();
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink).with_cancel(cancel);

    let outcome = orchestrator.install(&names(&["a"]), &mut answers()).unwrap();

    assert!(outcome.is_cancelled());
    assert!(client.calls().is_empty());
}

// =============================================================================
// Delete
// =============================================================================

#[test]
fn test_delete_runs_in_reverse_install_order() {
    let registry = abc();
    let client = MemoryStackClient::new();
    let install_sink = RecordingSink::new();
    let mut answers = answers();
    Orchestrator::new(&registry, &client, &install_sink)
        .install(&names(&["a", "b", "c"]), &mut answers)
        .unwrap();

    let delete_sink = RecordingSink::new();
    let outcome = Orchestrator::new(&registry, &client, &delete_sink)
        .delete(&names(&["a", "b", "c"]), &mut answers)
        .unwrap();

    assert!(outcome.is_success());
    let mut reversed = install_sink.modules();
    reversed.reverse();
    assert_eq!(delete_sink.modules(), reversed);
    assert!(!client.exists("stack-a"));
    assert!(answers.modules.is_empty());
}

#[test]
fn test_delete_tolerates_missing_stacks() {
    let registry = abc();
    let client = MemoryStackClient::new();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);

    let outcome = orchestrator.delete(&names(&["a", "b", "c"]), &mut answers()).unwrap();

    assert!(outcome.is_success());
    assert_eq!(
        sink.titles(&TaskEventKind::NotFoundTolerated),
        vec!["delete stack-c", "delete stack-b", "delete stack-a"]
    );
    assert_eq!(orchestrator.state().tasks_tolerated(), 3);
}

#[test]
fn test_delete_stops_on_other_errors() {
    let registry = abc();
    let client = MemoryStackClient::new();
    client.fail_on("stack-b", StackOp::Delete, "access denied");
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);
    let mut answers = answers();
    answers.modules = names(&["a", "b", "c"]);

    let outcome = orchestrator.delete(&names(&["a", "b", "c"]), &mut answers).unwrap();

    assert!(matches!(outcome, RunOutcome::Failed { ref module, .. } if module.as_str() == "b"));
    assert_eq!(client.count_for(StackOp::Delete, "stack-a"), 0);
    assert_eq!(answers.modules, names(&["a", "b", "c"]));
}

// =============================================================================
// Built-in modules
// =============================================================================

fn builtin_client() -> MemoryStackClient {
    let client = MemoryStackClient::new();
    client.set_outputs(
        "modstack-vpc-dev",
        [
            ("VpcId", "vpc-1"),
            ("SecurityGroupId", "sg-1"),
            ("PrivateSubnetIds", "subnet-1,subnet-2"),
            ("PublicSubnetIds", "subnet-3,subnet-4"),
        ],
    );
    client.set_outputs("modstack-kms-dev", [("KmsKeyId", "key-1")]);
    client.set_outputs(
        "modstack-deployment-helper-dev",
        [("CustomResourceLambdaArn", "arn:lambda:helper")],
    );
    client.set_outputs(
        "modstack-deployment-helper-vpc-dev",
        [("CustomResourceVpcLambdaArn", "arn:lambda:helper-vpc")],
    );
    client.set_outputs("modstack-eventbus-dev", [("EventBusArn", "arn:events:bus")]);
    client
}

fn builtin_answers() -> Answers {
    answers().with("s3", "bucket", "artifacts")
}

#[test]
fn test_builtin_install_harvests_every_output() {
    let registry = builtin_registry(&ModuleSettings::new("dev", "/src")).unwrap();
    let client = builtin_client();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);
    let mut answers = builtin_answers();

    let outcome = orchestrator.install(&registry.names(), &mut answers).unwrap();

    assert!(outcome.is_success());
    assert_eq!(client.count(StackOp::Deploy), 5);
    assert_eq!(answers.get_str("vpc", "id"), Some("vpc-1"));
    assert_eq!(answers.get_str("kms", "id"), Some("key-1"));
    assert_eq!(answers.get_str("deploymentHelper", "lambdaArn"), Some("arn:lambda:helper"));
    assert_eq!(
        answers.get_str("deploymentHelper", "vpcLambdaArn"),
        Some("arn:lambda:helper-vpc")
    );
    assert_eq!(answers.get_str("eventBus", "arn"), Some("arn:events:bus"));

    let bus = client
        .deploy_requests()
        .into_iter()
        .find(|r| r.stack_name == "modstack-eventbus-dev")
        .expect("event bus deployed");
    assert_eq!(bus.parameters.get("KmsKeyId").map(String::as_str), Some("key-1"));
    assert_eq!(
        bus.parameters.get("CustomResourceLambdaArn").map(String::as_str),
        Some("arn:lambda:helper")
    );

    let helper_vpc = client
        .deploy_requests()
        .into_iter()
        .find(|r| r.stack_name == "modstack-deployment-helper-vpc-dev")
        .expect("vpc variant deployed");
    assert_eq!(helper_vpc.parameters.get("VpcId").map(String::as_str), Some("vpc-1"));
}

#[test]
fn test_builtin_reinstall_deploys_nothing() {
    let registry = builtin_registry(&ModuleSettings::new("dev", "/src")).unwrap();
    let client = builtin_client();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);
    let mut answers = builtin_answers();

    orchestrator.install(&registry.names(), &mut answers).unwrap();
    let first = client.count(StackOp::Deploy);
    let snapshot = answers.clone();

    let outcome = orchestrator.install(&registry.names(), &mut answers).unwrap();

    assert!(outcome.is_success());
    assert_eq!(client.count(StackOp::Deploy), first);
    assert_eq!(orchestrator.state().tasks_skipped(), 5);
    assert_eq!(answers, snapshot);
}

#[test]
fn test_builtin_delete_clears_harvested_answers() {
    let registry = builtin_registry(&ModuleSettings::new("dev", "/src")).unwrap();
    let client = builtin_client();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);
    let mut answers = builtin_answers();

    orchestrator.install(&registry.names(), &mut answers).unwrap();
    let outcome = orchestrator.delete(&registry.names(), &mut answers).unwrap();

    assert!(outcome.is_success());
    let deleted: Vec<String> = client
        .calls()
        .into_iter()
        .filter(|(op, _)| *op == StackOp::Delete)
        .map(|(_, stack)| stack)
        .collect();
    assert_eq!(
        deleted,
        vec![
            "modstack-eventbus-dev",
            "modstack-deployment-helper-dev",
            "modstack-deployment-helper-vpc-dev",
            "modstack-kms-dev",
            "modstack-vpc-dev",
        ]
    );
    assert_eq!(answers.get_str("eventBus", "arn"), None);
    assert_eq!(answers.get_str("vpc", "id"), None);
    assert!(answers.modules.is_empty());
    assert_eq!(answers.get_str("s3", "bucket"), Some("artifacts"));
}

#[test]
fn test_builtin_preview_makes_no_calls() {
    let registry = builtin_registry(&ModuleSettings::new("dev", "/src")).unwrap();
    let client = builtin_client();
    let answers = builtin_answers();

    let lines = plan::preview_install(&registry, &registry.names(), &answers).unwrap();

    assert_eq!(lines.len(), 10);
    assert!(lines
        .iter()
        .filter(|l| l.title.contains("deployment-helper-vpc"))
        .all(|l| l.skipped));
    assert!(client.calls().is_empty());
}

#[test]
fn test_builtin_validation_runs_before_any_task() {
    let registry = builtin_registry(&ModuleSettings::new("dev", "/src")).unwrap();
    let client = builtin_client();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);

    // No s3.bucket: the deployment helper cannot be packaged
    let err = orchestrator.install(&registry.names(), &mut answers()).unwrap_err();

    assert!(err.is_configuration());
    assert!(client.calls().is_empty());
}

#[test]
fn test_builtin_delete_dependent_leaves_dependency_installed() {
    let registry = builtin_registry(&ModuleSettings::new("dev", "/src")).unwrap();
    let client = builtin_client();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);
    let mut answers = builtin_answers();

    orchestrator.install(&names(&["kms", "eventBus"]), &mut answers).unwrap();
    let outcome = orchestrator.delete(&names(&["eventBus"]), &mut answers).unwrap();

    assert!(outcome.is_success());
    assert!(client.exists("modstack-kms-dev"));
    assert!(!client.exists("modstack-eventbus-dev"));
    assert_eq!(answers.modules, names(&["kms"]));
    assert_eq!(answers.get_str("kms", "id"), Some("key-1"));
    assert_eq!(answers.get_str("eventBus", "arn"), None);
}

#[test]
fn test_builtin_delete_refuses_dependency_of_installed_module() {
    let registry = builtin_registry(&ModuleSettings::new("dev", "/src")).unwrap();
    let client = builtin_client();
    let sink = RecordingSink::new();
    let mut orchestrator = Orchestrator::new(&registry, &client, &sink);
    let mut answers = builtin_answers();

    orchestrator.install(&names(&["kms", "eventBus"]), &mut answers).unwrap();

    let err = plan::preview_delete(&registry, &names(&["kms"]), &answers).unwrap_err();
    assert!(err.is_configuration());

    let err = orchestrator.delete(&names(&["kms"]), &mut answers).unwrap_err();
    assert!(matches!(
        err,
        InstallerError::RequiredBy { ref module, ref dependent }
            if module.as_str() == "kms" && dependent.as_str() == "eventBus"
    ));
    assert_eq!(client.count(StackOp::Delete), 0);
    assert!(client.exists("modstack-kms-dev"));
    assert_eq!(answers.modules, names(&["kms", "eventBus"]));
}
