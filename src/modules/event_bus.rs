//! Event bus module. Encrypted with the key from `kms`; wires in the
//! deployment helper lambda when that module is part of the run.

use crate::answers::Answers;
use crate::engine::Task;
use crate::module::{InstallModule, ModuleInfo};
use crate::stack::DeployRequest;
use crate::types::Capability;

use super::{delete_task, deploy_task, deployment_helper, harvest_task, kms, template, ModuleSettings};

pub const NAME: &str = "eventBus";

pub struct EventBusModule {
    info: ModuleInfo,
    settings: ModuleSettings,
    stack_name: String,
}

impl EventBusModule {
    pub fn new(settings: &ModuleSettings) -> Self {
        Self {
            info: ModuleInfo::new(NAME, "Event Bus")
                .mandatory([kms::NAME])
                .optional([deployment_helper::NAME]),
            settings: settings.clone(),
            stack_name: settings.stack_name("eventbus"),
        }
    }
}

impl InstallModule for EventBusModule {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn plan_install(&self, answers: &Answers) -> Vec<Task> {
        let mut request = DeployRequest::new(&self.stack_name, template("cfn-eventbus.yaml"))
            .parameter("Environment", &answers.environment)
            .capability(Capability::Iam)
            .working_dir(self.settings.component_dir("eventbus"));

        if let Some(key) = answers.get_str(kms::NAME, "id") {
            request = request.parameter("KmsKeyId", key);
        }
        if let Some(arn) = answers.get_str(deployment_helper::NAME, "lambdaArn") {
            request = request.parameter("CustomResourceLambdaArn", arn);
        }

        vec![
            deploy_task(self.name(), request),
            harvest_task(self.name(), self.stack_name.clone(), &[("EventBusArn", "arn")]),
        ]
    }

    fn plan_delete(&self, _answers: &Answers) -> Vec<Task> {
        vec![delete_task(self.name(), self.stack_name.clone(), &["arn"])]
    }
}
