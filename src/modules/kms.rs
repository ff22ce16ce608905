//! Encryption key module. Adopts `kms.id` when supplied, otherwise deploys
//! a key stack and records its id.

use crate::answers::Answers;
use crate::engine::Task;
use crate::module::{InstallModule, ModuleInfo};
use crate::stack::DeployRequest;

use super::{delete_task, deploy_task, harvest_task, template, ModuleSettings};

pub const NAME: &str = "kms";

pub struct KmsModule {
    info: ModuleInfo,
    settings: ModuleSettings,
    stack_name: String,
}

impl KmsModule {
    pub fn new(settings: &ModuleSettings) -> Self {
        Self {
            info: ModuleInfo::new(NAME, "Encryption Key"),
            settings: settings.clone(),
            stack_name: settings.stack_name("kms"),
        }
    }

    fn is_existing(&self, answers: &Answers) -> bool {
        answers.namespace(NAME).is_some_and(|ns| {
            ns.get_str("id").is_some() && ns.stack_fingerprint(&self.stack_name).is_none()
        })
    }
}

impl InstallModule for KmsModule {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn plan_install(&self, answers: &Answers) -> Vec<Task> {
        if self.is_existing(answers) {
            return Vec::new();
        }

        let request = DeployRequest::new(&self.stack_name, template("cfn-kms.yaml"))
            .parameter("Environment", &answers.environment)
            .working_dir(self.settings.component_dir("kms"));

        vec![
            deploy_task(self.name(), request),
            harvest_task(self.name(), self.stack_name.clone(), &[("KmsKeyId", "id")]),
        ]
    }

    fn plan_delete(&self, answers: &Answers) -> Vec<Task> {
        if self.is_existing(answers) {
            return Vec::new();
        }
        vec![delete_task(self.name(), self.stack_name.clone(), &["id"])]
    }
}
