//! Network module.
//!
//! Either adopts an existing VPC supplied as `vpc.id` (with its security
//! group and subnets) or deploys one and records the same keys from the
//! stack outputs.

use crate::answers::Answers;
use crate::engine::Task;
use crate::error::{InstallerError, Result};
use crate::module::{InstallModule, ModuleInfo};
use crate::stack::DeployRequest;
use crate::types::Capability;

use super::{delete_task, deploy_task, harvest_task, template, ModuleSettings};

pub const NAME: &str = "vpc";

const OUTPUTS: &[(&str, &str)] = &[
    ("VpcId", "id"),
    ("SecurityGroupId", "securityGroupId"),
    ("PrivateSubnetIds", "privateSubnetIds"),
    ("PublicSubnetIds", "publicSubnetIds"),
];

const HARVESTED: &[&str] = &["id", "securityGroupId", "privateSubnetIds", "publicSubnetIds"];

pub struct VpcModule {
    info: ModuleInfo,
    settings: ModuleSettings,
    stack_name: String,
}

impl VpcModule {
    pub fn new(settings: &ModuleSettings) -> Self {
        Self {
            info: ModuleInfo::new(NAME, "Networking"),
            settings: settings.clone(),
            stack_name: settings.stack_name("vpc"),
        }
    }

    /// An id is present but this module never deployed a stack for it.
    fn is_existing(&self, answers: &Answers) -> bool {
        let Some(ns) = answers.namespace(NAME) else {
            return false;
        };
        ns.get_str("id").is_some() && ns.stack_fingerprint(&self.stack_name).is_none()
    }
}

impl InstallModule for VpcModule {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn validate(&self, answers: &Answers) -> Result<()> {
        if self.is_existing(answers) {
            for key in ["securityGroupId", "privateSubnetIds"] {
                if answers.get_str(NAME, key).is_none() {
                    return Err(InstallerError::configuration(
                        self.name(),
                        format!("an existing VPC requires vpc.{} as well", key),
                    ));
                }
            }
        }
        Ok(())
    }

    fn plan_install(&self, answers: &Answers) -> Vec<Task> {
        if self.is_existing(answers) {
            tracing::info!(vpc = ?answers.get_str(NAME, "id"), "using existing VPC");
            return Vec::new();
        }

        let request = DeployRequest::new(&self.stack_name, template("cfn-networking.yaml"))
            .parameter("Environment", &answers.environment)
            .capability(Capability::NamedIam)
            .working_dir(self.settings.component_dir("networking"));

        vec![
            deploy_task(self.name(), request),
            harvest_task(self.name(), self.stack_name.clone(), OUTPUTS),
        ]
    }

    fn plan_delete(&self, answers: &Answers) -> Vec<Task> {
        if self.is_existing(answers) {
            return Vec::new();
        }
        vec![delete_task(self.name(), self.stack_name.clone(), HARVESTED)]
    }
}
