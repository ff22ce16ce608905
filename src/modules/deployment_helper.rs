//! Deployment helper module.
//!
//! Deploys the custom resource lambda other stacks use during deployment,
//! plus a VPC-attached variant when a VPC is known. Lambda code is packaged
//! into the artifacts bucket `s3.bucket`, so that key is required whenever
//! this module deploys.
//!
//! Setting `deploymentHelper.deploy` to `false` skips both deploys and only
//! reads the outputs of stacks deployed elsewhere.

use crate::answers::Answers;
use crate::engine::Task;
use crate::error::{InstallerError, Result};
use crate::module::{InstallModule, ModuleInfo};
use crate::stack::DeployRequest;
use crate::types::Capability;

use super::{delete_task, deploy_task, harvest_task, template, vpc, ModuleSettings};

pub const NAME: &str = "deploymentHelper";

const COMPONENT: &str = "deployment-helper";

pub struct DeploymentHelperModule {
    info: ModuleInfo,
    settings: ModuleSettings,
    stack_name: String,
    vpc_stack_name: String,
}

impl DeploymentHelperModule {
    pub fn new(settings: &ModuleSettings) -> Self {
        Self {
            info: ModuleInfo::new(NAME, "Deployment Helper").optional([vpc::NAME]),
            settings: settings.clone(),
            stack_name: settings.stack_name("deployment-helper"),
            vpc_stack_name: settings.stack_name("deployment-helper-vpc"),
        }
    }

    fn deploys(answers: &Answers) -> bool {
        answers
            .namespace(NAME)
            .and_then(|ns| ns.get_bool("deploy"))
            .unwrap_or(true)
    }

    fn request(&self, stack_name: &str, file: &str, bucket: &str, answers: &Answers) -> DeployRequest {
        DeployRequest::new(stack_name, template(file))
            .parameter("Environment", &answers.environment)
            .parameter("ArtifactsBucket", bucket)
            .capability(Capability::NamedIam)
            .artifacts_bucket(bucket)
            .working_dir(self.settings.component_dir(COMPONENT))
    }
}

fn vpc_unknown(answers: &Answers) -> bool {
    answers.get_str(vpc::NAME, "id").is_none()
}

impl InstallModule for DeploymentHelperModule {
    fn info(&self) -> &ModuleInfo {
        &self.info
    }

    fn validate(&self, answers: &Answers) -> Result<()> {
        if Self::deploys(answers) && answers.get_str("s3", "bucket").is_none() {
            return Err(InstallerError::configuration(
                self.name(),
                "s3.bucket is required to package the deployment helper",
            ));
        }
        Ok(())
    }

    fn plan_install(&self, answers: &Answers) -> Vec<Task> {
        let mut tasks = Vec::new();

        if Self::deploys(answers) {
            let bucket = answers.get_str("s3", "bucket").unwrap_or_default();
            tasks.push(deploy_task(
                self.name(),
                self.request(&self.stack_name, "cfn-deployment-helper.yaml", bucket, answers),
            ));

            let vpc_request = self
                .request(&self.vpc_stack_name, "cfn-deployment-helper-vpc.yaml", bucket, answers)
                .parameter("VpcId", answers.get_str(vpc::NAME, "id").unwrap_or("N/A"))
                .parameter(
                    "SecurityGroupId",
                    answers.get_str(vpc::NAME, "securityGroupId").unwrap_or("N/A"),
                )
                .parameter(
                    "PrivateSubnetIds",
                    answers.get_str(vpc::NAME, "privateSubnetIds").unwrap_or("N/A"),
                );
            tasks.push(deploy_task(self.name(), vpc_request).skip_if(vpc_unknown));
        }

        tasks.push(harvest_task(
            self.name(),
            self.stack_name.clone(),
            &[("CustomResourceLambdaArn", "lambdaArn")],
        ));
        tasks.push(
            harvest_task(
                self.name(),
                self.vpc_stack_name.clone(),
                &[("CustomResourceVpcLambdaArn", "vpcLambdaArn")],
            )
            .skip_if(vpc_unknown),
        );
        tasks
    }

    fn plan_delete(&self, _answers: &Answers) -> Vec<Task> {
        vec![
            delete_task(self.name(), self.stack_name.clone(), &["lambdaArn"]),
            delete_task(self.name(), self.vpc_stack_name.clone(), &["vpcLambdaArn"]),
        ]
    }
}
