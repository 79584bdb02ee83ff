use super::INSTALL_DEPENDENCIES;
use crate::config::ProvisionConfig;
use crate::domain::model::{CommandSpec, ProvisionContext, ServiceDefinition, StepResult};
use crate::domain::ports::{run_checked, CommandRunner, ProvisionStep, Storage};
use crate::utils::error::{ProvisionError, Result};
use std::sync::Arc;

/// 安裝單一服務目錄的相依套件 manifest
pub struct InstallDependenciesStep<S: Storage> {
    name: String,
    service: ServiceDefinition,
    config: Arc<ProvisionConfig>,
    runner: Arc<dyn CommandRunner>,
    storage: S,
}

impl<S: Storage> InstallDependenciesStep<S> {
    pub fn new(
        service: ServiceDefinition,
        config: Arc<ProvisionConfig>,
        runner: Arc<dyn CommandRunner>,
        storage: S,
    ) -> Self {
        Self {
            name: step_name(&service),
            service,
            config,
            runner,
            storage,
        }
    }

    fn install_command(&self) -> CommandSpec {
        let manifest = self.service.manifest_path(&self.config.project.root);
        CommandSpec::new(self.config.pip_program()).args([
            "install".to_string(),
            "-r".to_string(),
            manifest.display().to_string(),
        ])
    }
}

pub fn step_name(service: &ServiceDefinition) -> String {
    format!("{}:{}", INSTALL_DEPENDENCIES, service.name)
}

#[async_trait::async_trait]
impl<S: Storage + 'static> ProvisionStep for InstallDependenciesStep<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> Vec<String> {
        vec![
            format!("check: {} exists", self.service.manifest_file().display()),
            format!("run: {}", self.install_command()),
        ]
    }

    async fn execute(&self, _context: &ProvisionContext) -> Result<StepResult> {
        if !self.storage.exists(&self.service.manifest_file()).await {
            return Err(ProvisionError::ManifestMissing {
                service: self.service.name.clone(),
                path: self.service.manifest_path(&self.config.project.root),
            });
        }

        let command = self.install_command();
        tracing::info!("📚 [{}] {}", self.service.name, command.command_line());
        run_checked(self.runner.as_ref(), &command).await?;

        Ok(StepResult::applied(&self.name).with_metadata(
            "manifest",
            serde_json::Value::String(self.service.manifest_file().display().to_string()),
        ))
    }
}
