use super::REGISTER_SUPERVISOR_UNITS;
use crate::config::ProvisionConfig;
use crate::domain::model::{CommandSpec, ProvisionContext, StepResult};
use crate::domain::ports::{run_checked, CommandRunner, ProvisionStep, Storage};
use crate::utils::error::{ProvisionError, Result};
use std::sync::Arc;

/// 複製 unit 檔到 systemd 目錄並重新載入；不會 enable 或 start
pub struct RegisterSupervisorUnitsStep<S: Storage> {
    config: Arc<ProvisionConfig>,
    runner: Arc<dyn CommandRunner>,
    storage: S,
}

impl<S: Storage> RegisterSupervisorUnitsStep<S> {
    pub fn new(config: Arc<ProvisionConfig>, runner: Arc<dyn CommandRunner>, storage: S) -> Self {
        Self {
            config,
            runner,
            storage,
        }
    }

    fn reload_command(&self) -> CommandSpec {
        CommandSpec::new(self.config.supervisor.systemctl.clone()).arg("daemon-reload")
    }
}

/// 佈建完成後需由操作者手動執行的命令
pub fn follow_up_commands(config: &ProvisionConfig) -> Vec<String> {
    config
        .services
        .iter()
        .map(|s| format!("{} enable --now {}", config.supervisor.systemctl, s.unit))
        .collect()
}

#[async_trait::async_trait]
impl<S: Storage + 'static> ProvisionStep for RegisterSupervisorUnitsStep<S> {
    fn name(&self) -> &str {
        REGISTER_SUPERVISOR_UNITS
    }

    fn describe(&self) -> Vec<String> {
        let mut actions: Vec<String> = self
            .config
            .services
            .iter()
            .map(|service| {
                format!(
                    "copy: {} -> {}",
                    self.config.unit_source(service).display(),
                    self.config.unit_destination(service).display()
                )
            })
            .collect();
        actions.push(format!("run: {}", self.reload_command()));
        actions
    }

    async fn execute(&self, _context: &ProvisionContext) -> Result<StepResult> {
        // 先確認全部 unit 檔都在，再開始複製
        for service in &self.config.services {
            let source = self.config.unit_source(service);
            if !self.storage.exists(&source).await {
                return Err(ProvisionError::UnitMissing {
                    unit: service.unit.clone(),
                    path: self.config.project_path(&source),
                });
            }
        }

        let mut units = Vec::with_capacity(self.config.services.len());
        for service in &self.config.services {
            let destination = self.config.unit_destination(service);
            self.storage
                .copy_file(&self.config.unit_source(service), &destination)
                .await?;
            tracing::info!("🧩 Installed {}", destination.display());
            units.push(serde_json::Value::String(service.unit.clone()));
        }

        run_checked(self.runner.as_ref(), &self.reload_command()).await?;
        tracing::info!("🔄 Supervisor unit index reloaded");

        let follow_up = follow_up_commands(&self.config);
        for command in &follow_up {
            tracing::info!("👉 Next: {}", command);
        }

        Ok(StepResult::applied(REGISTER_SUPERVISOR_UNITS)
            .with_metadata("units", serde_json::Value::Array(units))
            .with_metadata(
                "follow_up",
                serde_json::Value::Array(
                    follow_up.into_iter().map(serde_json::Value::String).collect(),
                ),
            ))
    }
}
