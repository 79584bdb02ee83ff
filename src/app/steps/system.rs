use super::{package_command, UPGRADE_SYSTEM};
use crate::config::ProvisionConfig;
use crate::domain::model::{CommandSpec, ProvisionContext, StepResult};
use crate::domain::ports::{run_checked, CommandRunner, ProvisionStep};
use crate::utils::error::Result;
use std::sync::Arc;

/// 更新套件索引並升級已安裝套件
pub struct UpgradeSystemStep {
    config: Arc<ProvisionConfig>,
    runner: Arc<dyn CommandRunner>,
}

impl UpgradeSystemStep {
    pub fn new(config: Arc<ProvisionConfig>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            package_command(&self.config, ["update"]),
            package_command(&self.config, ["upgrade", "-y"]),
        ]
    }
}

#[async_trait::async_trait]
impl ProvisionStep for UpgradeSystemStep {
    fn name(&self) -> &str {
        UPGRADE_SYSTEM
    }

    fn describe(&self) -> Vec<String> {
        self.commands().iter().map(|c| format!("run: {}", c)).collect()
    }

    async fn execute(&self, _context: &ProvisionContext) -> Result<StepResult> {
        for command in self.commands() {
            tracing::info!("📦 {}", command.command_line());
            run_checked(self.runner.as_ref(), &command).await?;
        }
        Ok(StepResult::applied(UPGRADE_SYSTEM))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ScriptedRunner;

    #[tokio::test]
    async fn test_update_runs_before_upgrade() {
        let runner = Arc::new(ScriptedRunner::new());
        let step = UpgradeSystemStep::new(Arc::new(ProvisionConfig::default()), runner.clone());

        step.execute(&ProvisionContext::new("test".to_string()))
            .await
            .unwrap();

        assert_eq!(
            runner.command_lines(),
            vec!["apt-get update", "apt-get upgrade -y"]
        );
    }

    #[tokio::test]
    async fn test_failed_update_stops_upgrade() {
        let runner = Arc::new(ScriptedRunner::new().fail_on("apt-get update", 100));
        let step = UpgradeSystemStep::new(Arc::new(ProvisionConfig::default()), runner.clone());

        let result = step.execute(&ProvisionContext::new("test".to_string())).await;

        assert!(result.is_err());
        assert!(!runner.ran("apt-get upgrade"));
    }
}
