use super::{package_command, INSTALL_RUNTIME};
use crate::config::ProvisionConfig;
use crate::domain::model::{CommandSpec, ProvisionContext, StepResult};
use crate::domain::ports::{run_checked, CommandRunner, ProvisionStep, Storage};
use crate::utils::error::Result;
use std::sync::Arc;

/// 安裝 Python 執行環境與 pip，並確認兩者可用
pub struct InstallRuntimeStep<S: Storage> {
    config: Arc<ProvisionConfig>,
    runner: Arc<dyn CommandRunner>,
    storage: S,
}

impl<S: Storage> InstallRuntimeStep<S> {
    pub fn new(config: Arc<ProvisionConfig>, runner: Arc<dyn CommandRunner>, storage: S) -> Self {
        Self {
            config,
            runner,
            storage,
        }
    }

    /// `<venv>/bin` 已存在即視為可重用
    async fn venv_exists(&self) -> bool {
        match self.config.runtime.venv.as_deref() {
            Some(venv) => self.storage.exists(&venv.join("bin")).await,
            None => false,
        }
    }

    fn install_command(&self) -> CommandSpec {
        package_command(
            &self.config,
            ["install".to_string(), "-y".to_string()]
                .into_iter()
                .chain(self.config.runtime.packages.iter().cloned()),
        )
    }

    fn venv_command(&self) -> Option<CommandSpec> {
        self.config.venv_path().map(|venv| {
            CommandSpec::new(self.config.runtime.python.clone())
                .args(["-m".to_string(), "venv".to_string(), venv.display().to_string()])
        })
    }

    fn version_commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new(self.config.runtime.python.clone())
                .arg("--version")
                .capture(),
            CommandSpec::new(self.config.pip_program())
                .arg("--version")
                .capture(),
        ]
    }
}

#[async_trait::async_trait]
impl<S: Storage + 'static> ProvisionStep for InstallRuntimeStep<S> {
    fn name(&self) -> &str {
        INSTALL_RUNTIME
    }

    fn describe(&self) -> Vec<String> {
        let mut actions = vec![format!("run: {}", self.install_command())];
        if let Some(venv) = self.venv_command() {
            actions.push(format!("run (if missing): {}", venv));
        }
        actions.extend(
            self.version_commands()
                .iter()
                .map(|c| format!("check: {}", c)),
        );
        actions
    }

    async fn execute(&self, _context: &ProvisionContext) -> Result<StepResult> {
        let install = self.install_command();
        tracing::info!("🐍 {}", install.command_line());
        run_checked(self.runner.as_ref(), &install).await?;

        let mut venv_created = false;
        if let (Some(venv_path), Some(command)) = (self.config.venv_path(), self.venv_command()) {
            if self.venv_exists().await {
                tracing::info!("🐍 Reusing virtualenv at {}", venv_path.display());
            } else {
                tracing::info!("🐍 Creating virtualenv at {}", venv_path.display());
                run_checked(self.runner.as_ref(), &command).await?;
                venv_created = true;
            }
        }

        let mut versions = Vec::new();
        for command in self.version_commands() {
            let output = run_checked(self.runner.as_ref(), &command).await?;
            let version = output.stdout.trim().to_string();
            tracing::info!("✅ {}: {}", command.program, version);
            versions.push(serde_json::Value::String(version));
        }

        Ok(StepResult::applied(INSTALL_RUNTIME)
            .with_metadata("versions", serde_json::Value::Array(versions))
            .with_metadata("venv_created", serde_json::Value::Bool(venv_created))
            .with_metadata(
                "pip",
                serde_json::Value::String(self.config.pip_program()),
            ))
    }
}
