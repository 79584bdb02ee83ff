use crate::domain::model::{CommandOutput, CommandSpec, ProvisionContext, StepResult};
use crate::utils::error::{ProvisionError, Result};
use async_trait::async_trait;
use std::path::Path;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &Path) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &Path,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn copy_file(
        &self,
        from: &Path,
        to: &Path,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &Path) -> impl std::future::Future<Output = bool> + Send;
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// 執行命令並回傳結果；非零結束碼不視為錯誤
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput>;
}

/// 執行命令，非零結束碼轉為 `CommandFailed`
pub async fn run_checked(runner: &dyn CommandRunner, command: &CommandSpec) -> Result<CommandOutput> {
    tracing::debug!("▶️ {}", command);
    let output = runner.run(command).await?;
    if output.is_success() {
        Ok(output)
    } else {
        Err(ProvisionError::CommandFailed {
            command: command.command_line(),
            code: output.code,
        })
    }
}

/// 一個可獨立重試的佈建步驟
#[async_trait]
pub trait ProvisionStep: Send + Sync {
    fn name(&self) -> &str;

    /// dry-run 時列出將執行的動作
    fn describe(&self) -> Vec<String>;

    /// 預設：之前已完成的步驟不再執行
    fn should_execute(&self, context: &ProvisionContext) -> bool {
        !context.is_completed(self.name())
    }

    async fn execute(&self, context: &ProvisionContext) -> Result<StepResult>;
}
