use crate::domain::model::{CommandOutput, CommandSpec};
use crate::domain::ports::CommandRunner;
use crate::utils::error::{ProvisionError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// 以真實子程序執行命令
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    working_dir: Option<PathBuf>,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(if command.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        if command.capture_output {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        let mut child = cmd.spawn().map_err(|source| ProvisionError::CommandSpawnError {
            program: command.program.clone(),
            source,
        })?;

        if let Some(input) = &command.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input).await?;
                stdin.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;
        tracing::debug!("◀️ {} -> {:?}", command.command_line(), output.status.code());

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// 不啟動子程序，只記錄呼叫並依命令前綴回傳預設結果
///
/// 沒有符合的前綴時回傳成功（結束碼 0）。
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: Vec<(String, CommandOutput)>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// 命令列以 `prefix` 開頭時回傳 `output`，先登記者優先
    pub fn respond(mut self, prefix: &str, output: CommandOutput) -> Self {
        self.responses.push((prefix.to_string(), output));
        self
    }

    pub fn fail_on(self, prefix: &str, code: i32) -> Self {
        self.respond(prefix, CommandOutput::failure(code))
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::command_line).collect()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.command_lines().iter().any(|line| line.starts_with(prefix))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(command.clone());

        let line = command.command_line();
        let output = self
            .responses
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(CommandOutput::success);

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::run_checked;

    #[tokio::test]
    async fn test_scripted_runner_records_and_matches_prefix() {
        let runner = ScriptedRunner::new()
            .fail_on("pip3 install -r bots/storage_bot", 1)
            .respond(
                "systemctl is-active",
                CommandOutput::success().with_stdout("active\n"),
            );

        let ok = runner
            .run(&CommandSpec::new("pip3").args(["install", "-r", "backend/requirements.txt"]))
            .await
            .unwrap();
        assert!(ok.is_success());

        let failed = runner
            .run(&CommandSpec::new("pip3").args([
                "install",
                "-r",
                "bots/storage_bot/requirements.txt",
            ]))
            .await
            .unwrap();
        assert_eq!(failed.code, Some(1));

        let active = runner
            .run(&CommandSpec::new("systemctl").args(["is-active", "mongod"]))
            .await
            .unwrap();
        assert_eq!(active.stdout.trim(), "active");

        assert_eq!(runner.calls().len(), 3);
        assert!(runner.ran("pip3 install -r backend"));
        assert!(!runner.ran("apt-get"));
    }

    #[tokio::test]
    async fn test_run_checked_converts_failure() {
        let runner = ScriptedRunner::new().fail_on("apt-get upgrade", 100);
        let spec = CommandSpec::new("apt-get").args(["upgrade", "-y"]);

        let err = run_checked(&runner, &spec).await.unwrap_err();
        match err {
            ProvisionError::CommandFailed { command, code } => {
                assert_eq!(command, "apt-get upgrade -y");
                assert_eq!(code, Some(100));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_pipes_stdin_and_captures() {
        let runner = SystemRunner::new();
        let spec = CommandSpec::new("cat").stdin(b"key material".to_vec()).capture();

        let output = runner.run(&spec).await.unwrap();
        assert!(output.is_success());
        assert_eq!(output.stdout, "key material");
    }

    #[tokio::test]
    async fn test_system_runner_reports_missing_program() {
        let runner = SystemRunner::new();
        let spec = CommandSpec::new("definitely-not-a-real-program-4242");

        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, ProvisionError::CommandSpawnError { .. }));
    }
}
