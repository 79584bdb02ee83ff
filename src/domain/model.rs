use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 一次子程序呼叫的描述
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
    /// true 時擷取 stdout/stderr，否則直接繼承終端輸出
    pub capture_output: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: Vec<u8>) -> Self {
        self.stdin = Some(input);
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture_output = true;
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, value)?;
        }
        f.write_str(&self.command_line())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Self::default()
        }
    }

    pub fn failure(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

/// 受 systemd 管理的服務定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub directory: PathBuf,
    #[serde(default = "default_manifest")]
    pub manifest: String,
    pub unit: String,
}

fn default_manifest() -> String {
    "requirements.txt".to_string()
}

impl ServiceDefinition {
    pub fn new(name: &str, directory: &str, unit: &str) -> Self {
        Self {
            name: name.to_string(),
            directory: PathBuf::from(directory),
            manifest: default_manifest(),
            unit: unit.to_string(),
        }
    }

    /// 相對於專案根目錄的 manifest 路徑
    pub fn manifest_file(&self) -> PathBuf {
        self.directory.join(&self.manifest)
    }

    pub fn manifest_path(&self, root: &Path) -> PathBuf {
        root.join(self.manifest_file())
    }

    pub fn unit_file_name(&self) -> String {
        format!("{}.service", self.unit)
    }
}

/// `.env` 已存在時的處理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum EnvPolicy {
    #[default]
    KeepExisting,
    FailIfExists,
    Overwrite,
    Merge,
}

impl fmt::Display for EnvPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnvPolicy::KeepExisting => "keep-existing",
            EnvPolicy::FailIfExists => "fail-if-exists",
            EnvPolicy::Overwrite => "overwrite",
            EnvPolicy::Merge => "merge",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// 主機狀態已被修改
    Applied,
    /// 目標狀態已存在，未做任何變更
    Unchanged,
}

/// 單一步驟的執行結果
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_name: String,
    pub outcome: StepOutcome,
    pub duration: Duration,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StepResult {
    pub fn applied(step_name: &str) -> Self {
        Self {
            step_name: step_name.to_string(),
            outcome: StepOutcome::Applied,
            duration: Duration::ZERO,
            metadata: HashMap::new(),
        }
    }

    pub fn unchanged(step_name: &str) -> Self {
        Self {
            outcome: StepOutcome::Unchanged,
            ..Self::applied(step_name)
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// 步驟之間共享的執行上下文
#[derive(Debug, Clone)]
pub struct ProvisionContext {
    pub execution_id: String,
    completed_steps: HashSet<String>,
}

impl ProvisionContext {
    pub fn new(execution_id: String) -> Self {
        Self {
            execution_id,
            completed_steps: HashSet::new(),
        }
    }

    /// 帶入先前執行已完成的步驟（續跑）
    pub fn with_completed<I>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.completed_steps.extend(steps);
        self
    }

    pub fn is_completed(&self, step_name: &str) -> bool {
        self.completed_steps.contains(step_name)
    }

    pub fn mark_completed(&mut self, step_name: &str) {
        self.completed_steps.insert(step_name.to_string());
    }
}
