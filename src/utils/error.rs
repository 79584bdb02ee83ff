use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Env file parse error: {0}")]
    DotenvError(#[from] dotenvy::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Failed to launch '{program}': {source}")]
    CommandSpawnError {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' exited with {}", describe_code(.code))]
    CommandFailed { command: String, code: Option<i32> },

    #[error("Signing key download from {url} returned HTTP {status}")]
    KeyDownloadError { url: String, status: u16 },

    #[error("Service '{service}' is not {expected} (reported: {reported})")]
    DaemonInactive {
        service: String,
        expected: String,
        reported: String,
        code: Option<i32>,
    },

    #[error("Dependency manifest for '{service}' not found at {}", .path.display())]
    ManifestMissing { service: String, path: PathBuf },

    #[error("Configuration template not found at {}", .path.display())]
    TemplateMissing { path: PathBuf },

    #[error("Configuration file already exists at {}", .path.display())]
    ConfigExists { path: PathBuf },

    #[error("Supervisor unit '{unit}' not found at {}", .path.display())]
    UnitMissing { unit: String, path: PathBuf },

    #[error("State file error at {}: {message}", .path.display())]
    StateError { path: PathBuf, message: String },

    #[error("Unsupported platform: {os}")]
    UnsupportedPlatform { os: String },

    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<ProvisionError>,
    },
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    ProjectLayout,
    Network,
    Subprocess,
    Host,
    State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl ProvisionError {
    /// 取得最內層的錯誤（跳過 StepFailed 包裝）
    pub fn root_cause(&self) -> &ProvisionError {
        match self {
            ProvisionError::StepFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// 失敗的步驟名稱（如果有）
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            ProvisionError::StepFailed { step, .. } => Some(step.as_str()),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.root_cause() {
            ProvisionError::ConfigValidationError { .. }
            | ProvisionError::InvalidConfigValueError { .. }
            | ProvisionError::MissingConfigError { .. }
            | ProvisionError::ConfigExists { .. }
            | ProvisionError::DotenvError(_) => ErrorCategory::Configuration,
            ProvisionError::ManifestMissing { .. }
            | ProvisionError::TemplateMissing { .. }
            | ProvisionError::UnitMissing { .. } => ErrorCategory::ProjectLayout,
            ProvisionError::HttpError(_) | ProvisionError::KeyDownloadError { .. } => {
                ErrorCategory::Network
            }
            ProvisionError::CommandFailed { .. } | ProvisionError::DaemonInactive { .. } => {
                ErrorCategory::Subprocess
            }
            ProvisionError::StateError { .. } | ProvisionError::SerializationError(_) => {
                ErrorCategory::State
            }
            ProvisionError::IoError(_)
            | ProvisionError::CommandSpawnError { .. }
            | ProvisionError::UnsupportedPlatform { .. }
            | ProvisionError::StepFailed { .. } => ErrorCategory::Host,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration | ErrorCategory::ProjectLayout => ErrorSeverity::High,
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Subprocess | ErrorCategory::State => ErrorSeverity::High,
            ErrorCategory::Host => ErrorSeverity::Critical,
        }
    }

    /// 程序結束碼：子程序失敗時沿用其結束碼，其餘依嚴重程度
    pub fn exit_code(&self) -> i32 {
        match self.root_cause() {
            ProvisionError::CommandFailed { code, .. }
            | ProvisionError::DaemonInactive { code, .. } => {
                return match code {
                    Some(code) if *code != 0 => *code,
                    _ => 1,
                };
            }
            _ => {}
        }

        match self.severity() {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self.root_cause() {
            ProvisionError::ConfigValidationError { .. }
            | ProvisionError::InvalidConfigValueError { .. }
            | ProvisionError::MissingConfigError { .. } => {
                "Check the provisioning TOML file and command line flags".to_string()
            }
            ProvisionError::ConfigExists { path } => format!(
                "Remove {} or rerun with --env-policy keep-existing, merge or overwrite",
                path.display()
            ),
            ProvisionError::DotenvError(_) => {
                "Fix the syntax of the .env file (KEY=VALUE per line)".to_string()
            }
            ProvisionError::ManifestMissing { path, .. } => {
                format!("Create {} or fix the service directory in the config", path.display())
            }
            ProvisionError::TemplateMissing { path } => {
                format!("Add the template file {}", path.display())
            }
            ProvisionError::UnitMissing { path, .. } => {
                format!("Add the unit definition {}", path.display())
            }
            ProvisionError::HttpError(_) | ProvisionError::KeyDownloadError { .. } => {
                "Check network access to the database vendor and rerun; completed steps are skipped"
                    .to_string()
            }
            ProvisionError::CommandFailed { .. } => {
                "Inspect the command output above, fix the cause and rerun to resume".to_string()
            }
            ProvisionError::CommandSpawnError { program, .. } => {
                format!("Make sure '{}' is installed and on PATH", program)
            }
            ProvisionError::DaemonInactive { service, .. } => {
                format!("Inspect 'journalctl -u {}' and rerun", service)
            }
            ProvisionError::StateError { path, .. } => format!(
                "Delete {} or rerun with --fresh to start over",
                path.display()
            ),
            ProvisionError::SerializationError(_) => {
                "Rerun with --fresh to discard the corrupted state file".to_string()
            }
            ProvisionError::UnsupportedPlatform { .. } => {
                "Run on a Linux host, or pass --skip-preflight at your own risk".to_string()
            }
            ProvisionError::IoError(_) | ProvisionError::StepFailed { .. } => {
                "Check file permissions; provisioning usually needs root".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.failed_step() {
            Some(step) => format!("Provisioning stopped at step '{}': {}", step, self.root_cause()),
            None => format!("Provisioning failed: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failed_unwraps_to_root_cause() {
        let err = ProvisionError::StepFailed {
            step: "install_dependencies:storage_bot".to_string(),
            source: Box::new(ProvisionError::CommandFailed {
                command: "pip3 install -r bots/storage_bot/requirements.txt".to_string(),
                code: Some(1),
            }),
        };

        assert_eq!(err.failed_step(), Some("install_dependencies:storage_bot"));
        assert_eq!(err.category(), ErrorCategory::Subprocess);
        assert!(matches!(err.root_cause(), ProvisionError::CommandFailed { .. }));
        assert!(err
            .user_friendly_message()
            .contains("install_dependencies:storage_bot"));
    }

    #[test]
    fn test_exit_code_follows_subprocess() {
        let err = ProvisionError::CommandFailed {
            command: "apt-get upgrade -y".to_string(),
            code: Some(100),
        };
        assert_eq!(err.exit_code(), 100);

        let killed = ProvisionError::CommandFailed {
            command: "apt-get upgrade -y".to_string(),
            code: None,
        };
        assert_eq!(killed.exit_code(), 1);

        let inactive = ProvisionError::DaemonInactive {
            service: "mongod".to_string(),
            expected: "active".to_string(),
            reported: "failed".to_string(),
            code: Some(3),
        };
        assert_eq!(inactive.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_by_severity() {
        let config = ProvisionError::MissingConfigError {
            field: "services".to_string(),
        };
        assert_eq!(config.exit_code(), 1);

        let network = ProvisionError::KeyDownloadError {
            url: "https://example.com/key.asc".to_string(),
            status: 503,
        };
        assert_eq!(network.severity(), ErrorSeverity::Medium);
        assert_eq!(network.exit_code(), 2);

        let host = ProvisionError::UnsupportedPlatform {
            os: "macos".to_string(),
        };
        assert_eq!(host.exit_code(), 3);

        let spawn = ProvisionError::CommandSpawnError {
            program: "gpg".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(spawn.category(), ErrorCategory::Host);
        assert_eq!(spawn.exit_code(), 3);
    }
}
