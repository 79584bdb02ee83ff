use crate::domain::model::{EnvPolicy, ServiceDefinition};
use crate::utils::error::{ProvisionError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 佈建設定；每個區段都有預設值，TOML 檔只需覆寫差異
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub env: EnvConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub preflight: PreflightConfig,
    #[serde(default = "default_services")]
    pub services: Vec<ServiceDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub root: PathBuf,
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub package_manager: String,
    pub noninteractive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub packages: Vec<String>,
    pub python: String,
    pub pip: String,
    /// 設定後會建立 virtualenv，並改用其中的 pip
    pub venv: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub key_url: String,
    pub keyring_path: PathBuf,
    pub repo_file: PathBuf,
    pub repo_line: String,
    pub package: String,
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub template: PathBuf,
    pub target: PathBuf,
    pub policy: EnvPolicy,
    pub required_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub units_source_dir: PathBuf,
    pub unit_dir: PathBuf,
    pub systemctl: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    pub min_free_disk_mb: u64,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            state_file: PathBuf::from(".provision-state.json"),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            package_manager: "apt-get".to_string(),
            noninteractive: true,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            packages: vec![
                "python3".to_string(),
                "python3-pip".to_string(),
                "python3-venv".to_string(),
            ],
            python: "python3".to_string(),
            pip: "pip3".to_string(),
            venv: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            key_url: "https://www.mongodb.org/static/pgp/server-7.0.asc".to_string(),
            keyring_path: PathBuf::from("/usr/share/keyrings/mongodb-server-7.0.gpg"),
            repo_file: PathBuf::from("/etc/apt/sources.list.d/mongodb-org-7.0.list"),
            repo_line: "deb [ arch=amd64,arm64 signed-by=/usr/share/keyrings/mongodb-server-7.0.gpg ] \
                        https://repo.mongodb.org/apt/ubuntu jammy/mongodb-org/7.0 multiverse"
                .to_string(),
            package: "mongodb-org".to_string(),
            service: "mongod".to_string(),
        }
    }
}

/// 後端與三個 bot 會讀取的環境變數
pub const DEFAULT_REQUIRED_ENV_KEYS: &[&str] = &[
    "MONGODB_URI",
    "MONGODB_NAME",
    "API_KEY",
    "JWT_SECRET",
    "BACKEND_URL",
    "STORAGE_BOT_TOKEN",
    "CONTROL_BOT_TOKEN",
    "STREAMING_BOT_TOKEN",
    "STORAGE_CHANNEL_ID",
    "ADMIN_TELEGRAM_ID",
    "TMDB_API_KEY",
];

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            template: PathBuf::from(".env.example"),
            target: PathBuf::from(".env"),
            policy: EnvPolicy::default(),
            required_keys: DEFAULT_REQUIRED_ENV_KEYS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            units_source_dir: PathBuf::from("systemd"),
            unit_dir: PathBuf::from("/etc/systemd/system"),
            systemctl: "systemctl".to_string(),
        }
    }
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            min_free_disk_mb: 2048,
        }
    }
}

pub fn default_services() -> Vec<ServiceDefinition> {
    vec![
        ServiceDefinition::new("backend", "backend", "telegram-backend"),
        ServiceDefinition::new("storage_bot", "bots/storage_bot", "telegram-storage-bot"),
        ServiceDefinition::new("control_bot", "bots/control_bot", "telegram-control-bot"),
        ServiceDefinition::new("streaming_bot", "bots/streaming_bot", "telegram-streaming-bot"),
    ]
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            system: SystemConfig::default(),
            runtime: RuntimeConfig::default(),
            database: DatabaseConfig::default(),
            env: EnvConfig::default(),
            supervisor: SupervisorConfig::default(),
            preflight: PreflightConfig::default(),
            services: default_services(),
        }
    }
}

impl ProvisionConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ProvisionError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| ProvisionError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${MONGO_KEY_URL})，未定義的保留原樣
    fn substitute_env_vars(content: &str) -> String {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid");

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
    }

    /// 以專案根目錄解析相對路徑
    pub fn project_path(&self, path: &Path) -> PathBuf {
        self.project.root.join(path)
    }

    pub fn state_file_path(&self) -> PathBuf {
        self.project_path(&self.project.state_file)
    }

    pub fn venv_path(&self) -> Option<PathBuf> {
        self.runtime.venv.as_deref().map(|v| self.project_path(v))
    }

    /// 實際使用的 pip：有 virtualenv 時用其中的 pip
    pub fn pip_program(&self) -> String {
        match self.venv_path() {
            Some(venv) => venv.join("bin").join("pip").display().to_string(),
            None => self.runtime.pip.clone(),
        }
    }

    /// 專案內的 unit 檔（相對於專案根目錄）
    pub fn unit_source(&self, service: &ServiceDefinition) -> PathBuf {
        self.supervisor
            .units_source_dir
            .join(service.unit_file_name())
    }

    pub fn unit_destination(&self, service: &ServiceDefinition) -> PathBuf {
        self.supervisor.unit_dir.join(service.unit_file_name())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path(
            "project.root",
            &self.project.root.display().to_string(),
        )?;
        validation::validate_path(
            "project.state_file",
            &self.project.state_file.display().to_string(),
        )?;
        validation::validate_non_empty_string("system.package_manager", &self.system.package_manager)?;
        validation::validate_non_empty_string("runtime.python", &self.runtime.python)?;
        validation::validate_non_empty_string("runtime.pip", &self.runtime.pip)?;

        validation::validate_url("database.key_url", &self.database.key_url)?;
        validation::validate_non_empty_string("database.repo_line", &self.database.repo_line)?;
        validation::validate_non_empty_string("database.package", &self.database.package)?;
        validation::validate_unit_name("database.service", &self.database.service)?;
        for (field, path) in [
            ("database.keyring_path", &self.database.keyring_path),
            ("database.repo_file", &self.database.repo_file),
            ("env.template", &self.env.template),
            ("env.target", &self.env.target),
            ("supervisor.units_source_dir", &self.supervisor.units_source_dir),
            ("supervisor.unit_dir", &self.supervisor.unit_dir),
        ] {
            validation::validate_path(field, &path.display().to_string())?;
        }

        if self.env.template == self.env.target {
            return Err(ProvisionError::InvalidConfigValueError {
                field: "env.target".to_string(),
                value: self.env.target.display().to_string(),
                reason: "Target must differ from the template".to_string(),
            });
        }
        for key in &self.env.required_keys {
            validation::validate_env_key("env.required_keys", key)?;
        }

        if self.services.is_empty() {
            return Err(ProvisionError::MissingConfigError {
                field: "services".to_string(),
            });
        }
        for service in &self.services {
            validation::validate_unit_name("services.name", &service.name)?;
            validation::validate_unit_name("services.unit", &service.unit)?;
            validation::validate_path("services.directory", &service.directory.display().to_string())?;
            validation::validate_non_empty_string("services.manifest", &service.manifest)?;
        }
        validation::validate_unique("services.name", self.services.iter().map(|s| s.name.as_str()))?;
        validation::validate_unique("services.unit", self.services.iter().map(|s| s.unit.as_str()))?;

        Ok(())
    }
}

impl Validate for ProvisionConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
