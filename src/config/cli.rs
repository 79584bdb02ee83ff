use crate::config::toml_config::ProvisionConfig;
use crate::domain::model::EnvPolicy;
use crate::utils::error::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

/// 不帶任何參數時，以內建預設值在目前目錄執行完整佈建流程
#[derive(Debug, Clone, Parser)]
#[command(name = "tg-provision", version)]
#[command(about = "Provision a Linux host for the Telegram media platform backend and bots")]
pub struct CliConfig {
    /// Path to a TOML file overriding the built-in defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Project root containing backend/, bots/, systemd/ and .env.example
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// What to do when .env already exists
    #[arg(long, value_enum)]
    pub env_policy: Option<EnvPolicy>,

    /// Run only these steps (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Skip these steps (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Ignore recorded progress and run every step again
    #[arg(long)]
    pub fresh: bool,

    /// Show the execution plan without touching the host
    #[arg(long)]
    pub dry_run: bool,

    /// Print recorded progress and exit
    #[arg(long)]
    pub status: bool,

    /// Do not abort on an unsupported host
    #[arg(long)]
    pub skip_preflight: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliConfig {
    /// 載入設定檔（或預設值），再套用命令列覆寫
    pub fn load_config(&self) -> Result<ProvisionConfig> {
        let mut config = match &self.config {
            Some(path) => ProvisionConfig::from_file(path)?,
            None => ProvisionConfig::default(),
        };

        if let Some(root) = &self.root {
            config.project.root = root.clone();
        }
        if let Some(policy) = self.env_policy {
            config.env.policy = policy;
        }

        Ok(config)
    }
}
