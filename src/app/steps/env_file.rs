use super::MATERIALIZE_CONFIG;
use crate::config::ProvisionConfig;
use crate::domain::model::{EnvPolicy, ProvisionContext, StepOutcome, StepResult};
use crate::domain::ports::{ProvisionStep, Storage};
use crate::utils::error::{ProvisionError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// 由 `.env.example` 產生 `.env`，已存在時依 [`EnvPolicy`] 處理
pub struct MaterializeConfigStep<S: Storage> {
    config: Arc<ProvisionConfig>,
    storage: S,
}

impl<S: Storage> MaterializeConfigStep<S> {
    pub fn new(config: Arc<ProvisionConfig>, storage: S) -> Self {
        Self { config, storage }
    }

    /// 尚未被使用的備份路徑；同一毫秒內重複時加上序號
    async fn backup_path(&self) -> PathBuf {
        let target = &self.config.env.target;
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".env".to_string());
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");

        let base = format!("{}.bak.{}", file_name, stamp);
        let mut candidate = target.with_file_name(&base);
        let mut suffix = 1;
        while self.storage.exists(&candidate).await {
            candidate = target.with_file_name(format!("{}.{}", base, suffix));
            suffix += 1;
        }
        candidate
    }

    /// 目標已存在時依策略處理，回傳 (結果, 動作名稱, 備份路徑)
    async fn apply_policy(&self) -> Result<(StepOutcome, &'static str, Option<PathBuf>)> {
        let env = &self.config.env;

        match env.policy {
            EnvPolicy::KeepExisting => {
                tracing::info!(
                    "⏭️ {} already exists, keeping it",
                    env.target.display()
                );
                Ok((StepOutcome::Unchanged, "kept", None))
            }
            EnvPolicy::FailIfExists => Err(ProvisionError::ConfigExists {
                path: self.config.project_path(&env.target),
            }),
            EnvPolicy::Overwrite => {
                let backup = self.backup_path().await;
                self.storage.copy_file(&env.target, &backup).await?;
                tracing::warn!(
                    "⚠️ Overwriting {} (previous version saved to {})",
                    env.target.display(),
                    backup.display()
                );
                self.storage.copy_file(&env.template, &env.target).await?;
                Ok((StepOutcome::Applied, "overwritten", Some(backup)))
            }
            EnvPolicy::Merge => {
                let existing = self.storage.read_file(&env.target).await?;
                let template = self.storage.read_file(&env.template).await?;
                let (merged, added) = merge_env(
                    &String::from_utf8_lossy(&existing),
                    &String::from_utf8_lossy(&template),
                )?;

                if added.is_empty() {
                    tracing::info!("⏭️ {} already has every template key", env.target.display());
                    return Ok((StepOutcome::Unchanged, "merged", None));
                }

                tracing::info!(
                    "🔀 Adding {} key(s) to {}: {}",
                    added.len(),
                    env.target.display(),
                    added.join(", ")
                );
                self.storage.write_file(&env.target, merged.as_bytes()).await?;
                Ok((StepOutcome::Applied, "merged", None))
            }
        }
    }

    /// 檢查服務需要的變數；只產生警告
    async fn audit(&self) -> Vec<String> {
        let env = &self.config.env;
        let content = match self.storage.read_file(&env.target).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("⚠️ Could not read {} for audit: {}", env.target.display(), e);
                return Vec::new();
            }
        };

        match parse_env(&content) {
            Ok(entries) => {
                let missing = missing_keys(&entries, &env.required_keys);
                for key in &missing {
                    tracing::warn!("⚠️ {} is missing or empty in {}", key, env.target.display());
                }
                missing
            }
            Err(e) => {
                tracing::warn!("⚠️ Could not parse {}: {}", env.target.display(), e);
                Vec::new()
            }
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage + 'static> ProvisionStep for MaterializeConfigStep<S> {
    fn name(&self) -> &str {
        MATERIALIZE_CONFIG
    }

    fn describe(&self) -> Vec<String> {
        let env = &self.config.env;
        vec![
            format!(
                "copy: {} -> {} (policy: {})",
                env.template.display(),
                env.target.display(),
                env.policy
            ),
            format!("audit: {} required keys", env.required_keys.len()),
        ]
    }

    async fn execute(&self, _context: &ProvisionContext) -> Result<StepResult> {
        let env = &self.config.env;

        if !self.storage.exists(&env.template).await {
            return Err(ProvisionError::TemplateMissing {
                path: self.config.project_path(&env.template),
            });
        }

        let (outcome, action, backup) = if self.storage.exists(&env.target).await {
            self.apply_policy().await?
        } else {
            tracing::info!(
                "📝 Creating {} from {}",
                env.target.display(),
                env.template.display()
            );
            self.storage.copy_file(&env.template, &env.target).await?;
            (StepOutcome::Applied, "created", None)
        };

        let missing = self.audit().await;

        let mut result = match outcome {
            StepOutcome::Applied => StepResult::applied(MATERIALIZE_CONFIG),
            StepOutcome::Unchanged => StepResult::unchanged(MATERIALIZE_CONFIG),
        }
        .with_metadata("action", serde_json::Value::String(action.to_string()))
        .with_metadata(
            "missing_keys",
            serde_json::Value::Array(missing.into_iter().map(serde_json::Value::String).collect()),
        );
        if let Some(backup) = backup {
            result = result.with_metadata(
                "backup",
                serde_json::Value::String(backup.display().to_string()),
            );
        }
        Ok(result)
    }
}

pub fn parse_env(content: &[u8]) -> Result<Vec<(String, String)>> {
    dotenvy::from_read_iter(content)
        .map(|entry| entry.map_err(ProvisionError::from))
        .collect()
}

/// 模板中 `KEY=...` 行的 key；註解與空行回傳 None
fn template_key(line: &str) -> Option<&str> {
    let line = line.trim_start();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, _) = line.split_once('=')?;
    let key = key.trim();
    (!key.is_empty()).then_some(key)
}

/// 把模板中現有檔案沒有的 key 附加到最後，現有內容不變
pub fn merge_env(existing: &str, template: &str) -> Result<(String, Vec<String>)> {
    let present: HashMap<String, String> = parse_env(existing.as_bytes())?.into_iter().collect();

    let mut merged = existing.to_string();
    let mut added = Vec::new();
    for line in template.lines() {
        let Some(key) = template_key(line) else {
            continue;
        };
        if present.contains_key(key) || added.iter().any(|k| k == key) {
            continue;
        }
        if !merged.is_empty() && !merged.ends_with('\n') {
            merged.push('\n');
        }
        merged.push_str(line.trim_start());
        merged.push('\n');
        added.push(key.to_string());
    }

    Ok((merged, added))
}

pub fn missing_keys(entries: &[(String, String)], required: &[String]) -> Vec<String> {
    let present: HashMap<&str, &str> = entries
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    required
        .iter()
        .filter(|key| {
            present
                .get(key.as_str())
                .map(|value| value.trim().is_empty())
                .unwrap_or(true)
        })
        .cloned()
        .collect()
}
