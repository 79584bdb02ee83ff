use crate::utils::error::{ProvisionError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedStep {
    pub step: String,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// 記錄已完成步驟的狀態檔內容，用於中斷後續跑
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionState {
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed: Vec<CompletedStep>,
}

impl ProvisionState {
    pub fn new(execution_id: String) -> Self {
        let now = Utc::now();
        Self {
            execution_id,
            started_at: now,
            updated_at: now,
            completed: Vec::new(),
        }
    }

    pub fn is_completed(&self, step: &str) -> bool {
        self.completed.iter().any(|c| c.step == step)
    }

    pub fn completed_names(&self) -> Vec<String> {
        self.completed.iter().map(|c| c.step.clone()).collect()
    }

    pub fn record(&mut self, step: &str, duration: Duration) {
        let now = Utc::now();
        self.updated_at = now;
        if self.is_completed(step) {
            return;
        }
        self.completed.push(CompletedStep {
            step: step.to_string(),
            completed_at: now,
            duration_ms: duration.as_millis() as u64,
        });
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 狀態檔不存在時回傳 None
    pub async fn load(&self) -> Result<Option<ProvisionState>> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|e| ProvisionError::StateError {
                path: self.path.clone(),
                message: format!("corrupted state file: {}", e),
            })
    }

    /// 先寫暫存檔再 rename，避免中斷時留下半個檔案
    pub async fn save(&self, state: &ProvisionState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_vec_pretty(state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_missing_state_returns_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path().join(".provision-state.json"));

        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_reload_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path().join(".provision-state.json"));

        let mut state = ProvisionState::new("prov_test".to_string());
        state.record("upgrade_system", Duration::from_millis(1500));
        state.record("install_runtime", Duration::from_millis(300));
        state.record("upgrade_system", Duration::from_millis(10));
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.execution_id, "prov_test");
        assert_eq!(
            loaded.completed_names(),
            vec!["upgrade_system".to_string(), "install_runtime".to_string()]
        );
        assert_eq!(loaded.completed[0].duration_ms, 1500);
        assert!(!temp_dir.path().join(".provision-state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupted_state_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".provision-state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = StateStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, ProvisionError::StateError { .. }));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path().join(".provision-state.json"));

        store
            .save(&ProvisionState::new("prov_test".to_string()))
            .await
            .unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();

        assert!(store.load().await.unwrap().is_none());
    }
}
