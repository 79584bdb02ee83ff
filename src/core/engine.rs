use crate::adapters::state::{ProvisionState, StateStore};
use crate::adapters::storage::LocalStorage;
use crate::app::plan::{build_steps, step_names, StepFilter};
use crate::app::steps::supervisor::follow_up_commands;
use crate::config::ProvisionConfig;
use crate::core::sequence::{PlannedStep, StepSequence};
use crate::domain::model::StepResult;
use crate::domain::ports::CommandRunner;
use crate::utils::error::Result;
use crate::utils::host;
use chrono::Utc;
use std::sync::Arc;

/// 一次佈建的結果
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub execution_id: String,
    pub results: Vec<StepResult>,
    pub warnings: Vec<String>,
    /// 操作者需手動執行的命令
    pub follow_up: Vec<String>,
}

pub struct ProvisionEngine {
    config: Arc<ProvisionConfig>,
    runner: Arc<dyn CommandRunner>,
    execution_id: String,
    filter: StepFilter,
    fresh: bool,
    preflight: bool,
}

impl ProvisionEngine {
    pub fn new(config: ProvisionConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config: Arc::new(config),
            runner,
            execution_id: format!("prov_{}", Utc::now().format("%Y%m%d_%H%M%S")),
            filter: StepFilter::default(),
            fresh: false,
            preflight: true,
        }
    }

    pub fn with_filter(mut self, filter: StepFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    pub fn with_preflight(mut self, enabled: bool) -> Self {
        self.preflight = enabled;
        self
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    fn state_store(&self) -> StateStore {
        StateStore::new(self.config.state_file_path())
    }

    fn sequence(&self) -> StepSequence {
        let storage = LocalStorage::new(self.config.project.root.clone());
        let mut sequence = StepSequence::new(self.execution_id.clone())
            .with_filter(self.filter.clone())
            .with_state(self.state_store())
            .with_fresh(self.fresh);

        for step in build_steps(self.config.clone(), self.runner.clone(), storage) {
            sequence.add_step(step);
        }
        sequence
    }

    /// 設定與步驟篩選都必須合法才會動到主機
    pub fn validate(&self) -> Result<()> {
        self.config.validate_config()?;
        self.filter.validate(&step_names(&self.config))
    }

    fn run_preflight(&self) -> Result<Vec<String>> {
        if !self.preflight {
            tracing::warn!("⚠️ Preflight host probe skipped");
            return Ok(Vec::new());
        }

        let report = host::probe_host(&self.config.project.root);
        report.log_summary();

        let warnings = report.check(self.config.preflight.min_free_disk_mb)?;
        for warning in &warnings {
            tracing::warn!("⚠️ {}", warning);
        }
        Ok(warnings)
    }

    pub async fn run(&self) -> Result<ProvisionReport> {
        self.validate()?;
        tracing::info!(
            "🚀 Starting provisioning {} in {}",
            self.execution_id,
            self.config.project.root.display()
        );

        let warnings = self.run_preflight()?;
        let results = self.sequence().execute_all().await?;

        let summary = StepSequence::get_execution_summary(&results);
        tracing::info!("📊 Execution summary: {:?}", summary);

        Ok(ProvisionReport {
            execution_id: self.execution_id.clone(),
            results,
            warnings,
            follow_up: follow_up_commands(&self.config),
        })
    }

    /// dry-run：不動主機，只回報計畫
    pub async fn plan(&self) -> Result<Vec<PlannedStep>> {
        self.validate()?;
        self.sequence().plan().await
    }

    pub async fn status(&self) -> Result<(Option<ProvisionState>, Vec<PlannedStep>)> {
        let state = self.state_store().load().await?;
        let steps = self.sequence().plan().await?;
        Ok((state, steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ScriptedRunner;
    use crate::core::sequence::PlannedStatus;
    use crate::utils::error::ProvisionError;
    use tempfile::TempDir;

    fn engine(temp_dir: &TempDir, runner: Arc<ScriptedRunner>) -> ProvisionEngine {
        let mut config = ProvisionConfig::default();
        config.project.root = temp_dir.path().to_path_buf();
        ProvisionEngine::new(config, runner).with_preflight(false)
    }

    #[test]
    fn test_execution_id_format() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir, Arc::new(ScriptedRunner::new()));

        assert!(engine.execution_id().starts_with("prov_"));
        assert_eq!(engine.execution_id().len(), "prov_20250101_120000".len());
    }

    #[tokio::test]
    async fn test_unknown_filter_fails_before_any_command() {
        let temp_dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let engine = engine(&temp_dir, runner.clone())
            .with_filter(StepFilter::new(vec!["install_everything".to_string()], vec![]));

        let err = engine.run().await.unwrap_err();

        assert!(matches!(err, ProvisionError::InvalidConfigValueError { ref field, .. } if field == "only"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_plan_runs_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let engine = engine(&temp_dir, runner.clone())
            .with_filter(StepFilter::new(vec![], vec!["upgrade_system".to_string()]));

        let plan = engine.plan().await.unwrap();

        assert_eq!(plan.len(), 9);
        assert_eq!(plan[0].status, PlannedStatus::Filtered);
        assert!(plan[1..].iter().all(|p| p.status == PlannedStatus::Pending));
        assert!(runner.calls().is_empty());
        assert!(!temp_dir.path().join(".provision-state.json").exists());
    }

    #[tokio::test]
    async fn test_status_without_state() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine(&temp_dir, Arc::new(ScriptedRunner::new()));

        let (state, steps) = engine.status().await.unwrap();

        assert!(state.is_none());
        assert_eq!(steps.len(), 9);
    }
}
