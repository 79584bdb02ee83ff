use crate::adapters::state::{ProvisionState, StateStore};
use crate::app::plan::StepFilter;
use crate::domain::model::{ProvisionContext, StepOutcome, StepResult};
use crate::domain::ports::ProvisionStep;
use crate::utils::error::{ProvisionError, Result};
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedStatus {
    Pending,
    Completed,
    Filtered,
}

impl std::fmt::Display for PlannedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PlannedStatus::Pending => "pending",
            PlannedStatus::Completed => "completed",
            PlannedStatus::Filtered => "filtered",
        };
        f.write_str(label)
    }
}

/// dry-run / status 用的步驟快照
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub name: String,
    pub status: PlannedStatus,
    pub actions: Vec<String>,
}

/// 依序執行步驟，每完成一步就寫入狀態檔
pub struct StepSequence {
    steps: Vec<Box<dyn ProvisionStep>>,
    execution_id: String,
    filter: StepFilter,
    state_store: Option<StateStore>,
    fresh: bool,
}

impl StepSequence {
    pub fn new(execution_id: String) -> Self {
        Self {
            steps: Vec::new(),
            execution_id,
            filter: StepFilter::default(),
            state_store: None,
            fresh: false,
        }
    }

    pub fn with_filter(mut self, filter: StepFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_state(mut self, store: StateStore) -> Self {
        self.state_store = Some(store);
        self
    }

    /// 忽略既有狀態檔，從頭執行
    pub fn with_fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    pub fn add_step(&mut self, step: Box<dyn ProvisionStep>) {
        self.steps.push(step);
    }

    /// 載入狀態；`--fresh` 時丟棄這次會執行的步驟的紀錄，其餘保留
    async fn load_state(&self) -> Result<Option<ProvisionState>> {
        let Some(store) = &self.state_store else {
            return Ok(None);
        };
        let state = store.load().await?;
        if !self.fresh {
            return Ok(state);
        }
        if self.filter.is_empty() {
            return Ok(None);
        }

        Ok(state.map(|mut state| {
            state.completed.retain(|c| !self.filter.allows(&c.step));
            state
        }))
    }

    /// 先前已完成、且未被 `--only` 明確點名的步驟不再執行
    fn already_done(&self, step: &dyn ProvisionStep, context: &ProvisionContext) -> bool {
        !self.filter.selects(step.name()) && !step.should_execute(context)
    }

    pub async fn execute_all(&self) -> Result<Vec<StepResult>> {
        let loaded = self.load_state().await?;

        if self.fresh {
            if let Some(store) = &self.state_store {
                match &loaded {
                    Some(kept) => {
                        store.save(kept).await?;
                        tracing::info!(
                            "🧹 Cleared selected steps from state, kept {} record(s): {}",
                            kept.completed.len(),
                            store.path().display()
                        );
                    }
                    None => {
                        store.clear().await?;
                        tracing::info!("🧹 Cleared previous state: {}", store.path().display());
                    }
                }
            }
        }

        let mut state = match loaded {
            Some(state) => {
                tracing::info!(
                    "♻️ Resuming {} ({} step(s) already completed)",
                    state.execution_id,
                    state.completed.len()
                );
                state
            }
            None => ProvisionState::new(self.execution_id.clone()),
        };

        let mut context = ProvisionContext::new(self.execution_id.clone())
            .with_completed(state.completed_names());
        let mut results = Vec::new();

        for step in &self.steps {
            let name = step.name().to_string();

            if !self.filter.allows(&name) {
                tracing::info!("⏭️ Skipping step: {} (filtered)", name);
                continue;
            }
            if self.already_done(step.as_ref(), &context) {
                tracing::info!("⏭️ Skipping step: {} (already completed)", name);
                continue;
            }

            tracing::info!("▶️ Running step: {}", name);
            let start_time = Instant::now();

            match step.execute(&context).await {
                Ok(mut result) => {
                    result.duration = start_time.elapsed();
                    tracing::info!(
                        "✅ Step completed: {} ({:?}, duration: {:?})",
                        result.step_name,
                        result.outcome,
                        result.duration
                    );

                    if let Some(store) = &self.state_store {
                        state.record(&name, result.duration);
                        if let Err(e) = store.save(&state).await {
                            tracing::error!("❌ Could not record step {}: {}", name, e);
                            return Err(ProvisionError::StepFailed {
                                step: name,
                                source: Box::new(e),
                            });
                        }
                    }

                    context.mark_completed(&name);
                    results.push(result);
                }
                Err(e) => {
                    tracing::error!("❌ Step failed: {}: {}", name, e);
                    return Err(ProvisionError::StepFailed {
                        step: name,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(results)
    }

    /// 不執行任何動作，只回報每個步驟會怎麼處理
    pub async fn plan(&self) -> Result<Vec<PlannedStep>> {
        let state = self.load_state().await?;

        Ok(self
            .steps
            .iter()
            .map(|step| {
                let name = step.name().to_string();
                let status = if !self.filter.allows(&name) {
                    PlannedStatus::Filtered
                } else if !self.filter.selects(&name)
                    && state.as_ref().is_some_and(|s| s.is_completed(&name))
                {
                    PlannedStatus::Completed
                } else {
                    PlannedStatus::Pending
                };
                PlannedStep {
                    actions: step.describe(),
                    name,
                    status,
                }
            })
            .collect())
    }

    pub fn get_execution_summary(results: &[StepResult]) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();

        let total_duration: std::time::Duration = results.iter().map(|r| r.duration).sum();
        let applied = results
            .iter()
            .filter(|r| r.outcome == StepOutcome::Applied)
            .count();

        summary.insert(
            "total_steps".to_string(),
            serde_json::Value::Number(results.len().into()),
        );
        summary.insert(
            "applied_steps".to_string(),
            serde_json::Value::Number(applied.into()),
        );
        summary.insert(
            "total_duration_ms".to_string(),
            serde_json::Value::Number((total_duration.as_millis() as u64).into()),
        );

        let step_names: Vec<serde_json::Value> = results
            .iter()
            .map(|r| serde_json::Value::String(r.step_name.clone()))
            .collect();
        summary.insert(
            "executed_steps".to_string(),
            serde_json::Value::Array(step_names),
        );

        summary
    }
}
