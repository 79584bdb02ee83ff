use crate::app::steps::{
    self, InstallDatabaseStep, InstallDependenciesStep, InstallRuntimeStep, MaterializeConfigStep,
    RegisterSupervisorUnitsStep, UpgradeSystemStep,
};
use crate::config::ProvisionConfig;
use crate::domain::ports::{CommandRunner, ProvisionStep, Storage};
use crate::utils::error::{ProvisionError, Result};
use std::sync::Arc;

/// 依固定順序建立所有步驟
pub fn build_steps<S>(
    config: Arc<ProvisionConfig>,
    runner: Arc<dyn CommandRunner>,
    storage: S,
) -> Vec<Box<dyn ProvisionStep>>
where
    S: Storage + Clone + 'static,
{
    let mut pipeline: Vec<Box<dyn ProvisionStep>> = vec![
        Box::new(UpgradeSystemStep::new(config.clone(), runner.clone())),
        Box::new(InstallRuntimeStep::new(
            config.clone(),
            runner.clone(),
            storage.clone(),
        )),
        Box::new(InstallDatabaseStep::new(
            config.clone(),
            runner.clone(),
            storage.clone(),
        )),
    ];

    for service in &config.services {
        pipeline.push(Box::new(InstallDependenciesStep::new(
            service.clone(),
            config.clone(),
            runner.clone(),
            storage.clone(),
        )));
    }

    pipeline.push(Box::new(MaterializeConfigStep::new(
        config.clone(),
        storage.clone(),
    )));
    pipeline.push(Box::new(RegisterSupervisorUnitsStep::new(
        config, runner, storage,
    )));

    pipeline
}

/// 步驟名稱（與 build_steps 的順序相同）
pub fn step_names(config: &ProvisionConfig) -> Vec<String> {
    let mut names = vec![
        steps::UPGRADE_SYSTEM.to_string(),
        steps::INSTALL_RUNTIME.to_string(),
        steps::INSTALL_DATABASE.to_string(),
    ];
    names.extend(config.services.iter().map(steps::dependencies::step_name));
    names.push(steps::MATERIALIZE_CONFIG.to_string());
    names.push(steps::REGISTER_SUPERVISOR_UNITS.to_string());
    names
}

/// `--only` / `--skip` 篩選
///
/// 名稱可以是完整步驟名（`install_dependencies:backend`），
/// 也可以是群組前綴（`install_dependencies` 代表所有服務）。
#[derive(Debug, Clone, Default)]
pub struct StepFilter {
    only: Vec<String>,
    skip: Vec<String>,
}

impl StepFilter {
    pub fn new(only: Vec<String>, skip: Vec<String>) -> Self {
        let clean = |names: Vec<String>| -> Vec<String> {
            names
                .into_iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect()
        };
        Self {
            only: clean(only),
            skip: clean(skip),
        }
    }

    fn matches(pattern: &str, step: &str) -> bool {
        step == pattern
            || step
                .strip_prefix(pattern)
                .is_some_and(|rest| rest.starts_with(':'))
    }

    pub fn allows(&self, step: &str) -> bool {
        let included = self.only.is_empty() || self.only.iter().any(|p| Self::matches(p, step));
        let excluded = self.skip.iter().any(|p| Self::matches(p, step));
        included && !excluded
    }

    pub fn is_empty(&self) -> bool {
        self.only.is_empty() && self.skip.is_empty()
    }

    /// 由 `--only` 明確點名的步驟；即使先前已完成也會再執行
    pub fn selects(&self, step: &str) -> bool {
        !self.only.is_empty() && self.allows(step)
    }

    /// 每個名稱都必須對應至少一個步驟
    pub fn validate(&self, known_steps: &[String]) -> Result<()> {
        for (field, patterns) in [("only", &self.only), ("skip", &self.skip)] {
            for pattern in patterns {
                if !known_steps.iter().any(|step| Self::matches(pattern, step)) {
                    return Err(ProvisionError::InvalidConfigValueError {
                        field: field.to_string(),
                        value: pattern.clone(),
                        reason: format!("Unknown step. Known steps: {}", known_steps.join(", ")),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{LocalStorage, ScriptedRunner};

    #[test]
    fn test_canonical_order() {
        let config = ProvisionConfig::default();
        assert_eq!(
            step_names(&config),
            vec![
                "upgrade_system",
                "install_runtime",
                "install_database",
                "install_dependencies:backend",
                "install_dependencies:storage_bot",
                "install_dependencies:control_bot",
                "install_dependencies:streaming_bot",
                "materialize_config",
                "register_supervisor_units",
            ]
        );
    }

    #[test]
    fn test_build_steps_matches_names() {
        let config = Arc::new(ProvisionConfig::default());
        let built = build_steps(
            config.clone(),
            Arc::new(ScriptedRunner::new()),
            LocalStorage::new("."),
        );

        let built_names: Vec<String> = built.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(built_names, step_names(&config));
    }

    #[test]
    fn test_filter_group_prefix() {
        let filter = StepFilter::new(vec!["install_dependencies".to_string()], vec![]);

        assert!(filter.allows("install_dependencies:backend"));
        assert!(filter.allows("install_dependencies:streaming_bot"));
        assert!(!filter.allows("install_database"));
        assert!(!filter.allows("upgrade_system"));
    }

    #[test]
    fn test_filter_skip_wins_over_only() {
        let filter = StepFilter::new(
            vec!["install_dependencies".to_string()],
            vec!["install_dependencies:control_bot".to_string()],
        );

        assert!(filter.allows("install_dependencies:backend"));
        assert!(!filter.allows("install_dependencies:control_bot"));
    }

    #[test]
    fn test_only_marks_explicit_selection() {
        let filter = StepFilter::new(
            vec!["install_dependencies".to_string()],
            vec!["install_dependencies:control_bot".to_string()],
        );

        assert!(!filter.is_empty());
        assert!(filter.selects("install_dependencies:backend"));
        assert!(!filter.selects("install_dependencies:control_bot"));
        assert!(!filter.selects("upgrade_system"));

        let skip_only = StepFilter::new(vec![], vec!["upgrade_system".to_string()]);
        assert!(!skip_only.selects("install_runtime"));
        assert!(StepFilter::default().is_empty());
    }

    #[test]
    fn test_filter_rejects_unknown_steps() {
        let names = step_names(&ProvisionConfig::default());

        assert!(StepFilter::new(vec![], vec!["upgrade_system".to_string()])
            .validate(&names)
            .is_ok());
        assert!(StepFilter::new(vec!["install".to_string()], vec![])
            .validate(&names)
            .is_err());
        assert!(StepFilter::new(vec![], vec!["reboot".to_string()])
            .validate(&names)
            .is_err());
    }
}
