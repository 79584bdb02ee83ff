pub mod database;
pub mod dependencies;
pub mod env_file;
pub mod runtime;
pub mod supervisor;
pub mod system;

pub use database::InstallDatabaseStep;
pub use dependencies::InstallDependenciesStep;
pub use env_file::MaterializeConfigStep;
pub use runtime::InstallRuntimeStep;
pub use supervisor::RegisterSupervisorUnitsStep;
pub use system::UpgradeSystemStep;

use crate::config::ProvisionConfig;
use crate::domain::model::CommandSpec;

pub const UPGRADE_SYSTEM: &str = "upgrade_system";
pub const INSTALL_RUNTIME: &str = "install_runtime";
pub const INSTALL_DATABASE: &str = "install_database";
pub const INSTALL_DEPENDENCIES: &str = "install_dependencies";
pub const MATERIALIZE_CONFIG: &str = "materialize_config";
pub const REGISTER_SUPERVISOR_UNITS: &str = "register_supervisor_units";

/// 套件管理器命令，必要時加上非互動模式
pub(crate) fn package_command<I, S>(config: &ProvisionConfig, args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let spec = CommandSpec::new(config.system.package_manager.clone()).args(args);
    if config.system.noninteractive {
        spec.env("DEBIAN_FRONTEND", "noninteractive")
    } else {
        spec
    }
}

pub(crate) fn systemctl(config: &ProvisionConfig, verb: &str, unit: &str) -> CommandSpec {
    CommandSpec::new(config.supervisor.systemctl.clone()).args([verb, unit])
}
