pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliConfig, LogFormat};

pub use adapters::{LocalStorage, ScriptedRunner, StateStore, SystemRunner};
pub use app::plan::StepFilter;
pub use config::ProvisionConfig;
pub use core::{ProvisionEngine, ProvisionReport};
pub use utils::error::{ProvisionError, Result};
