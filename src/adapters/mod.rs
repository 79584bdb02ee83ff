// Adapters layer: concrete implementations for external systems (file system, subprocesses, state file).

pub mod runner;
pub mod state;
pub mod storage;

pub use runner::{ScriptedRunner, SystemRunner};
pub use state::{ProvisionState, StateStore};
pub use storage::LocalStorage;
