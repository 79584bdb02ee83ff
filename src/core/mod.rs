pub mod engine;
pub mod sequence;

pub use engine::{ProvisionEngine, ProvisionReport};
pub use sequence::{PlannedStatus, PlannedStep, StepSequence};
