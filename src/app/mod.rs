// Application layer: concrete provisioning steps and the canonical plan that orders them.

pub mod plan;
pub mod steps;
