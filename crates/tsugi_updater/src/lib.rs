//! The image update engine: remote digest checking across registries,
//! update planning against live container/stack state, and the apply
//! pipeline that recreates containers and redeploys stacks.

pub mod applier;
pub mod checker;
pub mod digest;
pub mod error;
pub mod planner;
pub mod service;
pub mod tags;
pub mod work;

#[cfg(test)]
mod testutil;

pub use applier::UpdateApplier;
pub use checker::{CheckerOptions, UpdateChecker};
pub use error::UpdaterError;
pub use planner::{PlannedUpdate, UpdatePlanner};
pub use service::Updater;
pub use work::{InProcessWorkRegistry, WorkClaim, WorkRegistry};
