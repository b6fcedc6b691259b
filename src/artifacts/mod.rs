//! Artifact Module
//!
//! Ephemeral storage for conversion jobs. Each job gets one workspace
//! directory, freed as a unit; produced artifacts are kept for a fixed
//! retention window and then purged by a background task.

pub mod scheduler;
pub mod store;
pub mod types;

pub use scheduler::PurgeScheduler;
pub use store::{ArtifactLease, ArtifactStore};
pub use types::*;
