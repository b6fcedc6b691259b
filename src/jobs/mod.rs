//! Conversion jobs
//!
//! A job is created per request once its uploads have passed validation,
//! and owns exactly one workspace until it succeeds or fails.

pub mod executor;
pub mod job;

pub use executor::JobExecutor;
pub use job::{CompletedJob, ConversionJob, JobError, JobState};
