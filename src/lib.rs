//! Doc Converter Server Library
//!
//! HTTP document conversion: PDF → Word, Word → PDF, PDF merge and
//! images → PDF. The server binary is in main.rs.
//!
//! # Modules
//!
//! - `upload`: uploaded file sets and their validation
//! - `tools`: the catalog of conversion tools
//! - `engine`: conversion engines and the registry resolving tools to them
//! - `artifacts`: per-job workspaces, artifact retention and purging
//! - `jobs`: the job state machine and executor
//! - `routes`: the HTTP façade

pub mod artifacts;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod state;
pub mod tools;
pub mod upload;
