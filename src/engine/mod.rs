//! Conversion engines
//!
//! Every backend implements [`ConversionEngine`], whatever technology it
//! wraps. The orchestrator only depends on this contract:
//!
//! - inputs arrive staged in the job's workspace, in caller-declared order
//! - the engine writes exactly one output file into the workspace
//! - inputs are read-only; engines never delete anything
//!
//! Engines return an [`EngineError`] instead of panicking on bad input.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::artifacts::Workspace;

pub use crate::artifacts::InputFile;

mod docx;
mod images_to_pdf;
mod pdf;
mod pdf_merge;
mod pdf_to_word;
pub mod registry;
mod word_to_pdf;

pub use images_to_pdf::{fit_to_page, ImagesToPdfEngine, Placement};
pub use pdf_merge::PdfMergeEngine;
pub use pdf_to_word::PdfToWordEngine;
pub use registry::{EngineHealth, EngineRegistry, RegistryError, ResolvedTool, UnknownTool};
pub use word_to_pdf::WordToPdfEngine;

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Engine registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    PdfToWord,
    WordToPdf,
    PdfMerge,
    ImagesToPdf,
}

/// The single file an engine produced
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub path: PathBuf,
    pub mime_type: &'static str,
}

pub type EngineResult = Result<EngineOutput, EngineError>;

/// Engine failure
///
/// Messages may mention workspace paths; the executor redacts them before
/// they reach a client.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Expected {expected} input file(s), got {actual}")]
    InputCount { expected: String, actual: usize },

    #[error("{0}")]
    MalformedInput(String),

    #[error("Conversion failed: {0}")]
    Failed(String),

    #[error("Conversion produced an invalid output: {0}")]
    InvalidOutput(String),

    #[error("Conversion engine crashed: {0}")]
    Crashed(String),

    #[error("Conversion engine unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A pluggable backend performing one document transformation
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Human-readable backend name, reported by the health endpoint
    fn backend(&self) -> &'static str;

    /// Whether the backend's dependencies are present
    async fn is_available(&self) -> bool;

    /// Convert `inputs` into one output file inside `workspace`
    async fn convert(&self, workspace: &Workspace, inputs: &[InputFile]) -> EngineResult;
}

// ============================================================================
// Helpers
// ============================================================================

pub(crate) fn single_input(inputs: &[InputFile]) -> Result<&InputFile, EngineError> {
    match inputs {
        [input] => Ok(input),
        _ => Err(EngineError::InputCount {
            expected: "1".to_string(),
            actual: inputs.len(),
        }),
    }
}

pub(crate) fn input_range(
    inputs: &[InputFile],
    min: usize,
    max: usize,
) -> Result<(), EngineError> {
    if inputs.len() < min || inputs.len() > max {
        return Err(EngineError::InputCount {
            expected: format!("{}-{}", min, max),
            actual: inputs.len(),
        });
    }
    Ok(())
}

/// Run CPU-bound engine work off the async workers
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, EngineError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| EngineError::Crashed(e.to_string()))?
}
