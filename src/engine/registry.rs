//! Engine registry
//!
//! Maps tool identifiers to their [`ToolSpec`] and engine instance. Built
//! once at startup and shared read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use super::{
    ConversionEngine, EngineKind, ImagesToPdfEngine, PdfMergeEngine, PdfToWordEngine,
    WordToPdfEngine,
};
use crate::config::{Config, MAX_FILE_SIZE};
use crate::tools::{default_tools, ToolSpec};

/// Room for multipart framing and the `file_count` field
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
#[error("Unknown tool: {0}")]
pub struct UnknownTool(pub String);

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool {tool} requires engine {engine:?}, which is not registered")]
    MissingEngine { tool: &'static str, engine: EngineKind },

    #[error("Tool {0} is registered twice")]
    DuplicateTool(&'static str),
}

/// A tool together with the engine that serves it
#[derive(Clone)]
pub struct ResolvedTool {
    pub spec: ToolSpec,
    pub engine: Arc<dyn ConversionEngine>,
}

impl std::fmt::Debug for ResolvedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTool")
            .field("spec", &self.spec)
            .field("engine", &self.engine.kind())
            .finish()
    }
}

/// Availability of one engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    pub engine: EngineKind,
    pub backend: &'static str,
    pub available: bool,
}

#[derive(Clone)]
pub struct EngineRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    tools: HashMap<&'static str, ToolSpec>,
    engines: HashMap<EngineKind, Arc<dyn ConversionEngine>>,
}

impl EngineRegistry {
    /// Register tools and engines; every tool's engine must be present
    pub fn new(
        tools: Vec<ToolSpec>,
        engines: Vec<Arc<dyn ConversionEngine>>,
    ) -> Result<Self, RegistryError> {
        let engines: HashMap<EngineKind, Arc<dyn ConversionEngine>> = engines
            .into_iter()
            .map(|engine| (engine.kind(), engine))
            .collect();

        let mut by_id = HashMap::with_capacity(tools.len());
        for tool in tools {
            if !engines.contains_key(&tool.engine) {
                return Err(RegistryError::MissingEngine {
                    tool: tool.id,
                    engine: tool.engine,
                });
            }
            let id = tool.id;
            if by_id.insert(id, tool).is_some() {
                return Err(RegistryError::DuplicateTool(id));
            }
        }

        Ok(Self {
            inner: Arc::new(RegistryInner {
                tools: by_id,
                engines,
            }),
        })
    }

    /// The four built-in tools with their default engines
    pub fn with_defaults(config: &Config) -> Result<Self, RegistryError> {
        let tools = default_tools(&config.engines);
        let max_files = |kind: EngineKind| {
            tools
                .iter()
                .filter(|tool| tool.engine == kind)
                .map(|tool| tool.max_files)
                .max()
                .unwrap_or(1)
        };

        let engines: Vec<Arc<dyn ConversionEngine>> = vec![
            Arc::new(PdfToWordEngine::new()),
            Arc::new(WordToPdfEngine::new(config.engines.libreoffice_bin.clone())),
            Arc::new(PdfMergeEngine::new(max_files(EngineKind::PdfMerge))),
            Arc::new(ImagesToPdfEngine::new(max_files(EngineKind::ImagesToPdf))),
        ];

        Self::new(tools, engines)
    }

    pub fn resolve(&self, tool_id: &str) -> Result<ResolvedTool, UnknownTool> {
        let spec = self
            .inner
            .tools
            .get(tool_id)
            .ok_or_else(|| UnknownTool(tool_id.to_string()))?;
        // Presence checked in new()
        let engine = self
            .inner
            .engines
            .get(&spec.engine)
            .ok_or_else(|| UnknownTool(tool_id.to_string()))?;

        Ok(ResolvedTool {
            spec: spec.clone(),
            engine: Arc::clone(engine),
        })
    }

    /// All tools, sorted by id
    pub fn tools(&self) -> Vec<&ToolSpec> {
        let mut tools: Vec<&ToolSpec> = self.inner.tools.values().collect();
        tools.sort_by_key(|tool| tool.id);
        tools
    }

    /// Largest request body any tool can legitimately receive
    pub fn max_request_bytes(&self) -> usize {
        let max_files = self
            .inner
            .tools
            .values()
            .map(|tool| tool.max_files)
            .max()
            .unwrap_or(1);
        max_files * MAX_FILE_SIZE as usize + MULTIPART_OVERHEAD
    }

    /// Probe every engine concurrently
    pub async fn health(&self) -> Vec<EngineHealth> {
        let mut engines: Vec<&Arc<dyn ConversionEngine>> = self.inner.engines.values().collect();
        engines.sort_by_key(|engine| engine.backend());

        join_all(engines.into_iter().map(|engine| async move {
            EngineHealth {
                engine: engine.kind(),
                backend: engine.backend(),
                available: engine.is_available().await,
            }
        }))
        .await
    }
}
