//! Application state management

use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::engine::EngineRegistry;
use crate::jobs::JobExecutor;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    registry: EngineRegistry,
    store: ArtifactStore,
    executor: JobExecutor,
}

impl AppState {
    pub fn new(registry: EngineRegistry, store: ArtifactStore) -> Self {
        let executor = JobExecutor::new(store.clone());
        Self {
            inner: Arc::new(AppStateInner {
                registry,
                store,
                executor,
            }),
        }
    }

    /// Get the engine registry
    pub fn registry(&self) -> &EngineRegistry {
        &self.inner.registry
    }

    /// Get the artifact store
    pub fn store(&self) -> &ArtifactStore {
        &self.inner.store
    }

    /// Get the job executor
    pub fn executor(&self) -> &JobExecutor {
        &self.inner.executor
    }
}
