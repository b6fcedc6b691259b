//! Artifact Store
//!
//! Owns every per-job workspace on disk:
//! - Workspace allocation (one directory per job, keyed by job ID)
//! - Artifact registration with a fixed retention window
//! - Time-based purge, deferred for artifacts under an active lease
//!
//! # Thread Safety
//!
//! The index is a single `parking_lot::Mutex`. It is never held across an
//! await point: purge marks its victims under the lock, deletes them with the
//! lock released, then commits or reverts under the lock again. An entry that
//! is being purged can't be leased or registered against.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::types::{
    Artifact, InputFile, PurgeReport, StorageError, StoreStats, Workspace,
};
use crate::upload::{safe_basename, UploadSet};

// ============================================================================
// Index Entries
// ============================================================================

struct WorkspaceEntry {
    path: PathBuf,
    expires_at: DateTime<Utc>,
    artifact: Option<Artifact>,
    /// Responses currently streaming this workspace's artifact
    leases: usize,
    /// Job failed; nothing in here may be served
    discarded: bool,
    /// Deletion in progress outside the lock
    purging: bool,
}

impl WorkspaceEntry {
    fn is_servable(&self) -> bool {
        !self.discarded && !self.purging
    }
}

// ============================================================================
// Artifact Store
// ============================================================================

/// Synchronized owner of all job workspaces and artifacts
#[derive(Clone)]
pub struct ArtifactStore {
    inner: Arc<ArtifactStoreInner>,
}

struct ArtifactStoreInner {
    root: PathBuf,
    retention: Duration,
    index: Mutex<HashMap<Uuid, WorkspaceEntry>>,
}

impl ArtifactStore {
    /// Open a store rooted at `root`
    ///
    /// Creates the root if needed and deletes workspaces left behind by an
    /// earlier process, which no index knows about anymore.
    pub async fn open(
        root: impl Into<PathBuf>,
        retention: std::time::Duration,
    ) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(StorageError::Root)?;

        let swept = sweep_stale_workspaces(&root).await.map_err(StorageError::Root)?;
        if swept > 0 {
            tracing::info!(count = swept, root = %root.display(), "Removed stale workspaces");
        }

        let retention = Duration::from_std(retention).unwrap_or_else(|_| Duration::hours(1));

        Ok(Self {
            inner: Arc::new(ArtifactStoreInner {
                root,
                retention,
                index: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    fn workspace_path(&self, job_id: Uuid) -> PathBuf {
        self.inner.root.join(job_id.to_string())
    }

    // ========================================================================
    // Workspace Lifecycle
    // ========================================================================

    /// Allocate an exclusive workspace for a job
    ///
    /// The cleanup entry is recorded before the directory exists, so a
    /// workspace can never be left behind without one.
    pub async fn create_workspace(&self, job_id: Uuid) -> Result<Workspace, StorageError> {
        let path = self.workspace_path(job_id);

        {
            let mut index = self.inner.index.lock();
            if index.contains_key(&job_id) {
                return Err(StorageError::Unavailable(job_id));
            }
            index.insert(
                job_id,
                WorkspaceEntry {
                    path: path.clone(),
                    expires_at: Utc::now() + self.inner.retention,
                    artifact: None,
                    leases: 0,
                    discarded: false,
                    purging: false,
                },
            );
        }

        let workspace = Workspace::new(job_id, path);
        if let Err(source) = create_layout(&workspace).await {
            tracing::error!(job_id = %job_id, error = %source, "Failed to create workspace");
            let _ = self.discard(job_id).await;
            return Err(StorageError::CreateWorkspace { job_id, source });
        }

        tracing::debug!(job_id = %job_id, "Created workspace");
        Ok(workspace)
    }

    /// Write uploads into the workspace's `input/` directory, in order
    ///
    /// Files are named `<index>_<sanitized name>` so two uploads with the same
    /// client filename never collide.
    pub async fn stage_inputs(
        &self,
        workspace: &Workspace,
        uploads: &UploadSet,
    ) -> Result<Vec<InputFile>, StorageError> {
        let mut staged = Vec::with_capacity(uploads.len());

        for (index, file) in uploads.iter().enumerate() {
            let name = format!("{:02}_{}", index, safe_basename(&file.file_name));
            let path = workspace.input_dir().join(name);

            tokio::fs::write(&path, &file.data)
                .await
                .map_err(|source| StorageError::WriteInput {
                    job_id: workspace.job_id(),
                    source,
                })?;

            staged.push(InputFile {
                index,
                path,
                original_name: file.file_name.clone(),
                extension: file.extension().unwrap_or_default(),
            });
        }

        Ok(staged)
    }

    /// Record a produced artifact; its retention window starts at `created_at`
    pub async fn register(&self, artifact: Artifact) -> Result<(), StorageError> {
        let job_id = artifact.job_id;

        tokio::fs::metadata(&artifact.path)
            .await
            .map_err(|_| StorageError::MissingArtifact(job_id))?;

        let mut index = self.inner.index.lock();
        let entry = index
            .get_mut(&job_id)
            .ok_or(StorageError::UnknownJob(job_id))?;

        if !entry.is_servable() || entry.artifact.is_some() {
            return Err(StorageError::Unavailable(job_id));
        }
        if !artifact.path.starts_with(&entry.path) {
            return Err(StorageError::MissingArtifact(job_id));
        }

        entry.expires_at = artifact.expires_at(self.inner.retention);

        tracing::info!(
            job_id = %job_id,
            file_name = %artifact.file_name,
            size = artifact.size,
            expires_at = %entry.expires_at,
            "Registered artifact"
        );

        entry.artifact = Some(artifact);
        Ok(())
    }

    /// Delete a failed job's workspace now
    ///
    /// Idempotent: an unknown job or an already-deleted directory is fine.
    /// A leased workspace is only marked; the next purge cycle deletes it.
    pub async fn discard(&self, job_id: Uuid) -> Result<(), StorageError> {
        let path = {
            let mut index = self.inner.index.lock();
            match index.get_mut(&job_id) {
                Some(entry) => {
                    entry.discarded = true;
                    entry.expires_at = Utc::now();
                    if entry.leases > 0 || entry.purging {
                        return Ok(());
                    }
                    entry.purging = true;
                    entry.path.clone()
                }
                None => self.workspace_path(job_id),
            }
        };

        let result = remove_workspace_dir(&path).await;

        {
            let mut index = self.inner.index.lock();
            match &result {
                Ok(()) => {
                    index.remove(&job_id);
                }
                Err(_) => {
                    if let Some(entry) = index.get_mut(&job_id) {
                        entry.purging = false;
                    }
                }
            }
        }

        match result {
            Ok(()) => {
                tracing::debug!(job_id = %job_id, "Discarded workspace");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(
                    job_id = %job_id,
                    error = %source,
                    "Failed to discard workspace, will retry on next purge"
                );
                Err(StorageError::Delete { job_id, source })
            }
        }
    }

    // ========================================================================
    // Leases
    // ========================================================================

    /// Pin a job's artifact for the duration of a download
    pub fn lease(&self, job_id: Uuid) -> Result<ArtifactLease, StorageError> {
        let mut index = self.inner.index.lock();
        let entry = index
            .get_mut(&job_id)
            .ok_or(StorageError::UnknownJob(job_id))?;

        if !entry.is_servable() {
            return Err(StorageError::Unavailable(job_id));
        }

        let artifact = entry
            .artifact
            .clone()
            .ok_or(StorageError::MissingArtifact(job_id))?;
        entry.leases += 1;

        Ok(ArtifactLease {
            store: self.clone(),
            artifact,
        })
    }

    fn release(&self, job_id: Uuid) {
        let mut index = self.inner.index.lock();
        if let Some(entry) = index.get_mut(&job_id) {
            entry.leases = entry.leases.saturating_sub(1);
        }
    }

    // ========================================================================
    // Purge
    // ========================================================================

    /// Delete every expired, unleased workspace
    pub async fn purge_expired(&self) -> PurgeReport {
        self.purge_expired_at(Utc::now()).await
    }

    /// Purge as if the current time were `now`
    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> PurgeReport {
        let mut report = PurgeReport::default();

        let victims: Vec<(Uuid, PathBuf)> = {
            let mut index = self.inner.index.lock();
            let mut victims = Vec::new();
            for (job_id, entry) in index.iter_mut() {
                if entry.purging || entry.expires_at > now {
                    continue;
                }
                if entry.leases > 0 {
                    report.deferred += 1;
                    continue;
                }
                entry.purging = true;
                victims.push((*job_id, entry.path.clone()));
            }
            victims
        };

        for (job_id, path) in victims {
            match remove_workspace_dir(&path).await {
                Ok(()) => {
                    self.inner.index.lock().remove(&job_id);
                    report.removed += 1;
                    tracing::debug!(job_id = %job_id, "Purged expired workspace");
                }
                Err(e) => {
                    if let Some(entry) = self.inner.index.lock().get_mut(&job_id) {
                        entry.purging = false;
                    }
                    report.failed += 1;
                    tracing::warn!(
                        job_id = %job_id,
                        error = %e,
                        "Failed to purge workspace, will retry next cycle"
                    );
                }
            }
        }

        if !report.is_empty() {
            tracing::info!(
                removed = report.removed,
                deferred = report.deferred,
                failed = report.failed,
                "Purge cycle finished"
            );
        }

        report
    }

    // ========================================================================
    // Query Methods
    // ========================================================================

    pub fn contains(&self, job_id: Uuid) -> bool {
        self.inner.index.lock().contains_key(&job_id)
    }

    pub fn stats(&self) -> StoreStats {
        let index = self.inner.index.lock();
        StoreStats {
            workspaces: index.len(),
            artifacts: index.values().filter(|e| e.artifact.is_some()).count(),
            leased: index.values().filter(|e| e.leases > 0).count(),
            discarded: index.values().filter(|e| e.discarded).count(),
        }
    }
}

// ============================================================================
// Artifact Lease
// ============================================================================

/// Scoped guarantee that an artifact is not purged while it is streamed
///
/// Released on drop.
pub struct ArtifactLease {
    store: ArtifactStore,
    artifact: Artifact,
}

impl ArtifactLease {
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Open the artifact for reading
    pub async fn open(&self) -> Result<tokio::fs::File, StorageError> {
        tokio::fs::File::open(&self.artifact.path)
            .await
            .map_err(|source| StorageError::ReadArtifact {
                job_id: self.artifact.job_id,
                source,
            })
    }
}

impl Drop for ArtifactLease {
    fn drop(&mut self) {
        self.store.release(self.artifact.job_id);
    }
}

impl std::fmt::Debug for ArtifactLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactLease")
            .field("job_id", &self.artifact.job_id)
            .finish()
    }
}

// ============================================================================
// Helpers
// ============================================================================

async fn create_layout(workspace: &Workspace) -> io::Result<()> {
    // `create_dir` rather than `create_dir_all`: an existing directory means
    // another job owns it.
    tokio::fs::create_dir(workspace.path()).await?;
    tokio::fs::create_dir(workspace.input_dir()).await?;
    tokio::fs::create_dir(workspace.output_dir()).await?;
    Ok(())
}

/// Remove a workspace directory; a missing directory counts as removed
pub(crate) async fn remove_workspace_dir(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove job directories (UUID-named) under the root
async fn sweep_stale_workspaces(root: &Path) -> io::Result<usize> {
    let mut count = 0;
    let mut entries = tokio::fs::read_dir(root).await?;

    while let Some(entry) = entries.next_entry().await? {
        let is_job_dir = entry
            .file_name()
            .to_str()
            .map(|name| Uuid::parse_str(name).is_ok())
            .unwrap_or(false);

        if is_job_dir && entry.file_type().await?.is_dir() {
            remove_workspace_dir(&entry.path()).await?;
            count += 1;
        }
    }

    Ok(count)
}

// ============================================================================
// Tests
// ============================================================================
