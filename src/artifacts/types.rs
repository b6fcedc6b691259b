//! Workspace and artifact types

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Exclusively-owned scratch directory of one conversion job
///
/// Layout: `<root>/<job_id>/input/` for uploads, `<root>/<job_id>/output/`
/// for whatever the engine produces.
#[derive(Debug, Clone)]
pub struct Workspace {
    job_id: Uuid,
    path: PathBuf,
}

impl Workspace {
    pub(crate) fn new(job_id: Uuid, path: PathBuf) -> Self {
        Self { job_id, path }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn input_dir(&self) -> PathBuf {
        self.path.join("input")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path.join("output")
    }

    /// Path for a named output file
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir().join(file_name)
    }

    /// Whether a path lies inside this workspace
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.path)
    }
}

/// An uploaded file staged read-only into a workspace's `input/` directory
#[derive(Debug, Clone)]
pub struct InputFile {
    /// Position in the caller-declared order, starting at 0
    pub index: usize,

    pub path: PathBuf,

    /// Filename as declared by the client
    pub original_name: String,

    /// Lowercased extension
    pub extension: String,
}

/// A produced output file awaiting download or expiry
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    /// Owning job (back-reference only)
    pub job_id: Uuid,

    /// Absolute path inside the job's workspace
    #[serde(skip)]
    pub path: PathBuf,

    pub created_at: DateTime<Utc>,

    pub mime_type: String,

    /// Filename presented to the client
    pub file_name: String,

    pub size: u64,
}

impl Artifact {
    pub fn expires_at(&self, retention: Duration) -> DateTime<Utc> {
        self.created_at + retention
    }
}

/// Outcome of one purge cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Workspaces deleted
    pub removed: usize,
    /// Expired but leased, left for a later cycle
    pub deferred: usize,
    /// Deletion failed, retried next cycle
    pub failed: usize,
}

impl PurgeReport {
    pub fn is_empty(&self) -> bool {
        self.removed == 0 && self.deferred == 0 && self.failed == 0
    }
}

/// Snapshot of the store index
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub workspaces: usize,
    pub artifacts: usize,
    pub leased: usize,
    pub discarded: usize,
}

/// Artifact store errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to create workspace for job {job_id}: {source}")]
    CreateWorkspace {
        job_id: Uuid,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write input file for job {job_id}: {source}")]
    WriteInput {
        job_id: Uuid,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open artifact of job {job_id}: {source}")]
    ReadArtifact {
        job_id: Uuid,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete workspace of job {job_id}: {source}")]
    Delete {
        job_id: Uuid,
        #[source]
        source: std::io::Error,
    },

    #[error("No workspace for job {0}")]
    UnknownJob(Uuid),

    #[error("Workspace of job {0} is no longer available")]
    Unavailable(Uuid),

    #[error("Artifact of job {0} is missing from its workspace")]
    MissingArtifact(Uuid),

    #[error("Failed to prepare workspace root: {0}")]
    Root(#[source] std::io::Error),
}
