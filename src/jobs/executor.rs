//! Job Executor
//!
//! Drives one conversion from validated uploads to a registered artifact:
//!
//! 1. validate the upload set against the tool
//! 2. allocate a workspace and stage the inputs
//! 3. run the engine in its own task under the tool's timeout
//! 4. register the output, or discard the workspace on any failure
//!
//! The job itself runs on a spawned task, so a client that disconnects
//! mid-request cannot skip cleanup.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::job::{CompletedJob, ConversionJob, JobError};
use crate::artifacts::{Artifact, ArtifactStore, Workspace};
use crate::engine::{EngineError, EngineResult, ResolvedTool};
use crate::upload::{validate, UploadSet};

const CRASH_MESSAGE: &str = "Conversion engine crashed";

#[derive(Clone)]
pub struct JobExecutor {
    store: ArtifactStore,
}

impl JobExecutor {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Run one conversion to completion
    ///
    /// Validation failures are returned before any job or workspace exists.
    pub async fn run(
        &self,
        tool: ResolvedTool,
        uploads: UploadSet,
    ) -> Result<CompletedJob, JobError> {
        validate(&uploads, &tool.spec)?;

        let job = ConversionJob::new(tool.spec.id, uploads.len());
        let job_id = job.id;
        let executor = self.clone();

        match tokio::spawn(async move { executor.execute(job, tool, uploads).await }).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job task failed");
                if let Err(e) = self.store.discard(job_id).await {
                    tracing::warn!(job_id = %job_id, error = %e, "Failed to discard workspace");
                }
                Err(JobError::Engine(CRASH_MESSAGE.to_string()))
            }
        }
    }

    async fn execute(
        self,
        mut job: ConversionJob,
        tool: ResolvedTool,
        uploads: UploadSet,
    ) -> Result<CompletedJob, JobError> {
        job.start()?;
        let started = Instant::now();
        tracing::info!(
            job_id = %job.id,
            tool = job.tool,
            files = job.file_count,
            "Job started"
        );

        let result = match self.store.create_workspace(job.id).await {
            Ok(workspace) => self.convert(&job, &tool, &workspace, &uploads).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(artifact) => {
                job.succeed()?;
                tracing::info!(
                    job_id = %job.id,
                    tool = job.tool,
                    size = artifact.size,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job succeeded"
                );
                Ok(CompletedJob { job, artifact })
            }
            Err(err) => {
                if let Err(e) = self.store.discard(job.id).await {
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to discard workspace");
                }
                job.fail()?;

                match &err {
                    JobError::Storage(e) => {
                        tracing::error!(job_id = %job.id, error = %e, "Job failed")
                    }
                    _ => tracing::warn!(
                        job_id = %job.id,
                        kind = err.kind(),
                        error = %err,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Job failed"
                    ),
                }
                Err(err)
            }
        }
    }

    async fn convert(
        &self,
        job: &ConversionJob,
        tool: &ResolvedTool,
        workspace: &Workspace,
        uploads: &UploadSet,
    ) -> Result<Artifact, JobError> {
        let inputs = self.store.stage_inputs(workspace, uploads).await?;

        let engine = Arc::clone(&tool.engine);
        let engine_workspace = workspace.clone();
        let mut task: JoinHandle<EngineResult> =
            tokio::spawn(async move { engine.convert(&engine_workspace, &inputs).await });

        let output = match tokio::time::timeout(tool.spec.timeout, &mut task).await {
            Ok(Ok(Ok(output))) => output,
            Ok(Ok(Err(e))) => return Err(self.engine_error(e)),
            Ok(Err(e)) => {
                tracing::error!(job_id = %job.id, error = %e, "Conversion engine panicked");
                return Err(JobError::Engine(CRASH_MESSAGE.to_string()));
            }
            Err(_) => {
                task.abort();
                self.discard_when_finished(job.id, task);
                return Err(JobError::Timeout {
                    secs: tool.spec.timeout.as_secs(),
                });
            }
        };

        if !workspace.contains(&output.path) {
            tracing::error!(job_id = %job.id, "Engine output is outside the job workspace");
            return Err(JobError::Engine(
                "Conversion engine produced no usable output".to_string(),
            ));
        }
        let size = tokio::fs::metadata(&output.path)
            .await
            .map_err(|_| JobError::Engine("Conversion engine produced no output".to_string()))?
            .len();

        let artifact = Artifact {
            job_id: job.id,
            path: output.path,
            created_at: Utc::now(),
            mime_type: output.mime_type.to_string(),
            file_name: tool.spec.download_name(uploads),
            size,
        };
        self.store.register(artifact.clone()).await?;

        Ok(artifact)
    }

    /// Discard once more when the aborted engine task has been cancelled.
    ///
    /// Cancellation drops the engine future, which kills a LibreOffice child.
    /// A `spawn_blocking` closure it was awaiting keeps running to completion,
    /// but its writes land in the already deleted `output/` directory and fail.
    fn discard_when_finished(&self, job_id: Uuid, task: JoinHandle<EngineResult>) {
        let store = self.store.clone();
        tokio::spawn(async move {
            let _ = task.await;
            if let Err(e) = store.discard(job_id).await {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to discard timed-out workspace");
            }
        });
    }

    fn engine_error(&self, error: EngineError) -> JobError {
        let message = redact_paths(&error.to_string(), self.store.root());
        match error {
            EngineError::Unavailable(_) => JobError::EngineUnavailable(message),
            _ => JobError::Engine(message),
        }
    }
}

/// Replace every path under `root` in `message` with a placeholder
pub(crate) fn redact_paths(message: &str, root: &Path) -> String {
    let root = root.to_string_lossy();
    if root.is_empty() {
        return message.to_string();
    }

    let mut redacted = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(start) = rest.find(root.as_ref()) {
        redacted.push_str(&rest[..start]);
        redacted.push_str("<file>");

        let after = &rest[start + root.len()..];
        let end = after
            .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ',' | ':' | ')' | ']'))
            .unwrap_or(after.len());
        rest = &after[end..];
    }
    redacted.push_str(rest);
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ConversionEngine, EngineKind, EngineOutput, InputFile, PDF_MIME};
    use crate::jobs::JobState;
    use crate::tools::{DownloadName, ToolSpec};
    use crate::upload::{UploadedFile, ValidationError};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Scripted engine behaviours
    enum Behaviour {
        CopyFirstInput,
        FailWithPath,
        Panic,
        Hang,
        SlowFailure(Duration),
        WriteOutside(PathBuf),
        LateBlockingWrite(Duration),
    }

    struct ScriptedEngine(Behaviour);

    #[async_trait]
    impl ConversionEngine for ScriptedEngine {
        fn kind(&self) -> EngineKind {
            EngineKind::PdfMerge
        }

        fn backend(&self) -> &'static str {
            "scripted"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn convert(&self, workspace: &Workspace, inputs: &[InputFile]) -> EngineResult {
            match &self.0 {
                Behaviour::CopyFirstInput => {
                    let output = workspace.output_path("out.pdf");
                    tokio::fs::copy(&inputs[0].path, &output).await?;
                    Ok(EngineOutput {
                        path: output,
                        mime_type: PDF_MIME,
                    })
                }
                Behaviour::FailWithPath => Err(EngineError::MalformedInput(format!(
                    "cannot parse {}: bad xref",
                    inputs[0].path.display()
                ))),
                Behaviour::Panic => panic!("engine bug"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
                Behaviour::SlowFailure(delay) => {
                    tokio::time::sleep(*delay).await;
                    Err(EngineError::Failed("late failure".to_string()))
                }
                Behaviour::LateBlockingWrite(delay) => {
                    let delay = *delay;
                    let output = workspace.output_path("late.pdf");
                    let target = output.clone();
                    crate::engine::run_blocking(move || {
                        std::thread::sleep(delay);
                        std::fs::write(&target, b"%PDF late")?;
                        Ok(())
                    })
                    .await?;
                    Ok(EngineOutput {
                        path: output,
                        mime_type: PDF_MIME,
                    })
                }
                Behaviour::WriteOutside(path) => {
                    tokio::fs::write(path, b"%PDF").await?;
                    Ok(EngineOutput {
                        path: path.clone(),
                        mime_type: PDF_MIME,
                    })
                }
            }
        }
    }

    fn tool(behaviour: Behaviour, timeout: Duration) -> ResolvedTool {
        ResolvedTool {
            spec: ToolSpec {
                id: "merge-pdf",
                accepted_types: &["pdf"],
                min_files: 1,
                max_files: 3,
                engine: EngineKind::PdfMerge,
                timeout,
                download_name: DownloadName::Fixed("merged_document.pdf"),
            },
            engine: Arc::new(ScriptedEngine(behaviour)),
        }
    }

    fn uploads() -> UploadSet {
        vec![
            UploadedFile::new("a.pdf", b"%PDF-1.4 first".to_vec()),
            UploadedFile::new("b.pdf", b"%PDF-1.4 second".to_vec()),
        ]
        .into_iter()
        .collect()
    }

    async fn executor(temp_dir: &TempDir) -> JobExecutor {
        let store = ArtifactStore::open(temp_dir.path().join("ws"), Duration::from_secs(3600))
            .await
            .unwrap();
        JobExecutor::new(store)
    }

    async fn wait_until_empty(store: &ArtifactStore) {
        for _ in 0..100 {
            if store.stats().workspaces == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_success_registers_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir).await;

        let completed = executor
            .run(tool(Behaviour::CopyFirstInput, Duration::from_secs(5)), uploads())
            .await
            .unwrap();

        assert_eq!(completed.job.state(), JobState::Succeeded);
        assert_eq!(completed.artifact.file_name, "merged_document.pdf");
        assert_eq!(completed.artifact.size, "%PDF-1.4 first".len() as u64);
        assert!(executor.store().contains(completed.job.id));
        assert!(executor.store().lease(completed.job.id).is_ok());
    }

    #[tokio::test]
    async fn test_validation_failure_allocates_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir).await;
        let too_many: UploadSet = (0..4)
            .map(|i| UploadedFile::new(format!("{}.pdf", i), b"%PDF".to_vec()))
            .collect();

        let err = executor
            .run(tool(Behaviour::CopyFirstInput, Duration::from_secs(5)), too_many)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            JobError::Validation(ValidationError::TooManyFiles { count: 4, max: 3 })
        ));
        assert_eq!(executor.store().stats().workspaces, 0);
        assert_eq!(
            std::fs::read_dir(executor.store().root()).unwrap().count(),
            0
        );
    }

    #[tokio::test]
    async fn test_engine_error_discards_and_redacts() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir).await;

        let err = executor
            .run(tool(Behaviour::FailWithPath, Duration::from_secs(5)), uploads())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "ConversionEngineError");
        let message = err.to_string();
        assert!(message.contains("bad xref"));
        assert!(!message.contains(&*executor.store().root().to_string_lossy()));
        assert_eq!(executor.store().stats().workspaces, 0);
        assert_eq!(
            std::fs::read_dir(executor.store().root()).unwrap().count(),
            0
        );
    }

    #[tokio::test]
    async fn test_engine_panic_is_engine_error() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir).await;

        let err = executor
            .run(tool(Behaviour::Panic, Duration::from_secs(5)), uploads())
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Engine(_)));
        assert_eq!(executor.store().stats().workspaces, 0);
    }

    #[tokio::test]
    async fn test_timeout_discards_workspace() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir).await;

        let started = Instant::now();
        let err = executor
            .run(tool(Behaviour::Hang, Duration::from_millis(100)), uploads())
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));

        wait_until_empty(executor.store()).await;
        assert_eq!(executor.store().stats().workspaces, 0);
        assert_eq!(
            std::fs::read_dir(executor.store().root()).unwrap().count(),
            0
        );
    }

    #[tokio::test]
    async fn test_timeout_leaves_nothing_after_blocking_work_finishes() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir).await;

        let err = executor
            .run(
                tool(
                    Behaviour::LateBlockingWrite(Duration::from_millis(300)),
                    Duration::from_millis(50),
                ),
                uploads(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Timeout { .. }));

        // The blocking write runs on after cancellation and must not
        // resurrect the workspace
        tokio::time::sleep(Duration::from_millis(600)).await;
        wait_until_empty(executor.store()).await;
        assert_eq!(executor.store().stats().workspaces, 0);
        assert_eq!(
            std::fs::read_dir(executor.store().root()).unwrap().count(),
            0
        );
    }

    #[tokio::test]
    async fn test_output_outside_workspace_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir).await;
        let stray = temp_dir.path().join("stray.pdf");

        let err = executor
            .run(
                tool(Behaviour::WriteOutside(stray), Duration::from_secs(5)),
                uploads(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::Engine(_)));
        assert_eq!(executor.store().stats().artifacts, 0);
    }

    #[tokio::test]
    async fn test_dropped_caller_still_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let executor = executor(&temp_dir).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            executor.run(
                tool(
                    Behaviour::SlowFailure(Duration::from_millis(200)),
                    Duration::from_secs(5),
                ),
                uploads(),
            ),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        wait_until_empty(executor.store()).await;
        assert_eq!(executor.store().stats().workspaces, 0);
    }

    #[test]
    fn test_redact_paths() {
        let root = Path::new("/var/tmp/doc-converter");
        let message = "cannot open /var/tmp/doc-converter/1234/input/00_a.pdf: bad header";

        assert_eq!(redact_paths(message, root), "cannot open <file>: bad header");
        assert_eq!(redact_paths("no paths here", root), "no paths here");
        assert_eq!(
            redact_paths(
                "'/var/tmp/doc-converter/x/in.docx' -> '/var/tmp/doc-converter/x/out.pdf'",
                root
            ),
            "'<file>' -> '<file>'"
        );
    }
}
