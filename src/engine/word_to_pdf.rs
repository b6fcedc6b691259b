//! Word → PDF via a headless LibreOffice subprocess
//!
//! Each run gets its own LibreOffice user profile inside the job workspace,
//! so concurrent conversions never contend for a shared profile lock. The
//! child is killed if the conversion future is dropped (timeout or abort).

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{
    single_input, ConversionEngine, EngineError, EngineKind, EngineOutput, EngineResult,
    InputFile, PDF_MIME,
};
use crate::artifacts::Workspace;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything shorter cannot be a real PDF
const MIN_PDF_LEN: u64 = 50;

/// Keep only the tail of a noisy stderr
const STDERR_TAIL: usize = 400;

#[derive(Debug, Clone)]
pub struct WordToPdfEngine {
    binary: String,
}

impl WordToPdfEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl ConversionEngine for WordToPdfEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::WordToPdf
    }

    fn backend(&self) -> &'static str {
        "libreoffice"
    }

    async fn is_available(&self) -> bool {
        let mut probe = Command::new(&self.binary);
        probe
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(PROBE_TIMEOUT, probe.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                tracing::debug!(binary = %self.binary, error = %e, "LibreOffice probe failed");
                false
            }
            Err(_) => {
                tracing::warn!(binary = %self.binary, "LibreOffice probe timed out");
                false
            }
        }
    }

    async fn convert(&self, workspace: &Workspace, inputs: &[InputFile]) -> EngineResult {
        let input = single_input(inputs)?;
        let output_dir = workspace.output_dir();
        let profile_dir = workspace.path().join("profile");

        let output = Command::new(&self.binary)
            .arg(format!(
                "-env:UserInstallation=file://{}",
                profile_dir.display()
            ))
            .args(["--headless", "--norestore", "--nolockcheck"])
            .args(["--convert-to", "pdf", "--outdir"])
            .arg(&output_dir)
            .arg(&input.path)
            .env("HOME", workspace.path())
            .current_dir(workspace.path())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => EngineError::Unavailable(format!(
                    "LibreOffice executable '{}' not found",
                    self.binary
                )),
                _ => EngineError::Failed(format!("failed to start LibreOffice: {}", e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Failed(format!(
                "LibreOffice exited with {}: {}",
                output.status,
                tail(stderr.trim(), STDERR_TAIL)
            )));
        }

        let pdf_path = locate_output(&output_dir, &input.path).await?;
        verify_pdf(&pdf_path).await?;

        tracing::debug!(job_id = %workspace.job_id(), "Word document converted to PDF");

        Ok(EngineOutput {
            path: pdf_path,
            mime_type: PDF_MIME,
        })
    }
}

/// LibreOffice names its output after the input stem; fall back to any PDF
/// it left in the output directory.
async fn locate_output(output_dir: &Path, input: &Path) -> Result<PathBuf, EngineError> {
    if let Some(stem) = input.file_stem() {
        let expected = output_dir.join(format!("{}.pdf", stem.to_string_lossy()));
        if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
            return Ok(expected);
        }
    }

    let mut entries = tokio::fs::read_dir(output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if is_pdf {
            return Ok(path);
        }
    }

    Err(EngineError::InvalidOutput(
        "LibreOffice did not produce a PDF".to_string(),
    ))
}

async fn verify_pdf(path: &Path) -> Result<(), EngineError> {
    let bytes = tokio::fs::read(path).await?;
    if (bytes.len() as u64) < MIN_PDF_LEN || !bytes.starts_with(b"%PDF") {
        return Err(EngineError::InvalidOutput(
            "LibreOffice output is not a valid PDF".to_string(),
        ));
    }
    Ok(())
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((offset, _)) => &text[offset..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::upload::{UploadSet, UploadedFile};
    use tempfile::TempDir;
    use uuid::Uuid;

    const MISSING_BINARY: &str = "doc-converter-no-such-libreoffice";

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let engine = WordToPdfEngine::new(MISSING_BINARY);
        assert!(!engine.is_available().await);

        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(temp_dir.path(), Duration::from_secs(3600))
            .await
            .unwrap();
        let workspace = store.create_workspace(Uuid::new_v4()).await.unwrap();
        let uploads: UploadSet = vec![UploadedFile::new("letter.docx", b"PK\x03\x04".to_vec())]
            .into_iter()
            .collect();
        let inputs = store.stage_inputs(&workspace, &uploads).await.unwrap();

        let result = engine.convert(&workspace, &inputs).await;
        assert!(matches!(result, Err(EngineError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_locate_output_prefers_input_stem() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path();
        tokio::fs::write(out.join("other.pdf"), b"%PDF").await.unwrap();
        tokio::fs::write(out.join("00_letter.pdf"), b"%PDF").await.unwrap();

        let found = locate_output(out, Path::new("/ws/input/00_letter.docx"))
            .await
            .unwrap();
        assert_eq!(found, out.join("00_letter.pdf"));
    }

    #[tokio::test]
    async fn test_locate_output_missing() {
        let temp_dir = TempDir::new().unwrap();
        let result = locate_output(temp_dir.path(), Path::new("/ws/input/00_a.doc")).await;
        assert!(matches!(result, Err(EngineError::InvalidOutput(_))));
    }

    #[tokio::test]
    async fn test_verify_pdf_rejects_stub() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("x.pdf");
        tokio::fs::write(&path, b"%PDF-1.4").await.unwrap();

        assert!(matches!(verify_pdf(&path).await, Err(EngineError::InvalidOutput(_))));
    }

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        assert_eq!(tail("ééé", 2), "éé");
    }
}
