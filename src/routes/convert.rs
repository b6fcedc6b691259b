//! Conversion endpoint
//!
//! `POST /api/convert/:tool` takes a multipart body and answers with the
//! converted file.
//!
//! Files are sent either as a single `file` field or as indexed fields
//! `file_0..file_{n-1}`, optionally with a `file_count` field. Indexed
//! fields are ordered by index, never by arrival order.

use std::collections::BTreeMap;

use axum::{
    body::{Body, Bytes},
    extract::{multipart::Field, DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::{header, StatusCode},
    response::Response,
    routing::post,
    Router,
};
use futures::stream;
use tokio::io::AsyncReadExt;

use crate::artifacts::ArtifactLease;
use crate::config::MAX_FILE_SIZE;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::upload::{UploadSet, UploadedFile, ValidationError};

/// Read size when streaming an artifact
const CHUNK_SIZE: usize = 64 * 1024;

pub fn router(body_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/:tool", post(convert))
        .layer(DefaultBodyLimit::max(body_limit))
}

/// Run a conversion and stream back the artifact
async fn convert(
    State(state): State<AppState>,
    Path(tool_id): Path<String>,
    request: Request,
) -> Result<Response> {
    // Unknown tools are rejected before the body is read
    let tool = state.registry().resolve(&tool_id)?;

    let multipart = Multipart::from_request(request, &state)
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?;
    let uploads = read_uploads(multipart, tool.spec.max_files).await?;

    tracing::info!(tool = %tool_id, files = uploads.len(), "Conversion requested");

    let completed = state.executor().run(tool, uploads).await?;
    let lease = state.store().lease(completed.job.id)?;

    artifact_response(lease).await
}

// ============================================================================
// Multipart
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum FieldSlot {
    Single,
    Indexed(usize),
    Count,
    Ignored,
}

fn field_slot(name: &str) -> FieldSlot {
    match name {
        "file" => FieldSlot::Single,
        "file_count" => FieldSlot::Count,
        _ => match name.strip_prefix("file_").map(str::parse::<usize>) {
            Some(Ok(index)) => FieldSlot::Indexed(index),
            _ => FieldSlot::Ignored,
        },
    }
}

/// Files gathered from a multipart body, before ordering
#[derive(Debug, Default)]
struct ReceivedFiles {
    single: Option<UploadedFile>,
    indexed: BTreeMap<usize, UploadedFile>,
    declared_count: Option<usize>,
}

async fn read_uploads(mut multipart: Multipart, max_files: usize) -> Result<UploadSet> {
    let mut received = ReceivedFiles::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::debug!("Failed to read multipart field: {}", e);
        AppError::BadRequest(format!("Failed to read upload: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();
        let slot = field_slot(&name);

        if slot == FieldSlot::Ignored {
            tracing::debug!(field = %name, "Ignoring unknown multipart field");
            continue;
        }

        if slot == FieldSlot::Count {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read file_count: {}", e)))?;
            let count = text.trim().parse::<usize>().map_err(|_| {
                AppError::BadRequest("file_count must be a non-negative integer".to_string())
            })?;
            received.declared_count = Some(count);
            continue;
        }

        let file_name = field
            .file_name()
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::BadRequest(format!("Field '{}' has no filename", name)))?;
        let file = read_file_field(field, file_name).await?;
        let duplicate = match slot {
            FieldSlot::Single => received.single.replace(file).is_some(),
            FieldSlot::Indexed(index) => received.indexed.insert(index, file).is_some(),
            FieldSlot::Count | FieldSlot::Ignored => false,
        };
        if duplicate {
            return Err(AppError::BadRequest(format!("Duplicate field '{}'", name)));
        }
    }

    received.into_upload_set(max_files)
}

/// Read one file field, holding at most `MAX_FILE_SIZE` bytes in memory
///
/// An oversized field is drained and kept only as its name and size, so the
/// validator still reports it in its usual order.
async fn read_file_field(mut field: Field<'_>, file_name: String) -> Result<UploadedFile> {
    let mut data = Vec::new();
    let mut size: u64 = 0;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read file data: {}", e)))?
    {
        size += chunk.len() as u64;
        if size <= MAX_FILE_SIZE {
            data.extend_from_slice(&chunk);
        } else if !data.is_empty() {
            data = Vec::new();
        }
    }

    if size > MAX_FILE_SIZE {
        tracing::debug!(file_name = %file_name, size, "Dropped oversized upload");
        return Ok(UploadedFile::oversized(file_name, size));
    }
    Ok(UploadedFile::new(file_name, data))
}

impl ReceivedFiles {
    /// Order the received files by index
    fn into_upload_set(mut self, max_files: usize) -> Result<UploadSet> {
        if self.single.is_some() && !self.indexed.is_empty() {
            return Err(AppError::BadRequest(
                "Send either 'file' or 'file_0'..'file_N', not both".to_string(),
            ));
        }

        if let Some(file) = self.single {
            return Ok(std::iter::once(file).collect());
        }

        match self.declared_count {
            Some(count) => {
                if count > max_files {
                    return Err(ValidationError::TooManyFiles {
                        count,
                        max: max_files,
                    }
                    .into());
                }

                let mut files = Vec::with_capacity(count.min(self.indexed.len()));
                for index in 0..count {
                    let file = self.indexed.remove(&index).ok_or_else(|| {
                        AppError::BadRequest(format!("Missing file {} (field 'file_{}')", index + 1, index))
                    })?;
                    files.push(file);
                }
                if !self.indexed.is_empty() {
                    tracing::debug!(
                        extra = self.indexed.len(),
                        "Ignoring indexed fields beyond file_count"
                    );
                }
                Ok(files.into_iter().collect())
            }
            None => Ok(self.indexed.into_values().collect()),
        }
    }
}

// ============================================================================
// Response
// ============================================================================

async fn artifact_response(lease: ArtifactLease) -> Result<Response> {
    let file = lease.open().await?;
    let artifact = lease.artifact().clone();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.mime_type)
        .header(header::CONTENT_LENGTH, artifact.size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.file_name),
        )
        .body(artifact_body(file, lease))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Stream the file; the lease lives inside the stream so the workspace
/// cannot be purged until the body is fully sent or dropped.
fn artifact_body(file: tokio::fs::File, lease: ArtifactLease) -> Body {
    let chunks = stream::unfold(Some((file, lease)), |state| async move {
        let Some((mut file, lease)) = state else {
            return None;
        };
        let mut buf = vec![0u8; CHUNK_SIZE];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some((file, lease))))
            }
            Err(e) => Some((Err(e), None)),
        }
    });
    Body::from_stream(chunks)
}
