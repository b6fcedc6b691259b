//! Upload policy checks
//!
//! Runs before any workspace is created or engine invoked. Only the first
//! violation is reported.

use super::types::{UploadSet, ValidationError};
use crate::config::MAX_FILE_SIZE;
use crate::tools::ToolSpec;

/// Check an upload set against a tool's policy
pub fn validate(uploads: &UploadSet, tool: &ToolSpec) -> Result<(), ValidationError> {
    if uploads.is_empty() {
        return Err(ValidationError::EmptyUpload);
    }

    if uploads.len() > tool.max_files {
        return Err(ValidationError::TooManyFiles {
            count: uploads.len(),
            max: tool.max_files,
        });
    }

    if uploads.len() < tool.min_files {
        return Err(ValidationError::TooFewFiles {
            count: uploads.len(),
            min: tool.min_files,
        });
    }

    for (index, file) in uploads.iter().enumerate() {
        let accepted = file
            .extension()
            .map(|ext| tool.accepts(&ext))
            .unwrap_or(false);
        if !accepted {
            return Err(ValidationError::UnsupportedType {
                index: index + 1,
                allowed: tool.accepted_types.join(", "),
            });
        }

        if file.size() > MAX_FILE_SIZE {
            return Err(ValidationError::file_too_large(index + 1, file.size()));
        }

        if file.size() == 0 {
            return Err(ValidationError::EmptyFile { index: index + 1 });
        }
    }

    Ok(())
}
