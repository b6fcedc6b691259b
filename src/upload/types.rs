//! Upload types shared by the HTTP layer, the validator and the executor

use axum::body::Bytes;

use crate::config::MAX_FILE_SIZE;

// ============================================================================
// Upload Set
// ============================================================================

/// A single uploaded file as received from the client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Filename declared by the client (untrusted)
    pub file_name: String,

    /// Raw file contents; empty for an oversized upload
    pub data: Bytes,

    /// Size as received, which may exceed `data` for an oversized upload
    size: u64,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            file_name: file_name.into(),
            size: data.len() as u64,
            data,
        }
    }

    /// An upload whose contents were dropped because they exceed the
    /// per-file limit; only its name and size are kept for validation
    pub fn oversized(file_name: impl Into<String>, size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            data: Bytes::new(),
            size,
        }
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Lowercased extension taken from the filename suffix
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.file_name.rsplit_once('.')?;
        if ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Filename without directories or extension, safe for a download name
    pub fn stem(&self) -> String {
        let base = safe_basename(&self.file_name);
        match base.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => base,
        }
    }
}

/// Ordered files submitted for one conversion request
///
/// Order is the caller-declared order (field index), never arrival order.
#[derive(Debug, Clone, Default)]
pub struct UploadSet {
    files: Vec<UploadedFile>,
}

impl UploadSet {
    pub fn new(files: Vec<UploadedFile>) -> Self {
        Self { files }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UploadedFile> {
        self.files.iter()
    }

    pub fn first(&self) -> Option<&UploadedFile> {
        self.files.first()
    }
}

impl FromIterator<UploadedFile> for UploadSet {
    fn from_iter<I: IntoIterator<Item = UploadedFile>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Reduce a client filename to a plain basename with a restricted charset
///
/// Path separators, drive prefixes and control characters are dropped so the
/// result can never escape the directory it is joined onto.
pub fn safe_basename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');

    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

// ============================================================================
// Validation Errors
// ============================================================================

/// First policy violation found in an upload set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("No files uploaded")]
    EmptyUpload,

    #[error("Too many files: {count} uploaded (max: {max})")]
    TooManyFiles { count: usize, max: usize },

    #[error("Too few files: {count} uploaded (min: {min})")]
    TooFewFiles { count: usize, min: usize },

    #[error("File {index} has an unsupported type (allowed: {allowed})")]
    UnsupportedType { index: usize, allowed: String },

    #[error("File {index} is too large: {size} bytes (max: {max})")]
    FileTooLarge { index: usize, size: u64, max: u64 },

    #[error("File {index} is empty")]
    EmptyFile { index: usize },
}

impl ValidationError {
    /// Stable variant name reported to clients
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyUpload => "EmptyUpload",
            Self::TooManyFiles { .. } => "TooManyFiles",
            Self::TooFewFiles { .. } => "TooFewFiles",
            Self::UnsupportedType { .. } => "UnsupportedType",
            Self::FileTooLarge { .. } => "FileTooLarge",
            Self::EmptyFile { .. } => "EmptyFile",
        }
    }

    pub(crate) fn file_too_large(index: usize, size: u64) -> Self {
        Self::FileTooLarge {
            index,
            size,
            max: MAX_FILE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_is_case_insensitive() {
        let file = UploadedFile::new("Report.PDF", vec![1u8]);
        assert_eq!(file.extension().as_deref(), Some("pdf"));

        let file = UploadedFile::new("archive.tar.GZ", vec![1u8]);
        assert_eq!(file.extension().as_deref(), Some("gz"));
    }

    #[test]
    fn test_extension_missing() {
        assert_eq!(UploadedFile::new("README", vec![1u8]).extension(), None);
        assert_eq!(UploadedFile::new("trailing.", vec![1u8]).extension(), None);
    }

    #[test]
    fn test_safe_basename_strips_paths() {
        assert_eq!(safe_basename("../../etc/passwd"), "passwd");
        assert_eq!(safe_basename("C:\\Users\\me\\doc.docx"), "doc.docx");
        assert_eq!(safe_basename("my report (1).pdf"), "my_report__1_.pdf");
        assert_eq!(safe_basename("..."), "file");
    }

    #[test]
    fn test_stem() {
        assert_eq!(UploadedFile::new("dir/Quarterly.pdf", vec![1u8]).stem(), "Quarterly");
        assert_eq!(UploadedFile::new("noext", vec![1u8]).stem(), "noext");
    }
}
