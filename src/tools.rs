//! Conversion tool catalog
//!
//! Each tool exposed over HTTP has a static [`ToolSpec`] describing which
//! files it accepts and which engine performs the conversion.

use std::time::Duration;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::engine::EngineKind;
use crate::upload::UploadSet;

/// How the download filename of a tool's output is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadName {
    /// `<input stem>.<ext>`
    InputStem(&'static str),
    /// Always the same name
    Fixed(&'static str),
    /// `<input stem>.<ext>` for a single input, otherwise the fixed name
    StemIfSingle {
        ext: &'static str,
        multiple: &'static str,
    },
}

/// Static configuration of one conversion tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    /// URL identifier, e.g. `pdf-to-word`
    pub id: &'static str,

    /// Accepted lowercase extensions
    pub accepted_types: &'static [&'static str],

    pub min_files: usize,
    pub max_files: usize,

    /// Engine registry key
    pub engine: EngineKind,

    /// Upper bound on a single engine invocation
    #[serde(skip)]
    pub timeout: Duration,

    #[serde(skip)]
    pub download_name: DownloadName,
}

impl ToolSpec {
    pub fn accepts(&self, extension: &str) -> bool {
        self.accepted_types
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(extension))
    }

    /// Filename presented to the client for this tool's output
    pub fn download_name(&self, uploads: &UploadSet) -> String {
        let stem = uploads.first().map(|file| file.stem());
        match (self.download_name, stem) {
            (DownloadName::InputStem(ext), Some(stem)) => format!("{}.{}", stem, ext),
            (DownloadName::InputStem(ext), None) => format!("converted.{}", ext),
            (DownloadName::Fixed(name), _) => name.to_string(),
            (DownloadName::StemIfSingle { ext, .. }, Some(stem)) if uploads.len() == 1 => {
                format!("{}.{}", stem, ext)
            }
            (DownloadName::StemIfSingle { multiple, .. }, _) => multiple.to_string(),
        }
    }
}

/// Build the catalog of tools served by this process
pub fn default_tools(engines: &EngineConfig) -> Vec<ToolSpec> {
    let timeout = Duration::from_secs(engines.timeout_secs);
    let office_timeout = Duration::from_secs(engines.office_timeout_secs);

    vec![
        ToolSpec {
            id: "pdf-to-word",
            accepted_types: &["pdf"],
            min_files: 1,
            max_files: 1,
            engine: EngineKind::PdfToWord,
            timeout,
            download_name: DownloadName::InputStem("docx"),
        },
        ToolSpec {
            id: "word-to-pdf",
            accepted_types: &["doc", "docx"],
            min_files: 1,
            max_files: 1,
            engine: EngineKind::WordToPdf,
            timeout: office_timeout,
            download_name: DownloadName::InputStem("pdf"),
        },
        ToolSpec {
            id: "merge-pdf",
            accepted_types: &["pdf"],
            min_files: 2,
            max_files: 10,
            engine: EngineKind::PdfMerge,
            timeout,
            download_name: DownloadName::Fixed("merged_document.pdf"),
        },
        ToolSpec {
            id: "image-to-pdf",
            accepted_types: &["jpg", "jpeg", "png"],
            min_files: 1,
            max_files: 20,
            engine: EngineKind::ImagesToPdf,
            timeout,
            download_name: DownloadName::StemIfSingle {
                ext: "pdf",
                multiple: "images_combined.pdf",
            },
        },
    ]
}
