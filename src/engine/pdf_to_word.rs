//! PDF → Word
//!
//! Extracts each page's text with lopdf and writes it into a DOCX package,
//! a page break separating source pages. Layout and images are not carried
//! over.

use std::path::Path;

use async_trait::async_trait;

use super::{
    docx, pdf, run_blocking, single_input, ConversionEngine, EngineError, EngineKind,
    EngineOutput, EngineResult, InputFile, DOCX_MIME,
};
use crate::artifacts::Workspace;

const OUTPUT_NAME: &str = "converted.docx";

#[derive(Debug, Default)]
pub struct PdfToWordEngine;

impl PdfToWordEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConversionEngine for PdfToWordEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::PdfToWord
    }

    fn backend(&self) -> &'static str {
        "lopdf text extraction"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn convert(&self, workspace: &Workspace, inputs: &[InputFile]) -> EngineResult {
        let source = single_input(inputs)?.path.clone();
        let output = workspace.output_path(OUTPUT_NAME);

        let target = output.clone();
        let pages = run_blocking(move || convert_blocking(&source, &target)).await?;

        tracing::debug!(job_id = %workspace.job_id(), pages, "PDF converted to DOCX");

        Ok(EngineOutput {
            path: output,
            mime_type: DOCX_MIME,
        })
    }
}

fn convert_blocking(source: &Path, output: &Path) -> Result<usize, EngineError> {
    let doc = pdf::load(source, 1)?;
    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(EngineError::MalformedInput(
            "File 1 has no pages".to_string(),
        ));
    }

    let mut page_texts = Vec::with_capacity(pages.len());
    for &page_number in pages.keys() {
        match doc.extract_text(&[page_number]) {
            Ok(text) => page_texts.push(text),
            Err(e) => {
                // A page without extractable text still occupies a page
                tracing::warn!(page = page_number, error = %e, "Text extraction failed");
                page_texts.push(String::new());
            }
        }
    }

    let xml = docx::document_xml(&page_texts)?;
    docx::write_package(output, &xml)?;
    docx::verify_package(output)?;

    Ok(page_texts.len())
}
