//! PDF merge
//!
//! Concatenates the pages of 2..N PDFs, in input order, into one document.
//! Each source is renumbered into a disjoint object id range, its page
//! objects are re-parented under a fresh page tree, and the result is
//! re-loaded to check the page count.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lopdf::{dictionary, Document, Object, ObjectId};

use super::{
    input_range, pdf, run_blocking, ConversionEngine, EngineError, EngineKind, EngineOutput,
    EngineResult, InputFile, PDF_MIME,
};
use crate::artifacts::Workspace;

const OUTPUT_NAME: &str = "merged.pdf";

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guard against cyclic `/Parent` chains
const MAX_TREE_DEPTH: usize = 64;

#[derive(Debug)]
pub struct PdfMergeEngine {
    max_inputs: usize,
}

impl PdfMergeEngine {
    pub fn new(max_inputs: usize) -> Self {
        Self { max_inputs }
    }
}

#[async_trait]
impl ConversionEngine for PdfMergeEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::PdfMerge
    }

    fn backend(&self) -> &'static str {
        "lopdf"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn convert(&self, workspace: &Workspace, inputs: &[InputFile]) -> EngineResult {
        input_range(inputs, 2, self.max_inputs)?;

        let sources: Vec<PathBuf> = inputs.iter().map(|input| input.path.clone()).collect();
        let output = workspace.output_path(OUTPUT_NAME);

        let target = output.clone();
        let pages = run_blocking(move || merge_blocking(&sources, &target)).await?;

        tracing::debug!(
            job_id = %workspace.job_id(),
            files = inputs.len(),
            pages,
            "PDFs merged"
        );

        Ok(EngineOutput {
            path: output,
            mime_type: PDF_MIME,
        })
    }
}

fn merge_blocking(sources: &[PathBuf], output: &Path) -> Result<usize, EngineError> {
    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut page_ids: Vec<ObjectId> = Vec::new();

    for (i, source) in sources.iter().enumerate() {
        let position = i + 1;
        let mut doc = pdf::load(source, position)?;

        materialize_inherited(&mut doc)?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        // get_pages is keyed by page number, so values come out in page order
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if pages.is_empty() {
            return Err(EngineError::MalformedInput(format!(
                "File {} has no pages",
                position
            )));
        }

        for (id, object) in doc.objects {
            match pdf::type_name(&object) {
                Some(b"Catalog") | Some(b"Pages") | Some(b"Outlines") | Some(b"Outline") => {}
                _ => {
                    merged.objects.insert(id, object);
                }
            }
        }
        page_ids.extend(pages);
    }

    merged.max_id = next_id;
    let pages_id = merged.new_object_id();

    for &page_id in &page_ids {
        let page = merged
            .get_object_mut(page_id)
            .and_then(|object| object.as_dict_mut())
            .map_err(|e| EngineError::Failed(format!("page object missing after merge: {}", e)))?;
        page.set("Parent", pages_id);
    }

    let kids: Vec<Object> = page_ids.iter().map(|&id| Object::Reference(id)).collect();
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_ids.len() as i64,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);

    merged
        .save(output)
        .map_err(|e| EngineError::Failed(format!("failed to write merged PDF: {}", e)))?;

    verify_page_count(output, page_ids.len())?;
    Ok(page_ids.len())
}

/// Copy inherited page attributes onto each page, since the page is about to
/// lose its original ancestors
fn materialize_inherited(doc: &mut Document) -> Result<(), EngineError> {
    for page_id in doc.get_pages().into_values() {
        let mut inherited: Vec<(&[u8], Object)> = Vec::new();
        {
            let page = doc
                .get_dictionary(page_id)
                .map_err(|e| EngineError::MalformedInput(format!("broken page object: {}", e)))?;
            let mut missing: Vec<&[u8]> = INHERITABLE
                .iter()
                .copied()
                .filter(|key| !page.has(key))
                .collect();
            let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
            let mut depth = 0;

            while let Some(parent_id) = parent {
                if missing.is_empty() || depth >= MAX_TREE_DEPTH {
                    break;
                }
                let Ok(node) = doc.get_dictionary(parent_id) else {
                    break;
                };
                missing.retain(|key| match node.get(key) {
                    Ok(value) => {
                        inherited.push((*key, value.clone()));
                        false
                    }
                    Err(_) => true,
                });
                parent = node.get(b"Parent").and_then(Object::as_reference).ok();
                depth += 1;
            }
        }

        if inherited.is_empty() {
            continue;
        }
        let page = doc
            .get_object_mut(page_id)
            .and_then(|object| object.as_dict_mut())
            .map_err(|e| EngineError::MalformedInput(format!("broken page object: {}", e)))?;
        for (key, value) in inherited {
            page.set(key, value);
        }
    }
    Ok(())
}

fn verify_page_count(path: &Path, expected: usize) -> Result<(), EngineError> {
    let doc = Document::load(path)
        .map_err(|e| EngineError::InvalidOutput(format!("merged PDF does not load: {}", e)))?;
    let actual = doc.get_pages().len();
    if actual != expected {
        return Err(EngineError::InvalidOutput(format!(
            "merged PDF has {} pages, expected {}",
            actual, expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ArtifactStore;
    use crate::engine::pdf::fixtures;
    use crate::upload::{UploadSet, UploadedFile};
    use std::time::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    async fn staged(temp_dir: &TempDir, files: Vec<(&str, Vec<u8>)>) -> (Workspace, Vec<InputFile>) {
        let store = ArtifactStore::open(temp_dir.path(), Duration::from_secs(3600))
            .await
            .unwrap();
        let workspace = store.create_workspace(Uuid::new_v4()).await.unwrap();
        let uploads: UploadSet = files
            .into_iter()
            .map(|(name, data)| UploadedFile::new(name, data))
            .collect();
        let inputs = store.stage_inputs(&workspace, &uploads).await.unwrap();
        (workspace, inputs)
    }

    #[tokio::test]
    async fn test_merge_preserves_input_and_page_order() {
        let temp_dir = TempDir::new().unwrap();
        let (workspace, inputs) = staged(
            &temp_dir,
            vec![
                ("b.pdf", fixtures::pdf_with_widths(&[201, 202])),
                ("a.pdf", fixtures::pdf_with_widths(&[101])),
                ("c.pdf", fixtures::pdf_with_widths(&[301, 302, 303])),
            ],
        )
        .await;

        let output = PdfMergeEngine::new(10)
            .convert(&workspace, &inputs)
            .await
            .unwrap();

        let bytes = std::fs::read(&output.path).unwrap();
        assert_eq!(
            fixtures::page_widths(&bytes),
            vec![201, 202, 101, 301, 302, 303]
        );
    }

    #[tokio::test]
    async fn test_merge_same_file_twice() {
        let temp_dir = TempDir::new().unwrap();
        let pdf = fixtures::pdf_with_widths(&[500, 501]);
        let (workspace, inputs) = staged(
            &temp_dir,
            vec![("same.pdf", pdf.clone()), ("same.pdf", pdf)],
        )
        .await;

        let output = PdfMergeEngine::new(10)
            .convert(&workspace, &inputs)
            .await
            .unwrap();

        let bytes = std::fs::read(&output.path).unwrap();
        assert_eq!(fixtures::page_widths(&bytes), vec![500, 501, 500, 501]);
    }

    #[tokio::test]
    async fn test_merge_names_bad_file() {
        let temp_dir = TempDir::new().unwrap();
        let (workspace, inputs) = staged(
            &temp_dir,
            vec![
                ("ok.pdf", fixtures::pdf_with_widths(&[100])),
                ("bad.pdf", b"not a pdf".to_vec()),
            ],
        )
        .await;

        let result = PdfMergeEngine::new(10).convert(&workspace, &inputs).await;

        match result {
            Err(EngineError::MalformedInput(msg)) => assert!(msg.contains("File 2")),
            other => panic!("expected malformed input, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_merge_rejects_single_input() {
        let temp_dir = TempDir::new().unwrap();
        let (workspace, inputs) =
            staged(&temp_dir, vec![("one.pdf", fixtures::pdf_with_widths(&[100]))]).await;

        let result = PdfMergeEngine::new(10).convert(&workspace, &inputs).await;
        assert!(matches!(result, Err(EngineError::InputCount { actual: 1, .. })));
    }

    #[test]
    fn test_inherited_media_box_is_materialized() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1_i64,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(420),
                    Object::Integer(595),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        materialize_inherited(&mut doc).unwrap();

        let page = doc.get_dictionary(page_id).unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!(media_box[2].as_i64().unwrap(), 420);
    }
}
