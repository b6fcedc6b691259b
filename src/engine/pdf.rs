//! Shared PDF loading for the lopdf-based engines

use std::path::Path;

use lopdf::{Document, Object};

use super::EngineError;

/// Load an input PDF, rejecting anything that is not a readable document
///
/// `position` is the 1-based input index used in error messages.
pub(crate) fn load(path: &Path, position: usize) -> Result<Document, EngineError> {
    let bytes = std::fs::read(path)?;

    let header_window = &bytes[..bytes.len().min(1024)];
    if !header_window.windows(4).any(|w| w == b"%PDF") {
        return Err(EngineError::MalformedInput(format!(
            "File {} is not a valid PDF document",
            position
        )));
    }

    let doc = Document::load_mem(&bytes).map_err(|e| {
        EngineError::MalformedInput(format!(
            "File {} could not be read as a PDF: {}",
            position, e
        ))
    })?;

    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(EngineError::MalformedInput(format!(
            "File {} is password protected",
            position
        )));
    }

    Ok(doc)
}

/// Value of a dictionary's `/Type` entry, if any
pub(crate) fn type_name(object: &Object) -> Option<&[u8]> {
    object.as_dict().ok()?.get(b"Type").ok()?.as_name().ok()
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Generated PDFs for engine tests. Each page's MediaBox width acts as a
    //! marker identifying the page after conversion.

    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a PDF whose pages have the given MediaBox widths
    pub fn pdf_with_widths(widths: &[i64]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut kids: Vec<Object> = Vec::new();
        for (i, width) in widths.iter().enumerate() {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), Object::Integer(12)]),
                    Operation::new("Td", vec![Object::Integer(72), Object::Integer(700)]),
                    Operation::new(
                        "Tj",
                        vec![Object::string_literal(format!("Page {}", i + 1))],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(*width),
                    Object::Integer(792),
                ],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                },
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    /// MediaBox widths of a PDF's pages, in page order
    pub fn page_widths(bytes: &[u8]) -> Vec<i64> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|&page_id| {
                let page = doc.get_dictionary(page_id).unwrap();
                let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
                media_box[2].as_i64().unwrap()
            })
            .collect()
    }
}
