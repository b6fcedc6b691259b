//! Minimal WordprocessingML (DOCX) package writer
//!
//! Produces the three parts Word needs to open a document: the content
//! types manifest, the package relationships and `word/document.xml`.

use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::EngineError;

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const RELS_PART: &str = "_rels/.rels";
const DOCUMENT_PART: &str = "word/document.xml";

const WORD_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const CONTENT_TYPES_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"</Types>"#,
);

const RELS_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"</Relationships>"#,
);

/// Smallest `word/document.xml` a real document can have
const MIN_DOCUMENT_XML_LEN: u64 = 50;

/// Render `word/document.xml`: one paragraph per text line, a page break
/// between source pages.
pub(crate) fn document_xml(pages: &[String]) -> Result<Vec<u8>, EngineError> {
    build_document_xml(pages).map_err(|e| EngineError::Failed(format!("XML error: {}", e)))
}

fn build_document_xml(pages: &[String]) -> Result<Vec<u8>, quick_xml::Error> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;

    let mut document = BytesStart::new("w:document");
    document.push_attribute(("xmlns:w", WORD_NS));
    writer.write_event(Event::Start(document))?;
    writer.write_event(Event::Start(BytesStart::new("w:body")))?;

    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            write_page_break(&mut writer)?;
        }

        let mut wrote_line = false;
        for line in page.lines() {
            write_paragraph(&mut writer, &xml_safe(line))?;
            wrote_line = true;
        }
        if !wrote_line {
            write_paragraph(&mut writer, "")?;
        }
    }

    // US Letter with 1" margins, in twentieths of a point
    let mut page_size = BytesStart::new("w:pgSz");
    page_size.push_attribute(("w:w", "12240"));
    page_size.push_attribute(("w:h", "15840"));
    let mut margins = BytesStart::new("w:pgMar");
    for side in ["w:top", "w:right", "w:bottom", "w:left"] {
        margins.push_attribute((side, "1440"));
    }
    writer.write_event(Event::Start(BytesStart::new("w:sectPr")))?;
    writer.write_event(Event::Empty(page_size))?;
    writer.write_event(Event::Empty(margins))?;
    writer.write_event(Event::End(BytesEnd::new("w:sectPr")))?;

    writer.write_event(Event::End(BytesEnd::new("w:body")))?;
    writer.write_event(Event::End(BytesEnd::new("w:document")))?;

    Ok(writer.into_inner().into_inner())
}

fn write_paragraph<W: Write>(writer: &mut Writer<W>, text: &str) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new("w:p")))?;
    if !text.is_empty() {
        let mut run_text = BytesStart::new("w:t");
        run_text.push_attribute(("xml:space", "preserve"));

        writer.write_event(Event::Start(BytesStart::new("w:r")))?;
        writer.write_event(Event::Start(run_text))?;
        writer.write_event(Event::Text(BytesText::new(text)))?;
        writer.write_event(Event::End(BytesEnd::new("w:t")))?;
        writer.write_event(Event::End(BytesEnd::new("w:r")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("w:p")))?;
    Ok(())
}

fn write_page_break<W: Write>(writer: &mut Writer<W>) -> Result<(), quick_xml::Error> {
    let mut page_break = BytesStart::new("w:br");
    page_break.push_attribute(("w:type", "page"));

    writer.write_event(Event::Start(BytesStart::new("w:p")))?;
    writer.write_event(Event::Start(BytesStart::new("w:r")))?;
    writer.write_event(Event::Empty(page_break))?;
    writer.write_event(Event::End(BytesEnd::new("w:r")))?;
    writer.write_event(Event::End(BytesEnd::new("w:p")))?;
    Ok(())
}

/// Drop characters XML 1.0 cannot carry (extracted PDF text often has them)
fn xml_safe(text: &str) -> String {
    text.chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}'))
        .collect()
}

/// Write the package to `path`
pub(crate) fn write_package(path: &Path, document_xml: &[u8]) -> Result<(), EngineError> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, &[u8]); 3] = [
        (CONTENT_TYPES_PART, CONTENT_TYPES_XML.as_bytes()),
        (RELS_PART, RELS_XML.as_bytes()),
        (DOCUMENT_PART, document_xml),
    ];
    for (name, data) in parts {
        zip.start_file(name, options).map_err(zip_error)?;
        zip.write_all(data)?;
    }

    zip.finish().map_err(zip_error)?;
    Ok(())
}

/// Re-open a written package and check it has a usable document part
pub(crate) fn verify_package(path: &Path) -> Result<(), EngineError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| EngineError::InvalidOutput(format!("not a ZIP package: {}", e)))?;

    for required in [CONTENT_TYPES_PART, RELS_PART] {
        if archive.by_name(required).is_err() {
            return Err(EngineError::InvalidOutput(format!("missing {}", required)));
        }
    }

    let mut document = archive
        .by_name(DOCUMENT_PART)
        .map_err(|_| EngineError::InvalidOutput(format!("missing {}", DOCUMENT_PART)))?;
    let mut xml = String::new();
    document.read_to_string(&mut xml)?;

    if (xml.len() as u64) < MIN_DOCUMENT_XML_LEN || !xml.contains("<w:body>") {
        return Err(EngineError::InvalidOutput("document body is empty".to_string()));
    }

    Ok(())
}

fn zip_error(e: zip::result::ZipError) -> EngineError {
    EngineError::Failed(format!("DOCX packaging error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_document_xml_escapes_and_breaks_pages() {
        let pages = vec!["Tom & Jerry <3\nsecond line".to_string(), String::new()];
        let xml = String::from_utf8(document_xml(&pages).unwrap()).unwrap();

        assert!(xml.contains("Tom &amp; Jerry &lt;3"));
        assert!(xml.contains("second line"));
        assert_eq!(xml.matches(r#"<w:br w:type="page"/>"#).count(), 1);
        // Two lines on page one, one empty paragraph for page two, one for the break
        assert_eq!(xml.matches("<w:p>").count(), 4);
    }

    #[test]
    fn test_control_characters_dropped() {
        assert_eq!(xml_safe("a\u{0}b\u{1b}c\td"), "abc\td");
    }

    #[test]
    fn test_package_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.docx");

        let xml = document_xml(&["Hello".to_string()]).unwrap();
        write_package(&path, &xml).unwrap();
        verify_package(&path).unwrap();

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut body = String::new();
        archive
            .by_name(DOCUMENT_PART)
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert!(body.contains("Hello"));
    }

    #[test]
    fn test_verify_rejects_non_zip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bogus.docx");
        std::fs::write(&path, b"not a zip").unwrap();

        assert!(matches!(verify_package(&path), Err(EngineError::InvalidOutput(_))));
    }
}
