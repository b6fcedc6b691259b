//! Images → PDF
//!
//! One US Letter page per image, in input order. Each image is decoded,
//! flattened to RGB, re-encoded as JPEG and drawn centered, scaled to fit
//! inside the page margins with its aspect ratio kept.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use super::{
    input_range, run_blocking, ConversionEngine, EngineError, EngineKind, EngineOutput,
    EngineResult, InputFile, PDF_MIME,
};
use crate::artifacts::Workspace;

const OUTPUT_NAME: &str = "images.pdf";

/// US Letter, in points
pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;
pub const PAGE_MARGIN: f32 = 50.0;

const JPEG_QUALITY: u8 = 85;

/// Where an image lands on its page, in points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Scale an image to fit inside the page margins, centered
pub fn fit_to_page(image_width: u32, image_height: u32) -> Placement {
    let max_width = PAGE_WIDTH - 2.0 * PAGE_MARGIN;
    let max_height = PAGE_HEIGHT - 2.0 * PAGE_MARGIN;

    let (w, h) = (image_width.max(1) as f32, image_height.max(1) as f32);
    let scale = (max_width / w).min(max_height / h);
    let (width, height) = (w * scale, h * scale);

    Placement {
        x: (PAGE_WIDTH - width) / 2.0,
        y: (PAGE_HEIGHT - height) / 2.0,
        width,
        height,
    }
}

#[derive(Debug)]
pub struct ImagesToPdfEngine {
    max_inputs: usize,
}

impl ImagesToPdfEngine {
    pub fn new(max_inputs: usize) -> Self {
        Self { max_inputs }
    }
}

#[async_trait]
impl ConversionEngine for ImagesToPdfEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::ImagesToPdf
    }

    fn backend(&self) -> &'static str {
        "image + lopdf"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn convert(&self, workspace: &Workspace, inputs: &[InputFile]) -> EngineResult {
        input_range(inputs, 1, self.max_inputs)?;

        let sources: Vec<PathBuf> = inputs.iter().map(|input| input.path.clone()).collect();
        let output = workspace.output_path(OUTPUT_NAME);

        let target = output.clone();
        let pages = run_blocking(move || images_blocking(&sources, &target)).await?;

        tracing::debug!(job_id = %workspace.job_id(), pages, "Images combined into PDF");

        Ok(EngineOutput {
            path: output,
            mime_type: PDF_MIME,
        })
    }
}

fn images_blocking(sources: &[PathBuf], output: &Path) -> Result<usize, EngineError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(sources.len());

    for (i, source) in sources.iter().enumerate() {
        let position = i + 1;
        let (jpeg, width, height) = encode_jpeg(source, position)?;

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "DCTDecode",
            },
            jpeg,
        ));

        let placement = fit_to_page(width, height);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        placement.width.into(),
                        Object::Integer(0),
                        Object::Integer(0),
                        placement.height.into(),
                        placement.x.into(),
                        placement.y.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_bytes = content
            .encode()
            .map_err(|e| EngineError::Failed(format!("failed to encode page content: {}", e)))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                PAGE_WIDTH.into(),
                PAGE_HEIGHT.into(),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(output)
        .map_err(|e| EngineError::Failed(format!("failed to write PDF: {}", e)))?;

    Ok(count)
}

/// Decode by content (not extension), flatten to RGB and re-encode as JPEG
fn encode_jpeg(source: &Path, position: usize) -> Result<(Vec<u8>, u32, u32), EngineError> {
    let bytes = std::fs::read(source)?;
    let decoded = image::load_from_memory(&bytes).map_err(|e| {
        EngineError::MalformedInput(format!("File {} is not a readable image: {}", position, e))
    })?;

    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| EngineError::Failed(format!("JPEG encoding of file {} failed: {}", position, e)))?;

    Ok((jpeg, width, height))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    /// A solid-color JPEG of the given size
    pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Jpeg).unwrap();
        bytes.into_inner()
    }

    /// A half-transparent PNG of the given size
    pub fn png_rgba(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 120, 200, 128]));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }
}
