//! Converter implementations.
//!
//! A converter is a blocking function from an input path to an output path.
//! It knows nothing about requests, temp names, or cleanup; the lifecycle
//! manager owns both paths and deletes them afterwards whatever happens.

pub mod docx;
pub(crate) mod ooxml;
pub mod pdf;
pub mod pptx;
pub mod raster;
pub mod render;
pub mod sheet;

use crate::error::ConvertError;
use crate::router::{ConverterKind, Route};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// A unit of flowing text shared by the document converters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading(String),
    Paragraph(String),
    PageBreak,
}

/// Text content of one presentation slide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slide {
    pub paragraphs: Vec<String>,
}

/// Something that can carry out a resolved conversion.
///
/// Implementations run on the blocking thread pool and may take as long as
/// they need. On success the output path must hold a complete, non-empty
/// file; on failure whatever they left behind is deleted by the caller.
pub trait Converter: Send + Sync {
    fn convert(&self, route: Route, input: &Path, output: &Path) -> Result<(), ConvertError>;
}

/// The built-in converters: lopdf, pdfium, zip + quick-xml, calamine, csv, image.
#[derive(Debug, Clone)]
pub struct NativeConverter {
    pdfium_library: Option<PathBuf>,
    render_width: u32,
}

impl NativeConverter {
    pub fn new(pdfium_library: Option<PathBuf>, render_width: u32) -> Self {
        Self {
            pdfium_library,
            render_width,
        }
    }

    fn produce(&self, route: Route, input: &Path) -> Result<Vec<u8>, ConvertError> {
        match route.kind {
            ConverterKind::PdfToDocx => {
                let doc = pdf::load(input)?;
                docx::write(&pdf::pages_to_blocks(&pdf::page_texts(&doc)))
            }
            ConverterKind::PdfToText => {
                let doc = pdf::load(input)?;
                Ok(pdf::page_texts(&doc).join("\n\u{c}\n").into_bytes())
            }
            ConverterKind::PdfToPptx => self.pdf_to_pptx(input),
            ConverterKind::DocxToPdf => pdf::blocks_to_pdf(&docx::read_blocks(input)?),
            ConverterKind::DocxToText => Ok(blocks_to_text(&docx::read_blocks(input)?)),
            ConverterKind::PptxToPdf => pdf::slides_to_pdf(&pptx::read_slides(input)?),
            ConverterKind::PptxToText => Ok(slides_to_text(&pptx::read_slides(input)?)),
            ConverterKind::TextToPdf => pdf::blocks_to_pdf(&text_blocks(input)?),
            ConverterKind::TextToDocx => docx::write(&text_blocks(input)?),
            ConverterKind::ImageToPdf => {
                let img = raster::decode(input)?;
                let mut builder = pdf::PdfBuilder::new();
                builder.add_image_page(&raster::flatten_rgb(&img))?;
                builder.finish()
            }
            ConverterKind::ImageToImage => raster::reencode(&raster::decode(input)?, route.target),
            ConverterKind::SheetToCsv => sheet::to_csv(&sheet::read(input, route.source)?),
            ConverterKind::SheetToText => Ok(sheet::to_text(&sheet::read(input, route.source)?)),
            ConverterKind::SheetToXlsx => sheet::to_xlsx(&sheet::read(input, route.source)?),
        }
    }

    fn pdf_to_pptx(&self, input: &Path) -> Result<Vec<u8>, ConvertError> {
        // Reject non-PDFs before touching the render engine.
        let page_count = pdf::load(input)?.get_pages().len();
        let pdfium = render::bind(self.pdfium_library.as_deref())?;
        let pages = render::render_pages(&pdfium, input, self.render_width)?;
        debug!("rendered {}/{} pages for slides", pages.len(), page_count);

        let slides = pages
            .iter()
            .map(|img| {
                Ok(pptx::SlideImage {
                    png: raster::encode_png(img)?,
                    width: img.width(),
                    height: img.height(),
                })
            })
            .collect::<Result<Vec<_>, ConvertError>>()?;
        pptx::write_picture_deck(&slides)
    }
}

impl Converter for NativeConverter {
    fn convert(&self, route: Route, input: &Path, output: &Path) -> Result<(), ConvertError> {
        let started = Instant::now();
        let bytes = self.produce(route, input)?;
        if bytes.is_empty() {
            return Err(ConvertError::EmptyOutput);
        }
        write_output(output, &bytes)?;
        info!(
            kind = ?route.kind,
            bytes = bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "{} → {} done",
            route.source,
            route.target
        );
        Ok(())
    }
}

/// Single write of the finished bytes; a partial file is removed on failure.
fn write_output(output: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    std::fs::write(output, bytes).map_err(|e| {
        let _ = std::fs::remove_file(output);
        ConvertError::io(output, e)
    })
}

/// Plain text as blocks: one paragraph per line, form feeds as page breaks.
fn text_blocks(input: &Path) -> Result<Vec<Block>, ConvertError> {
    let raw = std::fs::read(input).map_err(|e| ConvertError::io(input, e))?;
    let text = String::from_utf8_lossy(&raw);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    let mut blocks = Vec::new();
    for (i, page) in text.split('\u{c}').enumerate() {
        if i > 0 {
            blocks.push(Block::PageBreak);
        }
        blocks.extend(
            page.lines()
                .map(|l| Block::Paragraph(l.trim_end_matches('\r').to_string())),
        );
    }
    Ok(blocks)
}

fn blocks_to_text(blocks: &[Block]) -> Vec<u8> {
    let mut out = String::new();
    for block in blocks {
        match block {
            Block::Heading(t) | Block::Paragraph(t) => {
                out.push_str(t);
                out.push('\n');
            }
            Block::PageBreak => out.push('\u{c}'),
        }
    }
    out.into_bytes()
}

fn slides_to_text(slides: &[Slide]) -> Vec<u8> {
    slides
        .iter()
        .map(|s| s.paragraphs.join("\n"))
        .collect::<Vec<_>>()
        .join("\n\n")
        .into_bytes()
}
