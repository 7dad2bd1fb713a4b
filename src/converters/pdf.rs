//! PDF reading (text layer) and writing (text pages, image pages) with lopdf.
//!
//! Written documents use the standard Helvetica fonts with WinAnsi encoding,
//! so nothing has to be embedded and every viewer can open them. Characters
//! outside WinAnsi are replaced with `?`.

use super::{Block, Slide};
use crate::error::ConvertError;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

const BODY_FONT: &str = "F1";
const BOLD_FONT: &str = "F2";

/// Page dimensions and margins in PDF points.
#[derive(Debug, Clone, Copy)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl PageGeometry {
    pub const A4: PageGeometry = PageGeometry {
        width: 595.0,
        height: 842.0,
        margin: 56.0,
    };

    /// 13.33 × 7.5 in, the default 16:9 slide.
    pub const SLIDE: PageGeometry = PageGeometry {
        width: 960.0,
        height: 540.0,
        margin: 48.0,
    };

    fn text_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }
}

// ── Reading ──────────────────────────────────────────────────────────────

/// Load a PDF after checking its magic bytes.
pub fn load(path: &Path) -> Result<Document, ConvertError> {
    let bytes = std::fs::read(path).map_err(|e| ConvertError::io(path, e))?;
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        return Err(ConvertError::NotAPdf {
            magic: bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(Document::load_mem(&bytes)?)
}

/// Extract the text layer of every page, in page order.
///
/// A page whose content cannot be decoded yields an empty string rather than
/// failing the whole document.
pub fn page_texts(doc: &Document) -> Vec<String> {
    let pages = doc.get_pages();
    debug!("PDF has {} pages", pages.len());
    pages
        .keys()
        .map(|&num| match doc.extract_text(&[num]) {
            Ok(text) => text,
            Err(e) => {
                warn!(page = num, error = %e, "text layer unreadable; page left empty");
                String::new()
            }
        })
        .collect()
}

/// Turn per-page text into blocks: one paragraph per non-blank line and a
/// page break between pages.
pub fn pages_to_blocks(pages: &[String]) -> Vec<Block> {
    let mut blocks = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            blocks.push(Block::PageBreak);
        }
        blocks.extend(
            page.lines()
                .map(str::trim_end)
                .filter(|l| !l.trim().is_empty())
                .map(|l| Block::Paragraph(l.to_string())),
        );
    }
    blocks
}

// ── Writing ──────────────────────────────────────────────────────────────

/// One positioned line of text on a page.
struct PlacedLine {
    text: String,
    font: &'static str,
    size: f32,
    x: f32,
    y: f32,
}

/// Incremental PDF writer.
pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    fonts: Object,
    kids: Vec<Object>,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "Encoding" => "WinAnsiEncoding",
        });
        let fonts = Object::Dictionary(dictionary! {
            BODY_FONT => regular,
            BOLD_FONT => bold,
        });
        Self {
            doc,
            pages_id,
            fonts,
            kids: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    fn add_page(
        &mut self,
        geometry: PageGeometry,
        operations: Vec<Operation>,
        resources: lopdf::Dictionary,
    ) -> Result<(), ConvertError> {
        let content = Content { operations }.encode()?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                geometry.width.into(),
                geometry.height.into(),
            ],
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    fn add_text_page(
        &mut self,
        geometry: PageGeometry,
        lines: &[PlacedLine],
    ) -> Result<(), ConvertError> {
        let mut ops = Vec::with_capacity(lines.len() * 5);
        for line in lines {
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new("Tf", vec![line.font.into(), line.size.into()]));
            ops.push(Operation::new("Td", vec![line.x.into(), line.y.into()]));
            ops.push(Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(&line.text), StringFormat::Literal)],
            ));
            ops.push(Operation::new("ET", vec![]));
        }
        let resources = dictionary! { "Font" => self.fonts.clone() };
        self.add_page(geometry, ops, resources)
    }

    /// Add one page showing `image` at 96 DPI, flattened RGB, Flate-compressed.
    pub fn add_image_page(&mut self, image: &RgbImage) -> Result<(), ConvertError> {
        let (w, h) = image.dimensions();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        let data = encoder
            .write_all(image.as_raw())
            .and_then(|()| encoder.finish())
            .map_err(|e| ConvertError::Pdf(format!("image compression failed: {e}")))?;

        let image_id = self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(w),
                "Height" => i64::from(h),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            data,
        ));

        let geometry = PageGeometry {
            width: w as f32 * 0.75,
            height: h as f32 * 0.75,
            margin: 0.0,
        };
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    geometry.width.into(),
                    0f32.into(),
                    0f32.into(),
                    geometry.height.into(),
                    0f32.into(),
                    0f32.into(),
                ],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ];
        let resources = dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        };
        self.add_page(geometry, ops, resources)
    }

    /// Typeset blocks onto as many pages as needed.
    pub fn add_flowing_text(
        &mut self,
        geometry: PageGeometry,
        blocks: &[Block],
    ) -> Result<(), ConvertError> {
        let top = geometry.height - geometry.margin;
        let mut y = top;
        let mut lines: Vec<PlacedLine> = Vec::new();

        for block in blocks {
            let (text, font, size) = match block {
                Block::Heading(t) => (t.as_str(), BOLD_FONT, 16.0),
                Block::Paragraph(t) => (t.as_str(), BODY_FONT, 11.0),
                Block::PageBreak => {
                    self.add_text_page(geometry, &lines)?;
                    lines.clear();
                    y = top;
                    continue;
                }
            };
            let leading = size * 1.35;
            let wrapped = wrap(text, max_chars(geometry.text_width(), size));
            for line in wrapped {
                if y - leading < geometry.margin {
                    self.add_text_page(geometry, &lines)?;
                    lines.clear();
                    y = top;
                }
                y -= leading;
                lines.push(PlacedLine {
                    text: line,
                    font,
                    size,
                    x: geometry.margin,
                    y,
                });
            }
            // paragraph spacing
            y -= size * 0.5;
        }

        if !lines.is_empty() || self.kids.is_empty() {
            self.add_text_page(geometry, &lines)?;
        }
        Ok(())
    }

    /// One page per slide: first paragraph as title, the rest as body.
    /// Text that does not fit on the slide is cut.
    pub fn add_slide(&mut self, slide: &Slide) -> Result<(), ConvertError> {
        let g = PageGeometry::SLIDE;
        let mut y = g.height - g.margin;
        let mut lines = Vec::new();

        'outer: for (i, para) in slide.paragraphs.iter().enumerate() {
            let (font, size) = if i == 0 {
                (BOLD_FONT, 28.0)
            } else {
                (BODY_FONT, 18.0)
            };
            for line in wrap(para, max_chars(g.text_width(), size)) {
                let leading = size * 1.3;
                if y - leading < g.margin {
                    debug!("slide text overflows page; remainder dropped");
                    break 'outer;
                }
                y -= leading;
                lines.push(PlacedLine {
                    text: line,
                    font,
                    size,
                    x: g.margin,
                    y,
                });
            }
            y -= if i == 0 { 18.0 } else { 6.0 };
        }
        self.add_text_page(g, &lines)
    }

    /// Assemble the page tree and serialise the document.
    pub fn finish(mut self) -> Result<Vec<u8>, ConvertError> {
        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .map_err(|e| ConvertError::Pdf(format!("serialisation failed: {e}")))?;
        Ok(out)
    }
}

/// Render blocks as an A4 document.
pub fn blocks_to_pdf(blocks: &[Block]) -> Result<Vec<u8>, ConvertError> {
    let mut builder = PdfBuilder::new();
    builder.add_flowing_text(PageGeometry::A4, blocks)?;
    builder.finish()
}

/// Render slides, one landscape page each.
pub fn slides_to_pdf(slides: &[Slide]) -> Result<Vec<u8>, ConvertError> {
    let mut builder = PdfBuilder::new();
    for slide in slides {
        builder.add_slide(slide)?;
    }
    if builder.page_count() == 0 {
        builder.add_slide(&Slide::default())?;
    }
    builder.finish()
}

// ── Text helpers ─────────────────────────────────────────────────────────

/// Rough capacity of a Helvetica line: average glyph ≈ half the font size.
fn max_chars(width: f32, size: f32) -> usize {
    ((width / (size * 0.5)) as usize).max(8)
}

/// Greedy word wrap; words longer than a line are split hard.
fn wrap(text: &str, max: usize) -> Vec<String> {
    let text = text.replace('\t', "    ");
    let mut lines = Vec::new();
    for raw in text.split('\n') {
        let mut current = String::new();
        for word in raw.split(' ') {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(max);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let needed = if current.is_empty() {
                word.len()
            } else {
                current.chars().count() + 1 + word.len()
            };
            if needed > max && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.extend(word);
        }
        lines.push(current);
    }
    lines
}

/// Map text to WinAnsi bytes for the standard Type1 fonts.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .filter_map(|c| {
            let b = match c {
                '\u{20}'..='\u{7e}' | '\u{a0}'..='\u{ff}' => c as u32 as u8,
                '€' => 0x80,
                '‚' => 0x82,
                '„' => 0x84,
                '…' => 0x85,
                '‘' => 0x91,
                '’' => 0x92,
                '“' => 0x93,
                '”' => 0x94,
                '•' => 0x95,
                '–' => 0x96,
                '—' => 0x97,
                '™' => 0x99,
                c if c.is_control() => return None,
                _ => b'?',
            };
            Some(b)
        })
        .collect()
}
