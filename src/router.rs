//! Format router: `(source, target)` → converter, or `Unsupported`.
//!
//! The table below is the whole capability surface. Lookups never chain
//! converters: if a pair is not listed it is unsupported, even when two
//! listed pairs could be composed.

use crate::format::Format;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::BTreeMap;

/// Which converter implementation handles a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConverterKind {
    PdfToDocx,
    PdfToPptx,
    PdfToText,
    DocxToPdf,
    DocxToText,
    PptxToPdf,
    PptxToText,
    TextToPdf,
    TextToDocx,
    ImageToPdf,
    ImageToImage,
    SheetToCsv,
    SheetToText,
    SheetToXlsx,
}

/// A resolved converter together with the pair it was resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub kind: ConverterKind,
    pub source: Format,
    pub target: Format,
}

/// Result of a router lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Converter(Route),
    Unsupported { source: Format, target: Format },
}

const DOCUMENT_ROUTES: &[(Format, Format, ConverterKind)] = &[
    (Format::Pdf, Format::Docx, ConverterKind::PdfToDocx),
    (Format::Pdf, Format::Pptx, ConverterKind::PdfToPptx),
    (Format::Pdf, Format::Txt, ConverterKind::PdfToText),
    (Format::Docx, Format::Pdf, ConverterKind::DocxToPdf),
    (Format::Docx, Format::Txt, ConverterKind::DocxToText),
    (Format::Pptx, Format::Pdf, ConverterKind::PptxToPdf),
    (Format::Pptx, Format::Txt, ConverterKind::PptxToText),
    (Format::Txt, Format::Pdf, ConverterKind::TextToPdf),
    (Format::Txt, Format::Docx, ConverterKind::TextToDocx),
    (Format::Xlsx, Format::Csv, ConverterKind::SheetToCsv),
    (Format::Xlsx, Format::Txt, ConverterKind::SheetToText),
    (Format::Xls, Format::Csv, ConverterKind::SheetToCsv),
    (Format::Xls, Format::Txt, ConverterKind::SheetToText),
    (Format::Xls, Format::Xlsx, ConverterKind::SheetToXlsx),
    (Format::Csv, Format::Xlsx, ConverterKind::SheetToXlsx),
    (Format::Csv, Format::Txt, ConverterKind::SheetToText),
];

static ROUTES: Lazy<BTreeMap<(Format, Format), ConverterKind>> = Lazy::new(|| {
    let mut table: BTreeMap<(Format, Format), ConverterKind> = DOCUMENT_ROUTES
        .iter()
        .map(|&(s, t, k)| ((s, t), k))
        .collect();

    for source in Format::IMAGES {
        table.insert((source, Format::Pdf), ConverterKind::ImageToPdf);
        for target in Format::IMAGES {
            if source != target {
                table.insert((source, target), ConverterKind::ImageToImage);
            }
        }
    }
    table
});

/// Look up the converter for an ordered pair.
pub fn resolve(source: Format, target: Format) -> Resolution {
    match ROUTES.get(&(source, target)) {
        Some(&kind) => Resolution::Converter(Route {
            kind,
            source,
            target,
        }),
        None => Resolution::Unsupported { source, target },
    }
}

/// Every registered pair, sorted by source then target.
pub fn routes() -> impl Iterator<Item = Route> {
    ROUTES.iter().map(|(&(source, target), &kind)| Route {
        kind,
        source,
        target,
    })
}

/// The capability table: each source format with its reachable targets.
pub fn capabilities() -> BTreeMap<Format, Vec<Format>> {
    let mut caps: BTreeMap<Format, Vec<Format>> = BTreeMap::new();
    for route in routes() {
        caps.entry(route.source).or_default().push(route.target);
    }
    caps
}
