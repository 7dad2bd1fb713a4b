//! Supported file formats and how they are named on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Every format docshift can read or write.
///
/// Parsing is case-insensitive and accepts the common aliases
/// (`jpg`/`jpeg`, `tif`/`tiff`, `text`/`txt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Pdf,
    Docx,
    Pptx,
    Txt,
    Xlsx,
    Xls,
    Csv,
    Png,
    Jpeg,
    Bmp,
    Gif,
    Tiff,
    Webp,
}

impl Format {
    /// All formats, in display order.
    pub const ALL: [Format; 13] = [
        Format::Pdf,
        Format::Docx,
        Format::Pptx,
        Format::Txt,
        Format::Xlsx,
        Format::Xls,
        Format::Csv,
        Format::Png,
        Format::Jpeg,
        Format::Bmp,
        Format::Gif,
        Format::Tiff,
        Format::Webp,
    ];

    /// Raster image formats handled by the `image` crate.
    pub const IMAGES: [Format; 6] = [
        Format::Png,
        Format::Jpeg,
        Format::Bmp,
        Format::Gif,
        Format::Tiff,
        Format::Webp,
    ];

    /// Parse a bare format name or file extension, ignoring case and a leading dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        let format = match ext.as_str() {
            "pdf" => Format::Pdf,
            "docx" => Format::Docx,
            "pptx" => Format::Pptx,
            "txt" | "text" => Format::Txt,
            "xlsx" => Format::Xlsx,
            "xls" => Format::Xls,
            "csv" => Format::Csv,
            "png" => Format::Png,
            "jpg" | "jpeg" => Format::Jpeg,
            "bmp" => Format::Bmp,
            "gif" => Format::Gif,
            "tif" | "tiff" => Format::Tiff,
            "webp" => Format::Webp,
            _ => return None,
        };
        Some(format)
    }

    /// Format implied by a file name's extension.
    ///
    /// Returns `Err(None)` when the name has no extension and
    /// `Err(Some(ext))` when the extension is not recognised.
    pub fn from_file_name(name: &str) -> Result<Self, Option<String>> {
        let ext = Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .filter(|e| !e.is_empty())
            .ok_or(None)?;
        Self::from_extension(&ext).ok_or(Some(ext))
    }

    /// Canonical file extension (no dot).
    pub fn extension(self) -> &'static str {
        match self {
            Format::Pdf => "pdf",
            Format::Docx => "docx",
            Format::Pptx => "pptx",
            Format::Txt => "txt",
            Format::Xlsx => "xlsx",
            Format::Xls => "xls",
            Format::Csv => "csv",
            Format::Png => "png",
            Format::Jpeg => "jpg",
            Format::Bmp => "bmp",
            Format::Gif => "gif",
            Format::Tiff => "tiff",
            Format::Webp => "webp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Format::Pdf => "application/pdf",
            Format::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Format::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            Format::Txt => "text/plain; charset=utf-8",
            Format::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Format::Xls => "application/vnd.ms-excel",
            Format::Csv => "text/csv; charset=utf-8",
            Format::Png => "image/png",
            Format::Jpeg => "image/jpeg",
            Format::Bmp => "image/bmp",
            Format::Gif => "image/gif",
            Format::Tiff => "image/tiff",
            Format::Webp => "image/webp",
        }
    }

    pub fn is_image(self) -> bool {
        Self::IMAGES.contains(&self)
    }

    /// The matching `image` crate format, for raster formats only.
    pub fn image_format(self) -> Option<image::ImageFormat> {
        let f = match self {
            Format::Png => image::ImageFormat::Png,
            Format::Jpeg => image::ImageFormat::Jpeg,
            Format::Bmp => image::ImageFormat::Bmp,
            Format::Gif => image::ImageFormat::Gif,
            Format::Tiff => image::ImageFormat::Tiff,
            Format::Webp => image::ImageFormat::WebP,
            _ => return None,
        };
        Some(f)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Jpeg => "jpeg",
            other => other.extension(),
        })
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::from_extension(s).ok_or_else(|| format!("unrecognised format '{}'", s.trim()))
    }
}

/// The `target_format` form field, parsed.
///
/// Accepts a bare target (`docx`) or the older `<source>_to_<target>` form
/// (`pdf_to_docx`), in which case the source half is kept so it can be
/// checked against the uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSpec {
    pub expected_source: Option<Format>,
    pub target: Format,
}

impl TargetSpec {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("target_format is empty".into());
        }
        let lowered = raw.to_ascii_lowercase();
        if let Some((src, dst)) = lowered.split_once("_to_") {
            let expected_source = src.parse::<Format>()?;
            let target = dst.parse::<Format>()?;
            return Ok(Self {
                expected_source: Some(expected_source),
                target,
            });
        }
        Ok(Self {
            expected_source: None,
            target: lowered.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_parsing_is_case_insensitive() {
        assert_eq!(Format::from_extension("PDF"), Some(Format::Pdf));
        assert_eq!(Format::from_extension(".Jpg"), Some(Format::Jpeg));
        assert_eq!(Format::from_extension("TIF"), Some(Format::Tiff));
        assert_eq!(Format::from_extension("exe"), None);
        assert_eq!(Format::from_extension(""), None);
    }

    #[test]
    fn file_name_without_extension_is_distinguished() {
        assert_eq!(Format::from_file_name("report.DOCX"), Ok(Format::Docx));
        assert_eq!(Format::from_file_name("README"), Err(None));
        assert_eq!(Format::from_file_name("archive."), Err(None));
        assert_eq!(
            Format::from_file_name("movie.mkv"),
            Err(Some("mkv".to_string()))
        );
    }

    #[test]
    fn target_spec_accepts_bare_and_legacy_forms() {
        let bare = TargetSpec::parse(" DOCX ").unwrap();
        assert_eq!(bare.target, Format::Docx);
        assert_eq!(bare.expected_source, None);

        let legacy = TargetSpec::parse("pdf_to_pptx").unwrap();
        assert_eq!(legacy.target, Format::Pptx);
        assert_eq!(legacy.expected_source, Some(Format::Pdf));

        assert!(TargetSpec::parse("").is_err());
        assert!(TargetSpec::parse("pdf_to_mp3").is_err());
        assert!(TargetSpec::parse("hologram").is_err());
    }

    #[test]
    fn display_and_extension_differ_only_for_jpeg() {
        assert_eq!(Format::Jpeg.to_string(), "jpeg");
        assert_eq!(Format::Jpeg.extension(), "jpg");
        assert_eq!(Format::Pptx.to_string(), Format::Pptx.extension());
    }

    #[test]
    fn every_image_format_maps_to_an_image_crate_format() {
        for f in Format::IMAGES {
            assert!(f.image_format().is_some(), "{f} has no image format");
        }
        assert!(Format::Pdf.image_format().is_none());
    }
}
