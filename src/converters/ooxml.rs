//! Shared plumbing for Office Open XML packages (docx, pptx, xlsx).

use crate::error::ConvertError;
use crate::format::Format;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Largest XML part we are willing to inflate.
const MAX_PART_BYTES: u64 = 64 * 1024 * 1024;

pub(crate) const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Read-only view of a package on disk.
pub(crate) struct PackageReader {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    format: Format,
}

impl PackageReader {
    pub fn open(path: &Path, format: Format) -> Result<Self, ConvertError> {
        let bytes = std::fs::read(path).map_err(|e| ConvertError::io(path, e))?;
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ConvertError::package(format, format!("not a zip archive: {e}")))?;
        Ok(Self { archive, format })
    }

    pub fn names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Inflate one part, refusing anything over the size bound.
    pub fn read_part(&mut self, name: &str) -> Result<Vec<u8>, ConvertError> {
        let format = self.format;
        let entry = self
            .archive
            .by_name(name)
            .map_err(|e| ConvertError::package(format, format!("{name}: {e}")))?;
        let mut out = Vec::new();
        entry
            .take(MAX_PART_BYTES)
            .read_to_end(&mut out)
            .map_err(|e| ConvertError::package(format, format!("{name}: {e}")))?;
        if out.len() as u64 >= MAX_PART_BYTES {
            return Err(ConvertError::package(
                format,
                format!("{name} exceeds size limit ({MAX_PART_BYTES} bytes)"),
            ));
        }
        Ok(out)
    }
}

/// In-memory package under construction.
pub(crate) struct PackageWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    format: Format,
}

impl PackageWriter {
    pub fn new(format: Format) -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
            format,
        }
    }

    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<(), ConvertError> {
        let format = self.format;
        self.zip
            .start_file(name, self.options)
            .map_err(|e| ConvertError::package(format, format!("{name}: {e}")))?;
        self.zip
            .write_all(data)
            .map_err(|e| ConvertError::package(format, format!("{name}: {e}")))
    }

    pub fn finish(self) -> Result<Vec<u8>, ConvertError> {
        let format = self.format;
        self.zip
            .finish()
            .map(Cursor::into_inner)
            .map_err(|e| ConvertError::package(format, e))
    }
}

/// Escape text for element content, dropping characters XML 1.0 forbids.
pub(crate) fn xml_text(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || !c.is_control())
        .collect();
    quick_xml::escape::escape(cleaned.as_str()).into_owned()
}

/// Trailing number of a part name like `ppt/slides/slide12.xml`.
pub(crate) fn part_number(name: &str, prefix: &str, suffix: &str) -> Option<u32> {
    name.strip_prefix(prefix)?.strip_suffix(suffix)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_text_escapes_and_strips_controls() {
        assert_eq!(xml_text("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
        assert_eq!(xml_text("x\u{1}y\tz"), "xy\tz");
    }

    #[test]
    fn part_number_parses_only_matching_names() {
        assert_eq!(part_number("ppt/slides/slide12.xml", "ppt/slides/slide", ".xml"), Some(12));
        assert_eq!(part_number("ppt/slides/_rels/slide1.xml.rels", "ppt/slides/slide", ".xml"), None);
    }

    #[test]
    fn written_package_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = PackageWriter::new(Format::Docx);
        w.add("a/b.xml", b"<x/>").unwrap();
        let path = dir.path().join("p.zip");
        std::fs::write(&path, w.finish().unwrap()).unwrap();

        let mut r = PackageReader::open(&path, Format::Docx).unwrap();
        assert_eq!(r.names(), vec!["a/b.xml".to_string()]);
        assert_eq!(r.read_part("a/b.xml").unwrap(), b"<x/>");
        assert!(matches!(
            r.read_part("missing.xml"),
            Err(ConvertError::Package { format: Format::Docx, .. })
        ));
    }

    #[test]
    fn non_zip_input_is_a_package_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.docx");
        std::fs::write(&path, b"plain text").unwrap();
        assert!(matches!(
            PackageReader::open(&path, Format::Docx),
            Err(ConvertError::Package { .. })
        ));
    }
}
