//! Word documents: paragraph text in, paragraph text out.

use super::ooxml::{xml_text, PackageReader, PackageWriter, XML_DECL};
use super::Block;
use crate::error::ConvertError;
use crate::format::Format;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;

const DOCUMENT_PART: &str = "word/document.xml";

/// Read the body of a .docx as blocks. Headings are recognised from the
/// paragraph style (`Heading1`, `Title`, …); explicit page breaks are kept.
pub fn read_blocks(path: &Path) -> Result<Vec<Block>, ConvertError> {
    let mut package = PackageReader::open(path, Format::Docx)?;
    let xml = package.read_part(DOCUMENT_PART)?;
    parse_document(&xml)
}

fn is_heading_style(e: &BytesStart<'_>) -> bool {
    e.attributes().flatten().any(|a| {
        a.key.local_name().as_ref() == b"val"
            && a.unescape_value().is_ok_and(|v| {
                let v = v.to_ascii_lowercase();
                v.starts_with("heading") || v == "title"
            })
    })
}

fn is_page_break(e: &BytesStart<'_>) -> bool {
    e.attributes()
        .flatten()
        .any(|a| a.key.local_name().as_ref() == b"type" && a.value.as_ref() == b"page")
}

fn parse_document(xml: &[u8]) -> Result<Vec<Block>, ConvertError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut blocks = Vec::new();

    let mut text = String::new();
    let mut heading = false;
    let mut in_paragraph = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => {
                    in_paragraph = true;
                    heading = false;
                    text.clear();
                }
                b"t" => in_text = true,
                b"pStyle" => heading |= is_heading_style(&e),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" if in_paragraph => text.push('\t'),
                b"br" if is_page_break(&e) => {
                    if !text.is_empty() {
                        blocks.push(Block::Paragraph(std::mem::take(&mut text)));
                    }
                    blocks.push(Block::PageBreak);
                }
                b"br" | b"cr" if in_paragraph => text.push('\n'),
                b"pStyle" => heading |= is_heading_style(&e),
                b"p" => blocks.push(Block::Paragraph(String::new())),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let s = t
                    .unescape()
                    .map_err(|e| ConvertError::package(Format::Docx, e))?;
                text.push_str(&s);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    in_paragraph = false;
                    let t = std::mem::take(&mut text);
                    blocks.push(if heading {
                        Block::Heading(t)
                    } else {
                        Block::Paragraph(t)
                    });
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ConvertError::package(Format::Docx, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(blocks)
}

fn run(text: &str, bold: bool) -> String {
    let props = if bold {
        r#"<w:rPr><w:b/><w:sz w:val="32"/></w:rPr>"#
    } else {
        ""
    };
    let segments: Vec<String> = text
        .split('\t')
        .map(|seg| format!(r#"<w:t xml:space="preserve">{}</w:t>"#, xml_text(seg)))
        .collect();
    format!("<w:r>{props}{}</w:r>", segments.join("<w:tab/>"))
}

fn document_xml(blocks: &[Block]) -> String {
    let mut body = String::new();
    for block in blocks {
        match block {
            Block::Heading(t) => {
                body.push_str(r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr>"#);
                body.push_str(&run(t, true));
                body.push_str("</w:p>");
            }
            Block::Paragraph(t) => {
                body.push_str("<w:p>");
                for (i, line) in t.split('\n').enumerate() {
                    if i > 0 {
                        body.push_str("<w:r><w:br/></w:r>");
                    }
                    body.push_str(&run(line, false));
                }
                body.push_str("</w:p>");
            }
            Block::PageBreak => body.push_str(r#"<w:p><w:r><w:br w:type="page"/></w:r></w:p>"#),
        }
    }
    format!(
        r#"{XML_DECL}
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/></w:sectPr></w:body></w:document>"#
    )
}

/// Write blocks as a minimal but valid .docx package.
pub fn write(blocks: &[Block]) -> Result<Vec<u8>, ConvertError> {
    let content_types = format!(
        r#"{XML_DECL}
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#
    );
    let rels = format!(
        r#"{XML_DECL}
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#
    );

    let mut package = PackageWriter::new(Format::Docx);
    package.add("[Content_Types].xml", content_types.as_bytes())?;
    package.add("_rels/.rels", rels.as_bytes())?;
    package.add(DOCUMENT_PART, document_xml(blocks).as_bytes())?;
    package.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_paragraphs_headings_tabs_and_breaks() {
        let xml = br#"<w:document xmlns:w="x"><w:body>
            <w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t>Intro</w:t></w:r></w:p>
            <w:p><w:r><w:t xml:space="preserve">a </w:t></w:r><w:r><w:tab/><w:t>b &amp; c</w:t></w:r></w:p>
            <w:p/>
            <w:p><w:r><w:br w:type="page"/></w:r></w:p>
            <w:p><w:r><w:t>after</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let blocks = parse_document(xml).unwrap();
        assert_eq!(
            blocks,
            vec![
                Block::Heading("Intro".into()),
                Block::Paragraph("a \tb & c".into()),
                Block::Paragraph(String::new()),
                Block::PageBreak,
                Block::Paragraph(String::new()),
                Block::Paragraph("after".into()),
            ]
        );
    }

    #[test]
    fn written_docx_reads_back_as_the_same_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.docx");
        let blocks = vec![
            Block::Heading("Report <draft>".into()),
            Block::Paragraph("col1\tcol2".into()),
            Block::PageBreak,
            Block::Paragraph("second page".into()),
        ];
        let bytes = write(&blocks).unwrap();
        assert!(bytes.starts_with(b"PK"));
        std::fs::write(&path, bytes).unwrap();

        let back: Vec<Block> = read_blocks(&path)
            .unwrap()
            .into_iter()
            .filter(|b| *b != Block::Paragraph(String::new()))
            .collect();
        assert_eq!(back, blocks);
    }

    #[test]
    fn missing_document_part_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.docx");
        let mut w = PackageWriter::new(Format::Docx);
        w.add("other.xml", b"<x/>").unwrap();
        std::fs::write(&path, w.finish().unwrap()).unwrap();
        let err = read_blocks(&path).unwrap_err();
        assert!(err.to_string().contains("word/document.xml"), "got: {err}");
    }
}
