//! PowerPoint: slide text in, full-bleed picture slides out.

use super::ooxml::{part_number, xml_text, PackageReader, PackageWriter, XML_DECL};
use super::Slide;
use crate::error::ConvertError;
use crate::format::Format;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;

const SLIDE_PREFIX: &str = "ppt/slides/slide";
const PRESENTATION: &str = "ppt/presentation.xml";
const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";

/// 16:9 slide in EMU.
const SLIDE_CX: u64 = 12_192_000;
const SLIDE_CY: u64 = 6_858_000;

/// Read every slide's paragraphs in presentation order.
///
/// The order comes from `<p:sldIdLst>` in `ppt/presentation.xml`. Packages
/// without a usable slide list fall back to the slide part numbers.
pub fn read_slides(path: &Path) -> Result<Vec<Slide>, ConvertError> {
    let mut package = PackageReader::open(path, Format::Pptx)?;
    let names = package.names();
    let mut numbered: Vec<(u32, String)> = names
        .iter()
        .filter_map(|n| part_number(n, SLIDE_PREFIX, ".xml").map(|num| (num, n.clone())))
        .collect();
    numbered.sort_by_key(|(num, _)| *num);

    let mut parts = listed_slides(&mut package, &names)?;
    if parts.is_empty() {
        parts = numbered.into_iter().map(|(_, name)| name).collect();
    }

    parts
        .iter()
        .map(|name| {
            let xml = package.read_part(name)?;
            parse_slide(&xml)
        })
        .collect()
}

/// Slide part names in `<p:sldIdLst>` order, skipping targets the package lacks.
fn listed_slides(
    package: &mut PackageReader,
    names: &[String],
) -> Result<Vec<String>, ConvertError> {
    let has = |part: &str| names.iter().any(|n| n == part);
    if !has(PRESENTATION) || !has(PRESENTATION_RELS) {
        return Ok(Vec::new());
    }

    let rels_xml = package.read_part(PRESENTATION_RELS)?;
    let mut targets: HashMap<String, String> = HashMap::new();
    for_each_element(&rels_xml, b"Relationship", |e| {
        if let (Some(id), Some(target)) = (attr(e, b"Id"), attr(e, b"Target")) {
            targets.insert(id, resolve_target(&target));
        }
    })?;

    let pres_xml = package.read_part(PRESENTATION)?;
    let mut order = Vec::new();
    for_each_element(&pres_xml, b"sldId", |e| {
        let rel = e
            .attributes()
            .flatten()
            .find(|a| a.key.local_name().as_ref() == b"id" && a.key.prefix().is_some())
            .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
        if let Some(part) = rel.and_then(|id| targets.get(&id)) {
            if has(part) {
                order.push(part.clone());
            }
        }
    })?;
    Ok(order)
}

/// Targets in the presentation rels are relative to `ppt/` unless absolute.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("ppt/{}", target.trim_start_matches("./")),
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn for_each_element(
    xml: &[u8],
    local: &[u8],
    mut f: impl FnMut(&BytesStart<'_>),
) -> Result<(), ConvertError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == local => f(&e),
            Ok(Event::Eof) => return Ok(()),
            Err(e) => return Err(ConvertError::package(Format::Pptx, e)),
            _ => {}
        }
        buf.clear();
    }
}

fn parse_slide(xml: &[u8]) -> Result<Slide, ConvertError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut slide = Slide::default();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"br" => current.push(' '),
            Ok(Event::Text(t)) if in_text => {
                let s = t
                    .unescape()
                    .map_err(|e| ConvertError::package(Format::Pptx, e))?;
                current.push_str(&s);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let para = current.trim();
                    if !para.is_empty() {
                        slide.paragraphs.push(para.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ConvertError::package(Format::Pptx, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(slide)
}

/// A rendered page ready to be placed on a slide.
pub struct SlideImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Fit `w × h` inside the slide, centred, preserving aspect ratio.
fn fit(w: u32, h: u32) -> (u64, u64, u64, u64) {
    let (w, h) = (u64::from(w.max(1)), u64::from(h.max(1)));
    let (cx, cy) = if w * SLIDE_CY > h * SLIDE_CX {
        (SLIDE_CX, h * SLIDE_CX / w)
    } else {
        (w * SLIDE_CY / h, SLIDE_CY)
    };
    ((SLIDE_CX - cx) / 2, (SLIDE_CY - cy) / 2, cx, cy)
}

fn slide_xml(index: usize, image: &SlideImage) -> String {
    let (x, y, cx, cy) = fit(image.width, image.height);
    let name = xml_text(&format!("Page {}", index + 1));
    format!(
        r#"{XML_DECL}
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr><p:pic><p:nvPicPr><p:cNvPr id="2" name="{name}"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId2"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic></p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#
    )
}

fn rels(entries: &[(&str, &str, String)]) -> String {
    let body: String = entries
        .iter()
        .map(|(id, kind, target)| {
            format!(
                r#"<Relationship Id="{id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/{kind}" Target="{target}"/>"#
            )
        })
        .collect();
    format!(
        r#"{XML_DECL}
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{body}</Relationships>"#
    )
}

const THEME: &str = r#"<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office"><a:themeElements><a:clrScheme name="Office"><a:dk1><a:srgbClr val="000000"/></a:dk1><a:lt1><a:srgbClr val="FFFFFF"/></a:lt1><a:dk2><a:srgbClr val="44546A"/></a:dk2><a:lt2><a:srgbClr val="E7E6E6"/></a:lt2><a:accent1><a:srgbClr val="4472C4"/></a:accent1><a:accent2><a:srgbClr val="ED7D31"/></a:accent2><a:accent3><a:srgbClr val="A5A5A5"/></a:accent3><a:accent4><a:srgbClr val="FFC000"/></a:accent4><a:accent5><a:srgbClr val="5B9BD5"/></a:accent5><a:accent6><a:srgbClr val="70AD47"/></a:accent6><a:hlink><a:srgbClr val="0563C1"/></a:hlink><a:folHlink><a:srgbClr val="954F72"/></a:folHlink></a:clrScheme><a:fontScheme name="Office"><a:majorFont><a:latin typeface="Calibri Light"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme><a:fmtScheme name="Office"><a:fillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:fillStyleLst><a:lnStyleLst><a:ln w="6350"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="12700"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="19050"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln></a:lnStyleLst><a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst><a:bgFillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:bgFillStyleLst></a:fmtScheme></a:themeElements></a:theme>"#;

const MASTER: &str = r#"<p:sldMaster xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld><p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst></p:sldMaster>"#;

const LAYOUT: &str = r#"<p:sldLayout xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" type="blank"><p:cSld name="Blank"><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#;

/// Write one picture slide per image.
pub fn write_picture_deck(images: &[SlideImage]) -> Result<Vec<u8>, ConvertError> {
    let slide_overrides: String = (1..=images.len())
        .map(|n| format!(r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#))
        .collect();
    let content_types = format!(
        r#"{XML_DECL}
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/><Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/><Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/><Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>{slide_overrides}</Types>"#
    );

    let slide_ids: String = (0..images.len())
        .map(|i| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, i + 3))
        .collect();
    let presentation = format!(
        r#"{XML_DECL}
<p:presentation xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst>{slide_ids}</p:sldIdLst><p:sldSz cx="{SLIDE_CX}" cy="{SLIDE_CY}"/><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#
    );

    let slide_rel_ids: Vec<String> = (0..images.len()).map(|i| format!("rId{}", i + 3)).collect();
    let mut pres_rels = vec![
        ("rId1", "slideMaster", "slideMasters/slideMaster1.xml".to_string()),
        ("rId2", "theme", "theme/theme1.xml".to_string()),
    ];
    for (i, id) in slide_rel_ids.iter().enumerate() {
        pres_rels.push((id.as_str(), "slide", format!("slides/slide{}.xml", i + 1)));
    }

    let mut package = PackageWriter::new(Format::Pptx);
    package.add("[Content_Types].xml", content_types.as_bytes())?;
    package.add(
        "_rels/.rels",
        rels(&[("rId1", "officeDocument", "ppt/presentation.xml".into())]).as_bytes(),
    )?;
    package.add(PRESENTATION, presentation.as_bytes())?;
    package.add(PRESENTATION_RELS, rels(&pres_rels).as_bytes())?;
    package.add("ppt/theme/theme1.xml", format!("{XML_DECL}\n{THEME}").as_bytes())?;
    package.add(
        "ppt/slideMasters/slideMaster1.xml",
        format!("{XML_DECL}\n{MASTER}").as_bytes(),
    )?;
    package.add(
        "ppt/slideMasters/_rels/slideMaster1.xml.rels",
        rels(&[
            ("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml".into()),
            ("rId2", "theme", "../theme/theme1.xml".into()),
        ])
        .as_bytes(),
    )?;
    package.add(
        "ppt/slideLayouts/slideLayout1.xml",
        format!("{XML_DECL}\n{LAYOUT}").as_bytes(),
    )?;
    package.add(
        "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
        rels(&[("rId1", "slideMaster", "../slideMasters/slideMaster1.xml".into())]).as_bytes(),
    )?;

    for (i, image) in images.iter().enumerate() {
        let n = i + 1;
        package.add(&format!("ppt/media/image{n}.png"), &image.png)?;
        package.add(&format!("ppt/slides/slide{n}.xml"), slide_xml(i, image).as_bytes())?;
        package.add(
            &format!("ppt/slides/_rels/slide{n}.xml.rels"),
            rels(&[
                ("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml".into()),
                ("rId2", "image", format!("../media/image{n}.png")),
            ])
            .as_bytes(),
        )?;
    }
    package.finish()
}

/// Text-only deck: `slides[i]` is stored as `slide{i+1}.xml`, listed in
/// `order` (indexes into `slides`).
#[cfg(test)]
pub(crate) fn text_deck(slides: &[&[&str]], order: &[usize]) -> Vec<u8> {
    let mut package = PackageWriter::new(Format::Pptx);
    let ids: String = order
        .iter()
        .enumerate()
        .map(|(pos, i)| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + pos, i + 10))
        .collect();
    let presentation = format!(
        r#"{XML_DECL}
<p:presentation xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:sldIdLst>{ids}</p:sldIdLst></p:presentation>"#
    );
    let ids: Vec<String> = (0..slides.len()).map(|i| format!("rId{}", i + 10)).collect();
    let entries: Vec<(&str, &str, String)> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), "slide", format!("slides/slide{}.xml", i + 1)))
        .collect();
    package.add(PRESENTATION, presentation.as_bytes()).unwrap();
    package.add(PRESENTATION_RELS, rels(&entries).as_bytes()).unwrap();

    for (i, paragraphs) in slides.iter().enumerate() {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<a:p><a:r><a:t>{}</a:t></a:r></a:p>", xml_text(p)))
            .collect();
        let xml = format!(
            r#"{XML_DECL}
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:sp><p:txBody>{body}</p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#
        );
        package
            .add(&format!("{SLIDE_PREFIX}{}.xml", i + 1), xml.as_bytes())
            .unwrap();
    }
    package.finish().unwrap()
}
