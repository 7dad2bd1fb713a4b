//! Tabular data: read the first sheet of a workbook (or a CSV) into a grid
//! of strings, and write that grid as CSV, aligned text, or .xlsx.

use super::ooxml::{xml_text, PackageWriter, XML_DECL};
use crate::error::ConvertError;
use crate::format::Format;
use calamine::{open_workbook_auto, Data, ExcelDateTime, Reader};
use chrono::NaiveTime;
use std::path::Path;
use tracing::debug;

/// A rectangular-ish grid of cells. Rows may differ in length.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

impl Table {
    fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

pub fn read(path: &Path, source: Format) -> Result<Table, ConvertError> {
    let table = match source {
        Format::Csv => read_csv(path)?,
        _ => read_workbook(path)?,
    };
    debug!(
        "read {} rows × {} columns from {}",
        table.rows.len(),
        table.width(),
        path.display()
    );
    Ok(table)
}

fn read_csv(path: &Path) -> Result<Table, ConvertError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect(),
        );
    }
    Ok(Table { rows })
}

/// First worksheet only; further sheets are ignored. Cells keep their sheet
/// position, so data starting at C3 gets two empty rows and columns first.
fn read_workbook(path: &Path) -> Result<Table, ConvertError> {
    let mut workbook = open_workbook_auto(path)?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ConvertError::Spreadsheet("workbook has no worksheets".into()))?;
    let range = workbook.worksheet_range(&first)?;
    let Some((top, left)) = range.start() else {
        return Ok(Table::default());
    };
    let (top, left) = (top as usize, left as usize);
    let width = left + range.width();

    let mut rows = vec![vec![String::new(); width]; top];
    rows.extend(range.rows().map(|row| {
        std::iter::repeat(String::new())
            .take(left)
            .chain(row.iter().map(cell_text))
            .collect()
    }));
    Ok(Table { rows })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::DateTime(dt) => date_text(dt),
        Data::DateTimeIso(iso) => iso
            .strip_suffix("T00:00:00")
            .map(str::to_owned)
            .unwrap_or_else(|| iso.replacen('T', " ", 1)),
        other => other.to_string(),
    }
}

/// ISO date, with the time only when there is one. Durations print as
/// `h:mm:ss`.
fn date_text(dt: &ExcelDateTime) -> String {
    if dt.is_duration() {
        if let Some(d) = dt.as_duration() {
            let secs = d.num_seconds();
            let sign = if secs < 0 { "-" } else { "" };
            let secs = secs.abs();
            return format!("{sign}{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
        }
    }
    let serial = dt.as_f64();
    match dt.as_datetime() {
        Some(t) if (0.0..1.0).contains(&serial) => t.format("%H:%M:%S").to_string(),
        Some(t) if t.time() == NaiveTime::MIN => t.format("%Y-%m-%d").to_string(),
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => serial.to_string(),
    }
}

pub fn to_csv(table: &Table) -> Result<Vec<u8>, ConvertError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| ConvertError::Spreadsheet(e.to_string()))
}

/// Fixed-width columns separated by two spaces, trailing blanks trimmed.
pub fn to_text(table: &Table) -> Vec<u8> {
    let mut widths = vec![0usize; table.width()];
    for row in &table.rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for row in &table.rows {
        let mut line = String::new();
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                line.push_str("  ");
            }
            line.push_str(cell);
            let pad = widths[i] - cell.chars().count();
            line.extend(std::iter::repeat(' ').take(pad));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.into_bytes()
}

/// Spreadsheet column name: 0 → A, 25 → Z, 26 → AA.
fn column_name(mut idx: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

/// Numbers are stored as numbers unless that would change how they read
/// (leading zeros, a leading `+`, surrounding spaces).
fn as_number(cell: &str) -> Option<f64> {
    if cell.is_empty() || cell.trim() != cell || cell.starts_with('+') {
        return None;
    }
    let digits = cell.trim_start_matches('-');
    if digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.") {
        return None;
    }
    cell.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn sheet_xml(table: &Table) -> String {
    let mut data = String::new();
    for (r, row) in table.rows.iter().enumerate() {
        let r = r + 1;
        data.push_str(&format!(r#"<row r="{r}">"#));
        for (c, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let reference = format!("{}{r}", column_name(c));
            match as_number(cell) {
                Some(_) => data.push_str(&format!(r#"<c r="{reference}"><v>{cell}</v></c>"#)),
                None => data.push_str(&format!(
                    r#"<c r="{reference}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                    xml_text(cell)
                )),
            }
        }
        data.push_str("</row>");
    }
    format!(
        r#"{XML_DECL}
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{data}</sheetData></worksheet>"#
    )
}

pub fn to_xlsx(table: &Table) -> Result<Vec<u8>, ConvertError> {
    let content_types = format!(
        r#"{XML_DECL}
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#
    );
    let root_rels = format!(
        r#"{XML_DECL}
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#
    );
    let workbook = format!(
        r#"{XML_DECL}
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#
    );
    let workbook_rels = format!(
        r#"{XML_DECL}
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#
    );

    let mut package = PackageWriter::new(Format::Xlsx);
    package.add("[Content_Types].xml", content_types.as_bytes())?;
    package.add("_rels/.rels", root_rels.as_bytes())?;
    package.add("xl/workbook.xml", workbook.as_bytes())?;
    package.add("xl/_rels/workbook.xml.rels", workbook_rels.as_bytes())?;
    package.add("xl/worksheets/sheet1.xml", sheet_xml(table).as_bytes())?;
    package.finish()
}
