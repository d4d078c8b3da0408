use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use polars::prelude::*;
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use ::zip::write::SimpleFileOptions;
use ::zip::{CompressionMethod, ZipWriter};

use crate::data::is_numeric;

pub const DOWNLOAD_NAME: &str = "dataframe.xlsx";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

/// Serialize `df` as a single-sheet workbook. Nothing touches the disk.
pub fn to_xlsx(df: &DataFrame) -> Result<Vec<u8>> {
    let sheet = sheet_xml(df)?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, body) in [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/worksheets/sheet1.xml", sheet.as_str()),
    ] {
        zip.start_file(name, options)
            .with_context(|| format!("Failed to add {name} to workbook"))?;
        zip.write_all(body.as_bytes())?;
    }
    Ok(zip.finish().context("Failed to finish workbook")?.into_inner())
}

/// Anchor tag embedding `bytes` as a base64 data URI.
pub fn download_link(bytes: &[u8]) -> String {
    let b64 = STANDARD.encode(bytes);
    format!(
        r#"<a href="data:application/octet-stream;base64,{b64}" download="{DOWNLOAD_NAME}">Download xlsx file</a>"#
    )
}

/// Workbook plus link in one step.
pub fn export_link(df: &DataFrame) -> Result<String> {
    Ok(download_link(&to_xlsx(df)?))
}

enum CellSource {
    Number(Column),
    Text(Column),
}

fn sheet_xml(df: &DataFrame) -> Result<String> {
    let mut sources = Vec::with_capacity(df.width());
    for column in df.columns() {
        sources.push(if is_numeric(column.dtype()) {
            CellSource::Number(column.cast(&DataType::Float64)?)
        } else {
            CellSource::Text(column.cast(&DataType::String)?)
        });
    }

    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );

    xml.push_str(r#"<row r="1">"#);
    for (c, name) in df.get_column_names().iter().enumerate() {
        push_text_cell(&mut xml, &cell_ref(c, 1), name.as_str());
    }
    xml.push_str("</row>");

    for i in 0..df.height() {
        let r = i + 2;
        let _ = write!(xml, r#"<row r="{r}">"#);
        for (c, source) in sources.iter().enumerate() {
            match source {
                CellSource::Number(col) => {
                    if let Some(v) = col.f64()?.get(i).filter(|v| v.is_finite()) {
                        let _ = write!(xml, r#"<c r="{}"><v>{v}</v></c>"#, cell_ref(c, r));
                    }
                }
                CellSource::Text(col) => {
                    if let Some(s) = col.str()?.get(i) {
                        push_text_cell(&mut xml, &cell_ref(c, r), s);
                    }
                }
            }
        }
        xml.push_str("</row>");
    }

    xml.push_str("</sheetData></worksheet>");
    Ok(xml)
}

fn push_text_cell(xml: &mut String, reference: &str, text: &str) {
    let _ = write!(
        xml,
        r#"<c r="{reference}" t="inlineStr"><is><t>{}</t></is></c>"#,
        escape_xml(text)
    );
}

/// `A1`-style reference for zero-based column `col` and one-based row `row`.
fn cell_ref(col: usize, row: usize) -> String {
    let mut letters = Vec::new();
    let mut n = col + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    format!("{}{row}", String::from_utf8_lossy(&letters))
}

pub(crate) fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn frame() -> DataFrame {
        df! {
            "date" => &["2020-01-02", "2020-01-03"],
            "close" => &[1.5, 2.25],
            "note" => &["a<b", "plain"],
        }
        .unwrap()
    }

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = ::zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut out = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn workbook_has_required_parts() {
        let bytes = to_xlsx(&frame()).unwrap();
        assert_eq!(&bytes[..4], b"PK\x03\x04");

        let archive = ::zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "xl/workbook.xml",
            "xl/_rels/workbook.xml.rels",
            "xl/worksheets/sheet1.xml",
        ] {
            assert!(names.contains(&part), "missing {part}");
        }
    }

    #[test]
    fn sheet_holds_header_numbers_and_escaped_text() {
        let bytes = to_xlsx(&frame()).unwrap();
        let sheet = read_entry(&bytes, "xl/worksheets/sheet1.xml");

        assert!(sheet.contains(r#"<c r="A1" t="inlineStr"><is><t>date</t></is></c>"#));
        assert!(sheet.contains(r#"<c r="B2"><v>1.5</v></c>"#));
        assert!(sheet.contains(r#"<c r="A3" t="inlineStr"><is><t>2020-01-03</t></is></c>"#));
        assert!(sheet.contains("<t>a&lt;b</t>"));
    }

    #[test]
    fn link_is_base64_data_uri() {
        let link = download_link(b"hello");
        assert_eq!(
            link,
            r#"<a href="data:application/octet-stream;base64,aGVsbG8=" download="dataframe.xlsx">Download xlsx file</a>"#
        );
    }

    #[test]
    fn cell_references() {
        assert_eq!(cell_ref(0, 1), "A1");
        assert_eq!(cell_ref(25, 3), "Z3");
        assert_eq!(cell_ref(26, 1), "AA1");
        assert_eq!(cell_ref(27, 10), "AB10");
    }
}
