//! Minimal `.xlsx` writer.
//!
//! Writes a [`WorkbookShape`] as an Office Open XML package: one worksheet
//! per sheet, inline strings (no shared string table), column widths sized
//! to content and capped at [`MAX_COLUMN_WIDTH`], and a centered style for
//! the columns a sheet marks as centered. Nothing else is styled.

use std::io::{Cursor, Seek, Write};
use std::path::Path;

use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::report::{Cell, Sheet, WorkbookShape};

pub const MAX_COLUMN_WIDTH: f64 = 40.0;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0" applyAlignment="1"><alignment horizontal="center" vertical="center"/></xf></cellXfs></styleSheet>"#;

/// Style index of the centered cell format in [`STYLES`].
const CENTERED_STYLE: &str = "1";

/// Writes `shape` to `path`, replacing any existing file.
pub fn write_workbook(shape: &WorkbookShape, path: &Path) -> Result<()> {
    let bytes = workbook_bytes(shape)?;
    std::fs::write(path, bytes)
        .with_context(|| format!("Failed to write workbook: {}", path.display()))?;
    Ok(())
}

pub fn workbook_bytes(shape: &WorkbookShape) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    put(&mut zip, options, "[Content_Types].xml", &content_types(shape.sheets.len())?)?;
    put(&mut zip, options, "_rels/.rels", ROOT_RELS.as_bytes())?;
    put(&mut zip, options, "xl/workbook.xml", &workbook_xml(shape)?)?;
    put(
        &mut zip,
        options,
        "xl/_rels/workbook.xml.rels",
        &workbook_rels(shape.sheets.len())?,
    )?;
    put(&mut zip, options, "xl/styles.xml", STYLES.as_bytes())?;
    for (i, sheet) in shape.sheets.iter().enumerate() {
        let name = format!("xl/worksheets/sheet{}.xml", i + 1);
        put(&mut zip, options, &name, &sheet_xml(sheet)?)?;
    }

    let cursor = zip.finish().context("Failed to finish workbook archive")?;
    Ok(cursor.into_inner())
}

fn put<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    name: &str,
    bytes: &[u8],
) -> Result<()> {
    zip.start_file(name, options)
        .with_context(|| format!("Failed to add {} to workbook", name))?;
    zip.write_all(bytes)?;
    Ok(())
}

fn new_writer() -> Result<Writer<Vec<u8>>> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    Ok(writer)
}

fn content_types(sheets: usize) -> Result<Vec<u8>> {
    let mut w = new_writer()?;
    let mut types = BytesStart::new("Types");
    types.push_attribute((
        "xmlns",
        "http://schemas.openxmlformats.org/package/2006/content-types",
    ));
    w.write_event(Event::Start(types))?;

    for (ext, ct) in [
        ("rels", "application/vnd.openxmlformats-package.relationships+xml"),
        ("xml", "application/xml"),
    ] {
        let mut d = BytesStart::new("Default");
        d.push_attribute(("Extension", ext));
        d.push_attribute(("ContentType", ct));
        w.write_event(Event::Empty(d))?;
    }

    let mut overrides = vec![
        (
            "/xl/workbook.xml".to_string(),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml",
        ),
        (
            "/xl/styles.xml".to_string(),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml",
        ),
    ];
    for i in 1..=sheets {
        overrides.push((
            format!("/xl/worksheets/sheet{}.xml", i),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
        ));
    }
    for (part, ct) in &overrides {
        let mut o = BytesStart::new("Override");
        o.push_attribute(("PartName", part.as_str()));
        o.push_attribute(("ContentType", *ct));
        w.write_event(Event::Empty(o))?;
    }

    w.write_event(Event::End(BytesEnd::new("Types")))?;
    Ok(w.into_inner())
}

fn workbook_xml(shape: &WorkbookShape) -> Result<Vec<u8>> {
    let mut w = new_writer()?;
    let mut wb = BytesStart::new("workbook");
    wb.push_attribute(("xmlns", NS_MAIN));
    wb.push_attribute(("xmlns:r", NS_REL));
    w.write_event(Event::Start(wb))?;
    w.write_event(Event::Start(BytesStart::new("sheets")))?;
    for (i, sheet) in shape.sheets.iter().enumerate() {
        let id = (i + 1).to_string();
        let rid = format!("rId{}", i + 1);
        let mut s = BytesStart::new("sheet");
        s.push_attribute(("name", sheet_name(&sheet.name).as_str()));
        s.push_attribute(("sheetId", id.as_str()));
        s.push_attribute(("r:id", rid.as_str()));
        w.write_event(Event::Empty(s))?;
    }
    w.write_event(Event::End(BytesEnd::new("sheets")))?;
    w.write_event(Event::End(BytesEnd::new("workbook")))?;
    Ok(w.into_inner())
}

fn workbook_rels(sheets: usize) -> Result<Vec<u8>> {
    let mut w = new_writer()?;
    let mut rels = BytesStart::new("Relationships");
    rels.push_attribute((
        "xmlns",
        "http://schemas.openxmlformats.org/package/2006/relationships",
    ));
    w.write_event(Event::Start(rels))?;

    let mut add = |id: String, kind: &str, target: String| -> Result<()> {
        let mut r = BytesStart::new("Relationship");
        r.push_attribute(("Id", id.as_str()));
        r.push_attribute(("Type", kind));
        r.push_attribute(("Target", target.as_str()));
        w.write_event(Event::Empty(r))?;
        Ok(())
    };
    for i in 1..=sheets {
        add(
            format!("rId{}", i),
            "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet",
            format!("worksheets/sheet{}.xml", i),
        )?;
    }
    add(
        format!("rId{}", sheets + 1),
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles",
        "styles.xml".to_string(),
    )?;

    w.write_event(Event::End(BytesEnd::new("Relationships")))?;
    Ok(w.into_inner())
}

fn sheet_xml(sheet: &Sheet) -> Result<Vec<u8>> {
    let mut w = new_writer()?;
    let mut ws = BytesStart::new("worksheet");
    ws.push_attribute(("xmlns", NS_MAIN));
    w.write_event(Event::Start(ws))?;

    if !sheet.columns.is_empty() {
        w.write_event(Event::Start(BytesStart::new("cols")))?;
        for (i, width) in column_widths(sheet).iter().enumerate() {
            let n = (i + 1).to_string();
            let width = format!("{:.2}", width);
            let mut col = BytesStart::new("col");
            col.push_attribute(("min", n.as_str()));
            col.push_attribute(("max", n.as_str()));
            col.push_attribute(("width", width.as_str()));
            col.push_attribute(("customWidth", "1"));
            w.write_event(Event::Empty(col))?;
        }
        w.write_event(Event::End(BytesEnd::new("cols")))?;
    }

    w.write_event(Event::Start(BytesStart::new("sheetData")))?;
    let header: Vec<Cell> = sheet.columns.iter().map(|c| Cell::Text(c.clone())).collect();
    for (r, cells) in std::iter::once(&header).chain(sheet.rows.iter()).enumerate() {
        let row_number = (r + 1).to_string();
        let mut row = BytesStart::new("row");
        row.push_attribute(("r", row_number.as_str()));
        w.write_event(Event::Start(row))?;
        for (c, cell) in cells.iter().enumerate() {
            let centered = r > 0 && sheet.centered.contains(&c);
            write_cell(&mut w, &format!("{}{}", column_name(c), r + 1), cell, centered)?;
        }
        w.write_event(Event::End(BytesEnd::new("row")))?;
    }
    w.write_event(Event::End(BytesEnd::new("sheetData")))?;

    w.write_event(Event::End(BytesEnd::new("worksheet")))?;
    Ok(w.into_inner())
}

fn write_cell(w: &mut Writer<Vec<u8>>, reference: &str, cell: &Cell, centered: bool) -> Result<()> {
    let mut c = BytesStart::new("c");
    c.push_attribute(("r", reference));
    if centered {
        c.push_attribute(("s", CENTERED_STYLE));
    }
    match cell {
        Cell::Empty => {
            w.write_event(Event::Empty(c))?;
        }
        Cell::Text(text) => {
            c.push_attribute(("t", "inlineStr"));
            w.write_event(Event::Start(c))?;
            w.write_event(Event::Start(BytesStart::new("is")))?;
            let mut t = BytesStart::new("t");
            if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) || text.contains('\n') {
                t.push_attribute(("xml:space", "preserve"));
            }
            w.write_event(Event::Start(t))?;
            w.write_event(Event::Text(BytesText::new(text)))?;
            w.write_event(Event::End(BytesEnd::new("t")))?;
            w.write_event(Event::End(BytesEnd::new("is")))?;
            w.write_event(Event::End(BytesEnd::new("c")))?;
        }
        Cell::Int(_) | Cell::Number(_) => {
            w.write_event(Event::Start(c))?;
            w.write_event(Event::Start(BytesStart::new("v")))?;
            w.write_event(Event::Text(BytesText::new(&cell.display())))?;
            w.write_event(Event::End(BytesEnd::new("v")))?;
            w.write_event(Event::End(BytesEnd::new("c")))?;
        }
    }
    Ok(())
}

/// `(longest rendered value + 2) * 1.2`, capped.
pub fn column_widths(sheet: &Sheet) -> Vec<f64> {
    (0..sheet.columns.len())
        .map(|i| {
            let longest = std::iter::once(sheet.columns[i].chars().count())
                .chain(
                    sheet
                        .rows
                        .iter()
                        .filter_map(|row| row.get(i))
                        .map(|cell| cell.display().lines().map(|l| l.chars().count()).max().unwrap_or(0)),
                )
                .max()
                .unwrap_or(0);
            ((longest + 2) as f64 * 1.2).min(MAX_COLUMN_WIDTH)
        })
        .collect()
}

/// 0 → A, 25 → Z, 26 → AA.
fn column_name(index: usize) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Excel limits sheet names to 31 characters and forbids a few symbols.
fn sheet_name(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') { '_' } else { c })
        .take(31)
        .collect()
}
