// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Office Open XML readers: DOCX, PPTX and XLSX packages.
//
// DOCX pages are delimited by explicit page breaks only (the layout engine
// that decides soft breaks is not available here). PPTX yields one page per
// slide, XLSX one page per worksheet.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument, warn};
use vibeparser_core::{LayoutBlock, Result, TableBlock, VibeError};
use zip::ZipArchive;
use zip::result::ZipError;

use super::xml::{XmlEvent, attr, events};
use super::{StructuralPage, list_item_body, push_block};

type Package<'a> = ZipArchive<Cursor<&'a [u8]>>;

static SLIDE_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").expect("valid slide pattern"));
static SHEET_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^xl/worksheets/sheet(\d+)\.xml$").expect("valid sheet pattern")
});

fn open_package(data: &[u8]) -> Result<Package<'_>> {
    ZipArchive::new(Cursor::new(data))
        .map_err(|err| VibeError::DocumentUnreadable(format!("corrupt OOXML package: {err}")))
}

/// Read a package part as UTF-8; `None` when it does not exist.
fn read_part(package: &mut Package<'_>, name: &str) -> Result<Option<String>> {
    let mut file = match package.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => {
            return Err(VibeError::DocumentUnreadable(format!(
                "cannot read part {name}: {err}"
            )));
        }
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml).map_err(|err| {
        VibeError::DocumentUnreadable(format!("part {name} is not valid UTF-8 XML: {err}"))
    })?;
    Ok(Some(xml))
}

fn require_part(package: &mut Package<'_>, name: &str) -> Result<String> {
    read_part(package, name)?
        .ok_or_else(|| VibeError::DocumentUnreadable(format!("package has no {name}")))
}

/// Parts matching `pattern`, ordered by their numeric suffix.
fn numbered_parts(package: &Package<'_>, pattern: &Regex) -> Vec<String> {
    let mut parts: Vec<(u32, String)> = package
        .file_names()
        .filter_map(|name| {
            let number = pattern.captures(name)?.get(1)?.as_str().parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    parts.sort();
    parts.into_iter().map(|(_, name)| name).collect()
}

// -- Shared table assembly ----------------------------------------------------

/// Rows/cells collected while inside a table element.
#[derive(Default)]
struct TableBuilder {
    depth: usize,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: String,
}

impl TableBuilder {
    fn active(&self) -> bool {
        self.depth > 0
    }

    fn open_table(&mut self) {
        self.depth += 1;
        if self.depth == 1 {
            self.rows.clear();
        }
    }

    /// Returns the finished table when the outermost table closes.
    fn close_table(&mut self) -> Option<TableBlock> {
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 {
            return None;
        }
        let table = TableBlock::new(std::mem::take(&mut self.rows));
        (!table.is_empty()).then_some(table)
    }

    fn open_row(&mut self) {
        if self.depth == 1 {
            self.row.clear();
        }
    }

    fn close_row(&mut self) {
        if self.depth == 1 {
            self.rows.push(std::mem::take(&mut self.row));
        }
    }

    fn open_cell(&mut self) {
        if self.depth == 1 {
            self.cell.clear();
        }
    }

    fn close_cell(&mut self) {
        if self.depth == 1 {
            self.row.push(self.cell.trim().to_string());
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.cell.is_empty() {
            self.cell.push(' ');
        }
        self.cell.push_str(text);
    }
}

// -- DOCX ---------------------------------------------------------------------

fn finish_page(page: &mut StructuralPage, pages: &mut Vec<StructuralPage>) {
    let next = StructuralPage::new(pages.len() + 1);
    pages.push(std::mem::replace(page, next));
}

/// Heading level from a Word paragraph style id.
fn docx_heading_level(style: &str) -> Option<u8> {
    let style = style.to_ascii_lowercase();
    match style.as_str() {
        "title" => Some(1),
        "subtitle" => Some(2),
        _ => style
            .strip_prefix("heading")
            .and_then(|n| n.trim().parse::<u8>().ok())
            .map(|n| n.clamp(1, 6)),
    }
}

/// Read a DOCX package into pages split at explicit page breaks.
#[instrument(skip(data), fields(bytes = data.len()))]
pub fn read_docx(data: &[u8]) -> Result<Vec<StructuralPage>> {
    let mut package = open_package(data)?;
    let xml = require_part(&mut package, "word/document.xml")?;

    let mut pages = Vec::new();
    let mut page = StructuralPage::new(0);
    let mut table = TableBuilder::default();
    let mut paragraph = String::new();
    let mut style: Option<String> = None;
    let mut is_list = false;
    let mut in_text = false;
    let mut break_after = false;

    for event in events(&xml)? {
        match event {
            XmlEvent::Open { name, attrs, empty } => match name.as_str() {
                "w:p" if !empty => {
                    paragraph.clear();
                    style = None;
                    is_list = false;
                }
                "w:pStyle" => style = attr(&attrs, "w:val").map(str::to_string),
                "w:numPr" => is_list = true,
                "w:pageBreakBefore" if !table.active() => {
                    let off = attr(&attrs, "w:val").is_some_and(|v| v == "0" || v == "false");
                    if !off && !page.text.is_empty() {
                        finish_page(&mut page, &mut pages);
                    }
                }
                "w:t" if !empty => in_text = true,
                "w:tab" => paragraph.push('\t'),
                "w:br" => {
                    if attr(&attrs, "w:type") == Some("page") {
                        break_after = true;
                    } else {
                        paragraph.push(' ');
                    }
                }
                "w:tbl" => table.open_table(),
                "w:tr" => table.open_row(),
                "w:tc" => table.open_cell(),
                _ => {}
            },
            XmlEvent::Close { name } => match name.as_str() {
                "w:t" => in_text = false,
                "w:p" => {
                    let text = paragraph.trim();
                    if table.active() {
                        table.push_text(text);
                    } else if !text.is_empty() {
                        let block = match style.as_deref().and_then(docx_heading_level) {
                            Some(level) => LayoutBlock::heading(level, text),
                            None if is_list => LayoutBlock::list_item(text),
                            None => LayoutBlock::paragraph(text),
                        };
                        push_block(&mut page, block);
                    }
                    paragraph.clear();
                    if break_after && !table.active() {
                        finish_page(&mut page, &mut pages);
                        break_after = false;
                    }
                }
                "w:tc" => table.close_cell(),
                "w:tr" => table.close_row(),
                "w:tbl" => {
                    if let Some(done) = table.close_table() {
                        page.table_blocks.push(done);
                    }
                }
                _ => {}
            },
            XmlEvent::Text(text) if in_text => paragraph.push_str(&text),
            XmlEvent::Text(_) => {}
        }
    }
    pages.push(page);

    debug!(pages = pages.len(), "DOCX read");
    Ok(pages)
}

// -- PPTX ---------------------------------------------------------------------

/// Read a PPTX package, one page per slide in slide-number order.
#[instrument(skip(data), fields(bytes = data.len()))]
pub fn read_pptx(data: &[u8]) -> Result<Vec<StructuralPage>> {
    let mut package = open_package(data)?;
    let slides = numbered_parts(&package, &SLIDE_PART);

    let mut pages = Vec::with_capacity(slides.len());
    for (index, part) in slides.iter().enumerate() {
        let xml = require_part(&mut package, part)?;
        pages.push(read_slide(index, &xml)?);
    }

    debug!(slides = pages.len(), "PPTX read");
    Ok(pages)
}

fn read_slide(index: usize, xml: &str) -> Result<StructuralPage> {
    let mut page = StructuralPage::new(index);
    let mut table = TableBuilder::default();
    let mut paragraph = String::new();
    let mut in_text = false;
    let mut title_shape = false;

    for event in events(xml)? {
        match event {
            XmlEvent::Open { name, attrs, empty } => match name.as_str() {
                "p:sp" => title_shape = false,
                "p:ph" => {
                    title_shape = matches!(attr(&attrs, "type"), Some("title" | "ctrTitle"));
                }
                "a:p" if !empty => paragraph.clear(),
                "a:t" if !empty => in_text = true,
                "a:br" => paragraph.push(' '),
                "a:tbl" => table.open_table(),
                "a:tr" => table.open_row(),
                "a:tc" => table.open_cell(),
                _ => {}
            },
            XmlEvent::Close { name } => match name.as_str() {
                "a:t" => in_text = false,
                "a:p" => {
                    let text = paragraph.trim();
                    if table.active() {
                        table.push_text(text);
                    } else if !text.is_empty() {
                        let block = if title_shape {
                            LayoutBlock::heading(1, text)
                        } else if let Some(item) = list_item_body(text) {
                            LayoutBlock::list_item(item)
                        } else {
                            LayoutBlock::paragraph(text)
                        };
                        push_block(&mut page, block);
                    }
                    paragraph.clear();
                }
                "p:sp" => title_shape = false,
                "a:tc" => table.close_cell(),
                "a:tr" => table.close_row(),
                "a:tbl" => {
                    if let Some(done) = table.close_table() {
                        page.table_blocks.push(done);
                    }
                }
                _ => {}
            },
            XmlEvent::Text(text) if in_text => paragraph.push_str(&text),
            XmlEvent::Text(_) => {}
        }
    }
    Ok(page)
}

// -- XLSX ---------------------------------------------------------------------

/// Read an XLSX package, one page per worksheet in workbook order. Each
/// sheet's cells are reported as a table; the page text is the sheet name.
#[instrument(skip(data), fields(bytes = data.len()))]
pub fn read_xlsx(data: &[u8]) -> Result<Vec<StructuralPage>> {
    let mut package = open_package(data)?;
    let shared = match read_part(&mut package, "xl/sharedStrings.xml")? {
        Some(xml) => shared_strings(&xml)?,
        None => Vec::new(),
    };
    let sheets = worksheet_parts(&mut package)?;

    let mut pages = Vec::with_capacity(sheets.len());
    for (index, (name, part)) in sheets.iter().enumerate() {
        let Some(xml) = read_part(&mut package, part)? else {
            warn!(sheet = %name, part = %part, "Worksheet part missing; skipping");
            continue;
        };
        let mut page = StructuralPage::new(index);
        push_block(&mut page, LayoutBlock::heading(1, name.as_str()));
        let rows = sheet_rows(&xml, &shared)?;
        let table = TableBlock::new(rows);
        if !table.is_empty() {
            page.table_blocks.push(table);
        }
        pages.push(page);
    }
    // Re-number after any skipped sheets so indices stay gap-free.
    for (index, page) in pages.iter_mut().enumerate() {
        page.page_index = index;
    }

    debug!(sheets = pages.len(), "XLSX read");
    Ok(pages)
}

fn shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut phonetic = 0usize;
    for event in events(xml)? {
        match event {
            XmlEvent::Open { name, empty, .. } => match (name.as_str(), empty) {
                ("si", true) => strings.push(String::new()),
                ("si", false) => current.clear(),
                ("rPh", false) => phonetic += 1,
                ("t", false) => in_text = true,
                _ => {}
            },
            XmlEvent::Close { name } => match name.as_str() {
                "t" => in_text = false,
                "rPh" => phonetic = phonetic.saturating_sub(1),
                "si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            XmlEvent::Text(text) if in_text && phonetic == 0 => current.push_str(&text),
            XmlEvent::Text(_) => {}
        }
    }
    Ok(strings)
}

/// `(sheet name, part path)` in workbook order.
fn worksheet_parts(package: &mut Package<'_>) -> Result<Vec<(String, String)>> {
    let workbook = require_part(package, "xl/workbook.xml")?;
    let targets: HashMap<String, String> = match read_part(package, "xl/_rels/workbook.xml.rels")? {
        Some(rels) => events(&rels)?
            .into_iter()
            .filter_map(|event| match event {
                XmlEvent::Open { name, attrs, .. } if name == "Relationship" => {
                    let id = attr(&attrs, "Id")?;
                    let target = attr(&attrs, "Target")?;
                    let path = match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{target}"),
                    };
                    Some((id.to_string(), path))
                }
                _ => None,
            })
            .collect(),
        None => HashMap::new(),
    };

    let mut sheets = Vec::new();
    for event in events(&workbook)? {
        if let XmlEvent::Open { name, attrs, .. } = &event {
            if name == "sheet" {
                let sheet = attr(attrs, "name").unwrap_or_default().to_string();
                let part = attr(attrs, "r:id").and_then(|id| targets.get(id)).cloned();
                sheets.push((sheet, part));
            }
        }
    }

    // Without relationships, fall back to the numbered worksheet parts.
    if sheets.iter().any(|(_, part)| part.is_none()) {
        let numbered = numbered_parts(package, &SHEET_PART);
        return Ok(numbered
            .into_iter()
            .enumerate()
            .map(|(i, part)| {
                let name = sheets
                    .get(i)
                    .map(|(name, _)| name.clone())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| format!("Sheet{}", i + 1));
                (name, part)
            })
            .collect());
    }
    Ok(sheets
        .into_iter()
        .filter_map(|(name, part)| Some((name, part?)))
        .collect())
}

/// 0-based column index of a cell reference such as `AB12`.
fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .map(|b| b.to_ascii_uppercase())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let number = letters
        .iter()
        .fold(0usize, |acc, b| acc * 26 + usize::from(b - b'A' + 1));
    Some(number - 1)
}

fn sheet_rows(xml: &str, shared: &[String]) -> Result<Vec<Vec<String>>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell_type = String::new();
    let mut cell_column: Option<usize> = None;
    let mut value = String::new();
    let mut capture = false;

    for event in events(xml)? {
        match event {
            XmlEvent::Open { name, attrs, empty } => match name.as_str() {
                "row" => {
                    row.clear();
                    if empty {
                        rows.push(Vec::new());
                    }
                }
                "c" => {
                    cell_type = attr(&attrs, "t").unwrap_or("n").to_string();
                    cell_column = attr(&attrs, "r").and_then(column_index);
                    value.clear();
                    if empty {
                        place_cell(&mut row, cell_column, String::new());
                    }
                }
                "v" | "t" if !empty => capture = true,
                _ => {}
            },
            XmlEvent::Close { name } if name == "v" || name == "t" => capture = false,
            XmlEvent::Text(text) if capture => value.push_str(&text),
            XmlEvent::Close { name } if name == "c" => {
                let resolved = match cell_type.as_str() {
                    "s" => value
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared.get(i).cloned())
                        .unwrap_or_default(),
                    "b" => String::from(if value.trim() == "1" { "TRUE" } else { "FALSE" }),
                    _ => value.clone(),
                };
                place_cell(&mut row, cell_column, resolved);
            }
            XmlEvent::Close { name } if name == "row" => {
                while row.last().is_some_and(|c| c.is_empty()) {
                    row.pop();
                }
                rows.push(std::mem::take(&mut row));
            }
            _ => {}
        }
    }
    while rows.last().is_some_and(Vec::is_empty) {
        rows.pop();
    }
    Ok(rows)
}

fn place_cell(row: &mut Vec<String>, column: Option<usize>, value: String) {
    match column {
        Some(column) if column >= row.len() => {
            row.resize(column, String::new());
            row.push(value);
        }
        Some(column) => row[column] = value,
        None => row.push(value),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// Build a zip package from `(part, content)` pairs.
    pub(crate) fn package(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in parts {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    pub(crate) const DOCX_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Quarterly Report</w:t></w:r></w:p>
<w:p><w:r><w:t xml:space="preserve">Revenue grew </w:t></w:r><w:r><w:t>by ten percent.</w:t></w:r></w:p>
<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Region</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Sales</w:t></w:r></w:p></w:tc></w:tr>
<w:tr><w:tc><w:p><w:r><w:t>North</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>12</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
<w:p><w:r><w:br w:type="page"/></w:r></w:p>
<w:p><w:pPr><w:numPr><w:ilvl w:val="0"/></w:numPr></w:pPr><w:r><w:t>Second page item</w:t></w:r></w:p>
</w:body></w:document>"#;

    #[test]
    fn docx_paragraphs_headings_tables_and_page_breaks() {
        let data = package(&[("word/document.xml", DOCX_BODY)]);
        let pages = read_docx(&data).unwrap();
        assert_eq!(pages.len(), 2);

        let first = &pages[0];
        assert_eq!(first.text, "# Quarterly Report\n\nRevenue grew by ten percent.");
        assert_eq!(first.layout_blocks[0], LayoutBlock::heading(1, "Quarterly Report"));
        assert_eq!(first.table_blocks.len(), 1);
        assert_eq!(
            first.table_blocks[0].rows,
            vec![vec!["Region", "Sales"], vec!["North", "12"]]
        );

        let second = &pages[1];
        assert_eq!(second.page_index, 1);
        assert_eq!(second.layout_blocks, vec![LayoutBlock::list_item("Second page item")]);
    }

    #[test]
    fn docx_text_keeps_cdata_and_entities() {
        let body = r#"<w:document><w:body>
<w:p><w:r><w:t>R&amp;D &lt;draft&gt; <![CDATA[a < b]]></w:t></w:r></w:p>
</w:body></w:document>"#;
        let pages = read_docx(&package(&[("word/document.xml", body)])).unwrap();
        assert_eq!(pages[0].text, "R&D <draft> a < b");
    }

    #[test]
    fn malformed_part_is_unreadable() {
        let body = "<w:document><w:body><w:p></w:body></w:document>";
        let result = read_docx(&package(&[("word/document.xml", body)]));
        assert!(matches!(result, Err(VibeError::DocumentUnreadable(_))));
    }

    #[test]
    fn docx_without_main_part_is_unreadable() {
        let data = package(&[("word/styles.xml", "<w:styles/>")]);
        assert!(matches!(read_docx(&data), Err(VibeError::DocumentUnreadable(_))));
    }

    #[test]
    fn pptx_slides_follow_numeric_order() {
        let slide = |title: &str, body: &str| {
            format!(
                r#"<p:sld><p:cSld><p:spTree>
<p:sp><p:nvSpPr><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:txBody><a:p><a:r><a:t>{title}</a:t></a:r></a:p></p:txBody></p:sp>
<p:sp><p:txBody><a:p><a:r><a:t>{body}</a:t></a:r></a:p></p:txBody></p:sp>
</p:spTree></p:cSld></p:sld>"#
            )
        };
        let s1 = slide("Intro", "Welcome");
        let s2 = slide("Details", "Numbers");
        let s10 = slide("Close", "Thanks");
        let data = package(&[
            ("ppt/presentation.xml", "<p:presentation/>"),
            ("ppt/slides/slide10.xml", &s10),
            ("ppt/slides/slide2.xml", &s2),
            ("ppt/slides/slide1.xml", &s1),
        ]);
        let pages = read_pptx(&data).unwrap();
        let titles: Vec<&str> = pages.iter().map(|p| p.layout_blocks[0].text.as_str()).collect();
        assert_eq!(titles, vec!["Intro", "Details", "Close"]);
        assert_eq!(pages[2].page_index, 2);
        assert_eq!(pages[0].text, "# Intro\n\nWelcome");
    }

    #[test]
    fn xlsx_sheets_become_tables_with_shared_strings() {
        let workbook = r#"<workbook><sheets><sheet name="Budget" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
        let rels = r#"<Relationships><Relationship Id="rId1" Type="worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;
        let shared = r#"<sst><si><t>Item</t></si><si><t>Cost</t></si><si><r><t>Pa</t></r><r><t>per</t></r></si></sst>"#;
        let sheet = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>
<row r="2"><c r="A2" t="s"><v>2</v></c><c r="C2"><v>4.5</v></c></row>
</sheetData></worksheet>"#;
        let data = package(&[
            ("xl/workbook.xml", workbook),
            ("xl/_rels/workbook.xml.rels", rels),
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        let pages = read_xlsx(&data).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, "# Budget");
        assert_eq!(
            pages[0].table_blocks[0].rows,
            vec![vec!["Item", "Cost"], vec!["Paper", "", "4.5"]]
        );
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("Z9"), Some(25));
        assert_eq!(column_index("AB12"), Some(27));
        assert_eq!(column_index("12"), None);
    }

    #[test]
    fn heading_styles() {
        assert_eq!(docx_heading_level("Heading2"), Some(2));
        assert_eq!(docx_heading_level("Title"), Some(1));
        assert_eq!(docx_heading_level("Normal"), None);
    }
}
