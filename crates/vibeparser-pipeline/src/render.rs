// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output renderers for structured documents.

use vibeparser_core::{Result, StructuredDocument, TableBlock};

/// Markdown rendering: sections with heading markers by level, then the
/// extracted tables in page order.
pub fn to_markdown(document: &StructuredDocument) -> String {
    let mut blocks: Vec<String> = Vec::new();
    for section in &document.sections {
        if let Some(title) = &section.title {
            let marker = "#".repeat(usize::from(section.level.clamp(1, 6)));
            blocks.push(format!("{marker} {title}"));
        }
        blocks.extend(section.paragraphs.iter().map(|paragraph| paragraph.text()));
    }

    let tables = document
        .raw
        .pages
        .iter()
        .filter_map(|page| page.content())
        .flat_map(|content| &content.table_blocks)
        .filter(|table| !table.is_empty());
    blocks.extend(tables.map(table_to_markdown));

    let mut markdown = blocks.join("\n\n");
    if !markdown.is_empty() {
        markdown.push('\n');
    }
    markdown
}

/// A pipe table. The first row is the header; short rows are padded.
pub fn table_to_markdown(table: &TableBlock) -> String {
    let columns = table.column_count();
    let mut lines = Vec::with_capacity(table.rows.len() + 1);
    for (i, row) in table.rows.iter().enumerate() {
        let cells: Vec<String> = (0..columns)
            .map(|column| row.get(column).map(|cell| escape_cell(cell)).unwrap_or_default())
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));
        if i == 0 {
            lines.push(format!("|{}|", vec![" --- "; columns].join("|")));
        }
    }
    lines.join("\n")
}

fn escape_cell(cell: &str) -> String {
    cell.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}

/// Pretty-printed JSON of the whole document, raw pages included.
pub fn to_json(document: &StructuredDocument) -> Result<String> {
    Ok(serde_json::to_string_pretty(document)?)
}

pub fn to_json_value(document: &StructuredDocument) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vibeparser_core::{
        DocumentFormat, ExtractionPath, PageContent, Paragraph, RawExtractionResult, RawPage,
        Section,
    };

    fn document() -> StructuredDocument {
        let mut raw =
            RawExtractionResult::empty("doc".into(), DocumentFormat::Docx, ExtractionPath::Native);
        raw.page_count = 1;
        raw.pages = vec![RawPage::extracted(
            0,
            PageContent {
                table_blocks: vec![
                    TableBlock::new(vec![
                        vec!["Item".into(), "Price".into()],
                        vec!["Tea | biscuits".into()],
                    ]),
                    TableBlock::default(),
                ],
                ..PageContent::default()
            },
        )];
        let mut document = StructuredDocument::empty(raw);
        document.sections = vec![
            Section {
                title: None,
                level: 0,
                paragraphs: vec![Paragraph::new(vec!["Intro.".into()])],
            },
            Section {
                title: Some("Costs".into()),
                level: 9,
                paragraphs: vec![Paragraph::new(vec!["One.".into(), "Two.".into()])],
            },
        ];
        document
    }

    #[test]
    fn markdown_has_headings_paragraphs_and_tables() {
        let markdown = to_markdown(&document());
        assert_eq!(
            markdown,
            "Intro.\n\n###### Costs\n\nOne. Two.\n\n\
             | Item | Price |\n| --- | --- |\n| Tea \\| biscuits |  |\n"
        );
    }

    #[test]
    fn empty_document_renders_nothing() {
        let raw =
            RawExtractionResult::empty("doc".into(), DocumentFormat::Pdf, ExtractionPath::Native);
        assert_eq!(to_markdown(&StructuredDocument::empty(raw)), "");
    }

    #[test]
    fn json_carries_sections_and_raw_pages() {
        let value = to_json_value(&document()).unwrap();
        assert_eq!(value["sections"][1]["title"], "Costs");
        assert_eq!(value["sections"][1]["paragraphs"][0][1], "Two.");
        assert_eq!(value["raw"]["page_count"], 1);
        assert!(to_json(&document()).unwrap().contains("\"markdown\""));
    }
}
