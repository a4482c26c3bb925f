// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Structural text extraction: reading the character data a document stores
// directly, without rasterization or OCR.

pub mod markup;
pub mod office;
pub mod pdf;
pub mod xml;

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use vibeparser_core::{BlockKind, LayoutBlock, Result, TableBlock, VibeError};

use crate::document::{Document, DocumentBody};

/// Text and layout recovered from one page of a document's structural layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralPage {
    /// 0-based page index.
    pub page_index: usize,
    /// Running text in reading order. Excludes cells of `table_blocks`.
    pub text: String,
    pub layout_blocks: Vec<LayoutBlock>,
    pub table_blocks: Vec<TableBlock>,
}

impl StructuralPage {
    pub fn new(page_index: usize) -> Self {
        Self {
            page_index,
            ..Self::default()
        }
    }

    /// Count of non-whitespace characters, table cells included.
    pub fn visible_chars(&self) -> usize {
        let cells: usize = self
            .table_blocks
            .iter()
            .flat_map(|t| t.rows.iter().flatten())
            .map(|cell| count_visible(cell))
            .sum();
        count_visible(&self.text) + cells
    }

    /// All text on the page, table cells appended one row per line.
    pub fn probe_text(&self) -> String {
        let mut text = self.text.clone();
        for table in &self.table_blocks {
            for row in &table.rows {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&row.join(" "));
            }
        }
        text
    }
}

fn count_visible(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Capability: read embedded text for a range of pages.
///
/// Implementations must only read: the document is shared across threads
/// and must come back unmodified.
pub trait StructuralReader: Send + Sync {
    /// Pages `pages` of `document`, in order. Indices past the last page are
    /// ignored. Formats without a text layer fail with `UnsupportedFormat`.
    fn read_structural(&self, document: &Document, pages: Range<usize>)
    -> Result<Vec<StructuralPage>>;
}

/// Reads whatever text layer the document's own format carries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeReader;

impl StructuralReader for NativeReader {
    #[instrument(skip(self, document), fields(document = %document.name(), start = pages.start, end = pages.end))]
    fn read_structural(
        &self,
        document: &Document,
        pages: Range<usize>,
    ) -> Result<Vec<StructuralPage>> {
        let end = pages.end.min(document.page_count());
        let range = pages.start.min(end)..end;

        let result = match document.body() {
            DocumentBody::Pdf(reader) => range
                .map(|index| pdf::read_page(reader, index))
                .collect::<Result<Vec<_>>>()?,
            DocumentBody::Parsed(parsed) => parsed[range].to_vec(),
            DocumentBody::Image(_) => {
                return Err(VibeError::UnsupportedFormat(format!(
                    "{} is an image and has no text layer",
                    document.name()
                )));
            }
        };

        debug!(pages = result.len(), "Structural pages read");
        Ok(result)
    }
}

/// Append a block to a page: text as markdown-ish lines, plus its layout block.
pub(crate) fn push_block(page: &mut StructuralPage, block: LayoutBlock) {
    let line = match block.kind {
        BlockKind::Heading { level } => format!("{} {}", "#".repeat(level as usize), block.text),
        BlockKind::ListItem => format!("- {}", block.text),
        BlockKind::Paragraph => block.text.clone(),
    };
    if !page.text.is_empty() {
        page.text.push_str("\n\n");
    }
    page.text.push_str(&line);
    page.layout_blocks.push(block);
}

/// Split text into paragraph and list-item blocks on blank lines.
pub(crate) fn blocks_from_text(text: &str) -> Vec<LayoutBlock> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    fn flush(current: &mut Vec<&str>, blocks: &mut Vec<LayoutBlock>) {
        if !current.is_empty() {
            blocks.push(LayoutBlock::paragraph(current.join(" ")));
            current.clear();
        }
    }

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush(&mut current, &mut blocks);
        } else if let Some(item) = list_item_body(trimmed) {
            flush(&mut current, &mut blocks);
            blocks.push(LayoutBlock::list_item(item));
        } else {
            current.push(trimmed);
        }
    }
    flush(&mut current, &mut blocks);
    blocks
}

/// Body of a bulleted or numbered line, without its marker.
pub(crate) fn list_item_body(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "+ ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 && digits <= 3 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest.trim());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_split_on_blank_lines_and_bullets() {
        let blocks = blocks_from_text("First line\ncontinues here\n\n- bullet one\n2. numbered\nTail");
        assert_eq!(blocks.len(), 4);
        assert_eq!(blocks[0].text, "First line continues here");
        assert_eq!(blocks[1].kind, BlockKind::ListItem);
        assert_eq!(blocks[1].text, "bullet one");
        assert_eq!(blocks[2].text, "numbered");
        assert_eq!(blocks[3].kind, BlockKind::Paragraph);
    }

    #[test]
    fn years_are_not_list_markers() {
        assert_eq!(list_item_body("2024. A year"), None);
        assert_eq!(list_item_body("12) twelve"), Some("twelve"));
    }

    #[test]
    fn visible_chars_include_table_cells() {
        let page = StructuralPage {
            page_index: 0,
            text: "ab c".into(),
            layout_blocks: Vec::new(),
            table_blocks: vec![TableBlock::new(vec![vec!["x".into(), "y z".into()]])],
        };
        assert_eq!(page.visible_chars(), 6);
        assert_eq!(page.probe_text(), "ab c\nx y z");
    }
}
