// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text-based formats: HTML, Markdown, plain text and CSV.

use scraper::node::Node;
use scraper::{ElementRef, Html};
use tracing::debug;
use vibeparser_core::{LayoutBlock, TableBlock};

use super::{StructuralPage, blocks_from_text, list_item_body, push_block};

/// Form feed: the page separator for plain text and Markdown.
const PAGE_BREAK: char = '\x0c';

/// Elements whose content is never visible text.
const SKIPPED: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "iframe", "object", "canvas",
];

/// Elements that end the current run of inline text.
const BLOCK_CONTAINERS: &[&str] = &[
    "html", "body", "div", "section", "article", "main", "header", "footer", "nav", "aside",
    "ul", "ol", "dl", "dt", "dd", "p", "blockquote", "figure", "figcaption", "form", "address",
    "hr", "center", "details", "summary", "fieldset",
];

// -- HTML ---------------------------------------------------------------------

/// Read an HTML document as a single page of visible text.
pub fn read_html(source: &str) -> Vec<StructuralPage> {
    let html = Html::parse_document(source);
    let mut collector = HtmlCollector::default();
    collector.walk(html.root_element());
    collector.flush();

    let page = collector.page;
    debug!(
        blocks = page.layout_blocks.len(),
        tables = page.table_blocks.len(),
        "HTML read"
    );
    vec![page]
}

#[derive(Default)]
struct HtmlCollector {
    page: StructuralPage,
    inline: String,
    list_depth: usize,
}

impl HtmlCollector {
    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.inline.push_str(text),
                Node::Element(el) => {
                    let Some(child_ref) = ElementRef::wrap(child) else {
                        continue;
                    };
                    let name = el.name();
                    if SKIPPED.contains(&name) {
                        continue;
                    }
                    match name {
                        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                            self.flush();
                            let level = name[1..].parse().unwrap_or(1);
                            let text = collapse_whitespace(&child_ref.text().collect::<String>());
                            if !text.is_empty() {
                                push_block(&mut self.page, LayoutBlock::heading(level, text));
                            }
                        }
                        "pre" => {
                            self.flush();
                            let text = child_ref.text().collect::<String>();
                            let text = text.trim_matches('\n').trim_end();
                            if !text.trim().is_empty() {
                                push_block(&mut self.page, LayoutBlock::paragraph(text));
                            }
                        }
                        "li" => {
                            self.flush();
                            self.list_depth += 1;
                            self.walk(child_ref);
                            self.flush();
                            self.list_depth -= 1;
                        }
                        "table" => {
                            self.flush();
                            let table = table_rows(child_ref);
                            if !table.is_empty() {
                                self.page.table_blocks.push(table);
                            }
                        }
                        "br" => self.inline.push(' '),
                        _ if BLOCK_CONTAINERS.contains(&name) => {
                            self.flush();
                            self.walk(child_ref);
                            self.flush();
                        }
                        _ => self.walk(child_ref),
                    }
                }
                _ => {}
            }
        }
    }

    /// Close the current inline run as a paragraph (or list item inside `<li>`).
    fn flush(&mut self) {
        let text = collapse_whitespace(&self.inline);
        self.inline.clear();
        if text.is_empty() {
            return;
        }
        let block = if self.list_depth > 0 {
            LayoutBlock::list_item(text)
        } else {
            LayoutBlock::paragraph(text)
        };
        push_block(&mut self.page, block);
    }
}

/// Rows of `table`, skipping rows that belong to tables nested inside it.
fn table_rows(table: ElementRef<'_>) -> TableBlock {
    let rows = table
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "tr")
        .filter(|row| nearest_table(*row).is_some_and(|t| t.id() == table.id()))
        .map(|row| {
            row.children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                .map(|cell| collapse_whitespace(&cell.text().collect::<String>()))
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();
    TableBlock::new(rows)
}

fn nearest_table(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// -- Plain text and Markdown --------------------------------------------------

/// Split `text` into pages on form feeds. A trailing form feed does not open
/// an extra page.
fn split_pages(text: &str) -> Vec<&str> {
    let mut chunks: Vec<&str> = text.split(PAGE_BREAK).collect();
    if chunks.len() > 1 && chunks.last().is_some_and(|c| c.trim().is_empty()) {
        chunks.pop();
    }
    chunks
}

/// Read plain text: paragraphs on blank lines, pages on form feeds.
pub fn read_plain_text(text: &str) -> Vec<StructuralPage> {
    split_pages(text)
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let text = chunk.trim_matches(|c: char| c == '\n' || c == '\r').trim_end().to_string();
            StructuralPage {
                page_index: index,
                layout_blocks: blocks_from_text(&text),
                text,
                table_blocks: Vec::new(),
            }
        })
        .collect()
}

/// Read Markdown: ATX headings become heading blocks and pipe tables become
/// table blocks; everything else is kept verbatim in the page text.
pub fn read_markdown(text: &str) -> Vec<StructuralPage> {
    split_pages(text)
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| markdown_page(index, chunk))
        .collect()
}

fn markdown_page(index: usize, chunk: &str) -> StructuralPage {
    let mut page = StructuralPage::new(index);
    let mut kept: Vec<&str> = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut table: Vec<Vec<String>> = Vec::new();
    let mut in_fence = false;

    fn close_paragraph(paragraph: &mut Vec<&str>, page: &mut StructuralPage) {
        if !paragraph.is_empty() {
            page.layout_blocks.extend(blocks_from_text(&paragraph.join("\n")));
            paragraph.clear();
        }
    }
    fn close_table(table: &mut Vec<Vec<String>>, page: &mut StructuralPage) {
        if !table.is_empty() {
            let block = TableBlock::new(std::mem::take(table));
            if !block.is_empty() {
                page.table_blocks.push(block);
            }
        }
    }

    for line in chunk.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            kept.push(line);
            continue;
        }
        if in_fence {
            kept.push(line);
            paragraph.push(line);
            continue;
        }
        if let Some(cells) = pipe_row(trimmed) {
            close_paragraph(&mut paragraph, &mut page);
            if !is_separator_row(&cells) {
                table.push(cells);
            }
            continue;
        }
        close_table(&mut table, &mut page);

        if let Some((level, title)) = atx_heading(trimmed) {
            close_paragraph(&mut paragraph, &mut page);
            page.layout_blocks.push(LayoutBlock::heading(level, title));
        } else if trimmed.is_empty() {
            close_paragraph(&mut paragraph, &mut page);
        } else if list_item_body(trimmed).is_some() {
            close_paragraph(&mut paragraph, &mut page);
            paragraph.push(trimmed);
            close_paragraph(&mut paragraph, &mut page);
        } else {
            paragraph.push(trimmed);
        }
        kept.push(line);
    }
    close_paragraph(&mut paragraph, &mut page);
    close_table(&mut table, &mut page);

    page.text = kept.join("\n").trim_matches('\n').trim_end().to_string();
    page
}

/// `## Title` → `(2, "Title")`. Closing `#` runs are dropped.
fn atx_heading(line: &str) -> Option<(u8, &str)> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim_end();
    (!title.is_empty()).then_some((hashes as u8, title))
}

fn pipe_row(line: &str) -> Option<Vec<String>> {
    if line.len() < 2 || !line.starts_with('|') || !line.ends_with('|') {
        return None;
    }
    let inner = &line[1..line.len() - 1];
    Some(inner.split('|').map(|cell| cell.trim().to_string()).collect())
}

fn is_separator_row(cells: &[String]) -> bool {
    cells.iter().all(|cell| {
        !cell.is_empty() && cell.chars().all(|c| matches!(c, '-' | ':' | ' '))
    })
}

// -- CSV ----------------------------------------------------------------------

/// Read CSV (RFC 4180 quoting) as one page holding one table.
pub fn read_csv(text: &str) -> Vec<StructuralPage> {
    let mut page = StructuralPage::new(0);
    let table = TableBlock::new(parse_csv(text));
    if !table.is_empty() {
        page.table_blocks.push(table);
    }
    vec![page]
}

fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = text.trim_start_matches('\u{feff}').chars().peekable();

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => quoted = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => quoted = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows.retain(|r: &Vec<String>| !(r.len() == 1 && r[0].is_empty()));
    rows
}
