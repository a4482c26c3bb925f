// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF text layer: one structural page per PDF page.

use vibeparser_core::Result;

use super::{StructuralPage, blocks_from_text};
use crate::pdf::PdfReader;

/// Extract page `index` (0-based) from the PDF text layer.
pub fn read_page(reader: &PdfReader, index: usize) -> Result<StructuralPage> {
    let text = normalize_page_text(&reader.page_text(index)?);
    Ok(StructuralPage {
        page_index: index,
        layout_blocks: blocks_from_text(&text),
        text,
        table_blocks: Vec::new(),
    })
}

/// lopdf emits one line per text-showing operation with trailing spaces;
/// trim those and collapse runs of blank lines.
fn normalize_page_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;
    for line in raw.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        blank_run = 0;
        out.push_str(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_space_and_blank_runs_are_normalized() {
        let raw = "Title  \n\n\n\nBody line one \nBody line two\n   \n";
        assert_eq!(
            normalize_page_text(raw),
            "Title\n\nBody line one\nBody line two"
        );
    }
}
