// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Section, paragraph and sentence detection over cleaned text.

use std::sync::LazyLock;

use regex::Regex;
use vibeparser_core::{Paragraph, Section, StructureStats};

static EXPLICIT_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(\S.*)$").expect("valid heading regex"));

/// `1. Introduction`, `2.3 Results`.
static NUMBERED_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}(?:\.\d{1,2})*)\.?\s+\p{Lu}").expect("valid numbered heading regex")
});

static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}[.)]\s").expect("valid list item regex"));

const MAX_HEADING_CHARS: usize = 60;
const MAX_HEADING_WORDS: usize = 8;

/// Lowercased, without the trailing period.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "e.g", "i.e", "fig", "figs",
    "no", "nos", "vol", "pp", "inc", "ltd", "co", "corp", "approx", "cf", "al", "dept", "est",
];

/// Group cleaned text into sections of paragraphs of sentences.
///
/// Blocks are separated by blank lines. A line becomes a heading when it is
/// an explicit `#` heading, or when it stands alone in its block and looks
/// like one (short, unpunctuated, capitalised or numbered). Text before the
/// first heading lands in an untitled level-0 section, emitted only when it
/// has content.
pub fn structure(cleaned: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section::default();

    for block in cleaned.split("\n\n") {
        let lines: Vec<&str> = block
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let standalone = lines.len() == 1;
        let mut buffer: Vec<&str> = Vec::new();

        for line in lines {
            if let Some((level, title)) = heading(line, standalone) {
                flush(&mut buffer, &mut current);
                let finished = std::mem::replace(
                    &mut current,
                    Section {
                        title: Some(title),
                        level,
                        paragraphs: Vec::new(),
                    },
                );
                push_section(&mut sections, finished);
            } else if is_list_item(line) {
                flush(&mut buffer, &mut current);
                buffer.push(line);
                flush(&mut buffer, &mut current);
            } else {
                buffer.push(line);
            }
        }
        flush(&mut buffer, &mut current);
    }
    push_section(&mut sections, current);
    sections
}

fn push_section(sections: &mut Vec<Section>, section: Section) {
    if section.title.is_some() || !section.paragraphs.is_empty() {
        sections.push(section);
    }
}

fn flush(buffer: &mut Vec<&str>, section: &mut Section) {
    if buffer.is_empty() {
        return;
    }
    let sentences = split_sentences(&buffer.join(" "));
    buffer.clear();
    if !sentences.is_empty() {
        section.paragraphs.push(Paragraph::new(sentences));
    }
}

fn heading(line: &str, standalone: bool) -> Option<(u8, String)> {
    if let Some(caps) = EXPLICIT_HEADING.captures(line) {
        let level = u8::try_from(caps[1].len()).unwrap_or(6);
        return Some((level, caps[2].trim().to_string()));
    }
    if !standalone
        || line.chars().count() > MAX_HEADING_CHARS
        || line.split_whitespace().count() > MAX_HEADING_WORDS
        || line.ends_with(['.', '!', '?', ',', ';'])
    {
        return None;
    }

    if let Some(caps) = NUMBERED_HEADING.captures(line) {
        let depth = caps[1].split('.').filter(|part| !part.is_empty()).count();
        let level = u8::try_from(depth.clamp(1, 6)).unwrap_or(6);
        return Some((level, line.to_string()));
    }

    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 2 {
        return None;
    }
    let all_caps = letters.iter().all(|c| !c.is_lowercase());
    if all_caps || is_title_case(line) {
        return Some((1, line.trim_end_matches(':').trim_end().to_string()));
    }
    None
}

/// Every word of four letters or more is capitalised, and there is at least
/// one such word.
fn is_title_case(line: &str) -> bool {
    if !line.chars().next().is_some_and(char::is_uppercase) {
        return false;
    }
    let mut significant = line
        .split_whitespace()
        .filter(|word| word.chars().filter(|c| c.is_alphabetic()).count() >= 4)
        .peekable();
    if significant.peek().is_none() {
        return false;
    }
    significant.all(|word| {
        word.chars()
            .find(|c| c.is_alphabetic())
            .is_some_and(char::is_uppercase)
    })
}

fn is_list_item(line: &str) -> bool {
    line.starts_with("- ")
        || line.starts_with("* ")
        || line.starts_with("• ")
        || NUMBERED_ITEM.is_match(line)
}

/// Split a paragraph into sentences.
///
/// A sentence ends at `.`, `!` or `?` (optionally followed by closing quotes
/// or brackets) when the next word opens a sentence. Common abbreviations,
/// single-letter initials and dotted forms such as `U.S.` do not end one.
pub fn split_sentences(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut sentences = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for (i, word) in words.iter().enumerate() {
        current.push(word);
        let boundary = ends_sentence(word)
            && words.get(i + 1).is_some_and(|next| opens_sentence(next));
        if boundary {
            sentences.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        sentences.push(current.join(" "));
    }
    sentences
}

fn ends_sentence(word: &str) -> bool {
    let trimmed = word.trim_end_matches(['"', '\'', ')', ']', '\u{201D}', '\u{2019}']);
    if trimmed.ends_with(['!', '?']) {
        return true;
    }
    if !trimmed.ends_with('.') {
        return false;
    }
    let stem = trimmed
        .trim_end_matches('.')
        .trim_start_matches(['(', '[', '"', '\'', '\u{201C}', '\u{2018}']);
    if stem.is_empty() {
        return true;
    }
    let lower = stem.to_lowercase();
    if ABBREVIATIONS.contains(&lower.as_str()) {
        return false;
    }
    let mut chars = stem.chars();
    if chars.next().is_some_and(char::is_alphabetic) && chars.next().is_none() {
        return false;
    }
    let dotted = stem.contains('.')
        && stem.split('.').all(|part| {
            let n = part.chars().count();
            (1..=2).contains(&n) && part.chars().all(char::is_alphabetic)
        });
    !dotted
}

fn opens_sentence(word: &str) -> bool {
    word.chars().next().is_some_and(|c| {
        c.is_uppercase()
            || c.is_ascii_digit()
            || matches!(c, '"' | '\'' | '(' | '[' | '\u{201C}' | '\u{2018}')
    })
}

/// Counts over the structured output.
pub fn stats(cleaned: &str, sections: &[Section]) -> StructureStats {
    let paragraphs = sections.iter().flat_map(|section| &section.paragraphs);
    StructureStats {
        char_count: cleaned.chars().count(),
        paragraph_count: paragraphs.clone().count(),
        sentence_count: paragraphs.map(|paragraph| paragraph.sentences.len()).sum(),
        section_count: sections.len(),
    }
}
