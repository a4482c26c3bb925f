// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text cleaning, the first postprocessing stage. In order:
//
// 1. Line endings to `\n`.
// 2. Ligatures, bullets and dashes to plain forms.
// 3. Control, zero-width and replacement characters dropped.
// 4. Unicode NFC, so marks freed by steps 2 and 3 compose before line work.
// 5. Per line: whitespace collapsed, isolated symbol tokens dropped.
// 6. Words hyphenated across a line break rejoined.
// 7. Blank lines collapsed to a single paragraph break.
//
// `clean(clean(x)) == clean(x)` holds for every input: no stage produces
// anything an earlier stage would still rewrite.

use unicode_normalization::UnicodeNormalization;

/// Character replacements applied before NFC.
const REPLACEMENTS: &[(char, &str)] = &[
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\u{FB05}', "st"),
    ('\u{FB06}', "st"),
    // Private-use bullet emitted by Symbol-font PDFs.
    ('\u{F0B7}', "•"),
    ('\u{25CF}', "•"),
    ('\u{25AA}', "•"),
    ('\u{25A0}', "•"),
    ('\u{25E6}', "•"),
    ('\u{2023}', "•"),
    ('\u{2013}', "-"),
    ('\u{2014}', "--"),
    ('\u{2212}', "-"),
];

/// Invisible characters removed outright.
const INVISIBLE: &[char] = &[
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}', '\u{FFFD}',
];

/// Symbol-only tokens that carry meaning and survive cleaning.
const KEPT_SYMBOLS: &[&str] = &[
    "-", "--", "•", "*", "&", "+", "=", "/", "%", "$", "€", "£", "§", "@", "<", ">", "°",
    "...", "…",
];

/// Tokens longer than this without a URL scheme count as garbage.
const MAX_TOKEN_CHARS: usize = 40;

/// Clean raw extracted text.
pub fn clean(text: &str) -> String {
    let normalized = normalize_characters(text);
    let lines: Vec<String> = normalized.split('\n').map(clean_line).collect();
    let lines = join_hyphenated(lines);

    let mut cleaned = String::with_capacity(normalized.len());
    let mut paragraph_break = false;
    for line in lines {
        if line.is_empty() {
            paragraph_break = !cleaned.is_empty();
            continue;
        }
        if !cleaned.is_empty() {
            cleaned.push_str(if paragraph_break { "\n\n" } else { "\n" });
        }
        cleaned.push_str(&line);
        paragraph_break = false;
    }
    cleaned.nfc().collect()
}

fn normalize_characters(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut plain = String::with_capacity(unified.len());
    for c in unified.chars() {
        if let Some((_, replacement)) = REPLACEMENTS.iter().find(|(from, _)| *from == c) {
            plain.push_str(replacement);
        } else if INVISIBLE.contains(&c) || (c.is_control() && c != '\n' && c != '\t') {
            continue;
        } else {
            plain.push(c);
        }
    }
    plain.nfc().collect()
}

fn clean_line(line: &str) -> String {
    line.split_whitespace()
        .filter(|token| !is_symbol_noise(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A lone run of punctuation, typically dust or a speck read by OCR.
pub(crate) fn is_symbol_noise(token: &str) -> bool {
    if token.chars().any(char::is_alphanumeric) {
        return false;
    }
    let heading_marker = token.len() <= 6 && token.chars().all(|c| c == '#');
    !(heading_marker || KEPT_SYMBOLS.contains(&token))
}

/// Whether a raw token looks like extraction garbage.
///
/// Beyond symbol noise this covers tokens carrying control or replacement
/// characters, implausibly long tokens, and words whose inner characters are
/// mostly symbols.
pub(crate) fn is_garbage_token(token: &str) -> bool {
    if is_symbol_noise(token) {
        return true;
    }
    if token
        .chars()
        .any(|c| c == '\u{FFFD}' || (c.is_control() && !c.is_whitespace()))
    {
        return true;
    }
    if token.chars().count() > MAX_TOKEN_CHARS && !token.contains("://") {
        return true;
    }
    let core = token.trim_matches(|c: char| !c.is_alphanumeric());
    let length = core.chars().count();
    let symbols = core.chars().filter(|c| !c.is_alphanumeric()).count();
    length >= 3 && symbols * 2 > length
}

fn join_hyphenated(lines: Vec<String>) -> Vec<String> {
    let mut joined = Vec::with_capacity(lines.len());
    let mut lines = lines.into_iter().peekable();
    while let Some(mut line) = lines.next() {
        while ends_with_broken_word(&line)
            && lines
                .peek()
                .is_some_and(|next| next.chars().next().is_some_and(char::is_lowercase))
        {
            line.pop();
            if let Some(next) = lines.next() {
                line.push_str(&next);
            }
        }
        joined.push(line);
    }
    joined
}

/// `infor-` but not `--` or a dangling ` -`.
fn ends_with_broken_word(line: &str) -> bool {
    let mut tail = line.chars().rev();
    tail.next() == Some('-') && tail.next().is_some_and(char::is_alphabetic)
}
