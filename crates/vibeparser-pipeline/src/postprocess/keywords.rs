// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Frequency-based keyword extraction.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\p{Alphabetic}{3,}\b").expect("valid word regex"));

/// English stopwords.
static STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "about", "above", "after", "again", "against", "ain", "all", "also", "and", "any", "are",
        "aren", "because", "been", "before", "being", "below", "between", "both", "but", "can",
        "could", "couldn", "did", "didn", "does", "doesn", "doing", "don", "down", "during",
        "each", "few", "for", "from", "further", "had", "hadn", "has", "hasn", "have", "haven",
        "having", "her", "here", "hers", "herself", "him", "himself", "his", "how", "into",
        "isn", "its", "itself", "just", "may", "might", "mightn", "more", "most", "must",
        "mustn", "myself", "needn", "nor", "not", "now", "off", "once", "only", "other", "our",
        "ours", "ourselves", "out", "over", "own", "same", "shall", "shan", "she", "should",
        "shouldn", "some", "such", "than", "that", "the", "their", "theirs", "them",
        "themselves", "then", "there", "these", "they", "this", "those", "through", "too",
        "under", "until", "very", "was", "wasn", "were", "weren", "what", "when", "where",
        "which", "while", "who", "whom", "why", "will", "with", "won", "would", "wouldn", "you",
        "your", "yours", "yourself", "yourselves",
    ]
    .into_iter()
    .collect()
});

/// Up to `count` keywords from `text`.
///
/// Words of three or more letters, lowercased, stopwords removed, ranked by
/// frequency. Ties go to the word seen first.
pub fn extract_keywords(text: &str, count: usize) -> BTreeSet<String> {
    if count == 0 {
        return BTreeSet::new();
    }

    // word -> (occurrences, first position)
    let mut frequency: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, found) in WORD.find_iter(text).enumerate() {
        let word = found.as_str().to_lowercase();
        if STOPWORDS.contains(word.as_str()) {
            continue;
        }
        frequency.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, (usize, usize))> = frequency.into_iter().collect();
    ranked.sort_by(|(_, (a_count, a_first)), (_, (b_count, b_first))| {
        b_count.cmp(a_count).then(a_first.cmp(b_first))
    });
    ranked.into_iter().take(count).map(|(word, _)| word).collect()
}
