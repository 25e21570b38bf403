//! Positional n-gram counts over link anchors.
//!
//! Anchor n-grams are tagged by where they sit in the anchor (`B`, `I`, `E`);
//! document text contributes background `O` counts for the largest n-gram
//! size. Only terms seen both as background text and inside an anchor are
//! kept.

use std::collections::BTreeMap;

use tracing::info;

use kbsift_dataflow::{Dataset, PairCollection};
use kbsift_shared::{AppConfig, Document, NgramCountsRecord, SpanTag};

use crate::text::ngrams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NgramOptions {
    /// Largest n-gram size; anchors use every size in `1..=max_n`.
    pub max_n: usize,
    pub lowercase: bool,
}

impl Default for NgramOptions {
    fn default() -> Self {
        Self {
            max_n: 2,
            lowercase: false,
        }
    }
}

impl From<&AppConfig> for NgramOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_n: config.ngrams.max_n,
            lowercase: config.ngrams.lowercase,
        }
    }
}

fn fold_case(text: &str, lowercase: bool) -> String {
    if lowercase {
        text.to_lowercase()
    } else {
        text.to_string()
    }
}

/// Non-empty, trimmed anchor texts of `doc`.
fn anchors(doc: &Document, lowercase: bool) -> Vec<String> {
    doc.links
        .iter()
        .filter_map(|link| doc.anchor(link))
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|a| fold_case(a, lowercase))
        .collect()
}

/// Tagged n-grams of one anchor for every size in `1..=max_n`.
///
/// The first n-gram of each size is `B`, the last is `E` (a single n-gram is
/// both), and everything in between is `I`.
pub fn span_tags(anchor: &str, max_n: usize) -> Vec<(String, SpanTag)> {
    let mut out = Vec::new();
    for n in 1..=max_n {
        let parts = ngrams(anchor, n);
        let (Some(first), Some(last)) = (parts.first(), parts.last()) else {
            continue;
        };
        out.push((first.clone(), SpanTag::Beginning));
        out.push((last.clone(), SpanTag::End));
        if parts.len() > 2 {
            for part in &parts[1..parts.len() - 1] {
                out.push((part.clone(), SpanTag::Interior));
            }
        }
    }
    out
}

/// Per-term counts by anchor position plus background frequency.
pub fn name_part_counts(
    docs: &Dataset<Document>,
    options: NgramOptions,
) -> PairCollection<String, BTreeMap<SpanTag, u64>> {
    let NgramOptions { max_n, lowercase } = options;
    info!(max_n, lowercase, "counting name parts");

    let anchor_counts = docs
        .flat_map(move |d| {
            anchors(&d, lowercase)
                .iter()
                .flat_map(|a| span_tags(a, max_n))
                .collect::<Vec<_>>()
        })
        .map(|tagged| (tagged, 1u64))
        .reduce_by_key(|a, b| a + b)
        .map(|((term, tag), count)| (term, (tag, count)));

    let background = docs
        .flat_map(move |d| ngrams(&fold_case(&d.text, lowercase), max_n))
        .map(|term| (term, 1u64))
        .reduce_by_key(|a, b| a + b)
        .filter(|(_, count)| *count > 1)
        .map(|(term, count)| (term, (SpanTag::Outside, count)));

    (anchor_counts + background)
        .group_by_key()
        .map_values(|tagged| tagged.into_iter().collect::<BTreeMap<SpanTag, u64>>())
        .filter(|(_, counts)| counts.contains_key(&SpanTag::Outside) && counts.len() > 1)
}

pub fn format_ngram_counts((id, counts): (String, BTreeMap<SpanTag, u64>)) -> NgramCountsRecord {
    NgramCountsRecord { id, counts }
}
