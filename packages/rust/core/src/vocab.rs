//! Entity vocabulary: frequency ranking and rank-window filtering.
//!
//! Ranks are dense and 0-based, assigned by descending count. Equal counts
//! are ordered by entity id, so ranks are reproducible across runs.

use std::cmp::Reverse;

use tracing::info;

use kbsift_dataflow::{Dataset, PairCollection};
use kbsift_shared::{AppConfig, Document, VocabRecord};

use crate::entities::{EntityOptions, entity_counts};

/// Half-open window `[min_rank, max_rank)`; `None` leaves that side open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RankWindow {
    pub min_rank: Option<u64>,
    pub max_rank: Option<u64>,
}

impl RankWindow {
    pub fn contains(&self, rank: u64) -> bool {
        self.min_rank.is_none_or(|min| rank >= min) && self.max_rank.is_none_or(|max| rank < max)
    }
}

impl From<&AppConfig> for RankWindow {
    fn from(config: &AppConfig) -> Self {
        Self {
            min_rank: config.vocab.min_rank,
            max_rank: config.vocab.max_rank,
        }
    }
}

/// `(entity, count)` → `(entity, (count, rank))` over all entities.
pub fn rank_entities(counts: &PairCollection<String, u64>) -> PairCollection<String, (u64, u64)> {
    counts
        .map(|(entity, count)| ((Reverse(count), entity), ()))
        .sort_by_key(true)
        .zip_with_index()
        .map(|(((Reverse(count), entity), ()), rank)| (entity, (count, rank)))
}

/// Keep entries whose rank falls inside `window`.
pub fn filter_rank_window(
    vocab: &PairCollection<String, (u64, u64)>,
    window: RankWindow,
) -> PairCollection<String, (u64, u64)> {
    vocab.filter(move |(_, (_, rank))| window.contains(*rank))
}

/// Count link targets, rank them, and apply the rank window.
pub fn entity_vocab(
    docs: &Dataset<Document>,
    options: &EntityOptions,
    window: RankWindow,
) -> PairCollection<String, (u64, u64)> {
    info!(
        min_rank = ?window.min_rank,
        max_rank = ?window.max_rank,
        "building entity vocab"
    );
    filter_rank_window(&rank_entities(&entity_counts(docs, options)), window)
}

pub fn format_vocab((id, (count, rank)): (String, (u64, u64))) -> VocabRecord {
    VocabRecord { id, count, rank }
}

/// Rebuild the `(entity, (count, rank))` shape from stored records.
pub fn load_vocab(records: &Dataset<VocabRecord>) -> PairCollection<String, (u64, u64)> {
    records.map(|r| (r.id, (r.count, r.rank)))
}
