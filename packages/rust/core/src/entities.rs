//! Link-target statistics: counts, anchor names, inlinks, and co-mentions.
//!
//! Targets are normalized with [`normalize_target`] before they are compared
//! or counted; empty targets are discarded before any join.

use std::collections::{BTreeMap, HashSet};

use kbsift_dataflow::{Broadcast, Context, Dataset, FxHashMap, PairCollection};
use kbsift_shared::{
    AppConfig, ComentionsRecord, Document, EntityCountRecord, EntityNameCountsRecord,
    InlinksRecord,
};

use crate::text::normalize_target;

/// Filters shared by the link-target jobs.
#[derive(Debug, Clone, Default)]
pub struct EntityOptions {
    /// Keep entities whose count is strictly greater than this.
    pub min_count: u64,
    /// Lowercase anchor text.
    pub lowercase: bool,
    /// Keep only targets with this prefix.
    pub filter_target: Option<String>,
}

impl From<&AppConfig> for EntityOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            min_count: config.entities.min_count,
            lowercase: config.entities.lowercase,
            filter_target: config.entities.filter_target.clone(),
        }
    }
}

impl EntityOptions {
    fn keeps(&self, target: &str) -> bool {
        match &self.filter_target {
            Some(prefix) => target.starts_with(prefix.as_str()),
            None => true,
        }
    }
}

/// Distinct normalized targets of `doc`, in order of first occurrence.
pub fn unique_targets(doc: &Document) -> Vec<String> {
    let mut seen = HashSet::new();
    doc.links
        .iter()
        .map(|l| normalize_target(&l.target))
        .filter(|t| !t.is_empty() && seen.insert(*t))
        .map(str::to_string)
        .collect()
}

/// Number of documents linking to each target, `count > min_count`.
pub fn entity_counts(
    docs: &Dataset<Document>,
    options: &EntityOptions,
) -> PairCollection<String, u64> {
    let filter = options.clone();
    let min_count = options.min_count;
    docs.flat_map(|d| unique_targets(&d))
        .filter(move |t| filter.keeps(t))
        .map(|t| (t, 1u64))
        .reduce_by_key(|a, b| a + b)
        .filter(move |(_, count)| *count > min_count)
}

pub fn format_entity_count((id, count): (String, u64)) -> EntityCountRecord {
    EntityCountRecord { id, count }
}

/// `(anchor text, normalized target)` for every link with non-empty both.
fn anchor_target_pairs(doc: &Document, lowercase: bool) -> Vec<(String, String)> {
    doc.links
        .iter()
        .filter_map(|link| {
            let target = normalize_target(&link.target);
            let anchor = doc.anchor(link)?.trim();
            if anchor.is_empty() || target.is_empty() {
                return None;
            }
            let anchor = if lowercase {
                anchor.to_lowercase()
            } else {
                anchor.to_string()
            };
            Some((anchor, target.to_string()))
        })
        .collect()
}

/// For each anchor text, how often it links to each target.
pub fn entity_name_counts(
    docs: &Dataset<Document>,
    options: &EntityOptions,
) -> PairCollection<String, BTreeMap<String, u64>> {
    let lowercase = options.lowercase;
    let filter = options.clone();
    docs.flat_map(move |d| anchor_target_pairs(&d, lowercase))
        .filter(move |(_, target)| filter.keeps(target))
        .group_by_key()
        .map_values(|targets| {
            let mut counts = BTreeMap::new();
            for target in targets {
                *counts.entry(target).or_insert(0u64) += 1;
            }
            counts
        })
}

pub fn format_entity_name_counts(
    (id, counts): (String, BTreeMap<String, u64>),
) -> EntityNameCountsRecord {
    let total = counts.values().sum();
    EntityNameCountsRecord { id, counts, total }
}

/// For each target, the documents linking to it.
pub fn entity_inlinks(docs: &Dataset<Document>) -> PairCollection<String, Vec<String>> {
    docs.flat_map(|d| {
        unique_targets(&d)
            .into_iter()
            .map(|t| (t, d.id.clone()))
            .collect::<Vec<_>>()
    })
    .group_by_key()
}

pub fn format_inlinks((id, inlinks): (String, Vec<String>)) -> InlinksRecord {
    InlinksRecord { id, inlinks }
}

/// Distinct targets mentioned together in each document; linkless documents are dropped.
pub fn entity_comentions(docs: &Dataset<Document>) -> PairCollection<String, Vec<String>> {
    docs.map(|d| {
        let targets = unique_targets(&d);
        (d.id, targets)
    })
    .filter(|(_, entities)| !entities.is_empty())
}

/// Co-mentions with entities replaced by their vocabulary rank.
///
/// Entities missing from the vocabulary are dropped, as are documents left empty.
pub fn mapped_entity_comentions(
    ctx: &Context,
    comentions: &PairCollection<String, Vec<String>>,
    vocab: &PairCollection<String, (u64, u64)>,
) -> PairCollection<String, Vec<u64>> {
    let ranks: Broadcast<FxHashMap<String, u64>> = ctx.broadcast(
        vocab
            .map_values(|(_, rank)| rank)
            .collect_as_map(),
    );
    comentions
        .map_values(move |entities| {
            entities
                .iter()
                .filter_map(|e| ranks.get(e).copied())
                .collect::<Vec<u64>>()
        })
        .filter(|(_, indexes)| !indexes.is_empty())
}

pub fn format_comentions<E>((id, entities): (String, Vec<E>)) -> ComentionsRecord<E> {
    ComentionsRecord { id, entities }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbsift_shared::Link;

    fn link(target: &str, start: usize, stop: usize) -> Link {
        Link {
            target: target.into(),
            start,
            stop,
        }
    }

    fn sorted<T: Ord>(mut items: Vec<T>) -> Vec<T> {
        items.sort();
        items
    }

    fn corpus(ctx: &Context) -> Dataset<Document> {
        ctx.parallelize(vec![
            Document {
                id: "d1".into(),
                text: "Paris is great".into(),
                links: vec![link("Paris", 0, 5)],
            },
            Document {
                id: "d2".into(),
                text: "paris and Lyon, Paris again".into(),
                links: vec![
                    link("Paris#History", 0, 5),
                    link("Lyon", 10, 14),
                    link("http://Paris", 16, 21),
                    link("", 22, 27),
                ],
            },
            Document {
                id: "d3".into(),
                text: "nothing linked".into(),
                links: vec![],
            },
        ])
    }

    #[test]
    fn single_document_count() {
        let ctx = Context::new(2);
        let docs = ctx.parallelize(vec![Document {
            id: "d1".into(),
            text: "Paris is great".into(),
            links: vec![link("Paris", 0, 5)],
        }]);
        let options = EntityOptions {
            min_count: 0,
            ..Default::default()
        };
        let out: Vec<EntityCountRecord> = entity_counts(&docs, &options)
            .map(format_entity_count)
            .collect();
        assert_eq!(
            out,
            vec![EntityCountRecord {
                id: "Paris".into(),
                count: 1
            }]
        );
    }

    #[test]
    fn counts_are_document_frequencies_above_threshold() {
        let ctx = Context::new(3);
        let docs = corpus(&ctx);

        let all = EntityOptions {
            min_count: 0,
            ..Default::default()
        };
        let out = sorted(entity_counts(&docs, &all).collect());
        assert_eq!(out, vec![("Lyon".to_string(), 1), ("Paris".to_string(), 2)]);

        let frequent = EntityOptions {
            min_count: 1,
            ..Default::default()
        };
        let out = entity_counts(&docs, &frequent).collect();
        assert_eq!(out, vec![("Paris".to_string(), 2)]);
    }

    #[test]
    fn filter_target_prefix() {
        let ctx = Context::new(2);
        let options = EntityOptions {
            min_count: 0,
            filter_target: Some("Ly".into()),
            ..Default::default()
        };
        let out = entity_counts(&corpus(&ctx), &options).collect();
        assert_eq!(out, vec![("Lyon".to_string(), 1)]);
    }

    #[test]
    fn name_counts_group_targets_by_anchor() {
        let ctx = Context::new(2);
        let options = EntityOptions {
            lowercase: true,
            ..Default::default()
        };
        let out = sorted(
            entity_name_counts(&corpus(&ctx), &options)
                .map(format_entity_name_counts)
                .collect()
                .into_iter()
                .map(|r| (r.id, r.total, r.counts))
                .collect(),
        );
        assert_eq!(
            out,
            vec![
                ("lyon".to_string(), 1, BTreeMap::from([("Lyon".to_string(), 1)])),
                ("paris".to_string(), 3, BTreeMap::from([("Paris".to_string(), 3)])),
            ]
        );
    }

    #[test]
    fn inlinks_list_linking_documents() {
        let ctx = Context::new(2);
        let mut out = entity_inlinks(&corpus(&ctx)).collect();
        out.sort();
        assert_eq!(
            out,
            vec![
                ("Lyon".to_string(), vec!["d2".to_string()]),
                ("Paris".to_string(), vec!["d1".to_string(), "d2".to_string()]),
            ]
        );
    }

    #[test]
    fn comentions_are_unique_in_first_occurrence_order() {
        let ctx = Context::new(2);
        let out = sorted(entity_comentions(&corpus(&ctx)).collect());
        assert_eq!(
            out,
            vec![
                ("d1".to_string(), vec!["Paris".to_string()]),
                ("d2".to_string(), vec!["Paris".to_string(), "Lyon".to_string()]),
            ]
        );
    }

    #[test]
    fn mapped_comentions_drop_unknown_entities() {
        let ctx = Context::new(2);
        let comentions = ctx.parallelize(vec![
            ("d1".to_string(), vec!["Paris".to_string(), "Lyon".to_string()]),
            ("d2".to_string(), vec!["Lyon".to_string()]),
        ]);
        let vocab = ctx.parallelize(vec![("Paris".to_string(), (10u64, 0u64))]);
        let out = mapped_entity_comentions(&ctx, &comentions, &vocab)
            .map(format_comentions)
            .collect();
        assert_eq!(
            out,
            vec![ComentionsRecord {
                id: "d1".into(),
                entities: vec![0u64]
            }]
        );
    }
}
