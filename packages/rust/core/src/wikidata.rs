//! Keyed corpus and relation extraction from a Wikidata JSON dump.

use std::collections::BTreeMap;

use kbsift_dataflow::{Dataset, PairCollection};
use kbsift_shared::{
    ClaimValue, RawWikidataItem, RelationsRecord, WikidataCorpusRecord, WikidataItem,
};

const ENTITY_PREFIX: &str = "Q";
const PREDICATE_PREFIX: &str = "P";

/// Every dump item keyed by its id. Items without a string `id` are skipped.
pub fn wikidata_corpus(
    items: &Dataset<RawWikidataItem>,
) -> PairCollection<String, RawWikidataItem> {
    items.flat_map(|item| item.id().map(|id| (id.to_string(), item.clone())))
}

pub fn format_wikidata_corpus((id, item): (String, RawWikidataItem)) -> WikidataCorpusRecord {
    WikidataCorpusRecord { id, data: item.0 }
}

/// `(subject title, {predicate label: object})` for every item with an
/// English Wikipedia page.
///
/// Item-valued objects are replaced by the object's English label when it has
/// one. A predicate with several values keeps the last one encountered.
pub fn wikidata_relations(
    items: &Dataset<WikidataItem>,
) -> PairCollection<String, BTreeMap<String, ClaimValue>> {
    let entities = items.filter(|item| item.id.starts_with(ENTITY_PREFIX));

    let entity_labels = entities.flat_map(|item| {
        let numeric = item.id[ENTITY_PREFIX.len()..].parse::<u64>().ok();
        let label = item.english_label().map(str::to_string);
        numeric
            .zip(label)
            .map(|(id, label)| (ClaimValue::Item(id), label))
    });

    let wiki_entities = entities
        .flat_map(|item| item.enwiki_title().map(|t| (t.to_string(), item.clone())))
        .cache();

    let predicate_labels = items
        .filter(|item| item.id.starts_with(PREDICATE_PREFIX))
        .flat_map(|item| {
            item.english_label()
                .map(|label| (item.id.clone(), label.to_string()))
        })
        .cache();

    // (object, (subject title, predicate label))
    let relations = wiki_entities
        .flat_map(|(title, item)| {
            item.claim_values()
                .into_iter()
                .map(|(pid, value)| (pid, (value, title.clone())))
                .collect::<Vec<_>>()
        })
        .join(&predicate_labels)
        .map(|(_, ((value, title), predicate))| (value, (title, predicate)));

    relations
        .left_outer_join(&entity_labels)
        .map(|(value, ((title, predicate), label))| {
            let object = label.map(ClaimValue::Text).unwrap_or(value);
            (title, (predicate, object))
        })
        .group_by_key()
        .map_values(|pairs| pairs.into_iter().collect::<BTreeMap<String, ClaimValue>>())
}

pub fn format_relations((id, relations): (String, BTreeMap<String, ClaimValue>)) -> RelationsRecord {
    RelationsRecord { id, relations }
}
