//! Record types read and written by kbsift jobs.
//!
//! Every record carries a unique `_id`; downstream joins key exclusively on it.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

/// A redirect edge: `_id` is an alias of `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub target: String,
}

/// A hyperlink inside a document: `[start, stop)` character span naming `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Raw target id, possibly with a `#fragment` or `scheme://` prefix.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub target: String,
    pub start: usize,
    pub stop: usize,
}

/// A corpus document with its outgoing links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Document {
    /// Text covered by `link`, or `None` when the span falls outside `text`.
    ///
    /// Offsets count characters, not bytes.
    pub fn anchor(&self, link: &Link) -> Option<&str> {
        if link.start > link.stop {
            return None;
        }
        let mut offsets = self
            .text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(self.text.len()));
        let start = offsets.nth(link.start)?;
        let stop = if link.stop == link.start {
            start
        } else {
            offsets.nth(link.stop - link.start - 1)?
        };
        self.text.get(start..stop)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Wikidata dump items
// ---------------------------------------------------------------------------

/// One entity or property from a Wikidata JSON dump.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WikidataItem {
    pub id: String,
    #[serde(default)]
    pub claims: BTreeMap<String, Vec<Statement>>,
    #[serde(default)]
    pub labels: BTreeMap<String, LanguageValue>,
    #[serde(default)]
    pub sitelinks: BTreeMap<String, Sitelink>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statement {
    #[serde(default)]
    pub mainsnak: Option<Snak>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snak {
    #[serde(default)]
    pub snaktype: Option<String>,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default)]
    pub datavalue: Option<DataValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataValue {
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageValue {
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sitelink {
    pub title: String,
}

/// Object of a relation: an item reference or a literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    /// Numeric Wikidata item id (`Q42` → `42`).
    Item(u64),
    /// Time string, plain string, url, or a resolved item label.
    Text(String),
}

impl WikidataItem {
    /// English label, if present and non-empty.
    pub fn english_label(&self) -> Option<&str> {
        self.labels
            .get("en")
            .map(|l| l.value.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Title of the English Wikipedia page for this item.
    pub fn enwiki_title(&self) -> Option<&str> {
        self.sitelinks
            .get("enwiki")
            .map(|s| s.title.as_str())
            .filter(|t| !t.is_empty())
    }

    /// `(predicate id, value)` for every value-carrying claim of a supported datatype.
    pub fn claim_values(&self) -> Vec<(String, ClaimValue)> {
        let mut out = Vec::new();
        for (pid, statements) in &self.claims {
            for snak in statements.iter().filter_map(|s| s.mainsnak.as_ref()) {
                if snak.snaktype.as_deref() != Some("value") {
                    continue;
                }
                let Some(value) = snak.datavalue.as_ref().map(|d| &d.value) else {
                    continue;
                };
                let parsed = match snak.datatype.as_deref() {
                    Some("wikibase-item") => value
                        .get("numeric-id")
                        .and_then(serde_json::Value::as_u64)
                        .map(ClaimValue::Item),
                    Some("time") => value
                        .get("time")
                        .and_then(serde_json::Value::as_str)
                        .map(|t| ClaimValue::Text(t.to_string())),
                    Some("string") | Some("url") => {
                        value.as_str().map(|s| ClaimValue::Text(s.to_string()))
                    }
                    _ => None,
                };
                if let Some(v) = parsed {
                    out.push((pid.clone(), v));
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Output records
// ---------------------------------------------------------------------------

/// `{ "_id": term, "count": n }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCountRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub count: u64,
}

/// `{ "_id": anchor, "counts": {target: n}, "total": n }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityNameCountsRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub counts: BTreeMap<String, u64>,
    pub total: u64,
}

/// Position of an n-gram relative to an anchor span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpanTag {
    /// First n-gram of an anchor.
    #[serde(rename = "B")]
    Beginning,
    /// Last n-gram of an anchor.
    #[serde(rename = "E")]
    End,
    /// Strictly interior n-gram of an anchor.
    #[serde(rename = "I")]
    Interior,
    /// Background occurrence anywhere in document text.
    #[serde(rename = "O")]
    Outside,
}

/// `{ "_id": term, "counts": {"B"|"E"|"I"|"O": n} }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NgramCountsRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub counts: BTreeMap<SpanTag, u64>,
}

/// `{ "_id": target, "inlinks": [doc ids] }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlinksRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub inlinks: Vec<String>,
}

/// `{ "_id": term, "count": n, "rank": r }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub count: u64,
    pub rank: u64,
}

/// `{ "_id": doc, "entities": [...] }` with ids (`String`) or vocabulary ranks (`u64`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComentionsRecord<E> {
    #[serde(rename = "_id")]
    pub id: String,
    pub entities: Vec<E>,
}

/// A dump item kept verbatim, for passing through to a keyed corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawWikidataItem(pub serde_json::Value);

impl RawWikidataItem {
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(serde_json::Value::as_str)
    }
}

/// `{ "_id": item id, "data": item }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikidataCorpusRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub data: serde_json::Value,
}

/// `{ "_id": subject title, "relations": {predicate label: object} }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationsRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub relations: BTreeMap<String, ClaimValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document {
            id: "d1".into(),
            text: text.into(),
            links: vec![],
        }
    }

    fn link(start: usize, stop: usize) -> Link {
        Link {
            target: "T".into(),
            start,
            stop,
        }
    }

    #[test]
    fn anchor_uses_character_offsets() {
        let d = doc("Zürich is großartig");
        assert_eq!(d.anchor(&link(0, 6)), Some("Zürich"));
        assert_eq!(d.anchor(&link(10, 19)), Some("großartig"));
    }

    #[test]
    fn anchor_out_of_range_is_none() {
        let d = doc("Paris");
        assert_eq!(d.anchor(&link(0, 5)), Some("Paris"));
        assert_eq!(d.anchor(&link(2, 9)), None);
        assert_eq!(d.anchor(&link(4, 2)), None);
        assert_eq!(d.anchor(&link(3, 3)), Some(""));
    }

    #[test]
    fn document_parses_with_null_target() {
        let json = r#"{"_id":"d1","text":"x","links":[{"target":null,"start":0,"stop":1}]}"#;
        let parsed: Document = serde_json::from_str(json).expect("parse");
        assert_eq!(parsed.links[0].target, "");
    }

    #[test]
    fn document_without_links_field() {
        let parsed: Document = serde_json::from_str(r#"{"_id":"d1","text":"x"}"#).expect("parse");
        assert!(parsed.links.is_empty());
    }

    #[test]
    fn span_tag_serializes_as_letter() {
        let record = NgramCountsRecord {
            id: "york".into(),
            counts: BTreeMap::from([(SpanTag::End, 3), (SpanTag::Outside, 5)]),
        };
        let json = serde_json::to_string(&record).expect("serialize");
        assert_eq!(json, r#"{"_id":"york","counts":{"E":3,"O":5}}"#);
    }

    #[test]
    fn wikidata_claims_by_datatype() {
        let json = r#"{
            "id": "Q90",
            "labels": {"en": {"language": "en", "value": "Paris"}},
            "sitelinks": {"enwiki": {"site": "enwiki", "title": "Paris"}},
            "claims": {
                "P17": [{"mainsnak": {"snaktype": "value", "datatype": "wikibase-item",
                    "datavalue": {"value": {"entity-type": "item", "numeric-id": 142}}}}],
                "P571": [{"mainsnak": {"snaktype": "value", "datatype": "time",
                    "datavalue": {"value": {"time": "+0300-00-00T00:00:00Z"}}}}],
                "P856": [{"mainsnak": {"snaktype": "value", "datatype": "url",
                    "datavalue": {"value": "https://www.paris.fr"}}}],
                "P18": [{"mainsnak": {"snaktype": "value", "datatype": "commonsMedia",
                    "datavalue": {"value": "Paris.jpg"}}}],
                "P36": [{"mainsnak": {"snaktype": "novalue", "datatype": "wikibase-item"}}]
            }
        }"#;
        let item: WikidataItem = serde_json::from_str(json).expect("parse");
        assert_eq!(item.english_label(), Some("Paris"));
        assert_eq!(item.enwiki_title(), Some("Paris"));

        let claims = item.claim_values();
        assert_eq!(
            claims,
            vec![
                ("P17".to_string(), ClaimValue::Item(142)),
                ("P571".to_string(), ClaimValue::Text("+0300-00-00T00:00:00Z".into())),
                ("P856".to_string(), ClaimValue::Text("https://www.paris.fr".into())),
            ]
        );
    }
}
