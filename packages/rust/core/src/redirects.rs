//! Redirect resolution across two knowledge bases, and link rewriting.
//!
//! `from` holds the corpus's own redirects, `to` those of the target knowledge
//! base. Both are `(alias, target)` pairs. Resolution cross-maps the two edge
//! sets, then self-composes the result to follow chains one hop further per
//! pass.

use std::collections::HashSet;

use tracing::{info, instrument, warn};

use kbsift_dataflow::{Dataset, FxHashMap, PairCollection};
use kbsift_shared::{AppConfig, Document, RedirectMode, RedirectRecord};

use crate::text::normalize_target;

/// How many self-composition passes to run and when to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    pub mode: RedirectMode,
    /// Exact pass count (bounded) or iteration cap (fixed-point).
    pub passes: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            mode: RedirectMode::Bounded,
            passes: 1,
        }
    }
}

impl From<&AppConfig> for ResolveOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            mode: config.redirects.mode,
            passes: config.redirects.effective_passes(),
        }
    }
}

/// Redirect records as `(alias, target)` pairs.
pub fn redirect_pairs(records: &Dataset<RedirectRecord>) -> PairCollection<String, String> {
    records.map(|r| (r.id, r.target))
}

pub fn format_redirect((id, target): (String, String)) -> RedirectRecord {
    RedirectRecord { id, target }
}

/// Consolidate `from` and `to` into one `alias → canonical target` edge set.
///
/// The result has no duplicate pairs. An alias with several incompatible
/// targets keeps all of them.
#[instrument(skip_all, fields(mode = ?options.mode, passes = options.passes))]
pub fn resolve_redirects(
    from: &PairCollection<String, String>,
    to: &PairCollection<String, String>,
    options: &ResolveOptions,
) -> PairCollection<String, String> {
    // (a > b) in `to` and (a > c) in `from` becomes (c > b)
    let mapped_to = to
        .left_outer_join(from)
        .map(|(a, (b, c))| (c.unwrap_or(a), b));

    // (a > b) in `from` and (b > c) in `mapped_to` becomes (a > c)
    let mapped_from = from
        .map(|(a, b)| (b, a))
        .join(&mapped_to)
        .map(|(_, (a, c))| (a, c));

    let rds = (mapped_from + mapped_to).distinct().cache();
    info!(redirects = rds.count(), "resolving transitive mappings");

    let resolved = match options.mode {
        RedirectMode::Bounded => {
            let mut current = rds;
            for _ in 0..options.passes {
                current = compose(&current, false).cache();
            }
            current
        }
        RedirectMode::FixedPoint => resolve_to_fixed_point(rds, options.passes),
    };

    info!(redirects = resolved.count(), "resolved redirects");
    resolved
}

/// One hop of self-composition: `a > b` becomes `a > c` when `b > c` exists,
/// otherwise stays `a > b`.
///
/// With `reject_self_loops`, a composition landing back on `a` keeps `a > b`.
fn compose(
    rds: &PairCollection<String, String>,
    reject_self_loops: bool,
) -> PairCollection<String, String> {
    rds.map(|(a, b)| (b, a))
        .left_outer_join(rds)
        .map(move |(b, (a, c))| match c {
            Some(c) if !(reject_self_loops && c == a) => (a, c),
            _ => (a, b),
        })
        .distinct()
}

fn resolve_to_fixed_point(
    start: PairCollection<String, String>,
    max_passes: usize,
) -> PairCollection<String, String> {
    let mut current = start;
    let mut current_edges = edge_set(&current);

    for pass in 1..=max_passes {
        let next = compose(&current, true).cache();
        let next_edges = edge_set(&next);
        current = next;
        if next_edges == current_edges {
            info!(passes = pass, "redirects converged");
            return current;
        }
        current_edges = next_edges;
    }

    warn!(
        max_passes,
        "redirect resolution reached the pass cap without converging"
    );
    current
}

fn edge_set(rds: &PairCollection<String, String>) -> HashSet<(String, String)> {
    rds.collect().into_iter().collect()
}

/// Rewrite every link target through `redirects`; unmatched targets stay as-is.
///
/// Targets are compared in normalized form, so `NYC#History` follows a redirect
/// from `NYC`. A rewritten link takes the resolved id without the fragment.
/// Documents without links pass through unchanged.
pub fn redirect_documents(
    docs: &Dataset<Document>,
    redirects: &PairCollection<String, String>,
) -> Dataset<Document> {
    let articles = docs.key_by(|d| d.id.clone());

    let lookups = docs
        .flat_map(|d| {
            let mut seen = HashSet::new();
            d.links
                .iter()
                .map(|l| normalize_target(&l.target))
                .filter(|target| !target.is_empty() && seen.insert(*target))
                .map(|target| (target.to_string(), d.id.clone()))
                .collect::<Vec<_>>()
        })
        .join(redirects)
        .map(|(target, (doc_id, resolved))| (doc_id, (target, resolved)))
        .group_by_key()
        .map_values(|pairs| pairs.into_iter().collect::<FxHashMap<String, String>>());

    articles
        .left_outer_join(&lookups)
        .map(|(_, (mut doc, lookup))| {
            if let Some(lookup) = lookup {
                for link in &mut doc.links {
                    if let Some(target) = lookup.get(normalize_target(&link.target)) {
                        link.target = target.clone();
                    }
                }
            }
            doc
        })
}
