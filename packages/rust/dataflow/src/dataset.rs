//! Lazy, partitioned collections.
//!
//! A [`Dataset`] is a node in a lineage graph. Transformations return new
//! nodes without touching data; actions (`count`, `collect`, ...) evaluate the
//! lineage from its roots. A node marked with [`Dataset::cache`] is evaluated at
//! most once and its partitions are shared by every downstream consumer. An
//! unmarked node is recomputed by every action that reaches it.
//!
//! Lineage evaluation is sequential; only the per-partition work of a single
//! stage fans out over the rayon pool.

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::ops::Add;
use std::sync::{Arc, OnceLock};

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::shuffle::{
    Partitions, combine_partition, group_partition, hash_partition, split_even,
};

/// Anything that can flow through a dataset.
pub trait Element: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Element for T {}

/// Anything that can key a shuffle.
pub trait Key: Element + Hash + Eq {}

impl<T: Element + Hash + Eq> Key for T {}

type ComputeFn<T> = dyn Fn() -> Partitions<T> + Send + Sync;

struct Node<T> {
    name: &'static str,
    num_partitions: usize,
    compute: Box<ComputeFn<T>>,
    cache: Option<OnceLock<Arc<Partitions<T>>>>,
}

/// An immutable, lazily evaluated, partitioned collection.
pub struct Dataset<T> {
    node: Arc<Node<T>>,
}

/// A dataset of key/value pairs.
pub type PairCollection<K, V> = Dataset<(K, V)>;

impl<T> Clone for Dataset<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<T> fmt::Debug for Dataset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("name", &self.node.name)
            .field("partitions", &self.node.num_partitions)
            .field("cached", &self.node.cache.is_some())
            .finish()
    }
}

impl<T: Element> Dataset<T> {
    fn from_fn<F>(name: &'static str, num_partitions: usize, compute: F) -> Self
    where
        F: Fn() -> Partitions<T> + Send + Sync + 'static,
    {
        Self {
            node: Arc::new(Node {
                name,
                num_partitions,
                compute: Box::new(compute),
                cache: None,
            }),
        }
    }

    /// Root collection over already-partitioned data.
    pub(crate) fn source(name: &'static str, partitions: Partitions<T>) -> Self {
        let num_partitions = partitions.len();
        let data = Arc::new(partitions);
        Self::from_fn(name, num_partitions, move || (*data).clone())
    }

    /// Label of the operation that produced this node.
    pub fn name(&self) -> &'static str {
        self.node.name
    }

    pub fn num_partitions(&self) -> usize {
        self.node.num_partitions
    }

    /// Whether this node memoizes its partitions.
    pub fn is_cached(&self) -> bool {
        self.node.cache.is_some()
    }

    fn evaluate(&self) -> Partitions<T> {
        match &self.node.cache {
            Some(cell) => {
                let data = cell.get_or_init(|| {
                    debug!(name = self.node.name, "materializing cached collection");
                    Arc::new((self.node.compute)())
                });
                (**data).clone()
            }
            None => (self.node.compute)(),
        }
    }

    fn map_partitions<U, F>(&self, name: &'static str, f: F) -> Dataset<U>
    where
        U: Element,
        F: Fn(Vec<T>) -> Vec<U> + Send + Sync + 'static,
    {
        let parent = self.clone();
        Dataset::from_fn(name, self.num_partitions(), move || {
            parent.evaluate().into_par_iter().map(&f).collect()
        })
    }

    // -----------------------------------------------------------------------
    // Narrow transformations
    // -----------------------------------------------------------------------

    pub fn map<U, F>(&self, f: F) -> Dataset<U>
    where
        U: Element,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.map_partitions("map", move |part| part.into_iter().map(&f).collect())
    }

    /// Zero or more outputs per input element.
    pub fn flat_map<U, I, F>(&self, f: F) -> Dataset<U>
    where
        U: Element,
        I: IntoIterator<Item = U>,
        F: Fn(T) -> I + Send + Sync + 'static,
    {
        self.map_partitions("flat_map", move |part| part.into_iter().flat_map(&f).collect())
    }

    pub fn filter<F>(&self, f: F) -> Dataset<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.map_partitions("filter", move |part| part.into_iter().filter(|x| f(x)).collect())
    }

    /// Pair every element with a key computed from it.
    pub fn key_by<K, F>(&self, f: F) -> Dataset<(K, T)>
    where
        K: Element,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.map_partitions("key_by", move |part| {
            part.into_iter().map(|x| (f(&x), x)).collect()
        })
    }

    /// Bag union: partitions of `self` followed by those of `other`, no dedup.
    pub fn union(&self, other: &Dataset<T>) -> Dataset<T> {
        let left = self.clone();
        let right = other.clone();
        Dataset::from_fn(
            "union",
            self.num_partitions() + other.num_partitions(),
            move || {
                let mut parts = left.evaluate();
                parts.extend(right.evaluate());
                parts
            },
        )
    }

    /// Pair each element with its dense 0-based position (partition order, then
    /// position within the partition).
    pub fn zip_with_index(&self) -> Dataset<(T, u64)> {
        let parent = self.clone();
        Dataset::from_fn("zip_with_index", self.num_partitions(), move || {
            let parts = parent.evaluate();
            let mut offsets = Vec::with_capacity(parts.len());
            let mut next = 0u64;
            for part in &parts {
                offsets.push(next);
                next += part.len() as u64;
            }
            parts
                .into_par_iter()
                .zip(offsets)
                .map(|(part, base)| {
                    part.into_iter()
                        .enumerate()
                        .map(|(i, x)| (x, base + i as u64))
                        .collect()
                })
                .collect()
        })
    }

    /// Mark this collection as materialize-once-and-reuse.
    ///
    /// Returns the memoizing handle; consumers must be built from it.
    #[must_use]
    pub fn cache(&self) -> Dataset<T> {
        let parent = self.clone();
        Self {
            node: Arc::new(Node {
                name: self.node.name,
                num_partitions: self.num_partitions(),
                compute: Box::new(move || parent.evaluate()),
                cache: Some(OnceLock::new()),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    pub fn count(&self) -> usize {
        let count = self.evaluate().iter().map(Vec::len).sum();
        debug!(name = self.node.name, count, "count");
        count
    }

    /// All elements in partition order.
    pub fn collect(&self) -> Vec<T> {
        let items: Vec<T> = self.evaluate().into_iter().flatten().collect();
        debug!(name = self.node.name, count = items.len(), "collect");
        items
    }

    /// All elements, one `Vec` per partition.
    pub fn collect_partitions(&self) -> Vec<Vec<T>> {
        let parts = self.evaluate();
        debug!(name = self.node.name, partitions = parts.len(), "collect_partitions");
        parts
    }
}

impl<T: Key> Dataset<T> {
    /// De-duplicate by full element equality, keeping first occurrences.
    pub fn distinct(&self) -> Dataset<T> {
        let parent = self.clone();
        let n = self.num_partitions();
        Dataset::from_fn("distinct", n, move || {
            let pairs: Partitions<(T, ())> = parent
                .evaluate()
                .into_iter()
                .map(|part| part.into_iter().map(|x| (x, ())).collect())
                .collect();
            hash_partition(pairs, n)
                .into_par_iter()
                .map(|part| {
                    combine_partition(part, &|a, _| a)
                        .into_iter()
                        .map(|(x, ())| x)
                        .collect()
                })
                .collect()
        })
    }
}

impl<T: Element> Add for Dataset<T> {
    type Output = Dataset<T>;

    fn add(self, rhs: Dataset<T>) -> Dataset<T> {
        self.union(&rhs)
    }
}

// ---------------------------------------------------------------------------
// Pair operations
// ---------------------------------------------------------------------------

impl<K: Key, V: Element> Dataset<(K, V)> {
    pub fn map_values<U, F>(&self, f: F) -> Dataset<(K, U)>
    where
        U: Element,
        F: Fn(V) -> U + Send + Sync + 'static,
    {
        self.map_partitions("map_values", move |part| {
            part.into_iter().map(|(k, v)| (k, f(v))).collect()
        })
    }

    pub fn flat_map_values<U, I, F>(&self, f: F) -> Dataset<(K, U)>
    where
        U: Element,
        I: IntoIterator<Item = U>,
        F: Fn(V) -> I + Send + Sync + 'static,
    {
        self.map_partitions("flat_map_values", move |part| {
            part.into_iter()
                .flat_map(|(k, v)| f(v).into_iter().map(move |u| (k.clone(), u)))
                .collect()
        })
    }

    pub fn keys(&self) -> Dataset<K> {
        self.map_partitions("keys", |part| part.into_iter().map(|(k, _)| k).collect())
    }

    pub fn values(&self) -> Dataset<V> {
        self.map_partitions("values", |part| part.into_iter().map(|(_, v)| v).collect())
    }

    /// Combine all values sharing a key. `op` must be associative and commutative.
    pub fn reduce_by_key<F>(&self, op: F) -> Dataset<(K, V)>
    where
        F: Fn(V, V) -> V + Send + Sync + 'static,
    {
        let parent = self.clone();
        let n = self.num_partitions();
        Dataset::from_fn("reduce_by_key", n, move || {
            let combined: Partitions<(K, V)> = parent
                .evaluate()
                .into_par_iter()
                .map(|part| combine_partition(part, &op))
                .collect();
            hash_partition(combined, n)
                .into_par_iter()
                .map(|part| combine_partition(part, &op))
                .collect()
        })
    }

    /// All values of a key in one list, in encounter order.
    pub fn group_by_key(&self) -> Dataset<(K, Vec<V>)> {
        let parent = self.clone();
        let n = self.num_partitions();
        Dataset::from_fn("group_by_key", n, move || {
            hash_partition(parent.evaluate(), n)
                .into_par_iter()
                .map(group_partition)
                .collect()
        })
    }

    fn co_partitioned<W, U, F>(
        &self,
        name: &'static str,
        other: &Dataset<(K, W)>,
        f: F,
    ) -> Dataset<U>
    where
        W: Element,
        U: Element,
        F: Fn(Vec<(K, V)>, &FxHashMap<K, Vec<W>>) -> Vec<U> + Send + Sync + 'static,
    {
        let left = self.clone();
        let right = other.clone();
        let n = self.num_partitions().max(other.num_partitions());
        Dataset::from_fn(name, n, move || {
            let left_parts = hash_partition(left.evaluate(), n);
            let right_parts = hash_partition(right.evaluate(), n);
            left_parts
                .into_par_iter()
                .zip(right_parts)
                .map(|(left_part, right_part)| {
                    let mut lookup: FxHashMap<K, Vec<W>> = FxHashMap::default();
                    for (k, w) in right_part {
                        lookup.entry(k).or_default().push(w);
                    }
                    f(left_part, &lookup)
                })
                .collect()
        })
    }

    /// Inner equi-join; one output per matching (left, right) value pair.
    pub fn join<W: Element>(&self, other: &Dataset<(K, W)>) -> Dataset<(K, (V, W))> {
        self.co_partitioned("join", other, |part, lookup| {
            let mut out = Vec::new();
            for (k, v) in part {
                if let Some(ws) = lookup.get(&k) {
                    for w in ws {
                        out.push((k.clone(), (v.clone(), w.clone())));
                    }
                }
            }
            out
        })
    }

    /// Left-outer equi-join; unmatched left entries carry `None`.
    pub fn left_outer_join<W: Element>(
        &self,
        other: &Dataset<(K, W)>,
    ) -> Dataset<(K, (V, Option<W>))> {
        self.co_partitioned("left_outer_join", other, |part, lookup| {
            let mut out = Vec::new();
            for (k, v) in part {
                match lookup.get(&k) {
                    Some(ws) => {
                        for w in ws {
                            out.push((k.clone(), (v.clone(), Some(w.clone()))));
                        }
                    }
                    None => out.push((k, (v, None))),
                }
            }
            out
        })
    }

    /// Collect into a lookup map; for repeated keys the last value wins.
    pub fn collect_as_map(&self) -> FxHashMap<K, V> {
        let map: FxHashMap<K, V> = self.evaluate().into_iter().flatten().collect();
        debug!(name = self.name(), keys = map.len(), "collect_as_map");
        map
    }
}

impl<K: Key + Ord, V: Element> Dataset<(K, V)> {
    /// Global stable sort by key; equal keys keep their pre-sort encounter order.
    pub fn sort_by_key(&self, ascending: bool) -> Dataset<(K, V)> {
        let parent = self.clone();
        let n = self.num_partitions();
        Dataset::from_fn("sort_by_key", n, move || {
            let mut all: Vec<(K, V)> = parent.evaluate().into_iter().flatten().collect();
            let order = |a: &(K, V), b: &(K, V)| -> Ordering {
                if ascending { a.0.cmp(&b.0) } else { b.0.cmp(&a.0) }
            };
            all.par_sort_by(order);
            split_even(all, n)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use super::*;
    use crate::Context;

    fn ctx() -> Context {
        Context::new(3)
    }

    fn sorted<T: Ord>(mut items: Vec<T>) -> Vec<T> {
        items.sort();
        items
    }

    #[test]
    fn narrow_transformations() {
        let ds = ctx().parallelize((1..=6).collect::<Vec<i32>>());
        let out = ds
            .map(|x| x * 10)
            .filter(|x| *x % 20 == 0)
            .flat_map(|x| vec![x, x + 1])
            .collect();
        assert_eq!(out, vec![20, 21, 40, 41, 60, 61]);
    }

    #[test]
    fn flat_map_may_yield_nothing() {
        let ds = ctx().parallelize(vec!["a b", "", "c"]);
        let words = ds.flat_map(|s| s.split_whitespace().map(String::from).collect::<Vec<_>>());
        assert_eq!(words.collect(), vec!["a", "b", "c"]);
    }

    #[test]
    fn reduce_by_key_sums_across_partitions() {
        let ds = ctx().parallelize(vec![("a", 1), ("b", 1), ("a", 1), ("c", 5), ("a", 1)]);
        let out = sorted(ds.reduce_by_key(|x, y| x + y).collect());
        assert_eq!(out, vec![("a", 3), ("b", 1), ("c", 5)]);
    }

    #[test]
    fn group_by_key_collects_all_values() {
        let ds = ctx().parallelize(vec![("k", 1), ("j", 2), ("k", 3), ("k", 4)]);
        let out = sorted(ds.group_by_key().collect());
        assert_eq!(out, vec![("j", vec![2]), ("k", vec![1, 3, 4])]);
    }

    #[test]
    fn join_is_cartesian_per_key() {
        let c = ctx();
        let left = c.parallelize(vec![("k", 1), ("k", 2), ("x", 9)]);
        let right = c.parallelize(vec![("k", "a"), ("k", "b"), ("y", "z")]);
        let out = sorted(left.join(&right).collect());
        assert_eq!(
            out,
            vec![
                ("k", (1, "a")),
                ("k", (1, "b")),
                ("k", (2, "a")),
                ("k", (2, "b")),
            ]
        );
    }

    #[test]
    fn left_outer_join_keeps_unmatched_with_none() {
        let c = ctx();
        let left = c.parallelize(vec![("a", 1), ("b", 2), ("a", 3)]);
        let right = c.parallelize(vec![("a", "x")]);
        let out = sorted(left.left_outer_join(&right).collect());
        assert_eq!(
            out,
            vec![("a", (1, Some("x"))), ("a", (3, Some("x"))), ("b", (2, None))]
        );
    }

    #[test]
    fn distinct_uses_full_pair_equality() {
        let ds = ctx().parallelize(vec![("a", 1), ("a", 1), ("a", 2), ("b", 1), ("a", 1)]);
        let out = sorted(ds.distinct().collect());
        assert_eq!(out, vec![("a", 1), ("a", 2), ("b", 1)]);
    }

    #[test]
    fn union_is_bag_union() {
        let c = ctx();
        let a = c.parallelize(vec![1, 2]);
        let b = c.parallelize(vec![2, 3]);
        let both = a.clone() + b;
        assert_eq!(sorted(both.collect()), vec![1, 2, 2, 3]);
        assert_eq!(both.num_partitions(), 6);
    }

    #[test]
    fn sort_then_index_is_dense_and_stable() {
        let ds = ctx().parallelize(vec![(2, "b"), (5, "x"), (2, "a"), (9, "z"), (5, "y")]);
        let ranked = ds.sort_by_key(false).zip_with_index().collect();
        assert_eq!(
            ranked,
            vec![
                ((9, "z"), 0),
                ((5, "x"), 1),
                ((5, "y"), 2),
                ((2, "b"), 3),
                ((2, "a"), 4),
            ]
        );
    }

    #[test]
    fn sort_ascending() {
        let ds = ctx().parallelize(vec![(3, ()), (1, ()), (2, ())]);
        let keys = ds.sort_by_key(true).keys().collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn uncached_collections_recompute_per_action() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ds = ctx().parallelize(vec![1, 2, 3]).map(move |x| {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
            x
        });
        ds.count();
        ds.count();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 6);
    }

    #[test]
    fn cached_collections_compute_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ds = ctx()
            .parallelize(vec![1, 2, 3])
            .map(move |x| {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                (x, x)
            })
            .cache();
        assert!(ds.is_cached());

        let doubled = ds.map_values(|v| v * 2);
        let joined = ds.join(&doubled);
        assert_eq!(ds.count(), 3);
        assert_eq!(joined.count(), 3);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 3);
    }

    #[test]
    fn cached_collection_is_memoized_across_threads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ds = ctx()
            .parallelize((0..100).collect::<Vec<u32>>())
            .map(move |x| {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                x
            })
            .cache();

        std::thread::scope(|s| {
            for _ in 0..4 {
                let consumer = ds.clone();
                s.spawn(move || assert_eq!(consumer.count(), 100));
            }
        });
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 100);
    }

    #[test]
    fn collect_as_map_for_broadcast() {
        let c = ctx();
        let vocab = c.parallelize(vec![("Paris".to_string(), 0u64), ("Lyon".to_string(), 1)]);
        let lookup = c.broadcast(vocab.collect_as_map());
        let docs = c.parallelize(vec![vec!["Paris".to_string(), "Nice".to_string()]]);
        let mapped = docs
            .map(move |es| {
                es.iter()
                    .filter_map(|e| lookup.get(e).copied())
                    .collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(mapped, vec![vec![0]]);
    }

    #[test]
    fn shuffles_are_deterministic() {
        let c = ctx();
        let input: Vec<(u32, u32)> = (0..200).map(|i| (i % 17, i)).collect();
        let run = || c.parallelize(input.clone()).group_by_key().collect();
        assert_eq!(run(), run());
    }
}
