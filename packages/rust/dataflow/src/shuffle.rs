//! Key-based redistribution and per-partition grouping.
//!
//! Bucket contents keep source-partition order, so a shuffle of the same input
//! always produces the same output layout.

use std::hash::{Hash, Hasher};

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHasher};

/// Materialized contents of a collection, one `Vec` per partition.
pub(crate) type Partitions<T> = Vec<Vec<T>>;

/// Target partition for `key` among `n` partitions.
pub(crate) fn partition_of<K: Hash>(key: &K, n: usize) -> usize {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    (hasher.finish() % n as u64) as usize
}

/// Redistribute pairs so every key lands in exactly one of `n` partitions.
pub(crate) fn hash_partition<K, V>(parts: Partitions<(K, V)>, n: usize) -> Partitions<(K, V)>
where
    K: Hash + Send,
    V: Send,
{
    let bucketed: Vec<Partitions<(K, V)>> = parts
        .into_par_iter()
        .map(|part| {
            let mut buckets: Partitions<(K, V)> = (0..n).map(|_| Vec::new()).collect();
            for (k, v) in part {
                let i = partition_of(&k, n);
                buckets[i].push((k, v));
            }
            buckets
        })
        .collect();

    let mut out: Partitions<(K, V)> = (0..n).map(|_| Vec::new()).collect();
    for buckets in bucketed {
        for (i, bucket) in buckets.into_iter().enumerate() {
            out[i].extend(bucket);
        }
    }
    out
}

/// Split `items` into exactly `n` contiguous chunks (trailing chunks may be empty).
pub(crate) fn split_even<T>(items: Vec<T>, n: usize) -> Partitions<T> {
    let size = items.len().div_ceil(n).max(1);
    let mut iter = items.into_iter();
    (0..n).map(|_| iter.by_ref().take(size).collect()).collect()
}

/// Group values by key, keys in first-encounter order.
pub(crate) fn group_partition<K, V>(part: Vec<(K, V)>) -> Vec<(K, Vec<V>)>
where
    K: Hash + Eq + Clone,
{
    let mut index: FxHashMap<K, usize> = FxHashMap::default();
    let mut groups: Vec<(K, Vec<V>)> = Vec::new();
    for (k, v) in part {
        match index.get(&k) {
            Some(&i) => groups[i].1.push(v),
            None => {
                index.insert(k.clone(), groups.len());
                groups.push((k, vec![v]));
            }
        }
    }
    groups
}

/// Fold values sharing a key with `op`, keys in first-encounter order.
pub(crate) fn combine_partition<K, V, F>(part: Vec<(K, V)>, op: &F) -> Vec<(K, V)>
where
    K: Hash + Eq + Clone,
    F: Fn(V, V) -> V,
{
    let mut index: FxHashMap<K, usize> = FxHashMap::default();
    let mut acc: Vec<(K, Option<V>)> = Vec::new();
    for (k, v) in part {
        match index.get(&k) {
            Some(&i) => {
                let slot = &mut acc[i].1;
                *slot = Some(match slot.take() {
                    Some(prev) => op(prev, v),
                    None => v,
                });
            }
            None => {
                index.insert(k.clone(), acc.len());
                acc.push((k, Some(v)));
            }
        }
    }
    acc.into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_partition_colocates_keys() {
        let parts = vec![
            vec![("a", 1), ("b", 2)],
            vec![("a", 3), ("c", 4)],
            vec![("b", 5)],
        ];
        let shuffled = hash_partition(parts, 4);
        assert_eq!(shuffled.len(), 4);

        for key in ["a", "b", "c"] {
            let holders: Vec<usize> = shuffled
                .iter()
                .enumerate()
                .filter(|(_, p)| p.iter().any(|(k, _)| *k == key))
                .map(|(i, _)| i)
                .collect();
            assert_eq!(holders, vec![partition_of(&key, 4)]);
        }

        let a_values: Vec<i32> = shuffled[partition_of(&"a", 4)]
            .iter()
            .filter(|(k, _)| *k == "a")
            .map(|(_, v)| *v)
            .collect();
        assert_eq!(a_values, vec![1, 3]);
    }

    #[test]
    fn split_even_always_yields_n_chunks() {
        let parts = split_even((0..5).collect::<Vec<_>>(), 3);
        assert_eq!(parts, vec![vec![0, 1], vec![2, 3], vec![4]]);

        let parts = split_even(Vec::<u8>::new(), 2);
        assert_eq!(parts, vec![Vec::<u8>::new(), Vec::new()]);

        let parts = split_even(vec![1, 2], 4);
        assert_eq!(parts.len(), 4);
        assert_eq!(parts.concat(), vec![1, 2]);
    }

    #[test]
    fn group_keeps_first_encounter_order() {
        let grouped = group_partition(vec![("y", 1), ("x", 2), ("y", 3)]);
        assert_eq!(grouped, vec![("y", vec![1, 3]), ("x", vec![2])]);
    }

    #[test]
    fn combine_folds_per_key() {
        let combined = combine_partition(vec![("y", 1), ("x", 2), ("y", 3)], &|a, b| a + b);
        assert_eq!(combined, vec![("y", 4), ("x", 2)]);
    }
}
