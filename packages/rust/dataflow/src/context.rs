//! Entry point for building collections and broadcast values.

use tracing::debug;

use crate::broadcast::Broadcast;
use crate::dataset::{Dataset, Element};
use crate::shuffle::split_even;

/// Owns the partition count every root collection is split into.
#[derive(Debug, Clone)]
pub struct Context {
    parallelism: usize,
}

impl Context {
    /// Create a context; a parallelism of 0 is treated as 1.
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism: parallelism.max(1),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Root collection over `items`, split into contiguous chunks.
    pub fn parallelize<T: Element>(&self, items: Vec<T>) -> Dataset<T> {
        debug!(
            records = items.len(),
            partitions = self.parallelism,
            "parallelize"
        );
        Dataset::source("parallelize", split_even(items, self.parallelism))
    }

    /// Freeze `value` for read-only use inside per-element closures.
    pub fn broadcast<T: Send + Sync>(&self, value: T) -> Broadcast<T> {
        Broadcast::new(value)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(
            std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_parallelism_is_clamped() {
        assert_eq!(Context::new(0).parallelism(), 1);
    }

    #[test]
    fn parallelize_splits_into_partitions() {
        let ds = Context::new(4).parallelize((0..10).collect::<Vec<u32>>());
        assert_eq!(ds.num_partitions(), 4);
        let sizes: Vec<usize> = ds.collect_partitions().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        assert_eq!(ds.collect(), (0..10).collect::<Vec<u32>>());
    }
}
