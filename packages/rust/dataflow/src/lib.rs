//! Lazy, partitioned key/value collections.
//!
//! This crate provides:
//! - [`Context`] - creates root collections and [`Broadcast`] values
//! - [`Dataset`] / [`PairCollection`] - transformations, joins, grouping,
//!   sorting, indexing, and explicit caching
//!
//! Shuffles hash keys with `FxHasher`, so the partition layout and output
//! order of every operation are reproducible across runs.

pub mod broadcast;
pub mod context;
pub mod dataset;
mod shuffle;

pub use broadcast::Broadcast;
pub use context::Context;
pub use dataset::{Dataset, Element, Key, PairCollection};
pub use rustc_hash::FxHashMap;
