//! Knowledge-base artifact builders for kbsift.
//!
//! Every builder is a composition of `kbsift-dataflow` operations over
//! records from `kbsift-shared`. [`pipeline`] wires builders to sources and
//! sinks as runnable jobs.

pub mod entities;
pub mod ngrams;
pub mod pipeline;
pub mod redirects;
pub mod text;
pub mod vocab;
pub mod wikidata;

pub use pipeline::{Job, JobResult, ProgressReporter, SilentProgress, run_job};
