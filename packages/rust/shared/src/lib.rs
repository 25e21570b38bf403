//! Shared types, error model, and configuration for kbsift.
//!
//! This crate is the foundation depended on by the other kbsift crates.
//! It provides:
//! - [`KbsiftError`] - the unified error type
//! - Record types for every input and output ([`Document`], [`RedirectRecord`], ...)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, EngineConfig, EntitiesConfig, NgramsConfig, OutputConfig, RedirectMode,
    RedirectsConfig, VocabConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{KbsiftError, Result};
pub use types::{
    ClaimValue, ComentionsRecord, DataValue, Document, EntityCountRecord, EntityNameCountsRecord,
    InlinksRecord, LanguageValue, Link, NgramCountsRecord, RawWikidataItem, RedirectRecord,
    RelationsRecord, Sitelink, Snak, SpanTag, Statement, VocabRecord, WikidataCorpusRecord,
    WikidataItem,
};
