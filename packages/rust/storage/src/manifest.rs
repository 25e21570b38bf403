//! `_manifest.json` written next to the partition files of every job run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// File name of the run manifest inside an output directory.
pub const MANIFEST_FILE_NAME: &str = "_manifest.json";

/// Summary of one job run's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Time-sortable run identifier.
    pub run_id: Uuid,
    /// Job that produced the output (e.g. `entity-vocab`).
    pub job: String,
    pub created_at: DateTime<Utc>,
    /// Total records across all parts.
    pub records: usize,
    pub parts: Vec<PartInfo>,
}

/// One partition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartInfo {
    pub file: String,
    pub records: usize,
    /// SHA-256 of the file contents, lowercase hex.
    pub sha256: String,
}
