//! JSON-lines record source and partitioned record sink.
//!
//! Sources are a single file or a directory of part files, one JSON record per
//! line. Lines that fail to parse are dropped and counted, never propagated.
//! Sinks write one `<prefix>-NNNNN.jsonl` file per partition plus a
//! [`RunManifest`].

mod manifest;

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use kbsift_shared::{KbsiftError, Result};

pub use manifest::{MANIFEST_FILE_NAME, PartInfo, RunManifest};

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Records parsed from a source plus the number of lines that were dropped.
#[derive(Debug)]
pub struct ReadOutcome<T> {
    pub records: Vec<T>,
    pub dropped: usize,
}

/// Files making up a source: the path itself, or the visible files of a directory
/// sorted by name (names starting with `_` or `.` are skipped).
pub async fn source_files(path: &Path) -> Result<Vec<PathBuf>> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| KbsiftError::io(path, e))?;
    if meta.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| KbsiftError::io(path, e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| KbsiftError::io(path, e))?
    {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('_') || name.starts_with('.') {
            continue;
        }
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| KbsiftError::io(entry.path(), e))?;
        if file_type.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Strip array punctuation and trailing commas (Wikidata dumps are one big
/// JSON array with one item per line). Returns `None` for lines with no record.
pub fn record_text(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed == "[" || trimmed == "]" {
        return None;
    }
    Some(trimmed.strip_suffix(',').unwrap_or(trimmed))
}

/// Read and parse every record of a source.
pub async fn read_records<T: DeserializeOwned>(path: &Path) -> Result<ReadOutcome<T>> {
    let mut records = Vec::new();
    let mut dropped = 0usize;
    let mut first_error: Option<String> = None;

    for file in source_files(path).await? {
        let content = tokio::fs::read(&file)
            .await
            .map_err(|e| KbsiftError::io(&file, e))?;
        for (line_no, bytes) in content.split(|b| *b == b'\n').enumerate() {
            let parsed = match std::str::from_utf8(bytes) {
                Ok(line) => match record_text(line) {
                    Some(text) => serde_json::from_str::<T>(text)
                        .map(Some)
                        .map_err(|e| e.to_string()),
                    None => Ok(None),
                },
                Err(e) => Err(format!("invalid UTF-8: {e}")),
            };
            match parsed {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    dropped += 1;
                    if first_error.is_none() {
                        first_error = Some(format!("{}:{}: {e}", file.display(), line_no + 1));
                    }
                }
            }
        }
    }

    if let Some(sample) = first_error {
        warn!(dropped, %sample, "dropped malformed records");
    }
    info!(path = %path.display(), records = records.len(), dropped, "source loaded");

    Ok(ReadOutcome { records, dropped })
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Output directory for one job run.
#[derive(Debug, Clone)]
pub struct RecordSink {
    dir: PathBuf,
    prefix: String,
}

/// Delete part files an unfinished earlier run left under `dir`.
async fn remove_stale_parts(dir: &Path, prefix: &str) -> Result<()> {
    let part_prefix = format!("{prefix}-");
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| KbsiftError::io(dir, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| KbsiftError::io(dir, e))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(&part_prefix) && name.ends_with(".jsonl") {
            let path = entry.path();
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| KbsiftError::io(&path, e))?;
            debug!(file = %name, "removed stale partition");
        }
    }
    Ok(())
}

impl RecordSink {
    /// Prepare `dir` for writing. Fails if it already holds a finished run;
    /// part files from an interrupted run are removed.
    pub async fn create(dir: &Path, prefix: &str) -> Result<Self> {
        let manifest = dir.join(MANIFEST_FILE_NAME);
        if tokio::fs::try_exists(&manifest)
            .await
            .map_err(|e| KbsiftError::io(&manifest, e))?
        {
            return Err(KbsiftError::validation(format!(
                "output directory {} already contains a finished run",
                dir.display()
            )));
        }
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| KbsiftError::io(dir, e))?;
        remove_stale_parts(dir, prefix).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one file per partition, then the manifest.
    pub async fn write_partitions<R: Serialize>(
        &self,
        job: &str,
        partitions: &[Vec<R>],
    ) -> Result<RunManifest> {
        let mut parts = Vec::with_capacity(partitions.len());
        let mut total = 0usize;

        for (i, partition) in partitions.iter().enumerate() {
            let file = format!("{}-{i:05}.jsonl", self.prefix);
            let mut body = String::new();
            for record in partition {
                body.push_str(&serde_json::to_string(record)?);
                body.push('\n');
            }

            let sha256 = format!("{:x}", Sha256::digest(body.as_bytes()));
            let path = self.dir.join(&file);
            tokio::fs::write(&path, body.as_bytes())
                .await
                .map_err(|e| KbsiftError::io(&path, e))?;
            debug!(file = %file, records = partition.len(), "wrote partition");

            total += partition.len();
            parts.push(PartInfo {
                file,
                records: partition.len(),
                sha256,
            });
        }

        let manifest = RunManifest {
            run_id: Uuid::now_v7(),
            job: job.to_string(),
            created_at: Utc::now(),
            records: total,
            parts,
        };
        let path = self.dir.join(MANIFEST_FILE_NAME);
        let json = serde_json::to_string_pretty(&manifest)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| KbsiftError::io(&path, e))?;

        info!(
            dir = %self.dir.display(),
            job,
            records = total,
            partitions = manifest.parts.len(),
            "output written"
        );
        Ok(manifest)
    }
}

/// Read the manifest of a finished run.
pub async fn read_manifest(dir: &Path) -> Result<RunManifest> {
    let path = dir.join(MANIFEST_FILE_NAME);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| KbsiftError::io(&path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| KbsiftError::parse(format!("{}: {e}", path.display())))
}
