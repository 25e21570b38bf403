//! Job orchestration: source → dataflow → partitioned sink.
//!
//! Sources are read with async file I/O; the dataflow itself is CPU-bound and
//! runs on the blocking pool, one job at a time.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, instrument};

use kbsift_dataflow::Context;
use kbsift_shared::{
    AppConfig, Document, KbsiftError, RawWikidataItem, RedirectRecord, Result, VocabRecord,
    WikidataItem,
};
use kbsift_storage::{RecordSink, RunManifest, read_records};

use crate::entities::{
    EntityOptions, entity_comentions, entity_counts, entity_inlinks, entity_name_counts,
    format_comentions, format_entity_count, format_entity_name_counts, format_inlinks,
    mapped_entity_comentions,
};
use crate::ngrams::{NgramOptions, format_ngram_counts, name_part_counts};
use crate::redirects::{
    ResolveOptions, format_redirect, redirect_documents, redirect_pairs, resolve_redirects,
};
use crate::vocab::{RankWindow, entity_vocab, format_vocab, load_vocab};
use crate::wikidata::{
    format_relations, format_wikidata_corpus, wikidata_corpus, wikidata_relations,
};

/// A job and the inputs it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Consolidate corpus redirects (`from`) with target-KB redirects (`to`).
    MapRedirects { from: PathBuf, to: PathBuf },
    /// Rewrite corpus link targets through resolved redirects.
    RedirectDocuments { corpus: PathBuf, redirects: PathBuf },
    EntityCounts { corpus: PathBuf },
    EntityNameCounts { corpus: PathBuf },
    EntityInlinks { corpus: PathBuf },
    EntityVocab { corpus: PathBuf },
    /// Co-mentions by entity id, or by vocabulary rank when `vocab` is given.
    EntityComentions {
        corpus: PathBuf,
        vocab: Option<PathBuf>,
    },
    NamePartCounts { corpus: PathBuf },
    WikidataRelations { dump: PathBuf },
    /// Key every dump item by its id.
    WikidataCorpus { dump: PathBuf },
}

impl Job {
    /// Name recorded in the run manifest.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MapRedirects { .. } => "map-redirects",
            Self::RedirectDocuments { .. } => "redirect-documents",
            Self::EntityCounts { .. } => "entity-counts",
            Self::EntityNameCounts { .. } => "entity-name-counts",
            Self::EntityInlinks { .. } => "entity-inlinks",
            Self::EntityVocab { .. } => "entity-vocab",
            Self::EntityComentions { vocab: None, .. } => "entity-comentions",
            Self::EntityComentions { vocab: Some(_), .. } => "mapped-entity-comentions",
            Self::NamePartCounts { .. } => "name-part-counts",
            Self::WikidataRelations { .. } => "wikidata-relations",
            Self::WikidataCorpus { .. } => "wikidata-corpus",
        }
    }
}

/// Result of a finished job.
#[derive(Debug)]
pub struct JobResult {
    pub job: &'static str,
    /// Directory holding the part files and manifest.
    pub output: PathBuf,
    pub manifest: RunManifest,
    /// Input lines dropped as malformed, across all sources.
    pub dropped_inputs: usize,
    pub elapsed: Duration,
}

impl JobResult {
    pub fn records(&self) -> usize {
        self.manifest.records
    }
}

/// Progress callback for reporting job status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each source is parsed.
    fn records_loaded(&self, path: &Path, records: usize, dropped: usize);
    /// Called when the job completes.
    fn done(&self, result: &JobResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn records_loaded(&self, _path: &Path, _records: usize, _dropped: usize) {}
    fn done(&self, _result: &JobResult) {}
}

/// Run `job` and write its records under `output`.
#[instrument(skip_all, fields(job = job.name(), output = %output.display()))]
pub async fn run_job(
    job: &Job,
    output: &Path,
    config: &AppConfig,
    progress: &dyn ProgressReporter,
) -> Result<JobResult> {
    let start = Instant::now();
    config.validate()?;
    info!(parallelism = config.engine.parallelism, "starting job");

    let target = Output {
        dir: output,
        prefix: &config.output.part_prefix,
    };
    let ctx = Context::new(config.engine.parallelism);
    let mut loader = Loader {
        progress,
        dropped: 0,
    };
    let name = job.name();

    let manifest = match job {
        Job::MapRedirects { from, to } => {
            let from = loader.load::<RedirectRecord>(from).await?;
            let to = loader.load::<RedirectRecord>(to).await?;
            let options = ResolveOptions::from(config);
            let parts = execute(progress, move || {
                let from = redirect_pairs(&ctx.parallelize(from));
                let to = redirect_pairs(&ctx.parallelize(to));
                resolve_redirects(&from, &to, &options)
                    .map(format_redirect)
                    .collect_partitions()
            })
            .await?;
            target.write(name, progress, &parts).await?
        }
        Job::RedirectDocuments { corpus, redirects } => {
            let docs = loader.load::<Document>(corpus).await?;
            let rds = loader.load::<RedirectRecord>(redirects).await?;
            let parts = execute(progress, move || {
                let rds = redirect_pairs(&ctx.parallelize(rds));
                redirect_documents(&ctx.parallelize(docs), &rds).collect_partitions()
            })
            .await?;
            target.write(name, progress, &parts).await?
        }
        Job::EntityCounts { corpus } => {
            let docs = loader.load::<Document>(corpus).await?;
            let options = EntityOptions::from(config);
            let parts = execute(progress, move || {
                entity_counts(&ctx.parallelize(docs), &options)
                    .map(format_entity_count)
                    .collect_partitions()
            })
            .await?;
            target.write(name, progress, &parts).await?
        }
        Job::EntityNameCounts { corpus } => {
            let docs = loader.load::<Document>(corpus).await?;
            let options = EntityOptions::from(config);
            let parts = execute(progress, move || {
                entity_name_counts(&ctx.parallelize(docs), &options)
                    .map(format_entity_name_counts)
                    .collect_partitions()
            })
            .await?;
            target.write(name, progress, &parts).await?
        }
        Job::EntityInlinks { corpus } => {
            let docs = loader.load::<Document>(corpus).await?;
            let parts = execute(progress, move || {
                entity_inlinks(&ctx.parallelize(docs))
                    .map(format_inlinks)
                    .collect_partitions()
            })
            .await?;
            target.write(name, progress, &parts).await?
        }
        Job::EntityVocab { corpus } => {
            let docs = loader.load::<Document>(corpus).await?;
            let options = EntityOptions::from(config);
            let window = RankWindow::from(config);
            let parts = execute(progress, move || {
                entity_vocab(&ctx.parallelize(docs), &options, window)
                    .map(format_vocab)
                    .collect_partitions()
            })
            .await?;
            target.write(name, progress, &parts).await?
        }
        Job::EntityComentions {
            corpus,
            vocab: None,
        } => {
            let docs = loader.load::<Document>(corpus).await?;
            let parts = execute(progress, move || {
                entity_comentions(&ctx.parallelize(docs))
                    .map(format_comentions)
                    .collect_partitions()
            })
            .await?;
            target.write(name, progress, &parts).await?
        }
        Job::EntityComentions {
            corpus,
            vocab: Some(vocab),
        } => {
            let docs = loader.load::<Document>(corpus).await?;
            let vocab = loader.load::<VocabRecord>(vocab).await?;
            let parts = execute(progress, move || {
                let vocab = load_vocab(&ctx.parallelize(vocab));
                let comentions = entity_comentions(&ctx.parallelize(docs));
                mapped_entity_comentions(&ctx, &comentions, &vocab)
                    .map(format_comentions)
                    .collect_partitions()
            })
            .await?;
            target.write(name, progress, &parts).await?
        }
        Job::NamePartCounts { corpus } => {
            let docs = loader.load::<Document>(corpus).await?;
            let options = NgramOptions::from(config);
            let parts = execute(progress, move || {
                name_part_counts(&ctx.parallelize(docs), options)
                    .map(format_ngram_counts)
                    .collect_partitions()
            })
            .await?;
            target.write(name, progress, &parts).await?
        }
        Job::WikidataRelations { dump } => {
            let items = loader.load::<WikidataItem>(dump).await?;
            let parts = execute(progress, move || {
                wikidata_relations(&ctx.parallelize(items))
                    .map(format_relations)
                    .collect_partitions()
            })
            .await?;
            target.write(name, progress, &parts).await?
        }
        Job::WikidataCorpus { dump } => {
            let items = loader.load::<RawWikidataItem>(dump).await?;
            let parts = execute(progress, move || {
                wikidata_corpus(&ctx.parallelize(items))
                    .map(format_wikidata_corpus)
                    .collect_partitions()
            })
            .await?;
            target.write(name, progress, &parts).await?
        }
    };

    let result = JobResult {
        job: name,
        output: output.to_path_buf(),
        manifest,
        dropped_inputs: loader.dropped,
        elapsed: start.elapsed(),
    };

    info!(
        records = result.records(),
        dropped_inputs = result.dropped_inputs,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "job complete"
    );

    progress.done(&result);
    Ok(result)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Reads sources and tallies dropped lines.
struct Loader<'a> {
    progress: &'a dyn ProgressReporter,
    dropped: usize,
}

impl Loader<'_> {
    async fn load<T: DeserializeOwned>(&mut self, path: &Path) -> Result<Vec<T>> {
        self.progress
            .phase(&format!("Reading {}", path.display()));
        let outcome = read_records::<T>(path).await?;
        self.progress
            .records_loaded(path, outcome.records.len(), outcome.dropped);
        self.dropped += outcome.dropped;
        Ok(outcome.records)
    }
}

/// Run a dataflow on the blocking pool.
async fn execute<R, F>(progress: &dyn ProgressReporter, build: F) -> Result<Vec<Vec<R>>>
where
    R: Send + 'static,
    F: FnOnce() -> Vec<Vec<R>> + Send + 'static,
{
    progress.phase("Running dataflow");
    tokio::task::spawn_blocking(build)
        .await
        .map_err(|e| KbsiftError::Task(e.to_string()))
}

/// Destination for a job's partitions. The sink is created on write, after
/// every source has loaded.
struct Output<'a> {
    dir: &'a Path,
    prefix: &'a str,
}

impl Output<'_> {
    async fn write<R: Serialize>(
        &self,
        job: &str,
        progress: &dyn ProgressReporter,
        parts: &[Vec<R>],
    ) -> Result<RunManifest> {
        progress.phase("Writing output");
        let sink = RecordSink::create(self.dir, self.prefix).await?;
        sink.write_partitions(job, parts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbsift_shared::{ComentionsRecord, EntityCountRecord, WikidataCorpusRecord};
    use std::sync::Mutex;

    fn write_lines(path: &Path, lines: &[&str]) {
        std::fs::write(path, lines.join("\n")).unwrap();
    }

    fn corpus(dir: &Path) -> PathBuf {
        let path = dir.join("corpus.jsonl");
        write_lines(
            &path,
            &[
                r#"{"_id":"d1","text":"Paris is great","links":[{"target":"Paris","start":0,"stop":5}]}"#,
                r#"{"_id":"d2","text":"Paris and Lyon","links":[{"target":"Paris#Name","start":0,"stop":5},{"target":"Lyon","start":10,"stop":14}]}"#,
                "this line is not json",
            ],
        );
        path
    }

    fn config(parallelism: usize) -> AppConfig {
        let mut config = AppConfig::default();
        config.engine.parallelism = parallelism;
        config.entities.min_count = 0;
        config
    }

    #[derive(Default)]
    struct RecordingProgress {
        phases: Mutex<Vec<String>>,
        loaded: Mutex<Vec<(usize, usize)>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str) {
            self.phases.lock().unwrap().push(name.to_string());
        }
        fn records_loaded(&self, _path: &Path, records: usize, dropped: usize) {
            self.loaded.lock().unwrap().push((records, dropped));
        }
        fn done(&self, _result: &JobResult) {
            self.phases.lock().unwrap().push("done".to_string());
        }
    }

    #[test]
    fn job_names() {
        let corpus = PathBuf::from("c");
        assert_eq!(
            Job::EntityComentions {
                corpus: corpus.clone(),
                vocab: None
            }
            .name(),
            "entity-comentions"
        );
        assert_eq!(
            Job::EntityComentions {
                corpus,
                vocab: Some(PathBuf::from("v"))
            }
            .name(),
            "mapped-entity-comentions"
        );
    }

    #[tokio::test]
    async fn entity_counts_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let job = Job::EntityCounts {
            corpus: corpus(tmp.path()),
        };
        let out = tmp.path().join("counts");
        let progress = RecordingProgress::default();

        let result = run_job(&job, &out, &config(2), &progress).await.expect("run");
        assert_eq!(result.job, "entity-counts");
        assert_eq!(result.records(), 2);
        assert_eq!(result.dropped_inputs, 1);
        assert_eq!(result.manifest.parts.len(), 2);
        assert_eq!(*progress.loaded.lock().unwrap(), vec![(2, 1)]);
        assert_eq!(progress.phases.lock().unwrap().last().map(String::as_str), Some("done"));

        let mut records = read_records::<EntityCountRecord>(&out).await.unwrap().records;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(
            records,
            vec![
                EntityCountRecord {
                    id: "Lyon".into(),
                    count: 1
                },
                EntityCountRecord {
                    id: "Paris".into(),
                    count: 2
                },
            ]
        );
    }

    #[tokio::test]
    async fn map_redirects_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let from = tmp.path().join("from.jsonl");
        let to = tmp.path().join("to.jsonl");
        write_lines(&from, &[r#"{"_id":"A","target":"B"}"#]);
        write_lines(&to, &[r#"{"_id":"B","target":"C"}"#]);
        let out = tmp.path().join("redirects");

        let job = Job::MapRedirects { from, to };
        run_job(&job, &out, &config(3), &SilentProgress)
            .await
            .expect("run");

        let mut records = read_records::<RedirectRecord>(&out).await.unwrap().records;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        let pairs: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.id.as_str(), r.target.as_str()))
            .collect();
        assert_eq!(pairs, vec![("A", "C"), ("B", "C")]);
    }

    #[tokio::test]
    async fn comentions_map_through_stored_vocab() {
        let tmp = tempfile::tempdir().unwrap();
        let corpus = corpus(tmp.path());
        let vocab_dir = tmp.path().join("vocab");

        let mut cfg = config(2);
        cfg.vocab.max_rank = Some(1);
        let vocab_job = Job::EntityVocab {
            corpus: corpus.clone(),
        };
        run_job(&vocab_job, &vocab_dir, &cfg, &SilentProgress)
            .await
            .expect("vocab");

        let out = tmp.path().join("comentions");
        let job = Job::EntityComentions {
            corpus,
            vocab: Some(vocab_dir),
        };
        run_job(&job, &out, &cfg, &SilentProgress)
            .await
            .expect("comentions");

        let mut records = read_records::<ComentionsRecord<u64>>(&out).await.unwrap().records;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(
            records,
            vec![
                ComentionsRecord {
                    id: "d1".into(),
                    entities: vec![0]
                },
                ComentionsRecord {
                    id: "d2".into(),
                    entities: vec![0]
                },
            ]
        );
    }

    #[tokio::test]
    async fn wikidata_corpus_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = tmp.path().join("dump.json");
        write_lines(
            &dump,
            &[
                "[",
                r#"{"id":"Q90","type":"item","labels":{"en":{"value":"Paris"}}},"#,
                r#"{"id":"P17","type":"property"},"#,
                r#"{"type":"item"}"#,
                "]",
            ],
        );
        let out = tmp.path().join("wikidata");

        let job = Job::WikidataCorpus { dump };
        let result = run_job(&job, &out, &config(2), &SilentProgress)
            .await
            .expect("run");
        assert_eq!(result.job, "wikidata-corpus");
        assert_eq!(result.records(), 2);
        assert_eq!(result.dropped_inputs, 0);

        let mut records = read_records::<WikidataCorpusRecord>(&out).await.unwrap().records;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(records[0].id, "P17");
        assert_eq!(records[1].id, "Q90");
        assert_eq!(records[1].data["labels"]["en"]["value"], "Paris");
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_reading() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = config(2);
        cfg.ngrams.max_n = 0;
        let job = Job::NamePartCounts {
            corpus: tmp.path().join("missing.jsonl"),
        };
        let err = run_job(&job, &tmp.path().join("out"), &cfg, &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, KbsiftError::Config { .. }));
    }

    #[tokio::test]
    async fn missing_source_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let job = Job::WikidataRelations {
            dump: tmp.path().join("missing.json"),
        };
        let out = tmp.path().join("out");
        let err = run_job(&job, &out, &config(2), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, KbsiftError::Io { .. }));
        assert!(!out.exists());
    }
}
