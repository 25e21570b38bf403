//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use kbsift_core::pipeline::{Job, JobResult, ProgressReporter, run_job};
use kbsift_shared::{AppConfig, RedirectMode, init_config, load_config, load_config_from};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// kbsift: build knowledge-base artifacts from corpora and Wikidata dumps.
#[derive(Parser)]
#[command(
    name = "kbsift",
    version,
    about = "Build redirect maps, entity vocabularies, and anchor statistics from link corpora.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Partitions per collection (overrides `engine.parallelism`).
    #[arg(long, global = true)]
    pub parallelism: Option<usize>,

    /// Config file to use instead of `~/.kbsift/kbsift.toml`.
    #[arg(long, global = true, env = "KBSIFT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Resolve and apply redirect maps.
    Redirects {
        #[command(subcommand)]
        action: RedirectsAction,
    },

    /// Link-target statistics over a document corpus.
    Entities {
        #[command(subcommand)]
        action: EntitiesAction,
    },

    /// Positional n-gram counts over link anchors.
    Ngrams {
        #[command(flatten)]
        io: CorpusIo,

        /// Largest n-gram size.
        #[arg(long)]
        max_n: Option<usize>,

        /// Lowercase anchors and text.
        #[arg(long)]
        lowercase: bool,
    },

    /// Wikidata dump processing.
    Wikidata {
        #[command(subcommand)]
        action: WikidataAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum RedirectsAction {
    /// Consolidate corpus redirects with target knowledge-base redirects.
    Map {
        /// Redirects of the corpus being processed.
        from: PathBuf,
        /// Redirects of the target knowledge base.
        to: PathBuf,
        /// Output directory.
        out: PathBuf,

        /// bounded or fixed-point.
        #[arg(long)]
        mode: Option<RedirectMode>,

        /// Passes (bounded) or iteration cap (fixed-point).
        #[arg(long)]
        max_passes: Option<usize>,
    },
    /// Rewrite document link targets through a resolved redirect map.
    Apply {
        corpus: PathBuf,
        redirects: PathBuf,
        out: PathBuf,
    },
}

#[derive(Subcommand)]
pub(crate) enum EntitiesAction {
    /// Number of documents linking to each target.
    Counts {
        #[command(flatten)]
        io: CorpusIo,
        #[command(flatten)]
        filter: EntityFilter,
    },
    /// Target counts per anchor text.
    Names {
        #[command(flatten)]
        io: CorpusIo,
        #[command(flatten)]
        filter: EntityFilter,
    },
    /// Documents linking to each target.
    Inlinks {
        #[command(flatten)]
        io: CorpusIo,
    },
    /// Frequency-ranked entity vocabulary.
    Vocab {
        #[command(flatten)]
        io: CorpusIo,
        #[command(flatten)]
        filter: EntityFilter,

        /// Lowest rank kept (inclusive).
        #[arg(long)]
        min_rank: Option<u64>,

        /// Highest rank kept (exclusive).
        #[arg(long)]
        max_rank: Option<u64>,
    },
    /// Entities mentioned together in each document.
    Comentions {
        #[command(flatten)]
        io: CorpusIo,

        /// Vocabulary output to map entities to ranks.
        #[arg(long)]
        vocab: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub(crate) enum WikidataAction {
    /// Subject/predicate/object relations for items with an English Wikipedia page.
    Relations { dump: PathBuf, out: PathBuf },
    /// Every dump item keyed by its id, as `{ "_id", "data" }` records.
    Corpus { dump: PathBuf, out: PathBuf },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

#[derive(Args)]
pub(crate) struct CorpusIo {
    /// Document corpus: a JSON-lines file or a directory of part files.
    pub corpus: PathBuf,
    /// Output directory.
    pub out: PathBuf,
}

#[derive(Args)]
pub(crate) struct EntityFilter {
    /// Keep entities whose count is strictly greater than this.
    #[arg(long)]
    pub min_count: Option<u64>,

    /// Lowercase anchor text.
    #[arg(long)]
    pub lowercase: bool,

    /// Keep only targets starting with this prefix.
    #[arg(long)]
    pub filter_target: Option<String>,
}

impl EntityFilter {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(min_count) = self.min_count {
            config.entities.min_count = min_count;
        }
        if self.lowercase {
            config.entities.lowercase = true;
        }
        if let Some(prefix) = &self.filter_target {
            config.entities.filter_target = Some(prefix.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kbsift=info",
        1 => "kbsift=debug",
        _ => "kbsift=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let Cli {
        parallelism,
        config: config_path,
        command,
        ..
    } = cli;

    let (job, out, config) = match command {
        Command::Config { action } => {
            return match action {
                ConfigAction::Init => cmd_config_init(),
                ConfigAction::Show => cmd_config_show(config_path.as_deref()),
            };
        }
        command => {
            let mut config = resolve_config(config_path.as_deref())?;
            if let Some(parallelism) = parallelism {
                config.engine.parallelism = parallelism;
            }
            let (job, out) = plan(command, &mut config)?;
            (job, out, config)
        }
    };

    cmd_run_job(&job, &out, &config).await
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Turn a job subcommand into a [`Job`], folding its flags into `config`.
fn plan(command: Command, config: &mut AppConfig) -> Result<(Job, PathBuf)> {
    let planned = match command {
        Command::Redirects { action } => match action {
            RedirectsAction::Map {
                from,
                to,
                out,
                mode,
                max_passes,
            } => {
                if let Some(mode) = mode {
                    config.redirects.mode = mode;
                }
                if max_passes.is_some() {
                    config.redirects.max_passes = max_passes;
                }
                (Job::MapRedirects { from, to }, out)
            }
            RedirectsAction::Apply {
                corpus,
                redirects,
                out,
            } => (Job::RedirectDocuments { corpus, redirects }, out),
        },
        Command::Entities { action } => match action {
            EntitiesAction::Counts { io, filter } => {
                filter.apply(config);
                (Job::EntityCounts { corpus: io.corpus }, io.out)
            }
            EntitiesAction::Names { io, filter } => {
                filter.apply(config);
                (Job::EntityNameCounts { corpus: io.corpus }, io.out)
            }
            EntitiesAction::Inlinks { io } => (Job::EntityInlinks { corpus: io.corpus }, io.out),
            EntitiesAction::Vocab {
                io,
                filter,
                min_rank,
                max_rank,
            } => {
                filter.apply(config);
                if min_rank.is_some() {
                    config.vocab.min_rank = min_rank;
                }
                if max_rank.is_some() {
                    config.vocab.max_rank = max_rank;
                }
                (Job::EntityVocab { corpus: io.corpus }, io.out)
            }
            EntitiesAction::Comentions { io, vocab } => (
                Job::EntityComentions {
                    corpus: io.corpus,
                    vocab,
                },
                io.out,
            ),
        },
        Command::Ngrams {
            io,
            max_n,
            lowercase,
        } => {
            if let Some(max_n) = max_n {
                config.ngrams.max_n = max_n;
            }
            if lowercase {
                config.ngrams.lowercase = true;
            }
            (Job::NamePartCounts { corpus: io.corpus }, io.out)
        }
        Command::Wikidata {
            action: WikidataAction::Relations { dump, out },
        } => (Job::WikidataRelations { dump }, out),
        Command::Wikidata {
            action: WikidataAction::Corpus { dump, out },
        } => (Job::WikidataCorpus { dump }, out),
        Command::Config { .. } => bail!("`config` does not run a job"),
    };
    Ok(planned)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run_job(job: &Job, out: &Path, config: &AppConfig) -> Result<()> {
    info!(job = job.name(), out = %out.display(), "running job");

    let reporter = CliProgress::new();
    let result = run_job(job, out, config, &reporter).await?;

    // Print summary
    println!();
    println!("  Job finished: {}", result.job);
    println!("  Run:     {}", result.manifest.run_id);
    println!("  Records: {}", result.records());
    println!("  Parts:   {}", result.manifest.parts.len());
    if result.dropped_inputs > 0 {
        println!("  Dropped: {} malformed input lines", result.dropped_inputs);
    }
    println!("  Output:  {}", result.output.display());
    println!(
        "  Time:    {:.1}s",
        result.elapsed.as_secs_f64()
    );
    println!();

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn records_loaded(&self, path: &Path, records: usize, dropped: usize) {
        self.spinner.println(format!(
            "  loaded {records} records from {} ({dropped} dropped)",
            path.display()
        ));
    }

    fn done(&self, _result: &JobResult) {
        self.spinner.finish_and_clear();
    }
}
