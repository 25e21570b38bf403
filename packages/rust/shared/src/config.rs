//! Application configuration for kbsift.
//!
//! User config lives at `~/.kbsift/kbsift.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{KbsiftError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "kbsift.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".kbsift";

// ---------------------------------------------------------------------------
// Config structs (matching kbsift.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Dataflow engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Redirect resolution settings.
    #[serde(default)]
    pub redirects: RedirectsConfig,

    /// Link-target extraction settings shared by the entity jobs.
    #[serde(default)]
    pub entities: EntitiesConfig,

    /// Vocabulary rank window.
    #[serde(default)]
    pub vocab: VocabConfig,

    /// Positional n-gram counting.
    #[serde(default)]
    pub ngrams: NgramsConfig,

    /// Output sink settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[engine]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of partitions per collection.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
        }
    }
}

fn default_parallelism() -> usize {
    8
}

/// How far redirect chains are followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RedirectMode {
    /// A fixed number of self-composition passes.
    Bounded,
    /// Self-compose until no edge changes, capped at `max_passes`.
    FixedPoint,
}

impl std::str::FromStr for RedirectMode {
    type Err = KbsiftError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bounded" => Ok(Self::Bounded),
            "fixed-point" => Ok(Self::FixedPoint),
            other => Err(KbsiftError::config(format!(
                "unknown redirect mode '{other}': expected 'bounded' or 'fixed-point'"
            ))),
        }
    }
}

/// `[redirects]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectsConfig {
    /// Resolution mode.
    #[serde(default = "default_redirect_mode")]
    pub mode: RedirectMode,

    /// Self-composition passes (bounded) or the iteration cap (fixed-point).
    #[serde(default)]
    pub max_passes: Option<usize>,
}

impl Default for RedirectsConfig {
    fn default() -> Self {
        Self {
            mode: default_redirect_mode(),
            max_passes: None,
        }
    }
}

impl RedirectsConfig {
    /// Passes to run, falling back to the per-mode default.
    pub fn effective_passes(&self) -> usize {
        self.max_passes.unwrap_or(match self.mode {
            RedirectMode::Bounded => 1,
            RedirectMode::FixedPoint => 16,
        })
    }
}

fn default_redirect_mode() -> RedirectMode {
    RedirectMode::Bounded
}

/// `[entities]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitiesConfig {
    /// Entities are kept only when their count is strictly greater.
    #[serde(default = "default_min_count")]
    pub min_count: u64,

    /// Lowercase anchor text before counting.
    #[serde(default)]
    pub lowercase: bool,

    /// Keep only targets starting with this prefix.
    #[serde(default)]
    pub filter_target: Option<String>,
}

impl Default for EntitiesConfig {
    fn default() -> Self {
        Self {
            min_count: default_min_count(),
            lowercase: false,
            filter_target: None,
        }
    }
}

fn default_min_count() -> u64 {
    1
}

/// `[vocab]` section. Ranks are kept when `min_rank <= rank < max_rank`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabConfig {
    #[serde(default = "default_min_rank")]
    pub min_rank: Option<u64>,

    #[serde(default = "default_max_rank")]
    pub max_rank: Option<u64>,
}

impl Default for VocabConfig {
    fn default() -> Self {
        Self {
            min_rank: default_min_rank(),
            max_rank: default_max_rank(),
        }
    }
}

fn default_min_rank() -> Option<u64> {
    Some(0)
}

fn default_max_rank() -> Option<u64> {
    Some(10_000)
}

/// `[ngrams]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NgramsConfig {
    /// Largest anchor n-gram size; background counts use exactly this size.
    #[serde(default = "default_max_n")]
    pub max_n: usize,

    /// Lowercase anchors before decomposition.
    #[serde(default)]
    pub lowercase: bool,
}

impl Default for NgramsConfig {
    fn default() -> Self {
        Self {
            max_n: default_max_n(),
            lowercase: false,
        }
    }
}

fn default_max_n() -> usize {
    2
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File name prefix for partition files (`<prefix>-00000.jsonl`).
    #[serde(default = "default_part_prefix")]
    pub part_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            part_prefix: default_part_prefix(),
        }
    }
}

fn default_part_prefix() -> String {
    "part".into()
}

impl AppConfig {
    /// Reject values no job can run with.
    pub fn validate(&self) -> Result<()> {
        if self.engine.parallelism == 0 {
            return Err(KbsiftError::config("engine.parallelism must be at least 1"));
        }
        if self.ngrams.max_n == 0 {
            return Err(KbsiftError::config("ngrams.max_n must be at least 1"));
        }
        if self.redirects.effective_passes() == 0 && self.redirects.mode == RedirectMode::FixedPoint
        {
            return Err(KbsiftError::config(
                "redirects.max_passes must be at least 1 in fixed-point mode",
            ));
        }
        if self.output.part_prefix.is_empty() || self.output.part_prefix.contains('/') {
            return Err(KbsiftError::config(
                "output.part_prefix must be a non-empty file name",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.kbsift/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| KbsiftError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.kbsift/kbsift.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| KbsiftError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| KbsiftError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| KbsiftError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| KbsiftError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| KbsiftError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
