//! Run settings and the [`FilterConfig`] derived from them.
//!
//! Settings are layered with figment, lowest to highest priority:
//! 1. Built-in defaults
//! 2. TOML file (`comment-sentiment.toml`, or an explicit path)
//! 3. `config.env` (loaded into the environment with dotenvy) and the un-prefixed
//!    `MODEL_NAME`, `DEVICE`, `POSITIVE_THRESHOLD`, `EXCLUDE_AUTHORS`, `MIN_COMMENT_LENGTH`,
//!    `MAX_TOKEN_LENGTH` variables
//! 4. `COMMENT_SENTIMENT_*` environment variables
//!
//! The CLI merges its flags on top of [`Settings::figment`].
//!
//! ```no_run
//! use comment_sentiment::config::Settings;
//!
//! let settings = Settings::load(None).expect("settings");
//! let filter = settings.filter_config();
//! println!("threshold = {}", filter.positive_threshold);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PipelineError, Result};

/// Default TOML file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "comment-sentiment.toml";

/// Dotenv-style file read before the environment providers.
pub const ENV_FILE: &str = "config.env";

/// Prefix for environment variables that may set any setting.
pub const ENV_PREFIX: &str = "COMMENT_SENTIMENT_";

const PLAIN_ENV_KEYS: &[&str] = &[
    "MODEL_NAME",
    "DEVICE",
    "POSITIVE_THRESHOLD",
    "EXCLUDE_AUTHORS",
    "MIN_COMMENT_LENGTH",
    "MAX_TOKEN_LENGTH",
];

/// Which device the classifier should try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// CUDA GPU, falling back to CPU when initialization fails.
    #[serde(alias = "cuda")]
    Gpu,
    /// CPU only.
    Cpu,
}

impl DevicePreference {
    /// GPU when this build can reach a CUDA device, otherwise CPU.
    pub fn detect() -> Self {
        if candle_core::utils::cuda_is_available() {
            DevicePreference::Gpu
        } else {
            DevicePreference::Cpu
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevicePreference::Gpu => write!(f, "gpu"),
            DevicePreference::Cpu => write!(f, "cpu"),
        }
    }
}

/// How the positive-class logit becomes a probability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreActivation {
    /// Independent sigmoid per class.
    #[default]
    Sigmoid,
    /// Softmax across all classes.
    Softmax,
}

/// Filtering and classification options, immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterConfig {
    /// Identifier of the pretrained classifier (hub repo id or local directory).
    pub model_name: String,
    /// Preferred device, subject to runtime fallback.
    pub device: DevicePreference,
    /// Minimum score, inclusive, for a comment to count as positive.
    pub positive_threshold: f32,
    /// Authors rejected before inference. Matched case-sensitively.
    pub excluded_authors: BTreeSet<String>,
    /// Minimum number of characters for a comment to be scored.
    pub min_comment_length: usize,
    /// Longer comments are truncated to this many tokens.
    pub max_token_length: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Settings::default().filter_config()
    }
}

/// Everything a run needs, as loaded from the configuration layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model_name: String,
    pub device: DevicePreference,
    pub positive_threshold: f32,
    #[serde(deserialize_with = "author_set")]
    pub excluded_authors: BTreeSet<String>,
    pub min_comment_length: usize,
    pub max_token_length: usize,

    /// Source directories, one output collection each.
    pub input_dirs: Vec<PathBuf>,
    /// Where output collections are written.
    pub output_dir: PathBuf,
    /// Initial number of comments per classifier call.
    pub batch_size: usize,
    /// How many times a batch may be halved after running out of device memory.
    pub max_batch_halvings: u32,
    /// Number of sources processed in parallel.
    pub workers: usize,
    /// CUDA ordinal used when `device` is `gpu`.
    pub cuda_device: usize,
    /// Overrides the Hugging Face cache directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    pub score_activation: ScoreActivation,
    /// Draw a progress bar on stderr.
    pub progress: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_name: "cointegrated/rubert-tiny-sentiment-balanced".into(),
            device: DevicePreference::detect(),
            positive_threshold: 0.6,
            excluded_authors: ["empenoso", "Михаил Шардин"]
                .into_iter()
                .map(String::from)
                .collect(),
            min_comment_length: 20,
            max_token_length: 512,
            input_dirs: vec![
                PathBuf::from("habr_comments"),
                PathBuf::from("smart-lab_comments"),
                PathBuf::from("t-j_comments"),
            ],
            output_dir: PathBuf::from("positive_comments"),
            batch_size: 32,
            max_batch_halvings: 3,
            workers: 1,
            cuda_device: 0,
            cache_dir: None,
            score_activation: ScoreActivation::Sigmoid,
            progress: true,
        }
    }
}

impl Settings {
    /// Loads `config.env` if present, extracts all layers and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when a layer cannot be parsed or a value is out of range.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        load_env_file();
        Self::from_figment(Self::figment(config_path))
    }

    /// Like [`Settings::load`], with `overrides` merged over every other layer.
    ///
    /// `overrides` should skip unset fields when serialized so they do not mask lower layers.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when a layer cannot be parsed or a value is out of range.
    pub fn load_with<T: Serialize>(config_path: Option<&Path>, overrides: T) -> Result<Self> {
        load_env_file();
        Self::from_figment(Self::figment(config_path).merge(Serialized::defaults(overrides)))
    }

    /// Builds the provider chain without touching the process environment.
    ///
    /// Public so the CLI and tests can merge extra providers on top.
    pub fn figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        match config_path {
            Some(path) => figment = figment.merge(Toml::file(path)),
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    figment = figment.merge(Toml::file(local));
                }
            }
        }

        figment
            .merge(Env::raw().only(PLAIN_ENV_KEYS).map(|key| {
                if key.as_str().eq_ignore_ascii_case("exclude_authors") {
                    "excluded_authors".into()
                } else {
                    key.as_str().to_ascii_lowercase().into()
                }
            }))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Extracts and validates settings from an arbitrary figment.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] on extraction or validation failure.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Settings = figment.extract()?;
        settings.validate()
    }

    /// Ensures every value is within its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] naming the first offending setting.
    pub fn validate(self) -> Result<Self> {
        if !(0.0..=1.0).contains(&self.positive_threshold) {
            return Err(PipelineError::Config(format!(
                "positive_threshold must be within [0, 1], got {}",
                self.positive_threshold
            )));
        }
        if self.max_token_length == 0 {
            return Err(PipelineError::Config(
                "max_token_length must be greater than 0".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Config(
                "batch_size must be greater than 0".into(),
            ));
        }
        if self.workers == 0 {
            return Err(PipelineError::Config("workers must be greater than 0".into()));
        }
        if self.model_name.trim().is_empty() {
            return Err(PipelineError::Config("model_name must not be empty".into()));
        }
        Ok(self)
    }

    /// The filter-relevant subset of the settings.
    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            model_name: self.model_name.clone(),
            device: self.device,
            positive_threshold: self.positive_threshold,
            excluded_authors: self.excluded_authors.clone(),
            min_comment_length: self.min_comment_length,
            max_token_length: self.max_token_length,
        }
    }

    /// Logs the effective configuration at info level.
    pub fn log_summary(&self) {
        tracing::info!(
            model = %self.model_name,
            device = %self.device,
            threshold = self.positive_threshold,
            min_length = self.min_comment_length,
            max_tokens = self.max_token_length,
            batch_size = self.batch_size,
            workers = self.workers,
            "configuration loaded"
        );
        tracing::info!(
            excluded_authors = ?self.excluded_authors,
            input_dirs = ?self.input_dirs,
            output_dir = %self.output_dir.display(),
            "sources"
        );
    }
}

fn load_env_file() {
    let path = Path::new(ENV_FILE);
    if path.exists() {
        if let Err(e) = dotenvy::from_path(path) {
            tracing::warn!(file = ENV_FILE, error = %e, "could not read env file");
        }
    }
}

/// Accepts either a list or a comma separated string, as written in `config.env`.
fn author_set<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Authors {
        List(Vec<String>),
        Joined(String),
    }

    let names: Vec<String> = match Authors::deserialize(deserializer)? {
        Authors::List(list) => list,
        Authors::Joined(joined) => joined
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .split(',')
            .map(String::from)
            .collect(),
    };

    Ok(names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect())
}
