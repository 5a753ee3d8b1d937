use std::path::{Path, PathBuf};
use std::time::Duration;

use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Cache, Repo, RepoType};
use tokenizers::{Tokenizer, TruncationDirection, TruncationParams, TruncationStrategy};

use crate::error::{PipelineError, Result};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHT_FILES: [&str; 2] = ["model.safetensors", "pytorch_model.bin"];

/// Where a model's files come from.
#[derive(Debug, Clone)]
enum Origin {
    /// A directory on disk holding `config.json`, `tokenizer.json` and weights.
    Local(PathBuf),
    /// A hub repository, looked up in the local cache first.
    Hub { repo: String, cache_dir: Option<PathBuf> },
}

/// Resolves one file of a model repository to a path on disk.
#[derive(Debug, Clone)]
pub struct HfLoader {
    origin: Origin,
}

impl HfLoader {
    /// `model_name` is either an existing directory or a hub repo id.
    pub fn new(model_name: &str, cache_dir: Option<&Path>) -> Self {
        let local = Path::new(model_name);
        let origin = if local.is_dir() {
            Origin::Local(local.to_path_buf())
        } else {
            Origin::Hub {
                repo: model_name.to_string(),
                cache_dir: cache_dir.map(Path::to_path_buf),
            }
        };
        Self { origin }
    }

    fn name(&self) -> String {
        match &self.origin {
            Origin::Local(dir) => dir.display().to_string(),
            Origin::Hub { repo, .. } => repo.clone(),
        }
    }

    /// Returns the path of `filename`, downloading it when it is not cached yet.
    pub fn load(&self, filename: &str) -> Result<PathBuf> {
        match &self.origin {
            Origin::Local(dir) => {
                let path = dir.join(filename);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(PipelineError::ModelLoad(format!(
                        "'{}' not found in model directory '{}'",
                        filename,
                        dir.display()
                    )))
                }
            }
            Origin::Hub { repo, cache_dir } => {
                let cache = match cache_dir {
                    Some(dir) => Cache::new(dir.clone()),
                    None => Cache::from_env(),
                };
                if let Some(path) = cache.repo(model_repo(repo)).get(filename) {
                    tracing::debug!(repo = %repo, file = filename, "cache hit");
                    return Ok(path);
                }
                self.download(repo, cache_dir.as_deref(), filename)
            }
        }
    }

    fn download(&self, repo: &str, cache_dir: Option<&Path>, filename: &str) -> Result<PathBuf> {
        let api = hub_api(cache_dir)?;
        let api_repo: ApiRepo = api.repo(model_repo(repo));

        let max_retries = 3;
        let mut attempts = 0u32;

        for attempt in 0..max_retries {
            tracing::info!(repo, file = filename, attempt, "downloading");
            match api_repo.get(filename) {
                Ok(path) => return Ok(path),
                Err(e) => {
                    let error_msg = e.to_string();
                    attempts = attempt + 1;
                    if error_msg.contains("Lock acquisition failed") && attempt < max_retries - 1 {
                        let wait_time = Duration::from_millis(100 * (1 << attempt));
                        std::thread::sleep(wait_time);
                        continue;
                    }
                    return Err(PipelineError::Download(format!(
                        "Failed to download '{}' from '{}': {}",
                        filename, repo, error_msg
                    )));
                }
            }
        }

        Err(PipelineError::Download(format!(
            "Download timed out for '{}' from '{}' after {} attempt(s)",
            filename, repo, attempts
        )))
    }
}

fn model_repo(repo: &str) -> Repo {
    Repo::new(repo.to_string(), RepoType::Model)
}

fn hub_api(cache_dir: Option<&Path>) -> Result<Api> {
    let mut builder = ApiBuilder::new().with_progress(false);
    if let Some(dir) = cache_dir {
        builder = builder.with_cache_dir(dir.to_path_buf());
    }
    builder.build().map_err(|e| {
        PipelineError::Download(format!("Failed to initialize HuggingFace API: {e}"))
    })
}

/// The files that make up a sequence-classification checkpoint.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub weights: PathBuf,
}

impl ModelFiles {
    /// Fetches `config.json` and the weights, preferring safetensors.
    pub fn load(loader: &HfLoader) -> Result<Self> {
        let config = loader.load(CONFIG_FILE)?;
        let weights = loader
            .load(WEIGHT_FILES[0])
            .or_else(|_| loader.load(WEIGHT_FILES[1]))
            .map_err(|e| {
                PipelineError::ModelLoad(format!(
                    "no usable weights for '{}' ({}): {e}",
                    loader.name(),
                    WEIGHT_FILES.join(" or ")
                ))
            })?;
        Ok(Self { config, weights })
    }

    pub fn read_config(&self) -> Result<String> {
        std::fs::read_to_string(&self.config).map_err(|e| {
            PipelineError::ModelLoad(format!(
                "Failed to read '{}': {e}",
                self.config.display()
            ))
        })
    }
}

/// Loads `tokenizer.json` and configures right-side truncation at `max_length` tokens.
#[derive(Debug, Clone)]
pub struct TokenizerLoader {
    pub tokenizer_file_loader: HfLoader,
}

impl TokenizerLoader {
    pub fn new(loader: HfLoader) -> Self {
        Self {
            tokenizer_file_loader: loader,
        }
    }

    pub fn load(&self, max_length: usize) -> Result<Tokenizer> {
        let tokenizer_file_path = self.tokenizer_file_loader.load(TOKENIZER_FILE)?;
        let path_str = tokenizer_file_path.display().to_string();

        let mut tokenizer = Tokenizer::from_file(&tokenizer_file_path).map_err(|e| {
            PipelineError::Tokenization(format!(
                "Failed to load tokenizer from '{}': {}",
                path_str, e
            ))
        })?;

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                strategy: TruncationStrategy::LongestFirst,
                stride: 0,
                direction: TruncationDirection::Right,
            }))
            .map_err(|e| {
                PipelineError::Tokenization(format!(
                    "Failed to configure truncation at {max_length} tokens: {e}"
                ))
            })?;

        // Padding is applied per batch by the model, not per encoding.
        tokenizer.with_padding(None);

        Ok(tokenizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_directory_is_a_local_model() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{}").unwrap();
        let loader = HfLoader::new(dir.path().to_str().unwrap(), None);
        assert_eq!(loader.load(CONFIG_FILE).unwrap(), dir.path().join(CONFIG_FILE));
    }

    #[test]
    fn missing_local_file_is_a_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = HfLoader::new(dir.path().to_str().unwrap(), None);
        assert!(matches!(
            ModelFiles::load(&loader),
            Err(PipelineError::ModelLoad(_))
        ));
    }
}
