use std::path::PathBuf;

use candle_core::Device;
use tokenizers::Tokenizer;

use super::model::{Encoded, ModelProvider, TextEncoder};
use crate::config::{ScoreActivation, Settings};
use crate::error::{PipelineError, Result};
use crate::loaders::{HfLoader, ModelFiles, TokenizerLoader};
use crate::models::HubSentimentModel;

/// Loads sequence-classification checkpoints from a local directory or the Hugging Face hub.
#[derive(Debug, Clone, Default)]
pub struct HubModelProvider {
    cache_dir: Option<PathBuf>,
    activation: ScoreActivation,
}

impl HubModelProvider {
    pub fn new(cache_dir: Option<PathBuf>, activation: ScoreActivation) -> Self {
        Self {
            cache_dir,
            activation,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.cache_dir.clone(), settings.score_activation)
    }

    fn loader(&self, model_name: &str) -> HfLoader {
        HfLoader::new(model_name, self.cache_dir.as_deref())
    }
}

impl ModelProvider for HubModelProvider {
    type Model = HubSentimentModel;
    type Encoder = HubEncoder;

    fn load_model(&self, model_name: &str, device: &Device) -> Result<Self::Model> {
        let files = ModelFiles::load(&self.loader(model_name))?;
        tracing::debug!(
            config = %files.config.display(),
            weights = %files.weights.display(),
            "model files resolved"
        );
        HubSentimentModel::load(&files, device, self.activation)
    }

    fn load_encoder(&self, model_name: &str, max_tokens: usize) -> Result<Self::Encoder> {
        let tokenizer = TokenizerLoader::new(self.loader(model_name)).load(max_tokens)?;
        Ok(HubEncoder::new(tokenizer))
    }
}

/// [`TextEncoder`] backed by a `tokenizer.json` with truncation enabled.
pub struct HubEncoder {
    tokenizer: Tokenizer,
    pad_id: u32,
}

impl HubEncoder {
    pub fn new(tokenizer: Tokenizer) -> Self {
        let pad_id = tokenizer
            .get_padding()
            .map(|p| p.pad_id)
            .or_else(|| tokenizer.token_to_id("[PAD]"))
            .or_else(|| tokenizer.token_to_id("<pad>"))
            .unwrap_or(0);
        Self { tokenizer, pad_id }
    }
}

impl TextEncoder for HubEncoder {
    fn encode(&self, text: &str) -> Result<Encoded> {
        let encoding = self.tokenizer.encode(text, true).map_err(|e| {
            PipelineError::Tokenization(format!("Tokenization failed on '{}': {}", preview(text), e))
        })?;

        Ok(Encoded {
            truncated: !encoding.get_overflowing().is_empty(),
            ids: encoding.get_ids().to_vec(),
        })
    }

    fn pad_id(&self) -> u32 {
        self.pad_id
    }
}

fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(40).collect();
    if text.chars().nth(40).is_some() {
        preview.push_str("...");
    }
    preview
}
