use candle_core::Device;

use crate::error::{Result, ScoreError};
use crate::pipelines::utils::DeviceRequest;

/// Token ids of one comment, after truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// Token ids, special tokens included.
    pub ids: Vec<u32>,
    /// Whether the encoder dropped tokens to respect the length bound.
    pub truncated: bool,
}

/// Turns comment text into token ids for the loaded model.
pub trait TextEncoder: Send + Sync {
    /// Encodes one text. Implementations may truncate; if they do, they report it.
    fn encode(&self, text: &str) -> Result<Encoded>;

    /// Id used to pad shorter sequences in a batch.
    fn pad_id(&self) -> u32;
}

/// A group of token sequences scored by a single model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBatch {
    sequences: Vec<Vec<u32>>,
    pad_id: u32,
}

impl TokenBatch {
    pub fn new(sequences: Vec<Vec<u32>>, pad_id: u32) -> Self {
        Self { sequences, pad_id }
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn sequences(&self) -> &[Vec<u32>] {
        &self.sequences
    }

    /// Length of the longest sequence.
    pub fn max_len(&self) -> usize {
        self.sequences.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Row-major `(token_ids, attention_mask)`, each `len() * max_len()` long.
    pub fn padded(&self) -> (Vec<u32>, Vec<u32>) {
        let max_len = self.max_len();
        let mut all_token_ids: Vec<u32> = Vec::with_capacity(self.len() * max_len);
        let mut all_attention_masks: Vec<u32> = Vec::with_capacity(self.len() * max_len);

        for ids in &self.sequences {
            all_token_ids.extend_from_slice(ids);
            all_token_ids.resize(all_token_ids.len() + (max_len - ids.len()), self.pad_id);
            all_attention_masks.extend(std::iter::repeat(1).take(ids.len()));
            all_attention_masks.extend(std::iter::repeat(0).take(max_len - ids.len()));
        }

        (all_token_ids, all_attention_masks)
    }
}

/// A loaded classifier: scores a batch, one probability of positive sentiment per item.
pub trait SentimentModel: Send + Sync {
    /// Scores every sequence of `batch`, in order.
    ///
    /// Memory exhaustion must be reported as [`ScoreError::OutOfMemory`] so the caller can retry
    /// with a smaller batch.
    fn score_batch(&self, batch: &TokenBatch) -> std::result::Result<Vec<f32>, ScoreError>;

    /// Device the weights live on.
    fn device(&self) -> &Device;
}

/// Loads models and their encoders by name.
///
/// The production implementation is [`HubModelProvider`](super::HubModelProvider); tests inject
/// substitutes.
pub trait ModelProvider: Sync {
    type Model: SentimentModel;
    type Encoder: TextEncoder;

    /// Turns a device request into a live device.
    fn resolve_device(&self, request: DeviceRequest) -> Result<Device> {
        request.resolve()
    }

    /// Loads the weights of `model_name` onto `device`.
    ///
    /// A [`PipelineError::Device`](crate::error::PipelineError::Device) means the device could
    /// not hold the model and a CPU retry may succeed.
    fn load_model(&self, model_name: &str, device: &Device) -> Result<Self::Model>;

    /// Loads the tokenizer of `model_name`, truncating at `max_tokens`.
    fn load_encoder(&self, model_name: &str, max_tokens: usize) -> Result<Self::Encoder>;
}
