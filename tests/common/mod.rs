//! Substitute model, encoder and provider for running the pipeline without weights.
//!
//! The provider knows the score each comment text should get. The encoder emits that score as
//! the first token (`score * 10_000`) followed by one token per whitespace separated word, and
//! the model reads the score back from the first token.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use candle_core::Device;
use comment_sentiment::config::{DevicePreference, Settings};
use comment_sentiment::error::{PipelineError, Result, ScoreError};
use comment_sentiment::sentiment::{
    DeviceRequest, Encoded, ModelProvider, SentimentModel, TextEncoder, TokenBatch,
};
use serde_json::{json, Value};

const SCALE: f32 = 10_000.0;
const WORD: u32 = 1;

/// What the substitute model saw during a run.
#[derive(Debug, Default)]
pub struct ScoreLog {
    /// Size of every batch submitted, failed ones included.
    pub batch_sizes: Vec<usize>,
    /// Scores read back from every successfully scored sequence.
    pub scored: Vec<f32>,
    /// Longest sequence the model received.
    pub max_sequence_len: usize,
}

pub struct ScriptedEncoder {
    max_tokens: usize,
    scores: HashMap<String, f32>,
    default_score: f32,
}

impl TextEncoder for ScriptedEncoder {
    fn encode(&self, text: &str) -> Result<Encoded> {
        if text.contains('\u{0}') {
            return Err(PipelineError::Tokenization("unexpected NUL in text".into()));
        }
        let score = self.scores.get(text).copied().unwrap_or(self.default_score);

        let mut ids = vec![(score * SCALE).round() as u32];
        ids.extend(text.split_whitespace().map(|_| WORD));

        let truncated = ids.len() > self.max_tokens;
        ids.truncate(self.max_tokens);
        Ok(Encoded { ids, truncated })
    }

    fn pad_id(&self) -> u32 {
        0
    }
}

pub struct ScriptedModel {
    oom_above: Option<usize>,
    log: Arc<Mutex<ScoreLog>>,
    device: Device,
}

impl SentimentModel for ScriptedModel {
    fn score_batch(&self, batch: &TokenBatch) -> std::result::Result<Vec<f32>, ScoreError> {
        let mut log = self.log.lock().unwrap();
        log.batch_sizes.push(batch.len());
        if self.oom_above.is_some_and(|limit| batch.len() > limit) {
            return Err(ScoreError::OutOfMemory(
                "CUDA_ERROR_OUT_OF_MEMORY: out of memory".into(),
            ));
        }

        let scores: Vec<f32> = batch
            .sequences()
            .iter()
            .map(|ids| ids.first().map_or(0.0, |&id| id as f32 / SCALE))
            .collect();
        log.max_sequence_len = log.max_sequence_len.max(batch.max_len());
        log.scored.extend(&scores);
        Ok(scores)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// Provider whose scores and failure modes are chosen by the test.
#[derive(Default)]
pub struct ScriptedProvider {
    /// Score per exact comment text.
    pub scores: HashMap<String, f32>,
    /// Score of any text not in `scores`.
    pub default_score: f32,
    /// Device resolution fails for any GPU request.
    pub gpu_fails: bool,
    /// Loading fails outright.
    pub model_missing: bool,
    /// Batches larger than this run out of memory.
    pub oom_above: Option<usize>,
    pub log: Arc<Mutex<ScoreLog>>,
}

impl ScriptedProvider {
    pub fn with_scores<'a>(scores: impl IntoIterator<Item = (&'a str, f32)>) -> Self {
        Self {
            scores: scores
                .into_iter()
                .map(|(text, score)| (text.to_string(), score))
                .collect(),
            ..Self::default()
        }
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, ScoreLog> {
        self.log.lock().unwrap()
    }
}

impl ModelProvider for ScriptedProvider {
    type Model = ScriptedModel;
    type Encoder = ScriptedEncoder;

    fn resolve_device(&self, request: DeviceRequest) -> Result<Device> {
        match request {
            DeviceRequest::Cuda(i) if self.gpu_fails => Err(PipelineError::Device(format!(
                "Failed to init CUDA device {i}: no CUDA-capable device is detected"
            ))),
            _ => Ok(Device::Cpu),
        }
    }

    fn load_model(&self, model_name: &str, device: &Device) -> Result<Self::Model> {
        if self.model_missing {
            return Err(PipelineError::ModelLoad(format!(
                "Failed to download 'config.json' from '{model_name}': 404"
            )));
        }
        Ok(ScriptedModel {
            oom_above: self.oom_above,
            log: Arc::clone(&self.log),
            device: device.clone(),
        })
    }

    fn load_encoder(&self, _model_name: &str, max_tokens: usize) -> Result<Self::Encoder> {
        Ok(ScriptedEncoder {
            max_tokens,
            scores: self.scores.clone(),
            default_score: self.default_score,
        })
    }
}

/// Settings for a CPU run over `inputs`, writing to `output`, with no progress bar.
pub fn settings(inputs: &[&Path], output: &Path) -> Settings {
    Settings {
        device: DevicePreference::Cpu,
        input_dirs: inputs.iter().map(|p| p.to_path_buf()).collect(),
        output_dir: output.to_path_buf(),
        progress: false,
        ..Settings::default()
    }
}

pub fn comment(id: u64, author: &str, text: &str) -> Value {
    json!({ "id": id, "author": author, "text": text })
}

/// Writes `comments` as a JSON array into `dir/name`.
pub fn write_source_file(dir: &Path, name: &str, comments: &[Value]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join(name),
        serde_json::to_string_pretty(&Value::Array(comments.to_vec())).unwrap(),
    )
    .unwrap();
}
