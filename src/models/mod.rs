// ============ Sequence-classification checkpoints ============

pub(crate) mod bert;
pub(crate) mod modernbert;

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{ops::softmax, VarBuilder};
use serde::Deserialize;

use crate::config::ScoreActivation;
use crate::error::{PipelineError, Result, ScoreError};
use crate::loaders::ModelFiles;
use crate::pipelines::sentiment::model::{SentimentModel, TokenBatch};

pub use bert::BertSentimentModel;
pub use modernbert::ModernBertSentimentModel;

/// Any checkpoint architecture the hub provider can load.
pub enum HubSentimentModel {
    Bert(BertSentimentModel),
    ModernBert(ModernBertSentimentModel),
}

impl HubSentimentModel {
    /// Reads `model_type` from the checkpoint config and loads the matching architecture.
    pub(crate) fn load(
        files: &ModelFiles,
        device: &Device,
        activation: ScoreActivation,
    ) -> Result<Self> {
        let config_str = files.read_config()?;
        let architecture: ArchitectureJson = serde_json::from_str(&config_str)
            .map_err(|e| PipelineError::ModelLoad(format!("Invalid config.json: {e}")))?;
        let head = ClassifierHead::from_config(&config_str, activation)?;

        match architecture.model_type.as_deref() {
            Some("bert") | None => Ok(HubSentimentModel::Bert(BertSentimentModel::load(
                &config_str,
                &files.weights,
                head,
                device,
            )?)),
            Some("modernbert") => Ok(HubSentimentModel::ModernBert(
                ModernBertSentimentModel::load(&config_str, &files.weights, head, device)?,
            )),
            Some(other) => Err(PipelineError::ModelLoad(format!(
                "Unsupported model_type '{other}'. Supported: bert, modernbert"
            ))),
        }
    }
}

impl SentimentModel for HubSentimentModel {
    fn score_batch(&self, batch: &TokenBatch) -> std::result::Result<Vec<f32>, ScoreError> {
        match self {
            HubSentimentModel::Bert(model) => model.score_batch(batch),
            HubSentimentModel::ModernBert(model) => model.score_batch(batch),
        }
    }

    fn device(&self) -> &Device {
        match self {
            HubSentimentModel::Bert(model) => model.device(),
            HubSentimentModel::ModernBert(model) => model.device(),
        }
    }
}

#[derive(Deserialize)]
struct ArchitectureJson {
    #[serde(default)]
    model_type: Option<String>,
}

#[derive(Deserialize)]
struct ClassifierConfigJson {
    #[serde(default)]
    id2label: HashMap<String, String>,
}

/// Maps classification logits to the probability of the positive label.
#[derive(Debug, Clone)]
pub(crate) struct ClassifierHead {
    pub(crate) id2label: HashMap<String, String>,
    positive_index: usize,
    activation: ScoreActivation,
}

impl ClassifierHead {
    pub(crate) fn from_config(config_str: &str, activation: ScoreActivation) -> Result<Self> {
        let class_cfg: ClassifierConfigJson = serde_json::from_str(config_str)
            .map_err(|e| PipelineError::ModelLoad(format!("Invalid config.json: {e}")))?;
        Self::new(class_cfg.id2label, activation)
    }

    pub(crate) fn new(
        id2label: HashMap<String, String>,
        activation: ScoreActivation,
    ) -> Result<Self> {
        let positive_index = id2label
            .iter()
            .find(|(_, label)| label.eq_ignore_ascii_case("positive"))
            .and_then(|(id, _)| id.parse::<usize>().ok())
            .ok_or_else(|| {
                let mut available: Vec<&str> = id2label.values().map(String::as_str).collect();
                available.sort_unstable();
                PipelineError::ModelLoad(format!(
                    "Model has no 'positive' label. Available: {}",
                    available.join(", ")
                ))
            })?;

        Ok(Self {
            id2label,
            positive_index,
            activation,
        })
    }

    pub(crate) fn num_labels(&self) -> usize {
        self.id2label.len()
    }

    /// `logits` is `(batch, num_labels)`.
    pub(crate) fn scores(&self, logits: &Tensor) -> std::result::Result<Vec<f32>, ScoreError> {
        let logits = logits.to_dtype(DType::F32)?;
        let probs = match self.activation {
            ScoreActivation::Sigmoid => candle_nn::ops::sigmoid(&logits)?,
            ScoreActivation::Softmax => softmax(&logits, D::Minus1)?,
        };

        probs
            .to_vec2::<f32>()?
            .into_iter()
            .map(|row| {
                row.get(self.positive_index).copied().ok_or_else(|| {
                    ScoreError::Inference(format!(
                        "Model produced {} logits, positive label is #{}",
                        row.len(),
                        self.positive_index
                    ))
                })
            })
            .collect()
    }
}

/// Builds `(input_ids, attention_mask)` tensors of shape `(batch, max_len)`.
pub(crate) fn batch_tensors(
    batch: &TokenBatch,
    device: &Device,
) -> std::result::Result<(Tensor, Tensor), ScoreError> {
    let shape = (batch.len(), batch.max_len());
    let (all_token_ids, all_attention_masks) = batch.padded();
    let input_ids = Tensor::from_vec(all_token_ids, shape, device)?;
    let attention_mask = Tensor::from_vec(all_attention_masks, shape, device)?;
    Ok((input_ids, attention_mask))
}

pub(crate) fn load_var_builder(weights_path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let vb = if weights_path.extension().is_some_and(|e| e == "safetensors") {
        unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device) }
    } else {
        VarBuilder::from_pth(weights_path, DType::F32, device)
    };
    vb.map_err(|e| placement_error(device, e))
}

/// Weight placement failures on a GPU are device errors (retry on CPU), anything else is fatal.
pub(crate) fn placement_error(device: &Device, err: candle_core::Error) -> PipelineError {
    if device.is_cuda() {
        PipelineError::Device(format!("Failed to place weights on GPU: {err}"))
    } else {
        PipelineError::ModelLoad(format!("Failed to load weights: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> HashMap<String, String> {
        [("0", "negative"), ("1", "neutral"), ("2", "positive")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn positive_label_is_located_by_name() {
        let head = ClassifierHead::new(labels(), ScoreActivation::Sigmoid).unwrap();
        assert_eq!(head.positive_index, 2);
        assert_eq!(head.num_labels(), 3);
    }

    #[test]
    fn missing_positive_label_is_incompatible() {
        let id2label = [("0".to_string(), "LABEL_0".to_string())].into_iter().collect();
        assert!(matches!(
            ClassifierHead::new(id2label, ScoreActivation::Sigmoid),
            Err(PipelineError::ModelLoad(_))
        ));
    }

    #[test]
    fn sigmoid_scores_pick_the_positive_column() {
        let head = ClassifierHead::new(labels(), ScoreActivation::Sigmoid).unwrap();
        let logits = Tensor::new(&[[0.0f32, 0.0, 0.0], [0.0, 0.0, 10.0]], &Device::Cpu).unwrap();
        let scores = head.scores(&logits).unwrap();
        assert!((scores[0] - 0.5).abs() < 1e-6);
        assert!(scores[1] > 0.99);
    }

    #[test]
    fn softmax_scores_sum_across_classes() {
        let head = ClassifierHead::new(labels(), ScoreActivation::Softmax).unwrap();
        let logits = Tensor::new(&[[1.0f32, 1.0, 1.0]], &Device::Cpu).unwrap();
        let scores = head.scores(&logits).unwrap();
        assert!((scores[0] - 1.0 / 3.0).abs() < 1e-6);
    }
}
