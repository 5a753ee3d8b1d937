use std::path::Path;

use candle_core::{Device, IndexOp, Module, Tensor};
use candle_nn::{linear, Linear};
use candle_transformers::models::bert::{BertModel, Config};

use super::{batch_tensors, load_var_builder, placement_error, ClassifierHead};
use crate::error::{PipelineError, Result, ScoreError};
use crate::pipelines::sentiment::model::{SentimentModel, TokenBatch};

/// BERT encoder with the pooler and linear head of `BertForSequenceClassification`.
///
/// This is the architecture of `cointegrated/rubert-tiny-sentiment-balanced`.
pub struct BertSentimentModel {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    head: ClassifierHead,
    device: Device,
}

impl BertSentimentModel {
    pub(crate) fn load(
        config_str: &str,
        weights_path: &Path,
        head: ClassifierHead,
        device: &Device,
    ) -> Result<Self> {
        let config: Config = serde_json::from_str(config_str)
            .map_err(|e| PipelineError::ModelLoad(format!("Invalid BERT config: {e}")))?;
        let vb = load_var_builder(weights_path, device)?;

        // Checkpoints saved from the bare encoder have no `bert.` prefix.
        let encoder_vb = if vb.contains_tensor("bert.embeddings.word_embeddings.weight") {
            vb.pp("bert")
        } else {
            vb.clone()
        };

        let bert =
            BertModel::load(encoder_vb.clone(), &config).map_err(|e| placement_error(device, e))?;
        let pooler = linear(
            config.hidden_size,
            config.hidden_size,
            encoder_vb.pp("pooler").pp("dense"),
        )
        .map_err(|e| placement_error(device, e))?;
        let classifier = linear(config.hidden_size, head.num_labels(), vb.pp("classifier"))
            .map_err(|e| placement_error(device, e))?;

        Ok(Self {
            bert,
            pooler,
            classifier,
            head,
            device: device.clone(),
        })
    }

    fn logits(&self, batch: &TokenBatch) -> std::result::Result<Tensor, ScoreError> {
        let (input_ids, attention_mask) = batch_tensors(batch, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self
            .bert
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        Ok(self.classifier.forward(&pooled)?)
    }
}

impl SentimentModel for BertSentimentModel {
    fn score_batch(&self, batch: &TokenBatch) -> std::result::Result<Vec<f32>, ScoreError> {
        if batch.is_empty() {
            return Ok(vec![]);
        }
        let logits = self.logits(batch)?;
        self.head.scores(&logits)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}
