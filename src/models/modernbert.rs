use std::collections::HashMap;
use std::path::Path;

use candle_core::Device;
use candle_transformers::models::modernbert::{
    ClassifierConfig, ClassifierPooling, Config,
    ModernBertForSequenceClassification as CandleModernBertForSequenceClassification,
};

use super::{batch_tensors, load_var_builder, placement_error, ClassifierHead};
use crate::error::{PipelineError, Result, ScoreError};
use crate::pipelines::sentiment::model::{SentimentModel, TokenBatch};

/// ModernBERT sequence classifier, e.g. `clapAI/modernBERT-base-multilingual-sentiment`.
pub struct ModernBertSentimentModel {
    model: CandleModernBertForSequenceClassification,
    head: ClassifierHead,
    device: Device,
}

impl ModernBertSentimentModel {
    pub(crate) fn load(
        config_str: &str,
        weights_path: &Path,
        head: ClassifierHead,
        device: &Device,
    ) -> Result<Self> {
        let mut config: Config = serde_json::from_str(config_str)
            .map_err(|e| PipelineError::ModelLoad(format!("Invalid ModernBERT config: {e}")))?;
        patch_config_labels(&mut config, &head.id2label);

        let vb = load_var_builder(weights_path, device)?;
        let model = CandleModernBertForSequenceClassification::load(vb, &config)
            .map_err(|e| placement_error(device, e))?;

        Ok(Self {
            model,
            head,
            device: device.clone(),
        })
    }
}

impl SentimentModel for ModernBertSentimentModel {
    fn score_batch(&self, batch: &TokenBatch) -> std::result::Result<Vec<f32>, ScoreError> {
        if batch.is_empty() {
            return Ok(vec![]);
        }
        let (input_ids, attention_mask) = batch_tensors(batch, &self.device)?;
        let logits = self.model.forward(&input_ids, &attention_mask)?;
        self.head.scores(&logits)
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

/// Candle sizes the classification layer from `classifier_config`, which some checkpoints omit.
fn patch_config_labels(config: &mut Config, id2label: &HashMap<String, String>) {
    let matches = config
        .classifier_config
        .as_ref()
        .map(|c| c.id2label.len())
        .unwrap_or(0)
        == id2label.len();
    if matches {
        return;
    }

    let label2id: HashMap<String, String> = id2label
        .iter()
        .map(|(k, v)| (v.clone(), k.clone()))
        .collect();

    config.classifier_config = Some(ClassifierConfig {
        id2label: id2label.clone(),
        label2id,
        classifier_pooling: ClassifierPooling::default(),
    });
}
