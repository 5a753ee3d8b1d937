use std::sync::Mutex;

use candle_core::Device;
use serde::Serialize;

use super::model::{ModelProvider, SentimentModel, TokenBatch};
use crate::error::{PipelineError, Result, ScoreError};
use crate::pipelines::utils::{device_label, DeviceRequest};

/// Where the classifier ended up running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Running on the requested device.
    Active { device: String },
    /// GPU initialization failed; running on CPU for the rest of the run.
    Degraded {
        requested: String,
        device: String,
        reason: String,
    },
}

impl DeviceStatus {
    pub fn device(&self) -> &str {
        match self {
            DeviceStatus::Active { device } | DeviceStatus::Degraded { device, .. } => device,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, DeviceStatus::Degraded { .. })
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Active { device } => write!(f, "{device}"),
            DeviceStatus::Degraded {
                requested,
                device,
                reason,
            } => write!(f, "{device} (degraded from {requested}: {reason})"),
        }
    }
}

/// A loaded sentiment model, shared by every source of a run.
///
/// Batch calls are serialized: the device is held exclusively for the duration of one batch.
///
/// # Examples
///
/// ```rust,no_run
/// use comment_sentiment::config::FilterConfig;
/// use comment_sentiment::sentiment::{Classifier, DeviceRequest, HubModelProvider};
///
/// # fn main() -> comment_sentiment::error::Result<()> {
/// let config = FilterConfig::default();
/// let provider = HubModelProvider::default();
/// let classifier = Classifier::load(&provider, &config.model_name, DeviceRequest::Cuda(0))?;
/// println!("running on {}", classifier.status());
/// # Ok(())
/// # }
/// ```
pub struct Classifier<M: SentimentModel> {
    model: M,
    device_gate: Mutex<()>,
    status: DeviceStatus,
}

impl<M: SentimentModel> Classifier<M> {
    /// Wraps an already loaded model.
    pub fn new(model: M, status: DeviceStatus) -> Self {
        Self {
            model,
            device_gate: Mutex::new(()),
            status,
        }
    }

    /// Loads `model_name` onto the requested device, degrading to CPU if the GPU cannot be used.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ModelLoad`] when the model cannot be loaded on any device.
    pub fn load<P>(provider: &P, model_name: &str, request: DeviceRequest) -> Result<Self>
    where
        P: ModelProvider<Model = M>,
    {
        tracing::info!(model = model_name, device = %request, "loading classifier");

        let (device, mut degraded) = match provider.resolve_device(request) {
            Ok(device) => (device, None),
            Err(e) if !request.is_cpu() => {
                tracing::warn!(device = %request, error = %e, "GPU unavailable, falling back to CPU");
                (Device::Cpu, Some(e.to_string()))
            }
            Err(e) => return Err(model_load_error(model_name, e)),
        };

        let model = match provider.load_model(model_name, &device) {
            Ok(model) => model,
            Err(PipelineError::Device(reason)) if !device.is_cpu() => {
                tracing::warn!(device = %request, error = %reason, "model does not fit on GPU, falling back to CPU");
                degraded = Some(reason);
                provider
                    .load_model(model_name, &Device::Cpu)
                    .map_err(|e| model_load_error(model_name, e))?
            }
            Err(e) => return Err(model_load_error(model_name, e)),
        };

        let device = device_label(model.device());
        let status = match degraded {
            Some(reason) => DeviceStatus::Degraded {
                requested: request.to_string(),
                device,
                reason,
            },
            None => DeviceStatus::Active { device },
        };
        tracing::info!(model = model_name, device = %status, "classifier ready");

        Ok(Self::new(model, status))
    }

    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Scores one batch, in order.
    ///
    /// # Errors
    ///
    /// Propagates the model's [`ScoreError`]; a score outside `[0, 1]` or a wrong number of scores
    /// fails the whole batch rather than being clamped or padded.
    pub fn score(&self, batch: &TokenBatch) -> std::result::Result<Vec<f32>, ScoreError> {
        if batch.is_empty() {
            return Ok(vec![]);
        }

        let scores = {
            let _device = self
                .device_gate
                .lock()
                .map_err(|_| ScoreError::Inference("device lock poisoned by a previous panic".into()))?;
            self.model.score_batch(batch)?
        };

        if scores.len() != batch.len() {
            return Err(ScoreError::CountMismatch {
                expected: batch.len(),
                actual: scores.len(),
            });
        }
        if let Some((index, &value)) = scores
            .iter()
            .enumerate()
            .find(|(_, score)| !(0.0..=1.0).contains(*score))
        {
            return Err(ScoreError::OutOfRange { index, value });
        }

        Ok(scores)
    }
}

fn model_load_error(model_name: &str, err: PipelineError) -> PipelineError {
    match err {
        PipelineError::ModelLoad(_) => err,
        other => PipelineError::ModelLoad(format!("Failed to load model '{model_name}': {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<f32>, Device);

    impl SentimentModel for Fixed {
        fn score_batch(&self, _batch: &TokenBatch) -> std::result::Result<Vec<f32>, ScoreError> {
            Ok(self.0.clone())
        }

        fn device(&self) -> &Device {
            &self.1
        }
    }

    fn active() -> DeviceStatus {
        DeviceStatus::Active {
            device: "cpu".into(),
        }
    }

    #[test]
    fn scores_outside_unit_interval_fail_the_batch() {
        let classifier = Classifier::new(Fixed(vec![0.5, 1.2], Device::Cpu), active());
        let batch = TokenBatch::new(vec![vec![1], vec![2]], 0);
        assert_eq!(
            classifier.score(&batch),
            Err(ScoreError::OutOfRange {
                index: 1,
                value: 1.2
            })
        );
    }

    #[test]
    fn nan_is_out_of_range() {
        let classifier = Classifier::new(Fixed(vec![f32::NAN], Device::Cpu), active());
        let batch = TokenBatch::new(vec![vec![1]], 0);
        assert!(matches!(
            classifier.score(&batch),
            Err(ScoreError::OutOfRange { index: 0, .. })
        ));
    }

    #[test]
    fn score_count_must_match_batch() {
        let classifier = Classifier::new(Fixed(vec![0.5], Device::Cpu), active());
        let batch = TokenBatch::new(vec![vec![1], vec![2]], 0);
        assert_eq!(
            classifier.score(&batch),
            Err(ScoreError::CountMismatch {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn boundary_scores_are_accepted() {
        let classifier = Classifier::new(Fixed(vec![0.0, 1.0], Device::Cpu), active());
        let batch = TokenBatch::new(vec![vec![1], vec![2]], 0);
        assert_eq!(classifier.score(&batch).unwrap(), vec![0.0, 1.0]);
    }
}
