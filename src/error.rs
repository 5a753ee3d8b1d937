//! Error types for this crate.
//!
//! Fallible operations return [`Result<T>`] which uses [`PipelineError`] as the error type.
//! Scoring a batch has its own [`ScoreError`], because the batcher reacts differently to
//! device-memory exhaustion than to every other failure.

use std::path::PathBuf;

use thiserror::Error;

/// A [`Result`](std::result::Result) alias using [`PipelineError`] as the error type.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// The unified error type for all crate errors.
///
/// # Example
///
/// ```rust,no_run
/// use comment_sentiment::error::PipelineError;
///
/// fn handle_error(e: PipelineError) {
///     match &e {
///         PipelineError::ModelLoad(_) | PipelineError::Download(_) => {
///             // No model, no run - abort
///         }
///         PipelineError::Device(_) => {
///             // GPU unavailable - fall back to CPU
///         }
///         PipelineError::Load { .. } => {
///             // Bad input file - skip it
///         }
///         PipelineError::Write { .. } => {
///             // Destination not writable - mark the source failed
///         }
///         _ => eprintln!("error: {e}"),
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PipelineError {
    /// Network or download failure. Retry may help.
    #[error("{0}")]
    Download(String),

    /// Tokenization failure. Check input text.
    #[error("{0}")]
    Tokenization(String),

    /// Device initialization failure. Fall back to CPU.
    #[error("{0}")]
    Device(String),

    /// Classifier weights unavailable or incompatible. Fatal for the run.
    #[error("{0}")]
    ModelLoad(String),

    /// Input file or record could not be read.
    #[error("failed to load {}: {reason}", path.display())]
    Load {
        /// File the failure belongs to.
        path: PathBuf,
        /// Human readable cause.
        reason: String,
    },

    /// Output collection could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Destination that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid or unparsable settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error. Report if seen.
    #[error("{0}")]
    Unexpected(String),
}

impl From<hf_hub::api::sync::ApiError> for PipelineError {
    fn from(value: hf_hub::api::sync::ApiError) -> Self {
        PipelineError::Download(format!("HuggingFace API error: {}", value))
    }
}

impl From<candle_core::Error> for PipelineError {
    fn from(value: candle_core::Error) -> Self {
        PipelineError::Unexpected(value.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(value: std::io::Error) -> Self {
        PipelineError::Unexpected(value.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(value: serde_json::Error) -> Self {
        PipelineError::Unexpected(value.to_string())
    }
}

impl From<figment::Error> for PipelineError {
    fn from(value: figment::Error) -> Self {
        PipelineError::Config(value.to_string())
    }
}

/// Failure of a single batch call into the classifier.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    /// The device ran out of memory. Retry with a smaller batch.
    #[error("device out of memory: {0}")]
    OutOfMemory(String),

    /// The model produced a score outside `[0.0, 1.0]`.
    #[error("score {value} at batch position {index} is outside [0, 1]")]
    OutOfRange {
        /// Position inside the batch.
        index: usize,
        /// Offending value.
        value: f32,
    },

    /// The model returned a different number of scores than it was given items.
    #[error("model returned {actual} scores for {expected} items")]
    CountMismatch {
        /// Items submitted.
        expected: usize,
        /// Scores returned.
        actual: usize,
    },

    /// Any other inference failure.
    #[error("inference failed: {0}")]
    Inference(String),
}

impl ScoreError {
    /// Classifies a candle error, separating CUDA memory exhaustion from everything else.
    pub fn from_candle(err: candle_core::Error) -> Self {
        let message = err.to_string();
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("out of memory") || lowered.contains("out_of_memory") {
            ScoreError::OutOfMemory(message)
        } else {
            ScoreError::Inference(message)
        }
    }

    /// Whether retrying with a smaller batch may help.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, ScoreError::OutOfMemory(_))
    }
}

impl From<candle_core::Error> for ScoreError {
    fn from(value: candle_core::Error) -> Self {
        ScoreError::from_candle(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuda_oom_message_is_classified_as_out_of_memory() {
        let err = candle_core::Error::Msg(
            "DriverError(CUDA_ERROR_OUT_OF_MEMORY, \"out of memory\")".into(),
        );
        assert!(ScoreError::from_candle(err).is_out_of_memory());
    }

    #[test]
    fn other_candle_errors_are_inference_failures() {
        let err = candle_core::Error::Msg("shape mismatch in matmul".into());
        assert!(matches!(
            ScoreError::from_candle(err),
            ScoreError::Inference(_)
        ));
    }
}
