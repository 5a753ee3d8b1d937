//! Sentiment scoring of comment text.
//!
//! A [`ModelProvider`] loads a [`SentimentModel`] and its [`TextEncoder`]; the [`Classifier`] owns
//! the model for the run and the [`Batcher`] feeds it bounded batches.

pub mod batcher;
pub mod classifier;
pub mod hub;
pub mod model;

pub use batcher::{Batcher, ItemOutcome};
pub use classifier::{Classifier, DeviceStatus};
pub use hub::{HubEncoder, HubModelProvider};
pub use model::{Encoded, ModelProvider, SentimentModel, TextEncoder, TokenBatch};

pub use crate::pipelines::utils::DeviceRequest;
