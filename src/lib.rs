//! Sentiment filtering of scraped forum comments.
//!
//! Reads directories of comment exports, drops comments by excluded authors or below a minimum
//! length, scores the rest with a pretrained classifier running on
//! [Candle](https://github.com/huggingface/candle), and writes the comments scoring at or above a
//! threshold to one collection per source.
//!
//! ```rust,no_run
//! use comment_sentiment::config::Settings;
//! use comment_sentiment::run::RunCoordinator;
//! use comment_sentiment::sentiment::HubModelProvider;
//!
//! # fn main() -> comment_sentiment::error::Result<()> {
//! let settings = Settings::load(None)?;
//! let provider = HubModelProvider::from_settings(&settings);
//! let report = RunCoordinator::new(&settings, &provider).run()?;
//! print!("{report}");
//! # Ok(())
//! # }
//! ```

// ============ Internal API ============

pub(crate) mod loaders;
pub(crate) mod models;
pub(crate) mod pipelines;

// ============ Public API ============

pub mod comments;
pub mod config;
pub mod error;
pub mod run;

pub use pipelines::{sentiment, stats};
