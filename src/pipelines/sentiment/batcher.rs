use super::classifier::Classifier;
use super::model::{SentimentModel, TextEncoder, TokenBatch};
use crate::comments::Comment;

/// What happened to one admitted comment.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Scored(Comment, f32),
    /// Tokenization or scoring failed; the reason is kept for the log.
    Failed(Comment, String),
}

/// Tokenizes admitted comments and scores them in bounded batches.
///
/// Comments come back in the order they were pushed. When the device runs out of memory the batch
/// size is halved and the same items are retried, at most `max_halvings` times per batch. The
/// reduced size is kept for the remaining batches of this batcher.
pub struct Batcher<'a, E: TextEncoder> {
    encoder: &'a E,
    max_tokens: usize,
    batch_size: usize,
    max_halvings: u32,
    pending: Vec<(Comment, Vec<u32>)>,
    truncated: usize,
}

impl<'a, E: TextEncoder> Batcher<'a, E> {
    pub fn new(encoder: &'a E, max_tokens: usize, batch_size: usize, max_halvings: u32) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            encoder,
            max_tokens,
            batch_size,
            max_halvings,
            pending: Vec::with_capacity(batch_size),
            truncated: 0,
        }
    }

    /// Queues `comment`, scoring the pending batch once it is full.
    ///
    /// Returns the outcomes that became final during this call.
    pub fn push<M: SentimentModel>(
        &mut self,
        comment: Comment,
        classifier: &Classifier<M>,
    ) -> Vec<ItemOutcome> {
        let encoded = match self.encoder.encode(comment.text()) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(id = %comment.id(), error = %e, "tokenization failed");
                let reason = e.to_string();
                return vec![ItemOutcome::Failed(comment, reason)];
            }
        };

        let mut ids = encoded.ids;
        let mut truncated = encoded.truncated;
        if ids.len() > self.max_tokens {
            ids.truncate(self.max_tokens);
            truncated = true;
        }
        if truncated {
            self.truncated += 1;
            tracing::debug!(id = %comment.id(), max_tokens = self.max_tokens, "comment truncated");
        }

        self.pending.push((comment, ids));
        if self.pending.len() >= self.batch_size {
            self.flush(classifier)
        } else {
            vec![]
        }
    }

    /// Scores whatever is still pending.
    pub fn finish<M: SentimentModel>(&mut self, classifier: &Classifier<M>) -> Vec<ItemOutcome> {
        self.flush(classifier)
    }

    /// Number of comments whose token sequence was cut to `max_tokens`.
    pub fn truncated(&self) -> usize {
        self.truncated
    }

    /// Current batch size, after any halving.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn flush<M: SentimentModel>(&mut self, classifier: &Classifier<M>) -> Vec<ItemOutcome> {
        let items = std::mem::take(&mut self.pending);
        if items.is_empty() {
            return vec![];
        }

        let mut results: Vec<Option<Result<f32, String>>> = vec![None; items.len()];
        let mut halvings = 0u32;
        let mut start = 0;

        while start < items.len() {
            let end = (start + self.batch_size).min(items.len());
            let batch = TokenBatch::new(
                items[start..end].iter().map(|(_, ids)| ids.clone()).collect(),
                self.encoder.pad_id(),
            );

            match classifier.score(&batch) {
                Ok(scores) => {
                    for (slot, score) in results[start..end].iter_mut().zip(scores) {
                        *slot = Some(Ok(score));
                    }
                    start = end;
                }
                Err(e)
                    if e.is_out_of_memory()
                        && halvings < self.max_halvings
                        && self.batch_size > 1 =>
                {
                    halvings += 1;
                    self.batch_size = (self.batch_size / 2).max(1);
                    tracing::warn!(
                        batch_size = self.batch_size,
                        halvings,
                        "device out of memory, retrying with a smaller batch"
                    );
                }
                Err(e) => {
                    // Out of retries: nothing after `start` in this batch gets scored.
                    let failed_end = if e.is_out_of_memory() { items.len() } else { end };
                    tracing::warn!(items = failed_end - start, error = %e, "batch scoring failed");
                    let reason = e.to_string();
                    for slot in &mut results[start..failed_end] {
                        *slot = Some(Err(reason.clone()));
                    }
                    start = failed_end;
                }
            }
        }

        items
            .into_iter()
            .zip(results)
            .map(|((comment, _), result)| match result {
                Some(Ok(score)) => ItemOutcome::Scored(comment, score),
                Some(Err(reason)) => ItemOutcome::Failed(comment, reason),
                None => ItemOutcome::Failed(comment, "not scored".into()),
            })
            .collect()
    }
}
