use super::record::Comment;

/// A comment together with its classifier score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredComment {
    pub comment: Comment,
    pub score: f32,
    pub is_positive: bool,
}

impl ScoredComment {
    pub fn new(comment: Comment, score: f32, threshold: f32) -> Self {
        Self {
            is_positive: is_positive(score, threshold),
            comment,
            score,
        }
    }
}

/// Inclusive: a score equal to the threshold is positive.
pub fn is_positive(score: f32, threshold: f32) -> bool {
    score >= threshold
}
