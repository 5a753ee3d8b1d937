use serde::Serialize;

use super::record::Comment;
use crate::config::FilterConfig;

/// Pre-inference decision for one comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterVerdict {
    ExcludedAuthor,
    TooShort,
    Admitted,
}

impl FilterVerdict {
    pub fn is_admitted(self) -> bool {
        self == FilterVerdict::Admitted
    }
}

/// Author first (exact match), then length in characters of the raw text.
pub fn evaluate(comment: &Comment, config: &FilterConfig) -> FilterVerdict {
    if config.excluded_authors.contains(comment.author()) {
        return FilterVerdict::ExcludedAuthor;
    }
    if comment.text().chars().count() < config.min_comment_length {
        return FilterVerdict::TooShort;
    }
    FilterVerdict::Admitted
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::comments::CommentId;

    fn config() -> FilterConfig {
        FilterConfig {
            excluded_authors: ["empenoso".to_string()].into_iter().collect(),
            min_comment_length: 5,
            ..FilterConfig::default()
        }
    }

    #[rstest]
    #[case::excluded_author("empenoso", "a long enough text", FilterVerdict::ExcludedAuthor)]
    #[case::excluded_even_if_short("empenoso", "hi", FilterVerdict::ExcludedAuthor)]
    #[case::author_match_is_case_sensitive("Empenoso", "a long enough text", FilterVerdict::Admitted)]
    #[case::too_short("alice", "abcd", FilterVerdict::TooShort)]
    #[case::exactly_min_length("alice", "abcde", FilterVerdict::Admitted)]
    #[case::counts_characters_not_bytes("alice", "ñäöüß", FilterVerdict::Admitted)]
    #[case::empty_author_is_allowed("", "hello world", FilterVerdict::Admitted)]
    fn verdicts(#[case] author: &str, #[case] text: &str, #[case] expected: FilterVerdict) {
        let comment = Comment::new(CommentId::from(1), author, text, "src");
        assert_eq!(evaluate(&comment, &config()), expected);
    }
}
