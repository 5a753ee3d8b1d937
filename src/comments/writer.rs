use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::decision::ScoredComment;
use super::links::comment_link;
use super::record::CommentId;
use crate::error::{PipelineError, Result};

const SEPARATOR_WIDTH: usize = 100;

/// One persisted positive comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositiveComment {
    pub id: CommentId,
    pub author: String,
    pub text: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl From<&ScoredComment> for PositiveComment {
    fn from(scored: &ScoredComment) -> Self {
        let comment = &scored.comment;
        Self {
            id: comment.id().clone(),
            author: comment.author().to_string(),
            text: comment.text().to_string(),
            score: scored.score,
            datetime: comment.datetime().map(String::from),
            article_url: comment.article_url().map(String::from),
            link: comment_link(comment.source(), comment.article_url(), comment.id().as_str()),
        }
    }
}

/// The output collection of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositiveCollection {
    pub source: String,
    pub comments: Vec<PositiveComment>,
}

/// Persists positive comments, one JSON collection and one text digest per source.
///
/// Writing is an upsert keyed by comment id: entries already in the collection are kept, entries
/// with the same id are replaced. Files are replaced atomically.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    output_dir: PathBuf,
}

impl ResultWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn collection_path(&self, source: &str) -> PathBuf {
        self.output_dir
            .join(format!("{source}_positive_comments.json"))
    }

    pub fn digest_path(&self, source: &str) -> PathBuf {
        self.output_dir.join(format!("{source}_positive_comments.txt"))
    }

    /// Merges the positive entries of `scored` into the collection of `source`.
    ///
    /// Non-positive entries are ignored. Returns the size of the collection after the write.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Write`] if the existing collection is unreadable or a file cannot
    /// be replaced.
    pub fn write(&self, source: &str, scored: &[ScoredComment]) -> Result<usize> {
        fs::create_dir_all(&self.output_dir).map_err(|e| write_error(&self.output_dir, e))?;

        let path = self.collection_path(source);
        let mut entries: BTreeMap<CommentId, PositiveComment> = self
            .read(source)?
            .map(|existing| {
                existing
                    .comments
                    .into_iter()
                    .map(|c| (c.id.clone(), c))
                    .collect()
            })
            .unwrap_or_default();

        for item in scored.iter().filter(|s| s.is_positive) {
            entries.insert(item.comment.id().clone(), PositiveComment::from(item));
        }

        let collection = PositiveCollection {
            source: source.to_string(),
            comments: entries.into_values().collect(),
        };

        let mut json = serde_json::to_string_pretty(&collection)
            .map_err(|e| write_error(&path, io::Error::new(io::ErrorKind::InvalidData, e)))?;
        json.push('\n');
        self.replace(&path, json.as_bytes())?;
        self.replace(&self.digest_path(source), render_digest(&collection).as_bytes())?;

        tracing::debug!(
            source,
            path = %path.display(),
            comments = collection.comments.len(),
            "collection written"
        );
        Ok(collection.comments.len())
    }

    /// Reads the current collection of `source`, if one was written before.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Write`] if the file exists but is not a valid collection.
    pub fn read(&self, source: &str) -> Result<Option<PositiveCollection>> {
        let path = self.collection_path(source);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(write_error(&path, e)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| write_error(&path, io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    fn replace(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut file =
            NamedTempFile::new_in(&self.output_dir).map_err(|e| write_error(path, e))?;
        file.write_all(contents).map_err(|e| write_error(path, e))?;
        file.as_file().sync_all().map_err(|e| write_error(path, e))?;
        file.persist(path).map_err(|e| write_error(path, e.error))?;
        Ok(())
    }
}

fn write_error(path: &Path, source: io::Error) -> PipelineError {
    PipelineError::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// Plain-text rendering for reading through the results by hand.
fn render_digest(collection: &PositiveCollection) -> String {
    let separator = format!("{}\n", "=".repeat(SEPARATOR_WIDTH));

    collection
        .comments
        .iter()
        .map(|comment| {
            format!(
                "Author: {}\nDate: {}\nText: {}\nLink: {}\n",
                comment.author,
                comment.datetime.as_deref().unwrap_or("unknown"),
                comment.text,
                comment.link.as_deref().unwrap_or("unknown"),
            )
        })
        .collect::<Vec<_>>()
        .join(&separator)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::comments::Comment;

    fn scored(id: u64, text: &str, score: f32) -> ScoredComment {
        let comment = Comment::new(CommentId::from(id), "alice", text, "habr_comments")
            .with_article_url("https://habr.com/ru/articles/7/");
        ScoredComment::new(comment, score, 0.6)
    }

    #[test]
    fn only_positive_comments_are_written_sorted_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());

        let written = writer
            .write(
                "habr_comments",
                &[scored(10, "ten", 0.9), scored(9, "nine", 0.7), scored(8, "eight", 0.1)],
            )
            .unwrap();

        assert_eq!(written, 2);
        let collection = writer.read("habr_comments").unwrap().unwrap();
        let ids: Vec<&str> = collection.comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["9", "10"]);
        assert_eq!(
            collection.comments[0].link.as_deref(),
            Some("https://habr.com/ru/articles/7/comments/#comment_9")
        );
    }

    #[test]
    fn rewriting_upserts_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());

        writer
            .write("habr_comments", &[scored(1, "old", 0.9), scored(2, "kept", 0.8)])
            .unwrap();
        writer
            .write("habr_comments", &[scored(1, "new", 0.95)])
            .unwrap();

        let collection = writer.read("habr_comments").unwrap().unwrap();
        let texts: Vec<&str> = collection.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["new", "kept"]);
    }

    #[test]
    fn duplicate_ids_in_one_write_keep_the_last() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());

        writer
            .write("habr_comments", &[scored(1, "first", 0.9), scored(1, "second", 0.9)])
            .unwrap();

        let collection = writer.read("habr_comments").unwrap().unwrap();
        assert_eq!(collection.comments.len(), 1);
        assert_eq!(collection.comments[0].text, "second");
    }

    #[test]
    fn digest_separates_comments() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());
        writer
            .write("habr_comments", &[scored(1, "one", 0.9), scored(2, "two", 0.9)])
            .unwrap();

        let digest = std::fs::read_to_string(writer.digest_path("habr_comments")).unwrap();
        let expected = format!(
            "Author: alice\nDate: unknown\nText: one\nLink: https://habr.com/ru/articles/7/comments/#comment_1\n{}\nAuthor: alice\nDate: unknown\nText: two\nLink: https://habr.com/ru/articles/7/comments/#comment_2\n",
            "=".repeat(100)
        );
        assert_eq!(digest, expected);
    }

    #[test]
    fn empty_collection_has_an_empty_digest() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());
        writer.write("habr_comments", &[]).unwrap();

        let digest = std::fs::read_to_string(writer.digest_path("habr_comments")).unwrap();
        assert_eq!(digest, "");
    }

    #[test]
    fn corrupt_collection_is_a_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path());
        std::fs::write(writer.collection_path("habr_comments"), "not json").unwrap();

        assert!(matches!(
            writer.write("habr_comments", &[scored(1, "x", 0.9)]),
            Err(PipelineError::Write { .. })
        ));
    }
}
