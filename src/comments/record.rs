use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

/// Identifier of a comment within its source, kept as written in the input.
///
/// Integer ids are stored in their decimal form. Two ids that are both unsigned integers order
/// numerically, anything else orders lexically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CommentId(String);

impl CommentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn as_number(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for CommentId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            _ => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for CommentId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CommentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for CommentId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for CommentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(serde_json::Number),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(n) => CommentId(n.to_string()),
            RawId::Text(s) => CommentId(s),
        })
    }
}

/// One user comment, read-only once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    id: CommentId,
    author: String,
    text: String,
    source: String,
    datetime: Option<String>,
    article_url: Option<String>,
}

impl Comment {
    pub fn new(
        id: CommentId,
        author: impl Into<String>,
        text: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id,
            author: author.into(),
            text: text.into(),
            source: source.into(),
            datetime: None,
            article_url: None,
        }
    }

    pub fn with_datetime(mut self, datetime: impl Into<String>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    pub fn with_article_url(mut self, article_url: impl Into<String>) -> Self {
        self.article_url = Some(article_url.into());
        self
    }

    pub fn id(&self) -> &CommentId {
        &self.id
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn datetime(&self) -> Option<&str> {
        self.datetime.as_deref()
    }

    pub fn article_url(&self) -> Option<&str> {
        self.article_url.as_deref()
    }
}

#[derive(Deserialize)]
struct RawComment {
    id: CommentId,
    author: String,
    text: String,
    #[serde(default)]
    datetime: Option<Value>,
}

/// Scraper export form: the article URL plus its comments.
#[derive(Deserialize)]
struct ArticleFile {
    #[serde(default)]
    url: Option<String>,
    comments: Vec<Value>,
}

/// A directory of `*.json` comment files, named after the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDir {
    name: String,
    path: PathBuf,
    files: Vec<PathBuf>,
}

impl SourceDir {
    /// Lists the `*.json` files of `path` in file-name order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Load`] if the directory cannot be listed or has no name.
    pub fn discover(path: &Path) -> Result<Self> {
        let name = source_name(path).ok_or_else(|| PipelineError::Load {
            path: path.to_path_buf(),
            reason: "path has no directory name".into(),
        })?;
        let entries = fs::read_dir(path).map_err(|e| PipelineError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            let file = entry.path();
            if file.is_file() && file.extension().is_some_and(|ext| ext == "json") {
                files.push(file);
            }
        }
        files.sort();

        Ok(Self {
            name,
            path: path.to_path_buf(),
            files,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Lazily yields the comments of every file, one file in memory at a time.
    pub fn comments(&self) -> CommentStream<'_> {
        CommentStream {
            source: &self.name,
            files: self.files.iter(),
            current: Vec::new().into_iter(),
            files_opened: 0,
        }
    }
}

/// Directory name used as the source name.
///
/// Paths such as `.` or `a/..` are resolved first. `None` for a filesystem root.
pub fn source_name(path: &Path) -> Option<String> {
    let name = match path.file_name() {
        Some(name) => name.to_os_string(),
        None => path.canonicalize().ok()?.file_name()?.to_os_string(),
    };
    Some(name.to_string_lossy().into_owned())
}

/// A comment, or the reason a file or record could not be read.
pub type LoadItem = std::result::Result<Comment, PipelineError>;

/// Single-pass iterator over the comments of a [`SourceDir`].
///
/// An unreadable file yields one error and the stream moves on to the next file.
pub struct CommentStream<'a> {
    source: &'a str,
    files: std::slice::Iter<'a, PathBuf>,
    current: std::vec::IntoIter<LoadItem>,
    files_opened: usize,
}

impl CommentStream<'_> {
    /// Files read so far.
    pub fn files_opened(&self) -> usize {
        self.files_opened
    }
}

impl Iterator for CommentStream<'_> {
    type Item = LoadItem;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.next() {
                return Some(item);
            }
            let file = self.files.next()?;
            self.files_opened += 1;
            tracing::debug!(source = self.source, file = %file.display(), "reading file");
            self.current = read_file(file, self.source).into_iter();
        }
    }
}

fn read_file(path: &Path, source: &str) -> Vec<LoadItem> {
    let load_error = |reason: String| PipelineError::Load {
        path: path.to_path_buf(),
        reason,
    };

    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => return vec![Err(load_error(e.to_string()))],
    };

    let (records, article_url) = match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Array(records)) => (records, None),
        Ok(value @ Value::Object(_)) => match serde_json::from_value::<ArticleFile>(value) {
            Ok(article) => (article.comments, article.url.filter(|url| !url.is_empty())),
            Err(e) => return vec![Err(load_error(format!("not a comment collection: {e}")))],
        },
        Ok(_) => {
            return vec![Err(load_error(
                "expected an array of comments or an object with 'comments'".into(),
            ))]
        }
        Err(e) => return vec![Err(load_error(format!("invalid JSON: {e}")))],
    };

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let raw: RawComment = serde_json::from_value(record)
                .map_err(|e| load_error(format!("record {index}: {e}")))?;

            let mut comment = Comment::new(raw.id, raw.author, raw.text, source);
            match raw.datetime {
                Some(Value::String(datetime)) => comment = comment.with_datetime(datetime),
                Some(Value::Null) | None => {}
                Some(other) => comment = comment.with_datetime(other.to_string()),
            }
            if let Some(url) = &article_url {
                comment = comment.with_article_url(url.clone());
            }
            Ok(comment)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numeric_ids_order_numerically() {
        let mut ids: Vec<CommentId> = ["10", "9", "abc", "100"]
            .into_iter()
            .map(CommentId::from)
            .collect();
        ids.sort();
        let sorted: Vec<&str> = ids.iter().map(CommentId::as_str).collect();
        assert_eq!(sorted, vec!["9", "10", "100", "abc"]);
    }

    #[test]
    fn integer_and_string_ids_are_accepted() {
        let ids: Vec<CommentId> = serde_json::from_str(r#"[42, "c-7"]"#).unwrap();
        assert_eq!(ids, vec![CommentId::from(42), CommentId::from("c-7")]);
    }

    #[test]
    fn article_form_attaches_the_url() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{"url": "https://habr.com/ru/articles/1/", "comments": [
                {"id": 1, "author": "x", "text": "hello", "datetime": "2025-10-01"}
            ]}"#,
        )
        .unwrap();

        let source = SourceDir::discover(dir.path()).unwrap();
        let comments: Vec<Comment> = source.comments().map(|c| c.unwrap()).collect();

        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].article_url(), Some("https://habr.com/ru/articles/1/"));
        assert_eq!(comments[0].datetime(), Some("2025-10-01"));
        assert_eq!(comments[0].source(), source.name());
    }

    #[test]
    fn malformed_records_and_files_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"[{"id": 1, "author": "x", "text": "ok"}, {"id": 2, "text": "no author"}]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("b.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = SourceDir::discover(dir.path()).unwrap();
        assert_eq!(source.files().len(), 2);

        let mut stream = source.comments();
        let items: Vec<LoadItem> = stream.by_ref().collect();
        assert_eq!(stream.files_opened(), 2);
        assert_eq!(items.iter().filter(|i| i.is_ok()).count(), 1);
        assert_eq!(items.iter().filter(|i| i.is_err()).count(), 2);
    }

    #[test]
    fn dot_path_is_named_after_the_resolved_directory() {
        let dir = tempfile::tempdir().unwrap();
        let habr = dir.path().join("habr_comments");
        fs::create_dir_all(habr.join("nested")).unwrap();

        assert_eq!(
            source_name(&habr.join("nested").join("..")).as_deref(),
            Some("habr_comments")
        );
        let expected = std::env::current_dir()
            .unwrap()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        assert_eq!(source_name(Path::new(".")), expected);
    }

    #[test]
    fn root_path_has_no_source_name() {
        assert_eq!(source_name(Path::new("/")), None);
        assert!(matches!(
            SourceDir::discover(Path::new("/")),
            Err(PipelineError::Load { .. })
        ));
    }

    #[test]
    fn missing_directory_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            SourceDir::discover(&missing),
            Err(PipelineError::Load { .. })
        ));
    }
}
