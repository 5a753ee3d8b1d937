//! Permalinks to comments on the forums the scrapers export from.

/// Builds the permalink of comment `id`, when the source is a known forum.
///
/// The forum is recognised from the source name: `habr`, `smart-lab`, `t-j` / `tj`.
pub fn comment_link(source: &str, article_url: Option<&str>, id: &str) -> Option<String> {
    let source = source.to_lowercase();
    let url = article_url.filter(|url| !url.is_empty())?;

    if source.contains("habr") {
        let article = segment_after(url, "habr.com", "/articles/", "/")?;
        Some(format!(
            "https://habr.com/ru/articles/{article}/comments/#comment_{id}"
        ))
    } else if source.contains("smart-lab") {
        let article = segment_after(url, "smart-lab.ru", "/blog/", ".php")?;
        Some(format!("https://smart-lab.ru/blog/{article}.php#comment{id}"))
    } else if source.contains("t-j") || source.contains("tj") {
        let base = url.split('#').next().unwrap_or(url).trim_end_matches('/');
        Some(format!("{base}/#c{id}"))
    } else {
        None
    }
}

/// The part of `url` between the last `marker` and the next `end`, if `url` is on `host`.
fn segment_after<'a>(url: &'a str, host: &str, marker: &str, end: &str) -> Option<&'a str> {
    if !url.contains(host) {
        return None;
    }
    let tail = url.rsplit(marker).next()?;
    let segment = tail.split(end).next()?;
    (!segment.is_empty()).then_some(segment)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::habr(
        "habr_comments",
        "https://habr.com/ru/articles/946342/",
        "123",
        Some("https://habr.com/ru/articles/946342/comments/#comment_123")
    )]
    #[case::smart_lab(
        "smart-lab_comments",
        "https://smart-lab.ru/blog/1208000.php",
        "55",
        Some("https://smart-lab.ru/blog/1208000.php#comment55")
    )]
    #[case::tj(
        "t-j_comments",
        "https://t-j.ru/guide/some-article/#comments",
        "9",
        Some("https://t-j.ru/guide/some-article/#c9")
    )]
    #[case::habr_foreign_url("habr_comments", "https://example.com/x", "1", None)]
    #[case::unknown_source("forum", "https://forum.example/1", "1", None)]
    fn links(
        #[case] source: &str,
        #[case] url: &str,
        #[case] id: &str,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(
            comment_link(source, Some(url), id),
            expected.map(String::from)
        );
    }

    #[test]
    fn no_article_url_means_no_link() {
        assert_eq!(comment_link("t-j_comments", None, "1"), None);
    }
}
