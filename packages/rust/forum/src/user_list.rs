//! Username discovery from a saved users listing page.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector"));

/// An exact profile link: `/~name` or `/u/name` with nothing after it.
static PROFILE_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(?:u/|~)([a-zA-Z0-9_-]+)$").expect("profile link regex"));

/// Every distinct username linked from the page, in first-seen order.
pub fn parse_user_list(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();

    doc.select(&LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| PROFILE_LINK_RE.captures(href))
        .map(|caps| caps[1].to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupes_and_keeps_order() {
        let html = r#"
            <a href="/~bob">bob</a>
            <a href="/u/alice">alice</a>
            <a href="/~bob">bob again</a>
            <a href="/~bob/stories">stories</a>
            <a href="https://lobste.rs/~remote">absolute</a>
            <a href="/t/rust">tag</a>
        "#;
        assert_eq!(parse_user_list(html), vec!["bob", "alice"]);
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(parse_user_list("<html></html>").is_empty());
    }
}
