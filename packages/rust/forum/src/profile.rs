//! Heuristic fact extraction from a single user profile page.
//!
//! Profile markup is not stable, so every field is located by loose text and
//! link patterns rather than fixed selectors. A field that cannot be found is
//! simply left unset.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use lobgraph_shared::UserUpsert;

use crate::markup::text_content;

static KARMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d[\d,]*)\s*karma").expect("karma regex"));
static MEMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)member\s+(?:since|for)").expect("member regex"));
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("date regex"));
static INVITED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)invited\s+by").expect("invited regex"));
static USER_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(?:u/|~)([a-zA-Z0-9_-]+)").expect("user href regex"));
static ABOUT_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)about|bio").expect("about class regex"));
static GITHUB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.)?github\.com/([a-zA-Z0-9_-]+)/?$").expect("github regex")
});
static TWITTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(?:www\.)?(?:twitter|x)\.com/([a-zA-Z0-9_]+)/?$")
        .expect("twitter regex")
});
static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector"));

/// Hosts that never count as a personal website, besides the forum itself.
const PLATFORM_HOSTS: &[&str] = &[
    "github.com",
    "twitter.com",
    "x.com",
    "linkedin.com",
    "reddit.com",
    "news.ycombinator.com",
];

/// Extracts a [`UserUpsert`] from profile page HTML.
#[derive(Debug, Clone)]
pub struct ProfileExtractor {
    forum_host: String,
}

impl ProfileExtractor {
    /// `forum_host` is excluded from website detection (e.g. `lobste.rs`).
    pub fn new(forum_host: impl Into<String>) -> Self {
        Self {
            forum_host: forum_host.into().to_ascii_lowercase(),
        }
    }

    /// Extract whatever facts the page offers. `scraped_at` is always set.
    pub fn extract(&self, html: &str, username: &str) -> UserUpsert {
        let doc = Html::parse_document(html);
        let root = doc.root_element();

        let mut facts = UserUpsert {
            username: username.to_string(),
            karma: extract_karma(root),
            created_at: extract_created_at(root),
            invited_by_username: extract_inviter(root),
            about: extract_about(root),
            ..Default::default()
        };

        for link in root.select(&LINK_SEL) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };

            if facts.github_username.is_none() {
                if let Some(caps) = GITHUB_RE.captures(href) {
                    facts.github_username = Some(caps[1].to_string());
                }
            }
            if facts.twitter_username.is_none() {
                if let Some(caps) = TWITTER_RE.captures(href) {
                    facts.twitter_username = Some(caps[1].to_string());
                }
            }
            if facts.website.is_none() && href.starts_with("http") && !self.is_platform(href) {
                facts.website = Some(href.to_string());
            }
        }

        facts.scraped_at = Some(Utc::now());
        debug!(
            username,
            karma = ?facts.karma,
            invited_by = ?facts.invited_by_username,
            "extracted profile"
        );
        facts
    }

    /// Whether the link points at a known platform or back at the forum.
    fn is_platform(&self, href: &str) -> bool {
        let Ok(url) = Url::parse(href) else {
            return true;
        };
        let Some(host) = url.host_str() else {
            return true;
        };
        let host = host.to_ascii_lowercase();

        PLATFORM_HOSTS
            .iter()
            .copied()
            .chain(std::iter::once(self.forum_host.as_str()))
            .any(|domain| host == domain || host.ends_with(&format!(".{domain}")))
    }
}

/// First text node matching `re`, paired with its parent element.
fn find_text<'a>(root: ElementRef<'a>, re: &Regex) -> Option<(&'a str, Option<ElementRef<'a>>)> {
    root.descendants().find_map(|node| {
        let text: &str = node.value().as_text()?;
        if !re.is_match(text) {
            return None;
        }
        Some((text, node.parent().and_then(ElementRef::wrap)))
    })
}

fn extract_karma(root: ElementRef<'_>) -> Option<i64> {
    let (text, _) = find_text(root, &KARMA_RE)?;
    let digits = KARMA_RE.captures(text)?.get(1)?.as_str().replace(',', "");
    digits.parse().ok()
}

fn extract_created_at(root: ElementRef<'_>) -> Option<String> {
    let (_, parent) = find_text(root, &MEMBER_RE)?;
    let text = text_content(parent?);
    DATE_RE.find(&text).map(|m| m.as_str().to_string())
}

fn extract_inviter(root: ElementRef<'_>) -> Option<String> {
    let (_, parent) = find_text(root, &INVITED_RE)?;
    parent?
        .select(&LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .find_map(|href| USER_HREF_RE.captures(href).map(|caps| caps[1].to_string()))
}

fn extract_about(root: ElementRef<'_>) -> Option<String> {
    let section = root
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().classes().any(|c| ABOUT_CLASS_RE.is_match(c)))?;
    let text = text_content(section);
    (!text.is_empty()).then_some(text)
}
