//! Invitation tree reconstruction from the forum's nested user list.
//!
//! The users page nests `<ul class="user_tree">` lists: every `<li>` holds the
//! user's link followed by `(karma)`, and optionally a nested `user_tree` list
//! with the users that person invited.
//!
//! ```html
//! <ul class="user_tree">
//!   <li><a href="/~root">root</a> (100)
//!     <ul class="user_tree">
//!       <li><a href="/~child" class="inactive_user">child</a> (5)</li>
//!     </ul>
//!   </li>
//! </ul>
//! ```

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use crate::markup::{child_elements, find_descendant, has_class, text_excluding};

/// Class shared by the root list and every nested invitee list.
const TREE_CLASS: &str = "user_tree";

/// Class the forum puts on links of deleted or banned accounts.
const INACTIVE_CLASS: &str = "inactive_user";

static TREE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("ul.user_tree").expect("user_tree selector"));

/// Profile link target: `/~name` or `/u/name`.
static PROFILE_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(?:~|u/)([^/?#]+)").expect("profile href regex"));

/// One user found in the tree, with its nearest enclosing entry as inviter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFact {
    pub username: String,
    /// Karma shown next to the name; 0 when absent.
    pub karma: i64,
    /// `None` for top-level entries (roots of the forest).
    pub invited_by: Option<String>,
    pub inactive: bool,
}

/// Outcome of parsing a users page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeParse {
    /// The tree container was present; facts are in document pre-order.
    Found(Vec<TreeFact>),
    /// No `ul.user_tree` in the document.
    NotFound,
}

impl TreeParse {
    /// The parsed facts, empty when the tree was not found.
    pub fn into_facts(self) -> Vec<TreeFact> {
        match self {
            Self::Found(facts) => facts,
            Self::NotFound => Vec::new(),
        }
    }
}

/// Flatten the invitation tree into per-user facts.
///
/// Entries without an extractable username are skipped together with
/// their nested list. Duplicate usernames in different branches each
/// produce a fact.
pub fn parse_user_tree(html: &str) -> TreeParse {
    let doc = Html::parse_document(html);

    let Some(root) = doc.select(&TREE_SEL).next() else {
        info!("no user_tree element in document");
        return TreeParse::NotFound;
    };

    let mut facts = Vec::new();
    let mut skipped = 0usize;

    // Explicit stack; children are pushed reversed to keep pre-order.
    let mut stack: Vec<(ElementRef<'_>, Option<String>)> = child_elements(root, "li", None)
        .map(|li| (li, None))
        .collect();
    stack.reverse();

    while let Some((li, inviter)) = stack.pop() {
        let Some(link) = entry_link(li) else {
            skipped += 1;
            continue;
        };
        let Some(username) = username_of(&link) else {
            skipped += 1;
            continue;
        };

        let karma = entry_karma(li, &username);
        let inactive = has_class(&link, INACTIVE_CLASS);

        if let Some(nested) = child_elements(li, "ul", Some(TREE_CLASS)).next() {
            let mut children: Vec<_> = child_elements(nested, "li", None)
                .map(|child| (child, Some(username.clone())))
                .collect();
            children.reverse();
            stack.extend(children);
        }

        facts.push(TreeFact {
            username,
            karma,
            invited_by: inviter,
            inactive,
        });
    }

    debug!(users = facts.len(), skipped, "parsed user tree");
    TreeParse::Found(facts)
}

fn is_nested_tree(el: &ElementRef<'_>) -> bool {
    el.value().name() == "ul" && has_class(el, TREE_CLASS)
}

fn is_user_link(el: &ElementRef<'_>) -> bool {
    if el.value().name() != "a" {
        return false;
    }
    let named = el.value().attr("name").is_some_and(|n| !n.trim().is_empty());
    let profile = el
        .value()
        .attr("href")
        .is_some_and(|h| PROFILE_HREF_RE.is_match(h));
    named || profile
}

/// The entry's own user link: a direct child first, then any descendant
/// outside the nested invitee list.
fn entry_link(li: ElementRef<'_>) -> Option<ElementRef<'_>> {
    li.children()
        .filter_map(ElementRef::wrap)
        .find(is_user_link)
        .or_else(|| find_descendant(li, &is_user_link, &is_nested_tree))
}

/// Username from the link's `name` attribute, falling back to its target.
fn username_of(link: &ElementRef<'_>) -> Option<String> {
    if let Some(name) = link.value().attr("name") {
        let name = name.trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    let href = link.value().attr("href")?;
    PROFILE_HREF_RE
        .captures(href)
        .map(|caps| caps[1].to_string())
        .filter(|name| !name.is_empty())
}

/// Karma in `username (123)` form within the entry's own text.
fn entry_karma(li: ElementRef<'_>, username: &str) -> i64 {
    let text = text_excluding(li, &is_nested_tree);
    let Ok(re) = Regex::new(&format!(r"{}\s*\((\d+)\)", regex::escape(username))) else {
        return 0;
    };
    re.captures(&text)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(username: &str, karma: i64, invited_by: Option<&str>) -> TreeFact {
        TreeFact {
            username: username.into(),
            karma,
            invited_by: invited_by.map(String::from),
            inactive: false,
        }
    }

    #[test]
    fn two_level_tree() {
        let html = r#"<ul class="user_tree"><li><a name="root">root</a> (100)<ul class="user_tree"><li><a name="child">child</a> (5)</li></ul></li></ul>"#;
        let facts = parse_user_tree(html).into_facts();
        assert_eq!(
            facts,
            vec![fact("root", 100, None), fact("child", 5, Some("root"))]
        );
    }

    #[test]
    fn missing_container_is_not_found() {
        let html = "<html><body><p>rate limited</p></body></html>";
        assert_eq!(parse_user_tree(html), TreeParse::NotFound);
        assert!(parse_user_tree(html).into_facts().is_empty());
    }

    #[test]
    fn href_used_when_name_missing() {
        let html = r#"<ul class="user_tree"><li><a href="/~alice">alice</a> (7)</li><li><a href="/u/bob">bob</a> (3)</li></ul>"#;
        let facts = parse_user_tree(html).into_facts();
        assert_eq!(facts, vec![fact("alice", 7, None), fact("bob", 3, None)]);
    }

    #[test]
    fn name_attribute_takes_precedence() {
        let html = r#"<ul class="user_tree"><li><a name="real" href="/~other">real</a> (1)</li></ul>"#;
        let facts = parse_user_tree(html).into_facts();
        assert_eq!(facts[0].username, "real");
    }

    #[test]
    fn karma_defaults_to_zero() {
        let html = r#"<ul class="user_tree"><li><a href="/~quiet">quiet</a></li></ul>"#;
        let facts = parse_user_tree(html).into_facts();
        assert_eq!(facts, vec![fact("quiet", 0, None)]);
    }

    #[test]
    fn inactive_flag_from_link_class() {
        let html = r#"<ul class="user_tree"><li><a href="/~gone" class="inactive_user">gone</a> (2)</li></ul>"#;
        let facts = parse_user_tree(html).into_facts();
        assert!(facts[0].inactive);
    }

    #[test]
    fn malformed_entry_does_not_abort_siblings() {
        let html = r#"<ul class="user_tree">
            <li><a href="/~first">first</a> (1)</li>
            <li>no anchor here (99)</li>
            <li><a href="/~third">third</a> (3)
                <ul class="user_tree">
                    <li><span>still nothing</span></li>
                    <li><a href="/~deep">deep</a> (4)</li>
                </ul>
            </li>
        </ul>"#;
        let facts = parse_user_tree(html).into_facts();
        assert_eq!(
            facts,
            vec![
                fact("first", 1, None),
                fact("third", 3, None),
                fact("deep", 4, Some("third")),
            ]
        );
    }

    #[test]
    fn preorder_and_nearest_inviter() {
        let html = r#"<ul class="user_tree">
            <li><a href="/~a">a</a> (1)
                <ul class="user_tree">
                    <li><a href="/~b">b</a> (2)
                        <ul class="user_tree"><li><a href="/~c">c</a> (3)</li></ul>
                    </li>
                    <li><a href="/~d">d</a> (4)</li>
                </ul>
            </li>
            <li><a href="/~e">e</a> (5)</li>
        </ul>"#;
        let facts = parse_user_tree(html).into_facts();
        let order: Vec<(&str, Option<&str>)> = facts
            .iter()
            .map(|f| (f.username.as_str(), f.invited_by.as_deref()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a", None),
                ("b", Some("a")),
                ("c", Some("b")),
                ("d", Some("a")),
                ("e", None),
            ]
        );
    }

    #[test]
    fn karma_not_taken_from_nested_entries() {
        let html = r#"<ul class="user_tree"><li><a href="/~parent">parent</a>
            <ul class="user_tree"><li><a href="/~kid">kid</a> (8)</li></ul></li></ul>"#;
        let facts = parse_user_tree(html).into_facts();
        assert_eq!(facts[0], fact("parent", 0, None));
        assert_eq!(facts[1], fact("kid", 8, Some("parent")));
    }

    #[test]
    fn duplicate_usernames_are_kept() {
        let html = r#"<ul class="user_tree">
            <li><a href="/~x">x</a> (1)<ul class="user_tree"><li><a href="/~dup">dup</a> (2)</li></ul></li>
            <li><a href="/~y">y</a> (1)<ul class="user_tree"><li><a href="/~dup">dup</a> (2)</li></ul></li>
        </ul>"#;
        let facts = parse_user_tree(html).into_facts();
        let dups: Vec<_> = facts.iter().filter(|f| f.username == "dup").collect();
        assert_eq!(dups.len(), 2);
        assert_eq!(dups[0].invited_by.as_deref(), Some("x"));
        assert_eq!(dups[1].invited_by.as_deref(), Some("y"));
    }
}
