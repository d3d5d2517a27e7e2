//! Small element-tree helpers over `scraper`.
//!
//! The forum pages are walked as a generic tree of elements: direct children
//! filtered by tag and class, descendant search that can refuse to enter
//! certain subtrees, and text content.

use scraper::ElementRef;

/// Whether the element carries `class` in its class list.
pub fn has_class(el: &ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

/// Direct element children with the given tag and (optionally) class.
pub fn child_elements<'a>(
    el: ElementRef<'a>,
    tag: &'a str,
    class: Option<&'a str>,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.children()
        .filter_map(ElementRef::wrap)
        .filter(move |child| child.value().name() == tag)
        .filter(move |child| class.is_none_or(|c| has_class(child, c)))
}

/// First descendant (document pre-order) matching `pred`, never entering
/// subtrees whose root matches `skip`.
pub fn find_descendant<'a>(
    el: ElementRef<'a>,
    pred: &dyn Fn(&ElementRef<'a>) -> bool,
    skip: &dyn Fn(&ElementRef<'a>) -> bool,
) -> Option<ElementRef<'a>> {
    let mut stack: Vec<ElementRef<'a>> = el.children().filter_map(ElementRef::wrap).collect();
    stack.reverse();

    while let Some(node) = stack.pop() {
        if skip(&node) {
            continue;
        }
        if pred(&node) {
            return Some(node);
        }
        let mut children: Vec<ElementRef<'a>> =
            node.children().filter_map(ElementRef::wrap).collect();
        children.reverse();
        stack.extend(children);
    }
    None
}

/// Concatenated text of the element, trimmed.
pub fn text_content(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Concatenated text of the element, leaving out subtrees matching `skip`.
pub fn text_excluding<'a>(el: ElementRef<'a>, skip: &dyn Fn(&ElementRef<'a>) -> bool) -> String {
    let mut out = String::new();
    collect_text(el, skip, &mut out);
    out
}

fn collect_text<'a>(el: ElementRef<'a>, skip: &dyn Fn(&ElementRef<'a>) -> bool, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if !skip(&child_el) {
                collect_text(child_el, skip, out);
            }
        }
    }
}
