//! Parsed page model shared read-only by every rule.
//!
//! `scraper::Html` is neither `Send` nor `Sync`, so the document is copied
//! once into an owned element arena that rules can share across tasks.
//! Markup and text are serialized once for the whole document; elements
//! hold byte ranges into those shared buffers.

use scraper::{Html, Node};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Elements serialized without a closing tag
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text content is serialized unescaped
const RAW_TEXT_TAGS: &[&str] = &[
    "script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

/// Index of an element within a [`ParsedPage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(usize);

#[derive(Debug, PartialEq, Eq)]
struct Buffers {
    markup: String,
    text: String,
}

/// One element of the parsed document
#[derive(Clone, PartialEq, Eq)]
pub struct ElementNode {
    /// Lowercase tag name
    pub tag: String,
    /// Attributes in source order
    pub attrs: Vec<(String, String)>,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    markup: Range<usize>,
    text: Range<usize>,
    buffers: Arc<Buffers>,
}

impl fmt::Debug for ElementNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementNode")
            .field("tag", &self.tag)
            .field("attrs", &self.attrs)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl ElementNode {
    /// Attribute value, if present
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the attribute is present, whatever its value
    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    /// Attribute value if present and non-blank
    #[must_use]
    pub fn non_empty_attr(&self, name: &str) -> Option<&str> {
        self.attr(name).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Space-separated class list
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    /// Whether the tag is one of `tags`
    #[must_use]
    pub fn is_any(&self, tags: &[&str]) -> bool {
        tags.contains(&self.tag.as_str())
    }

    /// Outer HTML
    #[must_use]
    pub fn outer_html(&self) -> &str {
        self.buffers.markup.get(self.markup.clone()).unwrap_or_default()
    }

    /// Descendant text, whitespace-collapsed
    #[must_use]
    pub fn text(&self) -> &str {
        self.buffers
            .text
            .get(self.text.clone())
            .unwrap_or_default()
            .trim_start()
    }
}

struct Draft {
    tag: String,
    attrs: Vec<(String, String)>,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    markup: Range<usize>,
    text: Range<usize>,
}

enum Walk<N> {
    Enter(N, Option<ElementId>),
    Leave(ElementId),
}

/// A parsed document plus the URL it was fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPage {
    url: Option<String>,
    nodes: Vec<ElementNode>,
}

impl ParsedPage {
    /// Parse an HTML document
    #[must_use]
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut markup = String::with_capacity(html.len());
        let mut text = String::new();
        let mut drafts: Vec<Draft> = Vec::new();
        let mut stack = vec![Walk::Enter(*document.root_element(), None)];

        while let Some(step) = stack.pop() {
            match step {
                Walk::Leave(id) => {
                    let draft = &mut drafts[id.0];
                    if !VOID_TAGS.contains(&draft.tag.as_str()) {
                        markup.push_str("</");
                        markup.push_str(&draft.tag);
                        markup.push('>');
                    }
                    draft.markup.end = markup.len();
                    draft.text.end = text.len();
                }
                Walk::Enter(node, parent) => match node.value() {
                    Node::Element(element) => {
                        let id = ElementId(drafts.len());
                        let start = markup.len();
                        let tag = element.name().to_ascii_lowercase();
                        markup.push('<');
                        markup.push_str(&tag);
                        for (key, value) in element.attrs() {
                            markup.push(' ');
                            markup.push_str(key);
                            markup.push_str("=\"");
                            escape_into(&mut markup, value, true);
                            markup.push('"');
                        }
                        markup.push('>');

                        drafts.push(Draft {
                            tag,
                            attrs: element
                                .attrs()
                                .map(|(k, v)| (k.to_string(), v.to_string()))
                                .collect(),
                            parent,
                            children: Vec::new(),
                            markup: start..start,
                            text: text.len()..text.len(),
                        });
                        if let Some(ElementId(p)) = parent {
                            drafts[p].children.push(id);
                        }
                        stack.push(Walk::Leave(id));
                        let children: Vec<_> = node.children().collect();
                        stack.extend(children.into_iter().rev().map(|child| Walk::Enter(child, Some(id))));
                    }
                    Node::Text(chunk) => {
                        let raw = parent.is_some_and(|p| RAW_TEXT_TAGS.contains(&drafts[p.0].tag.as_str()));
                        if raw {
                            markup.push_str(chunk);
                        } else {
                            escape_into(&mut markup, chunk, false);
                        }
                        for word in chunk.split_whitespace() {
                            if !text.is_empty() {
                                text.push(' ');
                            }
                            text.push_str(word);
                        }
                    }
                    Node::Comment(comment) => {
                        markup.push_str("<!--");
                        markup.push_str(comment);
                        markup.push_str("-->");
                    }
                    _ => {}
                },
            }
        }

        let buffers = Arc::new(Buffers { markup, text });
        let nodes = drafts
            .into_iter()
            .map(|draft| ElementNode {
                tag: draft.tag,
                attrs: draft.attrs,
                parent: draft.parent,
                children: draft.children,
                markup: draft.markup,
                text: draft.text,
                buffers: Arc::clone(&buffers),
            })
            .collect();

        Self { url: None, nodes }
    }

    /// Attach the URL the page was fetched from
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Source URL, if known
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the page has no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The `<html>` element
    #[must_use]
    pub fn root(&self) -> Option<ElementId> {
        (!self.nodes.is_empty()).then_some(ElementId(0))
    }

    /// Element by id
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this page.
    #[must_use]
    pub fn element(&self, id: ElementId) -> &ElementNode {
        &self.nodes[id.0]
    }

    /// Parent element
    #[must_use]
    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes[id.0].parent
    }

    /// Child elements in document order
    #[must_use]
    pub fn children(&self, id: ElementId) -> &[ElementId] {
        &self.nodes[id.0].children
    }

    /// All elements in document order
    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &ElementNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (ElementId(i), n))
    }

    /// Elements whose tag is one of `tags`, in document order
    #[must_use]
    pub fn select(&self, tags: &[&str]) -> Vec<(ElementId, &ElementNode)> {
        self.elements().filter(|(_, n)| n.is_any(tags)).collect()
    }

    /// Count of elements whose tag is one of `tags`
    #[must_use]
    pub fn count(&self, tags: &[&str]) -> usize {
        self.nodes.iter().filter(|n| n.is_any(tags)).count()
    }

    /// Strict descendants of `id` in document order
    pub fn descendants(&self, id: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        let mut stack: Vec<ElementId> = self.children(id).iter().rev().copied().collect();
        std::iter::from_fn(move || {
            let next = stack.pop()?;
            stack.extend(self.children(next).iter().rev().copied());
            Some(next)
        })
    }

    /// Nearest strict ancestor whose tag is one of `tags`
    #[must_use]
    pub fn closest(&self, id: ElementId, tags: &[&str]) -> Option<ElementId> {
        let mut current = self.parent(id);
        while let Some(ancestor) = current {
            if self.element(ancestor).is_any(tags) {
                return Some(ancestor);
            }
            current = self.parent(ancestor);
        }
        None
    }

    /// 1-based position among siblings sharing the same tag
    #[must_use]
    pub fn nth_of_type(&self, id: ElementId) -> usize {
        let tag = &self.element(id).tag;
        match self.parent(id) {
            Some(parent) => {
                self.children(parent)
                    .iter()
                    .take_while(|sibling| **sibling != id)
                    .filter(|sibling| &self.element(**sibling).tag == tag)
                    .count()
                    + 1
            }
            None => 1,
        }
    }

    /// CSS path locating `id`.
    ///
    /// Walks towards `<html>`, emitting `tag#id` (and stopping), `tag.class`
    /// or `tag:nth-of-type(n)` per step.
    #[must_use]
    pub fn css_selector(&self, id: ElementId) -> String {
        let mut steps: Vec<String> = Vec::new();
        let mut current = Some(id);

        while let Some(node_id) = current {
            let node = self.element(node_id);
            if node.tag == "html" {
                break;
            }
            if let Some(html_id) = node.non_empty_attr("id") {
                steps.push(format!("{}#{html_id}", node.tag));
                break;
            }
            let classes: Vec<&str> = node.classes().collect();
            if classes.is_empty() {
                steps.push(format!("{}:nth-of-type({})", node.tag, self.nth_of_type(node_id)));
            } else {
                steps.push(format!("{}.{}", node.tag, classes.join(".")));
            }
            current = self.parent(node_id);
        }

        if steps.is_empty() {
            return self.element(id).tag.clone();
        }
        steps.reverse();
        steps.join(" > ")
    }
}

fn escape_into(out: &mut String, value: &str, in_attribute: bool) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if in_attribute => out.push_str("&quot;"),
            '<' if !in_attribute => out.push_str("&lt;"),
            '>' if !in_attribute => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><title>Sample</title></head>
<body>
  <div id="main">
    <p>First <b>bold</b> text</p>
    <p class="note  small">Second</p>
  </div>
  <ul><li>One</li><li>Two</li></ul>
</body>
</html>"#;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_document_order() {
            let page = ParsedPage::parse(SAMPLE);
            let tags: Vec<&str> = page.elements().map(|(_, n)| n.tag.as_str()).collect();
            assert_eq!(
                tags,
                vec!["html", "head", "title", "body", "div", "p", "b", "p", "ul", "li", "li"]
            );
        }

        #[test]
        fn test_attributes_and_text() {
            let page = ParsedPage::parse(SAMPLE);
            let root = page.root().unwrap();
            assert_eq!(page.element(root).attr("lang"), Some("en"));
            let (_, p) = page.select(&["p"]).first().copied().unwrap();
            assert_eq!(p.text(), "First bold text");
            assert_eq!(p.outer_html(), "<p>First <b>bold</b> text</p>");
        }

        #[test]
        fn test_nested_elements_share_one_copy() {
            let page = ParsedPage::parse(SAMPLE);
            let (body, _) = page.select(&["body"]).first().copied().unwrap();
            let (b, _) = page.select(&["b"]).first().copied().unwrap();
            let body = page.element(body);
            let b = page.element(b);
            assert!(Arc::ptr_eq(&body.buffers, &b.buffers));
            assert!(body.outer_html().contains(b.outer_html()));
            assert_eq!(b.outer_html(), "<b>bold</b>");
            assert_eq!(body.text(), "First bold text Second One Two");
        }

        #[test]
        fn test_markup_is_escaped() {
            let page = ParsedPage::parse(
                r#"<p title="say &quot;hi&quot;">1 &lt; 2<br>x</p><script>if (a < b) {}</script>"#,
            );
            let (_, p) = page.select(&["p"]).first().copied().unwrap();
            assert_eq!(p.outer_html(), r#"<p title="say &quot;hi&quot;">1 &lt; 2<br>x</p>"#);
            let (_, script) = page.select(&["script"]).first().copied().unwrap();
            assert_eq!(script.outer_html(), "<script>if (a < b) {}</script>");
        }

        #[test]
        fn test_parent_and_closest() {
            let page = ParsedPage::parse(SAMPLE);
            let (b, _) = page.select(&["b"]).first().copied().unwrap();
            let div = page.closest(b, &["div"]).unwrap();
            assert_eq!(page.element(div).attr("id"), Some("main"));
            assert!(page.closest(b, &["nav"]).is_none());
        }

        #[test]
        fn test_descendants() {
            let page = ParsedPage::parse(SAMPLE);
            let (ul, _) = page.select(&["ul"]).first().copied().unwrap();
            assert_eq!(page.descendants(ul).count(), 2);
        }

        #[test]
        fn test_fragment_is_wrapped() {
            let page = ParsedPage::parse("<img src=a.png>");
            assert_eq!(page.count(&["img"]), 1);
            assert_eq!(page.count(&["html"]), 1);
        }
    }

    mod selector_tests {
        use super::*;

        #[test]
        fn test_id_stops_walk() {
            let page = ParsedPage::parse(SAMPLE);
            let (b, _) = page.select(&["b"]).first().copied().unwrap();
            assert_eq!(
                page.css_selector(b),
                "div#main > p:nth-of-type(1) > b:nth-of-type(1)"
            );
        }

        #[test]
        fn test_classes_joined() {
            let page = ParsedPage::parse(SAMPLE);
            let (p, _) = page.select(&["p"]).get(1).copied().unwrap();
            assert_eq!(page.css_selector(p), "div#main > p.note.small");
        }

        #[test]
        fn test_nth_of_type() {
            let page = ParsedPage::parse(SAMPLE);
            let (li, _) = page.select(&["li"]).get(1).copied().unwrap();
            assert_eq!(
                page.css_selector(li),
                "body:nth-of-type(1) > ul:nth-of-type(1) > li:nth-of-type(2)"
            );
        }

        #[test]
        fn test_html_element_selector() {
            let page = ParsedPage::parse(SAMPLE);
            assert_eq!(page.css_selector(page.root().unwrap()), "html");
        }
    }

    #[test]
    fn test_url_attachment() {
        let page = ParsedPage::parse(SAMPLE).with_url("https://example.com/");
        assert_eq!(page.url(), Some("https://example.com/"));
    }
}
