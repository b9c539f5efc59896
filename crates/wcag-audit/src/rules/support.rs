//! Heuristics shared by several rule families.

use crate::page::{ElementId, ElementNode, ParsedPage};
use regex::Regex;
use std::sync::OnceLock;

/// Alt texts that describe nothing
pub const PLACEHOLDER_ALT_TEXTS: &[&str] = &[
    "image",
    "photo",
    "picture",
    "graphic",
    "example image",
    "image description",
];

/// Minimum length of meaningful alt text
pub const MIN_ALT_LENGTH: usize = 3;

/// Link texts that do not identify a destination
pub const GENERIC_LINK_TEXTS: &[&str] = &["click here", "read more", "learn more", "details", "more"];

/// Link texts that do not identify a destination out of context
pub const NON_DESCRIPTIVE_LINK_TEXTS: &[&str] = &["click here", "read more", "learn more", "here", "more"];

/// Tags counted by markup-wide checks
pub const CHECKED_TAGS: &[&str] = &[
    "img", "svg", "picture", "figure", "video", "audio", "source", "track", "input", "textarea",
    "select", "button", "label",
];

/// ARIA roles counted by markup-wide checks
pub const CHECKED_ROLES: &[&str] = &["img", "button", "checkbox", "link"];

/// Heading tags
pub const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

#[allow(clippy::expect_used)]
fn page_lang_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z]{2,3}(-[a-zA-Z]{2})?$").expect("valid pattern"))
}

#[allow(clippy::expect_used)]
fn part_lang_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z]{2,3}(-[a-zA-Z]{2,4})?$").expect("valid pattern"))
}

/// Whether `tag` is a valid document language tag, e.g. `en` or `en-GB`
#[must_use]
pub fn is_valid_page_lang(tag: &str) -> bool {
    page_lang_pattern().is_match(tag.trim())
}

/// Whether `tag` is a valid passage language tag; also accepts script subtags
#[must_use]
pub fn is_valid_part_lang(tag: &str) -> bool {
    part_lang_pattern().is_match(tag.trim())
}

/// Whether `node` counts towards markup-wide element totals
#[must_use]
pub fn is_checkable(node: &ElementNode) -> bool {
    node.is_any(CHECKED_TAGS)
        || node
            .attr("role")
            .is_some_and(|role| CHECKED_ROLES.contains(&role.trim()))
}

/// Media, form and role-bearing elements on the page
#[must_use]
pub fn total_checked_elements(page: &ParsedPage) -> usize {
    page.elements().filter(|(_, n)| is_checkable(n)).count()
}

/// Image that is interactive or carries information
#[must_use]
pub fn is_functional_or_informative(page: &ParsedPage, img: ElementId) -> bool {
    let node = page.element(img);
    let interactive = page
        .parent(img)
        .is_some_and(|p| page.element(p).is_any(&["a", "button"]))
        || node.has_attr("onclick");
    let informative = node.has_attr("src") && !node.has_attr("aria-hidden");
    interactive || informative
}

/// Alt text that names a kind of content rather than the content
#[must_use]
pub fn is_placeholder_alt(alt: &str) -> bool {
    let lower = alt.trim().to_lowercase();
    PLACEHOLDER_ALT_TEXTS.contains(&lower.as_str())
}

/// Alt text long enough to say something
#[must_use]
pub fn is_alt_sufficient(alt: &str) -> bool {
    alt.trim().chars().count() >= MIN_ALT_LENGTH
}

/// Case-insensitive membership in a phrase list
#[must_use]
pub fn matches_phrase(text: &str, phrases: &[&str]) -> bool {
    let text = text.trim();
    phrases.iter().any(|p| p.eq_ignore_ascii_case(text))
}

/// Heading or label text that identifies its subject
#[must_use]
pub fn is_descriptive(text: &str) -> bool {
    let text = text.trim();
    text.chars().count() > 3 && !text.chars().any(|c| c.is_ascii_digit())
}

/// Whether any descendant of `id` satisfies `predicate`
pub fn has_descendant(
    page: &ParsedPage,
    id: ElementId,
    predicate: impl Fn(&ElementNode) -> bool,
) -> bool {
    page.descendants(id).any(|d| predicate(page.element(d)))
}

/// Accessible name supplied through ARIA
#[must_use]
pub fn has_aria_name(node: &ElementNode) -> bool {
    node.non_empty_attr("aria-label").is_some() || node.non_empty_attr("aria-labelledby").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_tags() {
        assert!(is_valid_page_lang("en"));
        assert!(is_valid_page_lang("en-GB"));
        assert!(!is_valid_page_lang("english"));
        assert!(!is_valid_page_lang("zh-Hans"));
        assert!(is_valid_part_lang("zh-Hans"));
        assert!(!is_valid_part_lang(""));
    }

    #[test]
    fn test_alt_heuristics() {
        assert!(is_placeholder_alt(" Photo "));
        assert!(!is_placeholder_alt("Team photo at the 2023 offsite"));
        assert!(!is_alt_sufficient("ab"));
        assert!(is_alt_sufficient("map"));
    }

    #[test]
    fn test_descriptive_text() {
        assert!(is_descriptive("Shipping address"));
        assert!(!is_descriptive("Go"));
        assert!(!is_descriptive("Step 2"));
    }

    #[test]
    fn test_total_checked_counts_roles() {
        let page = ParsedPage::parse(
            r#"<img src=a><div role="button">x</div><span role="note">y</span><input>"#,
        );
        assert_eq!(total_checked_elements(&page), 3);
    }

    #[test]
    fn test_functional_image() {
        let page = ParsedPage::parse(r#"<a href="/"><img></a><img aria-hidden="true" src="x">"#);
        let images = page.select(&["img"]);
        assert!(is_functional_or_informative(&page, images[0].0));
        assert!(!is_functional_or_informative(&page, images[1].0));
    }
}
