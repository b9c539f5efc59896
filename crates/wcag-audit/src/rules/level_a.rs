//! Level A success criteria.

use super::support::{
    has_aria_name, has_descendant, is_alt_sufficient, is_functional_or_informative,
    is_placeholder_alt, is_valid_page_lang, matches_phrase, total_checked_elements,
    GENERIC_LINK_TEXTS,
};
use crate::level::ConformanceLevel;
use crate::page::ParsedPage;
use crate::result::{AuditError, AuditResult};
use crate::rule::{require_session, DomRule, IssueRecord, RuleDescriptor, RuleEvaluator, RuleOutcome};
use crate::session::BrowserSession;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Rule name of "Non-text content"
pub const NON_TEXT_CONTENT: &str = "Non-text content";
/// Rule name of "Audio-only and video-only"
pub const AUDIO_VIDEO_ONLY: &str = "Audio-only and video-only";
/// Rule name of "Audio control"
pub const AUDIO_CONTROL: &str = "Audio control";
/// Rule name of "Bypass blocks"
pub const BYPASS_BLOCKS: &str = "Bypass blocks";
/// Rule name of "Page titled"
pub const PAGE_TITLED: &str = "Page titled";
/// Rule name of "Link purpose (in context)"
pub const LINK_PURPOSE_IN_CONTEXT: &str = "Link purpose (in context)";
/// Rule name of "Language of page"
pub const LANGUAGE_OF_PAGE: &str = "Language of page";

/// Anchors accepted as skip-link targets
const SKIP_LINK_TARGETS: &[&str] = &[
    "#main",
    "#content",
    "#main-content",
    "#primary",
    "#skiptarget",
    "#main-wrapper",
    "#maincontent",
];

const SKIP_LINK: &str = "First interactive item must be a skip link to main content";

/// Level A rules in report order
#[must_use]
pub fn descriptors() -> Vec<RuleDescriptor> {
    let a = ConformanceLevel::A;
    vec![
        RuleDescriptor::dom(NON_TEXT_CONTENT, "1.1.1 Non-text Content", a, Arc::new(DomRule(non_text_content))),
        RuleDescriptor::dom(
            AUDIO_VIDEO_ONLY,
            "1.2.1 Audio-only and Video-only (Prerecorded)",
            a,
            Arc::new(DomRule(audio_video_only)),
        ),
        RuleDescriptor::dom(AUDIO_CONTROL, "1.4.2 Audio Control", a, Arc::new(DomRule(audio_control))),
        RuleDescriptor::dom(BYPASS_BLOCKS, "2.4.1 Bypass Blocks", a, Arc::new(DomRule(bypass_blocks))),
        RuleDescriptor::session(PAGE_TITLED, "2.4.2 Page Titled", a, Arc::new(PageTitled)),
        RuleDescriptor::dom(
            LINK_PURPOSE_IN_CONTEXT,
            "2.4.4 Link Purpose (In Context)",
            a,
            Arc::new(DomRule(link_purpose_in_context)),
        ),
        RuleDescriptor::session(LANGUAGE_OF_PAGE, "3.1.1 Language of Page", a, Arc::new(LanguageOfPage)),
    ]
}

/// 1.1.1: images, media and inputs need text alternatives
pub fn non_text_content(page: &ParsedPage) -> AuditResult<RuleOutcome> {
    let mut issues = Vec::new();
    let mut seen_alts: HashSet<String> = HashSet::new();

    for (id, img) in page.select(&["img"]) {
        let Some(alt) = img.attr("alt").map(str::trim) else {
            issues.push(IssueRecord::at(page, id, "Missing alt attribute"));
            continue;
        };
        if alt.is_empty() {
            // alt="" marks a decorative image unless it does something
            if is_functional_or_informative(page, id) {
                issues.push(IssueRecord::at(page, id, "Empty alt text"));
            }
            continue;
        }
        if !seen_alts.insert(alt.to_string()) {
            issues.push(IssueRecord::at(page, id, "Duplicate alt text"));
        }
        if is_placeholder_alt(alt) {
            issues.push(IssueRecord::at(page, id, "Placeholder alt text"));
        }
        if !is_alt_sufficient(alt) {
            issues.push(IssueRecord::at(page, id, "Insufficient alt text"));
        }
    }

    for (id, _) in page.select(&["video"]) {
        let captioned = has_descendant(page, id, |n| {
            n.tag == "track" && matches!(n.attr("kind"), Some("subtitles" | "captions"))
        });
        if !captioned {
            issues.push(IssueRecord::at(page, id, "Missing captions/subtitles"));
        }
    }

    for (id, _) in page.select(&["audio"]) {
        let captioned = has_descendant(page, id, |n| n.tag == "track" && n.attr("kind") == Some("captions"));
        if !captioned {
            issues.push(IssueRecord::at(page, id, "Missing captions/transcripts"));
        }
    }

    let labelled_ids: HashSet<&str> = page
        .select(&["label"])
        .into_iter()
        .filter_map(|(_, label)| label.non_empty_attr("for"))
        .collect();
    for (id, input) in page.select(&["input"]) {
        if input.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")) {
            continue;
        }
        let labelled = has_aria_name(input)
            || input.non_empty_attr("id").is_some_and(|i| labelled_ids.contains(i))
            || page.closest(id, &["label"]).is_some();
        if !labelled {
            issues.push(IssueRecord::at(page, id, "Missing label for input field"));
        }
    }

    Ok(RuleOutcome::new(issues, total_checked_elements(page)))
}

/// 1.2.1: prerecorded audio needs a transcript, silent video an alternative
pub fn audio_video_only(page: &ParsedPage) -> AuditResult<RuleOutcome> {
    let mut issues = Vec::new();
    let media = page.select(&["audio", "video"]);

    for (id, node) in &media {
        if !node.has_attr("src") {
            continue;
        }
        if node.tag == "audio" {
            let has_alternative =
                node.non_empty_attr("alt").is_some() || node.non_empty_attr("title").is_some();
            if !has_alternative {
                issues.push(IssueRecord::at(page, *id, "Missing Text Alternative for Audio Content"));
            }
        } else if !has_descendant(page, *id, |n| n.tag == "track") {
            issues.push(IssueRecord::at(page, *id, "Missing Alternative for Video-only Content"));
        }
    }

    Ok(RuleOutcome::new(issues, media.len()))
}

/// 1.4.2: audio must not autoplay and must be controllable
pub fn audio_control(page: &ParsedPage) -> AuditResult<RuleOutcome> {
    let mut issues = Vec::new();
    let audios = page.select(&["audio"]);

    for (id, audio) in &audios {
        if audio.has_attr("autoplay") {
            issues.push(IssueRecord::at(page, *id, "Audio automatically plays for more than 3 seconds"));
        }
        let volume_control = has_descendant(page, *id, |n| {
            n.tag == "input" && n.attr("type") == Some("range") && n.attr("aria-label") == Some("volume")
        });
        if !audio.has_attr("controls") && !volume_control {
            issues.push(IssueRecord::at(
                page,
                *id,
                "No control mechanism to pause/stop or control audio volume",
            ));
        }
    }

    Ok(RuleOutcome::new(issues, audios.len()))
}

/// 2.4.1: menus sit in landmarks and a skip link comes first
pub fn bypass_blocks(page: &ParsedPage) -> AuditResult<RuleOutcome> {
    let mut issues = Vec::new();

    let menus: Vec<_> = page
        .elements()
        .filter(|(_, n)| n.attr("class").is_some_and(|c| c.contains("menu")))
        .collect();
    for (id, _) in &menus {
        if page.closest(*id, &["nav", "header", "aside"]).is_none() {
            issues.push(IssueRecord::at(page, *id, "Menu must be placed within a landmark region"));
        }
    }

    let first_interactive = page.elements().find(|(_, n)| {
        (n.tag == "a" && n.has_attr("href")) || n.is_any(&["button", "input", "select", "textarea"])
    });
    // Nothing to tab through means nothing to bypass
    if let (Some((_, node)), Some(root)) = (first_interactive, page.root()) {
        let href = node.attr("href").unwrap_or_default().trim();
        if node.tag == "a" && !SKIP_LINK_TARGETS.contains(&href) {
            issues.push(IssueRecord::at(page, root, SKIP_LINK).with_snippet(href));
        }
    }

    Ok(RuleOutcome::new(issues, menus.len() + usize::from(first_interactive.is_some())))
}

/// 2.4.4: link purpose is clear from its text or context
pub fn link_purpose_in_context(page: &ParsedPage) -> AuditResult<RuleOutcome> {
    let mut issues = Vec::new();
    let links: Vec<_> = page
        .select(&["a"])
        .into_iter()
        .filter(|(_, n)| n.has_attr("href"))
        .collect();

    for (id, link) in &links {
        let href = link.attr("href").unwrap_or_default();
        let text = link.text().trim();
        if text.is_empty() || matches_phrase(text, GENERIC_LINK_TEXTS) {
            issues.push(
                IssueRecord::at(page, *id, "Link text is empty or generic ('Click here').").with_snippet(href),
            );
            continue;
        }
        let described = has_aria_name(link)
            || link.non_empty_attr("aria-describedby").is_some()
            || link.non_empty_attr("title").is_some();
        let context = page.parent(*id).map(|p| page.element(p).text().trim()).unwrap_or_default();
        let surrounded = context.len() > text.len() && !matches_phrase(context, GENERIC_LINK_TEXTS);
        if !described && !surrounded {
            issues.push(IssueRecord::at(page, *id, "Link lacks sufficient programmatic context.").with_snippet(href));
        }
    }

    Ok(RuleOutcome::new(issues, links.len()))
}

/// 2.4.2: the rendered document has a descriptive title
#[derive(Debug, Clone, Copy, Default)]
pub struct PageTitled;

impl PageTitled {
    fn is_generic(title: &str) -> bool {
        let lower = title.to_lowercase();
        title == "Untitled" || lower.contains("index") || lower.contains("home")
    }
}

#[async_trait]
impl RuleEvaluator for PageTitled {
    async fn evaluate(
        &self,
        page: &ParsedPage,
        session: Option<&mut dyn BrowserSession>,
    ) -> AuditResult<RuleOutcome> {
        let session = require_session(PAGE_TITLED, session)?;
        let title = session.title().await?.unwrap_or_default();
        let title = title.trim();

        let anchor = page
            .select(&["title"])
            .first()
            .map(|(id, _)| *id)
            .or_else(|| page.root());
        let mut issues = Vec::new();
        if let Some(anchor) = anchor {
            if title.is_empty() {
                issues.push(IssueRecord::at(page, anchor, "No title found for the page.").with_snippet(title));
            } else if Self::is_generic(title) {
                issues.push(
                    IssueRecord::at(
                        page,
                        anchor,
                        "Title is not descriptive. Consider updating the title to reflect the content or purpose of the page.",
                    )
                    .with_snippet(title),
                );
            }
        }
        Ok(RuleOutcome::new(issues, 1))
    }
}

/// 3.1.1: the rendered `<html>` carries a valid `lang`
#[derive(Debug, Clone, Copy, Default)]
pub struct LanguageOfPage;

pub(crate) const LANG_SCRIPT: &str = "document.documentElement.getAttribute('lang')";

#[async_trait]
impl RuleEvaluator for LanguageOfPage {
    async fn evaluate(
        &self,
        page: &ParsedPage,
        session: Option<&mut dyn BrowserSession>,
    ) -> AuditResult<RuleOutcome> {
        let session = require_session(LANGUAGE_OF_PAGE, session)?;
        let lang = match session.evaluate(LANG_SCRIPT).await? {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(lang) => lang,
            other => {
                return Err(AuditError::rule(
                    LANGUAGE_OF_PAGE,
                    format!("unexpected lang value: {other}"),
                ))
            }
        };

        let mut issues = Vec::new();
        let root = page.root();
        let issue = |title: &str| match root {
            Some(root) => IssueRecord::at(page, root, title),
            None => IssueRecord::detached(title, "html", "html"),
        };
        if lang.trim().is_empty() {
            issues.push(issue("The <html> element is missing the lang attribute.").with_snippet(""));
        } else if !is_valid_page_lang(&lang) {
            issues.push(
                issue("The lang attribute on the <html> element contains an invalid language tag.")
                    .with_snippet(lang.as_str()),
            );
        }
        Ok(RuleOutcome::new(issues, 1))
    }
}
