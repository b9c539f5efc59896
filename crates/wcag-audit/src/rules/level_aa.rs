//! Level AA success criteria.

use super::support::{is_descriptive, is_valid_part_lang, HEADING_TAGS};
use crate::level::ConformanceLevel;
use crate::page::ParsedPage;
use crate::result::{AuditError, AuditResult};
use crate::rule::{require_session, DomRule, IssueRecord, RuleDescriptor, RuleEvaluator, RuleOutcome};
use crate::session::BrowserSession;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Rule name of "Headings and labels"
pub const HEADINGS_AND_LABELS: &str = "Headings and labels";
/// Rule name of "Focus visible"
pub const FOCUS_VISIBLE: &str = "Focus visible";
/// Rule name of "Language of parts"
pub const LANGUAGE_OF_PARTS: &str = "Language of parts";

/// Level AA rules in report order
#[must_use]
pub fn descriptors() -> Vec<RuleDescriptor> {
    let aa = ConformanceLevel::AA;
    vec![
        RuleDescriptor::dom(
            HEADINGS_AND_LABELS,
            "2.4.6 Headings and Labels",
            aa,
            Arc::new(DomRule(headings_and_labels)),
        ),
        RuleDescriptor::session(FOCUS_VISIBLE, "2.4.7 Focus Visible", aa, Arc::new(FocusVisible)),
        RuleDescriptor::dom(
            LANGUAGE_OF_PARTS,
            "3.1.2 Language of Parts",
            aa,
            Arc::new(DomRule(language_of_parts)),
        ),
    ]
}

/// 2.4.6: headings and labels describe their topic
pub fn headings_and_labels(page: &ParsedPage) -> AuditResult<RuleOutcome> {
    let mut issues = Vec::new();
    let headings = page.select(HEADING_TAGS);
    let labels = page.select(&["label"]);

    for (id, heading) in &headings {
        if !is_descriptive(heading.text()) {
            issues.push(
                IssueRecord::at(page, *id, "Heading is not descriptive or clear.")
                    .with_snippet(heading.text()),
            );
        }
    }
    for (id, label) in &labels {
        if !is_descriptive(label.text()) {
            issues.push(
                IssueRecord::at(page, *id, "Label is not descriptive or clear.")
                    .with_snippet(label.text()),
            );
        }
    }

    Ok(RuleOutcome::new(issues, headings.len() + labels.len()))
}

/// 3.1.2: every `lang` below the root names a valid language
pub fn language_of_parts(page: &ParsedPage) -> AuditResult<RuleOutcome> {
    let mut issues = Vec::new();
    let parts: Vec<_> = page
        .elements()
        .filter(|(id, n)| Some(*id) != page.root() && n.has_attr("lang"))
        .collect();

    for (id, node) in &parts {
        let lang = node.attr("lang").unwrap_or_default().trim();
        if lang.is_empty() {
            issues.push(
                IssueRecord::at(page, *id, "Element has a 'lang' attribute but it is empty or not specified.")
                    .with_snippet(""),
            );
        } else if !is_valid_part_lang(lang) {
            issues.push(
                IssueRecord::at(page, *id, "The 'lang' attribute contains an invalid language tag.")
                    .with_snippet(lang),
            );
        }
    }

    Ok(RuleOutcome::new(issues, parts.len()))
}

/// Script focusing every focusable element of the live document.
///
/// Yields one `{tag, visible, html, selector}` entry per element.
pub(crate) const FOCUS_SCRIPT: &str = r#"(() => {
  const path = (el) => {
    const steps = [];
    for (let node = el; node && node.tagName && node.tagName.toLowerCase() !== 'html'; node = node.parentElement) {
      const tag = node.tagName.toLowerCase();
      if (node.id) { steps.unshift(tag + '#' + node.id); break; }
      const same = node.parentElement
        ? Array.from(node.parentElement.children).filter((c) => c.tagName === node.tagName)
        : [node];
      steps.unshift(tag + ':nth-of-type(' + (same.indexOf(node) + 1) + ')');
    }
    return steps.length ? steps.join(' > ') : 'html';
  };
  const focusable = document.querySelectorAll(
    "a, button, input, select, textarea, [tabindex]:not([tabindex='-1'])");
  return Array.from(focusable).map((el) => {
    el.focus();
    const style = window.getComputedStyle(el);
    const visible = style.outlineStyle !== 'none' || style.borderStyle !== 'none';
    return { tag: el.tagName.toLowerCase(), visible, html: el.outerHTML, selector: path(el) };
  });
})()"#;

#[derive(Debug, Deserialize)]
struct FocusProbe {
    tag: String,
    visible: bool,
    #[serde(default)]
    html: String,
    #[serde(default)]
    selector: String,
}

/// 2.4.7: focusable elements show a focus indicator
#[derive(Debug, Clone, Copy, Default)]
pub struct FocusVisible;

#[async_trait]
impl RuleEvaluator for FocusVisible {
    async fn evaluate(
        &self,
        _page: &ParsedPage,
        session: Option<&mut dyn BrowserSession>,
    ) -> AuditResult<RuleOutcome> {
        let session = require_session(FOCUS_VISIBLE, session)?;
        let value = session.evaluate(FOCUS_SCRIPT).await?;
        let probes: Vec<FocusProbe> = serde_json::from_value(value)
            .map_err(|err| AuditError::rule(FOCUS_VISIBLE, format!("malformed focus probe: {err}")))?;

        let issues = probes
            .iter()
            .filter(|probe| !probe.visible)
            .map(|probe| {
                IssueRecord::detached(
                    "Element does not show a visible focus indicator when focused.",
                    probe.tag.as_str(),
                    probe.selector.as_str(),
                )
                .with_snippet(probe.html.as_str())
            })
            .collect();
        Ok(RuleOutcome::new(issues, probes.len()))
    }
}
