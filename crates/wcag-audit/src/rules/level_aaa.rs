//! Level AAA success criteria.

use super::support::{has_aria_name, has_descendant, matches_phrase, HEADING_TAGS, NON_DESCRIPTIVE_LINK_TEXTS};
use crate::level::ConformanceLevel;
use crate::page::ParsedPage;
use crate::result::AuditResult;
use crate::rule::{DomRule, IssueRecord, RuleDescriptor, RuleOutcome};
use std::sync::Arc;

/// Rule name of "Link purpose (link only)"
pub const LINK_PURPOSE_LINK_ONLY: &str = "Link purpose (link only)";
/// Rule name of "Section headings"
pub const SECTION_HEADINGS: &str = "Section headings";
/// Rule name of "Abbreviations"
pub const ABBREVIATIONS: &str = "Abbreviations";

/// Level AAA rules in report order
#[must_use]
pub fn descriptors() -> Vec<RuleDescriptor> {
    let aaa = ConformanceLevel::AAA;
    vec![
        RuleDescriptor::dom(
            LINK_PURPOSE_LINK_ONLY,
            "2.4.9 Link Purpose (Link Only)",
            aaa,
            Arc::new(DomRule(link_purpose_link_only)),
        ),
        RuleDescriptor::dom(
            SECTION_HEADINGS,
            "2.4.10 Section Headings",
            aaa,
            Arc::new(DomRule(section_headings)),
        ),
        RuleDescriptor::dom(ABBREVIATIONS, "3.1.4 Abbreviations", aaa, Arc::new(DomRule(abbreviations))),
    ]
}

/// 2.4.9: link text alone identifies the destination
pub fn link_purpose_link_only(page: &ParsedPage) -> AuditResult<RuleOutcome> {
    let mut issues = Vec::new();
    let links = page.select(&["a"]);

    for (id, link) in &links {
        let text = link.text().trim();
        let href = link.attr("href").unwrap_or_default();
        if text.is_empty() || matches_phrase(text, NON_DESCRIPTIVE_LINK_TEXTS) {
            issues.push(IssueRecord::at(page, *id, "Link text is empty or non-descriptive.").with_snippet(href));
        }
        if text.is_empty() && !has_aria_name(link) {
            issues.push(IssueRecord::at(
                page,
                *id,
                "Link lacks an accessible name (aria-label or aria-labelledby).",
            ));
        }
    }

    Ok(RuleOutcome::new(issues, links.len()))
}

/// 2.4.10: content sections open with a heading
pub fn section_headings(page: &ParsedPage) -> AuditResult<RuleOutcome> {
    let sections = page.select(&["section", "article"]);
    let issues = sections
        .iter()
        .filter(|(id, _)| !has_descendant(page, *id, |n| n.is_any(HEADING_TAGS) && !n.text().is_empty()))
        .map(|(id, section)| {
            IssueRecord::at(
                page,
                *id,
                "Section is missing a heading or the heading is not descriptive.",
            )
            .with_snippet(section.text())
        })
        .collect();

    Ok(RuleOutcome::new(issues, sections.len()))
}

/// 3.1.4: abbreviations carry their expansion
pub fn abbreviations(page: &ParsedPage) -> AuditResult<RuleOutcome> {
    let mut issues = Vec::new();
    let abbrs = page.select(&["abbr", "acronym"]);

    for (id, abbr) in &abbrs {
        let text = abbr.text().trim();
        if text.is_empty() {
            issues.push(IssueRecord::at(page, *id, "Empty abbreviation tag found.").with_snippet(""));
        } else if abbr.non_empty_attr("title").is_none() {
            issues.push(
                IssueRecord::at(
                    page,
                    *id,
                    "Abbreviation is missing an expanded form via the 'title' attribute.",
                )
                .with_snippet(text),
            );
        }
    }

    Ok(RuleOutcome::new(issues, abbrs.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_only_purpose() {
        let page = ParsedPage::parse(
            r#"<a href="/pricing">Pricing plans</a><a href="/more">More</a><a href="/x"></a><a href="/y" aria-label="Home"></a>"#,
        );
        let outcome = link_purpose_link_only(&page).unwrap();
        let titles: Vec<_> = outcome.issues.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Link text is empty or non-descriptive.",
                "Link text is empty or non-descriptive.",
                "Link lacks an accessible name (aria-label or aria-labelledby).",
                "Link text is empty or non-descriptive.",
            ]
        );
        assert_eq!(outcome.issues[0].snippet, "/more");
        assert_eq!(outcome.elements_checked, 4);
        assert_eq!(outcome.success_count(), 0);
    }

    #[test]
    fn test_section_headings() {
        let page = ParsedPage::parse(
            "<section><h2>Plans</h2><p>a</p></section><section><p>no heading</p></section><article><h3></h3></article><div>ignored</div>",
        );
        let outcome = section_headings(&page).unwrap();
        assert_eq!(outcome.elements_checked, 3);
        assert_eq!(outcome.issue_count(), 2);
        assert_eq!(outcome.issues[0].snippet, "no heading");
        assert_eq!(outcome.issues[1].tag_name, "article");
    }

    #[test]
    fn test_abbreviations() {
        let page = ParsedPage::parse(
            r#"<abbr title="World Health Organization">WHO</abbr><abbr>NASA</abbr><acronym></acronym>"#,
        );
        let outcome = abbreviations(&page).unwrap();
        assert_eq!(outcome.elements_checked, 3);
        assert_eq!(outcome.issues[0].snippet, "NASA");
        assert_eq!(outcome.issues[1].title, "Empty abbreviation tag found.");
    }
}
