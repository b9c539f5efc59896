//! Merging rule outcomes into one report.

use crate::executor::ExecutedRule;
use crate::fixes::FixLookup;
use crate::level::ConformanceLevel;
use crate::result::AuditResult;
use crate::rule::IssueRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Report entry for one rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleReport {
    /// Rule name
    pub name: String,
    /// WCAG success criterion
    pub guideline: String,
    /// Level the criterion belongs to
    pub level: ConformanceLevel,
    /// WCAG version audited against
    pub wcag_version: String,
    /// Issues with remediation attached
    pub issues: Vec<IssueRecord>,
    /// Number of issues
    pub issue_count: usize,
    /// Elements that passed
    pub success_count: usize,
}

/// Merged, counted result of one audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    /// WCAG version audited against
    pub wcag_version: String,
    /// Requested level
    pub level: ConformanceLevel,
    /// Per-rule entries in rule-set order
    pub per_rule_data: Vec<RuleReport>,
    /// Sum of issue counts
    pub total_issue_count: usize,
    /// Sum of success counts
    pub total_success_count: usize,
    /// True when no rule reported an issue
    pub compliant: bool,
    /// When the report was built
    pub timestamp: DateTime<Utc>,
}

impl AggregateReport {
    /// JSON of everything except the timestamp, with stable key order
    pub fn canonical_json(&self) -> AuditResult<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(fields) = value.as_object_mut() {
            fields.remove("timestamp");
        }
        Ok(serde_json::to_string(&value)?)
    }

    /// SHA-256 of [`Self::canonical_json`], hex encoded
    pub fn content_digest(&self) -> AuditResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_json()?.as_bytes());
        let result = hasher.finalize();
        Ok(format!("{result:x}"))
    }

    /// Look up a rule's entry by name
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&RuleReport> {
        self.per_rule_data.iter().find(|r| r.name == name)
    }

    /// Every issue in report order
    pub fn issues(&self) -> impl Iterator<Item = &IssueRecord> {
        self.per_rule_data.iter().flat_map(|r| r.issues.iter())
    }
}

/// Folds executed rules into an [`AggregateReport`]
#[derive(Debug, Clone)]
pub struct ReportAggregator {
    fixes: FixLookup,
}

impl ReportAggregator {
    /// Aggregator resolving remediation through `fixes`
    #[must_use]
    pub const fn new(fixes: FixLookup) -> Self {
        Self { fixes }
    }

    /// Merge outcomes, stamping the report with the current time
    #[must_use]
    pub fn merge(
        &self,
        executed: &[ExecutedRule],
        version: &str,
        level: ConformanceLevel,
    ) -> AggregateReport {
        self.merge_at(executed, version, level, Utc::now())
    }

    /// Merge outcomes with an explicit timestamp.
    ///
    /// Entries are ordered by rule-set position, whatever order they
    /// arrive in. Counts are derived from the issues, never carried over.
    #[must_use]
    pub fn merge_at(
        &self,
        executed: &[ExecutedRule],
        version: &str,
        level: ConformanceLevel,
        timestamp: DateTime<Utc>,
    ) -> AggregateReport {
        let mut ordered: Vec<&ExecutedRule> = executed.iter().collect();
        ordered.sort_by_key(|e| e.position);

        let per_rule_data: Vec<RuleReport> = ordered
            .into_iter()
            .map(|executed| self.rule_report(executed, version))
            .collect();
        let total_issue_count: usize = per_rule_data.iter().map(|r| r.issue_count).sum();
        let total_success_count: usize = per_rule_data.iter().map(|r| r.success_count).sum();

        AggregateReport {
            wcag_version: version.to_string(),
            level,
            per_rule_data,
            total_issue_count,
            total_success_count,
            compliant: total_issue_count == 0,
            timestamp,
        }
    }

    fn rule_report(&self, executed: &ExecutedRule, version: &str) -> RuleReport {
        let level = executed.info.level;
        let issues: Vec<IssueRecord> = executed
            .outcome
            .issues
            .iter()
            .map(|issue| IssueRecord {
                remediation: self.fixes.resolve(level, &issue.title).to_string(),
                ..issue.clone()
            })
            .collect();
        RuleReport {
            name: executed.info.name.clone(),
            guideline: executed.info.guideline.clone(),
            level,
            wcag_version: version.to_string(),
            issue_count: issues.len(),
            success_count: executed.outcome.success_count(),
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixes::FixTable;
    use crate::rule::{RuleInfo, RuleOutcome};
    use proptest::prelude::*;

    fn executed(position: usize, level: ConformanceLevel, titles: &[&str], checked: usize) -> ExecutedRule {
        ExecutedRule {
            position,
            info: RuleInfo {
                name: format!("rule-{position}"),
                guideline: "0.0.0 Test".to_string(),
                level,
            },
            outcome: RuleOutcome::new(
                titles
                    .iter()
                    .map(|t| IssueRecord::detached(*t, "img", "img:nth-of-type(1)"))
                    .collect(),
                checked,
            ),
        }
    }

    fn aggregator() -> ReportAggregator {
        ReportAggregator::new(FixLookup::from_tables([
            (
                ConformanceLevel::A,
                FixTable::from_pairs([("Missing alt attribute", "Add an alt attribute.")]),
            ),
            (
                ConformanceLevel::AA,
                FixTable::from_pairs([("Missing alt attribute", "AA wording")]),
            ),
        ]))
    }

    mod merge_tests {
        use super::*;

        #[test]
        fn test_counts_follow_invariants() {
            let report = aggregator().merge(
                &[
                    executed(0, ConformanceLevel::A, &["Missing alt attribute"], 3),
                    executed(1, ConformanceLevel::A, &["x", "y", "z"], 1),
                    executed(2, ConformanceLevel::A, &[], 4),
                ],
                "2.0",
                ConformanceLevel::A,
            );
            assert_eq!(report.total_issue_count, 4);
            assert_eq!(report.total_success_count, 6);
            assert!(!report.compliant);
        }

        #[test]
        fn test_remediation_uses_rule_level() {
            let report = aggregator().merge(
                &[executed(0, ConformanceLevel::A, &["missing ALT attribute."], 1)],
                "2.0",
                ConformanceLevel::AA,
            );
            let issue = report.issues().next().unwrap();
            assert_eq!(issue.remediation, "Add an alt attribute.");
            assert_eq!(report.rule("rule-0").unwrap().wcag_version, "2.0");
        }

        #[test]
        fn test_unknown_title_has_empty_remediation() {
            let report = aggregator().merge(&[executed(0, ConformanceLevel::A, &["Unheard of"], 1)], "2.0", ConformanceLevel::A);
            assert_eq!(report.issues().next().unwrap().remediation, "");
        }

        #[test]
        fn test_empty_merge_is_compliant() {
            let report = aggregator().merge(&[], "2.0", ConformanceLevel::AAA);
            assert!(report.compliant);
            assert_eq!(report.total_issue_count, 0);
        }
    }

    mod digest_tests {
        use super::*;
        use chrono::TimeZone;

        #[test]
        fn test_timestamp_excluded_from_digest() {
            let rules = [executed(0, ConformanceLevel::A, &["Missing alt attribute"], 1)];
            let first = aggregator().merge_at(&rules, "2.0", ConformanceLevel::A, Utc.timestamp_opt(0, 0).unwrap());
            let second = aggregator().merge(&rules, "2.0", ConformanceLevel::A);
            assert_eq!(first.content_digest().unwrap(), second.content_digest().unwrap());
            assert!(!first.canonical_json().unwrap().contains("timestamp"));
            assert_eq!(first.content_digest().unwrap().len(), 64);
        }

        #[test]
        fn test_report_serializes_camel_case() {
            let report = aggregator().merge(&[], "2.0", ConformanceLevel::A);
            let json = report.canonical_json().unwrap();
            assert!(json.contains("\"perRuleData\":[]"));
            assert!(json.contains("\"totalIssueCount\":0"));
        }
    }

    proptest! {
        #[test]
        fn prop_success_count_never_negative(issues in 0usize..20, checked in 0usize..20) {
            let titles: Vec<String> = (0..issues).map(|i| format!("issue {i}")).collect();
            let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
            let report = aggregator().merge(&[executed(0, ConformanceLevel::A, &titles, checked)], "2.0", ConformanceLevel::A);
            prop_assert_eq!(report.total_success_count, checked.saturating_sub(issues));
            prop_assert_eq!(report.total_issue_count, issues);
            prop_assert_eq!(report.compliant, issues == 0);
        }

        #[test]
        fn prop_merge_ignores_completion_order(
            counts in proptest::collection::vec((0usize..4, 0usize..6), 1..8),
            seed in any::<u64>(),
        ) {
            let rules: Vec<ExecutedRule> = counts
                .iter()
                .enumerate()
                .map(|(i, (issues, checked))| {
                    let titles = vec!["Missing alt attribute"; *issues];
                    executed(i, ConformanceLevel::A, &titles, *checked)
                })
                .collect();
            let mut shuffled = rules.clone();
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            if seed % 2 == 0 {
                shuffled.reverse();
            }

            let expected = aggregator().merge(&rules, "2.0", ConformanceLevel::A);
            let actual = aggregator().merge(&shuffled, "2.0", ConformanceLevel::A);
            prop_assert_eq!(expected.content_digest().unwrap(), actual.content_digest().unwrap());
        }
    }
}
