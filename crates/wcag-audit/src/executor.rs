//! Concurrent rule execution.
//!
//! Session-free rules run on a bounded pool of tasks. Session rules go
//! through [`SessionResource::with_exclusive_access`], so at most one of
//! them drives the browser at a time; each navigates to the audit URL
//! before evaluating. The first failure cancels everything still in
//! flight and the batch fails as a whole.

use crate::config::AuditConfig;
use crate::context::AuditContext;
use crate::page::ParsedPage;
use crate::result::{AuditError, AuditResult};
use crate::rule::{RuleDescriptor, RuleInfo, RuleOutcome};
use crate::session::SessionResource;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, Instrument};

/// Outcome of one rule, tagged with the rule that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedRule {
    /// Index of the rule in its rule set
    pub position: usize,
    /// Rule identity
    pub info: RuleInfo,
    /// What the rule found
    pub outcome: RuleOutcome,
}

/// Inputs shared by every task of one batch
#[derive(Debug, Clone)]
pub struct ExecutionInput {
    /// Parsed page
    pub page: Arc<ParsedPage>,
    /// Live session, required when the batch holds session rules
    pub session: Option<Arc<SessionResource>>,
    /// Per-invocation state
    pub context: Arc<AuditContext>,
    /// Point after which the batch is abandoned
    pub deadline: Instant,
}

/// Runs rule sets with bounded parallelism
#[derive(Debug, Clone)]
pub struct ConcurrentRuleExecutor {
    pool_size: usize,
}

impl Default for ConcurrentRuleExecutor {
    fn default() -> Self {
        Self::from_config(&AuditConfig::default())
    }
}

impl ConcurrentRuleExecutor {
    /// Executor running at most `pool_size` session-free rules at once
    #[must_use]
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size: pool_size.max(1),
        }
    }

    /// Executor sized from configuration
    #[must_use]
    pub fn from_config(config: &AuditConfig) -> Self {
        Self::new(config.worker_pool_size)
    }

    /// Worker pool size
    #[must_use]
    pub const fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Run `rules` and return their outcomes in rule-set order.
    ///
    /// # Errors
    ///
    /// The first rule failure, [`AuditError::MissingSession`] when a
    /// session rule has no session or URL to work with, or
    /// [`AuditError::Timeout`] once `input.deadline` passes. No partial
    /// results are returned in either case.
    pub async fn execute(
        &self,
        rules: &[RuleDescriptor],
        input: &ExecutionInput,
    ) -> AuditResult<Vec<ExecutedRule>> {
        let budget_ms = input
            .deadline
            .saturating_duration_since(Instant::now())
            .as_millis() as u64;
        let audit_id = input.context.audit_id();
        let permits = Arc::new(Semaphore::new(self.pool_size));
        let mut tasks: JoinSet<(usize, AuditResult<RuleOutcome>)> = JoinSet::new();

        for (index, rule) in rules.iter().enumerate() {
            input.context.rule_started();
            let rule = rule.clone();
            let page = Arc::clone(&input.page);
            if rule.requires_session {
                let session = input.session.clone();
                let url = input.context.url().map(str::to_string);
                tasks.spawn(
                    async move {
                        let work = run_session_rule(rule.clone(), page, session, url);
                        (index, guarded(&rule, work).await)
                    }
                    .in_current_span(),
                );
            } else {
                let permits = Arc::clone(&permits);
                tasks.spawn(
                    async move {
                        let result = match permits.acquire_owned().await {
                            Ok(_permit) => guarded(&rule, rule.evaluate(&page, None)).await,
                            Err(err) => Err(AuditError::rule(rule.name(), err)),
                        };
                        (index, result)
                    }
                    .in_current_span(),
                );
            }
        }

        let mut outcomes: Vec<Option<RuleOutcome>> = vec![None; rules.len()];
        loop {
            let joined = match tokio::time::timeout_at(input.deadline, tasks.join_next()).await {
                Ok(Some(joined)) => joined,
                Ok(None) => break,
                Err(_) => {
                    error!(%audit_id, budget_ms, "audit deadline exceeded, cancelling rules");
                    tasks.shutdown().await;
                    return Err(AuditError::Timeout { ms: budget_ms });
                }
            };
            let (index, result) = match joined {
                Ok(pair) => pair,
                Err(err) => {
                    tasks.shutdown().await;
                    return Err(AuditError::rule("executor", err));
                }
            };
            let name = rules.get(index).map_or("", RuleDescriptor::name);
            match result {
                Ok(outcome) => {
                    debug!(
                        %audit_id,
                        rule = name,
                        issues = outcome.issue_count(),
                        checked = outcome.elements_checked,
                        "rule finished"
                    );
                    input
                        .context
                        .rule_completed(outcome.issue_count(), outcome.elements_checked);
                    outcomes[index] = Some(outcome);
                }
                Err(err) => {
                    error!(%audit_id, rule = name, error = %err, "rule failed, cancelling batch");
                    tasks.shutdown().await;
                    return Err(err);
                }
            }
        }

        rules
            .iter()
            .zip(outcomes)
            .enumerate()
            .map(|(position, (rule, outcome))| {
                outcome
                    .map(|outcome| ExecutedRule {
                        position,
                        info: rule.info.clone(),
                        outcome,
                    })
                    .ok_or_else(|| AuditError::rule(rule.name(), "rule produced no outcome"))
            })
            .collect()
    }
}

fn run_session_rule(
    rule: RuleDescriptor,
    page: Arc<ParsedPage>,
    session: Option<Arc<SessionResource>>,
    url: Option<String>,
) -> BoxFuture<'static, AuditResult<RuleOutcome>> {
    Box::pin(async move {
        let missing = || AuditError::MissingSession {
            rule: rule.name().to_string(),
        };
        let session = session.ok_or_else(missing)?;
        let url = url.ok_or_else(missing)?;
        session
            .with_exclusive_access(move |browser| {
                Box::pin(async move {
                    browser.navigate(&url).await?;
                    rule.evaluate(&page, Some(browser)).await
                })
            })
            .await
    })
}

/// Turn a panic inside `work` into a rule failure
async fn guarded<F>(rule: &RuleDescriptor, work: F) -> AuditResult<RuleOutcome>
where
    F: std::future::Future<Output = AuditResult<RuleOutcome>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(AuditError::rule(
            rule.name(),
            format!("panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::level::ConformanceLevel;
    use crate::rule::{DomRule, IssueRecord, RuleEvaluator};
    use crate::session::{BrowserSession, MockSessionFactory, SessionEvent};
    use async_trait::async_trait;
    use std::time::Duration;

    fn count_images(page: &ParsedPage) -> AuditResult<RuleOutcome> {
        Ok(RuleOutcome::new(Vec::new(), page.count(&["img"])))
    }

    fn flag_paragraphs(page: &ParsedPage) -> AuditResult<RuleOutcome> {
        let paragraphs = page.select(&["p"]);
        let issues = paragraphs
            .iter()
            .map(|(id, _)| IssueRecord::at(page, *id, "Paragraph"))
            .collect();
        Ok(RuleOutcome::new(issues, paragraphs.len()))
    }

    fn broken(_: &ParsedPage) -> AuditResult<RuleOutcome> {
        Err(AuditError::session("index out of range"))
    }

    fn explodes(_: &ParsedPage) -> AuditResult<RuleOutcome> {
        panic!("boom")
    }

    struct SlowRule(Duration);

    #[async_trait]
    impl RuleEvaluator for SlowRule {
        async fn evaluate(
            &self,
            _page: &ParsedPage,
            _session: Option<&mut dyn BrowserSession>,
        ) -> AuditResult<RuleOutcome> {
            tokio::time::sleep(self.0).await;
            Ok(RuleOutcome::default())
        }
    }

    struct TitleRule;

    #[async_trait]
    impl RuleEvaluator for TitleRule {
        async fn evaluate(
            &self,
            _page: &ParsedPage,
            session: Option<&mut dyn BrowserSession>,
        ) -> AuditResult<RuleOutcome> {
            let session = crate::rule::require_session("title", session)?;
            let title = session.title().await?;
            Ok(RuleOutcome::new(Vec::new(), usize::from(title.is_some())))
        }
    }

    fn dom(name: &str, check: crate::rule::DomCheck) -> RuleDescriptor {
        RuleDescriptor::dom(name, "0.0.0 Test", ConformanceLevel::A, Arc::new(DomRule(check)))
    }

    fn input(html: &str, url: Option<&str>, session: Option<Arc<SessionResource>>) -> ExecutionInput {
        ExecutionInput {
            page: Arc::new(ParsedPage::parse(html)),
            session,
            context: Arc::new(AuditContext::new(url.map(str::to_string))),
            deadline: Instant::now() + Duration::from_secs(30),
        }
    }

    mod ordering_tests {
        use super::*;

        #[tokio::test]
        async fn test_outcomes_follow_rule_order() {
            let rules = vec![
                RuleDescriptor::dom(
                    "slow",
                    "0.0.0 Test",
                    ConformanceLevel::A,
                    Arc::new(SlowRule(Duration::from_millis(20))),
                ),
                dom("images", count_images),
                dom("paragraphs", flag_paragraphs),
            ];
            let input = input("<img src=a><p>x</p><p>y</p>", None, None);
            let executed = ConcurrentRuleExecutor::new(4).execute(&rules, &input).await.unwrap();

            let names: Vec<_> = executed.iter().map(|e| e.info.name.as_str()).collect();
            assert_eq!(names, vec!["slow", "images", "paragraphs"]);
            assert_eq!(executed[1].outcome.elements_checked, 1);
            assert_eq!(executed[2].outcome.issue_count(), 2);

            let snapshot = input.context.snapshot();
            assert_eq!(snapshot.rules_started, 3);
            assert_eq!(snapshot.rules_completed, 3);
            assert_eq!(snapshot.issues_found, 2);
        }

        #[tokio::test]
        async fn test_pool_of_one_still_completes() {
            let rules: Vec<_> = (0..8).map(|i| dom(&format!("r{i}"), count_images)).collect();
            let input = input("<img src=a>", None, None);
            let executed = ConcurrentRuleExecutor::new(1).execute(&rules, &input).await.unwrap();
            assert_eq!(executed.len(), 8);
        }

        #[tokio::test]
        async fn test_empty_rule_set() {
            let input = input("<p>x</p>", None, None);
            let executed = ConcurrentRuleExecutor::default().execute(&[], &input).await.unwrap();
            assert!(executed.is_empty());
        }
    }

    mod failure_tests {
        use super::*;

        #[tokio::test]
        async fn test_single_failure_fails_batch() {
            let rules = vec![dom("images", count_images), dom("broken", broken)];
            let input = input("<img src=a>", None, None);
            let err = ConcurrentRuleExecutor::new(2).execute(&rules, &input).await.unwrap_err();
            assert!(matches!(err, AuditError::RuleEvaluation { rule, .. } if rule == "broken"));
        }

        #[tokio::test]
        async fn test_panic_is_attributed_to_rule() {
            let rules = vec![dom("explodes", explodes)];
            let input = input("<p>x</p>", None, None);
            match ConcurrentRuleExecutor::new(2).execute(&rules, &input).await.unwrap_err() {
                AuditError::RuleEvaluation { rule, cause } => {
                    assert_eq!(rule, "explodes");
                    assert!(cause.contains("boom"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_deadline_cancels_batch() {
            let rules = vec![RuleDescriptor::dom(
                "slow",
                "0.0.0 Test",
                ConformanceLevel::A,
                Arc::new(SlowRule(Duration::from_secs(60))),
            )];
            let mut input = input("<p>x</p>", None, None);
            input.deadline = Instant::now() + Duration::from_millis(500);
            let err = ConcurrentRuleExecutor::new(2).execute(&rules, &input).await.unwrap_err();
            assert!(matches!(err, AuditError::Timeout { ms: 500 }));
        }

        #[tokio::test]
        async fn test_session_rule_without_url() {
            let factory = MockSessionFactory::new();
            let session = Arc::new(SessionResource::new(Arc::new(factory.clone()), RetryConfig::immediate(1)));
            let rules = vec![RuleDescriptor::session(
                "title",
                "2.4.2 Page Titled",
                ConformanceLevel::A,
                Arc::new(TitleRule),
            )];
            let input = input("<p>x</p>", None, Some(session));
            let err = ConcurrentRuleExecutor::new(2).execute(&rules, &input).await.unwrap_err();
            assert!(matches!(err, AuditError::MissingSession { .. }));
            assert_eq!(factory.created(), 0);
        }
    }

    mod session_tests {
        use super::*;

        #[tokio::test]
        async fn test_session_rules_share_one_session() {
            let factory = MockSessionFactory::new()
                .with_title("Docs")
                .with_navigation_delay(Duration::from_millis(5));
            let session = Arc::new(SessionResource::new(Arc::new(factory.clone()), RetryConfig::immediate(1)));
            let rules: Vec<_> = (0..3)
                .map(|i| {
                    RuleDescriptor::session(format!("title-{i}"), "2.4.2 Page Titled", ConformanceLevel::A, Arc::new(TitleRule))
                })
                .chain(std::iter::once(dom("images", count_images)))
                .collect();
            let input = input("<img src=a>", Some("https://example.com/"), Some(Arc::clone(&session)));

            let executed = ConcurrentRuleExecutor::new(4).execute(&rules, &input).await.unwrap();
            session.release().await.unwrap();

            assert_eq!(executed.len(), 4);
            assert_eq!(factory.created(), 1);
            let navigations = factory.count(|e| matches!(e, SessionEvent::Navigate { .. }));
            assert_eq!(navigations, 3);

            // Each navigation is followed by its own title read before the next begins
            let sequence: Vec<_> = factory
                .events()
                .into_iter()
                .filter(|e| matches!(e, SessionEvent::Navigate { .. } | SessionEvent::Title { .. }))
                .collect();
            for pair in sequence.chunks(2) {
                assert!(matches!(pair[0], SessionEvent::Navigate { .. }));
                assert!(matches!(pair[1], SessionEvent::Title { .. }));
            }
        }

        #[tokio::test]
        async fn test_acquisition_failure_fails_batch() {
            let factory = MockSessionFactory::new().failing_first(10);
            let session = Arc::new(SessionResource::new(Arc::new(factory), RetryConfig::immediate(2)));
            let rules = vec![RuleDescriptor::session(
                "title",
                "2.4.2 Page Titled",
                ConformanceLevel::A,
                Arc::new(TitleRule),
            )];
            let input = input("<p>x</p>", Some("https://example.com/"), Some(session));
            let err = ConcurrentRuleExecutor::new(2).execute(&rules, &input).await.unwrap_err();
            assert!(matches!(err, AuditError::SessionAcquisition { attempts: 2, .. }));
        }
    }
}
