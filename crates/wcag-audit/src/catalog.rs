//! Rule sets per conformance level.

use crate::level::ConformanceLevel;
use crate::result::AuditResult;
use crate::rule::RuleDescriptor;
use crate::rules;
use std::sync::{Arc, OnceLock};

/// Ordered, immutable rule set of one level
pub type RuleSet = Arc<[RuleDescriptor]>;

/// Composes rule families into per-level rule sets
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleCatalog;

impl RuleCatalog {
    /// Rules of `level` and every level below it, lowest level first.
    ///
    /// Sets are built on first request and shared afterwards.
    #[must_use]
    pub fn for_level(level: ConformanceLevel) -> RuleSet {
        static SETS: [OnceLock<RuleSet>; 3] = [OnceLock::new(), OnceLock::new(), OnceLock::new()];
        let slot = match level {
            ConformanceLevel::A => &SETS[0],
            ConformanceLevel::AA => &SETS[1],
            ConformanceLevel::AAA => &SETS[2],
        };
        Arc::clone(slot.get_or_init(|| Self::compose(level)))
    }

    /// Parse `level` and return its rule set
    pub fn for_level_str(level: &str) -> AuditResult<RuleSet> {
        Ok(Self::for_level(level.parse()?))
    }

    fn compose(level: ConformanceLevel) -> RuleSet {
        level.composed().flat_map(rules::family).collect()
    }
}
