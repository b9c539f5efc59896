//! Built-in rule families, one module per conformance level.

pub mod level_a;
pub mod level_aa;
pub mod level_aaa;
pub mod support;

use crate::level::ConformanceLevel;
use crate::rule::RuleDescriptor;

/// Rules belonging to exactly `level`, without lower levels
#[must_use]
pub fn family(level: ConformanceLevel) -> Vec<RuleDescriptor> {
    match level {
        ConformanceLevel::A => level_a::descriptors(),
        ConformanceLevel::AA => level_aa::descriptors(),
        ConformanceLevel::AAA => level_aaa::descriptors(),
    }
}
