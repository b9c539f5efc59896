//! Subscriber setup. Logs go to stderr; stdout carries only the report.

use tracing_subscriber::EnvFilter;

/// Default filter directive for a verbosity count
#[must_use]
pub const fn directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "wcag_audit=warn",
        1 => "wcag_audit=info",
        _ => "wcag_audit=debug",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init(verbose: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(verbose)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // Already installed elsewhere
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_per_verbosity() {
        assert_eq!(directive(0), "wcag_audit=warn");
        assert_eq!(directive(1), "wcag_audit=info");
        assert_eq!(directive(2), "wcag_audit=debug");
        assert_eq!(directive(9), "wcag_audit=debug");
    }
}
