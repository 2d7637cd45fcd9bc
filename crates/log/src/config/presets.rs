//! Configuration presets

use super::{Config, DisplayConfig, Format};

/// Directive enabling `level` for the regula crates and `warn` elsewhere.
fn regula_directive(level: &str) -> String {
    format!("warn,regula_engine={level},regula_expression={level},regula_log={level}")
}

fn first_var(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| std::env::var(key).ok())
}

impl Config {
    /// Configuration from `REGULA_LOG` (falling back to `RUST_LOG`),
    /// `REGULA_LOG_FORMAT`, `REGULA_LOG_SOURCE` and `NO_COLOR`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self {
            level: first_var(&["REGULA_LOG", "RUST_LOG"]).unwrap_or_else(|| Self::default().level),
            ..Self::default()
        };
        // unknown values keep the default
        if let Some(format) = first_var(&["REGULA_LOG_FORMAT"]).and_then(|f| f.parse().ok()) {
            config.format = format;
        }
        config.display.parse_env();
        config
    }

    /// Rule-level tracing from the engine, readable in a terminal.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: regula_directive("debug"),
            format: Format::Pretty,
            display: DisplayConfig {
                source: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// One JSON object per event, fields at the top level.
    #[must_use]
    pub fn production() -> Self {
        Self {
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                flatten: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Everything the regula crates emit, routed through the test harness
    /// writer so it only shows for failing tests.
    #[must_use]
    pub fn test() -> Self {
        Self {
            level: regula_directive("trace"),
            display: DisplayConfig {
                colors: false,
                time: false,
                ..DisplayConfig::default()
            },
            test_writer: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn regula_directive_scopes_every_crate() {
        assert_eq!(
            regula_directive("debug"),
            "warn,regula_engine=debug,regula_expression=debug,regula_log=debug"
        );
    }

    #[test]
    fn development_and_test_filters_parse() {
        for config in [Config::development(), Config::test()] {
            assert!(crate::builder::parse_filter(&config.level).is_ok(), "{}", config.level);
        }
    }
}
