//! Logger configuration.

mod presets;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `EnvFilter` directive, e.g. `info,regula_engine=debug`.
    pub level: String,
    /// Output format.
    pub format: Format,
    /// What each line shows.
    pub display: DisplayConfig,
    /// Install a reloadable filter and hand out a [`ReloadHandle`](crate::ReloadHandle).
    pub reloadable: bool,
    /// Write through the test harness capture instead of stderr.
    pub test_writer: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            display: DisplayConfig::default(),
            reloadable: false,
            test_writer: false,
        }
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Single line per event.
    #[default]
    Compact,
    /// Multi-line, human oriented.
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for Format {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(LogError::Config(format!("unknown log format '{other}'"))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        })
    }
}

/// Per-line display switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// ANSI colors.
    pub colors: bool,
    /// Source file and line.
    pub source: bool,
    /// Timestamps.
    pub time: bool,
    /// Event target.
    pub target: bool,
    /// Flatten event fields into the top-level JSON object.
    pub flatten: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            colors: true,
            source: false,
            time: true,
            target: true,
            flatten: false,
        }
    }
}

impl DisplayConfig {
    /// Apply `NO_COLOR` and `REGULA_LOG_SOURCE`.
    fn parse_env(&mut self) {
        if std::env::var_os("NO_COLOR").is_some() {
            self.colors = false;
        }
        if let Ok(source) = std::env::var("REGULA_LOG_SOURCE") {
            self.source = matches!(source.as_str(), "1" | "true" | "yes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("compact", Format::Compact)]
    #[case("Pretty", Format::Pretty)]
    #[case(" json ", Format::Json)]
    fn parses_formats(#[case] input: &str, #[case] expected: Format) {
        assert_eq!(input.parse::<Format>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_format() {
        let err = "logfmt".parse::<Format>().unwrap_err();
        assert!(matches!(err, LogError::Config(_)));
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: Config = serde_json::from_str(r#"{"level": "debug", "format": "json"}"#).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, Format::Json);
        assert_eq!(config.display, DisplayConfig::default());
        assert!(!config.reloadable);
    }

    #[test]
    fn presets_differ_where_expected() {
        assert_eq!(Config::development().format, Format::Pretty);
        assert_eq!(Config::production().format, Format::Json);
        assert!(Config::production().display.flatten);
        assert!(Config::test().test_writer);
        assert!(!Config::test().display.colors);
    }
}
