//! Logger builder
//!
//! - `reload`: runtime filter reload

mod reload;

pub(crate) use reload::parse_filter;
pub use reload::ReloadHandle;

use tracing_subscriber::fmt::{self, TestWriter, writer::BoxMakeWriter};
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Registry;

use crate::config::{Config, DisplayConfig, Format};
use crate::error::{LogError, LogResult};

type FilteredRegistry = Layered<Box<dyn Layer<Registry> + Send + Sync + 'static>, Registry>;
type FmtLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync + 'static>;

/// Applies the display switches shared by every format, then boxes the layer.
macro_rules! finish_fmt_layer {
    ($layer:expr, $display:expr, $writer:expr) => {{
        let display: &DisplayConfig = $display;
        let layer = $layer
            .with_writer($writer)
            .with_ansi(display.colors)
            .with_target(display.target)
            .with_file(display.source)
            .with_line_number(display.source);
        if display.time {
            layer.boxed()
        } else {
            layer.without_time().boxed()
        }
    }};
}

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Keeps the installed logger's handles alive.
#[derive(Debug)]
pub struct LoggerGuard {
    reload_handle: Option<ReloadHandle>,
}

impl LoggerGuard {
    /// Reload handle, present when the config asked for a reloadable filter.
    pub fn reload_handle(&self) -> Option<&ReloadHandle> {
        self.reload_handle.as_ref()
    }
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build the subscriber and install it globally.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - the filter string cannot be parsed
    /// - a global subscriber is already installed
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = parse_filter(&self.config.level)?;
        let (filter_layer, reload_handle) =
            reload::create_filter_layer(filter, &self.config.level, self.config.reloadable);

        Registry::default()
            .with(filter_layer)
            .with(self.fmt_layer())
            .try_init()
            .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        tracing::debug!(
            level = %self.config.level,
            format = %self.config.format,
            reloadable = self.config.reloadable,
            "logger initialized"
        );
        Ok(LoggerGuard { reload_handle })
    }

    fn writer(&self) -> BoxMakeWriter {
        if self.config.test_writer {
            BoxMakeWriter::new(TestWriter::new())
        } else {
            BoxMakeWriter::new(std::io::stderr)
        }
    }

    fn fmt_layer(&self) -> FmtLayer {
        let display = &self.config.display;
        let writer = self.writer();
        match self.config.format {
            Format::Compact => finish_fmt_layer!(fmt::layer().compact(), display, writer),
            Format::Pretty => finish_fmt_layer!(fmt::layer().pretty(), display, writer),
            Format::Json => finish_fmt_layer!(
                fmt::layer()
                    .json()
                    .flatten_event(display.flatten)
                    .with_current_span(true),
                display,
                writer
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_filter_fails_before_installing() {
        let config = Config {
            level: "regula=loud".to_string(),
            ..Config::test()
        };
        let err = LoggerBuilder::from_config(config).build().unwrap_err();
        assert!(matches!(err, LogError::Filter(_)));
    }

    #[test]
    fn every_format_builds_a_layer() {
        for format in [Format::Compact, Format::Pretty, Format::Json] {
            for time in [true, false] {
                let mut config = Config::test();
                config.format = format;
                config.display.time = time;
                let _layer: FmtLayer = LoggerBuilder::from_config(config).fmt_layer();
            }
        }
    }
}
