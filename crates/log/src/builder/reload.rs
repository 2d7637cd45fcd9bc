//! Runtime filter reload

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing_subscriber::{EnvFilter, Registry, layer::Layer, reload};

use crate::error::{LogError, LogResult};

/// Handle for changing the filter of an installed subscriber.
#[derive(Clone)]
pub struct ReloadHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    current_filter: Arc<ArcSwap<String>>,
}

impl std::fmt::Debug for ReloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadHandle")
            .field("current_filter", &self.current_filter.load())
            .finish_non_exhaustive()
    }
}

impl ReloadHandle {
    /// Replace the filter.
    ///
    /// # Errors
    /// Returns error if the directive does not parse or the subscriber is gone
    pub fn reload(&self, filter: &str) -> LogResult<()> {
        let new_filter = parse_filter(filter)?;
        self.filter
            .reload(new_filter)
            .map_err(|e| LogError::Config(format!("failed to reload filter: {e}")))?;
        self.current_filter.store(Arc::new(filter.to_string()));
        Ok(())
    }

    /// The directive currently in effect.
    pub fn current_filter(&self) -> Arc<String> {
        self.current_filter.load_full()
    }
}

pub(crate) fn parse_filter(filter: &str) -> LogResult<EnvFilter> {
    EnvFilter::try_new(filter).map_err(|e| LogError::Filter(format!("{filter}: {e}")))
}

/// Filter layer, wrapped in a reload layer when `reloadable`.
pub(super) fn create_filter_layer(
    filter: EnvFilter,
    level_str: &str,
    reloadable: bool,
) -> (
    Box<dyn Layer<Registry> + Send + Sync + 'static>,
    Option<ReloadHandle>,
) {
    if reloadable {
        let (layer, handle) = reload::Layer::new(filter);
        let reload_handle = ReloadHandle {
            filter: handle,
            current_filter: Arc::new(ArcSwap::from_pointee(level_str.to_string())),
        };
        (Box::new(layer), Some(reload_handle))
    } else {
        (Box::new(filter), None)
    }
}
