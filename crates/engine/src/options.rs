//! Engine configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::body::NativeBodyProvider;

fn default_threads() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_cache_size() -> usize {
    1024
}

/// Options for `initialize`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitializationOptions {
    /// Worker threads used to compile bodies; 1 compiles inline.
    #[serde(default = "default_threads")]
    pub num_compilation_threads: usize,
    /// Prefer native bodies when the provider has one.
    #[serde(default = "default_true")]
    pub pre_compiled_bodies_enabled: bool,
    /// Collect per-rule execution counters.
    pub compute_execution_stats: bool,
    /// Capacity of the parsed-expression cache.
    #[serde(default = "default_cache_size")]
    pub expression_cache_size: usize,
    /// Source of native bodies.
    #[serde(skip)]
    pub native_bodies: Option<Arc<dyn NativeBodyProvider>>,
}

impl Default for InitializationOptions {
    fn default() -> Self {
        Self {
            num_compilation_threads: default_threads(),
            pre_compiled_bodies_enabled: true,
            compute_execution_stats: false,
            expression_cache_size: default_cache_size(),
            native_bodies: None,
        }
    }
}

impl InitializationOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Set the number of compilation threads (at least 1).
    pub fn with_compilation_threads(mut self, threads: usize) -> Self {
        self.num_compilation_threads = threads.max(1);
        self
    }

    /// Enable or disable native bodies.
    pub fn with_pre_compiled_bodies(mut self, enabled: bool) -> Self {
        self.pre_compiled_bodies_enabled = enabled;
        self
    }

    /// Enable or disable execution counters.
    pub fn with_execution_stats(mut self, enabled: bool) -> Self {
        self.compute_execution_stats = enabled;
        self
    }

    /// Set the parsed-expression cache capacity.
    pub fn with_expression_cache_size(mut self, size: usize) -> Self {
        self.expression_cache_size = size;
        self
    }

    /// Use `provider` for native bodies.
    pub fn with_native_bodies(mut self, provider: Arc<dyn NativeBodyProvider>) -> Self {
        self.native_bodies = Some(provider);
        self
    }
}

impl fmt::Debug for InitializationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializationOptions")
            .field("num_compilation_threads", &self.num_compilation_threads)
            .field("pre_compiled_bodies_enabled", &self.pre_compiled_bodies_enabled)
            .field("compute_execution_stats", &self.compute_execution_stats)
            .field("expression_cache_size", &self.expression_cache_size)
            .field("native_bodies", &self.native_bodies.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = InitializationOptions::default();
        assert_eq!(options.num_compilation_threads, 2);
        assert!(options.pre_compiled_bodies_enabled);
        assert!(!options.compute_execution_stats);
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let options =
            InitializationOptions::from_json(r#"{"compute_execution_stats": true}"#).unwrap();
        assert!(options.compute_execution_stats);
        assert_eq!(options.num_compilation_threads, 2);
        assert!(options.pre_compiled_bodies_enabled);
        assert_eq!(options.expression_cache_size, 1024);
    }

    #[test]
    fn thread_count_is_at_least_one() {
        let options = InitializationOptions::new().with_compilation_threads(0);
        assert_eq!(options.num_compilation_threads, 1);
    }
}
