//! Process-wide engine handle.

use std::sync::LazyLock;

use crate::engine::ValidationEngine;

static GLOBAL: LazyLock<ValidationEngine> = LazyLock::new(ValidationEngine::new);

impl ValidationEngine {
    /// The process-wide engine. Starts uninitialized; hosts that need more
    /// than one registry should create their own handles instead.
    pub fn global() -> &'static ValidationEngine {
        &GLOBAL
    }
}
