//! Shared application state injected into every handler.

use std::sync::Arc;

use studio_engine::Backends;

/// Provider factory used by every request. Requests carry their own
/// credentials, so nothing per-user lives here.
#[derive(Clone)]
pub struct AppState {
    pub backends: Arc<dyn Backends>,
}

impl AppState {
    pub fn new(backends: impl Backends + 'static) -> Self {
        Self {
            backends: Arc::new(backends),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
