//! Application state management

use std::sync::Arc;

use crate::service::PageImageService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    service: PageImageService,
}

impl AppState {
    pub fn new(service: PageImageService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { service }),
        }
    }

    /// Get the page image service
    pub fn service(&self) -> &PageImageService {
        &self.inner.service
    }
}
