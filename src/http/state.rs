use std::sync::Arc;

use crate::session::SessionController;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single recording session controller for this process
    pub controller: Arc<SessionController>,
}

impl AppState {
    pub fn new(controller: Arc<SessionController>) -> Self {
        Self { controller }
    }
}
