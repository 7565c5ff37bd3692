use std::sync::Arc;

use crate::{catalog::Catalog, config::AppConfig};

/// Shared application state injected into every Axum handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub catalog: Arc<Catalog>,
}
