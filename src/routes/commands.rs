use axum::extract::State;
use tracing::{error, info};

use crate::{
    error::{AppError, Result},
    state::AppState,
};

/// GET /bbc/commands/reload
pub async fn reload(State(state): State<AppState>) -> Result<&'static str> {
    info!("Reload requested");
    match state.catalog.force_reload().await {
        Ok(()) => Ok("Catalogue reloaded"),
        Err(e) => {
            error!("Reload failed: {e}");
            Err(AppError::Internal(format!("Error reloading catalogue: {e}")))
        }
    }
}
