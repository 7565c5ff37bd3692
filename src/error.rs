use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Outcome of a catalogue operation that could not produce its result.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A request the operation cannot proceed without failed or returned
    /// a non-2xx status (`status` is 0 for transport failures).
    #[error("upstream unavailable: {url} returned {status}")]
    UpstreamUnavailable { url: String, status: u16 },

    /// The upstream answered but not in the shape we know how to read.
    #[error("upstream shape changed: {0}")]
    ShapeMismatch(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("persistence error: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl CatalogError {
    pub fn not_found(what: impl Into<String>) -> Self {
        CatalogError::NotFound(what.into())
    }

    pub fn shape(what: impl Into<String>) -> Self {
        CatalogError::ShapeMismatch(what.into())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("not found: {0}")]
    Missing(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Catalog(CatalogError::NotFound(m)) | AppError::Missing(m) => {
                (StatusCode::NOT_FOUND, m.clone())
            }
            AppError::Catalog(e @ CatalogError::UpstreamUnavailable { .. })
            | AppError::Catalog(e @ CatalogError::ShapeMismatch(_)) => {
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            AppError::Catalog(e @ CatalogError::Persistence(_)) => {
                tracing::error!("Persistence error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::Internal(m) => {
                tracing::error!("Internal error: {m}");
                (StatusCode::INTERNAL_SERVER_ERROR, m.clone())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_errors_map_to_distinct_statuses() {
        let cases = [
            (CatalogError::not_found("programme b0001"), StatusCode::NOT_FOUND),
            (
                CatalogError::UpstreamUnavailable {
                    url: "http://x".into(),
                    status: 503,
                },
                StatusCode::BAD_GATEWAY,
            ),
            (CatalogError::shape("no versions"), StatusCode::BAD_GATEWAY),
            (
                CatalogError::Persistence(anyhow::anyhow!("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).into_response().status(), expected);
        }
    }
}
