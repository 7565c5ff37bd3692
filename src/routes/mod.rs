pub mod catalog;
pub mod commands;
pub mod playlist;
pub mod streams;

use axum::{
    Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let bbc = Router::new()
        // Catalogue
        .route("/categories", get(catalog::list_categories))
        .route("/programmes", get(catalog::list_programmes))
        .route("/programmes/{pid}", get(catalog::get_programme))
        .route("/programmes/{pid}/episodes", get(catalog::list_episodes))
        .route("/programmes/{pid}/poster", get(catalog::poster))
        // Streams: `{eid}/{format}` or `{eid}/<segment path>`
        .route("/programmes/{pid}/stream/{eid}/{*rest}", get(streams::stream))
        // Playlists
        .route("/m3u/{format}", get(playlist::m3u))
        // Commands
        .route("/commands/reload", get(commands::reload));

    Router::new().nest("/bbc", bbc).with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new()),
    )
}

/// 301 to `location`.
fn moved_permanently(location: &str) -> Response {
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}
