use axum::{
    extract::{Path, State},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use tracing::{info, warn};

use crate::{
    playlist::{CONTENT_TYPE, PlaylistEntry, render_playlist},
    state::AppState,
};

/// GET /bbc/m3u/:format
///
/// Every live episode of every live programme. Episode lists are refreshed
/// as they go stale; a programme whose episodes cannot be fetched falls back
/// to the ones already known.
pub async fn m3u(
    State(state): State<AppState>,
    Path(format): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or(state.config.bind.as_str())
        .to_string();

    let mut entries = Vec::new();
    for programme in state.catalog.list_programmes().await {
        if !programme.live {
            continue;
        }
        let episodes = match state.catalog.get_episodes(&programme.id).await {
            Ok(episodes) => episodes,
            Err(e) => {
                warn!("Using known episodes of {}: {e}", programme.id);
                programme.episodes
            }
        };
        entries.extend(episodes.into_iter().filter(|e| e.live).map(|e| PlaylistEntry {
            programme_id: programme.id.clone(),
            episode_id: e.id,
            title: e.title,
        }));
    }

    info!("Serving {format} playlist with {} entries", entries.len());
    (
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        render_playlist(&host, &format, &entries),
    )
}
