use axum::{
    extract::{Path, State},
    response::Response,
};
use reqwest::Url;
use tracing::debug;

use super::moved_permanently;
use crate::{
    error::{AppError, Result},
    state::AppState,
};

/// GET /bbc/programmes/:pid/stream/:eid/:format
/// GET /bbc/programmes/:pid/stream/:eid/*segment_path
///
/// A single trailing segment names the stream format. A longer tail is a
/// path relative to the manifest (players resolve segment URLs against the
/// URL they requested), so it is resolved against the default format's
/// manifest instead.
pub async fn stream(
    State(state): State<AppState>,
    Path((pid, eid, rest)): Path<(String, String, String)>,
) -> Result<Response> {
    if !rest.contains('/') {
        let url = state.catalog.get_stream(&pid, &eid, &rest).await?;
        return Ok(moved_permanently(&url));
    }

    let format = &state.config.default_stream_format;
    let manifest = state.catalog.get_stream(&pid, &eid, format).await?;
    let url = replace_last_segment(&manifest, &rest)?;
    debug!("Redirecting {eid} segment {rest} to {url}");
    Ok(moved_permanently(&url))
}

/// `https://cdn/a/b/manifest.mpd?x` with `c/d.m4s` → `https://cdn/a/b/c/d.m4s?x`
fn replace_last_segment(url: &str, tail: &str) -> Result<String> {
    let mut url = Url::parse(url)
        .map_err(|e| AppError::Internal(format!("Unusable stream URL {url}: {e}")))?;
    let parent = url
        .path()
        .rsplit_once('/')
        .map(|(parent, _)| parent.to_string())
        .unwrap_or_default();
    url.set_path(&format!("{parent}/{tail}"));
    Ok(url.to_string())
}
