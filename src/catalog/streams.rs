use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::{Catalog, read_state};
use crate::{
    error::CatalogError,
    fetch::{FetchRequest, fetch_one},
    iplayer::{episode_url, media_selector_url},
    models::MediaSet,
};

/// Media selector protocol versions, tried in order. The newer version is
/// refused for some streams that the older one still serves.
const MEDIA_SELECTOR_VERSIONS: [&str; 2] = ["3.0", "2.0"];

/// Why a media selector manifest did not yield a URL.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamSelectError {
    #[error("media selector reported an error: {0}")]
    Selector(String),
    #[error("manifest has no media list")]
    NoMedia,
    #[error("no video media in manifest")]
    NoVideo,
    #[error("no {0} connection for the video media")]
    NoConnection(String),
    #[error("{0} connection has no URL")]
    NoHref(String),
}

/// Pick the URL of the first `format` connection of the first video media.
pub fn select_stream_url(manifest: &MediaSet, format: &str) -> Result<String, StreamSelectError> {
    if let Some(err) = &manifest.error {
        return Err(StreamSelectError::Selector(err.to_string()));
    }
    let media = manifest.media.as_ref().ok_or(StreamSelectError::NoMedia)?;
    let video = media
        .iter()
        .find(|m| m.is_video())
        .ok_or(StreamSelectError::NoVideo)?;
    let connection = video
        .connection
        .iter()
        .find(|c| c.transfer_format.as_deref() == Some(format))
        .ok_or_else(|| StreamSelectError::NoConnection(format.to_string()))?;
    connection
        .href
        .clone()
        .filter(|href| !href.is_empty())
        .ok_or_else(|| StreamSelectError::NoHref(format.to_string()))
}

impl Catalog {
    /// Resolve a playable URL for an episode of a known programme.
    pub async fn get_stream(
        &self,
        programme_id: &str,
        episode_id: &str,
        format: &str,
    ) -> Result<String, CatalogError> {
        if self.programmes.read().await.get(programme_id).is_none() {
            debug!("Programme not found: {programme_id}");
            return Err(CatalogError::not_found(format!("programme {programme_id}")));
        }
        self.get_programme_stream(episode_id, format).await
    }

    /// Resolve a playable URL for an episode.
    ///
    /// The episode page names the underlying stream (a version id, or a
    /// service id for simulcasts); the media selector turns that into a
    /// manifest of connections. Results are cached under both the episode id
    /// and the stream id.
    pub async fn get_programme_stream(
        &self,
        episode_id: &str,
        format: &str,
    ) -> Result<String, CatalogError> {
        if let Some(url) = self.cached_stream(episode_id, format).await {
            debug!("Stream cache hit for episode {episode_id} ({format})");
            return Ok(url);
        }

        let page = fetch_one(
            self.client.as_ref(),
            &FetchRequest::new(episode_url(self.base_url(), episode_id)),
        )
        .await;
        if !page.ok {
            error!(
                "Failed to fetch episode page for {episode_id}: {} returned {}",
                page.url, page.status
            );
            return Err(CatalogError::UpstreamUnavailable {
                url: page.url,
                status: page.status,
            });
        }

        let state = read_state(&page.body, &page.url).inspect_err(|e| {
            error!("Cannot read episode {episode_id}: {e}");
        })?;
        let Some(version) = state.versions.as_ref().and_then(|v| v.first()) else {
            error!("No versions available for episode {episode_id}");
            return Err(CatalogError::shape(format!("no versions for episode {episode_id}")));
        };
        let Some(stream_id) = version.stream_id().map(str::to_string) else {
            error!("First version of episode {episode_id} has no stream id");
            return Err(CatalogError::shape(format!(
                "version without stream id for episode {episode_id}"
            )));
        };

        if let Some(url) = self.cached_stream(&stream_id, format).await {
            debug!("Stream cache hit for stream {stream_id} ({format})");
            self.streams
                .write()
                .await
                .insert(&[episode_id], format, &url);
            return Ok(url);
        }

        let Some(manifest) = self.query_media_selector(&stream_id).await else {
            error!("Media selector failed for stream {stream_id} at every version");
            return Err(CatalogError::not_found(format!("stream {stream_id}")));
        };

        let url = select_stream_url(&manifest, format).map_err(|e| {
            warn!("No usable stream for {stream_id} (episode {episode_id}): {e}");
            CatalogError::not_found(format!("{format} stream for episode {episode_id}"))
        })?;

        self.streams
            .write()
            .await
            .insert(&[episode_id, &stream_id], format, &url);
        Ok(url)
    }

    /// Cached URL for an episode id or stream id.
    pub async fn cached_stream(&self, id: &str, format: &str) -> Option<String> {
        self.streams.read().await.get(id, format).map(str::to_string)
    }

    /// Drop every resolved stream URL.
    pub async fn clear_streams(&self) {
        let mut streams = self.streams.write().await;
        let dropped = streams.len();
        streams.clear();
        if dropped > 0 {
            info!("Cleared {dropped} cached stream URLs");
        }
    }

    /// Ask the media selector for a manifest, newest protocol version first.
    /// Exactly one attempt per version; `None` once all have failed.
    async fn query_media_selector(&self, stream_id: &str) -> Option<MediaSet> {
        for version in MEDIA_SELECTOR_VERSIONS {
            let url = media_selector_url(&self.settings.media_selector_url, version, stream_id);
            let outcome = fetch_one(self.client.as_ref(), &FetchRequest::new(url)).await;
            if !outcome.ok {
                warn!(
                    "Media selector {version} failed for {stream_id} ({})",
                    outcome.status
                );
                continue;
            }
            match serde_json::from_str::<MediaSet>(&outcome.body) {
                Ok(manifest) => return Some(manifest),
                Err(e) => warn!("Media selector {version} answered unreadable JSON for {stream_id}: {e}"),
            }
        }
        None
    }
}
