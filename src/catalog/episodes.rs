use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::{Catalog, read_state};
use crate::{
    cache::episode_query_key,
    error::CatalogError,
    fetch::{FetchRequest, fetch_all, fetch_one},
    iplayer::episodes_url,
    models::{Episode, EpisodeEntity, EpisodeResult, ReduxState},
};

impl Catalog {
    /// Episodes of a programme, fetched from its episode index and every
    /// series slice listed there. Within the episode TTL the known list is
    /// returned without touching the network.
    pub async fn get_episodes(&self, programme_id: &str) -> Result<Vec<Episode>, CatalogError> {
        let Some(programme_title) = self
            .programmes
            .read()
            .await
            .get(programme_id)
            .map(|p| p.title.clone())
        else {
            debug!("Programme not found: {programme_id}");
            return Err(CatalogError::not_found(format!("programme {programme_id}")));
        };

        let key = episode_query_key(programme_id);
        if !self.is_stale(&key, self.settings.episode_ttl).await {
            return Ok(self.episodes_of(programme_id).await);
        }

        let index_url = episodes_url(self.base_url(), programme_id);
        let index = fetch_one(self.client.as_ref(), &FetchRequest::new(index_url.clone())).await;
        if !index.ok {
            error!(
                "Failed to fetch episodes for programme {programme_id}: {} returned {}",
                index.url, index.status
            );
            return Err(CatalogError::UpstreamUnavailable {
                url: index.url,
                status: index.status,
            });
        }

        let mut state = read_state(&index.body, &index.url).inspect_err(|e| {
            error!("Cannot read episodes of {programme_id}: {e}");
        })?;
        if state.entities.is_none() {
            error!("No entities in episode index of {programme_id}");
            return Err(CatalogError::shape(format!(
                "no entities in episode index of {programme_id}"
            )));
        }

        let slices: Vec<String> = state
            .header
            .take()
            .map(|h| h.available_slices)
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.id)
            .filter(|id| !id.is_empty())
            .collect();

        let mut added = self
            .merge_episodes(programme_id, episodes_from_index(state, &programme_title))
            .await;

        if !slices.is_empty() {
            let requests = slices
                .iter()
                .map(|id| FetchRequest::new(index_url.clone()).with_query("seriesId", id.clone()))
                .collect();
            let outcomes = fetch_all(
                self.client.as_ref(),
                requests,
                self.settings.fetch_concurrency,
            )
            .await;

            for outcome in outcomes {
                if !outcome.ok {
                    warn!(
                        "Failed to fetch episodes for series {} ({})",
                        outcome.url, outcome.status
                    );
                    continue;
                }
                match read_state(&outcome.body, &outcome.url) {
                    Ok(slice) => {
                        added += self
                            .merge_episodes(
                                programme_id,
                                episodes_from_index(slice, &programme_title),
                            )
                            .await;
                    }
                    Err(e) => warn!("Skipping series page: {e}"),
                }
            }
        }

        if added > 0 {
            info!("Added {added} episodes to {programme_id}");
            self.save_programmes().await?;
        }
        self.mark_refreshed(&key, Utc::now()).await?;

        Ok(self.episodes_of(programme_id).await)
    }

    async fn merge_episodes(&self, programme_id: &str, episodes: Vec<Episode>) -> usize {
        self.programmes
            .write()
            .await
            .append_episodes(programme_id, episodes)
    }

    async fn episodes_of(&self, programme_id: &str) -> Vec<Episode> {
        self.programmes
            .read()
            .await
            .get(programme_id)
            .map(|p| p.episodes.clone())
            .unwrap_or_default()
    }
}

/// Episodes listed in `entities.results`. Results without an `episode`
/// object are other tiles (clips, promos) and are skipped.
fn episodes_from_index(state: ReduxState, programme_title: &str) -> Vec<Episode> {
    let results = state.entities.map(|e| e.results).unwrap_or_default();

    let mut episodes = Vec::with_capacity(results.len());
    for raw in results {
        let result: EpisodeResult = match serde_json::from_value(raw) {
            Ok(result) => result,
            Err(e) => {
                warn!("Unreadable episode entity: {e}");
                continue;
            }
        };
        let Some(entity) = result.episode else {
            continue;
        };
        let title = episode_title(&entity, programme_title);
        let Some(id) = entity.id else {
            warn!("Episode entity without id: {title}");
            continue;
        };

        episodes.push(Episode {
            id,
            title,
            description: entity.synopsis.and_then(|s| s.small).unwrap_or_default(),
            live: entity.live,
        });
    }
    episodes
}

/// `"<title> - <subtitle>"` when the episode carries a subtitle with a slice,
/// the bare title otherwise. Episodes without their own title borrow the
/// programme's.
fn episode_title(entity: &EpisodeEntity, programme_title: &str) -> String {
    let title = entity
        .title
        .as_ref()
        .and_then(|t| t.default.as_deref())
        .filter(|t| !t.is_empty())
        .unwrap_or(programme_title);

    match &entity.subtitle {
        Some(subtitle) if subtitle.slice.is_some() => match subtitle.default.as_deref() {
            Some(sub) if !sub.is_empty() => format!("{title} - {sub}"),
            _ => title.to_string(),
        },
        _ => title.to_string(),
    }
}
