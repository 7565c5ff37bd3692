use chrono::Utc;
use tracing::{debug, info, warn};

use super::{Catalog, PROGRAMMES_KEY, Refresh, RefreshOutcome, read_state};
use crate::{
    cache::PROGRAMME_REFRESH_KEY,
    error::CatalogError,
    fetch::{FetchRequest, fetch_all},
    iplayer::category_url,
    models::{Programme, ProgrammeElement, ReduxState},
};

impl Catalog {
    /// Walk every category's listing pages and add programmes not seen
    /// before, unless the catalogue was refreshed within the programme TTL.
    ///
    /// Page failures are logged and skipped; the refresh itself only fails if
    /// the result cannot be saved.
    pub async fn refresh_programmes(&self) -> Result<RefreshOutcome, CatalogError> {
        self.refresh_programmes_with(Refresh::IfStale).await
    }

    pub(super) async fn refresh_programmes_with(
        &self,
        mode: Refresh,
    ) -> Result<RefreshOutcome, CatalogError> {
        let _writer = self.programme_writer.lock().await;

        if mode == Refresh::IfStale
            && !self
                .is_stale(PROGRAMME_REFRESH_KEY, self.settings.programme_ttl)
                .await
        {
            if let Some(saved) = self.load_persisted::<Vec<Programme>>(PROGRAMMES_KEY).await {
                info!("Programmes are fresh, merging {} saved", saved.len());
                self.programmes.write().await.merge(saved);
                return Ok(RefreshOutcome::Skipped);
            }
            info!("Programmes are fresh but none were saved, refreshing");
        }

        let requests = self.listing_requests().await;
        info!("Fetching {} category listing pages", requests.len());
        let outcomes = fetch_all(
            self.client.as_ref(),
            requests,
            self.settings.fetch_concurrency,
        )
        .await;

        let mut added = 0;
        for outcome in outcomes {
            if !outcome.ok {
                warn!(
                    "Failed to fetch programmes for category page {} ({})",
                    outcome.url, outcome.status
                );
                continue;
            }
            let state = match read_state(&outcome.body, &outcome.url) {
                Ok(state) => state,
                Err(e) => {
                    warn!("Skipping category page: {e}");
                    continue;
                }
            };

            let found = programmes_from_listing(state, &outcome.url);
            let mut set = self.programmes.write().await;
            for programme in found {
                let title = programme.title.clone();
                if set.insert_new(programme) {
                    debug!("Added programme: {title}");
                    added += 1;
                }
            }
        }

        self.save_programmes().await?;
        // Resolved stream URLs are dropped whenever the catalogue is rebuilt.
        self.clear_streams().await;
        self.mark_refreshed(PROGRAMME_REFRESH_KEY, Utc::now()).await?;

        info!(
            "Programme refresh added {added}, catalogue now holds {}",
            self.programmes.read().await.list.len()
        );
        Ok(RefreshOutcome::Refreshed)
    }

    /// Listing pages `1..total_pages` of every category. The unnumbered first
    /// page was already read during category discovery.
    async fn listing_requests(&self) -> Vec<FetchRequest> {
        let categories = self.categories.read().await.clone();
        let mut requests = Vec::new();
        for category in categories.iter() {
            let Some(total_pages) = category.total_pages else {
                debug!("Category {} has no page count, skipping", category.id);
                continue;
            };
            let url = category_url(self.base_url(), &category.id);
            for page in 1..total_pages {
                requests.push(FetchRequest::new(url.clone()).with_query("page", page.to_string()));
            }
        }
        requests
    }
}

/// Programme tiles on a category listing page. Tiles without a `live` flag
/// or an id are logged and skipped.
fn programmes_from_listing(state: ReduxState, source: &str) -> Vec<Programme> {
    let Some(entities) = state.entities else {
        warn!("No entities on category page {source}");
        return Vec::new();
    };
    let category = entities.category.map(|c| c.id).unwrap_or_default();

    let mut programmes = Vec::with_capacity(entities.elements.len());
    for raw in entities.elements {
        let element: ProgrammeElement = match serde_json::from_value(raw) {
            Ok(element) => element,
            Err(e) => {
                warn!("Unreadable programme entity on {source}: {e}");
                continue;
            }
        };
        let Some(id) = element.id else {
            warn!("Programme entity without id on {source}");
            continue;
        };
        let Some(live) = element.live else {
            warn!("Entity missing 'live' key: {id}");
            continue;
        };

        programmes.push(Programme {
            id,
            title: element.title.unwrap_or_default(),
            description: element.synopses.and_then(|s| s.small).unwrap_or_default(),
            image_poster: element.images.and_then(|i| i.standard).unwrap_or_default(),
            category: category.clone(),
            live,
            episodes: Vec::new(),
        });
    }
    programmes
}
