use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use super::{CATEGORIES_KEY, Catalog, Refresh, RefreshOutcome, read_state};
use crate::{
    cache::CATEGORY_REFRESH_KEY,
    error::CatalogError,
    fetch::{FetchRequest, fetch_one},
    iplayer::{category_url, parse_total_pages},
    models::{Category, ReduxState},
};

impl Catalog {
    /// Rebuild the category list from the iPlayer home page navigation,
    /// unless it was rebuilt within the category TTL.
    pub async fn refresh_categories(&self) -> Result<RefreshOutcome, CatalogError> {
        self.refresh_categories_with(Refresh::IfStale).await
    }

    pub(super) async fn refresh_categories_with(
        &self,
        mode: Refresh,
    ) -> Result<RefreshOutcome, CatalogError> {
        let _writer = self.category_writer.lock().await;

        if mode == Refresh::IfStale
            && !self
                .is_stale(CATEGORY_REFRESH_KEY, self.settings.category_ttl)
                .await
        {
            let held = self.categories.read().await.len();
            if held > 0 {
                info!("Categories are fresh, keeping {held}");
                return Ok(RefreshOutcome::Skipped);
            }
            if let Some(saved) = self.load_persisted::<Vec<Category>>(CATEGORIES_KEY).await {
                info!("Categories are fresh, using {} saved", saved.len());
                *self.categories.write().await = Arc::new(saved);
                return Ok(RefreshOutcome::Skipped);
            }
            info!("Categories are fresh but none were saved, refreshing");
        }

        let root = fetch_one(self.client.as_ref(), &FetchRequest::new(self.base_url())).await;
        if !root.ok {
            error!(
                "Failed to fetch categories from iPlayer: {} returned {}",
                root.url, root.status
            );
            return Err(CatalogError::UpstreamUnavailable {
                url: root.url,
                status: root.status,
            });
        }

        let state = read_state(&root.body, "iPlayer home page").inspect_err(|e| {
            error!("Cannot read categories: {e}");
        })?;
        let ids = category_ids(&state).inspect_err(|e| {
            error!("Cannot read categories: {e}");
        })?;

        // One request per category, in order; only the first listing page is
        // needed to learn the page count.
        let mut categories = Vec::with_capacity(ids.len());
        for id in ids {
            let first_page = fetch_one(
                self.client.as_ref(),
                &FetchRequest::new(category_url(self.base_url(), &id)),
            )
            .await;

            let total_pages = if first_page.ok {
                parse_total_pages(&first_page.body)
            } else {
                None
            };
            if total_pages.is_none() {
                warn!(
                    "No page count for category {id} ({} returned {})",
                    first_page.url, first_page.status
                );
            }
            categories.push(Category { id, total_pages });
        }

        info!("Reloaded categories: {}", categories.len());
        self.persist(CATEGORIES_KEY, &categories).await?;
        *self.categories.write().await = Arc::new(categories);
        self.mark_refreshed(CATEGORY_REFRESH_KEY, Utc::now()).await?;

        Ok(RefreshOutcome::Refreshed)
    }
}

/// Sub-items of the `categories` navigation group, deduplicated.
fn category_ids(state: &ReduxState) -> Result<Vec<String>, CatalogError> {
    let group = state
        .navigation
        .as_ref()
        .and_then(|nav| nav.items.iter().find(|item| item.id == "categories"))
        .ok_or_else(|| CatalogError::shape("no categories group in navigation"))?;

    let mut ids: Vec<String> = Vec::with_capacity(group.sub_items.len());
    for item in &group.sub_items {
        if item.id.is_empty() || ids.contains(&item.id) {
            continue;
        }
        ids.push(item.id.clone());
    }
    Ok(ids)
}
