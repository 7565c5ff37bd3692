//! The iPlayer catalogue: categories, programmes, episodes and resolved
//! stream URLs, each cached with its own refresh policy.
//!
//! `Catalog` owns all mutable state. Categories are swapped as a whole set,
//! programmes and episodes are only ever appended, so readers always see a
//! consistent (possibly stale) snapshot. Each catalogue refresh holds a
//! writer lock for its duration so two refreshes of the same catalogue never
//! interleave.

mod categories;
mod episodes;
mod programmes;
mod streams;

use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::{
    cache::{RefreshState, StreamCache},
    db::BlobStore,
    error::CatalogError,
    fetch::HttpClient,
    iplayer::{Extraction, extract_redux_state},
    models::{Category, Episode, Programme, ReduxState},
};

const CATEGORIES_KEY: &str = "categories";
const PROGRAMMES_KEY: &str = "programmes";
const REFRESH_STATE_KEY: &str = "refresh_state";

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    /// iPlayer root without a trailing slash.
    pub iplayer_base_url: String,
    /// Media selector template with `{version}` and `{vid}` placeholders.
    pub media_selector_url: String,
    pub fetch_concurrency: usize,
    pub category_ttl: TimeDelta,
    pub programme_ttl: TimeDelta,
    pub episode_ttl: TimeDelta,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            iplayer_base_url: "https://www.bbc.co.uk/iplayer".to_string(),
            media_selector_url: "https://open.live.bbc.co.uk/mediaselector/6/select/version/\
                                 {version}/mediaset/iptv-native-hd/vpid/{vid}/format/json/cors/1"
                .to_string(),
            fetch_concurrency: 15,
            category_ttl: TimeDelta::hours(1),
            programme_ttl: TimeDelta::hours(1),
            episode_ttl: TimeDelta::minutes(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Skip the network when the last refresh is within the TTL.
    IfStale,
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Served from persisted data; nothing was fetched.
    Skipped,
    Refreshed,
}

/// Programmes in first-seen order with an id index.
#[derive(Debug, Default)]
struct ProgrammeSet {
    list: Vec<Programme>,
    index: HashMap<String, usize>,
}

impl ProgrammeSet {
    fn from_programmes(programmes: Vec<Programme>) -> Self {
        let mut set = Self::default();
        for programme in programmes {
            set.insert_new(programme);
        }
        set
    }

    fn get(&self, id: &str) -> Option<&Programme> {
        self.index.get(id).map(|&i| &self.list[i])
    }

    /// Add `programme` unless its id is already known. First seen wins.
    fn insert_new(&mut self, programme: Programme) -> bool {
        if self.index.contains_key(&programme.id) {
            return false;
        }
        self.index.insert(programme.id.clone(), self.list.len());
        self.list.push(programme);
        true
    }

    /// Append episodes whose ids the programme does not have yet. Returns
    /// how many were added.
    fn append_episodes(&mut self, programme_id: &str, episodes: Vec<Episode>) -> usize {
        let Some(&i) = self.index.get(programme_id) else {
            return 0;
        };
        let programme = &mut self.list[i];
        let mut added = 0;
        for episode in episodes {
            if programme.episodes.iter().any(|e| e.id == episode.id) {
                continue;
            }
            programme.episodes.push(episode);
            added += 1;
        }
        added
    }

    /// Fold `programmes` into the set: unknown programmes are added, known
    /// ones gain any episodes they lack. Nothing already held is dropped.
    fn merge(&mut self, programmes: Vec<Programme>) {
        for mut programme in programmes {
            let episodes = std::mem::take(&mut programme.episodes);
            let id = programme.id.clone();
            self.insert_new(programme);
            self.append_episodes(&id, episodes);
        }
    }
}

pub struct Catalog {
    client: Arc<dyn HttpClient>,
    store: Arc<dyn BlobStore>,
    settings: CatalogSettings,
    categories: RwLock<Arc<Vec<Category>>>,
    programmes: RwLock<ProgrammeSet>,
    streams: RwLock<StreamCache>,
    refresh: RwLock<RefreshState>,
    category_writer: Mutex<()>,
    programme_writer: Mutex<()>,
    programme_saver: Mutex<()>,
    refresh_saver: Mutex<()>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Catalog {
    pub fn new(
        client: Arc<dyn HttpClient>,
        store: Arc<dyn BlobStore>,
        settings: CatalogSettings,
    ) -> Self {
        Self {
            client,
            store,
            settings,
            categories: RwLock::default(),
            programmes: RwLock::default(),
            streams: RwLock::default(),
            refresh: RwLock::default(),
            category_writer: Mutex::new(()),
            programme_writer: Mutex::new(()),
            programme_saver: Mutex::new(()),
            refresh_saver: Mutex::new(()),
        }
    }

    /// Load whatever was persisted by a previous run. Missing or unreadable
    /// blobs leave the corresponding part empty.
    pub async fn restore(&self) {
        if let Some(state) = self.load_persisted::<RefreshState>(REFRESH_STATE_KEY).await {
            *self.refresh.write().await = state;
        }
        if let Some(categories) = self.load_persisted::<Vec<Category>>(CATEGORIES_KEY).await {
            *self.categories.write().await = Arc::new(categories);
        }
        if let Some(programmes) = self.load_persisted::<Vec<Programme>>(PROGRAMMES_KEY).await {
            *self.programmes.write().await = ProgrammeSet::from_programmes(programmes);
        }
        info!(
            "Restored {} categories and {} programmes",
            self.categories.read().await.len(),
            self.programmes.read().await.list.len()
        );
    }

    pub async fn list_categories(&self) -> Vec<Category> {
        self.categories.read().await.to_vec()
    }

    pub async fn list_programmes(&self) -> Vec<Programme> {
        self.programmes.read().await.list.clone()
    }

    pub async fn get_programme(&self, id: &str) -> Option<Programme> {
        self.programmes.read().await.get(id).cloned()
    }

    /// Re-scrape categories and programmes regardless of when they were last
    /// refreshed.
    pub async fn force_reload(&self) -> Result<(), CatalogError> {
        self.refresh_categories_with(Refresh::Force).await?;
        self.refresh_programmes_with(Refresh::Force).await?;
        Ok(())
    }

    // ── Shared plumbing ───────────────────────────────────────────────────────

    fn base_url(&self) -> &str {
        &self.settings.iplayer_base_url
    }

    async fn is_stale(&self, key: &str, ttl: TimeDelta) -> bool {
        self.refresh.read().await.is_stale(key, Utc::now(), ttl)
    }

    /// Record a completed refresh and persist the timestamps.
    async fn mark_refreshed(&self, key: &str, at: DateTime<Utc>) -> Result<(), CatalogError> {
        // Held across the save so snapshots reach the store in the order
        // they were taken.
        let _saver = self.refresh_saver.lock().await;
        let snapshot = {
            let mut state = self.refresh.write().await;
            state.mark(key, at);
            state.clone()
        };
        self.persist(REFRESH_STATE_KEY, &snapshot).await
    }

    async fn save_programmes(&self) -> Result<(), CatalogError> {
        // Snapshot inside the lock so a later save never writes an older set.
        let _saver = self.programme_saver.lock().await;
        let snapshot = self.programmes.read().await.list.clone();
        self.persist(PROGRAMMES_KEY, &snapshot).await
    }

    async fn persist<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CatalogError> {
        let blob = serde_json::to_value(value).with_context(|| format!("encode {key}"))?;
        self.store.save(key, &blob).await?;
        Ok(())
    }

    async fn load_persisted<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let blob = match self.store.load(key).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                warn!("Could not load saved {key}: {e:#}");
                return None;
            }
        };
        match serde_json::from_value(blob) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring unreadable saved {key}: {e}");
                None
            }
        }
    }
}

/// Embedded state of a fetched page, or the shape error describing why it
/// could not be read.
fn read_state(html: &str, page: &str) -> Result<ReduxState, CatalogError> {
    match extract_redux_state(html) {
        Extraction::Found(state) => Ok(state),
        Extraction::Missing => Err(CatalogError::shape(format!("no embedded state on {page}"))),
        Extraction::Malformed(why) => Err(CatalogError::shape(format!("{page}: {why}"))),
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{fixtures::*, *};

    fn episode_model(id: &str) -> Episode {
        Episode {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            live: true,
        }
    }

    #[test]
    fn programme_set_keeps_first_seen_and_skips_known_episodes() {
        let mut set = ProgrammeSet::from_programmes(vec![
            programme("b0001", "First"),
            programme("b0001", "Duplicate"),
            programme("b0002", "Second"),
        ]);

        assert_eq!(set.list.len(), 2);
        assert_eq!(set.get("b0001").unwrap().title, "First");

        let added = set.append_episodes("b0001", vec![episode_model("e1"), episode_model("e2")]);
        let again = set.append_episodes("b0001", vec![episode_model("e2"), episode_model("e3")]);
        assert_eq!((added, again), (2, 1));
        assert_eq!(set.append_episodes("nope", vec![episode_model("e1")]), 0);
        assert_eq!(set.get("b0001").unwrap().episodes.len(), 3);
    }

    #[test]
    fn merge_adds_without_dropping_anything_held() {
        let mut set = ProgrammeSet::from_programmes(vec![programme("b0001", "Live")]);
        set.append_episodes("b0001", vec![episode_model("e1")]);

        let mut saved = programme("b0001", "Saved");
        saved.episodes = vec![episode_model("e0")];
        set.merge(vec![saved, programme("b0002", "New")]);

        let held = set.get("b0001").unwrap();
        assert_eq!(held.title, "Live");
        let ids: Vec<_> = held.episodes.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["e1", "e0"]);
        assert!(set.get("b0002").is_some());
    }

    #[tokio::test]
    async fn refresh_stamps_reach_the_store_in_order() {
        let store = Arc::new(
            crate::testing::MemoryStore::new()
                .with_save_delays([std::time::Duration::from_millis(50)]),
        );
        let catalog = Catalog::new(
            Arc::new(crate::testing::FakeClient::new()),
            store.clone(),
            settings(),
        );

        let (first, second) = tokio::join!(
            catalog.mark_refreshed("b0001-episode-last-query", Utc::now()),
            catalog.mark_refreshed("b0002-episode-last-query", Utc::now()),
        );
        first.unwrap();
        second.unwrap();

        let saved = store.get(REFRESH_STATE_KEY).unwrap();
        assert!(saved.get("b0001-episode-last-query").is_some());
        assert!(saved.get("b0002-episode-last-query").is_some());
    }

    #[tokio::test]
    async fn restore_loads_persisted_catalogue() {
        let (catalog, _client, store) = catalog();
        store.put(CATEGORIES_KEY, json!([{"id": "news", "total_pages": 2}]));
        store.put(
            PROGRAMMES_KEY,
            serde_json::to_value(vec![programme("b0001", "Show")]).unwrap(),
        );
        store.put(
            REFRESH_STATE_KEY,
            json!({"category_last_refresh": Utc::now().to_rfc3339()}),
        );

        catalog.restore().await;

        assert_eq!(catalog.list_categories().await.len(), 1);
        assert_eq!(catalog.get_programme("b0001").await.unwrap().title, "Show");
        assert!(
            !catalog
                .is_stale("category_last_refresh", TimeDelta::hours(1))
                .await
        );
    }

    #[tokio::test]
    async fn restore_treats_unreadable_blobs_as_missing() {
        let (catalog, _client, store) = catalog();
        store.put(CATEGORIES_KEY, json!({"not": "a list"}));
        store.put(PROGRAMMES_KEY, json!([programme_json()]));

        catalog.restore().await;

        assert!(catalog.list_categories().await.is_empty());
        assert_eq!(catalog.list_programmes().await.len(), 1);
    }

    fn programme_json() -> serde_json::Value {
        serde_json::to_value(programme("b0009", "Saved")).unwrap()
    }

    #[tokio::test]
    async fn forced_reload_ignores_fresh_refresh_state() {
        let (catalog, client, store) = catalog();
        store.put(
            REFRESH_STATE_KEY,
            json!({
                "category_last_refresh": Utc::now().to_rfc3339(),
                "programme_last_refresh": Utc::now().to_rfc3339()
            }),
        );
        store.put(CATEGORIES_KEY, json!([]));
        catalog.restore().await;
        page(
            &client,
            BASE,
            json!({"navigation": {"items": [{"id": "categories", "subItems": [{"id": "news"}]}]}}),
        );

        catalog.force_reload().await.unwrap();

        assert_eq!(client.hits(BASE), 1);
        assert_eq!(catalog.list_categories().await.len(), 1);
    }

    #[test]
    fn unreadable_pages_are_shape_mismatches() {
        assert!(matches!(
            read_state("<html></html>", "home"),
            Err(CatalogError::ShapeMismatch(_))
        ));
    }
}
